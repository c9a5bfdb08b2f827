//! # lockerfs
//!
//! A per-user automounter filesystem. The mount root is a flat directory
//! whose entries are symbolic links to network lockers, resolved on first
//! access through a naming service and remembered separately for each
//! user, next to a few read-only informational files such as the
//! `.attachtab` report.
//!
//! The [`Engine`] holds all the semantics and is driven through the
//! path-based [`VirtualFilesystem`] trait; [`LockerFs`] adapts it to FUSE
//! (with the `fuse` feature).
//!
//! ```
//! use std::sync::Arc;
//! use lockerfs::{Engine, Identity, StaticNamingService, VirtualFilesystem};
//!
//! let engine = Engine::builder(Arc::new(StaticNamingService::default()))
//!     .build()
//!     .unwrap();
//! let alice = Identity::new(1000, 1000, 1);
//!
//! engine.symlink(&alice, "/afs/sipb", "/sipb").unwrap();
//! assert_eq!(engine.readlink(&alice, "/sipb").unwrap(), "/afs/sipb");
//! ```

pub mod fs;
pub use fs::*;
