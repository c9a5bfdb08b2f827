pub mod attachtab;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod fuse_shim;
pub mod identity;
pub mod locks;
pub mod mounts;
pub mod naming;
pub mod negcache;
pub mod path;
pub mod resolver;
pub mod signal;
pub mod synthetic;
pub mod workers;

pub use attachtab::{AttachRow, Style, ATTACHTAB_NAME, LEGACY_ATTACHTAB_NAME};
pub use config::{Settings, DEFAULT_CONFIG_PATH};
pub use diagnostics::{DiagnosticsPolicy, DiagnosticsSink, LogSink, Severity};
pub use engine::{Engine, EngineBuilder, FileKind, Stat, VirtualFilesystem};
pub use error::{ConfigError, FsError, FsResult, LookupError, TableError};
pub use fuse_shim::{FileAttr, InodeTable, Ino, LockerFs, MountOptions, ROOT_INO};
#[cfg(feature = "fuse")]
pub use fuse_shim::{mount, spawn_mount};
pub use identity::{Identity, IdentityResolver, NumericResolver, PasswdResolver, Uid};
pub use mounts::{MountCache, MountRecord};
pub use naming::{Candidate, CommandNamingService, NamingService, PathCandidate, StaticNamingService};
pub use negcache::NegativeCache;
pub use path::PathClass;
pub use resolver::{Resolver, Source, Unresolved};
pub use synthetic::{ContentKind, SyntheticContent, SyntheticFileTable};
pub use workers::{WorkerPool, DEFAULT_WORKERS};
