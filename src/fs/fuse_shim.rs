//! FUSE shim for the locker filesystem
//!
//! Kernel integration via FUSE. The kernel speaks inodes, the engine
//! speaks paths; [`InodeTable`] bridges the two and [`LockerFs`] forwards
//! each callback to the [`Engine`] together with the caller's identity.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                     User Applications                          │
//! │                (ls, cd, ln -s, rm, readlink, ...)              │
//! └────────────────────────────────────────────────────────────────┘
//!                                  │ VFS syscalls
//!                                  ▼
//! ┌────────────────────────────────────────────────────────────────┐
//! │                /dev/fuse  (fuser crate)                        │
//! └────────────────────────────────────────────────────────────────┘
//!                                  │ inode + Request{uid,gid,pid}
//!                                  ▼
//! ┌────────────────────────────────────────────────────────────────┐
//! │                    LockerFs (this module)                      │
//! │        InodeTable: ino <-> "/name"                             │
//! └────────────────────────────────────────────────────────────────┘
//!                                  │ path + Identity
//!                                  ▼
//! ┌────────────────────────────────────────────────────────────────┐
//! │   Engine: classifier, synthetic files, mount/negative caches,  │
//! │   resolver ──► naming service                                  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Threading
//!
//! fuser calls the filesystem from a single session thread. Callbacks that
//! can reach the naming service (`lookup`, `getattr`, `readlink`, `access`)
//! and the link mutations run on a [`WorkerPool`], so a slow lookup for one
//! user never holds up requests for another.
//!
//! # Feature Flag
//!
//! Mounting requires the `fuse` feature. Everything else in this module
//! (attribute mirror types, the inode table, the request helpers on
//! [`LockerFs`]) always compiles so it can be tested without `/dev/fuse`.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use rustc_hash::FxHashMap;

use crate::engine::{Engine, Stat, VirtualFilesystem};
use crate::error::{FsError, FsResult};
use crate::identity::Identity;
use crate::path::{root_child, ROOT_PATH};
use crate::workers::{WorkerPool, DEFAULT_WORKERS};

pub use crate::engine::FileKind;

/// Inode number type (matches fuser's u64 inode convention)
pub type Ino = u64;

/// Root inode number (FUSE convention: inode 1 is root)
pub const ROOT_INO: Ino = 1;

/// Attribute TTL for the root and synthetic files
pub const ATTR_TTL: Duration = Duration::from_secs(1);

/// Attribute TTL for locker symlinks; their presence is per-user and
/// subject to the negative-cache window
pub const LINK_TTL: Duration = Duration::ZERO;

const BLOCK_SIZE: u32 = 4096;

/// File attributes for FUSE
///
/// This mirrors fuser::FileAttr but is always available regardless
/// of feature flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileAttr {
    /// Inode number
    pub ino: Ino,
    /// File size in bytes
    pub size: u64,
    /// Number of 512-byte blocks allocated
    pub blocks: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    /// Creation time (macOS only)
    pub crtime: SystemTime,
    pub kind: FileKind,
    /// Permissions (mode & 0o7777)
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u32,
    pub blksize: u32,
    /// Flags (macOS only)
    pub flags: u32,
}

impl FileAttr {
    pub fn from_stat(ino: Ino, stat: &Stat) -> Self {
        FileAttr {
            ino,
            size: stat.size,
            blocks: stat.size.div_ceil(512),
            atime: stat.time,
            mtime: stat.time,
            ctime: stat.time,
            crtime: stat.time,
            kind: stat.kind,
            perm: stat.perm,
            nlink: stat.nlink,
            uid: stat.uid,
            gid: stat.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    /// How long the kernel may cache this attribute
    pub fn ttl(&self) -> Duration {
        match self.kind {
            FileKind::Symlink => LINK_TTL,
            _ => ATTR_TTL,
        }
    }
}

#[cfg(feature = "fuse")]
impl From<FileAttr> for fuser::FileAttr {
    fn from(attr: FileAttr) -> Self {
        fuser::FileAttr {
            ino: attr.ino,
            size: attr.size,
            blocks: attr.blocks,
            atime: attr.atime,
            mtime: attr.mtime,
            ctime: attr.ctime,
            crtime: attr.crtime,
            kind: attr.kind.into(),
            perm: attr.perm,
            nlink: attr.nlink,
            uid: attr.uid,
            gid: attr.gid,
            rdev: attr.rdev,
            blksize: attr.blksize,
            flags: attr.flags,
        }
    }
}

#[cfg(feature = "fuse")]
impl From<FileKind> for fuser::FileType {
    fn from(kind: FileKind) -> Self {
        match kind {
            FileKind::Directory => fuser::FileType::Directory,
            FileKind::RegularFile => fuser::FileType::RegularFile,
            FileKind::Symlink => fuser::FileType::Symlink,
        }
    }
}

/// Directory entry as handed to the kernel, with its inode
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelDirEntry {
    pub ino: Ino,
    pub name: String,
    pub kind: FileKind,
}

// =============================================================================
// INODE TABLE
// =============================================================================

/// Stable inode numbers for root-level names
///
/// Every name seen gets a number on first sight and keeps it for the life
/// of the mount, whichever user asked. Lock-free reads via `ArcSwap`;
/// inserts copy the map (names are few, reads are constant).
pub struct InodeTable {
    by_ino: ArcSwap<FxHashMap<Ino, String>>,
    by_name: ArcSwap<FxHashMap<String, Ino>>,
    next_ino: AtomicU64,
}

impl InodeTable {
    pub fn new() -> Self {
        InodeTable {
            by_ino: ArcSwap::from_pointee(FxHashMap::default()),
            by_name: ArcSwap::from_pointee(FxHashMap::default()),
            next_ino: AtomicU64::new(ROOT_INO + 1),
        }
    }

    /// Inode for the root-level `name`, assigning one if needed
    pub fn ino_for(&self, name: &str) -> Ino {
        if let Some(&ino) = self.by_name.load().get(name) {
            return ino;
        }

        let fresh = self.next_ino.fetch_add(1, Ordering::Relaxed);
        let mut assigned = fresh;
        self.by_name.rcu(|current| {
            if let Some(&existing) = current.get(name) {
                assigned = existing;
                return Arc::clone(current);
            }
            assigned = fresh;
            let mut next = FxHashMap::clone(current);
            next.insert(name.to_string(), fresh);
            Arc::new(next)
        });

        if assigned == fresh {
            self.by_ino.rcu(|current| {
                let mut next = FxHashMap::clone(current);
                next.insert(fresh, name.to_string());
                next
            });
        }
        assigned
    }

    /// Inode for an absolute path (root or `/name`)
    pub fn ino_for_path(&self, path: &str) -> Ino {
        match path.strip_prefix('/') {
            Some("") | None => ROOT_INO,
            Some(name) => self.ino_for(name),
        }
    }

    /// Path the kernel means by `ino`
    pub fn path_of(&self, ino: Ino) -> Option<String> {
        if ino == ROOT_INO {
            return Some(ROOT_PATH.to_string());
        }
        self.by_ino.load().get(&ino).map(|name| root_child(name))
    }

    /// Names that have been assigned an inode
    pub fn len(&self) -> usize {
        self.by_ino.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// FILESYSTEM
// =============================================================================

/// The locker filesystem as FUSE sees it
///
/// The request helpers (`lookup_entry`, `get_attr`, ...) do all the work
/// and return [`FsResult`]; the `fuser::Filesystem` impl only translates
/// arguments and replies, handing blocking ones to [`LockerFs::dispatch`].
pub struct LockerFs {
    engine: Arc<Engine>,
    inodes: Arc<InodeTable>,
    workers: Option<Arc<WorkerPool>>,
}

impl LockerFs {
    /// Filesystem that serves every callback on the calling thread
    pub fn new(engine: Arc<Engine>) -> Self {
        LockerFs {
            engine,
            inodes: Arc::new(InodeTable::new()),
            workers: None,
        }
    }

    /// Serve blocking callbacks on `pool`
    pub fn with_workers(mut self, pool: WorkerPool) -> Self {
        self.workers = Some(Arc::new(pool));
        self
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    pub fn has_workers(&self) -> bool {
        self.workers.is_some()
    }

    /// Run `job` on the worker pool, or right here when there is none
    ///
    /// The job sees a handle sharing this filesystem's engine and inodes
    /// but not its pool, so it never waits on its own workers.
    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce(&LockerFs) + Send + 'static,
    {
        match &self.workers {
            Some(pool) => {
                let fs = LockerFs {
                    engine: Arc::clone(&self.engine),
                    inodes: Arc::clone(&self.inodes),
                    workers: None,
                };
                pool.execute(move || job(&fs));
            }
            None => job(self),
        }
    }

    fn path_of(&self, ino: Ino) -> FsResult<String> {
        self.inodes
            .path_of(ino)
            .ok_or_else(|| FsError::not_found(format!("inode {}", ino)))
    }

    /// `/name` for a child of `parent`; only the root has children
    fn child_path(&self, parent: Ino, name: &OsStr) -> FsResult<String> {
        let name = name
            .to_str()
            .ok_or_else(|| FsError::not_found(name.to_string_lossy()))?;
        if parent != ROOT_INO {
            return Err(FsError::not_found(name));
        }
        Ok(root_child(name))
    }

    fn attr_at(&self, who: &Identity, path: &str) -> FsResult<FileAttr> {
        let stat = self.engine.getattr(who, path)?;
        Ok(FileAttr::from_stat(self.inodes.ino_for_path(path), &stat))
    }

    pub fn lookup_entry(&self, who: &Identity, parent: Ino, name: &OsStr) -> FsResult<FileAttr> {
        let path = self.child_path(parent, name)?;
        self.attr_at(who, &path)
    }

    pub fn get_attr(&self, who: &Identity, ino: Ino) -> FsResult<FileAttr> {
        let path = self.path_of(ino)?;
        self.attr_at(who, &path)
    }

    pub fn read_link(&self, who: &Identity, ino: Ino) -> FsResult<String> {
        let path = self.path_of(ino)?;
        self.engine.readlink(who, &path)
    }

    pub fn open_file(&self, who: &Identity, ino: Ino, flags: i32) -> FsResult<()> {
        if ino == ROOT_INO {
            return Err(FsError::InvalidArgument("/ is a directory".to_string()));
        }
        let path = self.path_of(ino)?;
        self.engine.open(who, &path, flags)
    }

    pub fn read_data(&self, who: &Identity, ino: Ino, offset: i64, size: u32) -> FsResult<Vec<u8>> {
        let offset = u64::try_from(offset)
            .map_err(|_| FsError::InvalidArgument(format!("offset {}", offset)))?;
        let path = self.path_of(ino)?;
        self.engine.read(who, &path, offset, size)
    }

    pub fn read_dir(&self, who: &Identity, ino: Ino) -> FsResult<Vec<KernelDirEntry>> {
        let path = self.path_of(ino)?;
        let entries = self.engine.readdir(who, &path)?;
        Ok(entries
            .into_iter()
            .map(|entry| KernelDirEntry {
                ino: match entry.name.as_str() {
                    "." | ".." => ROOT_INO,
                    name => self.inodes.ino_for(name),
                },
                name: entry.name,
                kind: entry.kind,
            })
            .collect())
    }

    pub fn create_link(
        &self,
        who: &Identity,
        parent: Ino,
        name: &OsStr,
        target: &Path,
    ) -> FsResult<FileAttr> {
        let path = self.child_path(parent, name)?;
        let target = target
            .to_str()
            .ok_or_else(|| FsError::InvalidArgument(target.to_string_lossy().into_owned()))?;
        self.engine.symlink(who, target, &path)?;
        // Dotfile links are stored but never served by getattr, so the
        // reply is built from the link itself
        let stat = self.engine.link_stat(who, target);
        Ok(FileAttr::from_stat(self.inodes.ino_for_path(&path), &stat))
    }

    pub fn remove_link(&self, who: &Identity, parent: Ino, name: &OsStr) -> FsResult<()> {
        let path = self.child_path(parent, name)?;
        self.engine.unlink(who, &path)
    }

    /// access(2): existence, plus no writing to synthetic files
    pub fn check_access(&self, who: &Identity, ino: Ino, mask: i32) -> FsResult<()> {
        let attr = self.get_attr(who, ino)?;
        if attr.kind == FileKind::RegularFile && mask & libc::W_OK != 0 {
            let path = self.path_of(ino)?;
            return Err(FsError::access_denied(path));
        }
        Ok(())
    }

    /// Node count reported by statfs
    pub fn file_count(&self) -> u64 {
        (self.engine.synthetic().len() + self.engine.mounts().len()) as u64 + 1
    }
}

#[cfg(feature = "fuse")]
impl fuser::Filesystem for LockerFs {
    fn init(
        &mut self,
        _req: &fuser::Request<'_>,
        _config: &mut fuser::KernelConfig,
    ) -> Result<(), libc::c_int> {
        log::info!(
            "lockerfs initialized: {} synthetic files, {} workers",
            self.engine.synthetic().len(),
            self.workers.as_ref().map_or(0, |pool| pool.threads())
        );
        Ok(())
    }

    fn destroy(&mut self) {
        log::info!("lockerfs unmounted");
    }

    fn lookup(
        &mut self,
        req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEntry,
    ) {
        let who = Identity::from(req);
        let name = name.to_os_string();
        self.dispatch(move |fs| match fs.lookup_entry(&who, parent, &name) {
            Ok(attr) => {
                let ttl = attr.ttl();
                reply.entry(&ttl, &attr.into(), 0);
            }
            Err(err) => reply.error(err.errno()),
        });
    }

    fn getattr(
        &mut self,
        req: &fuser::Request<'_>,
        ino: u64,
        _fh: Option<u64>,
        reply: fuser::ReplyAttr,
    ) {
        let who = Identity::from(req);
        self.dispatch(move |fs| match fs.get_attr(&who, ino) {
            Ok(attr) => {
                let ttl = attr.ttl();
                reply.attr(&ttl, &attr.into());
            }
            Err(err) => reply.error(err.errno()),
        });
    }

    fn readlink(&mut self, req: &fuser::Request<'_>, ino: u64, reply: fuser::ReplyData) {
        let who = Identity::from(req);
        self.dispatch(move |fs| match fs.read_link(&who, ino) {
            Ok(target) => reply.data(target.as_bytes()),
            Err(err) => reply.error(err.errno()),
        });
    }

    fn open(&mut self, req: &fuser::Request<'_>, ino: u64, flags: i32, reply: fuser::ReplyOpen) {
        match self.open_file(&Identity::from(req), ino, flags) {
            // Stateless: every read goes back to the engine
            Ok(()) => reply.opened(0, 0),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn read(
        &mut self,
        req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyData,
    ) {
        match self.read_data(&Identity::from(req), ino, offset, size) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn release(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: fuser::ReplyEmpty,
    ) {
        reply.ok();
    }

    fn opendir(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _flags: i32,
        reply: fuser::ReplyOpen,
    ) {
        if ino == ROOT_INO {
            reply.opened(0, 0);
        } else {
            reply.error(libc::ENOTDIR);
        }
    }

    fn readdir(
        &mut self,
        req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: fuser::ReplyDirectory,
    ) {
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }

        let entries = match self.read_dir(&Identity::from(req), ino) {
            Ok(entries) => entries,
            Err(err) => {
                reply.error(err.errno());
                return;
            }
        };

        for (i, entry) in entries.into_iter().enumerate().skip(offset as usize) {
            // true means the reply buffer is full
            if reply.add(entry.ino, (i + 1) as i64, entry.kind.into(), &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        reply: fuser::ReplyEmpty,
    ) {
        reply.ok();
    }

    fn symlink(
        &mut self,
        req: &fuser::Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: fuser::ReplyEntry,
    ) {
        let who = Identity::from(req);
        let link_name = link_name.to_os_string();
        let target = target.to_path_buf();
        self.dispatch(move |fs| match fs.create_link(&who, parent, &link_name, &target) {
            Ok(attr) => {
                let ttl = attr.ttl();
                reply.entry(&ttl, &attr.into(), 0);
            }
            Err(err) => reply.error(err.errno()),
        });
    }

    fn unlink(
        &mut self,
        req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEmpty,
    ) {
        let who = Identity::from(req);
        let name = name.to_os_string();
        self.dispatch(move |fs| match fs.remove_link(&who, parent, &name) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.errno()),
        });
    }

    fn statfs(&mut self, _req: &fuser::Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
        reply.statfs(
            0,                // blocks
            0,                // bfree
            0,                // bavail
            self.file_count(), // files
            0,                // ffree
            BLOCK_SIZE,       // bsize
            255,              // namelen
            BLOCK_SIZE,       // frsize
        );
    }

    fn access(&mut self, req: &fuser::Request<'_>, ino: u64, mask: i32, reply: fuser::ReplyEmpty) {
        let who = Identity::from(req);
        self.dispatch(move |fs| match fs.check_access(&who, ino, mask) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.errno()),
        });
    }
}

// =============================================================================
// MOUNT FUNCTIONS
// =============================================================================

/// Mount options for the locker filesystem
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountOptions {
    /// Let every user see the mount (default: true; lockers are per-user)
    pub allow_other: bool,
    /// Allow root to access the mount when `allow_other` is off
    pub allow_root: bool,
    /// Filesystem name shown in mount output
    pub fsname: String,
    /// Volume name shown by the Finder (macOS only)
    pub volname: Option<String>,
    /// Worker threads for blocking callbacks; 0 keeps them on the session thread
    pub workers: usize,
}

impl Default for MountOptions {
    fn default() -> Self {
        MountOptions {
            allow_other: true,
            allow_root: true,
            fsname: "lockerfs".to_string(),
            volname: None,
            workers: DEFAULT_WORKERS,
        }
    }
}

#[cfg(feature = "fuse")]
fn fuser_options(options: &MountOptions) -> Vec<fuser::MountOption> {
    use fuser::MountOption;

    // No DefaultPermissions: the root is owned by root, yet any user may
    // create links in it.
    let mut mount_options = vec![
        MountOption::FSName(options.fsname.clone()),
        MountOption::AutoUnmount,
    ];

    if options.allow_other {
        mount_options.push(MountOption::AllowOther);
    } else if options.allow_root {
        mount_options.push(MountOption::AllowRoot);
    }

    if cfg!(target_os = "macos") {
        // Keep the Finder from writing ._ files and xattrs into the root
        mount_options.push(MountOption::CUSTOM("noappledouble".to_string()));
        mount_options.push(MountOption::CUSTOM("noapplexattr".to_string()));
        if let Some(volname) = &options.volname {
            mount_options.push(MountOption::CUSTOM(format!("volname={}", volname)));
        }
    }

    mount_options
}

/// Give `fs` a worker pool unless it has one or `options` asks for none
pub fn with_pool(fs: LockerFs, options: &MountOptions) -> std::io::Result<LockerFs> {
    if fs.has_workers() || options.workers == 0 {
        return Ok(fs);
    }
    Ok(fs.with_workers(WorkerPool::new(options.workers)?))
}

/// Mount at `mountpoint`, blocking until unmounted
///
/// Use [`spawn_mount`] for a non-blocking version.
#[cfg(feature = "fuse")]
pub fn mount<P: AsRef<Path>>(
    fs: LockerFs,
    mountpoint: P,
    options: MountOptions,
) -> Result<(), std::io::Error> {
    log::info!("mounting lockerfs at {}", mountpoint.as_ref().display());
    let fs = with_pool(fs, &options)?;
    fuser::mount2(fs, mountpoint.as_ref(), &fuser_options(&options))
}

/// Mount in a background thread
///
/// Returns a `BackgroundSession` that unmounts when dropped.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use lockerfs::{Engine, LockerFs, MountOptions, StaticNamingService, spawn_mount};
///
/// let engine = Engine::builder(Arc::new(StaticNamingService::default())).build().unwrap();
/// let session = spawn_mount(LockerFs::new(Arc::new(engine)), "/mnt/lockers", MountOptions::default()).unwrap();
/// // mounted until `session` is dropped
/// ```
#[cfg(feature = "fuse")]
pub fn spawn_mount<P: AsRef<Path>>(
    fs: LockerFs,
    mountpoint: P,
    options: MountOptions,
) -> Result<fuser::BackgroundSession, std::io::Error> {
    log::info!("mounting lockerfs at {}", mountpoint.as_ref().display());
    let fs = with_pool(fs, &options)?;
    fuser::spawn_mount2(fs, mountpoint.as_ref(), &fuser_options(&options))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LookupError;
    use crate::identity::NumericResolver;
    use crate::naming::{Candidate, NamingService, PathCandidate, StaticNamingService};
    use std::ffi::OsStr;
    use std::sync::mpsc;

    fn who(uid: u32) -> Identity {
        Identity::new(uid, uid, 1)
    }

    fn fs() -> LockerFs {
        let mut naming = StaticNamingService::default();
        naming.insert("tmp", vec![std::env::temp_dir().to_string_lossy().into_owned()]);
        let engine = Engine::builder(Arc::new(naming))
            .identities(Arc::new(NumericResolver))
            .static_file("README.txt", "0123456789")
            .build()
            .unwrap();
        LockerFs::new(Arc::new(engine))
    }

    #[test]
    fn test_inode_table_is_stable() {
        let table = InodeTable::new();
        let a = table.ino_for("a");
        let b = table.ino_for("b");
        assert_ne!(a, b);
        assert_ne!(a, ROOT_INO);
        assert_eq!(table.ino_for("a"), a);
        assert_eq!(table.ino_for_path("/b"), b);
        assert_eq!(table.ino_for_path("/"), ROOT_INO);
        assert_eq!(table.path_of(a).as_deref(), Some("/a"));
        assert_eq!(table.path_of(ROOT_INO).as_deref(), Some("/"));
        assert_eq!(table.path_of(999), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_inode_table_concurrent_first_sight() {
        let table = Arc::new(InodeTable::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                std::thread::spawn(move || table.ino_for("sipb"))
            })
            .collect();
        let inos: Vec<Ino> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(inos.iter().all(|&ino| ino == inos[0]));
        assert_eq!(table.path_of(inos[0]).as_deref(), Some("/sipb"));
    }

    #[test]
    fn test_lookup_and_ttls() {
        let fs = fs();
        let root = fs.get_attr(&who(1000), ROOT_INO).unwrap();
        assert_eq!(root.kind, FileKind::Directory);
        assert_eq!(root.ttl(), ATTR_TTL);

        let readme = fs
            .lookup_entry(&who(1000), ROOT_INO, OsStr::new("README.txt"))
            .unwrap();
        assert_eq!(readme.size, 10);
        assert_eq!(readme.ttl(), ATTR_TTL);

        let link = fs.lookup_entry(&who(1000), ROOT_INO, OsStr::new("tmp")).unwrap();
        assert_eq!(link.kind, FileKind::Symlink);
        assert_eq!(link.uid, 1000);
        assert_eq!(link.ttl(), Duration::ZERO);
        assert_eq!(fs.get_attr(&who(1000), link.ino).unwrap().ino, link.ino);
    }

    #[test]
    fn test_lookup_under_non_root_parent() {
        let fs = fs();
        let link = fs.lookup_entry(&who(1), ROOT_INO, OsStr::new("tmp")).unwrap();
        assert_eq!(
            fs.lookup_entry(&who(1), link.ino, OsStr::new("x")).unwrap_err().errno(),
            libc::ENOENT
        );
    }

    #[test]
    fn test_read_data() {
        let fs = fs();
        let ino = fs
            .lookup_entry(&who(1), ROOT_INO, OsStr::new("README.txt"))
            .unwrap()
            .ino;
        assert_eq!(fs.read_data(&who(1), ino, 2, 3).unwrap(), b"234");
        assert_eq!(fs.read_data(&who(1), ino, 8, 100).unwrap(), b"89");
        assert!(fs.read_data(&who(1), ino, 50, 10).unwrap().is_empty());
        assert_eq!(fs.read_data(&who(1), ino, -1, 10).unwrap_err().errno(), libc::EINVAL);
    }

    #[test]
    fn test_link_lifecycle_through_inodes() {
        let fs = fs();
        let attr = fs
            .create_link(&who(1000), ROOT_INO, OsStr::new("x"), Path::new("/afs/x"))
            .unwrap();
        assert_eq!(attr.kind, FileKind::Symlink);
        assert_eq!(attr.size, 6);
        assert_eq!(fs.read_link(&who(1000), attr.ino).unwrap(), "/afs/x");

        let names: Vec<_> = fs
            .read_dir(&who(1000), ROOT_INO)
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.ino))
            .collect();
        assert!(names.contains(&("x".to_string(), attr.ino)));
        assert_eq!(names[0], (".".to_string(), ROOT_INO));

        fs.remove_link(&who(1000), ROOT_INO, OsStr::new("x")).unwrap();
        assert_eq!(fs.get_attr(&who(1000), attr.ino).unwrap_err().errno(), libc::ENOENT);
    }

    #[test]
    fn test_hidden_link_reply_matches_listing() {
        let fs = fs();
        let attr = fs
            .create_link(&who(1000), ROOT_INO, OsStr::new(".dot"), Path::new("/afs/x"))
            .unwrap();
        assert_eq!(attr.kind, FileKind::Symlink);
        assert_eq!(attr.size, 6);
        assert_eq!(attr.uid, 1000);
        assert_eq!(attr.ttl(), LINK_TTL);

        let listed: Vec<_> = fs
            .read_dir(&who(1000), ROOT_INO)
            .unwrap()
            .into_iter()
            .filter(|e| e.name == ".dot")
            .map(|e| e.ino)
            .collect();
        assert_eq!(listed, vec![attr.ino]);

        fs.remove_link(&who(1000), ROOT_INO, OsStr::new(".dot")).unwrap();
        assert!(fs.engine().mounts().get(1000, ".dot").is_none());
    }

    struct SlowNaming {
        delay: Duration,
    }

    impl NamingService for SlowNaming {
        fn lookup(&self, name: &str) -> Result<Vec<Box<dyn Candidate>>, LookupError> {
            std::thread::sleep(self.delay);
            let dir = std::env::temp_dir().to_string_lossy().into_owned();
            match name {
                "slow" => Ok(vec![Box::new(PathCandidate::new(dir)) as Box<dyn Candidate>]),
                _ => Err(LookupError::NotFound(name.to_string())),
            }
        }
    }

    #[test]
    fn test_slow_lookup_on_worker_does_not_block_dispatch() {
        let engine = Engine::builder(Arc::new(SlowNaming {
            delay: Duration::from_millis(1500),
        }))
        .identities(Arc::new(NumericResolver))
        .build()
        .unwrap();
        let fs = LockerFs::new(Arc::new(engine)).with_workers(WorkerPool::new(2).unwrap());
        fs.create_link(&who(2), ROOT_INO, OsStr::new("fast"), Path::new("/afs/fast"))
            .unwrap();

        let (slow_tx, slow_rx) = mpsc::channel();
        fs.dispatch(move |fs| {
            let _ = slow_tx.send(fs.lookup_entry(&who(1), ROOT_INO, OsStr::new("slow")));
        });

        // Returns immediately; the lookup runs on a worker
        let (fast_tx, fast_rx) = mpsc::channel();
        fs.dispatch(move |fs| {
            let _ = fast_tx.send(fs.lookup_entry(&who(2), ROOT_INO, OsStr::new("fast")));
        });

        let fast = fast_rx.recv_timeout(Duration::from_millis(1000)).unwrap();
        assert_eq!(fast.unwrap().kind, FileKind::Symlink);
        assert!(slow_rx.try_recv().is_err());

        let slow = slow_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(slow.unwrap().kind, FileKind::Symlink);
    }

    #[test]
    fn test_dispatch_without_pool_runs_inline() {
        let fs = fs();
        assert!(!fs.has_workers());
        let (tx, rx) = mpsc::channel();
        fs.dispatch(move |fs| tx.send(fs.file_count()).unwrap());
        // Already done by the time dispatch returns
        assert_eq!(rx.try_recv(), Ok(3));
    }

    #[test]
    fn test_with_pool_honors_worker_count() {
        let none = MountOptions {
            workers: 0,
            ..Default::default()
        };
        assert!(!with_pool(fs(), &none).unwrap().has_workers());
        assert!(with_pool(fs(), &MountOptions::default()).unwrap().has_workers());
    }

    #[test]
    fn test_access_and_open() {
        let fs = fs();
        let ino = fs
            .lookup_entry(&who(1), ROOT_INO, OsStr::new("README.txt"))
            .unwrap()
            .ino;
        assert!(fs.check_access(&who(1), ino, libc::R_OK).is_ok());
        assert_eq!(fs.check_access(&who(1), ino, libc::W_OK).unwrap_err().errno(), libc::EACCES);
        assert!(fs.check_access(&who(1), ROOT_INO, libc::W_OK).is_ok());
        assert_eq!(fs.open_file(&who(1), ino, libc::O_WRONLY).unwrap_err().errno(), libc::EACCES);
        assert!(fs.open_file(&who(1), ino, libc::O_RDONLY).is_ok());
    }

    #[test]
    fn test_file_count() {
        let fs = fs();
        // root + .attachtab + README.txt
        assert_eq!(fs.file_count(), 3);
        fs.create_link(&who(1), ROOT_INO, OsStr::new("a"), Path::new("/a"))
            .unwrap();
        assert_eq!(fs.file_count(), 4);
    }

    #[test]
    fn test_default_mount_options() {
        let opts = MountOptions::default();
        assert!(opts.allow_other);
        assert_eq!(opts.fsname, "lockerfs");
    }

    #[cfg(feature = "fuse")]
    #[test]
    fn test_fuser_options() {
        use fuser::MountOption;

        let options = fuser_options(&MountOptions::default());
        assert!(options.contains(&MountOption::AutoUnmount));
        assert!(options.contains(&MountOption::AllowOther));
        assert_eq!(
            options.contains(&MountOption::CUSTOM("noappledouble".to_string())),
            cfg!(target_os = "macos")
        );
        assert_eq!(
            options.contains(&MountOption::CUSTOM("noapplexattr".to_string())),
            cfg!(target_os = "macos")
        );
    }

    #[test]
    fn test_file_kind_conversion() {
        #[cfg(feature = "fuse")]
        {
            let ft: fuser::FileType = FileKind::Symlink.into();
            assert_eq!(ft, fuser::FileType::Symlink);
        }
    }
}
