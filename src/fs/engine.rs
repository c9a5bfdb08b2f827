//! The resolution-and-caching engine
//!
//! [`Engine`] owns the per-user mount and negative caches, the synthetic
//! file table and the resolver, and answers the seven callbacks of
//! [`VirtualFilesystem`]. It is path-based and transport-agnostic: the
//! FUSE shim maps inodes to paths and forwards here, tests call it
//! directly.
//!
//! # Consistency
//!
//! Every sequence that reads and then writes the caches for one
//! `(uid, name)` pair runs inside that pair's critical section (see
//! [`KeyedLocks`]):
//!
//! - attribute / link-target query: check negative cache, resolve, populate
//! - create-link: store mapping, clear negative entry
//! - remove-link: drop mapping, add negative entry
//!
//! So a remove followed by a query from the same user always observes the
//! removal until the negative entry expires or a new link replaces it.
//! The naming-service call happens inside the section, which also means
//! concurrent first lookups of one name by one user cost a single call.
//! Other names and other users are unaffected.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::attachtab::{self, Style, ATTACHTAB_NAME};
use crate::diagnostics::{DiagnosticsPolicy, DiagnosticsSink, LogSink};
use crate::error::{FsError, FsResult, TableError};
use crate::identity::{Identity, IdentityResolver, PasswdResolver, Uid};
use crate::locks::KeyedLocks;
use crate::mounts::MountCache;
use crate::naming::NamingService;
use crate::negcache::{NegativeCache, DEFAULT_NEGATIVE_TTL};
use crate::path::{root_child, PathClass};
use crate::resolver::Resolver;
use crate::synthetic::{slice_range, ContentKind, SyntheticContent, SyntheticFileTable};

/// File type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    /// Directory
    Directory,
    /// Regular file
    RegularFile,
    /// Symbolic link
    Symlink,
}

/// Attributes of a path as seen by one caller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stat {
    pub kind: FileKind,
    /// Permission bits (mode & 0o7777)
    pub perm: u16,
    pub nlink: u32,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    /// Used for atime, mtime and ctime alike
    pub time: SystemTime,
}

/// One root directory entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileKind,
}

impl DirEntry {
    fn new(name: impl Into<String>, kind: FileKind) -> Self {
        DirEntry {
            name: name.into(),
            kind,
        }
    }
}

/// The callback surface a filesystem transport drives
///
/// Paths are absolute within the mount (`/`, `/name`). The caller's
/// identity is passed explicitly on every call.
pub trait VirtualFilesystem: Send + Sync {
    /// Attribute query
    fn getattr(&self, who: &Identity, path: &str) -> FsResult<Stat>;

    /// Directory listing (the root is the only directory)
    fn readdir(&self, who: &Identity, path: &str) -> FsResult<Vec<DirEntry>>;

    /// Link-target query
    fn readlink(&self, who: &Identity, path: &str) -> FsResult<String>;

    /// Open for reading; `flags` are the raw open(2) flags
    fn open(&self, who: &Identity, path: &str, flags: i32) -> FsResult<()>;

    /// Read `size` bytes at `offset`; short or empty at end of file
    fn read(&self, who: &Identity, path: &str, offset: u64, size: u32) -> FsResult<Vec<u8>>;

    /// Create-link: make `path` point at `target` for this caller
    fn symlink(&self, who: &Identity, target: &str, path: &str) -> FsResult<()>;

    /// Remove-link
    fn unlink(&self, who: &Identity, path: &str) -> FsResult<()>;
}

/// The locker directory: classifies each path and serves it from the
/// synthetic table, the per-user caches or the resolver
pub struct Engine {
    synthetic: SyntheticFileTable,
    mounts: Arc<MountCache>,
    negative: NegativeCache,
    resolver: Resolver,
    locks: KeyedLocks,
    identities: Arc<dyn IdentityResolver>,
    started: SystemTime,
}

impl Engine {
    pub fn builder(naming: Arc<dyn NamingService>) -> EngineBuilder {
        EngineBuilder::new(naming)
    }

    pub fn classify<'a>(&self, path: &'a str) -> PathClass<'a> {
        PathClass::of(path, &self.synthetic)
    }

    /// Target of `name` for `uid`, honoring the negative cache
    fn lookup_link(&self, uid: Uid, name: &str) -> FsResult<String> {
        self.locks.with_key(uid, name, || {
            if self.negative.contains(uid, name) {
                return Err(FsError::not_found(root_child(name)));
            }
            self.resolver
                .resolve(uid, name)
                .ok_or_else(|| FsError::not_found(root_child(name)))
        })
    }

    fn synthetic_bytes(&self, name: &str) -> FsResult<Vec<u8>> {
        self.synthetic
            .read(name)
            .ok_or_else(|| FsError::not_found(root_child(name)))
    }

    fn stat(&self, kind: FileKind, perm: u16, nlink: u32, size: u64, uid: u32, gid: u32) -> Stat {
        Stat {
            kind,
            perm,
            nlink,
            size,
            uid,
            gid,
            time: self.started,
        }
    }

    /// Attributes of a locker symlink owned by the caller
    pub fn link_stat(&self, who: &Identity, target: &str) -> Stat {
        self.stat(
            FileKind::Symlink,
            0o777,
            1,
            target.len() as u64,
            who.uid,
            who.gid,
        )
    }

    /// Render the attach table on demand (also what `.attachtab` serves)
    pub fn attach_table(&self, style: Style) -> String {
        attachtab::report(&self.mounts, self.identities.as_ref(), style)
    }

    pub fn mounts(&self) -> &Arc<MountCache> {
        &self.mounts
    }

    pub fn negative(&self) -> &NegativeCache {
        &self.negative
    }

    pub fn synthetic(&self) -> &SyntheticFileTable {
        &self.synthetic
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }
}

impl VirtualFilesystem for Engine {
    fn getattr(&self, who: &Identity, path: &str) -> FsResult<Stat> {
        match self.classify(path) {
            PathClass::Root => Ok(self.stat(FileKind::Directory, 0o755, 2, 0, 0, who.gid)),
            PathClass::Synthetic(name) => {
                let size = self.synthetic_bytes(name)?.len() as u64;
                Ok(self.stat(FileKind::RegularFile, 0o444, 1, size, 0, 0))
            }
            PathClass::Candidate(name) => {
                let target = self.lookup_link(who.uid, name)?;
                Ok(self.link_stat(who, &target))
            }
            PathClass::Hidden(_) | PathClass::Invalid => Err(FsError::not_found(path)),
        }
    }

    fn readdir(&self, who: &Identity, path: &str) -> FsResult<Vec<DirEntry>> {
        if self.classify(path) != PathClass::Root {
            return Err(FsError::not_found(path));
        }

        let mut entries = vec![
            DirEntry::new(".", FileKind::Directory),
            DirEntry::new("..", FileKind::Directory),
        ];
        entries.extend(
            self.synthetic
                .list()
                .map(|name| DirEntry::new(name, FileKind::RegularFile)),
        );
        entries.extend(
            self.mounts
                .names_for(who.uid)
                .into_iter()
                .map(|name| DirEntry::new(name, FileKind::Symlink)),
        );
        Ok(entries)
    }

    fn readlink(&self, who: &Identity, path: &str) -> FsResult<String> {
        match self.classify(path) {
            PathClass::Candidate(name) => self.lookup_link(who.uid, name),
            PathClass::Root | PathClass::Synthetic(_) => Err(FsError::NotASymlink(path.to_string())),
            PathClass::Hidden(_) | PathClass::Invalid => Err(FsError::not_found(path)),
        }
    }

    fn open(&self, _who: &Identity, path: &str, flags: i32) -> FsResult<()> {
        match self.classify(path) {
            PathClass::Synthetic(_) => {
                if flags & libc::O_ACCMODE != libc::O_RDONLY {
                    return Err(FsError::access_denied(path));
                }
                Ok(())
            }
            _ => Err(FsError::not_found(path)),
        }
    }

    fn read(&self, _who: &Identity, path: &str, offset: u64, size: u32) -> FsResult<Vec<u8>> {
        match self.classify(path) {
            PathClass::Synthetic(name) => Ok(slice_range(&self.synthetic_bytes(name)?, offset, size)),
            _ => Err(FsError::not_found(path)),
        }
    }

    fn symlink(&self, who: &Identity, target: &str, path: &str) -> FsResult<()> {
        let Some(name) = self.classify(path).link_name() else {
            return Err(FsError::permission_denied(path));
        };
        self.locks.with_key(who.uid, name, || {
            self.mounts.put(who.uid, name, target);
            self.negative.remove(who.uid, name);
        });
        log::debug!("uid {} linked {} -> {}", who.uid, name, target);
        Ok(())
    }

    fn unlink(&self, who: &Identity, path: &str) -> FsResult<()> {
        let Some(name) = self.classify(path).link_name() else {
            return Err(FsError::permission_denied(path));
        };
        self.locks.with_key(who.uid, name, || {
            match self.mounts.remove(who.uid, name) {
                Some(_) => {
                    self.negative.add(who.uid, name);
                    Ok(())
                }
                None => Err(FsError::not_found(path)),
            }
        })?;
        log::debug!("uid {} unlinked {}", who.uid, name);
        Ok(())
    }
}

// =============================================================================
// BUILDER
// =============================================================================

enum FileSource {
    Content(SyntheticContent),
    Report(Style),
}

/// Assembles an [`Engine`]; the synthetic table is validated in `build`
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use lockerfs::{Engine, StaticNamingService};
///
/// let engine = Engine::builder(Arc::new(StaticNamingService::default()))
///     .static_file("README.txt", "Access /mnt/name to attach a locker.\n")
///     .build()
///     .unwrap();
///
/// assert!(engine.synthetic().contains(".attachtab"));
/// assert!(engine.synthetic().contains("README.txt"));
/// ```
pub struct EngineBuilder {
    naming: Arc<dyn NamingService>,
    identities: Arc<dyn IdentityResolver>,
    sink: Arc<dyn DiagnosticsSink>,
    policy: DiagnosticsPolicy,
    negative_ttl: Duration,
    attachtab: Option<String>,
    legacy_attachtab: Option<String>,
    files: Vec<(String, FileSource)>,
}

impl EngineBuilder {
    pub fn new(naming: Arc<dyn NamingService>) -> Self {
        EngineBuilder {
            naming,
            identities: Arc::new(PasswdResolver),
            sink: Arc::new(LogSink),
            policy: DiagnosticsPolicy::default(),
            negative_ttl: DEFAULT_NEGATIVE_TTL,
            attachtab: Some(ATTACHTAB_NAME.to_string()),
            legacy_attachtab: None,
            files: Vec::new(),
        }
    }

    pub fn identities(mut self, identities: Arc<dyn IdentityResolver>) -> Self {
        self.identities = identities;
        self
    }

    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn policy(mut self, policy: DiagnosticsPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn negative_ttl(mut self, ttl: Duration) -> Self {
        self.negative_ttl = ttl;
        self
    }

    /// Name of the plain attach table, or `None` to leave it out
    pub fn attachtab(mut self, name: Option<&str>) -> Self {
        self.attachtab = name.map(str::to_string);
        self
    }

    /// Name of the legacy attach table, or `None` (the default) to leave it out
    pub fn legacy_attachtab(mut self, name: Option<&str>) -> Self {
        self.legacy_attachtab = name.map(str::to_string);
        self
    }

    pub fn static_file(mut self, name: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.files
            .push((name.to_string(), FileSource::Content(SyntheticContent::fixed(contents))));
        self
    }

    pub fn generated_file<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn() -> Vec<u8> + Send + Sync + 'static,
    {
        self.files
            .push((name.to_string(), FileSource::Content(SyntheticContent::generated(f))));
        self
    }

    /// Add a file whose content type was named in configuration
    pub fn file_of_kind(self, name: &str, kind: &str, contents: &str) -> Result<Self, TableError> {
        Ok(match ContentKind::parse(name, kind)? {
            ContentKind::Static => self.static_file(name, contents),
            ContentKind::AttachTab => self.report_file(name, Style::Plain),
            ContentKind::LegacyAttachTab => self.report_file(name, Style::Legacy),
        })
    }

    fn report_file(mut self, name: &str, style: Style) -> Self {
        self.files.push((name.to_string(), FileSource::Report(style)));
        self
    }

    pub fn build(self) -> Result<Engine, TableError> {
        let mounts = Arc::new(MountCache::new());

        let mut sources = Vec::new();
        if let Some(name) = self.attachtab {
            sources.push((name, FileSource::Report(Style::Plain)));
        }
        if let Some(name) = self.legacy_attachtab {
            sources.push((name, FileSource::Report(Style::Legacy)));
        }
        sources.extend(self.files);

        let mut synthetic = SyntheticFileTable::new();
        for (name, source) in sources {
            let content = match source {
                FileSource::Content(content) => content,
                FileSource::Report(style) => {
                    attachtab::generator(mounts.clone(), self.identities.clone(), style)
                }
            };
            synthetic.register(&name, content)?;
        }

        let resolver = Resolver::new(mounts.clone(), self.naming, self.sink, self.policy);

        Ok(Engine {
            synthetic,
            mounts,
            negative: NegativeCache::new(self.negative_ttl),
            resolver,
            locks: KeyedLocks::new(),
            identities: self.identities,
            started: SystemTime::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::NumericResolver;
    use crate::naming::StaticNamingService;

    fn who(uid: Uid) -> Identity {
        Identity::new(uid, 100, 1)
    }

    fn engine() -> Engine {
        let mut naming = StaticNamingService::default();
        let tmp = std::env::temp_dir().to_string_lossy().into_owned();
        naming.insert("tmp", vec![tmp]);
        Engine::builder(Arc::new(naming))
            .identities(Arc::new(NumericResolver))
            .static_file("README.txt", "hello\n")
            .build()
            .unwrap()
    }

    #[test]
    fn test_root_attrs() {
        let e = engine();
        let st = e.getattr(&who(1000), "/").unwrap();
        assert_eq!(st.kind, FileKind::Directory);
        assert_eq!(st.perm, 0o755);
        assert_eq!(st.nlink, 2);
        assert_eq!(st.gid, 100);
    }

    #[test]
    fn test_synthetic_attrs_track_content() {
        let e = engine();
        let st = e.getattr(&who(1000), "/README.txt").unwrap();
        assert_eq!(st.kind, FileKind::RegularFile);
        assert_eq!(st.perm, 0o444);
        assert_eq!(st.size, 6);

        assert_eq!(e.getattr(&who(1000), "/.attachtab").unwrap().size, 0);
        e.symlink(&who(1000), "/x", "/x").unwrap();
        assert!(e.getattr(&who(1000), "/.attachtab").unwrap().size > 0);
    }

    #[test]
    fn test_symlink_attrs_owned_by_caller() {
        let e = engine();
        let st = e.getattr(&who(1234), "/tmp").unwrap();
        assert_eq!(st.kind, FileKind::Symlink);
        assert_eq!(st.uid, 1234);
        assert_eq!(st.perm, 0o777);
        let target = e.readlink(&who(1234), "/tmp").unwrap();
        assert_eq!(st.size, target.len() as u64);
    }

    #[test]
    fn test_link_stat_matches_getattr() {
        let e = engine();
        let target = e.readlink(&who(7), "/tmp").unwrap();
        assert_eq!(e.link_stat(&who(7), &target), e.getattr(&who(7), "/tmp").unwrap());
    }

    #[test]
    fn test_hidden_and_nested_not_found() {
        let e = engine();
        assert_eq!(
            e.getattr(&who(1), "/.Trash"),
            Err(FsError::not_found("/.Trash"))
        );
        assert_eq!(e.getattr(&who(1), "/tmp/x"), Err(FsError::not_found("/tmp/x")));
    }

    #[test]
    fn test_readdir_lists_only_callers_links() {
        let e = engine();
        e.symlink(&who(1000), "/afs/a", "/a").unwrap();
        e.symlink(&who(1001), "/afs/b", "/b").unwrap();

        let names: Vec<_> = e
            .readdir(&who(1000), "/")
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec![".", "..", ".attachtab", "README.txt", "a"]);
        assert!(e.readdir(&who(1000), "/a").is_err());
    }

    #[test]
    fn test_readlink_on_non_links() {
        let e = engine();
        assert!(matches!(e.readlink(&who(1), "/"), Err(FsError::NotASymlink(_))));
        assert!(matches!(
            e.readlink(&who(1), "/README.txt"),
            Err(FsError::NotASymlink(_))
        ));
        assert!(matches!(e.readlink(&who(1), "/.x"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn test_open_modes() {
        let e = engine();
        assert!(e.open(&who(1), "/README.txt", libc::O_RDONLY).is_ok());
        assert_eq!(
            e.open(&who(1), "/README.txt", libc::O_WRONLY),
            Err(FsError::access_denied("/README.txt"))
        );
        assert_eq!(
            e.open(&who(1), "/README.txt", libc::O_RDWR | libc::O_APPEND),
            Err(FsError::access_denied("/README.txt"))
        );
        assert_eq!(e.open(&who(1), "/tmp", libc::O_RDONLY), Err(FsError::not_found("/tmp")));
    }

    #[test]
    fn test_link_rejections() {
        let e = engine();
        for path in ["/", "/README.txt", "/.attachtab", "/a/b"] {
            assert_eq!(
                e.symlink(&who(1), "/t", path),
                Err(FsError::permission_denied(path))
            );
            assert_eq!(e.unlink(&who(1), path), Err(FsError::permission_denied(path)));
        }
    }

    #[test]
    fn test_unlink_unknown_is_not_found() {
        let e = engine();
        assert_eq!(e.unlink(&who(1), "/nope"), Err(FsError::not_found("/nope")));
        assert!(!e.negative().contains(1, "nope"));
    }

    #[test]
    fn test_builder_rejects_bad_names() {
        let naming = Arc::new(StaticNamingService::default());
        let err = Engine::builder(naming.clone())
            .static_file("..", "x")
            .build()
            .err();
        assert_eq!(err, Some(TableError::InvalidName("..".into())));

        let err = Engine::builder(naming.clone())
            .file_of_kind("motd", "device", "")
            .err();
        assert!(matches!(err, Some(TableError::InvalidContentType { .. })));

        let err = Engine::builder(naming)
            .static_file(".attachtab", "shadow")
            .build()
            .err();
        assert_eq!(err, Some(TableError::DuplicateName(".attachtab".into())));
    }

    #[test]
    fn test_builder_optional_reports() {
        let naming = Arc::new(StaticNamingService::default());
        let e = Engine::builder(naming)
            .attachtab(None)
            .legacy_attachtab(Some(".attachtab.legacy"))
            .build()
            .unwrap();
        assert!(!e.synthetic().contains(".attachtab"));
        assert!(e.synthetic().contains(".attachtab.legacy"));
    }
}
