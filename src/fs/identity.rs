//! Caller identity and user-name resolution

use std::ffi::CStr;

/// User id type (matches the kernel's `uid_t`)
pub type Uid = u32;

/// Who issued a filesystem request
///
/// Supplied by the transport on every call and threaded explicitly
/// through the engine. Only the uid outlives the call, as a cache key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Identity {
    pub uid: Uid,
    pub gid: u32,
    pub pid: u32,
}

impl Identity {
    pub fn new(uid: Uid, gid: u32, pid: u32) -> Self {
        Identity { uid, gid, pid }
    }

    /// Identity of the current process (used by the CLI's one-shot commands)
    pub fn current() -> Self {
        // SAFETY: these calls have no preconditions and cannot fail
        unsafe {
            Identity {
                uid: libc::getuid(),
                gid: libc::getgid(),
                pid: libc::getpid() as u32,
            }
        }
    }
}

#[cfg(feature = "fuse")]
impl From<&fuser::Request<'_>> for Identity {
    fn from(req: &fuser::Request<'_>) -> Self {
        Identity {
            uid: req.uid(),
            gid: req.gid(),
            pid: req.pid(),
        }
    }
}

/// Maps a uid to a display name for reports
pub trait IdentityResolver: Send + Sync {
    /// Display name for `uid`, falling back to the decimal uid
    fn display_name(&self, uid: Uid) -> String;
}

/// Resolves names through the system passwd database
#[derive(Clone, Copy, Debug, Default)]
pub struct PasswdResolver;

impl IdentityResolver for PasswdResolver {
    fn display_name(&self, uid: Uid) -> String {
        passwd_name(uid).unwrap_or_else(|| uid.to_string())
    }
}

/// Never consults the system; always renders the numeric uid
#[derive(Clone, Copy, Debug, Default)]
pub struct NumericResolver;

impl IdentityResolver for NumericResolver {
    fn display_name(&self, uid: Uid) -> String {
        uid.to_string()
    }
}

const PASSWD_BUF_START: usize = 1024;
const PASSWD_BUF_MAX: usize = 64 * 1024;

fn passwd_name(uid: Uid) -> Option<String> {
    let mut buf: Vec<libc::c_char> = vec![0; PASSWD_BUF_START];
    loop {
        // SAFETY: passwd is plain old data; getpwuid_r fills it in
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        // SAFETY: every pointer refers to live storage owned by this frame,
        // and buf.len() is the true capacity of buf
        let rc = unsafe {
            libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result)
        };

        if rc == libc::ERANGE && buf.len() < PASSWD_BUF_MAX {
            let grown = buf.len() * 2;
            buf.resize(grown, 0);
            continue;
        }
        if rc != 0 || result.is_null() || pwd.pw_name.is_null() {
            return None;
        }

        // SAFETY: on success pw_name points at a NUL-terminated string inside buf
        let name = unsafe { CStr::from_ptr(pwd.pw_name) };
        return name.to_str().ok().filter(|s| !s.is_empty()).map(str::to_owned);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_resolver() {
        assert_eq!(NumericResolver.display_name(4242), "4242");
    }

    #[test]
    fn test_passwd_root() {
        // uid 0 exists on every unix we run on; accept either root's name or
        // the numeric fallback in stripped-down containers
        let name = PasswdResolver.display_name(0);
        assert!(name == "root" || name == "0", "unexpected name {name}");
    }

    #[test]
    fn test_passwd_fallback_for_unknown_uid() {
        assert_eq!(PasswdResolver.display_name(4_000_000_123), "4000000123");
    }

    #[test]
    fn test_current_identity() {
        let me = Identity::current();
        assert_eq!(me.uid, unsafe { libc::getuid() });
    }
}
