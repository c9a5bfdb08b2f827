//! Locker resolution
//!
//! Mount cache first, naming service second. A successful lookup is
//! scanned in rank order and the first attachable candidate wins; it is
//! remembered in the mount cache so the naming service is asked at most
//! once per user and name. Failures are never cached here (the negative
//! cache belongs to the caller) and never escape: they become absence
//! plus a diagnostic.

use std::sync::Arc;

use crate::diagnostics::{DiagnosticsPolicy, DiagnosticsSink, Severity};
use crate::error::LookupError;
use crate::identity::Uid;
use crate::mounts::MountCache;
use crate::naming::NamingService;

/// Why a resolution came back empty
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Unresolved {
    /// The naming service does not know the name
    NotFound,
    /// The naming service could not be reached
    Unavailable,
    /// The naming service failed some other way
    Failed,
    /// Lookup succeeded but no candidate was attachable
    Exhausted,
}

/// Where a resolved target came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    Cache,
    NamingService,
}

/// Turns a locker name into a target, from the mount cache or the naming service
pub struct Resolver {
    mounts: Arc<MountCache>,
    naming: Arc<dyn NamingService>,
    sink: Arc<dyn DiagnosticsSink>,
    policy: DiagnosticsPolicy,
}

impl Resolver {
    pub fn new(
        mounts: Arc<MountCache>,
        naming: Arc<dyn NamingService>,
        sink: Arc<dyn DiagnosticsSink>,
        policy: DiagnosticsPolicy,
    ) -> Self {
        Resolver {
            mounts,
            naming,
            sink,
            policy,
        }
    }

    /// Target for `name` as seen by `uid`, if any
    pub fn resolve(&self, uid: Uid, name: &str) -> Option<String> {
        self.resolve_detailed(uid, name).ok().map(|(target, _)| target)
    }

    /// Like [`resolve`](Self::resolve), but says why resolution failed
    pub fn resolve_detailed(&self, uid: Uid, name: &str) -> Result<(String, Source), Unresolved> {
        if let Some(target) = self.mounts.get(uid, name) {
            return Ok((target, Source::Cache));
        }

        let candidates = match self.naming.lookup(name) {
            Ok(candidates) => candidates,
            Err(err @ LookupError::NotFound(_)) => {
                if self.policy.log_unknown {
                    self.sink.emit(Severity::Notice, &err.to_string());
                }
                return Err(Unresolved::NotFound);
            }
            Err(err @ LookupError::Unavailable(_)) => {
                if self.policy.log_unavailable {
                    self.sink.emit(Severity::Notice, &err.to_string());
                }
                return Err(Unresolved::Unavailable);
            }
            Err(err @ LookupError::Other(_)) => {
                self.sink.emit(Severity::Warning, &err.to_string());
                return Err(Unresolved::Failed);
            }
        };

        let Some(chosen) = candidates.iter().find(|c| c.attachable()) else {
            self.sink.emit(
                Severity::Warning,
                &format!(
                    "Lookup succeeded for {} but no lockers could be attached.",
                    name
                ),
            );
            return Err(Unresolved::Exhausted);
        };

        let target = chosen.location().to_string();
        self.mounts.put(uid, name, &target);
        self.sink.emit(
            self.policy.success_severity(),
            &format!("Mounting {} on {} for uid {}", name, target, uid),
        );
        Ok((target, Source::NamingService))
    }

    pub fn mounts(&self) -> &Arc<MountCache> {
        &self.mounts
    }
}
