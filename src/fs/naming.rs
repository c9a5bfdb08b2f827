//! Naming-service clients
//!
//! The naming service turns a locker name into an ordered list of
//! candidate locations. Each candidate can be checked independently for
//! whether it is usable right now. Everything behind [`NamingService`] is
//! opaque to the engine; this module also ships two simple clients:
//!
//! - [`StaticNamingService`]: a fixed table, usually from the config file.
//! - [`CommandNamingService`]: runs a helper program per lookup.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::LookupError;

/// One ranked answer from the naming service
pub trait Candidate: Send + Sync {
    /// Target the symlink would point at
    fn location(&self) -> &str;

    /// Whether the location is reachable right now
    fn attachable(&self) -> bool;
}

/// Resolves locker names to ranked candidates
pub trait NamingService: Send + Sync {
    fn lookup(&self, name: &str) -> Result<Vec<Box<dyn Candidate>>, LookupError>;
}

/// Candidate that is attachable when its location exists locally
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathCandidate {
    location: String,
}

impl PathCandidate {
    pub fn new(location: impl Into<String>) -> Self {
        PathCandidate {
            location: location.into(),
        }
    }
}

impl Candidate for PathCandidate {
    fn location(&self) -> &str {
        &self.location
    }

    fn attachable(&self) -> bool {
        Path::new(&self.location).exists()
    }
}

fn path_candidates<I, S>(locations: I) -> Vec<Box<dyn Candidate>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    locations
        .into_iter()
        .map(|l| Box::new(PathCandidate::new(l)) as Box<dyn Candidate>)
        .collect()
}

// =============================================================================
// STATIC TABLE
// =============================================================================

/// Naming service backed by a fixed `name -> [locations]` table
#[derive(Clone, Debug, Default)]
pub struct StaticNamingService {
    lockers: BTreeMap<String, Vec<String>>,
}

impl StaticNamingService {
    pub fn new(lockers: BTreeMap<String, Vec<String>>) -> Self {
        StaticNamingService { lockers }
    }

    pub fn insert(&mut self, name: impl Into<String>, locations: Vec<String>) {
        self.lockers.insert(name.into(), locations);
    }
}

impl NamingService for StaticNamingService {
    fn lookup(&self, name: &str) -> Result<Vec<Box<dyn Candidate>>, LookupError> {
        match self.lockers.get(name) {
            Some(locations) => Ok(path_candidates(locations.iter().cloned())),
            None => Err(LookupError::NotFound(name.to_string())),
        }
    }
}

// =============================================================================
// EXTERNAL HELPER
// =============================================================================

/// Exit status a helper uses for "no such name"
pub const HELPER_EXIT_NOT_FOUND: i32 = 2;

/// Exit status a helper uses for "try again later" (sysexits EX_TEMPFAIL)
pub const HELPER_EXIT_UNAVAILABLE: i32 = 75;

/// Naming service that asks an external program
///
/// The program is run as `program [args..] <name>`. On success it prints
/// one candidate location per line, best first.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandNamingService {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandNamingService {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        CommandNamingService {
            program: program.into(),
            args,
        }
    }
}

impl fmt::Debug for CommandNamingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandNamingService({})", self.program.display())
    }
}

impl NamingService for CommandNamingService {
    fn lookup(&self, name: &str) -> Result<Vec<Box<dyn Candidate>>, LookupError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(name)
            .output()
            .map_err(|e| {
                LookupError::Other(format!("cannot run {}: {}", self.program.display(), e))
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        match output.status.code() {
            Some(0) => {}
            Some(HELPER_EXIT_NOT_FOUND) => return Err(LookupError::NotFound(name.to_string())),
            Some(HELPER_EXIT_UNAVAILABLE) => {
                return Err(LookupError::Unavailable(if stderr.is_empty() {
                    format!("{} is temporarily unavailable", self.program.display())
                } else {
                    stderr
                }))
            }
            _ => {
                return Err(LookupError::Other(format!(
                    "{} exited with {} for {}: {}",
                    self.program.display(),
                    output.status,
                    name,
                    stderr
                )))
            }
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(path_candidates(
            stdout.lines().map(str::trim).filter(|l| !l.is_empty()),
        ))
    }
}
