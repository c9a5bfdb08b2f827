//! Configuration file
//!
//! A single TOML file, every key optional:
//!
//! ```toml
//! show_readme = "yes"
//! readme_filename = "README.txt"
//! show_attachtab = true
//! log_success = false
//! negative_ttl_ms = 500
//!
//! [naming]
//! kind = "static"
//!
//! [naming.lockers]
//! sipb = ["/afs/athena.mit.edu/contrib/sipb"]
//!
//! [[files]]
//! name = "motd"
//! contents = "Welcome.\n"
//! ```
//!
//! Booleans are forgiving: TOML booleans, `0`/`1`, and the strings
//! `yes/no/true/false/on/off` all work. Anything else logs a warning and
//! the option keeps its default.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::attachtab::LEGACY_ATTACHTAB_NAME;
use crate::diagnostics::DiagnosticsPolicy;
use crate::engine::{Engine, EngineBuilder};
use crate::error::{ConfigError, TableError};
use crate::naming::{CommandNamingService, NamingService, StaticNamingService};
use crate::negcache::DEFAULT_NEGATIVE_TTL;
use crate::path::is_valid_segment;

#[cfg(target_os = "macos")]
pub const DEFAULT_CONFIG_PATH: &str = "/Library/Preferences/lockerfs.toml";
#[cfg(not(target_os = "macos"))]
pub const DEFAULT_CONFIG_PATH: &str = "/etc/lockerfs/config.toml";

pub const DEFAULT_README_NAME: &str = "README.txt";

pub const DEFAULT_README: &str = "
This is the lockerfs automounter.

To access a locker, just access {mountpoint}/name.

If you're using the Finder, try pressing Cmd+Shift+G and then
entering {mountpoint}/name
";

/// A boolean as written by a human
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
enum LenientBool {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl LenientBool {
    fn value(&self) -> Option<bool> {
        match self {
            LenientBool::Bool(b) => Some(*b),
            LenientBool::Int(1) => Some(true),
            LenientBool::Int(0) => Some(false),
            LenientBool::Int(_) => None,
            LenientBool::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "yes" | "true" | "on" => Some(true),
                "0" | "no" | "false" | "off" => Some(false),
                _ => None,
            },
        }
    }
}

fn flag(option: &str, raw: &Option<LenientBool>, default: bool) -> bool {
    match raw {
        None => default,
        Some(raw) => raw.value().unwrap_or_else(|| {
            log::warn!(
                "Invalid boolean value for {} in config file; assuming {}",
                option,
                default
            );
            default
        }),
    }
}

/// The file as written, before defaults and validation
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    show_readme: Option<LenientBool>,
    readme_filename: Option<String>,
    readme_contents: Option<String>,
    show_attachtab: Option<LenientBool>,
    show_legacy_attachtab: Option<LenientBool>,
    legacy_attachtab_filename: Option<String>,
    #[serde(alias = "syslog_unknown")]
    log_unknown: Option<LenientBool>,
    #[serde(alias = "syslog_unavail", alias = "syslog_unavailable")]
    log_unavailable: Option<LenientBool>,
    #[serde(alias = "syslog_success")]
    log_success: Option<LenientBool>,
    negative_ttl_ms: Option<u64>,
    naming: NamingConfig,
    files: Vec<FileConfig>,
}

/// `[naming]` table
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub kind: String,
    /// For `kind = "static"`
    pub lockers: BTreeMap<String, Vec<String>>,
    /// For `kind = "command"`
    #[serde(alias = "program")]
    pub command: Option<PathBuf>,
    pub args: Vec<String>,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            kind: "static".to_string(),
            lockers: BTreeMap::new(),
            command: None,
            args: Vec::new(),
        }
    }
}

/// One `[[files]]` entry
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub name: String,
    pub kind: String,
    pub contents: String,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: "static".to_string(),
            contents: String::new(),
        }
    }
}

/// Validated settings with every default applied
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Readme file name; `None` when the readme is off
    pub readme: Option<String>,
    /// Readme template, `{mountpoint}` not yet substituted
    pub readme_contents: String,
    pub show_attachtab: bool,
    pub legacy_attachtab: Option<String>,
    pub policy: DiagnosticsPolicy,
    pub negative_ttl: Duration,
    pub naming: NamingConfig,
    pub files: Vec<FileConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_file(ConfigFile::default())
    }
}

impl Settings {
    /// Load `path`; a file that does not exist yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        Ok(Self::from_file(toml::from_str(text)?))
    }

    fn from_file(file: ConfigFile) -> Self {
        let defaults = DiagnosticsPolicy::default();

        let mut show_readme = flag("show_readme", &file.show_readme, false);
        let readme_name = file
            .readme_filename
            .unwrap_or_else(|| DEFAULT_README_NAME.to_string());
        if show_readme && !is_valid_segment(&readme_name) {
            log::warn!("Invalid value for 'readme_filename' in config file, disabling readme file");
            show_readme = false;
        }

        let legacy = flag("show_legacy_attachtab", &file.show_legacy_attachtab, false).then(|| {
            file.legacy_attachtab_filename
                .unwrap_or_else(|| LEGACY_ATTACHTAB_NAME.to_string())
        });

        Settings {
            readme: show_readme.then_some(readme_name),
            readme_contents: file
                .readme_contents
                .unwrap_or_else(|| DEFAULT_README.to_string()),
            show_attachtab: flag("show_attachtab", &file.show_attachtab, true),
            legacy_attachtab: legacy,
            policy: DiagnosticsPolicy {
                log_unknown: flag("log_unknown", &file.log_unknown, defaults.log_unknown),
                log_unavailable: flag(
                    "log_unavailable",
                    &file.log_unavailable,
                    defaults.log_unavailable,
                ),
                log_success: flag("log_success", &file.log_success, defaults.log_success),
            },
            negative_ttl: file
                .negative_ttl_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_NEGATIVE_TTL),
            naming: file.naming,
            files: file.files,
        }
    }

    /// Readme text for a filesystem mounted at `mountpoint`
    pub fn render_readme(&self, mountpoint: &Path) -> String {
        let mut text = self
            .readme_contents
            .replace("{mountpoint}", &mountpoint.to_string_lossy());
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text
    }

    /// Build the configured naming-service client
    pub fn naming_service(&self) -> Result<Arc<dyn NamingService>, ConfigError> {
        match self.naming.kind.as_str() {
            "static" => Ok(Arc::new(StaticNamingService::new(self.naming.lockers.clone()))),
            "command" => {
                let program = self.naming.command.clone().ok_or_else(|| {
                    ConfigError::Naming("kind = \"command\" needs a `command`".to_string())
                })?;
                Ok(Arc::new(CommandNamingService::new(
                    program,
                    self.naming.args.clone(),
                )))
            }
            other => Err(ConfigError::Naming(format!("unknown naming kind {:?}", other))),
        }
    }

    /// An engine builder carrying everything this configuration says
    pub fn engine_builder(
        &self,
        naming: Arc<dyn NamingService>,
        mountpoint: &Path,
    ) -> Result<EngineBuilder, TableError> {
        let mut builder = Engine::builder(naming)
            .policy(self.policy)
            .negative_ttl(self.negative_ttl)
            .attachtab(self.show_attachtab.then_some(crate::attachtab::ATTACHTAB_NAME))
            .legacy_attachtab(self.legacy_attachtab.as_deref());

        if let Some(name) = &self.readme {
            builder = builder.static_file(name, self.render_readme(mountpoint));
        }
        for file in &self.files {
            builder = builder.file_of_kind(&file.name, &file.kind, &file.contents)?;
        }
        Ok(builder)
    }
}
