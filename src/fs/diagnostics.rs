//! Diagnostics sink for resolution outcomes
//!
//! The resolver reports what happened to each lookup as a
//! `(Severity, message)` pair. [`LogSink`] forwards them to the `log`
//! facade; tests plug in their own sink to assert on them.

use std::fmt;

/// Diagnostic severity, in increasing order
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Notice,
    Warning,
}

impl Severity {
    /// `log` has no notice level, so everything shifts down one step
    pub fn log_level(self) -> log::Level {
        match self {
            Severity::Info => log::Level::Debug,
            Severity::Notice => log::Level::Info,
            Severity::Warning => log::Level::Warn,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Notice => "notice",
            Severity::Warning => "warning",
        })
    }
}

/// Receives diagnostics from the resolver
pub trait DiagnosticsSink: Send + Sync {
    fn emit(&self, severity: Severity, message: &str);
}

/// Forwards diagnostics to the `log` facade under the `lockerfs` target
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn emit(&self, severity: Severity, message: &str) {
        log::log!(target: "lockerfs", severity.log_level(), "{}", message);
    }
}

/// Which resolution outcomes get reported, and how loudly
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiagnosticsPolicy {
    /// Report names the naming service does not know
    pub log_unknown: bool,
    /// Report naming-service outages
    pub log_unavailable: bool,
    /// Raise successful resolutions from info to notice
    pub log_success: bool,
}

impl DiagnosticsPolicy {
    pub(crate) fn success_severity(&self) -> Severity {
        if self.log_success {
            Severity::Notice
        } else {
            Severity::Info
        }
    }
}

impl Default for DiagnosticsPolicy {
    fn default() -> Self {
        DiagnosticsPolicy {
            log_unknown: true,
            log_unavailable: true,
            log_success: false,
        }
    }
}
