//! Shared test doubles
//!
//! In-memory naming service with a call counter, a diagnostics sink that
//! records everything, and a fixed uid -> name table.

#![allow(dead_code)] // Not every test binary uses every helper

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use lockerfs::{
    Candidate, DiagnosticsSink, Engine, Identity, IdentityResolver, LookupError, NamingService,
    Severity, Uid,
};

pub const ALICE: Uid = 1000;
pub const BOB: Uid = 1001;

pub fn alice() -> Identity {
    Identity::new(ALICE, 100, 4242)
}

pub fn bob() -> Identity {
    Identity::new(BOB, 100, 4343)
}

/// Candidate with a fixed attachable answer
pub struct FakeCandidate {
    pub location: String,
    pub attachable: bool,
}

impl Candidate for FakeCandidate {
    fn location(&self) -> &str {
        &self.location
    }

    fn attachable(&self) -> bool {
        self.attachable
    }
}

/// Naming service answering from a table, counting every call
#[derive(Default)]
pub struct CountingNaming {
    answers: Mutex<BTreeMap<String, Result<Vec<(String, bool)>, LookupError>>>,
    calls: AtomicUsize,
    per_name: Mutex<BTreeMap<String, usize>>,
    delay: Option<Duration>,
}

impl CountingNaming {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every lookup sleeps for `delay` first, to widen race windows
    pub fn with_delay(delay: Duration) -> Self {
        CountingNaming {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// `name` resolves to `location`, which is attachable
    pub fn locker(self, name: &str, location: &str) -> Self {
        self.answer(name, Ok(vec![(location.to_string(), true)]))
    }

    pub fn answer(self, name: &str, answer: Result<Vec<(String, bool)>, LookupError>) -> Self {
        self.answers
            .lock()
            .unwrap()
            .insert(name.to_string(), answer);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, name: &str) -> usize {
        self.per_name.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

impl NamingService for CountingNaming {
    fn lookup(&self, name: &str) -> Result<Vec<Box<dyn Candidate>>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .per_name
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default() += 1;
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }

        match self.answers.lock().unwrap().get(name) {
            Some(Ok(candidates)) => Ok(candidates
                .iter()
                .map(|(location, attachable)| {
                    Box::new(FakeCandidate {
                        location: location.clone(),
                        attachable: *attachable,
                    }) as Box<dyn Candidate>
                })
                .collect()),
            Some(Err(err)) => Err(err.clone()),
            None => Err(LookupError::NotFound(name.to_string())),
        }
    }
}

/// Sink that keeps every diagnostic
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(Severity, String)>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<(Severity, String)> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == severity)
            .count()
    }
}

impl DiagnosticsSink for RecordingSink {
    fn emit(&self, severity: Severity, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push((severity, message.to_string()));
    }
}

/// alice and bob, numeric otherwise
pub struct FixedNames;

impl IdentityResolver for FixedNames {
    fn display_name(&self, uid: Uid) -> String {
        match uid {
            ALICE => "alice".to_string(),
            BOB => "bob".to_string(),
            other => other.to_string(),
        }
    }
}

/// Engine wired to the given doubles, with a short negative window
pub fn engine_with(
    naming: Arc<CountingNaming>,
    sink: Arc<RecordingSink>,
    negative_ttl: Duration,
) -> Engine {
    Engine::builder(naming)
        .identities(Arc::new(FixedNames))
        .diagnostics(sink)
        .negative_ttl(negative_ttl)
        .legacy_attachtab(Some(".attachtab.legacy"))
        .static_file("README.txt", "Access /mit/name to attach a locker.\n")
        .build()
        .expect("valid synthetic table")
}
