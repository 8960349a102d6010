//! Recording fakes for the image backend, scripts, progress and registry.

use crate::build::{BuildError, BuildFuture, ImageBackend};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::registry::{
    ImageRef, RegistryClient, RegistryCredentials, RegistryFuture, TagListing,
};
use crate::scripts::{ScriptFuture, ScriptOutput, ScriptRunner};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// A call received by [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    /// `build`.
    Build {
        /// Resolved build context.
        context: PathBuf,
        /// Image tag.
        tag: String,
    },
    /// `push`.
    Push(String),
    /// `tag`.
    Tag {
        /// Existing image.
        source: String,
        /// New alias.
        target: String,
    },
    /// `remove`.
    Remove(String),
    /// `login`.
    Login {
        /// Registry host.
        host: String,
        /// User name.
        username: String,
    },
    /// `pull`.
    Pull(String),
}

/// An [`ImageBackend`] that records calls and replays scripted failures.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<BackendCall>>,
    failures: Mutex<HashMap<String, VecDeque<String>>>,
}

impl RecordingBackend {
    /// A backend where every call succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `operation` call with the tool output `output`.
    pub fn fail_next(&self, operation: &str, output: &str) {
        self.failures
            .lock()
            .entry(operation.to_string())
            .or_default()
            .push_back(output.to_string());
    }

    /// Every call so far.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: BackendCall, operation: &str, target: &str) -> Result<(), BuildError> {
        self.calls.lock().push(call);
        let failure = self
            .failures
            .lock()
            .get_mut(operation)
            .and_then(VecDeque::pop_front);
        match failure {
            Some(output) => Err(BuildError::from_output(operation, target, &output)),
            None => Ok(()),
        }
    }
}

impl ImageBackend for RecordingBackend {
    fn build<'a>(&'a self, context: &'a Path, tag: &'a str) -> BuildFuture<'a, ()> {
        Box::pin(async move {
            self.record(
                BackendCall::Build {
                    context: context.to_path_buf(),
                    tag: tag.to_string(),
                },
                "build",
                tag,
            )
        })
    }

    fn push<'a>(&'a self, tag: &'a str) -> BuildFuture<'a, ()> {
        Box::pin(async move { self.record(BackendCall::Push(tag.to_string()), "push", tag) })
    }

    fn tag<'a>(&'a self, source: &'a str, target: &'a str) -> BuildFuture<'a, ()> {
        Box::pin(async move {
            self.record(
                BackendCall::Tag {
                    source: source.to_string(),
                    target: target.to_string(),
                },
                "tag",
                target,
            )
        })
    }

    fn remove<'a>(&'a self, tag: &'a str) -> BuildFuture<'a, ()> {
        Box::pin(async move { self.record(BackendCall::Remove(tag.to_string()), "remove", tag) })
    }

    fn login<'a>(
        &'a self,
        host: &'a str,
        username: &'a str,
        _password: &'a str,
    ) -> BuildFuture<'a, ()> {
        Box::pin(async move {
            self.record(
                BackendCall::Login {
                    host: host.to_string(),
                    username: username.to_string(),
                },
                "login",
                host,
            )
        })
    }

    fn pull<'a>(&'a self, image: &'a str) -> BuildFuture<'a, ()> {
        Box::pin(async move { self.record(BackendCall::Pull(image.to_string()), "pull", image) })
    }
}

/// A [`ScriptRunner`] that records scripts instead of running them.
#[derive(Debug, Default)]
pub struct RecordingScripts {
    runs: Mutex<Vec<(String, PathBuf)>>,
    failing: Mutex<HashSet<String>>,
    printing: Mutex<HashMap<String, String>>,
}

impl RecordingScripts {
    /// A runner where every script succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `script` exit non-zero.
    pub fn fail_on(&self, script: &str) {
        self.failing.lock().insert(script.to_string());
    }

    /// Make `script` print `stdout`.
    pub fn print_on(&self, script: &str, stdout: &str) {
        self.printing
            .lock()
            .insert(script.to_string(), stdout.to_string());
    }

    /// Scripts run so far, in order.
    pub fn scripts(&self) -> Vec<String> {
        self.runs.lock().iter().map(|(s, _)| s.clone()).collect()
    }

    /// Scripts with the directory each ran in.
    pub fn runs(&self) -> Vec<(String, PathBuf)> {
        self.runs.lock().clone()
    }
}

impl ScriptRunner for RecordingScripts {
    fn run<'a>(&'a self, script: &'a str, dir: &'a Path) -> ScriptFuture<'a> {
        Box::pin(async move {
            self.runs
                .lock()
                .push((script.to_string(), dir.to_path_buf()));
            let mut output = ScriptOutput::succeeded();
            if let Some(stdout) = self.printing.lock().get(script) {
                output.stdout = stdout.clone();
            }
            if self.failing.lock().contains(script) {
                output.success = false;
                output.status = "exit status: 1".to_string();
            }
            Ok(output)
        })
    }
}

/// A [`ProgressSink`] that keeps every event.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events emitted so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().push(event);
    }
}

/// A [`RegistryClient`] for `gcr.io` hosts that serves one fixed listing.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    listing: TagListing,
    requests: Mutex<Vec<(String, Option<String>)>>,
}

impl StaticRegistry {
    /// Serve `listing` for every repository.
    pub fn new(listing: TagListing) -> Self {
        Self {
            listing,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Repository names queried, with the user name sent for each.
    pub fn requests(&self) -> Vec<(String, Option<String>)> {
        self.requests.lock().clone()
    }
}

impl RegistryClient for StaticRegistry {
    fn supports(&self, image: &ImageRef) -> bool {
        image.registry == "gcr.io" || image.registry.ends_with(".gcr.io")
    }

    fn list_tags<'a>(
        &'a self,
        image: &'a ImageRef,
        credentials: Option<&'a RegistryCredentials>,
    ) -> RegistryFuture<'a, TagListing> {
        Box::pin(async move {
            self.requests
                .lock()
                .push((image.name(), credentials.map(|c| c.username.clone())));
            Ok(self.listing.clone())
        })
    }
}
