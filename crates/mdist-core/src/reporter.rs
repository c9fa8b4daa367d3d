//! Reporter trait for dependency injection
//!
//! Lets the pipeline announce phases and per-artifact outcomes without being
//! coupled to a particular terminal front end.

/// Terminal state of one artifact after lock synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStatus {
    /// The previous lock entry was still valid; no network I/O happened.
    Reused,
    /// A new entry was resolved, downloaded and verified.
    Resolved,
}

impl ArtifactStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactStatus::Reused => "reused",
            ArtifactStatus::Resolved => "resolved",
        }
    }
}

pub trait Reporter {
    /// A new pipeline phase started (e.g. "Locking", "Staging").
    fn phase(&self, title: &str);

    /// An artifact reached a terminal synchronization state.
    fn artifact(&self, name: &str, identity: &str, status: ArtifactStatus);

    /// An artifact was extracted into the staging tree.
    fn staged(&self, name: &str, identity: &str);

    /// A customisation operation is about to run.
    fn operation(&self, name: &str);
}

/// Reporter that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn phase(&self, _title: &str) {}
    fn artifact(&self, _name: &str, _identity: &str, _status: ArtifactStatus) {}
    fn staged(&self, _name: &str, _identity: &str) {}
    fn operation(&self, _name: &str) {}
}
