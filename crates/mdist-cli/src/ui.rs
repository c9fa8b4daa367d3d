//! Plain stderr progress output.

use std::io::Write;

use mdist_core::reporter::{ArtifactStatus, Reporter};

/// Prints phases and per-artifact outcomes to stderr. Quiet mode prints
/// nothing.
#[derive(Debug, Clone, Default)]
pub struct ConsoleReporter {
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    fn line(&self, text: &str) {
        if !self.quiet {
            let _ = writeln!(std::io::stderr().lock(), "{text}");
        }
    }
}

impl Reporter for ConsoleReporter {
    fn phase(&self, title: &str) {
        self.line(&format!("==> {title}"));
    }

    fn artifact(&self, name: &str, identity: &str, status: ArtifactStatus) {
        self.line(&format!("    {name:<24} {identity:<16} {}", status.as_str()));
    }

    fn staged(&self, name: &str, identity: &str) {
        self.line(&format!("    staged {name} {identity}"));
    }

    fn operation(&self, name: &str) {
        self.line(&format!("    {name}"));
    }
}
