pub mod build;
pub mod cache;
pub mod config;
pub mod customise;
pub mod error;
pub mod index;
pub mod io;
pub mod project;
pub mod resolver;
pub mod signature;
pub mod sync;

pub mod reporter;

pub use build::{BuildOptions, BuildOutput, ReleaseBuilder};
pub use cache::CacheStore;
pub use config::Settings;
pub use error::{Error, Result};
pub use project::Project;
pub use reporter::{ArtifactStatus, NullReporter, Reporter};
pub use sync::{Sources, Synchronizer};

/// User Agent string for index requests
pub const USER_AGENT: &str = concat!("mdist-core/", env!("CARGO_PKG_VERSION"));
