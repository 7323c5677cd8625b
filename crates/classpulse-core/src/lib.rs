//! Core types, configuration, and error handling for classpulse.
//!
//! This crate provides the shared foundation used by all other classpulse crates:
//! - [`PulseError`]: unified error type using `thiserror`
//! - [`PulseConfig`]: configuration loaded from `.classpulse.toml`, including
//!   the semester table ([`Semester`]) with per-semester naming grammars
//! - Collaborator record shapes: [`RosterAccount`], [`RawCommit`],
//!   [`AuthorRecord`], [`PullRequest`], [`Issue`], [`Branch`], and the
//!   classroom listings [`Classroom`] and [`ClassroomAssignment`]

mod config;
mod error;
mod types;

pub use config::{PipelineConfig, PulseConfig, Semester, SemesterConfig};
pub use error::PulseError;
pub use types::{
    AuthorRecord, Branch, Classroom, ClassroomAssignment, FileDelta, Issue, PullRequest, RawCommit,
    RepoCommits, RosterAccount,
};

/// A convenience `Result` type for classpulse operations.
pub type Result<T> = std::result::Result<T, PulseError>;
