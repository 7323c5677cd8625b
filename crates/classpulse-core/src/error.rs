use std::path::PathBuf;

/// Errors that can occur across the classpulse pipeline.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary crate converts to `miette` diagnostics at the boundary.
///
/// # Examples
///
/// ```
/// use classpulse_core::PulseError;
///
/// let err = PulseError::Config("unknown semester: 22fall".into());
/// assert!(err.to_string().contains("22fall"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum PulseError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Local git operation failure.
    #[error("git error: {0}")]
    Git(String),

    /// Hosting platform request or response failure.
    #[error("remote error: {0}")]
    Remote(String),

    /// Malformed record (timestamps, payload shapes).
    #[error("parse error: {0}")]
    Parse(String),

    /// One authorship email resolved to two different accounts.
    #[error("identity conflict: {email} resolved to both {first} and {second}")]
    IdentityConflict {
        /// The email observed with two accounts.
        email: String,
        /// Account id seen first.
        first: String,
        /// Account id seen later.
        second: String,
    },

    /// Snapshot store read or write failure.
    #[error("store error: {0}")]
    Store(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file or directory was not found.
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The run was interrupted before the stage finished.
    #[error("cancelled during stage '{0}'")]
    Cancelled(String),

    /// An operation exceeded its time budget.
    #[error("timed out after {secs}s: {what}")]
    Timeout {
        /// What was being waited on.
        what: String,
        /// Budget in seconds.
        secs: u64,
    },
}

impl PulseError {
    /// Whether this error must abort the whole run.
    ///
    /// Per-repository failures (git, remote, parse, timeout) are recovered
    /// by the caller; everything else is fatal.
    ///
    /// # Examples
    ///
    /// ```
    /// use classpulse_core::PulseError;
    ///
    /// assert!(!PulseError::Remote("rate limited".into()).is_fatal());
    /// assert!(PulseError::Config("no token".into()).is_fatal());
    /// ```
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PulseError::Git(_)
                | PulseError::Remote(_)
                | PulseError::Parse(_)
                | PulseError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PulseError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_error_displays_message() {
        let err = PulseError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn identity_conflict_names_both_accounts() {
        let err = PulseError::IdentityConflict {
            email: "a@x.org".into(),
            first: "U_1".into(),
            second: "U_2".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("a@x.org"));
        assert!(msg.contains("U_1"));
        assert!(msg.contains("U_2"));
        assert!(err.is_fatal());
    }

    #[test]
    fn per_repository_failures_are_not_fatal() {
        assert!(!PulseError::Git("corrupt".into()).is_fatal());
        assert!(!PulseError::Parse("bad ts".into()).is_fatal());
        assert!(!PulseError::Timeout {
            what: "pulls".into(),
            secs: 60
        }
        .is_fatal());
        assert!(PulseError::Cancelled("local".into()).is_fatal());
    }

    #[test]
    fn not_found_shows_path() {
        let err = PulseError::NotFound(PathBuf::from("/tmp/repos"));
        assert!(err.to_string().contains("/tmp/repos"));
    }
}
