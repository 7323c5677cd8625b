use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PulseError;

/// Top-level configuration loaded from `.classpulse.toml`.
///
/// # Examples
///
/// ```
/// use classpulse_core::PulseConfig;
///
/// let config = PulseConfig::default();
/// assert_eq!(config.pipeline.workers, 16);
/// assert!(config.semesters.contains_key("25spring"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseConfig {
    /// Organization that owns the team repositories.
    #[serde(default = "default_organization")]
    pub organization: String,
    /// Root of the local clones, one sub-directory per semester.
    #[serde(default = "default_repos_dir")]
    pub repos_dir: PathBuf,
    /// Directory backing the snapshot store.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    /// Access token; falls back to `GITHUB_TOKEN` / `GH_TOKEN`.
    pub github_token: Option<String>,
    /// Filtering, concurrency and charting knobs.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Semester table keyed by semester id (e.g. `"25spring"`).
    #[serde(default = "default_semesters")]
    pub semesters: BTreeMap<String, SemesterConfig>,
}

fn default_organization() -> String {
    "sustech-cs304".into()
}

fn default_repos_dir() -> PathBuf {
    PathBuf::from("./repos")
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./.classpulse")
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            organization: default_organization(),
            repos_dir: default_repos_dir(),
            store_dir: default_store_dir(),
            github_token: None,
            pipeline: PipelineConfig::default(),
            semesters: default_semesters(),
        }
    }
}

impl PulseConfig {
    /// Load and validate configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Io`] if the file cannot be read,
    /// [`PulseError::Toml`] if the content is not valid TOML, or
    /// [`PulseError::Config`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, PulseError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Toml`] if parsing fails, or
    /// [`PulseError::Config`] if validation fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use classpulse_core::PulseConfig;
    ///
    /// let toml = r#"
    /// [pipeline]
    /// workers = 4
    /// "#;
    /// let config = PulseConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.pipeline.workers, 4);
    /// assert_eq!(config.pipeline.single_file_line_limit, 2000);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, PulseError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Config`] describing the first violation.
    pub fn validate(&self) -> Result<(), PulseError> {
        let p = &self.pipeline;
        if p.workers == 0 {
            return Err(PulseError::Config("pipeline.workers must be at least 1".into()));
        }
        if p.message_length_bin_width == 0 {
            return Err(PulseError::Config(
                "pipeline.message_length_bin_width must be at least 1".into(),
            ));
        }
        offset_from_hours(p.target_utc_offset_hours)?;

        let mut windows = Vec::new();
        for key in self.semesters.keys() {
            let semester = self.semester(key)?;
            windows.push((semester.start, semester.end, semester.key));
        }
        windows.sort();
        for pair in windows.windows(2) {
            let (_, prev_end, prev_key) = &pair[0];
            let (next_start, _, next_key) = &pair[1];
            if next_start <= prev_end {
                return Err(PulseError::Config(format!(
                    "semesters '{prev_key}' and '{next_key}' overlap"
                )));
            }
        }
        Ok(())
    }

    /// Build the validated runtime view of one semester.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Config`] for an unknown key, an invalid
    /// window, or a naming pattern without a capture group.
    ///
    /// # Examples
    ///
    /// ```
    /// use classpulse_core::PulseConfig;
    ///
    /// let config = PulseConfig::default();
    /// let semester = config.semester("24spring").unwrap();
    /// assert_eq!(semester.group_name("team-project-24spring-team7").as_deref(), Some("team7"));
    /// assert!(config.semester("19fall").is_err());
    /// ```
    pub fn semester(&self, key: &str) -> Result<Semester, PulseError> {
        let cfg = self
            .semesters
            .get(key)
            .ok_or_else(|| PulseError::Config(format!("unknown semester: {key}")))?;
        Semester::from_config(key, cfg)
    }

    /// Resolve the requested semesters, or all configured ones when `keys` is empty.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Config`] if any key is unknown.
    pub fn select_semesters(&self, keys: &[String]) -> Result<Vec<Semester>, PulseError> {
        if keys.is_empty() {
            return self.semesters.keys().map(|k| self.semester(k)).collect();
        }
        keys.iter().map(|k| self.semester(k)).collect()
    }

    /// Resolve the platform token from the config or the environment.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Config`] if no token is available.
    pub fn github_token(&self) -> Result<String, PulseError> {
        if let Some(token) = self.github_token.as_ref().filter(|t| !t.is_empty()) {
            return Ok(token.clone());
        }
        std::env::var("GITHUB_TOKEN")
            .or_else(|_| std::env::var("GH_TOKEN"))
            .map_err(|_| {
                PulseError::Config(
                    "GITHUB_TOKEN not set. Set github_token in .classpulse.toml or export GITHUB_TOKEN"
                        .into(),
                )
            })
    }
}

/// Filtering, concurrency and charting configuration.
///
/// # Examples
///
/// ```
/// use classpulse_core::PipelineConfig;
///
/// let config = PipelineConfig::default();
/// assert_eq!(config.single_file_line_limit, 2000);
/// assert_eq!(config.target_utc_offset_hours, 8);
/// assert!(config.extensions.iter().any(|e| e == ".java"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Worker pool width (default: 16).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Budget for one repository's work in a stage (default: 60).
    #[serde(default = "default_repo_timeout_secs")]
    pub repo_timeout_secs: u64,
    /// Budget for one remote request (default: 15).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Files whose insertions or deletions exceed this are ignored in line totals (default: 2000).
    #[serde(default = "default_single_file_line_limit")]
    pub single_file_line_limit: u64,
    /// Recognized source-file extensions, lowercase with leading dot.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Offset used for the daily and hourly histograms (default: +8).
    #[serde(default = "default_target_utc_offset_hours")]
    pub target_utc_offset_hours: i32,
    /// Messages longer than this are left out of the length histogram (default: 100).
    #[serde(default = "default_message_length_limit")]
    pub message_length_limit: usize,
    /// Bin width of the length histogram (default: 5).
    #[serde(default = "default_message_length_bin_width")]
    pub message_length_bin_width: usize,
}

fn default_workers() -> usize {
    16
}

fn default_repo_timeout_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_single_file_line_limit() -> u64 {
    2000
}

fn default_extensions() -> Vec<String> {
    [
        ".py", ".java", ".js", ".jsx", ".ts", ".tsx", ".c", ".cpp", ".h", ".html", ".css", ".md",
    ]
    .iter()
    .map(|e| e.to_string())
    .collect()
}

fn default_target_utc_offset_hours() -> i32 {
    8
}

fn default_message_length_limit() -> usize {
    100
}

fn default_message_length_bin_width() -> usize {
    5
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            repo_timeout_secs: default_repo_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            single_file_line_limit: default_single_file_line_limit(),
            extensions: default_extensions(),
            target_utc_offset_hours: default_target_utc_offset_hours(),
            message_length_limit: default_message_length_limit(),
            message_length_bin_width: default_message_length_bin_width(),
        }
    }
}

impl PipelineConfig {
    /// The histogram timezone as a fixed offset.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Config`] if the offset is out of range.
    pub fn target_offset(&self) -> Result<FixedOffset, PulseError> {
        offset_from_hours(self.target_utc_offset_hours)
    }
}

/// One semester as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemesterConfig {
    /// First day of the window (inclusive).
    pub start: NaiveDate,
    /// Last day of the window (inclusive).
    pub end: NaiveDate,
    /// Civil-calendar offset the window is expressed in (default: +8).
    #[serde(default = "default_semester_offset")]
    pub utc_offset_hours: i32,
    /// Repository naming grammar; capture group 1 is the team id.
    pub repo_pattern: String,
    /// Directory under `repos_dir` holding this semester's clones.
    pub submissions_dir: Option<String>,
    /// Classroom assignment whose accepted submissions list the teams.
    pub assignment_id: Option<String>,
}

fn default_semester_offset() -> i32 {
    8
}

fn default_semesters() -> BTreeMap<String, SemesterConfig> {
    let spring = |year: i32, pattern: &str, assignment: &str| SemesterConfig {
        start: NaiveDate::from_ymd_opt(year, 2, 1).unwrap_or_default(),
        end: NaiveDate::from_ymd_opt(year, 6, 30).unwrap_or_default(),
        utc_offset_hours: default_semester_offset(),
        repo_pattern: pattern.into(),
        submissions_dir: None,
        assignment_id: Some(assignment.into()),
    };
    BTreeMap::from([
        (
            "23spring".to_string(),
            spring(2023, r"^team-project-(\d+)$", "403123"),
        ),
        (
            "24spring".to_string(),
            spring(2024, r"^team-project-24spring-(team[_-]?\d+|\d+)$", "558214"),
        ),
        (
            "25spring".to_string(),
            spring(2025, r"^team-project-25spring-(team[_-]?\d+|\d+)$", "749620"),
        ),
    ])
}

/// Validated runtime view of a semester.
#[derive(Debug, Clone)]
pub struct Semester {
    /// Semester id.
    pub key: String,
    /// First day of the window (inclusive).
    pub start: NaiveDate,
    /// Last day of the window (inclusive).
    pub end: NaiveDate,
    /// Civil-calendar offset of the window.
    pub offset: FixedOffset,
    /// Compiled naming grammar.
    pub pattern: Regex,
    /// Directory name under `repos_dir`.
    pub submissions_dir: String,
    /// Classroom assignment id, if known.
    pub assignment_id: Option<String>,
}

impl Semester {
    fn from_config(key: &str, cfg: &SemesterConfig) -> Result<Self, PulseError> {
        if cfg.end < cfg.start {
            return Err(PulseError::Config(format!(
                "semester '{key}' ends ({}) before it starts ({})",
                cfg.end, cfg.start
            )));
        }
        let pattern = Regex::new(&cfg.repo_pattern).map_err(|e| {
            PulseError::Config(format!("semester '{key}' has an invalid repo_pattern: {e}"))
        })?;
        if pattern.captures_len() < 2 {
            return Err(PulseError::Config(format!(
                "semester '{key}' repo_pattern needs a capture group for the team id"
            )));
        }
        Ok(Self {
            key: key.to_string(),
            start: cfg.start,
            end: cfg.end,
            offset: offset_from_hours(cfg.utc_offset_hours)?,
            pattern,
            submissions_dir: cfg
                .submissions_dir
                .clone()
                .unwrap_or_else(|| format!("team-project-{key}-submissions")),
            assignment_id: cfg.assignment_id.clone(),
        })
    }

    /// Whether `at`, read on this semester's civil calendar, falls inside the window.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::DateTime;
    /// use classpulse_core::PulseConfig;
    ///
    /// let semester = PulseConfig::default().semester("25spring").unwrap();
    /// let late_june = DateTime::parse_from_rfc3339("2025-06-30T23:30:00+08:00").unwrap();
    /// let july_in_utc = DateTime::parse_from_rfc3339("2025-06-30T17:00:00Z").unwrap();
    /// assert!(semester.contains(&late_june));
    /// assert!(!semester.contains(&july_in_utc));
    /// ```
    pub fn contains(&self, at: &DateTime<FixedOffset>) -> bool {
        let day = at.with_timezone(&self.offset).date_naive();
        self.start <= day && day <= self.end
    }

    /// Extract the team identifier from a repository name, or `None` when
    /// the name does not follow this semester's grammar.
    pub fn group_name(&self, repo_name: &str) -> Option<String> {
        self.pattern
            .captures(repo_name)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Local directory holding this semester's clones.
    pub fn submissions_path(&self, repos_dir: &Path) -> PathBuf {
        repos_dir.join(&self.submissions_dir)
    }
}

fn offset_from_hours(hours: i32) -> Result<FixedOffset, PulseError> {
    hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| PulseError::Config(format!("utc offset out of range: {hours}")))
}
