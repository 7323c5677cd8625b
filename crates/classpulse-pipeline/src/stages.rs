use std::fmt;
use std::str::FromStr;

/// Pipeline stages in execution order.
///
/// # Examples
///
/// ```
/// use classpulse_pipeline::stages::Stage;
///
/// let stage: Stage = "authors".parse().unwrap();
/// assert_eq!(stage, Stage::Authors);
/// assert_eq!(Stage::from_stage(Stage::Reconcile).len(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Roster,
    Teams,
    Local,
    Authors,
    Activity,
    Reconcile,
    Charts,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Roster,
        Stage::Teams,
        Stage::Local,
        Stage::Authors,
        Stage::Activity,
        Stage::Reconcile,
        Stage::Charts,
    ];

    /// This stage and every later one.
    pub fn from_stage(start: Stage) -> Vec<Stage> {
        Self::ALL.into_iter().filter(|s| *s >= start).collect()
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Roster => "roster",
            Stage::Teams => "teams",
            Stage::Local => "local",
            Stage::Authors => "authors",
            Stage::Activity => "activity",
            Stage::Reconcile => "reconcile",
            Stage::Charts => "charts",
        }
    }

    /// Whether the stage talks to the hosting platform.
    pub fn needs_remote(self) -> bool {
        matches!(
            self,
            Stage::Roster | Stage::Teams | Stage::Authors | Stage::Activity
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|s| s.name()).collect();
                format!("unknown stage '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

/// Snapshot keys written by the stages.
pub mod keys {
    pub const ROSTER: &str = "roster";
    pub const CHARTS: &str = "charts";

    pub fn teams(semester: &str) -> String {
        format!("teams.{semester}")
    }

    pub fn local(semester: &str) -> String {
        format!("local.{semester}")
    }

    pub fn authors(semester: &str) -> String {
        format!("authors.{semester}")
    }

    pub fn pulls(semester: &str) -> String {
        format!("pulls.{semester}")
    }

    pub fn issues(semester: &str) -> String {
        format!("issues.{semester}")
    }

    pub fn branches(semester: &str) -> String {
        format!("branches.{semester}")
    }

    pub fn normalized(semester: &str) -> String {
        format!("normalized.{semester}")
    }

    pub fn contributors(semester: &str) -> String {
        format!("contributors.{semester}")
    }

    pub fn charts(semester: &str) -> String {
        format!("charts.{semester}")
    }
}
