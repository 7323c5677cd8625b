//! Identity resolution and commit normalization.
//!
//! [`identity`] maps authorship emails onto roster accounts; [`normalize`]
//! turns raw per-repository history into attributed, windowed commit lists
//! with net line totals per source extension.

pub mod identity;
pub mod normalize;

pub use identity::{plan_lookups, team_rosters, Contributor, IdentityMap, LookupRequest};
pub use normalize::{dedup_commits, LinePolicy, NormalizedCommit, NormalizedRepo, Normalizer};
