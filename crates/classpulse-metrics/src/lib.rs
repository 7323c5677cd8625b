//! Aggregation over normalized semester data.
//!
//! Every metric is a pure function of the analyzed repositories (and the
//! collector's PR/issue/branch lists). [`dataset::build_semester_charts`]
//! assembles them into the per-semester chart document.

pub mod dataset;
pub mod inequality;
pub mod lifecycle;
pub mod messages;
pub mod teams;
pub mod timeline;

pub use dataset::{build_semester_charts, Activity, ChartDataset, ChartSettings, SemesterCharts};
pub use inequality::gini;
