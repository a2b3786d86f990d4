//! Equipment–Job Mapper (C7) — spec §4.5.

mod mapper;
mod types;

pub use mapper::{JobCatalog, JobMapper, JobMapperError, NullCatalog};
pub use types::{JobCompletionSummary, JobDescription, JobUpdateOutcome, JobView, ProgressMetrics};
