mod evaluator;
mod result;
mod status;

pub use evaluator::{evaluate_aod, evaluate_subjects, AodCounts, StageEvaluation, StageEvaluator};
pub use result::{ReportingLoaderResult, WorkflowStatusResult};
pub use status::{MessageIdSource, SnapshotType, Stage, WorkflowStatus};
