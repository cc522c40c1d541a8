use crate::result::{AnalysisError, AnalysisReport};

/// A deterministic analysis unit over a snapshot of input data.
///
/// Jobs consume snapshots provided by callers and must not mutate domain state.
pub trait AnalysisJob: Send + Sync + 'static {
    /// Execute the analysis.
    fn run(&self) -> Result<AnalysisReport, AnalysisError>;
}
