//! Analysis service: turns submissions into runs and runs into reports.

pub mod analysis;
pub mod prompt;

pub use analysis::{
    validate_contract, AnalysisError, AnalysisRequest, AnalysisResponse, AnalysisService,
    SourceDocument,
};
