//! Summarization: provider answers, degradation and the submission pipeline.

pub mod pipeline;
pub mod result;

pub use pipeline::{PipelineBackends, SYSTEM_PROMPT, Submission, SummaryPipeline};
pub use result::{
    Cta, PARSE_FAILURE_SUMMARY, PROVIDER_FAILURE_SUMMARY, ResponseParseError, SummaryResult,
    TaskLookup, parse_structured,
};
