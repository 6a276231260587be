pub mod client;
pub mod errors;
pub mod gateway;
pub mod language;
pub mod policy;

pub use client::ChatCompletionsGateway;
pub use errors::AnalysisError;
pub use gateway::{Analysis, AnalysisGateway, AnalysisRequest, Category};
pub use language::detect_language;
pub use policy::{SummaryPolicy, SummaryRequirement, TargetLength, count_words, needs_title_translation};
