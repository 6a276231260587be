pub mod client;
pub mod errors;
pub mod parser;
pub mod types;
pub mod wire;

pub use client::{ContentSource, RapidApiClient};
pub use errors::SourceError;
pub use parser::{parse_timeline, validate_tweet};
pub use types::*;
