use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::analysis::{errors::AnalysisError, policy::TargetLength};

/// Fixed category vocabulary offered to the summarizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Hardware,
    Gaming,
    Health,
    Environment,
    #[serde(rename = "Personal Story")]
    PersonalStory,
    Culture,
    Philosophy,
    History,
    Education,
    Design,
    Marketing,
    #[serde(rename = "AI")]
    Ai,
    Crypto,
    Tech,
    Data,
    Startups,
    Business,
    Markets,
    Product,
    Security,
    Policy,
    Science,
    Media,
    Uncategorized,
}

impl Category {
    pub const ALL: [Category; 23] = [
        Category::Hardware,
        Category::Gaming,
        Category::Health,
        Category::Environment,
        Category::PersonalStory,
        Category::Culture,
        Category::Philosophy,
        Category::History,
        Category::Education,
        Category::Design,
        Category::Marketing,
        Category::Ai,
        Category::Crypto,
        Category::Tech,
        Category::Data,
        Category::Startups,
        Category::Business,
        Category::Markets,
        Category::Product,
        Category::Security,
        Category::Policy,
        Category::Science,
        Category::Media,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Hardware => "Hardware",
            Category::Gaming => "Gaming",
            Category::Health => "Health",
            Category::Environment => "Environment",
            Category::PersonalStory => "Personal Story",
            Category::Culture => "Culture",
            Category::Philosophy => "Philosophy",
            Category::History => "History",
            Category::Education => "Education",
            Category::Design => "Design",
            Category::Marketing => "Marketing",
            Category::Ai => "AI",
            Category::Crypto => "Crypto",
            Category::Tech => "Tech",
            Category::Data => "Data",
            Category::Startups => "Startups",
            Category::Business => "Business",
            Category::Markets => "Markets",
            Category::Product => "Product",
            Category::Security => "Security",
            Category::Policy => "Policy",
            Category::Science => "Science",
            Category::Media => "Media",
            Category::Uncategorized => "Uncategorized",
        }
    }

    /// Case-insensitive lookup; anything outside the vocabulary is `Uncategorized`.
    pub fn from_label(label: &str) -> Self {
        let needle = label
            .trim()
            .trim_matches(|c: char| c == '*' || c == '"' || c == '.')
            .trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(needle))
            .unwrap_or(Category::Uncategorized)
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub title: String,
    pub content: String,
    pub needs_title_translation: bool,
    pub target_length: TargetLength,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    pub summary: String,
    pub category: Category,
    pub translated_title: Option<String>,
}

/// Provider-agnostic AI capabilities.
///
/// Implementations only talk to the provider; persisting results is the
/// caller's job.
#[async_trait]
pub trait AnalysisGateway: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest) -> Result<Analysis, AnalysisError>;

    async fn translate(&self, text: &str, target_language: &str) -> Result<String, AnalysisError>;
}
