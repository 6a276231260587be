use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, header::RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::{
    analysis::{
        errors::AnalysisError,
        gateway::{Analysis, AnalysisGateway, AnalysisRequest, Category},
        language::language_name,
    },
    config::AnalysisConfig,
};

const MAX_CONTENT_CHARS: usize = 8000;
const ANALYSIS_MAX_TOKENS: u32 = 2000;
const TRANSLATION_MAX_TOKENS: u32 = 4000;
const TEMPERATURE: f32 = 0.3;

const TITLE_MARKER: &str = "TITLE_ENGLISH:";
const SUMMARY_MARKER: &str = "SUMMARY:";
const CATEGORY_MARKER: &str = "CATEGORY:";

/// Gateway for any provider exposing an OpenAI-style `/chat/completions`.
#[derive(Clone)]
pub struct ChatCompletionsGateway {
    http: Client,
    endpoint: Url,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsGateway {
    pub fn new(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let base = if config.api_base.ends_with('/') {
            config.api_base.clone()
        } else {
            format!("{}/", config.api_base)
        };
        let endpoint = Url::parse(&base)
            .and_then(|u| u.join("chat/completions"))
            .map_err(|e| AnalysisError::Unavailable(format!("invalid api base: {e}")))?;

        let http = ClientBuilder::new()
            .connect_timeout(config.timeout.min(Duration::from_secs(10)))
            .timeout(config.timeout)
            .build()
            .map_err(|e| AnalysisError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, AnalysisError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens,
        };

        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(AnalysisError::from_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(AnalysisError::from_status(status, retry_after));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(AnalysisError::from_reqwest_error)?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AnalysisError::InvalidResponse("empty completion".to_string()))
    }
}

#[async_trait]
impl AnalysisGateway for ChatCompletionsGateway {
    #[instrument(skip_all, fields(title = %request.title, target = %request.target_length))]
    async fn analyze(&self, request: AnalysisRequest) -> Result<Analysis, AnalysisError> {
        let prompt = analysis_prompt(&request);
        let text = self
            .complete(
                "You are an editor who writes concise, faithful English summaries of long-form articles.",
                &prompt,
                ANALYSIS_MAX_TOKENS,
            )
            .await?;
        debug!(chars = text.len(), "analysis completion received");
        parse_analysis(&text, request.needs_title_translation)
    }

    #[instrument(skip(self, text), fields(chars = text.len()))]
    async fn translate(&self, text: &str, target_language: &str) -> Result<String, AnalysisError> {
        let language = language_name(target_language);
        let prompt = format!(
            "Translate the following text into {language}. Keep names, numbers and technical \
             terms accurate. Reply with the translation only.\n\n{text}"
        );
        self.complete(
            "You are a professional translator.",
            &prompt,
            TRANSLATION_MAX_TOKENS,
        )
        .await
    }
}

fn analysis_prompt(request: &AnalysisRequest) -> String {
    let content: String = request.content.chars().take(MAX_CONTENT_CHARS).collect();
    let categories = Category::ALL
        .iter()
        .map(Category::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let title_line = if request.needs_title_translation {
        format!("{TITLE_MARKER} [the title translated into plain English]")
    } else {
        format!("{TITLE_MARKER} {} (already English, repeat it)", request.title)
    };

    format!(
        "Analyze the article below and answer in exactly this format:\n\
         {title_line}\n\
         {SUMMARY_MARKER} [an English summary of {target}]\n\
         {CATEGORY_MARKER} [one category from: {categories}]\n\n\
         Title: {title}\n\n\
         Content:\n{content}",
        target = request.target_length,
        title = request.title,
    )
}

/// Parse the marker-delimited completion.
///
/// `SUMMARY:` may span several lines and runs until the next marker.
pub fn parse_analysis(text: &str, wants_title: bool) -> Result<Analysis, AnalysisError> {
    let mut translated_title = None;
    let mut category = None;
    let mut summary_lines: Vec<&str> = Vec::new();
    let mut in_summary = false;

    for line in text.lines() {
        let trimmed = line.trim().trim_start_matches("**");
        if let Some(rest) = strip_marker(trimmed, TITLE_MARKER) {
            in_summary = false;
            translated_title = Some(rest.trim_matches('*').trim().to_string());
        } else if let Some(rest) = strip_marker(trimmed, CATEGORY_MARKER) {
            in_summary = false;
            category = rest
                .split(',')
                .map(Category::from_label)
                .find(|c| *c != Category::Uncategorized)
                .or(Some(Category::Uncategorized));
        } else if let Some(rest) = strip_marker(trimmed, SUMMARY_MARKER) {
            in_summary = true;
            summary_lines.push(rest.trim_matches('*').trim());
        } else if in_summary {
            summary_lines.push(line.trim());
        }
    }

    let summary = summary_lines.join("\n").trim().to_string();
    if summary.is_empty() {
        return Err(AnalysisError::InvalidResponse(
            "completion has no SUMMARY section".to_string(),
        ));
    }

    Ok(Analysis {
        summary,
        category: category.unwrap_or(Category::Uncategorized),
        translated_title: if wants_title {
            translated_title.filter(|t| !t.is_empty())
        } else {
            None
        },
    })
}

fn strip_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let head = line.get(..marker.len())?;
    if head.eq_ignore_ascii_case(marker) {
        Some(line[marker.len()..].trim_start_matches('*').trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_sections() {
        let text = "TITLE_ENGLISH: Why Rust Wins\nSUMMARY: Rust trades compile time for safety.\nIt also ships fast binaries.\nCATEGORY: Tech, AI";
        let analysis = parse_analysis(text, true).unwrap();
        assert_eq!(analysis.translated_title.as_deref(), Some("Why Rust Wins"));
        assert_eq!(
            analysis.summary,
            "Rust trades compile time for safety.\nIt also ships fast binaries."
        );
        assert_eq!(analysis.category, Category::Tech);
    }

    #[test]
    fn tolerates_bold_markers_and_unknown_categories() {
        let text = "**SUMMARY:** A calm look at markets.\n**CATEGORY:** Gardening";
        let analysis = parse_analysis(text, false).unwrap();
        assert_eq!(analysis.summary, "A calm look at markets.");
        assert_eq!(analysis.category, Category::Uncategorized);
        assert_eq!(analysis.translated_title, None);
    }

    #[test]
    fn missing_summary_is_invalid() {
        let result = parse_analysis("CATEGORY: Tech", false);
        assert!(matches!(result, Err(AnalysisError::InvalidResponse(_))));
    }

    #[test]
    fn prompt_truncates_content_and_lists_categories() {
        let request = AnalysisRequest {
            title: "Title".to_string(),
            content: "x".repeat(MAX_CONTENT_CHARS + 500),
            needs_title_translation: false,
            target_length: crate::analysis::policy::TargetLength::Standard,
        };
        let prompt = analysis_prompt(&request);
        assert!(prompt.contains("100-200 words"));
        assert!(prompt.contains("Personal Story"));
        assert!(!prompt.contains(&"x".repeat(MAX_CONTENT_CHARS + 1)));
    }
}
