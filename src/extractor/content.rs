use crate::source::types::{ArticleCard, MediaKind};

const TITLE_FROM_TEXT_CHARS: usize = 100;
const UNTITLED: &str = "Untitled Article";

/// Article body as light HTML: text blocks and `<img>` tags separated by
/// blank lines. Falls back to the preview, the description and finally
/// the title when the card carries no blocks.
pub fn render_content(card: &ArticleCard) -> String {
    let mut parts: Vec<String> = Vec::new();
    for block in &card.blocks {
        let text = block.text.trim();
        if !text.is_empty() {
            parts.push(text.to_string());
        }
        for media in block.media.iter().filter(|m| m.kind == MediaKind::Image) {
            parts.push(format!(r#"<img src="{}" alt="Article image">"#, media.url));
        }
    }

    let raw = if parts.is_empty() {
        [&card.preview_text, &card.description, &card.title]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or_default()
            .to_string()
    } else {
        parts.join("\n\n")
    };

    ammonia::clean(&raw)
}

/// De-duplicated media URLs, cover image first.
pub fn collect_media(card: &ArticleCard) -> Vec<String> {
    let mut media: Vec<String> = Vec::new();
    let candidates = card.cover_image.iter().cloned().chain(
        card.blocks
            .iter()
            .flat_map(|b| b.media.iter().map(|m| m.url.clone())),
    );
    for url in candidates {
        if !media.contains(&url) {
            media.push(url);
        }
    }
    media
}

/// Card title, else the start of the post text, else a placeholder.
pub fn pick_title(card: &ArticleCard, post_text: &str) -> String {
    if let Some(title) = card.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        return title.to_string();
    }
    let from_text: String = post_text
        .trim()
        .chars()
        .take(TITLE_FROM_TEXT_CHARS)
        .collect();
    if from_text.trim().is_empty() {
        UNTITLED.to_string()
    } else {
        from_text.trim().to_string()
    }
}
