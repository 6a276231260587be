/// Longest slug we store, suffix included.
pub const MAX_SLUG_LEN: usize = 100;

/// Lowercase ASCII slug: alphanumerics joined by single hyphens.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len().min(MAX_SLUG_LEN));
    let mut pending_hyphen = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_hyphen = true;
        }
    }

    truncate(&slug, MAX_SLUG_LEN).to_string()
}

/// Base slug for an article: English title, then original title, then the id.
pub fn base_slug(title_english: Option<&str>, title: &str, source_post_id: &str) -> String {
    title_english
        .map(slugify)
        .filter(|s| !s.is_empty())
        .or_else(|| Some(slugify(title)).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| {
            let id: String = slugify(source_post_id).chars().take(6).collect();
            format!("article-{id}")
        })
}

/// `base` for attempt 0, then `base-1`, `base-2`, ... shortened to fit.
pub fn with_suffix(base: &str, attempt: u32) -> String {
    if attempt == 0 {
        return base.to_string();
    }
    let suffix = format!("-{attempt}");
    let head = truncate(base, MAX_SLUG_LEN - suffix.len());
    format!("{head}{suffix}")
}

fn truncate(slug: &str, max: usize) -> &str {
    if slug.len() <= max {
        return slug;
    }
    // slugs are ASCII, byte slicing is safe
    slug[..max].trim_end_matches('-')
}
