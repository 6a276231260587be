use once_cell::sync::Lazy;
use regex::Regex;
use whatlang::{Lang, detect};

const MIN_CONFIDENCE: f64 = 0.25;
// Counted in characters so short CJK articles still get a language.
const MIN_TEXT_CHARS: usize = 20;

static MARKUP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid markup regex"));

/// Best-effort ISO 639-1 code for article content, `None` when unsure.
pub fn detect_language(content: &str) -> Option<String> {
    let text = MARKUP_RE.replace_all(content, " ");
    if text.trim().chars().count() < MIN_TEXT_CHARS {
        return None;
    }

    detect(&text)
        .filter(|info| info.confidence() >= MIN_CONFIDENCE)
        .map(|info| lang_to_code(info.lang()).to_string())
}

fn lang_to_code(lang: Lang) -> &'static str {
    match lang {
        Lang::Eng => "en",
        Lang::Cmn => "zh",
        Lang::Jpn => "ja",
        Lang::Kor => "ko",
        Lang::Rus => "ru",
        Lang::Spa => "es",
        Lang::Fra => "fr",
        Lang::Deu => "de",
        Lang::Por => "pt",
        Lang::Ita => "it",
        Lang::Nld => "nl",
        Lang::Pol => "pl",
        Lang::Tur => "tr",
        Lang::Ukr => "uk",
        Lang::Ara => "ar",
        Lang::Heb => "he",
        Lang::Hin => "hi",
        Lang::Tha => "th",
        Lang::Vie => "vi",
        Lang::Ind => "id",
        other => other.code(),
    }
}

/// Human readable name used in translation prompts.
pub fn language_name(code: &str) -> &str {
    match code {
        "zh" => "Simplified Chinese",
        "en" => "English",
        "ja" => "Japanese",
        "ko" => "Korean",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "pt" => "Portuguese",
        "ru" => "Russian",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_english_through_markup() {
        let text = "<p>This is a long essay about the design of memory safe systems languages.</p>";
        assert_eq!(detect_language(text), Some("en".to_string()));
    }

    #[test]
    fn detects_chinese() {
        let text = "这是一篇关于系统编程语言内存安全设计的长文章，讨论了所有权和借用检查。";
        assert_eq!(detect_language(text), Some("zh".to_string()));
    }

    #[test]
    fn short_text_returns_none() {
        assert_eq!(detect_language("<b>Short</b>"), None);
    }

    #[test]
    fn prompt_names() {
        assert_eq!(language_name("zh"), "Simplified Chinese");
        assert_eq!(language_name("xx"), "xx");
    }
}
