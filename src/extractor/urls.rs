//! Best-effort resolution of the external URL behind an article post.

use linkify::{LinkFinder, LinkKind};
use serde::Serialize;
use url::Url;

/// Hosts that belong to the social network itself.
const SOURCE_NETWORK_HOSTS: [&str; 6] = [
    "x.com",
    "twitter.com",
    "t.co",
    "twimg.com",
    "pic.twitter.com",
    "pic.x.com",
];

/// Where the resolved URL came from, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlConfidence {
    Explicit,
    Entity,
    TextScan,
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlResolution {
    pub url: Option<String>,
    pub confidence: UrlConfidence,
}

/// Walk the fallback chain: the card's own link, then the post's link
/// entities, then bare URLs found in the text. Links that point back at
/// the source network are never accepted.
pub fn resolve_source_url(card_url: Option<&str>, links: &[String], text: &str) -> UrlResolution {
    if let Some(url) = card_url.and_then(external_url) {
        return UrlResolution {
            url: Some(url),
            confidence: UrlConfidence::Explicit,
        };
    }

    if let Some(url) = links.iter().find_map(|l| external_url(l)) {
        return UrlResolution {
            url: Some(url),
            confidence: UrlConfidence::Entity,
        };
    }

    let mut finder = LinkFinder::new();
    finder.kinds(&[LinkKind::Url]);
    if let Some(url) = finder.links(text).find_map(|l| external_url(l.as_str())) {
        return UrlResolution {
            url: Some(url),
            confidence: UrlConfidence::TextScan,
        };
    }

    UrlResolution {
        url: None,
        confidence: UrlConfidence::Unresolved,
    }
}

/// Normalized http(s) URL, or `None` for source-network and non-web links.
fn external_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?.to_ascii_lowercase();
    if is_source_network_host(&host) {
        return None;
    }
    Some(url.to_string())
}

pub fn is_source_network_host(host: &str) -> bool {
    let host = host.trim_start_matches("www.").trim_start_matches("mobile.");
    SOURCE_NETWORK_HOSTS
        .iter()
        .any(|h| host == *h || host.ends_with(&format!(".{h}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_link_wins_when_external() {
        let res = resolve_source_url(
            Some("https://blog.example.com/post"),
            &["https://other.example.com".to_string()],
            "",
        );
        assert_eq!(res.url.as_deref(), Some("https://blog.example.com/post"));
        assert_eq!(res.confidence, UrlConfidence::Explicit);
    }

    #[test]
    fn source_network_card_falls_through_to_entities() {
        let res = resolve_source_url(
            Some("https://x.com/i/article/123"),
            &[
                "https://t.co/abc".to_string(),
                "https://substack.example.com/p/essay".to_string(),
            ],
            "",
        );
        assert_eq!(res.url.as_deref(), Some("https://substack.example.com/p/essay"));
        assert_eq!(res.confidence, UrlConfidence::Entity);
    }

    #[test]
    fn text_scan_is_last_resort() {
        let res = resolve_source_url(
            None,
            &["https://mobile.twitter.com/u/status/1".to_string()],
            "read it at https://pbs.twimg.com/x.jpg or https://example.org/read now",
        );
        assert_eq!(res.url.as_deref(), Some("https://example.org/read"));
        assert_eq!(res.confidence, UrlConfidence::TextScan);
    }

    #[test]
    fn unresolved_when_only_source_links() {
        let res = resolve_source_url(None, &[], "see https://x.com/someone/status/9");
        assert_eq!(res.url, None);
        assert_eq!(res.confidence, UrlConfidence::Unresolved);
    }

    #[test]
    fn host_matching() {
        assert!(is_source_network_host("pbs.twimg.com"));
        assert!(is_source_network_host("www.x.com"));
        assert!(!is_source_network_host("box.com"));
        assert!(!is_source_network_host("example.com"));
    }
}
