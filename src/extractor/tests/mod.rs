use super::*;
use crate::source::types::{ArticleCard, ContentBlock, MediaKind, MediaRef};
use chrono::TimeZone;

fn post(id: &str) -> RawPost {
    RawPost {
        post_id: id.to_string(),
        text: "A new essay on storage engines https://t.co/xyz".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
        author: Author {
            handle: "dbwriter".to_string(),
            name: "DB Writer".to_string(),
            avatar_url: None,
        },
        metrics: PostMetrics {
            views: 12_000,
            likes: 340,
            replies: 12,
            reposts: 40,
            bookmarks: 90,
        },
        links: vec![
            "https://x.com/i/article/555".to_string(),
            "https://storage.example.com/lsm".to_string(),
        ],
        is_repost: false,
        is_reply: false,
        article: Some(ArticleCard {
            id: "555".to_string(),
            title: Some("How LSM Trees Work".to_string()),
            preview_text: Some("A tour of compaction".to_string()),
            description: None,
            url: Some("https://x.com/i/article/555".to_string()),
            cover_image: Some("https://pbs.twimg.com/cover.jpg".to_string()),
            blocks: vec![
                ContentBlock {
                    text: "Writes land in a memtable first.".to_string(),
                    media: vec![],
                    links: vec![],
                },
                ContentBlock {
                    text: String::new(),
                    media: vec![MediaRef {
                        url: "https://pbs.twimg.com/diagram.jpg".to_string(),
                        kind: MediaKind::Image,
                    }],
                    links: vec![],
                },
            ],
            published_at: None,
        }),
    }
}

#[test]
fn maps_article_posts() {
    let article = extract(&post("100")).expect("article");

    assert_eq!(article.source_post_id, "100");
    assert_eq!(article.article_id, "555");
    assert_eq!(article.title, "How LSM Trees Work");
    assert_eq!(article.permalink, "https://x.com/dbwriter/status/100");
    assert_eq!(
        article.source_url.as_deref(),
        Some("https://storage.example.com/lsm")
    );
    assert_eq!(article.url_confidence, UrlConfidence::Entity);
    assert_eq!(article.word_count, 6);
    assert_eq!(
        article.media,
        vec![
            "https://pbs.twimg.com/cover.jpg".to_string(),
            "https://pbs.twimg.com/diagram.jpg".to_string()
        ]
    );
    assert_eq!(article.published_at, post("100").created_at);
}

#[test]
fn mapping_is_deterministic() {
    let first = extract(&post("101")).unwrap();
    let second = extract(&post("101")).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.content_checksum.len(), 32);
}

#[test]
fn checksum_tracks_content_changes() {
    let original = extract(&post("102")).unwrap();
    let mut edited_post = post("102");
    if let Some(card) = edited_post.article.as_mut() {
        card.blocks[0].text = "Writes land in a write-ahead log first.".to_string();
    }
    let edited = extract(&edited_post).unwrap();
    assert_ne!(original.content_checksum, edited.content_checksum);
}

#[test]
fn filters_non_articles() {
    let mut repost = post("1");
    repost.is_repost = true;
    assert_eq!(extract(&repost), Err(NotAnArticle::Repost));

    let mut reply = post("2");
    reply.is_reply = true;
    assert_eq!(extract(&reply), Err(NotAnArticle::Reply));

    let mut plain = post("3");
    plain.article = None;
    assert_eq!(extract(&plain), Err(NotAnArticle::NoArticleCard));

    let mut empty = post("4");
    if let Some(card) = empty.article.as_mut() {
        card.blocks.clear();
        card.preview_text = None;
        card.title = None;
    }
    assert_eq!(extract(&empty), Err(NotAnArticle::EmptyContent));
}

#[test]
fn prefers_article_publish_time() {
    let mut p = post("5");
    let published = Utc.with_ymd_and_hms(2024, 4, 30, 23, 0, 0).unwrap();
    if let Some(card) = p.article.as_mut() {
        card.published_at = Some(published);
    }
    assert_eq!(extract(&p).unwrap().published_at, published);
}
