use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::ArticleTag,
    repositories::{
        articles::{ArticleStore, TagTarget},
        errors::StoreError,
    },
};

pub const DAY_WINDOW_HOURS: i64 = 24;
pub const WEEK_WINDOW_HOURS: i64 = 24 * 7;

/// Recency bucket for an article. Both boundaries are inclusive: exactly
/// 24h old is still `Day`, exactly 168h old is still `Week`. Timestamps in
/// the future count as `Day`.
pub fn compute_tag(now: DateTime<Utc>, published_at: DateTime<Utc>) -> ArticleTag {
    let age = now - published_at;
    if age <= Duration::hours(DAY_WINDOW_HOURS) {
        ArticleTag::Day
    } else if age <= Duration::hours(WEEK_WINDOW_HOURS) {
        ArticleTag::Week
    } else {
        ArticleTag::History
    }
}

/// Tag writes needed to bring `targets` up to date at `now`.
pub fn plan_tag_updates(targets: &[TagTarget], now: DateTime<Utc>) -> Vec<(Uuid, ArticleTag)> {
    targets
        .iter()
        .filter_map(|t| {
            let fresh = compute_tag(now, t.published_at);
            (t.tag != Some(fresh)).then_some((t.id, fresh))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct TagRefresh {
    pub examined: usize,
    pub changed: u64,
}

/// Maintenance pass: re-age every row that has not reached `History`.
pub async fn refresh_tags(
    store: &dyn ArticleStore,
    now: DateTime<Utc>,
) -> Result<TagRefresh, StoreError> {
    let targets = store.tags_needing_refresh().await?;
    let updates = plan_tag_updates(&targets, now);
    let changed = store.update_tags(&updates).await?;
    Ok(TagRefresh {
        examined: targets.len(),
        changed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::articles::MockArticleStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn tags_by_age() {
        assert_eq!(compute_tag(now(), now()), ArticleTag::Day);
        assert_eq!(compute_tag(now(), now() - Duration::days(3)), ArticleTag::Week);
        assert_eq!(compute_tag(now(), now() - Duration::days(40)), ArticleTag::History);
    }

    #[test]
    fn boundaries_are_inclusive() {
        let day = now() - Duration::hours(24);
        assert_eq!(compute_tag(now(), day), ArticleTag::Day);
        assert_eq!(
            compute_tag(now(), day - Duration::seconds(1)),
            ArticleTag::Week
        );

        let week = now() - Duration::hours(24 * 7);
        assert_eq!(compute_tag(now(), week), ArticleTag::Week);
        assert_eq!(
            compute_tag(now(), week - Duration::seconds(1)),
            ArticleTag::History
        );
    }

    #[test]
    fn future_timestamps_are_day() {
        assert_eq!(compute_tag(now(), now() + Duration::hours(5)), ArticleTag::Day);
    }

    #[test]
    fn plans_only_changed_tags() {
        let unchanged = TagTarget {
            id: Uuid::new_v4(),
            published_at: now() - Duration::hours(1),
            tag: Some(ArticleTag::Day),
        };
        let aged = TagTarget {
            id: Uuid::new_v4(),
            published_at: now() - Duration::days(2),
            tag: Some(ArticleTag::Day),
        };
        let untagged = TagTarget {
            id: Uuid::new_v4(),
            published_at: now() - Duration::days(30),
            tag: None,
        };

        let updates = plan_tag_updates(&[unchanged, aged, untagged], now());
        assert_eq!(
            updates,
            vec![(aged.id, ArticleTag::Week), (untagged.id, ArticleTag::History)]
        );
    }

    #[tokio::test]
    async fn refresh_writes_planned_updates() {
        let aged = TagTarget {
            id: Uuid::new_v4(),
            published_at: now() - Duration::days(10),
            tag: Some(ArticleTag::Week),
        };

        let mut store = MockArticleStore::new();
        store
            .expect_tags_needing_refresh()
            .returning(move || Ok(vec![aged]));
        store
            .expect_update_tags()
            .withf(move |updates| updates == [(aged.id, ArticleTag::History)])
            .times(1)
            .returning(|updates| Ok(updates.len() as u64));

        let report = refresh_tags(&store, now()).await.unwrap();
        assert_eq!(report, TagRefresh { examined: 1, changed: 1 });
    }
}
