use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::repositories::{
    articles::{ArticleStore, IndexOutcome},
    errors::StoreError,
};

/// Namespace mixed into advisory lock keys so they don't collide with other
/// users of `pg_advisory_xact_lock` on the same database.
const LOCK_NAMESPACE: i64 = 0x5155_4f54_4100_0000;

/// Half-open UTC day `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn for_date(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        Self {
            date,
            start,
            end: start + Duration::days(1),
        }
    }

    pub fn containing(ts: DateTime<Utc>) -> Self {
        Self::for_date(ts.date_naive())
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    pub fn lock_key(&self) -> i64 {
        LOCK_NAMESPACE ^ i64::from(self.date.num_days_from_ce())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub used: i64,
    pub remaining: i64,
}

/// Daily publish ceiling, counted over articles indexed with a
/// `published_at` inside the day.
#[derive(Clone)]
pub struct QuotaGate {
    store: Arc<dyn ArticleStore>,
    ceiling: i64,
}

impl QuotaGate {
    pub fn new(store: Arc<dyn ArticleStore>, ceiling: i64) -> Self {
        Self {
            store,
            ceiling: ceiling.max(0),
        }
    }

    pub fn ceiling(&self) -> i64 {
        self.ceiling
    }

    /// Advisory check. The authoritative re-count happens in [`publish`].
    ///
    /// [`publish`]: QuotaGate::publish
    pub async fn can_publish(&self, date: NaiveDate) -> Result<QuotaDecision, StoreError> {
        let window = DayWindow::for_date(date);
        let used = self
            .store
            .count_indexed_between(window.start, window.end)
            .await?;
        let remaining = (self.ceiling - used).max(0);
        debug!(%date, used, remaining, "quota checked");
        Ok(QuotaDecision {
            allowed: remaining > 0,
            used,
            remaining,
        })
    }

    /// Mark `id` indexed if the day still has room.
    pub async fn publish(&self, id: Uuid, window: &DayWindow) -> Result<IndexOutcome, StoreError> {
        let outcome = self
            .store
            .index_within_quota(id, window, self.ceiling)
            .await?;
        if let IndexOutcome::QuotaExhausted { used } = outcome {
            info!(article_id = %id, day = %window.date, used, "daily quota reached");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::articles::MockArticleStore;
    use chrono::TimeZone;
    use mockall::predicate::eq;

    #[test]
    fn window_is_half_open_utc_day() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 10, 23, 59, 59).unwrap();
        let window = DayWindow::containing(ts);

        assert_eq!(window.date, NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());
        assert!(window.contains(ts));
        assert!(window.contains(window.start));
        assert!(!window.contains(window.end));

        let midnight = Utc.with_ymd_and_hms(2024, 6, 11, 0, 0, 0).unwrap();
        assert_eq!(window.end, midnight);
        assert_eq!(
            DayWindow::containing(midnight).date,
            NaiveDate::from_ymd_opt(2024, 6, 11).unwrap()
        );
    }

    #[test]
    fn lock_keys_differ_per_day() {
        let a = DayWindow::for_date(NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());
        let b = DayWindow::for_date(NaiveDate::from_ymd_opt(2024, 6, 11).unwrap());
        assert_ne!(a.lock_key(), b.lock_key());
        assert_eq!(a.lock_key(), DayWindow::for_date(a.date).lock_key());
    }

    #[tokio::test]
    async fn remaining_never_negative() {
        let mut store = MockArticleStore::new();
        store.expect_count_indexed_between().returning(|_, _| Ok(12));
        let gate = QuotaGate::new(Arc::new(store), 10);

        let decision = gate
            .can_publish(NaiveDate::from_ymd_opt(2024, 6, 10).unwrap())
            .await
            .unwrap();
        assert_eq!(
            decision,
            QuotaDecision {
                allowed: false,
                used: 12,
                remaining: 0
            }
        );
    }

    #[tokio::test]
    async fn allows_while_below_ceiling() {
        let mut store = MockArticleStore::new();
        store.expect_count_indexed_between().returning(|_, _| Ok(9));
        let gate = QuotaGate::new(Arc::new(store), 10);

        let decision = gate
            .can_publish(NaiveDate::from_ymd_opt(2024, 6, 10).unwrap())
            .await
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[tokio::test]
    async fn publish_passes_ceiling_to_store() {
        let id = Uuid::new_v4();
        let window = DayWindow::for_date(NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());

        let mut store = MockArticleStore::new();
        store
            .expect_index_within_quota()
            .with(eq(id), eq(window), eq(3))
            .times(1)
            .returning(|_, _, _| Ok(IndexOutcome::QuotaExhausted { used: 3 }));
        let gate = QuotaGate::new(Arc::new(store), 3);

        let outcome = gate.publish(id, &window).await.unwrap();
        assert_eq!(outcome, IndexOutcome::QuotaExhausted { used: 3 });
    }
}
