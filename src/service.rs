use crate::clock::Clock;
use crate::dedup::DedupCache;
use crate::errors::StoreError;
use crate::models::{AnalyticsResponse, HealthResponse, IncrementResponse, NewVisit};
use crate::storage::Store;
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info};

pub const RECENT_VISITS_LIMIT: u32 = 100;

pub struct VisitorService {
    store: Store,
    dedup: DedupCache,
    clock: Arc<dyn Clock>,
}

impl VisitorService {
    pub fn new(store: Store, dedup: DedupCache, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            dedup,
            clock,
        }
    }

    #[cfg(test)]
    fn store(&self) -> &Store {
        &self.store
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.store.visitor_total().await?.total_count)
    }

    /// Logs the visit, then bumps the total if the client is new.
    ///
    /// The log row is written before the dedup decision and is kept even if
    /// the increment fails afterwards.
    pub async fn increment(&self, mut visit: NewVisit) -> Result<IncrementResponse, StoreError> {
        visit.client_key = visit
            .client_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string);

        let now = self.clock.now();
        self.store.append_visit(&visit, now).await?;

        let key = visit.client_key.as_deref();
        let is_new_visitor = self.dedup.is_new(key).await;
        if is_new_visitor {
            info!(client = key.unwrap_or_default(), "new visitor");
            self.store.increment_total(now).await?;
        } else {
            debug!(client = key.unwrap_or_default(), "returning visitor");
        }

        Ok(IncrementResponse {
            count: self.count().await?,
            is_new_visitor,
        })
    }

    pub async fn analytics(&self) -> Result<AnalyticsResponse, StoreError> {
        let since = self.clock.now() - Duration::hours(24);

        Ok(AnalyticsResponse {
            recent_visits: self.store.recent_visits(RECENT_VISITS_LIMIT).await?,
            visitors_by_hour: self.store.visits_by_hour(since).await?,
            unique_visitors_24h: self.store.unique_visitors(since).await?,
        })
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok".to_string(),
            timestamp: self.clock.now(),
        }
    }
}
