pub mod diff;
pub mod hub;
pub mod scheduler;
pub mod store;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;

use crate::error::FeedError;
use crate::source::{OddsProvider, ProviderRegistry};
use crate::stats::Stats;
use crate::types::{Frame, OddsQuery, Row, RowFilter};

use self::diff::{diff, index_rows};
use self::hub::{BroadcastHub, FrameStream, PublishOutcome};
use self::store::StateStore;

pub use self::scheduler::RefreshScheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Cold start: full snapshot with this many rows.
    Snapshot(usize),
    /// Changes since the previous state.
    Delta(usize),
    Unchanged,
}

/// Mirrors one provider's rows and fans every change out to subscribers.
///
/// `apply` is the only writer. It runs inside `refresh_lock`, which also covers
/// the hub publish so a frame and the state it describes become visible together.
pub struct FeedService {
    provider: Arc<dyn OddsProvider>,
    query: OddsQuery,
    store: StateStore,
    hub: BroadcastHub,
    stats: Arc<Stats>,
    refresh_lock: Mutex<()>,
}

impl FeedService {
    pub fn new(
        registry: &ProviderRegistry,
        provider_name: &str,
        query: OddsQuery,
        hub_capacity: usize,
        stats: Arc<Stats>,
    ) -> Self {
        let provider = registry.resolve(provider_name);
        tracing::info!(provider = provider.name(), hub_capacity, "odds feed configured");
        Self {
            provider,
            query,
            store: StateStore::new(),
            hub: BroadcastHub::new(hub_capacity, stats.clone()),
            stats,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    /// One full refresh cycle: fetch, diff, publish.
    pub async fn refresh_now(&self) -> Result<ApplyOutcome, FeedError> {
        let started = Instant::now();
        let rows = match self.provider.fetch(&self.query).await {
            Ok(rows) => rows,
            Err(e) => {
                self.stats.inc_refresh_error();
                return Err(FeedError::Refresh(e));
            }
        };
        let outcome = self.apply(rows);
        self.stats.record_refresh(started.elapsed().as_millis() as u64);
        Ok(outcome)
    }

    pub fn apply(&self, rows: Vec<Row>) -> ApplyOutcome {
        let fresh = Arc::new(index_rows(rows));

        let _guard = self.refresh_lock.lock();
        let previous = self.store.current();
        let now = Utc::now();
        let snapshot = Arc::new(Frame::snapshot(sorted_rows(&fresh), now));

        let (frame, outcome) = if previous.is_empty() {
            // An empty set after an empty set carries no news for subscribers that
            // already hold a snapshot; re-sending it would break idempotent refreshes.
            if fresh.is_empty() && self.store.last_snapshot().is_some() {
                (None, ApplyOutcome::Unchanged)
            } else {
                (Some(snapshot.clone()), ApplyOutcome::Snapshot(fresh.len()))
            }
        } else {
            let changes = diff(&previous, &fresh);
            if changes.is_empty() {
                (None, ApplyOutcome::Unchanged)
            } else {
                let n = changes.len();
                (Some(Arc::new(Frame::delta(changes, now))), ApplyOutcome::Delta(n))
            }
        };

        self.store.publish(fresh.clone(), snapshot);
        self.stats.set_rows_in_state(fresh.len() as u64);

        match outcome {
            ApplyOutcome::Snapshot(_) => self.stats.inc_snapshot(),
            ApplyOutcome::Delta(_) => self.stats.inc_delta(),
            ApplyOutcome::Unchanged => self.stats.inc_unchanged(),
        }

        if let Some(frame) = frame {
            if let PublishOutcome::Delivered(n) = self.hub.publish(frame) {
                tracing::debug!(subscribers = n, ?outcome, "frame published");
            }
        }
        outcome
    }

    /// Current rows matching `filter`, sorted by id ignoring case.
    pub fn current_odds(&self, filter: &RowFilter) -> Vec<Row> {
        let state = self.store.current();
        let mut rows: Vec<Row> = state.values().filter(|r| filter.matches(r)).cloned().collect();
        rows.sort_by_cached_key(|r| r.id.to_lowercase());
        rows
    }

    pub fn latest_snapshot(&self) -> Option<Arc<Frame>> {
        self.store.last_snapshot()
    }

    /// Latest snapshot, running one on-demand refresh if none exists yet.
    pub async fn snapshot_or_refresh(&self) -> Result<Arc<Frame>, FeedError> {
        if let Some(s) = self.latest_snapshot() {
            return Ok(s);
        }
        if let Err(e) = self.refresh_now().await {
            tracing::warn!(error = %e, "on-demand refresh failed");
        }
        self.latest_snapshot().ok_or(FeedError::NotReady)
    }

    /// Last snapshot followed by every frame published after this call.
    pub fn subscribe(&self) -> FrameStream {
        // pairing baseline and receiver under the lock leaves no gap between them
        let _guard = self.refresh_lock.lock();
        self.hub.subscribe(self.store.last_snapshot())
    }
}

fn sorted_rows(index: &diff::RowIndex) -> Vec<&Row> {
    let mut rows: Vec<&Row> = index.values().collect();
    rows.sort_by(|a, b| a.id.cmp(&b.id));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tests::row;
    use crate::types::{ChangeOp, FrameType};
    use async_trait::async_trait;
    use futures::{FutureExt, StreamExt};

    struct Scripted {
        rows: Mutex<anyhow::Result<Vec<Row>>>,
    }

    impl Scripted {
        fn set(&self, rows: Vec<Row>) {
            *self.rows.lock() = Ok(rows);
        }
        fn fail(&self) {
            *self.rows.lock() = Err(anyhow::anyhow!("upstream 503"));
        }
    }

    #[async_trait]
    impl OddsProvider for Scripted {
        fn name(&self) -> &str { "mock" }
        async fn fetch(&self, _q: &OddsQuery) -> anyhow::Result<Vec<Row>> {
            match &*self.rows.lock() {
                Ok(rows) => Ok(rows.clone()),
                Err(e) => Err(anyhow::anyhow!("{e}")),
            }
        }
    }

    fn service() -> (Arc<Scripted>, FeedService) {
        let p = Arc::new(Scripted { rows: Mutex::new(Ok(vec![])) });
        let registry = ProviderRegistry::new(vec![p.clone() as Arc<dyn OddsProvider>], "mock").unwrap();
        let svc = FeedService::new(&registry, "mock", OddsQuery::default(), 16, Stats::new(0));
        (p, svc)
    }

    #[tokio::test]
    async fn updates_state_and_snapshot() {
        let (p, svc) = service();
        p.set(vec![row("nba:event1:mock:h2h:home", 110)]);
        assert_eq!(svc.refresh_now().await.unwrap(), ApplyOutcome::Snapshot(1));
        assert_eq!(svc.current_odds(&RowFilter::default()).len(), 1);

        p.set(vec![row("nba:event1:mock:h2h:home", 115), row("nba:event1:mock:h2h:away", -120)]);
        assert_eq!(svc.refresh_now().await.unwrap(), ApplyOutcome::Delta(2));
        assert_eq!(svc.current_odds(&RowFilter::default()).len(), 2);

        let snap = svc.latest_snapshot().unwrap();
        assert_eq!(snap.kind, FrameType::Snapshot);
        assert_eq!(snap.rows.len(), 2);
    }

    #[tokio::test]
    async fn same_rows_twice_emit_one_snapshot() {
        let (_, svc) = service();
        let mut sub = svc.subscribe();
        let rows = vec![row("a", 110), row("b", -110)];

        assert_eq!(svc.apply(rows.clone()), ApplyOutcome::Snapshot(2));
        assert_eq!(svc.apply(rows), ApplyOutcome::Unchanged);

        let first = sub.next().await.unwrap();
        assert_eq!(first.kind, FrameType::Snapshot);
        assert!(sub.next().now_or_never().is_none());
    }

    #[tokio::test]
    async fn delta_scenario_then_silence() {
        let (_, svc) = service();
        svc.apply(vec![row("A", 110)]);
        let mut sub = svc.subscribe();

        svc.apply(vec![row("A", 115), row("B", -120)]);
        svc.apply(vec![row("B", -120)]);
        assert_eq!(svc.apply(vec![row("B", -120)]), ApplyOutcome::Unchanged);

        let baseline = sub.next().await.unwrap();
        assert_eq!(baseline.kind, FrameType::Snapshot);
        assert_eq!(baseline.rows.len(), 1);

        let d1 = sub.next().await.unwrap();
        assert_eq!(d1.kind, FrameType::Delta);
        let ids: Vec<_> = d1.rows.iter().map(|c| (c.op(), c.id())).collect();
        assert_eq!(ids, vec![(ChangeOp::Upsert, "A"), (ChangeOp::Upsert, "B")]);

        let d2 = sub.next().await.unwrap();
        assert_eq!(d2.rows, vec![crate::types::RowChange::remove("A").unwrap()]);
        assert!(sub.next().now_or_never().is_none());
    }

    #[tokio::test]
    async fn failed_fetch_keeps_state_and_counts_error() {
        let (p, svc) = service();
        p.set(vec![row("a", 100)]);
        svc.refresh_now().await.unwrap();

        p.fail();
        assert!(matches!(svc.refresh_now().await, Err(FeedError::Refresh(_))));
        assert_eq!(svc.stats().refresh_errors(), 1);
        assert_eq!(svc.current_odds(&RowFilter::default()).len(), 1);
    }

    #[tokio::test]
    async fn snapshot_or_refresh_reports_not_ready() {
        let (p, svc) = service();
        p.fail();
        assert!(matches!(svc.snapshot_or_refresh().await, Err(FeedError::NotReady)));

        p.set(vec![row("a", 100)]);
        let snap = svc.snapshot_or_refresh().await.unwrap();
        assert_eq!(snap.rows.len(), 1);
    }

    #[tokio::test]
    async fn emptied_state_repopulates_with_snapshot() {
        let (_, svc) = service();
        svc.apply(vec![row("a", 1)]);
        assert_eq!(svc.apply(vec![]), ApplyOutcome::Delta(1));
        assert_eq!(svc.apply(vec![]), ApplyOutcome::Unchanged);
        assert_eq!(svc.apply(vec![row("b", 2)]), ApplyOutcome::Snapshot(1));
    }

    #[tokio::test]
    async fn blank_id_rows_never_produce_a_blank_remove() {
        let (_, svc) = service();
        assert_eq!(svc.apply(vec![row("", 1), row("a", 2)]), ApplyOutcome::Snapshot(1));
        let mut sub = svc.subscribe();
        let baseline = sub.next().await.unwrap();
        assert_eq!(baseline.rows, vec![crate::types::RowChange::upsert(row("a", 2))]);

        assert_eq!(svc.apply(vec![row("a", 2)]), ApplyOutcome::Unchanged);
        assert_eq!(svc.apply(vec![row("b", 3)]), ApplyOutcome::Delta(2));

        let delta = sub.next().await.unwrap();
        assert!(delta.rows.iter().all(|c| !c.id().trim().is_empty()));
        let wire = serde_json::to_string(&*delta).unwrap();
        let decoded: Frame = serde_json::from_str(&wire).unwrap();
        assert_eq!(decoded, *delta);
        assert!(sub.next().now_or_never().is_none());
    }

    #[test]
    fn current_odds_sorted_case_insensitively_and_filtered() {
        let (_, svc) = service();
        let mut totals = row("b-totals", 100);
        totals.market = "totals".into();
        svc.apply(vec![row("C", 1), row("a", 2), totals]);

        let ids: Vec<String> = svc.current_odds(&RowFilter::default()).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b-totals", "C"]);

        let f = RowFilter { sports: vec![], markets: vec!["totals".into()] };
        let ids: Vec<String> = svc.current_odds(&f).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["b-totals"]);
    }

    #[test]
    fn unknown_provider_name_falls_back() {
        let p = Arc::new(Scripted { rows: Mutex::new(Ok(vec![])) });
        let registry = ProviderRegistry::new(vec![p as Arc<dyn OddsProvider>], "mock").unwrap();
        let svc = FeedService::new(&registry, "bogus-provider", OddsQuery::default(), 4, Stats::new(0));
        assert_eq!(svc.provider_name(), "mock");
    }
}
