use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use odds_feed::config::Settings;
use odds_feed::feed::{FeedService, RefreshScheduler};
use odds_feed::http::{create_router, AppState};
use odds_feed::source::{MockOddsProvider, OddsProvider, ProviderRegistry, TheOddsApiProvider};
use odds_feed::stats::Stats;
use odds_feed::types::OddsQuery;

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

async fn maybe_write_jsonl(path: &Option<String>, line: &str) {
    let Some(p) = path.as_ref().map(|x| x.trim().to_string()).filter(|x| !x.is_empty()) else {
        return;
    };
    if let Err(e) = append_line(&p, line).await {
        tracing::warn!(path = %p, error = %e, "failed to write stats jsonl");
    }
}

async fn append_line(path: &str, line: &str) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;
    let mut f = tokio::fs::OpenOptions::new().create(true).append(true).open(path).await?;
    f.write_all(line.as_bytes()).await?;
    f.write_all(b"\n").await
}

async fn stats_loop(stats: Arc<Stats>, every_sec: u64, jsonl_path: Option<String>, cancel: CancellationToken) {
    if every_sec == 0 {
        return;
    }
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let t = now_ms();
        if !stats.should_log(t, every_sec) {
            continue;
        }
        let ss = stats.snapshot(t);
        stats.mark_logged(t);

        let line = serde_json::to_string(&ss).unwrap_or_default();
        tracing::info!(
            up_sec = ss.up_sec,
            refreshes = ss.refreshes,
            refresh_errors = ss.refresh_errors,
            last_refresh_ms = ss.last_refresh_ms,
            rows = ss.rows_in_state,
            snapshots = ss.snapshots,
            deltas = ss.deltas,
            published = ss.frames_published,
            dropped = ss.frames_dropped,
            subscribers = ss.subscribers,
            "stats"
        );

        maybe_write_jsonl(&jsonl_path, &line).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let s = Settings::from_env()?;
    let stats = Stats::new(now_ms());

    let providers: Vec<Arc<dyn OddsProvider>> = vec![
        Arc::new(MockOddsProvider::new()),
        Arc::new(TheOddsApiProvider::new(
            s.api_host.clone(),
            s.api_key.clone(),
            Duration::from_millis(s.fetch_timeout_ms),
        )?),
    ];
    let registry = ProviderRegistry::new(providers, "mock")?;
    tracing::info!(available = ?registry.names(), requested = %s.provider, "providers registered");

    let query = OddsQuery {
        sports: s.sports.clone(),
        markets: s.markets.clone(),
        regions: s.regions.clone(),
    };
    let feed = Arc::new(FeedService::new(&registry, &s.provider, query, s.hub_capacity, stats.clone()));

    let cancel = CancellationToken::new();
    let scheduler = RefreshScheduler::start(feed.clone(), Duration::from_secs(s.refresh_sec), cancel.clone());
    let stats_task = tokio::spawn(stats_loop(
        stats.clone(),
        s.stats_log_sec,
        s.stats_jsonl_path.clone(),
        cancel.clone(),
    ));

    let app = create_router(AppState::new(
        feed,
        Duration::from_secs(s.heartbeat_sec),
        cancel.clone(),
    ));
    let listener = TcpListener::bind(&s.bind_addr)
        .await
        .with_context(|| format!("bind {}", s.bind_addr))?;
    tracing::info!(addr = %s.bind_addr, "listening");

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutdown requested");
            shutdown.cancel();
        })
        .await?;

    scheduler.shutdown().await;
    let _ = stats_task.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_line_writes_and_reports_failures() {
        let dir = std::env::temp_dir().join(format!("odds-feed-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let file = dir.join("stats.jsonl");
        let file = file.to_str().unwrap();

        append_line(file, r#"{"refreshes":1}"#).await.unwrap();
        append_line(file, r#"{"refreshes":2}"#).await.unwrap();
        let body = tokio::fs::read_to_string(file).await.unwrap();
        assert_eq!(body, "{\"refreshes\":1}\n{\"refreshes\":2}\n");

        let missing = dir.join("no-such-dir").join("stats.jsonl");
        assert!(append_line(missing.to_str().unwrap(), "{}").await.is_err());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
