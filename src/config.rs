use serde::Deserialize;

use crate::feed::hub::DEFAULT_CAPACITY;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub provider: String,
    pub api_key: Option<String>,
    pub api_host: String,
    pub regions: String,

    // Empty means "everything the provider offers"
    #[serde(default)]
    pub sports: Vec<String>,
    #[serde(default)]
    pub markets: Vec<String>,

    pub refresh_sec: u64,
    pub fetch_timeout_ms: u64,

    pub hub_capacity: usize,
    pub heartbeat_sec: u64,
    pub bind_addr: String,

    // Stats
    pub stats_log_sec: u64,
    pub stats_jsonl_path: Option<String>,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_source(
            config::Environment::with_prefix("ODDS")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("sports")
                .with_list_parse_key("markets"),
        )
    }

    fn from_source<S>(source: S) -> anyhow::Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let c = config::Config::builder()
            .set_default("provider", "mock")?
            .set_default("api_host", "https://api.the-odds-api.com/v4")?
            .set_default("regions", "us")?
            .set_default("refresh_sec", 15)?
            .set_default("fetch_timeout_ms", 10_000)?
            .set_default("hub_capacity", DEFAULT_CAPACITY as u64)?
            .set_default("heartbeat_sec", 20)?
            .set_default("bind_addr", "0.0.0.0:8080")?
            .set_default("stats_log_sec", 60)?
            .add_source(source)
            .build()?;
        let mut s: Settings = c.try_deserialize()?;
        s.sports.retain(|x| !x.trim().is_empty());
        s.markets.retain(|x| !x.trim().is_empty());
        s.refresh_sec = s.refresh_sec.max(1);
        s.hub_capacity = s.hub_capacity.max(1);
        s.heartbeat_sec = s.heartbeat_sec.max(1);
        Ok(s)
    }
}
