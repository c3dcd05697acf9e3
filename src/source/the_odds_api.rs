use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::{stream, StreamExt};
use reqwest::StatusCode;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::source::OddsProvider;
use crate::types::{OddsQuery, Row};

const SPORT_CONCURRENCY: usize = 4;

/// Client for https://the-odds-api.com (v4).
#[derive(Clone)]
pub struct TheOddsApiProvider {
    host: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl TheOddsApiProvider {
    pub fn new(host: String, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build odds api http client")?;
        Ok(Self {
            host,
            api_key: api_key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()),
            http,
        })
    }

    async fn fetch_sport(&self, api_key: &str, sport: &str, query: &OddsQuery) -> Result<Vec<Row>> {
        let url = format!("{}/sports/{}/odds", self.host.trim_end_matches('/'), sport);
        let markets = if query.markets.is_empty() {
            "h2h".to_string()
        } else {
            query.markets.join(",")
        };
        let regions = if query.regions.trim().is_empty() { "us" } else { query.regions.as_str() };

        tracing::debug!(sport = %sport, markets = %markets, regions = %regions, "fetching odds");

        let resp = self.http
            .get(&url)
            .query(&[
                ("apiKey", api_key),
                ("regions", regions),
                ("markets", markets.as_str()),
                ("oddsFormat", "american"),
                ("dateFormat", "unix"),
            ])
            .send()
            .await
            .with_context(|| format!("GET /sports/{sport}/odds failed"))?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(sport = %sport, "the odds api rate limit reached");
            anyhow::bail!("GET /sports/{sport}/odds rate limited");
        }

        let events: Vec<EventItem> = resp
            .error_for_status()
            .with_context(|| format!("GET /sports/{sport}/odds non-200"))?
            .json()
            .await
            .with_context(|| format!("decode /sports/{sport}/odds json failed"))?;

        Ok(map_events(sport, events, Utc::now()))
    }
}

#[async_trait]
impl OddsProvider for TheOddsApiProvider {
    fn name(&self) -> &str {
        "theoddsapi"
    }

    async fn fetch(&self, query: &OddsQuery) -> Result<Vec<Row>> {
        let api_key = self
            .api_key
            .as_deref()
            .context("ODDS_API_KEY is required for theoddsapi provider")?;

        let sports: Vec<String> = if query.sports.is_empty() {
            vec!["upcoming".to_string()]
        } else {
            query.sports.clone()
        };

        let fetches: Vec<_> = sports
            .iter()
            .map(|sport| self.fetch_sport(api_key, sport, query))
            .collect();
        let mut pages = stream::iter(fetches).buffer_unordered(SPORT_CONCURRENCY);

        // A partial row set would read as mass removals downstream, so one failed
        // sport fails the whole fetch.
        let mut out = Vec::new();
        while let Some(page) = pages.next().await {
            out.extend(page?);
        }
        Ok(out)
    }
}

fn map_events(sport: &str, events: Vec<EventItem>, now: DateTime<Utc>) -> Vec<Row> {
    let mut rows = Vec::new();
    for ev in events {
        let title = if ev.home_team.is_empty() || ev.away_team.is_empty() {
            ev.sport_title.clone()
        } else {
            format!("{} vs {}", ev.home_team, ev.away_team)
        };
        let starts_at = ev
            .commence_time
            .and_then(|t| Utc.timestamp_opt(t, 0).single())
            .unwrap_or(now);

        for book in ev.bookmakers {
            let book_title = if book.title.is_empty() { book.key.clone() } else { book.title.clone() };
            for market in book.markets {
                for outcome in market.outcomes {
                    let id = [
                        sport,
                        ev.id.as_str(),
                        book.key.as_str(),
                        market.key.as_str(),
                        normalize(&outcome.name).as_str(),
                    ]
                    .join(":");
                    let mut extra: BTreeMap<String, serde_json::Value> = BTreeMap::new();
                    extra.insert("source".to_string(), "theoddsapi".into());

                    rows.push(Row {
                        id,
                        sport: sport.to_string(),
                        event: title.clone(),
                        market: market.key.clone(),
                        line: outcome.point.and_then(Decimal::from_f64),
                        price: outcome.price.map(|p| p.round() as i32),
                        book: book_title.clone(),
                        starts_at,
                        updated_at: now,
                        extra,
                    });
                }
            }
        }
    }
    rows
}

fn normalize(s: &str) -> String {
    s.to_lowercase().replace(' ', "-")
}

#[derive(Debug, Clone, Deserialize)]
struct EventItem {
    id: String,
    #[serde(default)]
    sport_title: String,
    #[serde(default)]
    commence_time: Option<i64>,
    #[serde(default)]
    home_team: String,
    #[serde(default)]
    away_team: String,
    #[serde(default)]
    bookmakers: Vec<BookmakerItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct BookmakerItem {
    key: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    markets: Vec<MarketItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct MarketItem {
    key: String,
    #[serde(default)]
    outcomes: Vec<OutcomeItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct OutcomeItem {
    name: String,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    point: Option<f64>,
}
