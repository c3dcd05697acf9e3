use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use crate::source::OddsProvider;
use crate::types::{OddsQuery, Row};

const BOOKS: [&str; 3] = ["FlashBet", "NorthStar", "EdgePlay"];
const MARKETS: [&str; 3] = ["h2h", "spreads", "totals"];

#[derive(Debug, Clone)]
struct MockEvent {
    sport: &'static str,
    league: &'static str,
    key: &'static str,
    home: &'static str,
    away: &'static str,
    starts_at: DateTime<Utc>,
}

impl MockEvent {
    fn display(&self) -> String {
        format!("{} vs {}", self.home, self.away)
    }
}

/// Synthetic odds for a fixed slate of games. Prices move randomly on every
/// fetch, which makes it handy for exercising the delta path end to end.
pub struct MockOddsProvider {
    events: Vec<MockEvent>,
    rng: Mutex<StdRng>,
}

impl MockOddsProvider {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let now = Utc::now();
        let events = vec![
            MockEvent {
                sport: "nfl", league: "NFL", key: "sb-59",
                home: "Kansas City Chiefs", away: "San Francisco 49ers",
                starts_at: now + Duration::days(30),
            },
            MockEvent {
                sport: "nba", league: "NBA", key: "bos-den",
                home: "Boston Celtics", away: "Denver Nuggets",
                starts_at: now + Duration::hours(12),
            },
            MockEvent {
                sport: "nhl", league: "NHL", key: "nyr-bos",
                home: "New York Rangers", away: "Boston Bruins",
                starts_at: now + Duration::days(3),
            },
            MockEvent {
                sport: "mlb", league: "MLB", key: "nyy-lad",
                home: "New York Yankees", away: "Los Angeles Dodgers",
                starts_at: now + Duration::hours(18),
            },
        ];
        Self { events, rng: Mutex::new(rng) }
    }

    fn generate(&self, query: &OddsQuery) -> Vec<Row> {
        let markets: Vec<&str> = if query.markets.is_empty() {
            MARKETS.to_vec()
        } else {
            query.markets.iter().map(String::as_str).collect()
        };
        let now = Utc::now();

        let mut rng = self.rng.lock();
        let mut rows = Vec::new();
        for ev in &self.events {
            if !query.sports.is_empty() && !query.sports.iter().any(|s| s == ev.sport) {
                continue;
            }
            for book in BOOKS {
                rows.extend(self.rows_for_event(&mut *rng, ev, book, &markets, now));
            }
        }
        rows
    }

    fn build_row(
        &self,
        rng: &mut StdRng,
        ev: &MockEvent,
        book: &str,
        market: &str,
        participant: &str,
        line: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Row {
        let runner = participant.to_lowercase().replace(' ', "-");
        let mut extra: BTreeMap<String, serde_json::Value> = BTreeMap::new();
        extra.insert("league".to_string(), ev.league.into());
        extra.insert("participant".to_string(), participant.into());
        extra.insert("source".to_string(), "mock".into());

        Row {
            id: format!(
                "{}:{}:{}:{}:{}:{}",
                ev.sport, ev.league, ev.key, book.to_lowercase(), market, runner
            ),
            sport: ev.sport.to_string(),
            event: ev.display(),
            market: market.to_string(),
            line,
            price: Some(american_odds(rng)),
            book: book.to_string(),
            starts_at: ev.starts_at,
            updated_at: now,
            extra,
        }
    }

    fn rows_for_event(
        &self,
        rng: &mut StdRng,
        ev: &MockEvent,
        book: &str,
        markets: &[&str],
        now: DateTime<Utc>,
    ) -> Vec<Row> {
        let mut out = Vec::new();
        for market in markets {
            match *market {
                "h2h" => {
                    out.push(self.build_row(rng, ev, book, "h2h", ev.home, None, now));
                    out.push(self.build_row(rng, ev, book, "h2h", ev.away, None, now));
                }
                "spreads" => {
                    let home = round_half(rng.gen_range(-7.5..-0.5));
                    let away = round_half(rng.gen_range(0.5..7.5));
                    out.push(self.build_row(rng, ev, book, "spreads", ev.home, Some(home), now));
                    out.push(self.build_row(rng, ev, book, "spreads", ev.away, Some(away), now));
                }
                "totals" => {
                    let total = round_half(rng.gen_range(180.5..240.5));
                    out.push(self.build_row(rng, ev, book, "totals", "Over", Some(total), now));
                    out.push(self.build_row(rng, ev, book, "totals", "Under", Some(total), now));
                }
                _ => {}
            }
        }
        out
    }
}

impl Default for MockOddsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OddsProvider for MockOddsProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, query: &OddsQuery) -> anyhow::Result<Vec<Row>> {
        Ok(self.generate(query))
    }
}

fn american_odds(rng: &mut StdRng) -> i32 {
    let base = rng.gen_range(70..140);
    if rng.gen_bool(0.5) { base } else { -base }
}

fn round_half(v: f64) -> Decimal {
    // nearest 0.5
    Decimal::from((v * 2.0).round() as i64) / Decimal::TWO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_slate_without_filters() {
        let p = MockOddsProvider::seeded(7);
        let rows = p.fetch(&OddsQuery::default()).await.unwrap();
        // 4 events x 3 books x 3 markets x 2 runners
        assert_eq!(rows.len(), 72);

        let mut ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 72);
        assert!(ids.contains(&"nba:NBA:bos-den:flashbet:h2h:boston-celtics"));
    }

    #[tokio::test]
    async fn honours_sport_and_market_filters() {
        let p = MockOddsProvider::seeded(7);
        let q = OddsQuery {
            sports: vec!["nba".into()],
            markets: vec!["totals".into()],
            regions: "us".into(),
        };
        let rows = p.fetch(&q).await.unwrap();
        assert_eq!(rows.len(), 6);
        for r in &rows {
            assert_eq!(r.sport, "nba");
            assert_eq!(r.market, "totals");
            let line = r.line.unwrap();
            assert_eq!(line * Decimal::TWO, (line * Decimal::TWO).trunc());
        }
    }

    #[tokio::test]
    async fn prices_are_american_odds() {
        let p = MockOddsProvider::seeded(42);
        for r in p.fetch(&OddsQuery::default()).await.unwrap() {
            let px = r.price.unwrap().abs();
            assert!((70..140).contains(&px), "price {px}");
        }
    }
}
