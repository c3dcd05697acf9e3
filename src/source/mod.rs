pub mod mock;
pub mod the_odds_api;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::FeedError;
use crate::types::{OddsQuery, Row};

/// Abstraction for upstream odds sources (mock generator, The Odds API, etc.)
#[async_trait]
pub trait OddsProvider: Send + Sync {
    /// Registry key, matched case-insensitively.
    fn name(&self) -> &str;

    /// Fetch the current full row set for the query.
    async fn fetch(&self, query: &OddsQuery) -> anyhow::Result<Vec<Row>>;
}

pub use mock::MockOddsProvider;
pub use the_odds_api::TheOddsApiProvider;

/// Name-indexed providers with a designated fallback.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn OddsProvider>>,
    default_name: String,
}

impl ProviderRegistry {
    pub fn new(
        providers: Vec<Arc<dyn OddsProvider>>,
        default_name: &str,
    ) -> Result<Self, FeedError> {
        let providers: HashMap<String, Arc<dyn OddsProvider>> = providers
            .into_iter()
            .map(|p| (p.name().to_lowercase(), p))
            .collect();
        let default_name = default_name.to_lowercase();
        if !providers.contains_key(&default_name) {
            return Err(FeedError::UnknownDefaultProvider(default_name));
        }
        Ok(Self { providers, default_name })
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn OddsProvider>> {
        self.providers.get(&name.to_lowercase()).cloned()
    }

    /// Like `get`, but an unknown name resolves to the default provider.
    pub fn resolve(&self, name: &str) -> Arc<dyn OddsProvider> {
        match self.get(name) {
            Some(p) => p,
            None => {
                tracing::warn!(
                    requested = %name,
                    fallback = %self.default_name,
                    "odds provider not found, falling back to default"
                );
                // presence checked in new()
                self.providers[&self.default_name].clone()
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}
