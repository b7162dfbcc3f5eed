//! Sentiment filter — blocks trades against extreme crowd sentiment.
//!
//! Reads a fear/greed index (0 = extreme fear, 100 = extreme greed) and an
//! optional news score in [-1, 1] from a `SentimentSource`, cached for a TTL.
//! BUY is blocked in extreme fear and SELL in extreme greed; contrarian mode
//! inverts both rules. A source that is down lets signals through.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::debug;

use crate::domain::{Signal, SignalMetadata, TradeSignal};
use crate::error::StrategyFault;

use super::{FilterInput, FilterOutcome, SignalFilter};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentReading {
    /// Fear/greed index, 0–100.
    pub fear_greed: f64,
    /// News sentiment in [-1, 1].
    pub news_score: f64,
}

/// External sentiment provider. `None` means unavailable.
pub trait SentimentSource: Send + Sync {
    fn fetch(&self) -> Option<SentimentReading>;
}

#[derive(Debug, Default)]
struct TtlCache {
    entry: Option<(Instant, Option<SentimentReading>)>,
}

pub struct SentimentFilter {
    pub fear_threshold: f64,
    pub greed_threshold: f64,
    /// Weight of the news score in the combined score.
    pub news_weight: f64,
    pub contrarian: bool,
    pub enabled: bool,
    ttl: Duration,
    source: Option<Arc<dyn SentimentSource>>,
    cache: Mutex<TtlCache>,
}

impl Default for SentimentFilter {
    fn default() -> Self {
        Self {
            fear_threshold: 25.0,
            greed_threshold: 75.0,
            news_weight: 0.3,
            contrarian: false,
            enabled: true,
            ttl: Duration::from_secs(30 * 60),
            source: None,
            cache: Mutex::new(TtlCache::default()),
        }
    }
}

impl SentimentFilter {
    pub fn with_source(mut self, source: Arc<dyn SentimentSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn reading(&self) -> Option<SentimentReading> {
        let source = self.source.as_ref()?;
        let Ok(mut cache) = self.cache.lock() else {
            return source.fetch();
        };
        if let Some((at, cached)) = cache.entry {
            if at.elapsed() < self.ttl {
                return cached;
            }
        }
        let fresh = source.fetch();
        cache.entry = Some((Instant::now(), fresh));
        fresh
    }

    /// Fear/greed normalised to [-1, 1] blended with the news score.
    pub fn combined_score(&self, reading: &SentimentReading) -> f64 {
        let fng = (reading.fear_greed - 50.0) / 50.0;
        fng * (1.0 - self.news_weight) + reading.news_score * self.news_weight
    }
}

impl std::fmt::Debug for SentimentFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentimentFilter")
            .field("fear_threshold", &self.fear_threshold)
            .field("greed_threshold", &self.greed_threshold)
            .field("news_weight", &self.news_weight)
            .field("contrarian", &self.contrarian)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

impl SignalFilter for SentimentFilter {
    fn name(&self) -> &str {
        "sentiment"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn apply(
        &self,
        signal: &TradeSignal,
        input: &FilterInput<'_>,
    ) -> Result<FilterOutcome, StrategyFault> {
        let reading = match input.context.external_score {
            Some(score) => Some(SentimentReading {
                fear_greed: score,
                news_score: 0.0,
            }),
            None => self.reading(),
        };
        let Some(reading) = reading else {
            debug!(bar = input.index, "sentiment unavailable, passing signal");
            return Ok(FilterOutcome::pass());
        };

        let mut meta = SignalMetadata::new();
        meta.insert("fear_greed".into(), json!(reading.fear_greed));
        meta.insert("news_score".into(), json!(reading.news_score));
        meta.insert("combined_score".into(), json!(self.combined_score(&reading)));

        let fear = reading.fear_greed < self.fear_threshold;
        let greed = reading.fear_greed > self.greed_threshold;
        let blocked = match (signal.signal, self.contrarian) {
            (Signal::Buy, false) => fear.then_some("extreme fear, buy blocked"),
            (Signal::Sell, false) => greed.then_some("extreme greed, sell blocked"),
            (Signal::Buy, true) => greed.then_some("extreme greed, contrarian buy blocked"),
            (Signal::Sell, true) => fear.then_some("extreme fear, contrarian sell blocked"),
            (Signal::Hold, _) => None,
        };
        Ok(match blocked {
            Some(reason) => FilterOutcome::block(
                format!("{reason} (index {:.0})", reading.fear_greed),
                meta,
            ),
            None => FilterOutcome::pass_with(meta),
        })
    }
}
