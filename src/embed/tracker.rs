//! Token usage tracking for embedding cost visibility

use crate::config::TrackingConfig;
use crate::util::tokenizer::count_tokens;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

/// Daily usage counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DayUsage {
    pub embedding_tokens: u64,
    pub embedding_requests: u64,
    pub cache_hits: u64,
}

/// Tracks embedding token spend per day
///
/// Owned by the composition root and injected into the embedding
/// service; state is never reached through global lookup. Persists to a
/// JSON file when a log path is configured, otherwise stays in memory.
pub struct TokenTracker {
    model: String,
    log_path: Option<PathBuf>,
    warn_threshold: u64,
    cost_per_million: f64,
    days: Mutex<HashMap<String, DayUsage>>,
}

impl TokenTracker {
    pub fn new(config: &TrackingConfig, model: impl Into<String>) -> Self {
        let days = config
            .log_path
            .as_ref()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();

        Self {
            model: model.into(),
            log_path: config.log_path.clone(),
            warn_threshold: config.daily_warning_threshold,
            cost_per_million: config.cost_per_million_tokens,
            days: Mutex::new(days),
        }
    }

    fn today() -> String {
        chrono::Utc::now().format("%Y-%m-%d").to_string()
    }

    /// Record one embedding request (or cache hit) and return its token count
    pub fn track_embedding(&self, text: &str, cache_hit: bool) -> usize {
        let tokens = count_tokens(text, &self.model) as u64;
        let today = Self::today();

        let snapshot = {
            let mut days = self.days.lock().expect("tracker state poisoned");
            let entry = days.entry(today).or_default();
            if cache_hit {
                entry.cache_hits += 1;
            } else {
                entry.embedding_tokens += tokens;
                entry.embedding_requests += 1;
            }
            let day_tokens = entry.embedding_tokens;
            let persisted = self.log_path.as_ref().map(|_| days.clone());
            (day_tokens, persisted)
        };

        if let (Some(path), Some(days)) = (&self.log_path, &snapshot.1) {
            if let Ok(content) = serde_json::to_string_pretty(days) {
                if let Err(e) = std::fs::write(path, content) {
                    warn!(error = %e, "failed to persist token usage log");
                }
            }
        }

        if !cache_hit && snapshot.0 >= self.warn_threshold {
            let cost = (snapshot.0 as f64 / 1_000_000.0) * self.cost_per_million;
            warn!(
                tokens = snapshot.0,
                threshold = self.warn_threshold,
                estimated_cost_usd = format!("{cost:.4}"),
                "daily embedding token usage is high"
            );
        }

        tokens as usize
    }

    /// Usage counters for a day (defaults to today)
    pub fn daily_summary(&self, day: Option<&str>) -> DayUsage {
        let key = day.map(|d| d.to_string()).unwrap_or_else(Self::today);
        self.days
            .lock()
            .expect("tracker state poisoned")
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    /// Estimated spend in USD for a day (defaults to today)
    pub fn estimate_cost(&self, day: Option<&str>) -> f64 {
        let usage = self.daily_summary(day);
        (usage.embedding_tokens as f64 / 1_000_000.0) * self.cost_per_million
    }

    /// Days with recorded usage, most recent first
    pub fn recorded_days(&self) -> Vec<String> {
        let mut days: Vec<String> = self
            .days
            .lock()
            .expect("tracker state poisoned")
            .keys()
            .cloned()
            .collect();
        days.sort_unstable_by(|a, b| b.cmp(a));
        days
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> TokenTracker {
        TokenTracker::new(&TrackingConfig::default(), "text-embedding-3-small")
    }

    #[test]
    fn test_tracks_tokens_and_requests() {
        let tracker = tracker();
        let tokens = tracker.track_embedding("hello world of systems", false);
        assert!(tokens > 0);

        let usage = tracker.daily_summary(None);
        assert_eq!(usage.embedding_requests, 1);
        assert_eq!(usage.embedding_tokens, tokens as u64);
        assert_eq!(usage.cache_hits, 0);
    }

    #[test]
    fn test_cache_hits_do_not_count_tokens() {
        let tracker = tracker();
        tracker.track_embedding("hello world", true);

        let usage = tracker.daily_summary(None);
        assert_eq!(usage.cache_hits, 1);
        assert_eq!(usage.embedding_tokens, 0);
        assert_eq!(usage.embedding_requests, 0);
    }

    #[test]
    fn test_cost_estimate() {
        let config = TrackingConfig {
            log_path: None,
            daily_warning_threshold: 1_000_000,
            cost_per_million_tokens: 0.020,
        };
        let tracker = TokenTracker::new(&config, "text-embedding-3-small");
        tracker.track_embedding("one two three four five", false);

        let cost = tracker.estimate_cost(None);
        assert!(cost > 0.0);
        assert!(cost < 0.001);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tokens.json");
        let config = TrackingConfig {
            log_path: Some(path.clone()),
            ..TrackingConfig::default()
        };

        let tracker = TokenTracker::new(&config, "text-embedding-3-small");
        tracker.track_embedding("persist me", false);
        drop(tracker);

        let reloaded = TokenTracker::new(&config, "text-embedding-3-small");
        let usage = reloaded.daily_summary(None);
        assert_eq!(usage.embedding_requests, 1);
    }

    #[test]
    fn test_missing_day_is_empty() {
        let tracker = tracker();
        let usage = tracker.daily_summary(Some("1999-01-01"));
        assert_eq!(usage.embedding_tokens, 0);
    }
}
