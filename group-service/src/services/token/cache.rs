use crate::models::ValidationVerdict;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    verdict: ValidationVerdict,
    inserted_at: Instant,
}

/// Verdicts keyed by raw token, fresh for a fixed TTL from insertion.
///
/// Expired entries read as absent. Whole entries are swapped on write, so a
/// reader never sees a half-written verdict.
#[derive(Debug)]
pub struct DecisionCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl DecisionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, token: &str) -> Option<ValidationVerdict> {
        let expired = match self.entries.get(token) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                return Some(entry.verdict.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries
                .remove_if(token, |_, entry| entry.inserted_at.elapsed() >= self.ttl);
        }
        None
    }

    pub fn put(&self, token: &str, verdict: ValidationVerdict) {
        self.entries.insert(
            token.to_string(),
            CacheEntry {
                verdict,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Background sweep bounding memory; correctness does not depend on it.
    pub fn spawn_eviction(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = cache.evict_expired();
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = cache.len(), "Evicted expired token decisions");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ValidationVerdict {
        ValidationVerdict {
            valid: true,
            principal: Some("urn:collab:person:example.org:admin".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = DecisionCache::new(Duration::from_secs(60));
        cache.put("token", valid());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("token"), Some(valid()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("token"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_replaces_previous_verdict() {
        let cache = DecisionCache::new(Duration::from_secs(60));
        cache.put("token", ValidationVerdict::invalid());
        tokio::time::advance(Duration::from_secs(30)).await;
        cache.put("token", valid());

        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(cache.get("token"), Some(valid()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_expired() {
        let cache = DecisionCache::new(Duration::from_secs(10));
        cache.put("old", valid());
        tokio::time::advance(Duration::from_secs(5)).await;
        cache.put("new", valid());
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("new").is_some());
    }

    fn verdict_for(writer: usize) -> ValidationVerdict {
        ValidationVerdict {
            valid: true,
            principal: Some(format!("urn:collab:person:example.org:user{}", writer)),
            client_id: Some(format!("client{}", writer)),
            scopes: vec!["read".to_string(), format!("scope{}", writer)],
            organization: Some("example.org".to_string()),
            issuer: Some(format!("validator{}", writer)),
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_put_and_get_never_tear() {
        const WRITERS: usize = 8;
        const ROUNDS: usize = 500;

        let cache = Arc::new(DecisionCache::new(Duration::from_secs(60)));
        let written: Vec<ValidationVerdict> = (0..WRITERS).map(verdict_for).collect();

        let mut tasks = tokio::task::JoinSet::new();
        for writer in 0..WRITERS {
            let cache = Arc::clone(&cache);
            let written = written.clone();
            tasks.spawn(async move {
                for round in 0..ROUNDS {
                    let token = format!("token{}", round % 4);
                    cache.put(&token, verdict_for(writer));
                    if let Some(seen) = cache.get(&format!("token{}", (round + writer) % 4)) {
                        assert!(written.contains(&seen), "unexpected verdict {:?}", seen);
                    }
                    tokio::task::yield_now().await;
                }
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap();
        }

        assert_eq!(cache.len(), 4);
        for token in 0..4 {
            let seen = cache.get(&format!("token{}", token)).unwrap();
            assert!(written.contains(&seen));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_eviction() {
        let cache = Arc::new(DecisionCache::new(Duration::from_secs(10)));
        cache.put("token", valid());
        let handle = cache.spawn_eviction(Duration::from_secs(15));

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(cache.is_empty());
        handle.abort();
    }
}
