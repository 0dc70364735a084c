use super::cache::DecisionCache;
use super::validator::{RemoteIntrospectionValidator, TokenValidator};
use crate::config::{ConfigError, DecisionCacheConfig, TokenValidatorConfig};
use crate::models::ValidationVerdict;
use crate::services::metrics;
use std::sync::Arc;

/// Ordered validators, first positive verdict wins, fronted by the
/// decision cache when enabled.
#[derive(Clone)]
pub struct TokenValidationChain {
    validators: Vec<Arc<dyn TokenValidator>>,
    cache: Option<Arc<DecisionCache>>,
}

impl TokenValidationChain {
    pub fn new(validators: Vec<Arc<dyn TokenValidator>>, cache: Option<Arc<DecisionCache>>) -> Self {
        Self { validators, cache }
    }

    pub fn from_config(
        validators: &[TokenValidatorConfig],
        cache: &DecisionCacheConfig,
    ) -> Result<Self, ConfigError> {
        let validators = validators
            .iter()
            .map(|config| {
                tracing::info!(validator = %config.name, url = %config.url, "Configuring token validator");
                RemoteIntrospectionValidator::new(config)
                    .map(|v| Arc::new(v) as Arc<dyn TokenValidator>)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let cache = cache
            .enabled
            .then(|| Arc::new(DecisionCache::new(cache.ttl())));

        Ok(Self::new(validators, cache))
    }

    pub fn cache(&self) -> Option<&Arc<DecisionCache>> {
        self.cache.as_ref()
    }

    pub async fn validate(&self, token: &str) -> ValidationVerdict {
        if let Some(cache) = &self.cache {
            if let Some(verdict) = cache.get(token) {
                metrics::record_cache_lookup("hit");
                return verdict;
            }
            metrics::record_cache_lookup("miss");
        }

        let Some(verdict) = self.evaluate(token).await else {
            return ValidationVerdict::invalid();
        };

        if let Some(cache) = &self.cache {
            cache.put(token, verdict.clone());
        }
        verdict
    }

    /// Runs the validators in order. Returns `None` when none of them
    /// produced an answer, so an outage of every validator denies the token
    /// without leaving a cached negative behind.
    async fn evaluate(&self, token: &str) -> Option<ValidationVerdict> {
        let mut answered = false;
        for validator in &self.validators {
            match validator.validate(token).await {
                Ok(verdict) if verdict.valid => {
                    tracing::debug!(validator = %validator.name(), "Token accepted");
                    return Some(verdict);
                }
                Ok(_) => {
                    answered = true;
                    tracing::debug!(validator = %validator.name(), "Token not accepted");
                }
                Err(e) => {
                    tracing::warn!(validator = %validator.name(), error = %e, "Token validator unavailable");
                }
            }
        }
        answered.then(ValidationVerdict::invalid)
    }
}
