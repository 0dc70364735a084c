use super::providers::{Provider, build_provider};
use crate::config::{ConfigError, ProviderConfig};
use std::sync::Arc;

/// The fixed set of configured providers, built once at startup.
///
/// Providers are kept with the authoritative one first so that merges which
/// walk results in registry order give it precedence.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: Arc<[Arc<dyn Provider>]>,
}

impl ProviderRegistry {
    pub fn new(mut providers: Vec<Arc<dyn Provider>>) -> Self {
        providers.sort_by_key(|p| p.is_external_group_provider());
        Self {
            providers: providers.into(),
        }
    }

    pub fn from_configs(configs: Vec<ProviderConfig>) -> Result<Self, ConfigError> {
        let providers = configs
            .into_iter()
            .map(build_provider)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(providers))
    }

    pub fn all(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn authoritative(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.providers
            .iter()
            .filter(|p| !p.is_external_group_provider())
    }

    pub fn external(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.providers
            .iter()
            .filter(|p| p.is_external_group_provider())
    }

    pub fn for_memberships(&self, schac_home_organization: &str) -> Vec<Arc<dyn Provider>> {
        self.providers
            .iter()
            .filter(|p| p.should_be_queried_for_memberships(schac_home_organization))
            .cloned()
            .collect()
    }

    pub fn for_group(&self, group_id: &str) -> Vec<Arc<dyn Provider>> {
        self.providers
            .iter()
            .filter(|p| p.should_be_queried_for_group(group_id))
            .cloned()
            .collect()
    }
}
