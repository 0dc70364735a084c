use super::metrics;
use super::providers::{Provider, ProviderError};
use super::registry::ProviderRegistry;
use crate::models::{Group, Member};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Fans group queries out to the eligible providers and merges the answers.
///
/// Every provider call runs in its own task bounded by that provider's
/// timeout. A failing or slow provider contributes nothing; it never fails
/// the aggregate.
#[derive(Clone)]
pub struct GroupAggregationEngine {
    registry: ProviderRegistry,
}

impl GroupAggregationEngine {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_my_groups(&self, uid: &str, schac_home_organization: &str) -> Vec<Group> {
        let providers = self.registry.for_memberships(schac_home_organization);
        self.collect_memberships(providers, uid).await
    }

    /// Memberships held at external partners only.
    #[tracing::instrument(skip(self))]
    pub async fn get_my_external_groups(
        &self,
        uid: &str,
        schac_home_organization: &str,
    ) -> Vec<Group> {
        let providers = self
            .registry
            .for_memberships(schac_home_organization)
            .into_iter()
            .filter(|p| p.is_external_group_provider())
            .collect();
        self.collect_memberships(providers, uid).await
    }

    /// First present answer wins; the remaining calls are dropped.
    #[tracing::instrument(skip(self))]
    pub async fn get_my_group_by_id(&self, uid: &str, group_id: &str) -> Option<Group> {
        let providers = self.registry.for_group(group_id);
        if providers.is_empty() {
            tracing::debug!("No provider can answer for group");
            return None;
        }

        let uid = uid.to_string();
        let group = group_id.to_string();
        let mut tasks = spawn_calls(&providers, "membership", move |p| {
            let uid = uid.clone();
            let group = group.clone();
            async move { p.get_group_membership(&uid, &group).await }
        });

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Some(Some(found)))) => return Some(found),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Provider task failed"),
            }
        }
        None
    }

    /// Members are listed by a single provider: a matching external one that
    /// supports listing, otherwise the authoritative one if it does.
    #[tracing::instrument(skip(self))]
    pub async fn get_members_of_group(&self, group_id: &str) -> Vec<Member> {
        let provider = self
            .registry
            .external()
            .find(|p| {
                p.should_be_queried_for_group(group_id) && p.supports_getting_members_of_group()
            })
            .or_else(|| {
                self.registry
                    .authoritative()
                    .find(|p| p.supports_getting_members_of_group())
            })
            .cloned();

        let Some(provider) = provider else {
            tracing::debug!("No provider supports member listing for group");
            return Vec::new();
        };

        let fut = {
            let provider = provider.clone();
            let group = group_id.to_string();
            async move { provider.get_members_of_group(&group).await }
        };
        timed_call(provider.as_ref(), "members", fut)
            .await
            .unwrap_or_default()
    }

    /// Full enumeration is only ever asked of the authoritative provider.
    #[tracing::instrument(skip(self))]
    pub async fn get_all_groups(&self) -> Vec<Group> {
        let providers: Vec<Arc<dyn Provider>> = self.registry.authoritative().cloned().collect();
        let results = join_all(spawn_calls(&providers, "all_groups", |p| async move {
            p.get_all_groups().await
        }))
        .await;
        merge_groups(results)
    }

    async fn collect_memberships(&self, providers: Vec<Arc<dyn Provider>>, uid: &str) -> Vec<Group> {
        if providers.is_empty() {
            return Vec::new();
        }

        let uid = uid.to_string();
        let results = join_all(spawn_calls(&providers, "memberships", move |p| {
            let uid = uid.clone();
            async move { p.get_group_memberships(&uid).await }
        }))
        .await;

        let groups = merge_groups(results);
        tracing::debug!(
            providers = providers.len(),
            groups = groups.len(),
            "Aggregated memberships"
        );
        groups
    }
}

/// Spawns one task per provider. Each task yields the provider's index and
/// its result, or `None` when the call failed or timed out.
fn spawn_calls<T, F, Fut>(
    providers: &[Arc<dyn Provider>],
    operation: &'static str,
    call: F,
) -> JoinSet<(usize, Option<T>)>
where
    T: Send + 'static,
    F: Fn(Arc<dyn Provider>) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>> + Send + 'static,
{
    let mut tasks = JoinSet::new();
    for (index, provider) in providers.iter().enumerate() {
        let fut = call(provider.clone());
        let provider = provider.clone();
        tasks.spawn(
            async move { (index, timed_call(provider.as_ref(), operation, fut).await) }
                .instrument(tracing::Span::current()),
        );
    }
    tasks
}

/// Waits for every task and returns the successful results in provider order.
async fn join_all<T: Send + 'static>(mut tasks: JoinSet<(usize, Option<T>)>) -> Vec<T> {
    let mut results = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, Some(value))) => results.push((index, value)),
            Ok((_, None)) => {}
            Err(e) => tracing::error!(error = %e, "Provider task failed"),
        }
    }
    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, value)| value).collect()
}

async fn timed_call<T, Fut>(provider: &dyn Provider, operation: &'static str, fut: Fut) -> Option<T>
where
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let error = match tokio::time::timeout(provider.timeout(), fut).await {
        Ok(Ok(value)) => {
            metrics::record_provider_call(provider.name(), operation, "ok");
            return Some(value);
        }
        Ok(Err(e)) => e,
        Err(_) => ProviderError::Timeout(provider.timeout()),
    };

    tracing::warn!(
        provider = %provider.name(),
        external = provider.is_external_group_provider(),
        operation,
        error = %error,
        "Group provider call failed"
    );
    metrics::record_provider_call(provider.name(), operation, error.outcome());
    None
}

/// Deduplicates by group id, keeping the first occurrence. Callers pass
/// results in registry order, so the authoritative record wins.
fn merge_groups(results: Vec<Vec<Group>>) -> Vec<Group> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .flatten()
        .filter(|g| seen.insert(g.id.clone()))
        .collect()
}
