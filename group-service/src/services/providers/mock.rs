use super::{
    Provider, ProviderError, authoritative_should_be_queried_for_group,
    external_should_be_queried_for_group,
};
use crate::models::{Group, Member};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationMode {
    Success,
    /// Sleeps well past the provider timeout before answering.
    Timeout,
    Error,
}

/// In-memory provider with canned data, used to exercise aggregation.
pub struct MockProvider {
    name: String,
    schac_home_organization: String,
    external: bool,
    supports_members: bool,
    timeout: Duration,
    mode: SimulationMode,
    groups: Vec<Group>,
    members: Vec<Member>,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(name: &str, schac_home_organization: &str, external: bool) -> Self {
        Self {
            name: name.to_string(),
            schac_home_organization: schac_home_organization.to_string(),
            external,
            supports_members: false,
            timeout: Duration::from_millis(500),
            mode: SimulationMode::Success,
            groups: Vec::new(),
            members: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_groups(mut self, groups: Vec<Group>) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_members(mut self, members: Vec<Member>) -> Self {
        self.supports_members = true;
        self.members = members;
        self
    }

    pub fn with_mode(mut self, mode: SimulationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of backend operations invoked so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn simulate(&self) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            SimulationMode::Success => Ok(()),
            SimulationMode::Timeout => {
                tokio::time::sleep(self.timeout * 10).await;
                Ok(())
            }
            SimulationMode::Error => Err(ProviderError::Connection(format!(
                "{} simulated failure",
                self.name
            ))),
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn schac_home_organization(&self) -> &str {
        &self.schac_home_organization
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn is_external_group_provider(&self) -> bool {
        self.external
    }

    fn supports_getting_members_of_group(&self) -> bool {
        self.supports_members
    }

    fn should_be_queried_for_memberships(&self, schac_home_organization: &str) -> bool {
        !self.external || self.schac_home_organization == schac_home_organization
    }

    fn should_be_queried_for_group(&self, group_id: &str) -> bool {
        if self.external {
            external_should_be_queried_for_group(&self.schac_home_organization, group_id)
        } else {
            authoritative_should_be_queried_for_group(&self.schac_home_organization, group_id)
        }
    }

    async fn get_group_memberships(&self, _uid: &str) -> Result<Vec<Group>, ProviderError> {
        self.simulate().await?;
        Ok(self.groups.clone())
    }

    async fn get_group_membership(
        &self,
        _uid: &str,
        group_id: &str,
    ) -> Result<Option<Group>, ProviderError> {
        self.simulate().await?;
        Ok(self.groups.iter().find(|g| g.id == group_id).cloned())
    }

    async fn get_members_of_group(&self, _group_id: &str) -> Result<Vec<Member>, ProviderError> {
        self.simulate().await?;
        Ok(self.members.clone())
    }

    async fn get_all_groups(&self) -> Result<Vec<Group>, ProviderError> {
        self.simulate().await?;
        if self.external {
            Ok(Vec::new())
        } else {
            Ok(self.groups.clone())
        }
    }
}
