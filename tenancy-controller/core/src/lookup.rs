use crate::UserInfo;
use std::sync::Arc;
use tenancy_controller_k8s_api::Tenant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LookupError {
    /// The index has not yet observed the initial list of Tenants, so an
    /// empty answer would be indistinguishable from a wrong one.
    #[error("tenant index is not synced")]
    NotSynced,

    #[error("tenant lookup failed: {0}")]
    Unavailable(#[from] anyhow::Error),
}

/// Read access to the cluster's Tenants.
#[async_trait::async_trait]
pub trait TenantLookup: Send + Sync {
    /// Lists the Tenants whose `status.namespaces` contains `namespace`.
    async fn tenants_by_namespace(&self, namespace: &str) -> Result<Vec<Arc<Tenant>>, LookupError>;

    /// Lists the Tenants that name `user`, or one of its groups, as an owner.
    async fn tenants_by_owner(&self, user: &UserInfo) -> Result<Vec<Arc<Tenant>>, LookupError>;
}

#[async_trait::async_trait]
impl<L: TenantLookup + ?Sized> TenantLookup for Arc<L> {
    async fn tenants_by_namespace(&self, namespace: &str) -> Result<Vec<Arc<Tenant>>, LookupError> {
        (**self).tenants_by_namespace(namespace).await
    }

    async fn tenants_by_owner(&self, user: &UserInfo) -> Result<Vec<Arc<Tenant>>, LookupError> {
        (**self).tenants_by_owner(user).await
    }
}
