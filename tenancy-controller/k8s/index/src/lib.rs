//! Tenancy Controller Index
//!
//! Maintains an in-memory view of the cluster's Tenants, fed by a
//! `kubert::index::cluster` watch, and answers the two queries admission
//! decisions need:
//!
//! - which Tenants record a namespace in `status.namespaces`;
//! - which Tenants name a user, or one of its groups, as an owner.
//!
//! Until the watch has delivered its initial list, every query fails with
//! [`LookupError::NotSynced`] so that callers fail closed instead of acting on
//! a partial view.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod metrics;

#[cfg(test)]
mod tests;

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use kubert::index::ClusterRemoved;
use parking_lot::RwLock;
use std::sync::Arc;
use tenancy_controller_core::{LookupError, TenantLookup, UserInfo};
use tenancy_controller_k8s_api::{ResourceExt, Tenant};
use tracing::{debug, warn};

pub type SharedIndex = Arc<RwLock<Index>>;

#[derive(Debug, Default)]
pub struct Index {
    tenants: HashMap<String, Arc<Tenant>>,

    /// Maps each namespace to the names of the Tenants claiming it.
    namespaces: HashMap<String, HashSet<String>>,

    synced: bool,
}

/// A [`TenantLookup`] that reads from a shared index.
#[derive(Clone, Debug)]
pub struct Reader(SharedIndex);

// === impl Index ===

impl Index {
    pub fn shared() -> SharedIndex {
        Arc::new(RwLock::new(Self::default()))
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    /// Lists the Tenants claiming `namespace`, ordered by name.
    pub fn tenants_by_namespace(&self, namespace: &str) -> Result<Vec<Arc<Tenant>>, LookupError> {
        if !self.synced {
            return Err(LookupError::NotSynced);
        }
        let tenants = self
            .namespaces
            .get(namespace)
            .into_iter()
            .flatten()
            .filter_map(|name| self.tenants.get(name).cloned());
        Ok(sorted(tenants))
    }

    /// Lists the Tenants owned by `user`, ordered by name.
    pub fn tenants_by_owner(&self, user: &UserInfo) -> Result<Vec<Arc<Tenant>>, LookupError> {
        if !self.synced {
            return Err(LookupError::NotSynced);
        }
        let tenants = self
            .tenants
            .values()
            .filter(|t| t.is_owned_by(&user.username, user.groups.as_slice()))
            .cloned();
        Ok(sorted(tenants))
    }

    /// The number of namespaces claimed by more than one Tenant.
    pub fn conflicting_namespaces(&self) -> usize {
        self.namespaces.values().filter(|t| t.len() > 1).count()
    }

    pub fn namespaces_len(&self) -> usize {
        self.namespaces.len()
    }

    fn unindex(&mut self, name: &str) -> Option<Arc<Tenant>> {
        let tenant = self.tenants.remove(name)?;
        for namespace in namespaces(&tenant) {
            if let Some(claimants) = self.namespaces.get_mut(namespace) {
                claimants.remove(name);
                if claimants.is_empty() {
                    self.namespaces.remove(namespace);
                }
            }
        }
        Some(tenant)
    }
}

impl kubert::index::IndexClusterResource<Tenant> for Index {
    fn apply(&mut self, tenant: Tenant) {
        let name = tenant.name_unchecked();
        self.unindex(&name);

        for namespace in namespaces(&tenant) {
            let claimants = self.namespaces.entry(namespace.to_string()).or_default();
            claimants.insert(name.clone());
            if claimants.len() > 1 {
                warn!(%namespace, tenants = ?claimants, "Namespace is claimed by multiple tenants");
            }
        }
        debug!(tenant = %name, size = tenant.size(), "Indexed tenant");
        self.tenants.insert(name, Arc::new(tenant));
    }

    fn delete(&mut self, name: String) {
        if self.unindex(&name).is_some() {
            debug!(tenant = %name, "Removed tenant");
        }
    }

    fn reset(&mut self, tenants: Vec<Tenant>, removed: ClusterRemoved) {
        for name in removed {
            self.delete(name);
        }
        for tenant in tenants {
            self.apply(tenant);
        }
        if !self.synced {
            debug!(tenants = self.tenants.len(), "Tenant index synced");
        }
        self.synced = true;
    }
}

fn namespaces(tenant: &Tenant) -> impl Iterator<Item = &str> {
    tenant
        .status
        .iter()
        .flat_map(|status| status.namespaces.iter().map(String::as_str))
}

fn sorted(tenants: impl Iterator<Item = Arc<Tenant>>) -> Vec<Arc<Tenant>> {
    let mut tenants = tenants.collect::<Vec<_>>();
    tenants.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
    tenants
}

// === impl Reader ===

impl Reader {
    pub fn new(index: SharedIndex) -> Self {
        Self(index)
    }
}

#[async_trait::async_trait]
impl TenantLookup for Reader {
    async fn tenants_by_namespace(&self, namespace: &str) -> Result<Vec<Arc<Tenant>>, LookupError> {
        self.0.read().tenants_by_namespace(namespace)
    }

    async fn tenants_by_owner(&self, user: &UserInfo) -> Result<Vec<Arc<Tenant>>, LookupError> {
        self.0.read().tenants_by_owner(user)
    }
}
