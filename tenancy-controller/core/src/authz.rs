//! Decides whether an admission request comes from a tenant principal.

use crate::{TenantLookup, SERVICE_ACCOUNTS_GROUP};
use tenancy_controller_k8s_api::{api::authentication::v1 as authn, ResourceExt};
use tokio::time::{self, Duration, Instant};
use tracing::{debug, trace, warn};

/// The caller's identity, as reported by the API server.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub username: String,
    pub groups: UserGroups,
}

/// A sorted, deduplicated set of group names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserGroups(Vec<String>);

/// Groups that grant or revoke tenant principal status.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupPolicy {
    pub allowed: Vec<String>,
    pub excluded: Vec<String>,
}

/// Per-request state threaded through every admission decision.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub user: UserInfo,

    /// Lookups against cluster state must complete before this instant.
    pub deadline: Instant,
}

/// Checks whether the caller is a tenant principal.
///
/// Rules are evaluated in order and the first match decides:
///
/// 1. callers in an excluded group are rejected;
/// 2. service accounts are accepted when their namespace is owned by exactly
///    one Tenant;
/// 3. callers in an allowed group are accepted;
/// 4. everyone else is rejected.
///
/// A lookup that fails or outlives the request deadline rejects the caller.
pub async fn is_tenant_principal<L>(ctx: &RequestContext, policy: &GroupPolicy, lookup: &L) -> bool
where
    L: TenantLookup + ?Sized,
{
    let RequestContext { user, deadline } = ctx;

    if user.groups.intersects(&policy.excluded) {
        debug!(user = %user.username, "Caller belongs to an excluded group");
        return false;
    }

    if user.groups.contains(SERVICE_ACCOUNTS_GROUP) {
        if let Some(namespace) = service_account_namespace(&user.username) {
            let tenants =
                match time::timeout_at(*deadline, lookup.tenants_by_namespace(namespace)).await {
                    Ok(Ok(tenants)) => tenants,
                    Ok(Err(error)) => {
                        warn!(%error, %namespace, "Failed to look up namespace tenants");
                        return false;
                    }
                    Err(_) => {
                        warn!(%namespace, "Timed out looking up namespace tenants");
                        return false;
                    }
                };

            match tenants.len() {
                1 => return true,
                0 => trace!(%namespace, "Namespace is not owned by a tenant"),
                _ => {
                    let claimants = tenants.iter().map(|t| t.name_any()).collect::<Vec<_>>();
                    warn!(%namespace, ?claimants, "Namespace is claimed by multiple tenants");
                }
            }
        }
    }

    user.groups.intersects(&policy.allowed)
}

/// Extracts the namespace from a `system:serviceaccount:<ns>:<name>` username.
fn service_account_namespace(username: &str) -> Option<&str> {
    let mut parts = username.split(':');
    let (_, _, namespace, _) = (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    Some(namespace)
}

// === impl UserInfo ===

impl UserInfo {
    pub fn new(username: impl Into<String>, groups: impl IntoIterator<Item = String>) -> Self {
        Self {
            username: username.into(),
            groups: groups.into_iter().collect(),
        }
    }
}

impl From<&authn::UserInfo> for UserInfo {
    fn from(info: &authn::UserInfo) -> Self {
        Self::new(
            info.username.clone().unwrap_or_default(),
            info.groups.iter().flatten().cloned(),
        )
    }
}

// === impl UserGroups ===

impl UserGroups {
    pub fn contains(&self, group: &str) -> bool {
        self.0.binary_search_by(|g| g.as_str().cmp(group)).is_ok()
    }

    pub fn intersects(&self, groups: &[String]) -> bool {
        groups.iter().any(|g| self.contains(g))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl FromIterator<String> for UserGroups {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        let mut groups = iter.into_iter().collect::<Vec<_>>();
        groups.sort();
        groups.dedup();
        Self(groups)
    }
}

// === impl RequestContext ===

impl RequestContext {
    pub fn new(user: UserInfo, timeout: Duration) -> Self {
        Self {
            user,
            deadline: Instant::now() + timeout,
        }
    }
}
