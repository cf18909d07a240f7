//! Tenant resource fragments shared by every served version.
//!
//! Only the pieces that differ between versions (owners, namespace options,
//! ingress options and the lifecycle flags) are defined in the versioned
//! modules; everything else is structurally identical and lives here.

pub mod v1beta1;
pub mod v1beta2;

use k8s_openapi::api::{
    core::v1::{LimitRangeSpec, ResourceQuotaSpec as CoreResourceQuotaSpec},
    networking::v1::NetworkPolicySpec as CoreNetworkPolicySpec,
    rbac::v1::Subject,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BTreeMap, fmt};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum OwnerKind {
    User,
    Group,
    ServiceAccount,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ProxyServiceKind {
    Nodes,
    StorageClasses,
    IngressClasses,
    PriorityClasses,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ProxyOperation {
    List,
    Update,
    Delete,
}

/// Grants an owner access to cluster-scoped resources through the proxy.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProxySettings {
    pub kind: ProxyServiceKind,
    pub operations: Vec<ProxyOperation>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AllowedListSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub allowed_regex: String,
}

/// Metadata keys that tenant owners may not set on their namespaces.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForbiddenListSpec {
    #[serde(default, rename = "denied", skip_serializing_if = "Vec::is_empty")]
    pub exact: Vec<String>,
    #[serde(default, rename = "deniedRegex", skip_serializing_if = "String::is_empty")]
    pub regex: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalMetadataSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOptions {
    pub additional_metadata: Option<AdditionalMetadataSpec>,
    pub allowed_services: Option<AllowedServices>,
    #[serde(rename = "externalIPs")]
    pub external_ips: Option<ExternalServiceIPsSpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AllowedServices {
    pub node_port: Option<bool>,
    pub external_name: Option<bool>,
    pub load_balancer: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct ExternalServiceIPsSpec {
    pub allowed: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum HostnameCollisionScope {
    Cluster,
    Tenant,
    Namespace,
    #[default]
    Disabled,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct NetworkPolicySpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<CoreNetworkPolicySpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct LimitRangesSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<LimitRangeSpec>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ResourceQuotaScope {
    #[default]
    Tenant,
    Namespace,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct ResourceQuotaSpec {
    #[serde(default)]
    pub scope: ResourceQuotaScope,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<CoreResourceQuotaSpec>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalRoleBindingsSpec {
    pub cluster_role_name: String,
    pub subjects: Vec<Subject>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ImagePullPolicySpec {
    Always,
    Never,
    IfNotPresent,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum TenantState {
    #[default]
    Active,
    Cordoned,
}

/// Observed state of a Tenant; `namespaces` is the authoritative record of
/// the namespaces reconciled to it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TenantStatus {
    #[serde(default)]
    pub size: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub state: TenantState,
}

// === impl OwnerKind ===

impl OwnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Group => "Group",
            Self::ServiceAccount => "ServiceAccount",
        }
    }

    /// Checks whether a principal of this kind, named `name`, is the caller.
    pub fn matches(&self, name: &str, username: &str, groups: &[String]) -> bool {
        match self {
            Self::User | Self::ServiceAccount => name == username,
            Self::Group => groups.iter().any(|g| g == name),
        }
    }

    /// Orders kinds by their serialized names.
    pub fn cmp_name(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl ForbiddenListSpec ===

impl ForbiddenListSpec {
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.regex.is_empty()
    }
}

// === impl TenantState ===

impl fmt::Display for TenantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("Active"),
            Self::Cordoned => f.write_str("Cordoned"),
        }
    }
}
