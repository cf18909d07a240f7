pub use super::TenantStatus;
use super::{
    AdditionalMetadataSpec, AdditionalRoleBindingsSpec, AllowedListSpec, HostnameCollisionScope,
    ImagePullPolicySpec, LimitRangesSpec, NetworkPolicySpec, OwnerKind, ProxySettings,
    ResourceQuotaSpec, ServiceOptions,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The older Tenant shape. Owner cluster roles, forbidden namespace metadata,
/// wildcard hostnames and the lifecycle flags are carried as annotations.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "capsule.clastix.io",
    version = "v1beta1",
    kind = "Tenant",
    shortname = "tnt",
    status = "TenantStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct TenantSpec {
    #[serde(default)]
    pub owners: Vec<OwnerSpec>,
    pub namespace_options: Option<NamespaceOptions>,
    pub service_options: Option<ServiceOptions>,
    pub storage_classes: Option<AllowedListSpec>,
    #[serde(default)]
    pub ingress_options: IngressOptions,
    pub container_registries: Option<AllowedListSpec>,
    pub node_selector: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub network_policies: NetworkPolicySpec,
    #[serde(default)]
    pub limit_ranges: LimitRangesSpec,
    #[serde(default)]
    pub resource_quotas: ResourceQuotaSpec,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_role_bindings: Vec<AdditionalRoleBindingsSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_policies: Vec<ImagePullPolicySpec>,
    pub priority_classes: Option<AllowedListSpec>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSpec {
    pub kind: OwnerKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub proxy_settings: Vec<ProxySettings>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceOptions {
    pub quota: Option<i32>,
    pub additional_metadata: Option<AdditionalMetadataSpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressOptions {
    pub allowed_classes: Option<AllowedListSpec>,
    #[serde(default)]
    pub hostname_collision_scope: HostnameCollisionScope,
    pub allowed_hostnames: Option<AllowedListSpec>,
}
