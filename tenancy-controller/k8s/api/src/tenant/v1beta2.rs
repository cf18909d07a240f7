pub use super::TenantStatus;
use super::{
    AdditionalMetadataSpec, AdditionalRoleBindingsSpec, AllowedListSpec, ForbiddenListSpec,
    HostnameCollisionScope, ImagePullPolicySpec, LimitRangesSpec, NetworkPolicySpec, OwnerKind,
    ProxySettings, ResourceQuotaSpec, ServiceOptions,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BTreeMap};

/// The newer Tenant shape, used for storage.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "capsule.clastix.io",
    version = "v1beta2",
    kind = "Tenant",
    shortname = "tnt",
    status = "TenantStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct TenantSpec {
    #[serde(default)]
    pub owners: OwnerListSpec,
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
    /// Blocks provisioning of new namespaces while set.
    #[serde(default)]
    pub cordoned: bool,
    /// Guards the Tenant against deletion while set.
    #[serde(default)]
    pub prevent_deletion: bool,
}

/// An ordered list of owners. Order is preserved for display; lookups treat
/// the list as keyed by `(kind, name)`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct OwnerListSpec(pub Vec<OwnerSpec>);

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSpec {
    pub kind: OwnerKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub proxy_settings: Vec<ProxySettings>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceOptions {
    pub quota: Option<i32>,
    pub additional_metadata: Option<AdditionalMetadataSpec>,
    #[serde(default, skip_serializing_if = "ForbiddenListSpec::is_empty")]
    pub forbidden_labels: ForbiddenListSpec,
    #[serde(default, skip_serializing_if = "ForbiddenListSpec::is_empty")]
    pub forbidden_annotations: ForbiddenListSpec,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressOptions {
    pub allowed_classes: Option<AllowedListSpec>,
    #[serde(default)]
    pub hostname_collision_scope: HostnameCollisionScope,
    pub allowed_hostnames: Option<AllowedListSpec>,
    #[serde(default = "allow_wildcard_hostnames")]
    pub allow_wildcard_hostnames: bool,
}

fn allow_wildcard_hostnames() -> bool {
    true
}

// === impl Tenant ===

impl Tenant {
    /// Checks whether the caller is listed among the owners.
    pub fn is_owned_by(&self, username: &str, groups: &[String]) -> bool {
        self.spec.owners.is_owner(username, groups)
    }

    /// Checks whether the status records `namespace` as reconciled to this Tenant.
    pub fn owns_namespace(&self, namespace: &str) -> bool {
        self.status
            .as_ref()
            .map(|status| status.namespaces.iter().any(|ns| ns == namespace))
            .unwrap_or(false)
    }

    /// The number of namespaces currently reconciled to this Tenant.
    pub fn size(&self) -> u32 {
        self.status.as_ref().map(|status| status.size).unwrap_or(0)
    }

    /// Checks whether one more namespace would exceed the namespace quota.
    pub fn is_quota_exhausted(&self) -> bool {
        let quota = self
            .spec
            .namespace_options
            .as_ref()
            .and_then(|opts| opts.quota);
        match quota {
            Some(quota) => i64::from(self.size()) >= i64::from(quota),
            None => false,
        }
    }
}

// === impl OwnerListSpec ===

impl OwnerListSpec {
    pub fn iter(&self) -> std::slice::Iter<'_, OwnerSpec> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Finds the owner keyed by `(kind, name)`.
    pub fn find_owner(&self, kind: OwnerKind, name: &str) -> Option<&OwnerSpec> {
        self.0.iter().find(|o| o.kind == kind && o.name == name)
    }

    pub fn is_owner(&self, username: &str, groups: &[String]) -> bool {
        self.0
            .iter()
            .any(|o| o.kind.matches(&o.name, username, groups))
    }

    /// Returns owners sharing a `(kind, name)` key with an earlier entry.
    pub fn duplicates(&self) -> Vec<&OwnerSpec> {
        let mut sorted = self.0.iter().collect::<Vec<_>>();
        sorted.sort_by(|a, b| a.cmp_key(b));
        sorted
            .windows(2)
            .filter(|pair| pair[0].cmp_key(pair[1]) == Ordering::Equal)
            .map(|pair| pair[1])
            .collect()
    }
}

impl FromIterator<OwnerSpec> for OwnerListSpec {
    fn from_iter<T: IntoIterator<Item = OwnerSpec>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// === impl OwnerSpec ===

impl OwnerSpec {
    /// Compares owners by `(kind, name)`, lexicographically.
    pub fn cmp_key(&self, other: &Self) -> Ordering {
        self.kind
            .cmp_name(&other.kind)
            .then_with(|| self.name.cmp(&other.name))
    }
}

// === impl IngressOptions ===

impl Default for IngressOptions {
    fn default() -> Self {
        Self {
            allowed_classes: None,
            hostname_collision_scope: HostnameCollisionScope::default(),
            allowed_hostnames: None,
            allow_wildcard_hostnames: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(kind: OwnerKind, name: &str) -> OwnerSpec {
        OwnerSpec {
            kind,
            name: name.to_string(),
            cluster_roles: vec![],
            proxy_settings: vec![],
        }
    }

    #[test]
    fn finds_owners_by_kind_and_name() {
        let owners = vec![
            owner(OwnerKind::User, "alice"),
            owner(OwnerKind::Group, "alice"),
        ]
        .into_iter()
        .collect::<OwnerListSpec>();

        assert_eq!(
            owners.find_owner(OwnerKind::Group, "alice"),
            Some(&owner(OwnerKind::Group, "alice"))
        );
        assert_eq!(owners.find_owner(OwnerKind::ServiceAccount, "alice"), None);
        assert!(owners.duplicates().is_empty());
    }

    #[test]
    fn reports_duplicate_owners() {
        let owners = vec![
            owner(OwnerKind::User, "bob"),
            owner(OwnerKind::User, "alice"),
            owner(OwnerKind::User, "bob"),
        ]
        .into_iter()
        .collect::<OwnerListSpec>();

        assert_eq!(owners.duplicates(), vec![&owner(OwnerKind::User, "bob")]);
    }

    #[test]
    fn quota() {
        let mut tenant = Tenant::new("solar", TenantSpec::default());
        assert!(!tenant.is_quota_exhausted());

        tenant.spec.namespace_options = Some(NamespaceOptions {
            quota: Some(2),
            ..Default::default()
        });
        tenant.status = Some(TenantStatus {
            size: 1,
            namespaces: vec!["solar-dev".into()],
            ..Default::default()
        });
        assert!(!tenant.is_quota_exhausted());
        assert!(tenant.owns_namespace("solar-dev"));
        assert!(!tenant.owns_namespace("solar-prod"));

        tenant.status.as_mut().unwrap().size = 2;
        assert!(tenant.is_quota_exhausted());
    }

    #[test]
    fn wildcard_hostnames_default_to_allowed() {
        let opts: IngressOptions = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(opts.allow_wildcard_hostnames);
        assert!(IngressOptions::default().allow_wildcard_hostnames);
    }
}
