//! Annotations that carry `v1beta2` fields on `v1beta1` Tenants.
//!
//! The key set is closed: every key written by a downgrade is read back (and
//! removed) by an upgrade through [`Overflow`]. Keys are matched exactly so
//! that objects stay readable by other controllers sharing the same CRD.

use crate::tenant::ForbiddenListSpec;
use std::collections::BTreeMap;

pub type Annotations = BTreeMap<String, String>;

pub const FORBIDDEN_NAMESPACE_LABELS: &str = "capsule.clastix.io/forbidden-namespace-labels";
pub const FORBIDDEN_NAMESPACE_LABELS_REGEXP: &str =
    "capsule.clastix.io/forbidden-namespace-labels-regexp";
pub const FORBIDDEN_NAMESPACE_ANNOTATIONS: &str =
    "capsule.clastix.io/forbidden-namespace-annotations";
pub const FORBIDDEN_NAMESPACE_ANNOTATIONS_REGEXP: &str =
    "capsule.clastix.io/forbidden-namespace-annotations-regexp";
pub const DENY_WILDCARD: &str = "capsule.clastix.io/deny-wildcard";
pub const CORDON: &str = "capsule.clastix.io/cordon";
pub const PROTECTED: &str = "capsule.clastix.io/protected";
pub const CLUSTER_ROLE_NAMES: &str = "clusterrolenames.capsule.clastix.io";

/// Which namespace metadata a forbidden list applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Metadata {
    Labels,
    Annotations,
}

/// A typed view over a Tenant's annotations.
///
/// `take_*` accessors decode a key and remove it from the map; a value that
/// fails to decode is left in place and reported as absent. `set_*`
/// accessors overwrite whatever the key held before.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Overflow(Annotations);

/// Formats the per-owner cluster role key for the owner at `index`.
pub fn cluster_role_names_key(index: usize) -> String {
    format!("{CLUSTER_ROLE_NAMES}/{index}")
}

// === impl Metadata ===

impl Metadata {
    fn keys(&self) -> (&'static str, &'static str) {
        match self {
            Self::Labels => (
                FORBIDDEN_NAMESPACE_LABELS,
                FORBIDDEN_NAMESPACE_LABELS_REGEXP,
            ),
            Self::Annotations => (
                FORBIDDEN_NAMESPACE_ANNOTATIONS,
                FORBIDDEN_NAMESPACE_ANNOTATIONS_REGEXP,
            ),
        }
    }
}

// === impl Overflow ===

impl Overflow {
    pub fn into_annotations(self) -> Annotations {
        self.0
    }

    /// Returns the remaining annotations, or `None` when nothing is left.
    pub fn into_option(self) -> Option<Annotations> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0)
        }
    }

    pub fn take_forbidden(&mut self, metadata: Metadata) -> ForbiddenListSpec {
        let (exact_key, regex_key) = metadata.keys();
        ForbiddenListSpec {
            exact: self.0.remove(exact_key).map(split_list).unwrap_or_default(),
            regex: self.0.remove(regex_key).unwrap_or_default(),
        }
    }

    pub fn set_forbidden(&mut self, metadata: Metadata, forbidden: &ForbiddenListSpec) {
        let (exact_key, regex_key) = metadata.keys();
        if !forbidden.exact.is_empty() {
            self.0
                .insert(exact_key.to_string(), forbidden.exact.join(","));
        }
        if !forbidden.regex.is_empty() {
            self.0
                .insert(regex_key.to_string(), forbidden.regex.clone());
        }
    }

    /// Reads the deny-wildcard flag. Note the inversion relative to
    /// `v1beta2`'s `allowWildcardHostnames`.
    pub fn take_deny_wildcard(&mut self) -> Option<bool> {
        self.take_bool(DENY_WILDCARD)
    }

    pub fn set_deny_wildcard(&mut self, deny: bool) {
        self.0.insert(DENY_WILDCARD.to_string(), deny.to_string());
    }

    pub fn take_cordoned(&mut self) -> Option<bool> {
        self.take_bool(CORDON)
    }

    pub fn set_cordoned(&mut self) {
        self.0.insert(CORDON.to_string(), true.to_string());
    }

    /// The protected key is presence-only: any value marks the Tenant.
    pub fn take_protected(&mut self) -> bool {
        self.0.remove(PROTECTED).is_some()
    }

    pub fn set_protected(&mut self) {
        self.0.insert(PROTECTED.to_string(), true.to_string());
    }

    pub fn take_cluster_roles(&mut self, index: usize) -> Option<Vec<String>> {
        self.0.remove(&cluster_role_names_key(index)).map(split_list)
    }

    pub fn set_cluster_roles(&mut self, index: usize, roles: &[String]) {
        if roles.is_empty() {
            return;
        }
        self.0.insert(cluster_role_names_key(index), roles.join(","));
    }

    fn take_bool(&mut self, key: &str) -> Option<bool> {
        let value = parse_bool(self.0.get(key)?)?;
        self.0.remove(key);
        Some(value)
    }
}

impl From<Annotations> for Overflow {
    fn from(annotations: Annotations) -> Self {
        Self(annotations)
    }
}

impl From<Option<Annotations>> for Overflow {
    fn from(annotations: Option<Annotations>) -> Self {
        Self(annotations.unwrap_or_default())
    }
}

/// Accepts the spellings other Tenant controllers write for booleans:
/// `1`, `t`, `T`, `TRUE`, `true`, `True` and their false counterparts.
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

fn split_list(value: String) -> Vec<String> {
    value.split(',').map(ToString::to_string).collect()
}
