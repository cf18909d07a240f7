//! Converts Tenants between the `v1beta1` and `v1beta2` shapes.
//!
//! Fields that `v1beta1` cannot represent natively travel through the
//! annotations described in [`crate::annotations`]. Converting never mutates
//! the source object.
//!
//! A downgrade followed by an upgrade reproduces the `v1beta2` object. An
//! upgrade followed by a downgrade reproduces every `v1beta1` field, with
//! these normalizations:
//!
//! - the deny-wildcard annotation is always written, so an absent key comes
//!   back as `"false"`;
//! - the presence-only protected annotation comes back with the value `"true"`;
//! - a cordon annotation holding false is dropped, since only a cordoned
//!   Tenant writes the key;
//! - booleans are rewritten in lowercase (`"True"` or `"1"` become `"true"`).

use crate::{
    annotations::{Metadata, Overflow},
    tenant::{v1beta1, v1beta2},
    Resource,
};
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

pub const V1BETA1: &str = "capsule.clastix.io/v1beta1";
pub const V1BETA2: &str = "capsule.clastix.io/v1beta2";

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("expected a {expected} Tenant, got {found}")]
    UnexpectedVersion {
        expected: &'static str,
        found: &'static str,
    },

    #[error("unsupported Tenant apiVersion: {0}")]
    UnsupportedVersion(String),

    #[error("object is missing its apiVersion")]
    MissingApiVersion,

    #[error("invalid Tenant object: {0}")]
    Json(#[from] serde_json::Error),
}

/// A Tenant in exactly one of the supported schema versions.
#[derive(Clone, Debug, PartialEq)]
pub enum VersionedTenant {
    V1beta1(Box<v1beta1::Tenant>),
    V1beta2(Box<v1beta2::Tenant>),
}

/// Converts a serialized Tenant to `desired_api_version`.
///
/// Objects already at the desired version are returned unchanged.
pub fn convert(object: Value, desired_api_version: &str) -> Result<Value, ConversionError> {
    let tenant = VersionedTenant::from_value(object)?;
    let converted = match desired_api_version {
        desired if desired == tenant.api_version() => tenant,
        V1BETA2 => upgrade(&tenant)?.into(),
        V1BETA1 => downgrade(&tenant)?.into(),
        other => return Err(ConversionError::UnsupportedVersion(other.to_string())),
    };
    converted.into_value()
}

/// Converts a `v1beta1` Tenant to `v1beta2`, consuming overflow annotations.
pub fn upgrade(tenant: &VersionedTenant) -> Result<v1beta2::Tenant, ConversionError> {
    let src = match tenant {
        VersionedTenant::V1beta1(src) => src,
        other => {
            return Err(ConversionError::UnexpectedVersion {
                expected: V1BETA1,
                found: other.api_version(),
            })
        }
    };
    trace!(name = ?src.metadata.name, "Upgrading Tenant");

    let mut metadata = src.metadata.clone();
    let mut overflow = Overflow::from(metadata.annotations.take());

    let owners = src
        .spec
        .owners
        .iter()
        .enumerate()
        .map(|(index, owner)| v1beta2::OwnerSpec {
            kind: owner.kind,
            name: owner.name.clone(),
            cluster_roles: overflow.take_cluster_roles(index).unwrap_or_default(),
            proxy_settings: owner.proxy_settings.clone(),
        })
        .collect();

    // Forbidden metadata only has a home when namespace options exist; any
    // such annotations are otherwise carried forward untouched.
    let namespace_options = src
        .spec
        .namespace_options
        .as_ref()
        .map(|opts| v1beta2::NamespaceOptions {
            quota: opts.quota,
            additional_metadata: opts.additional_metadata.clone(),
            forbidden_labels: overflow.take_forbidden(Metadata::Labels),
            forbidden_annotations: overflow.take_forbidden(Metadata::Annotations),
        });

    let ingress_options = v1beta2::IngressOptions {
        allowed_classes: src.spec.ingress_options.allowed_classes.clone(),
        hostname_collision_scope: src.spec.ingress_options.hostname_collision_scope,
        allowed_hostnames: src.spec.ingress_options.allowed_hostnames.clone(),
        allow_wildcard_hostnames: overflow.take_deny_wildcard().map_or(true, |deny| !deny),
    };

    let cordoned = overflow.take_cordoned().unwrap_or(false);
    let prevent_deletion = overflow.take_protected();
    metadata.annotations = overflow.into_option();

    Ok(v1beta2::Tenant {
        metadata,
        spec: v1beta2::TenantSpec {
            owners,
            namespace_options,
            service_options: src.spec.service_options.clone(),
            storage_classes: src.spec.storage_classes.clone(),
            ingress_options,
            container_registries: src.spec.container_registries.clone(),
            node_selector: src.spec.node_selector.clone(),
            network_policies: src.spec.network_policies.clone(),
            limit_ranges: src.spec.limit_ranges.clone(),
            resource_quotas: src.spec.resource_quotas.clone(),
            additional_role_bindings: src.spec.additional_role_bindings.clone(),
            image_pull_policies: src.spec.image_pull_policies.clone(),
            priority_classes: src.spec.priority_classes.clone(),
            cordoned,
            prevent_deletion,
        },
        status: src.status.clone(),
    })
}

/// Converts a `v1beta2` Tenant to `v1beta1`, writing overflow annotations.
pub fn downgrade(tenant: &VersionedTenant) -> Result<v1beta1::Tenant, ConversionError> {
    let src = match tenant {
        VersionedTenant::V1beta2(src) => src,
        other => {
            return Err(ConversionError::UnexpectedVersion {
                expected: V1BETA2,
                found: other.api_version(),
            })
        }
    };
    trace!(name = ?src.metadata.name, "Downgrading Tenant");

    let mut metadata = src.metadata.clone();
    let mut overflow = Overflow::from(metadata.annotations.take());

    let owners = src
        .spec
        .owners
        .iter()
        .enumerate()
        .map(|(index, owner)| {
            overflow.set_cluster_roles(index, &owner.cluster_roles);
            v1beta1::OwnerSpec {
                kind: owner.kind,
                name: owner.name.clone(),
                proxy_settings: owner.proxy_settings.clone(),
            }
        })
        .collect();

    let namespace_options = src.spec.namespace_options.as_ref().map(|opts| {
        overflow.set_forbidden(Metadata::Labels, &opts.forbidden_labels);
        overflow.set_forbidden(Metadata::Annotations, &opts.forbidden_annotations);
        v1beta1::NamespaceOptions {
            quota: opts.quota,
            additional_metadata: opts.additional_metadata.clone(),
        }
    });

    let ingress_options = v1beta1::IngressOptions {
        allowed_classes: src.spec.ingress_options.allowed_classes.clone(),
        hostname_collision_scope: src.spec.ingress_options.hostname_collision_scope,
        allowed_hostnames: src.spec.ingress_options.allowed_hostnames.clone(),
    };
    overflow.set_deny_wildcard(!src.spec.ingress_options.allow_wildcard_hostnames);

    if src.spec.prevent_deletion {
        overflow.set_protected();
    }
    if src.spec.cordoned {
        overflow.set_cordoned();
    }
    metadata.annotations = overflow.into_option();

    Ok(v1beta1::Tenant {
        metadata,
        spec: v1beta1::TenantSpec {
            owners,
            namespace_options,
            service_options: src.spec.service_options.clone(),
            storage_classes: src.spec.storage_classes.clone(),
            ingress_options,
            container_registries: src.spec.container_registries.clone(),
            node_selector: src.spec.node_selector.clone(),
            network_policies: src.spec.network_policies.clone(),
            limit_ranges: src.spec.limit_ranges.clone(),
            resource_quotas: src.spec.resource_quotas.clone(),
            additional_role_bindings: src.spec.additional_role_bindings.clone(),
            image_pull_policies: src.spec.image_pull_policies.clone(),
            priority_classes: src.spec.priority_classes.clone(),
        },
        status: src.status.clone(),
    })
}

// === impl VersionedTenant ===

impl VersionedTenant {
    /// Parses a Tenant, dispatching on its `apiVersion`.
    pub fn from_value(object: Value) -> Result<Self, ConversionError> {
        let api_version = object
            .get("apiVersion")
            .and_then(Value::as_str)
            .ok_or(ConversionError::MissingApiVersion)?;

        match api_version {
            V1BETA1 => Ok(Self::V1beta1(Box::new(serde_json::from_value(object)?))),
            V1BETA2 => Ok(Self::V1beta2(Box::new(serde_json::from_value(object)?))),
            other => Err(ConversionError::UnsupportedVersion(other.to_string())),
        }
    }

    pub fn into_value(self) -> Result<Value, ConversionError> {
        let value = match self {
            Self::V1beta1(tenant) => serde_json::to_value(tenant)?,
            Self::V1beta2(tenant) => serde_json::to_value(tenant)?,
        };
        Ok(value)
    }

    pub fn api_version(&self) -> &'static str {
        match self {
            Self::V1beta1(_) => V1BETA1,
            Self::V1beta2(_) => V1BETA2,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::V1beta1(tenant) => tenant.meta().name.as_deref(),
            Self::V1beta2(tenant) => tenant.meta().name.as_deref(),
        }
    }
}

impl From<v1beta1::Tenant> for VersionedTenant {
    fn from(tenant: v1beta1::Tenant) -> Self {
        Self::V1beta1(Box::new(tenant))
    }
}

impl From<v1beta2::Tenant> for VersionedTenant {
    fn from(tenant: v1beta2::Tenant) -> Self {
        Self::V1beta2(Box::new(tenant))
    }
}
