#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod annotations;
pub mod conversion;
pub mod tenant;

pub use self::tenant::{v1beta1, v1beta2};
pub use k8s_openapi::api::{self, core::v1::Namespace};
pub use kube::{
    api::{Api, ObjectMeta, Resource, ResourceExt},
    Client, Error,
};

/// The API group shared by every version of the Tenant resource.
pub const GROUP: &str = "capsule.clastix.io";

/// Label stamped on namespaces to record (or select) the owning Tenant.
pub const TENANT_LABEL: &str = "capsule.clastix.io/tenant";

/// The Tenant version used for storage and for all in-process decisions.
pub type Tenant = v1beta2::Tenant;
