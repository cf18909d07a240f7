#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod authz;
mod errors;
mod lookup;

pub use self::{
    authz::{is_tenant_principal, GroupPolicy, RequestContext, UserGroups, UserInfo},
    errors::DomainError,
    lookup::{LookupError, TenantLookup},
};

/// The group the API server assigns to every service account.
pub const SERVICE_ACCOUNTS_GROUP: &str = "system:serviceaccounts";

/// The group that marks users as tenant principals unless configured otherwise.
pub const DEFAULT_CAPSULE_GROUP: &str = "capsule.clastix.io";
