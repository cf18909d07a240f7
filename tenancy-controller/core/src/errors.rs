use thiserror::Error;

/// Conditions that deny an admission request with a message meant for the
/// caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Cannot exceed Namespace quota: please, reach out to the system administrators")]
    NamespaceQuotaExceeded,

    #[error("You do not have any Tenant assigned: please, reach out to the system administrators")]
    NoTenantAssigned,

    #[error("Please use the capsule.clastix.io/tenant label when creating a Namespace")]
    TenantSelectionRequired,

    #[error("The selected Tenant is cordoned: no new Namespaces can be created")]
    TenantCordoned,

    #[error("The Namespace carries labels or annotations forbidden by its Tenant")]
    ForbiddenNamespaceMetadata,

    #[error("The Tenant is protected from deletion")]
    TenantProtected,
}
