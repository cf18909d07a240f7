use super::{func, Decoder, Func, Handler, Outcome};
use crate::{
    core::DomainError,
    k8s::{
        tenant::{AllowedListSpec, ForbiddenListSpec},
        ResourceExt, Tenant,
    },
};
use anyhow::Result;
use regex::Regex;
use tracing::info;

/// Validates Tenant specs and guards protected Tenants against deletion.
#[derive(Clone, Copy, Debug, Default)]
pub struct TenantHandler;

impl<C> Handler<C> for TenantHandler {
    fn on_create(&self, _client: C, decoder: Decoder) -> Func {
        func(move |_, req| async move {
            let res = req
                .object
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("admission request missing 'object'"))
                .and_then(|obj| decoder.tenant(obj));
            match res {
                Ok(tenant) => validate(&tenant),
                Err(error) => Outcome::from_error(error),
            }
        })
    }

    fn on_update(&self, client: C, decoder: Decoder) -> Func {
        self.on_create(client, decoder)
    }

    fn on_delete(&self, _client: C, decoder: Decoder) -> Func {
        func(move |_, req| async move {
            let res = req
                .old_object
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("admission request missing 'oldObject'"))
                .and_then(|obj| decoder.tenant(obj))
                .and_then(guard_deletion);
            res.unwrap_or_else(Outcome::from_error)
        })
    }
}

fn validate(tenant: &Tenant) -> Outcome {
    let spec = &tenant.spec;

    if let Some(owner) = spec.owners.duplicates().first() {
        return Outcome::bad_request(format!("duplicate owner: {} {}", owner.kind, owner.name));
    }

    let allowed = [
        ("storageClasses", spec.storage_classes.as_ref()),
        ("containerRegistries", spec.container_registries.as_ref()),
        ("priorityClasses", spec.priority_classes.as_ref()),
        (
            "ingressOptions.allowedClasses",
            spec.ingress_options.allowed_classes.as_ref(),
        ),
        (
            "ingressOptions.allowedHostnames",
            spec.ingress_options.allowed_hostnames.as_ref(),
        ),
    ];
    for (field, list) in allowed {
        if let Some(AllowedListSpec { allowed_regex, .. }) = list {
            if let Err(error) = check_regex(field, allowed_regex) {
                return error;
            }
        }
    }

    if let Some(opts) = spec.namespace_options.as_ref() {
        let forbidden = [
            ("namespaceOptions.forbiddenLabels", &opts.forbidden_labels),
            (
                "namespaceOptions.forbiddenAnnotations",
                &opts.forbidden_annotations,
            ),
        ];
        for (field, ForbiddenListSpec { regex, .. }) in forbidden {
            if let Err(error) = check_regex(field, regex) {
                return error;
            }
        }
    }

    Outcome::allow()
}

fn check_regex(field: &str, regex: &str) -> Result<(), Outcome> {
    if regex.is_empty() {
        return Ok(());
    }
    Regex::new(regex)
        .map(|_| ())
        .map_err(|error| Outcome::bad_request(format!("invalid regex in {field}: {error}")))
}

fn guard_deletion(tenant: Tenant) -> Result<Outcome> {
    if tenant.spec.prevent_deletion {
        info!(tenant = %tenant.name_unchecked(), "Rejecting deletion of protected tenant");
        return Err(DomainError::TenantProtected.into());
    }
    Ok(Outcome::allow())
}
