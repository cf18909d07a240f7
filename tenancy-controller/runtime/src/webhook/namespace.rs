//! Admission for Namespaces created or modified by tenant principals.

use super::{func, AdmissionRequest, Decoder, Func, Handler, Outcome};
use crate::{
    core::{DomainError, LookupError, RequestContext, TenantLookup},
    k8s::{tenant::ForbiddenListSpec, Namespace, ResourceExt, Tenant, TENANT_LABEL},
};
use ahash::AHashMap as HashMap;
use anyhow::{anyhow, bail, Context, Result};
use futures::future::Future;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::json;
use std::{collections::BTreeMap, sync::Arc};
use tokio::time;
use tracing::{debug, info, warn};

type Metadata = BTreeMap<String, String>;

/// Assigns new Namespaces to one of the caller's Tenants and keeps tenant
/// Namespaces within their Tenant's metadata rules.
#[derive(Clone, Debug, Default)]
pub struct NamespaceHandler {
    patterns: Patterns,
}

/// Forbidden-metadata regexes, compiled once per Tenant and recompiled only
/// when the Tenant's pattern changes.
#[derive(Clone, Debug, Default)]
struct Patterns(Arc<RwLock<HashMap<(String, &'static str), (String, Regex)>>>);

impl<C> Handler<C> for NamespaceHandler
where
    C: TenantLookup + Clone + 'static,
{
    fn on_create(&self, client: C, decoder: Decoder) -> Func {
        let patterns = self.patterns.clone();
        func(move |ctx, req| {
            let client = client.clone();
            let patterns = patterns.clone();
            async move {
                admit_create(&client, &patterns, &ctx, decoder, &req)
                    .await
                    .unwrap_or_else(Outcome::from_error)
            }
        })
    }

    fn on_update(&self, client: C, decoder: Decoder) -> Func {
        let patterns = self.patterns.clone();
        func(move |ctx, req| {
            let client = client.clone();
            let patterns = patterns.clone();
            async move {
                admit_update(&client, &patterns, &ctx, decoder, &req)
                    .await
                    .unwrap_or_else(Outcome::from_error)
            }
        })
    }

    fn on_delete(&self, _client: C, _decoder: Decoder) -> Func {
        func(|_, _| async { Outcome::allow() })
    }
}

async fn admit_create<C: TenantLookup>(
    client: &C,
    patterns: &Patterns,
    ctx: &RequestContext,
    decoder: Decoder,
    req: &AdmissionRequest,
) -> Result<Outcome> {
    let ns = decoder.object::<Namespace>(req)?;
    let owned = within_deadline(ctx, client.tenants_by_owner(&ctx.user)).await?;
    let tenant = select_tenant(&ns, owned)?;
    let tenant_name = tenant.name_unchecked();

    if tenant.spec.cordoned {
        info!(tenant = %tenant_name, "Rejecting namespace for cordoned tenant");
        bail!(DomainError::TenantCordoned);
    }
    if tenant.is_quota_exhausted() {
        info!(tenant = %tenant_name, size = tenant.size(), "Rejecting namespace over quota");
        bail!(DomainError::NamespaceQuotaExceeded);
    }
    check_forbidden(patterns, &tenant, ns.labels().keys(), ns.annotations().keys())?;

    debug!(tenant = %tenant_name, namespace = %ns.name_any(), "Assigning namespace");
    Ok(Outcome::Allow(Some(assign(&tenant, &ns)?)))
}

async fn admit_update<C: TenantLookup>(
    client: &C,
    patterns: &Patterns,
    ctx: &RequestContext,
    decoder: Decoder,
    req: &AdmissionRequest,
) -> Result<Outcome> {
    let ns = decoder.object::<Namespace>(req)?;
    let old = decoder.old_object::<Namespace>(req)?;
    let name = ns.name_any();
    let tenants = within_deadline(ctx, client.tenants_by_namespace(&name)).await?;
    let tenant = match tenants.as_slice() {
        [] => return Ok(Outcome::allow()),
        [tenant] => tenant.clone(),
        _ => bail!("namespace {name} is claimed by {} tenants", tenants.len()),
    };
    let tenant_name = tenant.name_unchecked();

    let selected = ns.labels().get(TENANT_LABEL);
    if selected != old.labels().get(TENANT_LABEL) && selected != Some(&tenant_name) {
        info!(namespace = %name, tenant = %tenant_name, ?selected, "Rejecting tenant label change");
        bail!(DomainError::ForbiddenNamespaceMetadata);
    }

    check_forbidden(
        patterns,
        &tenant,
        changed(ns.labels(), old.labels()),
        changed(ns.annotations(), old.annotations()),
    )?;
    Ok(Outcome::allow())
}

/// Picks the Tenant a new Namespace joins: the only owned Tenant, or the one
/// named by the tenant label.
fn select_tenant(ns: &Namespace, mut owned: Vec<Arc<Tenant>>) -> Result<Arc<Tenant>> {
    if let Some(selected) = ns.labels().get(TENANT_LABEL) {
        return owned
            .into_iter()
            .find(|t| t.name_unchecked() == *selected)
            .ok_or_else(|| anyhow!(DomainError::NoTenantAssigned));
    }

    match owned.len() {
        0 => bail!(DomainError::NoTenantAssigned),
        1 => Ok(owned.remove(0)),
        _ => bail!(DomainError::TenantSelectionRequired),
    }
}

fn check_forbidden<'a>(
    patterns: &Patterns,
    tenant: &Tenant,
    labels: impl Iterator<Item = &'a String>,
    annotations: impl Iterator<Item = &'a String>,
) -> Result<()> {
    let Some(opts) = tenant.spec.namespace_options.as_ref() else {
        return Ok(());
    };

    let tenant_name = tenant.name_unchecked();
    let key = match forbidden_key(patterns, &tenant_name, "label", &opts.forbidden_labels, labels)? {
        Some(key) => Some(("label", key)),
        None => forbidden_key(
            patterns,
            &tenant_name,
            "annotation",
            &opts.forbidden_annotations,
            annotations,
        )?
        .map(|key| ("annotation", key)),
    };
    if let Some((kind, key)) = key {
        info!(tenant = %tenant_name, %kind, %key, "Rejecting forbidden namespace metadata");
        bail!(DomainError::ForbiddenNamespaceMetadata);
    }
    Ok(())
}

fn forbidden_key<'a>(
    patterns: &Patterns,
    tenant: &str,
    kind: &'static str,
    forbidden: &ForbiddenListSpec,
    mut keys: impl Iterator<Item = &'a String>,
) -> Result<Option<&'a String>> {
    if forbidden.is_empty() {
        return Ok(None);
    }
    let regex = match forbidden.regex.as_str() {
        "" => None,
        pattern => Some(patterns.get(tenant, kind, pattern)?),
    };
    Ok(keys.find(|key| {
        forbidden.exact.iter().any(|k| k == *key)
            || regex.as_ref().is_some_and(|r| r.is_match(key))
    }))
}

// === impl Patterns ===

impl Patterns {
    fn get(&self, tenant: &str, kind: &'static str, pattern: &str) -> Result<Regex> {
        let key = (tenant.to_string(), kind);
        if let Some((cached, regex)) = self.0.read().get(&key) {
            if cached == pattern {
                return Ok(regex.clone());
            }
        }

        let regex = Regex::new(pattern).with_context(|| format!("invalid regex {pattern:?}"))?;
        debug!(%tenant, %kind, %pattern, "Compiled forbidden metadata pattern");
        self.0
            .write()
            .insert(key, (pattern.to_string(), regex.clone()));
        Ok(regex)
    }
}

/// Keys added or modified relative to `old`.
fn changed<'a>(new: &'a Metadata, old: &'a Metadata) -> impl Iterator<Item = &'a String> {
    new.iter()
        .filter(move |(k, v)| old.get(*k) != Some(*v))
        .map(|(k, _)| k)
}

/// Builds a patch that labels the Namespace with its Tenant and stamps the
/// Tenant's additional metadata.
fn assign(tenant: &Tenant, ns: &Namespace) -> Result<json_patch::Patch> {
    let mut labels = ns.labels().clone();
    let mut annotations = ns.annotations().clone();
    if let Some(additional) = tenant
        .spec
        .namespace_options
        .as_ref()
        .and_then(|opts| opts.additional_metadata.as_ref())
    {
        labels.extend(additional.labels.clone());
        annotations.extend(additional.annotations.clone());
    }
    labels.insert(TENANT_LABEL.to_string(), tenant.name_unchecked());

    let mut ops = vec![json!({ "op": "add", "path": "/metadata/labels", "value": labels })];
    if annotations != *ns.annotations() {
        ops.push(json!({ "op": "add", "path": "/metadata/annotations", "value": annotations }));
    }
    serde_json::from_value(ops.into()).context("failed to build namespace patch")
}

async fn within_deadline<F>(ctx: &RequestContext, lookup: F) -> Result<Vec<Arc<Tenant>>>
where
    F: Future<Output = Result<Vec<Arc<Tenant>>, LookupError>>,
{
    match time::timeout_at(ctx.deadline, lookup).await {
        Ok(res) => Ok(res?),
        Err(_) => {
            warn!(user = %ctx.user.username, "Timed out looking up tenants");
            bail!("timed out looking up tenants")
        }
    }
}
