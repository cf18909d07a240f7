//! The contract every admission handler implements.
//!
//! A [`Handler`] is wired once at startup: each of its operations is a
//! factory that captures the cluster client and request decoder and returns a
//! [`Func`]. The resulting functions are invoked concurrently, once per
//! admission request, and hold no mutable state of their own.

pub mod namespace;
pub mod tenant;

use crate::{
    core::{is_tenant_principal, DomainError, GroupPolicy, RequestContext, TenantLookup},
    k8s::{conversion, Tenant},
};
use anyhow::{anyhow, Context, Result};
use futures::future::{BoxFuture, Future};
use kube::core::{
    admission::{self, AdmissionResponse, Operation},
    DynamicObject,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub type AdmissionRequest = admission::AdmissionRequest<DynamicObject>;

/// Decides a single admission request.
pub type Func =
    Arc<dyn Fn(RequestContext, AdmissionRequest) -> BoxFuture<'static, Outcome> + Send + Sync>;

pub trait Handler<C> {
    fn on_create(&self, client: C, decoder: Decoder) -> Func;

    fn on_update(&self, client: C, decoder: Decoder) -> Func;

    fn on_delete(&self, client: C, decoder: Decoder) -> Func;
}

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Allow(Option<json_patch::Patch>),
    Deny { reason: String, class: Class },
}

/// Classifies a denial for the API server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Class {
    Forbidden,
    BadRequest,
    Internal,
}

/// Decodes the objects carried by an admission request.
#[derive(Clone, Copy, Debug, Default)]
pub struct Decoder(());

/// Runs the wrapped handler only for tenant principals; other callers are
/// admitted untouched.
#[derive(Clone, Debug)]
pub struct Gated<H> {
    inner: H,
    policy: Arc<GroupPolicy>,
}

/// The functions produced by wiring a handler, selected per operation.
#[derive(Clone)]
pub struct Routes {
    create: Func,
    update: Func,
    delete: Func,
}

// === impl Outcome ===

impl Outcome {
    pub fn allow() -> Self {
        Self::Allow(None)
    }

    pub fn forbidden(reason: impl ToString) -> Self {
        Self::Deny {
            reason: reason.to_string(),
            class: Class::Forbidden,
        }
    }

    pub fn bad_request(reason: impl ToString) -> Self {
        Self::Deny {
            reason: reason.to_string(),
            class: Class::BadRequest,
        }
    }

    /// Denies with the error's message when it is a [`DomainError`]; any
    /// other failure is logged and reported without detail.
    pub fn from_error(error: anyhow::Error) -> Self {
        if let Some(denial) = error.downcast_ref::<DomainError>() {
            return Self::forbidden(denial);
        }
        warn!(error = %format_args!("{error:#}"), "Failed to decide admission request");
        Self::Deny {
            reason: "internal error".to_string(),
            class: Class::Internal,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }

    /// Completes a response that was built from the request.
    pub fn into_response(self, rsp: AdmissionResponse) -> AdmissionResponse {
        match self {
            Self::Allow(None) => rsp,
            Self::Allow(Some(patch)) => {
                let denied = rsp.clone();
                match rsp.with_patch(patch) {
                    Ok(rsp) => rsp,
                    Err(error) => {
                        warn!(%error, "Failed to serialize patch");
                        Self::Deny {
                            reason: "internal error".to_string(),
                            class: Class::Internal,
                        }
                        .into_response(denied)
                    }
                }
            }
            Self::Deny { reason, class } => {
                let mut rsp = rsp.deny(reason);
                rsp.result.code = class.code();
                rsp.result.reason = class.reason().to_string();
                rsp
            }
        }
    }
}

// === impl Class ===

impl Class {
    pub fn code(&self) -> u16 {
        match self {
            Self::Forbidden => 403,
            Self::BadRequest => 400,
            Self::Internal => 500,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Forbidden => "Forbidden",
            Self::BadRequest => "BadRequest",
            Self::Internal => "InternalError",
        }
    }
}

// === impl Decoder ===

impl Decoder {
    /// Decodes the object being admitted.
    pub fn object<T: DeserializeOwned>(&self, req: &AdmissionRequest) -> Result<T> {
        let obj = req
            .object
            .as_ref()
            .ok_or_else(|| anyhow!("admission request missing 'object'"))?;
        decode(obj)
    }

    /// Decodes the object as it was before the request.
    pub fn old_object<T: DeserializeOwned>(&self, req: &AdmissionRequest) -> Result<T> {
        let obj = req
            .old_object
            .as_ref()
            .ok_or_else(|| anyhow!("admission request missing 'oldObject'"))?;
        decode(obj)
    }

    /// Decodes a Tenant in any served version, upgrading older shapes.
    pub fn tenant(&self, obj: &DynamicObject) -> Result<Tenant> {
        let value = serde_json::to_value(obj)?;
        match conversion::VersionedTenant::from_value(value)? {
            conversion::VersionedTenant::V1beta2(tenant) => Ok(*tenant),
            older => Ok(conversion::upgrade(&older)?),
        }
    }
}

fn decode<T: DeserializeOwned>(obj: &DynamicObject) -> Result<T> {
    let value = serde_json::to_value(obj)?;
    serde_json::from_value(value).context("failed to decode admission object")
}

// === impl Gated ===

impl<H> Gated<H> {
    pub fn new(inner: H, policy: Arc<GroupPolicy>) -> Self {
        Self { inner, policy }
    }
}

impl<C, H> Handler<C> for Gated<H>
where
    C: TenantLookup + Clone + 'static,
    H: Handler<C>,
{
    fn on_create(&self, client: C, decoder: Decoder) -> Func {
        let inner = self.inner.on_create(client.clone(), decoder);
        gate(client, self.policy.clone(), inner)
    }

    fn on_update(&self, client: C, decoder: Decoder) -> Func {
        let inner = self.inner.on_update(client.clone(), decoder);
        gate(client, self.policy.clone(), inner)
    }

    fn on_delete(&self, client: C, decoder: Decoder) -> Func {
        let inner = self.inner.on_delete(client.clone(), decoder);
        gate(client, self.policy.clone(), inner)
    }
}

fn gate<C>(client: C, policy: Arc<GroupPolicy>, inner: Func) -> Func
where
    C: TenantLookup + Clone + 'static,
{
    func(move |ctx, req| {
        let client = client.clone();
        let policy = policy.clone();
        let inner = inner.clone();
        async move {
            if !is_tenant_principal(&ctx, &policy, &client).await {
                trace!(user = %ctx.user.username, "Admitting request from a non-tenant principal");
                return Outcome::allow();
            }
            inner(ctx, req).await
        }
    })
}

/// Boxes an async decision function into a [`Func`].
pub fn func<F, Fut>(f: F) -> Func
where
    F: Fn(RequestContext, AdmissionRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    Arc::new(
        move |ctx: RequestContext, req: AdmissionRequest| -> BoxFuture<'static, Outcome> {
            Box::pin(f(ctx, req))
        },
    )
}

// === impl Routes ===

impl Routes {
    pub fn new<C, H>(handler: &H, client: C, decoder: Decoder) -> Self
    where
        C: Clone,
        H: Handler<C>,
    {
        Self {
            create: handler.on_create(client.clone(), decoder),
            update: handler.on_update(client.clone(), decoder),
            delete: handler.on_delete(client, decoder),
        }
    }

    pub async fn dispatch(&self, ctx: RequestContext, req: AdmissionRequest) -> AdmissionResponse {
        let rsp = AdmissionResponse::from(&req);
        let func = match req.operation {
            Operation::Create => &self.create,
            Operation::Update => &self.update,
            Operation::Delete => &self.delete,
            Operation::Connect => return rsp,
        };

        let kind = req.kind.kind.clone();
        let name = req.name.clone();
        let outcome = func(ctx, req).await;
        if let Outcome::Deny { reason, class } = &outcome {
            debug!(%kind, %name, ?class, %reason, "Denied");
        }
        outcome.into_response(rsp)
    }
}

#[cfg(test)]
pub(crate) mod tests;
