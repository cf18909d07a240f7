use super::*;
use crate::{
    core::{UserInfo, DEFAULT_CAPSULE_GROUP},
    index::{Index, Reader},
    k8s::{conversion::V1BETA1, tenant::TenantStatus, v1beta2::TenantSpec},
};
use kube::core::admission::AdmissionReview;
use kubert::index::IndexClusterResource;
use serde_json::{json, Value};
use tokio::time::Duration;

/// Decides every operation with a fixed denial naming the operation.
struct Fixed;

impl<C> Handler<C> for Fixed {
    fn on_create(&self, _: C, _: Decoder) -> Func {
        func(|_, _| async { Outcome::forbidden("create") })
    }

    fn on_update(&self, _: C, _: Decoder) -> Func {
        func(|_, _| async { Outcome::forbidden("update") })
    }

    fn on_delete(&self, _: C, _: Decoder) -> Func {
        func(|_, _| async { Outcome::forbidden("delete") })
    }
}

pub(crate) fn mk_request(
    operation: &str,
    (group, version, kind, resource): (&str, &str, &str, &str),
    object: Option<Value>,
    old_object: Option<Value>,
) -> AdmissionRequest {
    let name = object
        .as_ref()
        .or(old_object.as_ref())
        .and_then(|o| o["metadata"]["name"].as_str())
        .unwrap_or_default()
        .to_string();
    let review = json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "0d3f4a5e-6b7c-4d8e-9f00-112233445566",
            "kind": { "group": group, "version": version, "kind": kind },
            "resource": { "group": group, "version": version, "resource": resource },
            "name": name,
            "operation": operation,
            "userInfo": { "username": "alice", "groups": [DEFAULT_CAPSULE_GROUP] },
            "object": object,
            "oldObject": old_object,
            "dryRun": false,
        },
    });
    let review: AdmissionReview<DynamicObject> =
        serde_json::from_value(review).expect("review must parse");
    review.try_into().expect("review must carry a request")
}

pub(crate) fn mk_namespace_request(
    operation: &str,
    object: Option<Value>,
    old_object: Option<Value>,
) -> AdmissionRequest {
    mk_request(operation, ("", "v1", "Namespace", "namespaces"), object, old_object)
}

pub(crate) fn mk_ctx(username: &str, groups: &[&str]) -> RequestContext {
    RequestContext::new(
        UserInfo::new(username, groups.iter().map(ToString::to_string)),
        Duration::from_secs(5),
    )
}

pub(crate) fn mk_reader(tenants: Vec<Tenant>) -> Reader {
    let index = Index::shared();
    index.write().reset(tenants, Default::default());
    Reader::new(index)
}

pub(crate) fn with_namespaces(mut tenant: Tenant, namespaces: &[&str]) -> Tenant {
    tenant.status = Some(TenantStatus {
        size: namespaces.len() as u32,
        namespaces: namespaces.iter().map(ToString::to_string).collect(),
        ..Default::default()
    });
    tenant
}

fn policy() -> Arc<GroupPolicy> {
    Arc::new(GroupPolicy {
        allowed: vec![DEFAULT_CAPSULE_GROUP.to_string()],
        excluded: vec![],
    })
}

fn namespace(name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": { "name": name },
    })
}

#[test]
fn domain_errors_are_forbidden() {
    let outcome = Outcome::from_error(DomainError::NamespaceQuotaExceeded.into());
    assert_eq!(
        outcome,
        Outcome::Deny {
            reason: DomainError::NamespaceQuotaExceeded.to_string(),
            class: Class::Forbidden,
        }
    );
}

#[test]
fn other_errors_are_redacted() {
    let error = anyhow!("connection to 10.0.0.1:443 refused").context("listing tenants");
    let outcome = Outcome::from_error(error);
    assert_eq!(
        outcome,
        Outcome::Deny {
            reason: "internal error".to_string(),
            class: Class::Internal,
        }
    );
}

#[test]
fn denials_carry_a_status_code() {
    let req = mk_namespace_request("CREATE", Some(namespace("oil-dev")), None);

    let rsp = Outcome::bad_request("nope").into_response(AdmissionResponse::from(&req));
    assert!(!rsp.allowed);
    assert_eq!(rsp.result.code, 400);
    assert_eq!(rsp.result.message, "nope");

    let rsp = Outcome::allow().into_response(AdmissionResponse::from(&req));
    assert!(rsp.allowed);
}

#[tokio::test]
async fn dispatches_by_operation() {
    let routes = Routes::new(&Fixed, (), Decoder::default());
    let ctx = mk_ctx("alice", &[]);

    for (operation, reason) in [("CREATE", "create"), ("UPDATE", "update"), ("DELETE", "delete")] {
        let req = mk_namespace_request(
            operation,
            Some(namespace("oil-dev")),
            Some(namespace("oil-dev")),
        );
        let rsp = routes.dispatch(ctx.clone(), req).await;
        assert!(!rsp.allowed, "{operation} must be denied");
        assert_eq!(rsp.result.message, reason);
    }

    let req = mk_namespace_request("CONNECT", None, None);
    assert!(routes.dispatch(ctx, req).await.allowed);
}

#[tokio::test]
async fn gated_handlers_skip_non_principals() {
    let reader = mk_reader(vec![]);
    let routes = Routes::new(&Gated::new(Fixed, policy()), reader, Decoder::default());

    let req = mk_namespace_request("CREATE", Some(namespace("kube-dev")), None);
    let rsp = routes.dispatch(mk_ctx("bob", &["devs"]), req).await;
    assert!(rsp.allowed);

    let req = mk_namespace_request("CREATE", Some(namespace("oil-dev")), None);
    let rsp = routes
        .dispatch(mk_ctx("alice", &[DEFAULT_CAPSULE_GROUP]), req)
        .await;
    assert!(!rsp.allowed);
    assert_eq!(rsp.result.message, "create");
}

#[tokio::test]
async fn gated_handlers_recognize_tenant_service_accounts() {
    let reader = mk_reader(vec![with_namespaces(
        Tenant::new("oil", TenantSpec::default()),
        &["oil-dev"],
    )]);
    let routes = Routes::new(&Gated::new(Fixed, policy()), reader, Decoder::default());

    let req = mk_namespace_request("DELETE", None, Some(namespace("oil-dev")));
    let ctx = mk_ctx(
        "system:serviceaccount:oil-dev:builder",
        &[crate::core::SERVICE_ACCOUNTS_GROUP],
    );
    let rsp = routes.dispatch(ctx, req).await;
    assert_eq!(rsp.result.message, "delete");
}

#[test]
fn decodes_older_tenants() {
    let obj: DynamicObject = serde_json::from_value(json!({
        "apiVersion": V1BETA1,
        "kind": "Tenant",
        "metadata": {
            "name": "oil",
            "annotations": { "capsule.clastix.io/protected": "" },
        },
        "spec": { "owners": [{ "kind": "User", "name": "alice" }] },
    }))
    .unwrap();

    let tenant = Decoder::default().tenant(&obj).unwrap();
    assert!(tenant.spec.prevent_deletion);
    assert_eq!(tenant.spec.owners.len(), 1);
    assert_eq!(tenant.metadata.annotations, None);
}
