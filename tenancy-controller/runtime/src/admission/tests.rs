use super::*;
use crate::{
    core::{GroupPolicy, DEFAULT_CAPSULE_GROUP},
    k8s::{
        conversion::{V1BETA1, V1BETA2},
        tenant::OwnerKind,
        v1beta2::{NamespaceOptions, OwnerSpec, Tenant, TenantSpec},
    },
    webhook::{
        namespace::NamespaceHandler,
        tenant::TenantHandler,
        tests::{mk_reader, with_namespaces},
        Decoder, Gated,
    },
};
use serde_json::{json, Value};
use std::sync::Arc;

fn mk_admission(tenants: Vec<Tenant>, reg: &mut Registry) -> Admission {
    let reader = mk_reader(tenants);
    let policy = Arc::new(GroupPolicy {
        allowed: vec![DEFAULT_CAPSULE_GROUP.to_string()],
        excluded: vec![],
    });
    Admission::new(
        Routes::new(
            &Gated::new(NamespaceHandler::default(), policy),
            reader.clone(),
            Decoder::default(),
        ),
        Routes::new(&TenantHandler, reader, Decoder::default()),
        Duration::from_secs(10),
        Metrics::register(reg),
    )
}

fn full_tenant() -> Tenant {
    let spec = TenantSpec {
        owners: vec![OwnerSpec {
            kind: OwnerKind::User,
            name: "alice".to_string(),
            cluster_roles: vec![],
            proxy_settings: vec![],
        }]
        .into_iter()
        .collect(),
        namespace_options: Some(NamespaceOptions {
            quota: Some(1),
            ..Default::default()
        }),
        ..Default::default()
    };
    with_namespaces(Tenant::new("oil", spec), &["oil-prod"])
}

fn namespace_review(username: &str) -> bytes::Bytes {
    let review = json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "9e8d7c6b-5a49-4382-9170-aabbccddeeff",
            "kind": { "group": "", "version": "v1", "kind": "Namespace" },
            "resource": { "group": "", "version": "v1", "resource": "namespaces" },
            "name": "oil-dev",
            "operation": "CREATE",
            "userInfo": { "username": username, "groups": [DEFAULT_CAPSULE_GROUP] },
            "object": {
                "apiVersion": "v1",
                "kind": "Namespace",
                "metadata": { "name": "oil-dev" },
            },
        },
    });
    serde_json::to_vec(&review).unwrap().into()
}

async fn body(rsp: Response<Body>) -> Value {
    let bytes = rsp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[test]
fn parses_api_server_timeouts() {
    assert_eq!(request_timeout(Some("timeout=10s")), Some(Duration::from_secs(10)));
    assert_eq!(
        request_timeout(Some("dryRun=true&timeout=250ms")),
        Some(Duration::from_millis(250))
    );
    assert_eq!(request_timeout(Some("timeout=10")), None);
    assert_eq!(request_timeout(Some("timeout=1m")), None);
    assert_eq!(request_timeout(None), None);
}

#[test]
fn routes_by_path() {
    let post = http::Method::POST;
    assert_eq!(
        Route::from_request(&post, "/namespaces"),
        Some(Route::Namespaces)
    );
    assert_eq!(Route::from_request(&post, "/tenants"), Some(Route::Tenants));
    assert_eq!(Route::from_request(&post, "/convert"), Some(Route::Convert));
    assert_eq!(Route::from_request(&post, "/"), None);
    assert_eq!(Route::from_request(&http::Method::GET, "/tenants"), None);
}

#[tokio::test]
async fn denies_namespaces_over_quota() {
    let mut reg = Registry::default();
    let admission = mk_admission(vec![full_tenant()], &mut reg);

    let rsp = admission
        .clone()
        .handle(Route::Namespaces, Duration::from_secs(1), namespace_review("alice"))
        .await
        .unwrap();
    assert_eq!(rsp.status(), http::StatusCode::OK);

    let review = body(rsp).await;
    assert_eq!(review["response"]["uid"], "9e8d7c6b-5a49-4382-9170-aabbccddeeff");
    assert_eq!(review["response"]["allowed"], false);
    assert_eq!(review["response"]["status"]["code"], 403);
    assert_eq!(
        review["response"]["status"]["message"],
        "Cannot exceed Namespace quota: please, reach out to the system administrators"
    );

    let mut metrics = String::new();
    prometheus_client::encoding::text::encode(&mut metrics, &reg).unwrap();
    assert!(
        metrics.contains(r#"decisions_total{route="namespaces",operation="create",allowed="false"} 1"#),
        "{metrics}"
    );
}

#[tokio::test]
async fn invalid_reviews_are_reported() {
    let mut reg = Registry::default();
    let admission = mk_admission(vec![], &mut reg);

    let rsp = admission
        .handle(
            Route::Tenants,
            Duration::from_secs(1),
            bytes::Bytes::from_static(b"{\"kind\": 3}"),
        )
        .await
        .unwrap();
    let review = body(rsp).await;
    assert_eq!(review["response"]["allowed"], false);
}

#[tokio::test]
async fn converts_tenants() {
    let mut reg = Registry::default();
    let admission = mk_admission(vec![], &mut reg);

    let review = json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "ConversionReview",
        "request": {
            "uid": "0a1b2c3d-4e5f-4a6b-8c7d-8e9f00112233",
            "desiredAPIVersion": V1BETA1,
            "objects": [serde_json::to_value(full_tenant()).unwrap()],
        },
    });
    let rsp = admission
        .handle(
            Route::Convert,
            Duration::from_secs(1),
            serde_json::to_vec(&review).unwrap().into(),
        )
        .await
        .unwrap();

    let review = body(rsp).await;
    let converted = &review["response"]["convertedObjects"][0];
    assert_eq!(converted["apiVersion"], V1BETA1);
    assert_eq!(
        converted["metadata"]["annotations"]["capsule.clastix.io/deny-wildcard"],
        "false"
    );
    assert_ne!(converted["apiVersion"], V1BETA2);
}

#[tokio::test]
async fn malformed_conversion_reviews_are_bad_requests() {
    let mut reg = Registry::default();
    let admission = mk_admission(vec![], &mut reg);
    let rsp = admission
        .handle(
            Route::Convert,
            Duration::from_secs(1),
            bytes::Bytes::from_static(b"not json"),
        )
        .await
        .unwrap();
    assert_eq!(rsp.status(), http::StatusCode::BAD_REQUEST);
}
