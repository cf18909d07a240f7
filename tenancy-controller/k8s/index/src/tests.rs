use super::*;
use kubert::index::IndexClusterResource;
use maplit::btreemap;
use pretty_assertions::assert_eq;
use tenancy_controller_k8s_api::{
    tenant::{OwnerKind, TenantStatus},
    v1beta2::{OwnerSpec, TenantSpec},
};

fn mk_tenant(name: &str, owners: &[(OwnerKind, &str)], namespaces: &[&str]) -> Tenant {
    let spec = TenantSpec {
        owners: owners
            .iter()
            .map(|(kind, name)| OwnerSpec {
                kind: *kind,
                name: name.to_string(),
                cluster_roles: vec![],
                proxy_settings: vec![],
            })
            .collect(),
        ..Default::default()
    };
    let mut tenant = Tenant::new(name, spec);
    tenant.status = Some(TenantStatus {
        size: namespaces.len() as u32,
        namespaces: namespaces.iter().map(ToString::to_string).collect(),
        ..Default::default()
    });
    tenant
}

fn names(tenants: Vec<Arc<Tenant>>) -> Vec<String> {
    tenants.iter().map(|t| t.name_unchecked()).collect()
}

fn synced(tenants: Vec<Tenant>) -> Index {
    let mut index = Index::default();
    index.reset(tenants, Default::default());
    index
}

#[test]
fn lookups_fail_until_synced() {
    let mut index = Index::default();
    index.apply(mk_tenant("oil", &[], &["oil-dev"]));

    assert!(matches!(
        index.tenants_by_namespace("oil-dev"),
        Err(LookupError::NotSynced)
    ));
    assert!(matches!(
        index.tenants_by_owner(&UserInfo::default()),
        Err(LookupError::NotSynced)
    ));

    index.reset(vec![], Default::default());
    assert!(index.is_synced());
    assert_eq!(names(index.tenants_by_namespace("oil-dev").unwrap()), ["oil"]);
}

#[test]
fn tracks_namespace_claims() {
    let mut index = synced(vec![
        mk_tenant("oil", &[], &["oil-dev", "oil-prod"]),
        mk_tenant("gas", &[], &["gas-dev"]),
    ]);
    assert_eq!(index.len(), 2);
    assert_eq!(index.namespaces_len(), 3);

    // Namespaces released by an update are no longer attributed to the tenant.
    index.apply(mk_tenant("oil", &[], &["oil-dev"]));
    assert!(index.tenants_by_namespace("oil-prod").unwrap().is_empty());
    assert_eq!(names(index.tenants_by_namespace("oil-dev").unwrap()), ["oil"]);

    index.delete("oil".to_string());
    assert!(index.tenants_by_namespace("oil-dev").unwrap().is_empty());
    assert_eq!(index.namespaces_len(), 1);
}

#[test]
fn reports_conflicting_claims() {
    let mut index = synced(vec![
        mk_tenant("oil", &[], &["shared", "oil-dev"]),
        mk_tenant("gas", &[], &["shared"]),
    ]);

    assert_eq!(
        names(index.tenants_by_namespace("shared").unwrap()),
        ["gas", "oil"]
    );
    assert_eq!(index.conflicting_namespaces(), 1);

    index.delete("gas".to_string());
    assert_eq!(index.conflicting_namespaces(), 0);
}

#[test]
fn reset_drops_removed_tenants() {
    let mut index = synced(vec![
        mk_tenant("oil", &[], &["oil-dev"]),
        mk_tenant("gas", &[], &["gas-dev"]),
    ]);

    let removed = ["gas".to_string()].into_iter().collect();
    index.reset(vec![mk_tenant("oil", &[], &["oil-dev"])], removed);

    assert_eq!(index.len(), 1);
    assert!(index.tenants_by_namespace("gas-dev").unwrap().is_empty());
}

#[test]
fn finds_tenants_by_owner() {
    let index = synced(vec![
        mk_tenant("oil", &[(OwnerKind::User, "alice")], &[]),
        mk_tenant("gas", &[(OwnerKind::Group, "energy")], &[]),
        mk_tenant("wind", &[(OwnerKind::User, "bob")], &[]),
    ]);

    let alice = UserInfo::new("alice", ["energy".to_string()]);
    assert_eq!(names(index.tenants_by_owner(&alice).unwrap()), ["gas", "oil"]);

    let carol = UserInfo::new("carol", []);
    assert!(index.tenants_by_owner(&carol).unwrap().is_empty());
}

#[tokio::test]
async fn reader_serves_lookups() {
    let index = Index::shared();
    let reader = Reader::new(index.clone());
    assert!(reader.tenants_by_namespace("oil-dev").await.is_err());

    index.write().reset(
        vec![mk_tenant("oil", &[(OwnerKind::User, "alice")], &["oil-dev"])],
        Default::default(),
    );

    let tenants = reader.tenants_by_namespace("oil-dev").await.unwrap();
    assert_eq!(names(tenants), ["oil"]);

    let by_owner = btreemap! {
        "alice" => 1,
        "bob" => 0,
    };
    for (username, expected) in by_owner {
        let user = UserInfo::new(username, []);
        assert_eq!(reader.tenants_by_owner(&user).await.unwrap().len(), expected);
    }
}
