//! Enforcer behaviour over a cache backed by a static or HTTP source.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Query;
use axum::routing::get;
use common::{AccountId, Claims, Role};
use events::PolicyMethod;
use policy::{
    CacheConfig, CachedPolicyStorage, Grant, HttpPolicySource, PoliciesResponse, PolicyEnforcer,
    PolicyError, PolicySource, ResourceFilter, StaticPolicySource,
};
use serde::Deserialize;

async fn enforcer_with(grants: &[&str]) -> (PolicyEnforcer, StaticPolicySource) {
    let source = StaticPolicySource::new();
    for g in grants {
        source.grant(g.parse().unwrap()).await;
    }
    let storage = CachedPolicyStorage::new(
        Arc::new(source.clone()),
        ["orders", "products"],
        CacheConfig::default(),
    );
    (PolicyEnforcer::new(Arc::new(storage)), source)
}

fn customer(id: u64) -> Claims {
    Claims::new(AccountId::new(id), format!("{id}@example.com"), Role::Customer)
}

#[tokio::test]
async fn enforce_matches_only_held_grants() {
    let (enforcer, _) = enforcer_with(&["1:orders:post:*", "1:orders:*:7", "1:products:get:3"]).await;

    assert!(enforcer.enforce("1:orders:post:anything", None).await);
    assert!(enforcer.enforce("1:orders:delete:7", None).await);
    assert!(enforcer.enforce("1:products:get:3", None).await);

    assert!(!enforcer.enforce("1:orders:delete:8", None).await);
    assert!(!enforcer.enforce("1:products:post:3", None).await);
    assert!(!enforcer.enforce("2:orders:post:*", None).await);
    assert!(!enforcer.enforce("1:orders:post", None).await);
}

#[tokio::test]
async fn enforce_denies_when_upstream_is_down() {
    let (enforcer, source) = enforcer_with(&["1:orders:post:*"]).await;
    source.set_unavailable(true);
    assert!(!enforcer.enforce("1:orders:post:*", None).await);
}

#[tokio::test]
async fn custom_matcher_is_used() {
    let (enforcer, _) = enforcer_with(&["1:orders:get:7"]).await;
    fn any_action(request: &Grant, grant: &Grant) -> bool {
        request.sub == grant.sub && request.rtype == grant.rtype && request.rid == grant.rid
    }
    assert!(!enforcer.enforce("1:orders:put:7", None).await);
    assert!(enforcer.enforce("1:orders:put:7", Some(any_action)).await);
}

#[tokio::test]
async fn put_then_delete_is_reflected_in_resource_ids() {
    let (enforcer, _) = enforcer_with(&["1:orders:post:*"]).await;
    // Make the subject resident.
    assert!(enforcer.enforce("1:orders:post:*", None).await);

    let grant = Grant::new("1", "orders", "get", "7");
    enforcer.update_policy(PolicyMethod::Put, &grant).await.unwrap();
    assert!(
        enforcer
            .get_resource_ids("1", "orders", "get")
            .await
            .contains(&"7".to_string())
    );

    enforcer
        .update_policy(PolicyMethod::Delete, &grant)
        .await
        .unwrap();
    assert!(
        !enforcer
            .get_resource_ids("1", "orders", "get")
            .await
            .contains(&"7".to_string())
    );
}

#[tokio::test]
async fn update_before_residency_is_benign() {
    let (enforcer, _) = enforcer_with(&["1:orders:post:*"]).await;
    let err = enforcer
        .update_policy(PolicyMethod::Put, &Grant::new("1", "orders", "get", "7"))
        .await
        .unwrap_err();
    assert!(err.is_benign());
}

#[tokio::test]
async fn authorize_maps_denial_to_insufficient_permission() {
    let (enforcer, _) = enforcer_with(&["1:orders:post:*"]).await;
    enforcer
        .authorize(&customer(1), "orders", "post", "*")
        .await
        .unwrap();
    let err = enforcer
        .authorize(&customer(2), "orders", "post", "*")
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyError::InsufficientPermission));
}

#[tokio::test]
async fn resource_filter_resolution() {
    let (enforcer, _) = enforcer_with(&[
        "1:products:get:*",
        "2:orders:*:a",
        "2:orders:get:b",
        "2:orders:post:*",
    ])
    .await;

    assert_eq!(
        enforcer.resource_filter(&customer(1), "products").await.unwrap(),
        ResourceFilter::Unrestricted
    );

    match enforcer.resource_filter(&customer(2), "orders").await.unwrap() {
        ResourceFilter::Only(mut ids) => {
            ids.sort();
            assert_eq!(ids, vec!["a", "b"]);
        }
        other => panic!("expected explicit ids, got {other:?}"),
    }

    let err = enforcer
        .resource_filter(&customer(3), "orders")
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyError::InsufficientPermission));
}

#[derive(Deserialize)]
struct PolicyQuery {
    sub: String,
    resource_type: String,
}

#[tokio::test]
async fn http_source_reads_policy_listing() {
    let app = Router::new().route(
        "/policies",
        get(|Query(q): Query<PolicyQuery>| async move {
            Json(PoliciesResponse {
                policies: vec![format!("{}:{}:post:*", q.sub, q.resource_type)],
            })
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let source = HttpPolicySource::new(format!("http://{addr}/policies"));
    let policies = source.list_policies("5", "orders").await.unwrap();
    assert_eq!(policies, vec!["5:orders:post:*"]);
}

#[tokio::test]
async fn http_source_surfaces_server_errors() {
    let app = Router::new().route(
        "/policies",
        get(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let source = HttpPolicySource::new(format!("http://{addr}/policies"));
    let err = source.list_policies("5", "orders").await.unwrap_err();
    assert!(err.is_transient());
}
