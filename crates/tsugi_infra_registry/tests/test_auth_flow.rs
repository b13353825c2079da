//! Wire-level tests against an in-process fake registry: the `/v2/` probe,
//! anonymous and credentialed token issuance, and the manifest digest read.

use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use reqwest::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tsugi_domain::credential::{AuthMethod, RegistryCredential};
use tsugi_infra_registry::{AuthResolver, RegistryClient, RegistryError};

const DIGEST: &str = "sha256:a1b2c3d4e5f60718a1b2c3d4e5f60718a1b2c3d4e5f60718a1b2c3d4e5f60718";

#[derive(Clone)]
struct FakeHub {
    realm: String,
    open: bool,
    require_basic: bool,
    probes: Arc<AtomicUsize>,
    token_requests: Arc<AtomicUsize>,
    token_queries: Arc<Mutex<Vec<String>>>,
}

async fn spawn_hub(open: bool, require_basic: bool) -> (String, FakeHub) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hub = FakeHub {
        realm: format!("http://{}/token", addr),
        open,
        require_basic,
        probes: Arc::default(),
        token_requests: Arc::default(),
        token_queries: Arc::default(),
    };
    let app = Router::new()
        .route("/v2/", get(probe))
        .route("/token", get(token))
        .route("/v2/app/manifests/:tag", get(manifest))
        .with_state(hub.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr.to_string(), hub)
}

async fn probe(State(hub): State<FakeHub>) -> Response {
    hub.probes.fetch_add(1, Ordering::SeqCst);
    if hub.open {
        return StatusCode::OK.into_response();
    }
    (
        StatusCode::UNAUTHORIZED,
        [(
            header::WWW_AUTHENTICATE,
            format!(r#"Bearer realm="{}",service="fake-hub""#, hub.realm),
        )],
    )
        .into_response()
}

async fn token(
    State(hub): State<FakeHub>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let n = hub.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
    hub.token_queries
        .lock()
        .unwrap()
        .push(query.unwrap_or_default());
    if hub.require_basic {
        let expected = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode("bot:hunter2")
        );
        let sent = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if sent != Some(expected.as_str()) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }
    Json(serde_json::json!({ "token": format!("tok-{}", n) })).into_response()
}

async fn manifest(headers: HeaderMap) -> Response {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer "));
    if !bearer {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    (StatusCode::OK, [("Docker-Content-Digest", DIGEST)]).into_response()
}

#[tokio::test]
async fn probe_challenge_and_multi_scope_token() {
    let (host, hub) = spawn_hub(false, false).await;
    let resolver = AuthResolver::new(Client::new());

    let challenge = resolver.check_auth(&host).await.unwrap().unwrap();
    assert_eq!(challenge.service.as_deref(), Some("fake-hub"));

    let repos = vec!["app".to_string(), "org/lib".to_string()];
    let auth = resolver
        .get_token_multi(&challenge, &host, &repos, &[])
        .await
        .unwrap();
    assert_eq!(auth.method, AuthMethod::Anonymous);
    assert!(!auth.used_credential);
    assert_eq!(auth.bearer().as_deref(), Some("Bearer tok-1"));

    // Both repositories ride on one token round trip.
    assert_eq!(hub.token_requests.load(Ordering::SeqCst), 1);
    let query = hub.token_queries.lock().unwrap()[0].clone();
    assert_eq!(query.matches("scope=").count(), 2);
    assert!(query.contains("service=fake-hub"));
}

#[tokio::test]
async fn open_registry_probe_yields_no_challenge() {
    let (host, hub) = spawn_hub(true, false).await;
    let resolver = AuthResolver::new(Client::new());

    assert!(resolver.check_auth(&host).await.unwrap().is_none());
    assert_eq!(hub.probes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn credential_is_tried_after_anonymous_rejection() {
    let (host, hub) = spawn_hub(false, true).await;
    let resolver = AuthResolver::new(Client::new());

    let challenge = resolver.check_auth(&host).await.unwrap().unwrap();
    let cred = RegistryCredential {
        url: host.clone(),
        username: "bot".to_string(),
        encrypted_token: base64::engine::general_purpose::STANDARD.encode("hunter2"),
        enabled: true,
    };
    let auth = resolver
        .get_token_multi(&challenge, &host, &["app".to_string()], &[cred])
        .await
        .unwrap();

    assert_eq!(auth.method, AuthMethod::Credential);
    assert!(auth.used_credential);
    assert_eq!(auth.username.as_deref(), Some("bot"));
    // Anonymous first, then the stored credential.
    assert_eq!(hub.token_requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn manifest_head_reads_digest_header() {
    let (host, _hub) = spawn_hub(false, false).await;
    let client = RegistryClient::new(Client::new());

    let digest = client
        .get_latest_digest(&host, "app", "1", Some("Bearer tok-1"))
        .await
        .unwrap();
    assert_eq!(digest, DIGEST);

    let err = client
        .get_latest_digest(&host, "app", "1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Unauthorized));
}

#[tokio::test]
async fn authorization_for_probes_and_issues_one_token() {
    let (host, hub) = spawn_hub(false, false).await;
    let resolver = AuthResolver::new(Client::new());

    let bearer = resolver.authorization_for(&host, "app", &[]).await.unwrap();
    assert_eq!(bearer.as_deref(), Some("Bearer tok-1"));
    assert_eq!(hub.probes.load(Ordering::SeqCst), 1);
    assert_eq!(hub.token_requests.load(Ordering::SeqCst), 1);
}
