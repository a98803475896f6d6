//! XP array behavior: Configuration Manager sessions and array registration.

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use storrest::{CommandViewAE, RequestOptions, Rest, RestError, Xp, XpGeneration};

use common::MockServer;

const USER: &str = "Admin";
const PASSWORD: &str = "admin";
/// `Admin:admin` in basic-auth form.
const BASIC_AUTH: &str = "Basic QWRtaW46YWRtaW4=";

const SVP: &str = "10.0.0.9";
const SERIAL: &str = "12345";
/// XP7 generation digit plus the zero padded serial.
const DEVICE_ID: &str = "800000012345";

struct CvaeState {
    registered: AtomicBool,
    login_attempts: AtomicUsize,
    logins: AtomicUsize,
    registrations: AtomicUsize,
    logouts: AtomicUsize,
    protected: AtomicUsize,
    expire_first: AtomicUsize,
    logout_with_token: AtomicBool,
}

impl CvaeState {
    fn new(registered: bool) -> Self {
        Self {
            registered: AtomicBool::new(registered),
            login_attempts: AtomicUsize::new(0),
            logins: AtomicUsize::new(0),
            registrations: AtomicUsize::new(0),
            logouts: AtomicUsize::new(0),
            protected: AtomicUsize::new(0),
            expire_first: AtomicUsize::new(0),
            logout_with_token: AtomicBool::new(false),
        }
    }

    fn take_expiry(&self) -> bool {
        self.expire_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn token_is_current(&self, headers: &HeaderMap) -> bool {
        let current = format!("Session tok-{}", self.logins.load(Ordering::SeqCst));
        self.logins.load(Ordering::SeqCst) > 0
            && headers
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                == Some(current.as_str())
    }
}

fn basic_auth_ok(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some(BASIC_AUTH)
}

async fn open_session(
    State(state): State<Arc<CvaeState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.login_attempts.fetch_add(1, Ordering::SeqCst);
    if !state.registered.load(Ordering::SeqCst) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "messageId": "KART30070-E",
                "message": "The specified storage device is not registered.",
            })),
        );
    }
    if !basic_auth_ok(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "messageId": "KART20022-E",
                "errorSource": "/ConfigurationManager/v1/objects/storages",
                "message": "The user name or password is incorrect.",
                "cause": "The user name or password does not match the registered one.",
                "solution": "Check the user name and password.",
            })),
        );
    }
    let n = state.logins.fetch_add(1, Ordering::SeqCst) + 1;
    (
        StatusCode::OK,
        Json(json!({ "sessionId": n, "token": format!("tok-{n}") })),
    )
}

async fn close_session(
    State(state): State<Arc<CvaeState>>,
    Path(sid): Path<i64>,
    headers: HeaderMap,
) -> StatusCode {
    state.logouts.fetch_add(1, Ordering::SeqCst);
    let current = state.logins.load(Ordering::SeqCst) as i64;
    state
        .logout_with_token
        .store(state.token_is_current(&headers) && sid == current, Ordering::SeqCst);
    StatusCode::OK
}

async fn register(
    State(state): State<Arc<CvaeState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.registrations.fetch_add(1, Ordering::SeqCst);
    if !basic_auth_ok(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "messageId": "KART20022-E" })),
        );
    }
    if body["serialNumber"] != SERIAL || body["model"] != "XP7" || body["svpIp"] != SVP {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "messageId": "KART20008-E" })),
        );
    }
    state.registered.store(true, Ordering::SeqCst);
    (StatusCode::OK, Json(json!({ "storageDeviceId": DEVICE_ID })))
}

/// The storage list needs no authentication, matching the real service.
async fn list_storages(State(state): State<Arc<CvaeState>>) -> Json<Value> {
    if state.registered.load(Ordering::SeqCst) {
        Json(json!({
            "data": [{
                "storageDeviceId": DEVICE_ID,
                "model": "XP7",
                "serialNumber": 12345,
                "svpIp": SVP,
            }]
        }))
    } else {
        Json(json!({ "data": [] }))
    }
}

async fn unregister(
    State(state): State<Arc<CvaeState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !basic_auth_ok(&headers) || id != DEVICE_ID {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    state.registered.store(false, Ordering::SeqCst);
    (StatusCode::OK, Json(json!({})))
}

async fn pools(
    State(state): State<Arc<CvaeState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.protected.fetch_add(1, Ordering::SeqCst);
    if state.take_expiry() || !state.token_is_current(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "messageId": "KART40047-E",
                "message": "The specified token is invalid.",
            })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({ "data": [{ "poolId": 0, "poolName": "pool-0" }] })),
    )
}

async fn serve(registered: bool) -> (MockServer, Arc<CvaeState>) {
    common::init_tracing();
    let state = Arc::new(CvaeState::new(registered));
    let router = Router::new()
        .route(
            "/ConfigurationManager/v1/objects/storages",
            get(list_storages).post(register),
        )
        .route(
            "/ConfigurationManager/v1/objects/storages/{id}",
            delete(unregister),
        )
        .route(
            "/ConfigurationManager/v1/objects/storages/800000012345/sessions",
            post(open_session),
        )
        .route(
            "/ConfigurationManager/v1/objects/storages/800000012345/sessions/{sid}",
            delete(close_session),
        )
        .route(
            "/ConfigurationManager/v1/objects/storages/800000012345/pools",
            get(pools),
        )
        .with_state(state.clone());
    (MockServer::start(router).await, state)
}

fn client(server: &MockServer) -> Rest<Xp> {
    Rest::new(
        Xp::new(server.host(), SVP, SERIAL, USER, PASSWORD, XpGeneration::Xp7)
            .with_ssl(false)
            .with_port(server.port()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_login_request_close() {
    let (server, state) = serve(true).await;
    let mut array = client(&server);

    array.open().await.unwrap();
    assert!(array.has_session());
    assert_eq!(state.logins.load(Ordering::SeqCst), 1);
    assert_eq!(state.registrations.load(Ordering::SeqCst), 0);

    let (status, body) = array.get("pools", RequestOptions::new()).await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(body.unwrap()["data"][0]["poolName"], "pool-0");

    array.close().await;
    assert!(!array.has_session());
    assert_eq!(state.logouts.load(Ordering::SeqCst), 1);
    // The close named the session id and carried its token
    assert!(state.logout_with_token.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_auto_registration_on_first_contact() {
    let (server, state) = serve(false).await;
    let mut array = client(&server);

    // The first login attempt answers 404 KART30070-E, so the client
    // registers the array and logs in again.
    array.open().await.unwrap();
    assert!(array.has_session());
    assert_eq!(state.login_attempts.load(Ordering::SeqCst), 2);
    assert_eq!(state.registrations.load(Ordering::SeqCst), 1);
    assert_eq!(state.logins.load(Ordering::SeqCst), 1);

    let (status, _) = array.get("pools", RequestOptions::new()).await.unwrap();
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_expired_session_replayed_once() {
    let (server, state) = serve(true).await;
    let mut array = client(&server);
    array.open().await.unwrap();

    state.expire_first.store(1, Ordering::SeqCst);
    let (status, _) = array.get("pools", RequestOptions::new()).await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(state.logins.load(Ordering::SeqCst), 2);
    assert_eq!(state.protected.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_wrong_credentials() {
    let (server, state) = serve(true).await;
    let mut array = Rest::new(
        Xp::new(server.host(), SVP, SERIAL, USER, "wrong", XpGeneration::Xp7)
            .with_ssl(false)
            .with_port(server.port()),
    )
    .unwrap();

    let err = array.open().await.unwrap_err();
    match err {
        RestError::Auth { reason, .. } => {
            // The structured Configuration Manager error is preserved
            assert!(reason.contains("KART20022-E"), "reason: {reason}");
            assert!(reason.contains("incorrect"), "reason: {reason}");
        }
        other => panic!("expected an auth error, got {other:?}"),
    }
    assert_eq!(state.logins.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_sessionless_unauthorized_is_returned_raw() {
    let (server, state) = serve(true).await;
    let mut array = client(&server);

    // Without an active session a 401 cannot mean expiry, so it is
    // handed back instead of triggering a login.
    let (status, body) = array.get("pools", RequestOptions::new()).await.unwrap();
    assert_eq!(status, 401);
    assert_eq!(body.unwrap()["messageId"], "KART40047-E");
    assert_eq!(state.logins.load(Ordering::SeqCst), 0);
    assert_eq!(state.protected.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_registry_find_and_unregister() -> anyhow::Result<()> {
    let (server, _state) = serve(true).await;
    let registry = CommandViewAE::new(server.host())
        .with_ssl(false)
        .with_port(server.port());

    // serialNumber comes back as a JSON number and still matches
    let record = registry.find(SERIAL).await?.expect("array should be known");
    assert_eq!(record["storageDeviceId"], DEVICE_ID);

    assert!(registry.unregister(SERIAL, USER, PASSWORD).await?);
    assert!(registry.find(SERIAL).await?.is_none());
    // A second removal has nothing left to do
    assert!(!registry.unregister(SERIAL, USER, PASSWORD).await?);
    Ok(())
}
