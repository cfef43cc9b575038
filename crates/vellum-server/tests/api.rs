use std::sync::{Arc, LazyLock};

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use vellum_crypto::{Identity, keys, open, seal};
use vellum_db::Database;
use vellum_server::middleware::IDENTITY_HEADER;
use vellum_server::{AppState, AppStateInner, app};
use vellum_types::EnvelopeSet;
use vellum_types::api::{MessageResponse, PublicKeyResponse};

static ALICE: LazyLock<Identity> = LazyLock::new(|| keys::generate(Uuid::new_v4()).unwrap());
static BOB: LazyLock<Identity> = LazyLock::new(|| keys::generate(Uuid::new_v4()).unwrap());

fn state() -> AppState {
    AppStateInner::new(Arc::new(Database::open_in_memory().unwrap()), 100)
}

async fn call(
    state: &AppState,
    method: &str,
    uri: &str,
    caller: Option<Uuid>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        req = req.header(IDENTITY_HEADER, caller.to_string());
    }
    let req = match body {
        Some(body) => req
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let res = app(state.clone()).oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn requests_without_identity_are_unauthorized() {
    let state = state();
    let uri = format!("/identities/{}/public-key", ALICE.id());
    let (status, _) = call(&state, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn public_key_lifecycle() {
    let state = state();
    let uri = format!("/identities/{}/public-key", ALICE.id());
    let body = json!({ "public_key": ALICE.public_pem().unwrap() });

    // Only the owner may publish
    let (status, _) = call(&state, "PUT", &uri, Some(BOB.id()), Some(body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&state, "GET", &uri, Some(BOB.id()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, published) = call(&state, "PUT", &uri, Some(ALICE.id()), Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let published: PublicKeyResponse = serde_json::from_value(published).unwrap();
    assert_eq!(published.fingerprint, ALICE.public_key().fingerprint().unwrap());

    let (status, fetched) = call(&state, "GET", &uri, Some(BOB.id()), None).await;
    assert_eq!(status, StatusCode::OK);
    let fetched: PublicKeyResponse = serde_json::from_value(fetched).unwrap();
    assert_eq!(fetched.public_key, ALICE.public_pem().unwrap());
    assert_eq!(fetched.fingerprint, published.fingerprint);

    // Keys are immutable
    let replacement = json!({ "public_key": BOB.public_pem().unwrap() });
    let (status, _) = call(&state, "PUT", &uri, Some(ALICE.id()), Some(replacement)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unparseable_key_is_rejected() {
    let state = state();
    let id = Uuid::new_v4();
    let uri = format!("/identities/{}/public-key", id);
    let body = json!({ "public_key": "-----BEGIN PUBLIC KEY-----\nnope\n-----END PUBLIC KEY-----\n" });
    let (status, _) = call(&state, "PUT", &uri, Some(id), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn each_recipient_fetches_only_its_envelope() {
    let state = state();
    let room = Uuid::new_v4();
    let uri = format!("/rooms/{}/messages", room);
    let eve = Uuid::new_v4();

    let sealed = seal(
        b"see you at eight",
        [(ALICE.id(), ALICE.public_key()), (BOB.id(), BOB.public_key())],
    )
    .unwrap();
    let (status, created) = call(
        &state,
        "POST",
        &uri,
        Some(ALICE.id()),
        Some(json!({ "envelopes": sealed })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let created: MessageResponse = serde_json::from_value(created).unwrap();
    assert_eq!(created.sender_id, ALICE.id());

    let (status, history) = call(&state, "GET", &uri, Some(BOB.id()), None).await;
    assert_eq!(status, StatusCode::OK);
    let history: Vec<MessageResponse> = serde_json::from_value(history).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, created.id);
    assert_eq!(history[0].envelopes.len(), 1);
    let plaintext = open(&history[0].envelopes[&BOB.id()], BOB.private_key()).unwrap();
    assert_eq!(plaintext.as_slice(), b"see you at eight");

    let (_, history) = call(&state, "GET", &uri, Some(eve), None).await;
    assert_eq!(history, json!([]));
}

#[tokio::test]
async fn message_without_recipients_is_rejected() {
    let state = state();
    let uri = format!("/rooms/{}/messages", Uuid::new_v4());
    let (status, _) = call(
        &state,
        "POST",
        &uri,
        Some(ALICE.id()),
        Some(json!({ "envelopes": EnvelopeSet::new() })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn history_pages_backwards() {
    let state = state();
    let room = Uuid::new_v4();
    let uri = format!("/rooms/{}/messages", room);

    for text in ["one", "two", "three"] {
        let sealed = seal(text.as_bytes(), [(BOB.id(), BOB.public_key())]).unwrap();
        let (status, _) = call(&state, "POST", &uri, Some(ALICE.id()), Some(json!({ "envelopes": sealed }))).await;
        assert_eq!(status, StatusCode::CREATED);
        // Keep timestamps strictly increasing
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let (_, page) = call(&state, "GET", &format!("{}?limit=2", uri), Some(BOB.id()), None).await;
    let page: Vec<MessageResponse> = serde_json::from_value(page).unwrap();
    let texts: Vec<_> = page
        .iter()
        .map(|m| open(&m.envelopes[&BOB.id()], BOB.private_key()).unwrap().to_vec())
        .collect();
    assert_eq!(texts, vec![b"three".to_vec(), b"two".to_vec()]);

    let cursor = page[1].created_at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
    let older_uri = format!("{}?before={}&before_id={}", uri, cursor, page[1].id);
    let (_, older) = call(&state, "GET", &older_uri, Some(BOB.id()), None).await;
    let older: Vec<MessageResponse> = serde_json::from_value(older).unwrap();
    assert_eq!(older.len(), 1);
    assert_eq!(
        open(&older[0].envelopes[&BOB.id()], BOB.private_key()).unwrap().as_slice(),
        b"one"
    );

    let (status, _) = call(
        &state,
        "GET",
        &format!("{}?before_id={}", uri, page[1].id),
        Some(BOB.id()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
