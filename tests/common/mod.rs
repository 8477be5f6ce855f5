//! Shared fixtures: a local stand-in for the Domo API and the identity
//! provider token endpoint, plus state builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    Form, Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use hubsync::config::{IdentityConfig, PlatformConfig, SessionConfig};
use hubsync::directory::{DirectoryEntry, EmbedDirectory};
use hubsync::embed::EmbedService;
use hubsync::gateway::AppState;
use hubsync::identity::{AuthenticatedUser, IdentityClient, SessionStore};
use hubsync::platform::PlatformClient;

pub const CLIENT_ID: &str = "domo-client";
pub const CLIENT_SECRET: &str = "domo-secret";
pub const EMBED_HOST: &str = "https://embed.example.test";
pub const TENANT: &str = "tenant-1";
pub const IDENTITY_CLIENT_ID: &str = "app-id";
pub const SIGNING_KID: &str = "test-signing-key";

/// RSA key the mock identity provider signs ID tokens with
const SIGNING_KEY_PEM: &str = include_str!("../fixtures/id_token_key.pem");
/// Modulus of the key above, base64url
const SIGNING_KEY_MODULUS: &str = "vz64LvtLqTIouBFw9p8ZeoZQZJ3q-hVjn6Locs3pPp5cpXSiEzcJVPqcRKvFD9piXWirAe94ZTUousms1_2s9RDXtIfaLLzFq7W3qtG7BaV4IRlU3qusuCy8VZZb4p0QLo-Z9O2WNER5wONSrHaL9p1jz7VSuByKfo8HkIqRAUnDkK6rM30z_u3zo4VtPXqtL9hUywUqTUhE5qoCqX772uBsDtPId7HM-GQ33ihPMqa632NEAsYMWWE1THTTAdTa3aaDkoCBflkRuWPNSdCqUsCHqLCCTjSYnFUOSq0XyCd_aWR2Io3D_prrLHA-Tr20IjSwLv5VVJyEG98ZS95Nfw";

/// How the mock answers
#[derive(Debug, Clone)]
pub struct MockBehavior {
    /// Value of `access_token`
    pub access_token: String,
    /// `expires_in`, omitted from the response when `None`
    pub expires_in: Option<u64>,
    /// Status of the token endpoint
    pub token_status: StatusCode,
    /// Delay before the token endpoint answers
    pub token_delay: Option<Duration>,
    /// Embed ids answered with HTTP 500
    pub failing_embeds: Vec<String>,
    /// Embed ids answered with HTTP 401
    pub unauthorized_embeds: Vec<String>,
    /// Embed ids answered with 200 but no `authentication`
    pub tokenless_embeds: Vec<String>,
    /// Claims put in the identity provider's id_token, over valid
    /// `aud`, `iss`, `iat` and `exp` defaults
    pub id_token_claims: Value,
    /// Sign id_tokens with a key id the key set does not publish
    pub unknown_signing_key: bool,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            access_token: "AT1".to_string(),
            expires_in: Some(300),
            token_status: StatusCode::OK,
            token_delay: None,
            failing_embeds: Vec::new(),
            unauthorized_embeds: Vec::new(),
            tokenless_embeds: Vec::new(),
            id_token_claims: json!({ "preferred_username": "a@x.com", "name": "Ada" }),
            unknown_signing_key: false,
        }
    }
}

#[derive(Default)]
struct Recorded {
    token_auth: Vec<String>,
    token_forms: Vec<HashMap<String, String>>,
    embed_targets: Vec<String>,
    embed_auth: Vec<String>,
    embed_bodies: Vec<Value>,
    user_bodies: Vec<Value>,
    identity_forms: Vec<HashMap<String, String>>,
}

struct MockState {
    behavior: MockBehavior,
    base_url: String,
    token_calls: AtomicUsize,
    embed_calls: AtomicUsize,
    jwks_calls: AtomicUsize,
    recorded: Mutex<Recorded>,
}

/// Running mock server
pub struct MockPlatform {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockPlatform {
    /// Start a mock with default behavior
    pub async fn start() -> Self {
        Self::start_with(MockBehavior::default()).await
    }

    /// Start a mock with custom behavior
    pub async fn start_with(behavior: MockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState {
            behavior,
            base_url: format!("http://{addr}"),
            token_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
            jwks_calls: AtomicUsize::new(0),
            recorded: Mutex::new(Recorded::default()),
        });

        let app = Router::new()
            .route("/oauth/token", post(token_handler))
            .route("/v1/{target}/embed/auth", post(embed_handler))
            .route("/v1/users", post(users_handler))
            .route("/{tenant}/oauth2/v2.0/token", post(identity_token_handler))
            .route("/{tenant}/discovery/v2.0/keys", get(jwks_handler))
            .with_state(Arc::clone(&state));

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn token_calls(&self) -> usize {
        self.state.token_calls.load(Ordering::SeqCst)
    }

    pub fn embed_calls(&self) -> usize {
        self.state.embed_calls.load(Ordering::SeqCst)
    }

    pub fn jwks_calls(&self) -> usize {
        self.state.jwks_calls.load(Ordering::SeqCst)
    }

    pub fn token_auth_headers(&self) -> Vec<String> {
        self.state.recorded.lock().unwrap().token_auth.clone()
    }

    pub fn token_forms(&self) -> Vec<HashMap<String, String>> {
        self.state.recorded.lock().unwrap().token_forms.clone()
    }

    pub fn embed_targets(&self) -> Vec<String> {
        self.state.recorded.lock().unwrap().embed_targets.clone()
    }

    pub fn embed_auth_headers(&self) -> Vec<String> {
        self.state.recorded.lock().unwrap().embed_auth.clone()
    }

    pub fn embed_bodies(&self) -> Vec<Value> {
        self.state.recorded.lock().unwrap().embed_bodies.clone()
    }

    pub fn user_bodies(&self) -> Vec<Value> {
        self.state.recorded.lock().unwrap().user_bodies.clone()
    }

    pub fn identity_forms(&self) -> Vec<HashMap<String, String>> {
        self.state.recorded.lock().unwrap().identity_forms.clone()
    }

    /// Platform settings pointing at this mock
    pub fn platform_config(&self) -> PlatformConfig {
        PlatformConfig {
            api_host: self.base_url(),
            embed_host: EMBED_HOST.to_string(),
            client_id: CLIENT_ID.to_string(),
            client_secret: CLIENT_SECRET.to_string(),
            ..PlatformConfig::default()
        }
    }

    /// Identity settings pointing at this mock
    pub fn identity_config(&self) -> IdentityConfig {
        IdentityConfig {
            client_id: IDENTITY_CLIENT_ID.to_string(),
            client_secret: "app-secret".to_string(),
            tenant_id: TENANT.to_string(),
            authority_host: self.base_url(),
            ..IdentityConfig::default()
        }
    }

    /// Embed service over `entries`, talking to this mock
    pub fn embed_service(&self, entries: Vec<DirectoryEntry>) -> EmbedService {
        let config = self.platform_config();
        let client = PlatformClient::new(&config).unwrap();
        EmbedService::with_client(
            client,
            &config,
            Arc::new(EmbedDirectory::from_entries(entries)),
        )
    }

    /// Full handler state; identity routes enabled when `with_identity`
    pub fn app_state(&self, entries: Vec<DirectoryEntry>, with_identity: bool) -> Arc<AppState> {
        let identity = with_identity
            .then(|| IdentityClient::new(reqwest::Client::new(), &self.identity_config()));
        let session = SessionConfig::default();
        Arc::new(AppState {
            embeds: Arc::new(self.embed_service(entries)),
            identity,
            sessions: Arc::new(SessionStore::new(session.ttl)),
            session,
            redirect_path: "/getAToken".to_string(),
            public_url: None,
            request_timeout: Duration::from_secs(30),
        })
    }
}

pub fn entry(email: &str, embed_id: &str) -> DirectoryEntry {
    DirectoryEntry {
        email: email.to_string(),
        embed_id: embed_id.to_string(),
    }
}

/// Two embeds for `a@x.com`, one for `b@x.com`
pub fn sample_entries() -> Vec<DirectoryEntry> {
    vec![
        entry("a@x.com", "E1"),
        entry("b@x.com", "B1"),
        entry("a@x.com", "E2"),
    ]
}

pub fn user(email: &str) -> AuthenticatedUser {
    AuthenticatedUser::from_value(json!({ "preferred_username": email })).unwrap()
}

/// Start a signed-in session and return its `Cookie` header value
pub fn signed_in_cookie(state: &AppState, email: &str) -> String {
    let id = state.sessions.create();
    state.sessions.set_user(&id, user(email));
    format!("{}={id}", state.session.cookie_name)
}

fn header_string(headers: &HeaderMap, name: axum::http::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn token_handler(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.token_calls.fetch_add(1, Ordering::SeqCst);
    {
        let mut recorded = state.recorded.lock().unwrap();
        recorded.token_auth.push(header_string(&headers, AUTHORIZATION));
        recorded.token_forms.push(form);
    }
    if let Some(delay) = state.behavior.token_delay {
        tokio::time::sleep(delay).await;
    }
    if !state.behavior.token_status.is_success() {
        return (state.behavior.token_status, "token endpoint refused").into_response();
    }

    let mut body = json!({ "access_token": state.behavior.access_token, "token_type": "bearer" });
    if let Some(expires_in) = state.behavior.expires_in {
        body["expires_in"] = json!(expires_in);
    }
    Json(body).into_response()
}

async fn embed_handler(
    State(state): State<Arc<MockState>>,
    Path(target): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.embed_calls.fetch_add(1, Ordering::SeqCst);
    let embed_id = body["authorizations"][0]["token"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    {
        let mut recorded = state.recorded.lock().unwrap();
        recorded.embed_targets.push(target);
        recorded.embed_auth.push(header_string(&headers, AUTHORIZATION));
        recorded.embed_bodies.push(body);
    }

    let behavior = &state.behavior;
    if behavior.failing_embeds.contains(&embed_id) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "embed backend exploded").into_response();
    }
    if behavior.unauthorized_embeds.contains(&embed_id) {
        return (StatusCode::UNAUTHORIZED, "token revoked").into_response();
    }
    if behavior.tokenless_embeds.contains(&embed_id) {
        return Json(json!({})).into_response();
    }
    Json(json!({ "authentication": format!("ET-{embed_id}") })).into_response()
}

async fn users_handler(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.recorded.lock().unwrap().user_bodies.push(body.clone());
    let mut created = body;
    created["id"] = json!(1001);
    (StatusCode::CREATED, Json(created)).into_response()
}

async fn identity_token_handler(
    State(state): State<Arc<MockState>>,
    Path(tenant): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let bad_code = form.get("code").is_some_and(|c| c == "bad-code");
    state.recorded.lock().unwrap().identity_forms.push(form);
    if bad_code {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_grant",
                "error_description": "AADSTS70008: code expired"
            })),
        )
            .into_response();
    }

    let now = unix_now();
    let mut claims = json!({
        "aud": IDENTITY_CLIENT_ID,
        "iss": format!("{}/{tenant}/v2.0", state.base_url),
        "iat": now,
        "exp": now + 3600,
    });
    if let Some(overrides) = state.behavior.id_token_claims.as_object() {
        for (name, value) in overrides {
            claims[name] = value.clone();
        }
    }
    let kid = if state.behavior.unknown_signing_key {
        "rotated-away"
    } else {
        SIGNING_KID
    };

    Json(json!({
        "access_token": "graph-token",
        "id_token": sign_id_token(&claims, kid),
    }))
    .into_response()
}

async fn jwks_handler(State(state): State<Arc<MockState>>) -> Json<Value> {
    state.jwks_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "keys": [{
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": SIGNING_KID,
            "n": SIGNING_KEY_MODULUS,
            "e": "AQAB"
        }]
    }))
}

/// RS256 JWT over `claims`, signed with the fixture key
pub fn sign_id_token(claims: &Value, kid: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(SIGNING_KEY_PEM.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}
