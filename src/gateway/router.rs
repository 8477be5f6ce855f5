//! HTTP router and handlers

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header::HOST},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{debug, error, warn};

use super::pages;
use crate::config::SessionConfig;
use crate::embed::{EmbedConfiguration, EmbedService};
use crate::identity::{AuthenticatedUser, IdentityClient, SessionStore};

/// Shared application state
pub struct AppState {
    /// Embed token orchestration
    pub embeds: Arc<EmbedService>,
    /// Identity provider client (`None` disables the login routes)
    pub identity: Option<IdentityClient>,
    /// Server-side sessions
    pub sessions: Arc<SessionStore>,
    /// Session cookie settings
    pub session: SessionConfig,
    /// Path of the login callback route
    pub redirect_path: String,
    /// Externally visible base URL, if configured
    pub public_url: Option<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl AppState {
    /// The signed-in user attached to the request's session cookie
    fn session_user(&self, jar: &CookieJar) -> Option<AuthenticatedUser> {
        jar.get(&self.session.cookie_name)
            .and_then(|cookie| self.sessions.user(cookie.value()))
    }

    /// Absolute URL of `path` as seen by the browser
    fn external_url(&self, headers: &HeaderMap, path: &str) -> String {
        if let Some(base) = &self.public_url {
            return format!("{}{path}", base.trim_end_matches('/'));
        }
        let host = headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost");
        format!("http://{host}{path}")
    }

    fn session_cookie(&self, id: String) -> Cookie<'static> {
        let max_age = i64::try_from(self.session.ttl.as_secs()).unwrap_or(i64::MAX);
        Cookie::build((self.session.cookie_name.clone(), id))
            .http_only(true)
            .secure(self.session.secure_cookies)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(time::Duration::seconds(max_age))
            .build()
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let redirect_path = state.redirect_path.clone();
    let timeout = state.request_timeout;

    Router::new()
        .route("/health", get(health_handler))
        .route("/", get(index_handler))
        .route("/login", get(login_handler))
        .route(&redirect_path, get(authorized_handler))
        .route("/logout", get(logout_handler))
        .route("/domo/api/me", get(me_handler))
        .route("/domo/embed-page", get(embed_page_handler))
        .route("/domo/embed-token", get(embed_token_handler))
        .layer(TimeoutLayer::new(timeout))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET / - session status
async fn index_handler(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let user = state.session_user(&jar);
    Json(json!({
        "authenticated": user.is_some(),
        "user": user,
    }))
}

/// GET /login - start the authorization-code flow
async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let Some(identity) = &state.identity else {
        return identity_disabled_response();
    };

    let session_id = jar
        .get(&state.session.cookie_name)
        .map(|c| c.value().to_string())
        .filter(|id| state.sessions.contains(id))
        .unwrap_or_else(|| state.sessions.create());

    let login_state = uuid::Uuid::new_v4().to_string();
    state.sessions.set_login_state(&session_id, login_state.clone());

    let redirect_uri = state.external_url(&headers, &state.redirect_path);
    match identity.authorization_url(&login_state, &redirect_uri) {
        Ok(url) => {
            debug!(redirect_uri = %redirect_uri, "Redirecting to identity provider");
            let jar = jar.add(state.session_cookie(session_id));
            (jar, Redirect::to(&url)).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to build authorization URL");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Authorization callback query parameters
#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GET {redirect_path} - finish the authorization-code flow
async fn authorized_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    let Some(identity) = &state.identity else {
        return identity_disabled_response();
    };

    let session_id = jar
        .get(&state.session.cookie_name)
        .map(|c| c.value().to_string());
    let state_ok = match (&session_id, &params.state) {
        (Some(id), Some(returned)) => state.sessions.verify_login_state(id, returned),
        _ => false,
    };
    let Some(session_id) = session_id.filter(|_| state_ok) else {
        warn!("Login callback with missing or mismatched state");
        return Redirect::to("/").into_response();
    };

    if let Some(err) = params.error {
        let detail = params.error_description.unwrap_or(err);
        return (StatusCode::BAD_REQUEST, format!("Error: {detail}")).into_response();
    }

    let Some(code) = params.code else {
        return (StatusCode::BAD_REQUEST, "No code returned by the auth server.").into_response();
    };

    let redirect_uri = state.external_url(&headers, &state.redirect_path);
    match identity.exchange_code(&code, &redirect_uri).await {
        Ok(user) => {
            // New id on sign-in so a pre-login cookie never becomes authenticated
            let session_id = state.sessions.sign_in(&session_id, user);
            let jar = jar.add(state.session_cookie(session_id));
            (jar, Redirect::to("/")).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Login failed");
            (StatusCode::BAD_REQUEST, format!("Login failed. Details: {e}")).into_response()
        }
    }
}

/// GET /logout - drop the session and sign out at the provider
async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    if let Some(cookie) = jar.get(&state.session.cookie_name) {
        state.sessions.remove(cookie.value());
    }
    let jar = jar.remove(Cookie::build((state.session.cookie_name.clone(), "")).path("/"));

    let target = match &state.identity {
        Some(identity) => identity
            .logout_url(&state.external_url(&headers, "/"))
            .unwrap_or_else(|_| "/".to_string()),
        None => "/".to_string(),
    };
    (jar, Redirect::to(&target)).into_response()
}

/// GET /domo/api/me - claims of the signed-in user
async fn me_handler(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    match state.session_user(&jar) {
        Some(user) => Json(json!({ "user": user })).into_response(),
        None => unauthorized_response(),
    }
}

/// GET /domo/embed-page - embed viewer
async fn embed_page_handler(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let Some(user) = state.session_user(&jar) else {
        return Redirect::to("/login").into_response();
    };

    match state.embeds.get_embed_configuration(Some(&user)).await {
        Ok(Some(config)) => Html(pages::embed_page(&config)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Html(pages::NO_EMBEDS_PAGE)).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to build embed page");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(pages::error_page(&e.public_detail())),
            )
                .into_response()
        }
    }
}

/// One entry of the embed-token API response
#[derive(Debug, Serialize)]
struct EmbedTokenView<'a> {
    embed_id: &'a str,
    #[serde(rename = "embedToken")]
    embed_token: &'a str,
}

/// Embed-token API response body
#[derive(Debug, Serialize)]
struct EmbedTokenResponse<'a> {
    user: Option<&'a str>,
    count: usize,
    embeds: Vec<EmbedTokenView<'a>>,
}

impl<'a> EmbedTokenResponse<'a> {
    fn new(user: &'a AuthenticatedUser, config: &'a EmbedConfiguration) -> Self {
        Self {
            user: user.preferred_username(),
            count: config.embeds.len(),
            embeds: config
                .embeds
                .iter()
                .map(|e| EmbedTokenView {
                    embed_id: &e.embed_id,
                    embed_token: &e.token,
                })
                .collect(),
        }
    }
}

/// GET /domo/embed-token - JSON embed tokens for the signed-in user
async fn embed_token_handler(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let Some(user) = state.session_user(&jar) else {
        return unauthorized_response();
    };

    match state.embeds.get_embed_configuration(Some(&user)).await {
        Ok(Some(config)) => Json(EmbedTokenResponse::new(&user, &config)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "No embed configured for this user" })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to create embed tokens");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "failed to create embed token",
                    "code": e.code(),
                    "detail": e.public_detail(),
                })),
            )
                .into_response()
        }
    }
}

/// Create a 401 Unauthorized response
fn unauthorized_response() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" }))).into_response()
}

fn identity_disabled_response() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "Identity provider is not configured" })),
    )
        .into_response()
}
