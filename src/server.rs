//! HTTP API server.
//!
//! Exposes account, persona, and chat endpoints over axum:
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `GET`  | `/health` | no | Health check (`{status, version}`) |
//! | `POST` | `/api/signup` | no | Create an identity and a user profile |
//! | `POST` | `/api/login` | no | Exchange credentials for tokens |
//! | `POST` | `/api/select-character` | yes | Store the `girl`/`boy` persona |
//! | `GET`  | `/api/user-info` | yes | Read the selected persona |
//! | `POST` | `/api/chat` | yes | Answer a message using the user's history |
//!
//! Protected routes expect `Authorization: Bearer <jwt>`. A missing or
//! malformed header is `403`; a token that fails verification is `401`.
//!
//! All errors use one JSON shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Message content is required" } }
//! ```
//!
//! Failures inside the chat pipeline (LLM, embedding, index, stored history)
//! are logged and reported as a generic `500` without internal detail.

use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{bearer_token, Auth0Client, Claims, IdentityProvider, JwtVerifier, TokenVerifier};
use crate::config::Config;
use crate::conversation::{record_exchange, Conversation};
use crate::db::Database;
use crate::error::AuthError;
use crate::history::{HistoryStore, SqliteHistoryStore};
use crate::models::Persona;
use crate::users::UserStore;

const GENERIC_FAILURE: &str = "Something went wrong, please try again.";

/// Collaborators shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub conversation: Arc<Conversation>,
    pub history: Arc<dyn HistoryStore>,
    pub users: UserStore,
    pub verifier: Arc<dyn TokenVerifier>,
    /// Absent when sign-up and login are not configured.
    pub identity: Option<Arc<dyn IdentityProvider>>,
}

/// Build the API router over `state`.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/signup", post(handle_signup))
        .route("/api/login", post(handle_login))
        .route("/api/select-character", post(handle_select_character))
        .route("/api/user-info", get(handle_user_info))
        .route("/api/chat", post(handle_chat))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Wire every collaborator from configuration and serve until terminated.
///
/// Requires an `[auth]` section; `AUTH0_CLIENT_SECRET` enables sign-up and
/// login, without it those two routes answer `503`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let Some(auth) = config.auth.as_ref() else {
        anyhow::bail!("serving the API requires an [auth] section in the config");
    };

    let db = Database::open(config).await?;
    let conversation = Conversation::from_config(config).await?;
    let verifier = JwtVerifier::from_config(auth)?;
    let identity: Option<Arc<dyn IdentityProvider>> = match Auth0Client::new(auth) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "sign-up and login disabled");
            None
        }
    };

    let state = AppState {
        conversation: Arc::new(conversation),
        history: Arc::new(SqliteHistoryStore::new(db.clone())),
        users: UserStore::new(db),
        verifier: Arc::new(verifier),
        identity,
    };

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "API server listening");
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Handler error converted into the JSON error body.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", message)
}

/// Log the real cause and hide it from the client.
fn internal(context: &str, err: impl std::fmt::Display) -> AppError {
    tracing::error!(error = %err, "{}", context);
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", GENERIC_FAILURE)
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ Authentication ============

/// Verified caller of a protected route.
pub struct AuthUser(pub Claims);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        let token = bearer_token(header)
            .map_err(|_| AppError::new(StatusCode::FORBIDDEN, "forbidden", "Authorization header missing"))?;

        match state.verifier.verify(token).await {
            Ok(claims) => Ok(AuthUser(claims)),
            Err(AuthError::JwksFetch(message)) => Err(internal("JWKS unavailable", message)),
            Err(e) => {
                tracing::debug!(error = %e, "rejected token");
                Err(AppError::new(
                    StatusCode::UNAUTHORIZED,
                    "unauthorized",
                    format!("Token verification failed: {}", e),
                ))
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/signup, /api/login ============

#[derive(Deserialize)]
struct Credentials {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

impl Credentials {
    fn require(&self) -> Result<(), AppError> {
        if self.email.is_empty() || self.password.is_empty() {
            return Err(bad_request("Email and password required"));
        }
        Ok(())
    }
}

fn identity_provider(state: &AppState) -> Result<&Arc<dyn IdentityProvider>, AppError> {
    state.identity.as_ref().ok_or_else(|| {
        AppError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "unavailable",
            "Account management is not configured",
        )
    })
}

async fn handle_signup(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(credentials) = body?;
    credentials.require()?;
    let identity = identity_provider(&state)?;

    let created = match identity.sign_up(&credentials.email, &credentials.password).await {
        Ok(created) => created,
        Err(AuthError::Provider { .. }) => return Err(bad_request("Sign-up failed")),
        Err(e) => return Err(internal("sign-up failed", e)),
    };

    state
        .users
        .create_user(&created.user_id, &credentials.email, &created.metadata)
        .await
        .map_err(|e| internal("failed to store user profile", e))?;

    Ok(Json(json!({ "message": "User created and stored successfully" })))
}

async fn handle_login(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(credentials) = body?;
    credentials.require()?;
    let identity = identity_provider(&state)?;

    match identity.login(&credentials.email, &credentials.password).await {
        Ok(tokens) => Ok(Json(tokens)),
        Err(AuthError::Provider { .. }) => Err(bad_request("Login failed")),
        Err(e) => Err(internal("login failed", e)),
    }
}

// ============ POST /api/select-character ============

#[derive(Deserialize)]
struct SelectCharacterRequest {
    #[serde(default)]
    character: String,
}

async fn handle_select_character(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    body: Result<Json<SelectCharacterRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(request) = body?;
    let persona: Persona = request
        .character
        .parse()
        .map_err(|_| bad_request("Invalid character selection"))?;

    state
        .users
        .choose_character(&claims.sub, persona)
        .await
        .map_err(|e| internal("failed to store character", e))?;

    Ok(Json(json!({ "message": "Character selected successfully" })))
}

// ============ GET /api/user-info ============

#[derive(Serialize)]
struct UserInfoResponse {
    selected_character: Persona,
}

async fn handle_user_info(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<UserInfoResponse>, AppError> {
    let profile = state
        .users
        .get_user(&claims.sub)
        .await
        .map_err(|e| internal("failed to load user", e))?
        .ok_or_else(|| not_found("User not found"))?;

    Ok(Json(UserInfoResponse {
        selected_character: profile.selected_character.unwrap_or_default(),
    }))
}

// ============ POST /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(request) = body?;
    if request.message.trim().is_empty() {
        return Err(bad_request("Message content is required"));
    }
    let user_id = claims.sub;

    let mut history = state
        .history
        .get_history(&user_id)
        .await
        .map_err(|e| internal("failed to load chat history", e))?;

    let answer = state
        .conversation
        .handle_message(&request.message, &history)
        .await
        .map_err(|e| internal("chat pipeline failed", e))?;

    record_exchange(&mut history, &request.message, &answer);
    state
        .history
        .save_history(&user_id, &history)
        .await
        .map_err(|e| internal("failed to save chat history", e))?;

    Ok(Json(ChatResponse { response: answer }))
}
