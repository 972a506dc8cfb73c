//! HTTP API for chat sessions and reference-data administration.
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `POST` | `/chat/{session_id}` | user | Send a turn (`"new"` creates a session) |
//! | `GET`  | `/chat/user/all` | user | Session summaries, most recent first |
//! | `GET`  | `/chat/{session_id}` | user | Messages of one session |
//! | `DELETE` | `/chat/{session_id}` | user | Delete a session |
//! | `POST` | `/register` | none | Create an account (201) |
//! | `POST` | `/login` | none | Exchange account credentials for a token |
//! | `GET`  | `/profile` | user | The caller's account |
//! | `POST` | `/admin/login` | none | Exchange admin credentials for a token |
//! | `POST` | `/admin/upload-medical-data` | admin | Ingest a PDF (raw `application/pdf` body) |
//! | `GET`  | `/health` | none | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "Session not found: 42" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `forbidden` (403),
//! `not_found` (404), `internal` (500). Failures of the AI pipeline never
//! produce an error response; they surface as the assistant's reply.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser client
//! can be served from a different origin.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::accounts::{AccountService, RegisterRequest};
use crate::auth::{self, AdminUser, AuthError, AuthUser};
use crate::chat::{ChatService, RagPipeline};
use crate::completion::HuggingFaceCompleter;
use crate::config::Config;
use crate::db;
use crate::embedding::HuggingFaceEmbedder;
use crate::error::{AccountError, ChatError};
use crate::extract::MIME_PDF;
use crate::ingest::ingest_document;
use crate::models::{ChatSession, Message, SessionSummary, TurnTarget, UserProfile};
use crate::store::sqlite::SqliteSessionStore;
use crate::store::users::{SqliteUserStore, UserStore};
use crate::store::SessionStore;
use crate::vector_store::PineconeIndex;

/// Uploaded reference PDFs can be far larger than axum's 2 MB default.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Header carrying the uploaded document's original file name.
pub const FILE_NAME_HEADER: &str = "x-file-name";

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration, including environment secrets.
    pub config: Arc<Config>,
    pub chat: Arc<ChatService>,
    pub accounts: Arc<AccountService>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn SessionStore>,
        users: Arc<dyn UserStore>,
        pipeline: RagPipeline,
    ) -> Self {
        let accounts = AccountService::new(users, config.auth.bcrypt_cost);
        Self {
            config,
            chat: Arc::new(ChatService::new(store, pipeline)),
            accounts: Arc::new(accounts),
        }
    }
}

/// Wire up the production collaborators described by `config`.
pub async fn state_from_config(config: &Config) -> anyhow::Result<AppState> {
    config.secrets.jwt_secret()?;

    let pool = db::connect(config).await?;
    crate::migrate::apply_schema(&pool).await?;
    let users: Arc<dyn UserStore> = Arc::new(SqliteUserStore::new(pool.clone()));
    let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new(pool));

    let client = crate::http::build_client(config)?;
    let pipeline = RagPipeline {
        embedder: Arc::new(HuggingFaceEmbedder::from_config(client.clone(), config)),
        index: Arc::new(PineconeIndex::from_config(client.clone(), config)?),
        completer: Arc::new(HuggingFaceCompleter::from_config(client, config)),
        top_k: config.retrieval.top_k,
    };

    Ok(AppState::new(Arc::new(config.clone()), store, users, pipeline))
}

/// Build the router with CORS and request tracing layers applied.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat/user/all", get(handle_list_sessions))
        .route(
            "/chat/{session_id}",
            post(handle_send_turn)
                .get(handle_get_messages)
                .delete(handle_delete_session),
        )
        .route("/register", post(handle_register))
        .route("/login", post(handle_login))
        .route("/profile", get(handle_profile))
        .route("/admin/login", post(handle_admin_login))
        .route(
            "/admin/upload-medical-data",
            post(handle_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = state_from_config(config).await?;
    let app = build_router(state);

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "MediCoz server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    /// A 500 whose cause is logged but not echoed to the caller.
    pub fn internal(err: anyhow::Error) -> Self {
        error!(error = %format!("{:#}", err), "internal error");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "Internal server error",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::BadRequest(msg) => AppError::bad_request(msg),
            e @ ChatError::NotFound(_) => AppError::not_found(e.to_string()),
            e @ ChatError::Forbidden(_) => AppError::forbidden(e.to_string()),
            ChatError::Storage(e) => AppError::internal(e),
        }
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::MissingFields | AccountError::EmailTaken => {
                AppError::bad_request(err.to_string())
            }
            AccountError::InvalidCredentials => AppError::unauthorized(err.to_string()),
            AccountError::UnknownUser => AppError::not_found(err.to_string()),
            AccountError::Storage(e) => AppError::internal(e),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Missing => AppError::unauthorized(err.to_string()),
            _ => AppError::forbidden(err.to_string()),
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

// ============ /chat ============

/// Body of `POST /chat/{session_id}`.
#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

const MISSING_FIELDS: &str = "Role, content and sessions are required";

async fn handle_send_turn(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
    body: Result<Json<TurnRequest>, JsonRejection>,
) -> Result<Json<ChatSession>, AppError> {
    let Json(req) = body.map_err(|e| AppError::bad_request(e.body_text()))?;
    let target = TurnTarget::from_path(&session_id)
        .ok_or_else(|| AppError::bad_request(MISSING_FIELDS))?;
    let (Some(role), Some(content)) = (req.role, req.content) else {
        return Err(AppError::bad_request(MISSING_FIELDS));
    };

    let session = state
        .chat
        .send_turn(&user.user_id, target, &role, &content)
        .await?;
    Ok(Json(session))
}

async fn handle_list_sessions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<SessionSummary>>, AppError> {
    Ok(Json(state.chat.list_sessions(&user.user_id).await?))
}

async fn handle_get_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<Message>>, AppError> {
    Ok(Json(
        state.chat.get_messages(&user.user_id, &session_id).await?,
    ))
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn handle_delete_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .chat
        .delete_session(&user.user_id, &session_id)
        .await?;
    Ok(Json(MessageResponse {
        message: "Session deleted successfully!".to_string(),
    }))
}

// ============ Accounts ============

/// Body of `POST /login` and `POST /admin/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub message: String,
    pub user: UserProfile,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub user: UserProfile,
}

async fn handle_register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AccountResponse>), AppError> {
    let Json(req) = body.map_err(|e| AppError::bad_request(e.body_text()))?;
    let user = state.accounts.register(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(AccountResponse {
            message: "User registered successfully!".to_string(),
            user,
        }),
    ))
}

async fn handle_login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(req) = body.map_err(|e| AppError::bad_request(e.body_text()))?;
    let user = state.accounts.login(&req.email, &req.password).await?;

    let secret = state.config.secrets.jwt_secret().map_err(AppError::internal)?;
    let token = auth::sign(
        secret,
        Some(&user.id),
        Some(&user.email),
        false,
        state.config.auth.user_token_ttl_secs,
    )
    .map_err(AppError::internal)?;

    Ok(Json(LoginResponse {
        message: "Login successful".to_string(),
        token,
        user,
    }))
}

async fn handle_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<AccountResponse>, AppError> {
    let user = state.accounts.profile(&user.user_id).await?;
    Ok(Json(AccountResponse {
        message: "Welcome to your profile!".to_string(),
        user,
    }))
}

// ============ /admin ============

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminLoginResponse {
    pub message: String,
    pub token: String,
    pub is_admin: bool,
}

async fn handle_admin_login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AdminLoginResponse>, AppError> {
    let Json(req) = body.map_err(|e| AppError::bad_request(e.body_text()))?;
    let secrets = &state.config.secrets;

    let matches = match (&secrets.admin_email, &secrets.admin_password) {
        (Some(email), Some(password)) => req.email == *email && req.password == *password,
        _ => false,
    };
    if !matches {
        warn!(email = %req.email, "rejected admin login");
        return Err(AppError::unauthorized("Invalid Admin Credentials"));
    }

    let secret = secrets.jwt_secret().map_err(AppError::internal)?;
    let token = auth::sign(
        secret,
        None,
        Some(&req.email),
        true,
        state.config.auth.admin_token_ttl_secs,
    )
    .map_err(AppError::internal)?;

    Ok(Json(AdminLoginResponse {
        message: "Admin Login successful".to_string(),
        token,
        is_admin: true,
    }))
}

async fn handle_upload(
    State(state): State<AppState>,
    admin: AdminUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MessageResponse>, AppError> {
    if body.is_empty() {
        return Err(AppError::bad_request("No PDF file uploaded"));
    }
    if !is_pdf_content_type(&headers) {
        return Err(AppError::bad_request("Only PDF files can be uploaded"));
    }
    let name = headers
        .get(FILE_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("upload.pdf")
        .to_string();

    info!(file = %name, bytes = body.len(), admin = ?admin.email, "admin upload");

    let pipeline = state.chat.pipeline();
    match ingest_document(
        pipeline.embedder.as_ref(),
        pipeline.index.as_ref(),
        &body,
        &name,
        state.config.ingest.min_chunk_chars,
    )
    .await
    {
        Ok(report) => Ok(Json(MessageResponse {
            message: format!(
                "Successfully uploaded and ingested {} ({} chunks)",
                report.source, report.chunks
            ),
        })),
        Err(e) => {
            error!(file = %name, error = %format!("{:#}", e), "ingestion failed");
            Err(AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                format!("Failed to process the PDF: {:#}", e),
            ))
        }
    }
}

/// An absent `Content-Type` is accepted; a present one must name PDF.
fn is_pdf_content_type(headers: &HeaderMap) -> bool {
    match headers.get(CONTENT_TYPE) {
        None => true,
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(MIME_PDF)),
    }
}
