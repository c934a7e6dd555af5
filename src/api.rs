//! HTTP API for the taskboard server

use axum::{
    Extension, Json, Router,
    extract::{
        FromRequest, FromRequestParts, Request, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use std::any::Any;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use crate::auth;
use crate::config::Config;
use crate::db::{Database, TaskInsert};
use crate::error::StoreError;
use crate::models::{
    DeletedTask, ErrorBody, LoginRequest, LoginResponse, Message, NewTask, RegisterRequest,
    STATE_TODO, StateChange, Task, TaskPatch, TaskState, User,
};

/// Application state shared across handlers
pub struct AppState {
    pub db: Database,
    pub config: Config,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Arc<Self> {
        Arc::new(Self { db, config })
    }

    /// Owner filter applied to single-task operations
    fn owner_scope(&self, session: &Session) -> Option<i64> {
        self.config
            .auth
            .enforce_ownership
            .then_some(session.user.id)
    }

    fn ensure_acting_for(&self, session: &Session, user_id: i64) -> Result<(), ApiError> {
        if self.config.auth.enforce_ownership && session.user.id != user_id {
            return Err(StoreError::Forbidden("Accesso negato".to_string()).into());
        }
        Ok(())
    }
}

/// The authenticated caller, attached to the request by [`auth_middleware`]
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub token: String,
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/api/logout", post(logout))
        .route("/api/tasks", post(create_task))
        .route("/api/tasks/user", get(missing_user_id))
        .route("/api/tasks/user/{user_id}", get(list_user_tasks))
        .route(
            "/api/tasks/{task_id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/api/tasks/{task_id}/state", put(change_task_state))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/api/states", get(list_states))
        .merge(protected)
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(fallback)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint (no auth required)
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "taskboard",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn fallback() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: "Endpoint non trovato".to_string(),
            code: Some("NOT_FOUND".to_string()),
        }),
    )
}

async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorBody {
            error: "Metodo non consentito".to_string(),
            code: Some("METHOD_NOT_ALLOWED".to_string()),
        }),
    )
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };

    ApiError(StoreError::Internal(format!("handler panicked: {detail}"))).into_response()
}

/// Auth middleware - resolves the Bearer token to a live session
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(auth::bearer_token)
        .map(str::to_owned)
        .ok_or_else(|| StoreError::Unauthorized("Token di sessione mancante".to_string()))?;

    let user = state
        .db
        .session_user(&token)?
        .ok_or_else(|| StoreError::Unauthorized("Sessione non valida o scaduta".to_string()))?;

    request.extensions_mut().insert(Session { user, token });

    Ok(next.run(request).await)
}

/// Trimmed, non-empty value of an optional text field
fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

async fn run_blocking<T, F>(job: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| StoreError::Internal(format!("blocking task failed: {e}")).into())
}

// Authentication

async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let (Some(email), Some(password)) = (
        present(body.email.as_deref()),
        body.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(StoreError::validation("Email e password sono obbligatori").into());
    };
    let email = email.to_lowercase();

    let password_hash = run_blocking(move || auth::hash_password(&password)).await??;

    let user_id = state.db.create_user(
        &email,
        &password_hash,
        present(body.nome.as_deref()).unwrap_or_default(),
        present(body.cognome.as_deref()).unwrap_or_default(),
    )?;

    tracing::info!(user_id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(Message {
            message: "Utente registrato con successo".to_string(),
        }),
    ))
}

async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let (Some(email), Some(password)) = (
        present(body.email.as_deref()),
        body.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(StoreError::validation("Email e password sono obbligatori").into());
    };

    // Same answer for unknown email and wrong password
    let invalid = || ApiError(StoreError::Unauthorized("Credenziali non valide".to_string()));

    let Some((user, password_hash)) = state.db.find_user_by_email(&email.to_lowercase())? else {
        tracing::info!("Login rejected");
        return Err(invalid());
    };

    if !run_blocking(move || auth::verify_password(&password, &password_hash)).await? {
        tracing::info!(user_id = user.id, "Login rejected");
        return Err(invalid());
    }

    let purged = state.db.purge_expired_sessions()?;
    if purged > 0 {
        tracing::debug!(purged, "Expired sessions removed");
    }

    let token = auth::generate_token();
    state
        .db
        .create_session(user.id, &token, state.config.auth.session_ttl())?;

    tracing::info!(user_id = user.id, "User logged in");

    Ok(Json(LoginResponse { user, token }))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<Message>, ApiError> {
    state.db.delete_session(&session.token)?;
    tracing::info!(user_id = session.user.id, "User logged out");

    Ok(Json(Message {
        message: "Logout effettuato".to_string(),
    }))
}

// States

async fn list_states(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TaskState>>, ApiError> {
    Ok(Json(state.db.list_states()?))
}

// Tasks

async fn missing_user_id() -> ApiError {
    StoreError::validation("userId mancante").into()
}

async fn list_user_tasks(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    AppPath(user_id): AppPath<i64>,
) -> Result<Json<Vec<Task>>, ApiError> {
    state.ensure_acting_for(&session, user_id)?;

    let tasks = state.db.list_tasks(user_id)?;
    tracing::debug!(user_id, count = tasks.len(), "Tasks listed");

    Ok(Json(tasks))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    AppPath(task_id): AppPath<i64>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(
        state.db.get_task(task_id, state.owner_scope(&session))?,
    ))
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    AppJson(body): AppJson<NewTask>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let nome_task = present(body.nome_task.as_deref());

    let mut missing = Vec::new();
    if nome_task.is_none() {
        missing.push("nome_task");
    }
    if body.data_fine.is_none() {
        missing.push("data_fine");
    }
    let (Some(nome_task), Some(data_fine)) = (nome_task, body.data_fine) else {
        return Err(StoreError::validation(format!(
            "Campi obbligatori mancanti: {}",
            missing.join(", ")
        ))
        .into());
    };

    let user_id = body.user_id.unwrap_or(session.user.id);
    if user_id != session.user.id && !state.db.has_user(user_id)? {
        return Err(StoreError::validation(format!("Utente {user_id} inesistente")).into());
    }
    state.ensure_acting_for(&session, user_id)?;

    let task = state.db.create_task(&TaskInsert {
        user_id,
        state_id: body.state_id.unwrap_or(STATE_TODO),
        nome_task,
        descrizione: body.descrizione.as_deref().unwrap_or_default(),
        data_fine,
    })?;

    tracing::info!(task_id = task.id, user_id, "Task created");

    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    AppPath(task_id): AppPath<i64>,
    AppJson(mut patch): AppJson<TaskPatch>,
) -> Result<Json<Task>, ApiError> {
    if let Some(name) = patch.nome_task.take() {
        let Some(name) = present(Some(name.as_str())) else {
            return Err(StoreError::validation("nome_task non può essere vuoto").into());
        };
        patch.nome_task = Some(name.to_string());
    }

    let task = state
        .db
        .update_task(task_id, state.owner_scope(&session), &patch)?;
    tracing::info!(task_id, "Task updated");

    Ok(Json(task))
}

async fn change_task_state(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    AppPath(task_id): AppPath<i64>,
    AppJson(body): AppJson<StateChange>,
) -> Result<Json<Task>, ApiError> {
    let state_id = body
        .state_id
        .ok_or_else(|| StoreError::validation("stateID obbligatorio"))?;

    let task = state
        .db
        .change_state(task_id, state.owner_scope(&session), state_id)?;
    tracing::info!(task_id, state_id, "Task state changed");

    Ok(Json(task))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    AppPath(task_id): AppPath<i64>,
) -> Result<Json<DeletedTask>, ApiError> {
    state
        .db
        .delete_task(task_id, state.owner_scope(&session))?;
    tracing::info!(task_id, "Task deleted");

    Ok(Json(DeletedTask {
        message: "Task eliminato con successo".to_string(),
        id: task_id,
    }))
}

/// JSON body extractor whose rejections use the API error format
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

/// Path extractor whose rejections use the API error format
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct AppPath<T>(pub T);

/// API error type
#[derive(Debug)]
pub struct ApiError(StoreError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            StoreError::Validation(_) => StatusCode::BAD_REQUEST,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Conflict(_) => StatusCode::CONFLICT,
            StoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            StoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            StoreError::Database(_) | StoreError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = if status.is_server_error() {
            tracing::error!(error = %self.0, "API error");
            "Errore interno del server".to_string()
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "Request rejected");
            self.0.to_string()
        };

        (
            status,
            Json(ErrorBody {
                error,
                code: Some(self.0.code().to_string()),
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        Self(err.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(StoreError::validation(format!(
            "Corpo della richiesta non valido: {}",
            rejection.body_text()
        )))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(StoreError::validation(format!(
            "Parametro non valido: {}",
            rejection.body_text()
        )))
    }
}
