//! reqwest-backed access to the taskboard JSON API

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;

use super::{ClientError, TaskApi};
use crate::models::{
    DeletedTask, ErrorBody, LoginRequest, LoginResponse, Message, NewTask, RegisterRequest,
    StateChange, Task, TaskPatch, TaskState, User,
};

/// HTTP client for one server. Holds the session token after [`login`].
///
/// [`login`]: HttpTaskApi::login
#[derive(Debug, Clone)]
pub struct HttpTaskApi {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTaskApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Reuse a token obtained earlier
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let token = self.token.as_deref().ok_or(ClientError::NotLoggedIn)?;
        Ok(request.bearer_auth(token))
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("Richiesta non riuscita")
                .to_string(),
        };

        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<Message, ClientError> {
        Self::send(self.http.post(self.url("/api/register")).json(request)).await
    }

    /// Log in and keep the issued session token for later calls
    pub async fn login(&mut self, email: &str, password: &str) -> Result<User, ClientError> {
        let body = LoginRequest {
            email: Some(email.to_string()),
            password: Some(password.to_string()),
        };
        let response: LoginResponse =
            Self::send(self.http.post(self.url("/api/login")).json(&body)).await?;

        tracing::debug!(user_id = response.user.id, "Logged in");
        self.token = Some(response.token);
        Ok(response.user)
    }

    /// End the session server-side. The local token is dropped either way.
    pub async fn logout(&mut self) -> Result<(), ClientError> {
        let request = self.authorized(self.http.post(self.url("/api/logout")))?;
        self.token = None;
        let _: Message = Self::send(request).await?;
        Ok(())
    }

    pub async fn get_task(&self, task_id: i64) -> Result<Task, ClientError> {
        let request = self.authorized(self.http.get(self.url(&format!("/api/tasks/{task_id}"))))?;
        Self::send(request).await
    }
}

impl TaskApi for HttpTaskApi {
    async fn list_states(&self) -> Result<Vec<TaskState>, ClientError> {
        Self::send(self.http.get(self.url("/api/states"))).await
    }

    async fn list_tasks(&self, user_id: i64) -> Result<Vec<Task>, ClientError> {
        let request =
            self.authorized(self.http.get(self.url(&format!("/api/tasks/user/{user_id}"))))?;
        Self::send(request).await
    }

    async fn create_task(&self, draft: &NewTask) -> Result<Task, ClientError> {
        let request = self.authorized(self.http.post(self.url("/api/tasks")).json(draft))?;
        Self::send(request).await
    }

    async fn update_task(&self, task_id: i64, patch: &TaskPatch) -> Result<Task, ClientError> {
        let request = self.authorized(
            self.http
                .put(self.url(&format!("/api/tasks/{task_id}")))
                .json(patch),
        )?;
        Self::send(request).await
    }

    async fn change_task_state(&self, task_id: i64, state_id: i64) -> Result<Task, ClientError> {
        let body = StateChange {
            state_id: Some(state_id),
        };
        let request = self.authorized(
            self.http
                .put(self.url(&format!("/api/tasks/{task_id}/state")))
                .json(&body),
        )?;
        Self::send(request).await
    }

    async fn delete_task(&self, task_id: i64) -> Result<DeletedTask, ClientError> {
        let request =
            self.authorized(self.http.delete(self.url(&format!("/api/tasks/{task_id}"))))?;
        Self::send(request).await
    }
}
