//! Session store: owns the bearer token and decides when a session ends.
//!
//! This is the only place a 401/403 is turned into a logout. Callers see
//! [`ClientError::SessionExpired`] and never need to inspect message text.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

use super::storage::TokenStorage;
use super::transport::{ApiRequest, Outcome, Transport};
use crate::core::registration::Registration;
use crate::error::{ClientError, ClientResult};

const DEFAULT_LOGIN_FAILURE: &str = "invalid credentials";
const DEFAULT_REGISTER_FAILURE: &str = "registration failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated,
}

/// Successful result of an authorized request.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Payload(Value),
    /// 204 or an empty 2xx body. Distinct from "nothing fetched yet".
    Empty,
}

impl ApiResponse {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn into_payload<T: DeserializeOwned>(self) -> ClientResult<T> {
        match self {
            Self::Payload(value) => serde_json::from_value(value)
                .map_err(|e| ClientError::Transport(format!("malformed response: {}", e))),
            Self::Empty => Err(ClientError::Transport(
                "expected a response body, got none".into(),
            )),
        }
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    storage: Arc<dyn TokenStorage>,
    token: Mutex<Option<String>>,
    state: watch::Sender<SessionState>,
}

/// Cheap to clone; all clones share one session.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    /// Creates an anonymous session without touching storage.
    pub fn new(transport: Arc<dyn Transport>, storage: Arc<dyn TokenStorage>) -> Self {
        Self::with_token(transport, storage, None)
    }

    /// Creates a session hydrated from durable storage.
    ///
    /// An unreadable store starts the session anonymous.
    pub async fn open(transport: Arc<dyn Transport>, storage: Arc<dyn TokenStorage>) -> Self {
        let token = match storage.load().await {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                log::warn!("Could not restore session: {}", e);
                None
            }
        };
        if token.is_some() {
            log::info!("Restored session from storage");
        }
        Self::with_token(transport, storage, token)
    }

    fn with_token(
        transport: Arc<dyn Transport>,
        storage: Arc<dyn TokenStorage>,
        token: Option<String>,
    ) -> Self {
        let state = watch::Sender::new(state_for(&token));
        Self {
            inner: Arc::new(Inner {
                transport,
                storage,
                token: Mutex::new(token),
                state,
            }),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.inner
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == SessionState::Authenticated
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Observe state transitions, e.g. to redirect to a login screen.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    fn set_token(&self, token: Option<String>) {
        let state = state_for(&token);
        *self
            .inner
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = token;
        self.inner.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    /// Exchanges credentials for a token.
    ///
    /// The token is durable before this returns. A failure leaves both the
    /// session and storage untouched.
    pub async fn login(&self, identifier: &str, password: &str) -> ClientResult<String> {
        let request = ApiRequest::new(Method::POST, "/auth/login").body(json!({
            "username": identifier,
            "password": password,
        }));

        let token = match self.inner.transport.send(request).await? {
            Outcome::Payload(body) => body
                .get("token")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    ClientError::Authentication("token missing from response".into())
                })?,
            Outcome::Empty => {
                return Err(ClientError::Authentication(
                    "token missing from response".into(),
                ));
            }
            Outcome::Failure { status, message, .. } => {
                log::info!("Login refused ({})", status);
                return Err(ClientError::Authentication(
                    message.unwrap_or_else(|| DEFAULT_LOGIN_FAILURE.to_string()),
                ));
            }
        };

        self.inner.storage.save(&token).await?;
        self.set_token(Some(token.clone()));
        log::info!("Logged in as {}", identifier);
        Ok(token)
    }

    /// Creates an account. Does not log in.
    pub async fn register(&self, registration: &Registration, confirmation: &str) -> ClientResult<()> {
        registration.validate(confirmation)?;

        let body = serde_json::to_value(registration)
            .map_err(|e| ClientError::Validation(e.to_string()))?;
        let request = ApiRequest::new(Method::POST, "/auth/register").body(body);

        match self.inner.transport.send(request).await? {
            Outcome::Payload(_) | Outcome::Empty => {
                log::info!("Registered {}", registration.user_name);
                Ok(())
            }
            Outcome::Failure { status, message, .. } => Err(ClientError::Api {
                status,
                message: message.unwrap_or_else(|| DEFAULT_REGISTER_FAILURE.to_string()),
            }),
        }
    }

    /// Ends the session. Idempotent and never fails.
    pub async fn logout(&self) {
        let was_authenticated = self.is_authenticated();
        self.set_token(None);
        if let Err(e) = self.inner.storage.clear().await {
            log::warn!("Failed to clear stored token: {}", e);
        }
        if was_authenticated {
            log::info!("Logged out");
        }
    }

    /// Sends `request` with the bearer token and classifies the result.
    ///
    /// 401 and 403 end the session before the error is returned.
    pub async fn authorized_request(&self, request: ApiRequest) -> ClientResult<ApiResponse> {
        let Some(token) = self.token() else {
            self.logout().await;
            return Err(ClientError::NotAuthenticated);
        };

        let method = request.method.clone();
        let path = request.path.clone();

        match self.inner.transport.send(request.bearer(token)).await? {
            Outcome::Payload(value) => Ok(ApiResponse::Payload(value)),
            Outcome::Empty => Ok(ApiResponse::Empty),
            Outcome::Failure { status, .. } if status == 401 || status == 403 => {
                log::warn!("{} {} rejected with {}, ending session", method, path, status);
                self.logout().await;
                Err(ClientError::SessionExpired { status })
            }
            Outcome::Failure {
                status,
                reason,
                message,
            } => {
                log::warn!("{} {} failed with {}", method, path, status);
                Err(ClientError::Api {
                    status,
                    message: message.unwrap_or_else(|| Outcome::status_line(status, &reason)),
                })
            }
        }
    }
}

fn state_for(token: &Option<String>) -> SessionState {
    if token.is_some() {
        SessionState::Authenticated
    } else {
        SessionState::Anonymous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::storage::MemoryStorage;
    use crate::sync::testing::{FailingStorage, RecordingStorage, StubTransport};
    use chrono::NaiveDate;

    fn fixture(storage: RecordingStorage) -> (Arc<StubTransport>, Arc<RecordingStorage>, SessionStore) {
        let transport = Arc::new(StubTransport::new());
        let storage = Arc::new(storage);
        let session = SessionStore::new(transport.clone(), storage.clone());
        (transport, storage, session)
    }

    async fn authenticated(token: &str) -> (Arc<StubTransport>, Arc<RecordingStorage>, SessionStore) {
        let transport = Arc::new(StubTransport::new());
        let storage = Arc::new(RecordingStorage::with_token(token));
        let session = SessionStore::open(transport.clone(), storage.clone()).await;
        (transport, storage, session)
    }

    #[tokio::test]
    async fn login_stores_token_in_memory_and_storage() {
        let (transport, storage, session) = fixture(RecordingStorage::default());
        transport.ok(json!({ "token": "abc" }));

        let token = session.login("u", "p").await.unwrap();

        assert_eq!(token, "abc");
        assert_eq!(session.token().as_deref(), Some("abc"));
        assert_eq!(session.state(), SessionState::Authenticated);
        assert_eq!(storage.stored().as_deref(), Some("abc"));

        let sent = transport.last_request().unwrap();
        assert_eq!(sent.method, Method::POST);
        assert_eq!(sent.path, "/auth/login");
        assert_eq!(sent.body, Some(json!({ "username": "u", "password": "p" })));
        assert_eq!(sent.bearer, None);
    }

    #[tokio::test]
    async fn failed_login_stays_anonymous_and_leaves_storage_alone() {
        let (transport, storage, session) = fixture(RecordingStorage::default());
        transport.fail(400, Some("Wrong password"));

        let err = session.login("u", "bad").await.unwrap_err();

        assert_eq!(err, ClientError::Authentication("Wrong password".into()));
        assert_eq!(session.state(), SessionState::Anonymous);
        assert!(storage.ops().is_empty());
    }

    #[tokio::test]
    async fn failed_login_without_message_uses_default() {
        let (transport, _storage, session) = fixture(RecordingStorage::default());
        transport.fail(401, None);

        let err = session.login("u", "bad").await.unwrap_err();
        assert_eq!(err, ClientError::Authentication("invalid credentials".into()));
    }

    #[tokio::test]
    async fn login_without_token_field_is_rejected() {
        let (transport, storage, session) = fixture(RecordingStorage::default());
        transport.ok(json!({ "user": "u" }));

        assert!(matches!(
            session.login("u", "p").await,
            Err(ClientError::Authentication(_))
        ));
        assert!(!session.is_authenticated());
        assert!(storage.ops().is_empty());
    }

    #[tokio::test]
    async fn login_with_unwritable_storage_stays_anonymous() {
        let transport = Arc::new(StubTransport::new());
        let session = SessionStore::new(transport.clone(), Arc::new(FailingStorage));
        let mut rx = session.subscribe();
        transport.ok(json!({ "token": "abc" }));

        let err = session.login("u", "p").await.unwrap_err();

        assert_eq!(err, ClientError::Storage("disk is read-only".into()));
        assert_eq!(session.state(), SessionState::Anonymous);
        assert_eq!(session.token(), None);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn open_hydrates_from_storage() {
        let storage: Arc<dyn TokenStorage> = Arc::new(MemoryStorage::with_token("persisted"));
        let session = SessionStore::open(Arc::new(StubTransport::new()), storage).await;
        assert!(session.is_authenticated());
        assert_eq!(session.token().as_deref(), Some("persisted"));
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let (_transport, storage, session) = authenticated("t").await;
        session.logout().await;
        session.logout().await;
        assert_eq!(session.state(), SessionState::Anonymous);
        assert_eq!(storage.stored(), None);
        assert_eq!(storage.ops(), vec!["clear", "clear"]);
    }

    #[tokio::test]
    async fn authorized_request_without_token_never_hits_network() {
        let (transport, storage, session) = fixture(RecordingStorage::default());

        let err = session
            .authorized_request(ApiRequest::new(Method::GET, "/lists"))
            .await
            .unwrap_err();

        assert_eq!(err, ClientError::NotAuthenticated);
        assert_eq!(transport.request_count(), 0);
        // Defensive clear.
        assert_eq!(storage.ops(), vec!["clear"]);
    }

    #[tokio::test]
    async fn authorized_request_injects_bearer_and_returns_payload() {
        let (transport, _storage, session) = authenticated("t1").await;
        transport.ok(json!([{ "id": "L1", "name": "x" }]));

        let resp = session
            .authorized_request(ApiRequest::new(Method::GET, "/lists"))
            .await
            .unwrap();

        assert_eq!(resp, ApiResponse::Payload(json!([{ "id": "L1", "name": "x" }])));
        assert_eq!(transport.last_request().unwrap().bearer.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn no_content_is_empty_response() {
        let (transport, _storage, session) = authenticated("t1").await;
        transport.empty();

        let resp = session
            .authorized_request(ApiRequest::new(Method::DELETE, "/lists/L1"))
            .await
            .unwrap();
        assert!(resp.is_empty());
        assert!(resp.into_payload::<Value>().is_err());
    }

    #[tokio::test]
    async fn unauthorized_and_forbidden_end_the_session() {
        for status in [401u16, 403] {
            let (transport, storage, session) = authenticated("t1").await;
            let mut states = session.subscribe();
            transport.fail(status, Some("nope"));

            let err = session
                .authorized_request(ApiRequest::new(Method::GET, "/tasks"))
                .await
                .unwrap_err();

            assert_eq!(err, ClientError::SessionExpired { status });
            assert_eq!(session.token(), None);
            assert_eq!(storage.stored(), None);
            assert_eq!(storage.ops(), vec!["clear"]);
            assert!(states.has_changed().unwrap());
            assert_eq!(*states.borrow_and_update(), SessionState::Anonymous);
        }
    }

    #[tokio::test]
    async fn other_failures_use_message_or_status_line() {
        let (transport, _storage, session) = authenticated("t1").await;
        transport.fail(404, Some("List not found"));
        transport.fail(500, None);

        let first = session
            .authorized_request(ApiRequest::new(Method::DELETE, "/lists/9"))
            .await
            .unwrap_err();
        assert_eq!(
            first,
            ClientError::Api {
                status: 404,
                message: "List not found".into()
            }
        );

        let second = session
            .authorized_request(ApiRequest::new(Method::GET, "/lists"))
            .await
            .unwrap_err();
        assert_eq!(
            second,
            ClientError::Api {
                status: 500,
                message: "500 Internal Server Error".into()
            }
        );
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn transport_errors_propagate_without_logout() {
        let (transport, _storage, session) = authenticated("t1").await;
        transport.push(Err(ClientError::Transport("connection refused".into())));

        let err = session
            .authorized_request(ApiRequest::new(Method::GET, "/lists"))
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::Transport("connection refused".into()));
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn register_validates_before_sending() {
        let (transport, _storage, session) = fixture(RecordingStorage::default());
        let form = Registration {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            user_name: "ada".into(),
            email: "ada@example.com".into(),
            birth_date: NaiveDate::from_ymd_opt(1990, 12, 10),
            password: "pw".into(),
        };

        assert!(matches!(
            session.register(&form, "different").await,
            Err(ClientError::Validation(_))
        ));
        assert_eq!(transport.request_count(), 0);

        transport.empty();
        session.register(&form, "pw").await.unwrap();
        let sent = transport.last_request().unwrap();
        assert_eq!(sent.path, "/auth/register");
        assert_eq!(sent.body.unwrap()["userName"], "ada");
        assert!(!session.is_authenticated());

        transport.fail(409, Some("Username already exists"));
        assert_eq!(
            session.register(&form, "pw").await.unwrap_err(),
            ClientError::Api {
                status: 409,
                message: "Username already exists".into()
            }
        );
    }
}
