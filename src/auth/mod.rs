//! Email/password authentication for the console.
//!
//! [`FirebaseAuth`] talks to the Identity Toolkit REST API with the project's
//! web API key and publishes the resulting [`Session`] through a
//! [`SessionObserver`]. Failures carry their cause for logging, while
//! [`AuthError::user_message`] gives the fixed text a login form shows.

pub mod models;
pub mod session;


use crate::auth::models::{
    RefreshTokenResponse, SendOobCodeRequest, SendOobCodeResponse, Session,
    SignInWithPasswordRequest, SignInWithPasswordResponse,
};
use crate::auth::session::{SessionObserver, SessionSubscription};
use crate::core::{client_builder, parse_error_response};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

pub const IDENTITY_TOOLKIT_V1_API: &str = "https://identitytoolkit.googleapis.com/v1";
pub const SECURE_TOKEN_V1_API: &str = "https://securetoken.googleapis.com/v1/token";

// Tokens this close to expiry are renewed before use.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

const SIGN_IN_FAILED_MESSAGE: &str = "Invalid email or password. Please try again.";
const RESET_FAILED_MESSAGE: &str = "Failed to send reset email. Please ensure the email is correct.";
const MISSING_EMAIL_MESSAGE: &str = "Please enter your email first.";
const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please sign in again.";

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Sign-in failed: {0}")]
    SignInFailed(String),
    #[error("Password reset failed: {0}")]
    ResetFailed(String),
    #[error("An email address is required")]
    MissingEmail,
    #[error("No user is signed in")]
    NotSignedIn,
    #[error("Session expired: {0}")]
    SessionExpired(String),
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),
}

impl AuthError {
    /// The generic message shown to the person at the login form. Never includes the cause.
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::MissingEmail => MISSING_EMAIL_MESSAGE,
            AuthError::ResetFailed(_) => RESET_FAILED_MESSAGE,
            AuthError::NotSignedIn | AuthError::SessionExpired(_) => SESSION_EXPIRED_MESSAGE,
            _ => SIGN_IN_FAILED_MESSAGE,
        }
    }
}

/// The identity service as seen by the console.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Calls `callback` with the current user (or `None`) now and on every change.
    fn observe_session(
        &self,
        callback: Box<dyn FnMut(Option<Session>) + Send + 'static>,
    ) -> SessionSubscription;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Identity Toolkit client holding the console's session.
#[derive(Clone)]
pub struct FirebaseAuth {
    client: ClientWithMiddleware,
    api_key: String,
    base_url: String,
    token_url: String,
    session: SessionObserver,
    refresh_lock: Arc<Mutex<()>>,
}

impl FirebaseAuth {
    /// Creates a client against the production endpoints.
    pub fn new(api_key: impl Into<String>, max_retries: u32) -> Self {
        Self::new_with_url(
            api_key,
            IDENTITY_TOOLKIT_V1_API.to_string(),
            SECURE_TOKEN_V1_API.to_string(),
            max_retries,
        )
    }

    /// Creates a client with custom endpoints (useful for emulators and testing).
    pub fn new_with_url(
        api_key: impl Into<String>,
        base_url: String,
        token_url: String,
        max_retries: u32,
    ) -> Self {
        let client = client_builder(max_retries).build();
        Self::new_with_client(client, api_key, base_url, token_url)
    }

    pub(crate) fn new_with_client(
        client: ClientWithMiddleware,
        api_key: impl Into<String>,
        base_url: String,
        token_url: String,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url,
            token_url,
            session: SessionObserver::new(),
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The observer shared by every clone of this client.
    pub fn session(&self) -> &SessionObserver {
        &self.session
    }

    pub fn current_session(&self) -> Option<Session> {
        self.session.current()
    }

    fn endpoint(&self, base: &str, method: &str) -> Result<Url, AuthError> {
        let mut url = Url::parse(&format!("{}{}", base, method))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    async fn request_sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let url = self.endpoint(&self.base_url, "/accounts:signInWithPassword")?;
        let request = SignInWithPasswordRequest {
            email,
            password,
            return_secure_token: true,
        };

        let response = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&request)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::ApiError(
                parse_error_response(response, "Sign in failed").await,
            ));
        }

        let result: SignInWithPasswordResponse = response.json().await?;
        Ok(result.into_session(Utc::now()))
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let url = self.endpoint(&self.base_url, "/accounts:sendOobCode")?;
        let request = SendOobCodeRequest {
            request_type: "PASSWORD_RESET",
            email,
        };

        let response = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&request)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::ApiError(
                parse_error_response(response, "Send password reset failed").await,
            ));
        }

        let _: SendOobCodeResponse = response.json().await?;
        Ok(())
    }

    /// Signs in and makes the new session current.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        match self.request_sign_in(email, password).await {
            Ok(session) => {
                tracing::info!(uid = %session.uid, "signed in");
                self.session.replace(Some(session.clone()));
                Ok(session)
            }
            Err(e) => {
                tracing::warn!("Sign in failed: {}", e);
                Err(AuthError::SignInFailed(e.to_string()))
            }
        }
    }

    /// Sends a password reset email. A blank address is rejected without contacting the service.
    pub async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AuthError::MissingEmail);
        }

        match self.request_password_reset(email).await {
            Ok(()) => {
                tracing::info!("password reset email requested");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Send password reset failed: {}", e);
                Err(AuthError::ResetFailed(e.to_string()))
            }
        }
    }

    /// Clears the current session. Signing out while signed out is a no-op.
    pub fn sign_out(&self) {
        if self.session.current().is_some() {
            tracing::info!("signed out");
            self.session.replace(None);
        }
    }

    /// The current ID token, renewed first if it is expired or about to be.
    ///
    /// Returns `None` when nobody is signed in. Concurrent callers share a
    /// single renewal.
    pub async fn fresh_id_token(&self) -> Result<Option<String>, AuthError> {
        let margin = Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);
        let needs_refresh = |session: &Session| session.is_expired(Utc::now() + margin);

        match self.session.current() {
            None => return Ok(None),
            Some(session) if !needs_refresh(&session) => return Ok(Some(session.id_token)),
            Some(_) => {}
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have renewed it while this one waited.
        match self.session.current() {
            None => Ok(None),
            Some(session) if !needs_refresh(&session) => Ok(Some(session.id_token)),
            Some(_) => {
                tracing::debug!("ID token expired, refreshing");
                Ok(Some(self.refresh_session().await?.id_token))
            }
        }
    }

    /// Exchanges the refresh token for a fresh ID token.
    ///
    /// If the service rejects the refresh token the session is cleared, since
    /// it can no longer be renewed.
    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        let current = self.session.current().ok_or(AuthError::NotSignedIn)?;
        let url = self.endpoint(&self.token_url, "")?;

        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "refresh_token")
            .append_pair("refresh_token", &current.refresh_token)
            .finish();

        let response = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            let message = parse_error_response(response, "Refresh token rejected").await;
            tracing::warn!("Refresh token rejected: {}", message);
            self.session.replace(None);
            return Err(AuthError::SessionExpired(message));
        }
        if !status.is_success() {
            return Err(AuthError::ApiError(
                parse_error_response(response, "Refresh token failed").await,
            ));
        }

        let result: RefreshTokenResponse = response.json().await?;
        let session = Session {
            uid: result.user_id,
            email: current.email,
            id_token: result.id_token,
            refresh_token: result.refresh_token,
            expires_at: models::expiry_from(Utc::now(), &result.expires_in),
        };
        self.session.replace(Some(session.clone()));
        Ok(session)
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    fn observe_session(
        &self,
        callback: Box<dyn FnMut(Option<Session>) + Send + 'static>,
    ) -> SessionSubscription {
        self.session.observe(callback)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        FirebaseAuth::sign_in_with_password(self, email, password).await
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        FirebaseAuth::send_password_reset(self, email).await
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        FirebaseAuth::sign_out(self);
        Ok(())
    }
}
