use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A signed-in console user.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub uid: String,
    pub email: Option<String>,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Returns `true` once the ID token is past its expiry time.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// Tokens stay out of log output.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInWithPasswordRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInWithPasswordResponse {
    pub local_id: String,
    pub email: Option<String>,
    pub id_token: String,
    pub refresh_token: String,
    /// Seconds until `id_token` expires, sent as a decimal string.
    pub expires_in: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOobCodeRequest<'a> {
    pub request_type: &'static str,
    pub email: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct SendOobCodeResponse {
    pub email: Option<String>,
}

/// Response of the secure token endpoint, which uses snake_case keys.
#[derive(Debug, Deserialize)]
pub struct RefreshTokenResponse {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: String,
    pub user_id: String,
}

const MAX_TOKEN_LIFETIME_SECS: i64 = 7 * 24 * 60 * 60;

pub(crate) fn expiry_from(now: DateTime<Utc>, expires_in: &str) -> DateTime<Utc> {
    // An unparsable lifetime counts as already expired so the caller refreshes.
    let seconds = expires_in.trim().parse::<i64>().unwrap_or(0).clamp(0, MAX_TOKEN_LIFETIME_SECS);
    now + Duration::seconds(seconds)
}

impl SignInWithPasswordResponse {
    pub(crate) fn into_session(self, now: DateTime<Utc>) -> Session {
        Session {
            expires_at: expiry_from(now, &self.expires_in),
            uid: self.local_id,
            email: self.email,
            id_token: self.id_token,
            refresh_token: self.refresh_token,
        }
    }
}
