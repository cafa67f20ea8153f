//! Session-bound anti-forgery tokens for the create endpoint.
//!
//! Each wizard session gets its own random token. A create request must
//! present both the session id and the matching token; the session is
//! revoked once a record has been created from it.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Length of a generated token.
const TOKEN_LEN: usize = 32;

/// Header carrying the session id.
pub const SESSION_HEADER: &str = "X-Session-Id";
/// Header carrying the anti-forgery token.
pub const TOKEN_HEADER: &str = "X-CSRF-Token";

/// A freshly issued session, returned to the client once.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedSession {
    pub session_id: Uuid,
    pub csrf_token: String,
}

struct SessionEntry {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

/// Why a token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenRejection {
    #[error("missing session id or token")]
    Missing,
    #[error("unknown session")]
    UnknownSession,
    #[error("session expired")]
    Expired,
    #[error("token mismatch")]
    Mismatch,
}

/// In-memory store of live sessions and their tokens.
pub struct CsrfGuard {
    ttl: Duration,
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
}

impl CsrfGuard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a new session and hand back its token.
    pub async fn issue(&self) -> IssuedSession {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();
        let session_id = Uuid::new_v4();
        let now = Utc::now();
        let expires_at = now
            + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::hours(1));

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.expires_at > now);
        if sessions.len() < before {
            debug!(pruned = before - sessions.len(), "Pruned expired sessions");
        }
        sessions.insert(
            session_id,
            SessionEntry {
                token: SecretString::from(token.clone()),
                expires_at,
            },
        );

        info!(session_id = %session_id, "Onboarding session issued");
        IssuedSession {
            session_id,
            csrf_token: token,
        }
    }

    /// Check a presented token against the session it claims.
    pub async fn verify(
        &self,
        session_id: Option<&str>,
        token: Option<&str>,
    ) -> Result<Uuid, TokenRejection> {
        let (Some(session_id), Some(token)) = (session_id, token) else {
            return Err(TokenRejection::Missing);
        };
        let session_id = Uuid::parse_str(session_id).map_err(|_| TokenRejection::UnknownSession)?;

        let sessions = self.sessions.read().await;
        let entry = sessions
            .get(&session_id)
            .ok_or(TokenRejection::UnknownSession)?;
        if entry.expires_at <= Utc::now() {
            return Err(TokenRejection::Expired);
        }
        let expected = entry.token.expose_secret().as_bytes();
        if bool::from(expected.ct_eq(token.as_bytes())) {
            Ok(session_id)
        } else {
            Err(TokenRejection::Mismatch)
        }
    }

    /// End a session so its token can no longer be used.
    pub async fn revoke(&self, session_id: Uuid) {
        if self.sessions.write().await.remove(&session_id).is_some() {
            debug!(session_id = %session_id, "Onboarding session revoked");
        }
    }

    /// Number of sessions currently held.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
