//! Identity session boundary.
//!
//! Sign-up and sign-in live in the external identity provider; this crate only
//! needs to ask whether a session exists, read its token, and sign out.

use std::sync::{PoisonError, RwLock};

use time::OffsetDateTime;

/// Authenticated user session issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user: String,
    id_token: String,
    expires_at: Option<OffsetDateTime>,
}

impl Session {
    pub fn new(user: impl Into<String>, id_token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            id_token: id_token.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: OffsetDateTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn id_token(&self) -> &str {
        &self.id_token
    }

    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Source of the current session.
pub trait SessionProvider: Send + Sync {
    /// The active, unexpired session, if any.
    fn current_session(&self) -> Option<Session>;

    fn sign_out(&self);
}

/// Session holder for tests, the CLI, and token-based environments.
#[derive(Debug, Default)]
pub struct InMemorySessionProvider {
    session: RwLock<Option<Session>>,
}

impl InMemorySessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(session: Session) -> Self {
        Self {
            session: RwLock::new(Some(session)),
        }
    }

    pub fn sign_in(&self, session: Session) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }
}

impl SessionProvider for InMemorySessionProvider {
    fn current_session(&self) -> Option<Session> {
        let guard = self.session.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|session| !session.is_expired_at(OffsetDateTime::now_utc()))
            .cloned()
    }

    fn sign_out(&self) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
