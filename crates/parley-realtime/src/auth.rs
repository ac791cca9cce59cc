//! Session lookup for operations that act as the current user.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// The signed-in user.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    /// JWT of the session, when the backend issued one.
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl std::fmt::Debug for AuthUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthUser")
            .field("id", &self.id)
            .field("email", &self.email)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl AuthUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            access_token: None,
        }
    }

    /// Create a user from a Supabase Auth session.
    pub fn from_supabase_auth(id: String, email: Option<String>, access_token: String) -> Self {
        Self {
            id,
            email,
            access_token: Some(access_token),
        }
    }
}

/// Resolves the current user. Called at use time, never cached by callers.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn current_user(&self) -> Option<AuthUser>;
}

/// In-process session holder.
#[derive(Clone, Default)]
pub struct SessionAuth {
    session: Arc<RwLock<Option<AuthUser>>>,
}

impl SessionAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(user: AuthUser) -> Self {
        Self {
            session: Arc::new(RwLock::new(Some(user))),
        }
    }

    pub async fn sign_in(&self, user: AuthUser) {
        *self.session.write().await = Some(user);
    }

    pub async fn sign_out(&self) {
        *self.session.write().await = None;
    }
}

#[async_trait]
impl AuthProvider for SessionAuth {
    async fn current_user(&self) -> Option<AuthUser> {
        self.session.read().await.clone()
    }
}
