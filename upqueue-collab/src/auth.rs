use chrono::{Duration, Utc};
use log::{info, warn};
use std::sync::Arc;
use thiserror::Error;

use crate::{
    util::random_string, Database, DatabaseError, NewSession, NewUser, SessionData, UserData,
};

/// Turns identities asserted by a sign-in provider into upqueue sessions.
pub struct Auth {
    db: Arc<dyn Database>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// The provider handed over an unusable identity
    #[error("Invalid identity")]
    InvalidIdentity,
    /// The identity has no account, and one couldn't be created
    #[error("No account exists for this identity")]
    IdentityNotFound,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
}

/// An identity as asserted by the sign-in provider
#[derive(Debug)]
pub struct SignIn {
    pub handle: String,
    pub provider: Option<String>,
}

impl Auth {
    const SESSION_DURATION_IN_DAYS: usize = 7;
    const TOKEN_LENGTH: usize = 32;

    pub fn new(db: &Arc<dyn Database>) -> Self {
        Self { db: db.clone() }
    }

    /// Signs in a user, creating their account on first sign-in, and returns a new session
    pub async fn sign_in(&self, sign_in: SignIn) -> Result<SessionData, AuthError> {
        self.clear_expired().await;

        let handle = sign_in.handle.trim().to_string();
        if handle.is_empty() {
            return Err(AuthError::InvalidIdentity);
        }

        let user = self.ensure_user(handle, sign_in.provider).await?;
        let expires_at = Utc::now() + Duration::days(Self::SESSION_DURATION_IN_DAYS as i64);

        let new_session = NewSession {
            token: random_string(Self::TOKEN_LENGTH),
            user_id: user.id,
            expires_at,
        };

        let session = self
            .db
            .create_session(new_session)
            .await
            .map_err(AuthError::Db)?;

        info!("User {} signed in", session.user.handle);

        Ok(session)
    }

    /// Deletes the associated session, if it exists
    pub async fn sign_out(&self, token: &str) -> Result<(), DatabaseError> {
        self.db.delete_session_by_token(token).await
    }

    /// Returns a session if it exists and hasn't expired
    pub async fn session(&self, token: &str) -> Result<SessionData, DatabaseError> {
        let session = self.db.session_by_token(token).await?;

        if session.expires_at <= Utc::now() {
            return Err(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            });
        }

        Ok(session)
    }

    /// Creation is best-effort, the account usually exists already
    async fn ensure_user(
        &self,
        handle: String,
        provider: Option<String>,
    ) -> Result<UserData, AuthError> {
        let created = self
            .db
            .create_user(NewUser {
                handle: handle.clone(),
                provider,
            })
            .await;

        match created {
            Ok(user) => {
                info!("Created account for {}", user.handle);
                return Ok(user);
            }
            Err(DatabaseError::Conflict { .. }) => {}
            Err(err) => warn!("Failed to create account for {}: {}", handle, err),
        }

        self.db.user_by_handle(&handle).await.map_err(|e| match e {
            DatabaseError::NotFound { .. } => AuthError::IdentityNotFound,
            err => AuthError::Db(err),
        })
    }

    async fn clear_expired(&self) {
        if let Err(err) = self.db.clear_expired_sessions().await {
            warn!("Failed to clear expired sessions: {}", err);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::MemoryDatabase;

    fn auth() -> Auth {
        let db: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
        Auth::new(&db)
    }

    fn sign_in(handle: &str) -> SignIn {
        SignIn {
            handle: handle.to_string(),
            provider: Some("google".to_string()),
        }
    }

    #[tokio::test]
    async fn test_first_sign_in_creates_account() {
        let auth = auth();
        let session = auth.sign_in(sign_in("alice@example.com")).await.unwrap();

        assert_eq!(session.token.len(), 32);
        assert_eq!(session.user.handle, "alice@example.com");
        assert_eq!(session.user.provider.as_deref(), Some("google"));

        let found = auth.session(&session.token).await.unwrap();
        assert_eq!(found.user.id, session.user.id);
    }

    #[tokio::test]
    async fn test_repeated_sign_in_reuses_account() {
        let auth = auth();
        let first = auth.sign_in(sign_in("alice@example.com")).await.unwrap();
        let second = auth.sign_in(sign_in("alice@example.com")).await.unwrap();

        assert_eq!(first.user.id, second.user.id);
        assert_ne!(first.token, second.token);
    }

    #[tokio::test]
    async fn test_blank_handle_is_invalid() {
        let result = auth().sign_in(sign_in("   ")).await;

        assert!(matches!(result, Err(AuthError::InvalidIdentity)));
    }

    #[tokio::test]
    async fn test_sign_out_ends_session() {
        let auth = auth();
        let session = auth.sign_in(sign_in("bob")).await.unwrap();

        auth.sign_out(&session.token).await.unwrap();

        assert!(matches!(
            auth.session(&session.token).await,
            Err(DatabaseError::NotFound { .. })
        ));
    }
}
