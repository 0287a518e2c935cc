use std::sync::Arc;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::{LedgerError, SessionError};
use crate::models::User;

#[derive(Debug, Default)]
struct SessionState {
    user: Option<User>,
    generation: u64,
}

/// Shared view of the signed-in account.
///
/// Stores consult it before every mutation. The generation counter moves on
/// each sign-in and sign-out so that in-flight work started under a previous
/// session can tell its result is stale.
#[derive(Debug, Clone, Default)]
pub struct SessionGate {
    inner: Arc<RwLock<SessionState>>,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user: User) {
        let mut state = self.inner.write();
        info!("🔐 Session started for {}", user.email);
        state.user = Some(user);
        state.generation += 1;
    }

    pub fn sign_out(&self) {
        let mut state = self.inner.write();
        if let Some(user) = state.user.take() {
            info!("🔓 Session ended for {}", user.email);
        }
        state.generation += 1;
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.read().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read().user.is_some()
    }

    pub fn require_user(&self) -> Result<User, LedgerError> {
        self.current_user().ok_or(LedgerError::AuthRequired)
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }
}

#[derive(Debug, Deserialize)]
struct AccessTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

/// Verifies access tokens issued by the cloud backend's auth service.
#[derive(Clone)]
pub struct SessionVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl SessionVerifier {
    pub const AUDIENCE: &'static str = "authenticated";

    pub fn new(jwt_secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[Self::AUDIENCE]);
        Self {
            key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<User, SessionError> {
        let data = decode::<AccessTokenClaims>(token, &self.key, &self.validation)
            .map_err(|e| SessionError::InvalidToken(e.to_string()))?;

        let id = Uuid::parse_str(&data.claims.sub)
            .map_err(|_| SessionError::InvalidSubject(data.claims.sub.clone()))?;

        Ok(User {
            id,
            email: data.claims.email.unwrap_or_default(),
        })
    }
}
