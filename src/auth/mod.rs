mod identity;
pub mod token;

pub use identity::{PasswordAuth, Session};

use async_trait::async_trait;
use tracing::debug;

use crate::model::User;
use crate::store::{RemoteStore, StoreError};

#[derive(Debug)]
pub enum AuthError {
    UsernameNotFound,
    /// The identity service refused the request; carries its message.
    Rejected(String),
    NotSignedIn,
    Transport(String),
    Decode(String),
    Store(StoreError),
}

impl AuthError {
    /// The identity service or the profile store could not be reached.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, AuthError::Transport(_) | AuthError::Store(StoreError::Transport(_)))
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::UsernameNotFound => write!(f, "Username not found."),
            AuthError::Rejected(msg) => write!(f, "{msg}"),
            AuthError::NotSignedIn => write!(f, "not signed in"),
            AuthError::Transport(e) => write!(f, "identity service unreachable: {e}"),
            AuthError::Decode(e) => write!(f, "unexpected identity response: {e}"),
            AuthError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuthError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::Store(e)
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AuthError::Decode(e.to_string())
        } else {
            AuthError::Transport(e.to_string())
        }
    }
}

/// New account details.
#[derive(Debug, Clone, Default)]
pub struct SignUp {
    pub email: String,
    pub password: String,
    pub name: String,
    pub student_id: String,
    pub phone: String,
    pub username: String,
}

/// Sign-in capability. One backend is enough; the trait is the seam tests
/// and the binary depend on.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// `identifier` is an email, or a username to resolve to one.
    async fn login(&self, identifier: &str, password: &str) -> Result<User, AuthError>;
    async fn sign_up(&self, request: &SignUp) -> Result<User, AuthError>;
    async fn logout(&self);
    async fn current_user(&self) -> Option<User>;
    /// Exchange the refresh token for a new id token.
    async fn refresh_token(&self) -> Result<String, AuthError>;
}

/// The user's profile, or a guest record when it is missing or unreadable
/// for lack of permission.
pub async fn load_profile(store: &dyn RemoteStore, user_id: &str) -> Result<User, StoreError> {
    match store.get_user(user_id).await {
        Ok(user) => Ok(user),
        Err(e) if e.is_missing_profile() => {
            debug!("no readable profile for {user_id} ({e}), using guest");
            Ok(User::guest(user_id))
        }
        Err(e) => Err(e),
    }
}
