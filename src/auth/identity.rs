use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::cache::LocalCache;
use crate::clock::Clock;
use crate::limits::REQUEST_TIMEOUT;
use crate::model::User;
use crate::observability;
use crate::store::RemoteStore;

use super::{load_profile, token, AuthBackend, AuthError, SignUp};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    #[serde(default)]
    local_id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    id_token: String,
    #[serde(default)]
    refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct RefreshResponse {
    #[serde(default, alias = "idToken")]
    id_token: String,
    #[serde(default, alias = "refreshToken")]
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Signed-in state: the profile plus the tokens that go with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: User,
    pub id_token: String,
    pub refresh_token: String,
}

/// Email/password accounts over the identity REST API.
pub struct PasswordAuth {
    client: reqwest::Client,
    auth_url: String,
    token_url: String,
    api_key: String,
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    cache: Option<Arc<dyn LocalCache>>,
    session: RwLock<Option<Session>>,
}

impl PasswordAuth {
    pub fn new(
        auth_url: &str,
        token_url: &str,
        api_key: &str,
        store: Arc<dyn RemoteStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            auth_url: auth_url.trim_end_matches('/').to_string(),
            token_url: token_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            store,
            clock,
            cache: None,
            session: RwLock::new(None),
        })
    }

    /// Keep the signed-in profile in `cache` for offline starts.
    pub fn with_cache(mut self, cache: Arc<dyn LocalCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Resume from saved tokens. The profile is loaded with the saved id token.
    /// When the services are unreachable the cached profile for the token's
    /// account is used instead.
    pub async fn restore(&self, id_token: String, refresh_token: String) -> Result<User, AuthError> {
        let user_id = token::subject(&id_token).ok_or_else(|| AuthError::Decode("token has no subject".into()))?;
        self.store.set_token(Some(id_token.clone())).await;
        let expired = token::is_expired(&id_token, self.clock.now());
        *self.session.write().await = Some(Session {
            user: User::guest(&user_id),
            id_token,
            refresh_token,
        });

        let profile = match self.resume(&user_id, expired).await {
            Ok(profile) => {
                self.remember(&profile).await;
                profile
            }
            Err(e) => match self.cached_profile(&user_id).await {
                Some(cached) if e.is_unreachable() => {
                    warn!("resuming {user_id} from cached profile: {e}");
                    cached
                }
                _ => {
                    self.session.write().await.take();
                    self.store.set_token(None).await;
                    return Err(e);
                }
            },
        };
        if let Some(session) = self.session.write().await.as_mut() {
            session.user = profile.clone();
        }
        Ok(profile)
    }

    async fn resume(&self, user_id: &str, expired: bool) -> Result<User, AuthError> {
        if expired {
            self.refresh_token().await?;
        }
        Ok(load_profile(self.store.as_ref(), user_id).await?)
    }

    /// The profile kept by the last sign-in on this device, if any.
    pub async fn offline_user(&self) -> Option<User> {
        let cache = self.cache.as_ref()?;
        match cache.last_user().await {
            Ok(user) => user,
            Err(e) => {
                warn!("cached profile unreadable: {e}");
                None
            }
        }
    }

    async fn cached_profile(&self, user_id: &str) -> Option<User> {
        let cache = self.cache.as_ref()?;
        cache.get_user(user_id).await.ok().flatten()
    }

    async fn remember(&self, user: &User) {
        let Some(cache) = &self.cache else { return };
        if let Err(e) = cache.save_user(user).await {
            warn!("could not cache profile for {}: {e}", user.id);
            metrics::counter!(observability::CACHE_WRITE_FAILURES_TOTAL).increment(1);
        }
    }

    async fn forget(&self) {
        let Some(cache) = &self.cache else { return };
        for result in [cache.clear_users().await, cache.clear_bookings().await] {
            if let Err(e) = result {
                warn!("could not clear cache on sign-out: {e}");
                metrics::counter!(observability::CACHE_WRITE_FAILURES_TOTAL).increment(1);
            }
        }
    }

    /// A usable id token, refreshed first if the current one has expired.
    pub async fn id_token(&self) -> Result<String, AuthError> {
        let current = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.id_token.clone())
            .ok_or(AuthError::NotSignedIn)?;
        if token::is_expired(&current, self.clock.now()) {
            return self.refresh_token().await;
        }
        Ok(current)
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    async fn post_credentials(
        &self,
        endpoint: &str,
        email: &str,
        password: &str,
    ) -> Result<SignInResponse, AuthError> {
        let url = format!("{}/v1/accounts:{endpoint}?key={}", self.auth_url, self.api_key);
        let body = json!({ "email": email, "password": password, "returnSecureToken": true });
        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(rejection(endpoint, response).await);
        }
        let parsed: SignInResponse = response.json().await?;
        if parsed.id_token.trim().is_empty() {
            return Err(AuthError::Decode("response has no id token".into()));
        }
        Ok(parsed)
    }
}

async fn rejection(endpoint: &str, response: reqwest::Response) -> AuthError {
    let status = response.status();
    let message = match response.json::<ErrorEnvelope>().await {
        Ok(env) if !env.error.message.is_empty() => env.error.message,
        _ => status.to_string(),
    };
    warn!("{endpoint} rejected: {message}");
    metrics::counter!(observability::AUTH_FAILURES_TOTAL, "op" => endpoint.to_string()).increment(1);
    AuthError::Rejected(message)
}

#[async_trait]
impl AuthBackend for PasswordAuth {
    async fn login(&self, identifier: &str, password: &str) -> Result<User, AuthError> {
        let email = if identifier.contains('@') {
            identifier.to_string()
        } else {
            self.store
                .email_for_username(identifier)
                .await?
                .filter(|e| !e.is_empty())
                .ok_or(AuthError::UsernameNotFound)?
        };

        let signed_in = self
            .post_credentials("signInWithPassword", &email, password)
            .await?;
        self.store.set_token(Some(signed_in.id_token.clone())).await;

        let profile = load_profile(self.store.as_ref(), &signed_in.local_id).await?;
        let user = User {
            id: signed_in.local_id.clone(),
            email: if profile.email.is_empty() {
                signed_in.email.clone()
            } else {
                profile.email.clone()
            },
            ..profile
        };
        info!("signed in {} ({})", user.email, user.id);
        self.remember(&user).await;
        *self.session.write().await = Some(Session {
            user: user.clone(),
            id_token: signed_in.id_token,
            refresh_token: signed_in.refresh_token,
        });
        Ok(user)
    }

    async fn sign_up(&self, request: &SignUp) -> Result<User, AuthError> {
        let created = self
            .post_credentials("signUp", &request.email, &request.password)
            .await?;
        self.store.set_token(Some(created.id_token.clone())).await;

        let user = User {
            id: created.local_id.clone(),
            name: request.name.clone(),
            email: if created.email.is_empty() {
                request.email.clone()
            } else {
                created.email.clone()
            },
            student_id: request.student_id.clone(),
            phone: request.phone.clone(),
            username: request.username.clone(),
        };
        self.store.save_user(&user).await?;
        info!("created account {} ({})", user.email, user.id);
        self.remember(&user).await;
        *self.session.write().await = Some(Session {
            user: user.clone(),
            id_token: created.id_token,
            refresh_token: created.refresh_token,
        });
        Ok(user)
    }

    async fn logout(&self) {
        if let Some(session) = self.session.write().await.take() {
            info!("signed out {}", session.user.id);
        }
        self.store.set_token(None).await;
        self.forget().await;
    }

    async fn current_user(&self) -> Option<User> {
        self.session.read().await.as_ref().map(|s| s.user.clone())
    }

    async fn refresh_token(&self) -> Result<String, AuthError> {
        let refresh = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .filter(|t| !t.trim().is_empty())
            .ok_or(AuthError::NotSignedIn)?;

        let url = format!("{}/v1/token?key={}", self.token_url, self.api_key);
        let response = self
            .client
            .post(&url)
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection("token", response).await);
        }
        let refreshed: RefreshResponse = response.json().await?;
        if refreshed.id_token.trim().is_empty() {
            return Err(AuthError::Decode("refresh returned no id token".into()));
        }

        if let Some(session) = self.session.write().await.as_mut() {
            session.id_token = refreshed.id_token.clone();
            if !refreshed.refresh_token.trim().is_empty() {
                session.refresh_token = refreshed.refresh_token;
            }
        }
        self.store.set_token(Some(refreshed.id_token.clone())).await;
        info!("id token refreshed");
        Ok(refreshed.id_token)
    }
}
