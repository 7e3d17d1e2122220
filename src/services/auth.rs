//! Authentication: identity providers and the session context built on them.
//!
//! Two providers are available:
//! - [`SupabaseAuth`] talks to the Supabase GoTrue REST API.
//! - [`LocalIdentityProvider`] keeps accounts in memory for development,
//!   with argon2 password hashes and HS256 session tokens.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock as StdRwLock};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::{Session, User};
use crate::services::audit_client::TokenSource;

/// Result of a sign-up call.
#[derive(Debug, Clone)]
pub enum SignUp {
    /// Account created and signed in.
    Session(Session),
    /// Account created; the provider wants the email confirmed first.
    ConfirmationRequired(User),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError>;

    async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<SignUp, AppError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), AppError>;

    /// Resolve the user an access token belongs to.
    async fn get_user(&self, access_token: &str) -> Result<User, AppError>;

    /// Start password recovery. The emailed link lands on `redirect_to`
    /// carrying a recovery token. Unknown addresses are not reported.
    async fn request_password_reset(&self, email: &str, redirect_to: &str) -> Result<(), AppError>;

    /// Replace the password of the account `access_token` belongs to.
    async fn update_password(&self, access_token: &str, new_password: &str) -> Result<User, AppError>;
}

// -- Supabase GoTrue --

/// User object as returned by GoTrue.
#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Value,
}

impl From<GoTrueUser> for User {
    fn from(u: GoTrueUser) -> Self {
        Self {
            id: u.id,
            email: u.email.unwrap_or_default(),
            name: u
                .user_metadata
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoTrueSession {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: GoTrueUser,
}

impl GoTrueSession {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .or_else(|| self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user.into(),
        }
    }
}

pub struct SupabaseAuth {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SupabaseAuth {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, AppError> {
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if status.is_success() {
            return Ok(body);
        }

        let message = ["error_description", "msg", "message", "error"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .unwrap_or("identity provider error")
            .to_string();

        Err(match status {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::debug!(%status, %message, "Identity provider rejected request");
                AppError::Unauthorized
            }
            StatusCode::UNPROCESSABLE_ENTITY => AppError::Validation(message),
            _ => AppError::Upstream {
                status: status.as_u16(),
                message,
            },
        })
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let response = self
            .http
            .post(self.url("token?grant_type=password"))
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let body = Self::read_json(response).await?;
        let session: GoTrueSession = serde_json::from_value(body)
            .map_err(|e| AppError::Schema(format!("Invalid sign-in response: {e}")))?;
        Ok(session.into_session())
    }

    async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<SignUp, AppError> {
        let response = self
            .http
            .post(self.url("signup"))
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email, "password": password, "data": { "name": name } }))
            .send()
            .await?;
        let body = Self::read_json(response).await?;

        // With email confirmation enabled GoTrue returns the bare user.
        if body.get("access_token").is_some() {
            let session: GoTrueSession = serde_json::from_value(body)
                .map_err(|e| AppError::Schema(format!("Invalid sign-up response: {e}")))?;
            return Ok(SignUp::Session(session.into_session()));
        }
        let user: GoTrueUser = serde_json::from_value(body)
            .map_err(|e| AppError::Schema(format!("Invalid sign-up response: {e}")))?;
        Ok(SignUp::ConfirmationRequired(user.into()))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AppError> {
        let response = self
            .http
            .post(self.url("logout"))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        Self::read_json(response).await.map(|_| ())
    }

    async fn get_user(&self, access_token: &str) -> Result<User, AppError> {
        let response = self
            .http
            .get(self.url("user"))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        let body = Self::read_json(response).await?;
        let user: GoTrueUser = serde_json::from_value(body)
            .map_err(|e| AppError::Schema(format!("Invalid user response: {e}")))?;
        Ok(user.into())
    }

    async fn request_password_reset(&self, email: &str, redirect_to: &str) -> Result<(), AppError> {
        let url = Url::parse_with_params(&self.url("recover"), &[("redirect_to", redirect_to)])
            .map_err(|e| AppError::Configuration(format!("Invalid SUPABASE_URL: {e}")))?;
        let response = self
            .http
            .post(url)
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email }))
            .send()
            .await?;
        Self::read_json(response).await.map(|_| ())
    }

    async fn update_password(&self, access_token: &str, new_password: &str) -> Result<User, AppError> {
        let response = self
            .http
            .put(self.url("user"))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .json(&json!({ "password": new_password }))
            .send()
            .await?;
        let body = Self::read_json(response).await?;
        let user: GoTrueUser = serde_json::from_value(body)
            .map_err(|e| AppError::Schema(format!("Invalid user response: {e}")))?;
        Ok(user.into())
    }
}

// -- Local development provider --

/// JWT claims for locally issued session tokens.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone)]
struct LocalAccount {
    user: User,
    password_hash: String,
}

pub struct LocalIdentityProvider {
    jwt_secret: String,
    token_expiry_secs: i64,
    accounts: RwLock<HashMap<String, LocalAccount>>,
    revoked: RwLock<HashSet<String>>,
}

/// Hash a plaintext password with argon2id.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {e}")))
}

/// Verify a plaintext password against a stored hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| AppError::Internal(format!("Invalid hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

impl LocalIdentityProvider {
    pub fn new(jwt_secret: &str, token_expiry_secs: i64) -> Result<Self, AppError> {
        if jwt_secret.is_empty() {
            return Err(AppError::Configuration(
                "JWT_SECRET is required for the local identity provider".to_string(),
            ));
        }
        Ok(Self {
            jwt_secret: jwt_secret.to_string(),
            token_expiry_secs,
            accounts: RwLock::new(HashMap::new()),
            revoked: RwLock::new(HashSet::new()),
        })
    }

    fn issue(&self, user: &User) -> Result<Session, AppError> {
        let now = Utc::now();
        let expires_at: DateTime<Utc> = now + Duration::seconds(self.token_expiry_secs);
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            jti: Uuid::new_v4().to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {e}")))?;

        Ok(Session {
            access_token: token,
            refresh_token: None,
            expires_at: Some(expires_at),
            user: user.clone(),
        })
    }

    async fn live_claims(&self, token: &str) -> Result<Claims, AppError> {
        let claims = self.validate_token(token)?;
        if self.revoked.read().await.contains(&claims.jti) {
            return Err(AppError::Unauthorized);
        }
        Ok(claims)
    }

    /// Validate a locally issued token and return its claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AppError> {
        jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|_| AppError::Unauthorized)
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let key = email.trim().to_lowercase();
        let account = self
            .accounts
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or(AppError::Unauthorized)?;

        if !verify_password(password, &account.password_hash)? {
            return Err(AppError::Unauthorized);
        }
        self.issue(&account.user)
    }

    async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<SignUp, AppError> {
        let key = email.trim().to_lowercase();
        let password_hash = hash_password(password)?;

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&key) {
            return Err(AppError::Validation("User already registered".to_string()));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: key.clone(),
            name: name.to_string(),
        };
        accounts.insert(
            key,
            LocalAccount {
                user: user.clone(),
                password_hash,
            },
        );
        drop(accounts);

        self.issue(&user).map(SignUp::Session)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AppError> {
        let claims = self.validate_token(access_token)?;
        self.revoked.write().await.insert(claims.jti);
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<User, AppError> {
        let claims = self.live_claims(access_token).await?;
        let accounts = self.accounts.read().await;
        accounts
            .get(&claims.email)
            .filter(|a| a.user.id == claims.sub)
            .map(|a| a.user.clone())
            .ok_or(AppError::Unauthorized)
    }

    /// No mail is sent locally: the recovery link is written to the log.
    async fn request_password_reset(&self, email: &str, redirect_to: &str) -> Result<(), AppError> {
        let key = email.trim().to_lowercase();
        let account = self.accounts.read().await.get(&key).cloned();
        let Some(account) = account else {
            tracing::debug!("Password reset requested for unknown account");
            return Ok(());
        };

        let session = self.issue(&account.user)?;
        tracing::info!(
            user_id = %account.user.id,
            reset_link = %format!("{redirect_to}#access_token={}&type=recovery", session.access_token),
            "Password reset link issued"
        );
        Ok(())
    }

    async fn update_password(&self, access_token: &str, new_password: &str) -> Result<User, AppError> {
        let claims = self.live_claims(access_token).await?;
        let password_hash = hash_password(new_password)?;

        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&claims.email)
            .filter(|a| a.user.id == claims.sub)
            .ok_or(AppError::Unauthorized)?;
        account.password_hash = password_hash;
        tracing::info!(user_id = %account.user.id, "Password updated");
        Ok(account.user.clone())
    }
}

// -- Session context --

/// Current session plus change notification for the rest of the client.
pub struct AuthContext {
    provider: Arc<dyn IdentityProvider>,
    session: StdRwLock<Option<Session>>,
    changes: watch::Sender<Option<User>>,
}

impl AuthContext {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            provider,
            session: StdRwLock::new(None),
            changes,
        }
    }

    /// Resume a stored session, verifying the token with the provider.
    pub async fn restore(&self, access_token: &str) -> Result<User, AppError> {
        let user = self.provider.get_user(access_token).await?;
        self.set_session(Some(Session {
            access_token: access_token.to_string(),
            refresh_token: None,
            expires_at: None,
            user: user.clone(),
        }));
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, AppError> {
        let session = self.provider.sign_in(email, password).await?;
        let user = session.user.clone();
        self.set_session(Some(session));
        tracing::info!(user_id = %user.id, provider = self.provider.name(), "Signed in");
        Ok(user)
    }

    /// Register an account. Signs in straight away unless the provider
    /// requires email confirmation first.
    pub async fn signup(&self, email: &str, password: &str, name: &str) -> Result<User, AppError> {
        match self.provider.sign_up(email, password, name).await? {
            SignUp::Session(session) => {
                let user = session.user.clone();
                self.set_session(Some(session));
                Ok(user)
            }
            SignUp::ConfirmationRequired(user) => Ok(user),
        }
    }

    /// Sign out locally, and at the provider when possible.
    pub async fn logout(&self) {
        let token = self.current_session().map(|s| s.access_token);
        if let Some(token) = token {
            if let Err(e) = self.provider.sign_out(&token).await {
                tracing::warn!(error = %e, "Provider sign-out failed");
            }
        }
        self.set_session(None);
    }

    pub async fn request_password_reset(&self, email: &str, redirect_to: &str) -> Result<(), AppError> {
        self.provider.request_password_reset(email, redirect_to).await
    }

    /// Set a new password for the signed-in user, e.g. a session restored
    /// from a recovery link.
    pub async fn update_password(&self, new_password: &str) -> Result<User, AppError> {
        let token = self
            .current_session()
            .map(|s| s.access_token)
            .ok_or(AppError::Unauthorized)?;
        self.provider.update_password(&token, new_password).await
    }

    pub fn current_user(&self) -> Option<User> {
        self.current_session().map(|s| s.user)
    }

    pub fn current_session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Receiver notified whenever the signed-in user changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.changes.subscribe()
    }

    fn set_session(&self, session: Option<Session>) {
        let user = session.as_ref().map(|s| s.user.clone());
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = session;
        self.changes.send_replace(user);
    }
}

#[async_trait]
impl TokenSource for AuthContext {
    async fn access_token(&self) -> Option<String> {
        self.current_session()
            .filter(|s| !s.is_expired())
            .map(|s| s.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> Arc<LocalIdentityProvider> {
        Arc::new(LocalIdentityProvider::new("test-secret-key-for-jwt", 900).unwrap())
    }

    #[test]
    fn password_hash_and_verify() {
        let password = "SecurePassword123!";
        let hash = hash_password(password).unwrap();
        assert_ne!(hash, password);
        assert!(verify_password(password, &hash).unwrap());
        assert!(!verify_password("WrongPassword", &hash).unwrap());
    }

    #[test]
    fn local_provider_requires_secret() {
        assert!(LocalIdentityProvider::new("", 900).is_err());
    }

    #[test]
    fn gotrue_user_maps_metadata_name() {
        let raw: GoTrueUser = serde_json::from_value(json!({
            "id": "abc",
            "email": "dev@example.com",
            "user_metadata": {"name": "Dev"}
        }))
        .unwrap();
        let user = User::from(raw);
        assert_eq!(user.name, "Dev");

        let raw: GoTrueUser = serde_json::from_value(json!({"id": "abc"})).unwrap();
        let user = User::from(raw);
        assert_eq!(user.name, "");
        assert_eq!(user.email, "");
    }

    #[test]
    fn gotrue_session_expiry_from_expires_in() {
        let raw: GoTrueSession = serde_json::from_value(json!({
            "access_token": "t",
            "expires_in": 3600,
            "user": {"id": "abc", "email": "dev@example.com"}
        }))
        .unwrap();
        let session = raw.into_session();
        assert!(!session.is_expired());
        assert!(session.expires_at.is_some());
    }

    #[tokio::test]
    async fn local_signup_then_login() {
        let provider = local();
        let SignUp::Session(session) = provider
            .sign_up("Dev@Example.com", "hunter22", "Dev")
            .await
            .unwrap()
        else {
            panic!("local provider signs in immediately");
        };
        assert_eq!(session.user.email, "dev@example.com");

        let again = provider.sign_in("dev@example.com", "hunter22").await.unwrap();
        assert_eq!(again.user.id, session.user.id);

        let wrong = provider.sign_in("dev@example.com", "nope").await;
        assert!(matches!(wrong, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn duplicate_signup_rejected() {
        let provider = local();
        provider.sign_up("dev@example.com", "hunter22", "").await.unwrap();
        let result = provider.sign_up("dev@example.com", "other-pass", "").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn signed_out_token_is_rejected() {
        let provider = local();
        provider.sign_up("dev@example.com", "hunter22", "").await.unwrap();
        let session = provider.sign_in("dev@example.com", "hunter22").await.unwrap();

        assert!(provider.get_user(&session.access_token).await.is_ok());
        provider.sign_out(&session.access_token).await.unwrap();
        assert!(matches!(
            provider.get_user(&session.access_token).await,
            Err(AppError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn expired_token_rejected() {
        let provider = Arc::new(LocalIdentityProvider::new("secret", -3600).unwrap());
        provider.sign_up("dev@example.com", "hunter22", "").await.unwrap();
        let session = provider.sign_in("dev@example.com", "hunter22").await.unwrap();
        assert!(provider.validate_token(&session.access_token).is_err());
    }

    #[tokio::test]
    async fn context_notifies_subscribers_and_serves_tokens() {
        let context = AuthContext::new(local());
        let mut changes = context.subscribe();
        assert!(context.access_token().await.is_none());

        context.signup("dev@example.com", "hunter22", "Dev").await.unwrap();
        changes.changed().await.unwrap();
        assert_eq!(
            changes.borrow_and_update().as_ref().map(|u| u.name.clone()),
            Some("Dev".to_string())
        );
        assert!(context.access_token().await.is_some());

        context.logout().await;
        changes.changed().await.unwrap();
        assert!(changes.borrow().is_none());
        assert!(context.current_user().is_none());
        assert!(context.access_token().await.is_none());
    }

    #[tokio::test]
    async fn token_source_picks_up_new_session() {
        let provider = local();
        let context = AuthContext::new(provider.clone());
        context.signup("a@example.com", "hunter22", "").await.unwrap();
        let first = context.access_token().await.unwrap();

        context.logout().await;
        context.login("a@example.com", "hunter22").await.unwrap();
        let second = context.access_token().await.unwrap();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn recovery_token_sets_new_password() {
        let provider = local();
        provider.sign_up("dev@example.com", "hunter22", "Dev").await.unwrap();
        provider
            .request_password_reset("dev@example.com", "http://localhost:5173/reset-password")
            .await
            .unwrap();
        // Unknown addresses succeed silently.
        provider
            .request_password_reset("ghost@example.com", "http://localhost:5173/reset-password")
            .await
            .unwrap();

        let session = provider.sign_in("dev@example.com", "hunter22").await.unwrap();
        let context = AuthContext::new(provider.clone());
        context.restore(&session.access_token).await.unwrap();
        let user = context.update_password("correct-horse").await.unwrap();
        assert_eq!(user.email, "dev@example.com");

        assert!(matches!(
            provider.sign_in("dev@example.com", "hunter22").await,
            Err(AppError::Unauthorized)
        ));
        assert!(provider.sign_in("dev@example.com", "correct-horse").await.is_ok());
    }

    #[tokio::test]
    async fn update_password_requires_a_session() {
        let context = AuthContext::new(local());
        let result = context.update_password("correct-horse").await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn revoked_token_cannot_change_password() {
        let provider = local();
        provider.sign_up("dev@example.com", "hunter22", "").await.unwrap();
        let session = provider.sign_in("dev@example.com", "hunter22").await.unwrap();
        provider.sign_out(&session.access_token).await.unwrap();

        let result = provider.update_password(&session.access_token, "correct-horse").await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn restore_verifies_token() {
        let provider = local();
        let session = match provider.sign_up("r@example.com", "hunter22", "R").await.unwrap() {
            SignUp::Session(s) => s,
            SignUp::ConfirmationRequired(_) => unreachable!(),
        };

        let context = AuthContext::new(provider);
        let user = context.restore(&session.access_token).await.unwrap();
        assert_eq!(user.email, "r@example.com");
        assert!(context.restore("garbage.token.here").await.is_err());
    }
}
