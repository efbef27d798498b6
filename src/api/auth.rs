// External imports
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{SecondsFormat, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{info, warn};

// Internal imports
use super::AppState;
use crate::config::AuthConfig;
use crate::error::{PredictorError, Result};

const MIN_PASSWORD_LEN: usize = 8;
const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=64;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

/// Form body of the token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Public view of an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub disabled: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
struct StoredUser {
    user: User,
    /// bcrypt hash, salt included
    password_hash: String,
}

fn poisoned<T>(_: T) -> PredictorError {
    PredictorError::Internal("user store poisoned".into())
}

/// In-memory accounts owned by the application state
///
/// Hashing and verification run bcrypt and are CPU bound; async callers
/// should move them off the runtime threads.
#[derive(Debug)]
pub struct UserStore {
    users: RwLock<HashMap<String, StoredUser>>,
    cost: u32,
}

impl Default for UserStore {
    fn default() -> Self {
        Self::with_cost(bcrypt::DEFAULT_COST)
    }
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store hashing with the given bcrypt work factor
    pub fn with_cost(cost: u32) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            cost,
        }
    }

    pub fn register(&self, request: RegisterRequest) -> Result<User> {
        let username = request.username.trim().to_string();
        if !USERNAME_LEN.contains(&username.chars().count()) {
            return Err(PredictorError::validation(format!(
                "username must be {} to {} characters",
                USERNAME_LEN.start(),
                USERNAME_LEN.end()
            )));
        }
        if request.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(PredictorError::validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if self.lookup_stored(&username)?.is_some() {
            return Err(duplicate(&username));
        }

        // Hash outside the lock; the insert below re-checks for a racing registration
        let password_hash = bcrypt::hash(&request.password, self.cost)
            .map_err(|e| PredictorError::Internal(format!("password hashing failed: {}", e)))?;
        let user = User {
            username: username.clone(),
            email: request.email,
            full_name: request.full_name,
            disabled: false,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };

        let mut users = self.users.write().map_err(poisoned)?;
        if users.contains_key(&username) {
            return Err(duplicate(&username));
        }
        users.insert(
            username.clone(),
            StoredUser {
                user: user.clone(),
                password_hash,
            },
        );
        info!("Registered user '{}'", username);
        Ok(user)
    }

    /// Checks credentials; unknown users and wrong passwords look the same
    pub fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        let rejected = || PredictorError::Unauthorized("incorrect username or password".into());

        let Some(stored) = self.lookup_stored(username)? else {
            return Err(rejected());
        };
        match bcrypt::verify(password, &stored.password_hash) {
            Ok(true) => Ok(stored.user),
            Ok(false) => Err(rejected()),
            Err(e) => {
                warn!("Unreadable password hash for '{}': {}", username, e);
                Err(rejected())
            }
        }
    }

    pub fn get(&self, username: &str) -> Result<Option<User>> {
        Ok(self.lookup_stored(username)?.map(|s| s.user))
    }

    fn lookup_stored(&self, username: &str) -> Result<Option<StoredUser>> {
        let users = self.users.read().map_err(poisoned)?;
        Ok(users.get(username).cloned())
    }
}

fn duplicate(username: &str) -> PredictorError {
    PredictorError::Conflict(format!("username '{}' is already registered", username))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

/// Issues and verifies HS256 JSON Web Tokens
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    expire_minutes: i64,
}

impl TokenIssuer {
    pub fn new(secret: &str, expire_minutes: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            expire_minutes,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.secret_key, config.token_expire_minutes)
    }

    pub fn issue(&self, username: &str) -> Result<TokenResponse> {
        self.issue_at(username, Utc::now().timestamp())
    }

    fn issue_at(&self, username: &str, now: i64) -> Result<TokenResponse> {
        let expires_in = self.expire_minutes * 60;
        let claims = Claims {
            sub: username.to_string(),
            exp: now + expires_in,
        };
        let access_token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| PredictorError::Internal(format!("failed to sign token: {}", e)))?;

        Ok(TokenResponse {
            access_token,
            token_type: "bearer".to_string(),
            expires_in,
        })
    }

    /// Returns the subject of a valid, unexpired token
    pub fn verify(&self, token: &str) -> Result<String> {
        match jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => Ok(data.claims.sub),
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
                Err(PredictorError::Unauthorized("token has expired".into()))
            }
            Err(_) => Err(PredictorError::Unauthorized("could not validate credentials".into())),
        }
    }
}

/// Authenticated caller, resolved from the `Authorization: Bearer` header
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = PredictorError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| PredictorError::Unauthorized("missing bearer token".into()))?;
        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .ok_or_else(|| PredictorError::Unauthorized("missing bearer token".into()))?;

        let username = state.tokens.verify(token.trim())?;
        match state.users.get(&username)? {
            Some(user) if !user.disabled => Ok(CurrentUser(user)),
            Some(_) => Err(PredictorError::Unauthorized("user is disabled".into())),
            None => Err(PredictorError::Unauthorized("could not validate credentials".into())),
        }
    }
}
