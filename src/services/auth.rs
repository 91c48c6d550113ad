use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::db::{NotificationSettingsRepository, User, UserRepository};
use crate::error::{AppError, AppResult};
use crate::AppState;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

pub struct AuthService;

impl AuthService {
    /// Create a signed JWT for a user id
    pub fn create_jwt(state: &Arc<AppState>, user_id: &str) -> AppResult<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(state.config.jwt.expiration_hours);
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(state.config.jwt.secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// Decode and validate a JWT, returning the claims
    pub fn decode_jwt(state: &Arc<AppState>, token: &str) -> AppResult<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.config.jwt.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    /// Get user from JWT token
    pub async fn get_user_from_token(state: &Arc<AppState>, token: &str) -> AppResult<User> {
        let claims = Self::decode_jwt(state, token)?;
        let user = UserRepository::find_by_id(&state.db, &claims.sub)
            .await?
            .ok_or(AppError::Unauthorized)?;
        Ok(user)
    }

    /// Validate registration input.
    pub fn validate_registration(email: &str, password: &str, display_name: &str) -> AppResult<()> {
        let email = email.trim();
        let at = email.find('@');
        let valid_email = matches!(at, Some(i) if i > 0 && i + 1 < email.len())
            && !email.contains(char::is_whitespace);
        if !valid_email {
            return Err(AppError::Validation("email is not a valid address".to_string()));
        }

        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        if display_name.trim().is_empty() || display_name.len() > 100 {
            return Err(AppError::Validation(
                "display_name must be between 1 and 100 characters".to_string(),
            ));
        }

        Ok(())
    }

    /// Register a new account and return it with a fresh token.
    pub async fn register(
        state: &Arc<AppState>,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> AppResult<(User, String)> {
        Self::validate_registration(email, password, display_name)?;

        let password = password.to_string();
        let password_hash =
            tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
                .await
                .map_err(|e| AppError::Internal(anyhow::anyhow!("hashing task failed: {}", e)))??;

        let user =
            UserRepository::create(&state.db, email, &password_hash, display_name.trim()).await?;
        NotificationSettingsRepository::get_or_create(&state.db, &user.id).await?;

        tracing::info!("Registered user {}", user.id);
        let token = Self::create_jwt(state, &user.id)?;
        Ok((user, token))
    }

    /// Verify credentials. Unknown emails and wrong passwords are
    /// indistinguishable to the caller.
    pub async fn login(
        state: &Arc<AppState>,
        email: &str,
        password: &str,
    ) -> AppResult<(User, String)> {
        let user = UserRepository::find_by_email(&state.db, email)
            .await?
            .ok_or(AppError::Unauthorized)?;

        let password = password.to_string();
        let hash = user.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("hashing task failed: {}", e)))?
            .unwrap_or(false);

        if !valid {
            tracing::debug!("Rejected login for user {}", user.id);
            return Err(AppError::Unauthorized);
        }

        let token = Self::create_jwt(state, &user.id)?;
        Ok((user, token))
    }
}
