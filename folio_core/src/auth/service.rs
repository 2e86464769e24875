use crate::auth::jwt::JwtService;
use crate::auth::models::{JwtClaims, LoginRequest, LoginResponse, NewUser, UserResponse, UserRole};
use crate::auth::repository::{UserRepository, UserRepositoryTrait};
use crate::config::AuthConfig;
use crate::error::AppError;
use crate::validation;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AuthService {
    user_repository: Arc<dyn UserRepositoryTrait + Send + Sync>,
    jwt_service: Arc<JwtService>,
    argon2: Argon2<'static>,
}

impl AuthService {
    pub fn new(user_repository: UserRepository, jwt_service: JwtService) -> Self {
        Self {
            user_repository: Arc::new(user_repository),
            jwt_service: Arc::new(jwt_service),
            argon2: Argon2::default(),
        }
    }

    pub fn jwt_service(&self) -> &JwtService {
        &self.jwt_service
    }

    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, AppError> {
        if request.username.trim().is_empty() || request.password.is_empty() {
            return Err(AppError::BadRequest(
                "Username and password are required".to_string(),
            ));
        }

        let user = self
            .user_repository
            .get_user_by_username(request.username.trim())
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid credentials".to_string()))?;

        if !user.is_active {
            return Err(AppError::Authentication("Account is disabled".to_string()));
        }

        if !self.verify_password(&request.password, &user.password_hash)? {
            warn!(username = %user.username, "Failed login attempt");
            return Err(AppError::Authentication("Invalid credentials".to_string()));
        }

        self.user_repository.update_last_login(user.id).await?;

        let token = self.jwt_service.generate_token(&user)?;
        info!(username = %user.username, "Admin login");

        Ok(LoginResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt_service.expiry_seconds(),
            user: UserResponse::from(user),
        })
    }

    /// Checks the signature and that the account behind it is still usable.
    pub async fn validate_token(&self, token: &str) -> Result<JwtClaims, AppError> {
        let claims = self.jwt_service.validate_token(token)?;

        let user_id = claims
            .user_id()
            .ok_or_else(|| AppError::InvalidToken("Invalid user ID in token".to_string()))?;

        let user = self
            .user_repository
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::InvalidToken("User not found".to_string()))?;

        if !user.is_active {
            return Err(AppError::InvalidToken("Account is disabled".to_string()));
        }

        Ok(claims)
    }

    pub async fn create_user(&self, user: NewUser, password: &str) -> Result<UserResponse, AppError> {
        if user.username.trim().is_empty() || password.len() < 6 {
            return Err(AppError::BadRequest(
                "Username and a password of at least 6 characters are required".to_string(),
            ));
        }
        if !validation::is_valid_email(&user.email) {
            return Err(AppError::BadRequest("Invalid email format".to_string()));
        }

        let password_hash = self.hash_password(password)?;
        let created = self.user_repository.create_user(&user, &password_hash).await?;
        Ok(UserResponse::from(created))
    }

    pub async fn count_users(&self) -> Result<i64, AppError> {
        self.user_repository.count_users().await
    }

    /// Seeds the configured admin account when no users exist yet.
    pub async fn ensure_admin(&self, config: &AuthConfig) -> Result<bool, AppError> {
        if self.user_repository.count_users().await? > 0 {
            return Ok(false);
        }

        let admin = NewUser {
            username: config.admin_username.clone(),
            email: config.admin_email.clone(),
            role: UserRole::Admin,
            full_name: Some("Administrator".to_string()),
        };
        self.create_user(admin, &config.admin_password).await?;

        info!(username = %config.admin_username, "Seeded initial admin account");
        Ok(true)
    }

    fn hash_password(&self, password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Other(anyhow::anyhow!("Failed to hash password: {}", e)))?;

        Ok(password_hash.to_string())
    }

    fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AppError> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AppError::Other(anyhow::anyhow!("Invalid password hash: {}", e)))?;

        Ok(self
            .argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }
}
