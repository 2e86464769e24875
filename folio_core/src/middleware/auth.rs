use crate::auth::models::UserRole;
use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};

/// The authenticated caller, placed in request extensions by [`jwt_auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub username: String,
    pub role: UserRole,
}

impl AuthUser {
    pub fn new(user_id: i64, username: String, role: UserRole) -> Self {
        Self {
            user_id,
            username,
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, UserRole::Admin)
    }
}

pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token_from_header(request.headers())?;
    let auth_user = authenticate(&state, &token).await?;
    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

/// Resolves a bearer token to its user. Used by the middleware and by the
/// live websocket, which carries the token in the query string.
pub async fn authenticate(state: &AppState, token: &str) -> Result<AuthUser, AppError> {
    let claims = state.auth_service.validate_token(token).await?;

    let role = claims
        .role()
        .ok_or_else(|| AppError::InvalidToken("Invalid role in token".to_string()))?;
    let user_id = claims
        .user_id()
        .ok_or_else(|| AppError::InvalidToken("Invalid user ID in token".to_string()))?;

    Ok(AuthUser::new(user_id, claims.username, role))
}

pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| AppError::Authentication("Access token required".to_string()))?;

    if !auth_user.is_admin() {
        return Err(AppError::Authorization("Admin access required".to_string()));
    }

    Ok(next.run(request).await)
}

fn extract_token_from_header(headers: &HeaderMap) -> Result<String, AppError> {
    let missing = || AppError::Authentication("Access token required".to_string());

    let auth_header = headers
        .get(AUTHORIZATION)
        .ok_or_else(missing)?
        .to_str()
        .map_err(|_| AppError::InvalidToken("Invalid Authorization header format".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::InvalidToken("Authorization header must use the Bearer scheme".to_string()))?
        .trim();

    if token.is_empty() {
        return Err(missing());
    }

    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_token_from_header() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            extract_token_from_header(&headers),
            Err(AppError::Authentication(_))
        ));

        headers.insert(AUTHORIZATION, "Bearer valid-token-123".parse().unwrap());
        assert_eq!(extract_token_from_header(&headers).unwrap(), "valid-token-123");

        headers.insert(AUTHORIZATION, "Basic invalid".parse().unwrap());
        assert!(matches!(
            extract_token_from_header(&headers),
            Err(AppError::InvalidToken(_))
        ));

        headers.insert(AUTHORIZATION, "Bearer ".parse().unwrap());
        assert!(matches!(
            extract_token_from_header(&headers),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn test_admin_role_check() {
        assert!(AuthUser::new(1, "admin".to_string(), UserRole::Admin).is_admin());
        assert!(!AuthUser::new(2, "editor".to_string(), UserRole::Editor).is_admin());
    }
}
