#[cfg(test)]
mod tests {
    use crate::auth::{
        jwt::JwtService,
        models::{LoginRequest, NewUser, UserRole},
        repository::{UserRepository, UserRepositoryTrait},
        service::AuthService,
    };
    use crate::config::AuthConfig;
    use crate::database::test_support::migrated_pool;
    use crate::error::AppError;
    use sqlx::SqlitePool;

    fn auth_service(pool: SqlitePool) -> AuthService {
        let jwt = JwtService::from_config(&AuthConfig::default()).unwrap();
        AuthService::new(UserRepository::new(pool), jwt)
    }

    fn login(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_ensure_admin_seeds_once() {
        let (_file, pool) = migrated_pool().await;
        let service = auth_service(pool);
        let config = AuthConfig::default();

        assert!(service.ensure_admin(&config).await.unwrap());
        assert!(!service.ensure_admin(&config).await.unwrap());
        assert_eq!(service.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_login_returns_token_and_profile() {
        let (_file, pool) = migrated_pool().await;
        let service = auth_service(pool.clone());
        service.ensure_admin(&AuthConfig::default()).await.unwrap();

        let response = service.login(login("admin", "admin123")).await.unwrap();
        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.user.username, "admin");
        assert_eq!(response.user.role, UserRole::Admin);
        assert_eq!(response.expires_in, 24 * 3600);

        let claims = service.validate_token(&response.token).await.unwrap();
        assert_eq!(claims.role(), Some(UserRole::Admin));

        let stored = UserRepository::new(pool)
            .get_user_by_username("admin")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.last_login.is_some());
    }

    #[tokio::test]
    async fn test_login_rejects_bad_credentials() {
        let (_file, pool) = migrated_pool().await;
        let service = auth_service(pool);
        service.ensure_admin(&AuthConfig::default()).await.unwrap();

        assert!(matches!(
            service.login(login("admin", "wrong-password")).await,
            Err(AppError::Authentication(_))
        ));
        assert!(matches!(
            service.login(login("nobody", "admin123")).await,
            Err(AppError::Authentication(_))
        ));
        assert!(matches!(
            service.login(login("", "")).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_inactive_user_cannot_log_in() {
        let (_file, pool) = migrated_pool().await;
        let service = auth_service(pool.clone());

        let editor = NewUser {
            username: "editor".to_string(),
            email: "editor@example.com".to_string(),
            role: UserRole::Editor,
            full_name: None,
        };
        let created = service.create_user(editor, "secret99").await.unwrap();
        let token = service.login(login("editor", "secret99")).await.unwrap().token;

        sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?")
            .bind(created.id)
            .execute(&pool)
            .await
            .unwrap();

        match service.login(login("editor", "secret99")).await {
            Err(AppError::Authentication(msg)) => assert_eq!(msg, "Account is disabled"),
            other => panic!("expected disabled account, got {:?}", other.map(|r| r.user.username)),
        }
        assert!(matches!(
            service.validate_token(&token).await,
            Err(AppError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_username_is_rejected() {
        let (_file, pool) = migrated_pool().await;
        let service = auth_service(pool);
        service.ensure_admin(&AuthConfig::default()).await.unwrap();

        let duplicate = NewUser {
            username: "admin".to_string(),
            email: "other@example.com".to_string(),
            role: UserRole::Editor,
            full_name: None,
        };
        assert!(matches!(
            service.create_user(duplicate, "secret99").await,
            Err(AppError::BadRequest(_))
        ));
    }
}
