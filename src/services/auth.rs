use crate::{
    config::jwt::JwtConfig,
    error::{AppError, AppResult},
    store::{NewUser, Store, UserLookup, UserRecord},
    utils::{
        hash_password,
        jwt::{sign_access_token, sign_refresh_token, verify_refresh_token},
        verify_password,
    },
};
use uuid::Uuid;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

pub struct AuthSession {
    pub user: UserRecord,
    pub access_token: String,
    pub refresh_token: String,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct AuthService {
    store: Store,
    jwt: JwtConfig,
}

impl AuthService {
    pub fn new(store: Store, jwt: JwtConfig) -> Self {
        Self { store, jwt }
    }

    /// Input is expected to be validated already; the password is hashed here
    /// and nowhere earlier.
    pub async fn signup(&self, username: &str, email: &str, password: &str) -> AppResult<AuthSession> {
        let username = username.trim();
        let email = normalize_email(email);

        if self
            .store
            .users
            .find_user(UserLookup::Email(&email))
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("email already exists".to_string()));
        }
        if self
            .store
            .users
            .find_user(UserLookup::Username(username))
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("username already exists".to_string()));
        }

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(anyhow::Error::from)??;

        // A concurrent signup can still win the race; the store's unique
        // constraint surfaces it as the same Conflict.
        let user = self
            .store
            .users
            .create_user(NewUser {
                username: username.to_string(),
                email,
                password_hash,
            })
            .await?;

        tracing::info!("User {} signed up", user.id);
        self.issue_session(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<AuthSession> {
        let email = normalize_email(email);
        let user = self
            .store
            .users
            .find_user(UserLookup::Email(&email))
            .await?
            .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

        let password = password.to_string();
        let hash = user.password_hash.clone();
        let is_valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(anyhow::Error::from)??;
        if !is_valid {
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        self.issue_session(user)
    }

    /// Mints a new access token; the refresh token itself is left unchanged.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> AppResult<String> {
        let token = refresh_token
            .ok_or_else(|| AppError::Unauthorized("Refresh token required".to_string()))?;
        let user_id = verify_refresh_token(&self.jwt, token)?;

        // Tokens of deleted accounts stop working even before they expire.
        if self.store.users.find_user_by_id(user_id).await?.is_none() {
            return Err(AppError::InvalidToken);
        }
        Ok(sign_access_token(&self.jwt, user_id)?)
    }

    pub async fn profile(&self, user_id: Uuid) -> AppResult<UserRecord> {
        self.store
            .users
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    fn issue_session(&self, user: UserRecord) -> AppResult<AuthSession> {
        let access_token = sign_access_token(&self.jwt, user.id)?;
        let refresh_token = sign_refresh_token(&self.jwt, user.id)?;
        Ok(AuthSession {
            user,
            access_token,
            refresh_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::jwt::verify_access_token;

    fn service() -> AuthService {
        AuthService::new(
            Store::memory(),
            JwtConfig {
                access_secret: "unit_test_access_secret_that_is_long_enough".to_string(),
                refresh_secret: "unit_test_refresh_secret_that_is_long_enough".to_string(),
                access_token_expiry: 900,
                refresh_token_expiry: 604800,
                issuer: "civic-reporter-api".to_string(),
                audience: "civic-reporter-client".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn signup_stores_hash_and_normalized_email() {
        let auth = service();
        let session = auth
            .signup("citizen_1", "  Citizen@Example.COM ", "Secret123")
            .await
            .unwrap();
        assert_eq!(session.user.email, "citizen@example.com");
        assert_ne!(session.user.password_hash, "Secret123");
        assert!(verify_password("Secret123", &session.user.password_hash).unwrap());
        assert_eq!(
            verify_access_token(&auth.jwt, &session.access_token),
            Ok(session.user.id)
        );
    }

    #[tokio::test]
    async fn duplicate_signup_names_the_field() {
        let auth = service();
        auth.signup("citizen_1", "citizen@example.com", "Secret123")
            .await
            .unwrap();

        let err = auth
            .signup("citizen_2", "CITIZEN@example.com", "Secret123")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Conflict(ref m) if m == "email already exists"));

        let err = auth
            .signup("citizen_1", "other@example.com", "Secret123")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Conflict(ref m) if m == "username already exists"));
    }

    #[tokio::test]
    async fn login_failures_share_one_message() {
        let auth = service();
        auth.signup("citizen_1", "citizen@example.com", "Secret123")
            .await
            .unwrap();

        let wrong_password = auth
            .login("citizen@example.com", "Wrong1234")
            .await
            .err()
            .unwrap();
        let unknown_email = auth
            .login("nobody@example.com", "Secret123")
            .await
            .err()
            .unwrap();
        assert_eq!(wrong_password.to_string(), INVALID_CREDENTIALS);
        assert_eq!(unknown_email.to_string(), INVALID_CREDENTIALS);

        assert!(auth.login("Citizen@Example.com", "Secret123").await.is_ok());
    }

    #[tokio::test]
    async fn refresh_requires_a_refresh_token() {
        let auth = service();
        let session = auth
            .signup("citizen_1", "citizen@example.com", "Secret123")
            .await
            .unwrap();

        let access = auth.refresh(Some(&session.refresh_token)).await.unwrap();
        assert_eq!(verify_access_token(&auth.jwt, &access), Ok(session.user.id));

        assert!(matches!(
            auth.refresh(Some(&session.access_token)).await,
            Err(AppError::InvalidToken)
        ));
        assert!(matches!(
            auth.refresh(None).await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
