//! The auth façade's operations: register, login, validate_session.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::AuthError;
use crate::store::AuthStore;

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub session: Option<Session>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateSessionResponse {
    pub valid: bool,
    pub user_id: String,
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<AuthStore>,
}

impl AuthService {
    pub fn new(store: Arc<AuthStore>) -> Self {
        AuthService { store }
    }

    pub fn register(&self, email: &str, password: &str) -> RegisterResponse {
        if email.is_empty() || password.is_empty() {
            return RegisterResponse { success: false, message: AuthError::MissingCredentials.to_string() };
        }
        if email == crate::store::ADMIN_EMAIL {
            return RegisterResponse { success: false, message: AuthError::AdminEmailReserved.to_string() };
        }
        if !EMAIL_REGEX.is_match(email) {
            tracing::warn!(email, "registration failed due to invalid email format");
            return RegisterResponse { success: false, message: AuthError::InvalidEmailFormat.to_string() };
        }

        match self.store.register(email, password) {
            Ok(()) => {
                tracing::info!(email, "new user registered");
                RegisterResponse { success: true, message: "Registration successful. Please log in.".to_string() }
            }
            Err(e) => RegisterResponse { success: false, message: e.to_string() },
        }
    }

    pub fn login(&self, email: &str, password: &str) -> LoginResponse {
        match self.store.login(email, password) {
            Ok((token, user_id)) => {
                tracing::info!(user_id, "user logged in");
                LoginResponse {
                    success: true,
                    message: "Login successful.".to_string(),
                    session: Some(Session { token, user_id }),
                }
            }
            Err(e) => LoginResponse { success: false, message: e.to_string(), session: None },
        }
    }

    pub fn validate_session(&self, token: &str) -> ValidateSessionResponse {
        match self.store.validate_session(token) {
            Some(user_id) => ValidateSessionResponse { valid: true, user_id },
            None => ValidateSessionResponse { valid: false, user_id: String::new() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        let dir = std::env::temp_dir().join(format!("auth-test-{}", uuid::Uuid::new_v4()));
        AuthService::new(Arc::new(AuthStore::open(dir.join("auth_data.json")).unwrap()))
    }

    #[test]
    fn admin_account_exists_at_startup() {
        let svc = service();
        let login = svc.login(crate::store::ADMIN_EMAIL, crate::store::ADMIN_PASSWORD);
        assert!(login.success);
        assert_eq!(login.session.unwrap().user_id, crate::store::ADMIN_USER_ID);
    }

    #[test]
    fn registration_rejects_malformed_email() {
        let svc = service();
        let response = svc.register("not-an-email", "secret");
        assert!(!response.success);
    }

    #[test]
    fn registration_rejects_admin_email() {
        let svc = service();
        let response = svc.register(crate::store::ADMIN_EMAIL, "whatever");
        assert!(!response.success);
    }

    #[test]
    fn register_then_login_round_trips() {
        let svc = service();
        let reg = svc.register("user@example.com", "hunter2");
        assert!(reg.success);

        let login = svc.login("user@example.com", "hunter2");
        assert!(login.success);
        let session = login.session.unwrap();

        let validated = svc.validate_session(&session.token);
        assert!(validated.valid);
        assert_eq!(validated.user_id, session.user_id);
    }

    #[test]
    fn login_with_wrong_password_fails() {
        let svc = service();
        svc.register("user@example.com", "hunter2");
        let login = svc.login("user@example.com", "wrong");
        assert!(!login.success);
    }

    #[test]
    fn validate_unknown_token_is_invalid() {
        let svc = service();
        let response = svc.validate_session("not-a-real-token");
        assert!(!response.valid);
    }
}
