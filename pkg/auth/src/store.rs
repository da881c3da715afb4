//! User/session persistence. A single JSON file holds both maps and is rewritten after
//! every mutation; it is read once at startup. Mutations are serialized by `std::sync::Mutex`
//! since every handler call is a short in-memory update followed by a synchronous file write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::errors::{AuthError, AuthResult};

pub const ADMIN_EMAIL: &str = "admin@gmail.com";
pub const ADMIN_PASSWORD: &str = "admin123";
pub const ADMIN_USER_ID: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub password: String,
    pub user_id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AuthData {
    users: HashMap<String, UserRecord>,
    sessions: HashMap<String, String>,
}

pub struct AuthStore {
    path: PathBuf,
    data: Mutex<AuthData>,
}

impl AuthStore {
    /// Loads the store from `path` if it exists, then ensures the administrator account exists
    /// (creating or repairing its fixed user_id), persisting if anything changed.
    pub fn open(path: impl AsRef<Path>) -> AuthResult<Self> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|source| AuthError::Load { path: path.display().to_string(), source })?;
            if content.trim().is_empty() {
                AuthData::default()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            AuthData::default()
        };

        let store = AuthStore { path, data: Mutex::new(data) };
        store.ensure_admin()?;
        Ok(store)
    }

    fn ensure_admin(&self) -> AuthResult<()> {
        let mut changed = false;
        {
            let mut data = self.data.lock().unwrap();
            match data.users.get(ADMIN_EMAIL) {
                None => {
                    data.users.insert(
                        ADMIN_EMAIL.to_string(),
                        UserRecord { password: ADMIN_PASSWORD.to_string(), user_id: ADMIN_USER_ID.to_string() },
                    );
                    tracing::warn!(email = ADMIN_EMAIL, user_id = ADMIN_USER_ID, "default admin user created");
                    changed = true;
                }
                Some(existing) if existing.user_id != ADMIN_USER_ID => {
                    data.users.get_mut(ADMIN_EMAIL).unwrap().user_id = ADMIN_USER_ID.to_string();
                    tracing::info!("admin user id repaired to the reserved constant");
                    changed = true;
                }
                Some(_) => {}
            }
        }
        if changed {
            self.persist()?;
        }
        Ok(())
    }

    fn persist(&self) -> AuthResult<()> {
        let data = self.data.lock().unwrap();
        let body = serde_json::to_string_pretty(&*data)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| AuthError::Save { path: self.path.display().to_string(), source })?;
        }
        std::fs::write(&self.path, body).map_err(|source| AuthError::Save { path: self.path.display().to_string(), source })
    }

    pub fn register(&self, email: &str, password: &str) -> AuthResult<()> {
        if email == ADMIN_EMAIL {
            return Err(AuthError::AdminEmailReserved);
        }
        {
            let mut data = self.data.lock().unwrap();
            if data.users.contains_key(email) {
                return Err(AuthError::UserExists);
            }
            let user_id = uuid::Uuid::new_v4().to_string();
            data.users.insert(email.to_string(), UserRecord { password: password.to_string(), user_id });
        }
        self.persist()
    }

    pub fn login(&self, email: &str, password: &str) -> AuthResult<(String, String)> {
        let user_id = {
            let data = self.data.lock().unwrap();
            let record = data.users.get(email).ok_or(AuthError::InvalidCredentials)?;
            if record.password != password {
                return Err(AuthError::InvalidCredentials);
            }
            record.user_id.clone()
        };

        let token = uuid::Uuid::new_v4().to_string();
        {
            let mut data = self.data.lock().unwrap();
            data.sessions.insert(token.clone(), user_id.clone());
        }
        self.persist()?;
        Ok((token, user_id))
    }

    pub fn validate_session(&self, token: &str) -> Option<String> {
        self.data.lock().unwrap().sessions.get(token).cloned()
    }
}
