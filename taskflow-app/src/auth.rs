/// Auth service: email/password accounts and the signed-in session.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use taskflow_core::types::Author;
use thiserror::Error;
use tokio::sync::watch;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl User {
    pub fn author(&self) -> Author {
        Author {
            id: self.uid.clone(),
            email: self.email.clone(),
        }
    }
}

/// Fields left `None` are kept as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Identity provider seam. The session watch yields `Some(user)` while signed in.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn register(&self, email: &str, password: &str) -> Result<User, AuthError>;
    async fn login(&self, email: &str, password: &str) -> Result<User, AuthError>;
    async fn logout(&self) -> Result<(), AuthError>;
    async fn update_profile(&self, update: ProfileUpdate) -> Result<User, AuthError>;
    fn current_user(&self) -> Option<User>;
    fn watch_session(&self) -> watch::Receiver<Option<User>>;
}

struct Account {
    user: User,
    password_digest: String,
}

/// In-memory accounts keyed by lowercased email.
pub struct MemoryAuth {
    accounts: Mutex<HashMap<String, Account>>,
    session: watch::Sender<Option<User>>,
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuth {
    pub fn new() -> Self {
        let (session, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(HashMap::new()),
            session,
        }
    }

    fn digest(uid: &str, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(uid.as_bytes());
        hasher.update(b":");
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn validate(email: &str, password: &str) -> Result<(), AuthError> {
        if !email.contains('@') {
            return Err(AuthError::InvalidEmail);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        Ok(())
    }

    fn sign_in(&self, user: User) -> User {
        log::info!("[taskflow.auth] Signed in {} ({})", user.email, user.uid);
        self.session.send_replace(Some(user.clone()));
        user
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn register(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = email.trim();
        Self::validate(email, password)?;
        let key = email.to_lowercase();
        let user = {
            let mut accounts = self.accounts.lock().map_err(|_| AuthError::Unavailable)?;
            if accounts.contains_key(&key) {
                return Err(AuthError::EmailInUse);
            }
            let uid = uuid::Uuid::new_v4().simple().to_string();
            let user = User {
                uid: uid.clone(),
                email: email.to_string(),
                display_name: None,
                photo_url: None,
            };
            accounts.insert(
                key,
                Account {
                    user: user.clone(),
                    password_digest: Self::digest(&uid, password),
                },
            );
            user
        };
        log::info!("[taskflow.auth] Registered user: {} ({})", user.email, user.uid);
        Ok(self.sign_in(user))
    }

    async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let key = email.trim().to_lowercase();
        let user = {
            let accounts = self.accounts.lock().map_err(|_| AuthError::Unavailable)?;
            match accounts.get(&key) {
                Some(account) if account.password_digest == Self::digest(&account.user.uid, password) => {
                    account.user.clone()
                }
                _ => {
                    log::warn!("[taskflow.auth] Rejected login for {}", key);
                    return Err(AuthError::InvalidCredentials);
                }
            }
        };
        Ok(self.sign_in(user))
    }

    async fn logout(&self) -> Result<(), AuthError> {
        if let Some(user) = self.session.send_replace(None) {
            log::info!("[taskflow.auth] Signed out {}", user.email);
        }
        Ok(())
    }

    async fn update_profile(&self, update: ProfileUpdate) -> Result<User, AuthError> {
        let current = self.current_user().ok_or(AuthError::NotSignedIn)?;
        let user = {
            let mut accounts = self.accounts.lock().map_err(|_| AuthError::Unavailable)?;
            let account = accounts
                .get_mut(&current.email.to_lowercase())
                .ok_or(AuthError::NotSignedIn)?;
            if let Some(name) = update.display_name {
                account.user.display_name = Some(name);
            }
            if let Some(url) = update.photo_url {
                account.user.photo_url = Some(url);
            }
            account.user.clone()
        };
        self.session.send_replace(Some(user.clone()));
        Ok(user)
    }

    fn current_user(&self) -> Option<User> {
        self.session.borrow().clone()
    }

    fn watch_session(&self) -> watch::Receiver<Option<User>> {
        self.session.subscribe()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Password must be at least 6 characters")]
    WeakPassword,
    #[error("An account with this email already exists")]
    EmailInUse,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Not signed in")]
    NotSignedIn,
    #[error("Auth service unavailable")]
    Unavailable,
}
