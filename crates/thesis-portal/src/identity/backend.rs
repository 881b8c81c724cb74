use serde::{Deserialize, Serialize};

use crate::workflows::thesis::domain::{User, UserRole};

/// Profile data stored next to an auth account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMetadata {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<UserRole>,
    #[serde(default)]
    pub identifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthAccount {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: AccountMetadata,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl AuthAccount {
    /// Portal user for this account. Missing profile data falls back to the
    /// e-mail local part, the student role and a `-` identifier.
    pub fn to_user(&self) -> User {
        let name = non_blank(self.metadata.full_name.as_deref())
            .or_else(|| {
                self.email
                    .as_deref()
                    .and_then(|email| non_blank(email.split('@').next()))
            })
            .unwrap_or("User");

        User {
            id: self.id.clone(),
            name: name.to_string(),
            role: self.metadata.role.unwrap_or(UserRole::Student),
            identifier: non_blank(self.metadata.identifier.as_deref())
                .unwrap_or("-")
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid e-mail or password")]
    InvalidCredentials,
    #[error("an account for {0} already exists")]
    AlreadyRegistered(String),
    #[error("sign-in provider {0} is not supported")]
    UnsupportedProvider(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("authentication service unavailable: {0}")]
    Unavailable(String),
}

/// Hosted authentication service.
pub trait AuthBackend: Send + Sync {
    fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<AuthAccount, AuthError>;
    fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: AccountMetadata,
    ) -> Result<AuthAccount, AuthError>;
    /// URL the user visits to authorize with an external provider.
    fn oauth_authorize_url(&self, provider: &str, redirect_to: &str) -> Result<String, AuthError>;
    fn exchange_oauth_code(&self, provider: &str, code: &str) -> Result<AuthAccount, AuthError>;
    fn current_account(&self) -> Result<Option<AuthAccount>, AuthError>;
    fn find_account(&self, user_id: &str) -> Result<Option<AuthAccount>, AuthError>;
    fn sign_out(&self) -> Result<(), AuthError>;
}
