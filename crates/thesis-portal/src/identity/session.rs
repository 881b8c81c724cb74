use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::{info, warn};

use super::backend::{AccountMetadata, AuthAccount, AuthBackend, AuthError};
use crate::workflows::thesis::domain::{User, UserRole};

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    SignedIn(User),
    SignedOut,
}

/// The signed-in user for one host (a server process or a CLI run).
#[derive(Debug, Default)]
pub struct SessionContext {
    user: RwLock<Option<User>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(&self) -> Option<User> {
        self.user.read().expect("session lock poisoned").clone()
    }

    fn replace(&self, user: Option<User>) -> Option<User> {
        let mut guard = self.user.write().expect("session lock poisoned");
        std::mem::replace(&mut *guard, user)
    }
}

/// Registration form data.
#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: UserRole,
    pub identifier: String,
}

pub struct IdentityProvider<B> {
    backend: Arc<B>,
    session: Arc<SessionContext>,
    events: broadcast::Sender<IdentityEvent>,
}

impl<B> IdentityProvider<B>
where
    B: AuthBackend + 'static,
{
    pub fn new(backend: Arc<B>, session: Arc<SessionContext>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            session,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IdentityEvent> {
        self.events.subscribe()
    }

    pub fn current_user(&self) -> Option<User> {
        self.session.user()
    }

    /// The cached user, or the backend's live session if nothing is cached yet.
    pub fn login(&self) -> Result<Option<User>, AuthError> {
        match self.session.user() {
            Some(user) => Ok(Some(user)),
            None => self.refresh(),
        }
    }

    pub fn login_with_password(&self, email: &str, password: &str) -> Result<User, AuthError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::InvalidInput(
                "Email dan password wajib diisi.".to_string(),
            ));
        }
        let account = self.backend.sign_in_with_password(email.trim(), password)?;
        Ok(self.sign_in(&account))
    }

    pub fn register(&self, registration: Registration) -> Result<User, AuthError> {
        if registration.email.trim().is_empty()
            || registration.password.is_empty()
            || registration.full_name.trim().is_empty()
        {
            return Err(AuthError::InvalidInput(
                "Nama, email dan password wajib diisi.".to_string(),
            ));
        }

        let metadata = AccountMetadata {
            full_name: Some(registration.full_name.trim().to_string()),
            role: Some(registration.role),
            identifier: Some(registration.identifier.trim().to_string()),
        };
        let account =
            self.backend
                .sign_up(registration.email.trim(), &registration.password, metadata)?;
        Ok(self.sign_in(&account))
    }

    /// Start an external sign-in; the caller sends the user to the returned URL.
    pub fn begin_oauth(&self, provider: &str, redirect_to: &str) -> Result<String, AuthError> {
        self.backend.oauth_authorize_url(provider, redirect_to)
    }

    /// Finish an external sign-in with the code the provider redirected back with.
    pub fn login_with_oauth(&self, provider: &str, code: &str) -> Result<User, AuthError> {
        let account = self.backend.exchange_oauth_code(provider, code)?;
        Ok(self.sign_in(&account))
    }

    pub fn logout(&self) -> Result<(), AuthError> {
        self.backend.sign_out()?;
        if let Some(previous) = self.session.replace(None) {
            info!(user = %previous.id, "signed out");
        }
        self.publish(IdentityEvent::SignedOut);
        Ok(())
    }

    /// Re-read the backend session and bring the cache in line with it.
    pub fn refresh(&self) -> Result<Option<User>, AuthError> {
        let user = self
            .backend
            .current_account()?
            .map(|account| account.to_user());
        let previous = self.session.replace(user.clone());

        match (&previous, &user) {
            (_, Some(current)) if previous.as_ref() != Some(current) => {
                self.publish(IdentityEvent::SignedIn(current.clone()));
            }
            (Some(_), None) => self.publish(IdentityEvent::SignedOut),
            _ => {}
        }
        Ok(user)
    }

    /// Resolve another user's profile, e.g. a student's NIM for a letter.
    pub fn lookup(&self, user_id: &str) -> Result<Option<User>, AuthError> {
        if let Some(current) = self.session.user().filter(|user| user.id == user_id) {
            return Ok(Some(current));
        }
        Ok(self
            .backend
            .find_account(user_id)?
            .map(|account| account.to_user()))
    }

    fn sign_in(&self, account: &AuthAccount) -> User {
        let user = account.to_user();
        self.session.replace(Some(user.clone()));
        info!(user = %user.id, role = ?user.role, "signed in");
        self.publish(IdentityEvent::SignedIn(user.clone()));
        user
    }

    fn publish(&self, event: IdentityEvent) {
        if self.events.receiver_count() == 0 {
            return;
        }
        if let Err(err) = self.events.send(event) {
            warn!(error = %err, "identity event dropped");
        }
    }
}
