//! Session and identity handling on top of the hosted auth service.

pub mod backend;
pub mod session;

pub use backend::{AccountMetadata, AuthAccount, AuthBackend, AuthError};
pub use session::{IdentityEvent, IdentityProvider, Registration, SessionContext};
