pub mod dispatcher;

pub use dispatcher::{NotificationDispatcher, NotificationError, DEFENSE_INVITATION_SUBJECT};
