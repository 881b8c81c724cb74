//! Academic portal workflows: thesis proposals, seminars, defenses and internships.

pub mod config;
pub mod documents;
pub mod error;
pub mod identity;
pub mod notifications;
pub mod records;
pub mod telemetry;
pub mod workflows;
