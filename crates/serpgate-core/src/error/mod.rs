//! Error types for the provider gateway
//!
//! All fallible gateway operations return [`GatewayResult`]. The error enum
//! carries structured fields (quota limit type and usage, provider status
//! codes, feature names) so callers can branch on error kind instead of
//! inspecting messages.

mod types;
mod user_messages;

pub use types::{GatewayError, GatewayResult, LimitType};
