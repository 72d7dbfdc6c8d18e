pub mod auth;
pub mod error_handling;

pub use auth::{AuthedUser, JwtAuthMiddleware};
