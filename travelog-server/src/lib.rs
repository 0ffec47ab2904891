pub mod auth;
pub mod error;
pub mod http;
pub mod subsystems;
