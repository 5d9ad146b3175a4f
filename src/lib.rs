// Core modules
pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod server;
pub mod types;
pub mod users;

// Re-export key types and functions
pub use auth::{AuthError, AuthResult, BearerToken, SessionBinding, SessionService};
pub use client::{ClientError, InstitutionClient};
pub use config::{GateConfig, Institution, Institutions, resolve_config_path};
pub use server::{Gate, build, serve};
pub use types::{InstitutionId, Role, UserId, Username};
