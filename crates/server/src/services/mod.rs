pub mod auth_service;
pub mod control_service;

pub use auth_service::{AuthService, LoginResult};
pub use control_service::{ControlService, NodeSettings};
