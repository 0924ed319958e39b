//! Gateway settings

pub mod loader;
pub mod schema;
pub mod validator;

pub use loader::SettingsLoader;
pub use schema::GatewaySettings;
pub use validator::SettingsValidator;
