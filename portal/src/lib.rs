//! Lectern portal access: CAS login and MyMedia harvesting.
pub mod auth;
pub mod html;
pub mod scrape;

pub use auth::{provider_from_config, CasAuthenticator, EnvCredentials, PromptCredentials};
pub use scrape::MyMediaHarvester;
