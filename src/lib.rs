pub mod assistant;
pub mod config;
pub mod error;
pub mod generator;
pub mod health;
pub mod llm;
pub mod memory;
pub mod registry;
pub mod router;
pub mod schema;
pub mod timeparse;
pub mod validator;
pub mod warehouse;
