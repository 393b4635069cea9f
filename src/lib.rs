pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod preview;
pub mod prompts;
pub mod routes;
pub mod script;
pub mod store;
pub mod stylesheet;
pub mod telemetry;
pub mod tokens;
pub mod v0;
pub mod validation;
