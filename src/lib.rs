pub mod cli;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod location;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod preferences;
pub mod session;
pub mod store;
pub mod ui;
