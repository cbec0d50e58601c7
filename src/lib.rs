pub mod classify;
pub mod config;
pub mod error;
pub mod fetch;
pub mod gateway;
pub mod models;
pub mod orchestrate;
pub mod output;
pub mod stats;
pub mod store;
