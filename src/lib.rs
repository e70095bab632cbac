pub mod api;
pub mod classifier;
pub mod clients;
pub mod config;
pub mod consumer;
pub mod error;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod utils;
