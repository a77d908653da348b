pub mod aggregator;
pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod realtime;
pub mod utils;
pub mod web;

pub use error::{Error, Result};

#[cfg(test)]
pub mod tests;
