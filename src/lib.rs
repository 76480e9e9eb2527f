pub mod assets;
pub mod config;
pub mod errors;

// Reconciliation core: playlist parsing, guide decoding, channel matching
pub mod ingestor;
pub mod models;
pub mod proxy;
pub mod services;
pub mod sources;
pub mod utils;
pub mod web;
