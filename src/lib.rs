pub mod api;
pub mod config;
pub mod data_models;
pub mod error;
pub mod gemini;
pub mod parser;
pub mod prompt;
pub mod rate_limit;
