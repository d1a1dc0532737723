//! Core conversion pipeline

pub mod config;
pub mod errors;
pub mod extractor;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod templates;
