#![forbid(unsafe_code)]

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod converter;
pub mod error;
pub mod formats;
pub mod logging;
pub mod quality;
pub mod sections;
pub mod source;

pub use quality::evaluate_quality;
pub use sections::parse_sections;
