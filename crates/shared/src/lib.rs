//! Shared configuration and error types for SmartHub.
//!
//! This crate provides the pieces every other crate agrees on:
//! - Application configuration (server, S3 client, scratch storage)
//! - Application-wide error types with HTTP status mapping

pub mod config;
pub mod error;

pub use config::{AppConfig, S3Config, ServerConfig, StorageConfig};
pub use error::{AppError, AppResult};
