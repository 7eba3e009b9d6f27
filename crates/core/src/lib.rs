//! Core storage logic for Smarthub.
//!
//! This crate has no web dependencies. It defines the storage domain types,
//! the repository capability trait, the S3 repository, and the service that
//! dispatches requests by storage type.

pub mod storage;
