//! Lectern shared library.
//!
//! Register model, identity matching, reconciliation, persistence and the
//! collaborator seams used by the harvester and downloader binaries.
pub mod auth;
pub mod config;
pub mod errors;
pub mod harvest;
pub mod matcher;
pub mod models;
pub mod reconcile;
pub mod register;
