//! Harbor container registry check
//!
//! Reports overall and per-component health, replication registry health,
//! project counts and storage usage. Health probing adapts to the Harbor
//! release read from `/api/systeminfo`:
//!
//! | Release   | Health source                                   |
//! |-----------|-------------------------------------------------|
//! | >= 1.8    | `/api/health`, one service check per component  |
//! | 1.5 - 1.7 | `/api/ping`, plus chartmuseum when enabled      |
//! | < 1.5     | reachable systeminfo means healthy              |
//!
//! Registries and volumes are admin-only; a 403 on either skips that part of
//! the run instead of failing it.

pub mod api;
pub mod check;
pub mod config;

pub use api::{HarborApi, HarborVersion};
pub use check::HarborCheck;
pub use config::HarborInstance;

#[cfg(test)]
mod check_tests;
