//! Feed harvester library.
//!
//! Harvests search-result feed posts and their virtualized comment threads
//! from a live browser session and stores them idempotently in SQLite.

// Allow raw string hashes for safety - they're harmless and prevent issues if content changes
#![allow(clippy::needless_raw_string_hashes)]

pub mod browser;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod harvest;
pub mod timestamp;
