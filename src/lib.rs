//! Tag-driven photo albums.
//!
//! Images get tag suggestions from a label detector; albums are tag queries
//! whose member set is re-derived whenever tags change; a free-text prompt
//! can be ranked against a label vocabulary to pick an album's tags.

pub mod analytics;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod gallery;
pub mod labels;
pub mod logging;
pub mod models;
pub mod ranking;
pub mod reconcile;
pub mod storage;
pub mod tags;

pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use gallery::{Gallery, PromptUpdate, Upload};
