//! goldwatch - resilient multi-source gold price acquisition.
//!
//! Pulls Chinese and international gold quotes from an upstream API when one
//! is available, and falls back to rendering and parsing the source sites
//! directly (SGE, cngold.org, Sina Finance) when it is not. Either path
//! produces the same JSON feed payload, validated before use.

pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod fallback;
pub mod models;
pub mod parsers;
pub mod scrape;
pub mod validate;

pub use error::{Error, Result};
