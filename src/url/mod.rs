//! URL handling module for Sumi-Sweep
//!
//! This module provides URL normalization, host extraction and the
//! authoritative [`UriCollection`] a crawl is scoped to.

mod collection;
mod domain;
mod normalize;

pub use collection::UriCollection;
pub use domain::{authority, extract_domain};
pub use normalize::normalize_url;
