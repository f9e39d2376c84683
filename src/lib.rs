//! Mandi price aggregation library
//!
//! This module exposes the cache, fetchers, aggregation and HTTP layers for
//! the binary and for integration tests.

pub mod aggregate;
pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod export;
pub mod filter;
pub mod geo;
pub mod refresh;
