//! Catalog Ops Core - Shared types library.
//!
//! This crate provides the types shared by every Catalog Ops component:
//! - `admin` - Shopify Admin API client, fetch-reduce pipeline and batch jobs
//! - `cli` - Command-line entry points for the batch jobs
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Shopify global ids, pipeline records and pages, run reports,
//!   match candidates, SEO metadata rules and URL handles

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
