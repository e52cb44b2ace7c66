//! Catalog Ops Admin library.
//!
//! Shopify Admin API client, the cursor-paginated fetch-reduce pipeline and
//! the batch jobs built on it. The `catalog-cli` binary is a thin layer over
//! this crate.
//!
//! # Security
//!
//! This crate holds HIGH PRIVILEGE credentials:
//! - Shopify Admin API (product, collection and content writes)
//! - Claude API (SEO copy generation)
//!
//! Secrets live in `secrecy::SecretString` and are redacted from `Debug`.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod claude;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod services;
pub mod shopify;
