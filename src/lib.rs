//! Coupon-link resolution and automatic course enrollment.
//!
//! Candidate links from the feed are resolved through per-source strategies
//! into canonical course URLs carrying a discount code, then a browser
//! session enrolls into each resolved course, guarded by an append-only
//! outcome ledger.

pub mod browser;
pub mod cache;
pub mod config;
pub mod enroll;
pub mod error;
pub mod feed;
pub mod http_client;
pub mod ledger;
pub mod models;
pub mod normalizer;
pub mod notify;
pub mod pipeline;
pub mod sources;
