//! REDCap API access for calcsync.
//!
//! Consumers depend on the [`RedcapApi`] trait; [`RedcapClient`] is the HTTP
//! implementation.

pub mod api;
pub mod client;
pub mod error;

pub use api::{RedcapApi, find_field};
pub use client::RedcapClient;
pub use error::{RedcapError, Result};
