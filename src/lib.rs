//! A Rust SDK for Split, a feature flagging and experimentation platform.
//!
//! # Overview
//!
//! The SDK revolves around a [`Client`] that evaluates feature flags ("splits") for keys. Each
//! evaluation results in a treatment, a string naming the variant the key receives. Evaluation is
//! deterministic: every Split SDK serves the same treatment for the same key, split definition and
//! attributes.
//!
//! Split definitions are kept in a local [`storage::SplitStorage`] by a background
//! [`synchronizer::SplitSynchronizer`] that fetches changes incrementally. Evaluation only reads
//! the local storage and never blocks on the network.
//!
//! ```no_run
//! # use std::time::Duration;
//! # use splitio::ClientConfig;
//! let client = ClientConfig::from_api_key("api-key").to_client();
//! client.start().unwrap();
//! client.block_until_ready(Duration::from_secs(10)).unwrap();
//!
//! let treatment = client.get_treatment(&"user-id".into(), "new_checkout", None);
//! ```
//!
//! # Control treatment
//!
//! When a treatment cannot be determined (unknown split, invalid input, client not ready), the
//! special [`CONTROL`] treatment is returned. Evaluation calls never return errors.
//!
//! # Impressions
//!
//! An [`ImpressionListener`] receives an [`Impression`] for every treatment served, which
//! facilitates tracking which key received which treatment.
//!
//! ```
//! # use splitio::{ClientConfig, Impression};
//! let config = ClientConfig::from_api_key("api-key").impression_listener(|impression: Impression| {
//!   println!("{:?}", impression);
//! });
//! ```
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. They are returned from lifecycle calls only
//! (starting, waiting for readiness, shutting down).
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages with
//! the `splitio` target. Consider integrating a `log`-compatible logger implementation for better
//! visibility into SDK operations.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

pub mod evaluator;
pub mod fetcher;
pub mod hash;
pub mod manager;
pub mod segments;
pub mod splits;
pub mod splitter;
pub mod storage;
pub mod synchronizer;
pub mod validation;

mod attributes;
mod client;
mod config;
mod error;
mod impressions;
mod key;

pub use attributes::{AttributeValue, Attributes};
pub use client::{Client, TreatmentWithConfig};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use evaluator::{Evaluation, Label};
pub use impressions::{Impression, ImpressionListener};
pub use key::Key;
pub use splitter::CONTROL;
