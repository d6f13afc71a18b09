//! # csdi_core
//!
//! Core types shared by the CSDI forecasting data crates.
//!
//! This crate provides:
//! - [`Mode`] for selecting the train/valid/test partition of a series
//! - [`Seed`] for reproducible random draws (conditioning channels, shuffling)
//! - [`CoreError`] and the [`Result`] alias
//!
//! ## Example
//!
//! ```rust
//! use csdi_core::{Mode, Seed};
//!
//! let mode: Mode = "valid".parse().unwrap();
//! assert_eq!(mode, Mode::Valid);
//!
//! let seed = Seed::new(1);
//! let shuffle_seed = seed.derive("train");
//! assert_ne!(seed, shuffle_seed);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod mode;
mod seed;

pub use error::{CoreError, Result};
pub use mode::Mode;
pub use seed::Seed;
