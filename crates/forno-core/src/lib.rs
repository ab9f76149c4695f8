//! # Forno Core
//!
//! The domain layer of the Forno backend core: refresh-token lifecycle,
//! session issuance, and the rate-limiting port.
//! This crate contains pure business logic with zero infrastructure dependencies.

pub mod domain;
pub mod error;
pub mod ports;
pub mod session;

pub use error::{StoreError, TokenError};
