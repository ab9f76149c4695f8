//! Session issuance and refresh-token rotation.
//!
//! The two services here are constructed explicitly with their dependencies
//! (stores, token service) passed in; there is no ambient container.

mod issuer;
mod rotation;

pub use issuer::{SessionError, SessionIssuer};
pub use rotation::{RotationEngine, TokenPair};

#[cfg(test)]
pub(crate) mod testing;
