//! Refresh-token store implementations.

mod memory;

pub use memory::InMemoryTokenStore;
