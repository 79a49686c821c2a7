//! Session management
//!
//! The session manager, its persisted credential copy, and the wire types
//! exchanged with the identity endpoint.

pub mod manager;
pub mod storage;
pub mod types;

pub use manager::SessionManager;
pub use storage::CredentialStorage;
pub use types::*;
