//! Session credentials and their persistence.
//!
//! This module provides:
//! - `CredentialStore`: keyed storage backends (memory, JSON file, OS keychain, mirrored)
//! - `SessionCredentials`: the access and renewal credentials currently in force
//! - `RenewalSlot`: the single in-flight access-credential renewal

pub mod credentials;
pub mod renewal;
pub mod session;

pub use credentials::{
    platform_store, CredentialStore, FileStore, KeyringStore, MemoryStore, MirroredStore,
    StorageKey, StoreError,
};
pub use renewal::{Claim, RenewalOutcome, RenewalSlot};
pub use session::SessionCredentials;
