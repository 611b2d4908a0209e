//! Key management for the encrypted command channel

mod keystore;

pub use keystore::{FileKeyStore, KeyProvider, StaticKey};
