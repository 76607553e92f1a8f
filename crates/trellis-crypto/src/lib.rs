//! Cryptographic primitives for Trellis plugin verification.
//!
//! This crate provides:
//! - Ed25519 key pairs for signing scaffolded plugins
//! - Detached signature parsing and verification for plugin entry files
//! - BLAKE3 content hashing for install directory suffixes and check reports
//!
//! # Example
//!
//! ```
//! use trellis_crypto::{ContentHash, KeyPair};
//!
//! let keypair = KeyPair::generate();
//!
//! let entry = b"#!/bin/sh\necho ok\n";
//! let signature = keypair.sign(entry);
//! assert!(keypair.verify(entry, &signature).is_ok());
//!
//! let hash = ContentHash::hash(b"1.2.3");
//! assert_eq!(hash.short_hex(8).len(), 8);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod hash;
mod keypair;
mod signature;

pub use error::{CryptoError, CryptoResult};
pub use hash::ContentHash;
pub use keypair::{KeyPair, PublicKey};
pub use signature::Signature;
