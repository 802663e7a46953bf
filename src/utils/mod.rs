//! Utility functions and helpers
//!
//! Hashing, base58, ECDSA P-256 helpers and the bincode wrappers used for
//! every on-disk encoding.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, new_key_pair, public_key_from_pkcs8, ripemd160_digest,
    sha256_digest, P256_COORDINATE_LEN,
};

pub use serialization::{deserialize, serialize};
