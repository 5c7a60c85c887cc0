//! argon2-bridge - Async Argon2 hashing over an offset-addressed engine
//!
//! The key derivation itself is done by an engine treated as a black box.
//! This crate is the layer around it:
//! - Loading the engine once and sharing it between callers
//! - Copying passwords and salts into engine memory, results back out
//! - Inferring the Argon2 variant from encoded hash strings
//! - Releasing every engine buffer on every exit path
//!
//! # Architecture
//! - `engine`: The engine capability contract (`Engine` trait)
//! - `native`: In-process engine backed by the `argon2` crate
//! - `loader`: One-time shared engine loading (`EngineLoader`)
//! - `arena`: Per-call engine buffer ownership (`BufferArena`)
//! - `ops`: The hash and verify operations
//! - `variant`: Argon2 variants and variant inference
//! - `encoded`: Encoded hash string format
//! - `params`: Call parameters and results
//! - `config`: Asset locations and the engine manifest
//! - `ffi`: Python bindings (feature `python`)
//!
//! # Example
//! ```rust,no_run
//! use argon2_bridge::{hash, verify, HashParams, ResultFields, VerifyParams};
//!
//! # async fn run() -> argon2_bridge::Result<()> {
//! let result = hash(HashParams::new("password", "somesalt").result(ResultFields::ENCODED)).await?;
//! let encoded = result.encoded.unwrap_or_default();
//!
//! verify(VerifyParams::new("password", encoded)).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod input;
pub mod variant;
pub mod encoded;
pub mod engine;
pub mod config;
pub mod native;
pub mod arena;
pub mod loader;
pub mod params;
pub mod ops;
#[cfg(feature = "python")]
pub mod ffi;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use error::{Argon2Error, EngineFault, FailureRecord, Result};
pub use input::Input;
pub use variant::Variant;
pub use engine::{Engine, Offset, ARGON2_VERSION};
pub use config::{AssetLocation, EngineConfig};
pub use native::NativeEngine;
pub use arena::{BufferArena, ENCODED_CAPACITY};
pub use loader::{EngineLoader, EngineSource, NativeSource};
pub use params::{HashParams, HashResult, ResultFields, VerifyParams};
pub use ops::{hash, retry_load, verify};
