use crate::arena::{encoded_capacity, BufferArena};
use crate::engine::{
    read_c_string, region, Engine, RawHashArgs, ARGON2_OK, ARGON2_OUTPUT_TOO_LONG, ARGON2_VERSION,
    MAX_HASH_LEN,
};
use crate::config::AssetLocation;
use crate::error::{Argon2Error, EngineFault, FailureRecord, Result};
use crate::loader::EngineLoader;
use crate::params::{HashParams, HashResult, ResultFields, VerifyParams};
use crate::variant::Variant;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Hash a password with the process-wide engine
///
/// # Example
/// ```rust,no_run
/// use argon2_bridge::{hash, HashParams, ResultFields};
///
/// # async fn run() -> argon2_bridge::Result<()> {
/// let result = hash(
///     HashParams::new("password", "somesalt")
///         .mem_kib(1024)
///         .result(ResultFields::HEX | ResultFields::ENCODED),
/// )
/// .await?;
/// println!("{}", result.encoded.unwrap_or_default());
/// # Ok(())
/// # }
/// ```
pub async fn hash(params: HashParams) -> Result<HashResult> {
    EngineLoader::global().hash(params).await
}

/// Verify a password against an encoded hash with the process-wide engine
pub async fn verify(params: VerifyParams) -> Result<()> {
    EngineLoader::global().verify(params).await
}

/// Clear a failed load of the process-wide engine and load it again
///
/// Returns once the engine is ready. A ready engine is kept as is.
pub async fn retry_load(location: Option<&AssetLocation>) -> Result<()> {
    EngineLoader::global().retry(location).await.map(|_| ())
}

impl EngineLoader {
    /// Hash a password once this loader's engine is ready
    pub async fn hash(&self, params: HashParams) -> Result<HashResult> {
        let engine = self.ensure_ready(params.asset_location.as_ref()).await?;
        hash_with(engine.as_ref(), &params)
    }

    /// Verify a password once this loader's engine is ready
    ///
    /// Resolves with `()` on a match; a mismatch is a [`Argon2Error::Failure`].
    pub async fn verify(&self, params: VerifyParams) -> Result<()> {
        let engine = self.ensure_ready(params.asset_location.as_ref()).await?;
        verify_with(engine.as_ref(), &params)
    }
}

/// One hash call against a ready engine
///
/// All four buffers are released before returning, on every path. Output
/// lengths above the Argon2 maximum fail before anything is allocated.
pub fn hash_with(engine: &dyn Engine, params: &HashParams) -> Result<HashResult> {
    let hash_len = params.resolved_hash_len();
    if hash_len > MAX_HASH_LEN {
        return Err(compute_failure(engine, ARGON2_OUTPUT_TOO_LONG));
    }

    let mut arena = BufferArena::new(engine);
    let encoded_len = encoded_capacity(params.salt.len(), hash_len);
    let args = RawHashArgs {
        iterations: params.resolved_iterations(),
        mem_kib: params.resolved_mem_kib(),
        parallelism: params.resolved_parallelism(),
        pwd: arena.allocate(&params.pass)?,
        pwd_len: params.pass.len(),
        salt: arena.allocate(&params.salt)?,
        salt_len: params.salt.len(),
        hash: arena.allocate_zeroed(hash_len)?,
        hash_len,
        encoded: arena.allocate_zeroed(encoded_len)?,
        encoded_len,
        variant_id: params.variant.unwrap_or_default().id(),
        version: ARGON2_VERSION,
    };

    let outcome = match engine.hash(&args) {
        Ok(ARGON2_OK) => extract_result(engine, &args, params.result),
        Ok(code) => Err(compute_failure(engine, code)),
        Err(fault) => Err(engine_fault_failure(fault)),
    };

    arena.release_all();
    outcome
}

/// One verify call against a ready engine
pub fn verify_with(engine: &dyn Engine, params: &VerifyParams) -> Result<()> {
    let mut arena = BufferArena::new(engine);

    let pwd = arena.allocate(&params.pass)?;
    let encoded = arena.allocate_text(&params.encoded)?;
    let variant = params
        .variant
        .unwrap_or_else(|| Variant::resolve(&params.encoded));

    let outcome = match engine.verify(encoded, pwd, params.pass.len(), variant.id()) {
        Ok(ARGON2_OK) => Ok(()),
        Ok(code) => Err(compute_failure(engine, code)),
        Err(fault) => Err(engine_fault_failure(fault)),
    };

    arena.release_all();
    outcome
}

/// Copy the requested fields out of engine memory
///
/// The raw bytes and their hex form are produced in the same pass.
fn extract_result(engine: &dyn Engine, args: &RawHashArgs, fields: ResultFields) -> Result<HashResult> {
    let mut raw = Vec::with_capacity(args.hash_len);
    let mut hex = String::with_capacity(if fields.hex { args.hash_len * 2 } else { 0 });
    let mut encoded = None;
    let mut in_bounds = false;

    engine.with_memory(&mut |memory: &[u8]| {
        let Some(output) = region(memory, args.hash, args.hash_len) else {
            return;
        };
        for &byte in output {
            raw.push(byte);
            if fields.hex {
                hex.push(HEX_DIGITS[(byte >> 4) as usize] as char);
                hex.push(HEX_DIGITS[(byte & 0x0f) as usize] as char);
            }
        }
        if fields.encoded {
            encoded = region(memory, args.encoded, args.encoded_len).map(|scratch| {
                let end = scratch.iter().position(|&b| b == 0).unwrap_or(scratch.len());
                String::from_utf8_lossy(&scratch[..end]).into_owned()
            });
        }
        in_bounds = true;
    })?;

    if !in_bounds || (fields.encoded && encoded.is_none()) {
        return Err(Argon2Error::Engine(
            "Hash output lies outside engine memory".to_string(),
        ));
    }

    Ok(HashResult {
        raw: fields.raw.then_some(raw),
        hex: fields.hex.then_some(hex),
        encoded,
    })
}

/// Build the failure for a non-zero return code
///
/// A failing message lookup leaves the message empty.
fn compute_failure(engine: &dyn Engine, code: i32) -> Argon2Error {
    let message = engine
        .error_message(code)
        .and_then(|offset| read_c_string(engine, offset))
        .ok();
    tracing::debug!(code, message = message.as_deref().unwrap_or(""), "Argon2 call failed");
    Argon2Error::Failure(FailureRecord {
        message,
        code: Some(code),
    })
}

fn engine_fault_failure(fault: EngineFault) -> Argon2Error {
    tracing::debug!(error = %fault, "Argon2 engine faulted");
    Argon2Error::Failure(FailureRecord {
        message: Some(fault.0),
        code: None,
    })
}
