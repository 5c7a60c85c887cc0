//! The engine capability contract
//!
//! An engine owns a flat, byte-addressable memory region. Everything crossing
//! the boundary is addressed by [`Offset`] into that region, the way a
//! compiled Argon2 module exposes its heap. Primitives return `Err(EngineFault)`
//! where such a module would throw.

use crate::error::EngineFault;

/// Argon2 version passed on every hash call (0x13, the reference version)
pub const ARGON2_VERSION: u32 = 0x13;

/// Return code for success
pub const ARGON2_OK: i32 = 0;

/// Return code for an output length above the Argon2 maximum
pub const ARGON2_OUTPUT_TOO_LONG: i32 = -3;

/// Largest output length Argon2 accepts
pub const MAX_HASH_LEN: usize = u32::MAX as usize;

/// Integer handle of a region inside the engine's memory
pub type Offset = u32;

/// Allocation class requested from the engine allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocClass {
    /// Heap allocation, released explicitly with [`Engine::free`]
    #[default]
    Normal = 0,
}

/// Arguments of the raw hash entry point, in engine order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHashArgs {
    pub iterations: u32,
    pub mem_kib: u32,
    pub parallelism: u32,
    pub pwd: Offset,
    pub pwd_len: usize,
    pub salt: Offset,
    pub salt_len: usize,
    pub hash: Offset,
    pub hash_len: usize,
    pub encoded: Offset,
    pub encoded_len: usize,
    pub variant_id: u32,
    pub version: u32,
}

/// A loaded Argon2 engine
///
/// Implementations must be safe to share: every per-call state lives in
/// regions handed out by [`Engine::allocate`].
pub trait Engine: Send + Sync {
    /// Copy `bytes` into a fresh region and return its offset
    fn allocate(&self, bytes: &[u8], class: AllocClass) -> Result<Offset, EngineFault>;

    /// Reserve a zero-filled region of `len` bytes without copying anything in
    ///
    /// Faults when the engine cannot hold `len` more bytes.
    fn allocate_zeroed(&self, len: usize, class: AllocClass) -> Result<Offset, EngineFault>;

    /// Release a region previously returned by [`Engine::allocate`]
    fn free(&self, offset: Offset) -> Result<(), EngineFault>;

    /// Derive a hash; writes the raw output and the NUL-terminated encoded string
    fn hash(&self, args: &RawHashArgs) -> Result<i32, EngineFault>;

    /// Check a password against the NUL-terminated encoded string at `encoded`
    fn verify(
        &self,
        encoded: Offset,
        pwd: Offset,
        pwd_len: usize,
        variant_id: u32,
    ) -> Result<i32, EngineFault>;

    /// Offset of the NUL-terminated message for a return code
    fn error_message(&self, code: i32) -> Result<Offset, EngineFault>;

    /// Run `f` over the whole memory region
    fn with_memory(&self, f: &mut dyn FnMut(&[u8])) -> Result<(), EngineFault>;

    /// Number of regions currently allocated
    fn live_allocations(&self) -> usize;
}

/// Copy `len` bytes starting at `offset`
pub fn read_bytes(engine: &dyn Engine, offset: Offset, len: usize) -> Result<Vec<u8>, EngineFault> {
    let mut out = None;
    engine.with_memory(&mut |memory: &[u8]| {
        out = region(memory, offset, len).map(<[u8]>::to_vec);
    })?;
    out.ok_or_else(|| out_of_bounds(offset, len))
}

/// Read a NUL-terminated string starting at `offset`
pub fn read_c_string(engine: &dyn Engine, offset: Offset) -> Result<String, EngineFault> {
    let mut out = None;
    engine.with_memory(&mut |memory: &[u8]| {
        out = memory.get(offset as usize..).map(|tail| {
            let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
            String::from_utf8_lossy(&tail[..end]).into_owned()
        });
    })?;
    out.ok_or_else(|| out_of_bounds(offset, 1))
}

pub(crate) fn region(memory: &[u8], offset: Offset, len: usize) -> Option<&[u8]> {
    let start = offset as usize;
    memory.get(start..start.checked_add(len)?)
}

pub(crate) fn out_of_bounds(offset: Offset, len: usize) -> EngineFault {
    EngineFault(format!(
        "memory access out of bounds: offset {} length {}",
        offset, len
    ))
}
