use crate::encoded::encoded_len;
use crate::engine::{AllocClass, Engine, Offset};
use crate::error::Result;
use crate::input::Input;

/// Minimum size of the scratch buffer the engine writes encoded hash strings into
pub const ENCODED_CAPACITY: usize = 512;

/// Scratch size for an encoded string with these salt and output lengths
///
/// Never below [`ENCODED_CAPACITY`]; grows when long salts or outputs need it.
pub fn encoded_capacity(salt_len: usize, hash_len: usize) -> usize {
    ENCODED_CAPACITY.max(encoded_len(salt_len, hash_len))
}

/// Buffers held inside the engine's memory on behalf of one call
///
/// Every offset handed out is released exactly once: explicitly through
/// [`BufferArena::release`] or when the arena is dropped. Release failures
/// are logged and swallowed so they never replace the call's own outcome.
pub struct BufferArena<'e> {
    engine: &'e dyn Engine,
    held: Vec<Offset>,
}

impl<'e> BufferArena<'e> {
    pub fn new(engine: &'e dyn Engine) -> Self {
        Self {
            engine,
            held: Vec::with_capacity(4),
        }
    }

    /// Allocate a host value: text gets a NUL terminator, bytes are copied as is
    pub fn allocate(&mut self, input: &Input) -> Result<Offset> {
        match input {
            Input::Bytes(bytes) => self.allocate_bytes(bytes),
            Input::Text(text) => self.allocate_text(text),
        }
    }

    pub fn allocate_bytes(&mut self, bytes: &[u8]) -> Result<Offset> {
        let offset = self.engine.allocate(bytes, AllocClass::Normal)?;
        self.held.push(offset);
        Ok(offset)
    }

    pub fn allocate_text(&mut self, text: &str) -> Result<Offset> {
        let mut bytes = zeroize::Zeroizing::new(Vec::with_capacity(text.len() + 1));
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(0);
        self.allocate_bytes(&bytes)
    }

    /// Allocate a zero-filled output buffer of `size` bytes inside the engine
    pub fn allocate_zeroed(&mut self, size: usize) -> Result<Offset> {
        let offset = self.engine.allocate_zeroed(size, AllocClass::Normal)?;
        self.held.push(offset);
        Ok(offset)
    }

    /// Release one offset now. Unknown offsets are ignored.
    pub fn release(&mut self, offset: Offset) {
        if let Some(idx) = self.held.iter().position(|&o| o == offset) {
            self.held.swap_remove(idx);
            self.free(offset);
        }
    }

    /// Release everything still held
    pub fn release_all(&mut self) {
        for offset in std::mem::take(&mut self.held) {
            self.free(offset);
        }
    }

    /// Offsets currently owned by this arena
    pub fn held(&self) -> &[Offset] {
        &self.held
    }

    fn free(&self, offset: Offset) {
        if let Err(e) = self.engine.free(offset) {
            tracing::warn!(offset, error = %e, "Failed to release engine buffer");
        }
    }
}

impl Drop for BufferArena<'_> {
    fn drop(&mut self) {
        self.release_all();
    }
}
