//! In-process engine backed by the `argon2` crate
//!
//! Buffers live in a growable linear memory addressed by offset. Compute
//! calls copy their inputs out under the memory lock, derive without holding
//! it, then copy the results back in.

use crate::config::EngineConfig;
use crate::encoded::EncodedHash;
use crate::engine::{
    out_of_bounds, region, AllocClass, Engine, Offset, RawHashArgs, ARGON2_OK,
    ARGON2_OUTPUT_TOO_LONG, ARGON2_VERSION,
};
use crate::error::EngineFault;
use crate::variant::Variant;
use argon2::{Argon2, Params, Version};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

// Reference Argon2 return codes produced by this engine
pub const ARGON2_OUTPUT_TOO_SHORT: i32 = -2;
pub const ARGON2_PWD_TOO_LONG: i32 = -5;
pub const ARGON2_SALT_TOO_SHORT: i32 = -6;
pub const ARGON2_SALT_TOO_LONG: i32 = -7;
pub const ARGON2_TIME_TOO_SMALL: i32 = -12;
pub const ARGON2_MEMORY_TOO_LITTLE: i32 = -14;
pub const ARGON2_MEMORY_TOO_MUCH: i32 = -15;
pub const ARGON2_LANES_TOO_FEW: i32 = -16;
pub const ARGON2_LANES_TOO_MANY: i32 = -17;
pub const ARGON2_INCORRECT_PARAMETER: i32 = -25;
pub const ARGON2_INCORRECT_TYPE: i32 = -26;
pub const ARGON2_ENCODING_FAIL: i32 = -31;
pub const ARGON2_DECODING_FAIL: i32 = -32;
pub const ARGON2_VERIFY_MISMATCH: i32 = -35;

const ERROR_MESSAGES: &[(i32, &str)] = &[
    (ARGON2_OK, "OK"),
    (ARGON2_OUTPUT_TOO_SHORT, "Output is too short"),
    (ARGON2_OUTPUT_TOO_LONG, "Output is too long"),
    (ARGON2_PWD_TOO_LONG, "Password is too long"),
    (ARGON2_SALT_TOO_SHORT, "Salt is too short"),
    (ARGON2_SALT_TOO_LONG, "Salt is too long"),
    (ARGON2_TIME_TOO_SMALL, "Time cost is too small"),
    (ARGON2_MEMORY_TOO_LITTLE, "Memory cost is too small"),
    (ARGON2_MEMORY_TOO_MUCH, "Memory cost is too large"),
    (ARGON2_LANES_TOO_FEW, "Too few lanes"),
    (ARGON2_LANES_TOO_MANY, "Too many lanes"),
    (ARGON2_INCORRECT_PARAMETER, "Incorrect parameter"),
    (ARGON2_INCORRECT_TYPE, "There is no such version of Argon2"),
    (ARGON2_ENCODING_FAIL, "Encoding failed"),
    (ARGON2_DECODING_FAIL, "Decoding failed"),
    (ARGON2_VERIFY_MISMATCH, "The password does not match the supplied hash"),
];

const UNKNOWN_ERROR: &str = "Unknown error code";

// Offset 0 stays unused so no region ever starts at the null offset
const NULL_GUARD: usize = 8;
const ALIGN: usize = 8;
const PAGE: usize = 64 * 1024;

fn align_up(n: usize) -> Option<usize> {
    Some(n.checked_add(ALIGN - 1)? & !(ALIGN - 1))
}

/// Linear memory with a first-fit allocator
struct LinearMemory {
    bytes: Vec<u8>,
    capacity: usize,
    top: usize,
    live: BTreeMap<Offset, usize>,
    free: Vec<(Offset, usize)>,
}

impl LinearMemory {
    fn new(capacity: usize) -> Self {
        Self {
            bytes: Vec::new(),
            capacity,
            top: NULL_GUARD,
            live: BTreeMap::new(),
            free: Vec::new(),
        }
    }

    /// Reserve a zeroed block of at least `len` bytes
    ///
    /// Freed blocks are wiped on release and fresh pages start zeroed.
    fn reserve(&mut self, len: usize) -> Result<Offset, EngineFault> {
        let size = align_up(len.max(1))
            .filter(|&size| size <= self.capacity)
            .ok_or_else(|| {
                EngineFault(format!(
                    "Cannot enlarge memory: {} bytes requested, limit {}",
                    len, self.capacity
                ))
            })?;

        if let Some(idx) = self.free.iter().position(|&(_, free_len)| free_len >= size) {
            let (offset, free_len) = self.free.swap_remove(idx);
            if free_len > size {
                self.free.push((offset + size as Offset, free_len - size));
            }
            self.live.insert(offset, size);
            return Ok(offset);
        }

        let end = self
            .top
            .checked_add(size)
            .filter(|&end| end <= self.capacity && end <= Offset::MAX as usize)
            .ok_or_else(|| {
                EngineFault(format!(
                    "Cannot enlarge memory: {} bytes requested, {} of {} in use",
                    size, self.top, self.capacity
                ))
            })?;
        if end > self.bytes.len() {
            let grown = (end.div_ceil(PAGE) * PAGE).min(self.capacity);
            self.bytes.resize(grown, 0);
        }
        let offset = self.top as Offset;
        self.top = end;
        self.live.insert(offset, size);
        Ok(offset)
    }

    /// Allocate a static block that is never freed
    fn reserve_static(&mut self, data: &[u8]) -> Result<Offset, EngineFault> {
        let offset = self.reserve(data.len())?;
        self.live.remove(&offset);
        self.write(offset, data)?;
        Ok(offset)
    }

    fn release(&mut self, offset: Offset) -> Result<(), EngineFault> {
        let size = self
            .live
            .remove(&offset)
            .ok_or_else(|| EngineFault(format!("free(): invalid pointer {}", offset)))?;
        let start = offset as usize;
        self.bytes[start..start + size].zeroize();
        self.free.push((offset, size));
        Ok(())
    }

    fn read(&self, offset: Offset, len: usize) -> Result<&[u8], EngineFault> {
        region(&self.bytes, offset, len).ok_or_else(|| out_of_bounds(offset, len))
    }

    fn read_c_string(&self, offset: Offset) -> Result<Zeroizing<Vec<u8>>, EngineFault> {
        let tail = self
            .bytes
            .get(offset as usize..)
            .ok_or_else(|| out_of_bounds(offset, 1))?;
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        Ok(Zeroizing::new(tail[..end].to_vec()))
    }

    fn write(&mut self, offset: Offset, data: &[u8]) -> Result<(), EngineFault> {
        let start = offset as usize;
        let dest = start
            .checked_add(data.len())
            .and_then(|end| self.bytes.get_mut(start..end))
            .ok_or_else(|| out_of_bounds(offset, data.len()))?;
        dest.copy_from_slice(data);
        Ok(())
    }
}

/// Argon2 engine running in this process
pub struct NativeEngine {
    config: EngineConfig,
    memory: Mutex<LinearMemory>,
    messages: HashMap<i32, Offset>,
    unknown_message: Offset,
}

impl NativeEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineFault> {
        let mut memory = LinearMemory::new(config.memory_bytes);

        // Error table lives in the static data segment
        let mut messages = HashMap::with_capacity(ERROR_MESSAGES.len());
        for &(code, text) in ERROR_MESSAGES {
            messages.insert(code, memory.reserve_static(&c_string(text))?);
        }
        let unknown_message = memory.reserve_static(&c_string(UNKNOWN_ERROR))?;

        Ok(Self {
            config,
            memory: Mutex::new(memory),
            messages,
            unknown_message,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn memory(&self) -> Result<MutexGuard<'_, LinearMemory>, EngineFault> {
        self.memory
            .lock()
            .map_err(|_| EngineFault::new("engine memory lock poisoned"))
    }

    /// Run the derivation into a fresh buffer of `hash_len` bytes
    fn derive(
        &self,
        variant: Variant,
        version: u32,
        costs: (u32, u32, u32),
        pwd: &[u8],
        salt: &[u8],
        hash_len: usize,
    ) -> Result<Zeroizing<Vec<u8>>, i32> {
        let (mem_kib, iterations, parallelism) = costs;
        let version = match version {
            0x10 => Version::V0x10,
            ARGON2_VERSION => Version::V0x13,
            _ => return Err(ARGON2_INCORRECT_PARAMETER),
        };
        if mem_kib > self.config.max_mem_kib {
            return Err(ARGON2_MEMORY_TOO_MUCH);
        }
        if u32::try_from(hash_len).is_err() {
            return Err(ARGON2_OUTPUT_TOO_LONG);
        }

        let params = Params::new(mem_kib, iterations, parallelism, Some(hash_len))
            .map_err(argon2_error_code)?;
        let mut out = Zeroizing::new(vec![0u8; hash_len]);
        Argon2::new(variant.into(), version, params)
            .hash_password_into(pwd, salt, &mut out)
            .map_err(argon2_error_code)?;
        Ok(out)
    }

    fn compute_hash(
        &self,
        args: &RawHashArgs,
        pwd: &[u8],
        salt: &[u8],
    ) -> Result<(Zeroizing<Vec<u8>>, String), i32> {
        let variant = Variant::from_id(args.variant_id).ok_or(ARGON2_INCORRECT_TYPE)?;
        let costs = (args.mem_kib, args.iterations, args.parallelism);
        let out = self.derive(variant, args.version, costs, pwd, salt, args.hash_len)?;

        let encoded = EncodedHash {
            variant,
            version: args.version,
            mem_kib: args.mem_kib,
            iterations: args.iterations,
            parallelism: args.parallelism,
            salt: salt.to_vec(),
            hash: out.clone(),
        }
        .to_string();

        if encoded.len() >= args.encoded_len {
            return Err(ARGON2_ENCODING_FAIL);
        }
        Ok((out, encoded))
    }

    fn compute_verify(&self, encoded: &[u8], pwd: &[u8], variant_id: u32) -> i32 {
        let Some(variant) = Variant::from_id(variant_id) else {
            return ARGON2_INCORRECT_TYPE;
        };
        let Some(decoded) = std::str::from_utf8(encoded)
            .ok()
            .and_then(|encoded| EncodedHash::decode(encoded, variant))
        else {
            return ARGON2_DECODING_FAIL;
        };

        let costs = (decoded.mem_kib, decoded.iterations, decoded.parallelism);
        match self.derive(variant, decoded.version, costs, pwd, &decoded.salt, decoded.hash.len()) {
            Ok(out) if bool::from(out.as_slice().ct_eq(decoded.hash.as_slice())) => ARGON2_OK,
            Ok(_) => ARGON2_VERIFY_MISMATCH,
            Err(code) => code,
        }
    }
}

impl Engine for NativeEngine {
    fn allocate(&self, bytes: &[u8], _class: AllocClass) -> Result<Offset, EngineFault> {
        let mut memory = self.memory()?;
        let offset = memory.reserve(bytes.len())?;
        memory.write(offset, bytes)?;
        Ok(offset)
    }

    fn allocate_zeroed(&self, len: usize, _class: AllocClass) -> Result<Offset, EngineFault> {
        self.memory()?.reserve(len)
    }

    fn free(&self, offset: Offset) -> Result<(), EngineFault> {
        self.memory()?.release(offset)
    }

    fn hash(&self, args: &RawHashArgs) -> Result<i32, EngineFault> {
        let (pwd, salt) = {
            let memory = self.memory()?;
            // Output regions must exist before any work is done
            memory.read(args.hash, args.hash_len)?;
            memory.read(args.encoded, args.encoded_len)?;
            (
                Zeroizing::new(memory.read(args.pwd, args.pwd_len)?.to_vec()),
                memory.read(args.salt, args.salt_len)?.to_vec(),
            )
        };

        match self.compute_hash(args, &pwd, &salt) {
            Ok((out, encoded)) => {
                let mut memory = self.memory()?;
                memory.write(args.hash, &out)?;
                memory.write(args.encoded, &c_string(&encoded))?;
                Ok(ARGON2_OK)
            }
            Err(code) => Ok(code),
        }
    }

    fn verify(
        &self,
        encoded: Offset,
        pwd: Offset,
        pwd_len: usize,
        variant_id: u32,
    ) -> Result<i32, EngineFault> {
        let (encoded, pwd) = {
            let memory = self.memory()?;
            (
                memory.read_c_string(encoded)?,
                Zeroizing::new(memory.read(pwd, pwd_len)?.to_vec()),
            )
        };
        Ok(self.compute_verify(&encoded, &pwd, variant_id))
    }

    fn error_message(&self, code: i32) -> Result<Offset, EngineFault> {
        Ok(self
            .messages
            .get(&code)
            .copied()
            .unwrap_or(self.unknown_message))
    }

    fn with_memory(&self, f: &mut dyn FnMut(&[u8])) -> Result<(), EngineFault> {
        let memory = self.memory()?;
        f(&memory.bytes);
        Ok(())
    }

    fn live_allocations(&self) -> usize {
        self.memory().map(|memory| memory.live.len()).unwrap_or(0)
    }
}

fn c_string(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() + 1);
    bytes.extend_from_slice(text.as_bytes());
    bytes.push(0);
    bytes
}

fn argon2_error_code(err: argon2::Error) -> i32 {
    match err {
        argon2::Error::OutputTooShort => ARGON2_OUTPUT_TOO_SHORT,
        argon2::Error::OutputTooLong => ARGON2_OUTPUT_TOO_LONG,
        argon2::Error::PwdTooLong => ARGON2_PWD_TOO_LONG,
        argon2::Error::SaltTooShort => ARGON2_SALT_TOO_SHORT,
        argon2::Error::SaltTooLong => ARGON2_SALT_TOO_LONG,
        argon2::Error::TimeTooSmall => ARGON2_TIME_TOO_SMALL,
        argon2::Error::MemoryTooLittle => ARGON2_MEMORY_TOO_LITTLE,
        argon2::Error::MemoryTooMuch => ARGON2_MEMORY_TOO_MUCH,
        argon2::Error::ThreadsTooFew => ARGON2_LANES_TOO_FEW,
        argon2::Error::ThreadsTooMany => ARGON2_LANES_TOO_MANY,
        _ => ARGON2_INCORRECT_PARAMETER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{read_bytes, read_c_string};

    fn engine() -> NativeEngine {
        NativeEngine::new(EngineConfig::default()).unwrap()
    }

    fn raw_args(engine: &NativeEngine, pwd: &[u8], salt: &[u8], hash_len: usize) -> RawHashArgs {
        RawHashArgs {
            iterations: 1,
            mem_kib: 1024,
            parallelism: 1,
            pwd: engine.allocate(pwd, AllocClass::Normal).unwrap(),
            pwd_len: pwd.len(),
            salt: engine.allocate(salt, AllocClass::Normal).unwrap(),
            salt_len: salt.len(),
            hash: engine.allocate(&vec![0u8; hash_len], AllocClass::Normal).unwrap(),
            hash_len,
            encoded: engine.allocate(&[0u8; 512], AllocClass::Normal).unwrap(),
            encoded_len: 512,
            variant_id: Variant::Argon2d.id(),
            version: ARGON2_VERSION,
        }
    }

    #[test]
    fn test_allocations_do_not_overlap() {
        let engine = engine();
        let a = engine.allocate(b"first", AllocClass::Normal).unwrap();
        let b = engine.allocate(b"second!", AllocClass::Normal).unwrap();
        assert_ne!(a, 0);
        assert!(b as usize >= a as usize + 5);
        assert_eq!(read_bytes(&engine, a, 5).unwrap(), b"first");
        assert_eq!(read_bytes(&engine, b, 7).unwrap(), b"second!");
        assert_eq!(engine.live_allocations(), 2);
    }

    #[test]
    fn test_free_wipes_and_reuses() {
        let engine = engine();
        let a = engine.allocate(b"secret-bytes", AllocClass::Normal).unwrap();
        engine.free(a).unwrap();
        assert_eq!(engine.live_allocations(), 0);
        assert_eq!(read_bytes(&engine, a, 12).unwrap(), vec![0u8; 12]);

        // First-fit hands the wiped block out again
        let b = engine.allocate(b"reused", AllocClass::Normal).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_double_free_faults() {
        let engine = engine();
        let a = engine.allocate(b"x", AllocClass::Normal).unwrap();
        engine.free(a).unwrap();
        assert!(engine.free(a).is_err());
    }

    #[test]
    fn test_memory_exhaustion_faults() {
        let engine = NativeEngine::new(EngineConfig {
            memory_bytes: 4096,
            ..EngineConfig::default()
        })
        .unwrap();
        let result = engine.allocate(&vec![1u8; 8192], AllocClass::Normal);
        assert!(result.is_err());
    }

    #[test]
    fn test_hash_writes_output_and_encoded() {
        let engine = engine();
        let args = raw_args(&engine, b"password", b"somesalt", 24);

        assert_eq!(engine.hash(&args).unwrap(), ARGON2_OK);

        let raw = read_bytes(&engine, args.hash, 24).unwrap();
        let mut expected = [0u8; 24];
        Argon2::new(
            argon2::Algorithm::Argon2d,
            Version::V0x13,
            Params::new(1024, 1, 1, Some(24)).unwrap(),
        )
        .hash_password_into(b"password", b"somesalt", &mut expected)
        .unwrap();
        assert_eq!(raw, expected);

        let encoded = read_c_string(&engine, args.encoded).unwrap();
        assert!(encoded.starts_with("$argon2d$v=19$m=1024,t=1,p=1$c29tZXNhbHQ$"));
    }

    #[test]
    fn test_hash_short_salt_code() {
        let engine = engine();
        let args = raw_args(&engine, b"password", b"salt", 24);
        assert_eq!(engine.hash(&args).unwrap(), ARGON2_SALT_TOO_SHORT);
    }

    #[test]
    fn test_hash_unknown_variant_code() {
        let engine = engine();
        let mut args = raw_args(&engine, b"password", b"somesalt", 24);
        args.variant_id = 7;
        assert_eq!(engine.hash(&args).unwrap(), ARGON2_INCORRECT_TYPE);
    }

    #[test]
    fn test_hash_memory_cap_code() {
        let engine = NativeEngine::new(EngineConfig {
            max_mem_kib: 512,
            ..EngineConfig::default()
        })
        .unwrap();
        let args = raw_args(&engine, b"password", b"somesalt", 24);
        assert_eq!(engine.hash(&args).unwrap(), ARGON2_MEMORY_TOO_MUCH);
    }

    #[test]
    fn test_hash_out_of_bounds_faults() {
        let engine = engine();
        let mut args = raw_args(&engine, b"password", b"somesalt", 24);
        args.pwd = u32::MAX - 4;
        assert!(engine.hash(&args).is_err());
    }

    #[test]
    fn test_verify_codes() {
        let engine = engine();
        let args = raw_args(&engine, b"password", b"somesalt", 24);
        assert_eq!(engine.hash(&args).unwrap(), ARGON2_OK);
        let encoded = read_c_string(&engine, args.encoded).unwrap();
        let enc = engine.allocate(&c_string(&encoded), AllocClass::Normal).unwrap();

        let good = engine.allocate(b"password", AllocClass::Normal).unwrap();
        let bad = engine.allocate(b"passwore", AllocClass::Normal).unwrap();
        let d = Variant::Argon2d.id();

        assert_eq!(engine.verify(enc, good, 8, d).unwrap(), ARGON2_OK);
        assert_eq!(engine.verify(enc, bad, 8, d).unwrap(), ARGON2_VERIFY_MISMATCH);
        // Variant disagreeing with the encoded tag fails to decode
        assert_eq!(
            engine.verify(enc, good, 8, Variant::Argon2i.id()).unwrap(),
            ARGON2_DECODING_FAIL
        );

        let garbage = engine.allocate(&c_string("$argon2d$nonsense"), AllocClass::Normal).unwrap();
        assert_eq!(engine.verify(garbage, good, 8, d).unwrap(), ARGON2_DECODING_FAIL);
    }

    #[test]
    fn test_output_and_salt_lengths_round_trip() {
        let engine = engine();
        let long_salt = [0x5au8; 64];
        let cases: [(&[u8], usize); 6] = [
            (b"somesalt", 4),
            (b"somesalt", 8),
            (b"somesalt", 65),
            (b"somesalt", 128),
            (&long_salt, 24),
            (&long_salt, 128),
        ];
        for (salt, hash_len) in cases {
            let args = raw_args(&engine, b"password", salt, hash_len);
            assert_eq!(engine.hash(&args).unwrap(), ARGON2_OK, "hash_len {}", hash_len);
            assert_eq!(read_bytes(&engine, args.hash, hash_len).unwrap().len(), hash_len);

            let encoded = read_c_string(&engine, args.encoded).unwrap();
            let enc = engine.allocate(&c_string(&encoded), AllocClass::Normal).unwrap();
            let pwd = engine.allocate(b"password", AllocClass::Normal).unwrap();
            assert_eq!(
                engine.verify(enc, pwd, 8, Variant::Argon2d.id()).unwrap(),
                ARGON2_OK,
                "{}",
                encoded
            );
        }
    }

    #[test]
    fn test_verify_reads_implicit_version() {
        let engine = engine();
        let mut args = raw_args(&engine, b"password", b"somesalt", 16);
        args.version = 0x10;
        assert_eq!(engine.hash(&args).unwrap(), ARGON2_OK);

        let encoded = read_c_string(&engine, args.encoded).unwrap();
        assert!(encoded.starts_with("$argon2d$v=16$"));
        let without_version = encoded.replacen("$v=16", "", 1);
        let enc = engine
            .allocate(&c_string(&without_version), AllocClass::Normal)
            .unwrap();
        let pwd = engine.allocate(b"password", AllocClass::Normal).unwrap();
        assert_eq!(engine.verify(enc, pwd, 8, Variant::Argon2d.id()).unwrap(), ARGON2_OK);
    }

    #[test]
    fn test_encoded_scratch_too_small_code() {
        let engine = engine();
        let mut args = raw_args(&engine, b"password", b"somesalt", 24);
        args.encoded_len = 16;
        assert_eq!(engine.hash(&args).unwrap(), ARGON2_ENCODING_FAIL);
    }

    #[test]
    fn test_zeroed_allocation_limits() {
        let engine = NativeEngine::new(EngineConfig {
            memory_bytes: 64 * 1024,
            ..EngineConfig::default()
        })
        .unwrap();
        assert!(engine.allocate_zeroed(usize::MAX, AllocClass::Normal).is_err());
        assert!(engine.allocate_zeroed(1 << 40, AllocClass::Normal).is_err());
        assert_eq!(engine.live_allocations(), 0);

        let dirty = engine.allocate(&[0xffu8; 32], AllocClass::Normal).unwrap();
        engine.free(dirty).unwrap();
        let clean = engine.allocate_zeroed(32, AllocClass::Normal).unwrap();
        assert_eq!(read_bytes(&engine, clean, 32).unwrap(), vec![0u8; 32]);
    }

    #[test]
    fn test_error_messages() {
        let engine = engine();
        let offset = engine.error_message(ARGON2_VERIFY_MISMATCH).unwrap();
        assert_eq!(
            read_c_string(&engine, offset).unwrap(),
            "The password does not match the supplied hash"
        );
        let unknown = engine.error_message(-1000).unwrap();
        assert_eq!(read_c_string(&engine, unknown).unwrap(), UNKNOWN_ERROR);
        // The table is not counted as live allocations
        assert_eq!(engine.live_allocations(), 0);
    }
}
