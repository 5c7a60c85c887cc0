//! Scriptable engine and source for exercising failure paths

use crate::config::{AssetLocation, EngineConfig};
use crate::engine::{AllocClass, Engine, Offset, RawHashArgs};
use crate::error::{Argon2Error, EngineFault, Result};
use crate::loader::EngineSource;
use crate::native::NativeEngine;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Route `tracing` output through the test harness (`RUST_LOG` filters it)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// What the engine should do instead of its normal behavior
#[derive(Debug, Default)]
pub struct Script {
    pub hash_code: Option<i32>,
    pub hash_fault: Option<String>,
    pub verify_code: Option<i32>,
    pub verify_fault: Option<String>,
    pub fail_error_message: bool,
    pub fail_free: bool,
    /// Fault the n-th allocation (0-based) and every one after it
    pub fail_allocation_from: Option<usize>,
}

/// A [`NativeEngine`] whose primitives can be overridden per test
pub struct ScriptedEngine {
    inner: NativeEngine,
    script: Mutex<Script>,
    allocations: AtomicUsize,
    frees: Mutex<HashMap<Offset, usize>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            inner: NativeEngine::new(EngineConfig::default()).expect("default engine"),
            script: Mutex::new(Script::default()),
            allocations: AtomicUsize::new(0),
            frees: Mutex::new(HashMap::new()),
        }
    }

    pub fn script(&self, f: impl FnOnce(&mut Script)) {
        f(&mut self.script.lock().unwrap());
    }

    /// How many times `offset` was successfully freed
    pub fn frees_of(&self, offset: Offset) -> usize {
        self.frees.lock().unwrap().get(&offset).copied().unwrap_or(0)
    }

    pub fn total_frees(&self) -> usize {
        self.frees.lock().unwrap().values().sum()
    }

    fn count_allocation(&self) -> std::result::Result<(), EngineFault> {
        let n = self.allocations.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().fail_allocation_from {
            Some(from) if n >= from => Err(EngineFault::new("Cannot enlarge memory")),
            _ => Ok(()),
        }
    }
}

impl Engine for ScriptedEngine {
    fn allocate(&self, bytes: &[u8], class: AllocClass) -> std::result::Result<Offset, EngineFault> {
        self.count_allocation()?;
        self.inner.allocate(bytes, class)
    }

    fn allocate_zeroed(&self, len: usize, class: AllocClass) -> std::result::Result<Offset, EngineFault> {
        self.count_allocation()?;
        self.inner.allocate_zeroed(len, class)
    }

    fn free(&self, offset: Offset) -> std::result::Result<(), EngineFault> {
        if self.script.lock().unwrap().fail_free {
            return Err(EngineFault::new("free failed"));
        }
        self.inner.free(offset)?;
        *self.frees.lock().unwrap().entry(offset).or_insert(0) += 1;
        Ok(())
    }

    fn hash(&self, args: &RawHashArgs) -> std::result::Result<i32, EngineFault> {
        {
            let script = self.script.lock().unwrap();
            if let Some(fault) = &script.hash_fault {
                return Err(EngineFault::new(fault.clone()));
            }
            if let Some(code) = script.hash_code {
                return Ok(code);
            }
        }
        self.inner.hash(args)
    }

    fn verify(
        &self,
        encoded: Offset,
        pwd: Offset,
        pwd_len: usize,
        variant_id: u32,
    ) -> std::result::Result<i32, EngineFault> {
        {
            let script = self.script.lock().unwrap();
            if let Some(fault) = &script.verify_fault {
                return Err(EngineFault::new(fault.clone()));
            }
            if let Some(code) = script.verify_code {
                return Ok(code);
            }
        }
        self.inner.verify(encoded, pwd, pwd_len, variant_id)
    }

    fn error_message(&self, code: i32) -> std::result::Result<Offset, EngineFault> {
        if self.script.lock().unwrap().fail_error_message {
            return Err(EngineFault::new("error table unavailable"));
        }
        self.inner.error_message(code)
    }

    fn with_memory(&self, f: &mut dyn FnMut(&[u8])) -> std::result::Result<(), EngineFault> {
        self.inner.with_memory(f)
    }

    fn live_allocations(&self) -> usize {
        self.inner.live_allocations()
    }
}

/// Shared view of how many loads a [`ScriptedSource`] performed
#[derive(Debug, Clone, Default)]
pub struct LoadCounter(Arc<AtomicUsize>);

impl LoadCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Engine source that counts loads, can be slow, and can fail
pub struct ScriptedSource {
    loads: LoadCounter,
    fail: Arc<AtomicBool>,
    delay: Duration,
    engine: Option<Arc<ScriptedEngine>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            loads: LoadCounter::default(),
            fail: Arc::new(AtomicBool::new(false)),
            delay: Duration::ZERO,
            engine: None,
        }
    }

    /// Always hand out this engine
    pub fn serving(engine: Arc<ScriptedEngine>) -> Self {
        Self {
            engine: Some(engine),
            ..Self::new()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    pub fn load_counter(&self) -> LoadCounter {
        self.loads.clone()
    }

    pub fn fail_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail)
    }
}

impl EngineSource for ScriptedSource {
    fn load(&self, _location: &AssetLocation) -> Result<Arc<dyn Engine>> {
        self.loads.0.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Argon2Error::Load("Error loading script".to_string()));
        }
        match &self.engine {
            Some(engine) => Ok(Arc::clone(engine) as Arc<dyn Engine>),
            None => Ok(Arc::new(ScriptedEngine::new())),
        }
    }
}
