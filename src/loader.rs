//! One-time engine loading shared by every caller
//!
//! States: `Uninit -> Loading -> Ready | Failed`. A failed load stays failed
//! until [`EngineLoader::retry`] starts a new one.

use crate::config::{AssetLocation, EngineConfig};
use crate::engine::Engine;
use crate::error::{Argon2Error, Result};
use crate::native::NativeEngine;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tokio::sync::watch;

/// Produces a ready engine from an asset location
///
/// `load` runs on the blocking thread pool, so it may do file I/O.
pub trait EngineSource: Send + Sync + 'static {
    fn load(&self, location: &AssetLocation) -> Result<Arc<dyn Engine>>;
}

/// Loads [`NativeEngine`]s: builtin settings, or a directory manifest
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeSource;

impl EngineSource for NativeSource {
    fn load(&self, location: &AssetLocation) -> Result<Arc<dyn Engine>> {
        let config = match location {
            AssetLocation::Builtin => EngineConfig::default(),
            AssetLocation::Dir(dir) => EngineConfig::load_from_dir(dir).map_err(|e| match e {
                Argon2Error::Load(_) => e,
                other => Argon2Error::Load(other.to_string()),
            })?,
        };
        let engine = NativeEngine::new(config)
            .map_err(|e| Argon2Error::Load(format!("Engine initialization failed: {}", e)))?;
        Ok(Arc::new(engine))
    }
}

type LoadOutcome = Result<Arc<dyn Engine>>;

enum LoadState {
    Uninit,
    Loading(watch::Receiver<Option<LoadOutcome>>),
    Ready {
        engine: Arc<dyn Engine>,
        location: AssetLocation,
    },
    Failed(Argon2Error),
}

struct Inner {
    source: Arc<dyn EngineSource>,
    state: Mutex<LoadState>,
}

/// Lazily loads one engine and hands it to every caller
#[derive(Clone)]
pub struct EngineLoader {
    inner: Arc<Inner>,
}

static GLOBAL: OnceLock<EngineLoader> = OnceLock::new();

impl EngineLoader {
    pub fn new(source: impl EngineSource) -> Self {
        Self {
            inner: Arc::new(Inner {
                source: Arc::new(source),
                state: Mutex::new(LoadState::Uninit),
            }),
        }
    }

    /// The process-wide loader used by [`crate::hash`] and [`crate::verify`]
    pub fn global() -> &'static EngineLoader {
        GLOBAL.get_or_init(|| EngineLoader::new(NativeSource))
    }

    /// Wait for the engine, starting the load on first use
    ///
    /// `location` only matters for the call that starts a load. Once an
    /// engine is ready it is returned whatever location is asked for.
    pub async fn ensure_ready(&self, location: Option<&AssetLocation>) -> Result<Arc<dyn Engine>> {
        let mut rx = {
            let mut state = self.state();
            match &*state {
                LoadState::Ready {
                    engine,
                    location: loaded,
                } => {
                    if let Some(requested) = location {
                        if requested != loaded {
                            tracing::warn!(
                                requested = %requested,
                                loaded = %loaded,
                                "Engine already loaded, ignoring asset location"
                            );
                        }
                    }
                    return Ok(Arc::clone(engine));
                }
                LoadState::Failed(err) => return Err(err.clone()),
                LoadState::Loading(rx) => rx.clone(),
                LoadState::Uninit => {
                    let location = location.cloned().unwrap_or_default();
                    let rx = self.start_load(location);
                    *state = LoadState::Loading(rx.clone());
                    rx
                }
            }
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(published) => published.clone(),
            Err(_) => None,
        };
        match outcome {
            Some(outcome) => outcome,
            None => {
                self.forget_abandoned_load();
                Err(Argon2Error::Load("Engine load abandoned".to_string()))
            }
        }
    }

    /// A load whose task died with its runtime never publishes; let the next call start over
    fn forget_abandoned_load(&self) {
        let mut state = self.state();
        if let LoadState::Loading(rx) = &*state {
            if rx.has_changed().is_err() {
                *state = LoadState::Uninit;
            }
        }
    }

    /// Start over after a failed load, then wait for the engine
    ///
    /// Has no effect on a loader that is loading or ready.
    pub async fn retry(&self, location: Option<&AssetLocation>) -> Result<Arc<dyn Engine>> {
        {
            let mut state = self.state();
            if matches!(*state, LoadState::Failed(_)) {
                tracing::debug!("Retrying engine load");
                *state = LoadState::Uninit;
            }
        }
        self.ensure_ready(location).await
    }

    /// Whether an engine is loaded and ready
    pub fn is_ready(&self) -> bool {
        matches!(*self.state(), LoadState::Ready { .. })
    }

    fn state(&self) -> MutexGuard<'_, LoadState> {
        // The state is always replaced whole, so a poisoned lock holds a valid value
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn the load; the outcome is published once the state is updated
    fn start_load(&self, location: AssetLocation) -> watch::Receiver<Option<LoadOutcome>> {
        let (tx, rx) = watch::channel(None);
        let inner = Arc::clone(&self.inner);

        tracing::debug!(location = %location, "Loading Argon2 engine");
        tokio::spawn(async move {
            let source = Arc::clone(&inner.source);
            let task_location = location.clone();
            let outcome = tokio::task::spawn_blocking(move || source.load(&task_location))
                .await
                .unwrap_or_else(|e| Err(Argon2Error::Load(format!("Engine load panicked: {}", e))));

            {
                let mut state = inner
                    .state
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                *state = match &outcome {
                    Ok(engine) => {
                        tracing::debug!(location = %location, "Argon2 engine ready");
                        LoadState::Ready {
                            engine: Arc::clone(engine),
                            location,
                        }
                    }
                    Err(err) => {
                        tracing::error!(location = %location, error = %err, "Argon2 engine load failed");
                        LoadState::Failed(err.clone())
                    }
                };
            }
            tx.send_replace(Some(outcome));
        });
        rx
    }
}
