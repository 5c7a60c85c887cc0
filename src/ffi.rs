use crate::config::AssetLocation;
use crate::error::Argon2Error;
use crate::input::Input;
use crate::params::{HashParams, ResultFields, VerifyParams};
use crate::variant::Variant;
use crate::{hash, retry_load, verify};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict};

/// Convert Argon2Error to Python exception
///
/// Engine failures become `ValueError(message, code)`.
fn argon2_error_to_py(err: Argon2Error) -> PyErr {
    match err {
        Argon2Error::Failure(record) => {
            PyValueError::new_err((record.message.unwrap_or_default(), record.code))
        }
        Argon2Error::Load(msg) => PyRuntimeError::new_err(format!("Engine load failed: {}", msg)),
        Argon2Error::Engine(msg) => PyRuntimeError::new_err(format!("Engine fault: {}", msg)),
        Argon2Error::InvalidParameter(msg) => {
            PyValueError::new_err(format!("Invalid parameter: {}", msg))
        }
    }
}

/// Password or salt as passed from Python: `str` or `bytes`
#[derive(FromPyObject)]
enum PyInput {
    Text(String),
    Bytes(Vec<u8>),
}

impl From<PyInput> for Input {
    fn from(value: PyInput) -> Self {
        match value {
            PyInput::Text(text) => Input::Text(text),
            PyInput::Bytes(bytes) => Input::Bytes(bytes),
        }
    }
}

fn variant_from_py(id: u32) -> PyResult<Variant> {
    Variant::from_id(id)
        .ok_or_else(|| PyValueError::new_err(format!("Unknown Argon2 type: {}", id)))
}

fn location_from_py(dist_path: Option<String>) -> Option<AssetLocation> {
    dist_path.map(AssetLocation::dir)
}

/// Argon2 hashing engine
///
/// Both methods return awaitables. Failures raise `ValueError(message, code)`.
#[pyclass]
struct Argon2Engine;

#[pymethods]
impl Argon2Engine {
    #[new]
    fn new() -> Self {
        Argon2Engine
    }

    /// Hash a password
    ///
    /// Returns a dict with the keys named in `result` among
    /// `hash` (bytes), `hashHex` (str) and `encoded` (str).
    #[allow(clippy::too_many_arguments)]
    #[pyo3(signature = (
        password,
        salt,
        mem_kb = 1024,
        iterations = 1,
        hash_len = 24,
        variant = 0,
        dist_path = None,
        result = None
    ))]
    fn hash<'p>(
        &self,
        py: Python<'p>,
        password: PyInput,
        salt: PyInput,
        mem_kb: u32,
        iterations: u32,
        hash_len: usize,
        variant: u32,
        dist_path: Option<String>,
        result: Option<Vec<String>>,
    ) -> PyResult<&'p PyAny> {
        let fields = match &result {
            Some(names) => ResultFields::from_names(names.iter().map(String::as_str)),
            None => ResultFields::RAW,
        };
        let mut params = HashParams::new(password, salt)
            .mem_kib(mem_kb)
            .iterations(iterations)
            .hash_len(hash_len)
            .variant(variant_from_py(variant)?)
            .result(fields);
        params.asset_location = location_from_py(dist_path);

        pyo3_asyncio::tokio::future_into_py(py, async move {
            let output = hash(params).await.map_err(argon2_error_to_py)?;
            Python::with_gil(|py| {
                let dict = PyDict::new(py);
                if let Some(raw) = &output.raw {
                    dict.set_item("hash", PyBytes::new(py, raw))?;
                }
                if let Some(hex) = &output.hex {
                    dict.set_item("hashHex", hex)?;
                }
                if let Some(encoded) = &output.encoded {
                    dict.set_item("encoded", encoded)?;
                }
                Ok(dict.to_object(py))
            })
        })
    }

    /// Verify a password against an encoded hash
    ///
    /// Resolves to `None` on a match. The type is read from `encoded` when
    /// `variant` is not given.
    #[pyo3(signature = (password, encoded, variant = None, dist_path = None))]
    fn verify<'p>(
        &self,
        py: Python<'p>,
        password: PyInput,
        encoded: String,
        variant: Option<u32>,
        dist_path: Option<String>,
    ) -> PyResult<&'p PyAny> {
        let mut params = VerifyParams::new(password, encoded);
        params.variant = variant.map(variant_from_py).transpose()?;
        params.asset_location = location_from_py(dist_path);

        pyo3_asyncio::tokio::future_into_py(py, async move {
            verify(params).await.map_err(argon2_error_to_py)?;
            Ok(())
        })
    }

    /// Load the engine again after a failed load
    ///
    /// Resolves to `None` once the engine is ready; a ready engine is kept.
    #[pyo3(signature = (dist_path = None))]
    fn retry_load<'p>(&self, py: Python<'p>, dist_path: Option<String>) -> PyResult<&'p PyAny> {
        let location = location_from_py(dist_path);
        pyo3_asyncio::tokio::future_into_py(py, async move {
            retry_load(location.as_ref()).await.map_err(argon2_error_to_py)?;
            Ok(())
        })
    }
}

/// argon2_bridge Python module
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<Argon2Engine>()?;
    m.add("ARGON2D", Variant::Argon2d.id())?;
    m.add("ARGON2I", Variant::Argon2i.id())?;
    m.add("ARGON2ID", Variant::Argon2id.id())?;
    Ok(())
}
