use crate::config::AssetLocation;
use crate::input::Input;
use crate::variant::Variant;

/// Default memory cost in KiB
pub const DEFAULT_MEM_KIB: u32 = 1024;

/// Default number of passes
pub const DEFAULT_ITERATIONS: u32 = 1;

/// Default raw output length in bytes
pub const DEFAULT_HASH_LEN: usize = 24;

/// Default lane count
pub const DEFAULT_PARALLELISM: u32 = 1;

/// Which fields a hash call should return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultFields {
    pub raw: bool,
    pub hex: bool,
    pub encoded: bool,
}

impl ResultFields {
    pub const RAW: ResultFields = ResultFields {
        raw: true,
        hex: false,
        encoded: false,
    };
    pub const HEX: ResultFields = ResultFields {
        raw: false,
        hex: true,
        encoded: false,
    };
    pub const ENCODED: ResultFields = ResultFields {
        raw: false,
        hex: false,
        encoded: true,
    };
    pub const ALL: ResultFields = ResultFields {
        raw: true,
        hex: true,
        encoded: true,
    };

    /// Select by the host-side field names `hash`, `hashHex` and `encoded`
    ///
    /// Unknown names are ignored.
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut fields = ResultFields {
            raw: false,
            hex: false,
            encoded: false,
        };
        for name in names {
            match name {
                "hash" => fields.raw = true,
                "hashHex" => fields.hex = true,
                "encoded" => fields.encoded = true,
                _ => {}
            }
        }
        fields
    }
}

impl Default for ResultFields {
    fn default() -> Self {
        ResultFields::RAW
    }
}

impl std::ops::BitOr for ResultFields {
    type Output = ResultFields;

    fn bitor(self, rhs: ResultFields) -> ResultFields {
        ResultFields {
            raw: self.raw || rhs.raw,
            hex: self.hex || rhs.hex,
            encoded: self.encoded || rhs.encoded,
        }
    }
}

/// Parameters of a hash call
///
/// Unset (or zero) numeric parameters fall back to the `DEFAULT_*` constants.
#[derive(Debug, Clone)]
pub struct HashParams {
    pub pass: Input,
    pub salt: Input,
    pub mem_kib: Option<u32>,
    pub iterations: Option<u32>,
    pub hash_len: Option<usize>,
    /// The browser engine only supports one lane; others may accept more
    pub parallelism: Option<u32>,
    pub variant: Option<Variant>,
    pub asset_location: Option<AssetLocation>,
    pub result: ResultFields,
}

impl HashParams {
    pub fn new(pass: impl Into<Input>, salt: impl Into<Input>) -> Self {
        Self {
            pass: pass.into(),
            salt: salt.into(),
            mem_kib: None,
            iterations: None,
            hash_len: None,
            parallelism: None,
            variant: None,
            asset_location: None,
            result: ResultFields::default(),
        }
    }

    pub fn mem_kib(mut self, mem_kib: u32) -> Self {
        self.mem_kib = Some(mem_kib);
        self
    }

    pub fn iterations(mut self, iterations: u32) -> Self {
        self.iterations = Some(iterations);
        self
    }

    pub fn hash_len(mut self, hash_len: usize) -> Self {
        self.hash_len = Some(hash_len);
        self
    }

    pub fn parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    pub fn variant(mut self, variant: Variant) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn asset_location(mut self, location: AssetLocation) -> Self {
        self.asset_location = Some(location);
        self
    }

    pub fn result(mut self, result: ResultFields) -> Self {
        self.result = result;
        self
    }

    pub(crate) fn resolved_mem_kib(&self) -> u32 {
        non_zero(self.mem_kib).unwrap_or(DEFAULT_MEM_KIB)
    }

    pub(crate) fn resolved_iterations(&self) -> u32 {
        non_zero(self.iterations).unwrap_or(DEFAULT_ITERATIONS)
    }

    pub(crate) fn resolved_hash_len(&self) -> usize {
        self.hash_len.filter(|&n| n != 0).unwrap_or(DEFAULT_HASH_LEN)
    }

    pub(crate) fn resolved_parallelism(&self) -> u32 {
        non_zero(self.parallelism).unwrap_or(DEFAULT_PARALLELISM)
    }
}

fn non_zero(value: Option<u32>) -> Option<u32> {
    value.filter(|&n| n != 0)
}

/// Parameters of a verify call
#[derive(Debug, Clone)]
pub struct VerifyParams {
    pub pass: Input,
    pub encoded: String,
    /// Inferred from `encoded` when unset
    pub variant: Option<Variant>,
    pub asset_location: Option<AssetLocation>,
}

impl VerifyParams {
    pub fn new(pass: impl Into<Input>, encoded: impl Into<String>) -> Self {
        Self {
            pass: pass.into(),
            encoded: encoded.into(),
            variant: None,
            asset_location: None,
        }
    }

    pub fn variant(mut self, variant: Variant) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn asset_location(mut self, location: AssetLocation) -> Self {
        self.asset_location = Some(location);
        self
    }
}

/// Output of a successful hash call; only requested fields are `Some`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashResult {
    /// Raw derived bytes
    pub raw: Option<Vec<u8>>,
    /// Lowercase hex of the raw bytes
    pub hex: Option<String>,
    /// Self-describing encoded hash string
    pub encoded: Option<String>,
}
