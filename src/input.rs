use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A password or salt as handed over by the host: raw bytes or text
///
/// - Zeroes its contents on drop
/// - Never prints its contents in debug output
/// - Text is marshalled as UTF-8 with a NUL terminator, bytes verbatim
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub enum Input {
    Bytes(Vec<u8>),
    Text(String),
}

impl Input {
    /// The bytes the engine sees, without any terminator
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Input::Bytes(bytes) => bytes,
            Input::Text(text) => text.as_bytes(),
        }
    }

    /// Length in bytes as passed to the engine
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Access the contents through a closure
    pub fn expose<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        f(self.as_bytes())
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Input::Bytes(_) => "Bytes",
            Input::Text(_) => "Text",
        };
        f.debug_struct("Input")
            .field("kind", &kind)
            .field("data", &"<redacted>")
            .finish()
    }
}

impl From<&str> for Input {
    fn from(text: &str) -> Self {
        Input::Text(text.to_string())
    }
}

impl From<String> for Input {
    fn from(text: String) -> Self {
        Input::Text(text)
    }
}

impl From<&[u8]> for Input {
    fn from(bytes: &[u8]) -> Self {
        Input::Bytes(bytes.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Input {
    fn from(bytes: &[u8; N]) -> Self {
        Input::Bytes(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Input {
    fn from(bytes: Vec<u8>) -> Self {
        Input::Bytes(bytes)
    }
}
