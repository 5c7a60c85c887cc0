use std::fmt;

/// Argon2 variant, with the numeric id the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Variant {
    /// Data-dependent addressing, no side-channel hardening. Fastest.
    #[default]
    Argon2d = 0,
    /// Data-independent addressing, side-channel resistant
    Argon2i = 1,
    /// Hybrid of the two, the recommended default elsewhere
    Argon2id = 2,
}

impl Variant {
    pub const ALL: [Variant; 3] = [Variant::Argon2d, Variant::Argon2i, Variant::Argon2id];

    /// Numeric id passed to the engine
    pub fn id(self) -> u32 {
        self as u32
    }

    /// Tag used in encoded hash strings
    pub fn tag(self) -> &'static str {
        match self {
            Variant::Argon2d => "argon2d",
            Variant::Argon2i => "argon2i",
            Variant::Argon2id => "argon2id",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Variant::Argon2d => "Argon2d",
            Variant::Argon2i => "Argon2i",
            Variant::Argon2id => "Argon2id",
        }
    }

    pub fn from_id(id: u32) -> Option<Variant> {
        Variant::ALL.into_iter().find(|v| v.id() == id)
    }

    /// Exact match on the canonical tag
    pub fn from_tag(tag: &str) -> Option<Variant> {
        Variant::ALL.into_iter().find(|v| v.tag() == tag)
    }

    /// Infer the variant from an encoded hash string
    ///
    /// Looks at the second `$`-separated field only. The leading `a` is
    /// matched case-insensitively, the rest exactly, so `argon2id` and
    /// `Argon2id` resolve while `ARGON2ID` does not. Anything unrecognized
    /// (or no field at all) falls back to [`Variant::Argon2d`].
    pub fn resolve(encoded: &str) -> Variant {
        encoded
            .split('$')
            .nth(1)
            .and_then(|field| {
                let rest = field
                    .strip_prefix('a')
                    .or_else(|| field.strip_prefix('A'))?;
                Variant::ALL.into_iter().find(|v| &v.name()[1..] == rest)
            })
            .unwrap_or_default()
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl From<Variant> for argon2::Algorithm {
    fn from(variant: Variant) -> Self {
        match variant {
            Variant::Argon2d => argon2::Algorithm::Argon2d,
            Variant::Argon2i => argon2::Algorithm::Argon2i,
            Variant::Argon2id => argon2::Algorithm::Argon2id,
        }
    }
}
