//! Query keys and invalidation tags

use std::fmt;

/// One primitive element of a [`QueryKey`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Str(s) => write!(f, "{:?}", s),
            KeyPart::Int(n) => write!(f, "{}", n),
            KeyPart::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::Str(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::Str(s)
    }
}

impl From<&String> for KeyPart {
    fn from(s: &String) -> Self {
        KeyPart::Str(s.clone())
    }
}

impl From<i64> for KeyPart {
    fn from(n: i64) -> Self {
        KeyPart::Int(n)
    }
}

impl From<u32> for KeyPart {
    fn from(n: u32) -> Self {
        KeyPart::Int(i64::from(n))
    }
}

impl From<bool> for KeyPart {
    fn from(b: bool) -> Self {
        KeyPart::Bool(b)
    }
}

/// Ordered tuple identifying one cached query, e.g. `("grades", "S1", "CS101")`
///
/// Two keys are equal iff every element compares equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<KeyPart>);

impl QueryKey {
    /// Start a key from its entity kind
    pub fn new(kind: impl Into<KeyPart>) -> Self {
        Self(vec![kind.into()])
    }

    /// Append a parameter
    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if `prefix` matches the leading elements of this key
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", part)?;
        }
        write!(f, ")")
    }
}

impl From<Vec<KeyPart>> for QueryKey {
    fn from(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }
}

/// Pattern selecting a family of cache keys for bulk invalidation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InvalidationTag {
    /// Matches exactly one key
    Exact(QueryKey),
    /// Matches every key whose leading elements equal the prefix
    Prefix(QueryKey),
}

impl InvalidationTag {
    /// Every key whose first element is `kind`
    pub fn family(kind: impl Into<KeyPart>) -> Self {
        InvalidationTag::Prefix(QueryKey::new(kind))
    }

    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            InvalidationTag::Exact(exact) => exact == key,
            InvalidationTag::Prefix(prefix) => key.starts_with(prefix),
        }
    }
}

impl fmt::Display for InvalidationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidationTag::Exact(key) => write!(f, "={}", key),
            InvalidationTag::Prefix(key) => write!(f, "{}*", key),
        }
    }
}
