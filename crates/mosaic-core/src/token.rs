//! Hashed name tokens for properties and signals.
//!
//! Every property and signal name crossing the bridge is turned into a
//! [`Token`] once: the text plus its djb2 hash. Maps keyed by tokens hash with
//! the precomputed value, and equality checks the hash before the text, so
//! repeated dispatch never rehashes a name.
//!
//! Tokens for well-known names can be built in `const` context:
//!
//! ```
//! use mosaic_core::Token;
//!
//! const MODIFIERS: Token = Token::from_static("modifiers");
//! assert_eq!(MODIFIERS.as_str(), "modifiers");
//! assert_eq!(MODIFIERS, Token::from("modifiers"));
//! ```

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Compute the djb2 hash of a name.
///
/// Seed 5381, `hash = hash * 33 + byte`, wrapping.
pub const fn name_hash(name: &str) -> u64 {
    let bytes = name.as_bytes();
    let mut hash: u64 = 5381;
    let mut i = 0;
    while i < bytes.len() {
        hash = hash.wrapping_shl(5).wrapping_add(hash).wrapping_add(bytes[i] as u64);
        i += 1;
    }
    hash
}

/// A property or signal name together with its hash.
#[derive(Clone)]
pub struct Token {
    hash: u64,
    name: Cow<'static, str>,
}

impl Token {
    /// Create a token from a static name. Usable in `const` items.
    pub const fn from_static(name: &'static str) -> Self {
        Self {
            hash: name_hash(name),
            name: Cow::Borrowed(name),
        }
    }

    /// Create a token from any name.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        let name = name.into();
        Self {
            hash: name_hash(&name),
            name,
        }
    }

    /// The precomputed hash.
    #[inline]
    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    /// The token text.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Build the `property::<name>` notification signal for this property.
    pub fn property_signal(&self) -> Token {
        Token::new(format!("property::{}", self.name))
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.name == other.name
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl From<&str> for Token {
    fn from(name: &str) -> Self {
        Token::new(name.to_owned())
    }
}

impl From<String> for Token {
    fn from(name: String) -> Self {
        Token::new(name)
    }
}

impl From<&Token> for Token {
    fn from(token: &Token) -> Self {
        token.clone()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?}, {:#x})", self.name, self.hash)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
