//! Error types for the Mosaic object bridge.

use crate::object::ObjectId;

/// Result type alias for bridge operations.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Broad classification of a [`BridgeError`].
///
/// Script-triggered errors of every kind are recoverable: they abort the
/// current script invocation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown property, class or signal target.
    Lookup,
    /// A value of the wrong type, e.g. a non-callable callback.
    Type,
    /// Setup-time misuse: duplicate registration, definitions after sealing.
    Configuration,
    /// An entity handle without a live entity or registry entry.
    Reference,
    /// Write to a read-only property.
    Attribute,
    /// An error raised by a script callback itself.
    Script,
}

/// Errors raised by the object bridge.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// The property is not in the class table and no miss handler answered.
    #[error("unknown property '{property}' on class '{class}'")]
    UnknownProperty { class: String, property: String },

    /// The property exists but has no getter.
    #[error("property '{property}' of class '{class}' is write-only")]
    WriteOnlyProperty { class: String, property: String },

    /// The property exists but has no setter.
    #[error("property '{property}' of class '{class}' is read-only")]
    ReadOnlyProperty { class: String, property: String },

    /// No class with this name was defined.
    #[error("unknown class '{0}'")]
    UnknownClass(String),

    /// A callback reference was required but something else was given.
    #[error("expected a function, got {found}")]
    NotCallable { found: &'static str },

    /// A value had the wrong type for the operation.
    #[error("bad value for '{context}': expected {expected}, got {found}")]
    TypeMismatch {
        context: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A property with this name already exists on the class.
    #[error("property '{property}' is already defined on class '{class}'")]
    DuplicateProperty { class: String, property: String },

    /// A class with this name already exists.
    #[error("class '{0}' is already defined")]
    DuplicateClass(String),

    /// Class setup was attempted after the bridge was sealed.
    #[error("cannot define '{0}': class setup is finished")]
    SetupSealed(String),

    /// The handle refers to an entity that no longer exists.
    #[error("object {0:?} has been destroyed")]
    StaleObject(ObjectId),

    /// The entity has no live registry entry.
    #[error("object {0:?} is not referenced from scripts")]
    NotReferenced(ObjectId),

    /// Signal emission nested deeper than the configured limit.
    #[error("too much signal: emission of '{signal}' exceeds depth {depth}")]
    EmitDepthExceeded { signal: String, depth: usize },

    /// An error raised by a script callback.
    #[error("{0}")]
    Script(String),
}

impl BridgeError {
    /// Create a script error with a message.
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script(message.into())
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(
        context: impl Into<String>,
        expected: &'static str,
        found: &'static str,
    ) -> Self {
        Self::TypeMismatch {
            context: context.into(),
            expected,
            found,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownProperty { .. } | Self::WriteOnlyProperty { .. } | Self::UnknownClass(_) => {
                ErrorKind::Lookup
            }
            Self::NotCallable { .. } | Self::TypeMismatch { .. } => ErrorKind::Type,
            Self::DuplicateProperty { .. } | Self::DuplicateClass(_) | Self::SetupSealed(_) => {
                ErrorKind::Configuration
            }
            Self::StaleObject(_) | Self::NotReferenced(_) => ErrorKind::Reference,
            Self::ReadOnlyProperty { .. } => ErrorKind::Attribute,
            Self::EmitDepthExceeded { .. } | Self::Script(_) => ErrorKind::Script,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = BridgeError::UnknownProperty {
            class: "key".into(),
            property: "nope".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Lookup);
        assert_eq!(err.to_string(), "unknown property 'nope' on class 'key'");

        assert_eq!(BridgeError::NotCallable { found: "number" }.kind(), ErrorKind::Type);
        assert_eq!(BridgeError::DuplicateClass("key".into()).kind(), ErrorKind::Configuration);
        assert_eq!(BridgeError::script("boom").kind(), ErrorKind::Script);
    }
}
