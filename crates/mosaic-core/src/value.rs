//! Script-side values and callback references.
//!
//! [`Value`] is what crosses the bridge in both directions: property reads and
//! writes, signal arguments and the callback references registered on signals.
//! Native entities appear as [`Value::Object`] holding their [`ObjectId`];
//! that is the only variant the object registry can reference.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::bridge::Bridge;
use crate::error::{BridgeError, BridgeResult};
use crate::object::ObjectId;

/// The callable behind a [`Callback`].
pub type CallbackFn = dyn Fn(&mut Bridge, &[Value]) -> BridgeResult<()> + Send + Sync;

/// An opaque, shareable callback reference.
///
/// Clones refer to the same callback: identity is the identity of the shared
/// allocation, which is what signal removal matches on.
#[derive(Clone)]
pub struct Callback {
    inner: Arc<CallbackFn>,
}

impl Callback {
    /// Wrap a closure as a callback reference.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Bridge, &[Value]) -> BridgeResult<()> + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// Invoke the callback with positional arguments.
    pub fn call(&self, bridge: &mut Bridge, args: &[Value]) -> BridgeResult<()> {
        (self.inner)(bridge, args)
    }

    /// Whether two handles refer to the same callback.
    pub fn ptr_eq(&self, other: &Callback) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.inner) as *const ()
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function: {:p}", self.addr())
    }
}

/// A dynamically-typed script value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Number(f64),
    String(String),
    /// An array-like table.
    List(Vec<Value>),
    /// A record-like table.
    Map(BTreeMap<String, Value>),
    /// A native entity.
    Object(ObjectId),
    /// A callback reference.
    Function(Callback),
}

impl Value {
    /// The script-facing type name, used in type errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) | Self::Map(_) => "table",
            Self::Object(_) => "object",
            Self::Function(_) => "function",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Self::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Callback> {
        match self {
            Self::Function(cb) => Some(cb),
            _ => None,
        }
    }

    /// Require a callback reference, failing with a type error otherwise.
    pub fn to_callback(&self) -> BridgeResult<Callback> {
        match self {
            Self::Function(cb) => Ok(cb.clone()),
            other => Err(BridgeError::NotCallable {
                found: other.type_name(),
            }),
        }
    }

    /// Require a string, failing with a type error naming `context` otherwise.
    pub fn expect_str(&self, context: &str) -> BridgeResult<&str> {
        self.as_str()
            .ok_or_else(|| BridgeError::type_mismatch(context, "string", self.type_name()))
    }

    /// Require a number, failing with a type error naming `context` otherwise.
    pub fn expect_number(&self, context: &str) -> BridgeResult<f64> {
        self.as_number()
            .ok_or_else(|| BridgeError::type_mismatch(context, "number", self.type_name()))
    }

    /// Require an array-like table, failing with a type error otherwise.
    pub fn expect_list(&self, context: &str) -> BridgeResult<&[Value]> {
        self.as_list()
            .ok_or_else(|| BridgeError::type_mismatch(context, "table", self.type_name()))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Self::Object(id)
    }
}

impl From<Callback> for Value {
    fn from(cb: Callback) -> Self {
        Self::Function(cb)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Nil, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_identity() {
        let a = Callback::new(|_, _| Ok(()));
        let b = Callback::new(|_, _| Ok(()));
        let a2 = a.clone();
        assert!(a.ptr_eq(&a2));
        assert!(!a.ptr_eq(&b));
        assert_eq!(Value::from(a.clone()), Value::from(a2));
        assert_ne!(Value::from(a), Value::from(b));
    }

    #[test]
    fn test_to_callback_rejects_non_functions() {
        let err = Value::from(3.0).to_callback().unwrap_err();
        assert_eq!(err, BridgeError::NotCallable { found: "number" });
        assert!(Value::Nil.to_callback().is_err());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Value::from(vec!["Shift", "Mod4"]).as_list().map(<[_]>::len), Some(2));
        assert_eq!(Value::from(None::<String>), Value::Nil);
        assert_eq!(Value::from(true).type_name(), "boolean");
        assert_eq!(Value::Map(BTreeMap::new()).type_name(), "table");
    }
}
