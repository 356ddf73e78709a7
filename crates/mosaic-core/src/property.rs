//! Property indexer.
//!
//! Scripts read and write entity fields by name. Each class carries an
//! ordered table of [`PropertyDescriptor`]s; a property may have a getter, a
//! setter and an initializer (used by [`Bridge::construct`]), in any
//! combination.
//!
//! # Dispatch Order
//!
//! [`Bridge::get`]:
//! 1. the class property table (no getter: the property is write-only);
//! 2. per-instance fields stored by an earlier miss;
//! 3. the class index-miss handler;
//! 4. otherwise an unknown property error.
//!
//! [`Bridge::set`]:
//! 1. the class property table (no setter: the property is read-only);
//! 2. an existing per-instance field;
//! 3. the class newindex-miss handler;
//! 4. otherwise an unknown property error.
//!
//! # Example
//!
//! ```
//! use mosaic_core::{Allocator, Bridge, ClassSpec, IndexMiss, NewIndexMiss, PropertyDescriptor, Value};
//!
//! #[derive(Default)]
//! struct Tag {
//!     name: String,
//! }
//!
//! let mut bridge = Bridge::new();
//! let tag = bridge
//!     .define_class(
//!         ClassSpec::new("tag", Allocator::default_of::<Tag>())
//!             .index_miss(IndexMiss::nil())
//!             .newindex_miss(NewIndexMiss::store_field()),
//!     )
//!     .unwrap();
//! bridge
//!     .define_property(
//!         tag,
//!         PropertyDescriptor::new("name")
//!             .getter(|bridge, id| Ok(Value::from(bridge.entity::<Tag>(id)?.name.clone())))
//!             .setter(|bridge, id, value| {
//!                 bridge.entity_mut::<Tag>(id)?.name = value.expect_str("name")?.to_owned();
//!                 Ok(())
//!             }),
//!     )
//!     .unwrap();
//! bridge.seal();
//!
//! let id = bridge.allocate(tag).unwrap();
//! bridge.set(id, "name", Value::from("www")).unwrap();
//! assert_eq!(bridge.get(id, "name").unwrap(), Value::from("www"));
//! assert_eq!(bridge.get(id, "layout").unwrap(), Value::Nil);
//! ```

use std::fmt;
use std::sync::Arc;

use crate::bridge::Bridge;
use crate::error::{BridgeError, BridgeResult};
use crate::logging::targets;
use crate::object::ObjectId;
use crate::signal::SignalTarget;
use crate::token::Token;
use crate::value::Value;

type GetterFn = dyn Fn(&mut Bridge, ObjectId) -> BridgeResult<Value> + Send + Sync;
type SetterFn = dyn Fn(&mut Bridge, ObjectId, Value) -> BridgeResult<()> + Send + Sync;
type IndexMissFn = dyn Fn(&mut Bridge, ObjectId, &Token) -> BridgeResult<Value> + Send + Sync;
type NewIndexMissFn = dyn Fn(&mut Bridge, ObjectId, &Token, Value) -> BridgeResult<()> + Send + Sync;

/// Reads a property.
#[derive(Clone)]
pub struct Getter(Arc<GetterFn>);

impl Getter {
    pub fn call(&self, bridge: &mut Bridge, object: ObjectId) -> BridgeResult<Value> {
        (self.0)(bridge, object)
    }
}

/// Writes a property. Also the shape of initializers.
#[derive(Clone)]
pub struct Setter(Arc<SetterFn>);

impl Setter {
    pub fn call(&self, bridge: &mut Bridge, object: ObjectId, value: Value) -> BridgeResult<()> {
        (self.0)(bridge, object, value)
    }
}

/// One named property of a class.
#[derive(Clone)]
pub struct PropertyDescriptor {
    name: Token,
    getter: Option<Getter>,
    setter: Option<Setter>,
    initializer: Option<Setter>,
}

impl PropertyDescriptor {
    /// A property with no accessors yet.
    pub fn new(name: impl Into<Token>) -> Self {
        Self {
            name: name.into(),
            getter: None,
            setter: None,
            initializer: None,
        }
    }

    /// Set the getter.
    pub fn getter<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Bridge, ObjectId) -> BridgeResult<Value> + Send + Sync + 'static,
    {
        self.getter = Some(Getter(Arc::new(f)));
        self
    }

    /// Set the setter.
    pub fn setter<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Bridge, ObjectId, Value) -> BridgeResult<()> + Send + Sync + 'static,
    {
        self.setter = Some(Setter(Arc::new(f)));
        self
    }

    /// Set the initializer, run for matching fields at construction.
    pub fn initializer<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Bridge, ObjectId, Value) -> BridgeResult<()> + Send + Sync + 'static,
    {
        self.initializer = Some(Setter(Arc::new(f)));
        self
    }

    pub fn name(&self) -> &Token {
        &self.name
    }

    pub fn is_readable(&self) -> bool {
        self.getter.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    pub(crate) fn initializer_fn(&self) -> Option<&Setter> {
        self.initializer.as_ref()
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name.as_str())
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .field("initializer", &self.initializer.is_some())
            .finish()
    }
}

/// Fallback for reads of names missing from the property table.
#[derive(Clone)]
pub struct IndexMiss(Arc<IndexMissFn>);

impl IndexMiss {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Bridge, ObjectId, &Token) -> BridgeResult<Value> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Unknown reads yield `nil`.
    pub fn nil() -> Self {
        Self::new(|_, _, _| Ok(Value::Nil))
    }

    pub fn call(&self, bridge: &mut Bridge, object: ObjectId, name: &Token) -> BridgeResult<Value> {
        (self.0)(bridge, object, name)
    }
}

impl fmt::Debug for IndexMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IndexMiss")
    }
}

/// Fallback for writes to names missing from the property table.
#[derive(Clone)]
pub struct NewIndexMiss(Arc<NewIndexMissFn>);

impl NewIndexMiss {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Bridge, ObjectId, &Token, Value) -> BridgeResult<()> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Unknown writes become per-instance fields.
    pub fn store_field() -> Self {
        Self::new(|bridge, object, name, value| bridge.set_field(object, name.clone(), value))
    }

    pub fn call(&self, bridge: &mut Bridge, object: ObjectId, name: &Token, value: Value) -> BridgeResult<()> {
        (self.0)(bridge, object, name, value)
    }
}

impl fmt::Debug for NewIndexMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NewIndexMiss")
    }
}

/// What a name resolved to in the class table.
enum Resolved<T> {
    Property(Option<T>),
    Missing,
}

impl Bridge {
    fn unknown_property(&self, object: ObjectId, name: &Token) -> BridgeResult<BridgeError> {
        let class = self.slot(object)?.class;
        Ok(BridgeError::UnknownProperty {
            class: self.class_descriptor(class).name().to_owned(),
            property: name.as_str().to_owned(),
        })
    }

    /// Read property `name` of `object`.
    pub fn get(&mut self, object: ObjectId, name: impl Into<Token>) -> BridgeResult<Value> {
        let name = name.into();
        let class = self.slot(object)?.class;
        let descriptor = self.class_descriptor(class);
        let resolved = match descriptor.property(&name) {
            Some(property) => Resolved::Property(property.getter.clone()),
            None => Resolved::Missing,
        };
        let miss = descriptor.index_miss.clone();

        match resolved {
            Resolved::Property(Some(getter)) => return getter.call(self, object),
            Resolved::Property(None) => {
                return Err(BridgeError::WriteOnlyProperty {
                    class: self.class_descriptor(class).name().to_owned(),
                    property: name.as_str().to_owned(),
                });
            }
            Resolved::Missing => {}
        }

        if let Some(value) = self.slot(object)?.fields.get(&name) {
            return Ok(value.clone());
        }

        match miss {
            Some(miss) => {
                tracing::trace!(target: targets::PROPERTY, property = %name, "index miss");
                miss.call(self, object, &name)
            }
            None => Err(self.unknown_property(object, &name)?),
        }
    }

    /// Write property `name` of `object`.
    pub fn set(&mut self, object: ObjectId, name: impl Into<Token>, value: Value) -> BridgeResult<()> {
        let name = name.into();
        let class = self.slot(object)?.class;
        let descriptor = self.class_descriptor(class);
        let resolved = match descriptor.property(&name) {
            Some(property) => Resolved::Property(property.setter.clone()),
            None => Resolved::Missing,
        };
        let miss = descriptor.newindex_miss.clone();

        match resolved {
            Resolved::Property(Some(setter)) => return setter.call(self, object, value),
            Resolved::Property(None) => {
                return Err(BridgeError::ReadOnlyProperty {
                    class: self.class_descriptor(class).name().to_owned(),
                    property: name.as_str().to_owned(),
                });
            }
            Resolved::Missing => {}
        }

        let slot = self.slot_mut(object)?;
        if let Some(field) = slot.fields.get_mut(&name) {
            *field = value;
            return Ok(());
        }

        match miss {
            Some(miss) => {
                tracing::trace!(target: targets::PROPERTY, property = %name, "newindex miss");
                miss.call(self, object, &name, value)
            }
            None => Err(self.unknown_property(object, &name)?),
        }
    }

    /// A per-instance field of `object`, if one was stored.
    pub fn field(&self, object: ObjectId, name: &Token) -> BridgeResult<Option<&Value>> {
        Ok(self.slot(object)?.fields.get(name))
    }

    /// Store a per-instance field on `object`, bypassing the property table.
    pub fn set_field(&mut self, object: ObjectId, name: Token, value: Value) -> BridgeResult<()> {
        self.slot_mut(object)?.fields.insert(name, value);
        Ok(())
    }

    /// Emit `property::<name>` on `object`.
    pub fn notify_property(&mut self, object: ObjectId, name: &Token) -> BridgeResult<()> {
        self.emit(SignalTarget::Object(object), name.property_signal(), Vec::new())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{Allocator, ClassId, ClassSpec};
    use crate::error::ErrorKind;

    #[derive(Default)]
    struct Client {
        name: String,
        pid: u32,
    }

    fn setup(spec: ClassSpec) -> (Bridge, ClassId) {
        let mut bridge = Bridge::new();
        let class = bridge.define_class(spec).unwrap();
        bridge
            .define_property(
                class,
                PropertyDescriptor::new("name")
                    .getter(|bridge, id| Ok(Value::from(bridge.entity::<Client>(id)?.name.clone())))
                    .setter(|bridge, id, value| {
                        bridge.entity_mut::<Client>(id)?.name = value.expect_str("name")?.to_owned();
                        Ok(())
                    }),
            )
            .unwrap();
        bridge
            .define_property(
                class,
                PropertyDescriptor::new("pid")
                    .getter(|bridge, id| Ok(Value::from(bridge.entity::<Client>(id)?.pid))),
            )
            .unwrap();
        bridge
            .define_property(
                class,
                PropertyDescriptor::new("secret").setter(|_, _, _| Ok(())),
            )
            .unwrap();
        bridge.seal();
        (bridge, class)
    }

    fn plain() -> ClassSpec {
        ClassSpec::new("client", Allocator::default_of::<Client>())
    }

    #[test]
    fn test_getter_and_setter() {
        let (mut bridge, class) = setup(plain());
        let id = bridge.allocate(class).unwrap();
        bridge.set(id, "name", Value::from("xterm")).unwrap();
        assert_eq!(bridge.get(id, "name").unwrap(), Value::from("xterm"));
    }

    #[test]
    fn test_read_only_property() {
        let (mut bridge, class) = setup(plain());
        let id = bridge.allocate(class).unwrap();
        assert_eq!(bridge.get(id, "pid").unwrap(), Value::Number(0.0));
        let err = bridge.set(id, "pid", Value::from(4.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Attribute);
    }

    #[test]
    fn test_write_only_property() {
        let (mut bridge, class) = setup(plain());
        let id = bridge.allocate(class).unwrap();
        bridge.set(id, "secret", Value::Nil).unwrap();
        let err = bridge.get(id, "secret").unwrap_err();
        assert!(matches!(err, BridgeError::WriteOnlyProperty { .. }));
        assert_eq!(err.kind(), ErrorKind::Lookup);
    }

    #[test]
    fn test_unknown_without_miss_handlers() {
        let (mut bridge, class) = setup(plain());
        let id = bridge.allocate(class).unwrap();
        let err = bridge.get(id, "urgent").unwrap_err();
        assert_eq!(
            err,
            BridgeError::UnknownProperty {
                class: "client".into(),
                property: "urgent".into(),
            }
        );
        assert_eq!(
            bridge.set(id, "urgent", Value::from(true)).unwrap_err().kind(),
            ErrorKind::Lookup
        );
    }

    #[test]
    fn test_standard_miss_handlers() {
        let (mut bridge, class) = setup(
            plain()
                .index_miss(IndexMiss::nil())
                .newindex_miss(NewIndexMiss::store_field()),
        );
        let id = bridge.allocate(class).unwrap();
        assert_eq!(bridge.get(id, "urgent").unwrap(), Value::Nil);

        bridge.set(id, "urgent", Value::from(true)).unwrap();
        assert_eq!(bridge.get(id, "urgent").unwrap(), Value::from(true));
        assert_eq!(
            bridge.field(id, &Token::from("urgent")).unwrap(),
            Some(&Value::from(true))
        );
    }

    #[test]
    fn test_existing_field_overwritten_without_miss() {
        let (mut bridge, class) = setup(plain());
        let id = bridge.allocate(class).unwrap();
        bridge
            .set_field(id, Token::from("urgent"), Value::from(false))
            .unwrap();
        bridge.set(id, "urgent", Value::from(true)).unwrap();
        assert_eq!(bridge.get(id, "urgent").unwrap(), Value::from(true));
    }

    #[test]
    fn test_miss_handler_sees_name() {
        let (mut bridge, class) = setup(plain().index_miss(IndexMiss::new(|_, _, name| {
            Ok(Value::from(format!("missing {name}")))
        })));
        let id = bridge.allocate(class).unwrap();
        assert_eq!(bridge.get(id, "icon").unwrap(), Value::from("missing icon"));
    }

    #[test]
    fn test_stale_object_is_reference_error() {
        let (mut bridge, class) = setup(plain());
        let id = bridge.allocate(class).unwrap();
        bridge.destroy(id).unwrap();
        assert_eq!(bridge.get(id, "name").unwrap_err(), BridgeError::StaleObject(id));
    }
}
