//! Class descriptors.
//!
//! A class describes one kind of native entity: how to allocate it, which
//! properties it exposes, what to do on unknown property names, and the
//! class-level signal table. Classes are defined during setup; once the
//! bridge is sealed the set of classes and their property tables are fixed.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::bridge::Bridge;
use crate::error::{BridgeError, BridgeResult};
use crate::logging::targets;
use crate::property::{IndexMiss, NewIndexMiss, PropertyDescriptor};
use crate::signal::SignalTable;
use crate::token::Token;

/// Index of a class in the bridge's class registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    /// Build a class id from a registry index.
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// The registry index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

type AllocFn = dyn Fn() -> Box<dyn Any + Send + Sync> + Send + Sync;

/// Produces fresh native data for a class.
#[derive(Clone)]
pub struct Allocator(Arc<AllocFn>);

impl Allocator {
    /// Wrap an allocation function.
    pub fn new<T, F>(f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self(Arc::new(move || Box::new(f()) as Box<dyn Any + Send + Sync>))
    }

    /// Allocate `T::default()`.
    pub fn default_of<T: Any + Send + Sync + Default>() -> Self {
        Self::new(T::default)
    }

    pub(crate) fn allocate(&self) -> Box<dyn Any + Send + Sync> {
        (self.0)()
    }
}

impl fmt::Debug for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Allocator")
    }
}

/// Static per-class metadata.
pub struct ClassDescriptor {
    pub(crate) id: ClassId,
    pub(crate) name: Arc<str>,
    pub(crate) allocator: Allocator,
    pub(crate) properties: Vec<PropertyDescriptor>,
    pub(crate) property_index: HashMap<Token, usize>,
    pub(crate) signals: SignalTable,
    pub(crate) index_miss: Option<IndexMiss>,
    pub(crate) newindex_miss: Option<NewIndexMiss>,
}

impl ClassDescriptor {
    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Properties in definition order.
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    /// Find a property by name.
    pub fn property(&self, name: &Token) -> Option<&PropertyDescriptor> {
        self.property_index
            .get(name)
            .map(|&index| &self.properties[index])
    }

    /// Class-level signals.
    pub fn signals(&self) -> &SignalTable {
        &self.signals
    }

    fn add_property(&mut self, descriptor: PropertyDescriptor) -> BridgeResult<()> {
        if self.property_index.contains_key(descriptor.name()) {
            return Err(BridgeError::DuplicateProperty {
                class: self.name.to_string(),
                property: descriptor.name().to_string(),
            });
        }
        self.property_index
            .insert(descriptor.name().clone(), self.properties.len());
        self.properties.push(descriptor);
        Ok(())
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("properties", &self.properties.len())
            .finish()
    }
}

/// Arguments of [`Bridge::define_class`].
#[derive(Debug, Clone)]
pub struct ClassSpec {
    name: String,
    allocator: Allocator,
    index_miss: Option<IndexMiss>,
    newindex_miss: Option<NewIndexMiss>,
}

impl ClassSpec {
    /// A class named `name` allocating with `allocator` and no miss handlers.
    pub fn new(name: impl Into<String>, allocator: Allocator) -> Self {
        Self {
            name: name.into(),
            allocator,
            index_miss: None,
            newindex_miss: None,
        }
    }

    /// Handler for reads of unknown property names.
    pub fn index_miss(mut self, handler: IndexMiss) -> Self {
        self.index_miss = Some(handler);
        self
    }

    /// Handler for writes to unknown property names.
    pub fn newindex_miss(mut self, handler: NewIndexMiss) -> Self {
        self.newindex_miss = Some(handler);
        self
    }
}

/// All defined classes.
#[derive(Default)]
pub(crate) struct ClassRegistry {
    classes: Vec<ClassDescriptor>,
    by_name: HashMap<String, ClassId>,
    sealed: bool,
}

impl ClassRegistry {
    pub(crate) fn get(&self, id: ClassId) -> BridgeResult<&ClassDescriptor> {
        self.classes
            .get(id.index())
            .ok_or_else(|| BridgeError::UnknownClass(format!("#{}", id.index())))
    }

    pub(crate) fn get_mut(&mut self, id: ClassId) -> BridgeResult<&mut ClassDescriptor> {
        self.classes
            .get_mut(id.index())
            .ok_or_else(|| BridgeError::UnknownClass(format!("#{}", id.index())))
    }

    pub(crate) fn by_name(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ClassDescriptor> + '_ {
        self.classes.iter()
    }
}

impl Bridge {
    /// Define a new class.
    ///
    /// Only valid during setup: fails with a configuration error after
    /// [`seal`](Self::seal) or when the name is taken.
    #[tracing::instrument(skip(self, spec), fields(class = %spec.name), target = "mosaic_core::class", level = "debug")]
    pub fn define_class(&mut self, spec: ClassSpec) -> BridgeResult<ClassId> {
        if self.classes.sealed {
            return Err(BridgeError::SetupSealed(spec.name));
        }
        if self.classes.by_name.contains_key(&spec.name) {
            return Err(BridgeError::DuplicateClass(spec.name));
        }

        let id = ClassId(self.classes.classes.len() as u32);
        self.classes.classes.push(ClassDescriptor {
            id,
            name: Arc::from(spec.name.as_str()),
            allocator: spec.allocator,
            properties: Vec::new(),
            property_index: HashMap::new(),
            signals: SignalTable::new(),
            index_miss: spec.index_miss,
            newindex_miss: spec.newindex_miss,
        });
        self.classes.by_name.insert(spec.name, id);
        tracing::debug!(target: targets::CLASS, ?id, "class defined");
        Ok(id)
    }

    /// Add a property to a class.
    ///
    /// Fails with a configuration error if the class already has a property
    /// with this name or setup is finished.
    pub fn define_property(&mut self, class: ClassId, descriptor: PropertyDescriptor) -> BridgeResult<()> {
        let sealed = self.classes.sealed;
        let class = self.classes.get_mut(class)?;
        if sealed {
            return Err(BridgeError::SetupSealed(format!(
                "{}.{}",
                class.name,
                descriptor.name()
            )));
        }
        tracing::trace!(target: targets::CLASS, class = %class.name, property = %descriptor.name(), "property defined");
        class.add_property(descriptor)
    }

    /// Finish setup. No classes or properties can be defined afterwards.
    pub fn seal(&mut self) {
        if !self.classes.sealed {
            tracing::debug!(target: targets::CLASS, classes = self.classes.classes.len(), "class setup sealed");
        }
        self.classes.sealed = true;
    }

    /// Whether setup is finished.
    pub fn is_sealed(&self) -> bool {
        self.classes.sealed
    }

    /// Resolve a class by name.
    pub fn class_by_name(&self, name: &str) -> BridgeResult<ClassId> {
        self.classes
            .by_name(name)
            .ok_or_else(|| BridgeError::UnknownClass(name.to_owned()))
    }

    /// The descriptor of a class.
    pub fn class(&self, id: ClassId) -> BridgeResult<&ClassDescriptor> {
        self.classes.get(id)
    }

    /// All defined classes, in definition order.
    pub fn classes(&self) -> impl Iterator<Item = &ClassDescriptor> + '_ {
        self.classes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[derive(Default)]
    struct Tag {
        _name: String,
    }

    fn tag_spec() -> ClassSpec {
        ClassSpec::new("tag", Allocator::default_of::<Tag>())
    }

    #[test]
    fn test_define_class() {
        let mut bridge = Bridge::new();
        let id = bridge.define_class(tag_spec()).unwrap();
        assert_eq!(bridge.class_by_name("tag").unwrap(), id);
        assert_eq!(bridge.class(id).unwrap().name(), "tag");
    }

    #[test]
    fn test_unknown_class_lookup() {
        let bridge = Bridge::new();
        let err = bridge.class_by_name("client").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lookup);
    }

    #[test]
    fn test_duplicate_class_rejected() {
        let mut bridge = Bridge::new();
        bridge.define_class(tag_spec()).unwrap();
        let err = bridge.define_class(tag_spec()).unwrap_err();
        assert_eq!(err, BridgeError::DuplicateClass("tag".into()));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_duplicate_property_rejected() {
        let mut bridge = Bridge::new();
        let id = bridge.define_class(tag_spec()).unwrap();
        bridge
            .define_property(id, PropertyDescriptor::new("name"))
            .unwrap();
        let err = bridge
            .define_property(id, PropertyDescriptor::new("name"))
            .unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateProperty { .. }));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(bridge.class(id).unwrap().properties().len(), 1);
    }

    #[test]
    fn test_definitions_rejected_after_seal() {
        let mut bridge = Bridge::new();
        let id = bridge.define_class(tag_spec()).unwrap();
        bridge.seal();
        assert!(bridge.is_sealed());

        let err = bridge
            .define_class(ClassSpec::new("client", Allocator::default_of::<Tag>()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = bridge
            .define_property(id, PropertyDescriptor::new("selected"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_property_lookup_by_token() {
        let mut bridge = Bridge::new();
        let id = bridge.define_class(tag_spec()).unwrap();
        bridge
            .define_property(id, PropertyDescriptor::new("name"))
            .unwrap();
        bridge
            .define_property(id, PropertyDescriptor::new("selected"))
            .unwrap();
        let class = bridge.class(id).unwrap();
        assert_eq!(
            class.property(&Token::from("selected")).map(|p| p.name().as_str()),
            Some("selected")
        );
        assert!(class.property(&Token::from("layout")).is_none());
    }
}
