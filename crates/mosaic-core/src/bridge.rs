//! The bridge context.
//!
//! [`Bridge`] owns everything the object bridge needs: the class registry,
//! the entity arena, the object registry, the process-wide signal table and
//! the configuration. There is no ambient global state; the driver creates
//! one bridge and hands `&mut Bridge` to every entry point, including
//! callbacks, getters, setters and miss handlers.
//!
//! # Lifecycle
//!
//! 1. Setup: [`define_class`](Bridge::define_class) and
//!    [`define_property`](Bridge::define_property).
//! 2. [`seal`](Bridge::seal).
//! 3. Traffic: collaborators [`allocate`](Bridge::allocate) or
//!    [`construct`](Bridge::construct) entities, expose them with
//!    [`reference`](Bridge::reference), emit signals, and eventually
//!    [`destroy`](Bridge::destroy) them.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use slotmap::SlotMap;

use crate::class::{ClassDescriptor, ClassId, ClassRegistry};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::logging::targets;
use crate::object::{EntitySlot, ObjectId, ObjectRegistry};
use crate::signal::{SignalTable, SignalTarget};
use crate::token::Token;
use crate::value::Value;

/// Name of the class signal emitted by [`Bridge::construct`].
pub const NEW_SIGNAL: Token = Token::from_static("new");

/// The object bridge context.
pub struct Bridge {
    pub(crate) config: BridgeConfig,
    pub(crate) classes: ClassRegistry,
    pub(crate) entities: SlotMap<ObjectId, EntitySlot>,
    pub(crate) registry: ObjectRegistry,
    pub(crate) global_signals: SignalTable,
    pub(crate) emit_depth: usize,
    pub(crate) reporting_error: bool,
}

static_assertions::assert_impl_all!(Bridge: Send, Sync);

impl Bridge {
    /// Create a bridge with the default configuration.
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    /// Create a bridge with a specific configuration.
    pub fn with_config(config: BridgeConfig) -> Self {
        tracing::debug!(target: targets::OBJECT, ?config, "creating bridge");
        Self {
            config,
            classes: ClassRegistry::default(),
            entities: SlotMap::with_key(),
            registry: ObjectRegistry::new(),
            global_signals: SignalTable::new(),
            emit_depth: 0,
            reporting_error: false,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub(crate) fn slot(&self, id: ObjectId) -> BridgeResult<&EntitySlot> {
        self.entities.get(id).ok_or(BridgeError::StaleObject(id))
    }

    pub(crate) fn slot_mut(&mut self, id: ObjectId) -> BridgeResult<&mut EntitySlot> {
        self.entities.get_mut(id).ok_or(BridgeError::StaleObject(id))
    }

    /// The descriptor of a class that a live entity belongs to.
    ///
    /// Every entity is allocated through a defined class and classes are
    /// never removed, so a miss here is a bookkeeping defect.
    pub(crate) fn class_descriptor(&self, class: ClassId) -> &ClassDescriptor {
        match self.classes.get(class) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                tracing::error!(target: targets::OBJECT, ?class, error = %err, "class descriptor missing for live entity");
                panic!("class descriptor missing for live entity: {err}");
            }
        }
    }

    /// Allocate a new entity of `class`.
    ///
    /// The entity is not referenced: scripts cannot see it until a
    /// collaborator calls [`reference`](Self::reference).
    pub fn allocate(&mut self, class: ClassId) -> BridgeResult<ObjectId> {
        let data = self.classes.get(class)?.allocator.allocate();
        let id = self.entities.insert(EntitySlot::new(class, data));
        tracing::trace!(target: targets::OBJECT, ?id, ?class, "allocated object");
        Ok(id)
    }

    /// Allocate an entity with pre-built native data.
    ///
    /// For collaborators that create entities from external state rather
    /// than through the class allocator.
    pub fn insert<T: Any + Send + Sync>(&mut self, class: ClassId, data: T) -> BridgeResult<ObjectId> {
        self.classes.get(class)?;
        let id = self.entities.insert(EntitySlot::new(class, Box::new(data)));
        tracing::trace!(target: targets::OBJECT, ?id, ?class, "inserted object");
        Ok(id)
    }

    /// Destroy an entity.
    ///
    /// The native data and the instance signals are dropped at once. A live
    /// registry entry survives until its holders release it, but the handle
    /// is stale from now on.
    #[tracing::instrument(skip(self), target = "mosaic_core::object", level = "trace")]
    pub fn destroy(&mut self, id: ObjectId) -> BridgeResult<()> {
        self.entities
            .remove(id)
            .map(drop)
            .ok_or(BridgeError::StaleObject(id))?;
        if self.registry.contains(id) {
            tracing::debug!(target: targets::OBJECT, ?id, refs = self.registry.ref_count(id), "destroyed object still referenced");
        }
        Ok(())
    }

    /// Allocate, reference and initialize a new entity of `class`.
    ///
    /// For every property of the class that has an initializer and a
    /// matching key in `fields`, the initializer runs with that value, in
    /// property definition order. Other keys are ignored. Finally the
    /// class signal `"new"` is emitted with the new entity.
    #[tracing::instrument(skip(self, fields), target = "mosaic_core::object", level = "debug")]
    pub fn construct(&mut self, class: ClassId, mut fields: BTreeMap<String, Value>) -> BridgeResult<ObjectId> {
        let id = self.allocate(class)?;
        self.reference_object(id)?;

        let initializers: Vec<_> = self
            .class_descriptor(class)
            .properties()
            .iter()
            .filter_map(|property| {
                let init = property.initializer_fn()?;
                let value = fields.remove(property.name().as_str())?;
                Some((init.clone(), value))
            })
            .collect();

        for (init, value) in initializers {
            if let Err(err) = init.call(self, id, value) {
                self.discard(id);
                return Err(err);
            }
        }

        if let Err(err) = self.emit(SignalTarget::Class(class), NEW_SIGNAL, vec![Value::Object(id)]) {
            self.discard(id);
            return Err(err);
        }
        Ok(id)
    }

    /// Undo a failed `construct`.
    fn discard(&mut self, id: ObjectId) {
        self.release(id);
        self.entities.remove(id);
        tracing::debug!(target: targets::OBJECT, ?id, "construction failed, entity discarded");
    }

    /// Whether `id` refers to a live entity.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.entities.contains_key(id)
    }

    /// The class of an entity.
    pub fn class_of(&self, id: ObjectId) -> BridgeResult<ClassId> {
        Ok(self.slot(id)?.class)
    }

    /// Whether `id` is a live entity of `class`.
    pub fn is_instance(&self, id: ObjectId, class: ClassId) -> bool {
        self.class_of(id).is_ok_and(|c| c == class)
    }

    /// Typed access to the native data of an entity.
    pub fn entity<T: Any>(&self, id: ObjectId) -> BridgeResult<&T> {
        let slot = self.slot(id)?;
        match slot.data.downcast_ref::<T>() {
            Some(data) => Ok(data),
            None => Err(self.wrong_data::<T>(slot.class)),
        }
    }

    /// Typed mutable access to the native data of an entity.
    pub fn entity_mut<T: Any>(&mut self, id: ObjectId) -> BridgeResult<&mut T> {
        let class = self.slot(id)?.class;
        if !self.slot(id)?.data.is::<T>() {
            return Err(self.wrong_data::<T>(class));
        }
        self.slot_mut(id)?
            .data
            .downcast_mut::<T>()
            .ok_or(BridgeError::StaleObject(id))
    }

    fn wrong_data<T: Any>(&self, class: ClassId) -> BridgeError {
        BridgeError::type_mismatch(
            self.class_descriptor(class).name(),
            std::any::type_name::<T>(),
            "native data of another type",
        )
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of entities with a live registry entry.
    pub fn registered_count(&self) -> usize {
        self.registry.len()
    }

    /// The process-wide signal table.
    pub fn global_signals(&self) -> &SignalTable {
        &self.global_signals
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("classes", &self.classes.iter().count())
            .field("sealed", &self.is_sealed())
            .field("entities", &self.entities.len())
            .field("registered", &self.registry.len())
            .field("global_signals", &self.global_signals.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{Allocator, ClassSpec};
    use crate::config::ErrorPolicy;
    use crate::error::ErrorKind;
    use crate::property::PropertyDescriptor;
    use crate::value::Callback;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Screen {
        index: u32,
    }

    #[derive(Debug, Default)]
    struct Tag;

    fn screen_bridge() -> (Bridge, ClassId) {
        let mut bridge = Bridge::new();
        let class = bridge
            .define_class(ClassSpec::new("screen", Allocator::default_of::<Screen>()))
            .unwrap();
        bridge
            .define_property(
                class,
                PropertyDescriptor::new("index")
                    .getter(|bridge, id| Ok(Value::from(bridge.entity::<Screen>(id)?.index)))
                    .initializer(|bridge, id, value| {
                        bridge.entity_mut::<Screen>(id)?.index = value.expect_number("index")? as u32;
                        Ok(())
                    }),
            )
            .unwrap();
        bridge.seal();
        (bridge, class)
    }

    #[test]
    fn test_allocate_is_not_referenced() {
        let (mut bridge, class) = screen_bridge();
        let id = bridge.allocate(class).unwrap();
        assert!(bridge.contains(id));
        assert_eq!(bridge.ref_count(id), 0);
        assert_eq!(bridge.registered_count(), 0);
    }

    #[test]
    fn test_construct_runs_initializers_and_new_signal() {
        let (mut bridge, class) = screen_bridge();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        bridge
            .add_signal(
                SignalTarget::Class(class),
                "new",
                Callback::new(move |bridge, args| {
                    let id = args[0].as_object().unwrap();
                    seen_clone.lock().push(bridge.get(id, "index")?);
                    Ok(())
                }),
            )
            .unwrap();

        let mut fields = BTreeMap::new();
        fields.insert("index".to_owned(), Value::from(2.0));
        fields.insert("bogus".to_owned(), Value::from("ignored"));
        let id = bridge.construct(class, fields).unwrap();

        assert_eq!(bridge.ref_count(id), 1);
        assert_eq!(*seen.lock(), vec![Value::Number(2.0)]);
    }

    #[test]
    fn test_construct_new_handler_failure_cleans_up() {
        let (mut bridge, class) = screen_bridge();
        bridge.config.error_policy = ErrorPolicy::Abort;
        bridge
            .add_signal(
                SignalTarget::Class(class),
                "new",
                Callback::new(|_, _| Err(BridgeError::script("rejected"))),
            )
            .unwrap();

        let err = bridge.construct(class, BTreeMap::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Script);
        assert_eq!(bridge.entity_count(), 0);
        assert_eq!(bridge.registered_count(), 0);
    }

    #[test]
    fn test_construct_initializer_failure_cleans_up() {
        let (mut bridge, class) = screen_bridge();
        let mut fields = BTreeMap::new();
        fields.insert("index".to_owned(), Value::from("first"));
        let err = bridge.construct(class, fields).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
        assert_eq!(bridge.entity_count(), 0);
        assert_eq!(bridge.registered_count(), 0);
    }

    #[test]
    fn test_destroy_makes_handle_stale() {
        let (mut bridge, class) = screen_bridge();
        let id = bridge.allocate(class).unwrap();
        bridge.reference_object(id).unwrap();
        bridge.destroy(id).unwrap();

        assert!(!bridge.contains(id));
        assert_eq!(bridge.class_of(id).unwrap_err().kind(), ErrorKind::Reference);
        assert_eq!(bridge.destroy(id).unwrap_err(), BridgeError::StaleObject(id));
        // The entry outlives the entity until released.
        assert_eq!(bridge.ref_count(id), 1);
        assert!(matches!(bridge.release(id), crate::object::Released::Retired(_)));
    }

    #[test]
    fn test_slot_reuse_does_not_revive_old_id() {
        let (mut bridge, class) = screen_bridge();
        let old = bridge.allocate(class).unwrap();
        bridge.destroy(old).unwrap();
        let new = bridge.allocate(class).unwrap();
        assert_ne!(old, new);
        assert!(bridge.entity::<Screen>(old).is_err());
        assert!(bridge.entity::<Screen>(new).is_ok());
    }

    #[test]
    fn test_entity_wrong_type() {
        let (mut bridge, class) = screen_bridge();
        let id = bridge.allocate(class).unwrap();
        assert_eq!(bridge.entity::<Tag>(id).unwrap_err().kind(), ErrorKind::Type);
        assert_eq!(bridge.entity_mut::<Tag>(id).unwrap_err().kind(), ErrorKind::Type);
    }

    #[test]
    fn test_insert_prebuilt_data() {
        let (mut bridge, class) = screen_bridge();
        let id = bridge.insert(class, Screen { index: 3 }).unwrap();
        assert_eq!(bridge.get(id, "index").unwrap(), Value::Number(3.0));
        assert!(bridge.is_instance(id, class));
    }
}
