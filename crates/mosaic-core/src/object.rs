//! Object registry for the Mosaic object bridge.
//!
//! Native entities (clients, screens, tags, keys, timers) are owned by their
//! collaborators but stored in the bridge's arena, addressed by a
//! generation-checked [`ObjectId`]. Once an entity is destroyed its id goes
//! stale and every operation that needs the entity reports it instead of
//! touching freed state.
//!
//! Whether an entity is currently visible to scripts is tracked separately by
//! the [`ObjectRegistry`]: one entry per exposed entity, holding its
//! [`Representation`] and the number of holders keeping it reachable
//! (container slots, signal handlers, script variables).
//!
//! - [`Bridge::reference`] creates the entry or bumps its count, returning the
//!   same representation every time.
//! - [`Bridge::release`] decrements, retiring the entry at zero.
//! - [`Bridge::lookup`] queries without touching counts.
//!
//! # Key Types
//!
//! - [`ObjectId`] - Stable, generation-checked entity handle
//! - [`Representation`] - The script-visible wrapper of an entity
//! - [`ObjectRegistry`] - Entity to (representation, count) mapping

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use slotmap::{new_key_type, Key};

use crate::bridge::Bridge;
use crate::class::ClassId;
use crate::error::{BridgeError, BridgeResult};
use crate::logging::targets;
use crate::signal::SignalTable;
use crate::token::Token;
use crate::value::Value;

new_key_type! {
    /// A unique identifier for a native entity.
    ///
    /// `ObjectId`s stay valid for the entity's whole lifetime and never get
    /// reused for another entity: destroying the entity bumps the slot
    /// generation, so an old id is detected as stale.
    pub struct ObjectId;
}

impl ObjectId {
    /// Convert the ObjectId to a raw u64 value.
    ///
    /// Useful for interop with collaborators that need a numeric handle.
    #[inline]
    pub fn as_raw(self) -> u64 {
        self.data().as_ffi()
    }

    /// Create an ObjectId from a raw u64 value.
    ///
    /// This does not check that the entity exists.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self::from(slotmap::KeyData::from_ffi(raw))
    }
}

/// Arena storage for one native entity.
pub(crate) struct EntitySlot {
    /// The class the entity was allocated by.
    pub(crate) class: ClassId,
    /// Instance-scoped signals.
    pub(crate) signals: SignalTable,
    /// Per-instance fields set by scripts outside the class property table.
    pub(crate) fields: HashMap<Token, Value>,
    /// The collaborator's native data.
    pub(crate) data: Box<dyn Any + Send + Sync>,
}

impl EntitySlot {
    pub(crate) fn new(class: ClassId, data: Box<dyn Any + Send + Sync>) -> Self {
        Self {
            class,
            signals: SignalTable::new(),
            fields: HashMap::new(),
            data,
        }
    }
}

struct RepresentationInner {
    object: ObjectId,
    class: ClassId,
    class_name: Arc<str>,
}

/// The script-visible wrapper standing in for a native entity.
///
/// Clones share identity. While a registry entry exists every call to
/// [`Bridge::reference`] for the entity returns a handle with the same
/// identity; once the entry is retired, a later reference creates a new one.
#[derive(Clone)]
pub struct Representation {
    inner: Arc<RepresentationInner>,
}

impl Representation {
    fn new(object: ObjectId, class: ClassId, class_name: Arc<str>) -> Self {
        Self {
            inner: Arc::new(RepresentationInner {
                object,
                class,
                class_name,
            }),
        }
    }

    /// The entity this representation stands for.
    pub fn object(&self) -> ObjectId {
        self.inner.object
    }

    /// The class of the entity.
    pub fn class(&self) -> ClassId {
        self.inner.class
    }

    /// The class name of the entity.
    pub fn class_name(&self) -> &str {
        &self.inner.class_name
    }

    /// Whether two handles are the same representation.
    pub fn ptr_eq(&self, other: &Representation) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The representation as a script value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.inner.object)
    }
}

impl PartialEq for Representation {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Representation {}

impl fmt::Debug for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Representation")
            .field("class", &self.class_name())
            .field("object", &self.object())
            .finish()
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#x}", self.class_name(), self.object().as_raw())
    }
}

/// Outcome of releasing a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Released {
    /// The entity had no registry entry; nothing changed.
    Untracked,
    /// The count was decremented and this many references remain.
    Remaining(NonZeroUsize),
    /// The last reference was released and the entry removed.
    Retired(Representation),
}

struct RegistryEntry {
    representation: Representation,
    count: NonZeroUsize,
}

/// Tracks which entities have a live script-side representation.
///
/// An entry exists exactly while its count is positive; the count type makes
/// a zero-count entry unrepresentable.
#[derive(Default)]
pub struct ObjectRegistry {
    entries: HashMap<ObjectId, RegistryEntry>,
}

impl ObjectRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one reference to `object`, creating its entry if needed.
    pub fn reference(&mut self, object: ObjectId, class: ClassId, class_name: &Arc<str>) -> Representation {
        match self.entries.get_mut(&object) {
            Some(entry) => {
                entry.count = entry.count.saturating_add(1);
                tracing::trace!(target: targets::OBJECT, ?object, count = entry.count.get(), "referenced object");
                entry.representation.clone()
            }
            None => {
                let representation = Representation::new(object, class, Arc::clone(class_name));
                self.entries.insert(
                    object,
                    RegistryEntry {
                        representation: representation.clone(),
                        count: NonZeroUsize::MIN,
                    },
                );
                tracing::trace!(target: targets::OBJECT, ?object, class = %class_name, "exposed object");
                representation
            }
        }
    }

    /// Drop one reference to `object`.
    pub fn release(&mut self, object: ObjectId) -> Released {
        let Some(entry) = self.entries.get_mut(&object) else {
            return Released::Untracked;
        };

        match NonZeroUsize::new(entry.count.get() - 1) {
            Some(remaining) => {
                entry.count = remaining;
                tracing::trace!(target: targets::OBJECT, ?object, count = remaining.get(), "released object");
                Released::Remaining(remaining)
            }
            None => {
                let entry = self.entries.remove(&object);
                tracing::trace!(target: targets::OBJECT, ?object, "retired object");
                match entry {
                    Some(entry) => Released::Retired(entry.representation),
                    None => Released::Untracked,
                }
            }
        }
    }

    /// The live representation of `object`, if any.
    pub fn lookup(&self, object: ObjectId) -> Option<&Representation> {
        self.entries.get(&object).map(|entry| &entry.representation)
    }

    /// The reference count of `object`, zero when untracked.
    pub fn ref_count(&self, object: ObjectId) -> usize {
        self.entries.get(&object).map_or(0, |entry| entry.count.get())
    }

    /// Whether `object` has an entry.
    pub fn contains(&self, object: ObjectId) -> bool {
        self.entries.contains_key(&object)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over live entries as (representation, count).
    pub fn iter(&self) -> impl Iterator<Item = (&Representation, usize)> + '_ {
        self.entries
            .values()
            .map(|entry| (&entry.representation, entry.count.get()))
    }
}

impl Bridge {
    /// Expose a value to scripts, adding one reference.
    ///
    /// Returns `None` for anything that is not a live entity: constants,
    /// tables, functions and destroyed handles pass through untouched.
    pub fn reference(&mut self, value: &Value) -> Option<Representation> {
        let object = value.as_object()?;
        match self.reference_object(object) {
            Ok(representation) => Some(representation),
            Err(_) => {
                tracing::trace!(target: targets::OBJECT, ?object, "not referenceable");
                None
            }
        }
    }

    /// Expose an entity to scripts, adding one reference.
    ///
    /// Fails with [`BridgeError::StaleObject`] if the entity was destroyed.
    pub fn reference_object(&mut self, object: ObjectId) -> BridgeResult<Representation> {
        let class = self.slot(object)?.class;
        let class_name = Arc::clone(&self.class_descriptor(class).name);
        Ok(self.registry.reference(object, class, &class_name))
    }

    /// Drop one reference to `object`.
    ///
    /// Releasing an entity without a registry entry is a no-op.
    pub fn release(&mut self, object: ObjectId) -> Released {
        self.registry.release(object)
    }

    /// Release the entity held by `value`, if it holds one.
    pub fn release_value(&mut self, value: &Value) -> Released {
        match value.as_object() {
            Some(object) => self.release(object),
            None => Released::Untracked,
        }
    }

    /// The live representation of `object` without changing its count.
    pub fn lookup(&self, object: ObjectId) -> Option<Representation> {
        self.registry.lookup(object).cloned()
    }

    /// Like [`lookup`](Self::lookup), but an untracked entity is an error.
    pub fn require_representation(&self, object: ObjectId) -> BridgeResult<Representation> {
        self.lookup(object).ok_or(BridgeError::NotReferenced(object))
    }

    /// The reference count of `object`, zero when untracked.
    pub fn ref_count(&self, object: ObjectId) -> usize {
        self.registry.ref_count(object)
    }

    /// Read access to the registry.
    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }
}
