//! Key bindings.
//!
//! A `key` object binds a key (keysym name or raw keycode) plus a modifier
//! mask to script callbacks connected to its `"press"` and `"release"`
//! signals. Key arrays hold the bindings active on the root window or on a
//! client.

use std::collections::BTreeMap;

use mosaic_core::{
    Allocator, Bridge, BridgeError, BridgeResult, ClassId, ClassSpec, IndexMiss, NewIndexMiss,
    ObjectId, PropertyDescriptor, SignalTarget, Token, Value,
};

use crate::modifiers::ModifierMask;

pub const KEY_CLASS: &str = "key";

const KEY: Token = Token::from_static("key");
const KEYSYM: Token = Token::from_static("keysym");
const MODIFIERS: Token = Token::from_static("modifiers");

/// Instance signal emitted when a binding is pressed.
pub const PRESS: Token = Token::from_static("press");
/// Instance signal emitted when a binding is released.
pub const RELEASE: Token = Token::from_static("release");

/// Native data of a `key` object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyBinding {
    /// Keysym name, when bound by name.
    pub keysym: Option<String>,
    /// Raw keycode, when bound with `"#<code>"`. Zero when unset.
    pub keycode: u32,
    pub modifiers: ModifierMask,
}

impl KeyBinding {
    /// Store a key description: `"#<code>"` selects a raw keycode,
    /// anything else a keysym name.
    ///
    /// Returns `false` for an empty description, which changes nothing.
    pub fn store(&mut self, key: &str) -> BridgeResult<bool> {
        if key.is_empty() {
            return Ok(false);
        }
        match key.strip_prefix('#') {
            Some(code) => {
                self.keycode = code
                    .parse()
                    .map_err(|_| BridgeError::type_mismatch("key", "keycode", "string"))?;
                self.keysym = None;
            }
            None => {
                self.keysym = Some(key.to_owned());
                self.keycode = 0;
            }
        }
        Ok(true)
    }

    /// The key description as scripts see it.
    pub fn describe(&self) -> Option<String> {
        if self.keycode != 0 {
            Some(format!("#{}", self.keycode))
        } else {
            self.keysym.clone()
        }
    }

    /// Whether this binding fires for a key event.
    pub fn matches(&self, keycode: u32, keysym: Option<&str>, state: ModifierMask) -> bool {
        let key_matches = if self.keycode != 0 {
            self.keycode == keycode
        } else {
            self.keysym.is_some() && self.keysym.as_deref() == keysym
        };
        key_matches && self.modifiers.matches(state)
    }
}

fn set_key(bridge: &mut Bridge, id: ObjectId, value: Value) -> BridgeResult<()> {
    let key = value.expect_str("key")?;
    if bridge.entity_mut::<KeyBinding>(id)?.store(key)? {
        bridge.notify_property(id, &KEY)?;
    }
    Ok(())
}

fn set_modifiers(bridge: &mut Bridge, id: ObjectId, value: Value) -> BridgeResult<()> {
    let mask = ModifierMask::from_value(&value)?;
    bridge.entity_mut::<KeyBinding>(id)?.modifiers = mask;
    bridge.notify_property(id, &MODIFIERS)
}

/// Define the `key` class.
pub fn define_key_class(bridge: &mut Bridge) -> BridgeResult<ClassId> {
    let class = bridge.define_class(
        ClassSpec::new(KEY_CLASS, Allocator::default_of::<KeyBinding>())
            .index_miss(IndexMiss::nil())
            .newindex_miss(NewIndexMiss::store_field()),
    )?;
    bridge.define_property(
        class,
        PropertyDescriptor::new(KEY)
            .getter(|bridge, id| Ok(Value::from(bridge.entity::<KeyBinding>(id)?.describe())))
            .setter(set_key)
            .initializer(set_key),
    )?;
    bridge.define_property(
        class,
        PropertyDescriptor::new(KEYSYM)
            .getter(|bridge, id| Ok(Value::from(bridge.entity::<KeyBinding>(id)?.keysym.clone()))),
    )?;
    bridge.define_property(
        class,
        PropertyDescriptor::new(MODIFIERS)
            .getter(|bridge, id| Ok(bridge.entity::<KeyBinding>(id)?.modifiers.to_value()))
            .setter(set_modifiers)
            .initializer(set_modifiers),
    )?;
    Ok(class)
}

/// Create a key binding, connecting optional `press` and `release`
/// callbacks. Either may be `nil`; anything else must be a function.
pub fn key_new(
    bridge: &mut Bridge,
    class: ClassId,
    modifiers: &Value,
    key: &str,
    press: &Value,
    release: &Value,
) -> BridgeResult<ObjectId> {
    let press = (!press.is_nil()).then(|| press.to_callback()).transpose()?;
    let release = (!release.is_nil()).then(|| release.to_callback()).transpose()?;
    ModifierMask::from_value(modifiers)?;

    let mut fields = BTreeMap::new();
    fields.insert(KEY.as_str().to_owned(), Value::from(key));
    fields.insert(MODIFIERS.as_str().to_owned(), modifiers.clone());
    let id = bridge.construct(class, fields)?;

    if let Some(press) = press {
        bridge.add_signal(SignalTarget::Object(id), PRESS, press)?;
    }
    if let Some(release) = release {
        bridge.add_signal(SignalTarget::Object(id), RELEASE, release)?;
    }
    Ok(id)
}

/// An ordered set of key objects owned by a window or the root.
///
/// Every held key carries one registry reference for as long as it stays in
/// the array.
#[derive(Debug, Clone)]
pub struct KeyArray {
    class: ClassId,
    keys: Vec<ObjectId>,
}

impl KeyArray {
    pub fn new(class: ClassId) -> Self {
        Self {
            class,
            keys: Vec::new(),
        }
    }

    /// Replace the contents from an array-like table.
    ///
    /// The previous keys are released. Items that are not live key objects
    /// are skipped.
    pub fn set(&mut self, bridge: &mut Bridge, items: &Value) -> BridgeResult<()> {
        let items = items.expect_list("keys")?;
        self.clear(bridge);
        for item in items {
            let Some(id) = item.as_object() else {
                continue;
            };
            if !bridge.is_instance(id, self.class) {
                continue;
            }
            bridge.reference_object(id)?;
            self.keys.push(id);
        }
        tracing::debug!(target: "mosaic::key", keys = self.keys.len(), "key array replaced");
        Ok(())
    }

    /// The keys as an array-like table.
    pub fn get(&self) -> Value {
        Value::List(self.keys.iter().copied().map(Value::Object).collect())
    }

    /// Release every held key.
    pub fn clear(&mut self, bridge: &mut Bridge) {
        for id in self.keys.drain(..) {
            bridge.release(id);
        }
    }

    pub fn keys(&self) -> &[ObjectId] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys whose binding matches a key event, in array order.
    pub fn matching(
        &self,
        bridge: &Bridge,
        keycode: u32,
        keysym: Option<&str>,
        state: ModifierMask,
    ) -> Vec<ObjectId> {
        self.keys
            .iter()
            .copied()
            .filter(|&id| {
                bridge
                    .entity::<KeyBinding>(id)
                    .is_ok_and(|binding| binding.matches(keycode, keysym, state))
            })
            .collect()
    }
}
