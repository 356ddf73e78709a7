//! Keyboard modifier masks.
//!
//! Scripts name modifiers with strings (`"Shift"`, `"Mod4"`, ...) in an
//! array-like table. Natively they are X11 modifier bits.

use bitflags::bitflags;
use mosaic_core::{BridgeResult, Value};

bitflags! {
    /// X11 modifier bits, plus the `Any` wildcard.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModifierMask: u16 {
        const SHIFT = 1 << 0;
        const LOCK = 1 << 1;
        const CONTROL = 1 << 2;
        const MOD1 = 1 << 3;
        const MOD2 = 1 << 4;
        const MOD3 = 1 << 5;
        const MOD4 = 1 << 6;
        const MOD5 = 1 << 7;
        /// Matches any modifier state.
        const ANY = 1 << 15;
    }
}

/// Canonical names in bit order.
const NAMES: [(ModifierMask, &str); 9] = [
    (ModifierMask::SHIFT, "Shift"),
    (ModifierMask::LOCK, "Lock"),
    (ModifierMask::CONTROL, "Control"),
    (ModifierMask::MOD1, "Mod1"),
    (ModifierMask::MOD2, "Mod2"),
    (ModifierMask::MOD3, "Mod3"),
    (ModifierMask::MOD4, "Mod4"),
    (ModifierMask::MOD5, "Mod5"),
    (ModifierMask::ANY, "Any"),
];

impl ModifierMask {
    /// Map a modifier name to its bit. Unknown names map to no bits.
    pub fn from_modifier_name(name: &str) -> Self {
        match name {
            "Shift" => Self::SHIFT,
            "Lock" => Self::LOCK,
            "Ctrl" | "Control" => Self::CONTROL,
            "Mod1" => Self::MOD1,
            "Mod2" => Self::MOD2,
            "Mod3" => Self::MOD3,
            "Mod4" => Self::MOD4,
            "Mod5" => Self::MOD5,
            "Any" => Self::ANY,
            _ => Self::empty(),
        }
    }

    /// Names of the set bits, in bit order.
    pub fn names(self) -> Vec<&'static str> {
        NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect()
    }

    /// Parse an array-like table of modifier names.
    pub fn from_value(value: &Value) -> BridgeResult<Self> {
        value
            .expect_list("modifiers")?
            .iter()
            .try_fold(Self::empty(), |mask, item| -> BridgeResult<Self> {
                Ok(mask | Self::from_modifier_name(item.expect_str("modifiers")?))
            })
    }

    /// The mask as an array-like table of names.
    pub fn to_value(self) -> Value {
        Value::from(self.names())
    }

    /// Whether a binding with this mask fires for an event with `state`.
    pub fn matches(self, state: ModifierMask) -> bool {
        self.contains(Self::ANY) || self == state.difference(Self::ANY)
    }
}
