//! Core object bridge for Mosaic.
//!
//! This crate connects native window-manager entities to the scripting
//! layer that configures them:
//!
//! - **Object Registry**: which entities are visible to scripts, with
//!   reference counts and stable representations
//! - **Class Descriptors**: per-type allocator, property table and miss handlers
//! - **Property Indexer**: generic get/set dispatch by property name
//! - **Signal Dispatcher**: named callbacks on the global, class and
//!   instance scopes, emitted with snapshot semantics
//!
//! Everything hangs off one [`Bridge`] context that the driver owns and
//! passes to every entry point.
//!
//! # Example
//!
//! ```
//! use mosaic_core::{Allocator, Bridge, Callback, ClassSpec, SignalTarget, Value};
//!
//! #[derive(Default)]
//! struct Key;
//!
//! let mut bridge = Bridge::new();
//! let key = bridge
//!     .define_class(ClassSpec::new("key", Allocator::default_of::<Key>()))
//!     .unwrap();
//! bridge.seal();
//!
//! let id = bridge.allocate(key).unwrap();
//! let repr = bridge.reference(&Value::Object(id)).unwrap();
//! assert_eq!(repr.class_name(), "key");
//!
//! bridge
//!     .add_signal(SignalTarget::Object(id), "press", Callback::new(|_, args| {
//!         assert_eq!(args.len(), 1);
//!         Ok(())
//!     }))
//!     .unwrap();
//! let emission = bridge.emit(SignalTarget::Object(id), "press", Vec::new()).unwrap();
//! assert_eq!(emission.invoked, 1);
//! ```

pub mod bridge;
pub mod class;
pub mod config;
pub mod error;
pub mod logging;
pub mod object;
pub mod property;
pub mod signal;
pub mod token;
pub mod value;

pub use bridge::{Bridge, NEW_SIGNAL};
pub use class::{Allocator, ClassDescriptor, ClassId, ClassSpec};
pub use config::{BridgeConfig, ConfigError, ErrorPolicy};
pub use error::{BridgeError, BridgeResult, ErrorKind};
pub use object::{ObjectId, ObjectRegistry, Released, Representation};
pub use property::{Getter, IndexMiss, NewIndexMiss, PropertyDescriptor, Setter};
pub use signal::{DEBUG_ERROR, Emission, SignalTable, SignalTarget};
pub use token::{Token, name_hash};
pub use value::{Callback, Value};

static_assertions::assert_impl_all!(Value: Send, Sync, Clone);
static_assertions::assert_impl_all!(Token: Send, Sync, Clone);
