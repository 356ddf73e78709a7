//! Mosaic window manager.
//!
//! Builds the script-visible object classes (`key`, `screen`, `timer`) on
//! top of [`mosaic_core`] and drives them from reactor events:
//!
//! - **Keys**: modifier masks, key bindings and key arrays
//! - **Screens**: one object per display area, with a settable workarea
//! - **Timers**: a shared schedule for script timers and startup timeouts
//! - **Startup notification**: pending launches, completed or timed out
//!
//! # Example
//!
//! ```
//! use mosaic::{ModifierMask, Value, WindowManager, WmConfig, WmEvent, key};
//!
//! let mut wm = WindowManager::new(WmConfig::default()).unwrap();
//! let class = wm.key_class();
//! let binding = key::key_new(
//!     wm.bridge_mut(),
//!     class,
//!     &Value::from(vec!["Mod4"]),
//!     "Return",
//!     &Value::Nil,
//!     &Value::Nil,
//! )
//! .unwrap();
//! wm.set_root_keys(&Value::List(vec![Value::Object(binding)])).unwrap();
//!
//! wm.sender()
//!     .send(WmEvent::key_press(36, Some("Return"), ModifierMask::MOD4))
//!     .unwrap();
//! assert_eq!(wm.process_pending(), 1);
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod key;
pub mod modifiers;
pub mod screen;
pub mod spawn;
pub mod timer;
pub mod wm;

pub use config::{SpawnConfig, WmConfig};
pub use error::{Result, WmError};
pub use event::{EventQueue, EventSender, WmEvent};
pub use key::{KeyArray, KeyBinding};
pub use modifiers::ModifierMask;
pub use screen::{Area, Screen, Screens};
pub use spawn::{SpawnMonitor, StartupEvent, StartupSequence};
pub use timer::{SharedTimerManager, SharedTimers, TimerId, TimerManager, TimerOwner};
pub use wm::WindowManager;

pub use mosaic_core::{Bridge, BridgeError, Callback, ObjectId, SignalTarget, Value};
