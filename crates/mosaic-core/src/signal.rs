//! Signal dispatcher for the Mosaic object bridge.
//!
//! Signals are named multicast channels. A channel lives in a
//! [`SignalTable`] owned by one of three holders:
//!
//! - the process-wide table ([`SignalTarget::Global`]), e.g. `"exit"` or
//!   `"spawn::initiated"`;
//! - a class ([`SignalTarget::Class`]), e.g. the `"new"` signal of `key`;
//! - a single entity ([`SignalTarget::Object`]), e.g. `"press"` on one key.
//!
//! Names are opaque strings, conventionally namespaced with `::`, and match
//! by exact equality.
//!
//! # Emission
//!
//! [`Bridge::emit`] copies the callback list of the record before invoking
//! anything. Callbacks may add or remove handlers, or destroy the holder,
//! while the emission runs; none of that changes which callbacks this
//! emission invokes. Object-scoped callbacks receive the holder as their
//! first argument; global and class callbacks receive only the arguments.
//!
//! What happens when a callback fails is decided by
//! [`ErrorPolicy`](crate::config::ErrorPolicy): by default the error is
//! reported on `"debug::error"` and the emission moves on to the next
//! callback.
//!
//! # Example
//!
//! ```
//! use mosaic_core::{Bridge, Callback, SignalTarget, Value};
//!
//! let mut bridge = Bridge::new();
//! let exit_handler = Callback::new(|_, _| Ok(()));
//! bridge.add_signal(SignalTarget::Global, "exit", exit_handler.clone()).unwrap();
//!
//! let emission = bridge.emit(SignalTarget::Global, "exit", Vec::new()).unwrap();
//! assert_eq!(emission.invoked, 1);
//!
//! bridge.remove_signal(SignalTarget::Global, "exit", &Value::from(exit_handler)).unwrap();
//! ```

use std::collections::HashMap;

use crate::bridge::Bridge;
use crate::class::ClassId;
use crate::config::ErrorPolicy;
use crate::error::{BridgeError, BridgeResult};
use crate::logging::targets;
use crate::object::ObjectId;
use crate::token::Token;
use crate::value::{Callback, Value};

/// Name of the global signal that receives callback errors.
pub const DEBUG_ERROR: Token = Token::from_static("debug::error");

/// The holder of a signal table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalTarget {
    /// Process-wide signals.
    Global,
    /// Signals attached to a class.
    Class(ClassId),
    /// Signals attached to one entity.
    Object(ObjectId),
}

/// Named callback records, each in registration order.
#[derive(Debug, Clone, Default)]
pub struct SignalTable {
    records: HashMap<Token, Vec<Callback>>,
}

impl SignalTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback to the record for `name`, creating it if absent.
    ///
    /// The same callback may be added several times; it is then invoked once
    /// per registration.
    pub fn add(&mut self, name: Token, callback: Callback) {
        self.records.entry(name).or_default().push(callback);
    }

    /// Remove the first registration of `callback` under `name`.
    ///
    /// Returns `false` if it was not registered.
    pub fn remove(&mut self, name: &Token, callback: &Callback) -> bool {
        let Some(record) = self.records.get_mut(name) else {
            return false;
        };
        let Some(pos) = record.iter().position(|cb| cb.ptr_eq(callback)) else {
            return false;
        };
        record.remove(pos);
        if record.is_empty() {
            self.records.remove(name);
        }
        true
    }

    /// Copy of the callbacks registered under `name`, in registration order.
    pub fn snapshot(&self, name: &Token) -> Option<Vec<Callback>> {
        self.records.get(name).map(|record| record.to_vec())
    }

    /// Number of registrations under `name`.
    pub fn connection_count(&self, name: &Token) -> usize {
        self.records.get(name).map_or(0, Vec::len)
    }

    /// Number of distinct signal names with at least one registration.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Summary of one emission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Emission {
    /// Callbacks invoked, including those that failed.
    pub invoked: usize,
    /// Callbacks that returned an error.
    pub failed: usize,
}

impl Bridge {
    fn signal_table(&self, target: SignalTarget) -> BridgeResult<&SignalTable> {
        match target {
            SignalTarget::Global => Ok(&self.global_signals),
            SignalTarget::Class(class) => Ok(&self.classes.get(class)?.signals),
            SignalTarget::Object(id) => Ok(&self.slot(id)?.signals),
        }
    }

    fn signal_table_mut(&mut self, target: SignalTarget) -> BridgeResult<&mut SignalTable> {
        match target {
            SignalTarget::Global => Ok(&mut self.global_signals),
            SignalTarget::Class(class) => Ok(&mut self.classes.get_mut(class)?.signals),
            SignalTarget::Object(id) => Ok(&mut self.slot_mut(id)?.signals),
        }
    }

    /// Register `callback` for `name` on `target`.
    ///
    /// Fails with a type error if `callback` is not a function, a lookup
    /// error for an unknown class and a reference error for a destroyed
    /// entity.
    #[tracing::instrument(skip(self, name, callback), target = "mosaic_core::signal", level = "trace")]
    pub fn add_signal(
        &mut self,
        target: SignalTarget,
        name: impl Into<Token>,
        callback: impl Into<Value>,
    ) -> BridgeResult<()> {
        let callback = callback.into().to_callback()?;
        let name = name.into();
        tracing::trace!(target: targets::SIGNAL, signal = %name, ?callback, "adding signal");
        self.signal_table_mut(target)?.add(name, callback);
        Ok(())
    }

    /// Remove the first registration of `callback` for `name` on `target`.
    ///
    /// Removing a callback that was never added is a no-op.
    #[tracing::instrument(skip(self, name, callback), target = "mosaic_core::signal", level = "trace")]
    pub fn remove_signal(
        &mut self,
        target: SignalTarget,
        name: impl Into<Token>,
        callback: &Value,
    ) -> BridgeResult<()> {
        let callback = callback.to_callback()?;
        let name = name.into();
        let removed = self.signal_table_mut(target)?.remove(&name, &callback);
        tracing::trace!(target: targets::SIGNAL, signal = %name, removed, "removing signal");
        Ok(())
    }

    /// Number of callbacks registered for `name` on `target`.
    pub fn connection_count(&self, target: SignalTarget, name: impl Into<Token>) -> BridgeResult<usize> {
        Ok(self.signal_table(target)?.connection_count(&name.into()))
    }

    /// Emit `name` on `target`.
    ///
    /// Emitting a signal nobody registered is a no-op. Otherwise the callback
    /// list is snapshotted, then every callback in it runs in registration
    /// order. For object targets the holder is passed as the first argument.
    pub fn emit(
        &mut self,
        target: SignalTarget,
        name: impl Into<Token>,
        args: Vec<Value>,
    ) -> BridgeResult<Emission> {
        let name = name.into();
        let Some(snapshot) = self.signal_table(target)?.snapshot(&name) else {
            return Ok(Emission::default());
        };

        let args = match target {
            SignalTarget::Object(id) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(Value::Object(id));
                full.extend(args);
                full
            }
            SignalTarget::Global | SignalTarget::Class(_) => args,
        };

        let max_depth = self.config.max_emit_depth;
        if self.emit_depth >= max_depth {
            tracing::warn!(target: targets::SIGNAL, signal = %name, depth = self.emit_depth, "emission depth exceeded");
            return Err(BridgeError::EmitDepthExceeded {
                signal: name.as_str().to_owned(),
                depth: max_depth,
            });
        }

        self.emit_depth += 1;
        let result = self.run_snapshot(&name, &snapshot, &args);
        self.emit_depth -= 1;
        result
    }

    fn run_snapshot(
        &mut self,
        name: &Token,
        snapshot: &[Callback],
        args: &[Value],
    ) -> BridgeResult<Emission> {
        let _span = tracing::trace_span!(target: targets::SIGNAL, "emit", signal = %name, callbacks = snapshot.len()).entered();
        let mut emission = Emission::default();

        for callback in snapshot {
            emission.invoked += 1;
            let Err(err) = callback.call(self, args) else {
                continue;
            };
            emission.failed += 1;
            self.report_callback_error(name, &err);
            if self.config.error_policy == ErrorPolicy::Abort {
                return Err(err);
            }
        }

        Ok(emission)
    }

    /// Log a callback error and forward it to `"debug::error"`.
    ///
    /// Errors raised while `"debug::error"` itself is being handled are only
    /// logged.
    fn report_callback_error(&mut self, signal: &Token, err: &BridgeError) {
        tracing::warn!(target: targets::SIGNAL, %signal, error = %err, "signal callback failed");
        if self.reporting_error || *signal == DEBUG_ERROR {
            return;
        }

        self.reporting_error = true;
        let result = self.emit(
            SignalTarget::Global,
            DEBUG_ERROR,
            vec![Value::String(err.to_string())],
        );
        self.reporting_error = false;

        if let Err(report_err) = result {
            tracing::error!(target: targets::SIGNAL, error = %report_err, "failed to report callback error");
        }
    }
}
