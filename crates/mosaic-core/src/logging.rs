//! Logging and debugging facilities for Mosaic.
//!
//! This module provides:
//! - Target names for filtering the `tracing` output of each subsystem
//! - A debug view of the live object registry
//! - Performance tracing hooks for profiling
//!
//! # Tracing Integration
//!
//! Mosaic uses the `tracing` crate for instrumentation and never installs a
//! subscriber itself. Callback errors always reach the log at warn level,
//! even when nobody is connected to `"debug::error"`.
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("mosaic_core::signal=trace,mosaic=debug")
//!     .init();
//! ```
//!
//! # Registry Dump
//!
//! ```
//! use mosaic_core::Bridge;
//! use mosaic_core::logging::RegistryDump;
//!
//! let bridge = Bridge::new();
//! assert_eq!(RegistryDump::new(&bridge).to_string(), "Registry (0 live entries):\n  (empty)\n");
//! ```

use std::fmt::{self, Write as FmtWrite};

use crate::bridge::Bridge;

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Object registry and entity arena.
    pub const OBJECT: &str = "mosaic_core::object";
    /// Class setup.
    pub const CLASS: &str = "mosaic_core::class";
    /// Property indexer.
    pub const PROPERTY: &str = "mosaic_core::property";
    /// Signal dispatcher.
    pub const SIGNAL: &str = "mosaic_core::signal";
    /// Performance spans.
    pub const PERF: &str = "mosaic::perf";
}

/// Debug view of the live registry entries of a bridge.
///
/// Entries are listed in representation order (`"<class>: <id>"`), each with
/// its reference count and whether the entity has already been destroyed.
#[derive(Debug, Clone, Copy)]
pub struct RegistryDump<'a> {
    bridge: &'a Bridge,
    include_counts: bool,
}

impl<'a> RegistryDump<'a> {
    pub fn new(bridge: &'a Bridge) -> Self {
        Self {
            bridge,
            include_counts: true,
        }
    }

    /// Leave out reference counts.
    pub fn without_counts(mut self) -> Self {
        self.include_counts = false;
        self
    }

    fn write_into(&self, output: &mut String) -> fmt::Result {
        let registry = self.bridge.registry();
        writeln!(output, "Registry ({} live entries):", registry.len())?;
        if registry.is_empty() {
            writeln!(output, "  (empty)")?;
            return Ok(());
        }

        let mut entries: Vec<_> = registry
            .iter()
            .map(|(repr, count)| (repr.to_string(), repr.object(), count))
            .collect();
        entries.sort();

        for (label, object, count) in entries {
            write!(output, "  {label}")?;
            if self.include_counts {
                write!(output, " refs={count}")?;
            }
            if !self.bridge.contains(object) {
                write!(output, " [destroyed]")?;
            }
            writeln!(output)?;
        }
        Ok(())
    }
}

impl fmt::Display for RegistryDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut output = String::new();
        self.write_into(&mut output)?;
        f.write_str(&output)
    }
}

/// A guard that keeps a tracing span open until dropped.
///
/// Useful for tracking the duration of operations.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Open a performance span for `name`.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: targets::PERF, "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{Allocator, ClassSpec};

    #[derive(Default)]
    struct Key;

    #[test]
    fn test_dump_lists_entries_with_counts() {
        let mut bridge = Bridge::new();
        let class = bridge
            .define_class(ClassSpec::new("key", Allocator::default_of::<Key>()))
            .unwrap();
        let a = bridge.allocate(class).unwrap();
        let b = bridge.allocate(class).unwrap();
        bridge.reference_object(a).unwrap();
        bridge.reference_object(a).unwrap();
        bridge.reference_object(b).unwrap();
        bridge.destroy(b).unwrap();

        let dump = RegistryDump::new(&bridge).to_string();
        assert!(dump.starts_with("Registry (2 live entries):\n"));
        assert!(dump.contains("refs=2"));
        assert!(dump.contains("refs=1 [destroyed]"));
        assert_eq!(dump.matches("key: 0x").count(), 2);

        let terse = RegistryDump::new(&bridge).without_counts().to_string();
        assert!(!terse.contains("refs="));
    }

    #[test]
    fn test_perf_span_guard() {
        let span = PerfSpan::new("dispatch");
        tracing::trace!(target: targets::PERF, "inside perf span");
        drop(span);
    }
}
