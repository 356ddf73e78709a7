//! Startup-notification tracking.
//!
//! The startup-notification collaborator reports sequences as
//! [`StartupEvent`]s. Each initiated sequence stays pending until it
//! completes, is canceled or times out. Whichever of those happens first
//! removes it and emits the matching global signal; the rest find nothing
//! pending and do nothing.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use mosaic_core::{Bridge, BridgeError, BridgeResult, SignalTarget, Token, Value};

use crate::timer::{SharedTimerManager, TimerId, TimerOwner};

pub const INITIATED: Token = Token::from_static("spawn::initiated");
pub const CHANGE: Token = Token::from_static("spawn::change");
pub const COMPLETED: Token = Token::from_static("spawn::completed");
pub const CANCELED: Token = Token::from_static("spawn::canceled");
pub const TIMEOUT: Token = Token::from_static("spawn::timeout");

/// What the collaborator knows about a launching application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupSequence {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub workspace: Option<u32>,
    pub binary_name: Option<String>,
    pub icon_name: Option<String>,
    pub wmclass: Option<String>,
}

impl StartupSequence {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// The signal argument: `id` plus every known detail.
    pub fn to_value(&self) -> Value {
        let mut map = id_table(&self.id);
        let details = [
            ("name", &self.name),
            ("description", &self.description),
            ("binary_name", &self.binary_name),
            ("icon_name", &self.icon_name),
            ("wmclass", &self.wmclass),
        ];
        for (key, detail) in details {
            if let Some(detail) = detail {
                map.insert(key.to_owned(), Value::from(detail.as_str()));
            }
        }
        if let Some(workspace) = self.workspace {
            map.insert("workspace".to_owned(), Value::from(workspace));
        }
        Value::Map(map)
    }

    fn matches_client(&self, startup_id: Option<&str>, class: &str, instance: &str) -> bool {
        if startup_id == Some(self.id.as_str()) {
            return true;
        }
        if self
            .wmclass
            .as_deref()
            .is_some_and(|wmclass| wmclass == class || wmclass == instance)
        {
            return true;
        }
        self.binary_name.as_deref().is_some_and(|binary| {
            binary.eq_ignore_ascii_case(class) || binary.eq_ignore_ascii_case(instance)
        })
    }
}

fn id_table(id: &str) -> BTreeMap<String, Value> {
    let mut map = BTreeMap::new();
    map.insert("id".to_owned(), Value::from(id));
    map
}

/// A startup-notification event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupEvent {
    Initiated(StartupSequence),
    Changed(StartupSequence),
    Completed { id: String },
    Canceled { id: String },
}

#[derive(Debug)]
struct Pending {
    sequence: StartupSequence,
    timer: TimerId,
}

/// Pending startup sequences, in initiation order.
#[derive(Debug)]
pub struct SpawnMonitor {
    pending: Vec<Pending>,
    timeout: Duration,
}

impl SpawnMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Vec::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.iter().any(|p| p.sequence.id == id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn take(&mut self, id: &str) -> Option<Pending> {
        let index = self.pending.iter().position(|p| p.sequence.id == id)?;
        Some(self.pending.remove(index))
    }

    /// Handle an event, arming timeouts relative to the current time.
    pub fn handle(
        &mut self,
        bridge: &mut Bridge,
        timers: &SharedTimerManager,
        event: StartupEvent,
    ) -> BridgeResult<()> {
        self.handle_at(bridge, timers, event, Instant::now())
    }

    /// Handle an event, arming timeouts relative to `now`.
    #[tracing::instrument(skip_all, target = "mosaic::spawn", level = "debug")]
    pub fn handle_at(
        &mut self,
        bridge: &mut Bridge,
        timers: &SharedTimerManager,
        event: StartupEvent,
        now: Instant,
    ) -> BridgeResult<()> {
        match event {
            StartupEvent::Initiated(sequence) => {
                if self.is_pending(&sequence.id) {
                    tracing::debug!(target: "mosaic::spawn", id = %sequence.id, "sequence re-initiated");
                    return self.emit(bridge, CHANGE, sequence.to_value());
                }
                let timer = timers
                    .start_one_shot_at(now, self.timeout, TimerOwner::Startup(sequence.id.clone()))
                    .map_err(|err| BridgeError::script(err.to_string()))?;
                let arg = sequence.to_value();
                tracing::debug!(target: "mosaic::spawn", id = %sequence.id, "sequence initiated");
                self.pending.push(Pending { sequence, timer });
                self.emit(bridge, INITIATED, arg)
            }
            StartupEvent::Changed(sequence) => {
                if let Some(pending) = self.pending.iter_mut().find(|p| p.sequence.id == sequence.id) {
                    pending.sequence = sequence.clone();
                }
                self.emit(bridge, CHANGE, sequence.to_value())
            }
            StartupEvent::Completed { id } => self.finish(bridge, timers, &id, COMPLETED),
            StartupEvent::Canceled { id } => self.finish(bridge, timers, &id, CANCELED),
        }
    }

    fn finish(
        &mut self,
        bridge: &mut Bridge,
        timers: &SharedTimerManager,
        id: &str,
        signal: Token,
    ) -> BridgeResult<()> {
        let Some(pending) = self.take(id) else {
            tracing::trace!(target: "mosaic::spawn", id, %signal, "sequence not pending");
            return Ok(());
        };
        if timers.stop(pending.timer).is_err() {
            tracing::trace!(target: "mosaic::spawn", id, "timeout already gone");
        }
        tracing::debug!(target: "mosaic::spawn", id, %signal, "sequence finished");
        self.emit(bridge, signal, Value::Map(id_table(id)))
    }

    /// The timeout of sequence `id` fired.
    pub fn expire(&mut self, bridge: &mut Bridge, id: &str) -> BridgeResult<()> {
        if self.take(id).is_none() {
            tracing::trace!(target: "mosaic::spawn", id, "timeout after completion");
            return Ok(());
        }
        tracing::debug!(target: "mosaic::spawn", id, "sequence timed out");
        self.emit(bridge, TIMEOUT, Value::Map(id_table(id)))
    }

    /// A client appeared: complete the first pending sequence it belongs to.
    ///
    /// Returns the id of the completed sequence.
    pub fn start_notify(
        &mut self,
        bridge: &mut Bridge,
        timers: &SharedTimerManager,
        startup_id: Option<&str>,
        class: &str,
        instance: &str,
    ) -> BridgeResult<Option<String>> {
        let Some(id) = self
            .pending
            .iter()
            .find(|p| p.sequence.matches_client(startup_id, class, instance))
            .map(|p| p.sequence.id.clone())
        else {
            return Ok(None);
        };
        self.finish(bridge, timers, &id, COMPLETED)?;
        Ok(Some(id))
    }

    fn emit(&self, bridge: &mut Bridge, signal: Token, arg: Value) -> BridgeResult<()> {
        bridge.emit(SignalTarget::Global, signal, vec![arg])?;
        Ok(())
    }
}
