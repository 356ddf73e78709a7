//! The window manager driver.
//!
//! [`WindowManager`] owns the bridge and everything scripts can reach
//! through it. The reactor calls [`WindowManager::process_timers`] and
//! [`WindowManager::process_pending`] from its main callback; nothing here
//! blocks.

use std::time::{Duration, Instant};

use mosaic_core::logging::PerfSpan;
use mosaic_core::{Bridge, ClassId, ObjectId, SignalTarget, Token, Value};

use crate::config::WmConfig;
use crate::error::Result;
use crate::event::{self, EventQueue, EventSender, WmEvent};
use crate::key::{self, KeyArray};
use crate::screen::{self, Area, Screens};
use crate::spawn::{SpawnMonitor, StartupEvent};
use crate::timer::{self, Expired, SharedTimers, TimerOwner};

/// Global signal emitted once when the window manager shuts down.
pub const EXIT: Token = Token::from_static("exit");

/// The window manager.
#[derive(Debug)]
pub struct WindowManager {
    bridge: Bridge,
    config: WmConfig,
    timers: SharedTimers,
    spawn: SpawnMonitor,
    key_class: ClassId,
    screen_class: ClassId,
    timer_class: ClassId,
    root_keys: KeyArray,
    screens: Screens,
    sender: EventSender,
    queue: EventQueue,
    running: bool,
}

impl WindowManager {
    /// Set up the object classes and seal the bridge.
    #[tracing::instrument(skip_all, target = "mosaic", level = "debug")]
    pub fn new(config: WmConfig) -> Result<Self> {
        let spawn = SpawnMonitor::new(config.spawn.timeout()?);
        let timers = SharedTimers::default();
        let mut bridge = Bridge::with_config(config.bridge.clone());

        let key_class = key::define_key_class(&mut bridge)?;
        let screen_class = screen::define_screen_class(&mut bridge)?;
        let timer_class = timer::define_timer_class(&mut bridge, timers.clone())?;
        bridge.seal();

        let (sender, queue) = event::channel();
        tracing::info!(target: "mosaic", classes = bridge.classes().count(), "window manager ready");

        Ok(Self {
            bridge,
            config,
            timers,
            spawn,
            key_class,
            screen_class,
            timer_class,
            root_keys: KeyArray::new(key_class),
            screens: Screens::new(screen_class),
            sender,
            queue,
            running: true,
        })
    }

    pub fn config(&self) -> &WmConfig {
        &self.config
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut Bridge {
        &mut self.bridge
    }

    pub fn key_class(&self) -> ClassId {
        self.key_class
    }

    pub fn screen_class(&self) -> ClassId {
        self.screen_class
    }

    pub fn timer_class(&self) -> ClassId {
        self.timer_class
    }

    /// A sender collaborators use to queue events.
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    pub fn timers(&self) -> &SharedTimers {
        &self.timers
    }

    pub fn spawn_monitor(&self) -> &SpawnMonitor {
        &self.spawn
    }

    /// Replace the root key bindings from an array-like table of keys.
    pub fn set_root_keys(&mut self, keys: &Value) -> Result<()> {
        self.root_keys.set(&mut self.bridge, keys)?;
        Ok(())
    }

    pub fn root_keys(&self) -> Value {
        self.root_keys.get()
    }

    /// Rebuild the screen objects from the display's geometries.
    pub fn scan_screens(&mut self, geometries: &[Area]) -> Result<()> {
        self.screens.scan(&mut self.bridge, geometries)?;
        Ok(())
    }

    pub fn screens(&self) -> &Screens {
        &self.screens
    }

    /// Start a script timer object.
    pub fn start_timer(&mut self, timer: ObjectId) -> Result<()> {
        timer::start_timer(&mut self.bridge, timer)?;
        Ok(())
    }

    /// Stop a script timer object.
    pub fn stop_timer(&mut self, timer: ObjectId) -> Result<()> {
        timer::stop_timer(&mut self.bridge, timer)?;
        Ok(())
    }

    /// A client appeared; complete the startup sequence it belongs to.
    pub fn start_notify(
        &mut self,
        startup_id: Option<&str>,
        class: &str,
        instance: &str,
    ) -> Result<Option<String>> {
        let id = self
            .spawn
            .start_notify(&mut self.bridge, &self.timers, startup_id, class, instance)?;
        Ok(id)
    }

    /// Handle one event.
    #[tracing::instrument(skip(self), target = "mosaic::event", level = "trace")]
    pub fn dispatch(&mut self, event: WmEvent) -> Result<()> {
        match event {
            WmEvent::TimerExpired { id, owner } => self.timer_expired(Expired { id, owner }),
            WmEvent::Startup(event) => self.startup_at(event, Instant::now()),
            WmEvent::Key {
                keycode,
                keysym,
                modifiers,
                pressed,
            } => {
                let signal = if pressed { key::PRESS } else { key::RELEASE };
                let bound = self
                    .root_keys
                    .matching(&self.bridge, keycode, keysym.as_deref(), modifiers);
                for id in bound {
                    self.bridge
                        .emit(SignalTarget::Object(id), signal.clone(), Vec::new())?;
                }
                Ok(())
            }
            WmEvent::Quit => self.shutdown(),
        }
    }

    /// Handle a startup event, arming timeouts relative to `now`.
    pub fn startup_at(&mut self, event: StartupEvent, now: Instant) -> Result<()> {
        self.spawn
            .handle_at(&mut self.bridge, &self.timers, event, now)?;
        Ok(())
    }

    fn timer_expired(&mut self, expired: Expired) -> Result<()> {
        match expired.owner {
            TimerOwner::Object(object) if self.bridge.contains(object) => {
                self.bridge
                    .emit(SignalTarget::Object(object), timer::TIMEOUT_SIGNAL, Vec::new())?;
            }
            TimerOwner::Object(object) => {
                tracing::debug!(target: "mosaic::timer", ?object, "timer outlived its object");
                if self.timers.stop(expired.id).is_err() {
                    tracing::trace!(target: "mosaic::timer", ?object, "timer already gone");
                }
            }
            TimerOwner::Startup(id) => self.spawn.expire(&mut self.bridge, &id)?,
        }
        Ok(())
    }

    /// Fire every timer due at `now`. Returns how many fired.
    ///
    /// A failing timer is logged and does not stop the others.
    pub fn process_timers_at(&mut self, now: Instant) -> usize {
        let _perf = PerfSpan::new("process_timers");
        let expired = self.timers.process_expired_at(now);
        let count = expired.len();
        for expired in expired {
            let id = expired.id;
            if let Err(error) = self.timer_expired(expired) {
                tracing::warn!(target: "mosaic::timer", ?id, %error, "timer handler failed");
            }
        }
        count
    }

    /// Fire every timer due now.
    pub fn process_timers(&mut self) -> usize {
        self.process_timers_at(Instant::now())
    }

    /// How long the reactor may sleep before the next timer is due.
    pub fn next_timeout(&self) -> Option<Duration> {
        self.timers.time_until_next_at(Instant::now())
    }

    /// Dispatch every queued event. Returns how many were handled.
    ///
    /// A failing event is logged and does not stop the others.
    pub fn process_pending(&mut self) -> usize {
        let _perf = PerfSpan::new("process_pending");
        let mut count = 0;
        while let Some(event) = self.queue.try_next() {
            count += 1;
            if let Err(error) = self.dispatch(event) {
                tracing::warn!(target: "mosaic::event", %error, "event dispatch failed");
            }
        }
        count
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Emit the global `exit` signal and drop the root bindings.
    ///
    /// Only the first call has any effect.
    pub fn shutdown(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        tracing::info!(target: "mosaic", "window manager shutting down");
        let emitted = self.bridge.emit(SignalTarget::Global, EXIT, Vec::new());
        self.root_keys.clear(&mut self.bridge);
        emitted?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::Callback;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn counter(wm: &mut WindowManager, target: SignalTarget, signal: &str) -> Arc<Mutex<usize>> {
        let hits = Arc::new(Mutex::new(0));
        let hits_clone = hits.clone();
        wm.bridge_mut()
            .add_signal(
                target,
                signal,
                Callback::new(move |_, _| {
                    *hits_clone.lock() += 1;
                    Ok(())
                }),
            )
            .unwrap();
        hits
    }

    #[test]
    fn test_setup_seals_bridge() {
        let mut wm = WindowManager::new(WmConfig::default()).unwrap();
        assert!(wm.bridge().is_sealed());
        assert!(wm.bridge().class_by_name("timer").is_ok());
        let err = key::define_key_class(wm.bridge_mut()).unwrap_err();
        assert_eq!(err.kind(), mosaic_core::ErrorKind::Configuration);
    }

    #[test]
    fn test_exit_emitted_once() {
        let mut wm = WindowManager::new(WmConfig::default()).unwrap();
        let exits = counter(&mut wm, SignalTarget::Global, "exit");

        wm.sender().send(WmEvent::Quit).unwrap();
        wm.sender().send(WmEvent::Quit).unwrap();
        assert_eq!(wm.process_pending(), 2);
        wm.shutdown().unwrap();

        assert!(!wm.is_running());
        assert_eq!(*exits.lock(), 1);
    }

    #[test]
    fn test_script_timer_fires_timeout() {
        let mut wm = WindowManager::new(WmConfig::default()).unwrap();
        let class = wm.timer_class();
        let mut fields = std::collections::BTreeMap::new();
        fields.insert("timeout".to_owned(), Value::from(1.0));
        let timer = wm.bridge_mut().construct(class, fields).unwrap();
        let fired = counter(&mut wm, SignalTarget::Object(timer), "timeout");

        wm.start_timer(timer).unwrap();
        let later = Instant::now() + Duration::from_secs(2);
        assert_eq!(wm.process_timers_at(later), 1);
        assert_eq!(*fired.lock(), 1);

        wm.stop_timer(timer).unwrap();
        assert_eq!(wm.process_timers_at(later + Duration::from_secs(5)), 0);
        assert_eq!(*fired.lock(), 1);
    }
}
