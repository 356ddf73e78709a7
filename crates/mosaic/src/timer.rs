//! Timer system for Mosaic.
//!
//! The reactor owns the clock; [`TimerManager`] only keeps a schedule. Every
//! timer records who it belongs to (a script `timer` object or a pending
//! startup sequence) so the driver knows where to route its expiry.
//!
//! All scheduling entry points have an `_at` form that takes the current
//! instant explicitly; the plain forms read [`Instant::now`].

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mosaic_core::{
    Allocator, Bridge, BridgeError, BridgeResult, ClassId, ClassSpec, ObjectId, PropertyDescriptor,
    Token, Value,
};
use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::error::{Result, WmError};

pub const TIMER_CLASS: &str = "timer";

const TIMEOUT: Token = Token::from_static("timeout");
const STARTED: Token = Token::from_static("started");

/// Instance signal emitted on a script timer when it fires.
pub const TIMEOUT_SIGNAL: Token = Token::from_static("timeout");

new_key_type! {
    /// A unique identifier for a timer.
    pub struct TimerId;
}

/// The type of timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fires once after the specified duration.
    OneShot,
    /// Fires repeatedly at the specified interval.
    Repeating,
}

/// Who a timer fires for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerOwner {
    /// A script `timer` object.
    Object(ObjectId),
    /// The timeout of a pending startup sequence.
    Startup(String),
}

#[derive(Debug)]
struct TimerData {
    next_fire: Instant,
    interval: Duration,
    kind: TimerKind,
    owner: TimerOwner,
}

/// An entry in the timer queue (min-heap by fire time).
#[derive(Debug, Clone, Copy)]
struct TimerQueueEntry {
    id: TimerId,
    fire_time: Instant,
}

impl PartialEq for TimerQueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_time == other.fire_time
    }
}

impl Eq for TimerQueueEntry {}

impl PartialOrd for TimerQueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerQueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default).
        other.fire_time.cmp(&self.fire_time)
    }
}

/// A timer that came due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expired {
    pub id: TimerId,
    pub owner: TimerOwner,
}

/// Schedule of one-shot and repeating timers.
#[derive(Debug, Default)]
pub struct TimerManager {
    timers: SlotMap<TimerId, TimerData>,
    /// Pending fires. Entries of stopped timers are skipped lazily.
    queue: BinaryHeap<TimerQueueEntry>,
}

impl TimerManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(
        &mut self,
        now: Instant,
        interval: Duration,
        kind: TimerKind,
        owner: TimerOwner,
    ) -> Result<TimerId> {
        let next_fire = now
            .checked_add(interval)
            .ok_or(WmError::TimerOverflow(interval))?;
        let id = self.timers.insert(TimerData {
            next_fire,
            interval,
            kind,
            owner,
        });
        self.queue.push(TimerQueueEntry {
            id,
            fire_time: next_fire,
        });
        tracing::trace!(target: "mosaic::timer", ?id, ?kind, ?interval, "timer started");
        Ok(id)
    }

    /// Start a one-shot timer firing `duration` after `now`.
    pub fn start_one_shot_at(&mut self, now: Instant, duration: Duration, owner: TimerOwner) -> Result<TimerId> {
        self.insert(now, duration, TimerKind::OneShot, owner)
    }

    /// Start a one-shot timer firing after `duration`.
    pub fn start_one_shot(&mut self, duration: Duration, owner: TimerOwner) -> Result<TimerId> {
        self.start_one_shot_at(Instant::now(), duration, owner)
    }

    /// Start a repeating timer; the first fire is one `interval` after `now`.
    pub fn start_repeating_at(&mut self, now: Instant, interval: Duration, owner: TimerOwner) -> Result<TimerId> {
        self.insert(now, interval, TimerKind::Repeating, owner)
    }

    /// Start a repeating timer firing every `interval`.
    pub fn start_repeating(&mut self, interval: Duration, owner: TimerOwner) -> Result<TimerId> {
        self.start_repeating_at(Instant::now(), interval, owner)
    }

    /// Stop and remove a timer.
    pub fn stop(&mut self, id: TimerId) -> Result<()> {
        match self.timers.remove(id) {
            Some(_) => {
                tracing::trace!(target: "mosaic::timer", ?id, "timer stopped");
                Ok(())
            }
            None => Err(WmError::InvalidTimerId),
        }
    }

    /// Check if a timer is scheduled.
    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers.contains_key(id)
    }

    /// The owner of a scheduled timer.
    pub fn owner(&self, id: TimerId) -> Option<&TimerOwner> {
        self.timers.get(id).map(|timer| &timer.owner)
    }

    fn prune(&mut self) {
        while let Some(entry) = self.queue.peek() {
            if self.timers.contains_key(entry.id) {
                break;
            }
            self.queue.pop();
        }
    }

    /// Time from `now` until the next timer fires, if any.
    pub fn time_until_next_at(&mut self, now: Instant) -> Option<Duration> {
        self.prune();
        self.queue
            .peek()
            .map(|entry| entry.fire_time.saturating_duration_since(now))
    }

    /// Time until the next timer fires, if any.
    pub fn time_until_next(&mut self) -> Option<Duration> {
        self.time_until_next_at(Instant::now())
    }

    /// Collect every timer due at `now`, in fire order.
    ///
    /// One-shot timers are removed; repeating timers are rescheduled one
    /// interval after `now`.
    #[tracing::instrument(skip(self, now), target = "mosaic::timer", level = "trace")]
    pub fn process_expired_at(&mut self, now: Instant) -> Vec<Expired> {
        let mut expired = Vec::new();

        while let Some(entry) = self.queue.peek() {
            if entry.fire_time > now {
                break;
            }
            let Some(entry) = self.queue.pop() else {
                break;
            };
            let id = entry.id;

            let Some(timer) = self.timers.get_mut(id) else {
                continue;
            };
            // A restarted repeating timer leaves its older queue entry behind.
            if timer.next_fire != entry.fire_time {
                continue;
            }

            tracing::trace!(target: "mosaic::timer", ?id, "timer fired");
            expired.push(Expired {
                id,
                owner: timer.owner.clone(),
            });

            match timer.kind {
                TimerKind::OneShot => {
                    self.timers.remove(id);
                }
                TimerKind::Repeating => match now.checked_add(timer.interval) {
                    Some(next_fire) => {
                        timer.next_fire = next_fire;
                        self.queue.push(TimerQueueEntry {
                            id,
                            fire_time: next_fire,
                        });
                    }
                    None => {
                        tracing::warn!(target: "mosaic::timer", ?id, "repeating timer ran past the clock");
                        self.timers.remove(id);
                    }
                },
            }
        }

        expired
    }

    /// Collect every timer due now.
    pub fn process_expired(&mut self) -> Vec<Expired> {
        self.process_expired_at(Instant::now())
    }

    /// Number of scheduled timers.
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}

/// A lock-protected `TimerManager`, shared between the driver and the
/// script timer class.
#[derive(Debug, Default)]
pub struct SharedTimerManager {
    inner: Mutex<TimerManager>,
}

/// Handle to the shared timer schedule.
pub type SharedTimers = Arc<SharedTimerManager>;

impl SharedTimerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_one_shot_at(&self, now: Instant, duration: Duration, owner: TimerOwner) -> Result<TimerId> {
        self.inner.lock().start_one_shot_at(now, duration, owner)
    }

    pub fn start_one_shot(&self, duration: Duration, owner: TimerOwner) -> Result<TimerId> {
        self.inner.lock().start_one_shot(duration, owner)
    }

    pub fn start_repeating(&self, interval: Duration, owner: TimerOwner) -> Result<TimerId> {
        self.inner.lock().start_repeating(interval, owner)
    }

    pub fn stop(&self, id: TimerId) -> Result<()> {
        self.inner.lock().stop(id)
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.inner.lock().is_active(id)
    }

    pub fn time_until_next_at(&self, now: Instant) -> Option<Duration> {
        self.inner.lock().time_until_next_at(now)
    }

    pub fn process_expired_at(&self, now: Instant) -> Vec<Expired> {
        self.inner.lock().process_expired_at(now)
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().active_count()
    }
}

/// Native data of a script `timer` object.
#[derive(Debug)]
pub struct ScriptTimer {
    timeout: Option<Duration>,
    running: Option<TimerId>,
    timers: SharedTimers,
}

impl ScriptTimer {
    fn new(timers: SharedTimers) -> Self {
        Self {
            timeout: None,
            running: None,
            timers,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_started(&self) -> bool {
        self.running.is_some()
    }
}

fn set_timeout(bridge: &mut Bridge, id: ObjectId, value: Value) -> BridgeResult<()> {
    let secs = value.expect_number("timeout")?;
    if !(secs.is_finite() && secs > 0.0) {
        return Err(BridgeError::script(format!(
            "timer timeout must be a positive number of seconds, got {secs}"
        )));
    }
    let timeout = Duration::try_from_secs_f64(secs)
        .map_err(|_| BridgeError::script(format!("timer timeout {secs} is out of range")))?;
    bridge.entity_mut::<ScriptTimer>(id)?.timeout = Some(timeout);
    bridge.notify_property(id, &TIMEOUT)
}

/// Define the `timer` class. Timers created from it schedule on `timers`.
pub fn define_timer_class(bridge: &mut Bridge, timers: SharedTimers) -> BridgeResult<ClassId> {
    let class = bridge.define_class(ClassSpec::new(
        TIMER_CLASS,
        Allocator::new(move || ScriptTimer::new(Arc::clone(&timers))),
    ))?;
    bridge.define_property(
        class,
        PropertyDescriptor::new(TIMEOUT)
            .getter(|bridge, id| {
                let timeout = bridge.entity::<ScriptTimer>(id)?.timeout;
                Ok(Value::from(timeout.map(|t| t.as_secs_f64())))
            })
            .setter(set_timeout)
            .initializer(set_timeout),
    )?;
    bridge.define_property(
        class,
        PropertyDescriptor::new(STARTED)
            .getter(|bridge, id| Ok(Value::from(bridge.entity::<ScriptTimer>(id)?.is_started()))),
    )?;
    Ok(class)
}

/// Start a script timer. Starting a running timer is a no-op.
pub fn start_timer(bridge: &mut Bridge, id: ObjectId) -> BridgeResult<()> {
    let timer = bridge.entity_mut::<ScriptTimer>(id)?;
    if timer.running.is_some() {
        tracing::warn!(target: "mosaic::timer", object = ?id, "timer already started");
        return Ok(());
    }
    let Some(timeout) = timer.timeout else {
        return Err(BridgeError::script("timer has no timeout"));
    };
    let running = timer
        .timers
        .start_repeating(timeout, TimerOwner::Object(id))
        .map_err(|err| BridgeError::script(err.to_string()))?;
    timer.running = Some(running);
    bridge.notify_property(id, &STARTED)
}

/// Stop a script timer. Stopping a stopped timer is a no-op.
pub fn stop_timer(bridge: &mut Bridge, id: ObjectId) -> BridgeResult<()> {
    let timer = bridge.entity_mut::<ScriptTimer>(id)?;
    let Some(running) = timer.running.take() else {
        tracing::warn!(target: "mosaic::timer", object = ?id, "timer not started");
        return Ok(());
    };
    if timer.timers.stop(running).is_err() {
        tracing::debug!(target: "mosaic::timer", object = ?id, "timer was already unscheduled");
    }
    bridge.notify_property(id, &STARTED)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(n: &str) -> TimerOwner {
        TimerOwner::Startup(n.to_owned())
    }

    #[test]
    fn test_one_shot_fires_once() {
        let mut timers = TimerManager::new();
        let t0 = Instant::now();
        let id = timers.start_one_shot_at(t0, Duration::from_secs(5), owner("a")).unwrap();

        assert!(timers.process_expired_at(t0 + Duration::from_secs(4)).is_empty());
        let fired = timers.process_expired_at(t0 + Duration::from_secs(5));
        assert_eq!(fired, vec![Expired { id, owner: owner("a") }]);
        assert!(!timers.is_active(id));
        assert!(timers.process_expired_at(t0 + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn test_repeating_reschedules() {
        let mut timers = TimerManager::new();
        let t0 = Instant::now();
        let id = timers.start_repeating_at(t0, Duration::from_secs(1), owner("r")).unwrap();

        assert_eq!(timers.process_expired_at(t0 + Duration::from_secs(1)).len(), 1);
        assert_eq!(timers.process_expired_at(t0 + Duration::from_secs(2)).len(), 1);
        assert!(timers.is_active(id));
        assert_eq!(
            timers.time_until_next_at(t0 + Duration::from_millis(2500)),
            Some(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_fire_order() {
        let mut timers = TimerManager::new();
        let t0 = Instant::now();
        let late = timers.start_one_shot_at(t0, Duration::from_secs(3), owner("late")).unwrap();
        let early = timers.start_one_shot_at(t0, Duration::from_secs(1), owner("early")).unwrap();

        let fired: Vec<_> = timers
            .process_expired_at(t0 + Duration::from_secs(10))
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(fired, vec![early, late]);
    }

    #[test]
    fn test_stop() {
        let mut timers = TimerManager::new();
        let t0 = Instant::now();
        let id = timers.start_one_shot_at(t0, Duration::from_secs(1), owner("a")).unwrap();
        timers.stop(id).unwrap();
        assert!(matches!(timers.stop(id), Err(WmError::InvalidTimerId)));
        assert!(timers.process_expired_at(t0 + Duration::from_secs(2)).is_empty());
        assert_eq!(timers.time_until_next_at(t0), None);
        assert_eq!(timers.active_count(), 0);
    }

    #[test]
    fn test_interval_past_the_clock() {
        let mut timers = TimerManager::new();
        let result = timers.start_one_shot_at(Instant::now(), Duration::MAX, owner("far"));
        assert!(matches!(result, Err(WmError::TimerOverflow(_))));
        assert_eq!(timers.active_count(), 0);
    }

    fn timer_bridge() -> (Bridge, ClassId, SharedTimers) {
        let timers = SharedTimers::default();
        let mut bridge = Bridge::new();
        let class = define_timer_class(&mut bridge, timers.clone()).unwrap();
        bridge.seal();
        (bridge, class, timers)
    }

    #[test]
    fn test_script_timer_start_stop() {
        let (mut bridge, class, timers) = timer_bridge();
        let id = bridge.allocate(class).unwrap();

        assert!(start_timer(&mut bridge, id).is_err());
        bridge.set(id, "timeout", Value::from(0.5)).unwrap();
        assert_eq!(bridge.get(id, "timeout").unwrap(), Value::from(0.5));

        start_timer(&mut bridge, id).unwrap();
        start_timer(&mut bridge, id).unwrap();
        assert_eq!(bridge.get(id, "started").unwrap(), Value::from(true));
        assert_eq!(timers.active_count(), 1);

        stop_timer(&mut bridge, id).unwrap();
        stop_timer(&mut bridge, id).unwrap();
        assert_eq!(bridge.get(id, "started").unwrap(), Value::from(false));
        assert_eq!(timers.active_count(), 0);
    }

    #[test]
    fn test_script_timer_rejects_bad_timeout() {
        let (mut bridge, class, _) = timer_bridge();
        let id = bridge.allocate(class).unwrap();
        assert!(bridge.set(id, "timeout", Value::from(0.0)).is_err());
        assert!(bridge.set(id, "timeout", Value::from("soon")).is_err());
        assert!(bridge.set(id, "started", Value::from(true)).is_err());
        let err = bridge.set(id, "timeout", Value::from(1e300)).unwrap_err();
        assert_eq!(err.kind(), mosaic_core::ErrorKind::Script);
        assert_eq!(bridge.get(id, "timeout").unwrap(), Value::Nil);
    }
}
