//! Events delivered by the reactor and its collaborators.
//!
//! Collaborators may live on other threads; they hold an [`EventSender`] and
//! push [`WmEvent`]s. The driver drains the channel on the main thread and
//! dispatches each event into the bridge.

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::error::{Result, WmError};
use crate::modifiers::ModifierMask;
use crate::spawn::StartupEvent;
use crate::timer::{TimerId, TimerOwner};

/// An event for the window manager.
#[derive(Debug, Clone, PartialEq)]
pub enum WmEvent {
    /// A timer came due.
    TimerExpired {
        id: TimerId,
        owner: TimerOwner,
    },

    /// A startup-notification event.
    Startup(StartupEvent),

    /// A key was pressed or released on the root window.
    Key {
        keycode: u32,
        /// Keysym name, when the collaborator could translate it.
        keysym: Option<String>,
        modifiers: ModifierMask,
        pressed: bool,
    },

    /// Request to quit the window manager.
    Quit,
}

impl WmEvent {
    /// A key press event.
    pub fn key_press(keycode: u32, keysym: Option<&str>, modifiers: ModifierMask) -> Self {
        Self::Key {
            keycode,
            keysym: keysym.map(str::to_owned),
            modifiers,
            pressed: true,
        }
    }

    /// A key release event.
    pub fn key_release(keycode: u32, keysym: Option<&str>, modifiers: ModifierMask) -> Self {
        Self::Key {
            keycode,
            keysym: keysym.map(str::to_owned),
            modifiers,
            pressed: false,
        }
    }
}

/// Sending half of the event channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: Sender<WmEvent>,
}

impl EventSender {
    /// Queue an event for the driver.
    pub fn send(&self, event: WmEvent) -> Result<()> {
        self.sender.send(event).map_err(|_| WmError::Disconnected)
    }
}

/// Receiving half of the event channel, owned by the driver.
#[derive(Debug)]
pub struct EventQueue {
    receiver: Receiver<WmEvent>,
}

impl EventQueue {
    /// Take the next queued event without blocking.
    pub fn try_next(&self) -> Option<WmEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                tracing::trace!(target: "mosaic::event", "all senders dropped");
                None
            }
        }
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// Create an unbounded event channel.
pub fn channel() -> (EventSender, EventQueue) {
    let (sender, receiver) = crossbeam_channel::unbounded();
    (EventSender { sender }, EventQueue { receiver })
}
