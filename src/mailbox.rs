//! Single-slot hand-off between the capture thread and the renderer.
//!
//! The slot holds at most one pending frame. Once the renderer takes it, the
//! frame is "in draw" until its [`FrameLease`] is dropped. What happens to a
//! frame arriving while the slot is busy is decided by [`Backpressure`].

use crate::capture::FrameSink;
use crate::frame::Frame;
use serde::Deserialize;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Policy for frames that arrive while the slot is busy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backpressure {
    /// Drop the new frame if one is pending or being drawn
    #[default]
    DropIncoming,
    /// Replace a pending frame that was not taken yet (late frames are discarded)
    ReplacePending,
    /// Block the capture thread until its frame has been drawn
    WaitForDraw,
}

impl FromStr for Backpressure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "drop-incoming" => Ok(Backpressure::DropIncoming),
            "replace-pending" => Ok(Backpressure::ReplacePending),
            "wait-for-draw" => Ok(Backpressure::WaitForDraw),
            other => Err(format!(
                "unknown backpressure `{other}` (drop-incoming, replace-pending, wait-for-draw)"
            )),
        }
    }
}

impl fmt::Display for Backpressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Backpressure::DropIncoming => "drop-incoming",
            Backpressure::ReplacePending => "replace-pending",
            Backpressure::WaitForDraw => "wait-for-draw",
        };
        f.write_str(name)
    }
}

/// What happened to an offered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Stored in the empty slot
    Accepted,
    /// Stored, evicting a pending frame that was never drawn
    Replaced,
    /// Discarded because the slot was busy
    Dropped,
    /// Discarded because the renderer is gone
    Closed,
}

/// Called whenever a frame lands in the slot, e.g. to request a redraw.
pub type Notifier = Arc<dyn Fn() + Send + Sync>;

/// Counters since the mailbox was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStats {
    pub offered: u64,
    pub accepted: u64,
    pub replaced: u64,
    pub dropped: u64,
    pub released: u64,
}

#[derive(Default)]
struct Slot {
    pending: Option<Frame>,
    in_draw: bool,
    closed: bool,
    /// Bumped every time a lease is released
    generation: u64,
    stats: MailboxStats,
}

impl Slot {
    fn busy(&self) -> bool {
        self.pending.is_some() || self.in_draw
    }
}

struct Shared {
    slot: Mutex<Slot>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        // A panicking holder cannot leave the slot half-updated
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Creates a connected sender/receiver pair.
pub fn frame_mailbox(
    policy: Backpressure,
    notifier: Option<Notifier>,
) -> (MailboxSender, MailboxReceiver) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot::default()),
        changed: Condvar::new(),
    });
    (
        MailboxSender {
            shared: shared.clone(),
            policy,
            notifier,
        },
        MailboxReceiver { shared },
    )
}

/// Capture side of the mailbox.
pub struct MailboxSender {
    shared: Arc<Shared>,
    policy: Backpressure,
    notifier: Option<Notifier>,
}

impl MailboxSender {
    pub fn policy(&self) -> Backpressure {
        self.policy
    }

    /// Replaces the callback run whenever a frame is stored.
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Hands a frame to the renderer according to the backpressure policy.
    pub fn offer(&self, frame: Frame) -> Offer {
        let mut slot = self.shared.lock();
        slot.stats.offered += 1;
        if slot.closed {
            slot.stats.dropped += 1;
            return Offer::Closed;
        }

        let offer = match self.policy {
            Backpressure::DropIncoming => {
                if slot.busy() {
                    slot.stats.dropped += 1;
                    return Offer::Dropped;
                }
                slot.pending = Some(frame);
                Offer::Accepted
            }
            Backpressure::ReplacePending => {
                if slot.pending.replace(frame).is_some() {
                    slot.stats.replaced += 1;
                    Offer::Replaced
                } else {
                    Offer::Accepted
                }
            }
            Backpressure::WaitForDraw => {
                while slot.busy() && !slot.closed {
                    slot = self.shared.changed.wait(slot).unwrap_or_else(|e| e.into_inner());
                }
                if slot.closed {
                    slot.stats.dropped += 1;
                    return Offer::Closed;
                }
                slot.pending = Some(frame);
                slot.stats.accepted += 1;
                let generation = slot.generation;
                drop(slot);
                self.notify();

                // Hold the capture thread until this frame's lease is released
                let mut slot = self.shared.lock();
                while slot.generation == generation && !slot.closed {
                    slot = self.shared.changed.wait(slot).unwrap_or_else(|e| e.into_inner());
                }
                return Offer::Accepted;
            }
        };

        slot.stats.accepted += 1;
        drop(slot);
        self.notify();
        offer
    }

    fn notify(&self) {
        if let Some(notifier) = &self.notifier {
            notifier();
        }
    }
}

impl FrameSink for MailboxSender {
    fn on_frame(&mut self, frame: Frame) {
        self.offer(frame);
    }
}

/// Render side of the mailbox.
pub struct MailboxReceiver {
    shared: Arc<Shared>,
}

impl MailboxReceiver {
    /// Takes the pending frame, marking it as in draw until the lease drops.
    ///
    /// Returns `None` when nothing is pending or a lease is still alive.
    pub fn take(&self) -> Option<FrameLease> {
        let mut slot = self.shared.lock();
        if slot.in_draw {
            return None;
        }
        let frame = slot.pending.take()?;
        slot.in_draw = true;
        Some(FrameLease {
            frame,
            shared: self.shared.clone(),
        })
    }

    /// Whether a frame is waiting to be drawn.
    pub fn has_pending(&self) -> bool {
        self.shared.lock().pending.is_some()
    }

    pub fn stats(&self) -> MailboxStats {
        self.shared.lock().stats
    }
}

impl Drop for MailboxReceiver {
    fn drop(&mut self) {
        let mut slot = self.shared.lock();
        slot.closed = true;
        slot.pending = None;
        self.shared.changed.notify_all();
    }
}

/// Scoped ownership of the frame being drawn.
pub struct FrameLease {
    frame: Frame,
    shared: Arc<Shared>,
}

impl Deref for FrameLease {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        &self.frame
    }
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        let mut slot = self.shared.lock();
        slot.in_draw = false;
        slot.generation += 1;
        slot.stats.released += 1;
        self.shared.changed.notify_all();
    }
}
