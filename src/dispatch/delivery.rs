//! Event delivery sink.
//!
//! Each context owns one sink. In inline mode the handler runs directly on
//! the interrupt path and must not block. In deferred mode the interrupt path
//! only pushes into a bounded lock-free queue and a blocking context runs
//! the handler later through [`EventSink::drain`].

use alloc::vec::Vec;

use spin::Mutex;

use super::queue::{EventQueue, QueuedEvent};
use crate::config::DeliveryMode;
use crate::context::{ContextId, IspEventHandler};
use crate::error::IspError;
use crate::event::HwEvent;

/// Result of handing one event to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The handler ran and accepted the event.
    Delivered,
    /// The handler ran and returned an error.
    Rejected(IspError),
    /// Stored for a later drain.
    Queued,
    /// Dropped, the deferred queue was full.
    Overflowed,
}

/// Per-context delivery sink.
pub enum EventSink {
    Inline,
    Deferred {
        queue: EventQueue,
        /// Serializes drains so two drainers cannot interleave handler calls.
        drain_lock: Mutex<()>,
    },
}

impl EventSink {
    pub fn new(mode: DeliveryMode, depth: usize) -> Self {
        match mode {
            DeliveryMode::Inline => Self::Inline,
            DeliveryMode::Deferred => Self::Deferred {
                queue: EventQueue::new(depth),
                drain_lock: Mutex::new(()),
            },
        }
    }

    pub fn mode(&self) -> DeliveryMode {
        match self {
            Self::Inline => DeliveryMode::Inline,
            Self::Deferred { .. } => DeliveryMode::Deferred,
        }
    }

    /// Hands `event` to `handler` or queues it. Safe from interrupt context.
    ///
    /// `completes_group` marks a DONE that closes a completion group; a
    /// deferred sink keeps headroom for those and reports the mark back
    /// from [`drain`](Self::drain).
    pub fn deliver(
        &self,
        ctx: ContextId,
        handler: &dyn IspEventHandler,
        event: &HwEvent,
        completes_group: bool,
    ) -> Delivery {
        match self {
            Self::Inline => match handler.on_event(ctx, event) {
                Ok(()) => Delivery::Delivered,
                Err(err) => Delivery::Rejected(err),
            },
            Self::Deferred { queue, .. } => {
                if queue.push(*event, completes_group) {
                    Delivery::Queued
                } else {
                    Delivery::Overflowed
                }
            }
        }
    }

    /// Runs `handler` for up to `max` queued events in arrival order.
    ///
    /// Returns the drained events with the handler's verdict for each. An
    /// inline sink has nothing to drain.
    pub fn drain(
        &self,
        ctx: ContextId,
        handler: &dyn IspEventHandler,
        max: usize,
    ) -> Vec<(QueuedEvent, Delivery)> {
        let Self::Deferred { queue, drain_lock } = self else {
            return Vec::new();
        };
        let _guard = drain_lock.lock();
        let batch = queue.drain(max);
        batch
            .into_iter()
            .map(|queued| {
                let verdict = match handler.on_event(ctx, &queued.event) {
                    Ok(()) => Delivery::Delivered,
                    Err(err) => Delivery::Rejected(err),
                };
                (queued, verdict)
            })
            .collect()
    }

    /// Number of queued events.
    pub fn pending(&self) -> usize {
        match self {
            Self::Inline => 0,
            Self::Deferred { queue, .. } => queue.len(),
        }
    }

    /// Drops every queued event. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        match self {
            Self::Inline => 0,
            Self::Deferred { queue, drain_lock } => {
                let _guard = drain_lock.lock();
                queue.clear()
            }
        }
    }
}

impl core::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventSink")
            .field("mode", &self.mode())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IspResult;
    use crate::event::{EventData, EventSource, RegUpdateEventData};
    use crate::hw::{HwFamily, HwLineId};
    use crate::record::ResourceHandle;
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    impl IspEventHandler for Counting {
        fn on_event(&self, _ctx: ContextId, _event: &HwEvent) -> IspResult {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                return Err(IspError::Busy);
            }
            Ok(())
        }
    }

    fn event() -> HwEvent {
        HwEvent::new(
            EventSource {
                line: HwLineId::new(HwFamily::Ife, 1),
                handle: ResourceHandle(2),
            },
            EventData::RegUpdate(RegUpdateEventData { timestamp: 5 }),
        )
    }

    #[test]
    fn test_inline_calls_handler() {
        let sink = EventSink::new(DeliveryMode::Inline, 8);
        let handler = Counting {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        assert_eq!(sink.deliver(ContextId(1), &handler, &event(), false), Delivery::Delivered);
        assert_eq!(handler.calls.load(Ordering::Relaxed), 1);
        assert!(sink.drain(ContextId(1), &handler, 8).is_empty());
    }

    #[test]
    fn test_inline_reports_rejection() {
        let sink = EventSink::new(DeliveryMode::Inline, 8);
        let handler = Counting {
            calls: AtomicUsize::new(0),
            fail: true,
        };
        assert_eq!(
            sink.deliver(ContextId(1), &handler, &event(), false),
            Delivery::Rejected(IspError::Busy)
        );
    }

    #[test]
    fn test_deferred_queues_until_drained() {
        let sink = EventSink::new(DeliveryMode::Deferred, 2);
        let handler = Counting {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        assert_eq!(sink.deliver(ContextId(1), &handler, &event(), false), Delivery::Queued);
        assert_eq!(sink.deliver(ContextId(1), &handler, &event(), false), Delivery::Queued);
        assert_eq!(sink.deliver(ContextId(1), &handler, &event(), false), Delivery::Overflowed);
        assert_eq!(handler.calls.load(Ordering::Relaxed), 0);

        let drained = sink.drain(ContextId(1), &handler, 1);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].1, Delivery::Delivered);
        assert_eq!(sink.pending(), 1);
        assert_eq!(sink.clear(), 1);
        assert_eq!(handler.calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_deferred_keeps_room_for_completions() {
        let sink = EventSink::new(DeliveryMode::Deferred, 1);
        let handler = Counting {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        assert_eq!(sink.deliver(ContextId(1), &handler, &event(), false), Delivery::Queued);
        assert_eq!(sink.deliver(ContextId(1), &handler, &event(), false), Delivery::Overflowed);
        assert_eq!(sink.deliver(ContextId(1), &handler, &event(), true), Delivery::Queued);

        let drained = sink.drain(ContextId(1), &handler, usize::MAX);
        assert_eq!(drained.len(), 2);
        assert!(!drained[0].0.completes_group);
        assert!(drained[1].0.completes_group);
        assert_eq!(handler.calls.load(Ordering::Relaxed), 2);
    }
}
