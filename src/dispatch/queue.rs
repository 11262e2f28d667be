//! Bounded per-context event ring for deferred delivery.
//!
//! Producers run on the interrupt path, possibly on several CPUs at once for
//! a multi-line context, so pushes are lock-free. Each slot carries a
//! sequence number that hands it back and forth between producers and the
//! consumer; whoever wins the slot owns its value until it publishes the
//! next sequence.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::event::HwEvent;
use crate::hw::{ISP_BUS_COMP_NUM_MAX, SFE_BUS_COMP_NUM_MAX};

/// Slots beyond the configured depth that only completion-bearing events may
/// take, one per completion group a context can wait on.
pub const COMPLETION_HEADROOM: usize = ISP_BUS_COMP_NUM_MAX + SFE_BUS_COMP_NUM_MAX;

/// An event waiting in a deferred queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedEvent {
    /// Position in this context's queue order.
    pub seq: u64,
    pub event: HwEvent,
    /// Handing this event over completes one outstanding completion group.
    pub completes_group: bool,
}

struct Slot {
    seq: AtomicUsize,
    value: UnsafeCell<Option<QueuedEvent>>,
}

/// Bounded FIFO of translated events.
///
/// When ordinary events reach `depth` the newest is dropped and counted.
/// Completion-bearing events may still use [`COMPLETION_HEADROOM`] further
/// slots. Older events are never displaced, so the context sees a gap at the
/// tail, not a reordering.
pub struct EventQueue {
    slots: Box<[Slot]>,
    mask: usize,
    depth: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
    overflowed: AtomicU64,
}

// SAFETY: a slot's value is only touched by the producer or consumer that
// won that slot's position through `tail`/`head`, and the slot's sequence
// number is published with release ordering after the access.
unsafe impl Sync for EventQueue {}

impl EventQueue {
    /// Creates a queue holding at most `depth` ordinary events.
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        let capacity = (depth + COMPLETION_HEADROOM).next_power_of_two();
        let slots: Vec<Slot> = (0..capacity)
            .map(|i| Slot {
                seq: AtomicUsize::new(i),
                value: UnsafeCell::new(None),
            })
            .collect();
        Self {
            slots: slots.into_boxed_slice(),
            mask: capacity - 1,
            depth,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            overflowed: AtomicU64::new(0),
        }
    }

    /// Appends `event`. Returns `false` if it was dropped because the queue
    /// is full. Safe from interrupt context.
    pub fn push(&self, event: HwEvent, completes_group: bool) -> bool {
        if !completes_group && self.len() >= self.depth {
            self.overflowed.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let mut pos = self.tail.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & self.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(pos) as isize;
            if diff == 0 {
                match self.tail.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: winning `tail` at `pos` gives this producer
                        // the slot until the sequence store below.
                        unsafe {
                            *slot.value.get() = Some(QueuedEvent {
                                seq: pos as u64,
                                event,
                                completes_group,
                            });
                        }
                        slot.seq.store(pos.wrapping_add(1), Ordering::Release);
                        return true;
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                self.overflowed.fetch_add(1, Ordering::Relaxed);
                return false;
            } else {
                pos = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    fn pop(&self) -> Option<QueuedEvent> {
        let mut pos = self.head.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & self.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(pos.wrapping_add(1)) as isize;
            if diff == 0 {
                match self.head.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: winning `head` at `pos` gives this consumer
                        // the slot until the sequence store below.
                        let value = unsafe { (*slot.value.get()).take() };
                        slot.seq
                            .store(pos.wrapping_add(self.mask + 1), Ordering::Release);
                        return value;
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                return None;
            } else {
                pos = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Removes up to `max` events from the head.
    pub fn drain(&self, max: usize) -> Vec<QueuedEvent> {
        let mut batch = Vec::new();
        while batch.len() < max {
            let Some(queued) = self.pop() else {
                break;
            };
            batch.push(queued);
        }
        batch
    }

    /// Events currently queued. May lag a push or pop in progress.
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head).min(self.mask + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ordinary events the queue holds before dropping.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Events dropped because the queue was full.
    pub fn overflowed(&self) -> u64 {
        self.overflowed.load(Ordering::Relaxed)
    }

    /// Drops everything queued. Returns how many events were dropped.
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        while self.pop().is_some() {
            dropped += 1;
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EofEventData, EventData, EventSource};
    use crate::hw::{HwFamily, HwLineId};
    use crate::record::ResourceHandle;

    fn eof(timestamp: u64) -> HwEvent {
        HwEvent::new(
            EventSource {
                line: HwLineId::new(HwFamily::Tfe, 0),
                handle: ResourceHandle(1),
            },
            EventData::Eof(EofEventData { timestamp }),
        )
    }

    #[test]
    fn test_queue_fifo_order() {
        let queue = EventQueue::new(4);
        for ts in 0..3 {
            assert!(queue.push(eof(ts), false));
        }
        let drained = queue.drain(2);
        assert_eq!(drained[0].event.timestamp(), 0);
        assert_eq!(drained[1].event.timestamp(), 1);
        assert_eq!(queue.drain(1)[0].seq, 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_overflow_drops_newest() {
        let queue = EventQueue::new(2);
        assert!(queue.push(eof(10), false));
        assert!(queue.push(eof(11), false));
        assert!(!queue.push(eof(12), false));
        assert_eq!(queue.overflowed(), 1);
        assert_eq!(queue.len(), 2);

        let drained = queue.drain(usize::MAX);
        assert_eq!(drained.last().unwrap().event.timestamp(), 11);

        // Dropped events do not take a position.
        queue.push(eof(13), false);
        assert_eq!(queue.drain(1)[0].seq, 2);
    }

    #[test]
    fn test_completions_use_headroom() {
        let queue = EventQueue::new(1);
        assert!(queue.push(eof(0), false));
        assert!(!queue.push(eof(1), false));

        for ts in 0..COMPLETION_HEADROOM as u64 {
            assert!(queue.push(eof(100 + ts), true));
        }
        assert_eq!(queue.len(), 1 + COMPLETION_HEADROOM);
        assert_eq!(queue.overflowed(), 1);

        let drained = queue.drain(usize::MAX);
        assert!(!drained[0].completes_group);
        assert!(drained[1..].iter().all(|q| q.completes_group));
        assert_eq!(queue.clear(), 0);
    }

    #[test]
    fn test_queue_wraps_around() {
        let queue = EventQueue::new(2);
        for ts in 0..200 {
            assert!(queue.push(eof(ts), false));
            assert_eq!(queue.drain(1)[0].event.timestamp(), ts);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_zero_depth() {
        let queue = EventQueue::new(0);
        assert_eq!(queue.depth(), 1);
        assert!(queue.push(eof(0), false));
        assert!(!queue.push(eof(1), false));
    }
}
