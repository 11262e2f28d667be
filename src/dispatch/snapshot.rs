//! Double-buffered table readable from interrupt context.
//!
//! Two copies of the value sit behind their own read-write locks and an
//! atomic index names the active one. A writer (blocking context only)
//! updates the inactive copy, flips the index, then brings the other copy
//! level. Readers only ever `try_read` the active copy, so a reader that
//! preempts a writer on the same CPU never finds its copy write-locked.

use core::sync::atomic::{AtomicUsize, Ordering};

use spin::{Mutex, RwLock};

/// A value published to lock-free readers through two alternating copies.
pub struct SnapshotCell<T> {
    copies: [RwLock<T>; 2],
    active: AtomicUsize,
    /// Serializes writers. Never taken on the read side.
    writer: Mutex<()>,
}

impl<T: Clone> SnapshotCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            copies: [RwLock::new(value.clone()), RwLock::new(value)],
            active: AtomicUsize::new(0),
            writer: Mutex::new(()),
        }
    }
}

impl<T> SnapshotCell<T> {
    /// Runs `f` on the current snapshot. Safe from interrupt context.
    ///
    /// `f` must not update this cell.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        loop {
            let active = self.active.load(Ordering::Acquire);
            if let Some(guard) = self.copies[active].try_read() {
                return f(&guard);
            }
            // A writer on another CPU flipped the index after our load.
            core::hint::spin_loop();
        }
    }

    /// Applies `f` to both copies, publishing the result in between.
    ///
    /// `f` runs twice and must make the same change both times. If the first
    /// run fails nothing is published and the error is returned. Blocking
    /// context only: the second run waits for readers of the old copy.
    pub fn update<R, E>(&self, mut f: impl FnMut(&mut T) -> Result<R, E>) -> Result<R, E> {
        let _writer = self.writer.lock();
        let active = self.active.load(Ordering::Acquire);
        let inactive = active ^ 1;

        let result = f(&mut self.copies[inactive].write())?;
        self.active.store(inactive, Ordering::Release);
        let _ = f(&mut self.copies[active].write());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::BTreeMap;

    #[test]
    fn test_read_during_update_sees_a_whole_copy() {
        let cell = SnapshotCell::new(BTreeMap::from([(1u32, 10u32)]));
        let mut seen = alloc::vec::Vec::new();

        // Reads issued from inside the writer stand in for an interrupt
        // arriving mid-update on the writer's CPU.
        cell.update::<_, ()>(|map| {
            seen.push(cell.read(|current| current.get(&2).copied()));
            map.insert(2, 20);
            Ok(())
        })
        .unwrap();

        assert_eq!(seen, [None, Some(20)]);
        assert_eq!(cell.read(|map| map.len()), 2);
    }

    #[test]
    fn test_failed_update_publishes_nothing() {
        let cell = SnapshotCell::new(0u32);
        let result: Result<(), &str> = cell.update(|value| {
            if *value == 0 {
                return Err("rejected");
            }
            *value += 1;
            Ok(())
        });
        assert_eq!(result, Err("rejected"));
        assert_eq!(cell.read(|value| *value), 0);

        cell.update::<_, ()>(|value| {
            *value += 5;
            Ok(())
        })
        .unwrap();
        assert_eq!(cell.read(|value| *value), 5);
    }
}
