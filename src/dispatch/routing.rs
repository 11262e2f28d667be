//! Event routing table.
//!
//! Maps an event source (hardware line, resource handle) to the context that
//! currently claims it. The router publishes it through a
//! [`SnapshotCell`](super::snapshot::SnapshotCell), so the table itself
//! carries no lock.

use alloc::collections::BTreeMap;

use axerrno::{AxResult, ax_err};

use crate::context::ContextId;
use crate::event::EventSource;

/// Routing table keyed by event source.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    table: BTreeMap<EventSource, ContextId>,
}

impl RoutingTable {
    /// Creates an empty routing table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims every source in `sources` for `ctx`, or none of them.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if any source is already routed.
    pub fn register_all(&mut self, sources: &[EventSource], ctx: ContextId) -> AxResult {
        if sources.iter().any(|s| self.table.contains_key(s)) {
            return ax_err!(AlreadyExists, "event source already routed");
        }

        for source in sources {
            self.table.insert(*source, ctx);
        }
        Ok(())
    }

    /// Removes every route owned by `ctx`. Returns how many were removed.
    pub fn unregister_context(&mut self, ctx: ContextId) -> usize {
        let before = self.table.len();
        self.table.retain(|_, owner| *owner != ctx);
        before - self.table.len()
    }

    /// Context owning `source`, if any.
    #[inline]
    pub fn lookup(&self, source: &EventSource) -> Option<ContextId> {
        self.table.get(source).copied()
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::{HwFamily, HwLineId};
    use crate::record::ResourceHandle;
    use axerrno::AxError;

    fn source(instance: u8, handle: u32) -> EventSource {
        EventSource {
            line: HwLineId::new(HwFamily::Ife, instance),
            handle: ResourceHandle(handle),
        }
    }

    #[test]
    fn test_routing_table_basic() {
        let mut table = RoutingTable::new();
        table.register_all(&[source(0, 1)], ContextId(1)).unwrap();
        assert_eq!(table.lookup(&source(0, 1)), Some(ContextId(1)));
        assert_eq!(table.lookup(&source(1, 1)), None);

        assert_eq!(
            table.register_all(&[source(0, 1)], ContextId(2)),
            Err(AxError::AlreadyExists)
        );

        assert_eq!(table.unregister_context(ContextId(1)), 1);
        assert!(table.is_empty());
        assert_eq!(table.unregister_context(ContextId(1)), 0);
    }

    #[test]
    fn test_register_all_is_all_or_nothing() {
        let mut table = RoutingTable::new();
        table.register_all(&[source(1, 2)], ContextId(1)).unwrap();

        let batch = [source(0, 1), source(1, 2)];
        assert!(table.register_all(&batch, ContextId(2)).is_err());
        assert_eq!(table.lookup(&source(0, 1)), None);

        table.register_all(&[source(0, 1), source(0, 3)], ContextId(2)).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.unregister_context(ContextId(2)), 2);
        assert_eq!(table.len(), 1);
    }
}
