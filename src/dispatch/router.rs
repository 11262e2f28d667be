//! Context dispatch router.
//!
//! Resolves each translated event to the context claiming its
//! (line, resource handle) source and hands it to that context's sink.
//! Everything on the dispatch side may run on the interrupt path: a
//! snapshot read that never waits on a writer, atomics on the context, and a
//! lock-free push into a deferred sink.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use axerrno::{AxResult, ax_err};

use super::delivery::Delivery;
use super::routing::RoutingTable;
use super::snapshot::SnapshotCell;
use crate::context::{ContextId, IspContext};
use crate::event::{EventData, HwEvent};
use crate::lifecycle::ContextState;
use crate::record::DoneProgress;

/// Dispatch counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Events handed to a handler or queued for one.
    pub delivered: AtomicU64,
    /// Events with no claiming context.
    pub orphaned: AtomicU64,
    /// Events for a context not accepting events (paused, recovering, ...).
    pub suppressed: AtomicU64,
    /// Events dropped by a full deferred queue.
    pub overflowed: AtomicU64,
    /// Events the handler returned an error for.
    pub rejected: AtomicU64,
    /// DONE reports absorbed while their completion group was still partial.
    pub absorbed: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStatsSnapshot {
    pub delivered: u64,
    pub orphaned: u64,
    pub suppressed: u64,
    pub overflowed: u64,
    pub rejected: u64,
    pub absorbed: u64,
}

impl DispatchStats {
    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            orphaned: self.orphaned.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            overflowed: self.overflowed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            absorbed: self.absorbed.load(Ordering::Relaxed),
        }
    }
}

/// What happened to one dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Reached the context (handler ran or event queued).
    Delivered(ContextId),
    /// The handler ran and returned an error.
    Rejected(ContextId),
    /// Partial DONE for a completion group; held back.
    Absorbed(ContextId),
    /// The context is not accepting events.
    Suppressed(ContextId),
    /// The context's deferred queue was full.
    Overflowed(ContextId),
    /// No context claims the event's source.
    Orphaned,
}

#[derive(Clone, Default)]
struct DispatchTable {
    routes: RoutingTable,
    contexts: BTreeMap<ContextId, Arc<IspContext>>,
}

/// Routes events to contexts.
///
/// Routes and contexts are published together through a [`SnapshotCell`], so
/// [`dispatch`](Self::dispatch) never waits on `attach` or `detach`. A fatal
/// error moves its context to Recovering; [`recovering`](Self::recovering)
/// lists those for the blocking side.
pub struct ContextDispatchRouter {
    table: SnapshotCell<DispatchTable>,
    stats: DispatchStats,
}

impl ContextDispatchRouter {
    pub fn new() -> Self {
        Self {
            table: SnapshotCell::new(DispatchTable::default()),
            stats: DispatchStats::default(),
        }
    }

    /// Makes `ctx` reachable through every source it claims.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if another context claims one of its sources or its
    /// id. Nothing is published then.
    pub fn attach(&self, ctx: Arc<IspContext>) -> AxResult {
        let id = ctx.id();
        let sources = ctx.event_sources();
        self.table.update(|table| -> AxResult {
            if table.contexts.contains_key(&id) {
                return ax_err!(AlreadyExists, "context id in use");
            }
            table.routes.register_all(&sources, id)?;
            table.contexts.insert(id, ctx.clone());
            Ok(())
        })?;
        debug!("{} attached with {} routes", id, sources.len());
        Ok(())
    }

    /// Removes `id` and every route it claims. A dispatch already running
    /// against the old snapshot finishes before this returns; later events
    /// become orphans.
    pub fn detach(&self, id: ContextId) -> Option<Arc<IspContext>> {
        let (removed, ctx) = self
            .table
            .update::<_, ()>(|table| {
                Ok((table.routes.unregister_context(id), table.contexts.remove(&id)))
            })
            .unwrap_or((0, None));
        if ctx.is_some() {
            debug!("{} detached, {} routes dropped", id, removed);
        }
        ctx
    }

    /// Attached context `id`.
    pub fn context(&self, id: ContextId) -> Option<Arc<IspContext>> {
        self.table.read(|table| table.contexts.get(&id).cloned())
    }

    /// Every attached context, in id order.
    pub fn contexts(&self) -> Vec<Arc<IspContext>> {
        self.table.read(|table| table.contexts.values().cloned().collect())
    }

    pub fn context_count(&self) -> usize {
        self.table.read(|table| table.contexts.len())
    }

    /// Number of (line, handle) routes currently published.
    pub fn route_count(&self) -> usize {
        self.table.read(|table| table.routes.len())
    }

    /// Live dispatch counters.
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Contexts the interrupt path moved to Recovering, in id order.
    pub fn recovering(&self) -> Vec<ContextId> {
        self.table.read(|table| {
            table
                .contexts
                .values()
                .filter(|ctx| ctx.state() == ContextState::Recovering)
                .map(|ctx| ctx.id())
                .collect()
        })
    }

    /// Dispatches one event. Safe from interrupt context.
    ///
    /// Inline handlers run inside the snapshot read and must not call back
    /// into blocking operations of the manager.
    pub fn dispatch(&self, event: &HwEvent) -> DispatchOutcome {
        self.table.read(|table| {
            let Some(ctx) = table
                .routes
                .lookup(&event.source)
                .and_then(|id| table.contexts.get(&id))
            else {
                return self.orphan(event);
            };
            self.deliver(ctx, event)
        })
    }

    fn deliver(&self, ctx: &IspContext, event: &HwEvent) -> DispatchOutcome {
        let id = ctx.id();

        if !ctx.lifecycle.accepts_events() {
            trace!("{} suppressed {} from {}", id, event.kind().as_str(), event.source.line);
            DispatchStats::bump(&self.stats.suppressed);
            return DispatchOutcome::Suppressed(id);
        }

        let mut completes_group = false;
        match &event.data {
            EventData::Sof(sof) => {
                ctx.record_sof(sof.timestamp, sof.boot_time);
                if ctx.sof_debug() {
                    info!("{} SOF on {} ts={} boot={}", id, event.source.line, sof.timestamp, sof.boot_time);
                }
            }
            EventData::Done(done) => {
                let line_pos = ctx.line_pos(event.source.line).unwrap_or(usize::MAX);
                match ctx
                    .record
                    .mark_done(line_pos, event.source.handle, done.last_consumed_addr)
                {
                    DoneProgress::Complete => completes_group = true,
                    DoneProgress::Pending => {
                        DispatchStats::bump(&self.stats.absorbed);
                        return DispatchOutcome::Absorbed(id);
                    }
                    DoneProgress::Unknown => return self.orphan(event),
                }
            }
            EventData::Error(err) => {
                warn!(
                    "{} error on {}: {} code={:#x} recovery={}",
                    id, event.source.line, err.error_kind, err.error_code, err.recovery_enabled
                );
            }
            EventData::RegUpdate(_)
            | EventData::Epoch(_)
            | EventData::Eof(_)
            | EventData::Secondary(_) => {}
        }

        trace!("{} <- {} from {}", id, event.kind().as_str(), event.source.line);
        let delivery = ctx.sink.deliver(id, ctx.handler(), event, completes_group);
        let outcome = match delivery {
            Delivery::Delivered | Delivery::Queued => {
                DispatchStats::bump(&self.stats.delivered);
                DispatchOutcome::Delivered(id)
            }
            Delivery::Rejected(err) => {
                debug!("{} handler rejected {}: {}", id, event.kind().as_str(), err);
                DispatchStats::bump(&self.stats.rejected);
                DispatchOutcome::Rejected(id)
            }
            Delivery::Overflowed => {
                warn!("{} event queue full, {} dropped", id, event.kind().as_str());
                DispatchStats::bump(&self.stats.overflowed);
                DispatchOutcome::Overflowed(id)
            }
        };

        // A queued completion counts down when it is drained; a dropped one
        // never reached the context.
        if completes_group && matches!(delivery, Delivery::Delivered | Delivery::Rejected(_)) {
            ctx.lifecycle.complete_one();
        }
        if let EventData::Error(err) = &event.data {
            if err.recovery_enabled
                && ctx
                    .lifecycle
                    .transition(&[ContextState::Running], ContextState::Recovering)
                    .is_ok()
            {
                warn!("{} entering recovery", id);
            }
        }
        outcome
    }

    fn orphan(&self, event: &HwEvent) -> DispatchOutcome {
        warn!(
            "orphaned {} from {} handle {}",
            event.kind().as_str(),
            event.source.line,
            event.source.handle.0
        );
        DispatchStats::bump(&self.stats.orphaned);
        DispatchOutcome::Orphaned
    }
}

impl Default for ContextDispatchRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IspHwMgrConfig;
    use crate::context::{AcquireArgs, AcquireFlags, ContextType, IspEventHandler};
    use crate::error::IspResult;
    use crate::event::{
        DoneEventData, ErrorEventData, ErrorKind, EventSource, SofEventData,
    };
    use crate::hw::{HwFamily, HwLineId};
    use crate::line::{HwLineIndex, LineRequest};
    use crate::record::{OutResourceRequest, ResourceHandle};
    use alloc::vec;
    use memory_addr::PhysAddr;
    use spin::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<HwEvent>>,
    }

    impl IspEventHandler for Recorder {
        fn on_event(&self, _ctx: ContextId, event: &HwEvent) -> IspResult {
            self.events.lock().push(*event);
            Ok(())
        }
    }

    const IFE0: HwLineId = HwLineId::new(HwFamily::Ife, 0);

    fn attach(router: &ContextDispatchRouter, handler: Arc<Recorder>) -> Arc<IspContext> {
        let args = AcquireArgs {
            ctx_type: ContextType::Rdi,
            lines: vec![LineRequest::single(HwFamily::Ife)],
            resources: vec![
                OutResourceRequest {
                    res_id: 0x3000,
                    family: HwFamily::Ife,
                    comp_group: 2,
                },
                OutResourceRequest {
                    res_id: 0x3001,
                    family: HwFamily::Ife,
                    comp_group: 2,
                },
            ],
            flags: AcquireFlags::empty(),
            handler,
        };
        let ctx = Arc::new(
            IspContext::new(
                ContextId(1),
                &args,
                [HwLineIndex(0)].into_iter().collect(),
                [IFE0].into_iter().collect(),
                &IspHwMgrConfig::default(),
            )
            .unwrap(),
        );
        router.attach(ctx.clone()).unwrap();
        ctx
    }

    fn done(handle: u32) -> HwEvent {
        HwEvent::new(
            EventSource {
                line: IFE0,
                handle: ResourceHandle(handle),
            },
            EventData::Done(DoneEventData {
                hw_family: HwFamily::Ife,
                comp_group_id: 2,
                last_consumed_addr: PhysAddr::from(0x1000usize),
                timestamp: 9,
            }),
        )
    }

    #[test]
    fn test_orphaned_event_is_dropped() {
        let router = ContextDispatchRouter::new();
        let event = done(1);
        assert_eq!(router.dispatch(&event), DispatchOutcome::Orphaned);
        assert_eq!(router.stats().snapshot().orphaned, 1);
    }

    #[test]
    fn test_suppressed_until_running() {
        let router = ContextDispatchRouter::new();
        let handler = Arc::new(Recorder::default());
        let ctx = attach(&router, handler.clone());
        assert_eq!(router.dispatch(&done(1)), DispatchOutcome::Suppressed(ctx.id()));

        ctx.lifecycle.force(ContextState::Running);
        let sof = HwEvent::new(
            EventSource {
                line: IFE0,
                handle: ResourceHandle::LINE,
            },
            EventData::Sof(SofEventData {
                timestamp: 77,
                boot_time: 1_077,
            }),
        );
        assert_eq!(router.dispatch(&sof), DispatchOutcome::Delivered(ctx.id()));
        assert_eq!(ctx.sof_timestamps().curr, 77);
        assert_eq!(handler.events.lock().len(), 1);
    }

    #[test]
    fn test_shared_group_delivers_once() {
        let router = ContextDispatchRouter::new();
        let handler = Arc::new(Recorder::default());
        let ctx = attach(&router, handler.clone());
        ctx.lifecycle.force(ContextState::Running);
        ctx.lifecycle.expect_completions(1);

        assert_eq!(router.dispatch(&done(1)), DispatchOutcome::Absorbed(ctx.id()));
        assert_eq!(router.dispatch(&done(2)), DispatchOutcome::Delivered(ctx.id()));
        assert_eq!(handler.events.lock().len(), 1);
        assert_eq!(ctx.lifecycle.outstanding(), 0);
        assert_eq!(router.stats().snapshot().absorbed, 1);
    }

    #[test]
    fn test_error_requests_recovery() {
        let router = ContextDispatchRouter::new();
        let handler = Arc::new(Recorder::default());
        let ctx = attach(&router, handler.clone());
        ctx.lifecycle.force(ContextState::Running);

        let error = HwEvent::new(
            EventSource {
                line: IFE0,
                handle: ResourceHandle::LINE,
            },
            EventData::Error(ErrorEventData {
                error_kind: ErrorKind::OVERFLOW,
                error_code: 1,
                timestamp: 3,
                recovery_enabled: true,
                enable_req_dump: false,
            }),
        );
        assert_eq!(router.dispatch(&error), DispatchOutcome::Delivered(ctx.id()));
        assert_eq!(ctx.state(), ContextState::Recovering);
        assert_eq!(router.recovering(), vec![ctx.id()]);

        // A second error while recovering is suppressed.
        assert_eq!(router.dispatch(&error), DispatchOutcome::Suppressed(ctx.id()));
        assert_eq!(router.recovering().len(), 1);
    }

    #[test]
    fn test_detach_orphans_later_events() {
        let router = ContextDispatchRouter::new();
        let ctx = attach(&router, Arc::new(Recorder::default()));
        ctx.lifecycle.force(ContextState::Running);
        assert!(router.detach(ctx.id()).is_some());
        assert_eq!(router.route_count(), 0);
        assert_eq!(router.dispatch(&done(1)), DispatchOutcome::Orphaned);
    }

    #[test]
    fn test_dispatch_while_routes_are_rewritten() {
        let router = ContextDispatchRouter::new();
        let handler = Arc::new(Recorder::default());
        let ctx = attach(&router, handler.clone());
        ctx.lifecycle.force(ContextState::Running);
        let sof = HwEvent::new(
            EventSource {
                line: IFE0,
                handle: ResourceHandle::LINE,
            },
            EventData::Sof(SofEventData {
                timestamp: 5,
                boot_time: 6,
            }),
        );

        // Dispatching from inside the writer is what an interrupt taken on
        // the writer's CPU looks like. It must neither spin nor see a half
        // written table.
        let mut outcomes = Vec::new();
        router
            .table
            .update::<_, ()>(|table| {
                outcomes.push(router.dispatch(&sof));
                table.routes.unregister_context(ctx.id());
                table.contexts.remove(&ctx.id());
                Ok(())
            })
            .unwrap();

        assert_eq!(outcomes, [DispatchOutcome::Delivered(ctx.id()), DispatchOutcome::Orphaned]);
        assert_eq!(handler.events.lock().len(), 1);
        assert_eq!(router.context_count(), 0);
    }
}
