//! ISP hardware manager.
//!
//! One [`IspHwMgr`] owns the hardware lines of a named device. It arbitrates
//! them between contexts, prepares and applies configuration packets, and
//! sequences start, stop, pause, resume, release and recovery.
//!
//! # Execution contexts
//!
//! - [`handle_irq`](IspHwMgr::handle_irq) runs on the interrupt path. It
//!   translates and dispatches without blocking and never surfaces an error;
//!   fatal errors are reported through the ERROR event and, when recovery is
//!   enabled, leave the context in Recovering.
//! - Everything else runs in a blocking-capable context. Operations on one
//!   binding are mutually exclusive: a second concurrent call gets
//!   [`IspError::Busy`] rather than interleaving.
//! - [`service_recovery`](IspHwMgr::service_recovery) must be called from a
//!   blocking context (for example a bottom-half worker) to perform the
//!   internal stop/restart of contexts the interrupt path marked.
//!
//! # Example
//!
//! ```rust,ignore
//! let out = mgr.acquire(AcquireArgs { .. })?;
//! let update = mgr.prepare(out.ctx, &init_packet)?;
//! mgr.start(out.ctx, StartArgs::new(update))?;
//! // interrupt handler: mgr.handle_irq(&raw);
//! mgr.stop(out.ctx, StopArgs::at_frame_boundary())?;
//! mgr.release(out.ctx)?;
//! ```

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use arrayvec::ArrayVec;
use spin::Mutex;

use crate::admission::{BwClkVote, ClockUsage};
use crate::command::{IspCommand, IspCommandOutput};
use crate::config::IspHwMgrConfig;
use crate::context::{
    AcquireArgs, AcquireOutput, ContextId, IspContext, LifecycleNotice, StartArgs, StopArgs,
};
use crate::dispatch::{ContextDispatchRouter, Delivery, DispatchStatsSnapshot};
use crate::error::{IspError, IspResult};
use crate::event::HwEventKind;
use crate::hw::{HwLineId, IspHwLineOps, MAX_LINES_PER_CTX, StopCmd};
use crate::lifecycle::ContextState;
use crate::line::{HwLineArena, LineStats};
use crate::packet::{ConfigPacket, HwUpdateDescriptor, PacketOpcode, build_update};
use crate::record::ResourceHandle;
use crate::registry::IommuHandle;
use crate::translator::{EventTranslator, RawIrq};

type LineOps<'a> = ArrayVec<&'a dyn IspHwLineOps, MAX_LINES_PER_CTX>;

/// Hardware manager for one named ISP device.
pub struct IspHwMgr {
    name: String,
    config: IspHwMgrConfig,
    iommu: IommuHandle,
    translator: EventTranslator,
    lines: HwLineArena,
    router: ContextDispatchRouter,
    next_ctx: AtomicU32,
    /// Serializes acquire so line claims and context-count checks agree.
    acquire_lock: Mutex<()>,
}

impl IspHwMgr {
    /// Creates a manager over `lines`.
    pub fn new(
        name: &str,
        lines: Vec<Arc<dyn IspHwLineOps>>,
        iommu: IommuHandle,
        config: IspHwMgrConfig,
    ) -> Self {
        let lines = HwLineArena::new(lines);
        debug!("{}: hw manager up with {} lines", name, lines.len());
        Self {
            name: String::from(name),
            config,
            iommu,
            translator: EventTranslator::from_config(&config),
            lines,
            router: ContextDispatchRouter::new(),
            next_ctx: AtomicU32::new(1),
            acquire_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &IspHwMgrConfig {
        &self.config
    }

    /// Memory-management domain handle of the device.
    pub fn iommu(&self) -> IommuHandle {
        self.iommu
    }

    pub fn lines(&self) -> &HwLineArena {
        &self.lines
    }

    /// Dispatch counters.
    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.router.stats().snapshot()
    }

    /// Interrupt counters of one line.
    pub fn line_stats(&self, line: HwLineId) -> Option<&LineStats> {
        self.lines.find(line).map(|(_, slot)| slot.stats())
    }

    /// Contexts currently acquired.
    pub fn active_contexts(&self) -> Vec<ContextId> {
        self.router.contexts().iter().map(|c| c.id()).collect()
    }

    pub fn context(&self, id: ContextId) -> IspResult<Arc<IspContext>> {
        self.router.context(id).ok_or(IspError::NotFound)
    }

    pub fn context_state(&self, id: ContextId) -> IspResult<ContextState> {
        Ok(self.context(id)?.state())
    }

    fn line_ops<'a>(&'a self, ctx: &IspContext) -> LineOps<'a> {
        ctx.lines()
            .iter()
            .filter_map(|index| self.lines.slot(*index))
            .map(|slot| slot.ops())
            .collect()
    }

    fn set_irqs(lines: &LineOps<'_>, enabled: bool) {
        for line in lines {
            line.set_irq_enabled(enabled);
        }
    }

    /// Next free context id. Zero marks a free line slot and is never handed
    /// out; after wrapping, ids still held by a live context are skipped.
    fn next_context_id(&self) -> ContextId {
        loop {
            let raw = self.next_ctx.fetch_add(1, Ordering::Relaxed);
            if raw != 0 && self.router.context(ContextId(raw)).is_none() {
                return ContextId(raw);
            }
        }
    }

    /// Binds hardware lines and output resources to a new context.
    ///
    /// # Errors
    ///
    /// [`IspError::ResourceExhausted`] when a requested family has no free
    /// line or context slot. Nothing stays claimed on failure.
    pub fn acquire(&self, args: AcquireArgs) -> IspResult<AcquireOutput> {
        let _guard = self.acquire_lock.lock();
        let id = self.next_context_id();

        let lines = self.lines.claim(id, &args.lines)?;
        let line_ids = lines
            .iter()
            .filter_map(|index| self.lines.slot(*index))
            .map(|slot| slot.id())
            .collect();

        let ctx = match IspContext::new(id, &args, lines.clone(), line_ids, &self.config) {
            Ok(ctx) => Arc::new(ctx),
            Err(err) => {
                self.lines.release(id, &lines);
                return Err(err);
            }
        };
        if let Err(err) = self.router.attach(ctx.clone()) {
            self.lines.release(id, &lines);
            return Err(err.into());
        }

        let output = AcquireOutput {
            ctx: id,
            lines: ctx.line_ids().iter().copied().collect(),
            handles: (1..=args.resources.len() as u32).map(ResourceHandle).collect(),
            flags: ctx.flags(),
        };
        debug!(
            "{}: acquired {} type={:?} lines={:?} resources={}",
            self.name,
            id,
            args.ctx_type,
            output.lines,
            output.handles.len()
        );
        Ok(output)
    }

    /// Validates `packet` and builds its hardware update descriptor, staging
    /// any bandwidth/clock vote it carries.
    ///
    /// The first packet after acquire or stop must be `INIT_DEV`; it moves
    /// the binding to Configured. Later packets leave the state unchanged.
    ///
    /// # Errors
    ///
    /// [`IspError::MalformedPacket`] or [`IspError::CapacityExceeded`] with
    /// the binding and its staged vote unchanged.
    pub fn prepare(&self, id: ContextId, packet: &ConfigPacket) -> IspResult<HwUpdateDescriptor> {
        let ctx = self.context(id)?;
        let _guard = ctx.ctrl.try_lock().ok_or(IspError::Busy)?;

        let state = ctx.state();
        let needs_init = match state {
            ContextState::Acquired | ContextState::Idle => true,
            ContextState::Configured | ContextState::Running => false,
            other => return Err(IspError::InvalidState(other)),
        };

        let update = build_update(id, packet, &ctx.record, ctx.max_cfg_entries())?;
        if needs_init && update.opcode != PacketOpcode::InitDev {
            return Err(IspError::MalformedPacket("first packet must be INIT_DEV"));
        }
        if let Some(vote) = &packet.bw_clk {
            ctx.admission.lock().stage(vote)?;
        }

        if needs_init {
            ctx.lifecycle
                .transition(&[state], ContextState::Configured)
                .map_err(IspError::InvalidState)?;
        }
        debug!(
            "{}: prepared req {} opcode={:?} writes={} groups={}",
            id,
            update.request_id,
            update.opcode,
            update.reg_writes.len(),
            update.expected_groups.len()
        );
        Ok(update)
    }

    /// Applies a prepared update at the next hardware-update boundary.
    ///
    /// The staged bandwidth/clock vote and the register writes go together:
    /// if the writes fail, the previous vote is re-issued and the staged vote
    /// stays staged.
    pub fn apply_update(&self, id: ContextId, update: &HwUpdateDescriptor) -> IspResult {
        let ctx = self.context(id)?;
        let _guard = ctx.ctrl.try_lock().ok_or(IspError::Busy)?;
        match ctx.state() {
            ContextState::Configured | ContextState::Running => self.apply_locked(&ctx, update),
            other => Err(IspError::InvalidState(other)),
        }
    }

    fn apply_locked(&self, ctx: &IspContext, update: &HwUpdateDescriptor) -> IspResult {
        if update.ctx != ctx.id() {
            return Err(IspError::InvalidArgument("update prepared for another context"));
        }
        let lines = self.line_ops(ctx);
        let mut admission = ctx.admission.lock();
        let previous = admission.active().clone();

        let voted = admission.apply_with(|vote| {
            let result = Self::program(&lines, vote, update);
            if result.is_err() && vote.is_some() && !previous.is_empty() {
                warn!("{}: update failed, restoring previous bw/clk vote", ctx.id());
                for line in &lines {
                    let _ = line.apply_bw_clk(&previous);
                }
            }
            result
        })?;

        ctx.set_last_cdm_done(update.request_id);
        ctx.lifecycle
            .expect_completions(update.expected_groups.len() as u32);
        trace!(
            "{}: applied req {} (bw/clk {})",
            ctx.id(),
            update.request_id,
            if voted { "updated" } else { "kept" }
        );
        Ok(())
    }

    fn program(lines: &LineOps<'_>, vote: Option<&BwClkVote>, update: &HwUpdateDescriptor) -> IspResult {
        if let Some(vote) = vote {
            for line in lines {
                line.apply_bw_clk(vote)?;
            }
        }
        if !update.reg_writes.is_empty() {
            for line in lines {
                line.write_regs(&update.reg_writes)?;
            }
        }
        Ok(())
    }

    /// Starts streaming.
    ///
    /// External starts are valid from Configured; internal starts from
    /// Recovering. Lines are initialized unless `start_only`, the optional
    /// update is applied, then lines start slaves first. On failure
    /// everything done so far is undone and the state is unchanged.
    pub fn start(&self, id: ContextId, args: StartArgs) -> IspResult {
        let ctx = self.context(id)?;
        let _guard = ctx.ctrl.try_lock().ok_or(IspError::Busy)?;
        self.start_locked(&ctx, &args)
    }

    fn start_locked(&self, ctx: &IspContext, args: &StartArgs) -> IspResult {
        let from = if args.internal {
            ContextState::Recovering
        } else {
            ContextState::Configured
        };
        let state = ctx.state();
        if state != from {
            return Err(IspError::InvalidState(state));
        }

        let lines = self.line_ops(ctx);
        let init_now = !args.start_only && !ctx.hw_initialized();
        if init_now {
            for (i, line) in lines.iter().enumerate() {
                if let Err(err) = line.init() {
                    warn!("{}: init of {} failed: {:?}", ctx.id(), line.id(), err);
                    for done in &lines[..i] {
                        let _ = done.deinit();
                    }
                    return Err(err.into());
                }
            }
            ctx.set_hw_initialized(true);
        }

        let undo_init = |ctx: &IspContext| {
            if init_now {
                for line in &lines {
                    let _ = line.deinit();
                }
                ctx.set_hw_initialized(false);
            }
        };

        if let Some(update) = &args.hw_update {
            if let Err(err) = self.apply_locked(ctx, update) {
                undo_init(ctx);
                return Err(err);
            }
        }

        Self::set_irqs(&lines, true);
        for (started, line) in lines.iter().rev().enumerate() {
            if let Err(err) = line.start() {
                warn!("{}: start of {} failed: {:?}", ctx.id(), line.id(), err);
                for up in lines.iter().rev().take(started) {
                    let _ = up.stop(StopCmd::Immediately);
                }
                Self::set_irqs(&lines, false);
                undo_init(ctx);
                return Err(err.into());
            }
        }

        ctx.lifecycle.set_paused(false);
        ctx.lifecycle
            .transition(&[from], ContextState::Running)
            .map_err(IspError::InvalidState)?;
        if !args.internal {
            debug!("{}: started", ctx.id());
            ctx.handler().on_lifecycle(ctx.id(), LifecycleNotice::Started);
        }
        Ok(())
    }

    /// Stops streaming.
    ///
    /// At a frame boundary the lines finish the current frame and the call
    /// waits, bounded by the configured budget, for the outstanding
    /// completion groups to reach the handler. A deferred-mode context has
    /// its queue drained while waiting and again before it goes Idle. A
    /// paused context cannot receive completions and skips the wait.
    /// Immediately masks interrupts,
    /// resets the lines and discards outstanding completions; a halt not
    /// acknowledged in time yields [`IspError::Timeout`] and the binding
    /// still ends Idle. `stop_only` keeps the lines initialized.
    pub fn stop(&self, id: ContextId, args: StopArgs) -> IspResult {
        let ctx = self.context(id)?;
        let _guard = ctx.ctrl.try_lock().ok_or(IspError::Busy)?;
        self.stop_locked(&ctx, &args)
    }

    fn stop_locked(&self, ctx: &IspContext, args: &StopArgs) -> IspResult {
        if args.internal {
            let state = ctx.state();
            if state != ContextState::Recovering {
                return Err(IspError::InvalidState(state));
            }
        } else {
            ctx.lifecycle
                .transition(
                    &[ContextState::Running, ContextState::Recovering],
                    ContextState::Stopping,
                )
                .map_err(IspError::InvalidState)?;
        }

        let lines = self.line_ops(ctx);
        let was_paused = ctx.lifecycle.set_paused(false);
        let mut result = Ok(());
        match args.cmd {
            StopCmd::AtFrameBoundary => {
                for line in &lines {
                    if let Err(err) = line.stop(StopCmd::AtFrameBoundary) {
                        result = result.and(Err(IspError::from(err)));
                    }
                }
                if was_paused {
                    debug!(
                        "{}: paused, dropping {} outstanding completions",
                        ctx.id(),
                        ctx.lifecycle.outstanding()
                    );
                } else if !ctx
                    .lifecycle
                    .wait_completions(self.config.frame_boundary_timeout_spins, || {
                        self.drain_sink(ctx, usize::MAX);
                    })
                {
                    warn!(
                        "{}: frame-boundary stop gave up with {} completions outstanding",
                        ctx.id(),
                        ctx.lifecycle.outstanding()
                    );
                }
            }
            StopCmd::Immediately => {
                Self::set_irqs(&lines, false);
                for line in &lines {
                    if let Err(err) = line.stop(StopCmd::Immediately) {
                        result = result.and(Err(IspError::from(err)));
                    }
                }
                let halted = ctx.lifecycle.wait_for(
                    || lines.iter().all(|l| l.is_halted()),
                    self.config.halt_timeout_spins,
                );
                if !halted {
                    warn!("{}: halt not acknowledged in time", ctx.id());
                    result = Err(IspError::Timeout);
                }
            }
        }

        Self::set_irqs(&lines, false);
        if !args.internal {
            self.drain_sink(ctx, usize::MAX);
        }
        ctx.reset_runtime();
        if !args.stop_only {
            for line in &lines {
                if let Err(err) = line.deinit() {
                    warn!("{}: deinit of {} failed: {:?}", ctx.id(), line.id(), err);
                }
            }
            ctx.set_hw_initialized(false);
        }

        if !args.internal {
            ctx.lifecycle.force(ContextState::Idle);
            debug!("{}: stopped ({:?})", ctx.id(), args.cmd);
            ctx.handler().on_lifecycle(ctx.id(), LifecycleNotice::Stopped);
        }
        result
    }

    /// Tears a context down from any state. Halts and deinitializes its
    /// lines, drops its routes, returns its lines and clears its votes.
    pub fn release(&self, id: ContextId) -> IspResult {
        let ctx = self.context(id)?;
        let _guard = ctx.ctrl.lock();
        let lines = self.line_ops(&ctx);

        Self::set_irqs(&lines, false);
        self.router.detach(id);

        if ctx.hw_initialized() || ctx.state() != ContextState::Acquired {
            for line in &lines {
                let _ = line.stop(StopCmd::Immediately);
                let _ = line.deinit();
            }
            ctx.set_hw_initialized(false);
        }

        self.lines.release(id, ctx.lines());
        ctx.admission.lock().clear();
        ctx.reset_runtime();
        let dropped = ctx.sink.clear();
        ctx.lifecycle.force(ContextState::Idle);
        debug!("{}: released {} ({} queued events dropped)", self.name, id, dropped);
        Ok(())
    }

    /// Releases every context. Returns how many were released.
    pub fn release_all(&self) -> usize {
        let ids = self.active_contexts();
        for id in &ids {
            let _ = self.release(*id);
        }
        ids.len()
    }

    /// Interrupt entry point: translates `raw` and dispatches the events.
    ///
    /// Returns the number of events produced.
    pub fn handle_irq(&self, raw: &RawIrq) -> usize {
        let Some(line) = raw.line else {
            warn!("{}: interrupt without line identity dropped", self.name);
            return 0;
        };
        let events = self.translator.translate(raw);
        let stats = self.lines.find(line).map(|(_, slot)| slot.stats());
        if let Some(stats) = stats {
            stats.record_irq(events.len());
        }

        for event in &events {
            if event.kind() == HwEventKind::Error {
                if let Some(stats) = stats {
                    stats.record_error();
                }
            }
            self.router.dispatch(event);
        }
        events.len()
    }

    /// Performs the internal stop/restart of every context the interrupt path
    /// moved to Recovering.
    ///
    /// Returns how many contexts were brought back to Running. A context
    /// whose restart fails ends Idle, its handler is told, and the call
    /// returns [`IspError::RecoveryFailed`] after servicing the rest.
    pub fn service_recovery(&self) -> IspResult<usize> {
        let mut recovered = 0;
        let mut failed = false;
        for id in self.router.recovering() {
            let Some(ctx) = self.router.context(id) else {
                continue;
            };
            let _guard = ctx.ctrl.lock();
            if ctx.state() != ContextState::Recovering {
                continue;
            }

            let restart = self
                .stop_locked(
                    &ctx,
                    &StopArgs {
                        cmd: StopCmd::Immediately,
                        stop_only: true,
                        internal: true,
                    },
                )
                .and_then(|()| {
                    self.start_locked(
                        &ctx,
                        &StartArgs {
                            hw_update: None,
                            start_only: true,
                            internal: true,
                        },
                    )
                });

            match restart {
                Ok(()) => {
                    warn!("{}: recovered", id);
                    recovered += 1;
                }
                Err(err) => {
                    error!("{}: recovery failed: {}", id, err);
                    Self::set_irqs(&self.line_ops(&ctx), false);
                    ctx.lifecycle.force(ContextState::Idle);
                    ctx.handler()
                        .on_lifecycle(id, LifecycleNotice::RecoveryFailed(err));
                    failed = true;
                }
            }
        }
        if failed {
            return Err(IspError::RecoveryFailed);
        }
        Ok(recovered)
    }

    /// Runs the handler for up to `max` queued events of a deferred-mode
    /// context. Returns how many were handed over.
    pub fn drain_events(&self, id: ContextId, max: usize) -> IspResult<usize> {
        let ctx = self.context(id)?;
        Ok(self.drain_sink(&ctx, max))
    }

    /// Hands queued events to the handler and counts down the completion
    /// groups they close.
    fn drain_sink(&self, ctx: &IspContext, max: usize) -> usize {
        let drained = ctx.sink.drain(ctx.id(), ctx.handler(), max);
        for (queued, verdict) in &drained {
            if let Delivery::Rejected(err) = verdict {
                debug!("{}: handler rejected queued event #{}: {}", ctx.id(), queued.seq, err);
                self.router.stats().rejected.fetch_add(1, Ordering::Relaxed);
            }
            if queued.completes_group {
                ctx.lifecycle.complete_one();
            }
        }
        drained.len()
    }

    /// Stages a bandwidth/clock vote outside a configuration packet.
    pub fn stage_vote(&self, id: ContextId, vote: &BwClkVote) -> IspResult {
        let ctx = self.context(id)?;
        let result = ctx.admission.lock().stage(vote);
        result
    }

    /// Applies the staged vote on its own. Returns `false` if nothing was
    /// staged, in which case the active vote is left as is.
    pub fn apply_vote(&self, id: ContextId) -> IspResult<bool> {
        let ctx = self.context(id)?;
        let _guard = ctx.ctrl.try_lock().ok_or(IspError::Busy)?;
        let lines = self.line_ops(&ctx);
        let result = ctx.admission.lock().apply_with(|vote| {
            if let Some(vote) = vote {
                for line in &lines {
                    line.apply_bw_clk(vote)?;
                }
            }
            Ok(())
        });
        result
    }

    /// Whether a dual pixel-path clock scheme is in effect for `id`.
    pub fn query_clock_usage_type(&self, id: ContextId) -> IspResult<ClockUsage> {
        let ctx = self.context(id)?;
        let usage = ctx.admission.lock().clock_usage();
        Ok(usage)
    }

    /// Executes a side-channel command.
    pub fn process_command(&self, id: ContextId, cmd: IspCommand<'_>) -> IspResult<IspCommandOutput> {
        let ctx = self.context(id)?;
        trace!("{}: command {}", id, cmd.name());
        let output = match cmd {
            IspCommand::IsRdiOnlyContext => IspCommandOutput::IsRdiOnly(ctx.is_rdi_only()),
            IspCommand::PauseHw => {
                self.pause(&ctx)?;
                IspCommandOutput::None
            }
            IspCommand::ResumeHw => {
                self.resume(&ctx)?;
                IspCommandOutput::None
            }
            IspCommand::SofDebug(enabled) => {
                ctx.set_sof_debug(enabled);
                IspCommandOutput::None
            }
            IspCommand::CtxType => IspCommandOutput::CtxType(ctx.ctx_type()),
            IspCommand::GetPacketOpcode(update) => {
                if update.ctx != id {
                    return Err(IspError::InvalidArgument("update prepared for another context"));
                }
                IspCommandOutput::PacketOpcode(update.opcode)
            }
            IspCommand::GetLastCdmDone => IspCommandOutput::LastCdmDone(ctx.last_cdm_done()),
            IspCommand::ProgDefaultCfg => {
                let _guard = ctx.ctrl.try_lock().ok_or(IspError::Busy)?;
                for line in self.line_ops(&ctx) {
                    line.program_default_cfg()?;
                }
                IspCommandOutput::None
            }
            IspCommand::GetSofTs => IspCommandOutput::SofTs(ctx.sof_timestamps()),
            IspCommand::DumpStreamInfo => {
                info!(
                    "{}: type={:?} state={:?} lines={:?} outstanding={} pending_events={}",
                    id,
                    ctx.ctx_type(),
                    ctx.state(),
                    ctx.line_ids(),
                    ctx.lifecycle.outstanding(),
                    ctx.sink.pending()
                );
                for line in self.line_ops(&ctx) {
                    line.dump_stream_info();
                }
                IspCommandOutput::None
            }
            IspCommand::UpdateClock(clock) => {
                ctx.admission.lock().stage(&BwClkVote {
                    ife_clock: Some(clock.clone()),
                    ..Default::default()
                })?;
                IspCommandOutput::None
            }
            IspCommand::GetBusCompGroup => IspCommandOutput::BusCompGroup(ctx.record.query()),
        };
        Ok(output)
    }

    fn pause(&self, ctx: &IspContext) -> IspResult {
        let _guard = ctx.ctrl.try_lock().ok_or(IspError::Busy)?;
        let state = ctx.state();
        if state != ContextState::Running {
            return Err(IspError::InvalidState(state));
        }
        if ctx.lifecycle.is_paused() {
            return Ok(());
        }
        ctx.lifecycle.set_paused(true);
        Self::set_irqs(&self.line_ops(ctx), false);
        debug!("{}: paused", ctx.id());
        ctx.handler().on_lifecycle(ctx.id(), LifecycleNotice::Paused);
        Ok(())
    }

    fn resume(&self, ctx: &IspContext) -> IspResult {
        let _guard = ctx.ctrl.try_lock().ok_or(IspError::Busy)?;
        let state = ctx.state();
        if state != ContextState::Running {
            return Err(IspError::InvalidState(state));
        }
        if !ctx.lifecycle.is_paused() {
            return Ok(());
        }
        Self::set_irqs(&self.line_ops(ctx), true);
        ctx.lifecycle.set_paused(false);
        debug!("{}: resumed", ctx.id());
        ctx.handler().on_lifecycle(ctx.id(), LifecycleNotice::Resumed);
        Ok(())
    }
}

impl core::fmt::Debug for IspHwMgr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IspHwMgr")
            .field("name", &self.name)
            .field("lines", &self.lines.len())
            .field("contexts", &self.router.context_count())
            .field("stats", &self.stats())
            .finish()
    }
}
