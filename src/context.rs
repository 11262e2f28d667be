//! Logical streaming contexts and the directives that drive them.
//!
//! An [`IspContext`] is the manager-side view of one session: the line
//! indices it holds, its resource record, its bandwidth/clock admission table,
//! its lifecycle, and the handler events are delivered to. The session layer
//! owns the handler; the manager only keeps a shared reference for delivery.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use arrayvec::ArrayVec;
use spin::Mutex;

use crate::admission::BwClkAdmission;
use crate::config::IspHwMgrConfig;
use crate::dispatch::EventSink;
use crate::error::{IspError, IspResult};
use crate::event::{EventSource, HwEvent};
use crate::hw::{HwFamily, HwLineId, StopCmd, MAX_LINES_PER_CTX};
use crate::lifecycle::{BindingLifecycle, ContextState};
use crate::line::{LineRequest, LineSet};
use crate::packet::{CTX_CFG_MAX, HwUpdateDescriptor, SFE_CTX_CFG_MAX};
use crate::record::{OutResourceRequest, ResourceHandle, ResourceRecord};

/// Manager-assigned context identifier. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(pub u32);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx{}", self.0)
    }
}

/// Context type reported through the command interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ContextType {
    /// Legacy sensor-switch context.
    Fs2 = 1,
    /// RDI paths only.
    Rdi = 2,
    /// Pixel and RDI paths.
    Pix = 3,
    /// Offline processing.
    Offline = 4,
}

/// Feature flags reported back from acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AcquireFlags(u32);

impl AcquireFlags {
    pub const CUSTOM_EN: Self = Self(1 << 0);
    pub const FRAME_HEADER_EN: Self = Self(1 << 1);
    pub const CONSUME_ADDR_EN: Self = Self(1 << 2);
    pub const APPLY_DEFAULT_CFG: Self = Self(1 << 3);
    pub const SFE_EN: Self = Self(1 << 4);
    pub const AEB_EN: Self = Self(1 << 5);

    const ALL: u32 = 0x3F;

    pub const fn empty() -> Self {
        Self(0)
    }

    /// Flags from raw bits; undefined bits are dropped.
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl core::ops::BitOr for AcquireFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// SOF timestamps of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SofTs {
    pub curr: u64,
    pub prev: u64,
    pub boot: u64,
}

/// Lock-free SOF timestamp cell, written from the interrupt path.
#[derive(Debug, Default)]
pub struct SofTimestamps {
    curr: AtomicU64,
    prev: AtomicU64,
    boot: AtomicU64,
}

impl SofTimestamps {
    /// Records a new SOF; the current timestamp becomes the previous one.
    pub fn record(&self, timestamp: u64, boot_time: u64) {
        let prev = self.curr.swap(timestamp, Ordering::AcqRel);
        self.prev.store(prev, Ordering::Release);
        self.boot.store(boot_time, Ordering::Release);
    }

    pub fn snapshot(&self) -> SofTs {
        SofTs {
            curr: self.curr.load(Ordering::Acquire),
            prev: self.prev.load(Ordering::Acquire),
            boot: self.boot.load(Ordering::Acquire),
        }
    }

    pub fn reset(&self) {
        self.curr.store(0, Ordering::Release);
        self.prev.store(0, Ordering::Release);
        self.boot.store(0, Ordering::Release);
    }
}

/// Lifecycle notifications sent to the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleNotice {
    Started,
    Stopped,
    Paused,
    Resumed,
    /// Internal recovery gave up; the context is Idle and must be re-acquired.
    RecoveryFailed(IspError),
}

/// Event callback implemented by the session layer.
///
/// [`on_event`](Self::on_event) may run on the interrupt path when the
/// manager uses inline delivery; it must not block there.
pub trait IspEventHandler: Send + Sync {
    /// Receives one translated event.
    fn on_event(&self, ctx: ContextId, event: &HwEvent) -> IspResult;

    /// Receives a lifecycle notification for an externally requested
    /// transition. Internal stop/start during recovery is not reported.
    fn on_lifecycle(&self, _ctx: ContextId, _notice: LifecycleNotice) {}
}

/// Acquire request.
pub struct AcquireArgs {
    pub ctx_type: ContextType,
    pub lines: Vec<LineRequest>,
    pub resources: Vec<OutResourceRequest>,
    /// Requested feature flags. `SFE_EN` is derived from the bound lines.
    pub flags: AcquireFlags,
    pub handler: Arc<dyn IspEventHandler>,
}

/// Acquire result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireOutput {
    pub ctx: ContextId,
    pub lines: ArrayVec<HwLineId, MAX_LINES_PER_CTX>,
    /// Handle of each requested resource, in request order.
    pub handles: Vec<ResourceHandle>,
    pub flags: AcquireFlags,
}

/// Start directive.
#[derive(Debug, Clone, Default)]
pub struct StartArgs {
    /// Update to apply right before the lines start.
    pub hw_update: Option<HwUpdateDescriptor>,
    /// Skip line init; the lines kept their configuration.
    pub start_only: bool,
    /// Triggered by recovery rather than the session layer.
    pub internal: bool,
}

impl StartArgs {
    pub fn new(hw_update: HwUpdateDescriptor) -> Self {
        Self {
            hw_update: Some(hw_update),
            ..Default::default()
        }
    }
}

/// Stop directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopArgs {
    pub cmd: StopCmd,
    /// Skip line deinit.
    pub stop_only: bool,
    /// Triggered by recovery rather than the session layer.
    pub internal: bool,
}

impl StopArgs {
    pub const fn at_frame_boundary() -> Self {
        Self {
            cmd: StopCmd::AtFrameBoundary,
            stop_only: false,
            internal: false,
        }
    }

    pub const fn immediately() -> Self {
        Self {
            cmd: StopCmd::Immediately,
            stop_only: false,
            internal: false,
        }
    }

    pub const fn stop_only(mut self) -> Self {
        self.stop_only = true;
        self
    }
}

/// Manager-side state of one logical streaming context.
pub struct IspContext {
    id: ContextId,
    ctx_type: ContextType,
    flags: AcquireFlags,
    lines: LineSet,
    line_ids: ArrayVec<HwLineId, MAX_LINES_PER_CTX>,
    /// Fixed at acquire. Only the atomic DONE bookkeeping inside changes.
    pub(crate) record: ResourceRecord,
    pub(crate) admission: Mutex<BwClkAdmission>,
    pub(crate) lifecycle: BindingLifecycle,
    pub(crate) sink: EventSink,
    handler: Arc<dyn IspEventHandler>,
    /// Serializes blocking-context operations on this binding.
    pub(crate) ctrl: Mutex<()>,
    sof_debug: AtomicBool,
    sof_ts: SofTimestamps,
    last_cdm_done: AtomicU64,
    /// Lines have been initialized and not deinitialized since.
    hw_initialized: AtomicBool,
}

impl IspContext {
    /// Builds a context over already claimed lines.
    ///
    /// Resource handles are numbered from 1 in request order.
    pub(crate) fn new(
        id: ContextId,
        args: &AcquireArgs,
        lines: LineSet,
        line_ids: ArrayVec<HwLineId, MAX_LINES_PER_CTX>,
        config: &IspHwMgrConfig,
    ) -> IspResult<Self> {
        let mut record = ResourceRecord::new();
        for (i, req) in args.resources.iter().enumerate() {
            let on_bus = line_ids.iter().filter(|l| l.family == req.family).count();
            record.insert(ResourceHandle(i as u32 + 1), *req, on_bus)?;
        }

        let mut flags = AcquireFlags::from_bits_truncate(args.flags.bits() & !AcquireFlags::SFE_EN.bits());
        if line_ids.iter().any(|l| l.family == HwFamily::Sfe) {
            flags.insert(AcquireFlags::SFE_EN);
        }

        Ok(Self {
            id,
            ctx_type: args.ctx_type,
            flags,
            lines,
            line_ids,
            record,
            admission: Mutex::new(BwClkAdmission::new()),
            lifecycle: BindingLifecycle::new(),
            sink: EventSink::new(config.delivery, config.event_queue_depth),
            handler: args.handler.clone(),
            ctrl: Mutex::new(()),
            sof_debug: AtomicBool::new(false),
            sof_ts: SofTimestamps::default(),
            last_cdm_done: AtomicU64::new(0),
            hw_initialized: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn id(&self) -> ContextId {
        self.id
    }

    #[inline]
    pub fn ctx_type(&self) -> ContextType {
        self.ctx_type
    }

    #[inline]
    pub fn flags(&self) -> AcquireFlags {
        self.flags
    }

    /// Arena indices of the bound lines.
    #[inline]
    pub fn lines(&self) -> &[crate::line::HwLineIndex] {
        &self.lines
    }

    /// Physical ids of the bound lines, in the same order as [`lines`](Self::lines).
    #[inline]
    pub fn line_ids(&self) -> &[HwLineId] {
        &self.line_ids
    }

    #[inline]
    pub fn state(&self) -> ContextState {
        self.lifecycle.state()
    }

    #[inline]
    pub fn handler(&self) -> &dyn IspEventHandler {
        self.handler.as_ref()
    }

    /// Whether the context streams RDI paths only.
    pub fn is_rdi_only(&self) -> bool {
        self.ctx_type == ContextType::Rdi
    }

    /// Whether any bound line belongs to `family`.
    pub fn has_family(&self, family: HwFamily) -> bool {
        self.line_ids.iter().any(|l| l.family == family)
    }

    /// Position of `line` among this context's lines of the same family:
    /// 0 for the master, 1 for the slave of a dual configuration.
    pub fn line_pos(&self, line: HwLineId) -> Option<usize> {
        self.line_ids
            .iter()
            .filter(|l| l.family == line.family)
            .position(|l| *l == line)
    }

    /// Configuration entry limit for this context's packets.
    pub fn max_cfg_entries(&self) -> usize {
        if self.flags.contains(AcquireFlags::SFE_EN) {
            SFE_CTX_CFG_MAX
        } else {
            CTX_CFG_MAX
        }
    }

    /// Every (line, handle) pair this context claims for routing.
    pub fn event_sources(&self) -> Vec<EventSource> {
        let record = &self.record;
        let mut sources = Vec::new();
        for line in &self.line_ids {
            sources.push(EventSource {
                line: *line,
                handle: ResourceHandle::LINE,
            });
            for handle in record.handles() {
                if record.family_of(handle) == Some(line.family) {
                    sources.push(EventSource {
                        line: *line,
                        handle,
                    });
                }
            }
        }
        sources
    }

    pub fn sof_debug(&self) -> bool {
        self.sof_debug.load(Ordering::Relaxed)
    }

    pub(crate) fn set_sof_debug(&self, enabled: bool) {
        self.sof_debug.store(enabled, Ordering::Relaxed);
    }

    pub fn sof_timestamps(&self) -> SofTs {
        self.sof_ts.snapshot()
    }

    pub(crate) fn record_sof(&self, timestamp: u64, boot_time: u64) {
        self.sof_ts.record(timestamp, boot_time);
    }

    /// Request id of the last update whose register writes completed.
    pub fn last_cdm_done(&self) -> u64 {
        self.last_cdm_done.load(Ordering::Acquire)
    }

    pub(crate) fn set_last_cdm_done(&self, request_id: u64) {
        self.last_cdm_done.store(request_id, Ordering::Release);
    }

    pub(crate) fn hw_initialized(&self) -> bool {
        self.hw_initialized.load(Ordering::Acquire)
    }

    pub(crate) fn set_hw_initialized(&self, initialized: bool) {
        self.hw_initialized.store(initialized, Ordering::Release);
    }

    pub(crate) fn reset_runtime(&self) {
        self.sof_ts.reset();
        self.record.reset_pending();
        self.lifecycle.discard_outstanding();
    }
}

impl fmt::Debug for IspContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IspContext")
            .field("id", &self.id)
            .field("ctx_type", &self.ctx_type)
            .field("lines", &self.line_ids)
            .field("lifecycle", &self.lifecycle)
            .field("sink", &self.sink)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    struct Quiet;

    impl IspEventHandler for Quiet {
        fn on_event(&self, _ctx: ContextId, _event: &HwEvent) -> IspResult {
            Ok(())
        }
    }

    fn dual_ife_ctx() -> IspContext {
        let args = AcquireArgs {
            ctx_type: ContextType::Pix,
            lines: vec![LineRequest::dual(HwFamily::Ife), LineRequest::single(HwFamily::Sfe)],
            resources: vec![
                OutResourceRequest {
                    res_id: 0x3000,
                    family: HwFamily::Ife,
                    comp_group: 0,
                },
                OutResourceRequest {
                    res_id: 0x4000,
                    family: HwFamily::Sfe,
                    comp_group: 1,
                },
            ],
            flags: AcquireFlags::FRAME_HEADER_EN,
            handler: Arc::new(Quiet),
        };
        let lines: LineSet = [0u8, 1, 8]
            .iter()
            .map(|i| crate::line::HwLineIndex(*i))
            .collect();
        let ids = [
            HwLineId::new(HwFamily::Ife, 0),
            HwLineId::new(HwFamily::Ife, 1),
            HwLineId::new(HwFamily::Sfe, 0),
        ]
        .into_iter()
        .collect();
        IspContext::new(ContextId(3), &args, lines, ids, &IspHwMgrConfig::default()).unwrap()
    }

    #[test]
    fn test_context_flags_and_limits() {
        let ctx = dual_ife_ctx();
        assert!(ctx.flags().contains(AcquireFlags::SFE_EN));
        assert!(ctx.flags().contains(AcquireFlags::FRAME_HEADER_EN));
        assert_eq!(ctx.max_cfg_entries(), SFE_CTX_CFG_MAX);
        assert_eq!(ctx.state(), ContextState::Acquired);
        assert!(!ctx.is_rdi_only());
    }

    #[test]
    fn test_context_line_positions() {
        let ctx = dual_ife_ctx();
        assert_eq!(ctx.line_pos(HwLineId::new(HwFamily::Ife, 1)), Some(1));
        assert_eq!(ctx.line_pos(HwLineId::new(HwFamily::Sfe, 0)), Some(0));
        assert_eq!(ctx.line_pos(HwLineId::new(HwFamily::Ife, 5)), None);
    }

    #[test]
    fn test_context_event_sources() {
        let ctx = dual_ife_ctx();
        let sources = ctx.event_sources();
        // Three line-level routes, the IFE output on both IFEs, the SFE output once.
        assert_eq!(sources.len(), 6);
        assert!(sources.contains(&EventSource {
            line: HwLineId::new(HwFamily::Ife, 1),
            handle: ResourceHandle(1),
        }));
        assert!(!sources.contains(&EventSource {
            line: HwLineId::new(HwFamily::Ife, 0),
            handle: ResourceHandle(2),
        }));
    }

    #[test]
    fn test_sof_timestamps_roll() {
        let ts = SofTimestamps::default();
        ts.record(100, 1_100);
        ts.record(200, 1_200);
        assert_eq!(
            ts.snapshot(),
            SofTs {
                curr: 200,
                prev: 100,
                boot: 1_200
            }
        );
    }
}
