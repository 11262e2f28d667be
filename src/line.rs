//! Hardware-line arena with ownership tracking and statistics.
//!
//! Every physical line the platform exposes gets one slot in the arena,
//! addressed by a small [`HwLineIndex`]. Contexts hold indices, never
//! references, and "line in use" is an owner check on the slot.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use arrayvec::ArrayVec;

use crate::context::ContextId;
use crate::error::{IspError, IspResult};
use crate::hw::{HwFamily, HwLineId, IspHwLineOps, MAX_LINES_PER_CTX, MAX_LINES_PER_FAMILY};

/// Index of a slot in the [`HwLineArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HwLineIndex(pub u8);

/// Set of lines bound to one context, in acquire order.
pub type LineSet = ArrayVec<HwLineIndex, MAX_LINES_PER_CTX>;

/// Request for `count` lines of `family`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRequest {
    pub family: HwFamily,
    /// 1 for a single line, 2 for a dual configuration.
    pub count: usize,
}

impl LineRequest {
    pub const fn single(family: HwFamily) -> Self {
        Self { family, count: 1 }
    }

    pub const fn dual(family: HwFamily) -> Self {
        Self { family, count: 2 }
    }
}

/// Per-line interrupt statistics.
#[derive(Debug, Default)]
pub struct LineStats {
    /// Raw interrupts received.
    pub irq_count: AtomicU64,
    /// Typed events produced from those interrupts.
    pub event_count: AtomicU64,
    /// ERROR events among them.
    pub error_count: AtomicU64,
}

impl LineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one interrupt and the events translated from it.
    #[inline]
    pub fn record_irq(&self, events: usize) {
        self.irq_count.fetch_add(1, Ordering::Relaxed);
        self.event_count.fetch_add(events as u64, Ordering::Relaxed);
    }

    /// Counts one ERROR event.
    #[inline]
    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn irqs(&self) -> u64 {
        self.irq_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn events(&self) -> u64 {
        self.event_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn errors(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }
}

/// One physical line and its current owner.
pub struct HwLineSlot {
    id: HwLineId,
    ops: Arc<dyn IspHwLineOps>,
    /// Owning context id, 0 when free.
    owner: AtomicU32,
    stats: LineStats,
}

impl HwLineSlot {
    fn new(ops: Arc<dyn IspHwLineOps>) -> Self {
        Self {
            id: ops.id(),
            ops,
            owner: AtomicU32::new(0),
            stats: LineStats::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> HwLineId {
        self.id
    }

    /// The line's driver.
    #[inline]
    pub fn ops(&self) -> &dyn IspHwLineOps {
        self.ops.as_ref()
    }

    #[inline]
    pub fn stats(&self) -> &LineStats {
        &self.stats
    }

    /// Context currently holding this line.
    #[inline]
    pub fn owner(&self) -> Option<ContextId> {
        match self.owner.load(Ordering::Acquire) {
            0 => None,
            id => Some(ContextId(id)),
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.owner.load(Ordering::Acquire) == 0
    }

    fn try_claim(&self, ctx: ContextId) -> bool {
        self.owner
            .compare_exchange(0, ctx.0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release_from(&self, ctx: ContextId) -> bool {
        self.owner
            .compare_exchange(ctx.0, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl core::fmt::Debug for HwLineSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HwLineSlot")
            .field("id", &self.id)
            .field("owner", &self.owner())
            .field(
                "stats",
                &format_args!(
                    "irqs={}, events={}, errors={}",
                    self.stats.irqs(),
                    self.stats.events(),
                    self.stats.errors()
                ),
            )
            .finish()
    }
}

/// Arena of the platform's hardware lines.
pub struct HwLineArena {
    slots: Vec<HwLineSlot>,
}

impl HwLineArena {
    /// Builds the arena from the platform's line drivers.
    ///
    /// Lines whose instance index exceeds the family maximum, and duplicates
    /// of an already registered id, are skipped with a warning.
    pub fn new(lines: Vec<Arc<dyn IspHwLineOps>>) -> Self {
        let mut slots: Vec<HwLineSlot> = Vec::with_capacity(lines.len());
        for ops in lines {
            let id = ops.id();
            if id.instance as usize >= id.family.max_instances() {
                warn!("line {} beyond {} instance limit, ignored", id, id.family.max_instances());
                continue;
            }
            if slots.iter().any(|s| s.id == id) {
                warn!("line {} registered twice, ignored", id);
                continue;
            }
            debug!("registered hardware line {}", id);
            slots.push(HwLineSlot::new(ops));
        }
        Self { slots }
    }

    /// Slot at `index`.
    #[inline]
    pub fn slot(&self, index: HwLineIndex) -> Option<&HwLineSlot> {
        self.slots.get(index.0 as usize)
    }

    /// Slot for the physical line `id`.
    pub fn find(&self, id: HwLineId) -> Option<(HwLineIndex, &HwLineSlot)> {
        self.slots
            .iter()
            .enumerate()
            .find(|(_, s)| s.id == id)
            .map(|(i, s)| (HwLineIndex(i as u8), s))
    }

    /// Whether the line at `index` is held by a context.
    pub fn in_use(&self, index: HwLineIndex) -> bool {
        self.slot(index).is_some_and(|s| !s.is_free())
    }

    /// Lines of `family` currently held.
    pub fn bound_count(&self, family: HwFamily) -> usize {
        self.slots
            .iter()
            .filter(|s| s.id.family == family && !s.is_free())
            .count()
    }

    /// Distinct contexts holding at least one line of `family`.
    pub fn context_count(&self, family: HwFamily) -> usize {
        let mut owners: ArrayVec<u32, 16> = ArrayVec::new();
        for slot in self.slots.iter().filter(|s| s.id.family == family) {
            let owner = slot.owner.load(Ordering::Acquire);
            if owner != 0 && !owners.contains(&owner) && owners.try_push(owner).is_err() {
                break;
            }
        }
        owners.len()
    }

    /// Claims lines for `ctx`, all requests or none.
    ///
    /// # Errors
    ///
    /// [`IspError::ResourceExhausted`] when a family has too few free lines or
    /// already serves its maximum number of contexts.
    pub fn claim(&self, ctx: ContextId, requests: &[LineRequest]) -> IspResult<LineSet> {
        let total: usize = requests.iter().map(|r| r.count).sum();
        if requests.is_empty() || total > MAX_LINES_PER_CTX {
            return Err(IspError::InvalidArgument("bad line request count"));
        }
        for (i, req) in requests.iter().enumerate() {
            if req.count == 0 || req.count > MAX_LINES_PER_FAMILY {
                return Err(IspError::InvalidArgument("bad line request count"));
            }
            if requests[..i].iter().any(|r| r.family == req.family) {
                return Err(IspError::InvalidArgument("family requested twice"));
            }
            if self.context_count(req.family) >= req.family.max_contexts() {
                return Err(IspError::ResourceExhausted(req.family));
            }
        }

        let mut claimed = LineSet::new();
        for req in requests {
            let mut got = 0;
            for (i, slot) in self.slots.iter().enumerate() {
                if got == req.count {
                    break;
                }
                if slot.id.family == req.family && slot.try_claim(ctx) {
                    claimed.push(HwLineIndex(i as u8));
                    got += 1;
                }
            }
            if got < req.count {
                self.release(ctx, &claimed);
                return Err(IspError::ResourceExhausted(req.family));
            }
        }
        Ok(claimed)
    }

    /// Returns the lines in `set` owned by `ctx` to the free pool.
    pub fn release(&self, ctx: ContextId, set: &[HwLineIndex]) {
        for index in set {
            if let Some(slot) = self.slot(*index) {
                if !slot.release_from(ctx) {
                    warn!("line {} not owned by {:?} at release", slot.id, ctx);
                }
            }
        }
    }

    /// Every slot with its index, in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (HwLineIndex, &HwLineSlot)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, s)| (HwLineIndex(i as u8), s))
    }

    /// Number of lines on the device, bound or not.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the device has no lines at all.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::BwClkVote;
    use crate::hw::StopCmd;
    use crate::packet::CmdBufDesc;
    use axerrno::AxResult;

    struct NullLine(HwLineId);

    impl IspHwLineOps for NullLine {
        fn id(&self) -> HwLineId {
            self.0
        }
        fn init(&self) -> AxResult {
            Ok(())
        }
        fn deinit(&self) -> AxResult {
            Ok(())
        }
        fn start(&self) -> AxResult {
            Ok(())
        }
        fn stop(&self, _cmd: StopCmd) -> AxResult {
            Ok(())
        }
        fn is_halted(&self) -> bool {
            true
        }
        fn set_irq_enabled(&self, _enabled: bool) {}
        fn write_regs(&self, _cmds: &[CmdBufDesc]) -> AxResult {
            Ok(())
        }
        fn apply_bw_clk(&self, _vote: &BwClkVote) -> AxResult {
            Ok(())
        }
    }

    fn arena(family: HwFamily, n: u8) -> HwLineArena {
        let lines: Vec<Arc<dyn IspHwLineOps>> = (0..n)
            .map(|i| Arc::new(NullLine(HwLineId::new(family, i))) as Arc<dyn IspHwLineOps>)
            .collect();
        HwLineArena::new(lines)
    }

    #[test]
    fn test_arena_skips_out_of_range_lines() {
        let arena = arena(HwFamily::Tfe, 5);
        assert_eq!(arena.len(), HwFamily::Tfe.max_instances());
    }

    #[test]
    fn test_claim_until_exhausted() {
        let arena = arena(HwFamily::Tfe, 3);
        let req = [LineRequest::single(HwFamily::Tfe)];
        for ctx in 1..=3 {
            arena.claim(ContextId(ctx), &req).unwrap();
        }
        assert_eq!(arena.bound_count(HwFamily::Tfe), 3);
        assert_eq!(
            arena.claim(ContextId(4), &req),
            Err(IspError::ResourceExhausted(HwFamily::Tfe))
        );
    }

    #[test]
    fn test_failed_claim_rolls_back() {
        let arena = arena(HwFamily::Ife, 3);
        let first = arena.claim(ContextId(1), &[LineRequest::dual(HwFamily::Ife)]).unwrap();
        assert_eq!(first.len(), 2);

        let err = arena
            .claim(ContextId(2), &[LineRequest::dual(HwFamily::Ife)])
            .unwrap_err();
        assert_eq!(err, IspError::ResourceExhausted(HwFamily::Ife));
        assert_eq!(arena.bound_count(HwFamily::Ife), 2);

        arena.release(ContextId(1), &first);
        assert!(!arena.in_use(first[0]));
        assert_eq!(arena.context_count(HwFamily::Ife), 0);
    }

    #[test]
    fn test_claim_rejects_bad_requests() {
        let arena = arena(HwFamily::Ife, 4);
        assert!(arena.claim(ContextId(1), &[]).is_err());
        assert!(arena
            .claim(ContextId(1), &[LineRequest { family: HwFamily::Ife, count: 3 }])
            .is_err());
        assert!(arena
            .claim(
                ContextId(1),
                &[LineRequest::single(HwFamily::Ife), LineRequest::single(HwFamily::Ife)]
            )
            .is_err());
        assert_eq!(arena.bound_count(HwFamily::Ife), 0);
        let (index, slot) = arena.find(HwLineId::new(HwFamily::Ife, 2)).unwrap();
        assert_eq!(index, HwLineIndex(2));
        assert!(slot.is_free());
    }
}
