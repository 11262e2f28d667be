//! Resource record: which output resources feed which bus completion group.
//!
//! The record is built at acquire time and is only rebuilt while the binding's
//! interrupts are masked. The interrupt path reads it under a shared lock and
//! only touches the atomic per-group arrival masks and per-handle
//! last-consumed addresses.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use arrayvec::ArrayVec;
use memory_addr::PhysAddr;

use crate::error::{IspError, IspResult};
use crate::hw::{BusKind, HwFamily, MAX_LINES_PER_FAMILY};

/// Output resources that may share one completion group.
pub const NUM_OUT_PER_COMP_IRQ_MAX: usize = 12;

/// Manager-assigned handle for an acquired resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceHandle(pub u32);

impl ResourceHandle {
    /// Handle for events a line raises as a whole rather than for one output.
    pub const LINE: Self = Self(0);
}

/// Resource IDs reserved on one completion group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompRecord {
    pub group: u8,
    pub res_ids: ArrayVec<u32, NUM_OUT_PER_COMP_IRQ_MAX>,
}

impl CompRecord {
    /// Number of valid resource IDs in this record.
    #[inline]
    pub fn num_res(&self) -> usize {
        self.res_ids.len()
    }
}

/// Completion-group records of a context, split by write bus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompRecordQuery {
    pub isp_bus_comp_grp: Vec<CompRecord>,
    pub sfe_bus_comp_grp: Vec<CompRecord>,
}

/// Result of recording one DONE arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneProgress {
    /// Every participant of the group has reported: deliver once.
    Complete,
    /// Other participants are still outstanding.
    Pending,
    /// The handle is not part of this record.
    Unknown,
}

struct ResourceEntry {
    res_id: u32,
    family: HwFamily,
    comp_group: u8,
    slot: usize,
    last_consumed: AtomicUsize,
}

struct GroupState {
    record: CompRecord,
    /// Participant bits: `line_pos * NUM_OUT_PER_COMP_IRQ_MAX + slot`.
    full_mask: u32,
    arrived: AtomicU32,
}

/// Request to reserve one output resource on a completion group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutResourceRequest {
    pub res_id: u32,
    /// Family whose write bus carries this output.
    pub family: HwFamily,
    pub comp_group: u8,
}

/// Per-context resource record.
pub struct ResourceRecord {
    entries: BTreeMap<ResourceHandle, ResourceEntry>,
    groups: BTreeMap<(BusKind, u8), GroupState>,
}

impl ResourceRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            groups: BTreeMap::new(),
        }
    }

    /// Adds a resource under `handle`.
    ///
    /// `lines_on_bus` is the number of the context's lines reporting into the
    /// resource's write bus (2 for a dual configuration).
    pub fn insert(
        &mut self,
        handle: ResourceHandle,
        req: OutResourceRequest,
        lines_on_bus: usize,
    ) -> IspResult {
        let bus = req.family.bus();
        if req.comp_group as usize >= bus.max_comp_groups() {
            return Err(IspError::InvalidArgument("completion group out of range"));
        }
        if lines_on_bus == 0 || lines_on_bus > MAX_LINES_PER_FAMILY {
            return Err(IspError::InvalidArgument("resource family has no bound line"));
        }
        if self.entries.values().any(|e| e.res_id == req.res_id) {
            return Err(IspError::InvalidArgument("duplicate resource id"));
        }

        let group = self
            .groups
            .entry((bus, req.comp_group))
            .or_insert_with(|| GroupState {
                record: CompRecord {
                    group: req.comp_group,
                    res_ids: ArrayVec::new(),
                },
                full_mask: 0,
                arrived: AtomicU32::new(0),
            });
        let slot = group.record.res_ids.len();
        if group.record.res_ids.try_push(req.res_id).is_err() {
            return Err(IspError::InvalidArgument("completion group full"));
        }
        for line_pos in 0..lines_on_bus {
            group.full_mask |= 1 << (line_pos * NUM_OUT_PER_COMP_IRQ_MAX + slot);
        }

        self.entries.insert(
            handle,
            ResourceEntry {
                res_id: req.res_id,
                family: req.family,
                comp_group: req.comp_group,
                slot,
                last_consumed: AtomicUsize::new(0),
            },
        );
        Ok(())
    }

    /// All handles in the record.
    pub fn handles(&self) -> impl Iterator<Item = ResourceHandle> + '_ {
        self.entries.keys().copied()
    }

    /// Handle reserved for resource `res_id`.
    pub fn handle_of(&self, res_id: u32) -> Option<ResourceHandle> {
        self.entries
            .iter()
            .find(|(_, e)| e.res_id == res_id)
            .map(|(h, _)| *h)
    }

    /// Resource id behind `handle`.
    pub fn res_id(&self, handle: ResourceHandle) -> Option<u32> {
        self.entries.get(&handle).map(|e| e.res_id)
    }

    /// Completion group `handle` reports into.
    pub fn comp_group_of(&self, handle: ResourceHandle) -> Option<(BusKind, u8)> {
        self.entries
            .get(&handle)
            .map(|e| (e.family.bus(), e.comp_group))
    }

    /// Family whose bus carries `handle`.
    pub fn family_of(&self, handle: ResourceHandle) -> Option<HwFamily> {
        self.entries.get(&handle).map(|e| e.family)
    }

    /// Record of one completion group.
    pub fn comp_record(&self, bus: BusKind, group: u8) -> Option<&CompRecord> {
        self.groups.get(&(bus, group)).map(|g| &g.record)
    }

    /// Snapshot of every completion-group record.
    pub fn query(&self) -> CompRecordQuery {
        let mut out = CompRecordQuery::default();
        for ((bus, _), group) in &self.groups {
            match bus {
                BusKind::Isp => out.isp_bus_comp_grp.push(group.record.clone()),
                BusKind::Sfe => out.sfe_bus_comp_grp.push(group.record.clone()),
            }
        }
        out
    }

    /// Last buffer address the hardware reported consumed for `handle`.
    pub fn last_consumed(&self, handle: ResourceHandle) -> Option<PhysAddr> {
        let addr = self.entries.get(&handle)?.last_consumed.load(Ordering::Acquire);
        (addr != 0).then(|| PhysAddr::from(addr))
    }

    /// Records a DONE from the line at `line_pos` for `handle`.
    ///
    /// Safe to call from the interrupt path. Reports `Complete` exactly once
    /// per hardware completion of the group; repeated arrivals from the same
    /// participant before the group completes are absorbed.
    pub fn mark_done(&self, line_pos: usize, handle: ResourceHandle, addr: PhysAddr) -> DoneProgress {
        let Some(entry) = self.entries.get(&handle) else {
            return DoneProgress::Unknown;
        };
        let Some(group) = self.groups.get(&(entry.family.bus(), entry.comp_group)) else {
            return DoneProgress::Unknown;
        };
        if line_pos >= MAX_LINES_PER_FAMILY {
            return DoneProgress::Unknown;
        }
        entry.last_consumed.store(addr.as_usize(), Ordering::Release);

        let bit = 1u32 << (line_pos * NUM_OUT_PER_COMP_IRQ_MAX + entry.slot);
        loop {
            let current = group.arrived.load(Ordering::Acquire);
            let merged = current | bit;
            let (next, progress) = if merged & group.full_mask == group.full_mask {
                (0, DoneProgress::Complete)
            } else {
                (merged, DoneProgress::Pending)
            };
            if group
                .arrived
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return progress;
            }
        }
    }

    /// Forgets partially collected completions (used when a stop discards
    /// in-flight work).
    pub fn reset_pending(&self) {
        for group in self.groups.values() {
            group.arrived.store(0, Ordering::Release);
        }
    }

    /// Number of resources in the record.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the record holds no resource.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ResourceRecord {
    fn default() -> Self {
        Self::new()
    }
}
