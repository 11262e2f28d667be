//! Raw interrupt to typed event translation.
//!
//! Runs in interrupt context: no locks, no heap. One raw interrupt fans out
//! into at most [`MAX_EVENTS_PER_IRQ`] events, returned in a fixed order:
//! SOF, REG_UPDATE, EPOCH, EOF, DONE (in report order), secondary events,
//! then ERROR.

use arrayvec::ArrayVec;
use memory_addr::PhysAddr;

use crate::config::IspHwMgrConfig;
use crate::event::{
    DoneEventData, EofEventData, EpochEventData, ErrorEventData, ErrorKind, EventData,
    EventSource, HwEvent, RegUpdateEventData, SecondaryEventData, SecondaryEventKind,
    SofEventData,
};
use crate::hw::HwLineId;
use crate::record::ResourceHandle;

/// Buffer-done reports carried by one raw interrupt.
pub const MAX_DONE_PER_IRQ: usize = 8;
/// Upper bound on events produced from one raw interrupt.
pub const MAX_EVENTS_PER_IRQ: usize = 16;

/// Top-level interrupt status bits as latched by the line driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IrqStatus(pub u32);

impl IrqStatus {
    /// Start of frame.
    pub const SOF: u32 = 1 << 0;
    /// Shadow registers latched.
    pub const REG_UPDATE: u32 = 1 << 1;
    /// Configured line count reached within the frame.
    pub const EPOCH: u32 = 1 << 2;
    /// End of frame.
    pub const EOF: u32 = 1 << 3;
    /// Error status is valid; see [`RawIrq::error_status`].
    pub const ERROR: u32 = 1 << 4;
    /// Start of frame seen by the secondary front end.
    pub const SEC_SOF: u32 = 1 << 8;
    /// Epoch seen by the secondary front end.
    pub const SEC_EPOCH: u32 = 1 << 9;
    /// Frame dropped because the secondary front end fell out of sync.
    pub const SEC_OUT_OF_SYNC_FRAME_DROP: u32 = 1 << 10;

    /// Whether `bit` is set.
    #[inline]
    pub const fn has(self, bit: u32) -> bool {
        self.0 & bit != 0
    }
}

/// Capture times for each stage reported in one interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IrqTimestamps {
    pub sof: u64,
    /// Boot-clock time of the SOF.
    pub boot: u64,
    pub reg_update: u64,
    pub epoch: u64,
    pub eof: u64,
    pub done: u64,
    pub error: u64,
}

/// One buffer-done report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawDone {
    /// Output resource that finished writing.
    pub handle: ResourceHandle,
    /// Completion group the write master reported into.
    pub comp_group: u8,
    /// Low 32 bits of the last address the write master consumed.
    pub last_consumed_addr: u32,
}

/// A raw interrupt as handed over by a line driver's top half.
#[derive(Debug, Clone, Default)]
pub struct RawIrq {
    /// Line that raised the interrupt. Interrupts without one are dropped.
    pub line: Option<HwLineId>,
    /// Path resource that raised the frame-timing and error bits.
    pub handle: ResourceHandle,
    pub status: IrqStatus,
    pub timestamps: IrqTimestamps,
    pub frame_id_meta: u32,
    /// Error status, in [`ErrorKind`] bit layout.
    pub error_status: u32,
    pub error_code: u32,
    pub done: ArrayVec<RawDone, MAX_DONE_PER_IRQ>,
}

impl RawIrq {
    /// Starts an interrupt report for `line` on path `handle`.
    pub fn new(line: HwLineId, handle: ResourceHandle) -> Self {
        Self {
            line: Some(line),
            handle,
            ..Default::default()
        }
    }

    pub fn with_status(mut self, bits: u32) -> Self {
        self.status.0 |= bits;
        self
    }

    pub fn with_timestamps(mut self, timestamps: IrqTimestamps) -> Self {
        self.timestamps = timestamps;
        self
    }

    pub fn with_error(mut self, error_status: u32, error_code: u32) -> Self {
        self.status.0 |= IrqStatus::ERROR;
        self.error_status = error_status;
        self.error_code = error_code;
        self
    }

    /// Adds a buffer-done report. Reports beyond [`MAX_DONE_PER_IRQ`] are
    /// dropped with a warning.
    pub fn with_done(mut self, done: RawDone) -> Self {
        if self.done.try_push(done).is_err() {
            warn!("raw irq: done report for {:?} dropped, list full", done.handle);
        }
        self
    }
}

/// Converts raw interrupts into typed events.
#[derive(Debug, Clone, Copy)]
pub struct EventTranslator {
    recovery_enabled: bool,
    req_dump_on_error: bool,
}

impl EventTranslator {
    pub const fn new(recovery_enabled: bool, req_dump_on_error: bool) -> Self {
        Self {
            recovery_enabled,
            req_dump_on_error,
        }
    }

    pub fn from_config(config: &IspHwMgrConfig) -> Self {
        Self::new(config.recovery_enabled, config.req_dump_on_error)
    }

    /// Translates `raw` into events. Pure; safe from interrupt context.
    pub fn translate(&self, raw: &RawIrq) -> ArrayVec<HwEvent, MAX_EVENTS_PER_IRQ> {
        let mut events = ArrayVec::new();
        let Some(line) = raw.line else {
            return events;
        };
        let source = EventSource {
            line,
            handle: raw.handle,
        };
        let ts = &raw.timestamps;

        if raw.status.has(IrqStatus::SOF) {
            events.push(HwEvent::new(
                source,
                EventData::Sof(SofEventData {
                    timestamp: ts.sof,
                    boot_time: ts.boot,
                }),
            ));
        }
        if raw.status.has(IrqStatus::REG_UPDATE) {
            events.push(HwEvent::new(
                source,
                EventData::RegUpdate(RegUpdateEventData {
                    timestamp: ts.reg_update,
                }),
            ));
        }
        if raw.status.has(IrqStatus::EPOCH) {
            events.push(HwEvent::new(
                source,
                EventData::Epoch(EpochEventData {
                    timestamp: ts.epoch,
                    frame_id_meta: raw.frame_id_meta,
                }),
            ));
        }
        if raw.status.has(IrqStatus::EOF) {
            events.push(HwEvent::new(
                source,
                EventData::Eof(EofEventData { timestamp: ts.eof }),
            ));
        }

        for done in &raw.done {
            events.push(HwEvent::new(
                EventSource {
                    line,
                    handle: done.handle,
                },
                EventData::Done(DoneEventData {
                    hw_family: line.family,
                    comp_group_id: done.comp_group,
                    last_consumed_addr: PhysAddr::from(done.last_consumed_addr as usize),
                    timestamp: ts.done,
                }),
            ));
        }

        for (bit, kind, timestamp) in [
            (IrqStatus::SEC_SOF, SecondaryEventKind::Sof, ts.sof),
            (IrqStatus::SEC_EPOCH, SecondaryEventKind::Epoch, ts.epoch),
            (
                IrqStatus::SEC_OUT_OF_SYNC_FRAME_DROP,
                SecondaryEventKind::OutOfSyncFrameDrop,
                ts.sof,
            ),
        ] {
            if raw.status.has(bit) {
                events.push(HwEvent::new(
                    source,
                    EventData::Secondary(SecondaryEventData { kind, timestamp }),
                ));
            }
        }

        if raw.status.has(IrqStatus::ERROR) {
            let error_kind = ErrorKind::from_status(raw.error_status);
            events.push(HwEvent::new(
                source,
                EventData::Error(ErrorEventData {
                    error_kind,
                    error_code: raw.error_code,
                    timestamp: ts.error,
                    recovery_enabled: self.recovery_enabled && error_kind.needs_restart(),
                    enable_req_dump: self.req_dump_on_error,
                }),
            ));
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::HwEventKind;
    use crate::hw::HwFamily;

    const LINE: HwLineId = HwLineId::new(HwFamily::Ife, 0);

    #[test]
    fn test_single_read_fans_out() {
        let raw = RawIrq::new(LINE, ResourceHandle(1))
            .with_status(IrqStatus::REG_UPDATE | IrqStatus::EPOCH)
            .with_timestamps(IrqTimestamps {
                reg_update: 100,
                epoch: 250,
                ..Default::default()
            });
        let events = EventTranslator::new(true, false).translate(&raw);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), HwEventKind::RegUpdate);
        assert_eq!(events[0].timestamp(), 100);
        assert_eq!(events[1].kind(), HwEventKind::Epoch);
        assert_eq!(events[1].timestamp(), 250);
    }

    #[test]
    fn test_error_keeps_every_bit() {
        let status = ErrorKind::OVERFLOW.bits() | ErrorKind::CSID_FRAME_SIZE.bits();
        let raw = RawIrq::new(LINE, ResourceHandle(1)).with_error(status, 0x42);
        let events = EventTranslator::new(true, true).translate(&raw);
        assert_eq!(events.len(), 1);
        match events[0].data {
            EventData::Error(err) => {
                assert_eq!(err.error_kind.bits(), status);
                assert_eq!(err.error_code, 0x42);
                assert!(err.recovery_enabled);
                assert!(err.enable_req_dump);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_error_without_known_bits_is_none() {
        let raw = RawIrq::new(LINE, ResourceHandle(1)).with_error(0, 0);
        let events = EventTranslator::new(true, false).translate(&raw);
        match events[0].data {
            EventData::Error(err) => {
                assert_eq!(err.error_kind, ErrorKind::NONE);
                assert!(!err.recovery_enabled);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_recovery_disabled_by_config() {
        let raw = RawIrq::new(LINE, ResourceHandle(1)).with_error(ErrorKind::OVERFLOW.bits(), 0);
        let events = EventTranslator::new(false, false).translate(&raw);
        match events[0].data {
            EventData::Error(err) => assert!(!err.recovery_enabled),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_done_and_secondary_order() {
        let raw = RawIrq::new(LINE, ResourceHandle(1))
            .with_status(IrqStatus::SOF | IrqStatus::SEC_OUT_OF_SYNC_FRAME_DROP)
            .with_done(RawDone {
                handle: ResourceHandle(5),
                comp_group: 3,
                last_consumed_addr: 0x1000,
            })
            .with_done(RawDone {
                handle: ResourceHandle(6),
                comp_group: 3,
                last_consumed_addr: 0x2000,
            });
        let events = EventTranslator::new(true, false).translate(&raw);
        let kinds: alloc::vec::Vec<_> = events.iter().map(HwEvent::kind).collect();
        assert_eq!(
            kinds,
            [
                HwEventKind::Sof,
                HwEventKind::Done,
                HwEventKind::Done,
                HwEventKind::Secondary
            ]
        );
        assert_eq!(events[1].source.handle, ResourceHandle(5));
        match events[3].data {
            EventData::Secondary(sec) => assert_eq!(sec.kind, SecondaryEventKind::OutOfSyncFrameDrop),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_unidentified_line_yields_nothing() {
        let raw = RawIrq {
            status: IrqStatus(IrqStatus::SOF),
            ..Default::default()
        };
        assert!(EventTranslator::new(true, false).translate(&raw).is_empty());
    }
}
