//! Typed hardware events.
//!
//! A [`HwEvent`] is created by the translator for each logical event in a raw
//! interrupt, handed to the router by value, and delivered to the owning
//! context by reference. Nothing keeps it after dispatch returns.

use core::fmt;

use memory_addr::PhysAddr;

use crate::hw::{HwFamily, HwLineId};
use crate::record::ResourceHandle;

/// Bitmask of decoded hardware error conditions.
///
/// Bit values match the ISP error enumeration exposed to user space, so the
/// mask can be reported upward without conversion.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorKind(u32);

impl ErrorKind {
    pub const NONE: Self = Self(0x0000_0001);
    pub const OVERFLOW: Self = Self(0x0000_0002);
    pub const P2I_ERROR: Self = Self(0x0000_0004);
    pub const VIOLATION: Self = Self(0x0000_0008);
    pub const BUSIF_OVERFLOW: Self = Self(0x0000_0010);
    pub const CSID_FATAL: Self = Self(0x0000_0020);
    pub const CSID_OUTPUT_FIFO_OVERFLOW: Self = Self(0x0000_0040);
    pub const RECOVERY_OVERFLOW: Self = Self(0x0000_0080);
    pub const CSID_FRAME_SIZE: Self = Self(0x0000_0100);
    pub const CSID_LANE_FIFO_OVERFLOW: Self = Self(0x0000_0200);
    pub const CSID_PKT_HDR_CORRUPTED: Self = Self(0x0000_0400);
    pub const CSID_MISSING_PKT_HDR_DATA: Self = Self(0x0000_0800);
    pub const CSID_SENSOR_SWITCH_ERROR: Self = Self(0x0000_1000);
    pub const CSID_UNBOUNDED_FRAME: Self = Self(0x0000_2000);
    pub const CSID_SENSOR_FRAME_DROP: Self = Self(0x0000_4000);
    pub const CSID_MISSING_EOT: Self = Self(0x0000_8000);
    pub const CSID_PKT_PAYLOAD_CORRUPTED: Self = Self(0x0001_0000);

    /// Every defined condition bit, excluding `NONE`.
    const CONDITIONS: u32 = 0x0001_FFFE;

    /// Conditions that do not by themselves require a hardware restart.
    const INFORMATIONAL: u32 = Self::CSID_SENSOR_FRAME_DROP.0;

    const NAMES: [(Self, &'static str); 16] = [
        (Self::OVERFLOW, "OVERFLOW"),
        (Self::P2I_ERROR, "P2I_ERROR"),
        (Self::VIOLATION, "VIOLATION"),
        (Self::BUSIF_OVERFLOW, "BUSIF_OVERFLOW"),
        (Self::CSID_FATAL, "CSID_FATAL"),
        (Self::CSID_OUTPUT_FIFO_OVERFLOW, "CSID_OUTPUT_FIFO_OVERFLOW"),
        (Self::RECOVERY_OVERFLOW, "RECOVERY_OVERFLOW"),
        (Self::CSID_FRAME_SIZE, "CSID_FRAME_SIZE"),
        (Self::CSID_LANE_FIFO_OVERFLOW, "CSID_LANE_FIFO_OVERFLOW"),
        (Self::CSID_PKT_HDR_CORRUPTED, "CSID_PKT_HDR_CORRUPTED"),
        (Self::CSID_MISSING_PKT_HDR_DATA, "CSID_MISSING_PKT_HDR_DATA"),
        (Self::CSID_SENSOR_SWITCH_ERROR, "CSID_SENSOR_SWITCH_ERROR"),
        (Self::CSID_UNBOUNDED_FRAME, "CSID_UNBOUNDED_FRAME"),
        (Self::CSID_SENSOR_FRAME_DROP, "CSID_SENSOR_FRAME_DROP"),
        (Self::CSID_MISSING_EOT, "CSID_MISSING_EOT"),
        (Self::CSID_PKT_PAYLOAD_CORRUPTED, "CSID_PKT_PAYLOAD_CORRUPTED"),
    ];

    /// Decodes a status word. Unknown bits are ignored; a word with no known
    /// condition bit decodes to `NONE`.
    pub const fn from_status(status: u32) -> Self {
        let bits = status & Self::CONDITIONS;
        if bits == 0 { Self::NONE } else { Self(bits) }
    }

    /// Raw bit value.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether no condition is set.
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 & Self::CONDITIONS == 0
    }

    /// Whether every bit of `other` is set in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any bit of `other` is set in `self`.
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether any set condition calls for stopping and restarting the hardware.
    #[inline]
    pub const fn needs_restart(self) -> bool {
        self.0 & Self::CONDITIONS & !Self::INFORMATIONAL != 0
    }
}

impl core::ops::BitOr for ErrorKind {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        let bits = (self.0 | rhs.0) & Self::CONDITIONS;
        if bits == 0 { Self::NONE } else { Self(bits) }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return f.write_str("NONE");
        }
        let mut first = true;
        for (kind, name) in Self::NAMES {
            if self.contains(kind) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorKind({:#x}: {})", self.0, self)
    }
}

/// Event kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwEventKind {
    Error,
    Sof,
    RegUpdate,
    Epoch,
    Eof,
    Done,
    Secondary,
}

impl HwEventKind {
    /// Name used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Sof => "SOF",
            Self::RegUpdate => "REG_UPDATE",
            Self::Epoch => "EPOCH",
            Self::Eof => "EOF",
            Self::Done => "BUF_DONE",
            Self::Secondary => "SECONDARY",
        }
    }
}

/// Auxiliary notifications carried through the secondary-event tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryEventKind {
    Sof,
    Epoch,
    OutOfSyncFrameDrop,
}

/// Payload for SOF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SofEventData {
    pub timestamp: u64,
    pub boot_time: u64,
}

/// Payload for REG_UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegUpdateEventData {
    pub timestamp: u64,
}

/// Payload for EPOCH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochEventData {
    pub timestamp: u64,
    /// Frame id reported by the sensor metadata for this frame.
    pub frame_id_meta: u32,
}

/// Payload for EOF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EofEventData {
    pub timestamp: u64,
}

/// Payload for BUF_DONE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoneEventData {
    pub hw_family: HwFamily,
    pub comp_group_id: u8,
    pub last_consumed_addr: PhysAddr,
    pub timestamp: u64,
}

/// Payload for ERROR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorEventData {
    pub error_kind: ErrorKind,
    /// Hardware-specific code that raised the error.
    pub error_code: u32,
    pub timestamp: u64,
    /// The context should be recovered internally and the request reapplied.
    pub recovery_enabled: bool,
    pub enable_req_dump: bool,
}

/// Payload for secondary events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecondaryEventData {
    pub kind: SecondaryEventKind,
    pub timestamp: u64,
}

/// Kind-specific event data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventData {
    Error(ErrorEventData),
    Sof(SofEventData),
    RegUpdate(RegUpdateEventData),
    Epoch(EpochEventData),
    Eof(EofEventData),
    Done(DoneEventData),
    Secondary(SecondaryEventData),
}

/// Where an event originated: the line that raised it and the resource path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventSource {
    pub line: HwLineId,
    pub handle: ResourceHandle,
}

/// A translated hardware event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwEvent {
    pub source: EventSource,
    pub data: EventData,
}

impl HwEvent {
    /// Event of `data`'s kind raised by `source`.
    pub const fn new(source: EventSource, data: EventData) -> Self {
        Self { source, data }
    }

    /// Kind tag of this event.
    pub const fn kind(&self) -> HwEventKind {
        match self.data {
            EventData::Error(_) => HwEventKind::Error,
            EventData::Sof(_) => HwEventKind::Sof,
            EventData::RegUpdate(_) => HwEventKind::RegUpdate,
            EventData::Epoch(_) => HwEventKind::Epoch,
            EventData::Eof(_) => HwEventKind::Eof,
            EventData::Done(_) => HwEventKind::Done,
            EventData::Secondary(_) => HwEventKind::Secondary,
        }
    }

    /// Primary timestamp of the event.
    pub const fn timestamp(&self) -> u64 {
        match self.data {
            EventData::Error(d) => d.timestamp,
            EventData::Sof(d) => d.timestamp,
            EventData::RegUpdate(d) => d.timestamp,
            EventData::Epoch(d) => d.timestamp,
            EventData::Eof(d) => d.timestamp,
            EventData::Done(d) => d.timestamp,
            EventData::Secondary(d) => d.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_decode_preserves_all_bits() {
        let status = ErrorKind::OVERFLOW.bits() | ErrorKind::P2I_ERROR.bits();
        let kind = ErrorKind::from_status(status);
        assert!(kind.contains(ErrorKind::OVERFLOW));
        assert!(kind.contains(ErrorKind::P2I_ERROR));
        assert_eq!(kind.bits(), status);
        assert!(!kind.is_none());
    }

    #[test]
    fn test_error_kind_zero_is_none() {
        assert_eq!(ErrorKind::from_status(0), ErrorKind::NONE);
        // Only unknown bits set.
        assert_eq!(ErrorKind::from_status(0x8000_0000), ErrorKind::NONE);
        // The NONE bit alone carries no condition.
        assert_eq!(ErrorKind::from_status(ErrorKind::NONE.bits()), ErrorKind::NONE);
    }

    #[test]
    fn test_error_kind_display() {
        let kind = ErrorKind::OVERFLOW | ErrorKind::CSID_MISSING_EOT;
        assert_eq!(alloc::format!("{}", kind), "OVERFLOW|CSID_MISSING_EOT");
        assert_eq!(alloc::format!("{}", ErrorKind::NONE), "NONE");
    }

    #[test]
    fn test_error_kind_restart_policy() {
        assert!(ErrorKind::CSID_FATAL.needs_restart());
        assert!(!ErrorKind::CSID_SENSOR_FRAME_DROP.needs_restart());
        assert!(!ErrorKind::NONE.needs_restart());
        assert!((ErrorKind::CSID_SENSOR_FRAME_DROP | ErrorKind::VIOLATION).needs_restart());
    }

    #[test]
    fn test_event_kind_names() {
        assert_eq!(HwEventKind::Done.as_str(), "BUF_DONE");
        assert_eq!(HwEventKind::RegUpdate.as_str(), "REG_UPDATE");
    }
}
