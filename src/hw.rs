//! Hardware-line families, their limits, and the driver interface the manager
//! programs through.
//!
//! Register programming for each line variant lives behind [`IspHwLineOps`];
//! this crate only sequences the calls.

use core::fmt;

use axerrno::AxResult;

use crate::admission::BwClkVote;
use crate::packet::CmdBufDesc;

/// Maximum IFE instances.
pub const IFE_HW_NUM_MAX: usize = 8;
/// Maximum TFE instances.
pub const TFE_HW_NUM_MAX: usize = 3;

cfg_if::cfg_if! {
    if #[cfg(feature = "sfe")] {
        /// Maximum SFE instances.
        pub const SFE_HW_NUM_MAX: usize = 2;
    } else {
        /// Maximum SFE instances (SFE support compiled out).
        pub const SFE_HW_NUM_MAX: usize = 0;
    }
}

/// RDI paths per IFE.
pub const IFE_RDI_NUM_MAX: usize = 4;
/// RDI paths per SFE.
pub const SFE_RDI_NUM_MAX: usize = 5;
/// Fetch-engine RDI paths per SFE.
pub const SFE_FE_RDI_NUM_MAX: usize = 3;
/// RDI paths per TFE.
pub const TFE_RDI_NUM_MAX: usize = 3;

/// Bus completion groups on the IFE/TFE write bus.
pub const ISP_BUS_COMP_NUM_MAX: usize = 18;
/// Bus completion groups on the SFE write bus.
pub const SFE_BUS_COMP_NUM_MAX: usize = 12;

/// Contexts that may hold IFE (and SFE) lines at once.
pub const IFE_CTX_MAX: usize = 8;
/// Contexts that may hold TFE lines at once.
pub const TFE_CTX_MAX: usize = 4;

/// Lines of one family a single context may span (dual configuration).
pub const MAX_LINES_PER_FAMILY: usize = 2;
/// Lines a single context may span across all families.
pub const MAX_LINES_PER_CTX: usize = 4;

/// Hardware-line family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HwFamily {
    /// Image front end.
    Ife,
    /// Secondary front end.
    Sfe,
    /// Test/thin front end.
    Tfe,
}

impl HwFamily {
    /// All families, in arena order.
    pub const ALL: [HwFamily; 3] = [HwFamily::Ife, HwFamily::Sfe, HwFamily::Tfe];

    /// Upper bound on instances of this family.
    pub const fn max_instances(self) -> usize {
        match self {
            Self::Ife => IFE_HW_NUM_MAX,
            Self::Sfe => SFE_HW_NUM_MAX,
            Self::Tfe => TFE_HW_NUM_MAX,
        }
    }

    /// RDI paths available on one instance.
    pub const fn max_rdi(self) -> usize {
        match self {
            Self::Ife => IFE_RDI_NUM_MAX,
            Self::Sfe => SFE_RDI_NUM_MAX,
            Self::Tfe => TFE_RDI_NUM_MAX,
        }
    }

    /// Upper bound on contexts concurrently holding this family.
    pub const fn max_contexts(self) -> usize {
        match self {
            Self::Ife | Self::Sfe => IFE_CTX_MAX,
            Self::Tfe => TFE_CTX_MAX,
        }
    }

    /// The write bus whose completion groups this family reports into.
    pub const fn bus(self) -> BusKind {
        match self {
            Self::Ife | Self::Tfe => BusKind::Isp,
            Self::Sfe => BusKind::Sfe,
        }
    }

    /// Short lowercase name used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ife => "ife",
            Self::Sfe => "sfe",
            Self::Tfe => "tfe",
        }
    }
}

impl fmt::Display for HwFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Write bus a completion group belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BusKind {
    /// IFE/TFE write bus.
    Isp,
    /// SFE write bus.
    Sfe,
}

impl BusKind {
    /// Number of completion groups on this bus.
    pub const fn max_comp_groups(self) -> usize {
        match self {
            Self::Isp => ISP_BUS_COMP_NUM_MAX,
            Self::Sfe => SFE_BUS_COMP_NUM_MAX,
        }
    }
}

/// Physical identity of a hardware line: family plus instance index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HwLineId {
    /// Hardware family of the line.
    pub family: HwFamily,
    /// Index among the lines of the same family.
    pub instance: u8,
}

impl HwLineId {
    /// Line `instance` of `family`.
    pub const fn new(family: HwFamily, instance: u8) -> Self {
        Self { family, instance }
    }
}

impl fmt::Display for HwLineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.family, self.instance)
    }
}

/// Stop command type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCmd {
    /// Finish the current frame, then halt.
    AtFrameBoundary,
    /// Reset now; in-flight completions are discarded.
    Immediately,
}

/// Driver interface for one physical hardware line.
///
/// Implemented by the per-variant register programming layer. Methods are
/// called from the blocking context only, except [`is_halted`] which may be
/// polled while waiting for a reset acknowledgment.
///
/// [`is_halted`]: IspHwLineOps::is_halted
pub trait IspHwLineOps: Send + Sync {
    /// Identity of this line.
    fn id(&self) -> HwLineId;

    /// Power up and load the line's base configuration.
    fn init(&self) -> AxResult;

    /// Power down the line.
    fn deinit(&self) -> AxResult;

    /// Start streaming.
    fn start(&self) -> AxResult;

    /// Stop streaming.
    fn stop(&self, cmd: StopCmd) -> AxResult;

    /// Whether the line has acknowledged the last stop.
    fn is_halted(&self) -> bool;

    /// Mask or unmask the line's interrupts.
    fn set_irq_enabled(&self, enabled: bool);

    /// Push register writes described by command buffers.
    fn write_regs(&self, cmds: &[CmdBufDesc]) -> AxResult;

    /// Submit a bandwidth/clock vote to the bus and clock arbiter.
    fn apply_bw_clk(&self, vote: &BwClkVote) -> AxResult;

    /// Program the line's default (bypass) configuration.
    fn program_default_cfg(&self) -> AxResult {
        Ok(())
    }

    /// Log line-specific stream information.
    fn dump_stream_info(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_limits() {
        assert_eq!(HwFamily::Ife.max_instances(), 8);
        assert_eq!(HwFamily::Tfe.max_instances(), 3);
        assert_eq!(HwFamily::Tfe.max_contexts(), 4);
        assert_eq!(HwFamily::Sfe.max_rdi(), 5);
        assert_eq!(HwFamily::Tfe.bus(), BusKind::Isp);
        assert_eq!(HwFamily::Sfe.bus().max_comp_groups(), 12);
    }

    #[test]
    fn test_line_id_display() {
        let id = HwLineId::new(HwFamily::Ife, 3);
        assert_eq!(alloc::format!("{}", id), "ife3");
    }
}
