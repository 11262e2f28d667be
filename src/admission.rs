//! Bandwidth and clock admission.
//!
//! Votes arriving with configuration packets are validated and staged here.
//! They become active only when the lifecycle applies a hardware update, so a
//! vote never changes mid-frame.

use alloc::vec::Vec;

use crate::error::{IspError, IspResult};
use crate::hw::IFE_RDI_NUM_MAX;

/// Per-path bandwidth votes supported for a dual configuration.
pub const MAX_PER_PATH_VOTES: usize = 40;

/// Single or dual pixel-path usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockUsage {
    #[default]
    Single,
    Dual,
}

/// A single bandwidth vote in bytes per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BwVote {
    pub cam_bw_bps: u64,
    pub ext_bw_bps: u64,
}

/// Legacy fixed-path bandwidth descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BwConfigV1 {
    pub usage: ClockUsage,
    pub left_pix_vote: BwVote,
    pub right_pix_vote: BwVote,
    pub rdi_vote: Vec<BwVote>,
}

/// One AXI path vote of the per-path descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxiPathVote {
    pub path_data_type: u32,
    pub transac_type: u32,
    pub camnoc_bw: u64,
    pub mnoc_ab_bw: u64,
    pub mnoc_ib_bw: u64,
}

/// Per-path bandwidth descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BwConfigV2 {
    pub usage: ClockUsage,
    pub axi_path: Vec<AxiPathVote>,
}

/// Exactly one bandwidth descriptor version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BwConfig {
    V1(BwConfigV1),
    V2(BwConfigV2),
}

impl BwConfig {
    /// Descriptor version number.
    pub const fn version(&self) -> u32 {
        match self {
            Self::V1(_) => 1,
            Self::V2(_) => 2,
        }
    }

    fn check_capacity(&self) -> IspResult {
        let (requested, max) = match self {
            Self::V1(v1) => (v1.rdi_vote.len(), IFE_RDI_NUM_MAX),
            Self::V2(v2) => (v2.axi_path.len(), MAX_PER_PATH_VOTES),
        };
        if requested > max {
            return Err(IspError::CapacityExceeded { requested, max });
        }
        Ok(())
    }
}

/// Clock request for one family.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClockConfig {
    pub usage: ClockUsage,
    pub left_pix_hz: u64,
    /// Only meaningful for [`ClockUsage::Dual`].
    pub right_pix_hz: u64,
    pub rdi_hz: Vec<u64>,
}

impl ClockConfig {
    fn check_capacity(&self) -> IspResult {
        if self.rdi_hz.len() > IFE_RDI_NUM_MAX {
            return Err(IspError::CapacityExceeded {
                requested: self.rdi_hz.len(),
                max: IFE_RDI_NUM_MAX,
            });
        }
        Ok(())
    }

    /// Highest clock requested by any path.
    pub fn max_hz(&self) -> u64 {
        self.rdi_hz
            .iter()
            .copied()
            .chain([self.left_pix_hz, self.right_pix_hz])
            .max()
            .unwrap_or(0)
    }
}

/// Bandwidth/clock vote. A `None` field is "not part of this vote".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BwClkVote {
    pub bw: Option<BwConfig>,
    pub ife_clock: Option<ClockConfig>,
    pub sfe_clock: Option<ClockConfig>,
}

impl BwClkVote {
    /// Whether the vote carries nothing.
    pub fn is_empty(&self) -> bool {
        self.bw.is_none() && self.ife_clock.is_none() && self.sfe_clock.is_none()
    }

    fn check_capacity(&self) -> IspResult {
        if let Some(bw) = &self.bw {
            bw.check_capacity()?;
        }
        if let Some(clk) = &self.ife_clock {
            clk.check_capacity()?;
        }
        if let Some(clk) = &self.sfe_clock {
            clk.check_capacity()?;
        }
        Ok(())
    }

    /// Overlays every field present in `other`.
    fn merge_from(&mut self, other: &BwClkVote) {
        if let Some(bw) = &other.bw {
            self.bw = Some(bw.clone());
        }
        if let Some(clk) = &other.ife_clock {
            self.ife_clock = Some(clk.clone());
        }
        if let Some(clk) = &other.sfe_clock {
            self.sfe_clock = Some(clk.clone());
        }
    }
}

/// Staged and active votes of one context.
#[derive(Debug, Default)]
pub struct BwClkAdmission {
    staged: BwClkVote,
    active: BwClkVote,
}

impl BwClkAdmission {
    /// Creates a table with nothing staged or active.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `vote`, overlaying any earlier staged fields.
    ///
    /// # Errors
    ///
    /// [`IspError::CapacityExceeded`] if any descriptor has more paths than
    /// supported. Nothing is written in that case.
    pub fn stage(&mut self, vote: &BwClkVote) -> IspResult {
        vote.check_capacity()?;
        self.staged.merge_from(vote);
        trace!(
            "staged bw/clk vote: bw_v{:?} ife_clk={} sfe_clk={}",
            self.staged.bw.as_ref().map(BwConfig::version),
            self.staged.ife_clock.is_some(),
            self.staged.sfe_clock.is_some()
        );
        Ok(())
    }

    /// Whether anything is staged.
    #[inline]
    pub fn has_staged(&self) -> bool {
        !self.staged.is_empty()
    }

    /// Currently staged vote.
    #[inline]
    pub fn staged(&self) -> &BwClkVote {
        &self.staged
    }

    /// Currently active vote.
    #[inline]
    pub fn active(&self) -> &BwClkVote {
        &self.active
    }

    /// Moves the staged vote into the active configuration.
    ///
    /// Returns `true` if something was staged. With nothing staged the active
    /// vote is left as is.
    pub fn apply(&mut self) -> bool {
        self.apply_with(|_| Ok(())).unwrap_or(false)
    }

    /// Applies the staged vote only if `program` succeeds.
    ///
    /// `program` receives the vote that would become active, or `None` when
    /// nothing is staged. On error both the staged and active votes are left
    /// untouched.
    pub fn apply_with<F>(&mut self, program: F) -> IspResult<bool>
    where
        F: FnOnce(Option<&BwClkVote>) -> IspResult,
    {
        if !self.has_staged() {
            program(None)?;
            return Ok(false);
        }
        let mut next = self.active.clone();
        next.merge_from(&self.staged);
        program(Some(&next))?;
        self.active = next;
        self.staged = BwClkVote::default();
        Ok(true)
    }

    /// Clock usage in effect: the staged IFE clock if one is pending,
    /// otherwise the active one.
    pub fn clock_usage(&self) -> ClockUsage {
        self.staged
            .ife_clock
            .as_ref()
            .or(self.active.ife_clock.as_ref())
            .map(|clk| clk.usage)
            .unwrap_or_default()
    }

    /// Drops both staged and active votes.
    pub fn clear(&mut self) {
        self.staged = BwClkVote::default();
        self.active = BwClkVote::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn v2_vote(paths: usize) -> BwClkVote {
        BwClkVote {
            bw: Some(BwConfig::V2(BwConfigV2 {
                usage: ClockUsage::Single,
                axi_path: vec![
                    AxiPathVote {
                        path_data_type: 1,
                        transac_type: 1,
                        camnoc_bw: 1_000_000,
                        mnoc_ab_bw: 2_000_000,
                        mnoc_ib_bw: 3_000_000,
                    };
                    paths
                ],
            })),
            ife_clock: None,
            sfe_clock: None,
        }
    }

    #[test]
    fn test_stage_then_apply_is_exact() {
        let mut table = BwClkAdmission::new();
        let vote = v2_vote(1);
        table.stage(&vote).unwrap();
        assert!(table.apply());
        assert_eq!(table.active(), &vote);
        assert!(!table.has_staged());
    }

    #[test]
    fn test_apply_without_stage_keeps_active() {
        let mut table = BwClkAdmission::new();
        let vote = v2_vote(2);
        table.stage(&vote).unwrap();
        table.apply();
        assert!(!table.apply());
        assert_eq!(table.active(), &vote);
    }

    #[test]
    fn test_stage_over_capacity_preserves_previous() {
        let mut table = BwClkAdmission::new();
        let good = v2_vote(3);
        table.stage(&good).unwrap();

        let err = table.stage(&v2_vote(MAX_PER_PATH_VOTES + 1)).unwrap_err();
        assert_eq!(
            err,
            IspError::CapacityExceeded {
                requested: MAX_PER_PATH_VOTES + 1,
                max: MAX_PER_PATH_VOTES
            }
        );
        assert_eq!(table.staged(), &good);
    }

    #[test]
    fn test_versions_are_exclusive() {
        let mut table = BwClkAdmission::new();
        table.stage(&v2_vote(1)).unwrap();
        let v1 = BwClkVote {
            bw: Some(BwConfig::V1(BwConfigV1::default())),
            ..Default::default()
        };
        table.stage(&v1).unwrap();
        assert_eq!(table.staged().bw.as_ref().map(BwConfig::version), Some(1));
    }

    #[test]
    fn test_apply_with_failure_keeps_state() {
        let mut table = BwClkAdmission::new();
        table.stage(&v2_vote(1)).unwrap();
        let result = table.apply_with(|_| Err(IspError::Timeout));
        assert_eq!(result, Err(IspError::Timeout));
        assert!(table.has_staged());
        assert!(table.active().is_empty());
    }

    #[test]
    fn test_clock_usage_query() {
        let mut table = BwClkAdmission::new();
        assert_eq!(table.clock_usage(), ClockUsage::Single);
        table
            .stage(&BwClkVote {
                ife_clock: Some(ClockConfig {
                    usage: ClockUsage::Dual,
                    left_pix_hz: 600_000_000,
                    right_pix_hz: 600_000_000,
                    rdi_hz: vec![400_000_000],
                }),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(table.clock_usage(), ClockUsage::Dual);
        table.apply();
        assert_eq!(table.clock_usage(), ClockUsage::Dual);
        assert_eq!(table.active().ife_clock.as_ref().unwrap().max_hz(), 600_000_000);
    }
}
