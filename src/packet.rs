//! Configuration packets and the hardware update descriptor produced from them.
//!
//! The packet has already been walked by the packet-parsing layer; what
//! arrives here is its buffer-descriptor list plus the decoded blobs. This
//! module checks the packet is consistent and turns it into a
//! [`HwUpdateDescriptor`] the lifecycle can apply at a frame boundary.

use alloc::vec::Vec;

use arrayvec::ArrayVec;
use memory_addr::PhysAddr;

use crate::admission::BwClkVote;
use crate::context::ContextId;
use crate::error::{IspError, IspResult};
use crate::hw::BusKind;
use crate::record::{ResourceHandle, ResourceRecord};

/// Configuration entries for the worst-case dual IFE use case.
pub const CTX_CFG_MAX: usize = 25;
/// Configuration entries when SFE and CSID entries are included.
pub const SFE_CTX_CFG_MAX: usize = 40;
/// Register-dump command buffers per request.
pub const REG_DUMP_MAX_BUF_ENTRIES: usize = 10;

/// Packet opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PacketOpcode {
    /// Full initialization of the binding.
    InitDev = 1,
    /// Per-frame update.
    UpdateDev = 2,
}

impl TryFrom<u32> for PacketOpcode {
    type Error = IspError;

    fn try_from(value: u32) -> IspResult<Self> {
        match value {
            1 => Ok(Self::InitDev),
            2 => Ok(Self::UpdateDev),
            _ => Err(IspError::MalformedPacket("unknown opcode")),
        }
    }
}

/// Command buffer descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmdBufDesc {
    pub mem_handle: u32,
    pub offset: u32,
    pub size: u32,
    pub length: u32,
    /// Buffer type tag assigned by user space.
    pub meta_data: u32,
}

impl CmdBufDesc {
    fn validate(&self) -> IspResult {
        if self.length == 0 {
            return Err(IspError::MalformedPacket("zero-length command buffer"));
        }
        match self.offset.checked_add(self.length) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(IspError::MalformedPacket("command buffer exceeds its allocation")),
        }
    }
}

/// Frame-header buffer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeaderDesc {
    pub iova: PhysAddr,
    /// Output resource whose buffer carries the header.
    pub res_id: u32,
}

/// Dynamic sensor-switch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MupConfig {
    pub mup_val: u32,
    pub num_exp: u32,
}

/// A decoded configuration packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigPacket {
    pub request_id: u64,
    /// Raw opcode from the packet header.
    pub opcode: u32,
    pub cmd_bufs: Vec<CmdBufDesc>,
    /// Output resources expected to complete for this request.
    pub out_res_ids: Vec<u32>,
    pub frame_header: Option<FrameHeaderDesc>,
    pub reg_dump: Vec<CmdBufDesc>,
    pub bw_clk: Option<BwClkVote>,
    pub mup: Option<MupConfig>,
}

/// Prepared hardware update, ready to be applied at a frame boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HwUpdateDescriptor {
    pub ctx: ContextId,
    pub request_id: u64,
    pub opcode: PacketOpcode,
    pub reg_writes: Vec<CmdBufDesc>,
    /// Completion groups that will report for this request.
    pub expected_groups: Vec<(BusKind, u8)>,
    pub expected_handles: Vec<ResourceHandle>,
    pub frame_header: Option<FrameHeaderDesc>,
    pub reg_dump: ArrayVec<CmdBufDesc, REG_DUMP_MAX_BUF_ENTRIES>,
    /// A bandwidth/clock vote was staged by this packet.
    pub bw_clk_staged: bool,
    pub mup: Option<MupConfig>,
}

/// Checks `packet` against the context's resources and builds the update
/// descriptor. Staging of the vote is left to the caller so that a rejected
/// packet never touches the admission table.
pub fn build_update(
    ctx: ContextId,
    packet: &ConfigPacket,
    record: &ResourceRecord,
    max_entries: usize,
) -> IspResult<HwUpdateDescriptor> {
    let opcode = PacketOpcode::try_from(packet.opcode)?;

    if packet.cmd_bufs.len() > max_entries {
        return Err(IspError::MalformedPacket("too many configuration entries"));
    }
    for desc in &packet.cmd_bufs {
        desc.validate()?;
    }

    if packet.reg_dump.len() > REG_DUMP_MAX_BUF_ENTRIES {
        return Err(IspError::MalformedPacket("too many register-dump buffers"));
    }
    let mut reg_dump = ArrayVec::new();
    for desc in &packet.reg_dump {
        desc.validate()?;
        reg_dump.push(*desc);
    }

    if let Some(header) = &packet.frame_header {
        if record.handle_of(header.res_id).is_none() {
            return Err(IspError::MalformedPacket("frame header bound to unknown resource"));
        }
    }

    let mut expected_handles = Vec::with_capacity(packet.out_res_ids.len());
    let mut expected_groups: Vec<(BusKind, u8)> = Vec::new();
    for res_id in &packet.out_res_ids {
        let handle = record
            .handle_of(*res_id)
            .ok_or(IspError::MalformedPacket("output resource not acquired"))?;
        if expected_handles.contains(&handle) {
            return Err(IspError::MalformedPacket("output resource listed twice"));
        }
        expected_handles.push(handle);
        if let Some(group) = record.comp_group_of(handle) {
            if !expected_groups.contains(&group) {
                expected_groups.push(group);
            }
        }
    }

    Ok(HwUpdateDescriptor {
        ctx,
        request_id: packet.request_id,
        opcode,
        reg_writes: packet.cmd_bufs.clone(),
        expected_groups,
        expected_handles,
        frame_header: packet.frame_header,
        reg_dump,
        bw_clk_staged: packet.bw_clk.as_ref().is_some_and(|v| !v.is_empty()),
        mup: packet.mup,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::HwFamily;
    use crate::record::OutResourceRequest;
    use alloc::vec;

    fn desc(offset: u32, length: u32) -> CmdBufDesc {
        CmdBufDesc {
            mem_handle: 7,
            offset,
            size: 0x1000,
            length,
            meta_data: 0,
        }
    }

    fn record() -> ResourceRecord {
        let mut record = ResourceRecord::new();
        for (i, group) in [(0u32, 0u8), (1, 0), (2, 4)] {
            record
                .insert(
                    ResourceHandle(i + 10),
                    OutResourceRequest {
                        res_id: 0x3000 + i,
                        family: HwFamily::Ife,
                        comp_group: group,
                    },
                    1,
                )
                .unwrap();
        }
        record
    }

    fn packet(opcode: u32) -> ConfigPacket {
        ConfigPacket {
            request_id: 1,
            opcode,
            cmd_bufs: vec![desc(0, 0x100)],
            out_res_ids: vec![0x3000, 0x3001, 0x3002],
            ..Default::default()
        }
    }

    #[test]
    fn test_build_update_groups() {
        let update = build_update(ContextId(1), &packet(1), &record(), CTX_CFG_MAX).unwrap();
        assert_eq!(update.opcode, PacketOpcode::InitDev);
        assert_eq!(update.expected_handles.len(), 3);
        assert_eq!(update.expected_groups, vec![(BusKind::Isp, 0), (BusKind::Isp, 4)]);
        assert!(!update.bw_clk_staged);
    }

    #[test]
    fn test_build_update_rejects_bad_opcode() {
        let err = build_update(ContextId(1), &packet(9), &record(), CTX_CFG_MAX).unwrap_err();
        assert_eq!(err, IspError::MalformedPacket("unknown opcode"));
    }

    #[test]
    fn test_build_update_rejects_bad_descriptors() {
        let mut p = packet(2);
        p.cmd_bufs = vec![desc(0xF00, 0x200)];
        assert!(build_update(ContextId(1), &p, &record(), CTX_CFG_MAX).is_err());

        p.cmd_bufs = vec![desc(0, 0)];
        assert!(build_update(ContextId(1), &p, &record(), CTX_CFG_MAX).is_err());

        p.cmd_bufs = vec![desc(0, 4); CTX_CFG_MAX + 1];
        assert!(build_update(ContextId(1), &p, &record(), CTX_CFG_MAX).is_err());
        assert!(build_update(ContextId(1), &p, &record(), SFE_CTX_CFG_MAX).is_ok());
    }

    #[test]
    fn test_build_update_checks_resources() {
        let mut p = packet(2);
        p.out_res_ids = vec![0x9999];
        assert!(build_update(ContextId(1), &p, &record(), CTX_CFG_MAX).is_err());

        let mut p = packet(2);
        p.frame_header = Some(FrameHeaderDesc {
            iova: PhysAddr::from(0x4000usize),
            res_id: 0x3002,
        });
        p.reg_dump = vec![desc(0, 8); REG_DUMP_MAX_BUF_ENTRIES];
        let update = build_update(ContextId(1), &p, &record(), CTX_CFG_MAX).unwrap();
        assert_eq!(update.reg_dump.len(), REG_DUMP_MAX_BUF_ENTRIES);

        p.reg_dump.push(desc(0, 8));
        assert!(build_update(ContextId(1), &p, &record(), CTX_CFG_MAX).is_err());
    }
}
