//! Side-channel command interface.
//!
//! Commands are queries or idempotent actions layered over a context. None of
//! them crosses a lifecycle boundary: pause and resume keep the binding
//! Running, and nothing here acquires or releases.

use crate::admission::ClockConfig;
use crate::context::{ContextType, SofTs};
use crate::packet::{HwUpdateDescriptor, PacketOpcode};
use crate::record::CompRecordQuery;

/// Command with its input payload.
#[derive(Debug, Clone, Copy)]
pub enum IspCommand<'a> {
    IsRdiOnlyContext,
    PauseHw,
    ResumeHw,
    /// Log every delivered SOF at info level.
    SofDebug(bool),
    CtxType,
    GetPacketOpcode(&'a HwUpdateDescriptor),
    GetLastCdmDone,
    ProgDefaultCfg,
    GetSofTs,
    DumpStreamInfo,
    UpdateClock(&'a ClockConfig),
    GetBusCompGroup,
}

impl IspCommand<'_> {
    /// Name used in logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::IsRdiOnlyContext => "IS_RDI_ONLY_CONTEXT",
            Self::PauseHw => "PAUSE_HW",
            Self::ResumeHw => "RESUME_HW",
            Self::SofDebug(_) => "SOF_DEBUG",
            Self::CtxType => "CTX_TYPE",
            Self::GetPacketOpcode(_) => "GET_PACKET_OPCODE",
            Self::GetLastCdmDone => "GET_LAST_CDM_DONE",
            Self::ProgDefaultCfg => "PROG_DEFAULT_CFG",
            Self::GetSofTs => "GET_SOF_TS",
            Self::DumpStreamInfo => "DUMP_STREAM_INFO",
            Self::UpdateClock(_) => "UPDATE_CLOCK",
            Self::GetBusCompGroup => "GET_BUS_COMP_GROUP",
        }
    }
}

/// Command output payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IspCommandOutput {
    /// The command is an action with nothing to report.
    None,
    IsRdiOnly(bool),
    CtxType(ContextType),
    PacketOpcode(PacketOpcode),
    LastCdmDone(u64),
    SofTs(SofTs),
    BusCompGroup(CompRecordQuery),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names() {
        assert_eq!(IspCommand::PauseHw.name(), "PAUSE_HW");
        assert_eq!(IspCommand::SofDebug(true).name(), "SOF_DEBUG");
        assert_eq!(IspCommand::GetBusCompGroup.name(), "GET_BUS_COMP_GROUP");
    }
}
