#![no_std]

//! # ISP Hardware Manager
//!
//! This crate provides the hardware event dispatch and context lifecycle core
//! of an Image Signal Processor (ISP) hardware manager. It is designed for
//! `no_std` environments and uses the `alloc` crate for dynamic memory
//! allocation.
//!
//! ## Architecture
//!
//! The crate is organized leaf-first:
//!
//! ### Bookkeeping
//! - [`ResourceRecord`]: output resources per bus completion group, DONE aggregation
//! - [`BwClkAdmission`]: staged and active bandwidth/clock votes per context
//! - [`HwLineArena`]: physical hardware lines addressed by index, with owner tracking
//!
//! ### Interrupt Path
//! - [`EventTranslator`]: raw interrupt to typed [`HwEvent`]s, side-effect free
//! - [`ContextDispatchRouter`]: (line, resource handle) to context routing, inline
//!   or deferred delivery through each context's [`EventSink`]
//!
//! ### Lifecycle
//! - [`BindingLifecycle`]: atomic state and outstanding-completion tracking
//! - [`IspHwMgr`]: acquire, prepare, apply, start, stop, pause/resume, release
//!   and recovery for all contexts of one device
//! - [`HwMgrRegistry`]: managers keyed by device name, with the process-wide
//!   [`init`], [`deinit`] and [`get`]
//!
//! ## Features
//!
//! - **Exclusive line ownership**: a line belongs to at most one context
//! - **No lost or misrouted events**: unmatched events are logged as orphans
//! - **Frame-boundary apply**: bandwidth/clock votes and register writes
//!   take effect together or not at all
//! - **Internal recovery**: fatal errors restart the hardware without
//!   tearing the session down
//! - **Statistics**: dispatch counters and per-line interrupt counters
//!
//! ## Supported Hardware Families
//!
//! | Family | Instances | RDI | Completion groups | Contexts |
//! |--------|-----------|-----|-------------------|----------|
//! | IFE    | 8         | 4   | 18                | 8        |
//! | SFE    | 2 (`sfe`) | 5   | 12                | 8        |
//! | TFE    | 3         | 3   | 18                | 4        |
//!
//! ## Examples
//!
//! ### Streaming one RDI context
//!
//! ```rust,ignore
//! use axisp::{AcquireArgs, ContextType, IspHwMgrConfig, LineRequest, StartArgs, StopArgs};
//!
//! let (mgr, _iommu) = axisp::init("cam-isp", &platform, IspHwMgrConfig::default())?;
//!
//! let out = mgr.acquire(AcquireArgs {
//!     ctx_type: ContextType::Rdi,
//!     lines: vec![LineRequest::single(HwFamily::Ife)],
//!     resources: vec![OutResourceRequest { res_id: 0x3000, family: HwFamily::Ife, comp_group: 0 }],
//!     flags: AcquireFlags::empty(),
//!     handler: session.clone(),
//! })?;
//!
//! let update = mgr.prepare(out.ctx, &init_packet)?;
//! mgr.apply_update(out.ctx, &update)?;
//! mgr.start(out.ctx, StartArgs::default())?;
//! ```
//!
//! ### Interrupt and recovery servicing
//!
//! ```rust,ignore
//! // Top half
//! fn isp_irq(raw: &RawIrq) {
//!     if let Some(mgr) = axisp::get("cam-isp") {
//!         mgr.handle_irq(raw);
//!     }
//! }
//!
//! // Bottom half
//! loop {
//!     mgr.service_recovery()?;
//!     mgr.drain_events(ctx, 32)?;
//! }
//! ```

extern crate alloc;
#[macro_use]
extern crate log;

mod admission;
mod command;
mod config;
mod context;
mod error;
mod event;
mod hw;
mod lifecycle;
mod line;
mod manager;
mod packet;
mod record;
mod registry;
mod translator;
pub mod dispatch;

pub use admission::{
    AxiPathVote, BwClkAdmission, BwClkVote, BwConfig, BwConfigV1, BwConfigV2, BwVote, ClockConfig,
    ClockUsage, MAX_PER_PATH_VOTES,
};
pub use command::{IspCommand, IspCommandOutput};
pub use config::{DeliveryMode, IspHwMgrConfig};
pub use context::{
    AcquireArgs, AcquireFlags, AcquireOutput, ContextId, ContextType, IspContext, IspEventHandler,
    LifecycleNotice, SofTimestamps, SofTs, StartArgs, StopArgs,
};
pub use dispatch::{ContextDispatchRouter, DispatchOutcome, DispatchStatsSnapshot, EventSink};
pub use error::{IspError, IspResult};
pub use event::{
    DoneEventData, EofEventData, EpochEventData, ErrorEventData, ErrorKind, EventData, EventSource,
    HwEvent, HwEventKind, RegUpdateEventData, SecondaryEventData, SecondaryEventKind, SofEventData,
};
pub use hw::*;
pub use lifecycle::{BindingLifecycle, ContextState, StateAndCount};
pub use line::{HwLineArena, HwLineIndex, HwLineSlot, LineRequest, LineSet, LineStats};
pub use manager::IspHwMgr;
pub use packet::{
    CTX_CFG_MAX, CmdBufDesc, ConfigPacket, FrameHeaderDesc, HwUpdateDescriptor, MupConfig,
    PacketOpcode, REG_DUMP_MAX_BUF_ENTRIES, SFE_CTX_CFG_MAX, build_update,
};
pub use record::{
    CompRecord, CompRecordQuery, DoneProgress, NUM_OUT_PER_COMP_IRQ_MAX, OutResourceRequest,
    ResourceHandle, ResourceRecord,
};
pub use registry::{
    HwMgrRegistry, IommuHandle, IspPlatform, PlatformDevice, deinit, get, init,
};
pub use translator::{
    EventTranslator, IrqStatus, IrqTimestamps, MAX_DONE_PER_IRQ, MAX_EVENTS_PER_IRQ, RawDone,
    RawIrq,
};
