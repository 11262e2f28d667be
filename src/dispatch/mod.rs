//! Interrupt-side event dispatch.
//!
//! - [`snapshot`]: double-buffered tables readers never wait on
//! - [`routing`]: (line, resource handle) to context table
//! - [`queue`]: bounded lock-free per-context ring for deferred delivery
//! - [`delivery`]: per-context sink, inline call or deferred queue
//! - [`router`]: resolves, filters and delivers translated events

pub mod delivery;
pub mod queue;
pub mod router;
pub mod routing;
pub mod snapshot;

pub use delivery::{Delivery, EventSink};
pub use queue::{COMPLETION_HEADROOM, EventQueue, QueuedEvent};
pub use router::{ContextDispatchRouter, DispatchOutcome, DispatchStats, DispatchStatsSnapshot};
pub use routing::RoutingTable;
pub use snapshot::SnapshotCell;
