//! Hardware manager configuration.

/// How events reach a context's handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Call the handler synchronously from the interrupt path.
    #[default]
    Inline,
    /// Queue events per context; a blocking context drains them.
    Deferred,
}

/// Configuration of one [`IspHwMgr`](crate::IspHwMgr) instance.
///
/// ```rust,ignore
/// let config = IspHwMgrConfig::default()
///     .with_delivery(DeliveryMode::Deferred)
///     .with_event_queue_depth(128);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IspHwMgrConfig {
    /// Internal stop/restart on fatal hardware errors.
    pub recovery_enabled: bool,
    /// Ask user space to dump the request when an error is reported.
    pub req_dump_on_error: bool,
    /// Spin budget for outstanding completions during a frame-boundary stop.
    pub frame_boundary_timeout_spins: usize,
    /// Spin budget for a halt acknowledgment during an immediate stop.
    pub halt_timeout_spins: usize,
    pub delivery: DeliveryMode,
    /// Per-context queue depth in deferred mode.
    pub event_queue_depth: usize,
}

impl IspHwMgrConfig {
    pub const DEFAULT_FRAME_BOUNDARY_TIMEOUT_SPINS: usize = 1_000_000;
    pub const DEFAULT_HALT_TIMEOUT_SPINS: usize = 100_000;
    pub const DEFAULT_EVENT_QUEUE_DEPTH: usize = 64;

    pub const fn new() -> Self {
        Self {
            recovery_enabled: true,
            req_dump_on_error: false,
            frame_boundary_timeout_spins: Self::DEFAULT_FRAME_BOUNDARY_TIMEOUT_SPINS,
            halt_timeout_spins: Self::DEFAULT_HALT_TIMEOUT_SPINS,
            delivery: DeliveryMode::Inline,
            event_queue_depth: Self::DEFAULT_EVENT_QUEUE_DEPTH,
        }
    }

    pub const fn with_recovery(mut self, enabled: bool) -> Self {
        self.recovery_enabled = enabled;
        self
    }

    pub const fn with_req_dump_on_error(mut self, enabled: bool) -> Self {
        self.req_dump_on_error = enabled;
        self
    }

    pub const fn with_frame_boundary_timeout(mut self, spins: usize) -> Self {
        self.frame_boundary_timeout_spins = spins;
        self
    }

    pub const fn with_halt_timeout(mut self, spins: usize) -> Self {
        self.halt_timeout_spins = spins;
        self
    }

    pub const fn with_delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }

    /// Sets the deferred queue depth. A depth of zero is raised to one.
    pub const fn with_event_queue_depth(mut self, depth: usize) -> Self {
        self.event_queue_depth = if depth == 0 { 1 } else { depth };
        self
    }
}

impl Default for IspHwMgrConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = IspHwMgrConfig::default();
        assert!(config.recovery_enabled);
        assert!(!config.req_dump_on_error);
        assert_eq!(config.delivery, DeliveryMode::Inline);
        assert_eq!(config.event_queue_depth, 64);
    }

    #[test]
    fn test_config_builder() {
        let config = IspHwMgrConfig::new()
            .with_recovery(false)
            .with_delivery(DeliveryMode::Deferred)
            .with_event_queue_depth(0)
            .with_halt_timeout(10);
        assert!(!config.recovery_enabled);
        assert_eq!(config.delivery, DeliveryMode::Deferred);
        assert_eq!(config.event_queue_depth, 1);
        assert_eq!(config.halt_timeout_spins, 10);
    }
}
