//! Error taxonomy for the ISP hardware manager.
//!
//! Blocking-context operations return [`IspResult`]. Hardware-line drivers are
//! external collaborators and report failures as [`AxError`]; those are carried
//! through unchanged in [`IspError::Hw`].

use core::fmt;

use axerrno::AxError;

use crate::event::ErrorKind;
use crate::hw::HwFamily;
use crate::lifecycle::ContextState;

/// Errors surfaced by the hardware manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IspError {
    /// No free hardware line or context slot for the requested family.
    ResourceExhausted(HwFamily),
    /// Configuration packet opcode or buffer descriptors are inconsistent.
    MalformedPacket(&'static str),
    /// A bandwidth/clock vote asks for more paths than supported.
    CapacityExceeded { requested: usize, max: usize },
    /// Fatal hardware condition decoded from an error event.
    HardwareFatal(ErrorKind),
    /// Internal stop/restart after a fatal error did not bring the binding back.
    RecoveryFailed,
    /// Hardware did not acknowledge a halt within the configured budget.
    Timeout,
    /// The operation is not valid from the binding's current state.
    InvalidState(ContextState),
    /// Acquire arguments or command input are inconsistent.
    InvalidArgument(&'static str),
    /// Unknown context or device.
    NotFound,
    /// Another blocking operation on the same binding is in progress.
    Busy,
    /// The named device is not present on the platform.
    InitFailed,
    /// The named device already has a manager bound to it.
    AlreadyInitialized,
    /// A hardware-line driver reported an error.
    Hw(AxError),
}

/// Result type used throughout the crate.
pub type IspResult<T = ()> = Result<T, IspError>;

impl IspError {
    /// Whether this error means the hardware can no longer be trusted.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::HardwareFatal(_) | Self::RecoveryFailed | Self::Timeout
        )
    }
}

impl fmt::Display for IspError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceExhausted(family) => {
                write!(f, "no free {} hardware line or context slot", family)
            }
            Self::MalformedPacket(reason) => write!(f, "malformed configuration packet: {}", reason),
            Self::CapacityExceeded { requested, max } => {
                write!(f, "vote requests {} paths, at most {} supported", requested, max)
            }
            Self::HardwareFatal(kind) => write!(f, "fatal hardware error: {}", kind),
            Self::RecoveryFailed => f.write_str("internal recovery failed"),
            Self::Timeout => f.write_str("hardware halt not acknowledged in time"),
            Self::InvalidState(state) => write!(f, "operation not valid in state {:?}", state),
            Self::InvalidArgument(reason) => write!(f, "invalid argument: {}", reason),
            Self::NotFound => f.write_str("not found"),
            Self::Busy => f.write_str("binding busy"),
            Self::InitFailed => f.write_str("device not present"),
            Self::AlreadyInitialized => f.write_str("device already initialized"),
            Self::Hw(err) => write!(f, "hardware line error: {:?}", err),
        }
    }
}

impl From<AxError> for IspError {
    fn from(err: AxError) -> Self {
        Self::Hw(err)
    }
}

impl From<IspError> for AxError {
    fn from(err: IspError) -> Self {
        match err {
            IspError::ResourceExhausted(_) | IspError::Busy => AxError::ResourceBusy,
            IspError::MalformedPacket(_) => AxError::InvalidData,
            IspError::CapacityExceeded { .. } | IspError::InvalidArgument(_) => {
                AxError::InvalidInput
            }
            IspError::HardwareFatal(_) | IspError::RecoveryFailed | IspError::Timeout => {
                AxError::Io
            }
            IspError::InvalidState(_) => AxError::BadState,
            IspError::NotFound | IspError::InitFailed => AxError::NotFound,
            IspError::AlreadyInitialized => AxError::AlreadyExists,
            IspError::Hw(err) => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(IspError::Timeout.is_fatal());
        assert!(IspError::RecoveryFailed.is_fatal());
        assert!(IspError::HardwareFatal(ErrorKind::OVERFLOW).is_fatal());
        assert!(!IspError::ResourceExhausted(HwFamily::Ife).is_fatal());
        assert!(!IspError::MalformedPacket("opcode").is_fatal());
    }

    #[test]
    fn test_axerror_bridge() {
        assert_eq!(AxError::from(IspError::ResourceExhausted(HwFamily::Tfe)), AxError::ResourceBusy);
        assert_eq!(AxError::from(IspError::InvalidState(ContextState::Idle)), AxError::BadState);
        assert_eq!(AxError::from(IspError::Hw(AxError::Unsupported)), AxError::Unsupported);
        assert_eq!(IspError::from(AxError::Io), IspError::Hw(AxError::Io));
    }
}
