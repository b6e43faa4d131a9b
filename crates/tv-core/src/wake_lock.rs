//! Screen wake-lock seam.

use thiserror::Error;

/// Correlates a request with its eventual grant or denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WakeLockTicket(pub u64);

/// A granted wake lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WakeLockError {
    /// Permission or policy refusal (`NotAllowedError`).
    #[error("wake lock not allowed: {0}")]
    NotAllowed(String),
    #[error("wake lock API not supported")]
    NotSupported,
    #[error("wake lock request failed: {0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WakeLockEvent {
    Granted {
        ticket: WakeLockTicket,
        session: SessionId,
    },
    Denied {
        ticket: WakeLockTicket,
        error: WakeLockError,
    },
    /// The session ended, either through `release` or because the
    /// platform revoked it.
    Released { session: SessionId },
}

pub trait WakeLockPlatform {
    /// Start a request.  `Err` means it failed synchronously; otherwise the
    /// outcome arrives as a [`WakeLockEvent`] carrying `ticket`.
    fn request(&mut self, ticket: WakeLockTicket) -> Result<(), WakeLockError>;
    fn release(&mut self, session: SessionId);
    fn is_released(&self, session: SessionId) -> bool;
}
