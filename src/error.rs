//! This module implements the error type used throughout this crate.

use nix::unistd::Pid;
use std::collections::TryReserveError;
use thiserror::Error;

/// The error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Memory for a tracee record or one of its paths could not be allocated.
    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(#[from] TryReserveError),

    /// The caller broke a precondition of the tracee bookkeeping.
    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] Violation),
}

impl Error {
    /// Returns true if the tracking state can no longer be trusted and the sandbox session has to
    /// be aborted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ProtocolViolation(_))
    }
}

/// The precondition that was broken.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum Violation {
    /// The process is not registered as a tracee.
    #[error("tracee {0} is not registered")]
    UnknownTracee(Pid),

    /// The tracee already inherited its filesystem information.
    #[error("tracee {0} is already initialized")]
    AlreadyInitialized(Pid),

    /// The tracee has not inherited its filesystem information yet.
    #[error("tracee {0} is not initialized")]
    NotInitialized(Pid),

    /// The parent has no executable path yet.
    #[error("parent tracee {0} is not initialized")]
    ParentNotInitialized(Pid),

    /// A tracee was named as its own parent.
    #[error("tracee {0} cannot inherit from itself")]
    SelfParent(Pid),
}
