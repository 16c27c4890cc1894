//! Error taxonomy for the placement core.

use crate::data::Placement;

/// Errors surfaced by placement phases and the top-level orchestrator.
///
/// [`ClusterCapacity`](Self::ClusterCapacity) is the only locally-recoverable
/// variant: the orchestrator retries global placement with an adjusted
/// cluster count before giving up. Everything else propagates to the caller.
#[derive(Debug, thiserror::Error)]
pub enum PlaceError {
    /// The netlist, embedding table, or options are malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The device has fewer legal cells than blocks of some type.
    #[error("device capacity exceeded: {0}")]
    DeviceCapacity(String),

    /// Global placement found no legal anchor assignment for this cluster count.
    #[error("no legal anchor assignment for {num_clusters} clusters")]
    ClusterCapacity {
        /// The cluster count that failed.
        num_clusters: usize,
    },

    /// Routability hints were requested but none are available.
    #[error("no routing hint available for routability-aware placement")]
    NoRouteHint,

    /// The operation was cancelled through its [`CancelToken`](tessera_common::CancelToken).
    #[error("placement cancelled")]
    Cancelled,

    /// An SA phase exceeded its wall-clock budget.
    ///
    /// Carries the best legal placement seen before expiry so the caller can
    /// inspect or keep it.
    #[error("placement phase exceeded its time budget")]
    TimedOut {
        /// Best legal placement found before the budget expired.
        partial: Box<Placement>,
    },

    /// An internal invariant was violated; always a bug in the placer.
    #[error("internal placer error: {0}")]
    Internal(String),
}

impl PlaceError {
    /// Maps the error to the process exit code contract:
    /// `1` invalid input, `2` infeasible device, `3` internal/aborted.
    pub fn exit_code(&self) -> i32 {
        match self {
            PlaceError::InvalidInput(_) => 1,
            PlaceError::DeviceCapacity(_)
            | PlaceError::ClusterCapacity { .. }
            | PlaceError::NoRouteHint => 2,
            PlaceError::Cancelled | PlaceError::TimedOut { .. } | PlaceError::Internal(_) => 3,
        }
    }
}
