//! Memory slots and their state machine

use derive_more::Display;

use qnet_core::{Addr, ChannelId, PathDirection, PathId, ReservationKey};

use crate::error::{MemoryError, MemoryResult};

/// Lifecycle state of a memory slot
///
/// ```text
/// RAW -> ACTIVE -> RESERVED -> ENTANGLED0 -> PURIF <-> PENDING
///                                  ^            |
///                                  |            v
///                                  +------- ELIGIBLE
/// any -> RELEASE -> RAW
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum QubitState {
    /// Free and idle
    #[display("RAW")]
    Raw,
    /// Reservation requested by this node
    #[display("ACTIVE")]
    Active,
    /// Reservation confirmed by both nodes
    #[display("RESERVED")]
    Reserved,
    /// Holds a half-pair not yet admitted by the forwarder
    #[display("ENTANGLED0")]
    Entangled0,
    /// Waiting for purification
    #[display("PURIF")]
    Purif,
    /// Purification round in flight
    #[display("PENDING")]
    Pending,
    /// Ready to be swapped or consumed
    #[display("ELIGIBLE")]
    Eligible,
    /// Freed; the link layer will return it to RAW
    #[display("RELEASE")]
    Release,
}

impl QubitState {
    pub fn can_transition_to(self, next: QubitState) -> bool {
        use QubitState::*;
        matches!(
            (self, next),
            (_, Release)
                | (Raw, Active)
                | (Active, Reserved)
                | (Reserved, Entangled0)
                | (Entangled0 | Purif | Eligible, Entangled0)
                | (Entangled0 | Eligible, Purif)
                | (Purif, Pending)
                | (Pending, Purif)
                | (Purif, Eligible)
                | (Release, Raw)
        )
    }
}

/// Metadata of one memory slot
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryQubit {
    pub addr: Addr,
    state: QubitState,
    /// Quantum channel this slot serves
    pub qchannel: Option<ChannelId>,
    /// Path this slot is allocated to (static multiplexing only)
    pub path_id: Option<PathId>,
    pub path_direction: Option<PathDirection>,
    /// Key of the reservation currently using this slot
    pub active: Option<ReservationKey>,
}

impl MemoryQubit {
    pub fn new(addr: Addr) -> Self {
        Self {
            addr,
            state: QubitState::Raw,
            qchannel: None,
            path_id: None,
            path_direction: None,
            active: None,
        }
    }

    pub fn state(&self) -> QubitState {
        self.state
    }

    /// Move to `next`, rejecting transitions outside the state machine
    pub fn set_state(&mut self, next: QubitState) -> MemoryResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(MemoryError::IllegalTransition { addr: self.addr, from: self.state, to: next });
        }
        self.state = next;
        Ok(())
    }

    /// Drop back to RAW with no reservation
    pub(crate) fn reset(&mut self) {
        self.state = QubitState::Raw;
        self.active = None;
    }
}
