//! Per-dispatch handler context
//!
//! Handlers never own the clock or the event queue. They receive a
//! [`NodeContext`] describing "now" for the node being dispatched and push
//! follow-up events into its outbox, which the simulator drains once the
//! handler returns.

use rand::rngs::StdRng;
use tracing::trace;

use crate::channel::ChannelTable;
use crate::error::CoreResult;
use crate::event::{Event, EventKind, Scheduled};
use crate::identity::NodeId;
use crate::message::Message;
use crate::time::{SimTime, TimingMode, TimingPhase};

/// Everything a node handler may read or emit during one dispatch
pub struct NodeContext<'a> {
    pub now: SimTime,
    pub own: NodeId,
    pub channels: &'a ChannelTable,
    pub timing: TimingMode,
    pub rng: &'a mut StdRng,
    outbox: Vec<Scheduled>,
}

impl<'a> NodeContext<'a> {
    pub fn new(
        now: SimTime,
        own: NodeId,
        channels: &'a ChannelTable,
        timing: TimingMode,
        rng: &'a mut StdRng,
    ) -> Self {
        Self { now, own, channels, timing, rng, outbox: Vec::new() }
    }

    /// Schedule an event for any node at an absolute time
    pub fn schedule(&mut self, at: SimTime, target: NodeId, kind: EventKind) {
        trace!(node = %self.own, %at, %target, event = kind.name(), "schedule");
        self.outbox.push(Scheduled { at, event: Event::new(target, kind) });
    }

    /// Schedule an event for this node after `delay`
    pub fn schedule_local(&mut self, delay: SimTime, kind: EventKind) {
        let at = self.now + delay;
        let own = self.own.clone();
        self.schedule(at, own, kind);
    }

    /// Send a classical message to a neighbor over their classical channel
    pub fn send(&mut self, to: &NodeId, msg: Message) -> CoreResult<()> {
        let delay = self.channels.classic_between(&self.own, to)?.one_way_delay();
        let from = self.own.clone();
        self.schedule(self.now + delay, to.clone(), EventKind::RecvClassic { from, msg });
        Ok(())
    }

    pub fn phase(&self) -> TimingPhase {
        self.timing.phase_at(self.now)
    }

    pub fn outbox(&self) -> &[Scheduled] {
        &self.outbox
    }

    pub fn take_outbox(&mut self) -> Vec<Scheduled> {
        std::mem::take(&mut self.outbox)
    }
}
