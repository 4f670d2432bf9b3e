//! Quantum and classical channels
//!
//! A [`QuantumChannel`] carries photons between two nodes and knows, through
//! its [`LinkArch`], how likely one heralded generation attempt is to succeed
//! and how long the heralding takes. A [`ClassicChannel`] only contributes a
//! one-way delay for control messages.

use std::collections::BTreeMap;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::identity::{ChannelId, NodeId};
use crate::time::SimTime;

/// Light speed in fiber, km/s
pub const FIBER_SPEED_KM_S: f64 = 2e5;

/// Fiber transmittance over `length_km` with attenuation `alpha_db_per_km`
pub fn fiber_transmittance(length_km: f64, alpha_db_per_km: f64) -> f64 {
    10f64.powf(-alpha_db_per_km * length_km / 10.0)
}

/// How a channel's one-way propagation delay is computed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DelayModel {
    /// Fixed delay regardless of length
    Constant { delay: SimTime },
    /// Length divided by light speed in fiber
    #[default]
    Fiber,
}

impl DelayModel {
    pub fn delay(&self, length_km: f64) -> SimTime {
        match self {
            DelayModel::Constant { delay } => *delay,
            DelayModel::Fiber => SimTime::from_secs_f64(length_km / FIBER_SPEED_KM_S),
        }
    }
}

/// Timing of one successful heralded attempt, relative to the attempt start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkDelays {
    /// When the pair comes into existence
    pub creation: SimTime,
    /// Additional delay until the primary node learns of the pair
    pub notify_a: SimTime,
    /// Additional delay until the secondary node learns of the pair
    pub notify_b: SimTime,
}

/// Elementary link heralding architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum LinkArch {
    /// Detection in the midpoint, Barrett-Kok double click protocol
    #[default]
    #[display("DIM-BK")]
    DimBk,
    /// Single rail, photon emitted at the primary and heralded at the secondary
    #[display("SR")]
    Sr,
    /// Entangled photon-pair source in the midpoint
    #[display("SIM")]
    Sim,
}

impl LinkArch {
    /// Success probability of a single attempt
    pub fn success_prob(&self, length_km: f64, alpha_db_per_km: f64, eta_s: f64, eta_d: f64) -> f64 {
        let eta_l = fiber_transmittance(length_km, alpha_db_per_km);
        match self {
            LinkArch::DimBk => 0.5 * (eta_s * eta_d).powi(2) * eta_l,
            LinkArch::Sr => eta_s * eta_d * eta_l,
            LinkArch::Sim => eta_s * eta_d.powi(2) * eta_l,
        }
    }

    /// Delays of the `k`-th attempt (1-based) given the source reset time,
    /// the one-way fiber delay `tau_l` and the local operation delay `tau_0`
    pub fn delays(&self, k: u64, reset_time: SimTime, tau_l: SimTime, tau_0: SimTime) -> LinkDelays {
        let previous = k.saturating_sub(1);
        match self {
            LinkArch::DimBk => {
                let period = reset_time.max((tau_0 + tau_l) * 2);
                LinkDelays {
                    creation: period * previous + tau_0 * 2 + tau_l + tau_l.half(),
                    notify_a: tau_l.half(),
                    notify_b: tau_l.half(),
                }
            }
            LinkArch::Sr => {
                let period = reset_time.max(tau_0 + tau_l);
                LinkDelays {
                    creation: period * previous + tau_0 + tau_l,
                    notify_a: tau_l,
                    notify_b: tau_0,
                }
            }
            LinkArch::Sim => {
                let period = reset_time.max(tau_l);
                LinkDelays {
                    creation: period * previous + tau_l.half(),
                    notify_a: tau_l.half(),
                    notify_b: tau_l.half(),
                }
            }
        }
    }
}

/// A quantum channel between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantumChannel {
    pub name: ChannelId,
    pub a: NodeId,
    pub b: NodeId,
    pub length_km: f64,
    #[serde(default)]
    pub link_arch: LinkArch,
    #[serde(default)]
    pub delay: DelayModel,
}

impl QuantumChannel {
    pub fn new(a: NodeId, b: NodeId, length_km: f64) -> Self {
        Self {
            name: ChannelId::between(&a, &b),
            a,
            b,
            length_km,
            link_arch: LinkArch::default(),
            delay: DelayModel::default(),
        }
    }

    pub fn with_link_arch(mut self, link_arch: LinkArch) -> Self {
        self.link_arch = link_arch;
        self
    }

    pub fn with_delay(mut self, delay: DelayModel) -> Self {
        self.delay = delay;
        self
    }

    /// One-way photon propagation delay
    pub fn tau_l(&self) -> SimTime {
        self.delay.delay(self.length_km)
    }

    /// The endpoint opposite to `node`
    pub fn peer_of(&self, node: &NodeId) -> Option<&NodeId> {
        if *node == self.a {
            Some(&self.b)
        } else if *node == self.b {
            Some(&self.a)
        } else {
            None
        }
    }
}

/// A classical channel between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassicChannel {
    pub a: NodeId,
    pub b: NodeId,
    pub length_km: f64,
    #[serde(default)]
    pub delay: DelayModel,
}

impl ClassicChannel {
    pub fn new(a: NodeId, b: NodeId, length_km: f64) -> Self {
        Self { a, b, length_km, delay: DelayModel::default() }
    }

    pub fn one_way_delay(&self) -> SimTime {
        self.delay.delay(self.length_km)
    }

    /// The endpoint opposite to `node`
    pub fn find_peer(&self, node: &NodeId) -> Option<&NodeId> {
        if *node == self.a {
            Some(&self.b)
        } else if *node == self.b {
            Some(&self.a)
        } else {
            None
        }
    }
}

fn pair_key(a: &NodeId, b: &NodeId) -> (NodeId, NodeId) {
    if a <= b { (a.clone(), b.clone()) } else { (b.clone(), a.clone()) }
}

/// All channels of a network, indexed by name and by endpoint pair
#[derive(Debug, Clone, Default)]
pub struct ChannelTable {
    quantum: BTreeMap<ChannelId, QuantumChannel>,
    quantum_by_pair: BTreeMap<(NodeId, NodeId), ChannelId>,
    classic: BTreeMap<(NodeId, NodeId), ClassicChannel>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_quantum(&mut self, channel: QuantumChannel) -> CoreResult<()> {
        let key = pair_key(&channel.a, &channel.b);
        if self.quantum.contains_key(&channel.name) || self.quantum_by_pair.contains_key(&key) {
            return Err(CoreError::DuplicateChannel(channel.name));
        }
        self.quantum_by_pair.insert(key, channel.name.clone());
        self.quantum.insert(channel.name.clone(), channel);
        Ok(())
    }

    /// Add a classical channel, replacing any existing one between the same nodes
    pub fn add_classic(&mut self, channel: ClassicChannel) {
        self.classic.insert(pair_key(&channel.a, &channel.b), channel);
    }

    pub fn quantum(&self, name: &ChannelId) -> CoreResult<&QuantumChannel> {
        self.quantum.get(name).ok_or_else(|| CoreError::UnknownChannel(name.clone()))
    }

    pub fn quantum_between(&self, a: &NodeId, b: &NodeId) -> CoreResult<&QuantumChannel> {
        self.quantum_by_pair
            .get(&pair_key(a, b))
            .and_then(|name| self.quantum.get(name))
            .ok_or_else(|| CoreError::NoQuantumChannel { a: a.clone(), b: b.clone() })
    }

    pub fn classic_between(&self, a: &NodeId, b: &NodeId) -> CoreResult<&ClassicChannel> {
        self.classic
            .get(&pair_key(a, b))
            .ok_or_else(|| CoreError::NoClassicChannel { a: a.clone(), b: b.clone() })
    }

    pub fn quantum_channels(&self) -> impl Iterator<Item = &QuantumChannel> {
        self.quantum.values()
    }

    /// Quantum channels attached to `node`
    pub fn channels_of<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a QuantumChannel> + 'a {
        self.quantum.values().filter(move |ch| ch.a == *node || ch.b == *node)
    }
}
