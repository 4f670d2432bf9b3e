//! A quantum network driven by the discrete-event queue
//!
//! [`QuantumNetwork`] owns every node, the channel table, the routing
//! controller and the single seeded random generator. [`QuantumNetwork::run`]
//! delivers events in time order, broadcasting timing phase boundaries to
//! every node before any event scheduled at the same instant.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use qnet_core::{ChannelTable, Event, EventKind, NodeContext, NodeId, PathId, PathInstructions, SimTime, TimingMode, TimingPhase};
use qnet_link::{LinkConfig, LinkStats};
use qnet_logging::NodeContextGuard;
use qnet_proactive::{ForwarderConfig, ForwarderStats, MuxKind, ProactiveForwarder, SharedDecisions};

use crate::controller::{RequestConfig, RoutingController};
use crate::error::{SimError, SimResult};
use crate::node::QNode;
use crate::queue::Simulator;
use crate::topology::Topology;

/// Network-wide simulation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Seed of the only random generator of a run
    pub seed: u64,
    pub timing: TimingMode,
    /// Simulated duration in seconds
    pub end_time_secs: f64,
    pub link: LinkConfig,
    pub forwarder: ForwarderConfig,
    pub mux: MuxKind,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            timing: TimingMode::Async,
            end_time_secs: 1.0,
            link: LinkConfig::default(),
            forwarder: ForwarderConfig::default(),
            mux: MuxKind::default(),
        }
    }
}

impl NetworkConfig {
    /// Lossless links and perfect pairs with the given multiplexing
    pub fn ideal(mux: MuxKind) -> Self {
        Self { link: LinkConfig::ideal(), mux, ..Self::default() }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_end_time(mut self, secs: f64) -> Self {
        self.end_time_secs = secs;
        self
    }

    pub fn with_timing(mut self, timing: TimingMode) -> Self {
        self.timing = timing;
        self
    }
}

/// Outcome of one path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathReport {
    pub path_id: PathId,
    pub route: Vec<NodeId>,
    /// End-to-end pairs consumed at the source with the destination
    pub e2e_pairs: u64,
    /// End-to-end pairs per simulated second
    pub throughput: f64,
    /// Mean fidelity of pairs consumed at the source
    pub mean_fidelity: f64,
}

/// Counters of one node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
    pub forwarder: ForwarderStats,
    pub link: LinkStats,
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkReport {
    pub run_id: Uuid,
    pub seed: u64,
    pub mux: String,
    pub duration_secs: f64,
    pub events: u64,
    pub paths: Vec<PathReport>,
    pub nodes: BTreeMap<NodeId, NodeReport>,
    /// Forwarder counters summed over all nodes
    pub totals: ForwarderStats,
}

impl NetworkReport {
    pub fn path(&self, path_id: PathId) -> Option<&PathReport> {
        self.paths.iter().find(|p| p.path_id == path_id)
    }
}

/// All nodes of a simulated network and the clock that drives them
pub struct QuantumNetwork {
    config: NetworkConfig,
    run_id: Uuid,
    channels: ChannelTable,
    nodes: BTreeMap<NodeId, QNode>,
    controller: RoutingController,
    /// Board shared by coordinated statistical schemes
    decisions: SharedDecisions,
    queue: Simulator<Event>,
    rng: StdRng,
    next_phase: Option<(SimTime, TimingPhase)>,
    events: u64,
}

impl QuantumNetwork {
    pub fn new(config: NetworkConfig, topology: Topology) -> SimResult<Self> {
        if !(config.end_time_secs.is_finite() && config.end_time_secs > 0.0) {
            return Err(SimError::InvalidScenario(format!("end time must be positive, got {}", config.end_time_secs)));
        }
        config.timing.validated().map_err(|err| SimError::InvalidScenario(err.to_string()))?;
        let Topology { nodes: ids, channels, mut memories } = topology;
        let controller = RoutingController::new(&ids, &channels);
        let decisions = SharedDecisions::default();

        let mut nodes = BTreeMap::new();
        for id in ids {
            let memory = memories.remove(&id).ok_or_else(|| SimError::UnknownNode(id.clone()))?;
            let forwarder = ProactiveForwarder::new(config.forwarder.clone(), config.mux.build(decisions.clone()));
            nodes.insert(id.clone(), QNode::new(id, memory, config.link.clone(), forwarder));
        }

        let run_id = Uuid::new_v4();
        info!(%run_id, seed = config.seed, nodes = nodes.len(), mux = config.mux.name(), "network built");
        Ok(Self {
            run_id,
            rng: StdRng::seed_from_u64(config.seed),
            queue: Simulator::new(SimTime::from_secs_f64(config.end_time_secs)),
            next_phase: config.timing.next_boundary(SimTime::ZERO),
            config,
            channels,
            nodes,
            controller,
            decisions,
            events: 0,
        })
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn now(&self) -> SimTime {
        self.queue.now()
    }

    pub fn node(&self, id: &NodeId) -> Option<&QNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &QNode> {
        self.nodes.values()
    }

    pub fn decisions(&self) -> &SharedDecisions {
        &self.decisions
    }

    pub fn controller(&self) -> &RoutingController {
        &self.controller
    }

    /// Route a request and install the path on every node of its route now
    pub fn request(&mut self, request: &RequestConfig) -> SimResult<PathId> {
        let (path_id, instructions) = self.controller.compute(request)?;
        self.install_path(path_id, instructions, self.queue.now());
        Ok(path_id)
    }

    /// Schedule installation of `instructions` on every node of its route
    pub fn install_path(&mut self, path_id: PathId, instructions: PathInstructions, at: SimTime) {
        for node in instructions.route.clone() {
            let kind = EventKind::InstallPath { path_id, instructions: instructions.clone() };
            self.queue.push(at, Event::new(node, kind));
        }
    }

    /// Schedule removal of a path from every node of its route
    pub fn uninstall_path(&mut self, path_id: PathId, at: SimTime) -> SimResult<()> {
        let instructions = self.controller.remove(path_id)?;
        for node in instructions.route {
            self.queue.push(at, Event::new(node, EventKind::UninstallPath { path_id }));
        }
        Ok(())
    }

    /// Deliver events until the queue is empty or the end time is reached
    #[instrument(level = "info", skip_all, fields(run_id = %self.run_id))]
    pub fn run(&mut self) -> SimResult<NetworkReport> {
        loop {
            let next_event = self.queue.peek_time();
            let phase = self.next_phase.filter(|(at, _)| *at <= self.queue.end());
            match (phase, next_event) {
                (Some((at, phase)), next) if next.is_none_or(|t| at <= t) => {
                    self.queue.advance_to(at);
                    debug!(%at, %phase, "phase boundary");
                    let ids: Vec<NodeId> = self.nodes.keys().cloned().collect();
                    for id in ids {
                        self.dispatch(at, Event::new(id, EventKind::Phase(phase)))?;
                    }
                    self.next_phase = self.config.timing.next_boundary(at);
                }
                (_, Some(_)) => {
                    let Some((at, event)) = self.queue.pop() else { break };
                    self.dispatch(at, event)?;
                }
                _ => break,
            }
        }
        let report = self.report();
        info!(
            events = report.events,
            consumed = report.totals.n_consumed,
            swapped = report.totals.n_swapped,
            "run finished"
        );
        Ok(report)
    }

    fn dispatch(&mut self, at: SimTime, event: Event) -> SimResult<()> {
        let Event { target, kind } = event;
        let node = self.nodes.get_mut(&target).ok_or_else(|| SimError::UnknownNode(target.clone()))?;
        let _guard = NodeContextGuard::new(&target, at, self.run_id);
        let mut ctx = NodeContext::new(at, target.clone(), &self.channels, self.config.timing, &mut self.rng);
        node.handle(kind, &mut ctx).map_err(|source| SimError::Node { node: target, source: Box::new(source) })?;
        for scheduled in ctx.take_outbox() {
            self.queue.push(scheduled.at, scheduled.event);
        }
        self.events += 1;
        Ok(())
    }

    /// Counters gathered from every node
    pub fn report(&self) -> NetworkReport {
        let duration_secs = self.config.end_time_secs;
        let mut totals = ForwarderStats::default();
        let nodes: BTreeMap<NodeId, NodeReport> = self
            .nodes
            .iter()
            .map(|(id, node)| {
                totals.merge(node.forwarder().stats());
                (id.clone(), NodeReport { forwarder: node.forwarder().stats().clone(), link: node.link().stats() })
            })
            .collect();

        let paths = self
            .controller
            .paths()
            .filter_map(|(path_id, instructions)| {
                let (src, dst) = (instructions.src()?, instructions.dst()?);
                let stats = &nodes.get(src)?.forwarder;
                let e2e_pairs = stats.consumed_with.get(dst).copied().unwrap_or(0);
                Some(PathReport {
                    path_id,
                    route: instructions.route.clone(),
                    e2e_pairs,
                    throughput: e2e_pairs as f64 / duration_secs,
                    mean_fidelity: stats.mean_fidelity,
                })
            })
            .collect();

        NetworkReport {
            run_id: self.run_id,
            seed: self.config.seed,
            mux: self.config.mux.name().to_string(),
            duration_secs,
            events: self.events,
            paths,
            nodes,
            totals,
        }
    }
}
