//! Forwarder and multiplexing configuration

use serde::{Deserialize, Serialize};

use crate::mux::{BufferSpaceMux, DynamicEprMux, MuxScheme, SharedDecisions, StatisticalMux};
use crate::select::{PathSelector, QubitSelector};

/// Built-in qubit selection strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Lowest memory address
    #[default]
    First,
    /// Uniformly at random
    Random,
}

impl From<Selection> for QubitSelector {
    fn from(selection: Selection) -> Self {
        match selection {
            Selection::First => QubitSelector::First,
            Selection::Random => QubitSelector::Random,
        }
    }
}

/// Built-in path selection strategies for per-pair multiplexing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSelection {
    #[default]
    Random,
    /// Shorter paths are preferred with weight `1 / (1 + route length)`
    SwapWeighted,
}

impl From<PathSelection> for PathSelector {
    fn from(selection: PathSelection) -> Self {
        match selection {
            PathSelection::Random => PathSelector::Random,
            PathSelection::SwapWeighted => PathSelector::SwapWeighted,
        }
    }
}

/// Forwarder behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Probability that an entanglement swap succeeds
    pub ps: f64,
    /// How a swap partner is chosen among eligible qubits
    pub swap_selection: Selection,
    /// How a sacrificial pair is chosen among purification candidates
    pub purif_selection: Selection,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self { ps: 1.0, swap_selection: Selection::First, purif_selection: Selection::First }
    }
}

impl ForwarderConfig {
    /// Swaps succeed with probability `ps`
    pub fn with_ps(ps: f64) -> Self {
        Self { ps, ..Self::default() }
    }

    /// Random swap and purification partners
    pub fn randomized() -> Self {
        Self { swap_selection: Selection::Random, purif_selection: Selection::Random, ..Self::default() }
    }
}

/// Which multiplexing scheme every node runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum MuxKind {
    /// Static memory split between paths
    #[default]
    BufferSpace,
    /// Pairs carry candidate path sets narrowed at each swap
    Statistical {
        /// Make swap-time path choices instantly visible to all nodes
        #[serde(default)]
        coordinated_decisions: bool,
    },
    /// Each pair picks one path when it is created
    DynamicEpr {
        #[serde(default)]
        path_selection: PathSelection,
    },
}

impl MuxKind {
    /// Instantiate the scheme for one node
    ///
    /// `decisions` is shared by every node of a network and only used by
    /// coordinated statistical multiplexing.
    pub fn build(&self, decisions: SharedDecisions) -> Box<dyn MuxScheme> {
        match *self {
            MuxKind::BufferSpace => Box::new(BufferSpaceMux::new()),
            MuxKind::Statistical { coordinated_decisions } => {
                if coordinated_decisions {
                    Box::new(StatisticalMux::coordinated(decisions))
                } else {
                    Box::new(StatisticalMux::new())
                }
            }
            MuxKind::DynamicEpr { path_selection } => Box::new(DynamicEprMux::new(path_selection.into())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MuxKind::BufferSpace => "buffer-space",
            MuxKind::Statistical { .. } => "statistical",
            MuxKind::DynamicEpr { .. } => "dynamic-epr",
        }
    }
}
