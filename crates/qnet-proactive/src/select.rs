//! Tie-breaking strategies
//!
//! When several memory qubits could serve as a swap or purification partner,
//! or several paths could carry a new pair, a selector picks one.

use std::fmt;
use std::rc::Rc;

use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;

use qnet_core::{Addr, WernerEpr};
use qnet_memory::MemoryQubit;
use qnet_routing::FibEntry;

/// Custom qubit selection: index into the candidate list
pub type QubitSelectFn = dyn Fn(&[(&MemoryQubit, &WernerEpr)]) -> usize;

/// Custom path selection: index into the candidate list
pub type PathSelectFn = dyn Fn(&[&FibEntry], &mut StdRng) -> usize;

/// Chooses one qubit among partner candidates
#[derive(Clone, Default)]
pub enum QubitSelector {
    #[default]
    First,
    Random,
    Custom(Rc<QubitSelectFn>),
}

impl fmt::Debug for QubitSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QubitSelector::First => f.write_str("First"),
            QubitSelector::Random => f.write_str("Random"),
            QubitSelector::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl QubitSelector {
    /// Pick a candidate; `First` stops at the first match without
    /// collecting the rest.
    pub fn select<'m, I, R>(&self, mut candidates: I, rng: &mut R) -> Option<Addr>
    where
        I: Iterator<Item = (&'m MemoryQubit, &'m WernerEpr)>,
        R: Rng + ?Sized,
    {
        match self {
            QubitSelector::First => candidates.next().map(|(q, _)| q.addr),
            QubitSelector::Random => {
                let all: Vec<_> = candidates.collect();
                all.choose(rng).map(|(q, _)| q.addr)
            }
            QubitSelector::Custom(f) => {
                let all: Vec<_> = candidates.collect();
                if all.is_empty() {
                    return None;
                }
                all.get(f(&all)).map(|(q, _)| q.addr)
            }
        }
    }
}

/// Chooses one path for a new pair
#[derive(Clone, Default)]
pub enum PathSelector {
    #[default]
    Random,
    /// Weight `1 / (1 + route length)`
    SwapWeighted,
    Custom(Rc<PathSelectFn>),
}

impl fmt::Debug for PathSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSelector::Random => f.write_str("Random"),
            PathSelector::SwapWeighted => f.write_str("SwapWeighted"),
            PathSelector::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl PathSelector {
    pub fn select<'f>(&self, entries: &[&'f FibEntry], rng: &mut StdRng) -> Option<&'f FibEntry> {
        match self {
            PathSelector::Random => entries.choose(rng).copied(),
            PathSelector::SwapWeighted => {
                let weights = entries.iter().map(|e| 1.0 / (1.0 + e.swap.len() as f64));
                let index = WeightedIndex::new(weights).ok()?;
                entries.get(index.sample(rng)).copied()
            }
            PathSelector::Custom(f) => {
                if entries.is_empty() {
                    return None;
                }
                let idx = f(entries, rng);
                entries.get(idx).copied()
            }
        }
    }
}
