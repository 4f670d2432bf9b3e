//! Werner-state entanglement model
//!
//! A Werner state is fully described by its fidelity `F`, or equivalently by
//! the Werner parameter `w = (4F - 1) / 3`. Swapping multiplies Werner
//! parameters, storage decays them exponentially, and BBPSSW purification
//! trades two pairs for one of higher fidelity.
//!
//! Each endpoint keeps its own copy of a pair. Copies are identified by
//! [`WernerEpr::name`], which is derived from the pair's *lineage*: the
//! outermost elementary pairs it was built from. Two nodes that merge the
//! same elementary pairs in a different order therefore arrive at the same
//! name.

use std::collections::BTreeSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::identity::{NodeId, PathId, ReservationKey};
use crate::time::SimTime;

/// Name of the pair spanning the given outermost elementary pairs
pub fn lineage_name(left: &str, right: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(left.as_bytes());
    hasher.update(b"|");
    hasher.update(right.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Stable 64-bit digest of a pair name, used to seed per-pair decisions
pub fn name_digest(name: &str) -> u64 {
    let hash = blake3::hash(name.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(prefix)
}

fn werner(fidelity: f64) -> f64 {
    (4.0 * fidelity - 1.0) / 3.0
}

fn fidelity_of(w: f64) -> f64 {
    (3.0 * w + 1.0) / 4.0
}

/// Success probability and resulting fidelity of one BBPSSW round on two
/// Werner pairs
pub fn purification_outcome(f1: f64, f2: f64) -> (f64, f64) {
    let (e1, e2) = (1.0 - f1, 1.0 - f2);
    let p = f1 * f2 + f1 * e2 / 3.0 + f2 * e1 / 3.0 + 5.0 * e1 * e2 / 9.0;
    let fidelity = (f1 * f2 + e1 * e2 / 9.0) / p;
    (p, fidelity)
}

/// One endpoint's copy of a Werner-state entangled pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WernerEpr {
    pub name: String,
    pub fidelity: f64,
    /// Time at which `fidelity` was last brought up to date
    pub fidelity_time: SimTime,
    pub creation_time: SimTime,
    pub decoherence_time: Option<SimTime>,
    /// Primary (left) endpoint
    pub src: NodeId,
    /// Secondary (right) endpoint
    pub dst: NodeId,
    /// Heralding attempts spent on the elementary generation
    pub attempts: u64,
    pub key: Option<ReservationKey>,
    /// Paths this pair may still be used for
    pub tmp_path_ids: Option<BTreeSet<PathId>>,
    pub purif_rounds: u32,
    lineage: (String, String),
}

impl WernerEpr {
    /// A freshly generated elementary pair
    pub fn elementary(
        name: impl Into<String>,
        fidelity: f64,
        src: NodeId,
        dst: NodeId,
        creation_time: SimTime,
    ) -> Self {
        let name = name.into();
        Self {
            lineage: (name.clone(), name.clone()),
            name,
            fidelity,
            fidelity_time: creation_time,
            creation_time,
            decoherence_time: None,
            src,
            dst,
            attempts: 1,
            key: None,
            tmp_path_ids: None,
            purif_rounds: 0,
        }
    }

    pub fn werner(&self) -> f64 {
        werner(self.fidelity)
    }

    /// The endpoint that is not `own`
    pub fn partner_of(&self, own: &NodeId) -> CoreResult<&NodeId> {
        if *own == self.src {
            Ok(&self.dst)
        } else if *own == self.dst {
            Ok(&self.src)
        } else {
            Err(CoreError::NotAnEndpoint { name: self.name.clone(), node: own.clone() })
        }
    }

    pub fn is_primary(&self, own: &NodeId) -> bool {
        self.src == *own
    }

    pub fn is_decohered(&self, now: SimTime) -> bool {
        self.decoherence_time.is_some_and(|t| t <= now)
    }

    /// Apply storage dephasing `w <- w * exp(-rate * dt)` up to `now`
    pub fn decay_to(&mut self, now: SimTime, rate: f64) {
        if now <= self.fidelity_time {
            return;
        }
        if rate > 0.0 {
            let dt = (now - self.fidelity_time).as_secs_f64();
            self.fidelity = fidelity_of(self.werner() * (-rate * dt).exp());
        }
        self.fidelity_time = now;
    }

    /// Entanglement swapping: `self` must end where `next` starts
    ///
    /// The result spans `self.src` to `next.dst`, expires with the earlier of
    /// its inputs and carries no path candidates.
    pub fn swap_with(&self, next: &WernerEpr, now: SimTime) -> WernerEpr {
        let lineage = (self.lineage.0.clone(), next.lineage.1.clone());
        let decoherence_time = match (self.decoherence_time, next.decoherence_time) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        WernerEpr {
            name: lineage_name(&lineage.0, &lineage.1),
            fidelity: fidelity_of(self.werner() * next.werner()),
            fidelity_time: now,
            creation_time: now,
            decoherence_time,
            src: self.src.clone(),
            dst: next.dst.clone(),
            attempts: self.attempts + next.attempts,
            key: None,
            tmp_path_ids: None,
            purif_rounds: 0,
            lineage,
        }
    }

    /// Order two pairs meeting at `own` as (ending at own, starting at own)
    pub fn orient<'a>(
        own: &NodeId,
        a: &'a WernerEpr,
        b: &'a WernerEpr,
    ) -> CoreResult<(&'a WernerEpr, &'a WernerEpr)> {
        if a.dst == *own && b.src == *own {
            Ok((a, b))
        } else if b.dst == *own && a.src == *own {
            Ok((b, a))
        } else {
            let stray = if a.dst != *own && a.src != *own { a } else { b };
            Err(CoreError::NotAnEndpoint { name: stray.name.clone(), node: own.clone() })
        }
    }

    /// One BBPSSW round consuming `sacrificed`; returns whether it succeeded
    ///
    /// On success the fidelity is raised and the round counter incremented.
    pub fn purify<R: Rng + ?Sized>(&mut self, sacrificed: &WernerEpr, rng: &mut R) -> bool {
        let (p, fidelity) = purification_outcome(self.fidelity, sacrificed.fidelity);
        if rng.random::<f64>() < p {
            self.fidelity = fidelity;
            self.purif_rounds += 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn pair(name: &str, f: f64, src: &str, dst: &str) -> WernerEpr {
        WernerEpr::elementary(name, f, src.into(), dst.into(), SimTime::ZERO)
    }

    #[test]
    fn test_swap_multiplies_werner_parameters() {
        let a = pair("a", 0.99, "S", "R");
        let b = pair("b", 0.95, "R", "D");
        let c = a.swap_with(&b, SimTime::from_ps(10));
        let expected = fidelity_of(werner(0.99) * werner(0.95));
        assert!((c.fidelity - expected).abs() < 1e-12);
        assert_eq!(c.src, NodeId::from("S"));
        assert_eq!(c.dst, NodeId::from("D"));
        assert_eq!(c.purif_rounds, 0);
        assert!(c.tmp_path_ids.is_none());
    }

    #[test]
    fn test_swap_keeps_earliest_decoherence() {
        let mut a = pair("a", 1.0, "S", "R");
        let mut b = pair("b", 1.0, "R", "D");
        a.decoherence_time = Some(SimTime::from_ps(50));
        b.decoherence_time = Some(SimTime::from_ps(30));
        assert_eq!(a.swap_with(&b, SimTime::ZERO).decoherence_time, Some(SimTime::from_ps(30)));
    }

    #[test]
    fn test_merge_order_gives_same_name() {
        let a = pair("a", 1.0, "S", "R1");
        let b = pair("b", 1.0, "R1", "R2");
        let c = pair("c", 1.0, "R2", "D");

        let left_first = a.swap_with(&b, SimTime::ZERO).swap_with(&c, SimTime::ZERO);
        let right_first = a.swap_with(&b.swap_with(&c, SimTime::ZERO), SimTime::ZERO);
        assert_eq!(left_first.name, right_first.name);
        assert!((left_first.fidelity - right_first.fidelity).abs() < 1e-12);
        assert_ne!(left_first.name, a.swap_with(&b, SimTime::ZERO).name);
    }

    #[test]
    fn test_names_are_content_hashes() {
        let name = lineage_name("ab", "cd");
        assert_eq!(name, blake3::hash(b"ab|cd").to_hex().to_string());
        assert_ne!(name, lineage_name("cd", "ab"));

        let digest = blake3::hash(name.as_bytes());
        let expected = u64::from_le_bytes(digest.as_bytes()[..8].try_into().unwrap());
        assert_eq!(name_digest(&name), expected);
        assert_ne!(name_digest("p"), name_digest("q"));
    }

    #[test]
    fn test_orient() {
        let a = pair("a", 1.0, "S", "R");
        let b = pair("b", 1.0, "R", "D");
        let own = NodeId::from("R");
        let (prev, next) = WernerEpr::orient(&own, &b, &a).unwrap();
        assert_eq!(prev.name, "a");
        assert_eq!(next.name, "b");
        assert!(WernerEpr::orient(&"S".into(), &a, &b).is_err());
    }

    #[test]
    fn test_decay() {
        let mut a = pair("a", 1.0, "S", "R");
        a.decay_to(SimTime::from_secs_f64(1.0), 1.0);
        let expected = fidelity_of((-1.0f64).exp());
        assert!((a.fidelity - expected).abs() < 1e-12);
        assert_eq!(a.fidelity_time, SimTime::from_secs_f64(1.0));

        // no rewind
        a.decay_to(SimTime::ZERO, 1.0);
        assert!((a.fidelity - expected).abs() < 1e-12);
    }

    #[test]
    fn test_purification_formula() {
        let (p, f) = purification_outcome(1.0, 1.0);
        assert!((p - 1.0).abs() < 1e-12);
        assert!((f - 1.0).abs() < 1e-12);

        let (p, f) = purification_outcome(0.9, 0.9);
        let expected_p = 0.81 + 2.0 * 0.09 / 3.0 + 5.0 * 0.01 / 9.0;
        assert!((p - expected_p).abs() < 1e-12);
        assert!((f - (0.81 + 0.01 / 9.0) / expected_p).abs() < 1e-12);
        assert!(f > 0.9);
    }

    #[test]
    fn test_purify_updates_round_counter() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut kept = pair("k", 1.0, "S", "R");
        let sacrificed = pair("m", 1.0, "S", "R");
        assert!(kept.purify(&sacrificed, &mut rng));
        assert_eq!(kept.purif_rounds, 1);
    }

    #[test]
    fn test_partner_of() {
        let a = pair("a", 1.0, "S", "R");
        assert_eq!(a.partner_of(&"S".into()).unwrap(), &NodeId::from("R"));
        assert_eq!(a.partner_of(&"R".into()).unwrap(), &NodeId::from("S"));
        assert!(a.partner_of(&"X".into()).is_err());
        assert!(a.is_primary(&"S".into()));
    }
}
