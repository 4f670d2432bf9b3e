//! Bookkeeping for swaps that overlap with a neighbor's swap
//!
//! When two adjacent nodes swap the pair they share at about the same time,
//! each receives an update about a pair it has already consumed. The node
//! then merges the update with the input it swapped on the other side and
//! forwards the result to the far endpoint of that side, which still holds
//! the output this node sent earlier.
//!
//! ```text
//!   A ----- B ----- C ----- D
//!      AB      BC      CD
//!   B swaps AB+BC -> AC      C swaps BC+CD -> BD
//!   B gets (BC -> BD): AB+BD = AD, sent to A replacing AC
//!   C gets (BC -> AC): AC+CD = AD, sent to D replacing BD
//! ```
//!
//! Pair names follow their lineage, so both ends arrive at the same name.
//!
//! Nothing acknowledges an update, so a record is held for as long as an
//! overlapping update could still be in flight: the classical round trips
//! to every endpoint it names, counted from the swap or the latest merge.
//! After that, or once its output decoheres, it is pruned.

use std::collections::BTreeMap;

use qnet_core::{NodeId, PathId, SimTime, WernerEpr};

/// Which input of a swap a name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapSide {
    /// The pair that ended at the swapping node
    Left,
    /// The pair that started at the swapping node
    Right,
}

impl SwapSide {
    pub fn other(self) -> Self {
        match self {
            SwapSide::Left => SwapSide::Right,
            SwapSide::Right => SwapSide::Left,
        }
    }
}

#[derive(Debug, Clone)]
struct SideState {
    orig: WernerEpr,
    far: NodeId,
    /// Name of the pair the far endpoint was last told to hold
    last_sent: String,
}

/// One successful swap that may still receive overlapping updates
#[derive(Debug, Clone)]
pub struct ParallelSwap {
    pub path_id: PathId,
    left: SideState,
    right: SideState,
    /// Latest pair produced for this swap
    pub output: WernerEpr,
    /// No overlapping update can arrive after this time
    pub hold_until: SimTime,
}

impl ParallelSwap {
    fn side(&self, side: SwapSide) -> &SideState {
        match side {
            SwapSide::Left => &self.left,
            SwapSide::Right => &self.right,
        }
    }

    fn side_mut(&mut self, side: SwapSide) -> &mut SideState {
        match side {
            SwapSide::Left => &mut self.left,
            SwapSide::Right => &mut self.right,
        }
    }

    /// The input pair swapped on `side`
    pub fn orig(&self, side: SwapSide) -> &WernerEpr {
        &self.side(side).orig
    }

    /// Far endpoint of the input on `side`
    pub fn far(&self, side: SwapSide) -> &NodeId {
        &self.side(side).far
    }

    pub fn last_sent(&self, side: SwapSide) -> &str {
        &self.side(side).last_sent
    }
}

/// Swaps made by one node, indexed by every pair name they answer to
#[derive(Debug, Default)]
pub struct ParallelSwapTable {
    records: BTreeMap<u64, ParallelSwap>,
    keys: BTreeMap<String, (u64, SwapSide)>,
    next_id: u64,
}

impl ParallelSwapTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a swap of `prev` (ending here) and `next` (starting here)
    pub fn record(
        &mut self,
        path_id: PathId,
        prev: WernerEpr,
        next: WernerEpr,
        output: WernerEpr,
        hold_until: SimTime,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.keys.insert(prev.name.clone(), (id, SwapSide::Left));
        self.keys.insert(next.name.clone(), (id, SwapSide::Right));
        let left = SideState { far: prev.src.clone(), last_sent: output.name.clone(), orig: prev };
        let right = SideState { far: next.dst.clone(), last_sent: output.name.clone(), orig: next };
        self.records.insert(id, ParallelSwap { path_id, left, right, output, hold_until });
        id
    }

    /// Swap and side a pair name belongs to
    pub fn lookup(&self, name: &str) -> Option<(u64, SwapSide)> {
        self.keys.get(name).copied()
    }

    pub fn get(&self, id: u64) -> Option<&ParallelSwap> {
        self.records.get(&id)
    }

    /// Let `name` refer to `side` of swap `id` from now on
    pub fn alias(&mut self, name: &str, id: u64, side: SwapSide) {
        if self.records.contains_key(&id) {
            self.keys.insert(name.to_string(), (id, side));
        }
    }

    /// Record that the far endpoint of `side` now holds `merged`
    pub fn forwarded(&mut self, id: u64, side: SwapSide, merged: WernerEpr, hold_until: SimTime) {
        if let Some(record) = self.records.get_mut(&id) {
            record.side_mut(side).last_sent = merged.name.clone();
            record.output = merged;
            record.hold_until = record.hold_until.max(hold_until);
        }
    }

    pub fn remove(&mut self, id: u64) -> Option<ParallelSwap> {
        let record = self.records.remove(&id)?;
        self.keys.retain(|_, (rid, _)| *rid != id);
        Some(record)
    }

    /// Drop swaps past their hold time or whose latest output has
    /// decohered; returns how many
    pub fn prune_expired(&mut self, now: SimTime) -> usize {
        let expired: Vec<u64> = self
            .records
            .iter()
            .filter(|(_, r)| now >= r.hold_until || r.output.is_decohered(now))
            .map(|(id, _)| *id)
            .collect();
        for &id in &expired {
            self.remove(id);
        }
        expired.len()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.keys.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(name: &str, src: &str, dst: &str) -> WernerEpr {
        WernerEpr::elementary(name, 0.9, src.into(), dst.into(), SimTime::ZERO)
    }

    fn swapped_at_b() -> (ParallelSwapTable, u64, WernerEpr) {
        let (ab, bc) = (pair("ab", "A", "B"), pair("bc", "B", "C"));
        let ac = ab.swap_with(&bc, SimTime::ZERO);
        let mut table = ParallelSwapTable::new();
        let id = table.record(0, ab, bc, ac.clone(), SimTime::from_ps(100));
        (table, id, ac)
    }

    #[test]
    fn test_record_indexes_both_inputs() {
        let (table, id, ac) = swapped_at_b();
        assert_eq!(table.lookup("ab"), Some((id, SwapSide::Left)));
        assert_eq!(table.lookup("bc"), Some((id, SwapSide::Right)));
        assert_eq!(table.lookup(&ac.name), None);

        let record = table.get(id).unwrap();
        assert_eq!(record.far(SwapSide::Left), &NodeId::from("A"));
        assert_eq!(record.far(SwapSide::Right), &NodeId::from("C"));
        assert_eq!(record.last_sent(SwapSide::Left), ac.name);
        assert_eq!(record.orig(SwapSide::Left).name, "ab");
    }

    #[test]
    fn test_merge_forwarding_converges() {
        // C swapped bc+cd concurrently and told B the pair is now bd
        let (mut table, id, ac) = swapped_at_b();
        let (bc, cd) = (pair("bc", "B", "C"), pair("cd", "C", "D"));
        let bd = bc.swap_with(&cd, SimTime::ZERO);

        let (_, side) = table.lookup("bc").unwrap();
        let other = side.other();
        let record = table.get(id).unwrap();
        let (prev, next) = WernerEpr::orient(&NodeId::from("B"), record.orig(other), &bd).unwrap();
        let merged = prev.swap_with(next, SimTime::ZERO);
        assert_eq!(record.last_sent(other), ac.name);
        table.alias(&bd.name, id, side);
        table.forwarded(id, other, merged.clone(), SimTime::from_ps(300));

        // what C computes on its side from B's update
        let ad_at_c = ac.swap_with(&cd, SimTime::ZERO);
        assert_eq!(merged.name, ad_at_c.name);
        assert_eq!(table.get(id).unwrap().last_sent(SwapSide::Left), merged.name);
        assert_eq!(table.lookup(&bd.name), Some((id, SwapSide::Right)));
        assert_eq!(table.get(id).unwrap().hold_until, SimTime::from_ps(300));

        // a merge only ever extends the hold
        table.forwarded(id, side, merged, SimTime::from_ps(200));
        assert_eq!(table.get(id).unwrap().hold_until, SimTime::from_ps(300));
    }

    #[test]
    fn test_remove_and_prune() {
        let (mut table, id, _) = swapped_at_b();
        assert_eq!(table.prune_expired(SimTime::from_ps(1)), 0);

        let mut ab = pair("x", "A", "B");
        ab.decoherence_time = Some(SimTime::from_ps(5));
        let bc = pair("y", "B", "C");
        let out = ab.swap_with(&bc, SimTime::ZERO);
        table.record(1, ab, bc, out, SimTime::MAX);
        assert_eq!(table.len(), 2);
        assert_eq!(table.prune_expired(SimTime::from_ps(5)), 1);
        assert!(table.lookup("x").is_none());

        assert!(table.remove(id).is_some());
        assert!(table.lookup("ab").is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_hold_time_bounds_the_table() {
        let mut table = ParallelSwapTable::new();
        for i in 0..50u64 {
            let (ab, bc) = (pair(&format!("ab{i}"), "A", "B"), pair(&format!("bc{i}"), "B", "C"));
            let ac = ab.swap_with(&bc, SimTime::ZERO);
            let now = SimTime::from_ps(i * 10);
            table.prune_expired(now);
            table.record(0, ab, bc, ac, now + SimTime::from_ps(25));
            assert!(table.len() <= 3, "{} records at {now}", table.len());
        }
        assert_eq!(table.prune_expired(SimTime::from_ps(1_000)), 3);
        assert!(table.is_empty());
        assert!(table.lookup("ab49").is_none());
    }
}
