//! Forwarding information base
//!
//! Each node keeps one [`FibEntry`] per installed path. The entry records the
//! path's route, its swap-rank schedule and purification schedule, and where
//! the owning node sits on the route.
//!
//! Swap ranks order swapping along a path: a node only admits a pair for
//! purification (and thereby swapping) when its rank is not above the rank
//! of the pair's other end. Endpoints carry the highest rank and never swap.

use std::collections::{BTreeMap, BTreeSet};

use qnet_core::{NodeId, PathId, PathInstructions, segment_name};
use tracing::debug;

use crate::error::{FibError, FibResult};

/// Check that path instructions are structurally sound
pub fn validate_path_instructions(instructions: &PathInstructions) -> FibResult<()> {
    let route = &instructions.route;
    let invalid = |msg: String| Err(FibError::InvalidInstructions(msg));

    if route.len() < 2 {
        return invalid(format!("route must have at least two nodes, got {}", route.len()));
    }
    let unique: BTreeSet<&NodeId> = route.iter().collect();
    if unique.len() != route.len() {
        return invalid("route visits a node twice".to_string());
    }
    if instructions.swap.len() != route.len() {
        return invalid(format!(
            "swap sequence has {} entries for {} nodes",
            instructions.swap.len(),
            route.len()
        ));
    }

    let max_rank = instructions.swap.iter().copied().max().unwrap_or(0);
    let (first, last) = (instructions.swap[0], instructions.swap[route.len() - 1]);
    if first != max_rank || last != max_rank {
        return invalid(format!(
            "endpoints must carry the highest swap rank {max_rank}, got {first} and {last}"
        ));
    }

    let segments: BTreeSet<String> = route
        .iter()
        .enumerate()
        .flat_map(|(i, a)| route[i + 1..].iter().flat_map(move |b| [segment_name(a, b), segment_name(b, a)]))
        .collect();
    if let Some(unknown) = instructions.purif.keys().find(|k| !segments.contains(*k)) {
        return invalid(format!("purification segment {unknown} is not on the route"));
    }

    if let Some(m_v) = &instructions.m_v {
        if m_v.len() != route.len() - 1 {
            return invalid(format!("m_v has {} entries for {} channels", m_v.len(), route.len() - 1));
        }
    }
    Ok(())
}

/// One installed path as seen from the owning node
#[derive(Debug, Clone, PartialEq)]
pub struct FibEntry {
    pub path_id: PathId,
    pub req_id: u32,
    pub route: Vec<NodeId>,
    pub swap: Vec<u32>,
    pub purif: BTreeMap<String, u32>,
    /// Position of the owning node on the route
    pub own_index: usize,
    pub own_swap_rank: u32,
}

impl FibEntry {
    pub fn from_instructions(
        path_id: PathId,
        instructions: &PathInstructions,
        own: &NodeId,
    ) -> FibResult<Self> {
        let own_index = instructions
            .route
            .iter()
            .position(|n| n == own)
            .ok_or_else(|| FibError::NotOnRoute { node: own.clone(), path_id })?;
        let own_swap_rank = *instructions
            .swap
            .get(own_index)
            .ok_or_else(|| FibError::InvalidInstructions("swap shorter than route".to_string()))?;
        Ok(Self {
            path_id,
            req_id: instructions.req_id,
            route: instructions.route.clone(),
            swap: instructions.swap.clone(),
            purif: instructions.purif.clone(),
            own_index,
            own_swap_rank,
        })
    }

    /// Position and swap rank of `node` on this path
    pub fn find_index_and_swap_rank(&self, node: &NodeId) -> FibResult<(usize, u32)> {
        self.route
            .iter()
            .position(|n| n == node)
            .map(|i| (i, self.swap[i]))
            .ok_or_else(|| FibError::NotOnRoute { node: node.clone(), path_id: self.path_id })
    }

    /// Purification rounds required on the segment between `a` and `b`
    pub fn purif_rounds(&self, a: &NodeId, b: &NodeId) -> u32 {
        self.purif
            .get(&segment_name(a, b))
            .or_else(|| self.purif.get(&segment_name(b, a)))
            .copied()
            .unwrap_or(0)
    }

    pub fn src(&self) -> &NodeId {
        &self.route[0]
    }

    pub fn dst(&self) -> &NodeId {
        &self.route[self.route.len() - 1]
    }

    pub fn is_endpoint(&self, node: &NodeId) -> bool {
        node == self.src() || node == self.dst()
    }

    /// Whether `a` and `b` are the two ends of the path, in either order
    pub fn is_endpoint_pair(&self, a: &NodeId, b: &NodeId) -> bool {
        (a == self.src() && b == self.dst()) || (a == self.dst() && b == self.src())
    }

    pub fn left_neighbor(&self) -> Option<&NodeId> {
        self.own_index.checked_sub(1).map(|i| &self.route[i])
    }

    pub fn right_neighbor(&self) -> Option<&NodeId> {
        self.route.get(self.own_index + 1)
    }
}

/// All paths installed on one node
#[derive(Debug, Clone, Default)]
pub struct Fib {
    entries: BTreeMap<PathId, FibEntry>,
}

impl Fib {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: FibEntry) -> FibResult<()> {
        if self.entries.contains_key(&entry.path_id) {
            return Err(FibError::DuplicatePath(entry.path_id));
        }
        debug!(path_id = entry.path_id, route = ?entry.route, rank = entry.own_swap_rank, "FIB insert");
        self.entries.insert(entry.path_id, entry);
        Ok(())
    }

    pub fn get(&self, path_id: PathId) -> FibResult<&FibEntry> {
        self.entries.get(&path_id).ok_or(FibError::UnknownPath(path_id))
    }

    pub fn remove(&mut self, path_id: PathId) -> FibResult<FibEntry> {
        self.entries.remove(&path_id).ok_or(FibError::UnknownPath(path_id))
    }

    pub fn contains(&self, path_id: PathId) -> bool {
        self.entries.contains_key(&path_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FibEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|n| NodeId::from(*n)).collect()
    }

    fn instructions() -> PathInstructions {
        PathInstructions::new(0, route(&["S", "R1", "R2", "D"]), vec![2, 0, 1, 2]).with_purif("S-R1", 1)
    }

    #[test]
    fn test_valid_instructions() {
        assert!(validate_path_instructions(&instructions()).is_ok());
        let asap = PathInstructions::new(0, route(&["S", "R", "D"]), vec![1, 0, 1]);
        assert!(validate_path_instructions(&asap).is_ok());
    }

    #[test]
    fn test_swap_length_mismatch() {
        let bad = PathInstructions::new(0, route(&["S", "R", "D"]), vec![1, 1]);
        assert!(matches!(validate_path_instructions(&bad), Err(FibError::InvalidInstructions(_))));
    }

    #[test]
    fn test_endpoints_need_highest_rank() {
        let bad = PathInstructions::new(0, route(&["S", "R1", "R2", "D"]), vec![1, 0, 2, 1]);
        assert!(validate_path_instructions(&bad).is_err());
    }

    #[test]
    fn test_unknown_purif_segment() {
        let bad = instructions().with_purif("S-X", 1);
        assert!(validate_path_instructions(&bad).is_err());
        let reversed = instructions().with_purif("D-S", 2);
        assert!(validate_path_instructions(&reversed).is_ok());
    }

    #[test]
    fn test_m_v_length() {
        let bad = instructions().with_m_v(vec![(1, 1)]);
        assert!(validate_path_instructions(&bad).is_err());
        let good = instructions().with_m_v(vec![(1, 1), (2, 2), (1, 1)]);
        assert!(validate_path_instructions(&good).is_ok());
    }

    #[test]
    fn test_entry_rank_lookup() {
        let entry = FibEntry::from_instructions(3, &instructions(), &"R2".into()).unwrap();
        assert_eq!(entry.own_index, 2);
        assert_eq!(entry.own_swap_rank, 1);
        assert_eq!(entry.find_index_and_swap_rank(&"R1".into()).unwrap(), (1, 0));
        assert!(matches!(
            entry.find_index_and_swap_rank(&"X".into()),
            Err(FibError::NotOnRoute { path_id: 3, .. })
        ));
        assert_eq!(entry.left_neighbor(), Some(&NodeId::from("R1")));
        assert_eq!(entry.right_neighbor(), Some(&NodeId::from("D")));
    }

    #[test]
    fn test_entry_for_foreign_node() {
        assert!(FibEntry::from_instructions(1, &instructions(), &"X".into()).is_err());
    }

    #[test]
    fn test_purif_rounds_symmetric() {
        let entry = FibEntry::from_instructions(0, &instructions(), &"S".into()).unwrap();
        assert_eq!(entry.purif_rounds(&"S".into(), &"R1".into()), 1);
        assert_eq!(entry.purif_rounds(&"R1".into(), &"S".into()), 1);
        assert_eq!(entry.purif_rounds(&"R1".into(), &"R2".into()), 0);
        assert!(entry.is_endpoint_pair(&"D".into(), &"S".into()));
        assert!(!entry.is_endpoint_pair(&"S".into(), &"R2".into()));
        assert_eq!(entry.left_neighbor(), None);
    }

    #[test]
    fn test_fib_table() {
        let mut fib = Fib::new();
        let entry = FibEntry::from_instructions(5, &instructions(), &"S".into()).unwrap();
        fib.insert(entry.clone()).unwrap();
        assert_eq!(fib.insert(entry), Err(FibError::DuplicatePath(5)));
        assert!(fib.get(5).is_ok());
        assert_eq!(fib.get(6).unwrap_err(), FibError::UnknownPath(6));
        assert_eq!(fib.len(), 1);
        fib.remove(5).unwrap();
        assert!(fib.is_empty());
    }
}
