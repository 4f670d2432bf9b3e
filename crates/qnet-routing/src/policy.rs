//! Swap-rank schedules

use serde::{Deserialize, Serialize};

/// How intermediate nodes are ordered for swapping along a path
///
/// Lower rank swaps first. Endpoints always carry the highest rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapPolicy {
    /// Every intermediate node swaps as soon as it can
    #[default]
    Asap,
    /// Swaps proceed from the source towards the destination
    LeftToRight,
    /// Swaps proceed from the destination towards the source
    RightToLeft,
}

impl SwapPolicy {
    /// Rank sequence for a route of `n` nodes
    pub fn ranks(&self, n: usize) -> Vec<u32> {
        if n < 2 {
            return vec![0; n];
        }
        let inner = n - 2;
        match self {
            SwapPolicy::Asap => {
                let mut ranks = vec![0; n];
                ranks[0] = 1;
                ranks[n - 1] = 1;
                ranks
            }
            SwapPolicy::LeftToRight => {
                let top = inner as u32;
                std::iter::once(top).chain(0..inner as u32).chain(std::iter::once(top)).collect()
            }
            SwapPolicy::RightToLeft => {
                let mut ranks = SwapPolicy::LeftToRight.ranks(n);
                ranks.reverse();
                ranks
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asap_ranks() {
        assert_eq!(SwapPolicy::Asap.ranks(2), vec![1, 1]);
        assert_eq!(SwapPolicy::Asap.ranks(5), vec![1, 0, 0, 0, 1]);
    }

    #[test]
    fn test_sequential_ranks() {
        assert_eq!(SwapPolicy::LeftToRight.ranks(5), vec![3, 0, 1, 2, 3]);
        assert_eq!(SwapPolicy::RightToLeft.ranks(5), vec![3, 2, 1, 0, 3]);
        assert_eq!(SwapPolicy::LeftToRight.ranks(3), vec![1, 0, 1]);
    }

    #[test]
    fn test_policy_serde_names() {
        let json = serde_json::to_string(&SwapPolicy::LeftToRight).unwrap();
        assert_eq!(json, "\"left_to_right\"");
        let parsed: SwapPolicy = serde_json::from_str("\"asap\"").unwrap();
        assert_eq!(parsed, SwapPolicy::Asap);
    }

    #[test]
    fn test_two_node_sequential() {
        assert_eq!(SwapPolicy::LeftToRight.ranks(2), vec![0, 0]);
    }
}
