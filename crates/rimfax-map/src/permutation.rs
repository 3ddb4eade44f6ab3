//! Running qubit permutation.

use std::fmt;

/// A bijection over physical slots.
///
/// `get(i)` is the current physical location of the logical content that
/// started in slot `i`. The mapper updates the permutation in place as it
/// emits SWAPs and hands the final value back to the caller as a witness of
/// where every qubit ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    map: Vec<u32>,
}

impl Permutation {
    /// The identity permutation on `0..n`.
    pub fn identity(n: u32) -> Self {
        Self {
            map: (0..n).collect(),
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Current location of the content that started in `slot`.
    #[inline]
    pub fn get(&self, slot: u32) -> u32 {
        self.map[slot as usize]
    }

    /// Record a SWAP of the physical slots `a` and `b`: every entry
    /// currently pointing at one of them is redirected to the other.
    pub fn swap_slots(&mut self, a: u32, b: u32) {
        for q in &mut self.map {
            if *q == a {
                *q = b;
            } else if *q == b {
                *q = a;
            }
        }
    }

    /// Whether no qubit has moved.
    pub fn is_identity(&self) -> bool {
        self.map.iter().enumerate().all(|(i, &q)| i as u32 == q)
    }

    /// Whether the map is a bijection on `0..n`. Holds after every update;
    /// checked by the mappers' debug assertions and the test suite.
    pub fn is_bijection(&self) -> bool {
        let mut seen = vec![false; self.map.len()];
        self.map.iter().all(|&q| {
            let slot = q as usize;
            slot < seen.len() && !std::mem::replace(&mut seen[slot], true)
        })
    }

    /// `(start_slot, current_slot)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.map.iter().enumerate().map(|(i, &q)| (i as u32, q))
    }

    /// The forward map as a slice.
    pub fn as_slice(&self) -> &[u32] {
        &self.map
    }
}

impl fmt::Display for Permutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, q) in self.iter() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{i} -> {q}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let perm = Permutation::identity(4);
        assert!(perm.is_identity());
        assert!(perm.is_bijection());
        assert_eq!(perm.get(2), 2);
    }

    #[test]
    fn test_swap_slots() {
        let mut perm = Permutation::identity(3);
        perm.swap_slots(0, 1);

        assert_eq!(perm.get(0), 1);
        assert_eq!(perm.get(1), 0);
        assert_eq!(perm.get(2), 2);
        assert!(perm.is_bijection());
        assert!(!perm.is_identity());
    }

    #[test]
    fn test_swap_chain_composes() {
        let mut perm = Permutation::identity(3);
        perm.swap_slots(0, 1);
        perm.swap_slots(1, 2);

        // Content from slot 0 moved to 1, then on to 2.
        assert_eq!(perm.get(0), 2);
        assert_eq!(perm.get(1), 0);
        assert_eq!(perm.get(2), 1);
        assert!(perm.is_bijection());
    }

    #[test]
    fn test_swap_undone() {
        let mut perm = Permutation::identity(5);
        perm.swap_slots(1, 3);
        perm.swap_slots(3, 1);
        assert!(perm.is_identity());
    }

    #[test]
    fn test_display() {
        let mut perm = Permutation::identity(2);
        perm.swap_slots(0, 1);
        assert_eq!(perm.to_string(), "{0 -> 1, 1 -> 0}");
    }
}
