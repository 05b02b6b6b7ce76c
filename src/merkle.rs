// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Static Merkle Tree
//!
//! Built once from an ordered batch of leaves; never mutated afterwards.
//!
//! # Construction
//! - Parent = SHA-256(left || right).
//! - An odd trailing node is an *orphan*: it is not duplicated, it is carried
//!   up unchanged until it pairs with the last node of the next odd row.
//!
//! Given five leaves the rows are:
//! ```text
//! 0        I
//!         / \
//! 1      H   \
//!       / \   \
//! 2    F   G   \
//!     / \ / \   \
//! 3   A B C D   E
//! ```
//! and the path of `E` is the single step `{H, E, I}`.

use crate::error::{MerkleError, PathError};
use crate::types::Digest;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

/// SHA-256 of `left || right`.
pub fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Digest(hasher.finalize().into())
}

/// One step of a Merkle path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MerkleNodeHashes {
    pub left: Digest,
    pub right: Digest,
    pub parent: Digest,
}

impl MerkleNodeHashes {
    fn is_consistent(&self) -> bool {
        hash_pair(&self.left, &self.right) == self.parent
    }
}

/// Hashes needed to go from a leaf up to the root, leaf first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct MerklePath(pub Vec<MerkleNodeHashes>);

impl MerklePath {
    pub fn steps(&self) -> &[MerkleNodeHashes] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Structural check: every triplet hashes correctly and each parent is a
    /// child of the next step.
    pub fn validate(&self) -> Result<(), PathError> {
        for (index, step) in self.0.iter().enumerate() {
            if !step.is_consistent() {
                return Err(PathError::ParentMismatch { index });
            }
            if let Some(up) = self.0.get(index + 1) {
                if step.parent != up.left && step.parent != up.right {
                    return Err(PathError::BrokenLink { index });
                }
            }
        }
        Ok(())
    }

    /// Full inclusion check of `leaf` under `root`.
    ///
    /// A single-leaf tree has an empty path and its root is the leaf itself.
    pub fn verify(&self, leaf: &Digest, root: &Digest) -> Result<(), PathError> {
        self.validate()?;

        let (first, last) = match (self.0.first(), self.0.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return if leaf == root {
                    Ok(())
                } else {
                    Err(PathError::RootMismatch)
                }
            }
        };

        if first.left != *leaf && first.right != *leaf {
            return Err(PathError::LeafNotFound);
        }
        if last.parent != *root {
            return Err(PathError::RootMismatch);
        }
        Ok(())
    }
}

/// Merkle tree over a fixed leaf sequence.
///
/// `rows[0]` holds the root, the last row holds the leaves.
#[derive(Debug, Clone)]
pub struct StaticTree {
    rows: Vec<Vec<Digest>>,
}

impl StaticTree {
    pub fn new(leaves: &[Digest]) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::EmptyTree);
        }

        let lengths = row_lengths(leaves.len());
        let mut rows: Vec<Vec<Digest>> = lengths
            .iter()
            .map(|len| vec![Digest::default(); *len])
            .collect();
        if let Some(last) = rows.last_mut() {
            last.copy_from_slice(leaves);
        }

        let mut tree = Self { rows };
        tree.compute();
        Ok(tree)
    }

    pub fn root(&self) -> Digest {
        self.rows[0][0]
    }

    pub fn leaves_len(&self) -> usize {
        self.leaves().len()
    }

    pub fn leaves(&self) -> &[Digest] {
        &self.rows[self.rows.len() - 1]
    }

    pub fn leaf(&self, index: usize) -> Option<Digest> {
        self.leaves().get(index).copied()
    }

    /// Path from leaf `index` to the root, or `None` if out of range.
    pub fn path(&self, index: usize) -> Option<MerklePath> {
        if index >= self.leaves_len() {
            return None;
        }

        let mut row = self.rows.len() - 1;
        let mut col = index;
        let mut steps = Vec::with_capacity(row);

        while row > 0 {
            let Some(step) = self.triplet(row, col) else {
                break;
            };
            steps.push(step);
            match self.parent(row, col) {
                Some((r, c)) => {
                    row = r;
                    col = c;
                }
                None => break,
            }
        }

        Some(MerklePath(steps))
    }

    // Bottom-up fill. Every interior node has a left child directly below
    // and a right child somewhere below (possibly an orphan).
    fn compute(&mut self) {
        for row in (0..self.rows.len() - 1).rev() {
            for col in 0..self.rows[row].len() {
                let left = self.rows[row + 1][col * 2];
                let right = match self.down_right(row, col) {
                    Some((r, c)) => self.rows[r][c],
                    None => left,
                };
                self.rows[row][col] = hash_pair(&left, &right);
            }
        }
    }

    fn triplet(&self, row: usize, col: usize) -> Option<MerkleNodeHashes> {
        let node = self.rows[row][col];
        let (left, right) = match self.left_sibling(row, col) {
            Some((r, c)) => (self.rows[r][c], node),
            None => {
                let (r, c) = self.right_sibling(row, col)?;
                (node, self.rows[r][c])
            }
        };
        let (pr, pc) = self.parent(row, col)?;
        Some(MerkleNodeHashes {
            left,
            right,
            parent: self.rows[pr][pc],
        })
    }

    fn left_sibling(&self, row: usize, col: usize) -> Option<(usize, usize)> {
        let (pr, pc) = self.parent(row, col)?;
        let candidate = self.down_left(pr, pc)?;
        (candidate != (row, col)).then_some(candidate)
    }

    fn right_sibling(&self, row: usize, col: usize) -> Option<(usize, usize)> {
        let (pr, pc) = self.parent(row, col)?;
        let candidate = self.down_right(pr, pc)?;
        (candidate != (row, col)).then_some(candidate)
    }

    // The first row above that actually has a node at the halved column.
    fn parent(&self, row: usize, col: usize) -> Option<(usize, usize)> {
        let (mut r, mut c) = (row, col);
        while r > 0 {
            r -= 1;
            c /= 2;
            if c < self.rows[r].len() {
                return Some((r, c));
            }
        }
        None
    }

    fn down_left(&self, row: usize, col: usize) -> Option<(usize, usize)> {
        (row + 1 < self.rows.len()).then_some((row + 1, col * 2))
    }

    // Orphans are found by descending without the +1.
    fn down_right(&self, row: usize, col: usize) -> Option<(usize, usize)> {
        let (mut r, mut c) = (row + 1, col * 2 + 1);
        while r < self.rows.len() {
            if c < self.rows[r].len() {
                return Some((r, c));
            }
            r += 1;
            c *= 2;
        }
        None
    }
}

/// Number of nodes on each row, root first.
fn row_lengths(num_leaves: usize) -> Vec<usize> {
    let depth = if num_leaves <= 1 {
        1
    } else {
        (usize::BITS - (num_leaves - 1).leading_zeros()) as usize + 1
    };

    let mut lengths = vec![0usize; depth];
    let mut curr = num_leaves;
    let mut orphan = false;

    for row in (0..depth).rev() {
        lengths[row] = curr;
        if curr % 2 > 0 {
            if orphan {
                curr += 1;
                orphan = false;
            } else {
                orphan = true;
            }
        }
        curr /= 2;
    }

    lengths
}
