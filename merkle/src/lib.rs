// This file is part of SFIM.
//
// Copyright (C) 2025 SFIM Network.
// SPDX-License-Identifier: GPL-3.0-or-later WITH Classpath-exception-2.0
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Domain-separated SHA-512 Merkle tree over ordered file hashes.
//!
//! Leaves are hashed with a `0x00` prefix, internal nodes with `0x01`, so a
//! leaf can never be reinterpreted as an inner node. When a level has an odd
//! number of elements the trailing element is promoted to the next level
//! unchanged; it is never paired with a copy of itself, so implementations
//! that duplicate the last element produce different roots.

use serde::{Deserialize, Serialize};
use sfim_common::{Digest, DigestError};
use sha2::{Digest as _, Sha512};

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Hash a leaf: `SHA512(0x00 || data)`.
pub fn leaf_hash(data: &[u8]) -> Digest {
    let mut hasher = Sha512::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(data);
    Digest::from_bytes(hasher.finalize().into())
}

/// Hash an internal node: `SHA512(0x01 || left || right)`.
pub fn node_hash(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = Sha512::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    Digest::from_bytes(hasher.finalize().into())
}

/// Root of an ordered leaf sequence. The empty sequence has the reserved
/// empty root, rendered as the empty hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MerkleRoot(Option<Digest>);

impl MerkleRoot {
    pub const EMPTY: MerkleRoot = MerkleRoot(None);

    pub fn digest(&self) -> Option<Digest> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn to_hex(&self) -> String {
        self.0.map(|digest| digest.to_hex()).unwrap_or_default()
    }

    pub fn from_hex(s: &str) -> Result<Self, DigestError> {
        if s.is_empty() {
            return Ok(Self::EMPTY);
        }
        Digest::from_hex(s).map(|digest| Self(Some(digest)))
    }
}

impl From<Digest> for MerkleRoot {
    fn from(digest: Digest) -> Self {
        Self(Some(digest))
    }
}

impl From<MerkleRoot> for String {
    fn from(root: MerkleRoot) -> Self {
        root.to_hex()
    }
}

impl TryFrom<String> for MerkleRoot {
    type Error = DigestError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl std::fmt::Display for MerkleRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn next_level(level: &[Digest]) -> Vec<Digest> {
    let mut next = Vec::with_capacity(level.len().div_ceil(2));
    for pair in level.chunks(2) {
        match pair {
            [left, right] => next.push(node_hash(left, right)),
            // Odd trailing element: promoted unchanged.
            [single] => next.push(*single),
            _ => unreachable!("chunks(2) yields one- or two-element slices"),
        }
    }
    next
}

/// Compute the root over `leaves`, in insertion order.
pub fn merkle_root<T: AsRef<[u8]>>(leaves: &[T]) -> MerkleRoot {
    if leaves.is_empty() {
        return MerkleRoot::EMPTY;
    }

    let mut level: Vec<Digest> = leaves.iter().map(|leaf| leaf_hash(leaf.as_ref())).collect();
    while level.len() > 1 {
        level = next_level(&level);
    }

    MerkleRoot(Some(level[0]))
}

/// Sibling path from leaf `index` up to the root. Levels where the walked
/// element is promoted contribute no entry. Empty for an empty sequence or
/// an out-of-range index.
pub fn merkle_proof<T: AsRef<[u8]>>(leaves: &[T], index: usize) -> Vec<Digest> {
    if leaves.is_empty() || index >= leaves.len() {
        return Vec::new();
    }

    let mut proof = Vec::new();
    let mut level: Vec<Digest> = leaves.iter().map(|leaf| leaf_hash(leaf.as_ref())).collect();
    let mut position = index;

    while level.len() > 1 {
        if position % 2 == 0 {
            if position + 1 < level.len() {
                proof.push(level[position + 1]);
            }
        } else {
            proof.push(level[position - 1]);
        }

        level = next_level(&level);
        position /= 2;
    }

    proof
}

/// Rebuild the path from `leaf` using `proof` and compare against `root`.
/// The parity of the running index decides the sibling side: even puts the
/// sibling on the right, odd on the left. Returns false on any mismatch,
/// including the empty root.
pub fn verify_proof(leaf: &[u8], proof: &[Digest], root: &MerkleRoot, index: usize) -> bool {
    let Some(expected) = root.digest() else {
        return false;
    };

    let mut current = leaf_hash(leaf);
    let mut position = index;

    for sibling in proof {
        current = if position % 2 == 0 {
            node_hash(&current, sibling)
        } else {
            node_hash(sibling, &current)
        };
        position /= 2;
    }

    current == expected
}
