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

//! Integrity events produced by the file agent and committed ledger entries.

use crate::digest::Digest;
use serde::{Deserialize, Serialize};
use sfim_signer::AggregateSignature;
use std::collections::BTreeMap;

/// Per-file facts gathered during a scan. Forwarded to the commit sink
/// verbatim; agreement never looks inside.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct FileMetadata {
    pub hash: Digest,
    pub size: u64,
    /// Seconds since the Unix epoch, from file metadata.
    pub mtime: u64,
    pub relative_path: String,
}

/// A Merkle root submission from the file agent.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct IntegrityEvent {
    pub merkle_root: Digest,
    pub file_count: u64,
    pub timestamp_ms: u64,
    /// Keyed by the scanned path.
    #[serde(default)]
    pub metadata: BTreeMap<String, FileMetadata>,
}

/// One totally-ordered ledger entry, produced when an agreement instance
/// latches `committed`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct CommittedEntry {
    pub view: u64,
    pub sequence: u64,
    pub digest: Digest,
    pub aggregated_signature: AggregateSignature,
    /// Node ids of the commit voters, ascending. The aggregated signature
    /// verifies against exactly these nodes' public keys.
    pub contributors: Vec<u32>,
}
