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

//! Persisted record shapes.

use serde::{Deserialize, Serialize};
use sfim_attest::{Quote, TrustLevel};
use sfim_common::Digest;
use sfim_signer::AggregateSignature;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Committed,
}

/// One ledger entry: a Merkle root with its agreement outcome.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct EventRecord {
    pub merkle_root: Digest,
    pub aggregated_signature: Option<AggregateSignature>,
    pub node_id: u32,
    /// Sequence number the digest committed at; zero while pending.
    pub consensus_round: u64,
    pub status: RecordStatus,
    pub file_count: u64,
    pub timestamp_ms: u64,
}

/// Binding of one file hash to the Merkle root that covered it.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_hash: Digest,
    pub merkle_root: Digest,
    pub size: u64,
    pub mtime: u64,
    pub relative_path: String,
    pub consensus_round: u64,
    pub status: RecordStatus,
}

/// Audit trail entry.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event_type: String,
    pub node_id: Option<u32>,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub severity: String,
    pub timestamp_ms: u64,
}

/// A stored attestation outcome.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub node_id: u32,
    pub quote: Quote,
    pub trust_level: TrustLevel,
    pub timestamp_ms: u64,
}
