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

//! Agreement phase messages and their canonical signing payload.

use crate::digest::Digest;
use serde::{Deserialize, Serialize};
use sfim_signer::{PublicKey, Signature};
use std::fmt;

/// The three phases of one agreement round.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PrePrepare,
    Prepare,
    Commit,
}

impl Phase {
    /// Wire spelling of the phase, also used in the signing payload.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::PrePrepare => "pre_prepare",
            Phase::Prepare => "prepare",
            Phase::Commit => "commit",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical signing payload for a vote: `"<phase>:<hex(digest)>:<view>"`
/// in ASCII with lowercase hex. The view is part of the payload so a vote
/// cannot be replayed into another view.
pub fn vote_payload(phase: Phase, digest: &Digest, view: u64) -> Vec<u8> {
    format!("{phase}:{digest}:{view}").into_bytes()
}

/// A single signed vote, immutable once constructed.
///
/// Serializes to the flat on-wire JSON object: hex `digest`, `signature`
/// and `public_key`, integer `view`/`sequence`/`node_id`/`timestamp`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct PhaseMessage {
    pub phase: Phase,
    pub digest: Digest,
    pub view: u64,
    pub sequence: u64,
    pub node_id: u32,
    pub signature: Signature,
    /// Informational only; never gates acceptance.
    pub timestamp: u64,
    pub public_key: PublicKey,
}

impl PhaseMessage {
    /// The bytes this message's signature must cover.
    pub fn signing_payload(&self) -> Vec<u8> {
        vote_payload(self.phase, &self.digest, self.view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_wire_spelling() {
        assert_eq!(Phase::PrePrepare.to_string(), "pre_prepare");
        assert_eq!(Phase::Prepare.to_string(), "prepare");
        assert_eq!(Phase::Commit.to_string(), "commit");
    }

    #[test]
    fn payload_binds_phase_digest_and_view() {
        let digest = Digest::sha512(b"x");
        let payload = vote_payload(Phase::Commit, &digest, 3);
        assert_eq!(
            payload,
            format!("commit:{}:3", digest.to_hex()).into_bytes()
        );

        assert_ne!(payload, vote_payload(Phase::Prepare, &digest, 3));
        assert_ne!(payload, vote_payload(Phase::Commit, &digest, 4));
    }
}
