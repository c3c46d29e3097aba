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

//! Attestation quote and trust classification types.

use serde::{Deserialize, Serialize};
use sfim_common::hexfmt;
use std::{collections::BTreeMap, fmt};

/// A 32-byte platform configuration register value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PcrValue(#[serde(with = "hexfmt::array")] pub [u8; 32]);

/// The 20-byte verifier-supplied nonce a quote is bound to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteNonce(#[serde(with = "hexfmt::array")] pub [u8; 20]);

/// A signed snapshot of PCR values plus the nonce it was collected for.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Quote {
    /// Sampled registers, keyed by PCR index. `BTreeMap` keeps the signing
    /// order canonical.
    pub pcr_values: BTreeMap<u8, PcrValue>,
    pub nonce: QuoteNonce,
    #[serde(with = "hexfmt::bytes")]
    pub signature: Vec<u8>,
    pub timestamp_ms: u64,
    /// Whether every sampled PCR matched the baseline at collection time.
    pub is_valid: bool,
}

/// Classification of a node's platform state.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Trusted,
    Suspicious,
    Untrusted,
}

impl TrustLevel {
    pub fn is_trusted(&self) -> bool {
        matches!(self, TrustLevel::Trusted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::Trusted => "trusted",
            TrustLevel::Suspicious => "suspicious",
            TrustLevel::Untrusted => "untrusted",
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
