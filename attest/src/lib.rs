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

//! Platform attestation for SFIM nodes.
//!
//! A node proves its platform state with a [`Quote`] over a nonce and a set
//! of PCR values. The supervisor collects a quote at startup and on a
//! periodic interval; a node whose quote classifies as `untrusted` stops
//! voting in agreement.

pub mod quote;
pub mod tpm;
pub mod verifier;

pub use quote::{PcrValue, Quote, QuoteNonce, TrustLevel};
pub use tpm::{simulated_baseline, SimulatedTpm, ATTESTATION_INTERVAL, DEFAULT_PCR_SET};
pub use verifier::AttestationVerifier;
