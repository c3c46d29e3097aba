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

//! Quote verification against configured per-node baselines.
//!
//! Baselines are an input: a node without a configured baseline entry is
//! refused outright, the verifier never guesses one.

use crate::{
    quote::{PcrValue, Quote, TrustLevel},
    tpm::{quote_signature, skewed},
};
use sfim_common::Clock;
use std::{collections::BTreeMap, sync::Arc};

pub struct AttestationVerifier {
    baselines: BTreeMap<u32, BTreeMap<u8, PcrValue>>,
    clock: Arc<dyn Clock>,
}

impl AttestationVerifier {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            baselines: BTreeMap::new(),
            clock,
        }
    }

    /// Register the expected PCR baseline of `node_id`.
    pub fn insert_baseline(&mut self, node_id: u32, baseline: BTreeMap<u8, PcrValue>) {
        self.baselines.insert(node_id, baseline);
    }

    /// Drop a node from the trusted set.
    pub fn quarantine(&mut self, node_id: u32) {
        if self.baselines.remove(&node_id).is_some() {
            log::warn!("quarantined node {node_id}");
        }
    }

    pub fn known_nodes(&self) -> Vec<u32> {
        self.baselines.keys().copied().collect()
    }

    /// Full check: known node, fresh timestamp, valid signature, and every
    /// sampled PCR matching the node's baseline.
    pub fn verify_quote(&self, node_id: u32, quote: &Quote) -> bool {
        self.trust_level(node_id, quote) == TrustLevel::Trusted
    }

    pub fn trust_level(&self, node_id: u32, quote: &Quote) -> TrustLevel {
        let Some(baseline) = self.baselines.get(&node_id) else {
            log::warn!("node {node_id} has no configured baseline, refusing quote");
            return TrustLevel::Untrusted;
        };

        if skewed(quote.timestamp_ms, self.clock.now_ms()) {
            return TrustLevel::Untrusted;
        }
        if quote.signature != quote_signature(&quote.nonce, &quote.pcr_values) {
            return TrustLevel::Untrusted;
        }

        let deviated = quote
            .pcr_values
            .iter()
            .any(|(pcr, value)| baseline.get(pcr) != Some(value));
        if deviated {
            TrustLevel::Suspicious
        } else {
            TrustLevel::Trusted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tpm::{simulated_baseline, SimulatedTpm};
    use std::sync::atomic::{AtomicU64, Ordering};

    struct ManualClock(AtomicU64);

    impl Clock for ManualClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::Relaxed)
        }
    }

    fn setup() -> (SimulatedTpm, AttestationVerifier) {
        let clock = Arc::new(ManualClock(AtomicU64::new(1_000_000)));
        let tpm = SimulatedTpm::new(clock.clone());
        let mut verifier = AttestationVerifier::new(clock);
        verifier.insert_baseline(1, simulated_baseline());
        (tpm, verifier)
    }

    #[test]
    fn known_node_with_clean_quote_verifies() {
        let (tpm, verifier) = setup();
        let quote = tpm.collect_quote();

        assert!(verifier.verify_quote(1, &quote));
        assert_eq!(verifier.trust_level(1, &quote), TrustLevel::Trusted);
    }

    #[test]
    fn unknown_node_is_refused() {
        let (tpm, verifier) = setup();
        let quote = tpm.collect_quote();

        assert!(!verifier.verify_quote(7, &quote));
        assert_eq!(verifier.trust_level(7, &quote), TrustLevel::Untrusted);
    }

    #[test]
    fn quarantine_removes_the_baseline() {
        let (tpm, mut verifier) = setup();
        let quote = tpm.collect_quote();

        verifier.quarantine(1);
        assert!(verifier.known_nodes().is_empty());
        assert!(!verifier.verify_quote(1, &quote));
    }

    #[test]
    fn deviating_pcr_is_suspicious() {
        let (mut tpm, verifier) = setup();
        tpm.tamper_pcr(0);
        let quote = tpm.collect_quote();

        assert_eq!(verifier.trust_level(1, &quote), TrustLevel::Suspicious);
    }

    #[test]
    fn bad_signature_is_untrusted() {
        let (tpm, verifier) = setup();
        let mut quote = tpm.collect_quote();
        quote.signature.clear();

        assert_eq!(verifier.trust_level(1, &quote), TrustLevel::Untrusted);
    }
}
