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

//! Simulated TPM.
//!
//! Baseline PCR values are derived deterministically from per-register
//! string seeds, so every simulated node shares the same baseline. The
//! quote signature is a keyed hash over `nonce || ordered(pcr_values)`;
//! verifiers re-derive it from the same key.

use crate::quote::{PcrValue, Quote, QuoteNonce, TrustLevel};
use rand::RngCore;
use sfim_common::Clock;
use sha2::{Digest as _, Sha256};
use std::{collections::BTreeMap, sync::Arc, time::Duration};

/// Boot-measurement registers sampled by default.
pub const DEFAULT_PCR_SET: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 7];

/// How often the supervisor re-attests.
pub const ATTESTATION_INTERVAL: Duration = Duration::from_secs(60);

/// Maximum accepted distance between a quote timestamp and now.
pub const MAX_SKEW_MS: u64 = 5 * 60 * 1000;

/// Registers maintained by a TPM 2.0.
const PCR_COUNT: u8 = 24;

const QUOTE_KEY: &[u8] = b"tpm_key_";

/// The shared deterministic baseline of the simulated platform.
pub fn simulated_baseline() -> BTreeMap<u8, PcrValue> {
    (0..PCR_COUNT)
        .map(|pcr| {
            let mut hasher = Sha256::new();
            hasher.update(format!("pcr_{pcr}_baseline").as_bytes());
            (pcr, PcrValue(hasher.finalize().into()))
        })
        .collect()
}

/// Keyed hash over `nonce || ordered(pcr_values)`; the quote signature in
/// simulated mode. Shared with [`crate::verifier::AttestationVerifier`].
pub(crate) fn quote_signature(
    nonce: &QuoteNonce,
    pcr_values: &BTreeMap<u8, PcrValue>,
) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(QUOTE_KEY);
    hasher.update(nonce.0);
    for value in pcr_values.values() {
        hasher.update(value.0);
    }
    hasher.finalize().to_vec()
}

pub(crate) fn skewed(timestamp_ms: u64, now_ms: u64) -> bool {
    now_ms.abs_diff(timestamp_ms) > MAX_SKEW_MS
}

pub struct SimulatedTpm {
    baseline: BTreeMap<u8, PcrValue>,
    current: BTreeMap<u8, PcrValue>,
    clock: Arc<dyn Clock>,
}

impl SimulatedTpm {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let baseline = simulated_baseline();
        let current = baseline.clone();
        Self {
            baseline,
            current,
            clock,
        }
    }

    pub fn baseline(&self) -> &BTreeMap<u8, PcrValue> {
        &self.baseline
    }

    /// Overwrite a register with a value diverging from the baseline.
    pub fn tamper_pcr(&mut self, pcr: u8) {
        if let Some(baseline) = self.baseline.get(&pcr) {
            let mut hasher = Sha256::new();
            hasher.update(b"compromised_");
            hasher.update(baseline.0);
            self.current.insert(pcr, PcrValue(hasher.finalize().into()));
        }
    }

    /// Reset a register back to its baseline value.
    pub fn restore_pcr(&mut self, pcr: u8) {
        if let Some(baseline) = self.baseline.get(&pcr) {
            self.current.insert(pcr, *baseline);
        }
    }

    /// Collect a quote over a fresh random nonce and the default PCR set.
    pub fn collect_quote(&self) -> Quote {
        let mut nonce = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut nonce);
        self.collect_quote_with(QuoteNonce(nonce), &DEFAULT_PCR_SET)
    }

    /// Collect a quote bound to `nonce` over `pcr_set`.
    pub fn collect_quote_with(&self, nonce: QuoteNonce, pcr_set: &[u8]) -> Quote {
        let pcr_values: BTreeMap<u8, PcrValue> = pcr_set
            .iter()
            .filter_map(|pcr| self.current.get(pcr).map(|value| (*pcr, *value)))
            .collect();

        let signature = quote_signature(&nonce, &pcr_values);
        let is_valid = pcr_values
            .iter()
            .all(|(pcr, value)| self.baseline.get(pcr) == Some(value));

        Quote {
            pcr_values,
            nonce,
            signature,
            timestamp_ms: self.clock.now_ms(),
            is_valid,
        }
    }

    /// Signature and freshness check. PCR deviations do not fail
    /// verification; they only degrade the trust level.
    pub fn verify_quote(&self, quote: &Quote) -> bool {
        if skewed(quote.timestamp_ms, self.clock.now_ms()) {
            log::warn!("quote timestamp outside the accepted window");
            return false;
        }

        quote.signature == quote_signature(&quote.nonce, &quote.pcr_values)
    }

    pub fn trust_level(&self, quote: &Quote) -> TrustLevel {
        if !self.verify_quote(quote) {
            return TrustLevel::Untrusted;
        }

        let deviated = quote
            .pcr_values
            .iter()
            .any(|(pcr, value)| self.baseline.get(pcr) != Some(value));
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
    use std::sync::atomic::{AtomicU64, Ordering};

    pub(crate) struct ManualClock(pub AtomicU64);

    impl Clock for ManualClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::Relaxed)
        }
    }

    fn tpm_at(now_ms: u64) -> (SimulatedTpm, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock(AtomicU64::new(now_ms)));
        (SimulatedTpm::new(clock.clone()), clock)
    }

    #[test]
    fn baseline_is_deterministic() {
        assert_eq!(simulated_baseline(), simulated_baseline());
        assert_eq!(simulated_baseline().len() as u8, PCR_COUNT);
    }

    #[test]
    fn clean_quote_is_trusted() {
        let (tpm, _) = tpm_at(1_000_000);
        let quote = tpm.collect_quote();

        assert!(quote.is_valid);
        assert!(tpm.verify_quote(&quote));
        assert_eq!(tpm.trust_level(&quote), TrustLevel::Trusted);
    }

    #[test]
    fn default_pcr_set_is_sampled() {
        let (tpm, _) = tpm_at(1_000_000);
        let quote = tpm.collect_quote();
        assert_eq!(
            quote.pcr_values.keys().copied().collect::<Vec<_>>(),
            DEFAULT_PCR_SET.to_vec()
        );
    }

    #[test]
    fn tampered_pcr_is_suspicious() {
        let (mut tpm, _) = tpm_at(1_000_000);
        tpm.tamper_pcr(3);
        let quote = tpm.collect_quote();

        assert!(!quote.is_valid);
        // The signature still covers the (deviated) values it reports.
        assert!(tpm.verify_quote(&quote));
        assert_eq!(tpm.trust_level(&quote), TrustLevel::Suspicious);

        tpm.restore_pcr(3);
        assert_eq!(tpm.trust_level(&tpm.collect_quote()), TrustLevel::Trusted);
    }

    #[test]
    fn forged_signature_is_untrusted() {
        let (tpm, _) = tpm_at(1_000_000);
        let mut quote = tpm.collect_quote();
        quote.signature[0] ^= 0x01;

        assert!(!tpm.verify_quote(&quote));
        assert_eq!(tpm.trust_level(&quote), TrustLevel::Untrusted);
    }

    #[test]
    fn skewed_quote_is_untrusted_even_with_matching_pcrs() {
        let (tpm, clock) = tpm_at(1_000_000);
        let quote = tpm.collect_quote();

        clock.0.store(1_000_000 + MAX_SKEW_MS + 1, Ordering::Relaxed);
        assert!(!tpm.verify_quote(&quote));
        assert_eq!(tpm.trust_level(&quote), TrustLevel::Untrusted);

        // A quote from the future is equally stale.
        clock.0.store(0, Ordering::Relaxed);
        assert_eq!(tpm.trust_level(&quote), TrustLevel::Untrusted);
    }

    #[test]
    fn quote_binds_the_nonce() {
        let (tpm, _) = tpm_at(1_000_000);
        let mut quote = tpm.collect_quote_with(QuoteNonce([1; 20]), &DEFAULT_PCR_SET);
        quote.nonce = QuoteNonce([2; 20]);
        assert!(!tpm.verify_quote(&quote));
    }
}
