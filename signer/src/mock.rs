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

//! Keyed-hash fallback scheme.
//!
//! A SHA-256 MAC over `secret || message`. It can only be verified by the
//! holder of the secret, so it is restricted to single-node deployments;
//! the state machine refuses it once peers are configured.

use crate::{AggregateSignature, PublicKey, Signature, SignatureError, SignatureScheme};
use sha2::{Digest as _, Sha256};

const PK_PREFIX: &[u8] = b"mock_pk_";

pub struct MockScheme {
    secret: [u8; 32],
    public: PublicKey,
}

impl MockScheme {
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(PK_PREFIX);
        hasher.update(seed);
        let public = PublicKey::from_bytes(hasher.finalize().to_vec());

        Self {
            secret: *seed,
            public,
        }
    }

    fn mac(&self, message: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(self.secret);
        hasher.update(message);
        hasher.finalize().to_vec()
    }
}

impl SignatureScheme for MockScheme {
    fn public_key(&self) -> PublicKey {
        self.public.clone()
    }

    fn sign(&self, message: &[u8]) -> Signature {
        Signature::from_bytes(self.mac(message))
    }

    fn verify(&self, public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
        // A MAC is only checkable with the local secret.
        public_key == &self.public && signature.as_bytes() == self.mac(message).as_slice()
    }

    fn aggregate(&self, signatures: &[Signature]) -> Result<AggregateSignature, SignatureError> {
        if signatures.is_empty() {
            return Err(SignatureError::EmptyAggregation);
        }

        let mut hasher = Sha256::new();
        for signature in signatures {
            hasher.update(signature.as_bytes());
        }

        Ok(AggregateSignature::from_bytes(hasher.finalize().to_vec()))
    }

    fn verify_aggregate(
        &self,
        aggregate: &AggregateSignature,
        signers: &[(PublicKey, Vec<u8>)],
    ) -> bool {
        if signers.is_empty() {
            return false;
        }

        let mut hasher = Sha256::new();
        for (public_key, message) in signers {
            if public_key != &self.public {
                return false;
            }
            hasher.update(self.mac(message));
        }

        aggregate.as_bytes() == hasher.finalize().as_slice()
    }

    fn degraded(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_roundtrip() {
        let signer = MockScheme::from_seed(&[3; 32]);
        let signature = signer.sign(b"commit:00:0");

        assert!(signer.verify(&signer.public_key(), b"commit:00:0", &signature));
        assert!(!signer.verify(&signer.public_key(), b"commit:00:1", &signature));
    }

    #[test]
    fn foreign_key_is_rejected() {
        let signer = MockScheme::from_seed(&[3; 32]);
        let other = MockScheme::from_seed(&[4; 32]);
        let signature = signer.sign(b"message");

        assert!(!signer.verify(&other.public_key(), b"message", &signature));
    }

    #[test]
    fn self_aggregate_verifies() {
        let signer = MockScheme::from_seed(&[5; 32]);
        let message = b"commit:ff:0".to_vec();
        let signature = signer.sign(&message);

        let aggregate = signer.aggregate(std::slice::from_ref(&signature)).unwrap();
        assert!(signer.verify_aggregate(&aggregate, &[(signer.public_key(), message)]));
    }

    #[test]
    fn scheme_reports_degraded() {
        assert!(MockScheme::from_seed(&[0; 32]).degraded());
    }
}
