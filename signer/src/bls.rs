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

//! BLS12-381 vote signatures with public-key augmentation.
//!
//! Public keys live in G1 (48 bytes compressed), signatures in G2 (96 bytes
//! compressed). The augmentation variant prefixes every signed message with
//! the signer's compressed public key, which binds each vote to its author
//! and makes aggregates over a common payload sound.

use crate::{AggregateSignature, PublicKey, Signature, SignatureError, SignatureScheme};
use blst::{
    min_pk::{
        AggregateSignature as BlstAggregate, PublicKey as BlstPublicKey, SecretKey,
        Signature as BlstSignature,
    },
    BLST_ERROR,
};

/// Domain separation tag of the augmentation ciphersuite.
const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_AUG_";

/// Seed length accepted by key generation.
pub const SEED_LEN: usize = 32;

pub struct BlsScheme {
    secret: SecretKey,
    public: PublicKey,
}

impl BlsScheme {
    /// Derive a keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; SEED_LEN]) -> Result<Self, SignatureError> {
        let secret = SecretKey::key_gen(seed, &[])
            .map_err(|err| SignatureError::InvalidKeyMaterial(format!("{err:?}")))?;
        let public = PublicKey::from_bytes(secret.sk_to_pk().to_bytes().to_vec());

        Ok(Self { secret, public })
    }

    fn parse_public_key(public_key: &PublicKey) -> Option<BlstPublicKey> {
        BlstPublicKey::from_bytes(public_key.as_bytes()).ok()
    }

    fn parse_signature(signature: &[u8]) -> Option<BlstSignature> {
        BlstSignature::from_bytes(signature).ok()
    }
}

impl SignatureScheme for BlsScheme {
    fn public_key(&self) -> PublicKey {
        self.public.clone()
    }

    fn sign(&self, message: &[u8]) -> Signature {
        let signature = self.secret.sign(message, DST, self.public.as_bytes());
        Signature::from_bytes(signature.to_bytes().to_vec())
    }

    fn verify(&self, public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
        let Some(pk) = Self::parse_public_key(public_key) else {
            return false;
        };
        let Some(sig) = Self::parse_signature(signature.as_bytes()) else {
            return false;
        };

        sig.verify(true, message, DST, public_key.as_bytes(), &pk, true) == BLST_ERROR::BLST_SUCCESS
    }

    fn aggregate(&self, signatures: &[Signature]) -> Result<AggregateSignature, SignatureError> {
        if signatures.is_empty() {
            return Err(SignatureError::EmptyAggregation);
        }

        let parsed = signatures
            .iter()
            .map(|sig| Self::parse_signature(sig.as_bytes()))
            .collect::<Option<Vec<_>>>()
            .ok_or(SignatureError::MalformedSignature)?;
        let refs: Vec<&BlstSignature> = parsed.iter().collect();

        let aggregate = BlstAggregate::aggregate(&refs, true)
            .map_err(|_| SignatureError::MalformedSignature)?;

        Ok(AggregateSignature::from_bytes(
            aggregate.to_signature().to_bytes().to_vec(),
        ))
    }

    fn verify_aggregate(
        &self,
        aggregate: &AggregateSignature,
        signers: &[(PublicKey, Vec<u8>)],
    ) -> bool {
        if signers.is_empty() {
            return false;
        }
        let Some(sig) = Self::parse_signature(aggregate.as_bytes()) else {
            return false;
        };

        let Some(keys) = signers
            .iter()
            .map(|(pk, _)| Self::parse_public_key(pk))
            .collect::<Option<Vec<_>>>()
        else {
            return false;
        };
        let key_refs: Vec<&BlstPublicKey> = keys.iter().collect();

        // Augmentation: each signed message is pk || payload.
        let augmented: Vec<Vec<u8>> = signers
            .iter()
            .map(|(pk, message)| {
                let mut bytes = Vec::with_capacity(pk.as_bytes().len() + message.len());
                bytes.extend_from_slice(pk.as_bytes());
                bytes.extend_from_slice(message);
                bytes
            })
            .collect();
        let message_refs: Vec<&[u8]> = augmented.iter().map(Vec::as_slice).collect();

        sig.aggregate_verify(true, &message_refs, DST, &key_refs, true)
            == BLST_ERROR::BLST_SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme(id: u8) -> BlsScheme {
        BlsScheme::from_seed(&[id; SEED_LEN]).unwrap()
    }

    #[test]
    fn sign_and_verify() {
        let signer = scheme(1);
        let message = b"commit:00ff:0";

        let signature = signer.sign(message);
        assert!(signer.verify(&signer.public_key(), message, &signature));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let signer = scheme(1);
        let other = scheme(2);
        let message = b"commit:00ff:0";

        let signature = signer.sign(message);
        assert!(!signer.verify(&other.public_key(), message, &signature));
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let signer = scheme(1);
        let signature = signer.sign(b"prepare:00ff:0");
        assert!(!signer.verify(&signer.public_key(), b"prepare:00ff:1", &signature));
    }

    #[test]
    fn aggregate_over_common_message_verifies() {
        let signers: Vec<BlsScheme> = (0..4).map(scheme).collect();
        let message = b"commit:aabb:0".to_vec();

        let signatures: Vec<Signature> = signers.iter().map(|s| s.sign(&message)).collect();
        let aggregate = signers[0].aggregate(&signatures).unwrap();

        let pairs: Vec<(PublicKey, Vec<u8>)> = signers
            .iter()
            .map(|s| (s.public_key(), message.clone()))
            .collect();
        assert!(signers[0].verify_aggregate(&aggregate, &pairs));
    }

    #[test]
    fn aggregate_fails_against_wrong_signer_set() {
        let signers: Vec<BlsScheme> = (0..3).map(scheme).collect();
        let outsider = scheme(9);
        let message = b"commit:aabb:0".to_vec();

        let signatures: Vec<Signature> = signers.iter().map(|s| s.sign(&message)).collect();
        let aggregate = signers[0].aggregate(&signatures).unwrap();

        let mut pairs: Vec<(PublicKey, Vec<u8>)> = signers
            .iter()
            .map(|s| (s.public_key(), message.clone()))
            .collect();
        pairs[0] = (outsider.public_key(), message.clone());
        assert!(!signers[0].verify_aggregate(&aggregate, &pairs));
    }

    #[test]
    fn empty_aggregation_is_refused() {
        let signer = scheme(1);
        assert!(matches!(
            signer.aggregate(&[]),
            Err(SignatureError::EmptyAggregation)
        ));
    }

    #[test]
    fn signing_is_deterministic() {
        let signer = scheme(7);
        let first = signer.sign(b"payload");
        let second = signer.sign(b"payload");
        assert_eq!(first, second);
    }
}
