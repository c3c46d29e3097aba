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

//! Vote signing for SFIM replicas.
//!
//! The agreement state machine is polymorphic over a [`SignatureScheme`]
//! capability. Two implementations exist: the canonical BLS12-381
//! aggregatable scheme ([`bls::BlsScheme`]) and a keyed-hash fallback
//! ([`mock::MockScheme`]) that is only acceptable for single-node setups.

pub mod bls;
pub mod mock;

pub use bls::BlsScheme;
pub use mock::MockScheme;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("empty aggregation is invalid")]
    EmptyAggregation,
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
    #[error("malformed signature bytes")]
    MalformedSignature,
}

macro_rules! hex_bytes_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            derive_more::Debug,
            derive_more::Display,
        )]
        #[debug("{}({})", stringify!($name), hex::encode(&self.0))]
        #[display("{}", hex::encode(&self.0))]
        pub struct $name(Vec<u8>);

        impl $name {
            pub fn from_bytes(bytes: Vec<u8>) -> Self {
                Self(bytes)
            }

            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                hex::decode(s).map(Self)
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(&self.0)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serde::Serialize::serialize(&hex::encode(&self.0), serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let hex_string: String = serde::Deserialize::deserialize(deserializer)?;
                Self::from_hex(&hex_string)
                    .map_err(|_| serde::de::Error::custom("invalid hex string"))
            }
        }
    };
}

hex_bytes_newtype! {
    /// A scheme-specific public key (48-byte compressed G1 point for BLS).
    PublicKey
}

hex_bytes_newtype! {
    /// A single vote signature (96-byte compressed G2 point for BLS).
    Signature
}

hex_bytes_newtype! {
    /// An aggregation of commit-vote signatures into one group element.
    AggregateSignature
}

/// Signing capability handed to the agreement state machine.
///
/// Implementations must be deterministic for a fixed key: signing the same
/// message twice yields the same signature.
pub trait SignatureScheme: Send + Sync {
    /// Public key of the local signer.
    fn public_key(&self) -> PublicKey;

    /// Sign an arbitrary message.
    fn sign(&self, message: &[u8]) -> Signature;

    /// Verify `signature` over `message` under `public_key`.
    fn verify(&self, public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool;

    /// Combine vote signatures into a single aggregate.
    fn aggregate(&self, signatures: &[Signature]) -> Result<AggregateSignature, SignatureError>;

    /// Verify an aggregate against the exact set of `(public key, message)`
    /// pairs that contributed to it.
    fn verify_aggregate(
        &self,
        aggregate: &AggregateSignature,
        signers: &[(PublicKey, Vec<u8>)],
    ) -> bool;

    /// Whether this scheme is a degraded (non-aggregatable-by-construction)
    /// fallback. Degraded schemes are refused once peers are configured.
    fn degraded(&self) -> bool {
        false
    }
}
