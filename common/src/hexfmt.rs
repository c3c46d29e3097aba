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

//! `#[serde(with = ...)]` helpers for hex-encoded byte fields.

/// Hex serde for `Vec<u8>` fields.
pub mod bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        hex::encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex_string = String::deserialize(deserializer)?;
        let hex_string = hex_string.strip_prefix("0x").unwrap_or(&hex_string);
        hex::decode(hex_string).map_err(serde::de::Error::custom)
    }
}

/// Hex serde for fixed-size `[u8; N]` fields.
pub mod array {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        hex::encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex_string = String::deserialize(deserializer)?;
        let hex_string = hex_string.strip_prefix("0x").unwrap_or(&hex_string);
        let bytes = hex::decode(hex_string).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| {
                serde::de::Error::custom(format!("expected {N} bytes, got {}", bytes.len()))
            })
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        #[serde(with = "super::bytes")]
        blob: Vec<u8>,
        #[serde(with = "super::array")]
        fixed: [u8; 4],
    }

    #[test]
    fn roundtrip() {
        let sample = Sample {
            blob: vec![0xde, 0xad],
            fixed: [1, 2, 3, 4],
        };
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, "{\"blob\":\"dead\",\"fixed\":\"01020304\"}");
        assert_eq!(serde_json::from_str::<Sample>(&json).unwrap(), sample);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let err = serde_json::from_str::<Sample>("{\"blob\":\"\",\"fixed\":\"0102\"}");
        assert!(err.is_err());
    }
}
