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

//! On-wire JSON encoding.
//!
//! Phase messages are flat JSON objects (`phase`, `digest`, `view`,
//! `sequence`, `node_id`, `signature`, `timestamp`, `public_key`); ingress
//! events carry a `"type": "integrity_event"` tag. Unknown fields are
//! ignored, missing required fields reject the frame.

use serde::{Deserialize, Serialize};
use sfim_common::{IntegrityEvent, PhaseMessage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported message type `{0}`")]
    UnsupportedType(String),
}

/// Everything a node accepts on its listener.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    Phase(PhaseMessage),
    Integrity(IntegrityEvent),
}

/// Tagged envelope for non-consensus traffic on the shared listener.
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Tagged {
    IntegrityEvent(IntegrityEvent),
}

/// Decode one frame. Frames carrying a `type` tag are dispatched through
/// the tagged envelope; everything else must be a phase message.
pub fn decode_inbound(frame: &str) -> Result<Inbound, CodecError> {
    let value: serde_json::Value = serde_json::from_str(frame)?;

    if let Some(tag) = value.get("type") {
        if tag == "integrity_event" {
            let Tagged::IntegrityEvent(event) = serde_json::from_value(value)?;
            return Ok(Inbound::Integrity(event));
        }
        return Err(CodecError::UnsupportedType(
            tag.as_str().unwrap_or_default().to_string(),
        ));
    }

    Ok(Inbound::Phase(serde_json::from_value(value)?))
}

/// Encode a phase message as one frame (no trailing newline; the framed
/// codec appends it).
pub fn encode_message(message: &PhaseMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}

/// Encode an integrity event as one tagged frame.
pub fn encode_event(event: &IntegrityEvent) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&Tagged::IntegrityEvent(event.clone()))?)
}
