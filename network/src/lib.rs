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

//! Wire codec and peer transport.
//!
//! Replicas exchange newline-delimited JSON over plain TCP. Each peer link
//! is an ordered framed duplex stream; cross-peer ordering is never assumed
//! by the state machine. Fan-out is best effort: a dead peer drops its own
//! messages and nobody else's.

pub mod codec;
pub mod listener;
pub mod peer;

pub use codec::{decode_inbound, encode_event, encode_message, CodecError, Inbound};
pub use listener::serve;
pub use peer::{backoff_delay, dial, dial_with_retry, spawn_peer, PeerHandle, DIAL_TIMEOUT};
