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

//! SFIM common types shared across the node crates.

pub mod digest;
pub mod event;
pub mod hexfmt;
pub mod message;
pub mod time;

pub use digest::{Digest, DigestError, DIGEST_LEN};
pub use event::{CommittedEntry, FileMetadata, IntegrityEvent};
pub use message::{vote_payload, Phase, PhaseMessage};
pub use time::{Clock, SystemClock};
