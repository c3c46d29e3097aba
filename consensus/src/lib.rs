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

//! Three-phase BFT agreement over integrity digests.
//!
//! A [`Replica`] tallies pre-prepare/prepare/commit votes per digest and
//! delivers each committed digest exactly once, with the aggregated commit
//! signatures, to a [`CommitSink`]. All handlers run on a single consumer
//! of the node's inbound queue, so no two of them ever race on the same
//! agreement instance.

mod instance;
mod replica;
mod sink;

#[cfg(test)]
mod tests;

pub use replica::{Replica, ReplicaContext};
pub use sink::CommitSink;
