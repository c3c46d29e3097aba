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

//! Per-digest agreement bookkeeping.

use sfim_common::PhaseMessage;
use std::collections::BTreeMap;

/// State of one agreement instance, keyed by digest within a view.
///
/// `prepared` and `committed` latch once and never reset. `prepare_sent`
/// and `commit_sent` enforce the at-most-one-vote-per-phase rule for the
/// local replica.
pub(crate) struct AgreementInstance {
    pub sequence: u64,
    /// PREPARE votes keyed by sender, so duplicates cannot advance the
    /// tally.
    pub prepares: BTreeMap<u32, PhaseMessage>,
    /// COMMIT votes keyed by sender.
    pub commits: BTreeMap<u32, PhaseMessage>,
    pub prepared: bool,
    pub committed: bool,
    pub prepare_sent: bool,
    pub commit_sent: bool,
    /// Monotone creation stamp used by the retention sweep.
    pub created: u64,
}

impl AgreementInstance {
    pub fn new(sequence: u64, created: u64) -> Self {
        Self {
            sequence,
            prepares: BTreeMap::new(),
            commits: BTreeMap::new(),
            prepared: false,
            committed: false,
            prepare_sent: false,
            commit_sent: false,
            created,
        }
    }

    /// Record a PREPARE vote; false if this sender already voted.
    pub fn insert_prepare(&mut self, message: PhaseMessage) -> bool {
        match self.prepares.entry(message.node_id) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(message);
                true
            }
        }
    }

    /// Record a COMMIT vote; false if this sender already voted.
    pub fn insert_commit(&mut self, message: PhaseMessage) -> bool {
        match self.commits.entry(message.node_id) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(message);
                true
            }
        }
    }
}
