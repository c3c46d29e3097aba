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

//! Bridge from agreement to external persistence.

use anyhow::Result;
use async_trait::async_trait;
use sfim_common::CommittedEntry;

/// Receiver of committed ledger entries.
///
/// Implementations must be idempotent in the entry digest: re-delivery of
/// an already persisted digest is a no-op. A sink failure is logged by the
/// replica and never unlatches the committed instance.
#[async_trait]
pub trait CommitSink: Send + Sync {
    async fn on_commit(&self, entry: &CommittedEntry) -> Result<()>;
}
