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

//! CLI arguments in one place. Every option can also come from its
//! environment variable.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Clone, Debug, Parser)]
#[command(name = "sfim", version, about = "Replicated file-integrity ledger node")]
pub struct Args {
    /// Identity of this replica within the cluster.
    #[arg(long, env = "NODE_ID", default_value_t = 0)]
    pub node_id: u32,

    /// Listen port for peer and agent connections.
    #[arg(long, env = "PORT", default_value_t = 7000)]
    pub port: u16,

    /// Number of replicas in the cluster.
    #[arg(long, env = "TOTAL_NODES", default_value_t = 1)]
    pub total_nodes: u32,

    /// Comma-separated peer addresses, one per replica, indexed by node id.
    #[arg(long, env = "PEERS", value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Comma-separated directories watched by the file agent.
    #[arg(long, env = "WATCH_PATHS", value_delimiter = ',')]
    pub watch_paths: Vec<PathBuf>,

    /// Seconds between file scans.
    #[arg(long, env = "SCAN_INTERVAL", default_value_t = 30)]
    pub scan_interval: u64,

    /// Use the simulated TPM (hardware TPMs are not supported).
    #[arg(
        long,
        env = "USE_SIMULATED_TPM",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub use_simulated_tpm: bool,

    /// Database directory.
    #[arg(long = "database-url", env = "DATABASE_URL")]
    pub database_url: Option<PathBuf>,

    /// 32-byte hex seed for the node key. Defaults to a deterministic
    /// per-node development seed.
    #[arg(long, env = "KEY_SEED")]
    pub key_seed: Option<String>,

    /// Use the keyed-hash signature scheme instead of BLS. Only valid for
    /// a single-node cluster.
    #[arg(long)]
    pub mock_signer: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Run the file agent: scan the watch paths and submit Merkle roots
    /// to a node.
    Agent {
        /// Address of the node ingress.
        #[arg(long, env = "NODE_ADDR", default_value = "127.0.0.1:7000")]
        node_addr: String,
    },
}
