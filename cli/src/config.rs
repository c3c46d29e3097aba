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

//! Application config in one place. Everything fatal about a bad
//! configuration is caught here, before any task is spawned.

use crate::args::Args;
use anyhow::{bail, Context as _, Result};
use std::{path::PathBuf, time::Duration};

/// A peer replica and where to dial it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerEntry {
    pub node_id: u32,
    pub address: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub node_id: u32,
    pub port: u16,
    pub total_nodes: u32,
    /// Every replica of the cluster except this one.
    pub peers: Vec<PeerEntry>,
    pub watch_paths: Vec<PathBuf>,
    pub scan_interval: Duration,
    pub database_path: PathBuf,
    pub key_seed: [u8; 32],
    pub mock_signer: bool,
}

/// A peer address must be `host:port` with a non-empty host and a
/// non-zero port. Reachability is the transport's business; the syntax is
/// checked here so a typo is fatal at startup.
fn validate_peer_address(address: &str) -> Result<()> {
    let Some((host, port)) = address.rsplit_once(':') else {
        bail!("`{address}` is not host:port");
    };
    if host.is_empty() {
        bail!("`{address}` has an empty host");
    }
    let port: u16 = port
        .parse()
        .with_context(|| format!("`{address}` has an invalid port"))?;
    if port == 0 {
        bail!("`{address}` has a zero port");
    }
    Ok(())
}

/// Deterministic development seed for a replica's BLS key.
pub fn default_key_seed(node_id: u32) -> [u8; 32] {
    let mut seed = [0u8; 32];
    let tag = format!("node_{node_id}_key");
    let bytes = tag.as_bytes();
    seed[..bytes.len().min(32)].copy_from_slice(&bytes[..bytes.len().min(32)]);
    seed
}

impl TryFrom<Args> for Config {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> Result<Self> {
        if args.total_nodes < 1 {
            bail!("TOTAL_NODES must be at least 1");
        }
        if args.node_id >= args.total_nodes {
            bail!(
                "NODE_ID {} out of range for {} replicas",
                args.node_id,
                args.total_nodes
            );
        }
        if !args.use_simulated_tpm {
            bail!("hardware TPM support is not available; set USE_SIMULATED_TPM=true");
        }
        if args.mock_signer && args.total_nodes > 1 {
            bail!("the keyed-hash signer is only valid for a single-node cluster");
        }

        let peers = if args.total_nodes > 1 {
            if args.peers.len() != args.total_nodes as usize {
                bail!(
                    "PEERS must list one address per replica ({} expected, {} given)",
                    args.total_nodes,
                    args.peers.len()
                );
            }

            let mut peers = Vec::new();
            for (id, address) in args.peers.iter().enumerate() {
                let address = address
                    .trim()
                    .strip_prefix("tcp://")
                    .unwrap_or(address.trim())
                    .to_string();
                validate_peer_address(&address)
                    .with_context(|| format!("invalid peer address for replica {id}"))?;
                if id as u32 != args.node_id {
                    peers.push(PeerEntry {
                        node_id: id as u32,
                        address,
                    });
                }
            }
            peers
        } else {
            Vec::new()
        };

        let key_seed = match &args.key_seed {
            Some(hex_seed) => {
                let bytes = hex::decode(hex_seed.strip_prefix("0x").unwrap_or(hex_seed))
                    .context("KEY_SEED is not valid hex")?;
                bytes
                    .try_into()
                    .map_err(|bytes: Vec<u8>| {
                        anyhow::anyhow!("KEY_SEED must be 32 bytes, got {}", bytes.len())
                    })?
            }
            None => default_key_seed(args.node_id),
        };

        let database_path = args
            .database_url
            .unwrap_or_else(|| PathBuf::from(format!("./data/node{}", args.node_id)));

        Ok(Config {
            node_id: args.node_id,
            port: args.port,
            total_nodes: args.total_nodes,
            peers,
            watch_paths: args.watch_paths,
            scan_interval: Duration::from_secs(args.scan_interval.max(1)),
            database_path,
            key_seed,
            mock_signer: args.mock_signer,
        })
    }
}
