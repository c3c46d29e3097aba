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

//! File agent: the event source of the ledger.
//!
//! Scans the watch paths on an interval, SHA-512-hashes every regular
//! file, and submits an integrity event to the node whenever the Merkle
//! root over the ordered file hashes changes. Files are walked in sorted
//! path order so the root is stable between scans of an unchanged tree.

use anyhow::{Context as _, Result};
use futures::SinkExt;
use sfim_common::{Clock, Digest, FileMetadata, IntegrityEvent, SystemClock};
use sfim_merkle::merkle_root;
use sfim_network::{codec, peer};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::{Duration, UNIX_EPOCH},
};
use tokio_util::codec::{Framed, LinesCodec};

/// Connect attempts before the agent gives up on the node.
const INGRESS_DIAL_ATTEMPTS: u32 = 3;

pub struct FileMonitor {
    watch_paths: Vec<PathBuf>,
    last_root: Option<Digest>,
}

impl FileMonitor {
    pub fn new(watch_paths: Vec<PathBuf>) -> Result<Self> {
        anyhow::ensure!(!watch_paths.is_empty(), "no watch paths configured");

        for path in &watch_paths {
            fs::create_dir_all(path)
                .with_context(|| format!("cannot create watch path {}", path.display()))?;
            log::info!("🔍 watching {}", path.display());
        }

        Ok(Self {
            watch_paths,
            last_root: None,
        })
    }

    /// Hash every file under the watch paths, in sorted path order.
    pub fn scan(&self) -> Result<(Vec<Digest>, BTreeMap<String, FileMetadata>)> {
        let mut files = Vec::new();
        for watch_path in &self.watch_paths {
            collect_files(watch_path, &mut files)?;
        }
        files.sort();

        let mut hashes = Vec::with_capacity(files.len());
        let mut metadata = BTreeMap::new();

        for (watch_path, file_path) in &files {
            let contents = match fs::read(file_path) {
                Ok(contents) => contents,
                Err(err) => {
                    log::warn!("skipping unreadable file {}: {err}", file_path.display());
                    continue;
                }
            };
            let hash = Digest::sha512(&contents);
            hashes.push(hash);

            let stat = fs::metadata(file_path)?;
            let mtime = stat
                .modified()
                .ok()
                .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or(0);
            let relative_path = file_path
                .strip_prefix(watch_path)
                .unwrap_or(file_path)
                .display()
                .to_string();

            metadata.insert(
                file_path.display().to_string(),
                FileMetadata {
                    hash,
                    size: stat.len(),
                    mtime,
                    relative_path,
                },
            );
        }

        Ok((hashes, metadata))
    }

    /// Scan and report an integrity event if the root moved since the last
    /// scan. An empty tree never produces an event.
    pub fn changed_root(&mut self) -> Result<Option<IntegrityEvent>> {
        let (hashes, metadata) = self.scan()?;
        let Some(root) = merkle_root(&hashes).digest() else {
            log::debug!("no files under the watch paths");
            return Ok(None);
        };

        if self.last_root == Some(root) {
            log::debug!("root unchanged: {root}");
            return Ok(None);
        }
        self.last_root = Some(root);
        log::info!("🌳 new root {root} over {} files", hashes.len());

        Ok(Some(IntegrityEvent {
            merkle_root: root,
            file_count: metadata.len() as u64,
            timestamp_ms: SystemClock.now_ms(),
            metadata,
        }))
    }
}

fn collect_files(watch_path: &Path, found: &mut Vec<(PathBuf, PathBuf)>) -> Result<()> {
    fn visit(root: &Path, dir: &Path, found: &mut Vec<(PathBuf, PathBuf)>) -> Result<()> {
        for entry in fs::read_dir(dir)
            .with_context(|| format!("cannot read directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_dir() {
                visit(root, &path, found)?;
            } else if path.is_file() {
                found.push((root.to_path_buf(), path));
            }
        }
        Ok(())
    }

    visit(watch_path, watch_path, found)
}

/// Run the agent against the node at `node_addr` until the link dies for
/// good.
pub async fn run(node_addr: String, watch_paths: Vec<PathBuf>, scan_interval: Duration) -> Result<()> {
    let mut monitor = FileMonitor::new(watch_paths)?;
    log::info!(
        "🚀 agent starting, node {node_addr}, scan interval {}s",
        scan_interval.as_secs()
    );

    loop {
        let stream = peer::dial_with_retry(&node_addr, INGRESS_DIAL_ATTEMPTS)
            .await
            .context("node unreachable, agent stopping")?;
        log::info!("🔗 connected to node at {node_addr}");
        let mut framed = Framed::new(stream, LinesCodec::new());

        loop {
            match monitor.changed_root() {
                Ok(Some(event)) => {
                    let frame = codec::encode_event(&event)?;
                    if let Err(err) = framed.send(frame).await {
                        log::warn!("send to node failed: {err}, reconnecting");
                        break;
                    }
                    log::info!(
                        "📡 submitted integrity event {} ({} files)",
                        event.merkle_root,
                        event.file_count
                    );
                }
                Ok(None) => {}
                Err(err) => log::error!("scan failed: {err:#}"),
            }

            tokio::time::sleep(scan_interval).await;
        }
    }
}
