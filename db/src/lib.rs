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

//! RocksDB-backed persistence for the integrity ledger.
//!
//! Values are JSON records under prefix-namespaced keys:
//! `event:<root hex>` for ledger entries, `file:<hash hex>` for
//! file-to-root bindings, `quote:<node>:<stamp>` for attestation quotes
//! and `audit:<stamp>` for the audit log. The database is the node's
//! [`CommitSink`]: committed entries are written here and nowhere else.

mod records;

pub use records::{AuditRecord, EventRecord, FileRecord, QuoteRecord, RecordStatus};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use rocksdb::{Direction, IteratorMode, Options, DB};
use sfim_attest::{Quote, TrustLevel};
use sfim_common::{Clock, CommittedEntry, Digest, IntegrityEvent};
use sfim_consensus::CommitSink;
use std::{
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

const EVENT_PREFIX: &str = "event:";
const FILE_PREFIX: &str = "file:";
const QUOTE_PREFIX: &str = "quote:";
const AUDIT_PREFIX: &str = "audit:";

pub struct Database {
    inner: Arc<DB>,
    node_id: u32,
    clock: Arc<dyn Clock>,
    /// Tie-breaker for records written within one millisecond.
    write_counter: AtomicU64,
}

impl Database {
    pub fn open(path: &Path, node_id: u32, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let inner = DB::open(&options, path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;

        Ok(Self {
            inner: Arc::new(inner),
            node_id,
            clock,
            write_counter: AtomicU64::new(0),
        })
    }

    fn event_key(root: &Digest) -> Vec<u8> {
        format!("{EVENT_PREFIX}{root}").into_bytes()
    }

    fn file_key(file_hash: &Digest) -> Vec<u8> {
        format!("{FILE_PREFIX}{file_hash}").into_bytes()
    }

    fn stamp(&self) -> String {
        let counter = self.write_counter.fetch_add(1, Ordering::Relaxed);
        format!("{:016x}{:08x}", self.clock.now_ms(), counter)
    }

    fn put<T: serde::Serialize>(&self, key: &[u8], value: &T) -> Result<()> {
        self.inner
            .put(key, serde_json::to_vec(value)?)
            .context("database write failed")
    }

    fn get<T: serde::de::DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        let Some(bytes) = self.inner.get(key).context("database read failed")? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn scan_prefix<T: serde::de::DeserializeOwned>(&self, prefix: &str) -> Result<Vec<(Vec<u8>, T)>> {
        let mut found = Vec::new();
        let iterator = self
            .inner
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));

        for item in iterator {
            let (key, value) = item.context("database iteration failed")?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            found.push((key.to_vec(), serde_json::from_slice(&value)?));
        }

        Ok(found)
    }

    /// Record a freshly ingested integrity event and its file bindings.
    /// A root that already committed is left untouched.
    pub fn record_pending_event(&self, event: &IntegrityEvent) -> Result<()> {
        let key = Self::event_key(&event.merkle_root);
        if let Some(existing) = self.get::<EventRecord>(&key)? {
            if existing.status == RecordStatus::Committed {
                return Ok(());
            }
        }

        self.put(
            &key,
            &EventRecord {
                merkle_root: event.merkle_root,
                aggregated_signature: None,
                node_id: self.node_id,
                consensus_round: 0,
                status: RecordStatus::Pending,
                file_count: event.file_count,
                timestamp_ms: event.timestamp_ms,
            },
        )?;

        for metadata in event.metadata.values() {
            self.put(
                &Self::file_key(&metadata.hash),
                &FileRecord {
                    file_hash: metadata.hash,
                    merkle_root: event.merkle_root,
                    size: metadata.size,
                    mtime: metadata.mtime,
                    relative_path: metadata.relative_path.clone(),
                    consensus_round: 0,
                    status: RecordStatus::Pending,
                },
            )?;
        }

        Ok(())
    }

    pub fn event(&self, root: &Digest) -> Result<Option<EventRecord>> {
        self.get(&Self::event_key(root))
    }

    pub fn file(&self, file_hash: &Digest) -> Result<Option<FileRecord>> {
        self.get(&Self::file_key(file_hash))
    }

    /// All file bindings pointing at `root`.
    pub fn files_for_root(&self, root: &Digest) -> Result<Vec<FileRecord>> {
        Ok(self
            .scan_prefix::<FileRecord>(FILE_PREFIX)?
            .into_iter()
            .map(|(_, record)| record)
            .filter(|record| &record.merkle_root == root)
            .collect())
    }

    pub fn record_audit(
        &self,
        event_type: &str,
        message: String,
        details: Option<serde_json::Value>,
    ) -> Result<()> {
        let key = format!("{AUDIT_PREFIX}{}", self.stamp()).into_bytes();
        self.put(
            &key,
            &AuditRecord {
                event_type: event_type.to_string(),
                node_id: Some(self.node_id),
                message,
                details,
                severity: "info".to_string(),
                timestamp_ms: self.clock.now_ms(),
            },
        )
    }

    pub fn audit_entries(&self) -> Result<Vec<AuditRecord>> {
        Ok(self
            .scan_prefix::<AuditRecord>(AUDIT_PREFIX)?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    pub fn record_quote(&self, quote: &Quote, trust_level: TrustLevel) -> Result<()> {
        let key = format!("{QUOTE_PREFIX}{:08x}:{}", self.node_id, self.stamp()).into_bytes();
        self.put(
            &key,
            &QuoteRecord {
                node_id: self.node_id,
                quote: quote.clone(),
                trust_level,
                timestamp_ms: self.clock.now_ms(),
            },
        )
    }

    pub fn quotes(&self, node_id: u32) -> Result<Vec<QuoteRecord>> {
        let prefix = format!("{QUOTE_PREFIX}{node_id:08x}:");
        Ok(self
            .scan_prefix::<QuoteRecord>(&prefix)?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    /// Keep only the most recent `keep` quotes of `node_id`.
    pub fn prune_quotes(&self, node_id: u32, keep: usize) -> Result<()> {
        let prefix = format!("{QUOTE_PREFIX}{node_id:08x}:");
        let found = self.scan_prefix::<QuoteRecord>(&prefix)?;
        if found.len() <= keep {
            return Ok(());
        }

        // Keys are stamp-ordered, so the oldest come first.
        let excess = found.len() - keep;
        for (key, _) in found.into_iter().take(excess) {
            self.inner.delete(&key).context("database delete failed")?;
        }
        log::debug!("pruned {excess} quotes of node {node_id}");
        Ok(())
    }
}

#[async_trait]
impl CommitSink for Database {
    async fn on_commit(&self, entry: &CommittedEntry) -> Result<()> {
        let key = Self::event_key(&entry.digest);

        let existing: Option<EventRecord> = self.get(&key)?;
        if let Some(record) = &existing {
            if record.status == RecordStatus::Committed {
                // Idempotent in the digest: nothing left to do.
                return Ok(());
            }
        }

        let (file_count, timestamp_ms) = existing
            .map(|record| (record.file_count, record.timestamp_ms))
            .unwrap_or((0, self.clock.now_ms()));

        self.put(
            &key,
            &EventRecord {
                merkle_root: entry.digest,
                aggregated_signature: Some(entry.aggregated_signature.clone()),
                node_id: self.node_id,
                consensus_round: entry.sequence,
                status: RecordStatus::Committed,
                file_count,
                timestamp_ms,
            },
        )?;

        for mut record in self.files_for_root(&entry.digest)? {
            record.status = RecordStatus::Committed;
            record.consensus_round = entry.sequence;
            self.put(&Self::file_key(&record.file_hash), &record)?;
        }

        self.record_audit(
            "consensus",
            format!("consensus reached for digest {}", entry.digest),
            Some(serde_json::json!({
                "digest": entry.digest.to_hex(),
                "view": entry.view,
                "consensus_round": entry.sequence,
                "contributors": entry.contributors,
            })),
        )?;

        log::info!(
            "persisted committed digest {} at round {}",
            entry.digest,
            entry.sequence
        );
        Ok(())
    }
}
