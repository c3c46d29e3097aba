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

//! The replica state machine.
//!
//! Message flow: the primary of the current view proposes a digest with a
//! PRE_PREPARE; every replica answers with a PREPARE; Q distinct PREPAREs
//! latch `prepared` and trigger one COMMIT; Q distinct COMMITs latch
//! `committed`, aggregate the commit signatures and deliver the entry to
//! the sink. Outbound votes leave through a channel handle owned by the
//! supervisor; a replica's own votes are applied locally, never looped
//! over the wire.

use crate::{instance::AgreementInstance, sink::CommitSink};
use anyhow::{bail, Result};
use sfim_common::{vote_payload, Clock, CommittedEntry, Digest, Phase, PhaseMessage};
use sfim_signer::{PublicKey, SignatureScheme};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tokio::sync::mpsc;

/// Everything a replica needs from its environment, passed in explicitly.
pub struct ReplicaContext {
    pub node_id: u32,
    pub total_nodes: u32,
    /// Public keys of every replica in the cluster, keyed by node id.
    pub validators: BTreeMap<u32, PublicKey>,
    pub scheme: Arc<dyn SignatureScheme>,
    pub sink: Arc<dyn CommitSink>,
    pub clock: Arc<dyn Clock>,
    /// Outbound votes, fanned out to peers by the supervisor.
    pub outbound: mpsc::UnboundedSender<PhaseMessage>,
}

pub struct Replica {
    node_id: u32,
    total_nodes: u32,
    validators: BTreeMap<u32, PublicKey>,
    scheme: Arc<dyn SignatureScheme>,
    sink: Arc<dyn CommitSink>,
    clock: Arc<dyn Clock>,
    outbound: mpsc::UnboundedSender<PhaseMessage>,

    view: u64,
    sequence: u64,
    /// Attestation gate: while false, no PREPARE or COMMIT leaves this
    /// node. Tallying and commit delivery continue.
    participation: bool,
    instances: HashMap<Digest, AgreementInstance>,
    /// Digest -> sequence at which it committed. Later messages at or
    /// below that sequence are stale.
    committed: HashMap<Digest, u64>,
    created_counter: u64,
}

impl Replica {
    pub fn new(context: ReplicaContext) -> Result<Self> {
        let ReplicaContext {
            node_id,
            total_nodes,
            validators,
            scheme,
            sink,
            clock,
            outbound,
        } = context;

        if total_nodes < 1 {
            bail!("cluster needs at least one replica");
        }
        if node_id >= total_nodes {
            bail!("node id {node_id} out of range for {total_nodes} replicas");
        }
        if scheme.degraded() && total_nodes > 1 {
            bail!("the keyed-hash signature scheme cannot be used with peers configured");
        }
        for id in 0..total_nodes {
            if !validators.contains_key(&id) {
                bail!("no public key registered for replica {id}");
            }
        }
        if validators.get(&node_id) != Some(&scheme.public_key()) {
            bail!("local signer does not match the registered public key for node {node_id}");
        }

        Ok(Self {
            node_id,
            total_nodes,
            validators,
            scheme,
            sink,
            clock,
            outbound,
            view: 0,
            sequence: 0,
            participation: true,
            instances: HashMap::new(),
            committed: HashMap::new(),
            created_counter: 0,
        })
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    pub fn view(&self) -> u64 {
        self.view
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The proposer of `view`.
    pub fn primary(&self, view: u64) -> u32 {
        (view % self.total_nodes as u64) as u32
    }

    pub fn is_primary(&self) -> bool {
        self.primary(self.view) == self.node_id
    }

    /// Votes needed to close a phase: ⌊2(N−1)/3⌋ + 1, or 1 for a single
    /// node.
    pub fn quorum(&self) -> usize {
        if self.total_nodes == 1 {
            1
        } else {
            2 * ((self.total_nodes as usize - 1) / 3) + 1
        }
    }

    /// Flip the attestation gate.
    pub fn set_participation(&mut self, participate: bool) {
        if self.participation != participate {
            log::info!(
                "participation {} for node {}",
                if participate { "enabled" } else { "suspended" },
                self.node_id
            );
        }
        self.participation = participate;
    }

    pub fn participation(&self) -> bool {
        self.participation
    }

    pub fn prepare_count(&self, digest: &Digest) -> usize {
        self.instances
            .get(digest)
            .map(|instance| instance.prepares.len())
            .unwrap_or(0)
    }

    pub fn commit_count(&self, digest: &Digest) -> usize {
        self.instances
            .get(digest)
            .map(|instance| instance.commits.len())
            .unwrap_or(0)
    }

    pub fn is_prepared(&self, digest: &Digest) -> bool {
        self.instances
            .get(digest)
            .map(|instance| instance.prepared)
            .unwrap_or(false)
    }

    pub fn is_committed(&self, digest: &Digest) -> bool {
        self.committed.contains_key(digest)
            || self
                .instances
                .get(digest)
                .map(|instance| instance.committed)
                .unwrap_or(false)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Drop the oldest instances beyond `keep`. Latched results stay in
    /// the committed map, so stale-message suppression survives the sweep.
    pub fn prune_instances(&mut self, keep: usize) {
        if self.instances.len() <= keep {
            return;
        }

        let mut stamps: Vec<(u64, Digest)> = self
            .instances
            .iter()
            .map(|(digest, instance)| (instance.created, *digest))
            .collect();
        stamps.sort_unstable();

        let excess = stamps.len() - keep;
        for (_, digest) in stamps.into_iter().take(excess) {
            self.instances.remove(&digest);
        }
        log::debug!("pruned {excess} agreement instances");
    }

    /// Propose a digest for agreement. Only the primary of the current
    /// view may propose; a single-node cluster commits immediately without
    /// touching the wire.
    pub async fn propose(&mut self, digest: Digest) -> Result<()> {
        if !self.participation {
            bail!("node {} is not attested, refusing to propose", self.node_id);
        }

        if self.total_nodes == 1 {
            if self.committed.contains_key(&digest) {
                log::debug!("digest {digest} already committed, ignoring proposal");
                return Ok(());
            }

            self.sequence += 1;
            let payload = vote_payload(Phase::Commit, &digest, self.view);
            let signature = self.scheme.sign(&payload);
            let aggregated_signature = self.scheme.aggregate(std::slice::from_ref(&signature))?;

            let entry = CommittedEntry {
                view: self.view,
                sequence: self.sequence,
                digest,
                aggregated_signature,
                contributors: vec![self.node_id],
            };

            self.committed.insert(digest, self.sequence);
            log::info!("single-node commit of digest {digest}");
            self.deliver(entry).await;
            return Ok(());
        }

        if !self.is_primary() {
            bail!(
                "node {} is not the primary of view {} (primary is {})",
                self.node_id,
                self.view,
                self.primary(self.view)
            );
        }

        self.sequence += 1;
        let message = self.vote(Phase::PrePrepare, digest, self.sequence);
        log::info!(
            "proposing digest {digest} at view {} sequence {}",
            self.view,
            self.sequence
        );
        self.broadcast(&message);
        self.apply_pre_prepare(message).await;
        Ok(())
    }

    /// Entry point for every inbound phase message. Never fails the caller:
    /// invalid messages are dropped with at most a log line.
    pub async fn handle_message(&mut self, message: PhaseMessage) {
        if message.view != self.view {
            log::debug!(
                "dropping {} for view {} (current view {})",
                message.phase,
                message.view,
                self.view
            );
            return;
        }

        let Some(expected_key) = self.validators.get(&message.node_id) else {
            log::warn!("dropping {} from unknown sender {}", message.phase, message.node_id);
            return;
        };

        if let Some(&committed_sequence) = self.committed.get(&message.digest) {
            if message.sequence <= committed_sequence {
                log::debug!("dropping stale {} for committed digest {}", message.phase, message.digest);
                return;
            }
        }

        if expected_key != &message.public_key {
            log::warn!(
                "dropping {} from node {}: attached key does not match the registry",
                message.phase,
                message.node_id
            );
            return;
        }

        if !self
            .scheme
            .verify(expected_key, &message.signing_payload(), &message.signature)
        {
            log::warn!(
                "dropping {} from node {}: invalid signature",
                message.phase,
                message.node_id
            );
            return;
        }

        match message.phase {
            Phase::PrePrepare => self.apply_pre_prepare(message).await,
            Phase::Prepare => self.apply_prepare(message).await,
            Phase::Commit => self.apply_commit(message).await,
        }
    }

    async fn apply_pre_prepare(&mut self, message: PhaseMessage) {
        if message.node_id != self.primary(message.view) {
            // Protocol violation, dropped without ceremony.
            return;
        }

        let digest = message.digest;
        let sequence = message.sequence;
        {
            let instance = self.instance_mut(digest, sequence);
            if instance.prepare_sent {
                return;
            }
        }

        if !self.participation {
            log::debug!("suppressing PREPARE for {digest}: participation suspended");
            return;
        }

        self.instance_mut(digest, sequence).prepare_sent = true;
        let prepare = self.vote(Phase::Prepare, digest, sequence);
        log::info!("sending PREPARE for digest {digest}");
        self.broadcast(&prepare);
        self.apply_prepare(prepare).await;
    }

    async fn apply_prepare(&mut self, message: PhaseMessage) {
        let digest = message.digest;
        let sequence = message.sequence;
        let quorum = self.quorum();

        let newly_prepared = {
            let instance = self.instance_mut(digest, sequence);
            if !instance.insert_prepare(message) {
                return;
            }
            if instance.prepares.len() >= quorum && !instance.prepared {
                instance.prepared = true;
                true
            } else {
                false
            }
        };

        if !newly_prepared {
            return;
        }
        log::info!("digest {digest} prepared");

        if !self.participation {
            log::debug!("suppressing COMMIT for {digest}: participation suspended");
            return;
        }
        {
            let instance = self.instance_mut(digest, sequence);
            if instance.commit_sent {
                return;
            }
            instance.commit_sent = true;
        }

        let commit = self.vote(Phase::Commit, digest, sequence);
        log::info!("sending COMMIT for digest {digest}");
        self.broadcast(&commit);
        self.apply_commit(commit).await;
    }

    async fn apply_commit(&mut self, message: PhaseMessage) {
        let digest = message.digest;
        let sequence = message.sequence;
        let quorum = self.quorum();

        let tally = {
            let instance = self.instance_mut(digest, sequence);
            if !instance.insert_commit(message) {
                return;
            }
            if instance.commits.len() >= quorum && !instance.committed {
                instance.committed = true;
                // A committed instance is by definition prepared.
                instance.prepared = true;
                let contributors: Vec<u32> = instance.commits.keys().copied().collect();
                let signatures: Vec<_> = instance
                    .commits
                    .values()
                    .map(|vote| vote.signature.clone())
                    .collect();
                Some((contributors, signatures))
            } else {
                None
            }
        };

        let Some((contributors, signatures)) = tally else {
            return;
        };

        let aggregated_signature = match self.scheme.aggregate(&signatures) {
            Ok(aggregated) => aggregated,
            Err(err) => {
                log::error!("failed to aggregate commit signatures for {digest}: {err}");
                return;
            }
        };

        self.committed.insert(digest, sequence);
        log::info!(
            "consensus reached for digest {digest} with {} contributors",
            contributors.len()
        );

        let entry = CommittedEntry {
            view: self.view,
            sequence,
            digest,
            aggregated_signature,
            contributors,
        };
        self.deliver(entry).await;
    }

    async fn deliver(&self, entry: CommittedEntry) {
        if let Err(err) = self.sink.on_commit(&entry).await {
            // The commit stays latched; persistence gets to catch up on
            // its own schedule.
            log::error!("commit sink failed for digest {}: {err:#}", entry.digest);
        }
    }

    fn instance_mut(&mut self, digest: Digest, sequence: u64) -> &mut AgreementInstance {
        let created = &mut self.created_counter;
        self.instances.entry(digest).or_insert_with(|| {
            *created += 1;
            AgreementInstance::new(sequence, *created)
        })
    }

    fn vote(&self, phase: Phase, digest: Digest, sequence: u64) -> PhaseMessage {
        let payload = vote_payload(phase, &digest, self.view);
        PhaseMessage {
            phase,
            digest,
            view: self.view,
            sequence,
            node_id: self.node_id,
            signature: self.scheme.sign(&payload),
            timestamp: self.clock.now_ms(),
            public_key: self.scheme.public_key(),
        }
    }

    fn broadcast(&self, message: &PhaseMessage) {
        if self.outbound.send(message.clone()).is_err() {
            log::debug!("outbound channel closed, vote not broadcast");
        }
    }
}
