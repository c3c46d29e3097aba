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

//! Agreement scenarios driven over in-process clusters.

use crate::{CommitSink, Replica, ReplicaContext};
use anyhow::Result;
use async_trait::async_trait;
use sfim_common::{vote_payload, Clock, CommittedEntry, Digest, Phase, PhaseMessage};
use sfim_signer::{BlsScheme, MockScheme, PublicKey, SignatureScheme};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};
use tokio::sync::mpsc;

struct FixedClock(u64);

impl Clock for FixedClock {
    fn now_ms(&self) -> u64 {
        self.0
    }
}

#[derive(Default)]
struct TestSink {
    entries: Mutex<Vec<CommittedEntry>>,
}

#[async_trait]
impl CommitSink for TestSink {
    async fn on_commit(&self, entry: &CommittedEntry) -> Result<()> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

impl TestSink {
    fn entries(&self) -> Vec<CommittedEntry> {
        self.entries.lock().unwrap().clone()
    }
}

struct Cluster {
    replicas: Vec<Replica>,
    outboxes: Vec<mpsc::UnboundedReceiver<PhaseMessage>>,
    sinks: Vec<Arc<TestSink>>,
    schemes: Vec<Arc<BlsScheme>>,
}

impl Cluster {
    fn new(total_nodes: u32) -> Self {
        let schemes: Vec<Arc<BlsScheme>> = (0..total_nodes)
            .map(|id| Arc::new(BlsScheme::from_seed(&[id as u8 + 1; 32]).unwrap()))
            .collect();
        let validators: BTreeMap<u32, PublicKey> = schemes
            .iter()
            .enumerate()
            .map(|(id, scheme)| (id as u32, scheme.public_key()))
            .collect();

        let mut replicas = Vec::new();
        let mut outboxes = Vec::new();
        let mut sinks = Vec::new();

        for id in 0..total_nodes {
            let (outbound, outbox) = mpsc::unbounded_channel();
            let sink = Arc::new(TestSink::default());
            let replica = Replica::new(ReplicaContext {
                node_id: id,
                total_nodes,
                validators: validators.clone(),
                scheme: schemes[id as usize].clone(),
                sink: sink.clone(),
                clock: Arc::new(FixedClock(1_000)),
                outbound,
            })
            .unwrap();

            replicas.push(replica);
            outboxes.push(outbox);
            sinks.push(sink);
        }

        Self {
            replicas,
            outboxes,
            sinks,
            schemes,
        }
    }

    /// Deliver queued votes between live nodes until nothing moves.
    /// Messages from a dead node are discarded and a dead node receives
    /// nothing, like a silent peer.
    async fn pump(&mut self, dead: &[u32]) {
        loop {
            let mut deliveries: Vec<(u32, PhaseMessage)> = Vec::new();
            for (sender, outbox) in self.outboxes.iter_mut().enumerate() {
                while let Ok(message) = outbox.try_recv() {
                    if !dead.contains(&(sender as u32)) {
                        deliveries.push((sender as u32, message));
                    }
                }
            }
            if deliveries.is_empty() {
                return;
            }

            for (sender, message) in deliveries {
                for (receiver, replica) in self.replicas.iter_mut().enumerate() {
                    let receiver = receiver as u32;
                    if receiver == sender || dead.contains(&receiver) {
                        continue;
                    }
                    replica.handle_message(message.clone()).await;
                }
            }
        }
    }

    /// A correctly signed vote as `node_id` would emit it.
    fn vote_from(&self, node_id: u32, phase: Phase, digest: Digest, sequence: u64) -> PhaseMessage {
        let scheme = &self.schemes[node_id as usize];
        let payload = vote_payload(phase, &digest, 0);
        PhaseMessage {
            phase,
            digest,
            view: 0,
            sequence,
            node_id,
            signature: scheme.sign(&payload),
            timestamp: 1_000,
            public_key: scheme.public_key(),
        }
    }

    async fn deliver(&mut self, to: u32, message: PhaseMessage) {
        self.replicas[to as usize].handle_message(message).await;
    }

    fn drain_outbox(&mut self, node_id: u32) -> Vec<PhaseMessage> {
        let mut drained = Vec::new();
        while let Ok(message) = self.outboxes[node_id as usize].try_recv() {
            drained.push(message);
        }
        drained
    }
}

fn digest(label: &[u8]) -> Digest {
    Digest::sha512(label)
}

#[test]
fn quorum_matches_the_fault_bound() {
    for (total, expected) in [(1u32, 1usize), (4, 3), (7, 5), (10, 7)] {
        let cluster = Cluster::new(total);
        assert_eq!(cluster.replicas[0].quorum(), expected, "N={total}");
    }
}

#[test]
fn primary_rotates_with_the_view() {
    let cluster = Cluster::new(4);
    let replica = &cluster.replicas[2];
    assert_eq!(replica.primary(0), 0);
    assert_eq!(replica.primary(1), 1);
    assert_eq!(replica.primary(5), 1);
    assert!(cluster.replicas[0].is_primary());
    assert!(!cluster.replicas[2].is_primary());
}

#[tokio::test]
async fn single_node_commits_immediately_without_wire_traffic() {
    let mut cluster = Cluster::new(1);
    let d = digest(b"solo");

    cluster.replicas[0].propose(d).await.unwrap();

    let entries = cluster.sinks[0].entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].view, 0);
    assert_eq!(entries[0].sequence, 1);
    assert_eq!(entries[0].digest, d);
    assert_eq!(entries[0].contributors, vec![0]);
    assert!(cluster.drain_outbox(0).is_empty(), "no messages may be emitted");

    // The aggregate is a valid single-signer proof over the commit payload.
    let pairs = vec![(
        cluster.schemes[0].public_key(),
        vote_payload(Phase::Commit, &d, 0),
    )];
    assert!(cluster.schemes[0].verify_aggregate(&entries[0].aggregated_signature, &pairs));

    // Re-proposing the same digest is a no-op.
    cluster.replicas[0].propose(d).await.unwrap();
    assert_eq!(cluster.sinks[0].entries().len(), 1);
}

#[tokio::test]
async fn single_node_works_with_the_mock_scheme() {
    let scheme = Arc::new(MockScheme::from_seed(&[9; 32]));
    let mut validators = BTreeMap::new();
    validators.insert(0, scheme.public_key());
    let (outbound, mut outbox) = mpsc::unbounded_channel();
    let sink = Arc::new(TestSink::default());

    let mut replica = Replica::new(ReplicaContext {
        node_id: 0,
        total_nodes: 1,
        validators,
        scheme: scheme.clone(),
        sink: sink.clone(),
        clock: Arc::new(FixedClock(0)),
        outbound,
    })
    .unwrap();

    let d = digest(b"mock-solo");
    replica.propose(d).await.unwrap();

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert!(outbox.try_recv().is_err());

    let pairs = vec![(scheme.public_key(), vote_payload(Phase::Commit, &d, 0))];
    assert!(scheme.verify_aggregate(&entries[0].aggregated_signature, &pairs));
}

#[test]
fn mock_scheme_with_peers_is_refused() {
    let scheme = Arc::new(MockScheme::from_seed(&[9; 32]));
    let validators: BTreeMap<u32, PublicKey> =
        (0..4u32).map(|id| (id, scheme.public_key())).collect();
    let (outbound, _outbox) = mpsc::unbounded_channel();

    let result = Replica::new(ReplicaContext {
        node_id: 0,
        total_nodes: 4,
        validators,
        scheme,
        sink: Arc::new(TestSink::default()),
        clock: Arc::new(FixedClock(0)),
        outbound,
    });

    assert!(result.is_err());
}

#[tokio::test]
async fn four_replicas_commit_with_all_contributors() {
    let mut cluster = Cluster::new(4);
    let d = digest(b"happy-path");

    cluster.replicas[0].propose(d).await.unwrap();
    cluster.pump(&[]).await;

    let commit_payload = vote_payload(Phase::Commit, &d, 0);
    for (id, sink) in cluster.sinks.iter().enumerate() {
        let entries = sink.entries();
        assert_eq!(entries.len(), 1, "node {id} must commit exactly once");
        let entry = &entries[0];
        assert_eq!(entry.digest, d);
        assert_eq!(entry.view, 0);
        assert_eq!(entry.sequence, 1);
        // The tally closes at the first quorum of distinct senders.
        assert_eq!(entry.contributors.len(), 3, "node {id}");
        assert!(entry.contributors.iter().all(|&contributor| contributor < 4));

        let pairs: Vec<_> = entry
            .contributors
            .iter()
            .map(|&contributor| {
                (
                    cluster.schemes[contributor as usize].public_key(),
                    commit_payload.clone(),
                )
            })
            .collect();
        assert!(
            cluster.schemes[0].verify_aggregate(&entry.aggregated_signature, &pairs),
            "aggregate of node {id} must verify against its contributors"
        );

        // Swapping in a non-contributor breaks the proof.
        if let Some(outsider) = (0..4u32).find(|id| !entry.contributors.contains(id)) {
            let mut wrong_pairs = pairs.clone();
            wrong_pairs[0] = (
                cluster.schemes[outsider as usize].public_key(),
                commit_payload.clone(),
            );
            assert!(!cluster.schemes[0].verify_aggregate(&entry.aggregated_signature, &wrong_pairs));
        }
    }
}

#[tokio::test]
async fn silent_replica_does_not_block_commit() {
    let mut cluster = Cluster::new(4);
    let d = digest(b"one-silent");

    cluster.replicas[0].propose(d).await.unwrap();
    cluster.pump(&[3]).await;

    for id in 0..3usize {
        let entries = cluster.sinks[id].entries();
        assert_eq!(entries.len(), 1, "node {id} must still commit");
        assert_eq!(entries[0].contributors, vec![0, 1, 2]);
    }
    assert!(
        cluster.sinks[3].entries().is_empty(),
        "the silent node cannot commit"
    );
}

#[tokio::test]
async fn pre_prepare_from_non_primary_is_ignored() {
    let mut cluster = Cluster::new(4);
    let d = digest(b"usurper");

    // Node 1 is not the primary of view 0.
    let rogue = cluster.vote_from(1, Phase::PrePrepare, d, 1);
    for id in [0u32, 2, 3] {
        cluster.deliver(id, rogue.clone()).await;
    }
    cluster.pump(&[]).await;

    for (id, replica) in cluster.replicas.iter().enumerate() {
        assert_eq!(replica.prepare_count(&d), 0, "node {id} must not prepare");
        assert!(!replica.is_committed(&d));
    }
    for sink in &cluster.sinks {
        assert!(sink.entries().is_empty());
    }
}

#[tokio::test]
async fn duplicate_prepares_do_not_advance_the_tally() {
    let mut cluster = Cluster::new(4);
    let d = digest(b"duplicates");

    let prepare = cluster.vote_from(1, Phase::Prepare, d, 1);
    for _ in 0..10 {
        cluster.deliver(0, prepare.clone()).await;
    }

    assert_eq!(cluster.replicas[0].prepare_count(&d), 1);
    assert!(!cluster.replicas[0].is_prepared(&d));
}

#[tokio::test]
async fn at_most_one_vote_per_phase() {
    let mut cluster = Cluster::new(4);
    let d = digest(b"one-vote");

    let pre_prepare = cluster.vote_from(0, Phase::PrePrepare, d, 1);
    cluster.deliver(1, pre_prepare.clone()).await;
    cluster.deliver(1, pre_prepare).await;

    let prepares: Vec<_> = cluster
        .drain_outbox(1)
        .into_iter()
        .filter(|message| message.phase == Phase::Prepare)
        .collect();
    assert_eq!(prepares.len(), 1, "exactly one PREPARE per instance");

    // Quorum of prepares arriving repeatedly still yields a single COMMIT.
    for sender in [0u32, 2, 3] {
        let prepare = cluster.vote_from(sender, Phase::Prepare, d, 1);
        cluster.deliver(1, prepare.clone()).await;
        cluster.deliver(1, prepare).await;
    }
    let commits: Vec<_> = cluster
        .drain_outbox(1)
        .into_iter()
        .filter(|message| message.phase == Phase::Commit)
        .collect();
    assert_eq!(commits.len(), 1, "exactly one COMMIT per instance");
}

#[tokio::test]
async fn commit_latches_only_at_quorum_of_distinct_senders() {
    let mut cluster = Cluster::new(4);
    let d = digest(b"distinct");

    let commit_1 = cluster.vote_from(1, Phase::Commit, d, 1);
    let commit_2 = cluster.vote_from(2, Phase::Commit, d, 1);
    cluster.deliver(0, commit_1).await;
    cluster.deliver(0, commit_2).await;
    assert!(!cluster.replicas[0].is_committed(&d));
    assert!(cluster.sinks[0].entries().is_empty());

    let commit_3 = cluster.vote_from(3, Phase::Commit, d, 1);
    cluster.deliver(0, commit_3).await;
    assert!(cluster.replicas[0].is_committed(&d));
    assert_eq!(cluster.sinks[0].entries().len(), 1);

    // Commit implies prepared, even on the commits-only path.
    assert!(cluster.replicas[0].is_prepared(&d));
}

#[tokio::test]
async fn redelivered_commit_does_not_reinvoke_the_sink() {
    let mut cluster = Cluster::new(4);
    let d = digest(b"idempotent");

    for sender in [1u32, 2, 3] {
        let commit = cluster.vote_from(sender, Phase::Commit, d, 1);
        cluster.deliver(0, commit).await;
    }
    assert_eq!(cluster.sinks[0].entries().len(), 1);

    // A late or replayed COMMIT for the committed digest is stale.
    let replayed = cluster.vote_from(1, Phase::Commit, d, 1);
    cluster.deliver(0, replayed).await;
    let late = cluster.vote_from(0, Phase::Commit, d, 1);
    cluster.deliver(0, late).await;
    assert_eq!(cluster.sinks[0].entries().len(), 1);
}

#[tokio::test]
async fn stale_view_messages_are_dropped() {
    let mut cluster = Cluster::new(4);
    let d = digest(b"stale-view");

    let mut prepare = cluster.vote_from(1, Phase::Prepare, d, 1);
    prepare.view = 1;
    prepare.signature = cluster.schemes[1].sign(&prepare.signing_payload());

    cluster.deliver(0, prepare).await;
    assert_eq!(cluster.replicas[0].prepare_count(&d), 0);
}

#[tokio::test]
async fn unknown_sender_is_rejected() {
    let mut cluster = Cluster::new(4);
    let d = digest(b"stranger");

    let mut prepare = cluster.vote_from(1, Phase::Prepare, d, 1);
    prepare.node_id = 9;
    cluster.deliver(0, prepare).await;

    assert_eq!(cluster.replicas[0].prepare_count(&d), 0);
}

#[tokio::test]
async fn invalid_signature_is_rejected() {
    let mut cluster = Cluster::new(4);
    let d = digest(b"forgery");

    let mut prepare = cluster.vote_from(1, Phase::Prepare, d, 1);
    // Signed over a different view than the message claims.
    prepare.signature = cluster.schemes[1].sign(&vote_payload(Phase::Prepare, &d, 5));
    cluster.deliver(0, prepare).await;

    assert_eq!(cluster.replicas[0].prepare_count(&d), 0);
}

#[tokio::test]
async fn mismatched_public_key_is_rejected() {
    let mut cluster = Cluster::new(4);
    let d = digest(b"masquerade");

    // Node 2's key attached to node 1's message.
    let mut prepare = cluster.vote_from(1, Phase::Prepare, d, 1);
    prepare.public_key = cluster.schemes[2].public_key();
    cluster.deliver(0, prepare).await;

    assert_eq!(cluster.replicas[0].prepare_count(&d), 0);
}

#[tokio::test]
async fn non_primary_cannot_propose() {
    let mut cluster = Cluster::new(4);
    assert!(cluster.replicas[1].propose(digest(b"nope")).await.is_err());
    assert!(cluster.drain_outbox(1).is_empty());
}

#[tokio::test]
async fn suspended_replica_emits_no_votes_but_keeps_tallying() {
    let mut cluster = Cluster::new(4);
    let d = digest(b"gated");

    cluster.replicas[1].set_participation(false);

    let pre_prepare = cluster.vote_from(0, Phase::PrePrepare, d, 1);
    cluster.deliver(1, pre_prepare).await;
    for sender in [0u32, 2, 3] {
        let prepare = cluster.vote_from(sender, Phase::Prepare, d, 1);
        cluster.deliver(1, prepare).await;
        let commit = cluster.vote_from(sender, Phase::Commit, d, 1);
        cluster.deliver(1, commit).await;
    }

    assert!(
        cluster.drain_outbox(1).is_empty(),
        "no PREPARE or COMMIT may leave an untrusted node"
    );
    // Relaying continues: the tally latched and delivery happened.
    assert!(cluster.replicas[1].is_prepared(&d));
    assert!(cluster.replicas[1].is_committed(&d));
    assert_eq!(cluster.sinks[1].entries().len(), 1);
    assert_eq!(cluster.sinks[1].entries()[0].contributors, vec![0, 2, 3]);

    // An untrusted primary refuses to propose.
    cluster.replicas[0].set_participation(false);
    assert!(cluster.replicas[0].propose(d).await.is_err());
}

#[tokio::test]
async fn concurrent_digests_are_independent_instances() {
    let mut cluster = Cluster::new(4);
    let first = digest(b"first");
    let second = digest(b"second");

    cluster.replicas[0].propose(first).await.unwrap();
    cluster.replicas[0].propose(second).await.unwrap();
    cluster.pump(&[]).await;

    for sink in &cluster.sinks {
        let mut digests: Vec<Digest> = sink.entries().iter().map(|entry| entry.digest).collect();
        digests.sort();
        let mut expected = vec![first, second];
        expected.sort();
        assert_eq!(digests, expected);
    }
    assert_eq!(cluster.replicas[0].sequence(), 2);
}

#[tokio::test]
async fn pruning_bounds_the_instance_map() {
    let mut cluster = Cluster::new(4);

    for index in 0..8u8 {
        let d = digest(&[index]);
        let prepare = cluster.vote_from(1, Phase::Prepare, d, 1);
        cluster.deliver(0, prepare).await;
    }
    assert_eq!(cluster.replicas[0].instance_count(), 8);

    cluster.replicas[0].prune_instances(3);
    assert_eq!(cluster.replicas[0].instance_count(), 3);

    cluster.replicas[0].prune_instances(3);
    assert_eq!(cluster.replicas[0].instance_count(), 3);
}
