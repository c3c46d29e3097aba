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

//! Main service of an SFIM node.
//!
//! Owns every long-lived piece: database, TPM, quote verifier, replica
//! state machine and the peer table. The run loop is the single consumer
//! of the inbound queue, so agreement handlers never run concurrently for
//! the same instance. I/O lives in spawned tasks that only talk to the
//! loop through channels.

use crate::config::{default_key_seed, Config};
use anyhow::{Context as _, Result};
use sfim_attest::{simulated_baseline, AttestationVerifier, SimulatedTpm, ATTESTATION_INTERVAL};
use sfim_common::{Clock, IntegrityEvent, PhaseMessage, SystemClock};
use sfim_consensus::{Replica, ReplicaContext};
use sfim_db::Database;
use sfim_network::{codec, listener, peer, Inbound, PeerHandle};
use sfim_signer::{BlsScheme, MockScheme, PublicKey, SignatureScheme};
use std::{collections::BTreeMap, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    net::TcpListener,
    sync::mpsc,
    time::{interval_at, Instant},
};

/// In-memory agreement instances retained per view.
const INSTANCE_RETENTION: usize = 256;
/// Persisted quotes retained per node.
const QUOTE_RETENTION: usize = 100;
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);
const INBOUND_QUEUE_DEPTH: usize = 1024;

pub struct Service {
    config: Config,
    db: Arc<Database>,
    tpm: SimulatedTpm,
    verifier: AttestationVerifier,
    replica: Replica,
    listener: TcpListener,
    local_addr: SocketAddr,
    inbound_tx: mpsc::Sender<Inbound>,
    inbound_rx: mpsc::Receiver<Inbound>,
    outbound_rx: mpsc::UnboundedReceiver<PhaseMessage>,
}

impl Service {
    pub async fn new(config: &Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let db = Arc::new(Database::open(
            &config.database_path,
            config.node_id,
            clock.clone(),
        )?);

        let scheme: Arc<dyn SignatureScheme> = if config.mock_signer {
            Arc::new(MockScheme::from_seed(&config.key_seed))
        } else {
            Arc::new(BlsScheme::from_seed(&config.key_seed)?)
        };

        let validators = Self::validator_registry(config, scheme.as_ref())?;

        let tpm = SimulatedTpm::new(clock.clone());
        let mut verifier = AttestationVerifier::new(clock.clone());
        for node_id in 0..config.total_nodes {
            verifier.insert_baseline(node_id, simulated_baseline());
        }

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let mut replica = Replica::new(ReplicaContext {
            node_id: config.node_id,
            total_nodes: config.total_nodes,
            validators,
            scheme,
            sink: db.clone(),
            clock,
            outbound: outbound_tx,
        })?;

        // Startup attestation gates participation from the first message on.
        let quote = tpm.collect_quote();
        let trust_level = verifier.trust_level(config.node_id, &quote);
        db.record_quote(&quote, trust_level)?;
        replica.set_participation(trust_level.is_trusted());
        log::info!("🔐 startup attestation: {trust_level}");

        let listener = TcpListener::bind(("0.0.0.0", config.port))
            .await
            .with_context(|| format!("failed to bind port {}", config.port))?;
        let local_addr = listener.local_addr()?;

        db.record_audit("system", "node started".to_string(), None)?;

        Ok(Self {
            config: config.clone(),
            db,
            tpm,
            verifier,
            replica,
            listener,
            local_addr,
            inbound_tx,
            inbound_rx,
            outbound_rx,
        })
    }

    /// Public keys of every replica. Peers use the deterministic
    /// development seed derivation; an explicit seed only changes the
    /// local key.
    fn validator_registry(
        config: &Config,
        scheme: &dyn SignatureScheme,
    ) -> Result<BTreeMap<u32, PublicKey>> {
        let mut validators = BTreeMap::new();
        for node_id in 0..config.total_nodes {
            let public_key = if node_id == config.node_id {
                scheme.public_key()
            } else {
                BlsScheme::from_seed(&default_key_seed(node_id))?.public_key()
            };
            validators.insert(node_id, public_key);
        }
        Ok(validators)
    }

    /// Where the listener actually bound; useful with port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn db(&self) -> Arc<Database> {
        self.db.clone()
    }

    pub async fn run(self) -> Result<()> {
        self.run_inner().await.map_err(|err| {
            log::error!("service finished with error: {err:?}");
            err
        })
    }

    async fn run_inner(self) -> Result<()> {
        let Service {
            config,
            db,
            tpm,
            verifier,
            mut replica,
            listener,
            local_addr,
            inbound_tx,
            mut inbound_rx,
            mut outbound_rx,
        } = self;

        log::info!(
            "⚙️ node {} listening on {local_addr}, primary: {}",
            config.node_id,
            replica.is_primary()
        );

        tokio::spawn(listener::serve(listener, inbound_tx));

        let peers: Vec<PeerHandle> = config
            .peers
            .iter()
            .map(|entry| peer::spawn_peer(entry.node_id, entry.address.clone()))
            .collect();

        let mut attest_timer = interval_at(
            Instant::now() + ATTESTATION_INTERVAL,
            ATTESTATION_INTERVAL,
        );
        let mut cleanup_timer = interval_at(Instant::now() + CLEANUP_INTERVAL, CLEANUP_INTERVAL);

        loop {
            tokio::select! {
                inbound = inbound_rx.recv() => {
                    let Some(inbound) = inbound else {
                        log::info!("inbound queue closed, shutting down");
                        break;
                    };
                    match inbound {
                        Inbound::Phase(message) => replica.handle_message(message).await,
                        Inbound::Integrity(event) => {
                            Self::handle_integrity_event(&db, &mut replica, event).await;
                        }
                    }
                }
                vote = outbound_rx.recv() => {
                    let Some(vote) = vote else { break };
                    Self::fan_out(&peers, &vote);
                }
                _ = attest_timer.tick() => {
                    Self::attest(&tpm, &verifier, &db, &mut replica, config.node_id);
                }
                _ = cleanup_timer.tick() => {
                    replica.prune_instances(INSTANCE_RETENTION);
                    if let Err(err) = db.prune_quotes(config.node_id, QUOTE_RETENTION) {
                        log::warn!("quote pruning failed: {err:#}");
                    }
                }
            }
        }

        Ok(())
    }

    async fn handle_integrity_event(
        db: &Arc<Database>,
        replica: &mut Replica,
        event: IntegrityEvent,
    ) {
        log::info!(
            "📄 integrity event: root {} over {} files",
            event.merkle_root,
            event.file_count
        );

        if let Err(err) = db.record_pending_event(&event) {
            log::error!("failed to record pending event: {err:#}");
        }

        if replica.is_primary() {
            if let Err(err) = replica.propose(event.merkle_root).await {
                log::warn!("proposal refused: {err:#}");
            }
        } else {
            log::debug!("not the primary, waiting for the proposal");
        }
    }

    fn fan_out(peers: &[PeerHandle], vote: &PhaseMessage) {
        let frame = match codec::encode_message(vote) {
            Ok(frame) => frame,
            Err(err) => {
                log::error!("failed to encode vote: {err}");
                return;
            }
        };
        for peer in peers {
            peer.send(frame.clone());
        }
    }

    fn attest(
        tpm: &SimulatedTpm,
        verifier: &AttestationVerifier,
        db: &Arc<Database>,
        replica: &mut Replica,
        node_id: u32,
    ) {
        let quote = tpm.collect_quote();
        let trust_level = verifier.trust_level(node_id, &quote);

        if let Err(err) = db.record_quote(&quote, trust_level) {
            log::warn!("failed to store quote: {err:#}");
        }

        if trust_level.is_trusted() {
            log::debug!("periodic attestation: {trust_level}");
        } else {
            log::error!("periodic attestation degraded to {trust_level}");
        }
        replica.set_participation(trust_level.is_trusted());
    }
}
