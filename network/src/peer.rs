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

//! Outbound peer links.
//!
//! Each peer gets its own task owning the dial/redial loop and the framed
//! write half. The supervisor talks to it through a [`PeerHandle`]; sends
//! never block and never fail the caller, a broken link only costs the
//! frames queued for that peer.

use anyhow::{Context as _, Result};
use futures::SinkExt;
use std::time::Duration;
use tokio::{
    net::TcpStream,
    sync::mpsc,
    time::{sleep, timeout},
};
use tokio_util::codec::{Framed, LinesCodec};

/// Initial dial timeout per attempt.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Backoff before reconnect attempt `attempt` (zero-based): 10 s doubling,
/// capped at 60 s.
pub fn backoff_delay(attempt: u32) -> Duration {
    let secs = 10u64.saturating_mul(1 << attempt.min(3));
    Duration::from_secs(secs.min(60))
}

/// One dial attempt with the standard timeout.
pub async fn dial(addr: &str) -> Result<TcpStream> {
    timeout(DIAL_TIMEOUT, TcpStream::connect(addr))
        .await
        .with_context(|| format!("dial {addr} timed out"))?
        .with_context(|| format!("dial {addr} failed"))
}

/// Dial with at most `max_attempts` tries and backoff in between. Used on
/// the ingress link, where giving up is a hard failure for the caller.
pub async fn dial_with_retry(addr: &str, max_attempts: u32) -> Result<TcpStream> {
    let mut attempt = 0;
    loop {
        match dial(addr).await {
            Ok(stream) => return Ok(stream),
            Err(err) if attempt + 1 < max_attempts => {
                let delay = backoff_delay(attempt);
                log::warn!(
                    "connection to {addr} failed (attempt {}): {err:#}, retrying in {delay:?}",
                    attempt + 1
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                return Err(err.context(format!("giving up on {addr} after {max_attempts} attempts")))
            }
        }
    }
}

/// Sender side of one peer link.
#[derive(Clone, Debug)]
pub struct PeerHandle {
    pub node_id: u32,
    frames: mpsc::UnboundedSender<String>,
}

impl PeerHandle {
    /// Queue a frame for this peer. Best effort: a closed link just drops
    /// the frame.
    pub fn send(&self, frame: String) {
        if self.frames.send(frame).is_err() {
            log::warn!("peer {} link is gone, dropping frame", self.node_id);
        }
    }
}

/// Spawn the link task for `node_id` at `addr` and return its handle.
///
/// The task dials lazily on the first frame, redials with backoff after
/// any failure, and exits when the handle is dropped.
pub fn spawn_peer(node_id: u32, addr: String) -> PeerHandle {
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let mut connection: Option<Framed<TcpStream, LinesCodec>> = None;
        let mut attempt = 0u32;

        while let Some(frame) = frames_rx.recv().await {
            if connection.is_none() {
                match dial(&addr).await {
                    Ok(stream) => {
                        log::info!("connected to peer {node_id} at {addr}");
                        connection = Some(Framed::new(stream, LinesCodec::new()));
                        attempt = 0;
                    }
                    Err(err) => {
                        let delay = backoff_delay(attempt);
                        attempt += 1;
                        log::warn!(
                            "peer {node_id} unreachable: {err:#}, next attempt in {delay:?}"
                        );
                        sleep(delay).await;
                        // This frame is lost; fan-out is best effort.
                        continue;
                    }
                }
            }

            if let Some(framed) = connection.as_mut() {
                if let Err(err) = framed.send(frame).await {
                    log::warn!("send to peer {node_id} failed: {err}, reconnecting");
                    connection = None;
                }
            }
        }

        log::debug!("peer {node_id} link task finished");
    });

    PeerHandle {
        node_id,
        frames: frames_tx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::net::TcpListener;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(0), Duration::from_secs(10));
        assert_eq!(backoff_delay(1), Duration::from_secs(20));
        assert_eq!(backoff_delay(2), Duration::from_secs(40));
        assert_eq!(backoff_delay(3), Duration::from_secs(60));
        assert_eq!(backoff_delay(10), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn frames_arrive_in_send_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let handle = spawn_peer(1, addr);
        handle.send("first".to_string());
        handle.send("second".to_string());

        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, LinesCodec::new());
        assert_eq!(framed.next().await.unwrap().unwrap(), "first");
        assert_eq!(framed.next().await.unwrap().unwrap(), "second");
    }

    #[tokio::test]
    async fn retry_gives_up_after_cap() {
        tokio::time::pause();
        let future = dial_with_retry("127.0.0.1:1", 3);
        tokio::pin!(future);

        // Refused dials fail fast; the paused clock skips the backoffs.
        let result = future.await;
        assert!(result.is_err());
    }
}
