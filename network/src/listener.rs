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

//! Inbound listener.
//!
//! Accepts framed connections from peers and agents alike and funnels every
//! decoded frame into the single-consumer queue that drives the state
//! machine. A frame that fails to decode is logged and dropped; the
//! connection stays up.

use crate::codec::{decode_inbound, Inbound};
use futures::StreamExt;
use tokio::{net::TcpListener, sync::mpsc};
use tokio_util::codec::{Framed, LinesCodec};

/// Accept loop. Runs until the listener errors or the queue is closed.
pub async fn serve(listener: TcpListener, inbound: mpsc::Sender<Inbound>) {
    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                log::error!("accept failed: {err}");
                return;
            }
        };

        log::debug!("inbound connection from {remote}");
        let inbound = inbound.clone();

        tokio::spawn(async move {
            let mut framed = Framed::new(stream, LinesCodec::new());

            while let Some(frame) = framed.next().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(err) => {
                        log::warn!("dropping broken frame from {remote}: {err}");
                        continue;
                    }
                };

                match decode_inbound(&frame) {
                    Ok(message) => {
                        if inbound.send(message).await.is_err() {
                            // State machine is shutting down.
                            return;
                        }
                    }
                    Err(err) => log::warn!("dropping undecodable frame from {remote}: {err}"),
                }
            }

            log::debug!("connection from {remote} closed");
        });
    }
}
