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

mod agent;
mod args;
mod config;
mod service;


use crate::{
    args::{Args, Command},
    config::Config,
    service::Service,
};
use anyhow::Context as _;
use clap::Parser;
use env_logger::Env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .try_init()
        .with_context(|| "failed to initialize logger")?;

    if let Some(Command::Agent { node_addr }) = args.command.clone() {
        let config = Config::try_from(args).with_context(|| "invalid configuration")?;
        return agent::run(node_addr, config.watch_paths, config.scan_interval).await;
    }

    let config = Config::try_from(args).with_context(|| "invalid configuration")?;
    print_info(&config);

    let service = Service::new(&config).await?;

    tokio::select! {
        res = service.run() => res,
        _ = tokio::signal::ctrl_c() => {
            log::info!("received SIGINT, shutting down");
            Ok(())
        }
    }
}

fn print_info(config: &Config) {
    log::info!("🆔 Node id: {}", config.node_id);
    log::info!("👥 Cluster size: {}", config.total_nodes);
    log::info!("💾 Database: {}", config.database_path.display());
    log::info!("🛜 Peers: {}", config.peers.len());
    if !config.watch_paths.is_empty() {
        log::info!(
            "📂 Watch paths: {}",
            config
                .watch_paths
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
}
