/*
 *     rumtk attempts to implement HL7 and medical protocols for interoperability in medicine.
 *     This toolkit aims to be reliable, simple, performant, and standards compliant.
 *     Copyright (C) 2025  Luis M. Santos, M.D.
 *
 *     This program is free software: you can redistribute it and/or modify
 *     it under the terms of the GNU General Public License as published by
 *     the Free Software Foundation, either version 3 of the License, or
 *     (at your option) any later version.
 *
 *     This program is distributed in the hope that it will be useful,
 *     but WITHOUT ANY WARRANTY; without even the implied warranty of
 *     MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *     GNU General Public License for more details.
 *
 *     You should have received a copy of the GNU General Public License
 *     along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use clap::Parser;
use rumtk_aki_watch::alert::alert_manager::AlertManager;
use rumtk_aki_watch::config::watch_config::{Args, Config};
use rumtk_aki_watch::listener::message_listener::{request_stop, listen_for_messages};
use rumtk_aki_watch::metrics::watch_metrics;
use rumtk_aki_watch::model::aki_model::LogisticRegressionModel;
use rumtk_aki_watch::storage::storage_manager::StorageManager;
use std::path::Path;
use std::process::ExitCode;

/// Spawns a dedicated OS thread running a single-threaded Tokio runtime that hosts the
/// Prometheus exporter's HTTP server and the SIGTERM listener. Both only read shared
/// state (metrics registry, a stop flag) so no synchronization beyond what those two
/// crates already provide is needed.
fn spawn_background_worker(metrics_port: u16) {
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build background tokio runtime");

        runtime.block_on(async move {
            if let Err(e) = watch_metrics::install_exporter(metrics_port) {
                eprintln!("failed to start metrics exporter: {e}");
                return;
            }
            println!("metrics exporter listening on 0.0.0.0:{metrics_port}");

            #[cfg(unix)]
            {
                let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
                tokio::select! {
                    _ = term.recv() => {
                        println!("received SIGTERM, shutting down");
                        request_stop();
                    }
                    _ = tokio::signal::ctrl_c() => {
                        println!("received Ctrl-C, shutting down");
                        request_stop();
                    }
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
                request_stop();
            }
        });
    });
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = Config::from_args(args);

    let model = match LogisticRegressionModel::load(Path::new(config.model_path.as_str())) {
        Ok(model) => model,
        Err(e) => {
            eprintln!("fatal: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut storage = StorageManager::new(config.message_log.as_str(), Box::new(model));
    if let Err(e) = storage.initialise_database(Path::new(config.history_dir.as_str()), config.wipe_log) {
        eprintln!("fatal: failed to initialise storage: {e}");
        return ExitCode::FAILURE;
    }

    let alerts = match AlertManager::new(&config.pager_url()) {
        Ok(alerts) => alerts,
        Err(e) => {
            eprintln!("fatal: {e}");
            return ExitCode::FAILURE;
        }
    };

    spawn_background_worker(config.metrics_port);

    println!("connecting to MLLP feed at {}", config.mllp_address);
    match listen_for_messages(&mut storage, &alerts, config.mllp_address.as_str()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fatal: listener exited: {e}");
            ExitCode::FAILURE
        }
    }
}
