/*
 * rumtk attempts to implement HL7 and medical protocols for interoperability in medicine.
 * This toolkit aims to be reliable, simple, performant, and standards compliant.
 * Copyright (C) 2025  Luis M. Santos, M.D.
 *
 * This library is free software; you can redistribute it and/or
 * modify it under the terms of the GNU Lesser General Public
 * License as published by the Free Software Foundation; either
 * version 2.1 of the License, or (at your option) any later version.
 *
 * This library is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
 * Lesser General Public License for more details.
 *
 * You should have received a copy of the GNU Lesser General Public
 * License along with this library; if not, write to the Free Software
 * Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA  02110-1301  USA
 */

pub mod watch_metrics {
    use crate::error::error::{AppError, AppResult};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::net::SocketAddr;

    pub const OVERALL_MESSAGES_RECEIVED: &str = "overall_messages_received";
    pub const OVERALL_MESSAGES_ACKNOWLEDGED: &str = "overall_messages_acknowledged";
    pub const ADMISSION_MESSAGES_RECEIVED: &str = "admission_messages_received";
    pub const SUCCESSFUL_ADMISSION_HANDLINGS: &str = "successful_admission_message_handlings";
    pub const DISCHARGE_MESSAGES_RECEIVED: &str = "discharge_messages_received";
    pub const SUCCESSFUL_DISCHARGE_HANDLINGS: &str = "successful_discharge_message_handlings";
    pub const TEST_RESULT_MESSAGES_RECEIVED: &str = "test_result_messages_received";
    pub const TEST_RESULT_SUCCESSFUL_HANDLED: &str = "test_result_successful_handled";
    pub const POSITIVE_AKI_PREDICTIONS: &str = "positive_aki_predictions";
    pub const NEGATIVE_AKI_PREDICTIONS: &str = "negative_aki_predictions";
    pub const NUMBER_OF_PAGINGS: &str = "number_of_pagings";
    pub const FAILED_PAGINGS: &str = "failed_pagings";
    pub const MESSAGES_ADDED_TO_LOG: &str = "messages_added_to_log";
    pub const CONNECTION_CLOSED_ERRORS: &str = "connection_closed_errors";
    pub const NUMBER_OF_CONNECTION_ATTEMPTS: &str = "number_of_connection_attempts";
    pub const MESSAGE_ERRORS: &str = "message_errors";
    pub const PAGING_LATENCY_SECONDS: &str = "paging_latency_seconds";
    pub const MESSAGE_LATENCY_SECONDS: &str = "message_latency_seconds";

    pub const LATENCY_BUCKETS: &[f64] = &[
        0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 3.0, 4.0, 5.0, 10.0, 20.0, 40.0, 60.0, 120.0, 600.0, 1200.0,
    ];

    /// Label distinguishing metrics produced while live-processing the feed from metrics
    /// produced while replaying the message log at startup. Keeps replay from doubling the
    /// headline counters (spec Design Notes, "Metrics separation").
    #[derive(Debug, Clone, Copy)]
    pub enum Source {
        Live,
        Reinstated,
    }

    impl Source {
        pub fn label(self) -> &'static str {
            match self {
                Source::Live => "live",
                Source::Reinstated => "reinstated",
            }
        }
    }

    /// Starts the Prometheus exporter's background HTTP server on `port`. The exporter
    /// owns its own worker thread and only reads recorder state, matching the
    /// thread-safe-by-construction "independent worker" the concurrency model describes.
    pub fn install_exporter(port: u16) -> AppResult<()> {
        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Full(PAGING_LATENCY_SECONDS.to_string()),
                LATENCY_BUCKETS,
            )
            .map_err(|e| AppError::Fatal(compact_str::format_compact!("invalid histogram buckets: {e}")))?
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Full(MESSAGE_LATENCY_SECONDS.to_string()),
                LATENCY_BUCKETS,
            )
            .map_err(|e| AppError::Fatal(compact_str::format_compact!("invalid histogram buckets: {e}")))?
            .install()
            .map_err(|e| AppError::Fatal(compact_str::format_compact!("failed to install metrics exporter: {e}")))
    }

    pub fn count(name: &'static str, source: Source) {
        metrics::counter!(name, "source" => source.label()).increment(1);
    }

    pub fn observe_latency(name: &'static str, seconds: f64) {
        metrics::histogram!(name).record(seconds);
    }
}
