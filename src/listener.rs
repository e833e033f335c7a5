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

///
/// Owns the TCP socket and drives codec → parser → storage → alert for each inbound
/// message. Single-threaded cooperative: one message is handled end-to-end before the
/// next `recv` call.
///
pub mod message_listener {
    use crate::alert::alert_manager::AlertManager;
    use crate::error::error::AppError;
    use crate::hl7::v2_parser::parse_message;
    use crate::messages::hospital_message::HospitalMessage;
    use crate::metrics::watch_metrics::{self, Source};
    use crate::mllp::mllp_codec::{build_ack, from_mllp, to_mllp};
    use crate::storage::storage_manager::StorageManager;
    use chrono::Utc;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread::sleep;
    use std::time::{Duration, Instant};

    const RECV_BUFFER_SIZE: usize = 1024;
    pub const RECONNECT_RETRIES: u32 = 20;
    pub const START_DELAY: Duration = Duration::from_secs(1);
    pub const MAX_DELAY: Duration = Duration::from_secs(30);

    /// Flipped by the SIGTERM handler; checked between reconnect attempts and at the top
    /// of each message-handling cycle.
    pub static STOPPING: AtomicBool = AtomicBool::new(false);

    pub fn request_stop() {
        STOPPING.store(true, Ordering::SeqCst);
    }

    fn is_stopping() -> bool {
        STOPPING.load(Ordering::SeqCst)
    }

    ///
    /// Connects to `address` and processes inbound MLLP traffic until the reconnect
    /// budget is exhausted or a stop is requested. Mirrors the source's observed
    /// "batch-of-one" behavior: only the first complete message decoded out of each
    /// `recv` call is handled; any others found in the same batch are left in the decode
    /// buffer for the next cycle.
    ///
    pub fn listen_for_messages(
        storage: &mut StorageManager,
        alerts: &AlertManager,
        address: &str,
    ) -> Result<(), AppError> {
        let mut delay = START_DELAY;
        let mut attempt_count = 0u32;

        while !is_stopping() {
            watch_metrics::count(watch_metrics::NUMBER_OF_CONNECTION_ATTEMPTS, Source::Live);
            match TcpStream::connect(address) {
                Ok(mut stream) => {
                    println!("connected to feed at {address}");
                    delay = START_DELAY;
                    attempt_count = 0;

                    if let Err(e) = run_connection(&mut stream, storage, alerts) {
                        println!("connection closed: {e}");
                        watch_metrics::count(watch_metrics::CONNECTION_CLOSED_ERRORS, Source::Live);
                    }
                }
                Err(e) => {
                    println!("failed to connect to {address}: {e}");
                }
            }

            if is_stopping() {
                break;
            }

            attempt_count += 1;
            if attempt_count >= RECONNECT_RETRIES {
                request_stop();
                break;
            }
            sleep(delay);
            delay = std::cmp::min(delay * 2, MAX_DELAY);
        }

        Ok(())
    }

    /// Runs the recv/handle/ack loop over one live connection. Returns once the
    /// connection drops or an unhandled error occurs; the caller applies backoff and
    /// reconnects.
    fn run_connection(
        stream: &mut TcpStream,
        storage: &mut StorageManager,
        alerts: &AlertManager,
    ) -> Result<(), AppError> {
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            if is_stopping() {
                return Ok(());
            }

            let mut chunk = [0u8; RECV_BUFFER_SIZE];
            let received = stream.read(&mut chunk)?;
            if received == 0 {
                // A zero-length read is treated as "nothing new yet", not EOF, matching
                // the source's behavior against a feed that holds the connection open.
                continue;
            }
            buffer.extend_from_slice(&chunk[..received]);

            let (messages, tail) = from_mllp(&buffer)?;
            buffer = tail;

            if let Some(segments) = messages.into_iter().next() {
                handle_message(&segments, storage, alerts, stream)?;
            }
        }
    }

    fn handle_message(
        segments: &[String],
        storage: &mut StorageManager,
        alerts: &AlertManager,
        stream: &mut TcpStream,
    ) -> Result<(), AppError> {
        let arrival = Instant::now();
        watch_metrics::count(watch_metrics::OVERALL_MESSAGES_RECEIVED, Source::Live);

        let outcome = dispatch(segments, storage, alerts, arrival);
        if let Err(e) = &outcome {
            println!("error handling message: {e}");
            watch_metrics::count(watch_metrics::MESSAGE_ERRORS, Source::Live);
        }

        let ack = build_ack(&Utc::now().format("%Y%m%d%H%M%S").to_string());
        stream.write_all(&to_mllp(&ack))?;
        watch_metrics::count(watch_metrics::OVERALL_MESSAGES_ACKNOWLEDGED, Source::Live);
        watch_metrics::observe_latency(
            watch_metrics::MESSAGE_LATENCY_SECONDS,
            arrival.elapsed().as_secs_f64(),
        );

        Ok(())
    }

    fn dispatch(
        segments: &[String],
        storage: &mut StorageManager,
        alerts: &AlertManager,
        arrival: Instant,
    ) -> Result<(), AppError> {
        let message = parse_message(segments)?;

        // Each arm mutates state first and only appends to the log once that mutation
        // has actually succeeded, so every log row corresponds to an applied change.
        match &message {
            HospitalMessage::Admission(msg) => {
                watch_metrics::count(watch_metrics::ADMISSION_MESSAGES_RECEIVED, Source::Live);
                storage.add_admitted_patient_to_current_patients(msg);
                storage.append_to_log(&message)?;
                watch_metrics::count(watch_metrics::SUCCESSFUL_ADMISSION_HANDLINGS, Source::Live);
            }
            HospitalMessage::Discharge(msg) => {
                watch_metrics::count(watch_metrics::DISCHARGE_MESSAGES_RECEIVED, Source::Live);
                storage.update_patients_data_in_creatinine_results_history(msg)?;
                storage.remove_patient_from_current_patients(msg)?;
                storage.append_to_log(&message)?;
                watch_metrics::count(watch_metrics::SUCCESSFUL_DISCHARGE_HANDLINGS, Source::Live);
            }
            HospitalMessage::TestResult(msg) => {
                watch_metrics::count(watch_metrics::TEST_RESULT_MESSAGES_RECEIVED, Source::Live);
                storage.add_test_result_to_current_patients(msg)?;
                storage.append_to_log(&message)?;
                watch_metrics::count(watch_metrics::TEST_RESULT_SUCCESSFUL_HANDLED, Source::Live);

                if storage.no_positive_aki_prediction_so_far(&msg.mrn) {
                    let prediction = storage.predict_aki(&msg.mrn)?;
                    if prediction == 1 {
                        watch_metrics::count(watch_metrics::POSITIVE_AKI_PREDICTIONS, Source::Live);
                        match alerts.send_alert(&msg.mrn, &msg.timestamp) {
                            Ok(()) => {
                                watch_metrics::count(watch_metrics::NUMBER_OF_PAGINGS, Source::Live);
                                storage.update_positive_aki_prediction_to_current_patients(&msg.mrn);
                            }
                            Err(e) => {
                                // Per policy: do not flip the flag on pager exhaustion, so the
                                // next positive test result gets another chance to page.
                                println!("paging failed for {}: {e}", msg.mrn);
                                watch_metrics::count(watch_metrics::FAILED_PAGINGS, Source::Live);
                            }
                        }
                        watch_metrics::observe_latency(
                            watch_metrics::PAGING_LATENCY_SECONDS,
                            arrival.elapsed().as_secs_f64(),
                        );
                    } else {
                        watch_metrics::count(watch_metrics::NEGATIVE_AKI_PREDICTIONS, Source::Live);
                    }
                }
            }
        }

        watch_metrics::count(watch_metrics::MESSAGES_ADDED_TO_LOG, Source::Live);
        Ok(())
    }
}
