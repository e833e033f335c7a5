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
/// Bounded-retry HTTP pager client. Paging is the critical side effect the whole system
/// exists to perform, so this call is deliberately synchronous and blocks the listener
/// loop for up to `NUM_PAGING_RETRIES` seconds worst case.
///
pub mod alert_manager {
    use crate::error::error::{AppError, AppResult};
    use compact_str::format_compact;
    use std::thread::sleep;
    use std::time::Duration;

    pub const NUM_PAGING_RETRIES: u32 = 10;
    const SOCKET_TIMEOUT: Duration = Duration::from_secs(1);
    const RETRY_SLEEP: Duration = Duration::from_secs(1);

    pub struct AlertManager {
        client: reqwest::blocking::Client,
        pager_url: String,
    }

    impl AlertManager {
        pub fn new(pager_url: &str) -> AppResult<Self> {
            let client = reqwest::blocking::Client::builder()
                .timeout(SOCKET_TIMEOUT)
                .build()
                .map_err(|e| AppError::Fatal(format_compact!("failed to build HTTP client: {e}")))?;
            Ok(Self { client, pager_url: pager_url.to_string() })
        }

        ///
        /// POSTs `"<mrn>,<timestamp>"` to the pager URL. Up to `NUM_PAGING_RETRIES`
        /// attempts: a 2xx response is success; any other status sleeps one second and
        /// retries; a transport error retries immediately unless the budget is exhausted,
        /// in which case this returns `AppError::Paging`.
        ///
        pub fn send_alert(&self, mrn: &str, timestamp: &str) -> AppResult<()> {
            let body = format_compact!("{mrn},{timestamp}");
            let mut counter = 0u32;

            loop {
                counter += 1;
                match self.client.post(&self.pager_url).body(body.to_string()).send() {
                    Ok(response) => {
                        let status = response.status().as_u16();
                        if (200..300).contains(&status) {
                            return Ok(());
                        }
                        sleep(RETRY_SLEEP);
                    }
                    Err(e) => {
                        if counter == NUM_PAGING_RETRIES {
                            return Err(AppError::Paging(format_compact!(
                                "failed to page after {NUM_PAGING_RETRIES} attempts: {e}"
                            )));
                        }
                    }
                }

                if counter >= NUM_PAGING_RETRIES {
                    return Err(AppError::Paging(format_compact!(
                        "failed to page after {NUM_PAGING_RETRIES} attempts: pager never returned 2xx"
                    )));
                }
            }
        }
    }

}
