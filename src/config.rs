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

pub mod watch_config {
    use clap::Parser;
    use compact_str::{format_compact, CompactString};
    use std::env;

    pub const METRICS_PORT: u16 = 8000;
    const DEFAULT_MLLP_ADDRESS: &str = "localhost:8440";
    const DEFAULT_PAGER_ADDRESS: &str = "localhost:8441";

    ///
    /// Command line surface for the AKI watch binary.
    ///
    /// `MLLP_ADDRESS` and `PAGER_ADDRESS` are read from the environment rather than flags,
    /// matching the original deployment's env-var-driven configuration; everything else
    /// that an operator would reasonably want to override at invocation time is a flag.
    ///
    #[derive(Parser, Debug)]
    #[command(author, version, about, long_about = None)]
    pub struct Args {
        ///
        /// Path to the bootstrap creatinine history CSV, read once at startup.
        ///
        #[arg(long, default_value = "./history.csv")]
        pub history_dir: CompactString,
        ///
        /// Path to the append-only message log CSV used for crash recovery.
        ///
        #[arg(long, default_value = "./message_log.csv")]
        pub message_log: CompactString,
        ///
        /// Truncate and recreate the message log at startup instead of replaying it.
        ///
        #[arg(long, default_value_t = false)]
        pub wipe_log: bool,
        ///
        /// Path to the serialized AKI classifier weights.
        ///
        #[arg(long, default_value = "./model/model.json")]
        pub model_path: CompactString,
    }

    #[derive(Debug, Clone)]
    pub struct Config {
        pub history_dir: CompactString,
        pub message_log: CompactString,
        pub wipe_log: bool,
        pub model_path: CompactString,
        pub mllp_address: CompactString,
        pub pager_address: CompactString,
        pub metrics_port: u16,
    }

    impl Config {
        pub fn from_args(args: Args) -> Self {
            let mllp_address = env::var("MLLP_ADDRESS")
                .map(CompactString::from)
                .unwrap_or_else(|_| CompactString::from(DEFAULT_MLLP_ADDRESS));
            let pager_address = env::var("PAGER_ADDRESS")
                .map(CompactString::from)
                .unwrap_or_else(|_| CompactString::from(DEFAULT_PAGER_ADDRESS));

            Self {
                history_dir: args.history_dir,
                message_log: args.message_log,
                wipe_log: args.wipe_log,
                model_path: args.model_path,
                mllp_address,
                pager_address,
                metrics_port: METRICS_PORT,
            }
        }

        pub fn pager_url(&self) -> CompactString {
            format_compact!("http://{}/page", self.pager_address)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_pager_url_formatting() {
            let config = Config {
                history_dir: CompactString::from("h.csv"),
                message_log: CompactString::from("m.csv"),
                wipe_log: false,
                model_path: CompactString::from("model.json"),
                mllp_address: CompactString::from("localhost:8440"),
                pager_address: CompactString::from("localhost:8441"),
                metrics_port: METRICS_PORT,
            };
            assert_eq!(config.pager_url(), "http://localhost:8441/page");
        }
    }
}
