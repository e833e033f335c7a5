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
/// Error kinds for the AKI watch pipeline. Each variant maps to one row of the error
/// handling policy table: callers match on the kind to decide whether to ACK-and-continue,
/// tear down the connection, or abort startup.
///
pub mod error {
    use compact_str::{format_compact, CompactString};
    use std::fmt;

    #[derive(Debug, Clone)]
    pub enum AppError {
        /// MLLP framing violation: missing VT, missing CR after FS, etc.
        Framing(CompactString),
        /// Unknown HL7 message type or malformed segment/field split.
        Parse(CompactString),
        /// Storage operation on an MRN not in the expected state (e.g. test result for
        /// an unadmitted patient).
        Storage(CompactString),
        /// Pager exhausted its retry budget.
        Paging(CompactString),
        /// Any I/O failure (socket, file) not otherwise classified.
        Io(CompactString),
        /// Fatal startup failure (model load, socket bind).
        Fatal(CompactString),
    }

    impl fmt::Display for AppError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                AppError::Framing(m) => write!(f, "framing error: {m}"),
                AppError::Parse(m) => write!(f, "parse error: {m}"),
                AppError::Storage(m) => write!(f, "storage error: {m}"),
                AppError::Paging(m) => write!(f, "paging error: {m}"),
                AppError::Io(m) => write!(f, "I/O error: {m}"),
                AppError::Fatal(m) => write!(f, "fatal error: {m}"),
            }
        }
    }

    impl std::error::Error for AppError {}

    impl From<std::io::Error> for AppError {
        fn from(e: std::io::Error) -> Self {
            AppError::Io(format_compact!("{e}"))
        }
    }

    pub type AppResult<T> = Result<T, AppError>;
}
