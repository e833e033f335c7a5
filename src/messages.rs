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

pub mod hospital_message {
    use compact_str::{format_compact, CompactString};

    #[derive(Debug, Clone, PartialEq)]
    pub struct PatientAdmissionMessage {
        pub mrn: CompactString,
        pub name: CompactString,
        pub date_of_birth: CompactString,
        pub sex: CompactString,
    }

    impl PatientAdmissionMessage {
        pub fn new(mrn: &str, name: &str, date_of_birth: &str, sex: &str) -> Self {
            Self {
                mrn: CompactString::from(mrn),
                name: CompactString::from(name),
                date_of_birth: CompactString::from(date_of_birth),
                sex: CompactString::from(sex),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct PatientDischargeMessage {
        pub mrn: CompactString,
    }

    impl PatientDischargeMessage {
        pub fn new(mrn: &str) -> Self {
            Self { mrn: CompactString::from(mrn) }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct TestResultMessage {
        pub mrn: CompactString,
        pub test_date: CompactString,
        pub test_time: CompactString,
        pub creatinine_value: f64,
        /// Compact `YYYYMMDDHHMMSS` derived deterministically from test_date/test_time.
        pub timestamp: CompactString,
    }

    impl TestResultMessage {
        pub fn new(mrn: &str, test_date: &str, test_time: &str, creatinine_value: f64) -> Self {
            let timestamp = compact_timestamp(test_date, test_time);
            Self {
                mrn: CompactString::from(mrn),
                test_date: CompactString::from(test_date),
                test_time: CompactString::from(test_time),
                creatinine_value,
                timestamp,
            }
        }
    }

    /// Strips `-`/`:` separators from `YYYY-MM-DD` + `HH:MM:SS` to build `YYYYMMDDHHMMSS`.
    pub fn compact_timestamp(test_date: &str, test_time: &str) -> CompactString {
        let mut out = format_compact!("{test_date}{test_time}");
        out.retain(|c| c != '-' && c != ':');
        out
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum HospitalMessage {
        Admission(PatientAdmissionMessage),
        Discharge(PatientDischargeMessage),
        TestResult(TestResultMessage),
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_compact_timestamp_round_trip() {
            let ts = compact_timestamp("2024-08-04", "08:26:00");
            assert_eq!(ts, "20240804082600", "Timestamp did not strip separators correctly!");
        }

        #[test]
        fn test_admission_message_construction() {
            let msg = PatientAdmissionMessage::new("001", "John Doe", "1980-01-01", "M");
            assert_eq!(msg.mrn, "001");
            assert_eq!(msg.sex, "M");
        }
    }
}
