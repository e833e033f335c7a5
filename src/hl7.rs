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

pub mod v2_parser {
    use crate::error::error::{AppError, AppResult};
    use crate::messages::hospital_message::{
        HospitalMessage, PatientAdmissionMessage, PatientDischargeMessage, TestResultMessage,
    };
    use compact_str::format_compact;

    const MAX_CREATININE: f64 = 200.0;

    /// Finds the first segment whose three-letter name matches `name`, splits it on `|`.
    fn find_segment_fields<'a>(segments: &'a [String], name: &str) -> Option<Vec<&'a str>> {
        segments
            .iter()
            .find(|s| s.starts_with(name))
            .map(|s| s.split('|').collect())
    }

    fn field<'a>(fields: &[&'a str], index: usize) -> &'a str {
        fields.get(index).copied().unwrap_or("")
    }

    /// Reformats `YYYYMMDD` into `YYYY-MM-DD`. Passes through unchanged if already dashed
    /// or malformed, since the message grammar guarantees the compact form on the wire.
    fn reformat_date(raw: &str) -> String {
        if raw.len() == 8 && raw.chars().all(|c| c.is_ascii_digit()) {
            format!("{}-{}-{}", &raw[0..4], &raw[4..6], &raw[6..8])
        } else {
            raw.to_string()
        }
    }

    /// Splits a compact `YYYYMMDDHHMMSS` timestamp into `(YYYY-MM-DD, HH:MM:SS)`.
    fn split_datetime(raw: &str) -> (String, String) {
        if raw.len() >= 14 {
            let date = format!("{}-{}-{}", &raw[0..4], &raw[4..6], &raw[6..8]);
            let time = format!("{}:{}:{}", &raw[8..10], &raw[10..12], &raw[12..14]);
            (date, time)
        } else {
            (raw.to_string(), String::new())
        }
    }

    ///
    /// Parses a deframed segment sequence into one of the three message variants. The
    /// message type lives at `MSH` field index 8; everything else is looked up by segment
    /// name rather than position, so segment ordering in the wire frame does not matter.
    ///
    pub fn parse_message(segments: &[String]) -> AppResult<HospitalMessage> {
        let msh = find_segment_fields(segments, "MSH")
            .ok_or_else(|| AppError::Parse(format_compact!("message has no MSH segment")))?;
        let message_type = field(&msh, 8);

        match message_type {
            "ADT^A01" => {
                let pid = find_segment_fields(segments, "PID")
                    .ok_or_else(|| AppError::Parse(format_compact!("ADT^A01 missing PID segment")))?;
                Ok(HospitalMessage::Admission(PatientAdmissionMessage::new(
                    field(&pid, 3),
                    field(&pid, 5),
                    &reformat_date(field(&pid, 7)),
                    field(&pid, 8),
                )))
            }
            "ADT^A03" => {
                let pid = find_segment_fields(segments, "PID")
                    .ok_or_else(|| AppError::Parse(format_compact!("ADT^A03 missing PID segment")))?;
                Ok(HospitalMessage::Discharge(PatientDischargeMessage::new(field(&pid, 3))))
            }
            "ORU^R01" => {
                let pid = find_segment_fields(segments, "PID")
                    .ok_or_else(|| AppError::Parse(format_compact!("ORU^R01 missing PID segment")))?;
                let obr = find_segment_fields(segments, "OBR")
                    .ok_or_else(|| AppError::Parse(format_compact!("ORU^R01 missing OBR segment")))?;
                let obx = find_segment_fields(segments, "OBX")
                    .ok_or_else(|| AppError::Parse(format_compact!("ORU^R01 missing OBX segment")))?;

                let (test_date, test_time) = split_datetime(field(&obr, 7));
                let raw_value: f64 = field(&obx, 5)
                    .parse()
                    .map_err(|_| AppError::Parse(format_compact!("OBX-5 is not a number: {}", field(&obx, 5))))?;
                let creatinine_value = raw_value.min(MAX_CREATININE);

                Ok(HospitalMessage::TestResult(TestResultMessage::new(
                    field(&pid, 3),
                    &test_date,
                    &test_time,
                    creatinine_value,
                )))
            }
            other => Err(AppError::Parse(format_compact!("unsupported message type: {other}"))),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_parsing_admission_message() {
            let segments = vec![
                "MSH|^~\\&|SIMULATION|SOUTH RIVERSIDE|||20240102135300||ADT^A01|||2.5".to_string(),
                "PID|1||497030||ROSCOE DOHERTY||19870515|M".to_string(),
            ];
            let parsed = parse_message(&segments).expect("parse should succeed");
            match parsed {
                HospitalMessage::Admission(msg) => {
                    assert_eq!(msg.mrn, "497030");
                    assert_eq!(msg.name, "ROSCOE DOHERTY");
                    assert_eq!(msg.date_of_birth, "1987-05-15");
                    assert_eq!(msg.sex, "M");
                }
                other => panic!("Expected an Admission message, got {:?}", other),
            }
        }

        #[test]
        fn test_parsing_discharge_message() {
            let segments = vec![
                "MSH|^~\\&|SIMULATION|SOUTH RIVERSIDE|||20240804082900||ADT^A03|||2.5".to_string(),
                "PID|1||583036".to_string(),
            ];
            let parsed = parse_message(&segments).expect("parse should succeed");
            match parsed {
                HospitalMessage::Discharge(msg) => assert_eq!(msg.mrn, "583036"),
                other => panic!("Expected a Discharge message, got {:?}", other),
            }
        }

        #[test]
        fn test_parsing_test_result_message() {
            let segments = vec![
                "MSH|^~\\&|SIMULATION|SOUTH RIVERSIDE|||20240804082600||ORU^R01|||2.5".to_string(),
                "PID|1||853291".to_string(),
                "OBR|1||||||20240804082600".to_string(),
                "OBX|1|SN|CREATININE||80.3".to_string(),
            ];
            let parsed = parse_message(&segments).expect("parse should succeed");
            match parsed {
                HospitalMessage::TestResult(msg) => {
                    assert_eq!(msg.mrn, "853291");
                    assert_eq!(msg.test_date, "2024-08-04");
                    assert_eq!(msg.test_time, "08:26:00");
                    assert_eq!(msg.creatinine_value, 80.3);
                }
                other => panic!("Expected a TestResult message, got {:?}", other),
            }
        }

        #[test]
        fn test_creatinine_value_is_clamped_to_200() {
            let segments = vec![
                "MSH|^~\\&|SIMULATION|SOUTH RIVERSIDE|||20240804082600||ORU^R01|||2.5".to_string(),
                "PID|1||853291".to_string(),
                "OBR|1||||||20240804082600".to_string(),
                "OBX|1|SN|CREATININE||530.0".to_string(),
            ];
            let parsed = parse_message(&segments).unwrap();
            match parsed {
                HospitalMessage::TestResult(msg) => assert_eq!(msg.creatinine_value, 200.0),
                other => panic!("Expected a TestResult message, got {:?}", other),
            }
        }

        #[test]
        fn test_unknown_message_type_is_a_parse_error() {
            let segments = vec![
                "MSH|^~\\&|SIMULATION|SOUTH RIVERSIDE|||20240804082600||ZZZ^Z01|||2.5".to_string(),
            ];
            assert!(parse_message(&segments).is_err(), "Expected unsupported type to fail");
        }
    }
}
