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
/// Owns the two patient maps, the message log, and the classifier. This is the hardest
/// component: everything about durability and the at-most-one-page guarantee lives here.
///
pub mod storage_manager {
    use crate::error::error::{AppError, AppResult};
    use crate::messages::hospital_message::{
        HospitalMessage, PatientAdmissionMessage, PatientDischargeMessage, TestResultMessage,
    };
    use crate::metrics::watch_metrics::{self, Source};
    use crate::model::aki_model::{AkiClassifier, FeatureVector, FEATURE_LEN};
    use ahash::AHashMap;
    use chrono::{Datelike, NaiveDate, Utc};
    use compact_str::{format_compact, CompactString};
    use std::fs::{self, OpenOptions};
    use std::io::{BufRead, BufReader, Write};
    use std::path::{Path, PathBuf};

    const LOG_HEADER: &str = "timestamp,type,mrn,additional_info";
    const TYPE_ADMISSION: &str = "Admission";
    const TYPE_DISCHARGE: &str = "Discharge";
    const TYPE_TEST_RESULT: &str = "TestResult";

    #[derive(Debug, Clone, PartialEq)]
    pub struct CurrentPatientRecord {
        pub name: CompactString,
        pub date_of_birth: CompactString,
        pub sex: CompactString,
        pub creatinine_results: Vec<f64>,
        pub previous_positive_aki_prediction: bool,
    }

    /// Counters for messages that were malformed enough during replay that they had to be
    /// swallowed rather than applied (e.g. a discharge for an MRN the log never admitted).
    #[derive(Debug, Default, Clone, Copy)]
    pub struct ReinstatementErrors {
        pub discharge_errors: u64,
        pub test_result_errors: u64,
    }

    pub struct StorageManager {
        pub current_patients: AHashMap<CompactString, CurrentPatientRecord>,
        pub creatinine_results_history: AHashMap<CompactString, Vec<f64>>,
        message_log_path: PathBuf,
        model: Box<dyn AkiClassifier>,
        pub reinstatement_errors: ReinstatementErrors,
    }

    impl StorageManager {
        pub fn new(message_log_path: impl Into<PathBuf>, model: Box<dyn AkiClassifier>) -> Self {
            Self {
                current_patients: AHashMap::new(),
                creatinine_results_history: AHashMap::new(),
                message_log_path: message_log_path.into(),
                model,
                reinstatement_errors: ReinstatementErrors::default(),
            }
        }

        ///
        /// Reads the bootstrap history CSV, then either seeds a fresh message log or
        /// replays an existing one, per `wipe_log`.
        ///
        pub fn initialise_database(&mut self, history_path: &Path, wipe_log: bool) -> AppResult<()> {
            self.load_history(history_path)?;

            let log_exists = self.message_log_path.exists();
            if !log_exists {
                self.write_log_header()?;
            } else if wipe_log {
                fs::write(&self.message_log_path, format_compact!("{LOG_HEADER}\n").as_str())?;
            } else {
                self.reinstate_all_past_messages()?;
            }
            Ok(())
        }

        fn write_log_header(&self) -> AppResult<()> {
            fs::write(&self.message_log_path, format_compact!("{LOG_HEADER}\n").as_str())?;
            Ok(())
        }

        /// Header row skipped; MRN in column 0; creatinine values are the non-empty cells
        /// at even-indexed columns (2, 4, 6, ...), parsed as floats.
        fn load_history(&mut self, history_path: &Path) -> AppResult<()> {
            if !history_path.exists() {
                return Ok(());
            }
            let file = fs::File::open(history_path)?;
            let reader = BufReader::new(file);

            for (i, line) in reader.lines().enumerate() {
                let line = line?;
                if i == 0 || line.trim().is_empty() {
                    continue;
                }
                let columns: Vec<&str> = line.split(',').collect();
                if columns.is_empty() {
                    continue;
                }
                let mrn = CompactString::from(columns[0]);
                let mut values = Vec::new();
                let mut idx = 2usize;
                while idx < columns.len() {
                    let cell = columns[idx].trim();
                    if !cell.is_empty() {
                        if let Ok(value) = cell.parse::<f64>() {
                            values.push(value);
                        }
                    }
                    idx += 2;
                }
                self.creatinine_results_history.insert(mrn, values);
            }
            Ok(())
        }

        /// Seeds from a snapshot of history[mrn] if present, otherwise starts empty.
        /// Re-admission during the same session overwrites the existing record.
        pub fn add_admitted_patient_to_current_patients(&mut self, msg: &PatientAdmissionMessage) {
            let seeded_results = self
                .creatinine_results_history
                .get(&msg.mrn)
                .cloned()
                .unwrap_or_default();
            self.current_patients.insert(
                msg.mrn.clone(),
                CurrentPatientRecord {
                    name: msg.name.clone(),
                    date_of_birth: msg.date_of_birth.clone(),
                    sex: msg.sex.clone(),
                    creatinine_results: seeded_results,
                    previous_positive_aki_prediction: false,
                },
            );
        }

        pub fn add_test_result_to_current_patients(&mut self, msg: &TestResultMessage) -> AppResult<()> {
            match self.current_patients.get_mut(&msg.mrn) {
                Some(patient) => {
                    patient.creatinine_results.push(msg.creatinine_value);
                    Ok(())
                }
                None => Err(AppError::Storage(format_compact!(
                    "test result for unadmitted MRN {}",
                    msg.mrn
                ))),
            }
        }

        /// Copies the departing patient's accumulated results into the history map. Invoked
        /// by the caller before `remove_patient_from_current_patients` during live
        /// processing only; replay skips this so the bootstrap history CSV remains the
        /// sole authority for pre-admission history.
        pub fn update_patients_data_in_creatinine_results_history(
            &mut self,
            msg: &PatientDischargeMessage,
        ) -> AppResult<()> {
            let patient = self
                .current_patients
                .get(&msg.mrn)
                .ok_or_else(|| AppError::Storage(format_compact!("discharge for unadmitted MRN {}", msg.mrn)))?;
            self.creatinine_results_history
                .entry(msg.mrn.clone())
                .or_default()
                .extend(patient.creatinine_results.iter().copied());
            Ok(())
        }

        pub fn remove_patient_from_current_patients(&mut self, msg: &PatientDischargeMessage) -> AppResult<()> {
            match self.current_patients.remove(&msg.mrn) {
                Some(_) => Ok(()),
                None => Err(AppError::Storage(format_compact!("discharge for unadmitted MRN {}", msg.mrn))),
            }
        }

        pub fn no_positive_aki_prediction_so_far(&self, mrn: &str) -> bool {
            match self.current_patients.get(mrn) {
                Some(patient) => !patient.previous_positive_aki_prediction,
                None => false,
            }
        }

        /// Monotonic false→true; never flips back within an admission.
        pub fn update_positive_aki_prediction_to_current_patients(&mut self, mrn: &str) {
            if let Some(patient) = self.current_patients.get_mut(mrn) {
                patient.previous_positive_aki_prediction = true;
            }
        }

        pub fn append_to_log(&self, msg: &HospitalMessage) -> AppResult<()> {
            let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
            let (type_label, mrn, additional_info) = match msg {
                HospitalMessage::Admission(m) => (
                    TYPE_ADMISSION,
                    m.mrn.as_str(),
                    format_compact!("Name: {}. DOB: {}. Sex: {}", m.name, m.date_of_birth, m.sex),
                ),
                HospitalMessage::Discharge(m) => (TYPE_DISCHARGE, m.mrn.as_str(), CompactString::new("")),
                HospitalMessage::TestResult(m) => (
                    TYPE_TEST_RESULT,
                    m.mrn.as_str(),
                    format_compact!(
                        "Test Date: {}. Test Time: {}. Creatinine Value: {}",
                        m.test_date,
                        m.test_time,
                        m.creatinine_value
                    ),
                ),
            };

            let mut file = OpenOptions::new().append(true).open(&self.message_log_path)?;
            writeln!(file, "{timestamp},{type_label},{mrn},{additional_info}")?;
            Ok(())
        }

        pub fn determine_age(date_of_birth: &str, today: NaiveDate) -> AppResult<i64> {
            let dob = NaiveDate::parse_from_str(date_of_birth, "%Y-%m-%d")
                .map_err(|e| AppError::Storage(format_compact!("invalid date of birth {date_of_birth}: {e}")))?;
            let mut age = today.year() as i64 - dob.year() as i64;
            if (today.month(), today.day()) < (dob.month(), dob.day()) {
                age -= 1;
            }
            Ok(age)
        }

        /// Builds `[age, sex_code, c1..c5]`: the five most recent creatinine results, or
        /// the available results right-padded by repeating the last value up to length 5.
        pub fn predict_aki(&self, mrn: &str) -> AppResult<u8> {
            let patient = self
                .current_patients
                .get(mrn)
                .ok_or_else(|| AppError::Storage(format_compact!("predict_aki for unadmitted MRN {mrn}")))?;

            let age = Self::determine_age(&patient.date_of_birth, Utc::now().date_naive())?;
            let sex_code: f64 = if patient.sex.to_lowercase() == "m" { 0.0 } else { 1.0 };

            let results = &patient.creatinine_results;
            let mut recent: Vec<f64> = if results.len() >= 5 {
                results[results.len() - 5..].to_vec()
            } else {
                let mut padded = results.clone();
                let last = *padded.last().unwrap_or(&0.0);
                while padded.len() < 5 {
                    padded.push(last);
                }
                padded
            };
            recent.truncate(5);

            let mut features: FeatureVector = [0.0; FEATURE_LEN];
            features[0] = age as f64;
            features[1] = sex_code;
            for (i, value) in recent.into_iter().enumerate() {
                features[2 + i] = value;
            }

            Ok(self.model.classify(&features))
        }

        ///
        /// Replays the message log in file order. Discharge and TestResult rows that
        /// reference an MRN the log never admitted are swallowed into the error counters
        /// rather than aborting the replay. Positive predictions during replay still flip
        /// the flag (so a restart never re-pages) but never invoke the pager. Every
        /// counter incremented here carries `source="reinstated"` so replay never doubles
        /// the live counts.
        ///
        pub fn reinstate_all_past_messages(&mut self) -> AppResult<()> {
            let file = fs::File::open(&self.message_log_path)?;
            let reader = BufReader::new(file);

            for (i, line) in reader.lines().enumerate() {
                let line = line?;
                if i == 0 || line.trim().is_empty() {
                    continue;
                }
                let parts: Vec<&str> = line.splitn(4, ',').collect();
                if parts.len() < 3 {
                    continue;
                }
                let type_label = parts[1];
                let mrn = parts[2];
                let additional_info = parts.get(3).copied().unwrap_or("");

                watch_metrics::count(watch_metrics::OVERALL_MESSAGES_RECEIVED, Source::Reinstated);

                match type_label {
                    TYPE_ADMISSION => {
                        watch_metrics::count(watch_metrics::ADMISSION_MESSAGES_RECEIVED, Source::Reinstated);
                        let fields = parse_additional_info(additional_info);
                        let admission = PatientAdmissionMessage::new(
                            mrn,
                            fields.get("Name").map(|s| s.as_str()).unwrap_or(""),
                            fields.get("DOB").map(|s| s.as_str()).unwrap_or(""),
                            fields.get("Sex").map(|s| s.as_str()).unwrap_or(""),
                        );
                        self.add_admitted_patient_to_current_patients(&admission);
                        watch_metrics::count(watch_metrics::SUCCESSFUL_ADMISSION_HANDLINGS, Source::Reinstated);
                    }
                    TYPE_DISCHARGE => {
                        watch_metrics::count(watch_metrics::DISCHARGE_MESSAGES_RECEIVED, Source::Reinstated);
                        let discharge = PatientDischargeMessage::new(mrn);
                        if self.remove_patient_from_current_patients(&discharge).is_err() {
                            self.reinstatement_errors.discharge_errors += 1;
                            watch_metrics::count(watch_metrics::MESSAGE_ERRORS, Source::Reinstated);
                        } else {
                            watch_metrics::count(watch_metrics::SUCCESSFUL_DISCHARGE_HANDLINGS, Source::Reinstated);
                        }
                    }
                    TYPE_TEST_RESULT => {
                        watch_metrics::count(watch_metrics::TEST_RESULT_MESSAGES_RECEIVED, Source::Reinstated);
                        let fields = parse_additional_info(additional_info);
                        let value: f64 = fields
                            .get("Creatinine Value")
                            .and_then(|s| s.parse().ok())
                            .unwrap_or(0.0);
                        let test_result = TestResultMessage::new(
                            mrn,
                            fields.get("Test Date").map(|s| s.as_str()).unwrap_or(""),
                            fields.get("Test Time").map(|s| s.as_str()).unwrap_or(""),
                            value,
                        );
                        if self.add_test_result_to_current_patients(&test_result).is_err() {
                            self.reinstatement_errors.test_result_errors += 1;
                            watch_metrics::count(watch_metrics::MESSAGE_ERRORS, Source::Reinstated);
                        } else {
                            watch_metrics::count(watch_metrics::TEST_RESULT_SUCCESSFUL_HANDLED, Source::Reinstated);
                            if self.no_positive_aki_prediction_so_far(mrn) {
                                match self.predict_aki(mrn) {
                                    Ok(1) => {
                                        watch_metrics::count(watch_metrics::POSITIVE_AKI_PREDICTIONS, Source::Reinstated);
                                        self.update_positive_aki_prediction_to_current_patients(mrn);
                                    }
                                    Ok(_) => {
                                        watch_metrics::count(watch_metrics::NEGATIVE_AKI_PREDICTIONS, Source::Reinstated);
                                    }
                                    Err(_) => {}
                                }
                            }
                        }
                    }
                    _ => {
                        watch_metrics::count(watch_metrics::MESSAGE_ERRORS, Source::Reinstated);
                    }
                }
            }
            Ok(())
        }
    }

    /// Parses `"Name: John Doe. DOB: 1980-01-01. Sex: M"` into a `key -> value` map.
    fn parse_additional_info(raw: &str) -> AHashMap<String, String> {
        let mut map = AHashMap::new();
        for clause in raw.split(". ") {
            if let Some((key, value)) = clause.split_once(": ") {
                map.insert(key.trim().to_string(), value.trim_end_matches('.').trim().to_string());
            }
        }
        map
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::model::aki_model::test_support::ThresholdStub;
        use std::sync::atomic::{AtomicU64, Ordering};

        static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

        fn temp_path(label: &str) -> PathBuf {
            let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
            std::env::temp_dir().join(format!("rumtk_aki_watch_{label}_{id}.csv"))
        }

        fn new_manager(log_path: &Path) -> StorageManager {
            StorageManager::new(log_path.to_path_buf(), Box::new(ThresholdStub { threshold: 150.0 }))
        }

        #[test]
        fn test_s1_persistence_across_admissions() {
            let log_path = temp_path("s1");
            let mut manager = new_manager(&log_path);
            manager.write_log_header().unwrap();

            manager.add_admitted_patient_to_current_patients(&PatientAdmissionMessage::new(
                "001", "John Doe", "1980-01-01", "M",
            ));
            manager
                .add_test_result_to_current_patients(&TestResultMessage::new("001", "2023-01-01", "08:00:00", 1.2))
                .unwrap();
            assert_eq!(manager.current_patients["001"].creatinine_results, vec![1.2]);

            manager
                .update_patients_data_in_creatinine_results_history(&PatientDischargeMessage::new("001"))
                .unwrap();
            manager
                .remove_patient_from_current_patients(&PatientDischargeMessage::new("001"))
                .unwrap();

            manager.add_admitted_patient_to_current_patients(&PatientAdmissionMessage::new(
                "001", "John Doe", "1980-01-01", "M",
            ));

            assert!(manager.creatinine_results_history.contains_key("001"));
            assert_eq!(manager.creatinine_results_history["001"], vec![1.2]);
            assert_eq!(manager.current_patients["001"].creatinine_results, vec![1.2]);

            let _ = fs::remove_file(&log_path);
        }

        #[test]
        fn test_predict_aki_positive_case() {
            let log_path = temp_path("predict_pos");
            let mut manager = new_manager(&log_path);
            manager.current_patients.insert(
                CompactString::from("12345"),
                CurrentPatientRecord {
                    name: CompactString::from("Jane Doe"),
                    date_of_birth: CompactString::from("1990-01-01"),
                    sex: CompactString::from("f"),
                    creatinine_results: vec![60.7, 62.3, 53.0, 80.0, 165.0, 204.56],
                    previous_positive_aki_prediction: false,
                },
            );
            assert_eq!(manager.predict_aki("12345").unwrap(), 1);
            let _ = fs::remove_file(&log_path);
        }

        #[test]
        fn test_predict_aki_negative_case() {
            let log_path = temp_path("predict_neg");
            let mut manager = new_manager(&log_path);
            manager.current_patients.insert(
                CompactString::from("654321"),
                CurrentPatientRecord {
                    name: CompactString::from("Jon Doe"),
                    date_of_birth: CompactString::from("1950-01-01"),
                    sex: CompactString::from("m"),
                    creatinine_results: vec![60.7, 60.7, 61.7],
                    previous_positive_aki_prediction: false,
                },
            );
            assert_eq!(manager.predict_aki("654321").unwrap(), 0);
            let _ = fs::remove_file(&log_path);
        }

        #[test]
        fn test_add_test_result_fails_for_unadmitted_mrn() {
            let log_path = temp_path("unadmitted");
            let mut manager = new_manager(&log_path);
            let result = manager
                .add_test_result_to_current_patients(&TestResultMessage::new("999", "2023-01-01", "08:00:00", 1.0));
            assert!(result.is_err());
        }

        #[test]
        fn test_s4_crash_recovery() {
            let history_path = temp_path("s4_history");
            let log_path = temp_path("s4_log");

            // Synthetic history fixture: values live at even-indexed columns from index 2.
            fs::write(
                &history_path,
                "mrn,ignored,value,date,value,date,value,date,value,date,value,date,value,date\n\
                 822825,x,68.58,2020-01-01,70.58,2020-02-01,64.15,2020-03-01,48.39,2020-04-01,58.01,2020-05-01,85.93,2020-06-01\n\
                 172293,x,111.98,2020-01-01,91.21,2020-02-01,105.09,2020-03-01,93.44,2020-04-01,110.52,2020-05-01\n",
            )
            .unwrap();

            {
                let mut manager = new_manager(&log_path);
                manager.initialise_database(&history_path, true).unwrap();

                for admission in [
                    PatientAdmissionMessage::new("123", "John Doe", "1990-01-01", "M"),
                    PatientAdmissionMessage::new("124", "Jane Doe", "1991-01-01", "F"),
                    PatientAdmissionMessage::new("822825", "John Smith", "1992-01-01", "M"),
                    PatientAdmissionMessage::new("172293", "Jane Smith", "1993-01-01", "F"),
                ] {
                    manager.add_admitted_patient_to_current_patients(&admission);
                    manager.append_to_log(&HospitalMessage::Admission(admission)).unwrap();
                }

                for test_result in [
                    TestResultMessage::new("124", "2021-01-01", "08:00:00", 1.2),
                    TestResultMessage::new("822825", "2021-01-01", "08:00:00", 101.2),
                    TestResultMessage::new("172293", "2021-01-01", "08:00:00", 56.4),
                    TestResultMessage::new("172293", "2021-01-01", "08:00:00", 74.2),
                ] {
                    manager.add_test_result_to_current_patients(&test_result).unwrap();
                    manager.append_to_log(&HospitalMessage::TestResult(test_result)).unwrap();
                }

                let discharge = PatientDischargeMessage::new("123");
                manager.update_patients_data_in_creatinine_results_history(&discharge).unwrap();
                manager.remove_patient_from_current_patients(&discharge).unwrap();
                manager.append_to_log(&HospitalMessage::Discharge(discharge)).unwrap();
            }

            // Simulate a crash: fresh manager, replay from disk.
            let mut recovered = new_manager(&log_path);
            recovered.initialise_database(&history_path, false).unwrap();

            assert!(!recovered.current_patients.contains_key("123"));
            assert!(recovered.current_patients.contains_key("124"));
            assert!(recovered.current_patients.contains_key("822825"));
            assert!(recovered.current_patients.contains_key("172293"));

            assert_eq!(recovered.current_patients["124"].creatinine_results, vec![1.2]);
            assert_eq!(
                recovered.current_patients["822825"].creatinine_results,
                vec![68.58, 70.58, 64.15, 48.39, 58.01, 85.93, 101.2]
            );
            assert_eq!(
                recovered.current_patients["172293"].creatinine_results,
                vec![111.98, 91.21, 105.09, 93.44, 110.52, 56.4, 74.2]
            );

            let _ = fs::remove_file(&history_path);
            let _ = fs::remove_file(&log_path);
        }

        #[test]
        fn test_mark_positive_is_monotonic() {
            let log_path = temp_path("monotonic");
            let mut manager = new_manager(&log_path);
            manager.add_admitted_patient_to_current_patients(&PatientAdmissionMessage::new(
                "555", "Test Patient", "2000-01-01", "F",
            ));
            assert!(manager.no_positive_aki_prediction_so_far("555"));
            manager.update_positive_aki_prediction_to_current_patients("555");
            assert!(!manager.no_positive_aki_prediction_so_far("555"));
        }
    }
}
