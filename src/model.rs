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
/// The trained AKI classifier is an opaque artifact: a function from a fixed-shape
/// feature vector `[age, sex_code, c1..c5]` to a binary label. This module only defines
/// the capability interface and a concrete JSON-weights logistic-regression
/// implementation of it; the interesting part (how the weights were trained) lives
/// entirely outside this crate.
///
pub mod aki_model {
    use crate::error::error::{AppError, AppResult};
    use serde::{Deserialize, Serialize};
    use std::fs;
    use std::path::Path;

    pub const FEATURE_LEN: usize = 7;
    pub type FeatureVector = [f64; FEATURE_LEN];

    ///
    /// Capability interface implemented by whatever classifier is actually loaded at
    /// startup. A systems-language port can swap in any equivalent serialized classifier
    /// behind this trait without touching the storage manager.
    ///
    pub trait AkiClassifier: Send {
        fn classify(&self, features: &FeatureVector) -> u8;
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LogisticRegressionWeights {
        pub intercept: f64,
        pub coefficients: [f64; FEATURE_LEN],
        pub threshold: f64,
    }

    ///
    /// A plain logistic-regression classifier loaded from a JSON weights file. This is the
    /// production default: simple, dependency-light (just `serde_json`), and easy to swap
    /// for a richer model artifact without changing the trait boundary.
    ///
    pub struct LogisticRegressionModel {
        weights: LogisticRegressionWeights,
    }

    impl LogisticRegressionModel {
        pub fn load(path: &Path) -> AppResult<Self> {
            let raw = fs::read_to_string(path)
                .map_err(|e| AppError::Fatal(compact_str::format_compact!("failed to read model file {}: {e}", path.display())))?;
            let weights: LogisticRegressionWeights = serde_json::from_str(&raw)
                .map_err(|e| AppError::Fatal(compact_str::format_compact!("failed to parse model file {}: {e}", path.display())))?;
            Ok(Self { weights })
        }
    }

    impl AkiClassifier for LogisticRegressionModel {
        fn classify(&self, features: &FeatureVector) -> u8 {
            let mut z = self.weights.intercept;
            for i in 0..FEATURE_LEN {
                z += self.weights.coefficients[i] * features[i];
            }
            let probability = 1.0 / (1.0 + (-z).exp());
            if probability >= self.weights.threshold {
                1
            } else {
                0
            }
        }
    }

    #[cfg(test)]
    pub mod test_support {
        use super::{AkiClassifier, FeatureVector};

        /// A deterministic test double: positive iff the most recent creatinine reading
        /// (feature index 6) exceeds a fixed threshold. Keeps unit tests independent of
        /// any real trained weights.
        pub struct ThresholdStub {
            pub threshold: f64,
        }

        impl AkiClassifier for ThresholdStub {
            fn classify(&self, features: &FeatureVector) -> u8 {
                if features[6] > self.threshold {
                    1
                } else {
                    0
                }
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::test_support::ThresholdStub;
        use super::*;

        #[test]
        fn test_threshold_stub_positive() {
            let model = ThresholdStub { threshold: 150.0 };
            let features: FeatureVector = [40.0, 1.0, 60.7, 62.3, 53.0, 80.0, 204.56];
            assert_eq!(model.classify(&features), 1);
        }

        #[test]
        fn test_threshold_stub_negative() {
            let model = ThresholdStub { threshold: 150.0 };
            let features: FeatureVector = [70.0, 0.0, 60.7, 60.7, 60.7, 60.7, 61.7];
            assert_eq!(model.classify(&features), 0);
        }
    }
}
