//! Per-device-model axis calibration.
//!
//! A model maps to a 3×3 matrix applied to the raw (x, y, z) reading.
//! Unknown models pass through unchanged.

use std::collections::HashMap;

use nalgebra::{Matrix3, Vector3};

/// Model identifier of the MetaMotion R board
pub const METAMOTION_R: &str = "METAMOTION_R";

/// Device model used when none is configured
pub const UNKNOWN_MODEL: &str = "NA";

#[derive(Debug, Clone)]
pub struct AxisCalibration {
    matrices: HashMap<String, Matrix3<f64>>,
}

impl AxisCalibration {
    /// Empty table: every model passes through.
    pub fn identity() -> Self {
        Self {
            matrices: HashMap::new(),
        }
    }

    /// Table with the built-in device models.
    pub fn builtin() -> Self {
        // METAMOTION_R: (x, y, z) -> (y, -x, z)
        #[rustfmt::skip]
        let metamotion = Matrix3::new(
             0.0, 1.0, 0.0,
            -1.0, 0.0, 0.0,
             0.0, 0.0, 1.0,
        );
        Self::identity().with_model(METAMOTION_R, metamotion)
    }

    pub fn with_model(mut self, model: impl Into<String>, matrix: Matrix3<f64>) -> Self {
        self.matrices.insert(model.into(), matrix);
        self
    }

    pub fn is_calibrated(&self, model: &str) -> bool {
        self.matrices.contains_key(model)
    }

    pub fn matrix_for(&self, model: &str) -> Matrix3<f64> {
        self.matrices
            .get(model)
            .copied()
            .unwrap_or_else(Matrix3::identity)
    }

    /// Apply the model's matrix to one reading.
    pub fn apply(&self, model: &str, x: f64, y: f64, z: f64) -> (f64, f64, f64) {
        match self.matrices.get(model) {
            Some(matrix) => {
                let v = matrix * Vector3::new(x, y, z);
                (v.x, v.y, v.z)
            }
            None => (x, y, z),
        }
    }
}

impl Default for AxisCalibration {
    fn default() -> Self {
        Self::builtin()
    }
}
