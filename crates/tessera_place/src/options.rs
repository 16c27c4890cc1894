//! Placement options.
//!
//! All knobs have defaults; a TOML table with any subset of the fields can be
//! loaded with [`PlaceOptions::from_toml_str`]. Unknown keys are rejected so
//! typos fail loudly.

use serde::Deserialize;

use crate::anneal::Deadline;
use crate::error::PlaceError;
use crate::walk::WalkParams;

/// Options for one placement run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlaceOptions {
    /// Allow a register to co-locate with the PE driving it. Forced off for
    /// FPGA targets.
    pub fold_reg: bool,
    /// Seed for all RNG streams.
    pub seed: u64,
    /// Overrides the cluster-count heuristic when set.
    pub num_clusters: Option<usize>,
    /// Selects the FPGA cluster heuristic and disables register folding.
    pub is_fpga: bool,
    /// Overlap tolerance divisor for cluster boxes: a cluster may overlap
    /// others by at most `|cluster| / place_factor` cells.
    pub place_factor: u32,
    /// Number of squeeze compaction passes.
    pub squeeze_iter: u32,
    /// Walk-generation parameters; defaults to the device-family profile.
    pub walk: Option<WalkParams>,
    /// Worker-pool size; `None` uses the process-wide default.
    pub workers: Option<usize>,
    /// Wall-clock budget per SA phase, in seconds.
    pub sa_timeout_secs: Option<f64>,
    /// Run the global refiner on the aggressive schedule.
    pub aggressive_refine: bool,
}

impl Default for PlaceOptions {
    fn default() -> Self {
        Self {
            fold_reg: true,
            seed: 0,
            num_clusters: None,
            is_fpga: false,
            place_factor: 6,
            squeeze_iter: 4,
            walk: None,
            workers: None,
            sa_timeout_secs: None,
            aggressive_refine: false,
        }
    }
}

impl PlaceOptions {
    /// Parses options from a TOML table.
    pub fn from_toml_str(text: &str) -> Result<Self, PlaceError> {
        let options: PlaceOptions = toml::from_str(text)
            .map_err(|e| PlaceError::InvalidInput(format!("failed to parse options: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    /// Rejects meaningless knob values.
    pub fn validate(&self) -> Result<(), PlaceError> {
        if self.place_factor == 0 {
            return Err(PlaceError::InvalidInput(
                "place_factor must be positive".to_string(),
            ));
        }
        if self.num_clusters == Some(0) {
            return Err(PlaceError::InvalidInput(
                "num_clusters must be positive when set".to_string(),
            ));
        }
        if matches!(self.sa_timeout_secs, Some(secs) if !secs.is_finite() || secs < 0.0) {
            return Err(PlaceError::InvalidInput(
                "sa_timeout_secs must be a non-negative number".to_string(),
            ));
        }
        if let Some(walk) = &self.walk {
            if walk.p <= 0.0 || walk.q <= 0.0 {
                return Err(PlaceError::InvalidInput(
                    "walk parameters p and q must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Register folding is a CGRA feature; FPGA targets never fold.
    pub fn effective_fold_reg(&self) -> bool {
        self.fold_reg && !self.is_fpga
    }

    /// The walk profile: explicit parameters or the device-family default.
    pub fn effective_walk(&self) -> WalkParams {
        self.walk
            .clone()
            .unwrap_or_else(|| WalkParams::for_device(self.is_fpga))
    }

    /// A fresh per-phase deadline from the configured budget.
    pub fn phase_deadline(&self) -> Deadline {
        Deadline::from_secs(self.sa_timeout_secs)
    }
}
