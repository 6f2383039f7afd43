use crate::domain::{SmhError, SmhResult};
use serde::{Deserialize, Serialize};

/// Closed wavelength interval, normalised so that `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskInterval {
    start: f64,
    end: f64,
}

impl MaskInterval {
    pub fn new(first: f64, second: f64) -> SmhResult<Self> {
        if !first.is_finite() || !second.is_finite() {
            return Err(SmhError::input_validation(
                "MASK.INTERVAL",
                format!("mask endpoints must be finite, got [{first}, {second}]"),
            ));
        }
        Ok(Self {
            start: first.min(second),
            end: first.max(second),
        })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn contains(&self, wavelength: f64) -> bool {
        wavelength >= self.start && wavelength <= self.end
    }
}

/// Ordered mask intervals. In normal mode points inside any interval are
/// excluded; in antimask mode only points inside some interval are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaskSet {
    #[serde(default)]
    antimask: bool,
    #[serde(default)]
    intervals: Vec<MaskInterval>,
}

impl MaskSet {
    pub fn is_antimask(&self) -> bool {
        self.antimask
    }

    pub fn intervals(&self) -> &[MaskInterval] {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn add(&mut self, interval: MaskInterval) {
        self.intervals.push(interval);
    }

    /// Remove the most recently added interval containing `wavelength`.
    pub fn remove_containing(&mut self, wavelength: f64) -> bool {
        match self
            .intervals
            .iter()
            .rposition(|interval| interval.contains(wavelength))
        {
            Some(position) => {
                self.intervals.remove(position);
                true
            }
            None => false,
        }
    }

    /// Switching mode inverts what the stored intervals mean, so they are cleared.
    pub fn set_antimask(&mut self, antimask: bool) {
        if self.antimask != antimask {
            self.intervals.clear();
            self.antimask = antimask;
        }
    }

    pub fn allows(&self, wavelength: f64) -> bool {
        let inside = self
            .intervals
            .iter()
            .any(|interval| interval.contains(wavelength));
        if self.antimask { inside } else { !inside }
    }
}
