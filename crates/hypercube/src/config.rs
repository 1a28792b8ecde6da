//! Discretization parameters and error types for hypercube hashing.
//!
//! [`HyperParams`] is the declarative configuration shared by every call that
//! discretizes vectors of one "schema". It is immutable once built and holds no
//! I/O or environment-dependent state, so cube generation stays a pure function
//! of `(vector, params)`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound (exclusive) for [`HyperParams::eps_percent`].
///
/// At 0.5 or above a single value could sit within the uncertainty margin of
/// three buckets at once, which breaks the two-candidates-per-dimension rule.
pub const MAX_EPS_PERCENT: f64 = 0.5;

/// Space discretization parameters.
///
/// The same `min`/`max` range applies to every dimension of a vector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HyperParams {
    /// Number of buckets per dimension.
    pub num_buckets: usize,
    /// Smallest expected component value (0 for pixel values).
    pub min: f64,
    /// Largest expected component value (255 for pixel values).
    pub max: f64,
    /// Uncertainty interval as a fraction of the bucket width, e.g. 0.25 for
    /// an epsilon of a quarter bucket. Must be in `[0, 0.5)`.
    pub eps_percent: f64,
}

impl HyperParams {
    /// Create parameters with the default pixel-range configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of buckets per dimension.
    /// More buckets = finer cubes, fewer neighbours per cube.
    pub fn with_num_buckets(mut self, num_buckets: usize) -> Self {
        self.num_buckets = num_buckets;
        self
    }

    /// Set the value range shared by all dimensions.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Set the uncertainty fraction. Larger values branch more often and grow
    /// cube sets faster.
    pub fn with_eps_percent(mut self, eps_percent: f64) -> Self {
        self.eps_percent = eps_percent;
        self
    }

    /// Validate the parameters.
    pub fn validate(&self) -> Result<(), HyperError> {
        if self.eps_percent.is_nan() || self.eps_percent >= MAX_EPS_PERCENT {
            return Err(HyperError::invalid_config(format!(
                "eps_percent must be less than {MAX_EPS_PERCENT} (got {}); decrease num_buckets instead",
                self.eps_percent
            )));
        }
        if self.eps_percent < 0.0 {
            return Err(HyperError::invalid_config(format!(
                "eps_percent must be >= 0 (got {})",
                self.eps_percent
            )));
        }
        if self.num_buckets == 0 {
            return Err(HyperError::invalid_config("num_buckets must be >= 1 (got 0)"));
        }
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(HyperError::invalid_config(format!(
                "min and max must be finite (got min={}, max={})",
                self.min, self.max
            )));
        }
        if self.max <= self.min {
            return Err(HyperError::invalid_config(format!(
                "max must be greater than min (got min={}, max={})",
                self.min, self.max
            )));
        }
        if !(self.max - self.min).is_finite() {
            return Err(HyperError::invalid_config(format!(
                "max - min must be finite (got min={}, max={})",
                self.min, self.max
            )));
        }
        Ok(())
    }

    /// Derived bucket geometry on the original value axis.
    pub fn discretization(&self) -> Result<Discretization, HyperError> {
        self.validate()?;
        let bucket_width = (self.max - self.min) / self.num_buckets as f64;
        Ok(Discretization {
            bucket_width,
            eps: self.eps_percent * bucket_width,
        })
    }
}

impl Default for HyperParams {
    fn default() -> Self {
        Self {
            num_buckets: 10,
            min: 0.0,
            max: 255.0,
            eps_percent: 0.25,
        }
    }
}

/// Bucket geometry derived from [`HyperParams`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Discretization {
    /// Width of one bucket, `(max - min) / num_buckets`.
    pub bucket_width: f64,
    /// Absolute uncertainty margin, `eps_percent * bucket_width`.
    pub eps: f64,
}

/// Derive `(bucket_width, eps)` from raw parameters.
///
/// Fails with [`HyperError::InvalidConfiguration`] when `eps_percent >= 0.5`
/// or the remaining parameters are unusable.
pub fn params(
    num_buckets: usize,
    min: f64,
    max: f64,
    eps_percent: f64,
) -> Result<Discretization, HyperError> {
    HyperParams {
        num_buckets,
        min,
        max,
        eps_percent,
    }
    .discretization()
}

/// Errors returned by discretization and hashing.
///
/// None of these are transient; retrying with the same inputs fails the same
/// way.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HyperError {
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("decimal hash domain exceeded: {reason}; use the FNV-1a hash instead")]
    HashDomainExceeded { reason: String },

    #[error("invariant violation: cube has {actual} coordinates, vector has {expected}")]
    InvariantViolation { expected: usize, actual: usize },

    #[error("vector component {index} is not a finite number")]
    NonFiniteComponent { index: usize },
}

impl HyperError {
    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        HyperError::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    pub(crate) fn hash_domain(reason: impl Into<String>) -> Self {
        HyperError::HashDomainExceeded {
            reason: reason.into(),
        }
    }
}
