//! # Hypercube discretization
//!
//! This crate turns an n-dimensional float vector into integer hypercubes so
//! that numerically close vectors share at least one cube, and derives 64-bit
//! keys from those cubes for an external nearest-neighbour index.
//!
//! ## Contract
//!
//! - Every operation is a pure function of its explicit inputs: no I/O, no
//!   clocks, no global state. Hashers are passed per call.
//! - [`HyperParams`] is validated on every call; invalid parameters fail
//!   before any output is produced.
//! - For the same `(vector, params)`, [`central_cube`] is always a member of
//!   [`cube_set`].
//!
//! ## Pipeline
//!
//! 1.  **Parameters**: [`params`] (or [`HyperParams::discretization`]) derives
//!     the bucket width and absolute epsilon on the value axis.
//! 2.  **Cubes**: [`cube_set`] returns every plausible cube under boundary
//!     uncertainty (`2^b` cubes for `b` ambiguous dimensions); this is what a
//!     database record is indexed under. [`central_cube`] returns the one
//!     unambiguous cube; this is what a query looks up.
//! 3.  **Hashes**: [`hash_set`] and [`central_hash`] map cubes to `u64` keys
//!     through any [`CubeHasher`].
//!
//! ## Example Usage
//!
//! ```
//! use hypercube::{central_cube, central_hash, cube_set, hash_set, Fnv1aHasher, HyperParams};
//!
//! let params = HyperParams::new()
//!     .with_num_buckets(10)
//!     .with_range(0.0, 255.0)
//!     .with_eps_percent(0.25);
//!
//! let record = [25.5, 0.01, 210.3, 93.9, 6.6, 9.1, 254.9];
//! let cubes = cube_set(&record, &params).unwrap();
//! assert_eq!(cubes.len(), 4);
//!
//! let keys = hash_set(&cubes, &Fnv1aHasher).unwrap();
//! let query = central_cube(&record, &params).unwrap();
//! let query_key = central_hash(&query, &Fnv1aHasher).unwrap();
//! assert!(keys.contains(&query_key));
//! ```
//!
pub mod config;
pub mod cubes;
pub mod hash;

pub use crate::config::{params, Discretization, HyperError, HyperParams, MAX_EPS_PERCENT};
pub use crate::cubes::{central_cube, cube_set, Cube, CubeSet};
pub use crate::hash::{
    central_hash, decimal_hash, fnv1a_hash, hash_set, CubeHasher, DecimalHasher, Fnv1aHasher,
    HashStrategy, Xxh3Hasher, DECIMAL_MAX_BUCKETS, DECIMAL_MAX_DIMS,
};

/// Current discretization algorithm version.
pub const HYPERCUBE_VERSION: u16 = 1;

/// Human-readable algorithm identifier.
pub const HYPERCUBE_ALGORITHM: &str = "rescale_floor_eps_branch_v1";
