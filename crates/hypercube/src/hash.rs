//! 64-bit hashing of hypercubes.
//!
//! A hasher turns one [`Cube`] into an opaque `u64` key for an external index.
//! Hashers are passed explicitly to every call; there is no process-wide
//! default.
//!
//! # Built-in strategies
//!
//! | Strategy | Collisions | Domain |
//! |----------|------------|--------|
//! | [`DecimalHasher`] | none | `num_buckets <= 10`, `dims <= 19`, coords `0..=9` |
//! | [`Fnv1aHasher`] | rare | unbounded |
//! | [`Xxh3Hasher`] | rare | unbounded, seeded |
//!
//! FNV-1a and XXH3 both hash the cube serialized as consecutive 8-byte
//! little-endian `i64` coordinates in dimension order:
//!
//! ```text
//! c0.to_le_bytes() || c1.to_le_bytes() || ... || c(n-1).to_le_bytes()
//! ```
//!
//! # Examples
//!
//! ```rust
//! use hypercube::{Cube, CubeHasher, DecimalHasher, Fnv1aHasher};
//!
//! let cube = Cube::new(vec![3, 2, 0, 1, 1, 4, 1, 0]);
//! let decimal = DecimalHasher::new(10).unwrap();
//! assert_eq!(decimal.hash_cube(&cube).unwrap(), 32011410);
//!
//! let fnv = Fnv1aHasher;
//! assert_eq!(fnv.hash_cube(&cube).unwrap(), fnv.hash_cube(&cube).unwrap());
//! ```

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::config::{HyperError, HyperParams};
use crate::cubes::{Cube, CubeSet};

/// Largest bucket count whose ids fit one decimal digit.
pub const DECIMAL_MAX_BUCKETS: usize = 10;

/// Largest dimensionality whose decimal encoding fits in a `u64`
/// (`u64::MAX` has 20 digits and starts with 1).
pub const DECIMAL_MAX_DIMS: usize = 19;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Maps one hypercube to a 64-bit hash.
///
/// Implementations must be deterministic and free of side effects. Any
/// `Fn(&Cube) -> u64` closure is a `CubeHasher`.
pub trait CubeHasher: Send + Sync {
    fn hash_cube(&self, cube: &Cube) -> Result<u64, HyperError>;

    /// Short identifier recorded in fingerprint metadata.
    fn name(&self) -> &'static str {
        "custom"
    }
}

impl<F> CubeHasher for F
where
    F: Fn(&Cube) -> u64 + Send + Sync,
{
    fn hash_cube(&self, cube: &Cube) -> Result<u64, HyperError> {
        Ok(self(cube))
    }
}

/// Collision-free positional hash, `h = h * 10 + coord` left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalHasher {
    num_buckets: usize,
}

impl DecimalHasher {
    /// Fails with [`HyperError::HashDomainExceeded`] when `num_buckets > 10`.
    pub fn new(num_buckets: usize) -> Result<Self, HyperError> {
        if num_buckets > DECIMAL_MAX_BUCKETS {
            return Err(HyperError::hash_domain(format!(
                "num_buckets must be <= {DECIMAL_MAX_BUCKETS} (got {num_buckets})"
            )));
        }
        Ok(Self { num_buckets })
    }

    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }
}

impl CubeHasher for DecimalHasher {
    fn hash_cube(&self, cube: &Cube) -> Result<u64, HyperError> {
        decimal_hash(cube, self.num_buckets)
    }

    fn name(&self) -> &'static str {
        "decimal"
    }
}

/// FNV-1a over the fixed-width cube encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fnv1aHasher;

impl CubeHasher for Fnv1aHasher {
    fn hash_cube(&self, cube: &Cube) -> Result<u64, HyperError> {
        Ok(fnv1a_hash(cube))
    }

    fn name(&self) -> &'static str {
        "fnv1a"
    }
}

/// Seeded XXH3 over the fixed-width cube encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Xxh3Hasher {
    pub seed: u64,
}

impl Xxh3Hasher {
    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }
}

impl CubeHasher for Xxh3Hasher {
    fn hash_cube(&self, cube: &Cube) -> Result<u64, HyperError> {
        Ok(xxh3_64_with_seed(&encode_cube(cube), self.seed))
    }

    fn name(&self) -> &'static str {
        "xxh3"
    }
}

/// Serializable choice of a built-in hasher, as stored in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum HashStrategy {
    Decimal,
    #[default]
    Fnv1a,
    Xxh3 {
        #[serde(default)]
        seed: u64,
    },
}

impl HashStrategy {
    /// Build the hasher for cubes produced under `params`.
    pub fn build(&self, params: &HyperParams) -> Result<Box<dyn CubeHasher>, HyperError> {
        Ok(match *self {
            HashStrategy::Decimal => Box::new(DecimalHasher::new(params.num_buckets)?),
            HashStrategy::Fnv1a => Box::new(Fnv1aHasher),
            HashStrategy::Xxh3 { seed } => Box::new(Xxh3Hasher::with_seed(seed)),
        })
    }
}

/// Positional decimal hash of `cube`.
///
/// The domain is checked before anything is computed: `num_buckets <= 10`,
/// at most 19 dimensions, every coordinate in `0..=9`.
pub fn decimal_hash(cube: &Cube, num_buckets: usize) -> Result<u64, HyperError> {
    if num_buckets > DECIMAL_MAX_BUCKETS {
        return Err(HyperError::hash_domain(format!(
            "num_buckets must be <= {DECIMAL_MAX_BUCKETS} (got {num_buckets})"
        )));
    }
    if cube.dims() > DECIMAL_MAX_DIMS {
        return Err(HyperError::hash_domain(format!(
            "dimensions must be <= {DECIMAL_MAX_DIMS} (got {})",
            cube.dims()
        )));
    }
    if let Some((idx, c)) = cube
        .iter()
        .enumerate()
        .find(|(_, c)| !(0..=9).contains(*c))
    {
        return Err(HyperError::hash_domain(format!(
            "coordinate {idx} must be a single decimal digit (got {c})"
        )));
    }

    Ok(cube.iter().fold(0u64, |h, &c| h * 10 + c as u64))
}

/// FNV-1a 64 hash of `cube`.
pub fn fnv1a_hash(cube: &Cube) -> u64 {
    let mut h = FNV_OFFSET_BASIS;
    for c in cube.iter() {
        for b in c.to_le_bytes() {
            h ^= u64::from(b);
            h = h.wrapping_mul(FNV_PRIME);
        }
    }
    h
}

fn encode_cube(cube: &Cube) -> Vec<u8> {
    let mut buf = Vec::with_capacity(cube.dims() * 8);
    for c in cube.iter() {
        buf.extend_from_slice(&c.to_le_bytes());
    }
    buf
}

/// Hash every cube of `set`, in the set's iteration order.
///
/// The first failing cube aborts the whole batch.
pub fn hash_set<H>(set: &CubeSet, hasher: &H) -> Result<Vec<u64>, HyperError>
where
    H: CubeHasher + ?Sized,
{
    set.iter().map(|cube| hasher.hash_cube(cube)).collect()
}

/// Hash of the central cube; the lookup key on the query side.
pub fn central_hash<H>(cube: &Cube, hasher: &H) -> Result<u64, HyperError>
where
    H: CubeHasher + ?Sized,
{
    hasher.hash_cube(cube)
}
