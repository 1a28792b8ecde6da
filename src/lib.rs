//! Umbrella crate for hyperhash.
//!
//! Re-exports the pure discretization core from [`hypercube`] and adds the
//! pieces a service needs around it: a single call that produces every key for
//! a vector, batch processing over many vectors, structured `tracing` events,
//! an optional metrics observer, and schema configuration loading.

pub mod config;

pub use config::{ConfigLoadError, HyperConfig, Schema, SchemaConfig};
pub use hypercube::{
    Cube, CubeHasher, CubeSet, DecimalHasher, Discretization, Fnv1aHasher, HYPERCUBE_ALGORITHM,
    HYPERCUBE_VERSION, HashStrategy, HyperError, HyperParams, Xxh3Hasher, central_cube,
    central_hash, cube_set, decimal_hash, fnv1a_hash, hash_set, params,
};

use std::sync::{Arc, OnceLock, RwLock};
use std::time::{Duration, Instant};

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Level, debug, warn};

/// Errors that can occur while fingerprinting vectors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("discretization failed: {0}")]
    Discretize(#[source] HyperError),

    #[error("hashing failed: {0}")]
    Hash(#[source] HyperError),

    #[error("vector {index} of batch failed: {source}")]
    Batch {
        index: usize,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// The core error at the root of this failure.
    pub fn hyper_error(&self) -> &HyperError {
        match self {
            PipelineError::Discretize(err) | PipelineError::Hash(err) => err,
            PipelineError::Batch { source, .. } => source.hyper_error(),
        }
    }
}

/// Every key derived from one vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorFingerprint {
    /// Candidate cubes; index a record under all of them.
    pub cubes: CubeSet,
    /// Hashes of `cubes`, in the same order.
    pub hashes: Vec<u64>,
    /// Canonical cube; look a query up with it.
    pub central: Cube,
    /// Hash of `central`. Always one of `hashes`.
    pub central_hash: u64,
    pub meta: FingerprintMeta,
}

/// How a fingerprint was produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FingerprintMeta {
    pub algorithm_version: u16,
    pub algorithm_name: String,
    /// [`CubeHasher::name`] of the hasher used.
    pub hash_strategy: String,
    pub num_buckets: usize,
    pub min: f64,
    pub max: f64,
    pub eps_percent: f64,
    pub dims: usize,
    pub branching_dims: u32,
}

/// Metrics observer for fingerprinting.
pub trait PipelineMetrics: Send + Sync {
    fn record_fingerprint(&self, latency: Duration, result: Result<(), PipelineError>);
    fn record_batch(&self, latency: Duration, vectors: usize, result: Result<(), PipelineError>);
}

/// Install or clear the global pipeline metrics recorder.
pub fn set_pipeline_metrics(recorder: Option<Arc<dyn PipelineMetrics>>) {
    let mut guard = metrics_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn PipelineMetrics>>> {
    static METRICS: OnceLock<RwLock<Option<Arc<dyn PipelineMetrics>>>> = OnceLock::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

fn metrics_recorder() -> Option<Arc<dyn PipelineMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}

struct MetricsSpan {
    recorder: Arc<dyn PipelineMetrics>,
    start: Instant,
}

impl MetricsSpan {
    fn start() -> Option<Self> {
        metrics_recorder().map(|recorder| Self {
            recorder,
            start: Instant::now(),
        })
    }

    fn record_fingerprint(self, result: Result<(), PipelineError>) {
        self.recorder
            .record_fingerprint(self.start.elapsed(), result);
    }

    fn record_batch(self, vectors: usize, result: Result<(), PipelineError>) {
        self.recorder
            .record_batch(self.start.elapsed(), vectors, result);
    }
}

/// Produce the cube set, central cube and all hashes for one vector.
pub fn fingerprint_vector<H>(
    vector: &[f64],
    params: &HyperParams,
    hasher: &H,
) -> Result<VectorFingerprint, PipelineError>
where
    H: CubeHasher + ?Sized,
{
    let start = Instant::now();
    let metrics = MetricsSpan::start();
    let span = tracing::span!(
        Level::DEBUG,
        "hyperhash.fingerprint",
        dims = vector.len(),
        hash_strategy = hasher.name()
    );
    let _guard = span.enter();

    let result = fingerprint_inner(vector, params, hasher);
    let elapsed_micros = start.elapsed().as_micros();
    match &result {
        Ok(fp) => debug!(
            cubes = fp.cubes.len(),
            branching_dims = fp.meta.branching_dims,
            central_hash = fp.central_hash,
            elapsed_micros,
            "fingerprint_success"
        ),
        Err(err) => warn!(error = %err, elapsed_micros, "fingerprint_failure"),
    }
    if let Some(span) = metrics {
        span.record_fingerprint(result.as_ref().map(|_| ()).map_err(Clone::clone));
    }
    result
}

/// Fingerprint one vector using a resolved configuration schema.
pub fn fingerprint_with_schema(
    vector: &[f64],
    schema: &Schema,
) -> Result<VectorFingerprint, PipelineError> {
    fingerprint_vector(vector, &schema.params, schema.hasher.as_ref())
}

/// Fingerprint many vectors. Output order matches input order.
///
/// With `parallel` set (and the `parallel` feature enabled) vectors are
/// spread over the rayon pool. Any failing vector fails the whole batch.
pub fn fingerprint_batch<V, H>(
    vectors: &[V],
    params: &HyperParams,
    hasher: &H,
    parallel: bool,
) -> Result<Vec<VectorFingerprint>, PipelineError>
where
    V: AsRef<[f64]> + Sync,
    H: CubeHasher + ?Sized,
{
    let start = Instant::now();
    let metrics = MetricsSpan::start();
    let span = tracing::span!(
        Level::INFO,
        "hyperhash.batch",
        vectors = vectors.len(),
        parallel,
        hash_strategy = hasher.name()
    );
    let _guard = span.enter();

    let one = |(index, vector): (usize, &V)| {
        fingerprint_inner(vector.as_ref(), params, hasher).map_err(|err| PipelineError::Batch {
            index,
            source: Box::new(err),
        })
    };

    let result: Result<Vec<VectorFingerprint>, PipelineError> = if parallel {
        run_parallel(vectors, one)
    } else {
        vectors.iter().enumerate().map(one).collect()
    };

    let elapsed_micros = start.elapsed().as_micros();
    match &result {
        Ok(fps) => {
            let keys: usize = fps.iter().map(|fp| fp.hashes.len()).sum();
            tracing::info!(keys, elapsed_micros, "batch_success");
        }
        Err(err) => warn!(error = %err, elapsed_micros, "batch_failure"),
    }
    if let Some(span) = metrics {
        span.record_batch(
            vectors.len(),
            result.as_ref().map(|_| ()).map_err(Clone::clone),
        );
    }
    result
}

#[cfg(feature = "parallel")]
fn run_parallel<V, F>(vectors: &[V], one: F) -> Result<Vec<VectorFingerprint>, PipelineError>
where
    V: Sync,
    F: Fn((usize, &V)) -> Result<VectorFingerprint, PipelineError> + Sync + Send,
{
    vectors.par_iter().enumerate().map(one).collect()
}

#[cfg(not(feature = "parallel"))]
fn run_parallel<V, F>(vectors: &[V], one: F) -> Result<Vec<VectorFingerprint>, PipelineError>
where
    V: Sync,
    F: Fn((usize, &V)) -> Result<VectorFingerprint, PipelineError> + Sync + Send,
{
    vectors.iter().enumerate().map(one).collect()
}

fn fingerprint_inner<H>(
    vector: &[f64],
    params: &HyperParams,
    hasher: &H,
) -> Result<VectorFingerprint, PipelineError>
where
    H: CubeHasher + ?Sized,
{
    let cubes = cube_set(vector, params).map_err(PipelineError::Discretize)?;
    let central = central_cube(vector, params).map_err(PipelineError::Discretize)?;
    let hashes = hash_set(&cubes, hasher).map_err(PipelineError::Hash)?;
    let central_hash = central_hash(&central, hasher).map_err(PipelineError::Hash)?;

    let meta = FingerprintMeta {
        algorithm_version: HYPERCUBE_VERSION,
        algorithm_name: HYPERCUBE_ALGORITHM.to_string(),
        hash_strategy: hasher.name().to_string(),
        num_buckets: params.num_buckets,
        min: params.min,
        max: params.max,
        eps_percent: params.eps_percent,
        dims: vector.len(),
        branching_dims: cubes.branching_dims(),
    };

    Ok(VectorFingerprint {
        cubes,
        hashes,
        central,
        central_hash,
        meta,
    })
}
