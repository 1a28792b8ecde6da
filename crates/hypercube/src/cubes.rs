//! Fuzzy hypercube discretization.
//!
//! Every vector component is rescaled into `[0, num_buckets]`, where one bucket
//! has width 1 and the uncertainty margin equals `eps_percent`. A component
//! that sits within that margin of an interior bucket boundary is ambiguous and
//! contributes two candidate buckets; everything else contributes one. The cube
//! set is the cartesian product of those per-dimension candidates, so it holds
//! `2^b` cubes for `b` ambiguous dimensions.

use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::config::{HyperError, HyperParams};

/// One hypercube: a bucket id per dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cube(Vec<i64>);

impl Cube {
    pub fn new(coords: Vec<i64>) -> Self {
        Cube(coords)
    }

    pub fn coords(&self) -> &[i64] {
        &self.0
    }

    /// Number of dimensions.
    pub fn dims(&self) -> usize {
        self.0.len()
    }

    pub fn into_inner(self) -> Vec<i64> {
        self.0
    }
}

impl Deref for Cube {
    type Target = [i64];

    fn deref(&self) -> &[i64] {
        &self.0
    }
}

impl From<Vec<i64>> for Cube {
    fn from(coords: Vec<i64>) -> Self {
        Cube(coords)
    }
}

impl fmt::Display for Cube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{c}")?;
        }
        f.write_str(")")
    }
}

/// All plausible hypercubes of one vector.
///
/// Members are distinct and share the vector's dimensionality, and the set
/// holds a power of two of them. Their order is an artifact of generation and
/// carries no meaning; compare sets with [`CubeSet::contains`] or after
/// sorting. Deserialization checks the same shape through
/// [`TryFrom<Vec<Cube>>`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Cube>", into = "Vec<Cube>")]
pub struct CubeSet(Vec<Cube>);

impl TryFrom<Vec<Cube>> for CubeSet {
    type Error = HyperError;

    fn try_from(cubes: Vec<Cube>) -> Result<Self, HyperError> {
        if !cubes.len().is_power_of_two() {
            return Err(HyperError::invalid_config(format!(
                "cube set size must be a power of two (got {})",
                cubes.len()
            )));
        }
        let dims = cubes[0].dims();
        if let Some(cube) = cubes.iter().find(|c| c.dims() != dims) {
            return Err(HyperError::InvariantViolation {
                expected: dims,
                actual: cube.dims(),
            });
        }
        let mut seen = HashSet::with_capacity(cubes.len());
        if let Some(cube) = cubes.iter().find(|c| !seen.insert(*c)) {
            return Err(HyperError::invalid_config(format!(
                "cube set holds {cube} more than once"
            )));
        }
        Ok(CubeSet(cubes))
    }
}

impl From<CubeSet> for Vec<Cube> {
    fn from(set: CubeSet) -> Self {
        set.0
    }
}

impl CubeSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, cube: &Cube) -> bool {
        self.0.iter().any(|c| c == cube)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cube> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Cube] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Cube> {
        self.0
    }

    /// Number of dimensions that branched while building the set.
    pub fn branching_dims(&self) -> u32 {
        self.0.len().trailing_zeros()
    }
}

impl<'a> IntoIterator for &'a CubeSet {
    type Item = &'a Cube;
    type IntoIter = std::slice::Iter<'a, Cube>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for CubeSet {
    type Item = Cube;
    type IntoIter = std::vec::IntoIter<Cube>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Candidate buckets of a single dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DimensionBuckets {
    Single(i64),
    Branch(i64, i64),
}

impl DimensionBuckets {
    /// Decide the candidates for a value already rescaled to `[0, num_buckets]`.
    pub(crate) fn classify(val: f64, eps: f64, num_buckets: f64) -> Self {
        let left = (val - eps).floor() as i64;
        let right = (val + eps).floor() as i64;

        // No bucket below min or above max.
        if val - eps <= 0.0 {
            return DimensionBuckets::Single(right);
        }
        if val + eps >= num_buckets {
            return DimensionBuckets::Single(left);
        }

        if left == right {
            DimensionBuckets::Single(left)
        } else {
            DimensionBuckets::Branch(left, right)
        }
    }
}

/// Generate the fuzzy cube set for `vector`.
///
/// Fails with [`HyperError::InvalidConfiguration`] for invalid params and with
/// [`HyperError::NonFiniteComponent`] for NaN or infinite components. No
/// partial set is ever returned.
pub fn cube_set(vector: &[f64], params: &HyperParams) -> Result<CubeSet, HyperError> {
    let decisions = dimension_buckets(vector, params)?;

    let mut seed = Vec::with_capacity(1);
    seed.push(Vec::with_capacity(vector.len()));

    let cubes = decisions.iter().fold(seed, |set, decision| match *decision {
        DimensionBuckets::Single(b) => extend_each(set, &[b]),
        DimensionBuckets::Branch(l, r) => extend_each(set, &[l, r]),
    });

    for cube in &cubes {
        if cube.len() != vector.len() {
            return Err(HyperError::InvariantViolation {
                expected: vector.len(),
                actual: cube.len(),
            });
        }
    }

    Ok(CubeSet(cubes.into_iter().map(Cube).collect()))
}

/// The single canonical cube containing the end of `vector`.
///
/// Computed independently of [`cube_set`] but always one of its members for
/// the same inputs.
pub fn central_cube(vector: &[f64], params: &HyperParams) -> Result<Cube, HyperError> {
    params.validate()?;
    check_finite(vector)?;

    let eps = params.eps_percent;
    let max = params.num_buckets as f64;
    let coords = vector
        .iter()
        .map(|&v| {
            let val = rescale(v, params);
            let mut bucket = val.floor() as i64;
            if val - eps <= 0.0 {
                bucket = (val + eps).floor() as i64;
            }
            if val + eps >= max {
                bucket = (val - eps).floor() as i64;
            }
            bucket
        })
        .collect();

    Ok(Cube(coords))
}

/// Per-dimension candidate decisions for `vector`.
pub(crate) fn dimension_buckets(
    vector: &[f64],
    params: &HyperParams,
) -> Result<Vec<DimensionBuckets>, HyperError> {
    params.validate()?;
    check_finite(vector)?;

    let max = params.num_buckets as f64;
    Ok(vector
        .iter()
        .map(|&v| DimensionBuckets::classify(rescale(v, params), params.eps_percent, max))
        .collect())
}

/// Append every id in `ids` to every partial cube.
///
/// One id keeps the set size; two ids double it (all cubes ending in the
/// first id, then all ending in the second). The last id is pushed in place,
/// only the earlier ids copy the partial cubes.
fn extend_each(mut set: Vec<Vec<i64>>, ids: &[i64]) -> Vec<Vec<i64>> {
    let Some((&last, rest)) = ids.split_last() else {
        return set;
    };
    let mut out = Vec::with_capacity(set.len() * ids.len());
    for &id in rest {
        out.extend(set.iter().map(|partial| {
            let mut cube = Vec::with_capacity(partial.capacity());
            cube.extend_from_slice(partial);
            cube.push(id);
            cube
        }));
    }
    for partial in &mut set {
        partial.push(last);
    }
    out.append(&mut set);
    out
}

/// Offset and rescale one value into `[0, num_buckets]`.
#[inline]
fn rescale(v: f64, params: &HyperParams) -> f64 {
    (v - params.min) * params.num_buckets as f64 / (params.max - params.min)
}

fn check_finite(vector: &[f64]) -> Result<(), HyperError> {
    match vector.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(HyperError::NonFiniteComponent { index }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel_params(num_buckets: usize) -> HyperParams {
        HyperParams::new()
            .with_num_buckets(num_buckets)
            .with_range(0.0, 255.0)
            .with_eps_percent(0.25)
    }

    fn sorted(set: &CubeSet) -> Vec<Vec<i64>> {
        let mut cubes: Vec<Vec<i64>> = set.iter().map(|c| c.coords().to_vec()).collect();
        cubes.sort();
        cubes
    }

    fn sorted_expected(cubes: &[&[i64]]) -> Vec<Vec<i64>> {
        let mut want: Vec<Vec<i64>> = cubes.iter().map(|c| c.to_vec()).collect();
        want.sort();
        want
    }

    // ==================== Classification Tests ====================

    #[test]
    fn classify_interior_without_boundary() {
        assert_eq!(
            DimensionBuckets::classify(3.5, 0.25, 10.0),
            DimensionBuckets::Single(3)
        );
    }

    #[test]
    fn classify_interior_near_boundary_branches() {
        assert_eq!(
            DimensionBuckets::classify(4.1, 0.25, 10.0),
            DimensionBuckets::Branch(3, 4)
        );
        assert_eq!(
            DimensionBuckets::classify(3.9, 0.25, 10.0),
            DimensionBuckets::Branch(3, 4)
        );
    }

    #[test]
    fn classify_clamps_at_lower_edge() {
        assert_eq!(
            DimensionBuckets::classify(0.1, 0.25, 10.0),
            DimensionBuckets::Single(0)
        );
        assert_eq!(
            DimensionBuckets::classify(0.0, 0.25, 10.0),
            DimensionBuckets::Single(0)
        );
    }

    #[test]
    fn classify_clamps_at_upper_edge() {
        assert_eq!(
            DimensionBuckets::classify(10.0, 0.25, 10.0),
            DimensionBuckets::Single(9)
        );
        assert_eq!(
            DimensionBuckets::classify(9.9, 0.25, 10.0),
            DimensionBuckets::Single(9)
        );
    }

    #[test]
    fn classify_zero_eps_never_branches() {
        for val in [0.0, 0.5, 1.0, 2.999, 3.0, 4.0] {
            assert!(matches!(
                DimensionBuckets::classify(val, 0.0, 4.0),
                DimensionBuckets::Single(_)
            ));
        }
    }

    // ==================== Cube Set Tests ====================

    #[test]
    fn cube_set_pixel_vector() {
        let vector = [25.5, 0.01, 210.3, 93.9, 6.6, 9.1, 254.9];
        let set = cube_set(&vector, &pixel_params(10)).unwrap();

        assert_eq!(set.len(), 4);
        assert_eq!(set.branching_dims(), 2);
        assert_eq!(
            sorted(&set),
            sorted_expected(&[
                &[0, 0, 7, 3, 0, 0, 9],
                &[1, 0, 7, 3, 0, 0, 9],
                &[0, 0, 8, 3, 0, 0, 9],
                &[1, 0, 8, 3, 0, 0, 9],
            ])
        );

        let central = central_cube(&vector, &pixel_params(10)).unwrap();
        assert_eq!(central, Cube::new(vec![1, 0, 8, 3, 0, 0, 9]));
        assert!(set.contains(&central));
    }

    #[test]
    fn cube_set_bucket_borders() {
        let params = HyperParams::new()
            .with_num_buckets(4)
            .with_range(0.0, 4.0)
            .with_eps_percent(0.25);
        let vector = [0.01, 2.0 * 0.999, 2.0 * 1.001];

        let set = cube_set(&vector, &params).unwrap();
        assert_eq!(
            sorted(&set),
            sorted_expected(&[&[0, 1, 1], &[0, 2, 1], &[0, 1, 2], &[0, 2, 2]])
        );

        let central = central_cube(&vector, &params).unwrap();
        assert_eq!(central.coords(), &[0, 1, 2]);
        assert!(set.contains(&central));
    }

    #[test]
    fn cube_set_extremes_do_not_branch() {
        let vector = [255.0, 0.0, 255.0, 0.0, 255.0, 0.0, 255.0];
        let set = cube_set(&vector, &pixel_params(4)).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.as_slice()[0].coords(), &[3, 0, 3, 0, 3, 0, 3]);

        let central = central_cube(&vector, &pixel_params(4)).unwrap();
        assert_eq!(central.coords(), &[3, 0, 3, 0, 3, 0, 3]);
    }

    #[test]
    fn cube_set_eleven_dims_sixteen_cubes() {
        let vector = [0.0, 183.0, 148.0, 21.0, 47.0, 16.0, 69.0, 45.0, 151.0, 64.0, 181.0];
        let set = cube_set(&vector, &pixel_params(4)).unwrap();

        assert_eq!(set.len(), 16);
        assert_eq!(set.branching_dims(), 4);

        let mut want = Vec::new();
        for d1 in [2, 3] {
            for d6 in [0, 1] {
                for d9 in [0, 1] {
                    for d10 in [2, 3] {
                        want.push(vec![0, d1, 2, 0, 0, 0, d6, 0, 2, d9, d10]);
                    }
                }
            }
        }
        want.sort();
        assert_eq!(sorted(&set), want);
        assert!(set.contains(&central_cube(&vector, &pixel_params(4)).unwrap()));
    }

    #[test]
    fn cube_set_members_are_distinct() {
        let vector = [0.0, 183.0, 148.0, 21.0, 47.0, 16.0, 69.0, 45.0, 151.0, 64.0, 181.0];
        let set = cube_set(&vector, &pixel_params(4)).unwrap();
        let unique: std::collections::HashSet<&Cube> = set.iter().collect();
        assert_eq!(unique.len(), set.len());
    }

    #[test]
    fn cube_set_empty_vector_has_one_empty_cube() {
        let set = cube_set(&[], &pixel_params(10)).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.as_slice()[0].dims(), 0);
        assert_eq!(central_cube(&[], &pixel_params(10)).unwrap().dims(), 0);
    }

    #[test]
    fn cube_set_rejects_large_eps() {
        let vector = [25.5, 0.01, 210.3, 93.9, 6.6, 9.1, 254.9];
        let params = pixel_params(10).with_eps_percent(0.51);
        assert!(matches!(
            cube_set(&vector, &params),
            Err(HyperError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            central_cube(&vector, &params),
            Err(HyperError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn cube_set_rejects_non_finite_component() {
        let vector = [1.0, f64::NAN, 3.0];
        assert_eq!(
            cube_set(&vector, &pixel_params(10)),
            Err(HyperError::NonFiniteComponent { index: 1 })
        );
        assert_eq!(
            central_cube(&[f64::INFINITY], &pixel_params(10)),
            Err(HyperError::NonFiniteComponent { index: 0 })
        );
    }

    #[test]
    fn out_of_range_values_stay_consistent() {
        let vector = [-40.0, 300.0, 128.0];
        let set = cube_set(&vector, &pixel_params(10)).unwrap();
        let central = central_cube(&vector, &pixel_params(10)).unwrap();
        assert!(set.contains(&central));
    }

    // ==================== Property Tests ====================

    /// Counts dimensions whose margin `(val - eps, val + eps]` crosses an
    /// interior boundary without touching either end of the range.
    fn expected_branching_dims(vector: &[f64], params: &HyperParams) -> usize {
        let n = params.num_buckets as f64;
        let eps = params.eps_percent;
        vector
            .iter()
            .filter(|&&v| {
                let val = (v - params.min) * n / (params.max - params.min);
                if val - eps <= 0.0 || val + eps >= n {
                    return false;
                }
                (1..params.num_buckets).any(|k| {
                    let k = k as f64;
                    val - eps < k && k <= val + eps
                })
            })
            .count()
    }

    #[test]
    fn random_vectors_hold_set_invariants() {
        let mut rng = fastrand::Rng::with_seed(0x5EED);
        for _ in 0..2_000 {
            let num_buckets = rng.usize(1..=16);
            let eps_percent = rng.f64() * 0.49;
            let params = HyperParams::new()
                .with_num_buckets(num_buckets)
                .with_range(-10.0, 10.0)
                .with_eps_percent(eps_percent);
            let dims = rng.usize(0..=10);
            let vector: Vec<f64> = (0..dims).map(|_| rng.f64() * 20.0 - 10.0).collect();

            let set = cube_set(&vector, &params).unwrap();
            let central = central_cube(&vector, &params).unwrap();

            assert!(set.iter().all(|c| c.dims() == dims));
            assert!(set.contains(&central), "{central} not in {set:?}");

            let branching = expected_branching_dims(&vector, &params);
            assert_eq!(set.len(), 1usize << branching);
        }
    }

    // ==================== Type Tests ====================

    #[test]
    fn cube_display() {
        assert_eq!(Cube::new(vec![1, 0, 8]).to_string(), "(1,0,8)");
        assert_eq!(Cube::new(vec![]).to_string(), "()");
    }

    #[test]
    fn extend_each_keeps_first_id_first() {
        let set = vec![vec![0], vec![1]];
        assert_eq!(
            extend_each(set.clone(), &[4, 5]),
            vec![vec![0, 4], vec![1, 4], vec![0, 5], vec![1, 5]]
        );
        assert_eq!(extend_each(set, &[7]), vec![vec![0, 7], vec![1, 7]]);
    }

    #[test]
    fn cube_set_serde_roundtrip() {
        let vector = [25.5, 0.01, 210.3, 93.9, 6.6, 9.1, 254.9];
        let set = cube_set(&vector, &pixel_params(10)).unwrap();
        let json = serde_json::to_string(&set).unwrap();
        assert!(json.starts_with("[[0,0,7,3,0,0,9]"));
        let back: CubeSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
        assert_eq!(back.branching_dims(), 2);
    }

    #[test]
    fn cube_set_rejects_malformed_input() {
        assert!(serde_json::from_str::<CubeSet>("[]").is_err());
        assert!(serde_json::from_str::<CubeSet>("[[1],[2],[3]]").is_err());
        assert!(serde_json::from_str::<CubeSet>("[[1,2],[3]]").is_err());
        assert!(serde_json::from_str::<CubeSet>("[[1],[1]]").is_err());

        assert!(matches!(
            CubeSet::try_from(vec![Cube::new(vec![1, 2]), Cube::new(vec![3])]),
            Err(HyperError::InvariantViolation {
                expected: 2,
                actual: 1
            })
        ));
        assert!(CubeSet::try_from(vec![Cube::new(vec![]); 1]).is_ok());
    }

    #[test]
    fn cube_serde_is_transparent() {
        let cube = Cube::from(vec![3, 0, 3]);
        assert_eq!(serde_json::to_string(&cube).unwrap(), "[3,0,3]");
        let back: Cube = serde_json::from_str("[3,0,3]").unwrap();
        assert_eq!(back, cube);
    }
}
