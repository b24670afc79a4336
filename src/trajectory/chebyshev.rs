//! Chebyshev series and the Newhall approximation.
//!
//! A [`ChebyshevSeries`] represents a vector-valued polynomial on `[t_min, t_max]`
//! in the Chebyshev basis of the scaled variable `x = (2t − t_min − t_max) / Δt`.
//! Evaluation uses the Clenshaw recurrence with the three components packed
//! into the lanes of a `wide::f64x4`.
//!
//! The Newhall fit takes `DIVISIONS + 1` uniformly spaced position/velocity
//! samples and solves an equality-constrained least-squares problem: the
//! polynomial matches position and velocity exactly at both ends of the
//! interval and fits the interior samples in the least-squares sense, with
//! velocity residuals weighted by [`VELOCITY_WEIGHT`]. The solution is a fixed
//! linear map of the samples that depends only on the degree, so each map is
//! computed once per process.

use std::sync::OnceLock;

use bevy::math::DVec3;
use wide::f64x4;

/// Number of intervals between the samples of one segment.
pub const DIVISIONS: usize = 8;
/// Number of samples consumed by one Newhall fit.
pub const SAMPLES: usize = DIVISIONS + 1;
pub const MIN_DEGREE: usize = 3;
pub const MAX_DEGREE: usize = 17;
/// Weight of the velocity residuals relative to the position residuals.
pub const VELOCITY_WEIGHT: f64 = 0.4;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ChebyshevError {
    #[error("unsupported degree {0} (must be in 3..=17)")]
    InvalidDegree(usize),

    #[error("invalid interval [{t_min}, {t_max}]")]
    InvalidInterval { t_min: f64, t_max: f64 },

    #[error("expected {expected} samples, got {got}")]
    WrongSampleCount { expected: usize, got: usize },

    #[error("singular Newhall system for degree {0}")]
    SingularSystem(usize),

    #[error("time {time} outside series range [{t_min}, {t_max}]")]
    OutOfRange { time: f64, t_min: f64, t_max: f64 },
}

/// A vector-valued Chebyshev series with its first two derivatives.
#[derive(Clone, Debug, PartialEq)]
pub struct ChebyshevSeries {
    t_min: f64,
    t_max: f64,
    coefficients: Vec<DVec3>,
    /// Coefficients of d/dt, already scaled by dx/dt.
    derivative: Vec<DVec3>,
    /// Coefficients of d²/dt², already scaled by (dx/dt)².
    second_derivative: Vec<DVec3>,
}

impl ChebyshevSeries {
    pub fn new(coefficients: Vec<DVec3>, t_min: f64, t_max: f64) -> Result<Self, ChebyshevError> {
        if !(t_min.is_finite() && t_max.is_finite() && t_min < t_max) {
            return Err(ChebyshevError::InvalidInterval { t_min, t_max });
        }
        let scale = 2.0 / (t_max - t_min);
        let derivative = differentiate(&coefficients, scale);
        let second_derivative = differentiate(&derivative, scale);
        Ok(Self {
            t_min,
            t_max,
            coefficients,
            derivative,
            second_derivative,
        })
    }

    pub fn t_min(&self) -> f64 {
        self.t_min
    }

    pub fn t_max(&self) -> f64 {
        self.t_max
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub fn coefficients(&self) -> &[DVec3] {
        &self.coefficients
    }

    /// Norm of the highest-order coefficient.
    pub fn last_coefficient_norm(&self) -> f64 {
        self.coefficients.last().map_or(0.0, |c| c.length())
    }

    #[inline]
    fn scaled_time(&self, t: f64) -> f64 {
        (2.0 * t - self.t_min - self.t_max) / (self.t_max - self.t_min)
    }

    fn check_range(&self, t: f64) -> Result<f64, ChebyshevError> {
        if t < self.t_min || t > self.t_max {
            return Err(ChebyshevError::OutOfRange {
                time: t,
                t_min: self.t_min,
                t_max: self.t_max,
            });
        }
        Ok(self.scaled_time(t))
    }

    pub fn evaluate(&self, t: f64) -> Result<DVec3, ChebyshevError> {
        Ok(clenshaw(&self.coefficients, self.check_range(t)?))
    }

    pub fn evaluate_derivative(&self, t: f64) -> Result<DVec3, ChebyshevError> {
        Ok(clenshaw(&self.derivative, self.check_range(t)?))
    }

    pub fn evaluate_second_derivative(&self, t: f64) -> Result<DVec3, ChebyshevError> {
        Ok(clenshaw(&self.second_derivative, self.check_range(t)?))
    }

    /// Position and velocity in one range check.
    pub fn evaluate_with_derivative(&self, t: f64) -> Result<(DVec3, DVec3), ChebyshevError> {
        let x = self.check_range(t)?;
        Ok((clenshaw(&self.coefficients, x), clenshaw(&self.derivative, x)))
    }
}

#[inline]
fn lanes(v: DVec3) -> f64x4 {
    f64x4::new([v.x, v.y, v.z, 0.0])
}

/// Clenshaw summation of `Σ c_k T_k(x)`, all three components at once.
fn clenshaw(coefficients: &[DVec3], x: f64) -> DVec3 {
    let Some((&c0, rest)) = coefficients.split_first() else {
        return DVec3::ZERO;
    };
    let two_x = f64x4::splat(2.0 * x);
    let mut b1 = f64x4::ZERO;
    let mut b2 = f64x4::ZERO;
    for &c in rest.iter().rev() {
        let b0 = lanes(c) + two_x * b1 - b2;
        b2 = b1;
        b1 = b0;
    }
    let r = (lanes(c0) + f64x4::splat(x) * b1 - b2).to_array();
    DVec3::new(r[0], r[1], r[2])
}

/// Coefficients of the derivative series, multiplied by `scale`.
///
/// `c'_{k−1} = c'_{k+1} + 2k c_k`, with the constant term halved.
fn differentiate(coefficients: &[DVec3], scale: f64) -> Vec<DVec3> {
    let n = coefficients.len().saturating_sub(1);
    if n == 0 {
        return Vec::new();
    }
    let mut d = vec![DVec3::ZERO; n + 2];
    for k in (1..=n).rev() {
        d[k - 1] = d[k + 1] + coefficients[k] * (2.0 * k as f64);
    }
    d.truncate(n);
    d[0] *= 0.5;
    for c in &mut d {
        *c *= scale;
    }
    d
}

// =============================================================================
// Newhall approximation
// =============================================================================

/// Linear map from the `2·SAMPLES` samples (positions, then scaled
/// velocities) to the `degree + 1` coefficients.
#[derive(Debug)]
struct NewhallMap {
    rows: Vec<[f64; 2 * SAMPLES]>,
}

const DEGREE_COUNT: usize = MAX_DEGREE - MIN_DEGREE + 1;

static NEWHALL_MAPS: [OnceLock<Result<NewhallMap, ChebyshevError>>; DEGREE_COUNT] =
    [const { OnceLock::new() }; DEGREE_COUNT];

fn newhall_map(degree: usize) -> Result<&'static NewhallMap, ChebyshevError> {
    if !(MIN_DEGREE..=MAX_DEGREE).contains(&degree) {
        return Err(ChebyshevError::InvalidDegree(degree));
    }
    NEWHALL_MAPS[degree - MIN_DEGREE]
        .get_or_init(|| build_newhall_map(degree))
        .as_ref()
        .map_err(Clone::clone)
}

/// Values `T_j(x)` and derivatives `T_j'(x) = j U_{j−1}(x)` for `j = 0..=degree`.
fn chebyshev_basis(degree: usize, x: f64) -> (Vec<f64>, Vec<f64>) {
    let mut t = vec![0.0; degree + 1];
    let mut u = vec![0.0; degree + 1];
    t[0] = 1.0;
    u[0] = 1.0;
    if degree >= 1 {
        t[1] = x;
        u[1] = 2.0 * x;
    }
    for j in 2..=degree {
        t[j] = 2.0 * x * t[j - 1] - t[j - 2];
        u[j] = 2.0 * x * u[j - 1] - u[j - 2];
    }
    let mut dt = vec![0.0; degree + 1];
    for j in 1..=degree {
        dt[j] = j as f64 * u[j - 1];
    }
    (t, dt)
}

/// Solve the KKT system of the constrained least-squares fit for every
/// unit sample vector at once.
fn build_newhall_map(degree: usize) -> Result<NewhallMap, ChebyshevError> {
    const COLUMNS: usize = 2 * SAMPLES;
    let unknowns = degree + 1;
    let size = unknowns + 4;

    // Design matrix: SAMPLES position rows then SAMPLES weighted velocity rows.
    let mut design = vec![vec![0.0; unknowns]; COLUMNS];
    let mut constraints = vec![vec![0.0; unknowns]; 4];
    for i in 0..SAMPLES {
        let x = -1.0 + 2.0 * i as f64 / DIVISIONS as f64;
        let (t, dt) = chebyshev_basis(degree, x);
        design[i].copy_from_slice(&t);
        for j in 0..unknowns {
            design[SAMPLES + i][j] = VELOCITY_WEIGHT * dt[j];
        }
        if i == 0 {
            constraints[0].copy_from_slice(&t);
            constraints[1].copy_from_slice(&dt);
        } else if i == DIVISIONS {
            constraints[2].copy_from_slice(&t);
            constraints[3].copy_from_slice(&dt);
        }
    }

    // [2AᵀA Cᵀ; C 0] X = [2AᵀW; E]
    let mut kkt = vec![vec![0.0; size]; size];
    for r in 0..unknowns {
        for c in 0..unknowns {
            kkt[r][c] = 2.0 * (0..COLUMNS).map(|k| design[k][r] * design[k][c]).sum::<f64>();
        }
        for (k, row) in constraints.iter().enumerate() {
            kkt[r][unknowns + k] = row[r];
            kkt[unknowns + k][r] = row[r];
        }
    }

    let mut rhs = vec![[0.0; COLUMNS]; size];
    for r in 0..unknowns {
        for k in 0..SAMPLES {
            rhs[r][k] = 2.0 * design[k][r];
            rhs[r][SAMPLES + k] = 2.0 * design[SAMPLES + k][r] * VELOCITY_WEIGHT;
        }
    }
    // Endpoint constraints select q₀, v₀, q_N, v_N.
    rhs[unknowns][0] = 1.0;
    rhs[unknowns + 1][SAMPLES] = 1.0;
    rhs[unknowns + 2][DIVISIONS] = 1.0;
    rhs[unknowns + 3][SAMPLES + DIVISIONS] = 1.0;

    solve_in_place(&mut kkt, &mut rhs).ok_or(ChebyshevError::SingularSystem(degree))?;
    rhs.truncate(unknowns);
    Ok(NewhallMap { rows: rhs })
}

/// Gaussian elimination with partial pivoting; `rhs` is overwritten with
/// the solution. Returns `None` if the matrix is numerically singular.
fn solve_in_place<const N: usize>(matrix: &mut [Vec<f64>], rhs: &mut [[f64; N]]) -> Option<()> {
    let size = matrix.len();
    let scale = matrix
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0_f64, |m, v| m.max(v.abs()));

    for col in 0..size {
        let pivot = (col..size).max_by(|&a, &b| matrix[a][col].abs().total_cmp(&matrix[b][col].abs()))?;
        if matrix[pivot][col].abs() <= scale * 1e-14 {
            return None;
        }
        matrix.swap(col, pivot);
        rhs.swap(col, pivot);

        for row in (col + 1)..size {
            let factor = matrix[row][col] / matrix[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..size {
                matrix[row][k] -= factor * matrix[col][k];
            }
            for k in 0..N {
                rhs[row][k] -= factor * rhs[col][k];
            }
        }
    }

    for col in (0..size).rev() {
        for k in 0..N {
            let mut sum = rhs[col][k];
            for j in (col + 1)..size {
                sum -= matrix[col][j] * rhs[j][k];
            }
            rhs[col][k] = sum / matrix[col][col];
        }
    }
    Some(())
}

/// Fit a series of the given degree to `SAMPLES` uniformly spaced samples
/// over `[t_min, t_max]`.
///
/// Returns the series and its error estimate (the norm of the last coefficient).
pub fn newhall_approximation(
    degree: usize,
    positions: &[DVec3],
    velocities: &[DVec3],
    t_min: f64,
    t_max: f64,
) -> Result<(ChebyshevSeries, f64), ChebyshevError> {
    for got in [positions.len(), velocities.len()] {
        if got != SAMPLES {
            return Err(ChebyshevError::WrongSampleCount {
                expected: SAMPLES,
                got,
            });
        }
    }
    if !(t_min.is_finite() && t_max.is_finite() && t_min < t_max) {
        return Err(ChebyshevError::InvalidInterval { t_min, t_max });
    }
    let map = newhall_map(degree)?;

    // Velocities in units of the scaled variable.
    let half_duration = 0.5 * (t_max - t_min);
    let coefficients = map
        .rows
        .iter()
        .map(|row| {
            let mut c = DVec3::ZERO;
            for (k, q) in positions.iter().enumerate() {
                c += *q * row[k];
            }
            for (k, v) in velocities.iter().enumerate() {
                c += *v * (row[SAMPLES + k] * half_duration);
            }
            c
        })
        .collect();

    let series = ChebyshevSeries::new(coefficients, t_min, t_max)?;
    let error = series.last_coefficient_norm();
    Ok((series, error))
}
