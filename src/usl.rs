//! Universal Scalability Law fitting.
//!
//! Relative capacity at `N` nodes is modelled as
//!
//! ```text
//! C(N) = N / (1 + α(N - 1) + βN(N - 1))
//! ```
//!
//! where α is the contention (serialization) penalty and β the coherency (crosstalk)
//! penalty. Both are fitted to throughput normalized by the single-node sample, with a
//! bounded Levenberg–Marquardt solver keeping them inside `[0, 1]`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{DEFAULT_HORIZON, FIT_MAX_EVALUATIONS};
use crate::error::FitError;

const LOWER: f64 = 0.0;
const UPPER: f64 = 1.0;

/// Relative capacity predicted by the model.
pub fn capacity(nodes: f64, alpha: f64, beta: f64) -> f64 {
    nodes / (1.0 + alpha * (nodes - 1.0) + beta * nodes * (nodes - 1.0))
}

/// One throughput sample per node count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScalabilityDataset {
    samples: BTreeMap<u32, f64>,
}

impl ScalabilityDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the throughput measured at `nodes`, replacing any earlier sample.
    /// A node count of 0 is ignored.
    pub fn insert(&mut self, nodes: u32, throughput: f64) {
        if nodes > 0 {
            self.samples.insert(nodes, throughput);
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// `(N, throughput(N) / throughput(1))` for every sample, ascending by N.
    pub fn normalized(&self) -> Result<Vec<(u32, f64)>, FitError> {
        let baseline = *self.samples.get(&1).ok_or(FitError::MissingBaseline)?;
        if !(baseline > 0.0 && baseline.is_finite()) {
            return Err(FitError::InvalidBaseline(baseline));
        }
        if let Some((&nodes, &throughput)) = self
            .samples
            .iter()
            .find(|(_, t)| !(t.is_finite() && **t >= 0.0))
        {
            return Err(FitError::InvalidSample { nodes, throughput });
        }
        Ok(self
            .samples
            .iter()
            .map(|(&n, &t)| (n, t / baseline))
            .collect())
    }
}

impl FromIterator<(u32, f64)> for ScalabilityDataset {
    fn from_iter<I: IntoIterator<Item = (u32, f64)>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().filter(|(n, _)| *n > 0).collect(),
        }
    }
}

/// Which overhead dominates scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bottleneck {
    /// β > α: coordination between nodes dominates.
    CoherencyLimited,
    /// α ≥ β: serialization dominates.
    ContentionLimited,
}

impl Bottleneck {
    pub fn classify(alpha: f64, beta: f64) -> Self {
        if beta > alpha {
            Bottleneck::CoherencyLimited
        } else {
            Bottleneck::ContentionLimited
        }
    }
}

/// A normalized measurement used by the fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasuredPoint {
    pub nodes: u32,
    pub relative_capacity: f64,
}

impl MeasuredPoint {
    /// Capacity per node: 1.0 is perfectly linear scaling.
    pub fn efficiency(&self) -> f64 {
        self.relative_capacity / self.nodes as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UslFitResult {
    pub alpha: f64,
    pub beta: f64,
    pub alpha_err: f64,
    pub beta_err: f64,
    pub r_squared: f64,
    /// Node count in `1..=horizon` with the highest predicted capacity.
    pub optimal_nodes: u32,
    pub max_capacity: f64,
    pub horizon: u32,
    pub measured: Vec<MeasuredPoint>,
}

impl UslFitResult {
    pub fn bottleneck(&self) -> Bottleneck {
        Bottleneck::classify(self.alpha, self.beta)
    }

    pub fn capacity(&self, nodes: u32) -> f64 {
        capacity(nodes as f64, self.alpha, self.beta)
    }

    /// Predicted capacity for `N = 1..=horizon`.
    pub fn predictions(&self) -> Vec<(u32, f64)> {
        (1..=self.horizon).map(|n| (n, self.capacity(n))).collect()
    }

    /// True when the optimum lies within the measured range, so more nodes would not help.
    pub fn optimum_reached(&self) -> bool {
        self.measured
            .last()
            .is_some_and(|p| self.optimal_nodes <= p.nodes)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    pub horizon: u32,
    pub max_evaluations: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            horizon: DEFAULT_HORIZON,
            max_evaluations: FIT_MAX_EVALUATIONS,
        }
    }
}

/// Fit the model with default options.
pub fn fit(dataset: &ScalabilityDataset) -> Result<UslFitResult, FitError> {
    fit_with(dataset, &FitOptions::default())
}

pub fn fit_with(dataset: &ScalabilityDataset, options: &FitOptions) -> Result<UslFitResult, FitError> {
    if dataset.len() < 3 {
        return Err(FitError::Underdetermined {
            distinct: dataset.len(),
        });
    }
    let points = dataset.normalized()?;
    let problem = Problem {
        xs: points.iter().map(|&(n, _)| n as f64).collect(),
        ys: points.iter().map(|&(_, y)| y).collect(),
    };

    let start = problem.seed();
    let [alpha, beta] = levenberg_marquardt(&problem, start, options.max_evaluations)?;

    let ss_res = problem.cost([alpha, beta]);
    let (alpha_err, beta_err) = problem.standard_errors([alpha, beta], ss_res);
    let r_squared = problem.r_squared(ss_res);

    let horizon = options.horizon.max(1);
    let (optimal_nodes, max_capacity) = (1..=horizon)
        .map(|n| (n, capacity(n as f64, alpha, beta)))
        .fold((1, f64::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });

    debug!(alpha, beta, r_squared, optimal_nodes, "scalability fit");
    Ok(UslFitResult {
        alpha,
        beta,
        alpha_err,
        beta_err,
        r_squared,
        optimal_nodes,
        max_capacity,
        horizon,
        measured: points
            .into_iter()
            .map(|(nodes, relative_capacity)| MeasuredPoint {
                nodes,
                relative_capacity,
            })
            .collect(),
    })
}

/// Least-squares problem over normalized `(N, C)` samples.
struct Problem {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl Problem {
    /// Sum of squared residuals.
    fn cost(&self, [alpha, beta]: [f64; 2]) -> f64 {
        self.xs
            .iter()
            .zip(&self.ys)
            .map(|(&n, &y)| (capacity(n, alpha, beta) - y).powi(2))
            .sum()
    }

    /// Gradient `Jᵀr` and Gauss-Newton matrix `JᵀJ` at `p`.
    fn normal_equations(&self, [alpha, beta]: [f64; 2]) -> ([f64; 2], [[f64; 2]; 2]) {
        let mut g = [0.0; 2];
        let mut a = [[0.0; 2]; 2];
        for (&n, &y) in self.xs.iter().zip(&self.ys) {
            let d = 1.0 + alpha * (n - 1.0) + beta * n * (n - 1.0);
            let r = n / d - y;
            let d2 = d * d;
            let j = [-n * (n - 1.0) / d2, -n * n * (n - 1.0) / d2];
            for i in 0..2 {
                g[i] += j[i] * r;
                for k in 0..2 {
                    a[i][k] += j[i] * j[k];
                }
            }
        }
        (g, a)
    }

    /// Best point of a coarse grid, used as the solver's starting point.
    fn seed(&self) -> [f64; 2] {
        const BETAS: [f64; 10] = [0.0, 1e-4, 3e-4, 1e-3, 3e-3, 1e-2, 3e-2, 0.1, 0.3, 1.0];
        let mut best = ([0.0, 0.0], f64::INFINITY);
        for step in 0..=20 {
            let alpha = step as f64 * 0.05;
            for beta in BETAS {
                let cost = self.cost([alpha, beta]);
                if cost < best.1 {
                    best = ([alpha, beta], cost);
                }
            }
        }
        best.0
    }

    /// Standard errors from `s² (JᵀJ)⁻¹` with `s² = SS_res / (m - 2)`.
    fn standard_errors(&self, p: [f64; 2], ss_res: f64) -> (f64, f64) {
        let (_, a) = self.normal_equations(p);
        let det = a[0][0] * a[1][1] - a[0][1] * a[1][0];
        if det.abs() <= f64::EPSILON * (a[0][0] * a[1][1]).abs() || det == 0.0 {
            return (f64::INFINITY, f64::INFINITY);
        }
        let dof = (self.xs.len() as f64 - 2.0).max(1.0);
        let s2 = ss_res / dof;
        let var_alpha = s2 * a[1][1] / det;
        let var_beta = s2 * a[0][0] / det;
        (var_alpha.max(0.0).sqrt(), var_beta.max(0.0).sqrt())
    }

    fn r_squared(&self, ss_res: f64) -> f64 {
        let mean = self.ys.iter().sum::<f64>() / self.ys.len() as f64;
        let ss_tot: f64 = self.ys.iter().map(|y| (y - mean).powi(2)).sum();
        if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res <= 1e-12 {
            1.0
        } else {
            0.0
        }
    }
}

fn clamp(p: [f64; 2]) -> [f64; 2] {
    [p[0].clamp(LOWER, UPPER), p[1].clamp(LOWER, UPPER)]
}

/// Solve `(A + λ·diag(A)) δ = -g` over the free parameters; fixed ones get δ = 0.
fn damped_step(a: [[f64; 2]; 2], g: [f64; 2], lambda: f64, free: [bool; 2]) -> [f64; 2] {
    let d0 = a[0][0] + lambda * a[0][0].max(1e-12);
    let d1 = a[1][1] + lambda * a[1][1].max(1e-12);
    match free {
        [true, true] => {
            let det = d0 * d1 - a[0][1] * a[1][0];
            if det <= 0.0 {
                return [0.0, 0.0];
            }
            [
                -(d1 * g[0] - a[0][1] * g[1]) / det,
                -(d0 * g[1] - a[1][0] * g[0]) / det,
            ]
        }
        [true, false] => [-g[0] / d0, 0.0],
        [false, true] => [0.0, -g[1] / d1],
        [false, false] => [0.0, 0.0],
    }
}

/// Bounded Levenberg–Marquardt. A parameter sitting on a bound whose gradient points
/// outward is held fixed for that iteration; every trial point is projected onto the box.
fn levenberg_marquardt(
    problem: &Problem,
    start: [f64; 2],
    max_evaluations: usize,
) -> Result<[f64; 2], FitError> {
    const FTOL: f64 = 1e-15;
    const XTOL: f64 = 1e-12;
    const GTOL: f64 = 1e-14;

    let mut p = clamp(start);
    let mut cost = problem.cost(p);
    let mut evaluations = 1;
    let mut lambda = 1e-3;

    loop {
        if cost <= 1e-30 {
            return Ok(p);
        }
        let (g, a) = problem.normal_equations(p);
        let free = [0, 1].map(|i| !((p[i] <= LOWER && g[i] > 0.0) || (p[i] >= UPPER && g[i] < 0.0)));
        let projected_gradient = (0..2)
            .filter(|&i| free[i])
            .map(|i| g[i].abs())
            .fold(0.0, f64::max);
        if projected_gradient <= GTOL {
            return Ok(p);
        }

        loop {
            if evaluations >= max_evaluations {
                return Err(FitError::Divergence { evaluations });
            }
            let step = damped_step(a, g, lambda, free);
            let candidate = clamp([p[0] + step[0], p[1] + step[1]]);
            let moved = (candidate[0] - p[0]).hypot(candidate[1] - p[1]);
            if moved <= XTOL * (p[0].hypot(p[1]) + XTOL) {
                return Ok(p);
            }

            let candidate_cost = problem.cost(candidate);
            evaluations += 1;
            if candidate_cost < cost {
                let improvement = (cost - candidate_cost) / cost;
                p = candidate;
                cost = candidate_cost;
                lambda = (lambda * 0.1).max(1e-15);
                if improvement <= FTOL {
                    return Ok(p);
                }
                break;
            }

            lambda *= 10.0;
            if lambda > 1e16 {
                // no descent direction left inside the box
                return Ok(p);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(alpha: f64, beta: f64, nodes: &[u32]) -> ScalabilityDataset {
        nodes
            .iter()
            .map(|&n| (n, 1000.0 * capacity(n as f64, alpha, beta)))
            .collect()
    }

    #[test]
    fn test_capacity_baseline_is_one() {
        assert_eq!(capacity(1.0, 0.4, 0.2), 1.0);
        assert_eq!(capacity(8.0, 0.0, 0.0), 8.0);
    }

    #[test]
    fn test_recovers_known_coefficients() {
        for &(alpha, beta) in &[(0.05, 0.002), (0.3, 0.01), (0.0, 0.02), (0.12, 0.0)] {
            let data = synthetic(alpha, beta, &[1, 2, 3, 4, 6, 8, 12, 16]);
            let fit = fit(&data).unwrap();
            assert!((fit.alpha - alpha).abs() < 1e-2, "alpha {} vs {}", fit.alpha, alpha);
            assert!((fit.beta - beta).abs() < 1e-2, "beta {} vs {}", fit.beta, beta);
            assert!(fit.r_squared > 0.9999, "r2 {}", fit.r_squared);
        }
    }

    #[test]
    fn test_noisy_input_stays_in_bounds() {
        let noise = [1.0, 0.93, 1.08, 0.95, 1.1, 0.88, 1.04];
        let nodes = [1, 2, 3, 5, 7, 9, 11];
        let data: ScalabilityDataset = nodes
            .iter()
            .zip(noise)
            .map(|(&n, f)| (n, 500.0 * capacity(n as f64, 0.1, 0.01) * f))
            .collect();
        let fit = fit(&data).unwrap();
        assert!((0.0..=1.0).contains(&fit.alpha));
        assert!((0.0..=1.0).contains(&fit.beta));
        assert!(fit.alpha_err.is_finite() && fit.beta_err.is_finite());
    }

    #[test]
    fn test_insert_replaces_sample() {
        let mut data = ScalabilityDataset::new();
        assert!(data.is_empty());
        data.insert(1, 100.0);
        data.insert(2, 150.0);
        data.insert(2, 180.0);
        data.insert(0, 50.0);
        assert_eq!(data.len(), 2);
        assert_eq!(data.normalized().unwrap(), vec![(1, 1.0), (2, 1.8)]);
    }

    #[test]
    fn test_rejects_non_finite_or_negative_samples() {
        let data: ScalabilityDataset = [(1, 100.0), (2, f64::NAN), (3, 300.0)].into_iter().collect();
        assert!(matches!(fit(&data), Err(FitError::InvalidSample { nodes: 2, .. })));

        let data: ScalabilityDataset = [(1, 100.0), (2, 150.0), (4, -1.0)].into_iter().collect();
        assert!(matches!(
            fit(&data),
            Err(FitError::InvalidSample { nodes: 4, throughput }) if throughput == -1.0
        ));

        let data: ScalabilityDataset = [(1, 100.0), (2, f64::INFINITY), (3, 0.0)].into_iter().collect();
        assert!(matches!(fit(&data), Err(FitError::InvalidSample { nodes: 2, .. })));
    }

    #[test]
    fn test_superlinear_input_clamped_at_zero() {
        let data: ScalabilityDataset = [(1, 100.0), (2, 250.0), (4, 600.0)].into_iter().collect();
        let fit = fit(&data).unwrap();
        assert!(fit.alpha >= 0.0 && fit.beta >= 0.0);
        assert!(fit.alpha <= 1.0 && fit.beta <= 1.0);
    }

    #[test]
    fn test_flat_throughput() {
        let data: ScalabilityDataset = [(1, 100.0), (2, 100.0), (4, 100.0)].into_iter().collect();
        let fit = fit(&data).unwrap();
        // C(N) = 1 everywhere needs α = 1, β = 0
        assert!((fit.alpha - 1.0).abs() < 1e-6);
        assert!(fit.beta.abs() < 1e-6);
        assert_eq!(fit.r_squared, 1.0);
        assert_eq!(fit.optimal_nodes, 1);
    }

    #[test]
    fn test_underdetermined() {
        let data: ScalabilityDataset = [(1, 100.0), (3, 250.0)].into_iter().collect();
        assert_eq!(fit(&data), Err(FitError::Underdetermined { distinct: 2 }));
    }

    #[test]
    fn test_missing_baseline() {
        let data: ScalabilityDataset = [(2, 100.0), (3, 150.0), (5, 200.0)].into_iter().collect();
        assert_eq!(fit(&data), Err(FitError::MissingBaseline));
    }

    #[test]
    fn test_zero_baseline() {
        let data: ScalabilityDataset = [(1, 0.0), (3, 0.0), (5, 0.0)].into_iter().collect();
        assert_eq!(fit(&data), Err(FitError::InvalidBaseline(0.0)));
    }

    #[test]
    fn test_budget_exhausted() {
        let data: ScalabilityDataset = [(1, 100.0), (2, 170.0), (3, 260.0), (5, 310.0), (8, 290.0)]
            .into_iter()
            .collect();
        let options = FitOptions {
            max_evaluations: 1,
            ..FitOptions::default()
        };
        assert_eq!(
            fit_with(&data, &options),
            Err(FitError::Divergence { evaluations: 1 })
        );
    }

    #[test]
    fn test_sublinear_growth_recommends_larger_cluster() {
        let data: ScalabilityDataset = [(1, 100.0), (3, 250.0), (5, 350.0)].into_iter().collect();
        let fit = fit(&data).unwrap();

        // exact solution: 2α + 6β = 0.2, 4α + 20β = 3/7
        assert!((fit.alpha - 0.089_285_7).abs() < 1e-3);
        assert!((fit.beta - 0.003_571_4).abs() < 1e-3);
        assert!(fit.r_squared > 0.999);
        assert_eq!(fit.bottleneck(), Bottleneck::ContentionLimited);
        assert!(fit.optimal_nodes >= 5);
        assert!(!fit.optimum_reached());
        assert_eq!(fit.predictions().len(), 20);
    }

    #[test]
    fn test_optimum_inside_measured_range() {
        let data = synthetic(0.1, 0.04, &[1, 2, 4, 6, 8]);
        let fit = fit(&data).unwrap();
        assert_eq!(fit.bottleneck(), Bottleneck::ContentionLimited);
        // C(4) ≈ 2.247, C(5) ≈ 2.273, C(6) ≈ 2.222
        assert_eq!(fit.optimal_nodes, 5);
        assert!(fit.optimum_reached());
    }

    #[test]
    fn test_classification() {
        assert_eq!(Bottleneck::classify(0.01, 0.2), Bottleneck::CoherencyLimited);
        assert_eq!(Bottleneck::classify(0.2, 0.01), Bottleneck::ContentionLimited);
        assert_eq!(Bottleneck::classify(0.1, 0.1), Bottleneck::ContentionLimited);
    }

    #[test]
    fn test_efficiency() {
        let point = MeasuredPoint {
            nodes: 4,
            relative_capacity: 3.0,
        };
        assert_eq!(point.efficiency(), 0.75);
    }
}
