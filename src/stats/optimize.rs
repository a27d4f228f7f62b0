//! Derivative-free minimization (Nelder-Mead simplex)

/// Nelder-Mead settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NelderMead {
    /// Initial simplex edge length
    pub step: f64,
    /// Stop when the spread of simplex values falls below this
    pub tolerance: f64,
    /// Maximum iterations
    pub max_iterations: usize,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            step: 0.5,
            tolerance: 1e-8,
            max_iterations: 2000,
        }
    }
}

/// Result of a minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    /// Arg-min found
    pub point: Vec<f64>,
    /// Objective at `point`
    pub value: f64,
    /// Iterations used
    pub iterations: usize,
    /// Tolerance reached before the iteration cap
    pub converged: bool,
}

impl NelderMead {
    /// Minimize `f` starting from `start`.
    ///
    /// Non-finite objective values are treated as `+inf`, so the simplex
    /// moves away from infeasible regions.
    pub fn minimize<F>(&self, f: F, start: &[f64]) -> Minimum
    where
        F: Fn(&[f64]) -> f64,
    {
        let eval = |x: &[f64]| {
            let v = f(x);
            if v.is_finite() {
                v
            } else {
                f64::INFINITY
            }
        };

        let dim = start.len();
        let mut simplex: Vec<Vec<f64>> = vec![start.to_vec()];
        for i in 0..dim {
            let mut vertex = start.to_vec();
            vertex[i] += self.step;
            simplex.push(vertex);
        }
        let mut values: Vec<f64> = simplex.iter().map(|x| eval(x)).collect();

        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.max_iterations {
            let mut order: Vec<usize> = (0..=dim).collect();
            order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
            simplex = order.iter().map(|&i| simplex[i].clone()).collect();
            values = order.iter().map(|&i| values[i]).collect();

            let (best, worst) = (values[0], values[dim]);
            if (worst - best).abs() <= self.tolerance * (1.0 + best.abs()) {
                converged = true;
                break;
            }
            iterations += 1;

            #[allow(clippy::cast_precision_loss)]
            let centroid: Vec<f64> = (0..dim)
                .map(|j| simplex[..dim].iter().map(|x| x[j]).sum::<f64>() / dim as f64)
                .collect();
            let along = |t: f64| -> Vec<f64> {
                centroid
                    .iter()
                    .zip(&simplex[dim])
                    .map(|(c, w)| c + t * (w - c))
                    .collect()
            };

            let reflected = along(-1.0);
            let f_reflected = eval(&reflected);
            if f_reflected < values[0] {
                let expanded = along(-2.0);
                let f_expanded = eval(&expanded);
                if f_expanded < f_reflected {
                    simplex[dim] = expanded;
                    values[dim] = f_expanded;
                } else {
                    simplex[dim] = reflected;
                    values[dim] = f_reflected;
                }
                continue;
            }
            if f_reflected < values[dim - 1] {
                simplex[dim] = reflected;
                values[dim] = f_reflected;
                continue;
            }

            let (contracted, f_contracted) = if f_reflected < values[dim] {
                let c = along(-0.5);
                let fc = eval(&c);
                (c, fc)
            } else {
                let c = along(0.5);
                let fc = eval(&c);
                (c, fc)
            };
            if f_contracted < values[dim].min(f_reflected) {
                simplex[dim] = contracted;
                values[dim] = f_contracted;
                continue;
            }

            // shrink toward the best vertex
            let best_vertex = simplex[0].clone();
            for i in 1..=dim {
                simplex[i] = best_vertex
                    .iter()
                    .zip(&simplex[i])
                    .map(|(b, x)| b + 0.5 * (x - b))
                    .collect();
                values[i] = eval(&simplex[i]);
            }
        }

        let best = (0..=dim)
            .min_by(|&a, &b| values[a].total_cmp(&values[b]))
            .unwrap_or(0);
        Minimum {
            point: simplex[best].clone(),
            value: values[best],
            iterations,
            converged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadratic_bowl() {
        let min = NelderMead::default().minimize(
            |x| (x[0] - 3.0).powi(2) + 2.0 * (x[1] + 1.0).powi(2),
            &[0.0, 0.0],
        );
        assert!(min.converged);
        assert!((min.point[0] - 3.0).abs() < 1e-3);
        assert!((min.point[1] + 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_rosenbrock() {
        let nm = NelderMead {
            max_iterations: 10_000,
            tolerance: 1e-12,
            ..NelderMead::default()
        };
        let min = nm.minimize(
            |x| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2),
            &[-1.2, 1.0],
        );
        assert!((min.point[0] - 1.0).abs() < 1e-2);
        assert!((min.point[1] - 1.0).abs() < 1e-2);
    }

    #[test]
    fn test_infeasible_region_is_avoided() {
        let min = NelderMead::default().minimize(
            |x| if x[0] < 0.0 { f64::NAN } else { (x[0] - 1.0).powi(2) },
            &[2.0],
        );
        assert!((min.point[0] - 1.0).abs() < 1e-3);
    }
}
