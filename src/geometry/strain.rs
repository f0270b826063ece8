//! Strain-to-shape inversion for helically symmetric multicore fiber.
//!
//! Follows Modes, Ortmaier and Burgner-Kahrs, "Shape Sensing Based on
//! Longitudinal Strain Measurements Considering Elongation, Bending, and
//! Twisting", IEEE Sensors Journal, 2020.
//!
//! Core layout (backbone along x):
//!
//! ```text
//! c1: centre core, pure elongation
//! c2: outer core at  90°
//! c3: outer core at 210°
//! c4: outer core at 330°
//! ```
//!
//! The tolerances below encode physical assumptions of the method and are not
//! meant to be tuned.

use crate::core::CurvatureStrain;
use crate::error::InversionError;
use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Strain values arrive in micro-strain.
const MICROSTRAIN: f64 = 1e-6;

/// Both twist roots within this distance of 0.5 means no bending: twist is zero.
const DEGENERATE_ROOT_TOL: f64 = 1e-4;

/// Pairwise bending-angle estimates must agree within this many radians.
const ANGLE_AGREEMENT_TOL: f64 = 1e-4;

/// Below this `|cos(theta_b - theta_i)|` a core lies in the bending plane.
const COPLANAR_TOL: f64 = 1e-6;

/// Angular position of an outer core and its cached trigonometry.
#[derive(Clone, Copy, Debug)]
struct CoreAngle {
    theta: f64,
    sin: f64,
    cos: f64,
}

impl CoreAngle {
    fn new(theta: f64) -> Self {
        Self {
            theta,
            sin: theta.sin(),
            cos: theta.cos(),
        }
    }
}

/// Converts four per-core strain readings into twist, curvature and elongation.
#[derive(Clone, Debug)]
pub struct StrainInverter {
    radius: f64,
    cores: [CoreAngle; 3],
    /// `[s12, s23, s31]` with `sij = sin(theta_i - theta_j)`
    pair_sines: [f64; 3],
}

/// One inverted grating point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Inversion {
    /// Twist, curvature and elongation at the point
    pub strain: CurvatureStrain,
    /// Whether the three pairwise bending-angle estimates agreed. When they
    /// do not, `strain` is computed from the `+sqrt` root and the (1,2)
    /// estimate and should be treated as approximate.
    pub consistent: bool,
}

/// Which twist root the inverter evaluates first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RootOrder {
    /// `+sqrt` root first (the published ordering)
    PositiveFirst,
    /// `-sqrt` root first
    NegativeFirst,
}

impl StrainInverter {
    /// Create an inverter for a fiber with the given effective core radius (m).
    pub fn new(radius: f64) -> Self {
        let cores = [
            CoreAngle::new(FRAC_PI_2),
            CoreAngle::new(2.0 * PI / 3.0 + FRAC_PI_2),
            CoreAngle::new(4.0 * PI / 3.0 + FRAC_PI_2),
        ];
        let pair_sines = [
            (cores[0].theta - cores[1].theta).sin(),
            (cores[1].theta - cores[2].theta).sin(),
            (cores[2].theta - cores[0].theta).sin(),
        ];
        Self {
            radius,
            cores,
            pair_sines,
        }
    }

    /// Effective core radius in meters.
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Invert one grating point.
    ///
    /// `center` is the centre-core strain, `outer` the three outer-core strains
    /// in core order (90°, 210°, 330°), all in micro-strain.
    ///
    /// A root whose estimates agree is preferred. Otherwise the first root with
    /// finite estimates is used and the result is marked inconsistent.
    ///
    /// # Errors
    /// [`InversionError::NoFiniteSolution`] if neither root yields finite
    /// estimates or the resulting curvature is not finite.
    pub fn invert(&self, center: f64, outer: [f64; 3]) -> Result<Inversion, InversionError> {
        self.invert_with_order(center, outer, RootOrder::PositiveFirst)
    }

    /// Invert one grating point, choosing which twist root is tried first.
    pub fn invert_with_order(
        &self,
        center: f64,
        outer: [f64; 3],
        order: RootOrder,
    ) -> Result<Inversion, InversionError> {
        let epsilon_a = center * MICROSTRAIN;
        let e_a = 1.0 + epsilon_a;
        let epsilon = outer.map(|s| s * MICROSTRAIN);
        let stretch = epsilon.map(|e| 1.0 + e);

        let [s12, s23, s31] = self.pair_sines;
        let q = (epsilon[0] * s23 + epsilon[1] * s31 + epsilon[2] * s12) / (s23 + s31 + s12);

        let half = e_a / 2.0;
        let root = (half * half - q).sqrt();
        let roots = [root, -root];

        let mut twists = roots.map(|x| (1.0 / self.radius) * (1.0 - (half + x) * (half + x)).sqrt());
        if roots
            .iter()
            .all(|x| (x.abs() - 0.5).abs() < DEGENERATE_ROOT_TOL)
        {
            twists = [0.0, 0.0];
        }

        let attempt_order = match order {
            RootOrder::PositiveFirst => [twists[0], twists[1]],
            RootOrder::NegativeFirst => [twists[1], twists[0]],
        };

        let no_solution = || InversionError::NoFiniteSolution {
            twist_candidates: twists,
        };

        let consistent = attempt_order.iter().find_map(|&twist| {
            self.bending_angles(e_a, &stretch, twist)
                .filter(|[t12, t23, t31]| angles_agree(*t12, *t23) && angles_agree(*t12, *t31))
                .map(|[t12, _, _]| (twist, t12))
        });

        // Root order only matters among consistent roots; the fallback is
        // always the published `+sqrt` root first.
        let (twist, theta_b, is_consistent) = match consistent {
            Some((twist, theta_b)) => (twist, theta_b, true),
            None => twists
                .iter()
                .find_map(|&twist| {
                    self.bending_angles(e_a, &stretch, twist)
                        .map(|[t12, _, _]| (twist, t12, false))
                })
                .ok_or_else(no_solution)?,
        };

        let kappa = self.curvature(e_a, &stretch, twist, theta_b);
        if !kappa.is_finite() {
            return Err(no_solution());
        }

        Ok(Inversion {
            strain: CurvatureStrain {
                twist,
                kappa_y: kappa * theta_b.cos(),
                kappa_z: kappa * theta_b.sin(),
                elongation: e_a,
            },
            consistent: is_consistent,
        })
    }

    /// Pairwise bending-plane estimates `[(1,2), (2,3), (3,1)]` for a twist
    /// candidate, if all are finite.
    fn bending_angles(&self, e_a: f64, stretch: &[f64; 3], twist: f64) -> Option<[f64; 3]> {
        let rt = self.radius * twist;
        let a = stretch.map(|e| (e * e - rt * rt).sqrt() - e_a);
        let [c1, c2, c3] = self.cores;

        // Pairs are taken in cyclic core order so every estimate shares the
        // sign of sin(theta_i - theta_j).
        let pair = |ai: f64, ci: &CoreAngle, aj: f64, cj: &CoreAngle| {
            let y = ai * cj.cos - aj * ci.cos;
            let x = aj * ci.sin - ai * cj.sin;
            if y == 0.0 && x == 0.0 {
                // No bending signal: the plane is undefined, report 0.
                0.0
            } else {
                y.atan2(x)
            }
        };

        let theta_12 = pair(a[0], &c1, a[1], &c2);
        let theta_23 = pair(a[1], &c2, a[2], &c3);
        let theta_31 = pair(a[2], &c3, a[0], &c1);

        let estimates = [theta_12, theta_23, theta_31];
        estimates.iter().all(|t| t.is_finite()).then_some(estimates)
    }

    /// Curvature magnitude from the first outer core not lying in the bending plane.
    fn curvature(&self, e_a: f64, stretch: &[f64; 3], twist: f64, theta_b: f64) -> f64 {
        let rt = self.radius * twist;
        let (e_i, core) = if (theta_b - self.cores[0].theta).cos().abs() > COPLANAR_TOL {
            (stretch[0], self.cores[0])
        } else {
            (stretch[1], self.cores[1])
        };
        -1.0 / (self.radius * (theta_b - core.theta).cos()) * ((e_i * e_i - rt * rt).sqrt() - e_a)
    }
}

/// Whether two angles agree within tolerance modulo 2π.
fn angles_agree(a: f64, b: f64) -> bool {
    let diff = (a - b).abs();
    diff < ANGLE_AGREEMENT_TOL || (diff - TAU).abs() < ANGLE_AGREEMENT_TOL
}

#[cfg(test)]
mod tests {
    use super::*;

    const RADIUS: f64 = 50e-6;

    /// Micro-strain readings produced by pure bending (no twist, no elongation).
    fn pure_bending(inverter: &StrainInverter, kappa: f64, theta_b: f64) -> [f64; 3] {
        inverter
            .cores
            .map(|c| -RADIUS * kappa * (theta_b - c.theta).cos() / MICROSTRAIN)
    }

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}"
        );
    }

    fn solve(inverter: &StrainInverter, center: f64, outer: [f64; 3]) -> CurvatureStrain {
        let inversion = inverter.invert(center, outer).unwrap();
        assert!(inversion.consistent, "inconsistent inversion for {outer:?}");
        inversion.strain
    }

    #[test]
    fn test_zero_strain_is_straight_fiber() {
        let inverter = StrainInverter::new(RADIUS);
        let out = solve(&inverter, 0.0, [0.0; 3]);
        assert_eq!(
            out,
            CurvatureStrain {
                twist: 0.0,
                kappa_y: 0.0,
                kappa_z: 0.0,
                elongation: 1.0,
            }
        );
    }

    #[test]
    fn test_pure_bending_recovers_curvature() {
        let inverter = StrainInverter::new(RADIUS);
        for &(kappa, theta_b) in &[(2.0, 0.3), (5.0, -1.2), (1.5, 2.5)] {
            let outer = pure_bending(&inverter, kappa, theta_b);
            let out = solve(&inverter, 0.0, outer);
            assert_eq!(out.twist, 0.0);
            assert_close(out.kappa_y, kappa * theta_b.cos(), 1e-6);
            assert_close(out.kappa_z, kappa * theta_b.sin(), 1e-6);
            assert_eq!(out.elongation, 1.0);
        }
    }

    #[test]
    fn test_bending_plane_through_first_core_uses_second() {
        // theta_b = 0 puts the first outer core (90°) in the neutral plane.
        let inverter = StrainInverter::new(RADIUS);
        let outer = pure_bending(&inverter, 3.0, 0.0);
        let out = solve(&inverter, 0.0, outer);
        assert_close(out.kappa_y, 3.0, 1e-6);
        assert_close(out.kappa_z, 0.0, 1e-6);
    }

    #[test]
    fn test_elongation_passes_through() {
        let inverter = StrainInverter::new(RADIUS);
        let out = solve(&inverter, 30.0, [30.0; 3]);
        assert_eq!(out.elongation, 1.0 + 30.0 * MICROSTRAIN);
        assert_eq!(out.twist, 0.0);
        assert_eq!(out.kappa_y, 0.0);
        assert_eq!(out.kappa_z, 0.0);
    }

    #[test]
    fn test_root_order_does_not_change_result() {
        let inverter = StrainInverter::new(RADIUS);
        let cases = [
            (0.0, [0.0; 3]),
            (0.0, pure_bending(&inverter, 2.0, 0.3)),
            (12.0, [40.0, -25.0, 5.0]),
        ];
        for (center, outer) in cases {
            let a = inverter.invert_with_order(center, outer, RootOrder::PositiveFirst);
            let b = inverter.invert_with_order(center, outer, RootOrder::NegativeFirst);
            assert_eq!(a, b, "root order changed result for {outer:?}");
        }
    }

    #[test]
    fn test_common_mode_offset_is_flagged_but_solved() {
        // A 1 µε offset between centre and outer cores breaks estimate
        // agreement; curvature must still come through.
        let inverter = StrainInverter::new(RADIUS);
        for &(kappa, theta_b) in &[(2.0, 0.3), (5.0, -1.2)] {
            let outer = pure_bending(&inverter, kappa, theta_b).map(|s| s + 1.0);
            let inversion = inverter.invert(0.0, outer).unwrap();
            assert!(!inversion.consistent);
            let out = inversion.strain;
            assert_eq!(out.twist, 0.0);
            assert_close(out.kappa_y, kappa * theta_b.cos(), 0.05 * kappa);
            assert_close(out.kappa_z, kappa * theta_b.sin(), 0.05 * kappa);
        }
    }

    #[test]
    fn test_unphysical_strain_is_inconsistent() {
        // Outer cores compressed below zero length: only the second root is
        // finite and its estimates disagree.
        let inverter = StrainInverter::new(RADIUS);
        let inversion = inverter.invert(0.0, [-2.0e6, 1.0e6, -3.0e6]).unwrap();
        assert!(!inversion.consistent);
        assert!(inversion.strain.twist > 0.0);
    }

    #[test]
    fn test_non_finite_strain_has_no_solution() {
        let inverter = StrainInverter::new(RADIUS);
        for outer in [[f64::NAN, 0.0, 0.0], [0.0, f64::INFINITY, 0.0]] {
            let err = inverter.invert(0.0, outer).unwrap_err();
            assert!(matches!(err, InversionError::NoFiniteSolution { .. }), "{outer:?}");
        }
    }

    #[test]
    fn test_angles_agree_wraps() {
        assert!(angles_agree(PI - 1e-6, -PI + 1e-6));
        assert!(angles_agree(0.1, 0.1 + 5e-5));
        assert!(!angles_agree(0.1, 0.2));
    }
}
