//! Polynomials in one variable and linear motions over a unit time interval.
//!
//! Continuous collision detection expresses every moving quantity as a first degree
//! polynomial in normalized time `t ∈ [0, 1]`. Distances and coplanarity conditions between
//! moving points are products of such motions, so they become polynomials of degree 2 or 3
//! whose earliest root in `[0, 1]` is the time of impact.

use std::ops::{Add, Mul, Neg, Sub};

use glam::DVec3;

/// Polynomial `c0 + c1·t + c2·t² + …`.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coefficients: Vec<f64>,
}

impl Polynomial {
    pub fn new(coefficients: Vec<f64>) -> Self {
        let mut poly = Self { coefficients };
        poly.trim();
        poly
    }

    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }

    /// First degree polynomial going from `start` at `t = 0` to `end` at `t = 1`.
    pub fn linear(start: f64, end: f64) -> Self {
        Self::new(vec![start, end - start])
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn coefficient(&self, power: usize) -> f64 {
        self.coefficients.get(power).copied().unwrap_or(0.0)
    }

    /// Degree of the polynomial; the zero polynomial reports 0.
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub fn is_zero(&self) -> bool {
        self.coefficients.iter().all(|c| *c == 0.0)
    }

    pub fn evaluate(&self, t: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, coefficient| acc * t + coefficient)
    }

    pub fn derivative(&self) -> Self {
        if self.coefficients.len() <= 1 {
            return Self::constant(0.0);
        }
        Self::new(
            self.coefficients
                .iter()
                .enumerate()
                .skip(1)
                .map(|(power, c)| c * power as f64)
                .collect(),
        )
    }

    /// Real roots inside `[low, high]`, sorted ascending.
    ///
    /// Roots are isolated between the critical points of the polynomial (found recursively
    /// on the derivative) and refined by bisection down to `epsilon`.
    pub fn roots_in(&self, low: f64, high: f64, epsilon: f64) -> Vec<f64> {
        if low > high || self.is_zero() {
            return Vec::new();
        }
        match self.degree() {
            0 => Vec::new(),
            1 => {
                let root = -self.coefficient(0) / self.coefficient(1);
                if (low..=high).contains(&root) {
                    vec![root]
                } else {
                    Vec::new()
                }
            }
            _ => {
                let mut bounds = vec![low];
                bounds.extend(self.derivative().roots_in(low, high, epsilon));
                bounds.push(high);

                let mut roots: Vec<f64> = Vec::new();
                for window in bounds.windows(2) {
                    if let Some(root) = self.bisect(window[0], window[1], epsilon) {
                        if roots
                            .last()
                            .map_or(true, |last| (root - last).abs() > epsilon)
                        {
                            roots.push(root);
                        }
                    }
                }
                roots
            }
        }
    }

    /// Earliest root inside `[low, high]`.
    pub fn first_root_in(&self, low: f64, high: f64, epsilon: f64) -> Option<f64> {
        self.roots_in(low, high, epsilon).into_iter().next()
    }

    fn bisect(&self, mut low: f64, mut high: f64, epsilon: f64) -> Option<f64> {
        let mut f_low = self.evaluate(low);
        let f_high = self.evaluate(high);
        if f_low.abs() <= epsilon {
            return Some(low);
        }
        if f_high.abs() <= epsilon {
            return Some(high);
        }
        if f_low.signum() == f_high.signum() {
            return None;
        }
        for _ in 0..200 {
            let mid = 0.5 * (low + high);
            let f_mid = self.evaluate(mid);
            if f_mid == 0.0 || (high - low) * 0.5 < epsilon {
                return Some(mid);
            }
            if f_mid.signum() == f_low.signum() {
                low = mid;
                f_low = f_mid;
            } else {
                high = mid;
            }
        }
        Some(0.5 * (low + high))
    }

    fn trim(&mut self) {
        while self.coefficients.len() > 1 && self.coefficients.last() == Some(&0.0) {
            self.coefficients.pop();
        }
        if self.coefficients.is_empty() {
            self.coefficients.push(0.0);
        }
    }
}

impl Add for &Polynomial {
    type Output = Polynomial;

    fn add(self, other: &Polynomial) -> Polynomial {
        let len = self.coefficients.len().max(other.coefficients.len());
        Polynomial::new(
            (0..len)
                .map(|i| self.coefficient(i) + other.coefficient(i))
                .collect(),
        )
    }
}

impl Sub for &Polynomial {
    type Output = Polynomial;

    fn sub(self, other: &Polynomial) -> Polynomial {
        self + &(-other)
    }
}

impl Neg for &Polynomial {
    type Output = Polynomial;

    fn neg(self) -> Polynomial {
        Polynomial::new(self.coefficients.iter().map(|c| -c).collect())
    }
}

impl Mul for &Polynomial {
    type Output = Polynomial;

    fn mul(self, other: &Polynomial) -> Polynomial {
        let mut result = vec![0.0; self.coefficients.len() + other.coefficients.len() - 1];
        for (i, a) in self.coefficients.iter().enumerate() {
            for (j, b) in other.coefficients.iter().enumerate() {
                result[i + j] += a * b;
            }
        }
        Polynomial::new(result)
    }
}

/// Point moving linearly from `start` (t = 0) to `end` (t = 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearMotion {
    pub start: DVec3,
    pub end: DVec3,
}

impl LinearMotion {
    pub fn new(start: DVec3, end: DVec3) -> Self {
        Self { start, end }
    }

    pub fn at(&self, t: f64) -> DVec3 {
        self.start + (self.end - self.start) * t
    }

    pub fn component(&self, axis: usize) -> Polynomial {
        Polynomial::linear(self.start[axis], self.end[axis])
    }

    pub fn dot(&self, other: &LinearMotion) -> Polynomial {
        (0..3).fold(Polynomial::constant(0.0), |acc, axis| {
            &acc + &(&self.component(axis) * &other.component(axis))
        })
    }

    /// Component-wise polynomials of `self × other`.
    pub fn cross(&self, other: &LinearMotion) -> [Polynomial; 3] {
        let (ax, ay, az) = (self.component(0), self.component(1), self.component(2));
        let (bx, by, bz) = (other.component(0), other.component(1), other.component(2));
        [
            &(&ay * &bz) - &(&az * &by),
            &(&az * &bx) - &(&ax * &bz),
            &(&ax * &by) - &(&ay * &bx),
        ]
    }

    /// Cubic `(a × b) · c` of three motions.
    pub fn triple_product(a: &LinearMotion, b: &LinearMotion, c: &LinearMotion) -> Polynomial {
        let cross = a.cross(b);
        (0..3).fold(Polynomial::constant(0.0), |acc, axis| {
            &acc + &(&cross[axis] * &c.component(axis))
        })
    }
}

impl Sub for LinearMotion {
    type Output = LinearMotion;

    fn sub(self, other: LinearMotion) -> LinearMotion {
        LinearMotion::new(self.start - other.start, self.end - other.end)
    }
}

impl Add for LinearMotion {
    type Output = LinearMotion;

    fn add(self, other: LinearMotion) -> LinearMotion {
        LinearMotion::new(self.start + other.start, self.end + other.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cubic_roots_are_sorted() {
        // (t - 0.2)(t - 0.5)(t - 0.9)
        let p = &(&Polynomial::new(vec![-0.2, 1.0]) * &Polynomial::new(vec![-0.5, 1.0]))
            * &Polynomial::new(vec![-0.9, 1.0]);
        let roots = p.roots_in(0.0, 1.0, 1e-12);
        assert_eq!(roots.len(), 3);
        assert_relative_eq!(roots[0], 0.2, epsilon = 1e-9);
        assert_relative_eq!(roots[1], 0.5, epsilon = 1e-9);
        assert_relative_eq!(roots[2], 0.9, epsilon = 1e-9);
    }

    #[test]
    fn double_root_is_found_once() {
        let p = Polynomial::new(vec![0.25, -1.0, 1.0]); // (t - 0.5)^2
        let roots = p.roots_in(0.0, 1.0, 1e-10);
        assert_eq!(roots.len(), 1);
        assert_relative_eq!(roots[0], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn motion_dot_product_is_quadratic() {
        let a = LinearMotion::new(DVec3::new(-1.0, 0.0, 0.0), DVec3::new(1.0, 0.0, 0.0));
        let squared = a.dot(&a);
        assert_eq!(squared.degree(), 2);
        assert_relative_eq!(squared.evaluate(0.5), 0.0);
        assert_relative_eq!(squared.evaluate(1.0), 1.0);
    }
}
