// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The coloring capability and its Mandelbrot implementation.  A
//! color function is the sole point of variation between fractal
//! families: anything that can turn a point of fractal space into a
//! color, given the viewport's iteration cap and coloring
//! coefficient, plugs into the scheduler and worker machinery
//! unchanged.

use num::Complex;
use std::f64::consts::LN_2;

use framebuffer::Color;
use viewport::{FractalRect, MIN_COLORING};

/// The squared bailout radius.  An orbit whose squared magnitude
/// exceeds this has escaped.  The generous radius (12, not the
/// classical 2) keeps the smoothed iteration count well away from the
/// seam where its inner logarithm misbehaves.
const BAILOUT_SQUARED: f64 = 144.0;

/// Turns points of fractal space into colors.
pub trait ColorFunction: Send + Sync {
    /// The color of the given point at the given iteration cap and
    /// coloring coefficient.  Points classified as inside the set
    /// must return exactly `sentinel()`.
    fn color_at(&self, point: Complex<f64>, max_iterations: u32, coloring: f64) -> Color;

    /// The rectangle of fractal space that frames the whole set, used
    /// as the starting view.
    fn default_view(&self) -> FractalRect;

    /// The color denoting "inside the set".  The chunk renderer keys
    /// its interior optimization off this value.
    fn sentinel(&self) -> Color {
        Color::BLACK
    }
}

/// The Mandelbrot set, colored with the Normalized Iteration Count
/// algorithm: the escape radius and the iteration count together give
/// a continuous escape measure, and a sine and cosine on top of it
/// produce a smooth cyclic gradient that shifts as the coloring
/// coefficient varies.
pub struct Mandelbrot;

impl Mandelbrot {
    /// Whether the point lies inside the set's main cardioid, which
    /// the iteration loop would grind through the whole cap to
    /// discover.  <https://en.wikipedia.org/wiki/Mandelbrot_set#Cardioid_/_bulb_checking>
    fn in_main_cardioid(x: f64, y: f64) -> bool {
        let y_sq = y * y;
        let x_off = x - 0.25;
        let q = x_off * x_off + y_sq;
        q * (q + x_off) < y_sq / 4.0
    }

    /// Whether the point lies inside the period-2 bulb, the disc of
    /// radius 1/4 centered on -1.  The 1/16 here must be a real
    /// division; as an integer it truncates to zero and the test
    /// silently never fires.
    fn in_period2_bulb(x: f64, y: f64) -> bool {
        let x_off = x + 1.0;
        x_off * x_off + y * y < 0.0625
    }
}

impl ColorFunction for Mandelbrot {
    fn color_at(&self, point: Complex<f64>, max_iterations: u32, coloring: f64) -> Color {
        if Mandelbrot::in_main_cardioid(point.re, point.im)
            || Mandelbrot::in_period2_bulb(point.re, point.im)
        {
            return Color::BLACK;
        }

        // z <- z^2 + c, tracking the squares so each round costs two
        // multiplications and the escape test is free.
        let (mut x, mut y) = (0.0_f64, 0.0_f64);
        let (mut x_sq, mut y_sq) = (0.0_f64, 0.0_f64);
        let mut iterations = 0;
        while iterations < max_iterations && x_sq + y_sq <= BAILOUT_SQUARED {
            y = 2.0 * x * y + point.im;
            x = x_sq - y_sq + point.re;
            x_sq = x * x;
            y_sq = y * y;
            iterations += 1;
        }

        if iterations == max_iterations {
            return Color::BLACK;
        }

        let mu = f64::from(iterations) - (x_sq + y_sq).ln().ln() / LN_2;
        let k = coloring.max(MIN_COLORING);
        let sin = (mu / k).sin() / 2.0 + 0.5;
        let cos = (mu / k).cos() / 2.0 + 0.5;
        Color::from_channels(cos, cos, sin)
    }

    fn default_view(&self) -> FractalRect {
        FractalRect {
            x: -2.05,
            y: -1.2,
            width: 2.7,
            height: 2.4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_is_interior() {
        let color = Mandelbrot.color_at(Complex::new(0.0, 0.0), 500, 1.0);
        assert_eq!(color, Mandelbrot.sentinel());
    }

    #[test]
    fn one_escapes_quickly_to_a_gradient_color() {
        // (1, 0) leaves the bailout radius within a handful of
        // rounds, so even a tiny cap sees it escape.
        let color = Mandelbrot.color_at(Complex::new(1.0, 0.0), 10, 1.0);
        assert_ne!(color, Mandelbrot.sentinel());
        let capped = Mandelbrot.color_at(Complex::new(1.0, 0.0), 500, 1.0);
        assert_ne!(capped, Mandelbrot.sentinel());
    }

    #[test]
    fn cardioid_test_accepts_known_interior_points() {
        assert!(Mandelbrot::in_main_cardioid(0.0, 0.0));
        assert!(Mandelbrot::in_main_cardioid(-0.2, 0.1));
        assert!(!Mandelbrot::in_main_cardioid(1.0, 0.0));
        assert!(!Mandelbrot::in_main_cardioid(-1.0, 0.0));
    }

    #[test]
    fn bulb_test_accepts_the_disc_around_minus_one() {
        // These points sit inside the period-2 bulb but outside the
        // cardioid; with the truncated integer constant the test
        // would reject every one of them.
        assert!(Mandelbrot::in_period2_bulb(-1.0, 0.0));
        assert!(Mandelbrot::in_period2_bulb(-1.1, 0.1));
        assert!(Mandelbrot::in_period2_bulb(-0.8, 0.05));

        assert!(!Mandelbrot::in_period2_bulb(-0.5, 0.0));
        assert!(!Mandelbrot::in_period2_bulb(-1.3, 0.0));
    }

    #[test]
    fn bulb_points_color_as_sentinel() {
        let color = Mandelbrot.color_at(Complex::new(-1.05, 0.05), 500, 1.0);
        assert_eq!(color, Mandelbrot.sentinel());
    }

    #[test]
    fn zero_cap_classifies_everything_interior() {
        for &(re, im) in &[(0.0, 0.0), (1.0, 0.0), (-2.0, 1.2), (5.0, 5.0)] {
            let color = Mandelbrot.color_at(Complex::new(re, im), 0, 1.0);
            assert_eq!(color, Mandelbrot.sentinel());
        }
    }

    #[test]
    fn escaped_colors_never_collide_with_the_sentinel() {
        // sin and cos cannot both be -1, so at least one channel of
        // an escaped color is nonzero.
        for step in 0..50 {
            let re = 0.5 + (step as f64) * 0.05;
            let color = Mandelbrot.color_at(Complex::new(re, 0.4), 200, 1.0);
            assert_ne!(color, Mandelbrot.sentinel(), "collision at re={}", re);
        }
    }

    #[test]
    fn coloring_coefficient_shifts_the_gradient() {
        let point = Complex::new(0.4, 0.4);
        let narrow = Mandelbrot.color_at(point, 200, 1.0);
        let wide = Mandelbrot.color_at(point, 200, 3.0);
        assert_ne!(narrow, wide);
    }

    #[test]
    fn degenerate_coloring_coefficient_is_floored() {
        // A zero (or negative) coefficient must not divide by zero;
        // the floor makes the result finite and well-defined.
        let color = Mandelbrot.color_at(Complex::new(1.0, 0.0), 100, 0.0);
        assert_ne!(color, Mandelbrot.sentinel());
    }

    #[test]
    fn default_view_frames_the_set() {
        let view = Mandelbrot.default_view();
        assert_eq!((view.x, view.y), (-2.05, -1.2));
        assert_eq!((view.width, view.height), (2.7, 2.4));
    }
}
