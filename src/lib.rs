#![deny(missing_docs)]
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Escape-time fractal rendering engine
//!
//! An escape-time fractal (the Mandelbrot set is the canonical one)
//! classifies each point of the complex plane by iterating a simple
//! formula and watching whether the orbit runs off to infinity.  The
//! points that never escape form the black heart of the image; the
//! points that do escape are colored by how quickly they leave.
//!
//! This crate renders such fractals into a shared raster that can be
//! explored interactively.  The screen is carved into fixed-size
//! chunks, a pool of worker threads continuously pulls chunks from a
//! work queue and paints them, and every change to the view (zooming,
//! panning, recoloring, resolution changes) simply refills the queue
//! so the workers start the picture over.  The raster is never
//! cleared; fresh pixels overwrite stale ones, so a display loop can
//! sample it at any time and always gets the best picture so far.
//!
//! Workers exploit the connectedness of the set's interior: a chunk
//! whose entire border lands inside the set must be interior all the
//! way through, so its inner pixels can be flood-filled without being
//! computed.  On views dominated by the black heart this skips most of
//! the work.

extern crate crossbeam;
extern crate itertools;
extern crate log;
extern crate num;
extern crate num_cpus;

pub mod chunks;
pub mod framebuffer;
pub mod mandelbrot;
pub mod render;
pub mod viewport;

pub use chunks::{Chunk, WorkQueue, CHUNK_SIZE};
pub use framebuffer::{Color, FrameBuffer};
pub use mandelbrot::{ColorFunction, Mandelbrot};
pub use render::{Renderer, IDLE_WAIT};
pub use viewport::{
    FractalRect, ScreenPoint, ScreenSize, ViewListener, ViewParams, ViewSnapshot, Viewport,
    MIN_COLORING,
};
