// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The rendering engine: a pool of worker threads that pull chunks
//! from the work queue and paint them into the shared frame buffer.
//!
//! Each chunk is painted border-first.  When every border pixel
//! resolves to the color function's sentinel, the interior is filled
//! with the sentinel without computing a single inner pixel.  This
//! leans on a property of escape-time sets like the Mandelbrot, whose
//! interior is a connected region: a tile fenced entirely by interior
//! points cannot contain exterior ones.  It is a heuristic about the
//! fractal, not a general truth about images, and a color function
//! for a set without that property must not share a sentinel with
//! this renderer's fill path.  For a chunk that qualifies, only the
//! perimeter is computed, about a sixth of the work at the default
//! chunk size.

extern crate crossbeam;
extern crate num_cpus;

use itertools::iproduct;
use log::error;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chunks::{Chunk, WorkQueue};
use framebuffer::{Color, FrameBuffer};
use mandelbrot::ColorFunction;
use viewport::{ViewParams, Viewport};

/// How long an idle worker parks on the empty queue before checking
/// again.  A restart wakes it sooner.
pub const IDLE_WAIT: Duration = Duration::from_millis(250);

/// Everything a worker needs to paint a chunk.  Cloned into each
/// worker thread; the fields are all shared handles.
#[derive(Clone)]
struct ChunkPainter {
    viewport: Arc<Viewport>,
    color: Arc<dyn ColorFunction>,
    frame: Arc<FrameBuffer>,
    chunk_size: usize,
}

impl ChunkPainter {
    /// Computes the color under one screen pixel, writes it into the
    /// frame buffer (clipped), and returns it.
    fn color_pixel(&self, x: usize, y: usize, params: &ViewParams) -> Color {
        let color = self
            .color
            .color_at(params.fractal_at(x, y), params.max_iterations, params.coloring);
        self.frame.set(x, y, color);
        color
    }

    /// Paints one chunk: the full border first, then either the
    /// sentinel fill or every interior pixel individually.  The view
    /// parameters are copied once up front, so a restart arriving
    /// mid-chunk lets this chunk finish with the old view; its stale
    /// pixels are overwritten by the pass the restart queued.
    fn render_chunk(&self, chunk: Chunk) {
        let params = self.viewport.params();
        let sentinel = self.color.sentinel();
        let size = self.chunk_size;
        let mut border_is_interior = true;

        // Top and bottom rows, sans corners; the columns cover those.
        for x in chunk.x + 1..chunk.x + size - 1 {
            if self.color_pixel(x, chunk.y, &params) != sentinel {
                border_is_interior = false;
            }
            if self.color_pixel(x, chunk.y + size - 1, &params) != sentinel {
                border_is_interior = false;
            }
        }
        for y in chunk.y..chunk.y + size {
            if self.color_pixel(chunk.x, y, &params) != sentinel {
                border_is_interior = false;
            }
            if self.color_pixel(chunk.x + size - 1, y, &params) != sentinel {
                border_is_interior = false;
            }
        }

        if border_is_interior {
            self.frame
                .fill_rect(chunk.x + 1, chunk.y + 1, size - 2, size - 2, sentinel);
        } else {
            for (x, y) in iproduct!(
                chunk.x + 1..chunk.x + size - 1,
                chunk.y + 1..chunk.y + size - 1
            ) {
                self.color_pixel(x, y, &params);
            }
        }
    }
}

/// The loop each resident worker runs: park on the queue, paint
/// whatever comes out, repeat until the queue is closed.  A panic
/// while painting is confined to the chunk that caused it; the worker
/// reports it and moves on, and its siblings never notice.
fn worker_loop(id: usize, painter: ChunkPainter, queue: Arc<WorkQueue>) {
    loop {
        match queue.wait_poll(IDLE_WAIT) {
            Some(chunk) => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| painter.render_chunk(chunk)));
                if outcome.is_err() {
                    error!(
                        "render worker {}: painting chunk ({}, {}) panicked; skipping it",
                        id, chunk.x, chunk.y
                    );
                }
            }
            None => {
                if queue.is_closed() {
                    break;
                }
            }
        }
    }
}

/// Owns the frame buffer, the work queue, and the worker pool, and
/// wires the viewport's change notification to the queue's restart.
/// Construction allocates everything; `start_rendering` brings the
/// pool up and `stop` tears it down again.
pub struct Renderer {
    painter: ChunkPainter,
    queue: Arc<WorkQueue>,
    workers: usize,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Renderer {
    /// Constructor.  Uses one worker per available CPU.
    pub fn new(viewport: Arc<Viewport>, color: Arc<dyn ColorFunction>) -> Result<Renderer, String> {
        let workers = num_cpus::get();
        Renderer::with_workers(viewport, color, workers)
    }

    /// Constructor with an explicit worker count.  Allocating the
    /// frame buffer is the one fatal failure in the system; it
    /// propagates from here.
    pub fn with_workers(
        viewport: Arc<Viewport>,
        color: Arc<dyn ColorFunction>,
        workers: usize,
    ) -> Result<Renderer, String> {
        if workers == 0 {
            return Err("The renderer needs at least one worker.".to_string());
        }
        let frame = Arc::new(FrameBuffer::new(viewport.screen_size())?);
        let queue = Arc::new(WorkQueue::new(viewport.screen_size()));
        viewport.subscribe(queue.clone());
        Ok(Renderer {
            painter: ChunkPainter {
                chunk_size: queue.chunk_size(),
                viewport,
                color,
                frame,
            },
            queue,
            workers,
            handles: Mutex::new(Vec::new()),
        })
    }

    /// The live raster.  There are no snapshot semantics: the workers
    /// keep painting into it, and a caller samples it whenever and
    /// however often it likes.
    pub fn frame_buffer(&self) -> Arc<FrameBuffer> {
        self.painter.frame.clone()
    }

    /// The work queue, mostly interesting to tests and diagnostics.
    pub fn work_queue(&self) -> Arc<WorkQueue> {
        self.queue.clone()
    }

    /// Requeues the full chunk set, exactly as a view change does.
    pub fn restart(&self) {
        self.queue.restart();
    }

    /// Spawns the worker pool and returns immediately.  The workers
    /// run until `stop`; the first pass over the backlog begins at
    /// once.
    pub fn start_rendering(&self) {
        let mut handles = self.handles.lock().unwrap();
        for id in 0..self.workers {
            let painter = self.painter.clone();
            let queue = self.queue.clone();
            handles.push(thread::spawn(move || worker_loop(id, painter, queue)));
        }
    }

    /// Closes the queue and joins every worker.  Idle workers wake
    /// and exit immediately; a worker mid-chunk finishes that chunk
    /// first.
    pub fn stop(&self) {
        self.queue.close();
        let handles: Vec<JoinHandle<()>> = self.handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                error!("a render worker terminated with an unrecovered panic");
            }
        }
    }

    /// Renders one complete pass synchronously on scoped threads and
    /// returns when every chunk has been painted.  Meant for headless
    /// one-shot use (snapshots, benchmarks, tests); it shares the
    /// queue with the resident pool, so don't mix the two.
    pub fn render_blocking(&self) {
        self.queue.restart();
        crossbeam::scope(|spawner| {
            for _ in 0..self.workers {
                let painter = self.painter.clone();
                let queue = self.queue.clone();
                spawner.spawn(move |_| {
                    while let Some(chunk) = queue.poll() {
                        painter.render_chunk(chunk);
                    }
                });
            }
        })
        .unwrap();
    }
}
