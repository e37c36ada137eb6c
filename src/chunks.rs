//! The screen is carved once, at construction, into a grid of
//! fixed-size square chunks: the unit of scheduling and rendering.
//! The `WorkQueue` hands chunks out to workers one at a time and can
//! be atomically refilled from its backlog whenever the view changes,
//! which is the only way previously rendered chunks ever come back.

use itertools::iproduct;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use viewport::{ScreenSize, ViewListener};

/// The default edge length of a chunk, in pixels.  24 seems to work
/// well; 32 is another option.
pub const CHUNK_SIZE: usize = 24;

/// The upper-left corner of one chunk of the screen.  Chunks in the
/// last row and column may hang past the screen edge; painting clips.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Chunk {
    /// Leftmost pixel column of the chunk.
    pub x: usize,
    /// Topmost pixel row of the chunk.
    pub y: usize,
}

struct PendingState {
    pending: VecDeque<Chunk>,
    closed: bool,
}

/// The thread-safe work queue feeding the rendering workers.
///
/// `pending` holds the chunks still to be painted this pass;
/// `backlog` is the immutable full chunk set used to refill it.  A
/// restart atomically replaces the pending queue with a fresh copy of
/// the backlog, so no poller ever observes a half-cleared or
/// half-refilled queue, and no chunk is ever queued twice at once.
pub struct WorkQueue {
    chunk_size: usize,
    backlog: Vec<Chunk>,
    state: Mutex<PendingState>,
    available: Condvar,
}

impl WorkQueue {
    /// Builds the chunk grid for the given screen using the default
    /// chunk size and queues the whole backlog as the first pass.
    pub fn new(screen: ScreenSize) -> WorkQueue {
        WorkQueue::build(screen, CHUNK_SIZE)
    }

    /// As `new`, with an explicit chunk size.  Sizes below three
    /// pixels leave a chunk with no interior and are rejected.
    pub fn with_chunk_size(screen: ScreenSize, chunk_size: usize) -> Result<WorkQueue, String> {
        if chunk_size < 3 {
            return Err("The chunk size must be at least 3 pixels.".to_string());
        }
        Ok(WorkQueue::build(screen, chunk_size))
    }

    fn build(screen: ScreenSize, chunk_size: usize) -> WorkQueue {
        // One extra row and column so the grid always covers the
        // screen even when the size does not divide evenly.
        let columns = screen.width / chunk_size + 1;
        let rows = screen.height / chunk_size + 1;
        let backlog: Vec<Chunk> = iproduct!(0..columns, 0..rows)
            .map(|(column, row)| Chunk {
                x: column * chunk_size,
                y: row * chunk_size,
            })
            .collect();
        let pending = backlog.iter().cloned().collect();
        WorkQueue {
            chunk_size,
            backlog,
            state: Mutex::new(PendingState {
                pending,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// The edge length of every chunk in this queue.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// The full, immutable chunk set.
    pub fn backlog(&self) -> &[Chunk] {
        &self.backlog
    }

    /// How many chunks are currently waiting to be rendered.  An
    /// empty queue is the normal quiescent state, not an error.
    pub fn pending_len(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Removes and returns one chunk, or `None` when the pass is
    /// complete.  Never blocks.
    pub fn poll(&self) -> Option<Chunk> {
        self.state.lock().unwrap().pending.pop_front()
    }

    /// As `poll`, but parks the caller until work appears, the queue
    /// is closed, or the timeout elapses.  A restart wakes all
    /// parked callers immediately, so an idle worker picks up a view
    /// change without sleeping out its full interval.
    pub fn wait_poll(&self, timeout: Duration) -> Option<Chunk> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.closed {
                return None;
            }
            if let Some(chunk) = state.pending.pop_front() {
                return Some(chunk);
            }
            let (reacquired, wait) = self.available.wait_timeout(state, timeout).unwrap();
            state = reacquired;
            if wait.timed_out() {
                if state.closed {
                    return None;
                }
                return state.pending.pop_front();
            }
        }
    }

    /// Atomically replaces the pending queue with a fresh copy of the
    /// backlog and wakes every parked worker.  Concurrent restarts
    /// are idempotent: whatever the interleaving, the queue ends up
    /// holding exactly the backlog.  Chunks already handed out are
    /// not revoked; those renders finish and are overwritten by the
    /// new pass.
    pub fn restart(&self) {
        let mut state = self.state.lock().unwrap();
        state.pending.clear();
        state.pending.extend(self.backlog.iter().cloned());
        self.available.notify_all();
    }

    /// Shuts the queue down: every parked or future `wait_poll`
    /// returns `None` immediately, letting workers exit their loops.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        self.available.notify_all();
    }
}

impl ViewListener for WorkQueue {
    /// Any change to the view restarts rendering from the beginning.
    fn view_changed(&self) {
        self.restart();
    }
}
