//! Contains the Viewport, the "magnifying glass" through which the
//! fractal is seen.  It owns the rectangle of fractal space currently
//! on screen, the conversion ratios between screen pixels and fractal
//! units, the iteration cap and coloring coefficient, and a history
//! stack so that every zoom can be undone exactly.  Anything that
//! mutates the view fires a change notification, which the scheduler
//! uses to restart rendering.

use num::Complex;
use std::sync::{Arc, Mutex};

/// The smallest value the coloring coefficient may take.  The smooth
/// coloring divides by the coefficient, so zero must be unreachable.
pub const MIN_COLORING: f64 = 1e-3;

/// A zoom selection narrower or shorter than this many screen pixels
/// is treated as an accidental drag and discarded.
const MIN_SELECTION_PX: i32 = 5;

/// The width and height of the screen raster, in pixels.  Fixed for
/// the lifetime of the viewport.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScreenSize {
    /// Horizontal resolution in pixels.
    pub width: usize,
    /// Vertical resolution in pixels.
    pub height: usize,
}

/// A point on the screen.  Signed, because a zoom box dragged up or
/// to the left has negative extents until it is normalized.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScreenPoint {
    /// Horizontal pixel coordinate.
    pub x: i32,
    /// Vertical pixel coordinate.
    pub y: i32,
}

/// An axis-aligned rectangle in fractal space: the origin is the
/// upper-left corner as seen on screen.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FractalRect {
    /// Left edge in fractal units.
    pub x: f64,
    /// Top edge in fractal units.
    pub y: f64,
    /// Horizontal extent in fractal units.
    pub width: f64,
    /// Vertical extent in fractal units.
    pub height: f64,
}

/// Everything a zoom must remember in order to be undone: the view
/// rectangle, the coloring coefficient, and the iteration cap at the
/// moment the zoom was committed.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ViewSnapshot {
    /// The view rectangle before the zoom.
    pub view: FractalRect,
    /// The coloring coefficient before the zoom.
    pub coloring: f64,
    /// The iteration cap before the zoom.
    pub max_iterations: u32,
}

/// A coherent copy of the view state, taken once per chunk by a
/// rendering worker.  A restart that lands mid-chunk leaves the chunk
/// finishing with the parameters it started with; the stale pixels
/// are overwritten by the next pass.
#[derive(Copy, Clone, Debug)]
pub struct ViewParams {
    /// The fractal-space location of screen pixel (0, 0).
    pub origin: (f64, f64),
    /// Fractal units per screen pixel, per axis.
    pub conversion: (f64, f64),
    /// The iteration cap in effect when the copy was taken.
    pub max_iterations: u32,
    /// The coloring coefficient in effect when the copy was taken.
    pub coloring: f64,
}

impl ViewParams {
    /// The fractal-space point under the given screen pixel.
    pub fn fractal_at(&self, x: usize, y: usize) -> Complex<f64> {
        Complex::new(
            (x as f64) * self.conversion.0 + self.origin.0,
            (y as f64) * self.conversion.1 + self.origin.1,
        )
    }
}

/// Receives the change notification fired on every viewport mutation.
/// The work queue subscribes so that any change restarts rendering.
pub trait ViewListener: Send + Sync {
    /// Called synchronously after the mutation has been applied.
    fn view_changed(&self);
}

/// The in-progress zoom box, in raw (possibly negative) screen
/// extents.
#[derive(Copy, Clone, Debug)]
struct Selection {
    origin: ScreenPoint,
    width: i32,
    height: i32,
}

impl Selection {
    /// The absolute-size, min-corner form of the box.
    fn normalized(&self) -> (ScreenPoint, i32, i32) {
        let corner = ScreenPoint {
            x: self.origin.x.min(self.origin.x + self.width),
            y: self.origin.y.min(self.origin.y + self.height),
        };
        (corner, self.width.abs(), self.height.abs())
    }
}

/// The mutable half of the viewport.  Shared between the input thread
/// and the rendering workers, so it lives behind a mutex; workers
/// only ever take short-lived copies of it.
struct ViewState {
    view: FractalRect,
    conversion: (f64, f64),
    max_iterations: u32,
    coloring: f64,
    history: Vec<ViewSnapshot>,
    selection: Option<Selection>,
}

/// Maps the screen onto a rectangle of fractal space and tracks the
/// user-tunable rendering parameters.  All mutating operations fire
/// the registered change listener.
pub struct Viewport {
    screen: ScreenSize,
    state: Mutex<ViewState>,
    listener: Mutex<Option<Arc<dyn ViewListener>>>,
}

/// Fractal units per pixel for the given view and screen.
fn conversion_for(screen: ScreenSize, view: &FractalRect) -> (f64, f64) {
    (
        view.width / (screen.width as f64),
        view.height / (screen.height as f64),
    )
}

impl Viewport {
    /// Constructor.  The screen must have a nonzero area and the view
    /// rectangle a positive extent on both axes.  The coloring
    /// coefficient starts at 1.
    pub fn new(
        screen: ScreenSize,
        view: FractalRect,
        max_iterations: u32,
    ) -> Result<Viewport, String> {
        Viewport::with_coloring(screen, view, max_iterations, 1.0)
    }

    /// Constructor with an explicit starting coloring coefficient,
    /// which is floored at `MIN_COLORING` like every later
    /// adjustment.
    pub fn with_coloring(
        screen: ScreenSize,
        view: FractalRect,
        max_iterations: u32,
        coloring: f64,
    ) -> Result<Viewport, String> {
        if screen.width == 0 || screen.height == 0 {
            return Err("The screen must have a nonzero width and height.".to_string());
        }
        if view.width <= 0.0 || view.height <= 0.0 {
            return Err("The view rectangle must have a positive width and height.".to_string());
        }
        Ok(Viewport {
            screen,
            state: Mutex::new(ViewState {
                view,
                conversion: conversion_for(screen, &view),
                max_iterations,
                coloring: coloring.max(MIN_COLORING),
                history: Vec::new(),
                selection: None,
            }),
            listener: Mutex::new(None),
        })
    }

    /// The size of the screen.
    pub fn screen_size(&self) -> ScreenSize {
        self.screen
    }

    /// Registers the single change listener, replacing any previous
    /// one.  It will be called on every mutation from then on.
    pub fn subscribe(&self, listener: Arc<dyn ViewListener>) {
        *self.listener.lock().unwrap() = Some(listener);
    }

    /// Fires the change listener.  The state lock is never held here,
    /// so a listener is free to read the viewport.
    fn notify(&self) {
        let listener = self.listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener.view_changed();
        }
    }

    /// A coherent copy of the view parameters for a rendering pass.
    pub fn params(&self) -> ViewParams {
        let state = self.state.lock().unwrap();
        ViewParams {
            origin: (state.view.x, state.view.y),
            conversion: state.conversion,
            max_iterations: state.max_iterations,
            coloring: state.coloring,
        }
    }

    /// Converts the given screen pixel to its location in fractal
    /// space.  Pure; no side effects.
    pub fn screen_to_fractal(&self, p: ScreenPoint) -> Complex<f64> {
        let state = self.state.lock().unwrap();
        Complex::new(
            (p.x as f64) * state.conversion.0 + state.view.x,
            (p.y as f64) * state.conversion.1 + state.view.y,
        )
    }

    /// The rectangle of fractal space currently on screen.
    pub fn view(&self) -> FractalRect {
        self.state.lock().unwrap().view
    }

    /// The current coloring coefficient.
    pub fn coloring(&self) -> f64 {
        self.state.lock().unwrap().coloring
    }

    /// The current iteration cap.
    pub fn max_iterations(&self) -> u32 {
        self.state.lock().unwrap().max_iterations
    }

    /// How many zooms deep the history stack is.
    pub fn history_depth(&self) -> usize {
        self.state.lock().unwrap().history.len()
    }

    /// Starts a zoom selection at the given screen point.  Any
    /// earlier selection is abandoned.
    pub fn begin_selection(&self, p: ScreenPoint) {
        let mut state = self.state.lock().unwrap();
        state.selection = Some(Selection {
            origin: p,
            width: 0,
            height: 0,
        });
    }

    /// Resizes the selection as the pointer drags.  Only the
    /// horizontal motion counts: the height is derived from the width
    /// so the box always matches the screen's aspect ratio and the
    /// zoomed image is not distorted.  A no-op when no selection has
    /// been started.
    pub fn update_selection(&self, p: ScreenPoint) {
        let (screen_w, screen_h) = (self.screen.width as f64, self.screen.height as f64);
        let mut state = self.state.lock().unwrap();
        if let Some(ref mut selection) = state.selection {
            let width = p.x - selection.origin.x; // can be negative
            selection.width = width;
            selection.height = ((width as f64) * screen_h / screen_w) as i32;
        }
    }

    /// The normalized (min-corner, absolute-size) selection box, for
    /// an overlay painter to draw.  `None` when no selection is in
    /// progress.
    pub fn selection_bounds(&self) -> Option<(ScreenPoint, i32, i32)> {
        let state = self.state.lock().unwrap();
        state.selection.as_ref().map(Selection::normalized)
    }

    /// Finishes the zoom selection.  If the normalized box is at
    /// least five pixels on each side, the current view parameters
    /// are pushed onto the history stack and the view narrows to the
    /// boxed region; returns true and fires the change listener.  A
    /// smaller box was probably a user mistake, so it is discarded
    /// without touching the view or notifying anyone.
    pub fn commit_selection(&self) -> bool {
        let committed = {
            let mut state = self.state.lock().unwrap();
            match state.selection.take() {
                None => false,
                Some(selection) => {
                    let (corner, width, height) = selection.normalized();
                    if width >= MIN_SELECTION_PX && height >= MIN_SELECTION_PX {
                        let snapshot = ViewSnapshot {
                            view: state.view,
                            coloring: state.coloring,
                            max_iterations: state.max_iterations,
                        };
                        state.history.push(snapshot);

                        // The new origin and size are computed with the
                        // pre-commit conversion ratio.
                        let (cx, cy) = state.conversion;
                        state.view = FractalRect {
                            x: (corner.x as f64) * cx + state.view.x,
                            y: (corner.y as f64) * cy + state.view.y,
                            width: (width as f64) * cx,
                            height: (height as f64) * cy,
                        };
                        state.conversion = conversion_for(self.screen, &state.view);
                        true
                    } else {
                        false
                    }
                }
            }
        };
        if committed {
            self.notify();
        }
        committed
    }

    /// Undoes the most recent zoom, restoring the view rectangle,
    /// coloring coefficient, and iteration cap exactly as they were,
    /// and fires the change listener.  A no-op on an empty history.
    pub fn pop_history(&self) {
        let restored = {
            let mut state = self.state.lock().unwrap();
            match state.history.pop() {
                None => false,
                Some(snapshot) => {
                    state.view = snapshot.view;
                    state.coloring = snapshot.coloring;
                    state.max_iterations = snapshot.max_iterations;
                    state.conversion = conversion_for(self.screen, &state.view);
                    true
                }
            }
        };
        if restored {
            self.notify();
        }
    }

    /// Nudges the coloring coefficient by the given delta, floored at
    /// `MIN_COLORING`, and fires the change listener.
    pub fn adjust_coloring(&self, delta: f64) {
        {
            let mut state = self.state.lock().unwrap();
            state.coloring = (state.coloring + delta).max(MIN_COLORING);
        }
        self.notify();
    }

    /// Nudges the iteration cap by the given delta, floored at zero,
    /// and fires the change listener.
    pub fn adjust_iteration_cap(&self, delta: i64) {
        {
            let mut state = self.state.lock().unwrap();
            state.max_iterations = ((state.max_iterations as i64) + delta).max(0) as u32;
        }
        self.notify();
    }

    /// Translates the view by the given fractal-space offsets and
    /// fires the change listener.
    pub fn pan(&self, dx: f64, dy: f64) {
        {
            let mut state = self.state.lock().unwrap();
            state.view.x += dx;
            state.view.y += dy;
        }
        self.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener(AtomicUsize);

    impl CountingListener {
        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl ViewListener for CountingListener {
        fn view_changed(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn square_viewport() -> Viewport {
        // 100x100 screen over a 4x4 fractal rectangle: conversion is
        // exactly 0.04 on both axes.
        Viewport::new(
            ScreenSize {
                width: 100,
                height: 100,
            },
            FractalRect {
                x: -2.0,
                y: -2.0,
                width: 4.0,
                height: 4.0,
            },
            500,
        )
        .unwrap()
    }

    #[test]
    fn construction_fails_on_zero_screen() {
        let result = Viewport::new(
            ScreenSize {
                width: 0,
                height: 100,
            },
            FractalRect {
                x: 0.0,
                y: 0.0,
                width: 1.0,
                height: 1.0,
            },
            100,
        );
        assert!(result.is_err());
    }

    #[test]
    fn construction_fails_on_degenerate_view() {
        let result = Viewport::new(
            ScreenSize {
                width: 100,
                height: 100,
            },
            FractalRect {
                x: 0.0,
                y: 0.0,
                width: -1.0,
                height: 1.0,
            },
            100,
        );
        assert!(result.is_err());
    }

    #[test]
    fn screen_to_fractal_maps_corners_and_center() {
        let viewport = square_viewport();
        let origin = viewport.screen_to_fractal(ScreenPoint { x: 0, y: 0 });
        assert_eq!(origin, Complex::new(-2.0, -2.0));
        let center = viewport.screen_to_fractal(ScreenPoint { x: 50, y: 50 });
        assert_eq!(center, Complex::new(0.0, 0.0));
    }

    #[test]
    fn params_match_screen_to_fractal() {
        let viewport = square_viewport();
        let params = viewport.params();
        assert_eq!(
            params.fractal_at(25, 75),
            viewport.screen_to_fractal(ScreenPoint { x: 25, y: 75 })
        );
        assert_eq!(params.max_iterations, 500);
        assert_eq!(params.coloring, 1.0);
    }

    #[test]
    fn selection_forces_screen_aspect_ratio() {
        let viewport = Viewport::new(
            ScreenSize {
                width: 200,
                height: 100,
            },
            FractalRect {
                x: 0.0,
                y: 0.0,
                width: 2.0,
                height: 1.0,
            },
            100,
        )
        .unwrap();
        viewport.begin_selection(ScreenPoint { x: 10, y: 10 });
        viewport.update_selection(ScreenPoint { x: 50, y: 99 });
        let (_, width, height) = viewport.selection_bounds().unwrap();
        assert_eq!(width, 40);
        assert_eq!(height, 20); // follows the width, not the pointer
    }

    #[test]
    fn negative_drag_normalizes_to_min_corner() {
        let viewport = square_viewport();
        viewport.begin_selection(ScreenPoint { x: 60, y: 60 });
        viewport.update_selection(ScreenPoint { x: 20, y: 0 });
        let (corner, width, height) = viewport.selection_bounds().unwrap();
        assert_eq!(corner, ScreenPoint { x: 20, y: 20 });
        assert_eq!((width, height), (40, 40));
    }

    #[test]
    fn commit_zooms_with_precommit_conversion() {
        let viewport = square_viewport();
        viewport.begin_selection(ScreenPoint { x: 10, y: 10 });
        viewport.update_selection(ScreenPoint { x: 60, y: 10 });
        assert!(viewport.commit_selection());

        // Pre-commit conversion was 0.04/px: the 50x50 box at (10,10)
        // becomes a 2x2 view at (-1.6,-1.6).
        let view = viewport.view();
        assert_eq!(view.x, -1.6);
        assert_eq!(view.y, -1.6);
        assert_eq!(view.width, 2.0);
        assert_eq!(view.height, 2.0);

        // And the conversion has been recomputed for the new view.
        let params = viewport.params();
        assert_eq!(params.conversion, (0.02, 0.02));
    }

    #[test]
    fn tiny_selection_is_discarded_silently() {
        let viewport = square_viewport();
        let listener = Arc::new(CountingListener(AtomicUsize::new(0)));
        viewport.subscribe(listener.clone());

        let before = viewport.view();
        viewport.begin_selection(ScreenPoint { x: 10, y: 10 });
        viewport.update_selection(ScreenPoint { x: 14, y: 10 }); // 4px wide
        assert!(!viewport.commit_selection());

        assert_eq!(viewport.view(), before);
        assert_eq!(viewport.history_depth(), 0);
        assert_eq!(listener.count(), 0);
    }

    #[test]
    fn commit_without_selection_is_a_noop() {
        let viewport = square_viewport();
        assert!(!viewport.commit_selection());
    }

    #[test]
    fn zoom_history_round_trips_exactly() {
        let viewport = square_viewport();
        let original_view = viewport.view();
        let original_coloring = viewport.coloring();
        let original_iterations = viewport.max_iterations();

        for step in 0..3 {
            viewport.adjust_coloring(0.5);
            viewport.adjust_iteration_cap(50);
            viewport.begin_selection(ScreenPoint { x: 10, y: 10 });
            viewport.update_selection(ScreenPoint { x: 40 + step, y: 10 });
            assert!(viewport.commit_selection());
        }
        assert_eq!(viewport.history_depth(), 3);

        for _ in 0..3 {
            viewport.pop_history();
        }
        assert_eq!(viewport.history_depth(), 0);

        // popping restored the snapshots verbatim, including the
        // coloring and cap changes made between zooms
        viewport.pop_history(); // extra pop is a no-op
        assert_eq!(viewport.view(), original_view);
        assert_eq!(viewport.coloring(), original_coloring + 0.5);
        assert_eq!(viewport.max_iterations(), original_iterations + 50);
    }

    #[test]
    fn adjustments_never_go_below_their_floors() {
        let viewport = square_viewport();
        for _ in 0..10 {
            viewport.adjust_coloring(-5.0);
            viewport.adjust_iteration_cap(-400);
        }
        assert!(viewport.coloring() >= MIN_COLORING);
        assert!(viewport.coloring() > 0.0);
        assert_eq!(viewport.max_iterations(), 0);
    }

    #[test]
    fn pan_translates_the_view_origin() {
        let viewport = square_viewport();
        viewport.pan(0.25, -0.5);
        let view = viewport.view();
        assert_eq!((view.x, view.y), (-1.75, -2.5));
        assert_eq!((view.width, view.height), (4.0, 4.0));
    }

    #[test]
    fn mutations_fire_the_listener_once_each() {
        let viewport = square_viewport();
        let listener = Arc::new(CountingListener(AtomicUsize::new(0)));
        viewport.subscribe(listener.clone());

        viewport.pan(0.1, 0.1);
        viewport.adjust_coloring(0.5);
        viewport.adjust_iteration_cap(50);
        assert_eq!(listener.count(), 3);

        viewport.begin_selection(ScreenPoint { x: 0, y: 0 });
        viewport.update_selection(ScreenPoint { x: 50, y: 0 });
        assert_eq!(listener.count(), 3); // dragging alone never notifies
        viewport.commit_selection();
        assert_eq!(listener.count(), 4);

        viewport.pop_history();
        assert_eq!(listener.count(), 5);
        viewport.pop_history(); // empty history: no notification
        assert_eq!(listener.count(), 5);
    }
}
