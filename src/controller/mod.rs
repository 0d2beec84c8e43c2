//! Digital PTZ controller: a moving crop window over the full sensor frame.
//!
//! Every mutation funnels through one canonical setter that corrects the
//! aspect ratio, stops motion at frame boundaries, restrains the window to
//! the frame, and pushes the committed rect to the frame sink. Continuous
//! motion is driven by a tick thread, stepped motion by eased transition
//! threads; the two coordinate through an advisory zoom flag and a blocking
//! motion mutex.

mod tick;
mod transition;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::PtzConfig;
use crate::error::PtzError;
use crate::models::geometry::{CropRect, Resolution};
use crate::models::motion::{MotionType, MotionVector};
use crate::sink::FrameSink;

/// Scales the aspect-ratio tolerance with zoom level so deeper crops accept
/// proportionally more integer-rounding skew.
const ASPECT_TOLERANCE_FACTOR: f64 = 0.0002;

type ZoomChangedHandler = Box<dyn Fn(f64) + Send + Sync>;

struct PtzState {
    resolution: Resolution,
    view_rect: CropRect,
    zoom_level: f64,
    motion: MotionVector,
    motion_type: MotionType,
    pan_speed: i32,
    tilt_speed: i32,
}

pub(crate) struct ControllerInner {
    config: PtzConfig,
    sink: Arc<dyn FrameSink>,
    state: Mutex<PtzState>,
    /// Advisory zoom lock: held while the canonical setter runs. Contenders
    /// bail instead of waiting.
    zoom_busy: AtomicBool,
    tick_running: AtomicBool,
    /// Held for the whole of one smooth transition loop; callers block.
    motion_lock: Mutex<()>,
    /// Bumped by `stop_ptz`; in-flight transitions end once it moves.
    motion_epoch: AtomicU64,
    zoom_changed: Mutex<Option<ZoomChangedHandler>>,
}

/// Releases the advisory zoom flag when the canonical setter finishes.
struct ZoomGuard<'a>(&'a AtomicBool);

impl<'a> ZoomGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ZoomGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn implied_zoom(resolution: Resolution, rect: CropRect) -> f64 {
    let horizontal = resolution.width as f64 / rect.width().max(1) as f64;
    let vertical = resolution.height as f64 / rect.height().max(1) as f64;
    (horizontal + vertical) / 2.0
}

impl ControllerInner {
    /// Canonical crop setter. Returns false when the update was dropped
    /// because another zoom held the advisory lock.
    pub(crate) fn apply_crop(&self, rect: CropRect, recalc_zoom: bool) -> bool {
        let Some(_zoom) = ZoomGuard::try_acquire(&self.zoom_busy) else {
            log::trace!("crop update dropped, zoom already executing");
            return false;
        };

        let mut notify: Option<f64> = None;
        let committed;
        {
            let mut state = self.state.lock().unwrap();
            let frame = state.resolution.frame_bounds();
            let frame_aspect = state.resolution.aspect_ratio();
            let mut rect = rect;

            let tolerance = ASPECT_TOLERANCE_FACTOR * state.zoom_level * frame_aspect;
            if (rect.aspect_ratio() - frame_aspect).abs() > tolerance {
                let height = ((rect.width() as f64 / frame_aspect).round() as i32).max(1);
                let top = (rect.center_y() - height as f64 / 2.0).round() as i32;
                rect = CropRect {
                    left: rect.left,
                    top,
                    right: rect.right,
                    bottom: top + height,
                };
            }

            // Continuous motion self-terminates at the frame edges and at
            // the zoom bounds.
            if rect.left <= frame.left || rect.right >= frame.right {
                state.motion.x = 0.0;
            }
            if rect.top <= frame.top || rect.bottom >= frame.bottom {
                state.motion.y = 0.0;
            }
            let implied = implied_zoom(state.resolution, rect);
            if implied < self.config.min_zoom || implied > self.config.max_zoom {
                state.motion.z = 0.0;
            }

            let rect = rect.restrained_to(frame);
            state.view_rect = rect;
            committed = rect;

            if recalc_zoom {
                let level = implied_zoom(state.resolution, rect)
                    .clamp(self.config.min_zoom, self.config.max_zoom);
                if (level - state.zoom_level).abs() > f64::EPSILON {
                    state.zoom_level = level;
                    notify = Some(level);
                }
            }
        }

        self.sink.apply_crop_region(committed);
        if let Some(level) = notify {
            if let Some(handler) = self.zoom_changed.lock().unwrap().as_ref() {
                handler(level);
            }
        }
        true
    }

    /// Absolute zoom entry point. Bails while another zoom executes;
    /// out-of-range levels stop continuous zoom and are clamped.
    pub(crate) fn zoom_to_level(&self, level: f64) {
        if self.zoom_busy.load(Ordering::Acquire) {
            log::trace!("zoom request dropped, zoom already executing");
            return;
        }
        self.offset_zoom(0.0, 0.0, level);
    }

    /// Combined pan+zoom update: offsets the window, then resizes it around
    /// its new center to match `level`.
    pub(crate) fn offset_zoom(&self, dx: f64, dy: f64, level: f64) {
        if !level.is_finite() {
            log::warn!("ignoring non-finite zoom level");
            return;
        }
        let dx = if dx.is_finite() { dx } else { 0.0 };
        let dy = if dy.is_finite() { dy } else { 0.0 };

        let (rect, zoom, resolution) = {
            let state = self.state.lock().unwrap();
            (state.view_rect, state.zoom_level, state.resolution)
        };

        let mut level = level;
        if level < self.config.min_zoom || level > self.config.max_zoom {
            self.stop_zoom();
            level = level.clamp(self.config.min_zoom, self.config.max_zoom);
        }

        let moved = rect.with_offset(dx.round() as i32, dy.round() as i32);
        let inset_x = ((moved.width() as f64 - resolution.width as f64 / level) / 2.0).round();
        let inset_y = ((moved.height() as f64 - resolution.height as f64 / level) / 2.0).round();
        let target = moved.inset(inset_x as i32, inset_y as i32);

        let recalc = (level - zoom).abs() > f64::EPSILON;
        self.apply_crop(target, recalc);
    }

    pub(crate) fn stop_zoom(&self) {
        self.state.lock().unwrap().motion.z = 0.0;
    }
}

/// Cloneable handle to one PTZ session. Clones share state; the tick thread
/// exits once every handle is dropped.
#[derive(Clone)]
pub struct PtzController {
    inner: Arc<ControllerInner>,
}

impl PtzController {
    pub fn new(sink: Arc<dyn FrameSink>, resolution: Resolution) -> Result<Self, PtzError> {
        Self::with_config(sink, resolution, PtzConfig::default())
    }

    pub fn with_config(
        sink: Arc<dyn FrameSink>,
        resolution: Resolution,
        config: PtzConfig,
    ) -> Result<Self, PtzError> {
        config.validate()?;
        if resolution.width < 2 || resolution.height < 2 {
            return Err(PtzError::InvalidResolution {
                width: resolution.width,
                height: resolution.height,
            });
        }

        let view_rect = resolution.frame_bounds();
        let min_zoom = config.min_zoom;
        let inner = Arc::new(ControllerInner {
            config,
            sink,
            state: Mutex::new(PtzState {
                resolution,
                view_rect,
                zoom_level: min_zoom,
                motion: MotionVector::default(),
                motion_type: MotionType::default(),
                pan_speed: 100,
                tilt_speed: 100,
            }),
            zoom_busy: AtomicBool::new(false),
            tick_running: AtomicBool::new(false),
            motion_lock: Mutex::new(()),
            motion_epoch: AtomicU64::new(0),
            zoom_changed: Mutex::new(None),
        });
        inner.sink.apply_crop_region(view_rect);
        Ok(Self { inner })
    }

    // ─── Pan / tilt ──────────────────────────────────────────────────────

    pub fn pan_left(&self) {
        self.pan(-1);
    }

    pub fn pan_right(&self) {
        self.pan(1);
    }

    pub fn tilt_up(&self) {
        self.tilt(-1);
    }

    pub fn tilt_down(&self) {
        self.tilt(1);
    }

    pub fn pan_left_with_speed(&self, speed: i32) {
        self.inner.state.lock().unwrap().pan_speed = speed.clamp(0, 100);
        self.pan_left();
    }

    pub fn pan_right_with_speed(&self, speed: i32) {
        self.inner.state.lock().unwrap().pan_speed = speed.clamp(0, 100);
        self.pan_right();
    }

    pub fn tilt_up_with_speed(&self, speed: i32) {
        self.inner.state.lock().unwrap().tilt_speed = speed.clamp(0, 100);
        self.tilt_up();
    }

    pub fn tilt_down_with_speed(&self, speed: i32) {
        self.inner.state.lock().unwrap().tilt_speed = speed.clamp(0, 100);
        self.tilt_down();
    }

    fn pan(&self, direction: i32) {
        let mut state = self.inner.state.lock().unwrap();
        match state.motion_type {
            MotionType::Step => {
                let dx = (self.inner.config.move_step * state.view_rect.width() as f64).round()
                    as i32
                    * direction;
                let target = state.view_rect.with_offset(dx, 0);
                drop(state);
                self.inner.spawn_translation(target);
            }
            MotionType::Continuous => {
                state.motion.x = (direction * state.pan_speed) as f64;
                drop(state);
                self.inner.start_tick();
            }
        }
    }

    fn tilt(&self, direction: i32) {
        let mut state = self.inner.state.lock().unwrap();
        match state.motion_type {
            MotionType::Step => {
                let dy = (self.inner.config.move_step * state.view_rect.height() as f64).round()
                    as i32
                    * direction;
                let target = state.view_rect.with_offset(0, dy);
                drop(state);
                self.inner.spawn_translation(target);
            }
            MotionType::Continuous => {
                state.motion.y = (direction * state.tilt_speed) as f64;
                drop(state);
                self.inner.start_tick();
            }
        }
    }

    // ─── Zoom ────────────────────────────────────────────────────────────

    pub fn zoom_in(&self) {
        self.zoom_axis(1);
    }

    pub fn zoom_out(&self) {
        self.zoom_axis(-1);
    }

    fn zoom_axis(&self, direction: i32) {
        let mut state = self.inner.state.lock().unwrap();
        match state.motion_type {
            MotionType::Step => {
                drop(state);
                self.step_zoom(direction);
            }
            MotionType::Continuous => {
                state.motion.z = (direction * 100) as f64;
                drop(state);
                self.inner.start_tick();
            }
        }
    }

    /// One smooth zoom of `zoom_step`, regardless of the motion type.
    pub fn step_zoom_in(&self) {
        self.step_zoom(1);
    }

    pub fn step_zoom_out(&self) {
        self.step_zoom(-1);
    }

    fn step_zoom(&self, direction: i32) {
        let zoom = self.inner.state.lock().unwrap().zoom_level;
        let config = &self.inner.config;
        if direction > 0 && zoom >= config.max_zoom {
            return;
        }
        if direction < 0 && zoom <= config.min_zoom {
            return;
        }
        let target = (zoom + config.zoom_step * direction as f64)
            .clamp(config.min_zoom, config.max_zoom);
        self.inner.spawn_zoom_step(target);
    }

    /// Immediate zoom of exactly one level, regardless of the motion type.
    pub fn jump_zoom_in(&self) {
        self.jump_zoom(1);
    }

    pub fn jump_zoom_out(&self) {
        self.jump_zoom(-1);
    }

    fn jump_zoom(&self, direction: i32) {
        let zoom = self.inner.state.lock().unwrap().zoom_level;
        let config = &self.inner.config;
        if direction > 0 && zoom >= config.max_zoom {
            return;
        }
        if direction < 0 && zoom <= config.min_zoom {
            return;
        }
        self.inner
            .zoom_to_level((zoom + direction as f64).clamp(config.min_zoom, config.max_zoom));
    }

    /// Sets the absolute zoom level, keeping the current window center.
    pub fn zoom_to_level(&self, level: f64) {
        self.inner.zoom_to_level(level);
    }

    /// Offsets the crop window and sets the zoom level in one update.
    pub fn pan_zoom(&self, dx: f64, dy: f64, level: f64) {
        self.inner.offset_zoom(dx, dy, level);
    }

    /// Applies an explicit crop window through the canonical setter.
    pub fn zoom_to_rect(&self, rect: CropRect) {
        self.inner.apply_crop(rect, true);
    }

    // ─── Velocity interface ──────────────────────────────────────────────

    /// Joystick-style velocity command. Ignored in step mode; an all-zero
    /// vector stops all motion; a zero zoom velocity keeps the previous one.
    pub fn move_ptz(&self, pan: f64, tilt: f64, zoom: f64) {
        let vector = MotionVector::new(pan, tilt, zoom).clamped();
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.motion_type == MotionType::Step {
                return;
            }
            if vector.is_zero() {
                drop(state);
                self.stop_ptz();
                return;
            }
            state.pan_speed = vector.x.abs().round() as i32;
            state.tilt_speed = vector.y.abs().round() as i32;
            state.motion.x = vector.x;
            state.motion.y = vector.y;
            if vector.z != 0.0 {
                state.motion.z = vector.z;
            }
        }
        self.inner.start_tick();
    }

    /// Zeroes the motion vector and cancels in-flight smooth transitions.
    /// The tick thread disarms itself on its next pass.
    pub fn stop_ptz(&self) {
        self.inner.state.lock().unwrap().motion = MotionVector::default();
        self.inner.motion_epoch.fetch_add(1, Ordering::AcqRel);
        log::debug!("ptz motion stopped");
    }

    /// Stops only zoom motion; pan/tilt continue if active.
    pub fn stop_zoom(&self) {
        self.inner.stop_zoom();
    }

    pub fn update_pan_speed(&self, speed: i32) {
        let speed = speed.clamp(0, 100);
        let mut state = self.inner.state.lock().unwrap();
        state.pan_speed = speed;
        // A zero component carries no direction; the stored speed applies
        // from the next pan command.
        if state.motion.x != 0.0 {
            state.motion.x = state.motion.x.signum() * speed as f64;
        }
    }

    pub fn update_tilt_speed(&self, speed: i32) {
        let speed = speed.clamp(0, 100);
        let mut state = self.inner.state.lock().unwrap();
        state.tilt_speed = speed;
        if state.motion.y != 0.0 {
            state.motion.y = state.motion.y.signum() * speed as f64;
        }
    }

    // ─── Session / query surface ─────────────────────────────────────────

    /// Swaps the full-frame resolution and re-restrains the current window
    /// under the new bounds.
    pub fn update_preview_resolution(&self, resolution: Resolution) -> Result<(), PtzError> {
        if resolution.width < 2 || resolution.height < 2 {
            return Err(PtzError::InvalidResolution {
                width: resolution.width,
                height: resolution.height,
            });
        }
        let rect = {
            let mut state = self.inner.state.lock().unwrap();
            state.resolution = resolution;
            state.view_rect
        };
        self.inner.apply_crop(rect, true);
        Ok(())
    }

    pub fn view_rect(&self) -> CropRect {
        self.inner.state.lock().unwrap().view_rect
    }

    pub fn zoom_level(&self) -> f64 {
        self.inner.state.lock().unwrap().zoom_level
    }

    pub fn resolution(&self) -> Resolution {
        self.inner.state.lock().unwrap().resolution
    }

    pub fn motion_type(&self) -> MotionType {
        self.inner.state.lock().unwrap().motion_type
    }

    pub fn set_motion_type(&self, motion_type: MotionType) {
        self.inner.state.lock().unwrap().motion_type = motion_type;
    }

    pub fn pan_speed(&self) -> i32 {
        self.inner.state.lock().unwrap().pan_speed
    }

    pub fn tilt_speed(&self) -> i32 {
        self.inner.state.lock().unwrap().tilt_speed
    }

    /// Registers the zoom-level observer. It fires only when the level
    /// actually changes, on the thread that performed the update; zoom
    /// commands issued from inside the handler are dropped.
    pub fn on_zoom_level_changed<F>(&self, handler: F)
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        *self.inner.zoom_changed.lock().unwrap() = Some(Box::new(handler));
    }
}
