//! Continuous-motion driver: a self-disarming tick thread that converts the
//! percentage motion vector into per-interval window movement.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use crate::config::PtzConfig;
use crate::models::geometry::CropRect;
use crate::models::motion::{clamp_component, MotionVector};

use super::ControllerInner;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MotionStep {
    pub dx: f64,
    pub dy: f64,
    pub level: f64,
}

/// One tick's worth of motion. Rates are fractions of the current window
/// size (pan/tilt) or of the current level (zoom), scaled by the vector's
/// percentage components.
pub(crate) fn motion_step(
    rect: CropRect,
    zoom: f64,
    vector: MotionVector,
    config: &PtzConfig,
) -> MotionStep {
    let rate_x = clamp_component(vector.x) / 100.0 * config.max_move_rate;
    let rate_y = clamp_component(vector.y) / 100.0 * config.max_move_rate;
    let rate_z = clamp_component(vector.z) / 100.0 * config.max_zoom_rate;

    MotionStep {
        dx: rect.width() as f64 * rate_x,
        dy: rect.height() as f64 * rate_y,
        level: zoom + zoom * rate_z,
    }
}

impl ControllerInner {
    /// Arms the tick thread unless it is already running. The thread holds
    /// only a weak reference, so dropping the last controller handle ends it.
    pub(crate) fn start_tick(self: &Arc<Self>) {
        if self.tick_running.swap(true, Ordering::AcqRel) {
            return;
        }

        let weak = Arc::downgrade(self);
        let interval = self.config.frame_interval();
        thread::Builder::new()
            .name("ptz-motion-tick".to_string())
            .spawn(move || {
                log::debug!("motion tick armed");
                loop {
                    thread::sleep(interval);
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };
                    if !inner.motion_tick() {
                        inner.tick_running.store(false, Ordering::Release);
                        log::debug!("motion tick disarmed");
                        break;
                    }
                }
            })
            .expect("failed to spawn ptz-motion-tick thread");
    }

    /// One pass of the continuous driver. Returns false once the vector is
    /// zero and the tick should disarm.
    fn motion_tick(&self) -> bool {
        // Never queue behind an executing zoom; drop the tick outright.
        if self.zoom_busy.load(Ordering::Acquire) {
            return true;
        }

        let (rect, zoom, vector) = {
            let state = self.state.lock().unwrap();
            (state.view_rect, state.zoom_level, state.motion)
        };
        if vector.is_zero() {
            return false;
        }

        let step = motion_step(rect, zoom, vector, &self.config);
        self.offset_zoom(step.dx, step.dy, step.level);
        true
    }
}
