//! Smooth stepped transitions: one eased, wall-clock-paced interpolation
//! per step-mode command, run on a fire-and-forget thread.

use std::f64::consts::FRAC_PI_2;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::models::geometry::CropRect;

use super::ControllerInner;

/// Ease-out over `steps` frames: fast start, deceleration into the target.
pub(crate) fn ease_out(step: u32, steps: u32) -> f64 {
    (step as f64 / steps.max(1) as f64 * FRAC_PI_2).sin()
}

/// Sleeps whatever remains of the frame interval after the work already
/// done, so variable per-frame cost still yields the target total duration.
fn pace(interval: Duration, begun: Instant) {
    let elapsed = begun.elapsed();
    if elapsed < interval {
        thread::sleep(interval - elapsed);
    }
}

impl ControllerInner {
    pub(crate) fn spawn_translation(self: &Arc<Self>, target: CropRect) {
        let inner = Arc::clone(self);
        thread::Builder::new()
            .name("ptz-step-move".to_string())
            .spawn(move || inner.run_translation(target))
            .expect("failed to spawn ptz-step-move thread");
    }

    pub(crate) fn spawn_zoom_step(self: &Arc<Self>, target_level: f64) {
        let inner = Arc::clone(self);
        thread::Builder::new()
            .name("ptz-step-zoom".to_string())
            .spawn(move || inner.run_zoom_step(target_level))
            .expect("failed to spawn ptz-step-zoom thread");
    }

    fn run_translation(&self, target: CropRect) {
        let _motion = self.motion_lock.lock().unwrap();
        let epoch = self.motion_epoch.load(Ordering::Acquire);
        let frames = self.config.transition_frames.max(1);
        let interval = self.config.frame_interval();
        let start = self.state.lock().unwrap().view_rect;
        log::debug!("step translation to ({}, {})", target.left, target.top);

        for step in 0..=frames {
            if self.motion_epoch.load(Ordering::Acquire) != epoch {
                log::debug!("step translation cancelled");
                return;
            }
            let begun = Instant::now();
            // Endpoints are pinned exactly so easing rounding cannot drift
            // the landing position.
            let (left, top) = if step == 0 {
                (start.left, start.top)
            } else if step == frames {
                (target.left, target.top)
            } else {
                let t = ease_out(step, frames);
                (
                    start.left + ((target.left - start.left) as f64 * t).round() as i32,
                    start.top + ((target.top - start.top) as f64 * t).round() as i32,
                )
            };
            let rect = CropRect::from_origin_size(left, top, target.width(), target.height());
            self.apply_crop(rect, true);
            pace(interval, begun);
        }
    }

    fn run_zoom_step(&self, target: f64) {
        let _motion = self.motion_lock.lock().unwrap();
        let epoch = self.motion_epoch.load(Ordering::Acquire);
        let frames = self.config.transition_frames.max(1);
        let interval = self.config.frame_interval();
        let start = self.state.lock().unwrap().zoom_level;
        log::debug!("step zoom from {start:.3} to {target:.3}");

        for step in 0..=frames {
            if self.motion_epoch.load(Ordering::Acquire) != epoch {
                log::debug!("step zoom cancelled");
                return;
            }
            let begun = Instant::now();
            let level = if step == 0 {
                start
            } else if step == frames {
                target
            } else {
                start + (target - start) * ease_out(step, frames)
            };
            self.zoom_to_level(level);
            pace(interval, begun);
        }
    }
}
