use crate::models::geometry::CropRect;

/// Consumer of committed crop rectangles, typically the live capture
/// pipeline's crop-region setter.
///
/// Called synchronously on whichever thread performed the update, so
/// implementations must be cheap and non-blocking.
pub trait FrameSink: Send + Sync {
    fn apply_crop_region(&self, rect: CropRect);
}

/// Sink that discards every update; for sessions without a live pipeline.
pub struct NullFrameSink;

impl FrameSink for NullFrameSink {
    fn apply_crop_region(&self, _rect: CropRect) {}
}
