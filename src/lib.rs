pub mod config;
pub mod controller;
pub mod error;
pub mod models;
pub mod sink;

pub use config::PtzConfig;
pub use controller::PtzController;
pub use error::PtzError;
pub use models::geometry::{CropRect, Resolution};
pub use models::motion::{MotionType, MotionVector};
pub use sink::{FrameSink, NullFrameSink};
