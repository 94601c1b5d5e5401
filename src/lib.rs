//! Drapery is a garment try-on preprocessing and placement pipeline.
//!
//! The core is deterministic image work: foreground segmentation of the
//! garment, bounding-box trimming and cropping, and geometry-aware placement
//! with alpha compositing. Actual garment-transfer inference is an opaque
//! external collaborator invoked through [`InferenceBackend`]; when it is
//! absent or fails, the pipeline can degrade to the local composite.
//!
//! - Build a [`PipelineConfig`] (sanitized once, passed by value)
//! - Construct a [`TryOnPipeline`], optionally injecting a [`FaceDetector`]
//!   or an [`InferenceBackend`]
//! - Call [`TryOnPipeline::generate`] with the person and garment files
#![forbid(unsafe_code)]

pub mod composite;
pub mod config;
pub mod error;
pub mod face;
pub mod infer;
pub mod pipeline;
pub mod placement;
pub mod raster;
pub mod region;
pub mod segment;

pub use composite::overlay;
pub use config::PipelineConfig;
pub use error::{DraperyError, DraperyResult, StageError};
pub use face::{FaceBox, FaceDetector};
pub use infer::{CommandBackend, InferenceBackend, output_path_for};
pub use pipeline::{TryOnOutput, TryOnPipeline};
pub use placement::{PlacementResult, resolve_placement};
pub use raster::{AlphaMatte, Channels, RasterImage, Rectangle};
pub use region::{auto_crop, trim_transparent_margins};
pub use segment::{remove_background, segment_mask};
