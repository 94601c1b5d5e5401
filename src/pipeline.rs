//! Per-invocation orchestration: garment preprocessing, then dispatch to an
//! external inference backend or the local fallback composite.
//!
//! Preprocessing is strictly best-effort; every stage failure is absorbed and
//! the previous artifact kept. Only dispatch failures surface, per the
//! taxonomy in [`crate::error::DraperyError`].

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::composite::overlay;
use crate::config::PipelineConfig;
use crate::error::{DraperyError, DraperyResult};
use crate::face::{FaceDetector, largest_face};
use crate::infer::{CommandBackend, InferenceBackend, output_path_for};
use crate::placement::resolve_placement;
use crate::raster::RasterImage;
use crate::region::{AUTO_CROP_MARGIN, MIN_AREA_FRACTION, TRIM_PADDING};
use crate::segment::REMOVE_BG_MARGIN;
use crate::{region, segment};

/// Successful pipeline outcome: the artifact plus echoed input basenames.
#[derive(Clone, Debug, serde::Serialize)]
pub struct TryOnOutput {
    /// Path of the produced try-on image.
    pub path: PathBuf,
    /// Basename of the person input, for debugging.
    pub person: String,
    /// Basename of the garment input, for debugging.
    pub cloth: String,
}

/// One-shot try-on pipeline. Configuration is resolved at construction and
/// owned by value; nothing is read from ambient process state, so concurrent
/// invocations cannot observe each other's parameters.
pub struct TryOnPipeline<'a> {
    cfg: PipelineConfig,
    detector: Option<&'a dyn FaceDetector>,
    backend: Option<&'a dyn InferenceBackend>,
}

impl<'a> TryOnPipeline<'a> {
    pub fn new(cfg: PipelineConfig) -> Self {
        Self {
            cfg: cfg.resolved(),
            detector: None,
            backend: None,
        }
    }

    /// Face detector used when `face_anchor` is enabled. Without one the
    /// compositor anchors fractionally.
    pub fn with_face_detector(mut self, detector: &'a dyn FaceDetector) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Inference backend override; takes precedence over `external_command`.
    pub fn with_backend(mut self, backend: &'a dyn InferenceBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    /// Run the whole pipeline for one person/garment pair.
    ///
    /// Sequencing: preprocess the garment (each stage best-effort), then
    /// dispatch to external inference when configured, otherwise to the local
    /// fallback composite when permitted.
    #[tracing::instrument(skip_all, fields(person = %person_path.display()))]
    pub fn generate(
        &self,
        person_path: &Path,
        cloth_path: &Path,
        outputs_dir: &Path,
    ) -> DraperyResult<TryOnOutput> {
        std::fs::create_dir_all(outputs_dir)
            .with_context(|| format!("create outputs dir '{}'", outputs_dir.display()))?;
        let out_path = output_path_for(person_path, outputs_dir);

        let processed = self.preprocess_cloth(cloth_path);

        // The external backend consumes files; persist the processed garment
        // only when a stage actually changed it.
        let mut effective_cloth = cloth_path.to_path_buf();
        if let Some(img) = &processed {
            let proc_path = processed_cloth_path(cloth_path, outputs_dir);
            match img.save_png(&proc_path) {
                Ok(()) => effective_cloth = proc_path,
                Err(err) => {
                    tracing::warn!(%err, "could not persist processed garment, using original");
                }
            }
        }

        let command_backend = self.cfg.external_command.as_deref().map(CommandBackend::new);
        let backend: Option<&dyn InferenceBackend> = self
            .backend
            .or_else(|| command_backend.as_ref().map(|b| b as &dyn InferenceBackend));

        match backend {
            Some(backend) => {
                match backend.generate(person_path, &effective_cloth, &out_path, self.cfg.seed) {
                    Ok(()) if out_path.exists() => {}
                    Ok(()) => {
                        if !self.cfg.placeholder_enabled {
                            return Err(DraperyError::missing_output(
                                "inference command finished but wrote no output",
                            ));
                        }
                        tracing::warn!("inference wrote no output, using fallback composite");
                        self.fallback_composite(
                            person_path,
                            &effective_cloth,
                            processed.as_ref(),
                            &out_path,
                        )?;
                    }
                    Err(err) => {
                        if !self.cfg.placeholder_enabled {
                            return Err(err);
                        }
                        // a fallback failure on this branch is not absorbed;
                        // the verbatim person copy applies only when no
                        // external command was configured at all
                        tracing::warn!(%err, "external inference failed, using fallback composite");
                        self.fallback_composite(
                            person_path,
                            &effective_cloth,
                            processed.as_ref(),
                            &out_path,
                        )?;
                    }
                }
            }
            None => {
                if !self.cfg.placeholder_enabled {
                    return Err(DraperyError::configuration(
                        "no external command configured and the fallback composite is disabled",
                    ));
                }
                if let Err(err) = self.fallback_composite(
                    person_path,
                    &effective_cloth,
                    processed.as_ref(),
                    &out_path,
                ) {
                    tracing::warn!(%err, "fallback composite failed, copying person verbatim");
                    std::fs::copy(person_path, &out_path).with_context(|| {
                        format!("copy person image to '{}'", out_path.display())
                    })?;
                }
            }
        }

        Ok(TryOnOutput {
            path: out_path,
            person: basename(person_path),
            cloth: basename(cloth_path),
        })
    }

    /// Background removal, alpha trim, and auto-crop, in that order, each
    /// enabled by config and each keeping the previous artifact on failure.
    /// Returns `None` when no stage changed the garment.
    fn preprocess_cloth(&self, cloth_path: &Path) -> Option<RasterImage> {
        if !self.cfg.remove_background && !self.cfg.auto_crop {
            return None;
        }

        let mut cloth = match RasterImage::open(cloth_path) {
            Ok(img) => img,
            Err(err) => {
                tracing::warn!(%err, "could not decode garment, skipping preprocessing");
                return None;
            }
        };
        let mut changed = false;

        if self.cfg.remove_background {
            match segment::remove_background(&cloth, REMOVE_BG_MARGIN) {
                Ok(img) => {
                    cloth = img;
                    changed = true;
                }
                Err(err) => tracing::debug!(%err, "background removal skipped"),
            }
            // trimming needs the alpha channel removal produces; on an
            // opaque garment it rejects itself
            if self.cfg.trim_alpha {
                match region::trim_transparent_margins(&cloth, TRIM_PADDING) {
                    Ok(img) => {
                        cloth = img;
                        changed = true;
                    }
                    Err(err) => tracing::debug!(%err, "alpha trim skipped"),
                }
            }
        }

        if self.cfg.auto_crop {
            match region::auto_crop(&cloth, AUTO_CROP_MARGIN, MIN_AREA_FRACTION) {
                Ok(img) => {
                    cloth = img;
                    changed = true;
                }
                Err(err) => tracing::debug!(%err, "auto-crop skipped"),
            }
        }

        changed.then_some(cloth)
    }

    /// Deterministic local composite: place the garment on the person canvas
    /// and alpha-blend it.
    fn fallback_composite(
        &self,
        person_path: &Path,
        cloth_path: &Path,
        processed: Option<&RasterImage>,
        out_path: &Path,
    ) -> DraperyResult<()> {
        let mut person = RasterImage::open(person_path)?.to_rgba();
        let garment = match processed {
            Some(img) => img.to_rgba(),
            None => RasterImage::open(cloth_path)?.to_rgba(),
        };

        let face = match (self.cfg.face_anchor, self.detector) {
            (true, Some(detector)) => largest_face(&detector.detect(&person)),
            _ => None,
        };
        if self.cfg.face_anchor && face.is_none() {
            tracing::debug!("no face detected, anchoring fractionally");
        }

        let placement =
            resolve_placement(person.dimensions(), garment.dimensions(), face, &self.cfg);
        let garment = if garment.dimensions() != (placement.width, placement.height) {
            garment.resize(placement.width, placement.height)?
        } else {
            garment
        };

        overlay(&mut person, &garment, &placement)?;
        person.save_png(out_path)
    }
}

/// Sidecar name for the persisted processed garment.
fn processed_cloth_path(cloth_path: &Path, outputs_dir: &Path) -> PathBuf {
    let stem = cloth_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cloth".to_string());
    outputs_dir.join(format!("{stem}_proc.png"))
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
