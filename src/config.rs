/// All tuning parameters for one pipeline invocation, resolved once up front
/// and passed by value. Nothing in the pipeline reads ambient process state;
/// concurrent invocations cannot leak parameters into each other.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Passed through to the external inference command only.
    pub seed: u64,
    /// Base garment width as a fraction of person width.
    pub cloth_scale: f32,
    /// Widens the valid scale range and permits upscaling the garment.
    pub allow_upscale: bool,
    /// Enables face-relative placement when a detector is available.
    pub face_anchor: bool,
    /// Garment width as a multiple of the detected face width.
    pub face_width_mult: f32,
    /// Vertical pixel offset below the face anchor point.
    pub face_offset_y: i32,
    /// Fractional anchor when face anchoring is off or unavailable.
    pub pos_x: f32,
    pub pos_y: f32,
    /// Fixed pixel nudge applied after anchor resolution.
    pub offset_x: i32,
    pub offset_y: i32,
    /// Enables foreground segmentation of the garment.
    pub remove_background: bool,
    /// Enables transparent-margin trimming (requires `remove_background`).
    pub trim_alpha: bool,
    /// Enables the secondary segmentation-based crop.
    pub auto_crop: bool,
    /// Permits the local fallback composite.
    pub placeholder_enabled: bool,
    /// Command template with `{person}` `{cloth}` `{output}` `{seed}`
    /// placeholders; unset means no external inference.
    pub external_command: Option<String>,
}

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_CLOTH_SCALE: f32 = 0.5;
pub const DEFAULT_FACE_WIDTH_MULT: f32 = 2.0;
pub const DEFAULT_FACE_OFFSET_Y: i32 = 20;
pub const DEFAULT_POS_X: f32 = 0.5;
pub const DEFAULT_POS_Y: f32 = 0.28;

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            cloth_scale: DEFAULT_CLOTH_SCALE,
            allow_upscale: false,
            face_anchor: false,
            face_width_mult: DEFAULT_FACE_WIDTH_MULT,
            face_offset_y: DEFAULT_FACE_OFFSET_Y,
            pos_x: DEFAULT_POS_X,
            pos_y: DEFAULT_POS_Y,
            offset_x: 0,
            offset_y: 0,
            remove_background: true,
            trim_alpha: true,
            auto_crop: false,
            placeholder_enabled: false,
            external_command: None,
        }
    }
}

impl PipelineConfig {
    /// Sanitized copy with every numeric field inside its documented range.
    ///
    /// Out-of-range or non-finite values reset to their defaults; an
    /// out-of-range scale in particular is rejected outright rather than
    /// clamped to the nearest edge.
    pub fn resolved(mut self) -> Self {
        let scale_max = if self.allow_upscale { 2.5 } else { 1.0 };
        if !self.cloth_scale.is_finite()
            || self.cloth_scale < 0.05
            || self.cloth_scale > scale_max
        {
            self.cloth_scale = DEFAULT_CLOTH_SCALE;
        }

        self.pos_x = sanitize_unit(self.pos_x, DEFAULT_POS_X);
        self.pos_y = sanitize_unit(self.pos_y, DEFAULT_POS_Y);

        if !self.face_width_mult.is_finite() {
            self.face_width_mult = DEFAULT_FACE_WIDTH_MULT;
        } else if self.face_width_mult < 0.5 {
            self.face_width_mult = 0.5;
        }

        if let Some(cmd) = &self.external_command
            && cmd.trim().is_empty()
        {
            self.external_command = None;
        }

        self
    }
}

fn sanitize_unit(v: f32, default: f32) -> f32 {
    if v.is_finite() { v.clamp(0.0, 1.0) } else { default }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.cloth_scale, 0.5);
        assert!(!cfg.allow_upscale);
        assert!(!cfg.face_anchor);
        assert_eq!(cfg.face_width_mult, 2.0);
        assert_eq!(cfg.face_offset_y, 20);
        assert_eq!((cfg.pos_x, cfg.pos_y), (0.5, 0.28));
        assert_eq!((cfg.offset_x, cfg.offset_y), (0, 0));
        assert!(cfg.remove_background);
        assert!(cfg.trim_alpha);
        assert!(!cfg.auto_crop);
        assert!(!cfg.placeholder_enabled);
        assert!(cfg.external_command.is_none());
    }

    #[test]
    fn oversized_scale_resets_to_default_without_upscale() {
        let cfg = PipelineConfig {
            cloth_scale: 1.5,
            ..Default::default()
        }
        .resolved();
        assert_eq!(cfg.cloth_scale, 0.5);
    }

    #[test]
    fn upscale_widens_the_valid_scale_range() {
        let cfg = PipelineConfig {
            cloth_scale: 1.5,
            allow_upscale: true,
            ..Default::default()
        }
        .resolved();
        assert_eq!(cfg.cloth_scale, 1.5);

        let cfg = PipelineConfig {
            cloth_scale: 3.0,
            allow_upscale: true,
            ..Default::default()
        }
        .resolved();
        assert_eq!(cfg.cloth_scale, 0.5);
    }

    #[test]
    fn tiny_scale_resets_to_default() {
        let cfg = PipelineConfig {
            cloth_scale: 0.01,
            ..Default::default()
        }
        .resolved();
        assert_eq!(cfg.cloth_scale, 0.5);
    }

    #[test]
    fn positions_clamp_to_unit_range() {
        let cfg = PipelineConfig {
            pos_x: -0.5,
            pos_y: 2.0,
            ..Default::default()
        }
        .resolved();
        assert_eq!((cfg.pos_x, cfg.pos_y), (0.0, 1.0));
    }

    #[test]
    fn non_finite_values_reset_to_defaults() {
        let cfg = PipelineConfig {
            cloth_scale: f32::NAN,
            pos_x: f32::INFINITY,
            face_width_mult: f32::NAN,
            ..Default::default()
        }
        .resolved();
        assert_eq!(cfg.cloth_scale, 0.5);
        assert_eq!(cfg.pos_x, 0.5);
        assert_eq!(cfg.face_width_mult, 2.0);
    }

    #[test]
    fn face_width_mult_floors_at_half() {
        let cfg = PipelineConfig {
            face_width_mult: 0.1,
            ..Default::default()
        }
        .resolved();
        assert_eq!(cfg.face_width_mult, 0.5);
    }

    #[test]
    fn blank_external_command_is_treated_as_unset() {
        let cfg = PipelineConfig {
            external_command: Some("   ".to_string()),
            ..Default::default()
        }
        .resolved();
        assert!(cfg.external_command.is_none());
    }

    #[test]
    fn json_roundtrip_with_partial_fields() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"cloth_scale": 0.7, "placeholder_enabled": true}"#).unwrap();
        assert_eq!(cfg.cloth_scale, 0.7);
        assert!(cfg.placeholder_enabled);
        assert_eq!(cfg.pos_y, 0.28);
    }
}
