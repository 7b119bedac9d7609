use crate::error::{Result, ViewError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleProfile {
    /// Orbit view on screen, abstract display units.
    Display,
    /// AR session, metric real-world units.
    Immersive,
}

impl ScaleProfile {
    pub fn height_factor(self) -> f32 {
        match self {
            ScaleProfile::Display => 0.01,
            ScaleProfile::Immersive => 0.001,
        }
    }

    pub fn radius_factor(self) -> f32 {
        match self {
            ScaleProfile::Display => 0.01,
            ScaleProfile::Immersive => 0.001,
        }
    }

    pub fn head_factor(self) -> f32 {
        match self {
            ScaleProfile::Display => 1.0,
            ScaleProfile::Immersive => 0.25,
        }
    }

    pub fn default_head_height(self) -> f32 {
        match self {
            ScaleProfile::Display => 0.2,
            ScaleProfile::Immersive => 0.04,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub height_mm: f32,
    pub radius_mm: f32,
    pub head_height_mm: f32,
}

impl Measurement {
    pub fn new(height_mm: f32, radius_mm: f32, head_height_mm: f32) -> Self {
        Self {
            height_mm,
            radius_mm,
            head_height_mm,
        }
    }

    pub fn for_profile(height_mm: f32, radius_mm: f32, profile: ScaleProfile) -> Self {
        Self::new(height_mm, radius_mm, profile.default_head_height())
    }

    /// Missing scan values count as zero and will be rejected by `validate`.
    pub fn from_nullable(height_mm: Option<f64>, width_mm: Option<f64>, profile: ScaleProfile) -> Self {
        Self::for_profile(
            height_mm.unwrap_or(0.0) as f32,
            width_mm.unwrap_or(0.0) as f32,
            profile,
        )
    }

    pub fn validate(&self) -> Result<()> {
        check_positive("height", self.height_mm)?;
        check_positive("radius", self.radius_mm)?;
        check_positive("head height", self.head_height_mm)
    }

    /// The width label shows the radius, not the diameter.
    pub fn width_label_mm(&self) -> f32 {
        self.radius_mm
    }
}

fn check_positive(name: &str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ViewError::InvalidMeasurement(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}
