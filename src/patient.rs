//! Patient-record shapes served by the records backend, plus the small
//! formatting and hand-off helpers the viewer pages use.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewError};
use crate::geometry::MeshReference;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientSummary {
    pub id: String,
    pub name: String,
    pub age: u32,
    #[serde(default)]
    pub bone_density_gram_per_centimeter_sq: Option<f64>,
    #[serde(default)]
    pub height_millimeter: Option<f64>,
    #[serde(default)]
    pub width_millimeter: Option<f64>,
    #[serde(default)]
    pub thickness_millimeter: Option<f64>,
    #[serde(default)]
    pub area_millimeter_sq: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoneType {
    #[default]
    Cancellous,
    Cortical,
    NerveCanal,
}

impl BoneType {
    pub const ALL: [BoneType; 3] = [BoneType::Cancellous, BoneType::Cortical, BoneType::NerveCanal];

    pub fn label(self) -> &'static str {
        match self {
            BoneType::Cancellous => "Cancellous",
            BoneType::Cortical => "Cortical",
            BoneType::NerveCanal => "Nerve canal",
        }
    }
}

impl fmt::Display for BoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One optional locator per bone type. Used for both mesh and preview URLs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUrls {
    #[serde(default)]
    pub cancellous: Option<String>,
    #[serde(default)]
    pub cortical: Option<String>,
    #[serde(default)]
    pub nerve_canal: Option<String>,
}

impl ModelUrls {
    pub fn get(&self, bone: BoneType) -> Option<&str> {
        match bone {
            BoneType::Cancellous => self.cancellous.as_deref(),
            BoneType::Cortical => self.cortical.as_deref(),
            BoneType::NerveCanal => self.nerve_canal.as_deref(),
        }
    }

    /// Empty strings count as absent.
    pub fn reference(&self, bone: BoneType) -> Option<MeshReference> {
        self.get(bone)
            .filter(|url| !url.trim().is_empty())
            .map(MeshReference::new)
    }

    pub fn is_available(&self, bone: BoneType) -> bool {
        self.reference(bone).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientDetail {
    #[serde(flatten)]
    pub summary: PatientSummary,
    #[serde(default, alias = "modal_urls")]
    pub model_urls: ModelUrls,
    #[serde(default)]
    pub gif_urls: ModelUrls,
}

impl PatientDetail {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ViewError::PatientRecord(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ViewError::PatientRecord(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    /// Hand-off to the AR page. Missing measurements travel as 0.
    pub fn ar_handoff(&self) -> ArHandoff {
        ArHandoff {
            patient_id: self.summary.id.clone(),
            height_mm: self.summary.height_millimeter.unwrap_or(0.0),
            radius_mm: self.summary.width_millimeter.unwrap_or(0.0),
        }
    }
}

pub fn parse_patient_list(text: &str) -> Result<Vec<PatientSummary>> {
    serde_json::from_str(text).map_err(|e| ViewError::PatientRecord(e.to_string()))
}

/// `"N/A"` for missing values, otherwise two decimals with a unit.
pub fn format_dimension(value: Option<f64>) -> String {
    match value {
        Some(v) if !v.is_nan() => format!("{v:.2}mm"),
        _ => "N/A".to_string(),
    }
}

pub fn format_measurement(value: Option<f64>) -> String {
    match value {
        Some(v) if !v.is_nan() => format!("{v:.2}"),
        _ => "N/A".to_string(),
    }
}

pub const DEFAULT_AR_HEIGHT_MM: f64 = 10.0;
pub const DEFAULT_AR_RADIUS_MM: f64 = 5.0;

/// Navigation target carrying the implant measurement to the AR page.
#[derive(Debug, Clone, PartialEq)]
pub struct ArHandoff {
    pub patient_id: String,
    pub height_mm: f64,
    pub radius_mm: f64,
}

impl ArHandoff {
    pub fn path(&self) -> String {
        format!(
            "/user/{}/ar?height={}&radius={}",
            self.patient_id, self.height_mm, self.radius_mm
        )
    }

    /// Reads `height` and `radius` from a query string, falling back to
    /// 10mm and 5mm for anything missing, unparsable or non-positive.
    pub fn parse_query(patient_id: impl Into<String>, query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let lookup = |key: &str| {
            query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v)
        };
        Self {
            patient_id: patient_id.into(),
            height_mm: parse_positive_number(lookup("height"), DEFAULT_AR_HEIGHT_MM),
            radius_mm: parse_positive_number(lookup("radius"), DEFAULT_AR_RADIUS_MM),
        }
    }
}

pub fn parse_positive_number(value: Option<&str>, fallback: f64) -> f64 {
    match value.and_then(|v| v.trim().parse::<f64>().ok()) {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => fallback,
    }
}
