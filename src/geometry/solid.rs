use std::f32::consts::TAU;

use glam::Vec3;

use crate::error::{Result, ViewError};
use crate::geometry::measurement::{Measurement, ScaleProfile};
use crate::geometry::mesh::TriangleMesh;

pub const RADIAL_SEGMENTS: u32 = 32;
pub const BODY_TAPER: f32 = 0.8;
pub const HEAD_RADIUS_RATIO: f32 = 1.4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CylinderDescriptor {
    pub radius_top: f32,
    pub radius_bottom: f32,
    pub height: f32,
    pub radial_segments: u32,
    pub center_y: f32,
}

impl CylinderDescriptor {
    pub fn top_y(&self) -> f32 {
        self.center_y + self.height / 2.0
    }

    pub fn bottom_y(&self) -> f32 {
        self.center_y - self.height / 2.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DimensionLabel {
    pub text: String,
    pub anchor: Vec3,
}

/// Implant solid: tapered body centred on the origin with the head stacked on top.
#[derive(Debug, Clone, PartialEq)]
pub struct SolidDescription {
    pub body: CylinderDescriptor,
    pub head: CylinderDescriptor,
    pub labels: Vec<DimensionLabel>,
}

impl SolidDescription {
    pub fn parts(&self) -> [CylinderDescriptor; 2] {
        [self.body, self.head]
    }
}

pub fn build(measurement: Measurement, profile: ScaleProfile) -> Result<SolidDescription> {
    measurement.validate()?;

    let height = scaled("height", measurement.height_mm * profile.height_factor())?;
    let radius = scaled("radius", measurement.radius_mm * profile.radius_factor())?;
    let head_height = scaled("head height", measurement.head_height_mm * profile.head_factor())?;

    // The tapered side normal is (sin, slope, cos); it has to stay normalisable.
    let slope = radius * (BODY_TAPER - 1.0) / height;
    if Vec3::new(1.0, slope, 0.0).try_normalize().is_none() {
        return Err(ViewError::InvalidMeasurement(format!(
            "radius {} is out of proportion to height {}",
            measurement.radius_mm, measurement.height_mm
        )));
    }

    let body = CylinderDescriptor {
        radius_top: radius,
        radius_bottom: radius * BODY_TAPER,
        height,
        radial_segments: RADIAL_SEGMENTS,
        center_y: 0.0,
    };

    let head_radius = radius * HEAD_RADIUS_RATIO;
    let head = CylinderDescriptor {
        radius_top: head_radius,
        radius_bottom: head_radius,
        height: head_height,
        radial_segments: RADIAL_SEGMENTS,
        center_y: height / 2.0 + head_height / 2.0,
    };

    let labels = match profile {
        ScaleProfile::Display => vec![
            DimensionLabel {
                text: format!("Height: {}mm", measurement.height_mm),
                anchor: Vec3::new(0.0, height + 0.1, 0.0),
            },
            DimensionLabel {
                text: format!("Width: {}mm", measurement.width_label_mm()),
                anchor: Vec3::new(radius * 3.0, 0.0, 0.2),
            },
        ],
        ScaleProfile::Immersive => Vec::new(),
    };

    Ok(SolidDescription { body, head, labels })
}

fn scaled(name: &str, value: f32) -> Result<f32> {
    if value.is_normal() && value > 0.0 {
        Ok(value)
    } else {
        Err(ViewError::InvalidMeasurement(format!(
            "{name} is too small to build, scaled to {value}"
        )))
    }
}

pub fn tessellate(solid: &SolidDescription) -> TriangleMesh {
    let mut mesh = TriangleMesh::default();
    for part in solid.parts() {
        mesh.append(&cylinder_mesh(&part));
    }
    mesh
}

/// Side wall with one height segment plus both caps, Y up.
pub fn cylinder_mesh(c: &CylinderDescriptor) -> TriangleMesh {
    let segments = c.radial_segments.max(3);
    let half = c.height / 2.0;
    let slope = (c.radius_bottom - c.radius_top) / c.height;
    let mut mesh = TriangleMesh::default();

    for (radius, y) in [(c.radius_top, half), (c.radius_bottom, -half)] {
        for x in 0..=segments {
            let theta = x as f32 / segments as f32 * TAU;
            let (sin, cos) = theta.sin_cos();
            mesh.vertices
                .extend_from_slice(&[radius * sin, c.center_y + y, radius * cos]);
            let normal = Vec3::new(sin, slope, cos).normalize();
            mesh.normals.extend_from_slice(&normal.to_array());
        }
    }

    let row = segments + 1;
    for x in 0..segments {
        let a = x;
        let b = row + x;
        let c1 = row + x + 1;
        let d = x + 1;
        mesh.indices.extend_from_slice(&[a, b, d, b, c1, d]);
    }

    append_cap(&mut mesh, c, segments, true);
    append_cap(&mut mesh, c, segments, false);
    mesh
}

fn append_cap(mesh: &mut TriangleMesh, c: &CylinderDescriptor, segments: u32, top: bool) {
    let (radius, y, sign) = if top {
        (c.radius_top, c.center_y + c.height / 2.0, 1.0)
    } else {
        (c.radius_bottom, c.center_y - c.height / 2.0, -1.0)
    };

    let center = mesh.vertex_count() as u32;
    mesh.vertices.extend_from_slice(&[0.0, y, 0.0]);
    mesh.normals.extend_from_slice(&[0.0, sign, 0.0]);

    let ring = center + 1;
    for x in 0..=segments {
        let theta = x as f32 / segments as f32 * TAU;
        let (sin, cos) = theta.sin_cos();
        mesh.vertices.extend_from_slice(&[radius * sin, y, radius * cos]);
        mesh.normals.extend_from_slice(&[0.0, sign, 0.0]);
    }

    for x in 0..segments {
        let (i, j) = (ring + x, ring + x + 1);
        if top {
            mesh.indices.extend_from_slice(&[i, j, center]);
        } else {
            mesh.indices.extend_from_slice(&[j, i, center]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn display_scenario_matches_reference_dimensions() {
        let solid = build(Measurement::new(10.0, 5.0, 0.2), ScaleProfile::Display).unwrap();

        assert_relative_eq!(solid.body.height, 0.1, epsilon = 1e-6);
        assert_relative_eq!(solid.body.radius_top, 0.05, epsilon = 1e-6);
        assert_relative_eq!(solid.body.radius_bottom, 0.04, epsilon = 1e-6);
        assert_relative_eq!(solid.head.radius_top, 0.07, epsilon = 1e-6);
        assert_relative_eq!(solid.head.radius_bottom, 0.07, epsilon = 1e-6);
        assert_relative_eq!(solid.head.center_y, 0.15, epsilon = 1e-6);
        assert_relative_eq!(solid.head.bottom_y(), solid.body.top_y(), epsilon = 1e-6);
        assert_eq!(solid.body.radial_segments, 32);
    }

    #[test]
    fn head_touches_body_for_many_measurements() {
        for profile in [ScaleProfile::Display, ScaleProfile::Immersive] {
            for &(h, r, head) in &[
                (0.5, 0.15, 0.2),
                (42.0, 3.3, 0.01),
                (1e-3, 7.0, 5.0),
                (1200.0, 0.4, 0.8),
            ] {
                let solid = build(Measurement::new(h, r, head), profile).unwrap();
                let gap = solid.head.bottom_y() - solid.body.top_y();
                assert!(gap.abs() <= 1e-5 * solid.head.top_y().abs().max(1.0), "gap {gap}");
            }
        }
    }

    #[test]
    fn rejects_degenerate_input() {
        for m in [
            Measurement::new(0.0, 5.0, 0.2),
            Measurement::new(10.0, -1.0, 0.2),
            Measurement::new(10.0, 5.0, 0.0),
            Measurement::new(f32::NAN, 5.0, 0.2),
            Measurement::new(10.0, f32::INFINITY, 0.2),
        ] {
            assert!(matches!(
                build(m, ScaleProfile::Display),
                Err(ViewError::InvalidMeasurement(_))
            ));
        }
    }

    #[test]
    fn rejects_dimensions_that_vanish_or_overflow_once_scaled() {
        for m in [
            Measurement::new(1e-44, 5.0, 0.2),
            Measurement::new(10.0, 1e-44, 0.2),
            Measurement::new(10.0, 5.0, 1e-44),
            Measurement::new(1e-30, 1e30, 0.2),
            Measurement::from_nullable(Some(1e-300), Some(5.0), ScaleProfile::Display),
        ] {
            assert!(
                matches!(build(m, ScaleProfile::Display), Err(ViewError::InvalidMeasurement(_))),
                "{m:?}"
            );
        }
    }

    #[test]
    fn accepted_measurements_tessellate_to_finite_normals() {
        for profile in [ScaleProfile::Display, ScaleProfile::Immersive] {
            for &(h, r, head) in &[(1e-3, 7.0, 5.0), (1e-30, 1e-30, 1e-30), (3e30, 2e30, 1e30), (10.0, 5.0, 0.2)] {
                let Ok(solid) = build(Measurement::new(h, r, head), profile) else {
                    continue;
                };
                let mesh = tessellate(&solid);
                assert!(mesh.normals.iter().all(|n| n.is_finite()), "{h} {r} {head}");
                assert!(mesh.vertices.iter().all(|v| v.is_finite()), "{h} {r} {head}");
            }
        }
    }

    #[test]
    fn build_is_deterministic() {
        let m = Measurement::new(12.5, 2.25, 0.2);
        assert_eq!(
            build(m, ScaleProfile::Display).unwrap(),
            build(m, ScaleProfile::Display).unwrap()
        );
    }

    #[test]
    fn immersive_profile_scales_to_metres() {
        let solid = build(Measurement::new(10.0, 5.0, 0.04), ScaleProfile::Immersive).unwrap();
        assert_relative_eq!(solid.body.height, 0.01, epsilon = 1e-7);
        assert_relative_eq!(solid.body.radius_top, 0.005, epsilon = 1e-7);
        assert_relative_eq!(solid.head.height, 0.01, epsilon = 1e-7);
        assert!(solid.labels.is_empty());
    }

    #[test]
    fn display_labels_carry_the_raw_measurements() {
        let solid = build(Measurement::new(10.0, 5.0, 0.2), ScaleProfile::Display).unwrap();
        assert_eq!(solid.labels[0].text, "Height: 10mm");
        assert_eq!(solid.labels[1].text, "Width: 5mm");
        assert_relative_eq!(solid.labels[0].anchor.y, 0.2, epsilon = 1e-6);
        assert_relative_eq!(solid.labels[1].anchor.x, 0.15, epsilon = 1e-6);
    }

    #[test]
    fn tessellation_covers_both_parts() {
        let solid = build(Measurement::new(10.0, 5.0, 0.2), ScaleProfile::Display).unwrap();
        let mesh = tessellate(&solid);

        // 2 side rows + 2 caps (centre + ring) per cylinder.
        let per_cylinder = 2 * 33 + 2 * (1 + 33);
        assert_eq!(mesh.vertex_count(), 2 * per_cylinder);
        assert_eq!(mesh.triangle_count(), 2 * (32 * 2 + 32 * 2));
        assert_eq!(mesh.normals.len(), mesh.vertices.len());

        let bounds = mesh.bounds().unwrap();
        assert_relative_eq!(bounds.min.y, -0.05, epsilon = 1e-6);
        assert_relative_eq!(bounds.max.y, 0.25, epsilon = 1e-6);
        assert_relative_eq!(bounds.max.x, 0.07, epsilon = 1e-4);
    }
}
