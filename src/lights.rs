//! Light descriptions consumed by the shadow and shading passes.

use glam::Vec3;

/// Photometric terms shared by every light kind.
#[derive(Debug, Clone, Copy)]
pub struct LightColor {
    pub ambient: Vec3,
    pub intensity: Vec3,
}

/// Omnidirectional light with a bounded attenuation range.
#[derive(Debug, Clone, Copy)]
pub struct PointLight {
    pub color: LightColor,
    pub position: Vec3,
    /// Attenuation range (meters); also the shadow far plane.
    pub range: f32,
    /// Linear attenuation coefficient.
    pub linear_att: f32,
}

/// Cone-shaped light with one bounded view direction.
#[derive(Debug, Clone, Copy)]
pub struct SpotLight {
    pub color: LightColor,
    pub position: Vec3,
    pub range: f32,
    pub linear_att: f32,
    /// Cone axis; need not be normalized by callers.
    pub direction: Vec3,
    /// Field-of-view factor: tangent of the cone half-angle. Scales the
    /// shadow projection frustum.
    pub fov: f32,
    /// Exponent applied to the axis-alignment term.
    pub directional_att: f32,
}

/// Direction-only light. Carries no position or range and casts no shadows
/// in the current design.
#[derive(Debug, Clone, Copy)]
pub struct DirectionalLight {
    pub color: LightColor,
    pub direction: Vec3,
}

/// The closed set of light kinds owned by a scene.
#[derive(Debug, Clone, Copy)]
pub enum Light {
    Point(PointLight),
    Spot(SpotLight),
    Directional(DirectionalLight),
}

impl Light {
    pub fn color(&self) -> &LightColor {
        match self {
            Light::Point(l) => &l.color,
            Light::Spot(l) => &l.color,
            Light::Directional(l) => &l.color,
        }
    }
}
