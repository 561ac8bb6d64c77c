use glam::{Mat4, Vec3, Vec4};

pub fn translate(x: f32, y: f32, z: f32) -> Mat4 {
    Mat4::from_translation(Vec3::new(x, y, z))
}

pub fn scale(x: f32, y: f32, z: f32) -> Mat4 {
    Mat4::from_scale(Vec3::new(x, y, z))
}

/// Per-window affine state: four matrices composed in a fixed order plus a
/// color modulation applied in the fragment stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub rotation: Mat4,
    pub scale: Mat4,
    pub translation: Mat4,
    pub viewport_translation: Mat4,
    pub color: Vec4,
}

impl Default for Transform {
    fn default() -> Self {
        Transform {
            rotation: Mat4::IDENTITY,
            scale: Mat4::IDENTITY,
            translation: Mat4::IDENTITY,
            viewport_translation: Mat4::IDENTITY,
            color: Vec4::ONE,
        }
    }
}

impl Transform {
    /// Scale first, then rotation, then the two translations.
    pub fn compose(&self) -> Mat4 {
        self.viewport_translation * self.translation * self.rotation * self.scale
    }

    pub fn is_identity(&self) -> bool {
        self.compose() == Mat4::IDENTITY
    }
}

/// Matrices shared by every window; workspace animation and the expo overview
/// act through these rather than touching windows individually. The effective
/// matrix of a window is `global × per-window`.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalTransform {
    pub rotation: Mat4,
    pub scale: Mat4,
    pub translation: Mat4,
}

impl Default for GlobalTransform {
    fn default() -> Self {
        GlobalTransform {
            rotation: Mat4::IDENTITY,
            scale: Mat4::IDENTITY,
            translation: Mat4::IDENTITY,
        }
    }
}

impl GlobalTransform {
    /// Translation applies first so a scale shrinks the already-shifted
    /// plane, which is what the overview layout relies on.
    pub fn compose(&self) -> Mat4 {
        self.rotation * self.scale * self.translation
    }

    pub fn reset(&mut self) {
        *self = GlobalTransform::default();
    }

    pub fn is_identity(&self) -> bool {
        *self == GlobalTransform::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(m: Mat4, x: f32, y: f32) -> (f32, f32) {
        let v = m * Vec4::new(x, y, 0.0, 1.0);
        (v.x, v.y)
    }

    #[test]
    fn window_compose_scales_before_translating() {
        let mut t = Transform::default();
        t.scale = scale(2.0, 2.0, 1.0);
        t.translation = translate(1.0, 0.0, 0.0);

        /* (1, 0) -> scaled (2, 0) -> translated (3, 0) */
        let (x, y) = apply(t.compose(), 1.0, 0.0);
        assert_eq!((x, y), (3.0, 0.0));
    }

    #[test]
    fn global_compose_translates_before_scaling() {
        let mut g = GlobalTransform::default();
        g.translation = translate(2.0, 0.0, 0.0);
        g.scale = scale(1.0 / 3.0, 1.0 / 3.0, 1.0);

        /* a point one screen to the left of a 3x1 plane centers at -1/3 + 2/3 */
        let (x, _) = apply(g.compose(), -1.0, 0.0);
        assert!((x - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn default_transforms_are_identity() {
        assert!(Transform::default().is_identity());
        assert!(GlobalTransform::default().is_identity());
        let mut g = GlobalTransform::default();
        g.translation = translate(0.5, 0.0, 0.0);
        assert!(!g.is_identity());
        g.reset();
        assert!(g.is_identity());
    }
}
