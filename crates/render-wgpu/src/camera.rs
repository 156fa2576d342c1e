use glam::{Mat4, Vec3};

/// Eye-z change per up/down key press.
pub const EYE_STEP: f32 = 0.025;

/// Closest the eye may get to the origin it looks at.
const MIN_DISTANCE: f32 = 0.05;

/// Orbit-free camera looking at the origin from a point on the z axis.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub eye: Vec3,
    pub fovy: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, -1.5),
            fovy: 1.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 50.0,
        }
    }
}

impl Camera {
    pub fn with_eye_z(eye_z: f32) -> Self {
        let mut cam = Self::default();
        cam.eye.z = eye_z;
        cam
    }

    /// Move the eye along z by `steps` key presses. Returns whether it moved.
    pub fn nudge(&mut self, steps: f32) -> bool {
        let z = self.eye.z + steps * EYE_STEP;
        if z.abs() < MIN_DISTANCE || z.abs() > self.far {
            return false;
        }
        self.eye.z = z;
        true
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, Vec3::ZERO, Vec3::Y)
    }

    /// Zero-to-one depth range.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fovy, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_camera() {
        let cam = Camera::default();
        let vp = cam.view_projection();
        assert!(!vp.col(0).x.is_nan());
        let origin = vp.project_point3(Vec3::ZERO);
        assert!(origin.x.abs() < 1e-5 && origin.y.abs() < 1e-5);
        assert!((0.0..=1.0).contains(&origin.z));
    }

    #[test]
    fn nudge_moves_by_step() {
        let mut cam = Camera::default();
        assert!(cam.nudge(1.0));
        assert!((cam.eye.z - (-1.5 + EYE_STEP)).abs() < 1e-6);
        assert!(cam.nudge(-2.0));
        assert!((cam.eye.z - (-1.5 - EYE_STEP)).abs() < 1e-6);
    }

    #[test]
    fn nudge_stops_short_of_origin() {
        let mut cam = Camera::with_eye_z(-0.06);
        assert!(!cam.nudge(1.0));
        assert_eq!(cam.eye.z, -0.06);
    }
}
