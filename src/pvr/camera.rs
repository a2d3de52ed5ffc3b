//! Perspective and view matrix construction
//!
//! Produces one composed matrix (viewport * projection * view) that the
//! transform stage loads as its starting point each frame.

use serde::{Serialize, Deserialize};
use super::math::{Mat4, Vec3};

/// Which way the view-space Z axis points relative to the eye.
///
/// Both conventions are in use by callers; they differ only in the sign and
/// placement of the third-row terms of the projection and in the handedness
/// of the look-at basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthConvention {
    /// Camera looks down -Z, `w = -z_view`
    RightHanded,
    /// Camera looks down +Z, `w = z_view`
    LeftHanded,
}

/// Pixel dimensions folded into the camera matrix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraParams {
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub eye: Vec3,
    pub center: Vec3,
    pub up: Vec3,
    pub convention: DepthConvention,
    /// When set, the homogeneous divide yields pixel coordinates instead of NDC
    pub viewport: Option<Viewport>,
}

/// A built camera: its parameters plus the composed matrix
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    params: CameraParams,
    matrix: Mat4,
}

impl Camera {
    pub fn build(params: CameraParams) -> Self {
        let projection = perspective(
            params.fov_y_degrees,
            params.aspect,
            params.near,
            params.far,
            params.convention,
        );
        let view = look_at(params.eye, params.center, params.up, params.convention);
        let matrix = match params.viewport {
            Some(vp) => viewport_matrix(vp) * projection * view,
            None => projection * view,
        };
        Self { params, matrix }
    }

    /// Rebuild with a different vertical field of view
    pub fn with_fov(&self, fov_y_degrees: f32) -> Self {
        Self::build(CameraParams { fov_y_degrees, ..self.params })
    }

    pub fn matrix(&self) -> &Mat4 {
        &self.matrix
    }

    pub fn params(&self) -> &CameraParams {
        &self.params
    }
}

/// Perspective projection. The cotangent of half the field of view scales
/// X and Y; Z and W follow the chosen depth convention.
pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32, convention: DepthConvention) -> Mat4 {
    debug_assert!(
        fov_y_degrees > 0.0 && fov_y_degrees < 180.0,
        "field of view must be in (0, 180) degrees, got {}",
        fov_y_degrees
    );
    debug_assert!(near > 0.0 && near < far, "expected 0 < near < far, got near={} far={}", near, far);
    debug_assert!(aspect > 0.0, "aspect ratio must be positive");

    let half = fov_y_degrees.to_radians() * 0.5;
    let f = half.cos() / half.sin();

    let (zz, zw, wz) = match convention {
        DepthConvention::RightHanded => ((far + near) / (near - far), 2.0 * far * near / (near - far), -1.0),
        DepthConvention::LeftHanded => ((far + near) / (far - near), -2.0 * far * near / (far - near), 1.0),
    };

    Mat4::from_rows([
        [f / aspect, 0.0, 0.0, 0.0],
        [0.0, f, 0.0, 0.0],
        [0.0, 0.0, zz, zw],
        [0.0, 0.0, wz, 0.0],
    ])
}

/// View matrix placing `eye` at the origin looking at `center`
pub fn look_at(eye: Vec3, center: Vec3, up: Vec3, convention: DepthConvention) -> Mat4 {
    let forward = (center - eye).normalize();
    debug_assert!(forward != Vec3::ZERO, "eye and center must differ");

    let (side, rup, back) = match convention {
        DepthConvention::RightHanded => {
            let side = forward.cross(up).normalize();
            (side, side.cross(forward), forward.scale(-1.0))
        }
        DepthConvention::LeftHanded => {
            let side = up.cross(forward).normalize();
            (side, forward.cross(side), forward)
        }
    };
    debug_assert!(side != Vec3::ZERO, "up vector must not be parallel to the view direction");

    Mat4::from_rows([
        [side.x, side.y, side.z, -side.dot(eye)],
        [rup.x, rup.y, rup.z, -rup.dot(eye)],
        [back.x, back.y, back.z, -back.dot(eye)],
        [0.0, 0.0, 0.0, 1.0],
    ])
}

/// NDC [-1, 1] to pixels, Y flipped so +Y points down the screen
pub fn viewport_matrix(vp: Viewport) -> Mat4 {
    let hw = vp.width * 0.5;
    let hh = vp.height * 0.5;
    Mat4::from_rows([
        [hw, 0.0, 0.0, hw],
        [0.0, -hh, 0.0, hh],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ])
}
