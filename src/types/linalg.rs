//! Fixed-size matrix aliases for camera poses and route geometry

use nalgebra::{Matrix3, Matrix4, Point2, Vector3};

/// Camera-to-world transform as delivered by the AR subsystem
pub type CameraTransform = Matrix4<f32>;

/// Pinhole intrinsics: fx, fy on the diagonal, (cx, cy) in the last column
pub type CameraIntrinsics = Matrix3<f32>;

/// 2-D point on the ground plane (x, z of the camera position)
pub type RoutePoint = Point2<f64>;

/// Row-vector layout of a transform, as stored in pose records
pub type RowMajor4 = [[f32; 4]; 4];

pub fn to_rows(m: &CameraTransform) -> RowMajor4 {
    let mut rows = [[0.0f32; 4]; 4];
    for (r, row) in rows.iter_mut().enumerate() {
        for (c, value) in row.iter_mut().enumerate() {
            *value = m[(r, c)];
        }
    }
    rows
}

pub fn from_rows(rows: &RowMajor4) -> CameraTransform {
    CameraTransform::from_fn(|r, c| rows[r][c])
}

/// Translation column of a row-major transform
pub fn translation(rows: &RowMajor4) -> Vector3<f32> {
    Vector3::new(rows[0][3], rows[1][3], rows[2][3])
}
