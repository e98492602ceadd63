use na::{Point3, Vector3};

/// Stands in for "infinitely far" in distances and for empty bounds.
pub const BVH_FAR: f32 = 1e30;

/// Reciprocal that maps near-zero values to `BVH_FAR` instead of infinity.
pub fn safe_rcp(x: f32) -> f32 {
    if x.abs() > 1e-12 {
        1.0 / x
    } else {
        BVH_FAR
    }
}

pub fn safe_rcp3(v: &Vector3<f32>) -> Vector3<f32> {
    Vector3::new(safe_rcp(v.x), safe_rcp(v.y), safe_rcp(v.z))
}

pub fn min_point(a: &Point3<f32>, b: &Point3<f32>) -> Point3<f32> {
    Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z))
}

pub fn max_point(a: &Point3<f32>, b: &Point3<f32>) -> Point3<f32> {
    Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z))
}

/// Half the surface area of a box with the given extent. Negative extents
/// (empty boxes) count as zero area.
pub fn half_area(extent: &Vector3<f32>) -> f32 {
    if extent.x < 0.0 || extent.y < 0.0 || extent.z < 0.0 {
        return 0.0;
    }
    extent.x * extent.y + extent.y * extent.z + extent.z * extent.x
}

/// 2^e built directly from the exponent bits.
pub fn exp2i(e: i32) -> f32 {
    f32::from_bits(((e + 127) as u32) << 23)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_rcp_clamps_tiny_values() {
        assert_eq!(safe_rcp(0.0), BVH_FAR);
        assert_eq!(safe_rcp(-1e-13), BVH_FAR);
        assert_eq!(safe_rcp(2.0), 0.5);
        assert_eq!(safe_rcp(-4.0), -0.25);
    }

    #[test]
    fn half_area_of_unit_cube() {
        assert_eq!(half_area(&Vector3::new(1.0, 1.0, 1.0)), 3.0);
        assert_eq!(half_area(&Vector3::new(-2.0, 1.0, 1.0)), 0.0);
    }

    #[test]
    fn exp2i_matches_powi() {
        for e in [-126, -10, -1, 0, 1, 7, 100, 127] {
            assert_eq!(exp2i(e), 2f32.powi(e));
        }
    }
}
