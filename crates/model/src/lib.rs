//! Shared orientation telemetry types.

use serde::{Deserialize, Serialize};

pub use glam::{EulerRot, Quat};

/// One byte on the wire, one physical sensor.
pub type DeviceId = u8;

/// Sensor-local milliseconds. Not synchronized to any host clock and free to
/// jump backward when a sensor resets.
pub type Timestamp = i32;

/// A single datagram after decoding.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct DecodedSample {
    pub device_id: DeviceId,
    pub timestamp: Timestamp,
    pub orientation: Quat,
    pub action_flag: u8,
}

/// Derived per-packet motion observation.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct MotionSample {
    /// ms since the previously recorded sample; may be zero or negative.
    pub time_delta_ms: i64,
    /// Geodesic angle moved since the previously recorded sample (radians).
    pub angular_distance: f32,
}

pub mod quat {
    //! Quaternion helpers that tolerate the small norm drift of fixed-point
    //! decoded sensor values. `glam::Quat::inverse` assumes unit length, so
    //! everything here goes through [`inverse`] instead.

    use glam::{DQuat, Quat};

    pub const IDENTITY: Quat = Quat::IDENTITY;

    /// Conjugate divided by the squared norm.
    pub fn inverse(q: Quat) -> Quat {
        let n = q.length_squared();
        if n <= f32::EPSILON {
            return IDENTITY;
        }
        let c = q.conjugate();
        Quat::from_xyzw(c.x / n, c.y / n, c.z / n, c.w / n)
    }

    fn widen(q: Quat) -> DQuat {
        DQuat::from_xyzw(q.x as f64, q.y as f64, q.z as f64, q.w as f64)
    }

    /// Geodesic distance on SO(3) between two orientations, in radians.
    ///
    /// `q` and `-q` are the same rotation, so `b` is flipped onto `a`'s
    /// hemisphere before the delta is taken. Result lies in `[0, PI]`.
    /// Evaluated in f64 with `atan2`, which stays exact for identical inputs
    /// where `acos` of a near-one `w` does not.
    pub fn shortest_arc_angle(a: Quat, b: Quat) -> f32 {
        let (a, b) = (widen(a), widen(b));
        let b = if a.dot(b) < 0.0 { -b } else { b };
        let n = a.length_squared();
        if n <= f64::EPSILON {
            return 0.0;
        }
        let c = a.conjugate();
        let inv_a = DQuat::from_xyzw(c.x / n, c.y / n, c.z / n, c.w / n);
        let delta = b * inv_a;
        (2.0 * delta.xyz().length().atan2(delta.w.abs())) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::quat::*;
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::{FRAC_PI_2, PI};

    fn same_rotation(a: Quat, b: Quat, eps: f32) -> bool {
        shortest_arc_angle(a, b) <= eps
    }

    fn samples() -> Vec<Quat> {
        vec![
            IDENTITY,
            Quat::from_rotation_x(0.3),
            Quat::from_rotation_y(-1.2),
            Quat::from_rotation_z(2.9),
            Quat::from_euler(EulerRot::XYZ, 0.4, -0.7, 1.9),
            // Q14-decoded, slightly off unit norm
            Quat::from_xyzw(0.188, -0.255, 0.1, 0.667),
        ]
    }

    #[test]
    fn angle_to_self_is_zero() {
        for q in samples() {
            assert_relative_eq!(shortest_arc_angle(q, q), 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn angle_to_negated_self_is_zero() {
        for q in samples() {
            assert_relative_eq!(shortest_arc_angle(q, -q), 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn angle_is_symmetric() {
        let qs = samples();
        for a in &qs {
            for b in &qs {
                assert_relative_eq!(
                    shortest_arc_angle(*a, *b),
                    shortest_arc_angle(*b, *a),
                    epsilon = 1e-6
                );
            }
        }
    }

    #[test]
    fn quarter_turn_measures_half_pi() {
        let a = Quat::from_rotation_z(0.1);
        let b = Quat::from_rotation_z(0.1 + FRAC_PI_2);
        assert_relative_eq!(shortest_arc_angle(a, b), FRAC_PI_2, epsilon = 1e-5);
    }

    #[test]
    fn angle_never_exceeds_pi() {
        let a = IDENTITY;
        let b = Quat::from_rotation_y(1.9 * PI);
        let angle = shortest_arc_angle(a, b);
        assert!(angle <= PI + 1e-5);
        assert_relative_eq!(angle, 0.1 * PI, epsilon = 1e-5);
    }

    #[test]
    fn inverse_tolerates_non_unit_input() {
        let q = Quat::from_xyzw(0.0, 0.0, 0.0, 1.02);
        let r = q * inverse(q);
        assert!(same_rotation(r, IDENTITY, 1e-5));
    }

    #[test]
    fn inverse_of_zero_is_identity() {
        assert_eq!(inverse(Quat::from_xyzw(0.0, 0.0, 0.0, 0.0)), IDENTITY);
    }
}
