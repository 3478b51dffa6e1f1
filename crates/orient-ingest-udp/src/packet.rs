//! Sensor datagram layout (little-endian, 14 bytes):
//!
//! | off | size | field                      |
//! |-----|------|----------------------------|
//! | 0   | 1    | device id                  |
//! | 1   | 4    | timestamp, i32 ms          |
//! | 5   | 2    | W, i16 fixed point         |
//! | 7   | 2    | X                          |
//! | 9   | 2    | Y                          |
//! | 11  | 2    | Z                          |
//! | 13  | 1    | action flag                |

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use model::{DecodedSample, Quat};
use std::io::Cursor;

pub const PACKET_LEN: usize = 14;

/// Raw quaternion components are Q14 fixed point.
pub const FIXED_POINT_SCALE: f32 = 16384.0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("datagram too short: {len} bytes, need {}", PACKET_LEN)]
    TooShort { len: usize },
}

/// Decode one datagram. Bytes past [`PACKET_LEN`] are ignored.
pub fn decode(buf: &[u8]) -> Result<DecodedSample, DecodeError> {
    if buf.len() < PACKET_LEN {
        return Err(DecodeError::TooShort { len: buf.len() });
    }
    read_sample(Cursor::new(&buf[..PACKET_LEN])).map_err(|_| DecodeError::TooShort { len: buf.len() })
}

fn read_sample(mut c: Cursor<&[u8]>) -> std::io::Result<DecodedSample> {
    let device_id = c.read_u8()?;
    let timestamp = c.read_i32::<LittleEndian>()?;
    let w = c.read_i16::<LittleEndian>()?;
    let x = c.read_i16::<LittleEndian>()?;
    let y = c.read_i16::<LittleEndian>()?;
    let z = c.read_i16::<LittleEndian>()?;
    let action_flag = c.read_u8()?;
    Ok(DecodedSample {
        device_id,
        timestamp,
        orientation: Quat::from_xyzw(
            x as f32 / FIXED_POINT_SCALE,
            y as f32 / FIXED_POINT_SCALE,
            z as f32 / FIXED_POINT_SCALE,
            w as f32 / FIXED_POINT_SCALE,
        ),
        action_flag,
    })
}

/// Sensor-side encoding, used by test harnesses and replay tools.
pub fn encode(sample: &DecodedSample) -> [u8; PACKET_LEN] {
    let fixed = |v: f32| (v * FIXED_POINT_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
    let q = sample.orientation;
    let mut out = [0u8; PACKET_LEN];
    let mut c = Cursor::new(&mut out[..]);
    // writes into a correctly sized array cannot fail
    let _ = c.write_u8(sample.device_id);
    let _ = c.write_i32::<LittleEndian>(sample.timestamp);
    let _ = c.write_i16::<LittleEndian>(fixed(q.w));
    let _ = c.write_i16::<LittleEndian>(fixed(q.x));
    let _ = c.write_i16::<LittleEndian>(fixed(q.y));
    let _ = c.write_i16::<LittleEndian>(fixed(q.z));
    let _ = c.write_u8(sample.action_flag);
    out
}
