//! Snapshot wire codec.
//!
//! A snapshot is a headerless run of fixed 13-byte records, one per circle in
//! table order. The receiver derives the count from the payload length.
//!
//! | offset | size | field                      |
//! |--------|------|----------------------------|
//! | 0      | 1    | id                         |
//! | 1      | 2    | x, big-endian              |
//! | 3      | 2    | y, big-endian              |
//! | 5      | 4    | radius, f32 bits big-endian|
//! | 9      | 4    | r, g, b, a                 |

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{math::Rgba, physics::Circle};

/// Size of one encoded circle.
pub const RECORD_LEN: usize = 13;

/// Encodes circles into a fresh snapshot buffer.
pub fn encode(circles: &[Circle]) -> Bytes {
    let mut buf = BytesMut::with_capacity(circles.len() * RECORD_LEN);
    encode_into(circles, &mut buf);
    buf.freeze()
}

/// Appends the records for `circles` to `buf`.
pub fn encode_into(circles: &[Circle], buf: &mut BytesMut) {
    buf.reserve(circles.len() * RECORD_LEN);
    for c in circles {
        buf.put_u8(c.id);
        buf.put_u16(c.x);
        buf.put_u16(c.y);
        buf.put_f32(c.radius);
        buf.put_slice(&[c.color.r, c.color.g, c.color.b, c.color.a]);
    }
}

/// Decodes every complete record in `bytes`. A trailing partial record is
/// dropped.
pub fn decode(bytes: &[u8]) -> Vec<Circle> {
    bytes.chunks_exact(RECORD_LEN).map(decode_record).collect()
}

/// Number of complete records in a payload of `len` bytes.
pub fn record_count(len: usize) -> usize {
    len / RECORD_LEN
}

fn decode_record(mut rec: &[u8]) -> Circle {
    let id = rec.get_u8();
    let x = rec.get_u16();
    let y = rec.get_u16();
    let radius = rec.get_f32();
    let color = Rgba::new(rec.get_u8(), rec.get_u8(), rec.get_u8(), rec.get_u8());
    Circle {
        id,
        x,
        y,
        radius,
        color,
    }
}
