//! Ruida wire codec
//!
//! Stateless byte-level transforms shared by the transport, the job builder
//! and the decoder:
//! - the per-byte swizzle obfuscation and its inverse
//! - 7-bit packed integers (1, 2 and 5 bytes, most significant first)
//! - millimetre coordinates at micron resolution
//! - 14-bit power percentages
//! - the 16-bit packet checksum
//!
//! Every function is total over its input domain.

/// Swizzle key used by RDC6442-class controllers
pub const DEFAULT_MAGIC: u8 = 0x88;

/// Only the first byte of a command has the top bit set
pub const CMD_MASK: u8 = 0x80;

/// Largest offset expressible by the 14-bit relative coordinate, in mm
pub const REL_COORD_LIMIT_MM: f64 = 8.191;

const POWER_FULL_SCALE: f64 = 0x3FFF as f64;

/// Scramble a single byte
pub fn swizzle_byte(b: u8, magic: u8) -> u8 {
    let mut b = b;
    b ^= b >> 7;
    b ^= b << 7;
    b ^= b >> 7;
    b ^= magic;
    b.wrapping_add(1)
}

/// Reverse [`swizzle_byte`]
pub fn unswizzle_byte(b: u8, magic: u8) -> u8 {
    let mut b = b.wrapping_sub(1) ^ magic;
    let fb = b & 0x80;
    let lb = b & 0x01;
    b = b.wrapping_sub(fb).wrapping_sub(lb);
    b |= lb << 7;
    b |= fb >> 7;
    b
}

/// Swizzle a whole payload
pub fn swizzle(payload: &[u8], magic: u8) -> Vec<u8> {
    payload.iter().map(|&b| swizzle_byte(b, magic)).collect()
}

/// Unswizzle a whole payload
pub fn unswizzle(payload: &[u8], magic: u8) -> Vec<u8> {
    payload.iter().map(|&b| unswizzle_byte(b, magic)).collect()
}

fn pack_35(mut value: i64) -> [u8; 5] {
    let mut out = [0u8; 5];
    for slot in out.iter_mut().rev() {
        *slot = (value & 0x7F) as u8;
        value >>= 7;
    }
    out
}

fn to_microns(value_mm: f64) -> i64 {
    (value_mm * 1000.0).round() as i64
}

/// Encode an absolute coordinate in mm
///
/// Negative values come out as 35-bit two's complement, so small negatives
/// start with 0x7F.
pub fn encode_coord(value_mm: f64) -> [u8; 5] {
    pack_35(to_microns(value_mm))
}

/// Encode a signed offset for `80 03` Z moves
///
/// Negative offsets use 32-bit two's complement, matching what LightBurn
/// writes: -2.0 mm packs to `0f 7f 7f 70 30`.
pub fn encode_signed_offset(value_mm: f64) -> [u8; 5] {
    let mut microns = to_microns(value_mm);
    if microns < 0 {
        microns &= 0xFFFF_FFFF;
    }
    pack_35(microns)
}

/// Encode an unsigned value into 5 packed bytes
pub fn encode_uint35(value: u64) -> [u8; 5] {
    pack_35((value & 0x7_FFFF_FFFF) as i64)
}

/// Encode an unsigned value into 2 packed bytes
pub fn encode_u14(value: u16) -> [u8; 2] {
    [((value >> 7) & 0x7F) as u8, (value & 0x7F) as u8]
}

/// Encode a relative coordinate (14-bit two's complement microns)
pub fn encode_rel_coord(value_mm: f64) -> [u8; 2] {
    let v = to_microns(value_mm) & 0x3FFF;
    [((v >> 7) & 0x7F) as u8, (v & 0x7F) as u8]
}

/// True when `delta_mm` fits the relative coordinate range
pub fn fits_rel_coord(delta_mm: f64) -> bool {
    to_microns(delta_mm).abs() <= to_microns(REL_COORD_LIMIT_MM)
}

/// Encode a power percentage; input is clamped to [0, 100]
pub fn encode_power(power_pct: f64) -> [u8; 2] {
    let clamped = power_pct.clamp(0.0, 100.0);
    let raw = (clamped * (POWER_FULL_SCALE / 100.0)).round() as u16;
    [((raw >> 7) & 0x7F) as u8, (raw & 0x7F) as u8]
}

/// Encode a NUL-terminated 7-bit string
pub fn encode_cstring(text: &str) -> Vec<u8> {
    let mut out: Vec<u8> = text.bytes().map(|b| b & 0x7F).filter(|&b| b != 0).collect();
    out.push(0);
    out
}

/// Decode a signed packed integer of any width
pub fn decode_int(data: &[u8]) -> i64 {
    let Some(&head) = data.first() else {
        return 0;
    };
    let mut first = head;
    // LightBurn writes 32-bit two's complement into 35-bit fields
    if data.len() == 5 && first & 0x40 == 0 && first & 0x08 != 0 {
        tracing::debug!("LightBurn 35 bit signed integer workaround on {:02x}", head);
        first |= 0x70;
    }

    let mut value: i64 = 0;
    let mut mask: i64 = 0;
    for (i, &b) in data.iter().enumerate() {
        let b = if i == 0 { first & 0x3F } else { b & 0x7F };
        value = (value << 7) + i64::from(b);
        mask = (mask << 7) + 0x7F;
    }
    if first & 0x40 != 0 {
        value = -((!value & (mask >> 1)) + 1);
    }
    value
}

/// Decode an unsigned packed integer of any width
pub fn decode_uint(data: &[u8]) -> u64 {
    data.iter()
        .fold(0u64, |acc, &b| (acc << 7) + u64::from(b & 0x7F))
}

/// Decode a coordinate (absolute or relative) to mm
pub fn decode_coord(data: &[u8]) -> f64 {
    decode_int(data) as f64 / 1000.0
}

/// Decode a 14-bit relative coordinate to mm
pub fn decode_rel_coord(data: &[u8]) -> f64 {
    decode_coord(&data[..data.len().min(2)])
}

/// Decode a 14-bit power field to a percentage
pub fn decode_power(data: &[u8]) -> f64 {
    decode_uint(data) as f64 * 100.0 / POWER_FULL_SCALE
}

/// Decode the big-endian machine status word
pub fn decode_status_bits(payload: &[u8]) -> u32 {
    payload
        .iter()
        .take(4)
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

/// 16-bit sum of the bytes
pub fn checksum_value(data: &[u8]) -> u16 {
    data.iter()
        .fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b))) as u16
}

/// Big-endian packet checksum; computed over swizzled bytes, not itself swizzled
pub fn checksum(data: &[u8]) -> [u8; 2] {
    checksum_value(data).to_be_bytes()
}

/// Check a checksum-prefixed chunk
pub fn verify_chunk(chunk: &[u8]) -> bool {
    chunk.len() >= 2 && chunk[..2] == checksum(&chunk[2..])
}

/// Space separated lowercase hex, for log lines
pub fn hex_string(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
