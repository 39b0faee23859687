//! RD job generation
//!
//! Turns a list of straight-line moves into an unswizzled RD program: a
//! header describing the layers and extents, a body of motion commands, and
//! a trailer carrying the distance totals and the file checksum. Swizzling
//! is left to the caller so the same payload can be sent over UDP or saved.

use crate::codec::{
    encode_coord, encode_cstring, encode_power, encode_rel_coord, encode_signed_offset,
    encode_uint35, REL_COORD_LIMIT_MM,
};
use crate::tables::{ADDR_DISTANCES, EOF, FILE_COMMAND, FILE_SUM, SETTING, SETTING_WRITE};
use ruidakit_core::JobError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Relative moves allowed between absolute ones
pub const DEFAULT_FORCE_ABSOLUTE_EVERY: usize = 32;

/// Layers addressable by a one-byte part index
pub const MAX_LAYERS: usize = 0x80;

/// Z changes below this are ignored
const Z_TOLERANCE_MM: f64 = 1e-6;

/// Colors assigned to layers in order, as 0xRRGGBB
pub const LAYER_COLORS: [u32; 8] = [
    0x00_00_00, 0x00_00_FF, 0xFF_00_00, 0x00_E0_00, 0xD0_D0_00, 0xFF_80_00, 0x00_E0_E0, 0xFF_00_FF,
];

/// One straight-line step of a job
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Move {
    /// Target X in mm
    pub x: f64,
    /// Target Y in mm
    pub y: f64,
    pub speed_mm_s: f64,
    pub power_pct: f64,
    pub is_cut: bool,
    /// Absolute Z to reach before the XY step
    #[serde(default)]
    pub z: Option<f64>,
}

impl Move {
    /// Laser-off move
    pub fn travel(x: f64, y: f64, speed_mm_s: f64) -> Self {
        Self {
            x,
            y,
            speed_mm_s,
            power_pct: 0.0,
            is_cut: false,
            z: None,
        }
    }

    /// Laser-on move
    pub fn cut(x: f64, y: f64, speed_mm_s: f64, power_pct: f64) -> Self {
        Self {
            x,
            y,
            speed_mm_s,
            power_pct,
            is_cut: true,
            z: None,
        }
    }

    pub fn with_z(mut self, z: f64) -> Self {
        self.z = Some(z);
        self
    }

    /// A cut with no power is treated as a travel move
    pub fn normalized(&self) -> Self {
        if self.is_cut && self.power_pct <= 0.0 {
            Self {
                power_pct: 0.0,
                is_cut: false,
                ..*self
            }
        } else {
            *self
        }
    }
}

/// Axis-aligned extents in mm
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    pub fn include(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// `[min_x, min_y, max_x, max_y]`
    pub fn as_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

fn include(bbox: &mut Option<BoundingBox>, x: f64, y: f64) {
    match bbox {
        Some(b) => b.include(x, y),
        None => *bbox = Some(BoundingBox::at(x, y)),
    }
}

/// Extents of every vertex of the path
pub fn bounding_box(moves: &[Move]) -> Option<BoundingBox> {
    let mut bbox = None;
    for m in moves {
        include(&mut bbox, m.x, m.y);
    }
    bbox
}

/// Expand a min/max power list to the four laser pairs a layer carries
pub fn pad_powers(powers: &[f64]) -> [f64; 8] {
    let mut out = [0.0; 8];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = if let Some(&p) = powers.get(i) {
            p
        } else if powers.len() >= 2 {
            powers[powers.len() - 2 + i % 2]
        } else {
            powers.last().copied().unwrap_or(0.0)
        };
    }
    out
}

/// Cut settings shared by a group of moves
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layer {
    pub speed_mm_s: f64,
    /// Min/max power for lasers 1 to 4
    pub powers: [f64; 8],
    pub color: u32,
    pub bbox: BoundingBox,
}

fn microns(mm: f64) -> i64 {
    (mm * 1000.0).round() as i64
}

type LayerKey = (i64, [u8; 2]);

fn layer_key(m: &Move) -> LayerKey {
    (microns(m.speed_mm_s), encode_power(m.power_pct))
}

/// Layers in order of first use, plus the layer index of every move
///
/// Travel moves carry the index of the layer that was active before them.
fn assign_layers(moves: &[Move], overall: BoundingBox) -> (Vec<Layer>, Vec<usize>) {
    let mut keys: Vec<LayerKey> = Vec::new();
    let mut layers: Vec<Layer> = Vec::new();
    let mut indices = Vec::with_capacity(moves.len());
    let mut current = 0;
    let mut previous: Option<(f64, f64)> = None;

    for m in moves {
        if m.is_cut {
            let key = layer_key(m);
            let index = match keys.iter().position(|k| *k == key) {
                Some(i) => i,
                None => {
                    keys.push(key);
                    layers.push(Layer {
                        speed_mm_s: m.speed_mm_s,
                        powers: pad_powers(&[m.power_pct, m.power_pct]),
                        color: LAYER_COLORS[(keys.len() - 1) % LAYER_COLORS.len()],
                        bbox: BoundingBox::at(m.x, m.y),
                    });
                    keys.len() - 1
                }
            };
            let bbox = &mut layers[index].bbox;
            bbox.include(m.x, m.y);
            if let Some((px, py)) = previous {
                bbox.include(px, py);
            }
            current = index;
        }
        indices.push(current);
        previous = Some((m.x, m.y));
    }

    if layers.is_empty() {
        let speed = moves.first().map(|m| m.speed_mm_s).unwrap_or(0.0);
        layers.push(Layer {
            speed_mm_s: speed,
            powers: [0.0; 8],
            color: LAYER_COLORS[0],
            bbox: overall,
        });
    }
    (layers, indices)
}

/// RD job builder
///
/// ```
/// use ruidakit_protocol::job::{JobBuilder, Move};
///
/// let payload = JobBuilder::new()
///     .with_air_assist(false)
///     .build(&[Move::travel(0.0, 0.0, 100.0), Move::cut(10.0, 0.0, 20.0, 60.0)])
///     .unwrap();
/// assert_eq!(payload[..2], [0xE6, 0x01]);
/// assert_eq!(payload.last(), Some(&0xD7));
/// ```
#[derive(Debug, Clone)]
pub struct JobBuilder {
    air_assist: bool,
    job_z: Option<f64>,
    start_z: f64,
    force_absolute_every: usize,
    filename: Option<String>,
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl JobBuilder {
    pub fn new() -> Self {
        Self {
            air_assist: true,
            job_z: None,
            start_z: 0.0,
            force_absolute_every: DEFAULT_FORCE_ABSOLUTE_EVERY,
            filename: None,
        }
    }

    pub fn with_air_assist(mut self, enabled: bool) -> Self {
        self.air_assist = enabled;
        self
    }

    /// Absolute Z the whole job runs at
    pub fn with_job_z(mut self, job_z: Option<f64>) -> Self {
        self.job_z = job_z;
        self
    }

    /// Z of the head when the job starts; Z offsets are relative to it
    pub fn with_start_z(mut self, start_z: f64) -> Self {
        self.start_z = start_z;
        self
    }

    /// Emit an absolute move after this many relative ones; 0 means always absolute
    pub fn with_force_absolute_every(mut self, every: usize) -> Self {
        self.force_absolute_every = every;
        self
    }

    pub fn with_filename(mut self, name: impl Into<String>) -> Self {
        self.filename = Some(name.into());
        self
    }

    /// Z of the head once a job built from `moves` has run
    pub fn end_z(&self, moves: &[Move]) -> f64 {
        moves
            .iter()
            .rev()
            .find_map(|m| m.z)
            .or(self.job_z)
            .unwrap_or(self.start_z)
    }

    /// Build the unswizzled RD payload
    ///
    /// Fails when the moves need more layers than a part index can address.
    pub fn build(&self, moves: &[Move]) -> Result<Vec<u8>, JobError> {
        let moves: Vec<Move> = moves.iter().map(Move::normalized).collect();
        let Some(bbox) = bounding_box(&moves) else {
            return Ok(Vec::new());
        };
        let (layers, indices) = assign_layers(&moves, bbox);
        if layers.len() > MAX_LAYERS {
            return Err(JobError::TooManyLayers {
                count: layers.len(),
                max: MAX_LAYERS,
            });
        }

        let mut out = Vec::new();
        self.generate_header(&mut out, bbox, &layers);
        let totals = self.generate_body(&mut out, &moves, &indices);
        generate_trailer(&mut out, totals);

        debug!(
            "Built RD job: {} moves, {} layers, {} bytes",
            moves.len(),
            layers.len(),
            out.len()
        );
        Ok(out)
    }

    fn generate_header(&self, out: &mut Vec<u8>, bbox: BoundingBox, layers: &[Layer]) {
        out.extend_from_slice(&[0xE6, 0x01]);
        if let Some(name) = &self.filename {
            out.extend_from_slice(&[0xE7, 0x01]);
            out.extend_from_slice(&encode_cstring(name));
        }
        push_xy(out, &[0xE7, 0x03], bbox.min_x, bbox.min_y);
        push_xy(out, &[0xE7, 0x07], bbox.max_x, bbox.max_y);
        push_xy(out, &[0xE7, 0x50], bbox.min_x, bbox.min_y);
        push_xy(out, &[0xE7, 0x51], bbox.max_x, bbox.max_y);
        out.extend_from_slice(&[0xF1, 0x02, 0x00]);

        const POWER_SUBS: [u8; 8] = [0x31, 0x32, 0x41, 0x42, 0x35, 0x36, 0x37, 0x38];
        for (i, layer) in layers.iter().enumerate() {
            let part = i as u8;
            out.extend_from_slice(&[0xC9, 0x04, part]);
            out.extend_from_slice(&encode_coord(layer.speed_mm_s));
            for (sub, power) in POWER_SUBS.iter().zip(layer.powers) {
                out.extend_from_slice(&[0xC6, *sub, part]);
                out.extend_from_slice(&encode_power(power));
            }
            out.extend_from_slice(&[0xCA, 0x06, part]);
            out.extend_from_slice(&encode_uint35(u64::from(layer.color)));
            out.extend_from_slice(&[0xCA, 0x41, part, 0x00]);
            push_xy(out, &[0xE7, 0x52, part], layer.bbox.min_x, layer.bbox.min_y);
            push_xy(out, &[0xE7, 0x53, part], layer.bbox.max_x, layer.bbox.max_y);
            push_xy(out, &[0xE7, 0x61, part], layer.bbox.min_x, layer.bbox.min_y);
            push_xy(out, &[0xE7, 0x62, part], layer.bbox.max_x, layer.bbox.max_y);
        }
        let last = layers.len().saturating_sub(1) as u8;
        out.extend_from_slice(&[0xCA, 0x22, last]);
    }

    /// Emit the motion commands; returns the cut and travel lengths in microns
    fn generate_body(&self, out: &mut Vec<u8>, moves: &[Move], layers: &[usize]) -> (u64, u64) {
        let first_layer = moves
            .iter()
            .zip(layers)
            .find(|(m, _)| m.is_cut)
            .map(|(_, &l)| l)
            .unwrap_or(0);
        let mut current_layer = first_layer;
        out.extend_from_slice(&[0xCA, 0x02, first_layer as u8]);
        let air = if self.air_assist { 0x13 } else { 0x12 };
        out.extend_from_slice(&[0xCA, 0x01, air]);

        let mut z_cursor = self.start_z;
        if let Some(job_z) = self.job_z {
            if (job_z - z_cursor).abs() > Z_TOLERANCE_MM {
                push_z_offset(out, job_z - z_cursor);
                z_cursor = job_z;
            }
        }

        let mut speed: Option<i64> = None;
        let mut power: Option<[u8; 2]> = None;
        let mut position: Option<(i64, i64)> = None;
        let mut relative_run = 0usize;
        let mut cut_um = 0.0f64;
        let mut travel_um = 0.0f64;

        for (m, &layer) in moves.iter().zip(layers) {
            if m.is_cut && layer != current_layer {
                out.extend_from_slice(&[0xCA, 0x02, layer as u8]);
                current_layer = layer;
            }
            let speed_um = microns(m.speed_mm_s);
            if speed != Some(speed_um) {
                out.extend_from_slice(&[0xC9, 0x02]);
                out.extend_from_slice(&encode_coord(m.speed_mm_s));
                speed = Some(speed_um);
            }
            if m.is_cut {
                let p = encode_power(m.power_pct);
                if power != Some(p) {
                    out.extend_from_slice(&[0xC6, 0x01]);
                    out.extend_from_slice(&p);
                    out.extend_from_slice(&[0xC6, 0x02]);
                    out.extend_from_slice(&p);
                    power = Some(p);
                }
            }
            if let Some(z) = m.z {
                if (z - z_cursor).abs() > Z_TOLERANCE_MM {
                    push_z_offset(out, z - z_cursor);
                    z_cursor = z;
                }
            }

            let target = (microns(m.x), microns(m.y));
            let Some(from) = position else {
                push_absolute(out, m);
                position = Some(target);
                continue;
            };
            let (dx, dy) = (target.0 - from.0, target.1 - from.1);
            if dx == 0 && dy == 0 {
                continue;
            }
            let length = ((dx * dx + dy * dy) as f64).sqrt();
            if m.is_cut {
                cut_um += length;
            } else {
                travel_um += length;
            }

            let limit = microns(REL_COORD_LIMIT_MM);
            let relative = self.force_absolute_every > 0
                && relative_run < self.force_absolute_every
                && dx.abs() <= limit
                && dy.abs() <= limit;
            if relative {
                push_relative(out, m.is_cut, dx, dy);
                relative_run += 1;
            } else {
                push_absolute(out, m);
                relative_run = 0;
            }
            position = Some(target);
        }
        (cut_um.round() as u64, travel_um.round() as u64)
    }
}

fn generate_trailer(out: &mut Vec<u8>, (cut_um, travel_um): (u64, u64)) {
    out.push(0xEB);
    out.extend_from_slice(&[0xE7, 0x00]);
    out.extend_from_slice(&[SETTING, SETTING_WRITE]);
    out.extend_from_slice(&ADDR_DISTANCES.to_be_bytes());
    out.extend_from_slice(&encode_uint35(cut_um));
    out.extend_from_slice(&encode_uint35(travel_um));

    let sum = file_sum(out);
    out.extend_from_slice(&[FILE_COMMAND, FILE_SUM]);
    out.extend_from_slice(&encode_uint35(sum));
    out.push(EOF);
}

/// Byte sum carried by `E5 05`: everything before it plus the EOF byte
pub fn file_sum(body: &[u8]) -> u64 {
    body.iter().map(|&b| u64::from(b)).sum::<u64>() + u64::from(EOF)
}

fn push_xy(out: &mut Vec<u8>, prefix: &[u8], x: f64, y: f64) {
    out.extend_from_slice(prefix);
    out.extend_from_slice(&encode_coord(x));
    out.extend_from_slice(&encode_coord(y));
}

fn push_z_offset(out: &mut Vec<u8>, delta_mm: f64) {
    out.extend_from_slice(&[0x80, 0x03]);
    out.extend_from_slice(&encode_signed_offset(delta_mm));
}

fn push_absolute(out: &mut Vec<u8>, m: &Move) {
    let opcode = if m.is_cut { 0xA8 } else { 0x88 };
    push_xy(out, &[opcode], m.x, m.y);
}

fn push_relative(out: &mut Vec<u8>, is_cut: bool, dx: i64, dy: i64) {
    let base = if is_cut { 0xA8 } else { 0x88 };
    let rel = |um: i64| encode_rel_coord(um as f64 / 1000.0);
    if dy == 0 {
        out.push(base + 2);
        out.extend_from_slice(&rel(dx));
    } else if dx == 0 {
        out.push(base + 3);
        out.extend_from_slice(&rel(dy));
    } else {
        out.push(base + 1);
        out.extend_from_slice(&rel(dx));
        out.extend_from_slice(&rel(dy));
    }
}

/// Build a job with the common options
pub fn build_job(
    moves: &[Move],
    job_z: Option<f64>,
    air_assist: bool,
) -> Result<Vec<u8>, JobError> {
    JobBuilder::new()
        .with_air_assist(air_assist)
        .with_job_z(job_z)
        .build(moves)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_empty_job_is_empty() {
        assert!(build_job(&[], Some(5.0), true).unwrap().is_empty());
    }

    #[test]
    fn test_normalize_zero_power_cut() {
        let m = Move::cut(1.0, 2.0, 10.0, 0.0).normalized();
        assert!(!m.is_cut);
        let m = Move::cut(1.0, 2.0, 10.0, -3.0).normalized();
        assert!(!m.is_cut);
        assert_eq!(m.power_pct, 0.0);
        assert!(Move::cut(1.0, 2.0, 10.0, 0.1).normalized().is_cut);
    }

    #[test]
    fn test_pad_powers() {
        assert_eq!(pad_powers(&[10.0, 20.0]), [10.0, 20.0, 10.0, 20.0, 10.0, 20.0, 10.0, 20.0]);
        assert_eq!(
            pad_powers(&[1.0, 2.0, 3.0, 4.0]),
            [1.0, 2.0, 3.0, 4.0, 3.0, 4.0, 3.0, 4.0]
        );
        assert_eq!(pad_powers(&[5.0]), [5.0; 8]);
        assert_eq!(pad_powers(&[]), [0.0; 8]);
    }

    #[test]
    fn test_layers_by_speed_and_power() {
        let moves = [
            Move::travel(0.0, 0.0, 100.0),
            Move::cut(10.0, 0.0, 20.0, 50.0),
            Move::cut(10.0, 10.0, 30.0, 50.0),
            Move::cut(0.0, 10.0, 20.0, 50.0),
        ];
        let (layers, indices) = assign_layers(&moves, BoundingBox::at(0.0, 0.0));
        assert_eq!(layers.len(), 2);
        assert_eq!(indices, vec![0, 0, 1, 0]);
        assert_eq!(layers[0].bbox.as_array(), [0.0, 0.0, 10.0, 10.0]);
        assert_eq!(layers[1].color, LAYER_COLORS[1]);
    }

    #[test]
    fn test_travel_only_job_has_one_zero_power_layer() {
        let moves = [Move::travel(0.0, 0.0, 80.0), Move::travel(5.0, 5.0, 80.0)];
        let (layers, _) = assign_layers(&moves, bounding_box(&moves).unwrap());
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].powers, [0.0; 8]);
        assert_eq!(layers[0].speed_mm_s, 80.0);
    }

    #[test]
    fn test_layout_frame() {
        let payload = JobBuilder::new()
            .with_air_assist(false)
            .build(&[Move::travel(0.0, 0.0, 100.0), Move::cut(1.0, 0.0, 20.0, 50.0)])
            .unwrap();
        assert_eq!(payload[..2], [0xE6, 0x01]);
        assert!(contains(&payload, &[0xF1, 0x02, 0x00]));
        assert!(contains(&payload, &[0xCA, 0x22, 0x00]));
        assert!(contains(&payload, &[0xCA, 0x01, 0x12]));
        assert_eq!(payload.last(), Some(&EOF));

        let sum_at = payload.len() - 8;
        assert_eq!(payload[sum_at..sum_at + 2], [FILE_COMMAND, FILE_SUM]);
        let expected = file_sum(&payload[..sum_at]);
        assert_eq!(payload[sum_at + 2..sum_at + 7], encode_uint35(expected));
    }

    #[test]
    fn test_relative_moves_and_forced_absolute() {
        let moves = [
            Move::travel(0.0, 0.0, 100.0),
            Move::cut(1.0, 0.0, 100.0, 50.0),
            Move::cut(1.0, 1.0, 100.0, 50.0),
            Move::cut(2.0, 2.0, 100.0, 50.0),
        ];
        let payload = JobBuilder::new().build(&moves).unwrap();
        assert!(contains(&payload, &[0xAA, 0x07, 0x68]));
        assert!(contains(&payload, &[0xAB, 0x07, 0x68]));
        assert!(contains(&payload, &[0xA9, 0x07, 0x68, 0x07, 0x68]));

        let payload = JobBuilder::new()
            .with_force_absolute_every(0)
            .build(&moves)
            .unwrap();
        assert!(!contains(&payload, &[0xAA]));
        assert!(!contains(&payload, &[0xA9]));
    }

    #[test]
    fn test_long_step_is_absolute() {
        let moves = [Move::travel(0.0, 0.0, 100.0), Move::travel(20.0, 0.0, 100.0)];
        let payload = JobBuilder::new().build(&moves).unwrap();
        let mut abs = vec![0x88];
        abs.extend_from_slice(&encode_coord(20.0));
        abs.extend_from_slice(&encode_coord(0.0));
        assert!(contains(&payload, &abs));
    }

    #[test]
    fn test_job_z_offset_from_start_z() {
        let moves = [Move::travel(0.0, 0.0, 100.0)];
        let payload = JobBuilder::new()
            .with_job_z(Some(3.0))
            .with_start_z(1.0)
            .build(&moves)
            .unwrap();
        let mut offset = vec![0x80, 0x03];
        offset.extend_from_slice(&encode_signed_offset(2.0));
        assert!(contains(&payload, &offset));

        let payload = JobBuilder::new()
            .with_job_z(Some(1.0))
            .with_start_z(1.0)
            .build(&moves)
            .unwrap();
        assert!(!contains(&payload, &[0x80, 0x03]));
    }

    #[test]
    fn test_layer_limit() {
        let cuts = |n: usize| -> Vec<Move> {
            (0..n)
                .map(|i| Move::cut(i as f64, 0.0, 10.0 + i as f64, 50.0))
                .collect()
        };
        let payload = JobBuilder::new().build(&cuts(MAX_LAYERS)).unwrap();
        assert!(contains(&payload, &[0xCA, 0x22, 0x7F]));

        let err = JobBuilder::new().build(&cuts(MAX_LAYERS + 1)).unwrap_err();
        assert!(matches!(
            err,
            JobError::TooManyLayers { count: 129, max: 128 }
        ));
    }

    #[test]
    fn test_end_z() {
        let moves = [Move::travel(0.0, 0.0, 100.0), Move::travel(1.0, 0.0, 5.0).with_z(4.0)];
        let builder = JobBuilder::new().with_start_z(1.0);
        assert_eq!(builder.end_z(&moves[..1]), 1.0);
        assert_eq!(builder.clone().with_job_z(Some(2.0)).end_z(&moves[..1]), 2.0);
        assert_eq!(builder.with_job_z(Some(2.0)).end_z(&moves), 4.0);
    }

    #[test]
    fn test_filename() {
        let payload = JobBuilder::new()
            .with_filename("DOVE")
            .build(&[Move::travel(0.0, 0.0, 10.0)])
            .unwrap();
        assert_eq!(payload[2..9], [0xE7, 0x01, b'D', b'O', b'V', b'E', 0x00]);
    }
}
