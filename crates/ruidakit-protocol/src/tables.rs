//! Static protocol tables
//!
//! The decoder is driven entirely by these tables. Opcodes map to a label,
//! a nested sub-table, an option lookup, or a parameter list. Memory and
//! index tables describe the values returned by `DA` reads, keyed by the
//! two 7-bit address bytes (`0x0400` is sent as `04 00`).

use std::fmt;

/// Controller accepted the packet
pub const ACK: u8 = 0xCC;
/// Alternate ACK seen from some firmwares
pub const ACK_ALT: u8 = 0xC6;
/// Checksum mismatch, resend
pub const NACK: u8 = 0xCF;
/// Alternate NACK
pub const NACK_ALT: u8 = 0x46;
/// Controller detected an error in the message
pub const ERR: u8 = 0xCD;
/// Keep alive
pub const ENQ: u8 = 0xCE;
/// End of an RD file
pub const EOF: u8 = 0xD7;

/// Panel key press/release prefix
pub const KEYPAD: u8 = 0xA5;
/// Keypad command prefix on the action port
pub const KEYPRESS: u8 = 0xA7;
/// Memory/setting access
pub const SETTING: u8 = 0xDA;
/// File commands
pub const FILE_COMMAND: u8 = 0xE5;

/// Read a memory value
pub const SETTING_READ: u8 = 0x00;
/// Write a memory value (or the controller's read reply)
pub const SETTING_WRITE: u8 = 0x01;
/// Indexed read
pub const SETTING_INDEX: u8 = 0x05;
/// `E5 05` file checksum field
pub const FILE_SUM: u8 = 0x05;

/// Opcodes that leave file checksum accumulation disabled
pub const CHECKSUM_EXEMPT: [u8; 2] = [KEYPRESS, SETTING];

/// Single-byte handshake replies
pub fn is_handshake(b: u8) -> bool {
    matches!(b, ACK | ACK_ALT | NACK | NACK_ALT | ERR | ENQ)
}

/// How a field's bytes are accumulated and converted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Signed 7-bit value
    Int7,
    /// Unsigned 7-bit value
    Uint7,
    /// Unsigned 7-bit value shown as hex
    Hex7,
    /// Non-zero means true
    Bool,
    /// Signed 14-bit value
    Int14,
    /// Unsigned 14-bit value
    Uint14,
    /// Unsigned 14-bit value shown as hex
    Hex14,
    /// Signed 35-bit value
    Int35,
    /// Unsigned 35-bit value
    Uint35,
    /// Unsigned 35-bit value shown as hex
    Hex35,
    /// NUL-terminated string
    CString,
    /// Eight characters packed into two 35-bit values
    String8,
    /// Rapid move option from [`RAPID_OPTIONS`]
    Rapid,
    /// 0xRRGGBB layer color
    Color,
    /// Absolute coordinate in mm
    Coord,
    /// 14-bit relative coordinate in mm
    RelCoord,
    /// Power percentage
    Power,
    /// Speed in mm/s
    Speed,
    /// Frequency in kHz
    Frequency,
    /// Time in ms
    Time,
    /// On/off flag
    Switch,
    /// Controller card id from [`CARD_IDS`]
    CardId,
    /// Memory address into [`MEMORY_TABLE`]
    Memory,
    /// Index address into [`INDEX_TABLE`]
    Index,
    /// File checksum carried by `E5 05`
    FileSum,
    /// Unknown layout; reads until the next command byte or end of packet
    Tbd,
}

impl FieldKind {
    /// Fixed byte count, or `None` for open-ended kinds
    pub const fn byte_count(&self) -> Option<usize> {
        match self {
            Self::Int7 | Self::Uint7 | Self::Hex7 | Self::Bool | Self::Rapid | Self::Switch => {
                Some(1)
            }
            Self::Int14 | Self::Uint14 | Self::Hex14 | Self::RelCoord | Self::Power => Some(2),
            Self::Memory | Self::Index => Some(2),
            Self::Int35
            | Self::Uint35
            | Self::Hex35
            | Self::Color
            | Self::Coord
            | Self::Speed
            | Self::Frequency
            | Self::Time
            | Self::CardId
            | Self::FileSum => Some(5),
            Self::String8 => Some(10),
            Self::CString | Self::Tbd => None,
        }
    }
}

/// One parameter slot of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Text printed before the value
    pub prefix: &'static str,
    /// Decoding rule
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn new(prefix: &'static str, kind: FieldKind) -> Self {
        Self { prefix, kind }
    }
}

/// A protocol table entry
#[derive(Debug, Clone, Copy)]
pub enum Entry {
    /// Command with no parameters
    Label(&'static str),
    /// Nested sub-opcode table
    Table(&'static [(u8, Entry)]),
    /// One option byte selects the label; the string is a label prefix
    Options(&'static str, &'static [(u8, &'static str)]),
    /// Command followed by parameters
    Params(&'static str, &'static [FieldSpec]),
    /// Command followed by parameters and then a controller reply
    Query(&'static str, &'static [FieldSpec], FieldSpec),
    /// Bytes that follow are passed over without parsing
    Skip(&'static str, usize),
}

impl Entry {
    /// Label of a terminal entry
    pub fn label(&self) -> Option<&'static str> {
        match self {
            Self::Label(l) | Self::Params(l, _) | Self::Query(l, _, _) | Self::Skip(l, _) => {
                Some(l)
            }
            Self::Options(_, _) | Self::Table(_) => None,
        }
    }
}

/// Value layout at a controller memory or index address
#[derive(Debug, Clone, Copy)]
pub struct MemEntry {
    pub label: &'static str,
    pub fields: &'static [FieldSpec],
}

const fn mem(label: &'static str, fields: &'static [FieldSpec]) -> MemEntry {
    MemEntry { label, fields }
}

/// Which table a `DA` read resolves against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressTable {
    Memory,
    Index,
}

impl AddressTable {
    pub fn entries(&self) -> &'static [(u16, MemEntry)] {
        match self {
            Self::Memory => MEMORY_TABLE,
            Self::Index => INDEX_TABLE,
        }
    }

    pub fn lookup(&self, address: u16) -> Option<&'static MemEntry> {
        self.entries()
            .iter()
            .find(|(a, _)| *a == address)
            .map(|(_, e)| e)
    }
}

impl fmt::Display for AddressTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Index => write!(f, "index"),
        }
    }
}

/// Find `key` in a table
pub fn lookup(table: &'static [(u8, Entry)], key: u8) -> Option<&'static Entry> {
    table.iter().find(|(k, _)| *k == key).map(|(_, e)| e)
}

/// Find `key` in an option table
pub fn lookup_option(options: &'static [(u8, &'static str)], key: u8) -> Option<&'static str> {
    options.iter().find(|(k, _)| *k == key).map(|(_, l)| *l)
}

/// Model name for a card id reply
pub fn card_name(id: u64) -> Option<&'static str> {
    CARD_IDS.iter().find(|(k, _)| *k == id).map(|(_, n)| *n)
}

// Field specs

const UINT7: FieldSpec = FieldSpec::new("", FieldKind::Uint7);
const HEX14: FieldSpec = FieldSpec::new("", FieldKind::Hex14);
const INT14: FieldSpec = FieldSpec::new("", FieldKind::Int14);
const UINT14: FieldSpec = FieldSpec::new("", FieldKind::Uint14);
const INT35: FieldSpec = FieldSpec::new("", FieldKind::Int35);
const UINT35: FieldSpec = FieldSpec::new("", FieldKind::Uint35);
const FNAME: FieldSpec = FieldSpec::new("File:", FieldKind::CString);
const STRING8: FieldSpec = FieldSpec::new("String:", FieldKind::String8);
const FNUM: FieldSpec = FieldSpec::new("FNum:", FieldKind::Uint14);
const PART: FieldSpec = FieldSpec::new("Part:", FieldKind::Uint7);
const LASER: FieldSpec = FieldSpec::new("Laser:", FieldKind::Uint7);
const VALUE: FieldSpec = FieldSpec::new("", FieldKind::Int7);
const RAPID: FieldSpec = FieldSpec::new("Option:", FieldKind::Rapid);
const COLOR: FieldSpec = FieldSpec::new("Color:", FieldKind::Color);
const ID: FieldSpec = FieldSpec::new("ID:", FieldKind::Uint14);
const DIRECTION: FieldSpec = FieldSpec::new("Dir:", FieldKind::Int7);
const ABS: FieldSpec = FieldSpec::new("ABS=", FieldKind::Coord);
const X_ABS: FieldSpec = FieldSpec::new("X=", FieldKind::Coord);
const Y_ABS: FieldSpec = FieldSpec::new("Y=", FieldKind::Coord);
const Z_ABS: FieldSpec = FieldSpec::new("Z=", FieldKind::Coord);
const A_ABS: FieldSpec = FieldSpec::new("A=", FieldKind::Coord);
const U_ABS: FieldSpec = FieldSpec::new("U=", FieldKind::Coord);
const X_REL: FieldSpec = FieldSpec::new("RelX=", FieldKind::RelCoord);
const Y_REL: FieldSpec = FieldSpec::new("RelY=", FieldKind::RelCoord);
const Z_OFFSET: FieldSpec = FieldSpec::new("dZ=", FieldKind::Coord);
const POWER: FieldSpec = FieldSpec::new("Power:", FieldKind::Power);
const SPEED: FieldSpec = FieldSpec::new("Speed:", FieldKind::Speed);
const FREQUENCY: FieldSpec = FieldSpec::new("Freq:", FieldKind::Frequency);
const TIME: FieldSpec = FieldSpec::new("", FieldKind::Time);
const SWITCH: FieldSpec = FieldSpec::new("State:", FieldKind::Switch);
const CARD_ID: FieldSpec = FieldSpec::new("CardID:", FieldKind::CardId);
const MEMORY: FieldSpec = FieldSpec::new("Addr:", FieldKind::Memory);
const INDEX: FieldSpec = FieldSpec::new("Index:", FieldKind::Index);
const SUM: FieldSpec = FieldSpec::new("Sum:", FieldKind::FileSum);
const TBD: FieldSpec = FieldSpec::new("TBD:", FieldKind::Tbd);
const TBDU35: FieldSpec = FieldSpec::new("TBDU35:", FieldKind::Hex35);
const TBD35: FieldSpec = FieldSpec::new("TBD35:", FieldKind::Int35);

/// Layout used for addresses missing from the tables
pub const UNKNOWN_ADDRESS: MemEntry = mem("TBD:Unknown address", &[TBD]);

/// Rapid move options
pub static RAPID_OPTIONS: &[(u8, &str)] = &[
    (0x00, "RAPID_ORIGIN"),
    (0x01, "RAPID_LIGHT_ORIGIN"),
    (0x02, "RAPID_NONE"),
    (0x03, "RAPID_LIGHT"),
];

/// Known controller card ids
pub static CARD_IDS: &[(u64, &str)] = &[(0x6510_6510, "RDC6442S")];

/// Control panel keys
pub const KEYS: &[(u8, &str)] = &[
    (0x01, "X_MINUS"),
    (0x02, "X_PLUS"),
    (0x03, "Y_PLUS"),
    (0x04, "Y_MINUS"),
    (0x05, "PULSE"),
    (0x06, "PAUSE"),
    (0x07, "ESCAPE"),
    (0x08, "ORIGIN"),
    (0x09, "STOP"),
    (0x0A, "Z_PLUS"),
    (0x0B, "Z_MINUS"),
    (0x0C, "U_PLUS"),
    (0x0D, "U_MINUS"),
    (0x0E, "?"),
    (0x0F, "TRACE"),
    (0x10, "?"),
    (0x11, "SPEED"),
    (0x12, "LASER_GATE"),
];

/// Key press sub-opcode
pub const KEY_PRESS: u8 = 0x50;
/// Key release sub-opcode
pub const KEY_RELEASE: u8 = 0x51;
/// Interface sub-opcode
pub const KEY_INTERFACE: u8 = 0x53;

/// Keypad table, shared by the panel port and the action port
pub const KEYPAD_TABLE: &[(u8, Entry)] = &[
    (KEY_PRESS, Entry::Options("PRESS_", KEYS)),
    (KEY_RELEASE, Entry::Options("RELEASE_", KEYS)),
    (KEY_INTERFACE, Entry::Options("", &[(0x00, "INTERFACE_FRAME")])),
];

/// Look up a key code by name
pub fn key_code(name: &str) -> Option<u8> {
    KEYS.iter()
        .find(|(_, n)| n.eq_ignore_ascii_case(name))
        .map(|(k, _)| *k)
}

/// Controller reply table
pub static REPLY_TABLE: &[(u8, Entry)] = &[(
    SETTING,
    Entry::Table(&[
        (SETTING_WRITE, Entry::Params("GET_SETTING", &[MEMORY])),
        (SETTING_INDEX, Entry::Params("TBD", &[INDEX])),
    ]),
)];

/// Index table; what these index is not known
pub static INDEX_TABLE: &[(u16, MemEntry)] = &[(
    0x0000,
    mem(
        "TBD",
        &[HEX14, HEX14, HEX14, HEX14, HEX14, HEX14, HEX14, HEX14, HEX14],
    ),
)];

/// Machine status word
pub const ADDR_STATUS: u16 = 0x0400;
/// Current X position
pub const ADDR_POS_X: u16 = 0x0421;
/// Current Y position
pub const ADDR_POS_Y: u16 = 0x0431;
/// Current Z position
pub const ADDR_POS_Z: u16 = 0x0441;
/// Current U position
pub const ADDR_POS_U: u16 = 0x0451;
/// Card id
pub const ADDR_CARD_ID: u16 = 0x057E;
/// Cut/travel distance totals written by the job trailer
pub const ADDR_DISTANCES: u16 = 0x0620;

const T: &[FieldSpec] = &[TBD];
const U35: &[FieldSpec] = &[TBDU35];

/// Controller memory, readable with `DA 00`
pub static MEMORY_TABLE: &[(u16, MemEntry)] = &[
    (0x0004, mem("IO Enable", U35)),
    (0x0005, mem("G0 Velocity", T)),
    (0x000B, mem("Eng Facula", T)),
    (0x000C, mem("Home Velocity", T)),
    (0x000E, mem("Eng Vert Velocity", T)),
    (0x0010, mem("System Control Mode", T)),
    (0x0011, mem("Laser PWM Frequency 1", T)),
    (0x0012, mem("Laser Min Power 1", T)),
    (0x0013, mem("Laser Max Power 1", T)),
    (0x0016, mem("Laser Attenuation", T)),
    (0x0017, mem("Laser PWM Frequency 2", T)),
    (0x0018, mem("Laser Min Power 2", T)),
    (0x0019, mem("Laser Max Power 2", T)),
    (0x001A, mem("Laser Standby Frequency 1", T)),
    (0x001B, mem("Laser Standby Pulse 1", T)),
    (0x001C, mem("Laser Standby Frequency 2", T)),
    (0x001D, mem("Laser Standby Pulse 2", T)),
    (0x001E, mem("Auto Type Space", &[TBD35])),
    (0x0020, mem("Axis Control Para 1", T)),
    (0x0021, mem("Axis Precision 1", U35)),
    (0x0023, mem("Axis Max Velocity 1", T)),
    (0x0024, mem("Axis Start Velocity 1", T)),
    (0x0025, mem("Axis Max Acc 1", T)),
    (0x0026, mem("Bed Size X", &[X_ABS])),
    (0x0027, mem("Axis Btn Start Vel 1", T)),
    (0x0028, mem("Axis Btn Acc 1", T)),
    (0x0029, mem("Axis Estp Acc 1", T)),
    (0x002A, mem("Axis Home Offset 1", T)),
    (0x002B, mem("Axis Backlash 1", T)),
    (0x0030, mem("Axis Control Para 2", T)),
    (0x0031, mem("Axis Precision 2", U35)),
    (0x0033, mem("Axis Max Velocity 2", T)),
    (0x0034, mem("Axis Start Velocity 2", T)),
    (0x0035, mem("Axis Max Acc 2", T)),
    (0x0036, mem("Bed Size Y", &[Y_ABS])),
    (0x0037, mem("Axis Btn Start Vel 2", T)),
    (0x0038, mem("Axis Btn Acc 2", T)),
    (0x0039, mem("Axis Estp Acc 2", T)),
    (0x003A, mem("Axis Home Offset 2", T)),
    (0x003B, mem("Axis Backlash 2", T)),
    (0x0040, mem("Axis Control Para 3", T)),
    (0x0041, mem("Axis Precision 3", U35)),
    (0x0043, mem("Axis Max Velocity 3", T)),
    (0x0044, mem("Axis Start Velocity 3", T)),
    (0x0045, mem("Axis Max Acc 3", T)),
    (0x0046, mem("Axis Range 3", T)),
    (0x0047, mem("Axis Btn Start Vel 3", T)),
    (0x0048, mem("Axis Btn Acc 3", T)),
    (0x0049, mem("Axis Estp Acc 3", T)),
    (0x004A, mem("Axis Home Offset 3", T)),
    (0x004B, mem("Axis Backlash 3", T)),
    (0x0050, mem("Axis Control Para 4", T)),
    (0x0051, mem("Axis Precision 4", U35)),
    (0x0053, mem("Axis Max Velocity 4", T)),
    (0x0054, mem("Axis Start Velocity 4", T)),
    (0x0055, mem("Axis Max Acc 4", T)),
    (0x0056, mem("Axis Range 4", T)),
    (0x0057, mem("Axis Btn Start Vel 4", T)),
    (0x0058, mem("Axis Btn Acc 4", T)),
    (0x0059, mem("Axis Estp Acc 4", T)),
    (0x005A, mem("Axis Home Offset 4", T)),
    (0x005B, mem("Axis Backlash 4", T)),
    (0x0060, mem("Machine Type", T)),
    (0x0063, mem("Laser Min Power 3", T)),
    (0x0064, mem("Laser Max Power 3", T)),
    (0x0065, mem("Laser PWM Frequency 3", T)),
    (0x0066, mem("Laser Standby Frequency 3", T)),
    (0x0067, mem("Laser Standby Pulse 3", T)),
    (0x0068, mem("Laser Min Power 4", T)),
    (0x0069, mem("Laser Max Power 4", T)),
    (0x006A, mem("Laser PWM Frequency 4", T)),
    (0x006B, mem("Laser Standby Frequency 4", T)),
    (0x006C, mem("Laser Standby Pulse 4", T)),
    (0x0200, mem("System Settings", T)),
    (0x0201, mem("Turn Velocity", T)),
    (0x0202, mem("Syn Acc", T)),
    (0x0203, mem("G0 Delay", T)),
    (0x0207, mem("Feed Delay After", T)),
    (0x0209, mem("Turn Acc", T)),
    (0x020A, mem("G0 Acc", T)),
    (0x020B, mem("Feed Delay Prior", T)),
    (0x020C, mem("Manual Dis", T)),
    (0x020D, mem("Shut Down Delay", T)),
    (0x020E, mem("Focus Depth", T)),
    (0x020F, mem("Go Scale Blank", T)),
    (0x0217, mem("Array Feed Repay", T)),
    (0x021A, mem("Acc Ratio", T)),
    (0x021B, mem("Turn Ratio", T)),
    (0x021C, mem("Acc G0 Ratio", T)),
    (0x021F, mem("Rotate Pulse", T)),
    (0x0221, mem("Rotate D", T)),
    (0x0224, mem("X Minimum Eng Velocity", T)),
    (0x0225, mem("X Eng Acc", T)),
    (0x0226, mem("User Para 1", U35)),
    (0x0228, mem("Z Home Velocity", T)),
    (0x0229, mem("Z Work Velocity", T)),
    (0x022A, mem("Z G0 Velocity", T)),
    (0x022B, mem("Z Pen Up Position", T)),
    (0x022C, mem("U Home Velocity", T)),
    (0x022D, mem("U Work Velocity", T)),
    (0x0231, mem("Manual Fast Speed", T)),
    (0x0232, mem("Manual Slow Speed", T)),
    (0x0234, mem("Y Minimum Eng Velocity", T)),
    (0x0235, mem("Y Eng Acc", T)),
    (0x0237, mem("Eng Acc Ratio", T)),
    (0x0300, mem("Card Language", T)),
    (0x0301, mem("PC Lock 1", T)),
    (0x0302, mem("PC Lock 2", T)),
    (0x0303, mem("PC Lock 3", T)),
    (0x0304, mem("PC Lock 4", T)),
    (0x0305, mem("PC Lock 5", T)),
    (0x0306, mem("PC Lock 6", T)),
    (0x0307, mem("PC Lock 7", T)),
    (0x0311, mem("Total Laser Work Time", T)),
    (ADDR_STATUS, mem("Machine Status", U35)),
    (0x0401, mem("Total Open Time", T)),
    (0x0402, mem("Total Work Time", T)),
    (0x0403, mem("Total Work Number", T)),
    (0x0405, mem("Total Doc Number", U35)),
    (0x0407, mem("Unknown", U35)),
    (0x0408, mem("Pre Work Time", T)),
    (ADDR_POS_X, mem("Current Position X", &[X_ABS])),
    (0x0423, mem("Total Work Length 1", T)),
    (ADDR_POS_Y, mem("Current Position Y", &[Y_ABS])),
    (0x0433, mem("Total Work Length 2", T)),
    (ADDR_POS_Z, mem("Current Position Z", &[Z_ABS])),
    (0x0443, mem("Total Work Length 3", T)),
    (ADDR_POS_U, mem("Current Position U", &[U_ABS])),
    (0x0453, mem("Total Work Length 4", T)),
    (ADDR_CARD_ID, mem("Card ID", &[CARD_ID])),
    (0x057F, mem("Mainboard Version", T)),
    (ADDR_DISTANCES, UNKNOWN_ADDRESS),
    (0x0710, mem("Document Time", T)),
    (0x0B11, mem("Card Lock", T)),
    (0x0B12, mem("Unknown", &[TBD35])),
];

/// Command table for the action port
pub static COMMAND_TABLE: &[(u8, Entry)] = &[
    (
        0x80,
        Entry::Table(&[
            (0x00, Entry::Params("AXIS_X_MOVE", &[X_ABS])),
            (0x03, Entry::Params("AXIS_Z_OFFSET", &[Z_OFFSET])),
            (0x08, Entry::Params("AXIS_Z_MOVE", &[Z_ABS])),
        ]),
    ),
    (0x88, Entry::Params("MOVE_ABS_XY", &[X_ABS, Y_ABS])),
    (0x89, Entry::Params("MOVE_REL_XY", &[X_REL, Y_REL])),
    (0x8A, Entry::Params("MOVE_REL_X", &[X_REL])),
    (0x8B, Entry::Params("MOVE_REL_Y", &[Y_REL])),
    (
        0xA0,
        Entry::Table(&[
            (0x00, Entry::Params("AXIS_A_MOVE", &[A_ABS])),
            (0x08, Entry::Params("AXIS_U_MOVE", &[U_ABS])),
        ]),
    ),
    (KEYPAD, Entry::Table(KEYPAD_TABLE)),
    (KEYPRESS, Entry::Table(KEYPAD_TABLE)),
    (0xA8, Entry::Params("CUT_ABS_XY", &[X_ABS, Y_ABS])),
    (0xA9, Entry::Params("CUT_REL_XY", &[X_REL, Y_REL])),
    (0xAA, Entry::Params("CUT_REL_X", &[X_REL])),
    (0xAB, Entry::Params("CUT_REL_Y", &[Y_REL])),
    (0xC0, Entry::Params("IMD_POWER_2", &[POWER])),
    (0xC1, Entry::Params("END_POWER_2", &[POWER])),
    (0xC2, Entry::Params("IMD_POWER_3", &[POWER])),
    (0xC3, Entry::Params("END_POWER_3", &[POWER])),
    (0xC4, Entry::Params("IMD_POWER_4", &[POWER])),
    (0xC5, Entry::Params("END_POWER_4", &[POWER])),
    (
        0xC6,
        Entry::Table(&[
            (0x01, Entry::Params("MIN_POWER_1", &[POWER])),
            (0x02, Entry::Params("MAX_POWER_1", &[POWER])),
            (0x05, Entry::Params("MIN_POWER_3", &[POWER])),
            (0x06, Entry::Params("MAX_POWER_3", &[POWER])),
            (0x07, Entry::Params("MIN_POWER_4", &[POWER])),
            (0x08, Entry::Params("MAX_POWER_4", &[POWER])),
            (0x10, Entry::Params("LASER_INTERVAL", &[TIME])),
            (0x11, Entry::Params("ADD_DELAY", &[TIME])),
            (0x12, Entry::Params("LASER_ON_DELAY", &[TIME])),
            (0x13, Entry::Params("LASER_OFF_DELAY", &[TIME])),
            (0x15, Entry::Params("LASER_ON_DELAY2", &[TIME])),
            (0x16, Entry::Params("LASER_OFF_DELAY2", &[TIME])),
            (0x21, Entry::Params("MIN_POWER_2", &[POWER])),
            (0x22, Entry::Params("MAX_POWER_2", &[POWER])),
            (0x31, Entry::Params("MIN_POWER_1_PART", &[PART, POWER])),
            (0x32, Entry::Params("MAX_POWER_1_PART", &[PART, POWER])),
            (0x35, Entry::Params("MIN_POWER_3_PART", &[PART, POWER])),
            (0x36, Entry::Params("MAX_POWER_3_PART", &[PART, POWER])),
            (0x37, Entry::Params("MIN_POWER_4_PART", &[PART, POWER])),
            (0x38, Entry::Params("MAX_POWER_4_PART", &[PART, POWER])),
            (0x41, Entry::Params("MIN_POWER_2_PART", &[PART, POWER])),
            (0x42, Entry::Params("MAX_POWER_2_PART", &[PART, POWER])),
            (0x50, Entry::Params("THROUGH_POWER_1", &[POWER])),
            (0x51, Entry::Params("THROUGH_POWER_2", &[POWER])),
            (0x55, Entry::Params("THROUGH_POWER_3", &[POWER])),
            (0x56, Entry::Params("THROUGH_POWER_4", &[POWER])),
            (0x60, Entry::Params("FREQUENCY_PART", &[LASER, PART, FREQUENCY])),
        ]),
    ),
    (0xC7, Entry::Params("IMD_POWER_1", &[POWER])),
    (0xC8, Entry::Params("END_POWER_1", &[POWER])),
    (
        0xC9,
        Entry::Table(&[
            (0x02, Entry::Params("SPEED_LASER_1", &[SPEED])),
            (0x03, Entry::Params("SPEED_AXIS", &[SPEED])),
            (0x04, Entry::Params("SPEED_LASER_1_PART", &[PART, SPEED])),
            (0x05, Entry::Params("FORCE_ENG_SPEED", &[SPEED])),
            (0x06, Entry::Params("SPEED_AXIS_MOVE", &[SPEED])),
        ]),
    ),
    (
        0xCA,
        Entry::Table(&[
            (
                0x01,
                Entry::Options(
                    "",
                    &[
                        (0x00, "LAYER_END"),
                        (0x01, "WORK_MODE_1"),
                        (0x02, "WORK_MODE_2"),
                        (0x03, "WORK_MODE_3"),
                        (0x04, "WORK_MODE_4"),
                        (0x05, "WORK_MODE_6"),
                        (0x10, "LASER_DEVICE_0"),
                        (0x11, "LASER_DEVICE_1"),
                        (0x12, "AIR_ASSIST_OFF"),
                        (0x13, "AIR_ASSIST_ON"),
                        (0x14, "DB_HEAD"),
                        (0x30, "EN_LASER_2_OFFSET_0"),
                        (0x31, "EN_LASER_2_OFFSET_1"),
                        (0x55, "WORK_MODE_5"),
                    ],
                ),
            ),
            (0x02, Entry::Params("LAYER_NUMBER_PART", &[PART])),
            (0x03, Entry::Params("EN_LASER_TUBE_START", &[SWITCH])),
            (0x04, Entry::Params("X_SIGN_MAP", &[VALUE])),
            (0x05, Entry::Params("LAYER_COLOR", &[COLOR])),
            (0x06, Entry::Params("LAYER_COLOR_PART", &[PART, COLOR])),
            (0x10, Entry::Params("EN_EX_IO", &[VALUE])),
            (0x22, Entry::Params("MAX_LAYER_PART", &[PART])),
            (0x30, Entry::Params("U_FILE_ID", &[ID])),
            (0x40, Entry::Params("ZU_MAP", &[VALUE])),
            (0x41, Entry::Params("LAYER_SELECT", &[PART, UINT7])),
        ]),
    ),
    (ENQ, Entry::Label("ENQ")),
    (0xD0, Entry::Table(&[(0x29, Entry::Skip("SKIP", 2))])),
    (EOF, Entry::Label("EOF")),
    (
        0xD8,
        Entry::Table(&[
            (0x00, Entry::Label("START_PROCESS")),
            (0x01, Entry::Label("STOP_PROCESS")),
            (0x02, Entry::Label("PAUSE_PROCESS")),
            (0x03, Entry::Label("RESTORE_PROCESS")),
            (0x10, Entry::Label("REF_POINT_2")),
            (0x11, Entry::Label("REF_POINT_1")),
            (0x12, Entry::Label("CURRENT_POSITION")),
            (0x20, Entry::Label("KEYDOWN_X_LEFT")),
            (0x21, Entry::Label("KEYDOWN_X_RIGHT")),
            (0x22, Entry::Label("KEYDOWN_Y_TOP")),
            (0x23, Entry::Label("KEYDOWN_Y_BOTTOM")),
            (0x24, Entry::Label("KEYDOWN_Z_UP")),
            (0x25, Entry::Label("KEYDOWN_Z_DOWN")),
            (0x26, Entry::Label("KEYDOWN_U_FORWARD")),
            (0x27, Entry::Label("KEYDOWN_U_BACKWARDS")),
            (0x2A, Entry::Label("HOME_XY")),
            (0x2C, Entry::Label("HOME_Z")),
            (0x2D, Entry::Label("HOME_U")),
            (0x2E, Entry::Label("FOCUS_Z")),
            (0x30, Entry::Label("KEYUP_LEFT")),
            (0x31, Entry::Label("KEYUP_RIGHT")),
            (0x32, Entry::Label("KEYUP_Y_TOP")),
            (0x33, Entry::Label("KEYUP_Y_BOTTOM")),
            (0x34, Entry::Label("KEYUP_Z_UP")),
            (0x35, Entry::Label("KEYUP_Z_DOWN")),
            (0x36, Entry::Label("KEYUP_U_FORWARD")),
            (0x37, Entry::Label("KEYUP_U_BACKWARDS")),
        ]),
    ),
    (
        0xD9,
        Entry::Table(&[
            (0x00, Entry::Params("RAPID_MOVE_X", &[RAPID, X_ABS])),
            (0x01, Entry::Params("RAPID_MOVE_Y", &[RAPID, Y_ABS])),
            (0x02, Entry::Params("RAPID_MOVE_Z", &[RAPID, Z_ABS])),
            (0x03, Entry::Params("RAPID_MOVE_U", &[RAPID, U_ABS])),
            (0x0F, Entry::Params("RAPID_FEED_AXIS_MOVE", &[RAPID])),
            (0x10, Entry::Params("RAPID_MOVE_XY", &[RAPID, X_ABS, Y_ABS])),
            (
                0x30,
                Entry::Params("RAPID_MOVE_XYU", &[RAPID, X_ABS, Y_ABS, U_ABS]),
            ),
        ]),
    ),
    (
        SETTING,
        Entry::Table(&[
            (SETTING_READ, Entry::Params("GET_SETTING", &[MEMORY])),
            (
                SETTING_WRITE,
                Entry::Params("SET_SETTING", &[MEMORY, TBDU35, TBDU35]),
            ),
            (SETTING_INDEX, Entry::Params("GET_UNKNOWN", &[INDEX, TBD])),
        ]),
    ),
    (
        FILE_COMMAND,
        Entry::Table(&[
            (
                0x00,
                Entry::Params("DOCUMENT_FILE_UPLOAD", &[FNUM, UINT35, UINT35]),
            ),
            (0x02, Entry::Label("DOCUMENT_FILE_END")),
            (FILE_SUM, Entry::Params("SET_FILE_SUM", &[SUM])),
        ]),
    ),
    (0xE6, Entry::Table(&[(0x01, Entry::Label("SET_ABSOLUTE"))])),
    (
        0xE7,
        Entry::Table(&[
            (0x00, Entry::Label("BLOCK_END")),
            (0x01, Entry::Params("SET_FILE_NAME", &[FNAME])),
            (0x03, Entry::Params("PROCESS_TOP_LEFT", &[X_ABS, Y_ABS])),
            (
                0x04,
                Entry::Params(
                    "PROCESS_REPEAT",
                    &[INT14, INT14, INT14, INT14, INT14, INT14, INT14],
                ),
            ),
            (0x05, Entry::Params("ARRAY_DIRECTION", &[DIRECTION])),
            (0x06, Entry::Params("FEED_REPEAT", &[UINT35, UINT35])),
            (0x07, Entry::Params("PROCESS_BOTTOM_RIGHT", &[X_ABS, Y_ABS])),
            (
                0x08,
                Entry::Params(
                    "ARRAY_REPEAT",
                    &[INT14, INT14, INT14, INT14, INT14, INT14, INT14],
                ),
            ),
            (0x09, Entry::Params("FEED_LENGTH", &[INT35])),
            (0x0A, Entry::Params("FEED_INFO", &[TBD35])),
            (0x0B, Entry::Params("ARRAY_EN_MIRROR_CUT", &[UINT7])),
            (0x13, Entry::Params("ARRAY_TOP_LEFT", &[X_ABS, Y_ABS])),
            (0x17, Entry::Params("ARRAY_BOTTOM_RIGHT", &[X_ABS, Y_ABS])),
            (0x23, Entry::Params("ARRAY_ADD", &[X_ABS, Y_ABS])),
            (0x24, Entry::Params("ARRAY_MIRROR", &[UINT7])),
            (0x32, Entry::Params("UNKNOWN_E732", &[TBDU35, TBDU35])),
            (0x35, Entry::Params("BLOCK_X_SIZE", &[X_ABS, Y_ABS])),
            (0x36, Entry::Params("SET_FILE_EMPTY", &[UINT7])),
            (0x37, Entry::Params("ARRAY_EVEN_DISTANCE", &[TBD35, TBD35])),
            (0x38, Entry::Params("SET_FEED_AUTO_PAUSE", &[SWITCH])),
            (0x3A, Entry::Label("UNION_BLOCK_PROPERTY")),
            (0x50, Entry::Params("DOCUMENT_TOP_LEFT", &[X_ABS, Y_ABS])),
            (0x51, Entry::Params("DOCUMENT_BOTTOM_RIGHT", &[X_ABS, Y_ABS])),
            (0x52, Entry::Params("PART_TOP_LEFT", &[PART, X_ABS, Y_ABS])),
            (0x53, Entry::Params("PART_BOTTOM_RIGHT", &[PART, X_ABS, Y_ABS])),
            (0x54, Entry::Params("PEN_OFFSET", &[UINT7, ABS])),
            (0x55, Entry::Params("LAYER_OFFSET", &[UINT7, ABS])),
            (0x60, Entry::Params("SET_CURRENT_ELEMENT_INDEX", &[UINT7])),
            (0x61, Entry::Params("PART_EX_TOP_LEFT", &[PART, X_ABS, Y_ABS])),
            (
                0x62,
                Entry::Params("PART_EX_BOTTOM_RIGHT", &[PART, X_ABS, Y_ABS]),
            ),
        ]),
    ),
    (
        0xE8,
        Entry::Table(&[
            (0x00, Entry::Params("DELETE_DOCUMENT", &[UINT35, UINT35])),
            (0x01, Entry::Params("DOCUMENT_NUMBER", &[UINT14])),
            (0x02, Entry::Label("FILE_TRANSFER")),
            (0x03, Entry::Params("SELECT_DOCUMENT", &[UINT7])),
            (0x04, Entry::Query("CALCULATE_DOCUMENT_TIME", &[], TBD)),
        ]),
    ),
    (0xEA, Entry::Params("ARRAY_START", &[UINT7])),
    (0xEB, Entry::Label("ARRAY_END")),
    (0xF0, Entry::Label("REF_POINT_SET")),
    (
        0xF1,
        Entry::Table(&[
            (0x00, Entry::Params("ELEMENT_MAX_INDEX", &[UINT7])),
            (0x01, Entry::Params("ELEMENT_NAME_MAX_INDEX", &[UINT7])),
            (0x02, Entry::Params("ENABLE_BLOCK_CUTTING", &[SWITCH])),
            (0x03, Entry::Params("DISPLAY_OFFSET", &[X_ABS, Y_ABS])),
            (0x04, Entry::Params("FEED_AUTO_CALC", &[UINT7])),
        ]),
    ),
    (
        0xF2,
        Entry::Table(&[
            (0x00, Entry::Params("ELEMENT_INDEX", &[UINT7])),
            (0x01, Entry::Params("ELEMENT_NAME_INDEX", &[UINT7])),
            (0x02, Entry::Params("ELEMENT_NAME", &[STRING8])),
            (0x03, Entry::Params("ELEMENT_ARRAY_TOP_LEFT", &[X_ABS, Y_ABS])),
            (
                0x04,
                Entry::Params("ELEMENT_ARRAY_BOTTOM_RIGHT", &[X_ABS, Y_ABS]),
            ),
            (
                0x05,
                Entry::Params(
                    "ELEMENT_ARRAY",
                    &[INT14, INT14, INT14, INT14, INT14, INT14, INT14],
                ),
            ),
            (0x06, Entry::Params("ELEMENT_ARRAY_ADD", &[X_ABS, Y_ABS])),
            (0x07, Entry::Params("ELEMENT_ARRAY_MIRROR", &[UINT7])),
        ]),
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_command_bytes_key_the_command_table() {
        for (opcode, entry) in COMMAND_TABLE {
            assert!(opcode & 0x80 != 0, "opcode {:02X}", opcode);
            if let Entry::Table(sub) = entry {
                for (sub_opcode, _) in *sub {
                    assert!(sub_opcode & 0x80 == 0, "{:02X} {:02X}", opcode, sub_opcode);
                }
            }
        }
    }

    #[test]
    fn test_lookup_nested() {
        let Some(Entry::Table(sub)) = lookup(COMMAND_TABLE, 0xC9) else {
            panic!("C9 should be a table");
        };
        assert_eq!(lookup(sub, 0x02).and_then(|e| e.label()), Some("SPEED_LASER_1"));
        assert!(lookup(COMMAND_TABLE, 0x81).is_none());
    }

    #[test]
    fn test_memory_addresses() {
        let status = AddressTable::Memory.lookup(ADDR_STATUS).unwrap();
        assert_eq!(status.label, "Machine Status");
        assert_eq!(status.fields[0].kind.byte_count(), Some(5));
        assert!(AddressTable::Memory.lookup(0x7F7F).is_none());
        assert_eq!(AddressTable::Index.lookup(0x0000).unwrap().fields.len(), 9);
    }

    #[test]
    fn test_key_codes() {
        assert_eq!(key_code("stop"), Some(0x09));
        assert_eq!(key_code("Y_PLUS"), Some(0x03));
        assert_eq!(key_code("nope"), None);
        assert_eq!(card_name(0x6510_6510), Some("RDC6442S"));
    }
}
