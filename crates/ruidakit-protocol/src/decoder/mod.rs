//! Command decoder
//!
//! A byte-at-a-time state machine that turns a Ruida stream into labelled,
//! typed commands. Bytes are tagged as coming from the host or from a
//! controller reply. Host commands are decoded against the command table;
//! replies to memory and index reads are decoded against the address tables.
//!
//! The decoder never fails. Malformed input is recorded as a [`Diagnostic`],
//! logged, and the machine resynchronises on the next known command byte.
//! The running file checksum is compared against the `E5 05` value at every
//! end-of-file marker.
//!
//! ```
//! use ruidakit_protocol::codec::encode_coord;
//! use ruidakit_protocol::decoder::{CommandDecoder, Source};
//!
//! let mut decoder = CommandDecoder::new();
//! let mut bytes = vec![0x88];
//! bytes.extend_from_slice(&encode_coord(10.0));
//! bytes.extend_from_slice(&encode_coord(5.0));
//! let commands: Vec<_> = bytes
//!     .iter()
//!     .flat_map(|&b| decoder.step(b, Source::Host))
//!     .collect();
//! assert_eq!(commands[0].label, "MOVE_ABS_XY");
//! ```

mod field;

pub use field::{DecodedField, ParamValue};

use crate::codec;
use crate::tables::{
    self, AddressTable, Entry, FieldKind, FieldSpec, MemEntry, CHECKSUM_EXEMPT, COMMAND_TABLE,
    EOF, FILE_COMMAND, FILE_SUM, REPLY_TABLE, SETTING, SETTING_INDEX, SETTING_READ,
    SETTING_WRITE,
};
use field::FieldDecoder;
use ruidakit_core::ProtocolError;
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Where a byte came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Sent by the host
    Host,
    /// Sent by the controller; carries the bytes left in the packet after
    /// this one, when known
    Reply(Option<usize>),
}

impl Source {
    pub fn is_reply(&self) -> bool {
        matches!(self, Self::Reply(_))
    }

    fn remaining(&self) -> Option<usize> {
        match self {
            Self::Host => None,
            Self::Reply(r) => *r,
        }
    }
}

/// Decoder state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecoderState {
    Sync,
    ExpectCommand,
    ExpectSubCommand,
    DecodeOption,
    DecodeParameters,
    ExpectReply,
    MemCommand,
    MemSubCommand,
    MemAddressHigh,
    MemAddressLow,
    MemDecodeReply,
}

impl DecoderState {
    fn expects_host(&self) -> bool {
        matches!(
            self,
            Self::Sync
                | Self::ExpectCommand
                | Self::ExpectSubCommand
                | Self::DecodeOption
                | Self::DecodeParameters
        )
    }
}

/// One decoded command or reply
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedCommand {
    /// Offset of the opcode byte in the stream
    pub offset: usize,
    pub opcode: u8,
    pub sub_opcode: Option<u8>,
    /// Option byte for option-table commands
    pub option: Option<u8>,
    pub label: String,
    pub parameters: Vec<ParamValue>,
    /// Printable form of each parameter
    pub rendered: Vec<String>,
    pub is_reply: bool,
    /// Memory or index address, for `DA` commands and replies
    pub address: Option<u16>,
}

impl DecodedCommand {
    /// Parameter `index` as a float
    pub fn param_f64(&self, index: usize) -> Option<f64> {
        self.parameters.get(index).and_then(ParamValue::as_f64)
    }

    /// Every numeric parameter as a float, skipping the rest
    pub fn floats(&self) -> Vec<f64> {
        self.parameters.iter().filter_map(ParamValue::as_f64).collect()
    }
}

impl fmt::Display for DecodedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_reply {
            write!(f, "<- ")?;
        }
        write!(f, "{}", self.label)?;
        for text in &self.rendered {
            write!(f, " {}", text)?;
        }
        Ok(())
    }
}

/// Category of a decode problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    UnknownOpcode,
    UnknownSubOpcode,
    UnknownOption,
    UnknownAddress,
    /// Command byte where a data byte was expected
    UnexpectedCommandByte,
    /// Data byte where a command byte was expected
    UnexpectedDataByte,
    /// Reply byte where a host byte was expected
    UnexpectedReply,
    /// Host byte where a reply byte was expected
    UnexpectedHost,
    /// Stream or packet ended inside a command
    Truncated,
    ChecksumMismatch,
}

/// A decode problem, reported without stopping the decoder
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub offset: usize,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{:06X} {:?}: {}", self.offset, self.kind, self.message)
    }
}

/// Result of comparing the running file sum at an end-of-file marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChecksumCheck {
    pub offset: usize,
    /// Value carried by `E5 05`
    pub decoded: u64,
    /// Sum accumulated while decoding
    pub accumulated: u64,
}

impl ChecksumCheck {
    pub fn is_ok(&self) -> bool {
        self.decoded == self.accumulated
    }
}

/// Everything produced by decoding a whole buffer
#[derive(Debug, Clone, Default, Serialize)]
pub struct DecodeOutput {
    pub commands: Vec<DecodedCommand>,
    pub diagnostics: Vec<Diagnostic>,
    pub checksums: Vec<ChecksumCheck>,
}

impl DecodeOutput {
    /// True when nothing was reported and every file sum matched
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty() && self.checksums.iter().all(ChecksumCheck::is_ok)
    }
}

#[derive(Debug, Default)]
struct FileChecksum {
    enabled: bool,
    total: u64,
    /// Host bytes since the last emitted command
    pending: u64,
    /// Value decoded from the last `E5 05`
    file_sum: u64,
}

/// Table-driven Ruida stream decoder
#[derive(Debug)]
pub struct CommandDecoder {
    state: DecoderState,
    offset: usize,

    start: usize,
    opcode: u8,
    sub_opcode: Option<u8>,
    option: Option<u8>,
    label: String,
    sub_table: &'static [(u8, Entry)],
    options: (&'static str, &'static [(u8, &'static str)]),
    fields: &'static [FieldSpec],
    next_field: usize,
    field: Option<FieldDecoder>,
    reply_field: Option<FieldSpec>,
    values: Vec<ParamValue>,
    rendered: Vec<String>,
    address: Option<u16>,
    is_reply: bool,

    address_table: AddressTable,
    address_high: u8,
    skip: usize,
    skipped: Vec<u8>,

    checksum: FileChecksum,
    diagnostics: Vec<Diagnostic>,
    checksums: Vec<ChecksumCheck>,
}

impl Default for CommandDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandDecoder {
    /// Create a decoder in the `Sync` state
    pub fn new() -> Self {
        Self {
            state: DecoderState::Sync,
            offset: 0,
            start: 0,
            opcode: 0,
            sub_opcode: None,
            option: None,
            label: String::new(),
            sub_table: &[],
            options: ("", &[]),
            fields: &[],
            next_field: 0,
            field: None,
            reply_field: None,
            values: Vec::new(),
            rendered: Vec::new(),
            address: None,
            is_reply: false,
            address_table: AddressTable::Memory,
            address_high: 0,
            skip: 0,
            skipped: Vec::new(),
            checksum: FileChecksum::default(),
            diagnostics: Vec::new(),
            checksums: Vec::new(),
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Bytes consumed so far
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn checksums(&self) -> &[ChecksumCheck] {
        &self.checksums
    }

    /// Running file checksum
    pub fn accumulated_checksum(&self) -> u64 {
        self.checksum.total
    }

    /// Drive one byte through the machine
    pub fn step(&mut self, datum: u8, source: Source) -> Vec<DecodedCommand> {
        let mut out = Vec::new();
        if self.skip > 0 && !source.is_reply() {
            self.skip_byte(datum, &mut out);
        } else if source.is_reply() && tables::is_handshake(datum) && self.awaiting_packet() {
            debug!("Skipping handshake byte 0x{:02X}", datum);
        } else {
            if !source.is_reply() {
                self.checksum.pending += u64::from(datum);
            }
            self.dispatch(datum, source, &mut out);
        }
        self.offset += 1;
        out
    }

    /// Drive a whole packet; reply packets carry their remaining length
    pub fn step_packet(&mut self, packet: &[u8], is_reply: bool) -> Vec<DecodedCommand> {
        let mut out = Vec::new();
        for (i, &b) in packet.iter().enumerate() {
            let source = if is_reply {
                Source::Reply(Some(packet.len() - i - 1))
            } else {
                Source::Host
            };
            out.extend(self.step(b, source));
        }
        out
    }

    /// Flush at end of stream
    pub fn finish(&mut self) -> Vec<DecodedCommand> {
        let mut out = Vec::new();
        match self.state {
            DecoderState::DecodeParameters
            | DecoderState::ExpectReply
            | DecoderState::MemDecodeReply
                if self.open_field_has_data() =>
            {
                self.flush_open_field(&mut out);
            }
            DecoderState::Sync | DecoderState::ExpectCommand | DecoderState::MemCommand => {}
            _ => {
                self.report(
                    DiagnosticKind::Truncated,
                    format!("Stream ended inside {}", self.describe_current()),
                );
                self.state = DecoderState::Sync;
            }
        }
        self.checksum.pending = 0;
        out
    }

    fn awaiting_packet(&self) -> bool {
        match self.state {
            DecoderState::MemCommand => true,
            DecoderState::ExpectReply => !self.open_field_has_data(),
            s => s.expects_host(),
        }
    }

    fn dispatch(&mut self, datum: u8, source: Source, out: &mut Vec<DecodedCommand>) {
        match self.state {
            DecoderState::Sync => self.on_sync(datum, source, out),
            DecoderState::ExpectCommand => self.on_expect_command(datum, source, out),
            DecoderState::ExpectSubCommand => self.on_expect_sub_command(datum, source, out),
            DecoderState::DecodeOption => self.on_decode_option(datum, source, out),
            DecoderState::DecodeParameters => self.on_decode_parameters(datum, source, out),
            DecoderState::ExpectReply => self.on_expect_reply(datum, source, out),
            DecoderState::MemCommand => self.on_mem_command(datum, source, out),
            DecoderState::MemSubCommand => self.on_mem_sub_command(datum, source),
            DecoderState::MemAddressHigh => self.on_mem_address_high(datum, source, out),
            DecoderState::MemAddressLow => self.on_mem_address_low(datum, source, out),
            DecoderState::MemDecodeReply => self.on_mem_decode_reply(datum, source, out),
        }
    }

    // Sync and host command states

    fn on_sync(&mut self, datum: u8, source: Source, out: &mut Vec<DecodedCommand>) {
        if source.is_reply() || datum & codec::CMD_MASK == 0 {
            return;
        }
        if tables::lookup(COMMAND_TABLE, datum).is_some() {
            self.enter_expect_command();
            self.on_expect_command(datum, source, out);
        }
    }

    fn on_expect_command(&mut self, datum: u8, source: Source, out: &mut Vec<DecodedCommand>) {
        if source.is_reply() {
            if tables::lookup(REPLY_TABLE, datum).is_some() {
                // Reply to a read that was not seen; assume a memory read
                self.address_table = AddressTable::Memory;
                self.state = DecoderState::MemCommand;
                self.on_mem_command(datum, source, out);
            } else {
                self.report(
                    DiagnosticKind::UnexpectedReply,
                    format!("Reply byte 0x{:02X} where a command was expected", datum),
                );
                self.state = DecoderState::Sync;
            }
            return;
        }
        if datum & codec::CMD_MASK == 0 {
            self.report(
                DiagnosticKind::UnexpectedDataByte,
                format!("Data byte 0x{:02X} where a command was expected", datum),
            );
            self.state = DecoderState::Sync;
            return;
        }
        let Some(entry) = tables::lookup(COMMAND_TABLE, datum) else {
            self.report_error(
                DiagnosticKind::UnknownOpcode,
                ProtocolError::UnknownOpcode { opcode: datum },
            );
            self.state = DecoderState::Sync;
            return;
        };
        self.start = self.offset;
        self.opcode = datum;
        if !CHECKSUM_EXEMPT.contains(&datum) {
            self.checksum.enabled = true;
        }
        self.apply_entry(entry, out);
    }

    fn on_expect_sub_command(&mut self, datum: u8, source: Source, out: &mut Vec<DecodedCommand>) {
        if self.reject_reply(source) {
            return;
        }
        if datum & codec::CMD_MASK != 0 {
            self.report_error(
                DiagnosticKind::UnexpectedCommandByte,
                ProtocolError::UnexpectedCommandByte { byte: datum },
            );
            self.resync(datum, source, out);
            return;
        }
        let Some(entry) = tables::lookup(self.sub_table, datum) else {
            self.report_error(
                DiagnosticKind::UnknownSubOpcode,
                ProtocolError::UnknownSubOpcode {
                    opcode: self.opcode,
                    sub_opcode: datum,
                },
            );
            self.resync(datum, source, out);
            return;
        };
        self.sub_opcode = Some(datum);
        if self.opcode == SETTING && datum == SETTING_WRITE {
            self.checksum.enabled = true;
        }
        // The file sum field closes the checksummed region
        if self.opcode == FILE_COMMAND && datum == FILE_SUM {
            self.checksum.enabled = false;
        }
        self.apply_entry(entry, out);
    }

    fn on_decode_option(&mut self, datum: u8, source: Source, out: &mut Vec<DecodedCommand>) {
        if self.reject_reply(source) {
            return;
        }
        if datum & codec::CMD_MASK != 0 {
            self.report_error(
                DiagnosticKind::UnexpectedCommandByte,
                ProtocolError::UnexpectedCommandByte { byte: datum },
            );
            self.resync(datum, source, out);
            return;
        }
        let (prefix, options) = self.options;
        self.option = Some(datum);
        self.label = match tables::lookup_option(options, datum) {
            Some(name) => format!("{}{}", prefix, name),
            None => {
                self.report(
                    DiagnosticKind::UnknownOption,
                    format!("Option 0x{:02X} is unknown", datum),
                );
                format!("{}UNKNOWN_OPTION_{:02X}", prefix, datum)
            }
        };
        self.emit(out);
    }

    fn on_decode_parameters(&mut self, datum: u8, source: Source, out: &mut Vec<DecodedCommand>) {
        if self.reject_reply(source) {
            return;
        }
        if datum & codec::CMD_MASK != 0 {
            if self.open_field_has_data() {
                // An open-ended field ends at the next command
                self.flush_open_field(out);
                self.on_expect_command(datum, source, out);
            } else {
                self.report_error(
                    DiagnosticKind::UnexpectedCommandByte,
                    ProtocolError::UnexpectedCommandByte { byte: datum },
                );
                self.resync(datum, source, out);
            }
            return;
        }
        if let Some(done) = self.field.as_mut().and_then(|f| f.push(datum, None)) {
            self.on_field_done(done, out);
        }
    }

    fn on_expect_reply(&mut self, datum: u8, source: Source, out: &mut Vec<DecodedCommand>) {
        if !source.is_reply() {
            if self.open_field_has_data() {
                self.flush_open_field(out);
            } else {
                self.report(
                    DiagnosticKind::UnexpectedHost,
                    format!("Host byte 0x{:02X} while waiting for a reply", datum),
                );
                self.emit(out);
            }
            self.on_expect_command(datum, source, out);
            return;
        }
        if datum & codec::CMD_MASK != 0 {
            if self.open_field_has_data() {
                self.flush_open_field(out);
                self.on_expect_command(datum, source, out);
            } else {
                self.report_error(
                    DiagnosticKind::UnexpectedCommandByte,
                    ProtocolError::UnexpectedCommandByte { byte: datum },
                );
                self.state = DecoderState::Sync;
            }
            return;
        }
        self.is_reply = true;
        if let Some(done) = self
            .field
            .as_mut()
            .and_then(|f| f.push(datum, source.remaining()))
        {
            self.record(done);
            self.emit(out);
        }
    }

    // Memory and index reply states

    fn on_mem_command(&mut self, datum: u8, source: Source, out: &mut Vec<DecodedCommand>) {
        if !source.is_reply() {
            self.report(
                DiagnosticKind::UnexpectedHost,
                format!("Host byte 0x{:02X} while waiting for a {} reply", datum, self.address_table),
            );
            self.resync(datum, source, out);
            return;
        }
        match tables::lookup(REPLY_TABLE, datum) {
            Some(Entry::Table(sub)) => {
                self.reset_command();
                self.start = self.offset;
                self.opcode = datum;
                self.sub_table = *sub;
                self.is_reply = true;
                self.state = DecoderState::MemSubCommand;
            }
            _ => {
                self.report(
                    DiagnosticKind::UnknownOpcode,
                    format!("0x{:02X} is not a known reply command", datum),
                );
                self.state = DecoderState::Sync;
            }
        }
    }

    fn on_mem_sub_command(&mut self, datum: u8, source: Source) {
        if !source.is_reply() {
            self.report(
                DiagnosticKind::UnexpectedHost,
                format!("Host byte 0x{:02X} while expecting a reply sub-command", datum),
            );
            self.state = DecoderState::Sync;
            return;
        }
        match tables::lookup(self.sub_table, datum) {
            Some(Entry::Params(label, _)) => {
                self.sub_opcode = Some(datum);
                self.label = (*label).to_string();
                self.state = DecoderState::MemAddressHigh;
            }
            _ => {
                self.report_error(
                    DiagnosticKind::UnknownSubOpcode,
                    ProtocolError::UnknownSubOpcode {
                        opcode: self.opcode,
                        sub_opcode: datum,
                    },
                );
                self.state = DecoderState::Sync;
            }
        }
    }

    fn on_mem_address_high(&mut self, datum: u8, source: Source, out: &mut Vec<DecodedCommand>) {
        if !self.accept_reply_data(datum, source, out) {
            return;
        }
        self.address_high = datum;
        self.state = DecoderState::MemAddressLow;
    }

    fn on_mem_address_low(&mut self, datum: u8, source: Source, out: &mut Vec<DecodedCommand>) {
        if !self.accept_reply_data(datum, source, out) {
            return;
        }
        let address = (u16::from(self.address_high) << 8) | u16::from(datum);
        let entry: MemEntry = match self.address_table.lookup(address) {
            Some(entry) => *entry,
            None => {
                self.report(
                    DiagnosticKind::UnknownAddress,
                    format!("Unknown {} address {:04X}", self.address_table, address),
                );
                tables::UNKNOWN_ADDRESS
            }
        };
        self.address = Some(address);
        self.values.push(ParamValue::Address(address));
        self.rendered
            .push(format!("Addr:{:04X}:{}", address, entry.label));
        self.fields = entry.fields;
        self.next_field = 0;
        if source.remaining() == Some(0) || self.fields.is_empty() {
            self.emit(out);
            return;
        }
        self.field = Some(FieldDecoder::new(self.fields[0]));
        self.state = DecoderState::MemDecodeReply;
    }

    fn on_mem_decode_reply(&mut self, datum: u8, source: Source, out: &mut Vec<DecodedCommand>) {
        if !source.is_reply() || datum & codec::CMD_MASK != 0 {
            if self.open_field_has_data() {
                self.flush_open_field(out);
                self.on_expect_command(datum, source, out);
            } else if source.is_reply() {
                self.report_error(
                    DiagnosticKind::UnexpectedCommandByte,
                    ProtocolError::UnexpectedCommandByte { byte: datum },
                );
                self.state = DecoderState::Sync;
            } else {
                self.report(
                    DiagnosticKind::UnexpectedHost,
                    format!("Host byte 0x{:02X} while decoding reply data", datum),
                );
                self.resync(datum, source, out);
            }
            return;
        }
        let Some(done) = self
            .field
            .as_mut()
            .and_then(|f| f.push(datum, source.remaining()))
        else {
            return;
        };
        self.record(done);
        self.next_field += 1;
        match self.fields.get(self.next_field) {
            Some(spec) => self.field = Some(FieldDecoder::new(*spec)),
            None => self.emit(out),
        }
    }

    // Helpers

    fn apply_entry(&mut self, entry: &'static Entry, out: &mut Vec<DecodedCommand>) {
        match entry {
            Entry::Label(label) => {
                self.label = (*label).to_string();
                if self.opcode == EOF && self.sub_opcode.is_none() {
                    self.check_file_sum();
                }
                self.emit(out);
            }
            Entry::Table(sub) => {
                self.sub_table = *sub;
                self.state = DecoderState::ExpectSubCommand;
            }
            Entry::Options(prefix, options) => {
                self.options = (*prefix, *options);
                self.state = DecoderState::DecodeOption;
            }
            Entry::Params(label, fields) => {
                self.label = (*label).to_string();
                self.fields = *fields;
                self.start_fields(out);
            }
            Entry::Query(label, fields, reply) => {
                self.label = (*label).to_string();
                self.fields = *fields;
                self.reply_field = Some(*reply);
                self.start_fields(out);
            }
            Entry::Skip(label, count) => {
                self.label = (*label).to_string();
                self.skip = *count;
                self.skipped.clear();
                self.state = DecoderState::DecodeParameters;
            }
        }
    }

    fn start_fields(&mut self, out: &mut Vec<DecodedCommand>) {
        self.next_field = 0;
        match self.fields.first() {
            Some(spec) => {
                self.field = Some(FieldDecoder::new(*spec));
                self.state = DecoderState::DecodeParameters;
            }
            None => self.start_reply_or_emit(out),
        }
    }

    fn start_reply_or_emit(&mut self, out: &mut Vec<DecodedCommand>) {
        match self.reply_field {
            Some(spec) => {
                self.field = Some(FieldDecoder::new(spec));
                self.state = DecoderState::ExpectReply;
            }
            None => self.emit(out),
        }
    }

    fn on_field_done(&mut self, done: DecodedField, out: &mut Vec<DecodedCommand>) {
        let kind = done.spec.kind;
        let address = match done.value {
            ParamValue::Address(a) => Some(a),
            _ => None,
        };
        self.record(done);

        match (kind, self.sub_opcode) {
            (FieldKind::Memory, Some(SETTING_READ)) if self.opcode == SETTING => {
                self.address = address;
                self.address_table = AddressTable::Memory;
                self.emit_then(out, DecoderState::MemCommand);
                return;
            }
            (FieldKind::Index, Some(SETTING_INDEX)) if self.opcode == SETTING => {
                self.address = address;
                self.address_table = AddressTable::Index;
                self.emit_then(out, DecoderState::MemCommand);
                return;
            }
            (FieldKind::Memory | FieldKind::Index, _) => self.address = address,
            _ => {}
        }

        self.next_field += 1;
        match self.fields.get(self.next_field) {
            Some(spec) => self.field = Some(FieldDecoder::new(*spec)),
            None => self.start_reply_or_emit(out),
        }
    }

    fn record(&mut self, done: DecodedField) {
        match done.spec.kind {
            // A card id reply marks a point where the file sum restarts
            FieldKind::CardId => self.checksum.total = 0,
            FieldKind::FileSum => self.checksum.file_sum = done.value.as_u64().unwrap_or(0),
            _ => {}
        }
        self.values.push(done.value);
        self.rendered.push(done.text);
        self.field = None;
    }

    fn open_field_has_data(&self) -> bool {
        self.field
            .as_ref()
            .is_some_and(|f| f.is_open_ended() && !f.is_empty())
    }

    fn flush_open_field(&mut self, out: &mut Vec<DecodedCommand>) {
        let Some(done) = self.field.as_mut().map(FieldDecoder::finish) else {
            return;
        };
        self.record(done);
        let (seen, total) = match self.state {
            DecoderState::ExpectReply => (1, 1),
            DecoderState::MemDecodeReply => (self.next_field + 1, self.fields.len()),
            _ => (
                self.next_field + 1,
                self.fields.len() + usize::from(self.reply_field.is_some()),
            ),
        };
        if seen < total {
            self.report(
                DiagnosticKind::Truncated,
                format!("{} ended after {} of {} fields", self.label, seen, total),
            );
        }
        self.emit(out);
    }

    fn skip_byte(&mut self, datum: u8, out: &mut Vec<DecodedCommand>) {
        warn!("Skipping: 0x{:02X}", datum);
        if self.checksum.enabled {
            self.checksum.total += u64::from(datum);
        }
        self.skipped.push(datum);
        self.skip -= 1;
        if self.skip == 0 {
            let bytes = std::mem::take(&mut self.skipped);
            self.rendered.push(codec::hex_string(&bytes));
            self.values.push(ParamValue::Bytes(bytes));
            self.emit(out);
        }
    }

    fn check_file_sum(&mut self) {
        self.checksum.total += self.checksum.pending;
        self.checksum.pending = 0;
        let check = ChecksumCheck {
            offset: self.offset,
            decoded: self.checksum.file_sum,
            accumulated: self.checksum.total,
        };
        if check.is_ok() {
            debug!("Checksum OK: {}", check.accumulated);
        } else {
            self.report_error(
                DiagnosticKind::ChecksumMismatch,
                ProtocolError::ChecksumMismatch {
                    expected: check.decoded,
                    actual: check.accumulated,
                },
            );
        }
        self.checksums.push(check);
        self.checksum = FileChecksum {
            enabled: true,
            ..FileChecksum::default()
        };
    }

    fn emit(&mut self, out: &mut Vec<DecodedCommand>) {
        self.emit_then(out, DecoderState::ExpectCommand);
    }

    fn emit_then(&mut self, out: &mut Vec<DecodedCommand>, next: DecoderState) {
        out.push(DecodedCommand {
            offset: self.start,
            opcode: self.opcode,
            sub_opcode: self.sub_opcode,
            option: self.option,
            label: std::mem::take(&mut self.label),
            parameters: std::mem::take(&mut self.values),
            rendered: std::mem::take(&mut self.rendered),
            is_reply: self.is_reply,
            address: self.address,
        });
        if self.checksum.enabled {
            self.checksum.total += self.checksum.pending;
        }
        self.checksum.pending = 0;
        self.reset_command();
        self.checksum.enabled = false;
        self.state = next;
    }

    fn enter_expect_command(&mut self) {
        self.reset_command();
        self.checksum.enabled = false;
        self.state = DecoderState::ExpectCommand;
    }

    fn reset_command(&mut self) {
        self.start = self.offset;
        self.opcode = 0;
        self.sub_opcode = None;
        self.option = None;
        self.label.clear();
        self.sub_table = &[];
        self.fields = &[];
        self.next_field = 0;
        self.field = None;
        self.reply_field = None;
        self.values.clear();
        self.rendered.clear();
        self.address = None;
        self.is_reply = false;
    }

    /// Drop the current command and hand `datum` to `Sync`
    fn resync(&mut self, datum: u8, source: Source, out: &mut Vec<DecodedCommand>) {
        self.reset_command();
        self.state = DecoderState::Sync;
        self.on_sync(datum, source, out);
    }

    fn reject_reply(&mut self, source: Source) -> bool {
        if !source.is_reply() {
            return false;
        }
        self.report(
            DiagnosticKind::UnexpectedReply,
            format!("Reply byte while decoding {}", self.describe_current()),
        );
        self.reset_command();
        self.state = DecoderState::Sync;
        true
    }

    fn accept_reply_data(&mut self, datum: u8, source: Source, out: &mut Vec<DecodedCommand>) -> bool {
        if !source.is_reply() {
            self.report(
                DiagnosticKind::UnexpectedHost,
                format!("Host byte 0x{:02X} while expecting a reply address", datum),
            );
            self.resync(datum, source, out);
            return false;
        }
        if datum & codec::CMD_MASK != 0 {
            self.report_error(
                DiagnosticKind::UnexpectedCommandByte,
                ProtocolError::UnexpectedCommandByte { byte: datum },
            );
            self.state = DecoderState::Sync;
            return false;
        }
        true
    }

    fn describe_current(&self) -> String {
        match self.sub_opcode {
            Some(sub) => format!("0x{:02X} 0x{:02X}", self.opcode, sub),
            None => format!("0x{:02X}", self.opcode),
        }
    }

    fn report_error(&mut self, kind: DiagnosticKind, error: ProtocolError) {
        self.report(kind, error.to_string());
    }

    fn report(&mut self, kind: DiagnosticKind, message: String) {
        warn!("Decoder diagnostic at offset {}: {}", self.offset, message);
        self.diagnostics.push(Diagnostic {
            offset: self.offset,
            kind,
            message,
        });
    }

    /// Consume the decoder, returning its diagnostics and checksum results
    pub fn into_output(self, commands: Vec<DecodedCommand>) -> DecodeOutput {
        DecodeOutput {
            commands,
            diagnostics: self.diagnostics,
            checksums: self.checksums,
        }
    }
}

/// Decode an unswizzled host byte stream, such as an RD file body
pub fn decode(bytes: &[u8]) -> DecodeOutput {
    let mut decoder = CommandDecoder::new();
    let mut commands = Vec::new();
    for &b in bytes {
        commands.extend(decoder.step(b, Source::Host));
    }
    commands.extend(decoder.finish());
    decoder.into_output(commands)
}

/// Decode a swizzled capture, such as an RD file as written to disk
pub fn decode_swizzled(bytes: &[u8], magic: u8) -> DecodeOutput {
    decode(&codec::unswizzle(bytes, magic))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_coord, encode_power, encode_uint35};

    fn host(decoder: &mut CommandDecoder, bytes: &[u8]) -> Vec<DecodedCommand> {
        decoder.step_packet(bytes, false)
    }

    #[test]
    fn test_move_abs_xy_scenario() {
        let mut decoder = CommandDecoder::new();
        let mut bytes = vec![0x88];
        bytes.extend_from_slice(&encode_coord(10.0));
        bytes.extend_from_slice(&encode_coord(5.0));

        let commands = host(&mut decoder, &bytes);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].label, "MOVE_ABS_XY");
        assert_eq!(commands[0].opcode, 0x88);
        assert_eq!(commands[0].floats(), vec![10.0, 5.0]);
        assert_eq!(decoder.state(), DecoderState::ExpectCommand);
        assert!(decoder.diagnostics().is_empty());
    }

    #[test]
    fn test_sync_ignores_leading_garbage() {
        let mut decoder = CommandDecoder::new();
        let commands = host(&mut decoder, &[0x01, 0x02, 0xEB]);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].label, "ARRAY_END");
        assert_eq!(commands[0].offset, 2);
    }

    #[test]
    fn test_sub_command_and_options() {
        let mut decoder = CommandDecoder::new();
        let mut bytes = vec![0xC9, 0x02];
        bytes.extend_from_slice(&encode_coord(100.0));
        bytes.extend_from_slice(&[0xCA, 0x01, 0x13]);
        let commands = host(&mut decoder, &bytes);

        assert_eq!(commands[0].label, "SPEED_LASER_1");
        assert_eq!(commands[0].param_f64(0), Some(100.0));
        assert_eq!(commands[1].label, "AIR_ASSIST_ON");
        assert_eq!(commands[1].option, Some(0x13));
    }

    #[test]
    fn test_unknown_opcode_resyncs() {
        let mut decoder = CommandDecoder::new();
        let mut bytes = vec![0x88, 0x81];
        bytes.push(0xC7);
        bytes.extend_from_slice(&encode_power(50.0));
        let commands = host(&mut decoder, &bytes);

        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].label, "IMD_POWER_1");
        assert_eq!(
            decoder.diagnostics()[0].kind,
            DiagnosticKind::UnexpectedCommandByte
        );
    }

    #[test]
    fn test_unknown_sub_opcode_is_reported() {
        let mut decoder = CommandDecoder::new();
        host(&mut decoder, &[0xC9, 0x7F, 0xEB]);
        assert_eq!(decoder.diagnostics()[0].kind, DiagnosticKind::UnknownSubOpcode);
        assert_eq!(
            decoder.diagnostics()[0].message,
            "Unknown sub-opcode 0xC9 0x7F"
        );
    }

    #[test]
    fn test_memory_read_and_reply() {
        let mut decoder = CommandDecoder::new();
        let request = host(&mut decoder, &[0xDA, 0x00, 0x04, 0x21]);
        assert_eq!(request[0].label, "GET_SETTING");
        assert_eq!(request[0].address, Some(0x0421));
        assert_eq!(decoder.state(), DecoderState::MemCommand);

        // ACK for the request arrives first
        assert!(decoder.step(0xC6, Source::Reply(Some(0))).is_empty());

        let mut reply = vec![0xDA, 0x01, 0x04, 0x21];
        reply.extend_from_slice(&encode_coord(123.456));
        let replies = decoder.step_packet(&reply, true);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].is_reply);
        assert_eq!(replies[0].address, Some(0x0421));
        assert_eq!(replies[0].param_f64(1), Some(123.456));
        assert_eq!(decoder.state(), DecoderState::ExpectCommand);
    }

    #[test]
    fn test_unknown_address_reads_rest_of_packet() {
        let mut decoder = CommandDecoder::new();
        host(&mut decoder, &[0xDA, 0x00, 0x7E, 0x7E]);
        let replies = decoder.step_packet(&[0xDA, 0x01, 0x7E, 0x7E, 0x01, 0x02, 0x03], true);
        assert_eq!(replies[0].parameters[1], ParamValue::Bytes(vec![1, 2, 3]));
        assert_eq!(decoder.diagnostics()[0].kind, DiagnosticKind::UnknownAddress);
    }

    #[test]
    fn test_host_byte_during_reply_is_reported() {
        let mut decoder = CommandDecoder::new();
        host(&mut decoder, &[0xDA, 0x00, 0x04, 0x00]);
        let commands = host(&mut decoder, &[0xEB]);
        assert_eq!(commands[0].label, "ARRAY_END");
        assert_eq!(decoder.diagnostics()[0].kind, DiagnosticKind::UnexpectedHost);
    }

    #[test]
    fn test_file_checksum_matches() {
        let body = [0xE6, 0x01, 0xEB];
        let sum: u64 = body.iter().map(|&b| u64::from(b)).sum::<u64>() + u64::from(EOF);
        let mut bytes = body.to_vec();
        bytes.extend_from_slice(&[0xE5, 0x05]);
        bytes.extend_from_slice(&encode_uint35(sum));
        bytes.push(EOF);

        let output = decode(&bytes);
        assert_eq!(output.checksums.len(), 1);
        assert!(output.checksums[0].is_ok(), "{:?}", output.checksums);
        assert!(output.is_clean());
    }

    #[test]
    fn test_file_checksum_mismatch_is_reported_not_fatal() {
        let mut bytes = vec![0xE6, 0x01, 0xE5, 0x05];
        bytes.extend_from_slice(&encode_uint35(1));
        bytes.push(EOF);
        bytes.push(0xEB);

        let output = decode(&bytes);
        assert!(!output.checksums[0].is_ok());
        assert_eq!(output.diagnostics[0].kind, DiagnosticKind::ChecksumMismatch);
        assert_eq!(output.commands.last().map(|c| c.label.as_str()), Some("ARRAY_END"));
    }

    #[test]
    fn test_skip_entry_passes_over_command_bytes() {
        let output = decode(&[0xD0, 0x29, 0x89, 0x89, 0xEB]);
        assert_eq!(output.commands[0].label, "SKIP");
        assert_eq!(output.commands[0].parameters[0], ParamValue::Bytes(vec![0x89, 0x89]));
        assert_eq!(output.commands[1].label, "ARRAY_END");
    }

    #[test]
    fn test_filename_cstring() {
        let mut bytes = vec![0xE7, 0x01];
        bytes.extend_from_slice(&codec::encode_cstring("DOVE"));
        let output = decode(&bytes);
        assert_eq!(output.commands[0].label, "SET_FILE_NAME");
        assert_eq!(output.commands[0].parameters[0], ParamValue::Text("DOVE".into()));
    }

    #[test]
    fn test_finish_reports_truncation() {
        let output = decode(&[0x88, 0x00, 0x00]);
        assert!(output.commands.is_empty());
        assert_eq!(output.diagnostics[0].kind, DiagnosticKind::Truncated);
    }

    #[test]
    fn test_query_reply_is_attached() {
        let mut decoder = CommandDecoder::new();
        assert!(host(&mut decoder, &[0xE8, 0x04]).is_empty());
        assert_eq!(decoder.state(), DecoderState::ExpectReply);
        let replies = decoder.step_packet(&[0x00, 0x10, 0x20], true);
        assert_eq!(replies[0].label, "CALCULATE_DOCUMENT_TIME");
        assert!(replies[0].is_reply);
        assert_eq!(replies[0].parameters[0], ParamValue::Bytes(vec![0x00, 0x10, 0x20]));
    }

    #[test]
    fn test_decode_swizzled() {
        let mut bytes = vec![0xA8];
        bytes.extend_from_slice(&encode_coord(-1.5));
        bytes.extend_from_slice(&encode_coord(2.0));
        let output = decode_swizzled(&codec::swizzle(&bytes, 0x88), 0x88);
        assert_eq!(output.commands[0].label, "CUT_ABS_XY");
        assert_eq!(output.commands[0].floats(), vec![-1.5, 2.0]);
    }
}
