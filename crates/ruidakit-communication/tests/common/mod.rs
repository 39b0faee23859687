#![allow(dead_code)]

use ruidakit_communication::{
    DatagramSocket, ReadinessMonitor, SocketFactory, Sleeper, TransportConfig, UdpTransport,
};
use ruidakit_protocol::codec::{checksum, encode_coord, swizzle, unswizzle, DEFAULT_MAGIC};
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const BUSY: u32 = 0x0100_0000;
pub const IDLE: u32 = 0;

/// How the fake controller answers one datagram
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Answer {
    Ack,
    Nack,
    Byte(u8),
    Empty,
    Silent,
}

/// Status and head position reported by the fake controller
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Status {
    pub bits: u32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

pub fn status(bits: u32, x: f64, y: f64) -> Status {
    Status { bits, x, y, z: 0.0 }
}

/// Shared state of the fake controller
pub struct Controller {
    pub magic: u8,
    /// Byte sent for `Answer::Ack`
    pub ack_byte: u8,
    /// Datagrams are not swizzled or checksummed (panel port)
    pub raw: bool,
    pub datagrams: Vec<Vec<u8>>,
    pub binds: Vec<u16>,
    pub failing_binds: Vec<u16>,
    pub answers: VecDeque<Answer>,
    pub statuses: VecDeque<Status>,
    pub current: Status,
    /// Status reads answered so far
    pub polls: usize,
    /// Stop answering memory reads after this many status polls
    pub answer_polls: Option<usize>,
    /// Status reads (1-based) that get no reply
    pub silent_polls: Vec<usize>,
    /// Prefix memory replies with the checksum of their body
    pub checksummed_replies: bool,
    status_reads: usize,
    pending: VecDeque<Vec<u8>>,
}

impl Default for Controller {
    fn default() -> Self {
        Self {
            magic: DEFAULT_MAGIC,
            ack_byte: 0xC6,
            raw: false,
            datagrams: Vec::new(),
            binds: Vec::new(),
            failing_binds: Vec::new(),
            answers: VecDeque::new(),
            statuses: VecDeque::new(),
            current: Status::default(),
            polls: 0,
            answer_polls: None,
            silent_polls: Vec::new(),
            checksummed_replies: false,
            status_reads: 0,
            pending: VecDeque::new(),
        }
    }
}

impl Controller {
    /// Unswizzled payload of every datagram
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.datagrams
            .iter()
            .map(|d| unswizzle(&d[2..], self.magic))
            .collect()
    }

    /// Payloads other than memory reads
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.payloads()
            .into_iter()
            .filter(|p| !p.starts_with(&[0xDA, 0x00]))
            .collect()
    }

    fn handle(&mut self, data: &[u8]) {
        self.datagrams.push(data.to_vec());
        let answer = self.answers.pop_front().unwrap_or(Answer::Ack);
        match answer {
            Answer::Ack => self.pending.push_back(vec![self.ack_byte]),
            Answer::Nack => self.pending.push_back(vec![0x46]),
            Answer::Byte(b) => self.pending.push_back(vec![b]),
            Answer::Empty => self.pending.push_back(Vec::new()),
            Answer::Silent => {}
        }
        if self.raw || answer != Answer::Ack || data.len() < 2 {
            return;
        }

        let payload = unswizzle(&data[2..], self.magic);
        if payload.len() < 4 || payload[..2] != [0xDA, 0x00] {
            return;
        }
        let address = u16::from_be_bytes([payload[2], payload[3]]);
        if address == 0x0400 {
            self.status_reads += 1;
            if self.silent_polls.contains(&self.status_reads) {
                return;
            }
            if self.answer_polls.is_some_and(|limit| self.polls >= limit) {
                return;
            }
            if let Some(next) = self.statuses.pop_front() {
                self.current = next;
            }
            self.polls += 1;
        } else if self.answer_polls.is_some_and(|limit| self.polls > limit) {
            return;
        }
        let value: Vec<u8> = match address {
            0x0400 => self.current.bits.to_be_bytes().to_vec(),
            0x0421 => encode_coord(self.current.x).to_vec(),
            0x0431 => encode_coord(self.current.y).to_vec(),
            0x0441 => encode_coord(self.current.z).to_vec(),
            _ => vec![0; 5],
        };
        let mut reply = vec![0xDA, 0x01, payload[2], payload[3]];
        reply.extend_from_slice(&value);
        let body = swizzle(&reply, self.magic);
        let datagram = if self.checksummed_replies {
            let mut datagram = checksum(&body).to_vec();
            datagram.extend_from_slice(&body);
            datagram
        } else {
            body
        };
        self.pending.push_back(datagram);
    }
}

pub type SharedController = Arc<Mutex<Controller>>;

pub struct MockSocket {
    controller: SharedController,
}

impl DatagramSocket for MockSocket {
    fn send_to(&mut self, data: &[u8], _target: SocketAddr) -> io::Result<usize> {
        self.controller.lock().unwrap().handle(data);
        Ok(data.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let next = self.controller.lock().unwrap().pending.pop_front();
        match next {
            Some(datagram) => {
                let n = datagram.len().min(buf.len());
                buf[..n].copy_from_slice(&datagram[..n]);
                Ok(n)
            }
            None => Err(io::Error::new(io::ErrorKind::WouldBlock, "no datagram")),
        }
    }

    fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }
}

pub struct MockFactory {
    controller: SharedController,
}

impl SocketFactory for MockFactory {
    fn bind(&self, port: u16) -> io::Result<Box<dyn DatagramSocket>> {
        let mut controller = self.controller.lock().unwrap();
        controller.binds.push(port);
        if controller.failing_binds.contains(&port) {
            return Err(io::Error::new(io::ErrorKind::AddrInUse, "port in use"));
        }
        Ok(Box::new(MockSocket {
            controller: Arc::clone(&self.controller),
        }))
    }
}

pub fn controller() -> SharedController {
    Arc::new(Mutex::new(Controller::default()))
}

pub fn factory(controller: &SharedController) -> Box<dyn SocketFactory> {
    Box::new(MockFactory {
        controller: Arc::clone(controller),
    })
}

pub fn transport(controller: &SharedController) -> UdpTransport {
    UdpTransport::with_factory(TransportConfig::default(), factory(controller))
}

/// Sleeper that advances a virtual clock
#[derive(Debug, Clone)]
pub struct FakeSleeper {
    start: Instant,
    pub slept: Duration,
    pub sleeps: usize,
}

impl FakeSleeper {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            slept: Duration::ZERO,
            sleeps: 0,
        }
    }
}

impl Sleeper for FakeSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.slept += duration;
        self.sleeps += 1;
    }

    fn now(&self) -> Instant {
        self.start + self.slept
    }
}

pub fn monitor() -> ReadinessMonitor<FakeSleeper> {
    ReadinessMonitor::with_sleeper(FakeSleeper::new())
}
