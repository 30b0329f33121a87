#![allow(dead_code)]

//! Virtual split-line bus for driving the master against simulated devices.
//!
//! The model decodes the master's waveform from the duration of each low
//! pulse on the drive line (reset, write-0, write-1 or read slot), runs the
//! device-side protocol state machine (presence, SEARCH ROM with wired-AND
//! collision semantics, MATCH ROM, CONVERT, READ SCRATCHPAD, READ ROM) and
//! answers on the sense line. Time comes from a virtual clock advanced by
//! the delay handle; sampling instants are asserted strictly, so a timing
//! regression in the driver fails these tests.

use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital;
use onewire_split::{compute_crc8, SplitWire};

const RESET_LOW_NS: u64 = 480_000;
const WRITE_0_LOW_NS: u64 = 65_000;
const WRITE_1_LOW_NS: u64 = 10_000;
const READ_INIT_LOW_NS: u64 = 3_000;
const PRESENCE_SAMPLE_NS: u64 = 70_000;
const READ_SAMPLE_NS: u64 = 10_000;

#[derive(Debug)]
pub struct SimError;

impl digital::Error for SimError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

#[derive(Clone)]
pub struct SimDevice {
    pub rom: [u8; 8],
    pub scratchpad: [u8; 9],
    /// Stop answering search slots after this many ROM bits, as a device
    /// dropping off the bus mid-pass would.
    pub vanish_after_bit: Option<u8>,
}

enum Phase {
    Idle,
    Presence { released_at: u64 },
    Command { byte: u8, count: u8 },
    SearchId { bit_number: u8 },
    SearchCmp { bit_number: u8 },
    SearchDir { bit_number: u8 },
    MatchRom { bits: u64, count: u8 },
    Stream { bytes: Vec<u8>, cursor: usize },
}

struct PendingRead {
    released_at: u64,
    level: bool,
}

struct Model {
    now_ns: u64,
    devices: Vec<SimDevice>,
    phase: Phase,
    participants: Vec<usize>,
    selected: Vec<usize>,
    low_since: Option<u64>,
    pending_read: Option<PendingRead>,
    transitions: u64,
}

impl Model {
    fn new() -> Self {
        Model {
            now_ns: 0,
            devices: Vec::new(),
            phase: Phase::Idle,
            participants: Vec::new(),
            selected: Vec::new(),
            low_since: None,
            pending_read: None,
            transitions: 0,
        }
    }

    fn rom_bit(rom: &[u8; 8], bit_number: u8) -> bool {
        let index = usize::from((bit_number - 1) / 8);
        let offset = (bit_number - 1) % 8;
        rom[index] & (1 << offset) != 0
    }

    fn set_low(&mut self) {
        self.transitions += 1;
        if self.low_since.is_none() {
            self.low_since = Some(self.now_ns);
        }
    }

    fn set_high(&mut self) {
        self.transitions += 1;
        let since = match self.low_since.take() {
            Some(since) => since,
            // releasing an already-idle wire (initialize)
            None => return,
        };
        match self.now_ns - since {
            RESET_LOW_NS => self.on_reset(),
            WRITE_0_LOW_NS => self.on_master_bit(false),
            WRITE_1_LOW_NS => self.on_master_bit(true),
            READ_INIT_LOW_NS => self.on_read_slot(),
            other => panic!("unclassifiable low pulse of {} ns", other),
        }
    }

    fn on_reset(&mut self) {
        self.participants = (0..self.devices.len()).collect();
        self.selected.clear();
        self.pending_read = None;
        self.phase = Phase::Presence {
            released_at: self.now_ns,
        };
    }

    fn on_master_bit(&mut self, bit: bool) {
        match self.phase {
            Phase::Presence { .. } | Phase::Idle => {
                self.phase = Phase::Command {
                    byte: u8::from(bit),
                    count: 1,
                };
            }
            Phase::Command { byte, count } => {
                let byte = byte | (u8::from(bit) << count);
                if count == 7 {
                    self.dispatch(byte);
                } else {
                    self.phase = Phase::Command {
                        byte,
                        count: count + 1,
                    };
                }
            }
            Phase::SearchDir { bit_number } => {
                let devices = &self.devices;
                self.participants
                    .retain(|&d| Self::rom_bit(&devices[d].rom, bit_number) == bit);
                self.phase = if bit_number == 64 {
                    Phase::Idle
                } else {
                    Phase::SearchId {
                        bit_number: bit_number + 1,
                    }
                };
            }
            Phase::MatchRom { bits, count } => {
                let bits = bits | (u64::from(bit) << count);
                if count == 63 {
                    let devices = &self.devices;
                    self.selected = self
                        .participants
                        .iter()
                        .copied()
                        .filter(|&d| u64::from_le_bytes(devices[d].rom) == bits)
                        .collect();
                    self.phase = Phase::Command { byte: 0, count: 0 };
                } else {
                    self.phase = Phase::MatchRom {
                        bits,
                        count: count + 1,
                    };
                }
            }
            _ => panic!("master wrote a bit in an unexpected protocol phase"),
        }
    }

    fn dispatch(&mut self, command: u8) {
        self.phase = match command {
            // SEARCH ROM
            0xF0 => {
                self.participants = (0..self.devices.len()).collect();
                Phase::SearchId { bit_number: 1 }
            }
            // MATCH ROM
            0x55 => Phase::MatchRom { bits: 0, count: 0 },
            // CONVERT T: nothing observable until the scratchpad read
            0x44 => Phase::Idle,
            // READ SCRATCHPAD
            0xBE => {
                let bytes = if self.selected.len() == 1 {
                    self.devices[self.selected[0]].scratchpad.to_vec()
                } else {
                    vec![0xFF; 9]
                };
                Phase::Stream { bytes, cursor: 0 }
            }
            // READ ROM: every present device answers, wired-AND
            0x33 => {
                let mut bytes = [0xFFu8; 8];
                for device in &self.devices {
                    for (acc, b) in bytes.iter_mut().zip(device.rom.iter()) {
                        *acc &= b;
                    }
                }
                Phase::Stream {
                    bytes: bytes.to_vec(),
                    cursor: 0,
                }
            }
            other => panic!("unexpected command byte {:#04x}", other),
        };
    }

    fn search_participants(&self, bit_number: u8) -> impl Iterator<Item = &SimDevice> {
        self.participants
            .iter()
            .map(|&d| &self.devices[d])
            .filter(move |device| device.vanish_after_bit.map_or(true, |v| bit_number <= v))
    }

    fn on_read_slot(&mut self) {
        let phase = std::mem::replace(&mut self.phase, Phase::Idle);
        let level = match phase {
            Phase::SearchId { bit_number } => {
                let level = self
                    .search_participants(bit_number)
                    .all(|device| Self::rom_bit(&device.rom, bit_number));
                self.phase = Phase::SearchCmp { bit_number };
                level
            }
            Phase::SearchCmp { bit_number } => {
                let level = self
                    .search_participants(bit_number)
                    .all(|device| !Self::rom_bit(&device.rom, bit_number));
                self.phase = Phase::SearchDir { bit_number };
                level
            }
            Phase::Stream { bytes, mut cursor } => {
                let level = bytes[cursor / 8] & (1 << (cursor % 8)) != 0;
                cursor += 1;
                if cursor < bytes.len() * 8 {
                    self.phase = Phase::Stream { bytes, cursor };
                }
                level
            }
            _ => panic!("read slot in an unexpected protocol phase"),
        };
        self.pending_read = Some(PendingRead {
            released_at: self.now_ns,
            level,
        });
    }

    fn sample(&mut self) -> bool {
        self.transitions += 1;
        if let Some(pending) = self.pending_read.take() {
            assert_eq!(
                self.now_ns,
                pending.released_at + READ_SAMPLE_NS,
                "read sample outside its slot window"
            );
            return pending.level;
        }
        if let Phase::Presence { released_at } = self.phase {
            assert_eq!(
                self.now_ns,
                released_at + PRESENCE_SAMPLE_NS,
                "presence sampled outside its window"
            );
            // any present device pulls the wire low
            return self.devices.is_empty();
        }
        panic!("sense line sampled outside a defined window");
    }
}

#[derive(Clone)]
pub struct SimBus {
    inner: Rc<RefCell<Model>>,
}

impl SimBus {
    pub fn new() -> Self {
        SimBus {
            inner: Rc::new(RefCell::new(Model::new())),
        }
    }

    pub fn add_device(&self, device: SimDevice) {
        self.inner.borrow_mut().devices.push(device);
    }

    pub fn add_sensor(&self, rom: [u8; 8], raw: i16) {
        self.add_device(SimDevice {
            rom,
            scratchpad: scratchpad_raw(raw),
            vanish_after_bit: None,
        });
    }

    pub fn wire(&self) -> SimWire {
        SimWire(self.inner.clone())
    }

    pub fn delay(&self) -> SimDelay {
        SimDelay(self.inner.clone())
    }

    /// Number of drive/sense interactions seen so far.
    pub fn transitions(&self) -> u64 {
        self.inner.borrow().transitions
    }

    /// Virtual time elapsed since construction.
    pub fn elapsed_ns(&self) -> u64 {
        self.inner.borrow().now_ns
    }
}

pub struct SimWire(Rc<RefCell<Model>>);

impl SplitWire for SimWire {
    type Error = SimError;

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.borrow_mut().sample())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.borrow_mut().sample())
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().set_low();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().set_high();
        Ok(())
    }
}

pub struct SimDelay(Rc<RefCell<Model>>);

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.borrow_mut().now_ns += u64::from(ns);
    }
}

/// ROM with a valid trailing checksum.
pub fn rom(family: u8, serial: [u8; 6]) -> [u8; 8] {
    let mut rom = [0u8; 8];
    rom[0] = family;
    rom[1..7].copy_from_slice(&serial);
    rom[7] = compute_crc8(&rom[..7]);
    rom
}

/// Scratchpad holding `raw` with default alarm/config bytes and a valid
/// checksum.
pub fn scratchpad_raw(raw: i16) -> [u8; 9] {
    let [lo, hi] = (raw as u16).to_le_bytes();
    let mut scratchpad = [lo, hi, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10, 0x00];
    scratchpad[8] = compute_crc8(&scratchpad[..8]);
    scratchpad
}
