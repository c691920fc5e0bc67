//! # MIDI Channel Voice Messages
//!
//! [`MidiMsg`] is an immutable, validated `(status, data1, data2?)` triple.
//! Only channel voice messages (status `0x80..=0xEF`) are representable.
//!
//! ## Serialized form
//! A message is written as the `m` attribute of a `msg` element:
//! the status byte in uppercase hex followed by the data bytes in decimal,
//! e.g. `0x80 60 64` or `0xC3 12`.

use crate::error::{check_range, Result, ScoreError};
use crate::xml::XmlWriter;

pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const AFTERTOUCH: u8 = 0xA0;
pub const CONTROL_CHANGE: u8 = 0xB0;
pub const PROGRAM_CHANGE: u8 = 0xC0;
pub const CHANNEL_PRESSURE: u8 = 0xD0;
pub const PITCH_WHEEL: u8 = 0xE0;

/// Controller numbers used by the engine.
pub mod cc {
    pub const BANK: u8 = 0;
    pub const MODULATION: u8 = 1;
    pub const DATA_ENTRY: u8 = 6;
    pub const VOLUME: u8 = 7;
    pub const PAN: u8 = 10;
    pub const EXPRESSION: u8 = 11;
    pub const RPN_LSB: u8 = 100;
    pub const RPN_MSB: u8 = 101;
}

pub const MAX_CHANNEL: u8 = 15;

/// One channel voice message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MidiMsg {
    status: u8,
    data1: u8,
    data2: Option<u8>,
}

impl MidiMsg {
    /// Validates and builds a message.
    ///
    /// Program change and channel pressure take no `data2`; every other
    /// command requires one.
    pub fn new(status: u8, data1: u8, data2: Option<u8>) -> Result<Self> {
        check_range("status byte", status as i64, 0x80, 0xEF)?;
        check_range("data1", data1 as i64, 0, 127)?;
        let command = status & 0xF0;
        let single = matches!(command, PROGRAM_CHANGE | CHANNEL_PRESSURE);
        match (single, data2) {
            (true, Some(_)) => {
                return Err(ScoreError::UnsupportedOperation(format!(
                    "status 0x{:02X} takes a single data byte",
                    status
                )))
            }
            (false, None) => {
                return Err(ScoreError::UnsupportedOperation(format!(
                    "status 0x{:02X} requires two data bytes",
                    status
                )))
            }
            (false, Some(d2)) => check_range("data2", d2 as i64, 0, 127)?,
            (true, None) => {}
        }
        Ok(Self {
            status,
            data1,
            data2,
        })
    }

    pub fn note_on(channel: u8, pitch: u8, velocity: u8) -> Result<Self> {
        Self::new(status(NOTE_ON, channel)?, pitch, Some(velocity))
    }

    pub fn note_off(channel: u8, pitch: u8, velocity: u8) -> Result<Self> {
        Self::new(status(NOTE_OFF, channel)?, pitch, Some(velocity))
    }

    pub fn control_change(channel: u8, controller: u8, value: u8) -> Result<Self> {
        Self::new(status(CONTROL_CHANGE, channel)?, controller, Some(value))
    }

    pub fn program_change(channel: u8, patch: u8) -> Result<Self> {
        Self::new(status(PROGRAM_CHANGE, channel)?, patch, None)
    }

    pub fn aftertouch(channel: u8, pitch: u8, value: u8) -> Result<Self> {
        Self::new(status(AFTERTOUCH, channel)?, pitch, Some(value))
    }

    pub fn channel_pressure(channel: u8, value: u8) -> Result<Self> {
        Self::new(status(CHANNEL_PRESSURE, channel)?, value, None)
    }

    /// Seven-bit pitch wheel: both data bytes carry `value`.
    pub fn pitch_wheel(channel: u8, value: u8) -> Result<Self> {
        Self::new(status(PITCH_WHEEL, channel)?, value, Some(value))
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn data1(&self) -> u8 {
        self.data1
    }

    pub fn data2(&self) -> Option<u8> {
        self.data2
    }

    pub fn command(&self) -> u8 {
        self.status & 0xF0
    }

    pub fn channel(&self) -> u8 {
        self.status & 0x0F
    }

    /// True for `0x8n` messages and for `0x9n` with velocity 0.
    pub fn is_note_off(&self) -> bool {
        match self.command() {
            NOTE_OFF => true,
            NOTE_ON => self.data2 == Some(0),
            _ => false,
        }
    }

    pub fn is_note_on(&self) -> bool {
        self.command() == NOTE_ON && !self.is_note_off()
    }

    /// The value of the `m` attribute.
    pub fn m_attribute(&self) -> String {
        match self.data2 {
            Some(d2) => format!("0x{:02X} {} {}", self.status, self.data1, d2),
            None => format!("0x{:02X} {}", self.status, self.data1),
        }
    }

    pub fn write_xml(&self, w: &mut XmlWriter, ms_duration: Option<u32>) {
        let mut attrs = vec![("m", self.m_attribute())];
        if let Some(ms) = ms_duration {
            attrs.push(("msDur", ms.to_string()));
        }
        w.empty("msg", &attrs);
    }
}

/// Combines a command nibble with a channel.
pub fn status(command: u8, channel: u8) -> Result<u8> {
    check_range("midi channel", channel as i64, 0, MAX_CHANNEL as i64)?;
    Ok(command | channel)
}

/// Writes a `noteOffs` element. Empty lists write nothing.
pub fn write_note_offs(w: &mut XmlWriter, msgs: &[MidiMsg], ms_duration: Option<u32>) {
    if msgs.is_empty() {
        return;
    }
    w.open("noteOffs", &[]);
    for msg in msgs {
        msg.write_xml(w, ms_duration);
    }
    w.close();
}
