//! Clef markers.
//!
//! Clef identifiers come from a fixed vocabulary of eight symbols:
//! `t`, `t1`, `t2`, `t3` (treble, then one to three octaves higher) and
//! `b`, `b1`, `b2`, `b3` (bass, then one to three octaves lower).
//! Anything else fails with [`ScoreError::UnknownClefType`].

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, ScoreError};
use crate::xml::XmlWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClefType {
    Treble,
    Treble8va,
    Treble15ma,
    Treble22ma,
    Bass,
    Bass8vb,
    Bass15mb,
    Bass22mb,
}

impl ClefType {
    pub const ALL: [ClefType; 8] = [
        ClefType::Treble,
        ClefType::Treble8va,
        ClefType::Treble15ma,
        ClefType::Treble22ma,
        ClefType::Bass,
        ClefType::Bass8vb,
        ClefType::Bass15mb,
        ClefType::Bass22mb,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            ClefType::Treble => "t",
            ClefType::Treble8va => "t1",
            ClefType::Treble15ma => "t2",
            ClefType::Treble22ma => "t3",
            ClefType::Bass => "b",
            ClefType::Bass8vb => "b1",
            ClefType::Bass15mb => "b2",
            ClefType::Bass22mb => "b3",
        }
    }
}

impl FromStr for ClefType {
    type Err = ScoreError;

    fn from_str(s: &str) -> Result<Self> {
        ClefType::ALL
            .iter()
            .copied()
            .find(|clef| clef.symbol() == s)
            .ok_or_else(|| ScoreError::UnknownClefType(s.to_string()))
    }
}

impl fmt::Display for ClefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// The clef a track starts with.
#[derive(Debug, Clone, PartialEq)]
pub struct ClefDef {
    pub clef_type: ClefType,
}

impl ClefDef {
    pub fn new(symbol: &str) -> Result<Self> {
        Ok(Self {
            clef_type: symbol.parse()?,
        })
    }

    pub fn write_xml(&self, w: &mut XmlWriter) {
        w.empty("clef", &[("type", self.clef_type.symbol().to_string())]);
    }
}

/// A zero-duration request to change clef at a position inside a track.
#[derive(Debug, Clone, PartialEq)]
pub struct ClefChangeDef {
    pub clef_type: ClefType,
    pub ms_position: u32,
}

impl ClefChangeDef {
    pub fn new(symbol: &str, ms_position: u32) -> Result<Self> {
        Ok(Self {
            clef_type: symbol.parse()?,
            ms_position,
        })
    }

    /// Clef changes never occupy time.
    pub fn ms_duration(&self) -> u32 {
        0
    }

    pub fn set_ms_duration(&mut self, ms_duration: u32) -> Result<()> {
        Err(ScoreError::UnsupportedOperation(format!(
            "cannot set the duration of a clef change to {} ms",
            ms_duration
        )))
    }

    pub fn write_xml(&self, w: &mut XmlWriter) {
        w.empty(
            "clefChange",
            &[
                ("type", self.clef_type.symbol().to_string()),
                ("msPosition", self.ms_position.to_string()),
            ],
        );
    }
}
