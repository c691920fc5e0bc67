//! # Track References
//!
//! References identify tracks without owning them: a channel plus a position
//! (relative to the containing sequence), resolved through the sequence's
//! lookup table when an input event fires.
//!
//! ```text
//! NoteTrigger (noteOn / noteOff)
//!   ├── seq: Option<SeqRef>     tracks started together
//!   │     ├── options            shared baseline
//!   │     └── TrkOns             ordered, non-empty
//!   └── trkOffs: TrkOffs         tracks stopped
//! Pressures                      channels receiving continuous input
//! ```

use std::collections::HashSet;

use crate::error::{check_range, Result, ScoreError};
use crate::midi::MAX_CHANNEL;
use crate::options::TrkOptions;
use crate::xml::XmlWriter;

/// Starts `n_midi_objects` events of the track on `channel`, beginning with
/// the event at `ms_position`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrkRef {
    pub channel: u8,
    pub ms_position: u32,
    pub n_midi_objects: usize,
    pub options: Option<TrkOptions>,
}

pub type TrkOn = TrkRef;
pub type TrkOns = Vec<TrkOn>;
pub type TrkOffs = Vec<TrkOff>;
pub type Pressures = Vec<Pressure>;

impl TrkRef {
    pub fn new(channel: u8, ms_position: u32, n_midi_objects: usize) -> Result<Self> {
        check_channel(channel)?;
        if n_midi_objects == 0 {
            return Err(ScoreError::range("nMidiObjects", 0, 1, i64::MAX));
        }
        Ok(Self {
            channel,
            ms_position,
            n_midi_objects,
            options: None,
        })
    }

    pub fn with_options(mut self, options: TrkOptions) -> Result<Self> {
        options.validate()?;
        self.options = Some(options);
        Ok(self)
    }

    pub fn write_xml(&self, w: &mut XmlWriter) {
        let attrs = [
            ("midiChannel", self.channel.to_string()),
            ("msPosition", self.ms_position.to_string()),
            ("nMidiObjects", self.n_midi_objects.to_string()),
        ];
        write_with_options(w, "trkOn", &attrs, self.options.as_ref());
    }
}

/// Stops the track on `channel` that started at `ms_position`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrkOff {
    pub channel: u8,
    pub ms_position: u32,
    pub options: Option<TrkOptions>,
}

impl TrkOff {
    pub fn new(channel: u8, ms_position: u32) -> Result<Self> {
        check_channel(channel)?;
        Ok(Self {
            channel,
            ms_position,
            options: None,
        })
    }

    pub fn with_options(mut self, options: TrkOptions) -> Result<Self> {
        options.validate()?;
        self.options = Some(options);
        Ok(self)
    }

    pub fn write_xml(&self, w: &mut XmlWriter) {
        let attrs = [
            ("midiChannel", self.channel.to_string()),
            ("msPosition", self.ms_position.to_string()),
        ];
        write_with_options(w, "trkOff", &attrs, self.options.as_ref());
    }
}

/// Tracks that fire together.
#[derive(Debug, Clone, PartialEq)]
pub struct SeqRef {
    trk_ons: TrkOns,
    options: Option<TrkOptions>,
}

impl SeqRef {
    /// At most one track per channel: channel ownership is exclusive.
    pub fn new(trk_ons: TrkOns, options: Option<TrkOptions>) -> Result<Self> {
        if trk_ons.is_empty() {
            return Err(ScoreError::structure("a seq reference needs at least one trkOn"));
        }
        let mut channels = HashSet::new();
        for trk_on in &trk_ons {
            if !channels.insert(trk_on.channel) {
                return Err(ScoreError::structure(format!(
                    "channel {} is started twice by the same seq reference",
                    trk_on.channel
                )));
            }
        }
        if let Some(options) = &options {
            options.validate()?;
        }
        Ok(Self { trk_ons, options })
    }

    pub fn trk_ons(&self) -> &[TrkOn] {
        &self.trk_ons
    }

    pub fn options(&self) -> Option<&TrkOptions> {
        self.options.as_ref()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrkOn> {
        self.trk_ons.iter()
    }

    pub fn write_xml(&self, w: &mut XmlWriter) {
        w.open("seq", &[]);
        if let Some(options) = &self.options {
            options.write_xml(w);
        }
        for trk_on in &self.trk_ons {
            trk_on.write_xml(w);
        }
        w.close();
    }
}

impl<'a> IntoIterator for &'a SeqRef {
    type Item = &'a TrkOn;
    type IntoIter = std::slice::Iter<'a, TrkOn>;

    fn into_iter(self) -> Self::IntoIter {
        self.trk_ons.iter()
    }
}

/// Routes the performer's continuous input to `channel`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pressure {
    pub channel: u8,
    pub options: Option<TrkOptions>,
}

impl Pressure {
    pub fn new(channel: u8, options: Option<TrkOptions>) -> Result<Self> {
        check_channel(channel)?;
        if let Some(options) = &options {
            options.validate()?;
        }
        Ok(Self { channel, options })
    }

    pub fn write_xml(&self, w: &mut XmlWriter) {
        write_with_options(
            w,
            "pressure",
            &[("midiChannel", self.channel.to_string())],
            self.options.as_ref(),
        );
    }
}

pub fn write_pressures(w: &mut XmlWriter, pressures: &[Pressure]) {
    if pressures.is_empty() {
        return;
    }
    w.open("pressures", &[]);
    for pressure in pressures {
        pressure.write_xml(w);
    }
    w.close();
}

/// What a noteOn or noteOff does: start a seq, stop some tracks, or both.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteTrigger {
    pub seq_ref: Option<SeqRef>,
    pub trk_offs: TrkOffs,
}

impl NoteTrigger {
    pub fn new(seq_ref: Option<SeqRef>, trk_offs: TrkOffs) -> Result<Self> {
        if seq_ref.is_none() && trk_offs.is_empty() {
            return Err(ScoreError::structure(
                "a note trigger must start or stop at least one track",
            ));
        }
        if let Some(seq_ref) = &seq_ref {
            for trk_off in &trk_offs {
                if seq_ref.iter().any(|on| on.channel == trk_off.channel) {
                    return Err(ScoreError::structure(format!(
                        "channel {} is both started and stopped by the same trigger",
                        trk_off.channel
                    )));
                }
            }
        }
        Ok(Self { seq_ref, trk_offs })
    }

    pub fn starting(seq_ref: SeqRef) -> Self {
        Self {
            seq_ref: Some(seq_ref),
            trk_offs: vec![],
        }
    }

    pub fn stopping(trk_offs: TrkOffs) -> Result<Self> {
        Self::new(None, trk_offs)
    }

    /// `name` is `noteOn` or `noteOff`.
    pub fn write_xml(&self, w: &mut XmlWriter, name: &'static str) {
        w.open(name, &[]);
        if let Some(seq_ref) = &self.seq_ref {
            seq_ref.write_xml(w);
        }
        if !self.trk_offs.is_empty() {
            w.open("trkOffs", &[]);
            for trk_off in &self.trk_offs {
                trk_off.write_xml(w);
            }
            w.close();
        }
        w.close();
    }
}

fn check_channel(channel: u8) -> Result<()> {
    check_range("midi channel", channel as i64, 0, MAX_CHANNEL as i64)
}

fn write_with_options(
    w: &mut XmlWriter,
    name: &'static str,
    attrs: &[(&'static str, String)],
    options: Option<&TrkOptions>,
) {
    match options {
        Some(options) => {
            w.open(name, attrs);
            options.write_xml(w);
            w.close();
        }
        None => w.empty(name, attrs),
    }
}
