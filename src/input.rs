//! Performer-facing notes and chords.
//!
//! An [`InputNoteDef`] binds a notated pitch to what happens when the
//! performer plays it: the noteOn and noteOff triggers, the channels that
//! receive its continuous input, and a default [`TrkOptions`]. An
//! [`InputChordDef`] groups input notes at one position and may carry a
//! chord-level default that applies to every note without its own.

use std::collections::HashSet;

use crate::dispatch::{Binding, TriggerBindings};
use crate::error::{check_range, Result, ScoreError};
use crate::options::TrkOptions;
use crate::refs::{write_pressures, NoteTrigger, Pressures};
use crate::xml::XmlWriter;

#[derive(Debug, Clone, PartialEq)]
pub struct InputNoteDef {
    pub notated_pitch: u8,
    pub note_on: Option<NoteTrigger>,
    pub note_off: Option<NoteTrigger>,
    pub pressures: Pressures,
    pub options: Option<TrkOptions>,
}

impl InputNoteDef {
    pub fn new(
        notated_pitch: u8,
        note_on: Option<NoteTrigger>,
        note_off: Option<NoteTrigger>,
    ) -> Result<Self> {
        check_range("notated pitch", notated_pitch as i64, 0, 127)?;
        if note_on.is_none() && note_off.is_none() {
            return Err(ScoreError::structure(format!(
                "input note {} has neither a noteOn nor a noteOff",
                notated_pitch
            )));
        }
        Ok(Self {
            notated_pitch,
            note_on,
            note_off,
            pressures: vec![],
            options: None,
        })
    }

    pub fn with_pressures(mut self, pressures: Pressures) -> Self {
        self.pressures = pressures;
        self
    }

    pub fn with_options(mut self, options: TrkOptions) -> Result<Self> {
        options.validate()?;
        self.options = Some(options);
        Ok(self)
    }

    pub fn write_xml(&self, w: &mut XmlWriter) {
        w.open("inputNote", &[("notatedPitch", self.notated_pitch.to_string())]);
        if let Some(options) = &self.options {
            options.write_xml(w);
        }
        if let Some(note_on) = &self.note_on {
            note_on.write_xml(w, "noteOn");
        }
        if let Some(note_off) = &self.note_off {
            note_off.write_xml(w, "noteOff");
        }
        write_pressures(w, &self.pressures);
        w.close();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputChordDef {
    pub ms_position: u32,
    pub ms_duration: u32,
    pub input_notes: Vec<InputNoteDef>,
    pub options: Option<TrkOptions>,
    pub lyric: Option<String>,
}

impl InputChordDef {
    pub fn new(ms_position: u32, ms_duration: u32, input_notes: Vec<InputNoteDef>) -> Result<Self> {
        check_range("input chord duration", ms_duration as i64, 1, u32::MAX as i64)?;
        if input_notes.is_empty() {
            return Err(ScoreError::structure("an input chord needs at least one input note"));
        }
        let mut pitches = HashSet::new();
        for note in &input_notes {
            if !pitches.insert(note.notated_pitch) {
                return Err(ScoreError::structure(format!(
                    "notated pitch {} appears twice in one input chord",
                    note.notated_pitch
                )));
            }
        }
        Ok(Self {
            ms_position,
            ms_duration,
            input_notes,
            options: None,
            lyric: None,
        })
    }

    pub fn with_options(mut self, options: TrkOptions) -> Result<Self> {
        options.validate()?;
        self.options = Some(options);
        Ok(self)
    }

    pub fn with_lyric(mut self, lyric: impl Into<String>) -> Self {
        self.lyric = Some(lyric.into());
        self
    }

    pub fn notated_pitches(&self) -> Vec<u8> {
        self.input_notes.iter().map(|n| n.notated_pitch).collect()
    }

    pub fn write_xml(&self, w: &mut XmlWriter) {
        let mut attrs = vec![
            ("msPosition", self.ms_position.to_string()),
            ("msDuration", self.ms_duration.to_string()),
        ];
        if let Some(lyric) = &self.lyric {
            attrs.push(("lyric", lyric.clone()));
        }
        w.open("inputChord", &attrs);
        if let Some(options) = &self.options {
            options.write_xml(w);
        }
        for note in &self.input_notes {
            note.write_xml(w);
        }
        w.close();
    }
}

impl TriggerBindings for InputChordDef {
    fn binding(&self, pitch: u8) -> Option<Binding<'_>> {
        self.input_notes
            .iter()
            .find(|n| n.notated_pitch == pitch)
            .map(|note| Binding {
                note,
                chord_options: self.options.as_ref(),
            })
    }
}
