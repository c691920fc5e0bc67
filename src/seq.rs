//! # Sequences
//!
//! A [`Seq`] bundles one track per declared output channel at a position
//! relative to the score. Construction is the structural validator: the
//! candidate tracks are checked in a fixed order and the first failure is
//! reported as [`ScoreError::StructuralInconsistency`].
//!
//! ## Validation Rules (in order)
//! 1. the position is not negative (guaranteed by `u32`)
//! 2. there is at least one candidate track and at least one declared channel
//! 3. every non-empty track begins with a chord or clef change and ends with a
//!    chord, possibly followed by rests
//! 4. some non-empty track begins at relative position 0
//! 5. every track's channel is declared
//! 6. no channel has two non-empty tracks
//!
//! Declared channels without data get an empty track, so every declared
//! channel appears exactly once.
//!
//! ## Lookup and routing
//! The sequence owns a `(channel, msPosition) -> event index` table used to
//! resolve [`TrkRef`]s, and a routing table from notated input pitch to the
//! [`InputNoteDef`] that fires when that pitch is played.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;

use log::debug;

use crate::dispatch::{Binding, TriggerBindings};
use crate::envelope::RoundingMode;
use crate::error::{check_range, Result, ScoreError};
use crate::input::{InputChordDef, InputNoteDef};
use crate::midi::MAX_CHANNEL;
use crate::options::TrkOptions;
use crate::refs::{NoteTrigger, TrkOff, TrkRef};
use crate::trk::Trk;
use crate::xml::XmlWriter;

#[derive(Debug, Clone, PartialEq)]
pub struct Seq {
    ms_position: u32,
    trks: Vec<Trk>,
    fragments: HashMap<(u8, u32), usize>,
    routing: BTreeMap<u8, (InputNoteDef, Option<TrkOptions>)>,
}

impl Seq {
    pub fn new(ms_position: u32, trks: Vec<Trk>, midi_channels: &[u8]) -> Result<Self> {
        if trks.is_empty() {
            return Err(ScoreError::structure("a seq needs at least one candidate track"));
        }
        if midi_channels.is_empty() {
            return Err(ScoreError::structure("a seq needs at least one midi channel"));
        }
        let mut declared = HashSet::new();
        for &channel in midi_channels {
            check_range("midi channel", channel as i64, 0, MAX_CHANNEL as i64)?;
            if !declared.insert(channel) {
                return Err(ScoreError::structure(format!(
                    "midi channel {} is declared twice",
                    channel
                )));
            }
        }

        for trk in &trks {
            trk.check_boundaries()?;
        }

        if !trks
            .iter()
            .any(|trk| !trk.is_empty() && trk.ms_position_re_seq() == 0)
        {
            return Err(ScoreError::structure("no track begins at position 0"));
        }

        for trk in &trks {
            if !declared.contains(&trk.channel()) {
                return Err(ScoreError::structure(format!(
                    "track channel {} is not in the seq's channel list",
                    trk.channel()
                )));
            }
        }

        let mut with_data: HashMap<u8, Trk> = HashMap::new();
        for trk in trks.into_iter().filter(|trk| !trk.is_empty()) {
            let channel = trk.channel();
            if with_data.insert(channel, trk).is_some() {
                return Err(ScoreError::structure(format!(
                    "channel {} has more than one track",
                    channel
                )));
            }
        }

        let n_with_data = with_data.len();
        let trks = midi_channels
            .iter()
            .map(|&channel| match with_data.remove(&channel) {
                Some(trk) => Ok(trk),
                None => Trk::empty(channel, 0),
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "seq at {} ms: {} channels, {} with data",
            ms_position,
            trks.len(),
            n_with_data
        );

        let mut seq = Self {
            ms_position,
            trks,
            fragments: HashMap::new(),
            routing: BTreeMap::new(),
        };
        seq.index_fragments();
        Ok(seq)
    }

    pub fn ms_position(&self) -> u32 {
        self.ms_position
    }

    pub fn set_ms_position(&mut self, ms_position: u32) {
        self.ms_position = ms_position;
    }

    pub fn midi_channels(&self) -> Vec<u8> {
        self.trks.iter().map(|trk| trk.channel()).collect()
    }

    pub fn trks(&self) -> &[Trk] {
        &self.trks
    }

    pub fn trk(&self, channel: u8) -> Option<&Trk> {
        self.trks.iter().find(|trk| trk.channel() == channel)
    }

    /// Channels whose track has events.
    pub fn channels_with_data(&self) -> Vec<u8> {
        self.trks
            .iter()
            .filter(|trk| !trk.is_empty())
            .map(|trk| trk.channel())
            .collect()
    }

    /// Length from the seq's start to the end of its longest track.
    pub fn ms_duration(&self) -> u32 {
        self.trks
            .iter()
            .map(|trk| trk.end_ms_position_re_seq())
            .max()
            .unwrap_or(0)
    }

    /// Index of the event on `channel` that starts at `ms_position_re_seq`.
    pub fn fragment_index(&self, channel: u8, ms_position_re_seq: u32) -> Option<usize> {
        self.fragments.get(&(channel, ms_position_re_seq)).copied()
    }

    /// The track and event range a trkOn refers to.
    pub fn resolve(&self, trk_ref: &TrkRef) -> Result<(&Trk, Range<usize>)> {
        let (trk, start) = self.locate(trk_ref.channel, trk_ref.ms_position)?;
        let end = start + trk_ref.n_midi_objects;
        if end > trk.len() {
            return Err(ScoreError::structure(format!(
                "trkOn on channel {} at {} ms asks for {} events but only {} remain",
                trk_ref.channel,
                trk_ref.ms_position,
                trk_ref.n_midi_objects,
                trk.len() - start
            )));
        }
        Ok((trk, start..end))
    }

    /// The track and start index a trkOff refers to.
    pub fn resolve_off(&self, trk_off: &TrkOff) -> Result<(&Trk, usize)> {
        self.locate(trk_off.channel, trk_off.ms_position)
    }

    /// Adds a routing entry for `note.notated_pitch`. Every reference the
    /// note makes must resolve in this seq.
    pub fn bind(&mut self, note: InputNoteDef, chord_options: Option<TrkOptions>) -> Result<()> {
        if self.routing.contains_key(&note.notated_pitch) {
            return Err(ScoreError::structure(format!(
                "notated pitch {} is already bound",
                note.notated_pitch
            )));
        }
        for trigger in [&note.note_on, &note.note_off].into_iter().flatten() {
            self.check_trigger(trigger)?;
        }
        for pressure in &note.pressures {
            if self.trk(pressure.channel).is_none() {
                return Err(ScoreError::structure(format!(
                    "pressure routed to undeclared channel {}",
                    pressure.channel
                )));
            }
        }
        self.routing.insert(note.notated_pitch, (note, chord_options));
        Ok(())
    }

    /// Binds every note of `chord`, with the chord's options as their default.
    pub fn bind_chord(&mut self, chord: &InputChordDef) -> Result<()> {
        for note in &chord.input_notes {
            self.bind(note.clone(), chord.options.clone())?;
        }
        Ok(())
    }

    pub fn bound_pitches(&self) -> Vec<u8> {
        self.routing.keys().copied().collect()
    }

    pub fn transpose(&mut self, interval: i32) {
        for trk in &mut self.trks {
            trk.transpose(interval);
        }
    }

    pub fn write_xml(&self, w: &mut XmlWriter, rounding: RoundingMode) -> Result<()> {
        w.open("seqDef", &[("msPosition", self.ms_position.to_string())]);
        for trk in &self.trks {
            trk.write_xml(w, rounding)?;
        }
        if !self.routing.is_empty() {
            w.open("inputNotes", &[]);
            for (note, _) in self.routing.values() {
                note.write_xml(w);
            }
            w.close();
        }
        w.close();
        Ok(())
    }

    fn locate(&self, channel: u8, ms_position_re_seq: u32) -> Result<(&Trk, usize)> {
        let trk = self.trk(channel).ok_or_else(|| {
            ScoreError::structure(format!("channel {} is not in this seq", channel))
        })?;
        let index = self.fragment_index(channel, ms_position_re_seq).ok_or_else(|| {
            ScoreError::structure(format!(
                "no event on channel {} starts at {} ms",
                channel, ms_position_re_seq
            ))
        })?;
        Ok((trk, index))
    }

    fn check_trigger(&self, trigger: &NoteTrigger) -> Result<()> {
        if let Some(seq_ref) = &trigger.seq_ref {
            for trk_on in seq_ref {
                self.resolve(trk_on)?;
            }
        }
        for trk_off in &trigger.trk_offs {
            self.resolve_off(trk_off)?;
        }
        Ok(())
    }

    fn index_fragments(&mut self) {
        self.fragments.clear();
        for trk in &self.trks {
            for (index, event) in trk.events().iter().enumerate() {
                let key = (trk.channel(), trk.ms_position_re_seq() + event.ms_position());
                self.fragments.entry(key).or_insert(index);
            }
        }
    }
}

impl TriggerBindings for Seq {
    fn binding(&self, pitch: u8) -> Option<Binding<'_>> {
        self.routing.get(&pitch).map(|(note, chord_options)| Binding {
            note,
            chord_options: chord_options.as_ref(),
        })
    }
}
