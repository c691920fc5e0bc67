//! # Tracks
//!
//! A [`Trk`] is an ordered, contiguous list of events for one MIDI channel.
//! Event positions are relative to the start of the track; the track's own
//! position is relative to its sequence.
//!
//! A track that belongs to a sequence must begin with a chord or a clef
//! change, and its last event other than a trailing rest must be a chord
//! (see [`Trk::check_boundaries`]). Pitch continuity is never lost at
//! either end.

use log::trace;
use serde::Deserialize;

use crate::clef::ClefDef;
use crate::envelope::RoundingMode;
use crate::error::{check_range, Result, ScoreError};
use crate::event::{CautionaryChordDef, ChordDef, Event};
use crate::midi::MAX_CHANNEL;
use crate::xml::XmlWriter;

/// How a chord crossing a cut is represented after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SplitMode {
    /// The chord is still sounding: a continuation chord without note-ons.
    Continuation,
    /// Notation only: a cautionary chord with the same pitches.
    #[default]
    Cautionary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trk {
    channel: u8,
    ms_position_re_seq: u32,
    clef: Option<ClefDef>,
    events: Vec<Event>,
}

impl Trk {
    /// Builds a track, laying `events` out end to end from position 0.
    pub fn new(channel: u8, ms_position_re_seq: u32, events: Vec<Event>) -> Result<Self> {
        check_range("midi channel", channel as i64, 0, MAX_CHANNEL as i64)?;
        let mut trk = Self {
            channel,
            ms_position_re_seq,
            clef: None,
            events,
        };
        trk.set_positions();
        Ok(trk)
    }

    pub fn empty(channel: u8, ms_position_re_seq: u32) -> Result<Self> {
        Self::new(channel, ms_position_re_seq, vec![])
    }

    pub fn with_clef(mut self, clef: ClefDef) -> Self {
        self.clef = Some(clef);
        self
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn ms_position_re_seq(&self) -> u32 {
        self.ms_position_re_seq
    }

    pub fn set_ms_position_re_seq(&mut self, ms_position: u32) {
        self.ms_position_re_seq = ms_position;
    }

    pub fn clef(&self) -> Option<&ClefDef> {
        self.clef.as_ref()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn ms_duration(&self) -> u32 {
        self.events.iter().map(|e| e.ms_duration()).sum()
    }

    pub fn end_ms_position_re_seq(&self) -> u32 {
        self.ms_position_re_seq + self.ms_duration()
    }

    /// Appends an event after the current last one.
    pub fn push(&mut self, mut event: Event) {
        event.set_ms_position(self.ms_duration());
        self.events.push(event);
    }

    /// Index of the event starting at `ms_position_re_seq`, if any.
    pub fn index_at(&self, ms_position_re_seq: u32) -> Option<usize> {
        let local = ms_position_re_seq.checked_sub(self.ms_position_re_seq)?;
        self.events.iter().position(|e| e.ms_position() == local)
    }

    /// A non-empty track starts with a chord or clef change. Trailing rests
    /// may follow its last chord, but nothing else may.
    pub fn check_boundaries(&self) -> Result<()> {
        let Some(first) = self.events.first() else {
            return Ok(());
        };
        if !(first.is_chord() || matches!(first, Event::ClefChange(_))) {
            return Err(ScoreError::structure(format!(
                "track on channel {} must begin with a chord or a clef change",
                self.channel
            )));
        }
        let last = self
            .events
            .iter()
            .rev()
            .find(|e| !matches!(e, Event::Rest(_)));
        if !last.is_some_and(|e| e.is_chord()) {
            return Err(ScoreError::structure(format!(
                "track on channel {} must end with a chord or a chord and rests",
                self.channel
            )));
        }
        Ok(())
    }

    pub fn transpose(&mut self, interval: i32) {
        for event in &mut self.events {
            event.transpose(interval);
        }
    }

    /// Scales every duration by `factor`. Clef changes keep their zero
    /// duration. Either every event is scaled or none is.
    pub fn adjust_ms_durations(&mut self, factor: f64) -> Result<()> {
        let mut events = self.events.clone();
        for event in events.iter_mut() {
            if !matches!(event, Event::ClefChange(_)) {
                event.adjust_ms_duration(factor)?;
            }
        }
        self.events = events;
        self.set_positions();
        Ok(())
    }

    /// Cuts the track at `cut_re_seq`.
    ///
    /// Events that start before the cut go left, the rest go right. A chord
    /// crossing the cut is split according to `mode`; a rest crossing it
    /// becomes two independent rests. The right-hand track starts at the cut.
    pub fn split_at(&self, cut_re_seq: u32, mode: SplitMode) -> Result<(Trk, Trk)> {
        if cut_re_seq <= self.ms_position_re_seq {
            return Ok((Trk::empty(self.channel, self.ms_position_re_seq)?, self.clone()));
        }
        if cut_re_seq >= self.end_ms_position_re_seq() {
            return Ok((self.clone(), Trk::empty(self.channel, cut_re_seq)?));
        }

        let cut = cut_re_seq - self.ms_position_re_seq;
        let mut left = vec![];
        let mut right = vec![];
        for event in &self.events {
            let (start, end) = (event.ms_position(), event.end_ms_position());
            if end <= cut && start < cut {
                left.push(event.clone());
            } else if start >= cut {
                right.push(event.clone());
            } else {
                let (before, after) = split_event(event, cut - start, mode)?;
                left.push(before);
                right.push(after);
            }
        }
        trace!(
            "split channel {} at {}: {} + {} events",
            self.channel,
            cut_re_seq,
            left.len(),
            right.len()
        );
        let mut left = Trk::new(self.channel, self.ms_position_re_seq, left)?;
        left.clef = self.clef.clone();
        Ok((left, Trk::new(self.channel, cut_re_seq, right)?))
    }

    pub fn write_xml(&self, w: &mut XmlWriter, rounding: RoundingMode) -> Result<()> {
        w.open(
            "trk",
            &[
                ("midiChannel", self.channel.to_string()),
                ("msPosition", self.ms_position_re_seq.to_string()),
            ],
        );
        if let Some(clef) = &self.clef {
            clef.write_xml(w);
        }
        for event in &self.events {
            event.write_xml(w, self.channel, rounding)?;
        }
        w.close();
        Ok(())
    }

    fn set_positions(&mut self) {
        let mut ms_position = 0;
        for event in &mut self.events {
            event.set_ms_position(ms_position);
            ms_position += event.ms_duration();
        }
    }
}

fn split_event(event: &Event, ms_offset: u32, mode: SplitMode) -> Result<(Event, Event)> {
    match event {
        Event::Chord(chord) => {
            let (before, after) = chord.split(ms_offset)?;
            Ok((Event::Chord(before), continued(after, mode)?))
        }
        Event::SplittableChord(def)
            if mode == SplitMode::Cautionary && ms_offset == def.ms_duration_to_next_barline =>
        {
            let (before, echo) = def.split()?;
            Ok((Event::SplittableChord(before), Event::CautionaryChord(echo)))
        }
        Event::SplittableChord(def) => {
            let (before, after) = def.split_at(ms_offset)?;
            Ok((Event::SplittableChord(before), continued(after, mode)?))
        }
        Event::Rest(rest) => {
            let (before, after) = rest.split(ms_offset)?;
            Ok((Event::Rest(before), Event::Rest(after)))
        }
        Event::CautionaryChord(echo) => {
            let before = CautionaryChordDef::new(echo.ms_position, ms_offset, echo.pitches.clone())?;
            let after = CautionaryChordDef::new(
                echo.ms_position + ms_offset,
                echo.ms_duration - ms_offset,
                echo.pitches.clone(),
            )?;
            Ok((Event::CautionaryChord(before), Event::CautionaryChord(after)))
        }
        Event::ClefChange(_) => Err(ScoreError::UnsupportedOperation(
            "a clef change has no duration to split".to_string(),
        )),
    }
}

/// The piece of a cut chord after the cut.
fn continued(after: ChordDef, mode: SplitMode) -> Result<Event> {
    match mode {
        SplitMode::Continuation => Ok(Event::Chord(after)),
        SplitMode::Cautionary => Ok(Event::CautionaryChord(CautionaryChordDef::new(
            after.ms_position,
            after.ms_duration,
            after.pitches,
        )?)),
    }
}
