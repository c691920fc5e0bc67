//! # Timed Events
//!
//! Everything a track can hold is an [`Event`]:
//!
//! ```text
//! Event
//!   ├── Chord(ChordDef)                     pitches, velocity, controllers, sliders
//!   ├── SplittableChord(SplittableChordDef) a chord that knows where the next barline is
//!   ├── Rest(RestDef)                       midi or input rest
//!   ├── ClefChange(ClefChangeDef)           zero duration
//!   └── CautionaryChord(CautionaryChordDef) notation-only echo of a split chord
//! ```
//!
//! Positions are in milliseconds relative to the start of the containing
//! track. Only the two chord variants sound: a cautionary chord never emits
//! note messages and ignores transposition, and a rest never crosses a cut
//! (it is split into two independent rests).

use serde::Deserialize;

use crate::clef::ClefChangeDef;
use crate::envelope::{write_envs, Envelope, EnvelopeWindow, MidiChordSliderDefs, RoundingMode};
use crate::error::{check_range, Result, ScoreError};
use crate::xml::XmlWriter;

/// Controller settings a chord applies to its channel when it starts.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ChordControls {
    pub bank: Option<u8>,
    pub patch: Option<u8>,
    pub mod_wheel: Option<u8>,
    pub expression: Option<u8>,
    pub pan: Option<u8>,
    pub pitch_wheel: Option<u8>,
    pub pitch_wheel_deviation: Option<u8>,
}

impl ChordControls {
    pub fn validate(&self) -> Result<()> {
        let values = [
            ("bank", self.bank),
            ("patch", self.patch),
            ("mod wheel", self.mod_wheel),
            ("expression", self.expression),
            ("pan", self.pan),
            ("pitch wheel", self.pitch_wheel),
            ("pitch wheel deviation", self.pitch_wheel_deviation),
        ];
        for (what, value) in values {
            if let Some(v) = value {
                check_range(what, v as i64, 0, 127)?;
            }
        }
        Ok(())
    }
}

/// A sounding chord.
#[derive(Debug, Clone, PartialEq)]
pub struct ChordDef {
    pub ms_position: u32,
    pub ms_duration: u32,
    pub pitches: Vec<u8>,
    pub velocity: u8,
    pub controls: ChordControls,
    pub sliders: MidiChordSliderDefs,
    /// Set on the piece after a cut: the chord is still sounding, so no
    /// note-ons are sent when it starts.
    pub is_continuation: bool,
    /// Set on the pieces of a chord with sliders that was cut.
    pub slider_window: Option<EnvelopeWindow>,
}

impl ChordDef {
    pub fn new(ms_position: u32, ms_duration: u32, pitches: Vec<u8>, velocity: u8) -> Result<Self> {
        let chord = Self {
            ms_position,
            ms_duration,
            pitches,
            velocity,
            controls: ChordControls::default(),
            sliders: MidiChordSliderDefs::default(),
            is_continuation: false,
            slider_window: None,
        };
        chord.validate()?;
        Ok(chord)
    }

    pub fn with_controls(mut self, controls: ChordControls) -> Result<Self> {
        self.controls = controls;
        self.validate()?;
        Ok(self)
    }

    pub fn with_sliders(mut self, sliders: MidiChordSliderDefs) -> Result<Self> {
        self.sliders = sliders;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ms_duration == 0 {
            return Err(ScoreError::range("chord duration", 0, 1, u32::MAX as i64));
        }
        if self.pitches.is_empty() {
            return Err(ScoreError::structure("a chord must have at least one pitch"));
        }
        validate_pitches(&self.pitches)?;
        check_range("velocity", self.velocity as i64, 1, 127)?;
        self.controls.validate()?;
        self.sliders.validate()?;
        let spread = self.slider_window.map_or(self.ms_duration, |w| w.ms_duration);
        let needed = self.sliders.max_len() as i64;
        if needed > spread as i64 {
            return Err(ScoreError::range(
                "chord duration for its sliders",
                spread as i64,
                needed,
                u32::MAX as i64,
            ));
        }
        if let Some(window) = self.slider_window {
            if window.ms_offset as u64 + self.ms_duration as u64 > window.ms_duration as u64 {
                return Err(ScoreError::structure(format!(
                    "chord piece at {} ms lasting {} ms overruns its {} ms chord",
                    window.ms_offset, self.ms_duration, window.ms_duration
                )));
            }
        }
        Ok(())
    }

    /// The chord's slider envelopes. A piece of a cut chord gets its own
    /// stretch of the whole chord's envelopes.
    pub fn envelopes(&self, channel: u8, rounding: RoundingMode) -> Result<Vec<Envelope>> {
        match self.slider_window {
            None => self.sliders.envelopes(channel, self.ms_duration, rounding),
            Some(window) => self
                .sliders
                .envelopes(channel, window.ms_duration, rounding)?
                .iter()
                .map(|envelope| envelope.window(window.ms_offset, self.ms_duration))
                .collect(),
        }
    }

    fn scale(&mut self, factor: f64) -> Result<()> {
        self.ms_duration = scaled(self.ms_duration, factor)?;
        if let Some(window) = &mut self.slider_window {
            window.ms_offset = scaled(window.ms_offset, factor)?;
            window.ms_duration =
                scaled(window.ms_duration, factor)?.max(window.ms_offset + self.ms_duration);
        }
        self.validate()
    }

    /// Splits the chord `ms_offset` milliseconds after its start.
    ///
    /// The first piece keeps the controllers, the second piece is a
    /// continuation. Both pieces keep the sliders, each windowed onto its
    /// own stretch of the whole chord.
    pub fn split(&self, ms_offset: u32) -> Result<(ChordDef, ChordDef)> {
        if ms_offset == 0 || ms_offset >= self.ms_duration {
            return Err(ScoreError::range(
                "chord split offset",
                ms_offset as i64,
                1,
                self.ms_duration as i64 - 1,
            ));
        }
        let whole = self.slider_window.unwrap_or(EnvelopeWindow {
            ms_offset: 0,
            ms_duration: self.ms_duration,
        });
        let window = |offset: u32| {
            (!self.sliders.is_empty()).then_some(EnvelopeWindow {
                ms_offset: whole.ms_offset + offset,
                ms_duration: whole.ms_duration,
            })
        };
        let mut before = self.clone();
        before.ms_duration = ms_offset;
        before.slider_window = window(0);
        let after = ChordDef {
            ms_position: self.ms_position + ms_offset,
            ms_duration: self.ms_duration - ms_offset,
            pitches: self.pitches.clone(),
            velocity: self.velocity,
            controls: ChordControls::default(),
            sliders: self.sliders.clone(),
            is_continuation: true,
            slider_window: window(ms_offset),
        };
        Ok((before, after))
    }

    fn write_xml(&self, w: &mut XmlWriter, channel: u8, rounding: RoundingMode) -> Result<()> {
        let attrs = self.attrs();
        self.write_element(w, "chord", attrs, channel, rounding)
    }

    fn attrs(&self) -> Vec<(&'static str, String)> {
        let mut attrs = vec![
            ("msPosition", self.ms_position.to_string()),
            ("msDuration", self.ms_duration.to_string()),
            ("pitches", join_pitches(&self.pitches)),
            ("velocity", self.velocity.to_string()),
        ];
        if self.is_continuation {
            attrs.push(("continuation", "true".to_string()));
        }
        attrs
    }

    fn write_element(
        &self,
        w: &mut XmlWriter,
        name: &'static str,
        attrs: Vec<(&'static str, String)>,
        channel: u8,
        rounding: RoundingMode,
    ) -> Result<()> {
        if self.sliders.is_empty() {
            w.empty(name, &attrs);
        } else {
            w.open(name, &attrs);
            write_envs(w, &self.envelopes(channel, rounding)?)?;
            w.close();
        }
        Ok(())
    }
}

/// A chord that reaches the next barline.
///
/// `ms_duration_to_next_barline` lies inside the chord, or equals its
/// duration once the chord has been cut there.
#[derive(Debug, Clone, PartialEq)]
pub struct SplittableChordDef {
    pub chord: ChordDef,
    pub ms_duration_to_next_barline: u32,
    pub lyric: Option<String>,
}

impl SplittableChordDef {
    pub fn new(chord: ChordDef, ms_duration_to_next_barline: u32, lyric: Option<String>) -> Result<Self> {
        let def = Self {
            chord,
            ms_duration_to_next_barline,
            lyric,
        };
        def.validate()?;
        Ok(def)
    }

    pub fn validate(&self) -> Result<()> {
        self.chord.validate()?;
        check_range(
            "duration to next barline",
            self.ms_duration_to_next_barline as i64,
            1,
            self.chord.ms_duration as i64,
        )
    }

    /// Cuts the chord `ms_offset` after its start. The first piece keeps the
    /// lyric and ends at the barline; the second is a continuation.
    pub fn split_at(&self, ms_offset: u32) -> Result<(SplittableChordDef, ChordDef)> {
        let (before, after) = self.chord.split(ms_offset)?;
        let before = SplittableChordDef::new(before, ms_offset, self.lyric.clone())?;
        Ok((before, after))
    }

    /// The sounding piece up to the barline and its cautionary echo after it.
    pub fn split(&self) -> Result<(SplittableChordDef, CautionaryChordDef)> {
        let (before, after) = self.split_at(self.ms_duration_to_next_barline)?;
        let echo = CautionaryChordDef::new(after.ms_position, after.ms_duration, after.pitches)?;
        Ok((before, echo))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestKind {
    #[default]
    Midi,
    Input,
}

/// Silence on an output track (`Midi`) or on a performer's input voice (`Input`).
#[derive(Debug, Clone, PartialEq)]
pub struct RestDef {
    pub ms_position: u32,
    pub ms_duration: u32,
    pub kind: RestKind,
}

impl RestDef {
    pub fn midi(ms_position: u32, ms_duration: u32) -> Result<Self> {
        Self::new(ms_position, ms_duration, RestKind::Midi)
    }

    pub fn input(ms_position: u32, ms_duration: u32) -> Result<Self> {
        Self::new(ms_position, ms_duration, RestKind::Input)
    }

    fn new(ms_position: u32, ms_duration: u32, kind: RestKind) -> Result<Self> {
        check_range("rest duration", ms_duration as i64, 1, u32::MAX as i64)?;
        Ok(Self {
            ms_position,
            ms_duration,
            kind,
        })
    }

    /// Two independent rests meeting `ms_offset` after the start.
    pub fn split(&self, ms_offset: u32) -> Result<(RestDef, RestDef)> {
        check_range(
            "rest split offset",
            ms_offset as i64,
            1,
            self.ms_duration as i64 - 1,
        )?;
        Ok((
            RestDef::new(self.ms_position, ms_offset, self.kind)?,
            RestDef::new(
                self.ms_position + ms_offset,
                self.ms_duration - ms_offset,
                self.kind,
            )?,
        ))
    }
}

/// Notation-only copy of a split chord's pitches. It never sounds.
#[derive(Debug, Clone, PartialEq)]
pub struct CautionaryChordDef {
    pub ms_position: u32,
    pub ms_duration: u32,
    pub pitches: Vec<u8>,
}

impl CautionaryChordDef {
    pub fn new(ms_position: u32, ms_duration: u32, pitches: Vec<u8>) -> Result<Self> {
        check_range("cautionary chord duration", ms_duration as i64, 1, u32::MAX as i64)?;
        if pitches.is_empty() {
            return Err(ScoreError::structure(
                "a cautionary chord must have at least one pitch",
            ));
        }
        validate_pitches(&pitches)?;
        Ok(Self {
            ms_position,
            ms_duration,
            pitches,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Chord(ChordDef),
    SplittableChord(SplittableChordDef),
    Rest(RestDef),
    ClefChange(ClefChangeDef),
    CautionaryChord(CautionaryChordDef),
}

impl Event {
    pub fn ms_position(&self) -> u32 {
        match self {
            Event::Chord(c) => c.ms_position,
            Event::SplittableChord(s) => s.chord.ms_position,
            Event::Rest(r) => r.ms_position,
            Event::ClefChange(c) => c.ms_position,
            Event::CautionaryChord(c) => c.ms_position,
        }
    }

    pub fn set_ms_position(&mut self, ms_position: u32) {
        match self {
            Event::Chord(c) => c.ms_position = ms_position,
            Event::SplittableChord(s) => s.chord.ms_position = ms_position,
            Event::Rest(r) => r.ms_position = ms_position,
            Event::ClefChange(c) => c.ms_position = ms_position,
            Event::CautionaryChord(c) => c.ms_position = ms_position,
        }
    }

    pub fn ms_duration(&self) -> u32 {
        match self {
            Event::Chord(c) => c.ms_duration,
            Event::SplittableChord(s) => s.chord.ms_duration,
            Event::Rest(r) => r.ms_duration,
            Event::ClefChange(c) => c.ms_duration(),
            Event::CautionaryChord(c) => c.ms_duration,
        }
    }

    pub fn end_ms_position(&self) -> u32 {
        self.ms_position() + self.ms_duration()
    }

    /// True for the two chord variants that produce note messages.
    pub fn is_chord(&self) -> bool {
        matches!(self, Event::Chord(_) | Event::SplittableChord(_))
    }

    /// The sounding chord, if any.
    pub fn chord(&self) -> Option<&ChordDef> {
        match self {
            Event::Chord(c) => Some(c),
            Event::SplittableChord(s) => Some(&s.chord),
            _ => None,
        }
    }

    pub fn pitches(&self) -> Option<&[u8]> {
        match self {
            Event::Chord(c) => Some(&c.pitches),
            Event::SplittableChord(s) => Some(&s.chord.pitches),
            Event::CautionaryChord(c) => Some(&c.pitches),
            Event::Rest(_) | Event::ClefChange(_) => None,
        }
    }

    /// Multiplies the duration by `factor`, rounding to the nearest millisecond.
    ///
    /// Clef changes have no duration to scale.
    pub fn adjust_ms_duration(&mut self, factor: f64) -> Result<()> {
        if !(factor > 0.0) || !factor.is_finite() {
            return Err(ScoreError::UnsupportedOperation(format!(
                "duration factor must be positive, got {}",
                factor
            )));
        }
        let mut updated = self.clone();
        match &mut updated {
            Event::Chord(c) => c.scale(factor)?,
            Event::SplittableChord(s) => {
                s.chord.scale(factor)?;
                s.ms_duration_to_next_barline = scaled(s.ms_duration_to_next_barline, factor)?;
                s.validate()?;
            }
            Event::Rest(r) => {
                r.ms_duration = scaled(r.ms_duration, factor)?;
                check_range("rest duration", r.ms_duration as i64, 1, u32::MAX as i64)?;
            }
            Event::CautionaryChord(c) => {
                c.ms_duration = scaled(c.ms_duration, factor)?;
                check_range("cautionary chord duration", c.ms_duration as i64, 1, u32::MAX as i64)?;
            }
            Event::ClefChange(c) => c.set_ms_duration(scaled(c.ms_duration(), factor)?)?,
        }
        *self = updated;
        Ok(())
    }

    /// Shifts sounding pitches by `interval` semitones, clamping to 0..=127.
    /// Cautionary chords are left alone.
    pub fn transpose(&mut self, interval: i32) {
        let pitches = match self {
            Event::Chord(c) => &mut c.pitches,
            Event::SplittableChord(s) => &mut s.chord.pitches,
            Event::Rest(_) | Event::ClefChange(_) | Event::CautionaryChord(_) => return,
        };
        for pitch in pitches.iter_mut() {
            *pitch = (*pitch as i32 + interval).clamp(0, 127) as u8;
        }
    }

    pub fn write_xml(&self, w: &mut XmlWriter, channel: u8, rounding: RoundingMode) -> Result<()> {
        match self {
            Event::Chord(c) => c.write_xml(w, channel, rounding)?,
            Event::SplittableChord(s) => {
                let mut attrs = s.chord.attrs();
                attrs.push((
                    "msDurationToNextBarline",
                    s.ms_duration_to_next_barline.to_string(),
                ));
                if let Some(lyric) = &s.lyric {
                    attrs.push(("lyric", lyric.clone()));
                }
                s.chord.write_element(w, "chord", attrs, channel, rounding)?;
            }
            Event::Rest(r) => {
                let mut attrs = vec![
                    ("msPosition", r.ms_position.to_string()),
                    ("msDuration", r.ms_duration.to_string()),
                ];
                if r.kind == RestKind::Input {
                    attrs.push(("input", "true".to_string()));
                }
                w.empty("rest", &attrs);
            }
            Event::ClefChange(c) => c.write_xml(w),
            Event::CautionaryChord(c) => w.empty(
                "cautionaryChord",
                &[
                    ("msPosition", c.ms_position.to_string()),
                    ("msDuration", c.ms_duration.to_string()),
                    ("pitches", join_pitches(&c.pitches)),
                ],
            ),
        }
        Ok(())
    }
}

pub(crate) fn validate_pitches(pitches: &[u8]) -> Result<()> {
    for &pitch in pitches {
        check_range("pitch", pitch as i64, 0, 127)?;
    }
    Ok(())
}

fn scaled(ms_duration: u32, factor: f64) -> Result<u32> {
    let value = (ms_duration as f64 * factor).round();
    if value > u32::MAX as f64 {
        return Err(ScoreError::range("scaled duration", i64::MAX, 0, u32::MAX as i64));
    }
    Ok(value as u32)
}

fn join_pitches(pitches: &[u8]) -> String {
    pitches
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chord(pitches: Vec<u8>) -> Event {
        Event::Chord(ChordDef::new(0, 500, pitches, 100).unwrap())
    }

    fn all_kinds() -> Vec<Event> {
        let splittable = SplittableChordDef::new(
            ChordDef::new(0, 900, vec![48, 55], 80).unwrap(),
            300,
            Some("la".to_string()),
        )
        .unwrap();
        vec![
            chord(vec![60, 64, 67]),
            Event::SplittableChord(splittable),
            Event::Rest(RestDef::midi(500, 300).unwrap()),
            Event::ClefChange(ClefChangeDef::new("b", 800).unwrap()),
            Event::CautionaryChord(CautionaryChordDef::new(800, 200, vec![60]).unwrap()),
        ]
    }

    #[test]
    fn test_chord_validation() {
        assert!(ChordDef::new(0, 0, vec![60], 100).is_err());
        assert!(ChordDef::new(0, 100, vec![], 100).is_err());
        assert!(ChordDef::new(0, 100, vec![128], 100).is_err());
        assert!(ChordDef::new(0, 100, vec![60], 0).is_err());
        assert!(ChordDef::new(0, 100, vec![60], 128).is_err());
    }

    #[test]
    fn test_transpose_clamps() {
        let mut high = chord(vec![120]);
        high.transpose(20);
        assert_eq!(high.pitches().unwrap(), &[127]);

        let mut low = chord(vec![5]);
        low.transpose(-20);
        assert_eq!(low.pitches().unwrap(), &[0]);
    }

    #[test]
    fn test_cautionary_chord_ignores_transposition() {
        for interval in [-200, -20, -1, 0, 1, 20, 200] {
            let mut echo =
                Event::CautionaryChord(CautionaryChordDef::new(0, 100, vec![5, 120]).unwrap());
            echo.transpose(interval);
            assert_eq!(echo.pitches().unwrap(), &[5, 120]);
        }
    }

    #[test]
    fn test_clone_is_independent() {
        for original in all_kinds() {
            let mut copy = original.clone();
            assert_eq!(copy, original);
            copy.set_ms_position(original.ms_position() + 1);
            copy.transpose(3);
            assert_ne!(copy.ms_position(), original.ms_position());
        }
        let original = chord(vec![60]);
        let mut copy = original.clone();
        copy.transpose(1);
        assert_eq!(original.pitches().unwrap(), &[60]);
    }

    #[test]
    fn test_unit_factor_is_identity() {
        for mut event in all_kinds() {
            let before = event.ms_duration();
            if let Event::ClefChange(_) = event {
                assert!(matches!(
                    event.adjust_ms_duration(1.0),
                    Err(ScoreError::UnsupportedOperation(_))
                ));
                continue;
            }
            event.adjust_ms_duration(1.0).unwrap();
            assert_eq!(event.ms_duration(), before);
        }
    }

    #[test]
    fn test_scaling_rounds_to_nearest_ms() {
        let mut rest = Event::Rest(RestDef::midi(0, 333).unwrap());
        rest.adjust_ms_duration(1.5).unwrap();
        assert_eq!(rest.ms_duration(), 500);
        assert!(rest.adjust_ms_duration(0.0).is_err());
        assert!(rest.adjust_ms_duration(-1.0).is_err());
    }

    #[test]
    fn test_scaling_a_chord_to_zero_fails() {
        let mut c = Event::Chord(ChordDef::new(0, 1, vec![60], 100).unwrap());
        assert!(c.adjust_ms_duration(0.1).is_err());
        assert_eq!(c.ms_duration(), 1);
    }

    #[test]
    fn test_splittable_chord_split() {
        let def = SplittableChordDef::new(
            ChordDef::new(200, 900, vec![48, 55], 80).unwrap(),
            300,
            None,
        )
        .unwrap();
        let (before, echo) = def.split().unwrap();
        assert_eq!(before.chord.ms_position, 200);
        assert_eq!(before.chord.ms_duration, 300);
        assert_eq!(before.ms_duration_to_next_barline, 300);
        assert_eq!(echo.ms_position, 500);
        assert_eq!(echo.ms_duration, 600);
        assert_eq!(echo.pitches, vec![48, 55]);
    }

    #[test]
    fn test_splittable_chord_barline_inside_chord() {
        let chord = ChordDef::new(0, 500, vec![60], 100).unwrap();
        assert!(SplittableChordDef::new(chord.clone(), 0, None).is_err());
        assert!(SplittableChordDef::new(chord.clone(), 501, None).is_err());
        let cut = SplittableChordDef::new(chord, 500, Some("la".to_string())).unwrap();
        assert!(cut.split().is_err());
    }

    #[test]
    fn test_splittable_chord_keeps_lyric_when_cut() {
        let def = SplittableChordDef::new(
            ChordDef::new(0, 900, vec![48], 80).unwrap(),
            300,
            Some("la".to_string()),
        )
        .unwrap();
        let (before, after) = def.split_at(200).unwrap();
        assert_eq!(before.lyric.as_deref(), Some("la"));
        assert_eq!(before.ms_duration_to_next_barline, 200);
        assert!(after.is_continuation);
        assert_eq!(after.ms_duration, 700);
    }

    #[test]
    fn test_split_chord_windows_its_sliders() {
        let sliders = MidiChordSliderDefs {
            pan: vec![0, 127],
            ..Default::default()
        };
        let c = ChordDef::new(0, 600, vec![60], 100)
            .unwrap()
            .with_sliders(sliders)
            .unwrap();
        let (before, after) = c.split(400).unwrap();
        let rounding = RoundingMode::default();
        assert_eq!(before.envelopes(0, rounding).unwrap()[0].points, vec![(0, 400)]);
        assert_eq!(
            after.envelopes(0, rounding).unwrap()[0].points,
            vec![(0, 199), (127, 1)]
        );

        let (middle, last) = after.split(150).unwrap();
        assert_eq!(middle.envelopes(0, rounding).unwrap()[0].points, vec![(0, 150)]);
        assert_eq!(
            last.envelopes(0, rounding).unwrap()[0].points,
            vec![(0, 49), (127, 1)]
        );

        let mut w = XmlWriter::new();
        Event::Chord(before).write_xml(&mut w, 0, rounding).unwrap();
        assert!(w.finish().contains("<vt d2=\"0\" msDur=\"400\"/>"));

        let mut scaled = Event::Chord(last);
        scaled.adjust_ms_duration(2.0).unwrap();
        assert_eq!(scaled.ms_duration(), 100);
        let points = &scaled.chord().unwrap().envelopes(0, rounding).unwrap()[0].points;
        assert_eq!(points.iter().map(|&(_, ms)| ms).sum::<u32>(), 100);
    }

    #[test]
    fn test_rest_split_is_two_rests() {
        let (a, b) = RestDef::input(100, 300).unwrap().split(50).unwrap();
        assert_eq!((a.ms_position, a.ms_duration), (100, 50));
        assert_eq!((b.ms_position, b.ms_duration), (150, 250));
        assert_eq!(b.kind, RestKind::Input);
    }

    #[test]
    fn test_chord_split_marks_continuation() {
        let c = ChordDef::new(0, 500, vec![60], 100)
            .unwrap()
            .with_controls(ChordControls {
                patch: Some(4),
                ..Default::default()
            })
            .unwrap();
        let (before, after) = c.split(200).unwrap();
        assert!(!before.is_continuation);
        assert!(after.is_continuation);
        assert_eq!(before.controls.patch, Some(4));
        assert_eq!(after.controls.patch, None);
        assert!(c.split(0).is_err());
        assert!(c.split(500).is_err());
    }

    #[test]
    fn test_event_xml() {
        let mut w = XmlWriter::new();
        for event in all_kinds() {
            event.write_xml(&mut w, 0, RoundingMode::default()).unwrap();
        }
        let xml = w.finish();
        assert!(xml.contains(
            "<chord msPosition=\"0\" msDuration=\"500\" pitches=\"60 64 67\" velocity=\"100\"/>"
        ));
        assert!(xml.contains("msDurationToNextBarline=\"300\" lyric=\"la\""));
        assert!(xml.contains("<rest msPosition=\"500\" msDuration=\"300\"/>"));
        assert!(xml.contains("<clefChange type=\"b\" msPosition=\"800\"/>"));
        assert!(xml.contains("<cautionaryChord msPosition=\"800\" msDuration=\"200\" pitches=\"60\"/>"));
    }
}
