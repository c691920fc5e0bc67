//! # Score Documents
//!
//! Engine settings and a whole sequence can be written as YAML. Raw
//! documents are deserialized with `serde_yaml` and converted into the
//! validated domain types, so every construction rule applies to them too.
//!
//! ```yaml
//! engine:
//!   envelope-rounding: half-to-even
//!   force-controller-defaults: true
//! ms-position: 0
//! midi-channels: [0, 1]
//! barlines: [500]
//! trks:
//!   - channel: 0
//!     clef: t
//!     events:
//!       - chord: { ms-duration: 500, pitches: [60, 64], velocity: 100 }
//!       - rest: { ms-duration: 300 }
//!       - chord: { ms-duration: 200, pitches: [62], velocity: 90 }
//! inputs:
//!   - pitch: 60
//!     note-on:
//!       seq:
//!         trk-ons:
//!           - { channel: 0, ms-position: 0, n-midi-objects: 3 }
//! ```

use log::debug;
use serde::Deserialize;

use crate::clef::{ClefChangeDef, ClefDef};
use crate::envelope::{MidiChordSliderDefs, RoundingMode};
use crate::error::{Result, ScoreError};
use crate::event::{CautionaryChordDef, ChordControls, ChordDef, Event, RestDef, SplittableChordDef};
use crate::input::{InputChordDef, InputNoteDef};
use crate::options::TrkOptions;
use crate::refs::{NoteTrigger, Pressure, SeqRef, TrkOff, TrkRef};
use crate::seq::Seq;
use crate::timeline::{self, Bar};
use crate::trk::{SplitMode, Trk};
use crate::xml::XmlWriter;

/// Engine-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineConfig {
    pub envelope_rounding: RoundingMode,
    /// Force unset controllers to their defaults at the first moment.
    pub force_controller_defaults: bool,
    /// How chords crossing a barline appear in the bar after it.
    pub split_mode: SplitMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            envelope_rounding: RoundingMode::HalfToEven,
            force_controller_defaults: true,
            split_mode: SplitMode::Cautionary,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| ScoreError::ConfigError(e.to_string()))
    }
}

/// A validated score document.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreDef {
    pub engine: EngineConfig,
    pub seq: Seq,
    pub barlines: Vec<u32>,
    pub input_chords: Vec<InputChordDef>,
}

impl ScoreDef {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let raw: RawScore =
            serde_yaml::from_str(content).map_err(|e| ScoreError::ConfigError(e.to_string()))?;
        raw.into_score()
    }

    pub fn render(&self) -> Result<Vec<Bar>> {
        timeline::render(&self.seq, &self.barlines, &self.engine)
    }

    /// The sequence, its input chords and its bars as one `score` element.
    pub fn to_xml(&self) -> Result<String> {
        let rounding = self.engine.envelope_rounding;
        let mut w = XmlWriter::new();
        w.open("score", &[("msPosition", self.seq.ms_position().to_string())]);
        self.seq.write_xml(&mut w, rounding)?;
        if !self.input_chords.is_empty() {
            w.open("inputChords", &[]);
            for chord in &self.input_chords {
                chord.write_xml(&mut w);
            }
            w.close();
        }
        for bar in self.render()? {
            bar.write_xml(&mut w, rounding)?;
        }
        w.close();
        Ok(w.finish())
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawScore {
    #[serde(default)]
    engine: EngineConfig,
    #[serde(default)]
    ms_position: i64,
    midi_channels: Vec<u8>,
    trks: Vec<RawTrk>,
    #[serde(default)]
    barlines: Vec<u32>,
    #[serde(default)]
    inputs: Vec<RawInputNote>,
    #[serde(default)]
    input_chords: Vec<RawInputChord>,
}

impl RawScore {
    fn into_score(self) -> Result<ScoreDef> {
        if self.ms_position < 0 {
            return Err(ScoreError::structure(format!(
                "seq position {} is negative",
                self.ms_position
            )));
        }
        let ms_position = u32::try_from(self.ms_position).map_err(|_| {
            ScoreError::range("seq position", self.ms_position, 0, u32::MAX as i64)
        })?;

        let trks = self
            .trks
            .into_iter()
            .map(RawTrk::into_trk)
            .collect::<Result<Vec<_>>>()?;
        let mut seq = Seq::new(ms_position, trks, &self.midi_channels)?;

        for note in self.inputs {
            seq.bind(note.into_note()?, None)?;
        }
        let input_chords = self
            .input_chords
            .into_iter()
            .map(RawInputChord::into_chord)
            .collect::<Result<Vec<_>>>()?;
        for chord in &input_chords {
            seq.bind_chord(chord)?;
        }

        debug!(
            "loaded score: {} channels, {} bound pitches, {} barlines",
            seq.midi_channels().len(),
            seq.bound_pitches().len(),
            self.barlines.len()
        );
        Ok(ScoreDef {
            engine: self.engine,
            seq,
            barlines: self.barlines,
            input_chords,
        })
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
struct RawTrk {
    channel: u8,
    #[serde(default)]
    ms_position: u32,
    clef: Option<String>,
    #[serde(default)]
    events: Vec<RawEvent>,
}

impl RawTrk {
    fn into_trk(self) -> Result<Trk> {
        let events = self
            .events
            .into_iter()
            .map(RawEvent::into_event)
            .collect::<Result<Vec<_>>>()?;
        let trk = Trk::new(self.channel, self.ms_position, events)?;
        match self.clef {
            Some(symbol) => Ok(trk.with_clef(ClefDef::new(&symbol)?)),
            None => Ok(trk),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
enum RawEvent {
    Chord(RawChord),
    SplittableChord(RawSplittableChord),
    Rest(RawRest),
    ClefChange(String),
    CautionaryChord(RawCautionaryChord),
}

impl RawEvent {
    fn into_event(self) -> Result<Event> {
        match self {
            RawEvent::Chord(chord) => Ok(Event::Chord(chord.into_chord()?)),
            RawEvent::SplittableChord(raw) => Ok(Event::SplittableChord(SplittableChordDef::new(
                raw.chord.into_chord()?,
                raw.ms_duration_to_next_barline,
                raw.lyric,
            )?)),
            RawEvent::Rest(rest) if rest.input => Ok(Event::Rest(RestDef::input(0, rest.ms_duration)?)),
            RawEvent::Rest(rest) => Ok(Event::Rest(RestDef::midi(0, rest.ms_duration)?)),
            RawEvent::ClefChange(symbol) => Ok(Event::ClefChange(ClefChangeDef::new(&symbol, 0)?)),
            RawEvent::CautionaryChord(raw) => Ok(Event::CautionaryChord(CautionaryChordDef::new(
                0,
                raw.ms_duration,
                raw.pitches,
            )?)),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
struct RawChord {
    ms_duration: u32,
    pitches: Vec<u8>,
    velocity: u8,
    #[serde(default)]
    controls: ChordControls,
    #[serde(default)]
    sliders: MidiChordSliderDefs,
    #[serde(default)]
    continuation: bool,
}

impl RawChord {
    fn into_chord(self) -> Result<ChordDef> {
        let mut chord = ChordDef::new(0, self.ms_duration, self.pitches, self.velocity)?
            .with_controls(self.controls)?
            .with_sliders(self.sliders)?;
        chord.is_continuation = self.continuation;
        Ok(chord)
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
struct RawSplittableChord {
    #[serde(flatten)]
    chord: RawChord,
    ms_duration_to_next_barline: u32,
    lyric: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
struct RawRest {
    ms_duration: u32,
    #[serde(default)]
    input: bool,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
struct RawCautionaryChord {
    ms_duration: u32,
    pitches: Vec<u8>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
struct RawTrkOn {
    channel: u8,
    ms_position: u32,
    n_midi_objects: usize,
    options: Option<TrkOptions>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
struct RawTrkOff {
    channel: u8,
    ms_position: u32,
    options: Option<TrkOptions>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
struct RawSeqRef {
    options: Option<TrkOptions>,
    trk_ons: Vec<RawTrkOn>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
struct RawTrigger {
    seq: Option<RawSeqRef>,
    #[serde(default)]
    trk_offs: Vec<RawTrkOff>,
}

impl RawTrigger {
    fn into_trigger(self) -> Result<NoteTrigger> {
        let seq_ref = match self.seq {
            Some(raw) => {
                let trk_ons = raw
                    .trk_ons
                    .into_iter()
                    .map(|on| {
                        let trk_on = TrkRef::new(on.channel, on.ms_position, on.n_midi_objects)?;
                        match on.options {
                            Some(options) => trk_on.with_options(options),
                            None => Ok(trk_on),
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;
                Some(SeqRef::new(trk_ons, raw.options)?)
            }
            None => None,
        };
        let trk_offs = self
            .trk_offs
            .into_iter()
            .map(|off| {
                let trk_off = TrkOff::new(off.channel, off.ms_position)?;
                match off.options {
                    Some(options) => trk_off.with_options(options),
                    None => Ok(trk_off),
                }
            })
            .collect::<Result<Vec<_>>>()?;
        NoteTrigger::new(seq_ref, trk_offs)
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
struct RawPressure {
    channel: u8,
    options: Option<TrkOptions>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
struct RawInputNote {
    pitch: u8,
    note_on: Option<RawTrigger>,
    note_off: Option<RawTrigger>,
    #[serde(default)]
    pressures: Vec<RawPressure>,
    options: Option<TrkOptions>,
}

impl RawInputNote {
    fn into_note(self) -> Result<InputNoteDef> {
        let note_on = self.note_on.map(RawTrigger::into_trigger).transpose()?;
        let note_off = self.note_off.map(RawTrigger::into_trigger).transpose()?;
        let pressures = self
            .pressures
            .into_iter()
            .map(|p| Pressure::new(p.channel, p.options))
            .collect::<Result<Vec<_>>>()?;
        let note = InputNoteDef::new(self.pitch, note_on, note_off)?.with_pressures(pressures);
        match self.options {
            Some(options) => note.with_options(options),
            None => Ok(note),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
struct RawInputChord {
    #[serde(default)]
    ms_position: u32,
    ms_duration: u32,
    notes: Vec<RawInputNote>,
    options: Option<TrkOptions>,
    lyric: Option<String>,
}

impl RawInputChord {
    fn into_chord(self) -> Result<InputChordDef> {
        let notes = self
            .notes
            .into_iter()
            .map(RawInputNote::into_note)
            .collect::<Result<Vec<_>>>()?;
        let mut chord = InputChordDef::new(self.ms_position, self.ms_duration, notes)?;
        if let Some(options) = self.options {
            chord = chord.with_options(options)?;
        }
        if let Some(lyric) = self.lyric {
            chord = chord.with_lyric(lyric);
        }
        Ok(chord)
    }
}
