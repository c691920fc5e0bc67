//! # Timeline Walk
//!
//! Renders a [`Seq`] cut at barlines into [`Bar`]s. Each bar holds the
//! notation pieces of every track and, per channel, the [`Moment`]s whose
//! messages a player sends.
//!
//! ## Walk
//! 1. Every track is planned on its own: note-ons and chord controllers at
//!    chord starts, slider envelope messages inside chords, note-offs at
//!    chord ends (a chord followed by a continuation keeps sounding).
//! 2. Bars are visited in order with one [`CarryContext`]. Note-offs due
//!    exactly at a cut are queued in the channel's carried state and sent
//!    first in the next bar. Note-offs due at the end of the sequence are
//!    flushed into a final moment of the last bar.
//! 3. Chord controllers are sent only when they change the channel's
//!    carried value. At position 0 every dimension still unset is forced to
//!    its default, once.
//!
//! ## Ordering
//! Within a moment: note-offs, then note-ons, then controls.

use std::collections::BTreeMap;

use log::{debug, trace};

use crate::carry::CarryContext;
use crate::config::EngineConfig;
use crate::envelope::RoundingMode;
use crate::error::{Result, ScoreError};
use crate::event::{ChordControls, Event};
use crate::midi::{write_note_offs, MidiMsg};
use crate::seq::Seq;
use crate::trk::{SplitMode, Trk};
use crate::xml::XmlWriter;

/// Note-off velocity used for every generated note-off.
pub const NOTE_OFF_VELOCITY: u8 = 64;

/// Messages sent together at one position, relative to the containing bar.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Moment {
    pub ms_position: u32,
    pub note_offs: Vec<MidiMsg>,
    pub note_ons: Vec<MidiMsg>,
    pub controls: Vec<MidiMsg>,
}

impl Moment {
    pub fn new(ms_position: u32) -> Self {
        Self {
            ms_position,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.note_offs.is_empty() && self.note_ons.is_empty() && self.controls.is_empty()
    }

    /// All messages in sending order.
    pub fn messages(&self) -> impl Iterator<Item = &MidiMsg> {
        self.note_offs
            .iter()
            .chain(self.note_ons.iter())
            .chain(self.controls.iter())
    }

    fn merge(&mut self, other: Moment) {
        self.note_offs.extend(other.note_offs);
        self.note_ons.extend(other.note_ons);
        self.controls.extend(other.controls);
    }

    pub fn write_xml(&self, w: &mut XmlWriter) {
        w.open("moment", &[("msPosition", self.ms_position.to_string())]);
        write_note_offs(w, &self.note_offs, None);
        write_msgs(w, "noteOns", &self.note_ons);
        write_msgs(w, "controls", &self.controls);
        w.close();
    }
}

/// One stretch of the sequence between two cuts.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    /// Absolute position of the bar.
    pub ms_position: u32,
    pub ms_duration: u32,
    /// Notation pieces, one per declared channel.
    pub trks: Vec<Trk>,
    pub moments: BTreeMap<u8, Vec<Moment>>,
    /// Controller messages restoring each channel's state at the bar start.
    pub resume: BTreeMap<u8, Vec<MidiMsg>>,
}

impl Bar {
    pub fn moments(&self, channel: u8) -> &[Moment] {
        self.moments.get(&channel).map(|m| m.as_slice()).unwrap_or(&[])
    }

    pub fn write_xml(&self, w: &mut XmlWriter, rounding: RoundingMode) -> Result<()> {
        w.open(
            "bar",
            &[
                ("msPosition", self.ms_position.to_string()),
                ("msDuration", self.ms_duration.to_string()),
            ],
        );
        for trk in &self.trks {
            trk.write_xml(w, rounding)?;
        }
        for (channel, msgs) in &self.resume {
            w.open("resume", &[("midiChannel", channel.to_string())]);
            for msg in msgs {
                msg.write_xml(w, None);
            }
            w.close();
        }
        for (channel, moments) in &self.moments {
            w.open("moments", &[("midiChannel", channel.to_string())]);
            for moment in moments {
                moment.write_xml(w);
            }
            w.close();
        }
        w.close();
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Planned {
    note_offs: Vec<MidiMsg>,
    note_ons: Vec<MidiMsg>,
    controls: Option<ChordControls>,
    envelope: Vec<MidiMsg>,
}

/// Walks `seq` cut at the absolute `barlines`.
///
/// Barlines must be strictly increasing and lie strictly inside the
/// sequence. With no barlines the whole sequence is one bar.
pub fn render(seq: &Seq, barlines: &[u32], config: &EngineConfig) -> Result<Vec<Bar>> {
    let cuts = cuts(seq, barlines)?;
    let channels = seq.midi_channels();
    let mut context = CarryContext::new(&channels)?;

    let mut plans = BTreeMap::new();
    let mut pieces: Vec<Vec<Trk>> = vec![vec![]; cuts.len() - 1];
    for trk in seq.trks() {
        let mut plan = plan_channel(trk, config.envelope_rounding)?;
        if config.force_controller_defaults {
            plan.entry(0).or_default();
        }
        plans.insert(trk.channel(), plan);
        for (index, piece) in split_trk(trk, &cuts, config.split_mode)?.into_iter().enumerate() {
            pieces[index].push(piece);
        }
    }

    let mut bars = Vec::with_capacity(cuts.len() - 1);
    for (window, trks) in cuts.windows(2).zip(pieces) {
        let (start, end) = (window[0], window[1]);
        let mut bar = Bar {
            ms_position: seq.ms_position() + start,
            ms_duration: end - start,
            trks,
            moments: BTreeMap::new(),
            resume: BTreeMap::new(),
        };
        for &channel in &channels {
            let carry = context.get_mut(channel)?;
            let resume = carry.resume_msgs()?;
            if !resume.is_empty() {
                bar.resume.insert(channel, resume);
            }

            let mut moments: Vec<Moment> = vec![];
            let carried = carry.take_note_offs();
            if !carried.is_empty() {
                trace!("channel {}: flushing {} carried note-offs at {}", channel, carried.len(), start);
                moments.push(Moment {
                    note_offs: carried,
                    ..Moment::new(0)
                });
            }

            let plan = plans.get(&channel).ok_or_else(|| {
                ScoreError::structure(format!("channel {} has no track", channel))
            })?;
            for (&position, planned) in plan.range(start..=end) {
                if position == end {
                    for msg in &planned.note_offs {
                        carry.add_note_off(*msg)?;
                    }
                    continue;
                }
                let mut moment = Moment::new(position - start);
                if position > start {
                    moment.note_offs.extend(planned.note_offs.iter().copied());
                }
                moment.note_ons.extend(planned.note_ons.iter().copied());
                if let Some(controls) = &planned.controls {
                    moment.controls.extend(carry.changed_msgs(controls)?);
                }
                for msg in &planned.envelope {
                    carry.observe(msg);
                    moment.controls.push(*msg);
                }
                if position == 0 && config.force_controller_defaults {
                    moment.controls.extend(carry.force_defaults()?);
                }
                push_moment(&mut moments, moment);
            }
            if !moments.is_empty() {
                bar.moments.insert(channel, moments);
            }
        }
        bars.push(bar);
    }

    if let Some(last) = bars.last_mut() {
        for &channel in &channels {
            let note_offs = context.get_mut(channel)?.take_note_offs();
            if !note_offs.is_empty() {
                last.moments.entry(channel).or_default().push(Moment {
                    note_offs,
                    ..Moment::new(last.ms_duration)
                });
            }
        }
    }

    debug!(
        "rendered seq at {} ms into {} bars over {} channels",
        seq.ms_position(),
        bars.len(),
        channels.len()
    );
    Ok(bars)
}

/// Cut positions relative to the seq, framed by 0 and the seq's end.
fn cuts(seq: &Seq, barlines: &[u32]) -> Result<Vec<u32>> {
    let end = seq.ms_duration();
    let mut cuts = vec![0];
    for &barline in barlines {
        let cut = barline
            .checked_sub(seq.ms_position())
            .filter(|&cut| cut > 0 && cut < end)
            .ok_or_else(|| {
                ScoreError::range(
                    "barline position",
                    barline as i64,
                    seq.ms_position() as i64 + 1,
                    (seq.ms_position() + end) as i64 - 1,
                )
            })?;
        if cuts.last().is_some_and(|&last| cut <= last) {
            return Err(ScoreError::structure("barlines must be strictly increasing"));
        }
        cuts.push(cut);
    }
    cuts.push(end);
    Ok(cuts)
}

fn plan_channel(trk: &Trk, rounding: RoundingMode) -> Result<BTreeMap<u32, Planned>> {
    let channel = trk.channel();
    let base = trk.ms_position_re_seq();
    let events = trk.events();
    let mut plan: BTreeMap<u32, Planned> = BTreeMap::new();

    for (index, event) in events.iter().enumerate() {
        let Some(chord) = event.chord() else {
            continue;
        };
        let start = base + event.ms_position();
        let entry = plan.entry(start).or_default();
        if !chord.is_continuation {
            for &pitch in &chord.pitches {
                entry.note_ons.push(MidiMsg::note_on(channel, pitch, chord.velocity)?);
            }
        }
        entry.controls = Some(chord.controls.clone());

        for envelope in chord.envelopes(channel, rounding)? {
            for (offset, msg) in envelope.messages()? {
                plan.entry(start + offset).or_default().envelope.push(msg);
            }
        }

        let continued =
            matches!(events.get(index + 1), Some(Event::Chord(next)) if next.is_continuation);
        if !continued {
            let end = base + event.end_ms_position();
            let note_offs = plan.entry(end).or_default();
            for &pitch in &chord.pitches {
                note_offs
                    .note_offs
                    .push(MidiMsg::note_off(channel, pitch, NOTE_OFF_VELOCITY)?);
            }
        }
    }
    Ok(plan)
}

/// One piece per bar.
fn split_trk(trk: &Trk, cuts: &[u32], mode: SplitMode) -> Result<Vec<Trk>> {
    let inner = &cuts[1..cuts.len() - 1];
    let mut pieces = Vec::with_capacity(inner.len() + 1);
    let mut rest = trk.clone();
    for &cut in inner {
        let (left, right) = rest.split_at(cut, mode)?;
        pieces.push(left);
        rest = right;
    }
    pieces.push(rest);
    Ok(pieces)
}

fn push_moment(moments: &mut Vec<Moment>, moment: Moment) {
    if moment.is_empty() {
        return;
    }
    match moments.last_mut() {
        Some(last) if last.ms_position == moment.ms_position => last.merge(moment),
        _ => moments.push(moment),
    }
}

fn write_msgs(w: &mut XmlWriter, name: &'static str, msgs: &[MidiMsg]) {
    if msgs.is_empty() {
        return;
    }
    w.open(name, &[]);
    for msg in msgs {
        msg.write_xml(w, None);
    }
    w.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carry::Dimension;
    use crate::envelope::MidiChordSliderDefs;
    use crate::event::{ChordDef, RestDef};
    use crate::midi::cc;

    fn chord(ms_duration: u32, pitch: u8) -> Event {
        Event::Chord(ChordDef::new(0, ms_duration, vec![pitch], 100).unwrap())
    }

    fn rest(ms_duration: u32) -> Event {
        Event::Rest(RestDef::midi(0, ms_duration).unwrap())
    }

    fn quiet() -> EngineConfig {
        EngineConfig {
            force_controller_defaults: false,
            ..Default::default()
        }
    }

    fn one_channel(events: Vec<Event>) -> Seq {
        Seq::new(0, vec![Trk::new(0, 0, events).unwrap()], &[0]).unwrap()
    }

    #[test]
    fn test_single_bar() {
        let seq = one_channel(vec![chord(500, 60), rest(300), chord(200, 62)]);
        let bars = render(&seq, &[], &quiet()).unwrap();
        assert_eq!(bars.len(), 1);
        let moments = bars[0].moments(0);
        let positions: Vec<u32> = moments.iter().map(|m| m.ms_position).collect();
        assert_eq!(positions, vec![0, 500, 800, 1000]);
        assert_eq!(moments[0].note_ons, vec![MidiMsg::note_on(0, 60, 100).unwrap()]);
        assert_eq!(moments[1].note_offs, vec![MidiMsg::note_off(0, 60, 64).unwrap()]);
        assert_eq!(moments[3].note_offs, vec![MidiMsg::note_off(0, 62, 64).unwrap()]);
    }

    #[test]
    fn test_note_offs_at_cut_are_carried() {
        let seq = one_channel(vec![chord(500, 60), chord(500, 64)]);
        let bars = render(&seq, &[500], &quiet()).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].moments(0).len(), 1);
        assert!(bars[0].moments(0)[0].note_offs.is_empty());

        let first = &bars[1].moments(0)[0];
        assert_eq!(first.ms_position, 0);
        assert_eq!(first.note_offs, vec![MidiMsg::note_off(0, 60, 64).unwrap()]);
        assert_eq!(first.note_ons, vec![MidiMsg::note_on(0, 64, 100).unwrap()]);
        let order: Vec<bool> = first.messages().map(|m| m.is_note_off()).collect();
        assert_eq!(order, vec![true, false]);
    }

    #[test]
    fn test_final_note_offs_are_flushed() {
        let seq = one_channel(vec![chord(300, 60)]);
        let bars = render(&seq, &[100], &quiet()).unwrap();
        let last = bars[1].moments(0).last().unwrap();
        assert_eq!(last.ms_position, 200);
        assert_eq!(last.note_offs, vec![MidiMsg::note_off(0, 60, 64).unwrap()]);
    }

    #[test]
    fn test_chord_across_barline_sounds_through() {
        let seq = one_channel(vec![chord(600, 60)]);
        let bars = render(&seq, &[400], &quiet()).unwrap();
        assert!(bars[1].moments(0).iter().all(|m| m.note_ons.is_empty()));
        match &bars[1].trks[0].events()[0] {
            Event::CautionaryChord(c) => assert_eq!(c.ms_duration, 200),
            other => panic!("expected cautionary chord, got {:?}", other),
        }

        let config = EngineConfig {
            split_mode: SplitMode::Continuation,
            ..quiet()
        };
        let bars = render(&seq, &[400], &config).unwrap();
        assert!(matches!(&bars[1].trks[0].events()[0], Event::Chord(c) if c.is_continuation));
    }

    #[test]
    fn test_continuation_chords_emit_no_note_ons() {
        let (before, after) = ChordDef::new(0, 600, vec![60], 100).unwrap().split(200).unwrap();
        let seq = one_channel(vec![Event::Chord(before), Event::Chord(after)]);
        let bars = render(&seq, &[], &quiet()).unwrap();
        let moments = bars[0].moments(0);
        assert_eq!(moments.len(), 2);
        assert_eq!(moments[0].note_ons.len(), 1);
        assert_eq!(moments[1].ms_position, 600);
        assert_eq!(moments[1].note_offs.len(), 1);
    }

    #[test]
    fn test_defaults_forced_once_at_first_moment() {
        let controls = ChordControls {
            pan: Some(20),
            ..Default::default()
        };
        let first = ChordDef::new(0, 100, vec![60], 100)
            .unwrap()
            .with_controls(controls.clone())
            .unwrap();
        let second = ChordDef::new(0, 100, vec![60], 100)
            .unwrap()
            .with_controls(controls)
            .unwrap();
        let trk = Trk::new(0, 0, vec![Event::Chord(first), Event::Chord(second)]).unwrap();
        let seq = Seq::new(0, vec![trk], &[0, 1]).unwrap();
        let bars = render(&seq, &[], &EngineConfig::default()).unwrap();

        let start = &bars[0].moments(0)[0];
        let pans: Vec<&MidiMsg> = start
            .controls
            .iter()
            .filter(|m| m.data1() == cc::PAN && m.data2().is_some() && m.command() == 0xB0)
            .collect();
        assert_eq!(pans.len(), 1);
        assert_eq!(pans[0].data2(), Some(20));
        assert!(bars[0].moments(0)[1].controls.is_empty());

        // the empty channel still gets its defaults
        let silent = &bars[0].moments(1)[0];
        assert_eq!(silent.controls.len(), 9);
    }

    #[test]
    fn test_resume_state_per_bar() {
        let controls = ChordControls {
            expression: Some(90),
            ..Default::default()
        };
        let first = ChordDef::new(0, 100, vec![60], 100)
            .unwrap()
            .with_controls(controls)
            .unwrap();
        let seq = one_channel(vec![Event::Chord(first), chord(100, 62)]);
        let bars = render(&seq, &[100], &quiet()).unwrap();
        assert!(bars[0].resume.is_empty());
        assert_eq!(
            bars[1].resume[&0],
            Dimension::Expression.messages(0, 90).unwrap()
        );
    }

    #[test]
    fn test_slider_messages_are_timed() {
        let sliders = MidiChordSliderDefs {
            modulation: vec![0, 64, 127],
            ..Default::default()
        };
        let chord = ChordDef::new(0, 101, vec![60], 100)
            .unwrap()
            .with_sliders(sliders)
            .unwrap();
        let seq = one_channel(vec![Event::Chord(chord)]);
        let bars = render(&seq, &[], &quiet()).unwrap();
        let positions: Vec<u32> = bars[0]
            .moments(0)
            .iter()
            .filter(|m| !m.controls.is_empty())
            .map(|m| m.ms_position)
            .collect();
        assert_eq!(positions, vec![0, 50, 100]);
    }

    #[test]
    fn test_split_slider_notation_matches_playback() {
        let sliders = MidiChordSliderDefs {
            pan: vec![0, 127],
            ..Default::default()
        };
        let long = ChordDef::new(0, 600, vec![60], 100)
            .unwrap()
            .with_sliders(sliders)
            .unwrap();
        let seq = one_channel(vec![Event::Chord(long)]);
        let config = EngineConfig {
            split_mode: SplitMode::Continuation,
            ..quiet()
        };
        let bars = render(&seq, &[400], &config).unwrap();
        let rounding = RoundingMode::default();

        let pans = |bar: &Bar| -> Vec<(u32, Option<u8>)> {
            bar.moments(0)
                .iter()
                .flat_map(|m| m.controls.iter().map(move |c| (m.ms_position, c.data2())))
                .collect()
        };
        assert_eq!(pans(&bars[0]), vec![(0, Some(0))]);
        assert_eq!(pans(&bars[1]), vec![(199, Some(127))]);

        let mut w = XmlWriter::new();
        bars[0].write_xml(&mut w, rounding).unwrap();
        let xml = w.finish();
        assert!(xml.contains("<vt d2=\"0\" msDur=\"400\"/>"));
        assert!(!xml.contains("d2=\"127\""));

        let mut w = XmlWriter::new();
        bars[1].write_xml(&mut w, rounding).unwrap();
        let xml = w.finish();
        assert!(xml.contains("<vt d2=\"0\" msDur=\"199\"/>"));
        assert!(xml.contains("<vt d2=\"127\" msDur=\"1\"/>"));
    }

    #[test]
    fn test_trailing_rest_renders() {
        let seq = one_channel(vec![chord(500, 60), rest(300)]);
        let bars = render(&seq, &[600], &quiet()).unwrap();
        assert_eq!(bars[1].ms_duration, 200);
        let positions: Vec<u32> = bars[0].moments(0).iter().map(|m| m.ms_position).collect();
        assert_eq!(positions, vec![0, 500]);
        assert!(bars[1].moments(0).is_empty());
    }

    #[test]
    fn test_barlines_are_checked() {
        let seq = one_channel(vec![chord(500, 60)]);
        assert!(matches!(
            render(&seq, &[0], &quiet()),
            Err(ScoreError::InvalidRange { .. })
        ));
        assert!(render(&seq, &[500], &quiet()).is_err());
        assert!(matches!(
            render(&seq, &[300, 200], &quiet()),
            Err(ScoreError::StructuralInconsistency(_))
        ));
    }

    #[test]
    fn test_bar_xml() {
        let seq = one_channel(vec![chord(500, 60)]);
        let bars = render(&seq, &[], &quiet()).unwrap();
        let mut w = XmlWriter::new();
        bars[0].write_xml(&mut w, RoundingMode::default()).unwrap();
        let xml = w.finish();
        assert!(xml.starts_with("<bar msPosition=\"0\" msDuration=\"500\">\n"));
        assert!(xml.contains("<moments midiChannel=\"0\">"));
        assert!(xml.contains("<msg m=\"0x90 60 100\"/>"));
        assert!(xml.contains("<noteOffs>"));
        assert!(xml.contains("<msg m=\"0x80 60 64\"/>"));
    }
}
