//! # Continuous-Controller Envelopes
//!
//! A chord may carry lists of controller values (sliders) that are spread
//! across its duration. [`distribute_ms_durations`] decides how long each
//! value lasts:
//!
//! - 1 value: one slice covering the whole duration
//! - 2 values: `D-1` and `1` (the closing value gets exactly one millisecond)
//! - n >= 3 values: offsets `i * (D-1)/(n-1)` for `i` in `0..=n-2`, rounded,
//!   followed by `D-1` and `D`; the slices are the successive differences
//!
//! The slices always sum to `D`, the first value starts at offset 0 and the
//! last one at `D-1`.
//!
//! ## Rounding
//! Ties are broken by [`RoundingMode`]. The default is round-half-to-even,
//! which keeps `x.5` offsets from drifting consistently in one direction.
//!
//! ## Serialized form
//! ```text
//! <envs>
//!   <env s="0xB1" d1="10">
//!     <vt d2="0" msDur="499"/>
//!     <vt d2="127" msDur="1"/>
//!   </env>
//!   <env s="0xE1">
//!     <vt d1="64" d2="64" msDur="500"/>
//!   </env>
//! </envs>
//! ```

use serde::Deserialize;

use crate::error::{check_range, Result, ScoreError};
use crate::midi::{self, cc, MidiMsg};
use crate::xml::XmlWriter;

/// How `x.5` envelope offsets are rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoundingMode {
    #[default]
    HalfToEven,
    HalfAwayFromZero,
}

impl RoundingMode {
    fn round(&self, value: f64) -> f64 {
        match self {
            RoundingMode::HalfToEven => value.round_ties_even(),
            RoundingMode::HalfAwayFromZero => value.round(),
        }
    }
}

/// Splits `ms_duration` into `count` consecutive slices.
///
/// `ms_duration` must be at least `count`. Shorter durations are rejected
/// rather than producing zero-length slices: two values at the same offset
/// would be sent back to back and only the later one would be heard.
pub fn distribute_ms_durations(
    count: usize,
    ms_duration: u32,
    rounding: RoundingMode,
) -> Result<Vec<u32>> {
    if count == 0 {
        return Err(ScoreError::range("envelope value count", 0, 1, i64::MAX));
    }
    check_range(
        "envelope duration",
        ms_duration as i64,
        count as i64,
        u32::MAX as i64,
    )?;

    match count {
        1 => Ok(vec![ms_duration]),
        2 => Ok(vec![ms_duration - 1, 1]),
        _ => {
            let last = (ms_duration - 1) as f64;
            let step = last / (count - 1) as f64;
            let mut offsets: Vec<u32> = (0..count - 1)
                .map(|i| rounding.round(i as f64 * step) as u32)
                .collect();
            offsets.push(ms_duration - 1);
            offsets.push(ms_duration);
            Ok(offsets.windows(2).map(|pair| pair[1] - pair[0]).collect())
        }
    }
}

/// Which channel message an envelope drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeTarget {
    Controller(u8),
    PitchWheel,
}

/// Where a piece of a chord cut at a barline lies inside the whole chord.
///
/// The sliders of every piece are spread over `ms_duration`, the whole
/// chord's duration, and each piece shows only its own stretch of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeWindow {
    pub ms_offset: u32,
    pub ms_duration: u32,
}

/// A list of `(value, msDuration)` pairs for one controller.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub channel: u8,
    pub target: EnvelopeTarget,
    pub points: Vec<(u8, u32)>,
}

impl Envelope {
    /// Builds the envelope for `values` spread over `ms_duration`.
    pub fn new(
        channel: u8,
        target: EnvelopeTarget,
        values: &[u8],
        ms_duration: u32,
        rounding: RoundingMode,
    ) -> Result<Self> {
        let durations = distribute_ms_durations(values.len(), ms_duration, rounding)?;
        Ok(Self {
            channel,
            target,
            points: values.iter().copied().zip(durations).collect(),
        })
    }

    pub fn ms_duration(&self) -> u32 {
        self.points.iter().map(|&(_, ms)| ms).sum()
    }

    /// The stretch of this envelope lasting `ms_duration` from `ms_offset`.
    /// It opens with the value in effect at `ms_offset`.
    pub fn window(&self, ms_offset: u32, ms_duration: u32) -> Result<Envelope> {
        let total = self.ms_duration();
        let end = ms_offset
            .checked_add(ms_duration)
            .filter(|&end| ms_duration > 0 && end <= total)
            .ok_or_else(|| {
                ScoreError::range(
                    "envelope window end",
                    ms_offset as i64 + ms_duration as i64,
                    ms_offset as i64 + 1,
                    total as i64,
                )
            })?;
        let mut points = vec![];
        let mut start = 0;
        for &(value, ms) in &self.points {
            let (from, to) = (start.max(ms_offset), (start + ms).min(end));
            if from < to {
                points.push((value, to - from));
            }
            start += ms;
        }
        Ok(Envelope {
            channel: self.channel,
            target: self.target,
            points,
        })
    }

    /// Timed messages, positions relative to the start of the envelope.
    pub fn messages(&self) -> Result<Vec<(u32, MidiMsg)>> {
        let mut offset = 0;
        let mut msgs = Vec::with_capacity(self.points.len());
        for &(value, ms) in &self.points {
            let msg = match self.target {
                EnvelopeTarget::Controller(controller) => {
                    MidiMsg::control_change(self.channel, controller, value)?
                }
                EnvelopeTarget::PitchWheel => MidiMsg::pitch_wheel(self.channel, value)?,
            };
            msgs.push((offset, msg));
            offset += ms;
        }
        Ok(msgs)
    }

    pub fn write_xml(&self, w: &mut XmlWriter) -> Result<()> {
        match self.target {
            EnvelopeTarget::Controller(controller) => {
                let status = midi::status(midi::CONTROL_CHANGE, self.channel)?;
                w.open(
                    "env",
                    &[("s", format!("0x{:02X}", status)), ("d1", controller.to_string())],
                );
                for &(value, ms) in &self.points {
                    w.empty("vt", &[("d2", value.to_string()), ("msDur", ms.to_string())]);
                }
            }
            EnvelopeTarget::PitchWheel => {
                let status = midi::status(midi::PITCH_WHEEL, self.channel)?;
                w.open("env", &[("s", format!("0x{:02X}", status))]);
                for &(value, ms) in &self.points {
                    w.empty(
                        "vt",
                        &[
                            ("d1", value.to_string()),
                            ("d2", value.to_string()),
                            ("msDur", ms.to_string()),
                        ],
                    );
                }
            }
        }
        w.close();
        Ok(())
    }
}

/// Slider value lists attached to a chord. Empty lists are unused.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct MidiChordSliderDefs {
    pub pitch_wheel: Vec<u8>,
    pub pan: Vec<u8>,
    pub modulation: Vec<u8>,
    pub expression: Vec<u8>,
}

impl MidiChordSliderDefs {
    pub fn is_empty(&self) -> bool {
        self.pitch_wheel.is_empty()
            && self.pan.is_empty()
            && self.modulation.is_empty()
            && self.expression.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        for (what, values) in self.lists() {
            for &value in values {
                check_range(what, value as i64, 0, 127)?;
            }
        }
        Ok(())
    }

    /// Longest value list; a chord must last at least this many milliseconds.
    pub fn max_len(&self) -> usize {
        self.lists().iter().map(|(_, v)| v.len()).max().unwrap_or(0)
    }

    pub fn envelopes(
        &self,
        channel: u8,
        ms_duration: u32,
        rounding: RoundingMode,
    ) -> Result<Vec<Envelope>> {
        let targets = [
            (EnvelopeTarget::PitchWheel, &self.pitch_wheel),
            (EnvelopeTarget::Controller(cc::PAN), &self.pan),
            (EnvelopeTarget::Controller(cc::MODULATION), &self.modulation),
            (EnvelopeTarget::Controller(cc::EXPRESSION), &self.expression),
        ];
        targets
            .into_iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(target, values)| Envelope::new(channel, target, values, ms_duration, rounding))
            .collect()
    }

    fn lists(&self) -> [(&'static str, &Vec<u8>); 4] {
        [
            ("pitch wheel slider value", &self.pitch_wheel),
            ("pan slider value", &self.pan),
            ("modulation slider value", &self.modulation),
            ("expression slider value", &self.expression),
        ]
    }
}

/// Writes an `envs` element. Nothing is written for no envelopes.
pub fn write_envs(w: &mut XmlWriter, envelopes: &[Envelope]) -> Result<()> {
    if envelopes.is_empty() {
        return Ok(());
    }
    w.open("envs", &[]);
    for envelope in envelopes {
        envelope.write_xml(w)?;
    }
    w.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_value_takes_whole_duration() {
        assert_eq!(
            distribute_ms_durations(1, 750, RoundingMode::default()).unwrap(),
            vec![750]
        );
    }

    #[test]
    fn test_two_values_reserve_one_ms() {
        assert_eq!(
            distribute_ms_durations(2, 500, RoundingMode::default()).unwrap(),
            vec![499, 1]
        );
    }

    #[test]
    fn test_three_values_tie_breaking() {
        // (100 - 1) / 2 = 49.5
        assert_eq!(
            distribute_ms_durations(3, 100, RoundingMode::HalfToEven).unwrap(),
            vec![50, 49, 1]
        );
        // (102 - 1) / 2 = 50.5
        assert_eq!(
            distribute_ms_durations(3, 102, RoundingMode::HalfToEven).unwrap(),
            vec![50, 51, 1]
        );
        assert_eq!(
            distribute_ms_durations(3, 102, RoundingMode::HalfAwayFromZero).unwrap(),
            vec![51, 50, 1]
        );
    }

    #[test]
    fn test_slices_sum_to_duration() {
        for rounding in [RoundingMode::HalfToEven, RoundingMode::HalfAwayFromZero] {
            for count in 1..=50usize {
                for ms_duration in (count as u32..=10_000).step_by(37) {
                    let slices = distribute_ms_durations(count, ms_duration, rounding).unwrap();
                    assert_eq!(slices.len(), count);
                    assert_eq!(slices.iter().sum::<u32>(), ms_duration);
                    assert!(slices.iter().all(|&s| s >= 1));
                    if count >= 2 {
                        assert_eq!(*slices.last().unwrap(), 1);
                    }
                }
            }
        }
    }

    #[test]
    fn test_minimum_duration_equals_count() {
        assert_eq!(
            distribute_ms_durations(5, 5, RoundingMode::default()).unwrap(),
            vec![1, 1, 1, 1, 1]
        );
        assert!(distribute_ms_durations(5, 4, RoundingMode::default()).is_err());
        assert!(matches!(
            distribute_ms_durations(2, 1, RoundingMode::default()),
            Err(ScoreError::InvalidRange { .. })
        ));
        assert_eq!(
            distribute_ms_durations(2, 2, RoundingMode::default()).unwrap(),
            vec![1, 1]
        );
        assert!(distribute_ms_durations(0, 100, RoundingMode::default()).is_err());
    }

    #[test]
    fn test_envelope_messages_are_offset() {
        let env = Envelope::new(
            2,
            EnvelopeTarget::Controller(cc::EXPRESSION),
            &[0, 64, 127],
            11,
            RoundingMode::default(),
        )
        .unwrap();
        let msgs = env.messages().unwrap();
        let offsets: Vec<u32> = msgs.iter().map(|(pos, _)| *pos).collect();
        assert_eq!(offsets, vec![0, 5, 10]);
        assert_eq!(msgs[2].1.m_attribute(), "0xB2 11 127");
    }

    #[test]
    fn test_envs_xml() {
        let sliders = MidiChordSliderDefs {
            pitch_wheel: vec![64],
            pan: vec![0, 127],
            ..Default::default()
        };
        let envelopes = sliders.envelopes(1, 500, RoundingMode::default()).unwrap();
        let mut w = XmlWriter::new();
        write_envs(&mut w, &envelopes).unwrap();
        let xml = w.finish();
        assert!(xml.contains("<env s=\"0xE1\">"));
        assert!(xml.contains("<vt d1=\"64\" d2=\"64\" msDur=\"500\"/>"));
        assert!(xml.contains("<env s=\"0xB1\" d1=\"10\">"));
        assert!(xml.contains("<vt d2=\"0\" msDur=\"499\"/>"));
        assert!(xml.contains("<vt d2=\"127\" msDur=\"1\"/>"));
    }

    #[test]
    fn test_empty_sliders_write_nothing() {
        let mut w = XmlWriter::new();
        let envelopes = MidiChordSliderDefs::default()
            .envelopes(0, 100, RoundingMode::default())
            .unwrap();
        write_envs(&mut w, &envelopes).unwrap();
        assert_eq!(w.finish(), "");
    }

    #[test]
    fn test_window_keeps_whole_envelope_timing() {
        let env = Envelope::new(
            0,
            EnvelopeTarget::Controller(cc::PAN),
            &[0, 127],
            600,
            RoundingMode::default(),
        )
        .unwrap();
        let before = env.window(0, 400).unwrap();
        assert_eq!(before.points, vec![(0, 400)]);
        let after = env.window(400, 200).unwrap();
        assert_eq!(after.points, vec![(0, 199), (127, 1)]);
        let offsets: Vec<u32> = after.messages().unwrap().iter().map(|(p, _)| *p).collect();
        assert_eq!(offsets, vec![0, 199]);

        let env = Envelope::new(
            0,
            EnvelopeTarget::PitchWheel,
            &[0, 32, 64, 96],
            10,
            RoundingMode::default(),
        )
        .unwrap();
        for cut in 1..10 {
            let left = env.window(0, cut).unwrap();
            let right = env.window(cut, 10 - cut).unwrap();
            assert_eq!(left.ms_duration() + right.ms_duration(), 10);
        }
        assert!(env.window(5, 6).is_err());
        assert!(env.window(5, 0).is_err());
    }
}
