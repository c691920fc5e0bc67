//! # Carried Channel State
//!
//! When the timeline is cut at a barline, a channel's sound has to survive
//! the cut. [`ChannelCarryMsgs`] holds what crosses it: note-offs that are
//! due exactly at the cut, and the last value sent for each controller
//! dimension. A [`CarryContext`] owns one entry per output channel and lives
//! for a single timeline walk.
//!
//! ```text
//! CarryContext (one walk)
//!   └── ChannelCarryMsgs (per channel)
//!         ├── note_offs          queued, flushed first after the cut
//!         └── controller state   255 until first observed
//! ```

use std::collections::BTreeMap;
use std::mem;

use log::trace;

use crate::error::{check_range, Result, ScoreError};
use crate::event::ChordControls;
use crate::midi::{self, cc, MidiMsg, MAX_CHANNEL};

/// Sentinel for a controller dimension that has never been set.
pub const UNSET: u8 = 255;

/// A controller dimension tracked per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dimension {
    Bank,
    Patch,
    PitchWheelDeviation,
    ModWheel,
    Expression,
    Pan,
    PitchWheel,
}

impl Dimension {
    /// Order in which resume and default messages are sent. Bank precedes
    /// patch so the program change lands in the right bank.
    pub const ALL: [Dimension; 7] = [
        Dimension::Bank,
        Dimension::Patch,
        Dimension::PitchWheelDeviation,
        Dimension::ModWheel,
        Dimension::Expression,
        Dimension::Pan,
        Dimension::PitchWheel,
    ];

    pub fn default_value(&self) -> u8 {
        match self {
            Dimension::Bank | Dimension::Patch | Dimension::ModWheel => 0,
            Dimension::Expression => 127,
            Dimension::Pan | Dimension::PitchWheel => 64,
            Dimension::PitchWheelDeviation => 2,
        }
    }

    /// The messages that set this dimension to `value` on `channel`.
    pub fn messages(&self, channel: u8, value: u8) -> Result<Vec<MidiMsg>> {
        Ok(match self {
            Dimension::Bank => vec![MidiMsg::control_change(channel, cc::BANK, value)?],
            Dimension::Patch => vec![MidiMsg::program_change(channel, value)?],
            Dimension::PitchWheelDeviation => vec![
                MidiMsg::control_change(channel, cc::RPN_MSB, 0)?,
                MidiMsg::control_change(channel, cc::RPN_LSB, 0)?,
                MidiMsg::control_change(channel, cc::DATA_ENTRY, value)?,
            ],
            Dimension::ModWheel => vec![MidiMsg::control_change(channel, cc::MODULATION, value)?],
            Dimension::Expression => vec![MidiMsg::control_change(channel, cc::EXPRESSION, value)?],
            Dimension::Pan => vec![MidiMsg::control_change(channel, cc::PAN, value)?],
            Dimension::PitchWheel => vec![MidiMsg::pitch_wheel(channel, value)?],
        })
    }

    fn requested(&self, controls: &ChordControls) -> Option<u8> {
        match self {
            Dimension::Bank => controls.bank,
            Dimension::Patch => controls.patch,
            Dimension::PitchWheelDeviation => controls.pitch_wheel_deviation,
            Dimension::ModWheel => controls.mod_wheel,
            Dimension::Expression => controls.expression,
            Dimension::Pan => controls.pan,
            Dimension::PitchWheel => controls.pitch_wheel,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCarryMsgs {
    channel: u8,
    note_offs: Vec<MidiMsg>,
    state: BTreeMap<Dimension, u8>,
    rpn: (u8, u8),
}

impl ChannelCarryMsgs {
    pub fn new(channel: u8) -> Result<Self> {
        check_range("midi channel", channel as i64, 0, MAX_CHANNEL as i64)?;
        Ok(Self {
            channel,
            note_offs: vec![],
            state: Dimension::ALL.iter().map(|&d| (d, UNSET)).collect(),
            rpn: (127, 127),
        })
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Queues a note-off to be sent after the next cut.
    ///
    /// The message must be a note-off (or a note-on with velocity 0) on this
    /// channel.
    pub fn add_note_off(&mut self, msg: MidiMsg) -> Result<()> {
        if !msg.is_note_off() {
            return Err(ScoreError::range(
                "carried note-off status",
                msg.status() as i64,
                midi::NOTE_OFF as i64,
                (midi::NOTE_OFF | MAX_CHANNEL) as i64,
            ));
        }
        if msg.channel() != self.channel {
            return Err(ScoreError::range(
                "carried note-off channel",
                msg.channel() as i64,
                self.channel as i64,
                self.channel as i64,
            ));
        }
        self.note_offs.push(msg);
        Ok(())
    }

    pub fn note_offs(&self) -> &[MidiMsg] {
        &self.note_offs
    }

    pub fn has_note_offs(&self) -> bool {
        !self.note_offs.is_empty()
    }

    /// Removes and returns the queued note-offs.
    pub fn take_note_offs(&mut self) -> Vec<MidiMsg> {
        mem::take(&mut self.note_offs)
    }

    pub fn clear(&mut self) {
        self.note_offs.clear();
    }

    /// The last value sent for `dimension`, if any.
    pub fn value(&self, dimension: Dimension) -> Option<u8> {
        match self.state.get(&dimension) {
            Some(&UNSET) | None => None,
            Some(&value) => Some(value),
        }
    }

    pub fn is_unset(&self, dimension: Dimension) -> bool {
        self.value(dimension).is_none()
    }

    /// Records the effect of a message already sent on this channel.
    pub fn observe(&mut self, msg: &MidiMsg) {
        if msg.channel() != self.channel {
            return;
        }
        let value = msg.data2().unwrap_or(0);
        match (msg.command(), msg.data1()) {
            (midi::PROGRAM_CHANGE, patch) => self.set(Dimension::Patch, patch),
            (midi::PITCH_WHEEL, _) => self.set(Dimension::PitchWheel, value),
            (midi::CONTROL_CHANGE, cc::BANK) => self.set(Dimension::Bank, value),
            (midi::CONTROL_CHANGE, cc::MODULATION) => self.set(Dimension::ModWheel, value),
            (midi::CONTROL_CHANGE, cc::EXPRESSION) => self.set(Dimension::Expression, value),
            (midi::CONTROL_CHANGE, cc::PAN) => self.set(Dimension::Pan, value),
            (midi::CONTROL_CHANGE, cc::RPN_MSB) => self.rpn.0 = value,
            (midi::CONTROL_CHANGE, cc::RPN_LSB) => self.rpn.1 = value,
            (midi::CONTROL_CHANGE, cc::DATA_ENTRY) if self.rpn == (0, 0) => {
                self.set(Dimension::PitchWheelDeviation, value)
            }
            _ => {}
        }
    }

    /// Messages for the controllers `controls` asks for that differ from
    /// the carried values. The carried values are updated.
    pub fn changed_msgs(&mut self, controls: &ChordControls) -> Result<Vec<MidiMsg>> {
        let mut msgs = vec![];
        for dimension in Dimension::ALL {
            let Some(wanted) = dimension.requested(controls) else {
                continue;
            };
            if self.value(dimension) == Some(wanted) {
                continue;
            }
            msgs.extend(dimension.messages(self.channel, wanted)?);
            self.set(dimension, wanted);
        }
        Ok(msgs)
    }

    /// Sets every dimension still unset to its default and returns the
    /// messages that do so.
    pub fn force_defaults(&mut self) -> Result<Vec<MidiMsg>> {
        let mut msgs = vec![];
        for dimension in Dimension::ALL {
            if self.is_unset(dimension) {
                let value = dimension.default_value();
                msgs.extend(dimension.messages(self.channel, value)?);
                self.set(dimension, value);
            }
        }
        if !msgs.is_empty() {
            trace!("channel {}: forced {} default messages", self.channel, msgs.len());
        }
        Ok(msgs)
    }

    /// Messages that restore the carried controller state from scratch.
    pub fn resume_msgs(&self) -> Result<Vec<MidiMsg>> {
        let mut msgs = vec![];
        for dimension in Dimension::ALL {
            if let Some(value) = self.value(dimension) {
                msgs.extend(dimension.messages(self.channel, value)?);
            }
        }
        Ok(msgs)
    }

    fn set(&mut self, dimension: Dimension, value: u8) {
        self.state.insert(dimension, value);
    }
}

/// Carried state for every channel of one timeline walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarryContext {
    channels: BTreeMap<u8, ChannelCarryMsgs>,
}

impl CarryContext {
    pub fn new(channels: &[u8]) -> Result<Self> {
        let channels = channels
            .iter()
            .map(|&channel| Ok((channel, ChannelCarryMsgs::new(channel)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self { channels })
    }

    pub fn get(&self, channel: u8) -> Result<&ChannelCarryMsgs> {
        self.channels.get(&channel).ok_or_else(|| unknown(channel))
    }

    pub fn get_mut(&mut self, channel: u8) -> Result<&mut ChannelCarryMsgs> {
        self.channels.get_mut(&channel).ok_or_else(|| unknown(channel))
    }

    pub fn has_note_offs(&self) -> bool {
        self.channels.values().any(|c| c.has_note_offs())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelCarryMsgs> {
        self.channels.values()
    }
}

fn unknown(channel: u8) -> ScoreError {
    ScoreError::structure(format!("no carried state for channel {}", channel))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_off_queue() {
        let mut carry = ChannelCarryMsgs::new(3).unwrap();
        carry.add_note_off(MidiMsg::note_off(3, 60, 64).unwrap()).unwrap();
        carry.add_note_off(MidiMsg::note_on(3, 62, 0).unwrap()).unwrap();
        assert_eq!(carry.note_offs().len(), 2);
        let flushed = carry.take_note_offs();
        assert_eq!(flushed.len(), 2);
        assert!(!carry.has_note_offs());
    }

    #[test]
    fn test_note_on_is_not_a_carried_note_off() {
        let mut carry = ChannelCarryMsgs::new(0).unwrap();
        let err = carry.add_note_off(MidiMsg::note_on(0, 60, 100).unwrap()).unwrap_err();
        assert!(matches!(err, ScoreError::InvalidRange { .. }));
        assert!(carry
            .add_note_off(MidiMsg::control_change(0, cc::PAN, 0).unwrap())
            .is_err());
    }

    #[test]
    fn test_channel_mismatch_fails() {
        let mut carry = ChannelCarryMsgs::new(0).unwrap();
        let err = carry.add_note_off(MidiMsg::note_off(1, 60, 64).unwrap()).unwrap_err();
        assert!(matches!(err, ScoreError::InvalidRange { ref what, .. } if what.contains("channel")));
        assert!(!carry.has_note_offs());
    }

    #[test]
    fn test_state_starts_unset() {
        let carry = ChannelCarryMsgs::new(0).unwrap();
        for dimension in Dimension::ALL {
            assert!(carry.is_unset(dimension));
        }
        assert!(carry.resume_msgs().unwrap().is_empty());
    }

    #[test]
    fn test_force_defaults_once() {
        let mut carry = ChannelCarryMsgs::new(2).unwrap();
        carry.observe(&MidiMsg::control_change(2, cc::PAN, 10).unwrap());
        let msgs = carry.force_defaults().unwrap();
        // bank, patch, 3 RPN messages, mod, expression, pitch wheel
        assert_eq!(msgs.len(), 8);
        assert!(!msgs.iter().any(|m| m.data1() == cc::PAN && m.command() == midi::CONTROL_CHANGE));
        assert_eq!(carry.value(Dimension::Expression), Some(127));
        assert_eq!(carry.value(Dimension::PitchWheel), Some(64));
        assert_eq!(carry.value(Dimension::PitchWheelDeviation), Some(2));
        assert_eq!(carry.value(Dimension::Pan), Some(10));
        assert!(carry.force_defaults().unwrap().is_empty());
    }

    #[test]
    fn test_changed_msgs_skip_repeated_values() {
        let mut carry = ChannelCarryMsgs::new(0).unwrap();
        let controls = ChordControls {
            patch: Some(5),
            pan: Some(20),
            ..Default::default()
        };
        assert_eq!(carry.changed_msgs(&controls).unwrap().len(), 2);
        assert!(carry.changed_msgs(&controls).unwrap().is_empty());
        let louder = ChordControls {
            pan: Some(30),
            ..controls
        };
        let msgs = carry.changed_msgs(&louder).unwrap();
        assert_eq!(msgs, vec![MidiMsg::control_change(0, cc::PAN, 30).unwrap()]);
    }

    #[test]
    fn test_observe_tracks_rpn_deviation() {
        let mut carry = ChannelCarryMsgs::new(0).unwrap();
        carry.observe(&MidiMsg::control_change(0, cc::DATA_ENTRY, 12).unwrap());
        assert!(carry.is_unset(Dimension::PitchWheelDeviation));
        for msg in Dimension::PitchWheelDeviation.messages(0, 12).unwrap() {
            carry.observe(&msg);
        }
        assert_eq!(carry.value(Dimension::PitchWheelDeviation), Some(12));
        carry.observe(&MidiMsg::pitch_wheel(0, 90).unwrap());
        carry.observe(&MidiMsg::program_change(0, 7).unwrap());
        carry.observe(&MidiMsg::pitch_wheel(1, 10).unwrap());
        assert_eq!(carry.value(Dimension::PitchWheel), Some(90));
        assert_eq!(carry.value(Dimension::Patch), Some(7));
    }

    #[test]
    fn test_resume_msgs_follow_dimension_order() {
        let mut carry = ChannelCarryMsgs::new(0).unwrap();
        carry.observe(&MidiMsg::pitch_wheel(0, 70).unwrap());
        carry.observe(&MidiMsg::control_change(0, cc::BANK, 1).unwrap());
        let msgs = carry.resume_msgs().unwrap();
        assert_eq!(msgs[0], MidiMsg::control_change(0, cc::BANK, 1).unwrap());
        assert_eq!(msgs[1], MidiMsg::pitch_wheel(0, 70).unwrap());
    }

    #[test]
    fn test_context_lookup() {
        let mut context = CarryContext::new(&[0, 4]).unwrap();
        context
            .get_mut(4)
            .unwrap()
            .add_note_off(MidiMsg::note_off(4, 60, 64).unwrap())
            .unwrap();
        assert!(context.has_note_offs());
        assert!(context.get(1).is_err());
        assert_eq!(context.iter().map(|c| c.channel()).collect::<Vec<_>>(), vec![0, 4]);
    }
}
