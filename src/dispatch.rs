//! # Live Dispatch
//!
//! A [`Performer`] turns the performer's input (noteOn, noteOff and the
//! continuous pressure, pitch wheel and mod wheel dimensions) into
//! [`PlaybackCommand`]s for the tracks of one [`Seq`]. It never changes the
//! tracks themselves: it only decides where playback starts and stops and
//! which options apply.
//!
//! ## Effective options
//! The first options found along this chain apply, as a whole:
//!
//! ```text
//! trkOn / trkOff / pressure override
//!   -> seq baseline (trkOn only) or the options the track was started with
//!   -> input note default
//!   -> input chord default
//!   -> TrkOptions::default()   (every dimension ignored)
//! ```
//!
//! ## Channel ownership
//! Only one trigger owns a channel at a time. A trkOn on a channel that is
//! fading or holding after a trkOff takes the channel over.

use std::collections::BTreeMap;
use std::ops::Range;

use log::{debug, warn};

use crate::error::Result;
use crate::event::Event;
use crate::input::InputNoteDef;
use crate::midi::MidiMsg;
use crate::options::{InputDimension, SpeedOption, TrkOffOption, TrkOptions};
use crate::refs::{NoteTrigger, SeqRef, TrkOff, TrkOn};
use crate::seq::Seq;
use crate::timeline::NOTE_OFF_VELOCITY;
use crate::trk::Trk;

/// The input note bound to a pitch, with its chord's default options.
#[derive(Debug, Clone, Copy)]
pub struct Binding<'a> {
    pub note: &'a InputNoteDef,
    pub chord_options: Option<&'a TrkOptions>,
}

impl<'a> Binding<'a> {
    fn defaults(&self) -> Option<&'a TrkOptions> {
        self.note.options.as_ref().or(self.chord_options)
    }
}

/// Looks up what a performed pitch is bound to.
pub trait TriggerBindings {
    fn binding(&self, pitch: u8) -> Option<Binding<'_>>;
}

/// The options a trkOn plays with.
pub fn effective_options(trk_on: &TrkOn, seq_ref: &SeqRef, binding: &Binding<'_>) -> TrkOptions {
    trk_on
        .options
        .as_ref()
        .or(seq_ref.options())
        .or(binding.defaults())
        .cloned()
        .unwrap_or_default()
}

/// How a track stops after a trkOff. Positions are relative to the first
/// event the track was started from.
#[derive(Debug, Clone, PartialEq)]
pub struct StopPlan {
    pub option: TrkOffOption,
    /// Where playback of the track ends.
    pub stop_at: u32,
    /// Sent when playback ends early.
    pub note_offs: Vec<MidiMsg>,
    /// Replacement velocities for faded chords, by track event index.
    pub velocities: Vec<(usize, u8)>,
    /// Note-offs that must not be sent.
    pub held: Vec<MidiMsg>,
}

/// Works out how the `events` of `trk` stop when a trkOff with `option`
/// arrives `elapsed` milliseconds after they started.
pub fn stop_plan(
    trk: &Trk,
    events: Range<usize>,
    option: TrkOffOption,
    elapsed: u32,
) -> Result<StopPlan> {
    let slice = &trk.events()[events.clone()];
    let origin = slice.first().map(|e| e.ms_position()).unwrap_or(0);
    let span = slice.last().map(|e| e.end_ms_position() - origin).unwrap_or(0);
    let current = slice.iter().position(|e| {
        let start = e.ms_position() - origin;
        start <= elapsed && elapsed < start + e.ms_duration()
    });

    let mut plan = StopPlan {
        option,
        stop_at: span,
        note_offs: vec![],
        velocities: vec![],
        held: vec![],
    };
    match option {
        TrkOffOption::Ignored => {}
        TrkOffOption::StopChord => {
            if let Some(index) = current {
                let event = &slice[index];
                plan.stop_at = event.end_ms_position() - origin;
                plan.note_offs = note_offs(trk.channel(), event)?;
            }
        }
        TrkOffOption::StopNow => {
            plan.stop_at = elapsed.min(span);
            if let Some(index) = current {
                plan.note_offs = note_offs(trk.channel(), &slice[index])?;
            }
        }
        TrkOffOption::Fade => {
            let remaining = span.saturating_sub(elapsed).max(1) as u64;
            for (offset, event) in slice.iter().enumerate() {
                let start = event.ms_position() - origin;
                let Some(chord) = event.chord() else {
                    continue;
                };
                if start < elapsed || chord.is_continuation {
                    continue;
                }
                let left = (span - start) as u64;
                let velocity = (chord.velocity as u64 * left / remaining).clamp(1, 127) as u8;
                plan.velocities.push((events.start + offset, velocity));
            }
        }
        TrkOffOption::HoldLast => {
            if let Some(last) = slice.iter().rev().find(|e| e.chord().is_some()) {
                plan.held = note_offs(trk.channel(), last)?;
            }
        }
        TrkOffOption::HoldAll => {
            let from = current.unwrap_or(slice.len());
            for event in &slice[from..] {
                plan.held.extend(note_offs(trk.channel(), event)?);
            }
        }
    }
    Ok(plan)
}

fn note_offs(channel: u8, event: &Event) -> Result<Vec<MidiMsg>> {
    match event.chord() {
        Some(chord) => chord
            .pitches
            .iter()
            .map(|&pitch| MidiMsg::note_off(channel, pitch, NOTE_OFF_VELOCITY))
            .collect(),
        None => Ok(vec![]),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    /// Play `events` of the track on `channel`, with one velocity per chord.
    Start {
        channel: u8,
        ms_position: u32,
        events: Range<usize>,
        options: TrkOptions,
        velocities: Vec<u8>,
    },
    Stop {
        channel: u8,
        ms_position: u32,
        plan: StopPlan,
    },
    Control {
        channel: u8,
        msgs: Vec<MidiMsg>,
    },
    Speed {
        channel: u8,
        factor: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelState {
    Idle,
    Playing {
        ms_position: u32,
        events: Range<usize>,
        options: TrkOptions,
        started_at: u64,
    },
    /// Still sounding after a fade or hold trkOff.
    Releasing {
        ms_position: u32,
        option: TrkOffOption,
    },
}

/// Live input router for one sequence.
pub struct Performer<'a, B: TriggerBindings = Seq> {
    seq: &'a Seq,
    bindings: &'a B,
    channels: BTreeMap<u8, ChannelState>,
}

impl<'a> Performer<'a, Seq> {
    /// Routes through the sequence's own bindings.
    pub fn new(seq: &'a Seq) -> Self {
        Self::with_bindings(seq, seq)
    }
}

impl<'a, B: TriggerBindings> Performer<'a, B> {
    pub fn with_bindings(seq: &'a Seq, bindings: &'a B) -> Self {
        let channels = seq
            .midi_channels()
            .into_iter()
            .map(|channel| (channel, ChannelState::Idle))
            .collect();
        Self {
            seq,
            bindings,
            channels,
        }
    }

    pub fn state(&self, channel: u8) -> Option<&ChannelState> {
        self.channels.get(&channel)
    }

    /// Returns every channel to idle.
    pub fn reset(&mut self) {
        for state in self.channels.values_mut() {
            *state = ChannelState::Idle;
        }
    }

    pub fn note_on(&mut self, pitch: u8, velocity: u8, now_ms: u64) -> Result<Vec<PlaybackCommand>> {
        let bindings = self.bindings;
        let Some(binding) = bindings.binding(pitch) else {
            warn!("noteOn {} is not bound to anything", pitch);
            return Ok(vec![]);
        };
        match &binding.note.note_on {
            Some(trigger) => self.fire(trigger, &binding, velocity, now_ms),
            None => Ok(vec![]),
        }
    }

    pub fn note_off(&mut self, pitch: u8, velocity: u8, now_ms: u64) -> Result<Vec<PlaybackCommand>> {
        let bindings = self.bindings;
        let Some(binding) = bindings.binding(pitch) else {
            warn!("noteOff {} is not bound to anything", pitch);
            return Ok(vec![]);
        };
        match &binding.note.note_off {
            Some(trigger) => self.fire(trigger, &binding, velocity, now_ms),
            None => Ok(vec![]),
        }
    }

    pub fn pressure(&mut self, pitch: u8, value: u8, now_ms: u64) -> Result<Vec<PlaybackCommand>> {
        self.continuous(InputDimension::Pressure, pitch, value, now_ms)
    }

    pub fn pitch_wheel(&mut self, pitch: u8, value: u8, now_ms: u64) -> Result<Vec<PlaybackCommand>> {
        self.continuous(InputDimension::PitchWheel, pitch, value, now_ms)
    }

    pub fn mod_wheel(&mut self, pitch: u8, value: u8, now_ms: u64) -> Result<Vec<PlaybackCommand>> {
        self.continuous(InputDimension::ModWheel, pitch, value, now_ms)
    }

    /// Stops come before starts, and speed changes come last.
    fn fire(
        &mut self,
        trigger: &NoteTrigger,
        binding: &Binding<'_>,
        velocity: u8,
        now_ms: u64,
    ) -> Result<Vec<PlaybackCommand>> {
        let mut commands = vec![];
        for trk_off in &trigger.trk_offs {
            if let Some(stop) = self.stop(trk_off, now_ms)? {
                commands.push(stop);
            }
        }

        let mut speeds = vec![];
        if let Some(seq_ref) = &trigger.seq_ref {
            for trk_on in seq_ref {
                let (trk, events) = self.seq.resolve(trk_on)?;
                let options = effective_options(trk_on, seq_ref, binding);
                let velocities = trk.events()[events.clone()]
                    .iter()
                    .filter_map(|e| e.chord())
                    .map(|chord| options.velocity_for(chord.velocity, velocity))
                    .collect();
                if options.speed == SpeedOption::NoteOn {
                    if let Some(factor) = options.speed_factor(velocity) {
                        speeds.push(PlaybackCommand::Speed {
                            channel: trk_on.channel,
                            factor,
                        });
                    }
                }
                let previous = self.channels.insert(
                    trk_on.channel,
                    ChannelState::Playing {
                        ms_position: trk_on.ms_position,
                        events: events.clone(),
                        options: options.clone(),
                        started_at: now_ms,
                    },
                );
                if let Some(ChannelState::Releasing { option, .. }) = previous {
                    debug!(
                        "trkOn on channel {} supersedes its {:?} release",
                        trk_on.channel, option
                    );
                }
                commands.push(PlaybackCommand::Start {
                    channel: trk_on.channel,
                    ms_position: trk_on.ms_position,
                    events,
                    options,
                    velocities,
                });
            }
        }
        commands.extend(speeds);
        Ok(commands)
    }

    fn stop(&mut self, trk_off: &TrkOff, now_ms: u64) -> Result<Option<PlaybackCommand>> {
        let (trk, _) = self.seq.resolve_off(trk_off)?;
        let (events, active, started_at) = match self.channels.get(&trk_off.channel) {
            Some(ChannelState::Playing {
                ms_position,
                events,
                options,
                started_at,
            }) if *ms_position == trk_off.ms_position => (events.clone(), options, *started_at),
            _ => {
                warn!(
                    "trkOff on channel {} at {} ms: that track is not playing",
                    trk_off.channel, trk_off.ms_position
                );
                return Ok(None);
            }
        };
        let option = trk_off.options.as_ref().unwrap_or(active).trk_off;
        if option == TrkOffOption::Ignored {
            warn!(
                "trkOff on channel {} ignored: the track plays on",
                trk_off.channel
            );
            return Ok(None);
        }

        let elapsed = now_ms.saturating_sub(started_at).min(u32::MAX as u64) as u32;
        let plan = stop_plan(trk, events, option, elapsed)?;
        let next = match option {
            TrkOffOption::Fade | TrkOffOption::HoldLast | TrkOffOption::HoldAll => {
                ChannelState::Releasing {
                    ms_position: trk_off.ms_position,
                    option,
                }
            }
            _ => ChannelState::Idle,
        };
        self.channels.insert(trk_off.channel, next);
        Ok(Some(PlaybackCommand::Stop {
            channel: trk_off.channel,
            ms_position: trk_off.ms_position,
            plan,
        }))
    }

    fn continuous(
        &mut self,
        dimension: InputDimension,
        pitch: u8,
        value: u8,
        now_ms: u64,
    ) -> Result<Vec<PlaybackCommand>> {
        let bindings = self.bindings;
        let Some(binding) = bindings.binding(pitch) else {
            warn!("{:?} on {} is not bound to anything", dimension, pitch);
            return Ok(vec![]);
        };
        let mut controls = vec![];
        let mut speeds = vec![];
        for pressure in &binding.note.pressures {
            let active = match self.channels.get(&pressure.channel) {
                Some(ChannelState::Playing { options, .. }) => Some(options),
                _ => None,
            };
            let options = pressure
                .options
                .as_ref()
                .or(active)
                .or(binding.defaults())
                .cloned()
                .unwrap_or_default();
            let sounding = self.sounding(pressure.channel, now_ms);
            let msgs = options.controller_msgs(dimension, pressure.channel, value, &sounding)?;
            if !msgs.is_empty() {
                controls.push(PlaybackCommand::Control {
                    channel: pressure.channel,
                    msgs,
                });
            }
            if options.speed == dimension.speed_option() {
                if let Some(factor) = options.speed_factor(value) {
                    speeds.push(PlaybackCommand::Speed {
                        channel: pressure.channel,
                        factor,
                    });
                }
            }
        }
        controls.extend(speeds);
        Ok(controls)
    }

    /// Pitches of the chord playing on `channel` at `now_ms`.
    fn sounding(&self, channel: u8, now_ms: u64) -> Vec<u8> {
        let Some(ChannelState::Playing {
            events, started_at, ..
        }) = self.channels.get(&channel)
        else {
            return vec![];
        };
        let Some(trk) = self.seq.trk(channel) else {
            return vec![];
        };
        let slice = &trk.events()[events.clone()];
        let origin = slice.first().map(|e| e.ms_position()).unwrap_or(0) as u64;
        let elapsed = now_ms.saturating_sub(*started_at);
        slice
            .iter()
            .find(|e| {
                let start = e.ms_position() as u64 - origin;
                start <= elapsed && elapsed < start + e.ms_duration() as u64
            })
            .and_then(|e| e.chord())
            .map(|chord| chord.pitches.clone())
            .unwrap_or_default()
    }
}
