//! # Track Options
//!
//! [`TrkOptions`] governs how a track reacts to the performer's live input.
//! Each dimension is independently optional and defaults to `Ignored`,
//! meaning that dimension of the input has no effect on the track.
//!
//! | Dimension   | Field(s)                          | XML attributes                            |
//! |-------------|-----------------------------------|-------------------------------------------|
//! | velocity    | `velocity`, `min_velocity`        | `velocity`, `minVelocity`                 |
//! | pressure    | `pressure`                        | `pressure` (+ `maxVolume`/`minVolume`)    |
//! | termination | `trk_off`                         | `trkOff`                                  |
//! | pitch wheel | `pitch_wheel`                     | `pitchWheel` (+ `maxVolume`/`minVolume`)  |
//! | mod wheel   | `mod_wheel`                       | `modulation` (+ `maxVolume`/`minVolume`)  |
//! | speed       | `speed`, `max_speed_percent`      | `speedOption`, `maxSpeedPercent`          |
//!
//! ## Volume
//! At most one of pressure, pitch wheel and mod wheel may control volume,
//! and doing so requires `min_volume < max_volume`.

use serde::Deserialize;

use crate::error::{check_range, Result, ScoreError};
use crate::midi::{cc, MidiMsg};
use crate::xml::{Attrs, XmlWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VelocityOption {
    #[default]
    Ignored,
    /// Track velocities are scaled by the performed velocity.
    Scaled,
    /// Average of track and performed velocity.
    Shared,
    /// The performed velocity replaces the track's.
    Overridden,
}

/// The controller a continuous input dimension is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControllerOption {
    #[default]
    Ignored,
    Aftertouch,
    ChannelPressure,
    Modulation,
    Volume,
    Expression,
    Pan,
    PitchWheel,
}

/// What a `trkOff` does to a sounding track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrkOffOption {
    /// The track plays on to its end.
    #[default]
    Ignored,
    StopChord,
    StopNow,
    Fade,
    HoldLast,
    HoldAll,
}

/// The input dimension that modulates playback speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpeedOption {
    #[default]
    Ignored,
    NoteOn,
    Pressure,
    PitchWheel,
    ModWheel,
}

pub const MAX_SPEED_PERCENT: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TrkOptions {
    pub velocity: VelocityOption,
    pub min_velocity: Option<u8>,
    pub pressure: ControllerOption,
    pub pitch_wheel: ControllerOption,
    pub mod_wheel: ControllerOption,
    pub min_volume: Option<u8>,
    pub max_volume: Option<u8>,
    pub trk_off: TrkOffOption,
    pub speed: SpeedOption,
    pub max_speed_percent: Option<u32>,
}

impl TrkOptions {
    pub fn is_default(&self) -> bool {
        *self == TrkOptions::default()
    }

    /// Checks the cross-field rules. Called wherever options are attached.
    pub fn validate(&self) -> Result<()> {
        if self.velocity != VelocityOption::Ignored {
            let min = self.min_velocity.ok_or_else(|| {
                ScoreError::MisconfiguredOptions(format!(
                    "velocity option {:?} needs a minimum velocity",
                    self.velocity
                ))
            })?;
            check_range("minimum velocity", min as i64, 1, 127)?;
        }

        let volume_dimensions = self
            .controllers()
            .iter()
            .filter(|(_, option)| *option == ControllerOption::Volume)
            .count();
        if volume_dimensions > 1 {
            return Err(ScoreError::MisconfiguredOptions(
                "only one input dimension may control volume".to_string(),
            ));
        }
        if volume_dimensions == 1 {
            let (min, max) = match (self.min_volume, self.max_volume) {
                (Some(min), Some(max)) => (min, max),
                _ => {
                    return Err(ScoreError::MisconfiguredOptions(
                        "volume control needs both a minimum and a maximum volume".to_string(),
                    ))
                }
            };
            check_range("minimum volume", min as i64, 0, 127)?;
            check_range("maximum volume", max as i64, 0, 127)?;
            if min >= max {
                return Err(ScoreError::MisconfiguredOptions(format!(
                    "minimum volume {} must be less than maximum volume {}",
                    min, max
                )));
            }
        }

        if self.speed != SpeedOption::Ignored {
            let percent = self.max_speed_percent.ok_or_else(|| {
                ScoreError::MisconfiguredOptions(
                    "speed option needs a maximum speed percent".to_string(),
                )
            })?;
            check_range(
                "maximum speed percent",
                percent as i64,
                101,
                MAX_SPEED_PERCENT as i64,
            )?;
            let claimed = match self.speed {
                SpeedOption::Pressure => self.pressure,
                SpeedOption::PitchWheel => self.pitch_wheel,
                SpeedOption::ModWheel => self.mod_wheel,
                SpeedOption::NoteOn | SpeedOption::Ignored => ControllerOption::Ignored,
            };
            if claimed != ControllerOption::Ignored {
                return Err(ScoreError::MisconfiguredOptions(format!(
                    "{:?} cannot control both speed and {:?}",
                    self.speed, claimed
                )));
            }
        }
        Ok(())
    }

    /// The velocity to play a track note with, given the performed velocity.
    pub fn velocity_for(&self, trk_velocity: u8, performed: u8) -> u8 {
        let min = self.min_velocity.unwrap_or(1) as u32;
        let (trk, performed) = (trk_velocity as u32, performed as u32);
        let value = match self.velocity {
            VelocityOption::Ignored => return trk_velocity,
            VelocityOption::Scaled => (trk * performed + 63) / 127,
            VelocityOption::Shared => (trk + performed + 1) / 2,
            VelocityOption::Overridden => performed,
        };
        value.clamp(min, 127) as u8
    }

    /// The controller option for a continuous input dimension.
    pub fn controller_for(&self, dimension: InputDimension) -> ControllerOption {
        match dimension {
            InputDimension::Pressure => self.pressure,
            InputDimension::PitchWheel => self.pitch_wheel,
            InputDimension::ModWheel => self.mod_wheel,
        }
    }

    /// Messages translating a live `value` on `dimension` to `channel`.
    ///
    /// Aftertouch is sent once per sounding pitch. Unmapped dimensions
    /// produce nothing.
    pub fn controller_msgs(
        &self,
        dimension: InputDimension,
        channel: u8,
        value: u8,
        sounding: &[u8],
    ) -> Result<Vec<MidiMsg>> {
        check_range("controller value", value as i64, 0, 127)?;
        let msgs = match self.controller_for(dimension) {
            ControllerOption::Ignored => vec![],
            ControllerOption::Aftertouch => sounding
                .iter()
                .map(|&pitch| MidiMsg::aftertouch(channel, pitch, value))
                .collect::<Result<Vec<_>>>()?,
            ControllerOption::ChannelPressure => vec![MidiMsg::channel_pressure(channel, value)?],
            ControllerOption::Modulation => {
                vec![MidiMsg::control_change(channel, cc::MODULATION, value)?]
            }
            ControllerOption::Volume => {
                vec![MidiMsg::control_change(channel, cc::VOLUME, self.volume_for(value)?)?]
            }
            ControllerOption::Expression => {
                vec![MidiMsg::control_change(channel, cc::EXPRESSION, value)?]
            }
            ControllerOption::Pan => vec![MidiMsg::control_change(channel, cc::PAN, value)?],
            ControllerOption::PitchWheel => vec![MidiMsg::pitch_wheel(channel, value)?],
        };
        Ok(msgs)
    }

    /// Maps 0..=127 linearly onto `min_volume..=max_volume`.
    fn volume_for(&self, value: u8) -> Result<u8> {
        match (self.min_volume, self.max_volume) {
            (Some(min), Some(max)) if min < max => {
                let span = (max - min) as u32;
                Ok(min + ((value as u32 * span + 63) / 127) as u8)
            }
            _ => Err(ScoreError::MisconfiguredOptions(
                "volume control needs both a minimum and a maximum volume".to_string(),
            )),
        }
    }

    /// Playback speed factor for `value` on the speed dimension.
    ///
    /// 64 plays at normal speed, 127 at `max_speed_percent`, 0 at its
    /// reciprocal; values between are interpolated exponentially.
    pub fn speed_factor(&self, value: u8) -> Option<f64> {
        if self.speed == SpeedOption::Ignored {
            return None;
        }
        let max = self.max_speed_percent? as f64 / 100.0;
        let exponent = if value >= 64 {
            (value as f64 - 64.0) / 63.0
        } else {
            (value as f64 - 64.0) / 64.0
        };
        Some(max.powf(exponent))
    }

    /// Writes a `trkOptions` element holding only the non-default dimensions.
    pub fn write_xml(&self, w: &mut XmlWriter) {
        let mut attrs: Attrs = vec![];
        if self.velocity != VelocityOption::Ignored {
            attrs.push(("velocity", velocity_name(self.velocity).to_string()));
            if let Some(min) = self.min_velocity {
                attrs.push(("minVelocity", min.to_string()));
            }
        }
        self.push_controller(&mut attrs, "pressure", self.pressure);
        if self.trk_off != TrkOffOption::Ignored {
            attrs.push(("trkOff", trk_off_name(self.trk_off).to_string()));
        }
        self.push_controller(&mut attrs, "pitchWheel", self.pitch_wheel);
        self.push_controller(&mut attrs, "modulation", self.mod_wheel);
        if self.speed != SpeedOption::Ignored {
            attrs.push(("speedOption", speed_name(self.speed).to_string()));
            if let Some(percent) = self.max_speed_percent {
                attrs.push(("maxSpeedPercent", percent.to_string()));
            }
        }
        w.empty("trkOptions", &attrs);
    }

    fn push_controller(&self, attrs: &mut Attrs, name: &'static str, option: ControllerOption) {
        if option == ControllerOption::Ignored {
            return;
        }
        attrs.push((name, controller_name(option).to_string()));
        if option == ControllerOption::Volume {
            if let (Some(min), Some(max)) = (self.min_volume, self.max_volume) {
                attrs.push(("maxVolume", max.to_string()));
                attrs.push(("minVolume", min.to_string()));
            }
        }
    }

    fn controllers(&self) -> [(InputDimension, ControllerOption); 3] {
        [
            (InputDimension::Pressure, self.pressure),
            (InputDimension::PitchWheel, self.pitch_wheel),
            (InputDimension::ModWheel, self.mod_wheel),
        ]
    }
}

/// Continuous input dimensions a performer can move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDimension {
    Pressure,
    PitchWheel,
    ModWheel,
}

impl InputDimension {
    pub fn speed_option(&self) -> SpeedOption {
        match self {
            InputDimension::Pressure => SpeedOption::Pressure,
            InputDimension::PitchWheel => SpeedOption::PitchWheel,
            InputDimension::ModWheel => SpeedOption::ModWheel,
        }
    }
}

fn velocity_name(option: VelocityOption) -> &'static str {
    match option {
        VelocityOption::Ignored => "ignored",
        VelocityOption::Scaled => "scaled",
        VelocityOption::Shared => "shared",
        VelocityOption::Overridden => "overridden",
    }
}

fn controller_name(option: ControllerOption) -> &'static str {
    match option {
        ControllerOption::Ignored => "ignored",
        ControllerOption::Aftertouch => "aftertouch",
        ControllerOption::ChannelPressure => "channelPressure",
        ControllerOption::Modulation => "modulation",
        ControllerOption::Volume => "volume",
        ControllerOption::Expression => "expression",
        ControllerOption::Pan => "pan",
        ControllerOption::PitchWheel => "pitchWheel",
    }
}

fn trk_off_name(option: TrkOffOption) -> &'static str {
    match option {
        TrkOffOption::Ignored => "ignored",
        TrkOffOption::StopChord => "stopChord",
        TrkOffOption::StopNow => "stopNow",
        TrkOffOption::Fade => "fade",
        TrkOffOption::HoldLast => "holdLast",
        TrkOffOption::HoldAll => "holdAll",
    }
}

fn speed_name(option: SpeedOption) -> &'static str {
    match option {
        SpeedOption::Ignored => "ignored",
        SpeedOption::NoteOn => "noteOn",
        SpeedOption::Pressure => "pressure",
        SpeedOption::PitchWheel => "pitchWheel",
        SpeedOption::ModWheel => "modWheel",
    }
}
