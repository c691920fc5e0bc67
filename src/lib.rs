pub mod carry;
pub mod clef;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod event;
pub mod input;
pub mod midi;
pub mod options;
pub mod refs;
pub mod seq;
pub mod timeline;
pub mod trk;
pub mod xml;

pub use carry::{CarryContext, ChannelCarryMsgs};
pub use clef::{ClefChangeDef, ClefDef, ClefType};
pub use config::{EngineConfig, ScoreDef};
pub use dispatch::{Performer, PlaybackCommand};
pub use envelope::{distribute_ms_durations, EnvelopeWindow, MidiChordSliderDefs, RoundingMode};
pub use error::ScoreError;
pub use event::{CautionaryChordDef, ChordControls, ChordDef, Event, RestDef, SplittableChordDef};
pub use input::{InputChordDef, InputNoteDef};
pub use midi::MidiMsg;
pub use options::TrkOptions;
pub use refs::{NoteTrigger, Pressure, SeqRef, TrkOff, TrkOn, TrkRef};
pub use seq::Seq;
pub use timeline::{render, Bar, Moment};
pub use trk::{SplitMode, Trk};

/// Load a YAML score document and render it to the XML element stream.
/// This is the main entry point for the library.
pub fn render_yaml(source: &str) -> Result<String, ScoreError> {
    ScoreDef::from_yaml(source)?.to_xml()
}

/// Load and validate a YAML score document without rendering it.
pub fn check_yaml(source: &str) -> Result<ScoreDef, ScoreError> {
    ScoreDef::from_yaml(source)
}
