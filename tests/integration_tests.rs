//! Integration tests for the score engine
//!
//! Tests the path from tracks and YAML documents through sequence
//! validation, timeline rendering and live dispatch.

use seqtrk::dispatch::ChannelState;
use seqtrk::options::TrkOffOption;
use seqtrk::{
    distribute_ms_durations, render, render_yaml, CautionaryChordDef, ChannelCarryMsgs, ChordDef,
    EngineConfig, Event, MidiMsg, Performer, PlaybackCommand, RestDef, RoundingMode, ScoreDef,
    ScoreError, Seq, Trk,
};

fn chord(ms_duration: u32, pitch: u8) -> Event {
    Event::Chord(ChordDef::new(0, ms_duration, vec![pitch], 100).unwrap())
}

fn rest(ms_duration: u32) -> Event {
    Event::Rest(RestDef::midi(0, ms_duration).unwrap())
}

const DUET: &str = r#"
midi-channels: [0, 1]
barlines: [1000]
trks:
  - channel: 0
    events:
      - chord: { ms-duration: 1000, pitches: [60], velocity: 100 }
      - chord: { ms-duration: 1000, pitches: [62], velocity: 100 }
  - channel: 1
    events:
      - chord: { ms-duration: 1500, pitches: [48, 55], velocity: 70, controls: { patch: 42 } }
      - rest: { ms-duration: 300 }
      - chord: { ms-duration: 200, pitches: [50], velocity: 70 }
inputs:
  - pitch: 60
    note-on:
      seq:
        options: { trk-off: holdLast }
        trk-ons:
          - { channel: 0, ms-position: 0, n-midi-objects: 2 }
          - { channel: 1, ms-position: 0, n-midi-objects: 3 }
    note-off:
      trk-offs:
        - { channel: 0, ms-position: 0 }
        - { channel: 1, ms-position: 0, options: { trk-off: stopNow } }
"#;

#[test]
fn test_seq_with_empty_channel_is_synthesized() {
    let trk = Trk::new(0, 0, vec![chord(500, 60), rest(300)]).unwrap();
    let empty = Trk::empty(1, 0).unwrap();
    let seq = Seq::new(0, vec![trk, empty], &[0, 1]).unwrap();
    assert_eq!(seq.midi_channels(), vec![0, 1]);
    assert_eq!(seq.trks().len(), 2);
    assert_eq!(seq.trk(0).unwrap().len(), 2);
    assert!(seq.trk(1).unwrap().is_empty());
    assert_eq!(seq.channels_with_data(), vec![0]);
    assert_eq!(seq.ms_duration(), 800);

    let seq = Seq::new(0, vec![Trk::new(0, 0, vec![chord(500, 60)]).unwrap()], &[0, 1]).unwrap();
    assert!(seq.trk(1).unwrap().is_empty());
}

#[test]
fn test_seq_ending_without_a_chord_fails() {
    let echo = Event::CautionaryChord(CautionaryChordDef::new(0, 100, vec![60]).unwrap());
    let trk = Trk::new(0, 0, vec![chord(500, 60), echo, rest(300)]).unwrap();
    let empty = Trk::empty(1, 0).unwrap();
    let result = Seq::new(0, vec![trk, empty], &[0, 1]);
    assert!(matches!(result, Err(ScoreError::StructuralInconsistency(_))));
}

#[test]
fn test_seq_without_onset_fails() {
    let trk = Trk::new(0, 10, vec![chord(500, 60), rest(300)]).unwrap();
    let empty = Trk::empty(1, 0).unwrap();
    match Seq::new(0, vec![trk, empty], &[0, 1]) {
        Err(ScoreError::StructuralInconsistency(message)) => {
            assert_eq!(message, "no track begins at position 0")
        }
        other => panic!("expected a structural inconsistency, got {:?}", other),
    }
}

#[test]
fn test_declared_channels_appear_exactly_once() {
    let trks = vec![
        Trk::new(3, 0, vec![chord(100, 60)]).unwrap(),
        Trk::new(7, 50, vec![chord(100, 60)]).unwrap(),
    ];
    let seq = Seq::new(0, trks, &[7, 0, 3]).unwrap();
    let mut channels = seq.midi_channels();
    assert_eq!(channels, vec![7, 0, 3]);
    channels.sort();
    channels.dedup();
    assert_eq!(channels.len(), 3);
    for channel in seq.channels_with_data() {
        assert!([7, 0, 3].contains(&channel));
    }
}

#[test]
fn test_render_yaml_document() {
    let xml = render_yaml(DUET).unwrap();
    assert!(xml.contains("<seqDef msPosition=\"0\">"));
    assert!(xml.contains("<inputNote notatedPitch=\"60\">"));
    assert!(xml.contains("<trkOptions trkOff=\"holdLast\"/>"));
    assert!(xml.contains("<bar msPosition=\"0\" msDuration=\"1000\">"));
    assert!(xml.contains("<bar msPosition=\"1000\" msDuration=\"1000\">"));
    assert!(xml.contains("<cautionaryChord msPosition=\"0\" msDuration=\"500\" pitches=\"48 55\"/>"));
    assert!(xml.contains("<msg m=\"0xC1 42\"/>"));
}

#[test]
fn test_carried_note_offs_lead_the_next_bar() {
    let score = ScoreDef::from_yaml(DUET).unwrap();
    let bars = score.render().unwrap();
    assert_eq!(bars.len(), 2);

    let first = &bars[1].moments(0)[0];
    assert_eq!(first.ms_position, 0);
    let sent: Vec<MidiMsg> = first.messages().copied().collect();
    assert_eq!(sent[0], MidiMsg::note_off(0, 60, 64).unwrap());
    assert_eq!(sent[1], MidiMsg::note_on(0, 62, 100).unwrap());

    // channel 1 resumes with its patch in bar 2
    assert!(bars[1].resume[&1].contains(&MidiMsg::program_change(1, 42).unwrap()));
    assert!(bars[1].moments(1).iter().all(|m| m.note_ons.is_empty() || m.ms_position > 0));
}

#[test]
fn test_render_without_forced_defaults() {
    let score = ScoreDef::from_yaml(DUET).unwrap();
    let config = EngineConfig {
        force_controller_defaults: false,
        ..score.engine
    };
    let bars = render(&score.seq, &score.barlines, &config).unwrap();
    let start = &bars[0].moments(0)[0];
    assert!(start.controls.is_empty());
    assert_eq!(bars[0].moments(1)[0].controls, vec![MidiMsg::program_change(1, 42).unwrap()]);
}

#[test]
fn test_live_performance() {
    let score = ScoreDef::from_yaml(DUET).unwrap();
    let mut performer = Performer::new(&score.seq);

    let started = performer.note_on(60, 90, 0).unwrap();
    assert_eq!(started.len(), 2);
    assert!(started
        .iter()
        .all(|c| matches!(c, PlaybackCommand::Start { options, .. } if options.trk_off == TrkOffOption::HoldLast)));

    let stopped = performer.note_off(60, 0, 1200).unwrap();
    assert_eq!(stopped.len(), 2);
    match &stopped[1] {
        PlaybackCommand::Stop { channel, plan, .. } => {
            assert_eq!(*channel, 1);
            assert_eq!(plan.option, TrkOffOption::StopNow);
            assert_eq!(plan.stop_at, 1200);
            assert_eq!(plan.note_offs.len(), 2);
        }
        other => panic!("expected a stop, got {:?}", other),
    }
    assert!(matches!(
        performer.state(0),
        Some(ChannelState::Releasing { option: TrkOffOption::HoldLast, .. })
    ));
    assert_eq!(performer.state(1), Some(&ChannelState::Idle));
}

#[test]
fn test_carry_rejects_foreign_messages() {
    let mut carry = ChannelCarryMsgs::new(5).unwrap();
    assert!(matches!(
        carry.add_note_off(MidiMsg::note_on(5, 60, 100).unwrap()),
        Err(ScoreError::InvalidRange { .. })
    ));
    assert!(matches!(
        carry.add_note_off(MidiMsg::note_off(4, 60, 64).unwrap()),
        Err(ScoreError::InvalidRange { .. })
    ));
    carry.add_note_off(MidiMsg::note_off(5, 60, 64).unwrap()).unwrap();
    assert_eq!(carry.take_note_offs().len(), 1);
}

#[test]
fn test_envelope_durations_always_sum() {
    for rounding in [RoundingMode::HalfToEven, RoundingMode::HalfAwayFromZero] {
        for count in 1..=50usize {
            for ms_duration in (count as u32..=10_000).step_by(97) {
                let slices = distribute_ms_durations(count, ms_duration, rounding).unwrap();
                assert_eq!(slices.len(), count);
                assert_eq!(slices.iter().sum::<u32>(), ms_duration);
            }
        }
    }
}

#[test]
fn test_transposition() {
    let mut high = chord(100, 120);
    high.transpose(20);
    assert_eq!(high.pitches().unwrap(), &[127]);
    let mut low = chord(100, 5);
    low.transpose(-20);
    assert_eq!(low.pitches().unwrap(), &[0]);

    let mut echo = Event::CautionaryChord(CautionaryChordDef::new(0, 100, vec![120, 5]).unwrap());
    for interval in [-200, -20, 0, 20, 200] {
        echo.transpose(interval);
        assert_eq!(echo.pitches().unwrap(), &[120, 5]);
    }
}

#[test]
fn test_clones_are_independent() {
    let original = chord(100, 60);
    let mut copy = original.clone();
    copy.transpose(12);
    copy.adjust_ms_duration(2.0).unwrap();
    assert_eq!(original.pitches().unwrap(), &[60]);
    assert_eq!(original.ms_duration(), 100);
    assert_eq!(copy.ms_duration(), 200);

    let mut unchanged = rest(333);
    unchanged.adjust_ms_duration(1.0).unwrap();
    assert_eq!(unchanged.ms_duration(), 333);
}
