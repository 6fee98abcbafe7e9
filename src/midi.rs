//! MIDI export functionality

use crate::analysis::{MusicalEvent, Transcription};
use crate::config::{Config, ExportConfig};
use crate::error::TranscriptionError;
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, TrackEvent, TrackEventKind};
use std::fs::File;
use std::io::Write;

/// Export the symbolic events of `transcription` as `transcription.mid`
pub fn export_midi(
    transcription: &Transcription,
    output_dir: &std::path::Path,
    config: &Config,
) -> crate::TranscriptionResult<()> {
    std::fs::create_dir_all(output_dir)?;

    let midi_path = output_dir.join("transcription.mid");
    let midi_data = events_to_smf_bytes(
        &transcription.events,
        transcription.tempo.bpm as f32,
        &config.export,
    )?;

    let mut file = File::create(&midi_path)?;
    file.write_all(&midi_data)?;

    let notes = transcription
        .events
        .iter()
        .filter(|e| !e.pitch.is_rest())
        .count();
    log::info!("Exported {} MIDI notes to {}", notes, midi_path.display());
    Ok(())
}

/// Serialize events into a single-track Standard MIDI File
///
/// Notes are placed at each event's `onset_beats` on the beat grid; rests only
/// leave a gap. The track starts with tempo, 4/4 time signature and a
/// program change.
pub fn events_to_smf_bytes(
    events: &[MusicalEvent],
    tempo_bpm: f32,
    export: &ExportConfig,
) -> crate::TranscriptionResult<Vec<u8>> {
    if tempo_bpm.is_nan() || tempo_bpm <= 0.0 {
        return Err(TranscriptionError::MidiExportError(format!(
            "tempo must be positive, got {}",
            tempo_bpm
        )));
    }
    if export.midi_channel > 15 {
        return Err(TranscriptionError::MidiExportError(format!(
            "channel {} out of range",
            export.midi_channel
        )));
    }

    let ppq = export.ppq;
    let channel = u4::from(export.midi_channel);
    let tempo_uspq = (60_000_000.0 / tempo_bpm).round() as u32;
    let to_tick = |beats: f32| (beats.max(0.0) * ppq as f32).round() as u32;

    // (tick, note-offs sort before note-ons at the same tick, message)
    let mut timed: Vec<(u32, u8, MidiMessage)> = Vec::new();
    for event in events {
        let Some(key) = event.pitch.midi_note() else {
            continue;
        };
        let on_tick = to_tick(event.onset_beats);
        let off_tick = to_tick(event.onset_beats + event.duration_beats).max(on_tick + 1);
        timed.push((
            on_tick,
            1,
            MidiMessage::NoteOn {
                key: u7::from(key.min(127)),
                vel: u7::from(event.velocity.clamp(1, 127)),
            },
        ));
        timed.push((
            off_tick,
            0,
            MidiMessage::NoteOff {
                key: u7::from(key.min(127)),
                vel: u7::from(0),
            },
        ));
    }
    timed.sort_by_key(|&(tick, order, _)| (tick, order));

    let mut track_events = vec![
        TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(tempo_uspq))),
        },
        TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Meta(MetaMessage::TimeSignature(
                4,
                2,  // log2 of the denominator
                24, // MIDI clocks per metronome click
                8,  // 32nd notes per quarter note
            )),
        },
        TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange {
                    program: u7::from(export.midi_program.min(127)),
                },
            },
        },
    ];

    let mut current_tick = 0u32;
    for (tick, _, message) in timed {
        track_events.push(TrackEvent {
            delta: u28::from(tick - current_tick),
            kind: TrackEventKind::Midi { channel, message },
        });
        current_tick = tick;
    }

    track_events.push(TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: midly::Timing::Metrical(u15::from(ppq)),
        },
        tracks: vec![track_events],
    };

    let mut bytes = Vec::new();
    smf.write(&mut bytes)
        .map_err(|e| TranscriptionError::MidiExportError(format!("{:?}", e)))?;
    Ok(bytes)
}
