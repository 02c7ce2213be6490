//! Standard MIDI File -> engine events on an absolute time axis.
//!
//! All tracks are merged; note-on, note-off and CC64 are taken from every
//! channel. Tempo changes are honoured for metrical files.

use coupledmass_dsp::engine::EngineEvent;
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

const SUSTAIN_CC: u8 = 64;
/// 120 BPM until the first tempo event.
const DEFAULT_TEMPO_US: u32 = 500_000;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SongEvent {
    pub seconds: f64,
    pub event: EngineEvent,
}

#[derive(Debug, PartialEq)]
pub struct Song {
    pub events: Vec<SongEvent>,
    /// Time of the last event of any kind (s).
    pub length_seconds: f64,
}

enum Raw {
    Tempo(u32),
    Play(EngineEvent),
    Other,
}

pub fn parse(bytes: &[u8]) -> Result<Song, midly::Error> {
    let smf = Smf::parse(bytes)?;

    // (absolute tick, order within file, event)
    let mut raw: Vec<(u64, usize, Raw)> = Vec::new();
    for track in &smf.tracks {
        let mut tick = 0u64;
        for ev in track {
            tick += ev.delta.as_int() as u64;
            let kind = match ev.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(us)) => Raw::Tempo(us.as_int()),
                TrackEventKind::Midi { message, .. } => match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        Raw::Play(EngineEvent::NoteOn {
                            note: key.as_int(),
                            velocity: vel.as_int() as f64 / 127.0,
                        })
                    }
                    MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                        Raw::Play(EngineEvent::NoteOff { note: key.as_int() })
                    }
                    MidiMessage::Controller { controller, value }
                        if controller.as_int() == SUSTAIN_CC =>
                    {
                        Raw::Play(EngineEvent::Sustain(value.as_int() >= 64))
                    }
                    _ => Raw::Other,
                },
                _ => Raw::Other,
            };
            let order = raw.len();
            raw.push((tick, order, kind));
        }
    }
    raw.sort_by_key(|&(tick, order, _)| (tick, order));

    let mut events = Vec::new();
    let mut length_seconds = 0.0f64;

    match smf.header.timing {
        Timing::Metrical(tpq) => {
            let tpq = tpq.as_int().max(1) as f64;
            let mut tempo = DEFAULT_TEMPO_US as f64;
            let mut last_tick = 0u64;
            let mut last_seconds = 0.0f64;
            for (tick, _, kind) in raw {
                let seconds = last_seconds + (tick - last_tick) as f64 * tempo / (tpq * 1e6);
                last_tick = tick;
                last_seconds = seconds;
                length_seconds = seconds;
                match kind {
                    Raw::Tempo(us) => tempo = us as f64,
                    Raw::Play(event) => events.push(SongEvent { seconds, event }),
                    Raw::Other => {}
                }
            }
        }
        Timing::Timecode(fps, subframes) => {
            let ticks_per_second = (fps.as_f32() as f64 * subframes.max(1) as f64).max(1.0);
            for (tick, _, kind) in raw {
                let seconds = tick as f64 / ticks_per_second;
                length_seconds = seconds;
                if let Raw::Play(event) = kind {
                    events.push(SongEvent { seconds, event });
                }
            }
        }
    }

    Ok(Song {
        events,
        length_seconds,
    })
}
