/// Note Renderer — coupled mass-spring synthesizer WAV renderer.
///
/// Standalone CLI tool that runs the full engine (voices, sympathetic
/// strings, low-pass, chorus) offline and writes stereo 24-bit WAV files.
/// Renders single notes, note x velocity batches, or a Standard MIDI File.

mod midi;

use std::error::Error;
use std::path::{Path, PathBuf};

use coupledmass_dsp::engine::{Engine, EngineEvent, TimedEvent};
use coupledmass_dsp::params::EngineParams;
use coupledmass_dsp::tables;

const DEFAULT_SAMPLE_RATE: f64 = 44100.0;
const BLOCK_SIZE: usize = 1024;

struct Options {
    notes: Vec<u8>,
    velocities: Vec<u8>,
    duration: f64,
    hold: Option<f64>,
    output_dir: PathBuf,
    output_file: Option<PathBuf>,
    midi_file: Option<PathBuf>,
    octave: i32,
    sample_rate: f64,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let result = parse_args(&args).and_then(|opts| match opts {
        Some(opts) => run(&opts),
        None => Ok(()),
    });
    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<Option<Options>, Box<dyn Error>> {
    let mut opts = Options {
        notes: Vec::new(),
        velocities: Vec::new(),
        duration: 2.0,
        hold: None,
        output_dir: PathBuf::from("."),
        output_file: None,
        midi_file: None,
        octave: 0,
        sample_rate: DEFAULT_SAMPLE_RATE,
    };

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--note" | "-n" => {
                for s in flag_value(args, &mut i, flag)?.split(',') {
                    opts.notes
                        .push(s.trim().parse().map_err(|_| format!("invalid MIDI note: {s}"))?);
                }
            }
            "--velocity" | "-v" => {
                for s in flag_value(args, &mut i, flag)?.split(',') {
                    opts.velocities
                        .push(s.trim().parse().map_err(|_| format!("invalid velocity: {s}"))?);
                }
            }
            "--duration" | "-d" => {
                opts.duration = flag_value(args, &mut i, flag)?.parse().map_err(|_| "invalid duration")?;
            }
            "--hold" => {
                opts.hold = Some(flag_value(args, &mut i, flag)?.parse().map_err(|_| "invalid hold time")?);
            }
            "--output" | "-o" => opts.output_file = Some(PathBuf::from(flag_value(args, &mut i, flag)?)),
            "--output-dir" => opts.output_dir = PathBuf::from(flag_value(args, &mut i, flag)?),
            "--midi" => opts.midi_file = Some(PathBuf::from(flag_value(args, &mut i, flag)?)),
            "--octave" => {
                opts.octave = flag_value(args, &mut i, flag)?.parse().map_err(|_| "invalid octave")?;
            }
            "--sample-rate" => {
                opts.sample_rate = flag_value(args, &mut i, flag)?.parse().map_err(|_| "invalid sample rate")?;
            }
            "--help" | "-h" => {
                print_usage();
                return Ok(None);
            }
            other => {
                print_usage();
                return Err(format!("unknown argument: {other}").into());
            }
        }
        i += 1;
    }

    if opts.notes.is_empty() {
        opts.notes.push(60);
    }
    if opts.velocities.is_empty() {
        opts.velocities.push(100);
    }

    for &n in &opts.notes {
        if !(tables::MIDI_LO..=tables::MIDI_HI).contains(&n) {
            return Err(format!(
                "MIDI note {n} out of range ({}-{})",
                tables::MIDI_LO,
                tables::MIDI_HI
            )
            .into());
        }
    }
    for &v in &opts.velocities {
        if !(1..=127).contains(&v) {
            return Err(format!("velocity {v} out of range (1-127)").into());
        }
    }
    if !(opts.duration.is_finite() && opts.duration > 0.0) {
        return Err(format!("duration must be positive, got {}", opts.duration).into());
    }

    Ok(Some(opts))
}

fn flag_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, Box<dyn Error>> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} needs a value").into())
}

fn build_engine(opts: &Options) -> Result<Engine, Box<dyn Error>> {
    let mut engine = Engine::new(opts.sample_rate, BLOCK_SIZE)?;
    engine.set_params(&EngineParams {
        octave: opts.octave,
        ..EngineParams::default()
    })?;
    Ok(engine)
}

fn run(opts: &Options) -> Result<(), Box<dyn Error>> {
    if let Some(ref midi_path) = opts.midi_file {
        return render_midi(opts, midi_path);
    }

    let single = opts.notes.len() == 1 && opts.velocities.len() == 1;
    let total = (opts.duration * opts.sample_rate) as usize;
    let hold = opts.hold.unwrap_or(opts.duration * 0.5).clamp(0.0, opts.duration);
    let release_at = (hold * opts.sample_rate) as usize;

    for &midi_note in &opts.notes {
        for &vel in &opts.velocities {
            let note_name = midi_note_name(midi_note);
            let filename = match opts.output_file {
                Some(ref f) if single => f.clone(),
                _ => opts.output_dir.join(format!("mass_{note_name}_v{vel}.wav")),
            };

            eprintln!(
                "Rendering MIDI {midi_note} ({note_name}) vel={vel} dur={}s hold={hold}s → {}",
                opts.duration,
                filename.display()
            );

            let events = [
                TimedEvent {
                    offset: 0,
                    event: EngineEvent::NoteOn {
                        note: midi_note,
                        velocity: vel as f64 / 127.0,
                    },
                },
                TimedEvent {
                    offset: release_at,
                    event: EngineEvent::NoteOff { note: midi_note },
                },
            ];

            let mut engine = build_engine(opts)?;
            let mut left = vec![0.0f64; total];
            let mut right = vec![0.0f64; total];
            engine.process_block(&events, &mut left, &mut right);

            report_peak(&left, &right);
            write_wav(&filename, &left, &right, opts.sample_rate as u32)?;
            eprintln!("  Written: {}", filename.display());
        }
    }
    Ok(())
}

fn render_midi(opts: &Options, path: &Path) -> Result<(), Box<dyn Error>> {
    let bytes = std::fs::read(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let song = midi::parse(&bytes)?;

    let events: Vec<TimedEvent> = song
        .events
        .iter()
        .map(|ev| TimedEvent {
            offset: (ev.seconds * opts.sample_rate).round() as usize,
            event: ev.event,
        })
        .collect();

    // `-d` is the tail rendered after the last event.
    let total = ((song.length_seconds + opts.duration) * opts.sample_rate) as usize;

    let filename = match opts.output_file {
        Some(ref f) => f.clone(),
        None => {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "midi".to_string());
            opts.output_dir.join(format!("{stem}.wav"))
        }
    };

    eprintln!(
        "Rendering {} ({} events, {:.2}s + {:.2}s tail) → {}",
        path.display(),
        events.len(),
        song.length_seconds,
        opts.duration,
        filename.display()
    );

    let mut engine = build_engine(opts)?;
    let mut left = vec![0.0f64; total];
    let mut right = vec![0.0f64; total];
    engine.process_block(&events, &mut left, &mut right);

    report_peak(&left, &right);
    write_wav(&filename, &left, &right, opts.sample_rate as u32)?;
    eprintln!("  Written: {}", filename.display());
    Ok(())
}

fn report_peak(left: &[f64], right: &[f64]) {
    let peak = left
        .iter()
        .chain(right)
        .map(|x| x.abs())
        .fold(0.0f64, f64::max);
    if peak > 0.0 {
        eprintln!("  Peak amplitude: {peak:.6} ({:.1} dBFS)", 20.0 * peak.log10());
    } else {
        eprintln!("  Peak amplitude: 0 (silent)");
    }
    if peak > 1.0 {
        eprintln!("  Warning: output clipped");
    }
}

fn write_wav(path: &Path, left: &[f64], right: &[f64], sample_rate: u32) -> Result<(), Box<dyn Error>> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 24,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| format!("{}: {e}", path.display()))?;
    let scale = (1 << 23) as f64 - 1.0;
    for (&l, &r) in left.iter().zip(right) {
        writer.write_sample((l.clamp(-1.0, 1.0) * scale) as i32)?;
        writer.write_sample((r.clamp(-1.0, 1.0) * scale) as i32)?;
    }
    writer.finalize()?;
    Ok(())
}

fn midi_note_name(midi: u8) -> String {
    let names = ["C", "Cs", "D", "Ds", "E", "F", "Fs", "G", "Gs", "A", "As", "B"];
    let octave = (midi / 12) as i32 - 1;
    let note = (midi % 12) as usize;
    format!("{}{}", names[note], octave)
}

fn print_usage() {
    eprintln!(
        r#"Note Renderer — coupled mass-spring synthesizer WAV renderer

USAGE:
    note-renderer [OPTIONS]

OPTIONS:
    -n, --note <MIDI[,MIDI,...]>     MIDI note(s) to render (0-127, default: 60)
    -v, --velocity <VEL[,VEL,...]>   Velocity(ies) to render (1-127, default: 100)
    -d, --duration <SECS>            Length of each render (default: 2.0);
                                     with --midi, the tail after the last event
        --hold <SECS>                Key-down time (default: half the duration)
    -o, --output <PATH>              Output WAV file (single note or MIDI file)
        --output-dir <DIR>           Output directory for batch mode (default: .)
        --midi <FILE>                Render a Standard MIDI File
        --octave <N>                 Octave switch: -1, 0, 1, 2 (default: 0)
        --sample-rate <HZ>           Render sample rate (default: 44100)
    -h, --help                       Print this help

EXAMPLES:
    note-renderer -n 57 -v 100 -d 4.0 --hold 1.0 -o a3.wav
    note-renderer -n 48 -v 30,64,100,127              # velocity sweep
    note-renderer -n 36,48,60,72 -v 64,127            # batch: notes x velocities
    note-renderer --midi song.mid -d 3.0 -o song.wav  # MIDI file, 3 s tail"#
    );
}
