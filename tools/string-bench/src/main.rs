/// String Bench — sympathetic string and voice DSP validation CLI.
///
/// Prints string-bank grid geometry, writes impulse responses, measures
/// voice stop times against the decay setting and checks chorus delay
/// accuracy against an ideal modulated delay.
///
/// Usage:
///   string-bench segments [--sample-rate SR] [--tuning ST] [--damping S] [--p4th]
///   string-bench impulse [--string I] [--samples N] [--buzz B] [--csv FILE]
///   string-bench decay [--note N] [--velocity V] [--damping S] [--masses M]
///   string-bench chorus [--depth D] [--freq F] [--tone HZ] [--seconds S]

use std::error::Error;
use std::f64::consts::PI;

use coupledmass_dsp::chorus::ModulatedDelayVoice;
use coupledmass_dsp::mass_spring::MassCount;
use coupledmass_dsp::stiff_string::{StiffString, INPUT_POINT, OUTPUT_OFFSET};
use coupledmass_dsp::tables::{self, STRING_COUNT};
use coupledmass_dsp::voice::{NoteConstants, Voice, VoiceSettings};

const DEFAULT_SR: f64 = 44100.0;

type BenchResult = Result<(), Box<dyn Error>>;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        return;
    }

    let result = match args[1].as_str() {
        "segments" => cmd_segments(&args[2..]),
        "impulse" => cmd_impulse(&args[2..]),
        "decay" => cmd_decay(&args[2..]),
        "chorus" => cmd_chorus(&args[2..]),
        "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            print_usage();
            Err(format!("unknown subcommand: {other}").into())
        }
    };
    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn print_usage() {
    eprintln!("String Bench — sympathetic string and voice DSP validation");
    eprintln!();
    eprintln!("Subcommands:");
    eprintln!("  segments   Grid geometry of the eight-string bank");
    eprintln!("  impulse    Impulse response of one string (optionally to CSV)");
    eprintln!("  decay      Voice stop time vs. the free-decay setting");
    eprintln!("  chorus     Chorus delay error vs. an ideal modulated delay");
    eprintln!();
    eprintln!("Common flags: --sample-rate SR (default 44100)");
}

fn parse_flag(args: &[String], flag: &str, default: f64) -> Result<f64, Box<dyn Error>> {
    for i in 0..args.len().saturating_sub(1) {
        if args[i] == flag {
            return args[i + 1]
                .parse()
                .map_err(|_| format!("invalid value for {flag}: {}", args[i + 1]).into());
        }
    }
    Ok(default)
}

fn parse_flag_str<'a>(args: &'a [String], flag: &str, default: &'a str) -> &'a str {
    for i in 0..args.len().saturating_sub(1) {
        if args[i] == flag {
            return &args[i + 1];
        }
    }
    default
}

fn has_switch(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

// ─── Grid geometry ──────────────────────────────────────────────────────────

fn cmd_segments(args: &[String]) -> BenchResult {
    let sr = parse_flag(args, "--sample-rate", DEFAULT_SR)?;
    let tuning = parse_flag(args, "--tuning", 0.0)?;
    let damping = parse_flag(args, "--damping", 5.4)?;
    let p4th = has_switch(args, "--p4th");

    println!("String bank geometry ({sr:.0} Hz, tuning {tuning:+.1} st, T60 {damping:.1} s)");
    println!(
        "{:>3}  {:>8}  {:>9}  {:>10}  {:>10}  {:>4}  {:>4}",
        "#", "len (m)", "c (m/s)", "h_min (mm)", "h (mm)", "N", "tap"
    );
    println!("{:-<3}  {:-<8}  {:-<9}  {:-<10}  {:-<10}  {:-<4}  {:-<4}", "", "", "", "", "", "", "");

    for i in 0..STRING_COUNT {
        let physics = tables::string_physics(i, p4th);
        let mut string = StiffString::new(i, physics, damping, sr)?;
        string.configure(physics, damping, tuning)?;
        let s = string.scheme();
        println!(
            "{i:>3}  {:>8.4}  {:>9.1}  {:>10.3}  {:>10.3}  {:>4}  {:>4}",
            s.length,
            s.wave_speed,
            s.min_spacing * 1e3,
            s.spacing * 1e3,
            s.segments,
            s.output_tap()
        );
    }
    Ok(())
}

// ─── Impulse response ───────────────────────────────────────────────────────

fn cmd_impulse(args: &[String]) -> BenchResult {
    let sr = parse_flag(args, "--sample-rate", DEFAULT_SR)?;
    let index = parse_flag(args, "--string", 0.0)? as usize;
    let samples = parse_flag(args, "--samples", 2048.0)? as usize;
    let buzz = parse_flag(args, "--buzz", StiffString::DEFAULT_BUZZ)?;
    let damping = parse_flag(args, "--damping", 5.4)?;
    let csv_path = parse_flag_str(args, "--csv", "");

    if index >= STRING_COUNT {
        return Err(format!("string index {index} out of range (0-{})", STRING_COUNT - 1).into());
    }

    let mut string = StiffString::new(index, tables::string_physics(index, false), damping, sr)?;
    string.set_buzz(buzz);

    let mut output = Vec::with_capacity(samples);
    for n in 0..samples {
        output.push(string.process(if n == 0 { 1.0 } else { 0.0 }));
    }

    let n = string.segments();
    let expected = (n - OUTPUT_OFFSET - INPUT_POINT).div_ceil(2) + 2;
    let arrival = output.iter().position(|&y| y != 0.0);
    let peak = output.iter().map(|y| y.abs()).fold(0.0f64, f64::max);

    println!("Impulse response, string {index} ({n} segments, buzz {buzz:.2})");
    match arrival {
        Some(a) => println!("  First output:  sample {a} (stencil front predicts {expected})"),
        None => println!("  First output:  none within {samples} samples"),
    }
    println!("  Peak:          {peak:.6e}");

    if !csv_path.is_empty() {
        let mut lines = Vec::with_capacity(samples + 1);
        lines.push("sample,output".to_string());
        for (i, y) in output.iter().enumerate() {
            lines.push(format!("{i},{y:.9e}"));
        }
        std::fs::write(csv_path, lines.join("\n") + "\n")
            .map_err(|e| format!("{csv_path}: {e}"))?;
        println!("\nCSV written to {csv_path}");
    }
    Ok(())
}

// ─── Voice decay ────────────────────────────────────────────────────────────

fn cmd_decay(args: &[String]) -> BenchResult {
    let sr = parse_flag(args, "--sample-rate", DEFAULT_SR)?;
    let note = parse_flag(args, "--note", 57.0)? as u8;
    let velocity = parse_flag(args, "--velocity", 100.0)? / 127.0;
    let damping = parse_flag(args, "--damping", 2.0)?;
    let masses = parse_flag(args, "--masses", 10.0)? as usize;

    let settings = VoiceSettings {
        mass_count: MassCount::new(masses)?,
        damping,
        ..VoiceSettings::default()
    };

    settings.check_stability(sr)?;
    let mut voice = Voice::new(sr)?;
    let k = voice
        .start_note(note, velocity, &settings, false)
        .ok_or("no stable pitch for these settings")?;
    voice.stop_note();

    // Give up well past the counter's worst case.
    let limit = (damping * sr * masses as f64) as u64 + 1;
    let mut peak = 0.0f64;
    let mut samples = 0u64;
    let mut sample = [0.0f64; 1];
    while voice.is_active() && samples <= limit {
        sample[0] = 0.0;
        voice.render(&mut sample);
        peak = peak.max(sample[0].abs());
        samples += 1;
    }

    let expected = (damping * sr).floor() as u64;
    println!("Voice decay, MIDI {note} ({:.2} Hz), {masses} masses", k.frequency);
    if k.frequency < NoteConstants::derive(note, velocity, &settings).frequency {
        println!("  (pitch clamped to the chain's stability limit)");
    }
    println!("  Spring constant: {:.4e} N/m", k.spring);
    println!("  Peak output:     {peak:.6e}");
    if voice.is_active() {
        println!("  Stop:            not reached within {limit} samples");
    } else {
        println!(
            "  Stop:            {samples} samples ({:.4} s), decay setting {expected} samples ({damping:.3} s)",
            samples as f64 / sr
        );
    }
    Ok(())
}

// ─── Chorus accuracy ────────────────────────────────────────────────────────

fn cmd_chorus(args: &[String]) -> BenchResult {
    let sr = parse_flag(args, "--sample-rate", DEFAULT_SR)?;
    let depth = parse_flag(args, "--depth", 400.0)?;
    let freq = parse_flag(args, "--freq", 0.5)?;
    let tone = parse_flag(args, "--tone", 220.0)?;
    let seconds = parse_flag(args, "--seconds", 2.0)?;

    let mut voice = ModulatedDelayVoice::new(sr, freq);
    voice.set_depth(depth)?;

    let range = depth / 2.0;
    let warmup = (depth * 1.5) as usize + 4;
    let total = (seconds * sr) as usize;

    let mut max_err = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut measured = 0usize;
    for n in 0..total {
        let x = (2.0 * PI * tone * n as f64 / sr).sin();
        let y = voice.process(x);
        if n > warmup {
            // The LFO advances before it is read.
            let delay = depth + range * (2.0 * PI * freq * (n + 1) as f64 / sr).sin();
            let ideal = (2.0 * PI * tone * (n as f64 - delay) / sr).sin();
            let err = (y - ideal).abs();
            max_err = max_err.max(err);
            sum_sq += err * err;
            measured += 1;
        }
    }
    let rms = (sum_sq / measured.max(1) as f64).sqrt();

    println!("Chorus delay accuracy");
    println!("  Depth:      {depth:.1} samples (sweep {:.1}..{:.1})", depth - range, depth + range);
    println!("  Mod rate:   {freq:.3} Hz");
    println!("  Test tone:  {tone:.1} Hz");
    println!("  Max error:  {max_err:.3e} ({:.1} dB)", 20.0 * max_err.max(1e-20).log10());
    println!("  RMS error:  {rms:.3e}");
    Ok(())
}
