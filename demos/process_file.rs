//! Example: Stream a WAV file through the filter stage in uneven chunks
//!
//! Usage: cargo run --example process_file -- input.wav output.wav [cutoff_hz] [config.ini]
//!
//! The spectral operation is a brick-wall high-pass: every bin below
//! `cutoff_hz` (default 120 Hz) is zeroed.

use blockfilter_rt::{FilterConfig, StreamAdapter, CONFIG_FILE_NAME};
use num_complex::Complex32;
use std::path::Path;

/// Host callback sizes, in frames. Deliberately unrelated to the block size.
const CHUNK_PATTERN: [usize; 5] = [441, 512, 128, 1000, 37];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <input.wav> <output.wav> [cutoff_hz] [config.ini]", args[0]);
        std::process::exit(1);
    }

    let input_path = &args[1];
    let output_path = &args[2];
    let cutoff_hz: f32 = match args.get(3) {
        Some(value) => value.parse()?,
        None => 120.0,
    };
    let config_path = match args.get(4) {
        Some(path) => Path::new(path).to_path_buf(),
        None => Path::new(env!("CARGO_MANIFEST_DIR")).join(CONFIG_FILE_NAME),
    };

    let config = if config_path.exists() {
        println!("Loading config from {:?}...", config_path);
        FilterConfig::from_file(&config_path)?
    } else {
        // Demo-friendly block: ~46ms at 44.1 kHz
        FilterConfig::default().with_block_size(2048)
    };
    println!(
        "Block size: {} frames, rotation: {}",
        config.block_size,
        config.rotation.name()
    );

    // Read input audio
    let mut reader = hound::WavReader::open(input_path)?;
    let spec = reader.spec();
    println!(
        "Input: {} Hz, {} channels, {:?}",
        spec.sample_rate, spec.channels, spec.sample_format
    );

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / 32768.0))
                .collect::<Result<_, _>>()?,
            24 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 8388608.0))
                .collect::<Result<_, _>>()?,
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 2147483648.0))
                .collect::<Result<_, _>>()?,
            _ => {
                eprintln!("Unsupported bits per sample: {}", spec.bits_per_sample);
                std::process::exit(1);
            }
        },
    };

    // The stage only filters stereo; duplicate mono, keep the first two channels otherwise
    let stereo: Vec<f32> = match spec.channels {
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        2 => samples,
        n => samples
            .chunks_exact(n as usize)
            .flat_map(|c| [c[0], c[1]])
            .collect(),
    };
    let frames = stereo.len() / 2;

    let block_size = config.block_size;
    let cutoff_bin = (cutoff_hz * block_size as f32 / spec.sample_rate as f32).ceil() as usize;
    println!("High-pass below {} Hz ({} bins)", cutoff_hz, cutoff_bin);

    let high_pass = move |_channel: usize, bins: &mut [Complex32]| {
        let end = cutoff_bin.min(bins.len());
        for bin in &mut bins[..end] {
            *bin = Complex32::new(0.0, 0.0);
        }
    };

    let mut adapter = StreamAdapter::new(high_pass).with_rotation(config.rotation);
    adapter.initialize(Some(&2usize), block_size)?;

    // One extra block of silence pushes the delayed tail out of the stage
    let mut padded = stereo;
    padded.resize(padded.len() + block_size * 2, 0.0);

    println!(
        "Processing {} frames ({:.2}s)...",
        frames,
        frames as f32 / spec.sample_rate as f32
    );
    let start = std::time::Instant::now();

    let mut output = Vec::with_capacity(padded.len());
    let mut chunk = Vec::with_capacity(block_size * 2);
    let mut pos = 0;
    let mut calls = 0usize;
    while pos < padded.len() {
        let chunk_frames = CHUNK_PATTERN[calls % CHUNK_PATTERN.len()].min(block_size);
        let end = (pos + chunk_frames * 2).min(padded.len());
        chunk.clear();
        chunk.extend_from_slice(&padded[pos..end]);
        adapter.process(&mut chunk);
        output.extend_from_slice(&chunk);
        pos = end;
        calls += 1;
    }

    let elapsed = start.elapsed();
    let rtf = elapsed.as_secs_f32() / (frames as f32 / spec.sample_rate as f32);
    println!(
        "Done in {:.3}s over {} callbacks (RTF: {:.4}x realtime)",
        elapsed.as_secs_f32(),
        calls,
        rtf
    );
    let stats = adapter.stats();
    println!(
        "Blocks staged: {}, drain swaps: {}, stage swaps: {}",
        stats.blocks_staged, stats.drain_swaps, stats.stage_swaps
    );

    // Drop the leading block of latency so output lines up with input
    let latency = adapter.latency_frames() * 2;
    let aligned = &output[latency..latency + frames * 2];

    let out_spec = hound::WavSpec {
        channels: 2,
        sample_rate: spec.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(output_path, out_spec)?;
    for sample in aligned {
        let s = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        writer.write_sample(s)?;
    }
    writer.finalize()?;

    println!("Saved to {}", output_path);
    Ok(())
}
