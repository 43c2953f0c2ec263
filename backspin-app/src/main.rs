//! Backspin demo host
//!
//! Embeds the turntable engine in a live cpal output stream, feeds it a
//! synthesized stereo test tone, and drives the transport from stdin
//! line commands. This is the "host audio graph" and "control plane"
//! the engine treats as external collaborators.

use std::f32::consts::TAU;
use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use backspin_audio::{
    TransportCommand, TransportEvent, Turntable, TurntableHandle, DEFAULT_RAMP_MS,
};

/// Test tone frequency in Hz
const TONE_HZ: f32 = 220.0;
/// Test tone amplitude
const TONE_LEVEL: f32 = 0.2;
/// Initial scratch buffer size (stereo floats); grows if the device
/// hands out larger blocks
const MAX_BLOCK_SIZE: usize = 16384;

/// Line commands accepted on stdin
enum ConsoleCommand {
    Transport(TransportCommand),
    Quit,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_audio = shutdown.clone();

    // The engine is constructed on the audio thread (it needs the
    // device sample rate); the control handle comes back over a channel.
    let (handle_tx, handle_rx) = crossbeam_channel::bounded(1);
    let audio_thread = thread::spawn(move || {
        if let Err(e) = run_audio_thread(handle_tx, shutdown_audio) {
            error!("audio thread failed: {e:#}");
        }
    });

    let handle = handle_rx
        .recv()
        .context("audio thread exited before the stream came up")?;

    // Drain acknowledgements on a dedicated thread; exits once the
    // engine (and its event sender) is dropped.
    let events = handle.events().clone();
    let event_thread = thread::spawn(move || {
        let mut last_rate = f64::NAN;
        for event in events.iter() {
            match event {
                TransportEvent::RateUpdate { rate } => {
                    // One per block; only log meaningful platter moves.
                    let settled = (rate == 0.0 || rate == 1.0) && rate != last_rate;
                    if (rate - last_rate).abs() >= 0.05 || settled || last_rate.is_nan() {
                        info!(rate, "platter rate");
                        last_rate = rate;
                    }
                }
                other => info!(?other, "transport event"),
            }
        }
    });

    print_usage();
    run_console(&handle)?;

    shutdown.store(true, Ordering::SeqCst);
    let _ = audio_thread.join();
    drop(handle);
    let _ = event_thread.join();
    Ok(())
}

/// Read stdin line commands until quit or EOF
fn run_console(handle: &TurntableHandle) -> Result<()> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("read stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(ConsoleCommand::Quit) => break,
            Some(ConsoleCommand::Transport(command)) => {
                if let Err(e) = handle.send(command) {
                    warn!("command dropped: {e}");
                }
            }
            None => {
                eprintln!("unrecognized command: {line}");
                print_usage();
            }
        }
    }
    Ok(())
}

fn parse_line(line: &str) -> Option<ConsoleCommand> {
    let mut parts = line.split_whitespace();
    let command = match parts.next()? {
        "pause" => TransportCommand::PauseEngage {
            duration_ms: DEFAULT_RAMP_MS,
        },
        "play" => TransportCommand::PauseDisengage {
            duration_ms: DEFAULT_RAMP_MS,
        },
        "stop" => TransportCommand::Stop {
            duration_ms: DEFAULT_RAMP_MS,
        },
        "scratch" => {
            let velocity: f64 = parts.next()?.parse().ok()?;
            TransportCommand::ScratchDrag {
                velocity,
                position: 0.0,
            }
        }
        "release" => TransportCommand::ScratchEnd {
            duration_ms: DEFAULT_RAMP_MS,
        },
        "quit" | "exit" => return Some(ConsoleCommand::Quit),
        _ => return None,
    };
    Some(ConsoleCommand::Transport(command))
}

fn print_usage() {
    println!("commands: pause | play | stop | scratch <velocity> | release | quit");
}

fn run_audio_thread(handle_tx: Sender<TurntableHandle>, shutdown: Arc<AtomicBool>) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("no audio output device found"))?;
    let config = device
        .default_output_config()
        .context("query default output config")?;

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    anyhow::ensure!(channels > 0, "output device reports zero channels");

    let (mut turntable, handle) = Turntable::new(sample_rate);
    handle_tx
        .send(handle)
        .map_err(|_| anyhow!("main thread went away"))?;

    info!(sample_rate, channels, "audio stream starting");

    // Tone phase in cycles, plus preallocated stereo work buffers so
    // the callback never allocates.
    let mut phase = 0.0f32;
    let phase_step = TONE_HZ / sample_rate as f32;
    let mut input = vec![0.0f32; MAX_BLOCK_SIZE];
    let mut stereo = vec![0.0f32; MAX_BLOCK_SIZE];

    let stream = device
        .build_output_stream(
            &config.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                let needed = frames * 2;
                if needed > input.len() {
                    input.resize(needed, 0.0);
                    stereo.resize(needed, 0.0);
                }

                // Synthesize the stereo test signal the engine transports.
                for frame in input[..needed].chunks_exact_mut(2) {
                    let sample = (phase * TAU).sin() * TONE_LEVEL;
                    frame[0] = sample;
                    frame[1] = sample;
                    phase += phase_step;
                    if phase >= 1.0 {
                        phase -= 1.0;
                    }
                }

                turntable.process(&input[..needed], &mut stereo[..needed]);

                if channels == 2 {
                    data.copy_from_slice(&stereo[..needed]);
                } else {
                    // Downmix for devices that are not plain stereo.
                    for (i, out) in data.chunks_exact_mut(channels).enumerate() {
                        let mono = (stereo[i * 2] + stereo[i * 2 + 1]) * 0.5;
                        for sample in out.iter_mut() {
                            *sample = mono;
                        }
                    }
                }
            },
            |err| {
                error!("audio stream error: {err}");
            },
            None,
        )
        .context("build output stream")?;

    stream.play().context("start audio stream")?;

    while !shutdown.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(50));
    }
    Ok(())
}
