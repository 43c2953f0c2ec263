//! Turntable processing unit
//!
//! Applies the platter transport to a continuously streaming stereo
//! signal: incoming audio is written into the delay ring at real-time
//! rate while the read cursor follows the state machine's rate, giving
//! pitch-bent slowdowns, spin-ups, and reverse scratching without ever
//! reading ahead of available audio.

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::debug;

use crate::engine::{TransportCommand, TransportEvent, TurntableHandle};
use crate::ring::DelayRing;
use crate::transport::{PendingAction, RampOutcome, Transport, TransportState};

/// Default read delay window in seconds
///
/// Platter manipulations in practice never need the read cursor to
/// stray more than about a second from real time.
pub const DEFAULT_READ_DELAY_SECONDS: f64 = 1.0;

/// One simulated turntable channel
///
/// Owned and mutated exclusively by the render thread. Constructed once
/// per deck; all buffers are allocated here and the per-block
/// [`process`] call performs no allocation, locking, or panicking
/// arithmetic.
///
/// [`process`]: Turntable::process
pub struct Turntable {
    transport: Transport,
    ring: DelayRing,
    sample_rate: u32,
    read_delay_seconds: f64,
    command_rx: Receiver<TransportCommand>,
    event_tx: Sender<TransportEvent>,
}

impl Turntable {
    /// Rates at or below this magnitude produce silence instead of an
    /// interpolated read, avoiding artifacts from a near-stationary
    /// platter.
    const SILENCE_GATE: f64 = 0.001;

    /// Channel capacity; headroom for command bursts without saturation
    const CHANNEL_CAPACITY: usize = 1024;

    /// Create a turntable with the default one-second delay window
    pub fn new(sample_rate: u32) -> (Self, TurntableHandle) {
        Self::with_read_delay(sample_rate, DEFAULT_READ_DELAY_SECONDS)
    }

    /// Create a turntable with an explicit delay window
    pub fn with_read_delay(sample_rate: u32, read_delay_seconds: f64) -> (Self, TurntableHandle) {
        let delay_samples = ((read_delay_seconds * sample_rate as f64).floor() as usize).max(1);
        let (command_tx, command_rx) = bounded(Self::CHANNEL_CAPACITY);
        let (event_tx, event_rx) = bounded(Self::CHANNEL_CAPACITY);

        let turntable = Self {
            transport: Transport::new(sample_rate),
            ring: DelayRing::new(delay_samples),
            sample_rate,
            read_delay_seconds,
            command_rx,
            event_tx,
        };
        (turntable, TurntableHandle::new(command_tx, event_rx))
    }

    /// Sample rate this unit was constructed with
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Fixed buffering delay reported as compensation on pause/stop
    pub fn read_delay_seconds(&self) -> f64 {
        self.read_delay_seconds
    }

    /// Current motion phase
    pub fn transport_state(&self) -> TransportState {
        self.transport.state()
    }

    /// Current instantaneous playback rate
    pub fn current_rate(&self) -> f64 {
        self.transport.rate()
    }

    /// Whether a rate ramp is in progress
    pub fn is_ramping(&self) -> bool {
        self.transport.envelope().is_some()
    }

    /// Nominal read cursor, for host diagnostics
    pub fn read_position(&self) -> f64 {
        self.ring.read_position()
    }

    /// Write cursor, for host diagnostics
    pub fn write_position(&self) -> usize {
        self.ring.write_position()
    }

    /// Total ring length in samples
    pub fn buffer_len(&self) -> usize {
        self.ring.buffer_len()
    }

    /// Apply one control command
    ///
    /// Runs on the render thread, outside the per-sample loop. Commands
    /// arriving while a ramp is in flight override it; the discarded
    /// ramp's pending action never fires.
    pub fn handle_command(&mut self, command: TransportCommand) {
        debug!(?command, state = ?self.transport.state(), "transport command");
        match command {
            TransportCommand::PauseEngage { duration_ms } => {
                self.transport.pause_engage(duration_ms);
            }
            TransportCommand::PauseDisengage { duration_ms } => {
                if self.transport.pause_disengage(duration_ms) {
                    self.post(TransportEvent::Playing);
                }
            }
            TransportCommand::Stop { duration_ms } => self.transport.stop(duration_ms),
            TransportCommand::ScratchDrag { velocity, position } => {
                self.transport.scratch_drag(velocity, position);
            }
            TransportCommand::ScratchEnd { duration_ms } => {
                self.post(TransportEvent::SeekEnd { duration_ms });
                self.transport.scratch_end(duration_ms);
            }
            TransportCommand::DoPause {
                compensation_seconds,
            } => self.post(TransportEvent::Paused {
                compensation_seconds,
            }),
            TransportCommand::DoPauseWithCompensation {
                compensation_seconds,
            } => self.post(TransportEvent::PausedWithCompensation {
                compensation_seconds,
            }),
            TransportCommand::DoPlay => self.post(TransportEvent::Playing),
            TransportCommand::DoStopReset {
                compensation_seconds,
            } => self.post(TransportEvent::StoppedReset {
                compensation_seconds,
            }),
        }
    }

    /// Process one block of interleaved stereo audio
    ///
    /// Drains pending commands first, then runs the per-sample loop:
    /// write input into the ring (unless held), advance the rate
    /// envelope, read the interpolated delayed frame or silence, and
    /// move the read cursor by the signed rate. Posts one `RateUpdate`
    /// per block.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        self.drain_commands();

        // Conservative fail-safe: a host handing us less than a full
        // stereo block gets silence, not degraded processing.
        if input.len() < output.len() || output.len() % 2 != 0 {
            output.fill(0.0);
            return;
        }

        // Sampled once per block: a hold entered mid-block keeps
        // writing until the block boundary.
        let paused = self.transport.state() == TransportState::PausedHeld;
        let frames = output.len() / 2;

        for (i, (frame_in, frame_out)) in input
            .chunks_exact(2)
            .zip(output.chunks_exact_mut(2))
            .enumerate()
        {
            if !paused {
                self.ring.write_frame(i, frame_in[0], frame_in[1]);
            }

            if let Some(outcome) = self.transport.tick() {
                self.finish_ramp(outcome);
            }

            let rate = self.transport.rate();
            if rate.abs() > Self::SILENCE_GATE {
                let (left, right) = self.ring.read_delayed();
                frame_out[0] = left;
                frame_out[1] = right;
            } else {
                frame_out[0] = 0.0;
                frame_out[1] = 0.0;
            }

            self.ring.advance_read(rate);
        }

        if !paused {
            self.ring.advance_write(frames);
        }

        self.post(TransportEvent::RateUpdate {
            rate: self.transport.rate(),
        });
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.command_rx.try_recv() {
            self.handle_command(command);
        }
    }

    /// Fire the acknowledgement owed by a completed ramp
    fn finish_ramp(&mut self, outcome: RampOutcome) {
        match outcome {
            RampOutcome::Held(action) => match action {
                Some(PendingAction::Pause) => self.post(TransportEvent::Paused {
                    compensation_seconds: self.read_delay_seconds,
                }),
                Some(PendingAction::StopReset) => self.post(TransportEvent::StoppedReset {
                    compensation_seconds: self.read_delay_seconds,
                }),
                Some(PendingAction::Play) => self.post(TransportEvent::Playing),
                None => {}
            },
            RampOutcome::Rolling => {}
        }
    }

    /// Post an event without ever blocking the render thread
    ///
    /// A full or disconnected queue drops the event; the control plane
    /// treats the stream as fire-and-forget.
    #[inline]
    fn post(&self, event: TransportEvent) {
        let _ = self.event_tx.try_send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: usize = 50;

    /// Feed `blocks` blocks of a constant stereo signal
    fn run_blocks(turntable: &mut Turntable, blocks: usize, value: f32) -> Vec<f32> {
        let input = vec![value; BLOCK * 2];
        let mut output = vec![0.0f32; BLOCK * 2];
        for _ in 0..blocks {
            turntable.process(&input, &mut output);
        }
        output
    }

    /// Drain all pending events, dropping the per-block rate updates
    fn drain_acks(handle: &TurntableHandle) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Some(event) = handle.try_event() {
            if !matches!(event, TransportEvent::RateUpdate { .. }) {
                events.push(event);
            }
        }
        events
    }

    #[test]
    fn test_rate_update_posted_every_block() {
        let (mut turntable, handle) = Turntable::new(1000);
        run_blocks(&mut turntable, 1, 0.0);
        assert_eq!(
            handle.try_event(),
            Some(TransportEvent::RateUpdate { rate: 1.0 })
        );
        assert_eq!(handle.try_event(), None);
    }

    #[test]
    fn test_pause_round_trip() {
        let (mut turntable, handle) = Turntable::new(1000);
        handle
            .send(TransportCommand::PauseEngage { duration_ms: 100.0 })
            .unwrap();

        // 100-sample ramp completes within the second 50-sample block.
        run_blocks(&mut turntable, 4, 0.5);

        let acks = drain_acks(&handle);
        assert_eq!(
            acks,
            vec![TransportEvent::Paused {
                compensation_seconds: 1.0
            }]
        );
        assert_eq!(turntable.transport_state(), TransportState::PausedHeld);
        assert_eq!(turntable.current_rate(), 0.0);
        assert!(!turntable.is_ramping());
    }

    #[test]
    fn test_pause_engage_idempotent_while_held() {
        let (mut turntable, handle) = Turntable::new(1000);
        handle
            .send(TransportCommand::PauseEngage { duration_ms: 10.0 })
            .unwrap();
        run_blocks(&mut turntable, 2, 0.5);
        drain_acks(&handle);

        let write_before = turntable.write_position();
        handle
            .send(TransportCommand::PauseEngage { duration_ms: 500.0 })
            .unwrap();
        run_blocks(&mut turntable, 2, 0.5);

        assert_eq!(turntable.transport_state(), TransportState::PausedHeld);
        assert!(!turntable.is_ramping());
        assert!(drain_acks(&handle).is_empty());
        // Held platter discards input; the write cursor stays put.
        assert_eq!(turntable.write_position(), write_before);
    }

    #[test]
    fn test_stop_overrides_pause_in_progress() {
        let (mut turntable, handle) = Turntable::new(1000);
        handle
            .send(TransportCommand::PauseEngage {
                duration_ms: 1000.0,
            })
            .unwrap();
        run_blocks(&mut turntable, 1, 0.5); // mid-ramp

        handle
            .send(TransportCommand::Stop { duration_ms: 100.0 })
            .unwrap();
        run_blocks(&mut turntable, 4, 0.5);

        // The discarded pause never acknowledges; only stop completes.
        assert_eq!(
            drain_acks(&handle),
            vec![TransportEvent::StoppedReset {
                compensation_seconds: 1.0
            }]
        );
        assert_eq!(turntable.transport_state(), TransportState::PausedHeld);
    }

    #[test]
    fn test_immediate_acknowledgements() {
        let (mut turntable, handle) = Turntable::new(1000);

        // Disengage while locked playing is guarded: no ack, no ramp.
        turntable.handle_command(TransportCommand::PauseDisengage { duration_ms: 100.0 });
        assert!(drain_acks(&handle).is_empty());
        assert!(!turntable.is_ramping());

        turntable.handle_command(TransportCommand::PauseEngage { duration_ms: 10.0 });
        run_blocks(&mut turntable, 1, 0.0);
        drain_acks(&handle);

        turntable.handle_command(TransportCommand::PauseDisengage { duration_ms: 100.0 });
        assert_eq!(drain_acks(&handle), vec![TransportEvent::Playing]);

        turntable.handle_command(TransportCommand::ScratchEnd { duration_ms: 250.0 });
        assert_eq!(
            drain_acks(&handle),
            vec![TransportEvent::SeekEnd { duration_ms: 250.0 }]
        );

        turntable.handle_command(TransportCommand::DoPause {
            compensation_seconds: 0.25,
        });
        turntable.handle_command(TransportCommand::DoPauseWithCompensation {
            compensation_seconds: 0.5,
        });
        turntable.handle_command(TransportCommand::DoPlay);
        turntable.handle_command(TransportCommand::DoStopReset {
            compensation_seconds: 2.0,
        });
        assert_eq!(
            drain_acks(&handle),
            vec![
                TransportEvent::Paused {
                    compensation_seconds: 0.25
                },
                TransportEvent::PausedWithCompensation {
                    compensation_seconds: 0.5
                },
                TransportEvent::Playing,
                TransportEvent::StoppedReset {
                    compensation_seconds: 2.0
                },
            ]
        );
    }

    #[test]
    fn test_silence_gate_thresholds() {
        let (mut turntable, handle) = Turntable::new(500);
        // Warm the ring: two full seconds of a constant signal laps the
        // whole buffer, so every slot holds 1.0.
        run_blocks(&mut turntable, 24, 1.0);
        drain_acks(&handle);

        // Below and at the gate: silence regardless of buffer contents.
        for velocity in [0.0, 0.0005, 0.001] {
            turntable.handle_command(TransportCommand::ScratchDrag {
                velocity,
                position: 0.0,
            });
            let output = run_blocks(&mut turntable, 1, 1.0);
            assert!(output.iter().all(|&s| s == 0.0), "velocity {velocity}");
        }

        // Just above the gate: interpolated playback of the constant.
        turntable.handle_command(TransportCommand::ScratchDrag {
            velocity: 0.0011,
            position: 0.0,
        });
        let output = run_blocks(&mut turntable, 1, 1.0);
        assert!(output.iter().all(|&s| (s - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_reverse_scratch_plays_buffered_audio() {
        let (mut turntable, handle) = Turntable::new(500);
        run_blocks(&mut turntable, 24, 0.8);
        drain_acks(&handle);

        turntable.handle_command(TransportCommand::ScratchDrag {
            velocity: -1.5,
            position: 0.0,
        });
        let output = run_blocks(&mut turntable, 2, 0.8);
        assert!(output.iter().all(|&s| (s - 0.8).abs() < 1e-6));
        assert_eq!(turntable.current_rate(), -1.5);
    }

    #[test]
    fn test_short_input_block_produces_silence() {
        let (mut turntable, handle) = Turntable::new(1000);
        let input = vec![0.5f32; BLOCK]; // half a stereo block
        let mut output = vec![1.0f32; BLOCK * 2];
        turntable.process(&input, &mut output);

        assert!(output.iter().all(|&s| s == 0.0));
        // The degraded block is skipped entirely, rate update included.
        assert_eq!(handle.try_event(), None);
    }

    /// xorshift64 generator, deterministic across runs
    struct TestRng(u64);

    impl TestRng {
        fn next(&mut self) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0
        }

        fn unit(&mut self) -> f64 {
            (self.next() >> 11) as f64 / (1u64 << 53) as f64
        }
    }

    #[test]
    fn test_fuzzed_command_sequences_keep_indices_bounded() {
        let (mut turntable, handle) = Turntable::new(100);
        let len = turntable.buffer_len();
        let mut rng = TestRng(0xDEADBEEF_CAFEBABE);

        let input = vec![0.25f32; 64 * 2];
        let mut output = vec![0.0f32; 64 * 2];

        for _ in 0..500 {
            let duration_ms = rng.unit() * 500.0;
            // Scratch velocities cover the full expected range [-2, 2].
            let velocity = rng.unit() * 4.0 - 2.0;
            let command = match rng.next() % 5 {
                0 => TransportCommand::PauseEngage { duration_ms },
                1 => TransportCommand::PauseDisengage { duration_ms },
                2 => TransportCommand::Stop { duration_ms },
                3 => TransportCommand::ScratchDrag {
                    velocity,
                    position: rng.unit(),
                },
                _ => TransportCommand::ScratchEnd { duration_ms },
            };
            turntable.handle_command(command);
            turntable.process(&input, &mut output);

            let read = turntable.read_position();
            assert!((0.0..len as f64).contains(&read), "read cursor {read}");
            assert!(turntable.write_position() < len);
            assert!(output.iter().all(|s| s.is_finite()));

            drain_acks(&handle);
        }
    }
}
