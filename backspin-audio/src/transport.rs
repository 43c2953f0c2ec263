//! Platter transport state machine and rate envelope
//!
//! Models the motion phases of a vinyl platter (locked playback, eased
//! pause slowdown, linear brake, eased spin-up, scratch dragging) and
//! computes the per-sample playback rate for each of them.

/// Phase of the simulated platter motion
///
/// Exactly one phase is active at any time; it is the sole authority
/// for how the playback rate is computed each sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// Platter locked at nominal speed (rate 1.0)
    #[default]
    LockedPlaying,
    /// Eased deceleration toward a hold
    PausingSlowdown,
    /// Platter held stationary (rate 0.0), input discarded
    PausedHeld,
    /// Eased acceleration back to nominal speed
    ResumingSpinup,
    /// Linear deceleration with stop semantics
    StoppingBrake,
    /// Rate driven directly by scratch velocity, may run backward
    ScratchDrag,
    /// Recovering nominal speed after a scratch release
    SeekEnd,
    /// Scratch released while the platter is held
    SeekEndPaused,
}

/// Action fired exactly once when its owning envelope completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    Pause,
    Play,
    StopReset,
}

/// A rate ramp in progress
///
/// Present only during the four transition states; steady states carry
/// no envelope. Invariant: `elapsed_samples <= total_samples`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateEnvelope {
    /// Samples processed since the ramp started
    pub elapsed_samples: u64,
    /// Ramp length in samples, always at least 1
    pub total_samples: u64,
}

/// Outcome of an envelope completing within a sample tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampOutcome {
    /// Slowdown or brake finished; the platter is now held at rate 0
    Held(Option<PendingAction>),
    /// Spin-up or seek recovery finished; the platter is back at rate 1
    Rolling,
}

/// Transport state machine for one simulated platter
///
/// Tracks the active motion phase and the current playback rate, and
/// advances any ramp in progress one sample at a time via [`tick`].
///
/// [`tick`]: Transport::tick
pub struct Transport {
    sample_rate: u32,
    state: TransportState,
    /// Signed playback rate multiplier (1 = forward, 0 = frozen, <0 = reverse)
    rate: f64,
    envelope: Option<RateEnvelope>,
    pending: Option<PendingAction>,
    /// Last velocity supplied by a scratch drag
    scratch_velocity: f64,
    /// Last platter position reported by a scratch drag
    last_scratch_pos: f64,
}

impl Transport {
    /// Create a transport locked at nominal speed
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            state: TransportState::LockedPlaying,
            rate: 1.0,
            envelope: None,
            pending: None,
            scratch_velocity: 0.0,
            last_scratch_pos: 0.0,
        }
    }

    /// Current motion phase
    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Current instantaneous playback rate
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Ramp in progress, if any
    pub fn envelope(&self) -> Option<RateEnvelope> {
        self.envelope
    }

    /// Action waiting on the current ramp, if any
    pub fn pending_action(&self) -> Option<PendingAction> {
        self.pending
    }

    /// Last velocity supplied by a scratch drag
    pub fn scratch_velocity(&self) -> f64 {
        self.scratch_velocity
    }

    /// Last platter position reported by a scratch drag
    pub fn last_scratch_position(&self) -> f64 {
        self.last_scratch_pos
    }

    /// Begin the eased slowdown into a hold
    ///
    /// No-op while the platter is already held.
    pub fn pause_engage(&mut self, duration_ms: f64) {
        if self.state == TransportState::PausedHeld {
            return;
        }
        self.start_ramp(
            TransportState::PausingSlowdown,
            duration_ms,
            Some(PendingAction::Pause),
        );
    }

    /// Begin the eased spin-up back to nominal speed
    ///
    /// Returns `false` (and does nothing) while already locked playing,
    /// so the caller knows to suppress the immediate acknowledgement.
    pub fn pause_disengage(&mut self, duration_ms: f64) -> bool {
        if self.state == TransportState::LockedPlaying {
            return false;
        }
        self.start_ramp(TransportState::ResumingSpinup, duration_ms, None);
        true
    }

    /// Begin the linear brake with stop semantics
    pub fn stop(&mut self, duration_ms: f64) {
        self.start_ramp(
            TransportState::StoppingBrake,
            duration_ms,
            Some(PendingAction::StopReset),
        );
    }

    /// Enter velocity-driven scratch control, discarding any ramp
    pub fn scratch_drag(&mut self, velocity: f64, position: f64) {
        self.state = TransportState::ScratchDrag;
        self.scratch_velocity = velocity;
        self.last_scratch_pos = position;
        self.envelope = None;
        self.pending = None;
    }

    /// Begin the seek-end recovery ramp after a scratch release
    pub fn scratch_end(&mut self, duration_ms: f64) {
        self.start_ramp(TransportState::SeekEnd, duration_ms, None);
    }

    /// Start a ramp toward `next`, overriding whatever was in progress
    ///
    /// The newest command always wins: the old envelope and pending
    /// action are discarded without firing.
    fn start_ramp(
        &mut self,
        next: TransportState,
        duration_ms: f64,
        action: Option<PendingAction>,
    ) {
        self.state = next;
        // At least one sample of ramp, so a zero-duration request still
        // resolves on the next processed sample.
        let total = ((duration_ms / 1000.0) * self.sample_rate as f64)
            .floor()
            .max(1.0) as u64;
        self.envelope = Some(RateEnvelope {
            elapsed_samples: 0,
            total_samples: total,
        });
        self.pending = action;
    }

    /// Rate law for the active ramp at progress fraction `t` in [0, 1]
    fn ramp_rate(&self, t: f64) -> f64 {
        match self.state {
            TransportState::PausingSlowdown => ((1.0 - t) * (1.0 - t)).max(0.0),
            TransportState::StoppingBrake => (1.0 - t).max(0.0),
            TransportState::ResumingSpinup | TransportState::SeekEnd => (t * t).min(1.0),
            _ => 1.0,
        }
    }

    /// Advance the transport by one sample and update the rate
    ///
    /// The rate for sample `i` of a ramp uses `t = i / total`, sampled
    /// before the elapsed counter is incremented, so the very first
    /// sample of a ramp uses `t = 0`. When the envelope is consumed the
    /// finalizing transition happens in the same tick and the outcome
    /// is returned so the caller can fire the pending action.
    pub fn tick(&mut self) -> Option<RampOutcome> {
        if let Some(env) = self.envelope.as_mut() {
            let t = env.elapsed_samples as f64 / env.total_samples as f64;
            env.elapsed_samples += 1;
            let complete = env.elapsed_samples >= env.total_samples;
            self.rate = self.ramp_rate(t);

            if complete {
                let outcome = match self.state {
                    TransportState::PausingSlowdown | TransportState::StoppingBrake => {
                        self.rate = 0.0;
                        self.state = TransportState::PausedHeld;
                        Some(RampOutcome::Held(self.pending))
                    }
                    TransportState::ResumingSpinup | TransportState::SeekEnd => {
                        self.rate = 1.0;
                        self.state = TransportState::LockedPlaying;
                        Some(RampOutcome::Rolling)
                    }
                    _ => None,
                };
                self.envelope = None;
                self.pending = None;
                return outcome;
            }
            return None;
        }

        match self.state {
            TransportState::ScratchDrag => self.rate = self.scratch_velocity,
            TransportState::LockedPlaying => self.rate = 1.0,
            TransportState::PausedHeld => self.rate = 0.0,
            // Transition states without an envelope keep their last rate.
            _ => {}
        }
        None
    }
}
