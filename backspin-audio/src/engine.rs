//! Control protocol between the control plane and the render thread
//!
//! Commands and acknowledgements travel over bounded channels: the
//! control side holds a [`TurntableHandle`], the engine drains its
//! command queue at the start of each processed block and posts events
//! back without ever blocking the render thread.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use thiserror::Error;

/// Ramp duration applied when the control plane does not supply one
pub const DEFAULT_RAMP_MS: f64 = 300.0;

/// Commands sent to the turntable engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportCommand {
    /// Start the eased slowdown into a hold
    PauseEngage { duration_ms: f64 },
    /// Start the eased spin-up back to nominal speed
    PauseDisengage { duration_ms: f64 },
    /// Start the linear brake with stop semantics
    Stop { duration_ms: f64 },
    /// Drive the platter directly from scratch velocity
    ScratchDrag { velocity: f64, position: f64 },
    /// Release the scratch and recover nominal speed
    ScratchEnd { duration_ms: f64 },
    /// Request a `Paused` acknowledgement without a ramp
    DoPause { compensation_seconds: f64 },
    /// Request a `PausedWithCompensation` acknowledgement without a ramp
    DoPauseWithCompensation { compensation_seconds: f64 },
    /// Request a `Playing` acknowledgement without a ramp
    DoPlay,
    /// Request a `StoppedReset` acknowledgement without a ramp
    DoStopReset { compensation_seconds: f64 },
}

/// Events sent from the turntable engine
///
/// Fire-and-forget, no reply correlation. `compensation_seconds`
/// reports the fixed buffering delay so the control plane can correct
/// an externally tracked playback clock after a pause or stop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportEvent {
    /// Latest instantaneous playback rate, posted once per block
    RateUpdate { rate: f64 },
    /// Slowdown ramp completed into a hold
    Paused { compensation_seconds: f64 },
    /// Direct acknowledgement variant of `Paused`
    PausedWithCompensation { compensation_seconds: f64 },
    /// Platter running at nominal speed
    Playing,
    /// Brake ramp completed with stop semantics
    StoppedReset { compensation_seconds: f64 },
    /// Scratch-end recovery ramp started, echoing its duration
    SeekEnd { duration_ms: f64 },
}

/// Errors when pushing commands toward the engine
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("command queue is full")]
    QueueFull,
    #[error("engine has shut down")]
    Disconnected,
}

/// Control-plane handle to one turntable engine
///
/// Cheap to move to whichever thread issues commands; the engine itself
/// stays owned by the render thread.
pub struct TurntableHandle {
    command_tx: Sender<TransportCommand>,
    event_rx: Receiver<TransportEvent>,
}

impl TurntableHandle {
    pub(crate) fn new(
        command_tx: Sender<TransportCommand>,
        event_rx: Receiver<TransportEvent>,
    ) -> Self {
        Self {
            command_tx,
            event_rx,
        }
    }

    /// Enqueue a command for the next processed block
    pub fn send(&self, command: TransportCommand) -> Result<(), ControlError> {
        self.command_tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => ControlError::QueueFull,
            TrySendError::Disconnected(_) => ControlError::Disconnected,
        })
    }

    /// Pop the next pending event, if any
    pub fn try_event(&self) -> Option<TransportEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Event queue receiver, for blocking drains or `select!`
    pub fn events(&self) -> &Receiver<TransportEvent> {
        &self.event_rx
    }
}
