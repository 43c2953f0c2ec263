//! Turntable transport engine for Backspin
//!
//! This crate provides the real-time platter simulation applied to a
//! streaming stereo signal:
//! - Transport: platter state machine and rate envelopes
//! - DelayRing: delayed circular buffer with fractional cubic reads
//! - Turntable: the per-deck processing unit run inside the render callback
//! - Engine: command/event protocol between control plane and render thread

mod engine;
mod ring;
mod transport;
mod turntable;

pub use engine::{
    ControlError, TransportCommand, TransportEvent, TurntableHandle, DEFAULT_RAMP_MS,
};
pub use ring::DelayRing;
pub use transport::{PendingAction, RampOutcome, RateEnvelope, Transport, TransportState};
pub use turntable::{Turntable, DEFAULT_READ_DELAY_SECONDS};
