//! Delayed circular buffer with fractional-position cubic reads
//!
//! Stores the incoming stereo stream so the read cursor can run slower,
//! faster, backward, or frozen relative to the write cursor. The fixed
//! delay window is the maximum slack between the two before an underrun
//! or overrun would occur.

/// 4-point cubic (Catmull-Rom style) interpolation
///
/// `y0..y3` are the samples at offsets -2, -1, 0, +1 relative to the
/// floor of the read index, `frac` the fractional part.
#[inline]
fn cubic_interpolate(y0: f32, y1: f32, y2: f32, y3: f32, frac: f32) -> f32 {
    let a0 = y3 - y2 - y0 + y1;
    let a1 = y0 - y1 - a0;
    let a2 = y2 - y0;
    let a3 = y1;
    ((a0 * frac + a1) * frac + a2) * frac + a3
}

/// Wrap a fractional ring position into `[0, len)`
///
/// Repeated add/subtract rather than `%`, which would hand back a
/// negative remainder for a cursor that ran backward past zero.
#[inline]
fn wrap_position(mut pos: f64, len: f64) -> f64 {
    while pos < 0.0 {
        pos += len;
    }
    while pos >= len {
        pos -= len;
    }
    pos
}

/// Delayed stereo ring buffer
///
/// Length is twice the delay window, and the read index used for output
/// always sits `delay_samples` ahead of the nominal read cursor, so the
/// reader never overtakes unwritten slots.
pub struct DelayRing {
    left: Vec<f32>,
    right: Vec<f32>,
    /// Write cursor, committed once per block
    write_pos: usize,
    /// Nominal read cursor, advanced by the signed playback rate
    effective_read_pos: f64,
    delay_samples: usize,
}

impl DelayRing {
    /// Create a ring sized for the given delay window
    pub fn new(delay_samples: usize) -> Self {
        let delay_samples = delay_samples.max(1);
        let len = delay_samples * 2;
        Self {
            left: vec![0.0; len],
            right: vec![0.0; len],
            write_pos: 0,
            effective_read_pos: 0.0,
            delay_samples,
        }
    }

    /// Delay window in samples
    pub fn delay_samples(&self) -> usize {
        self.delay_samples
    }

    /// Total ring length in samples
    pub fn buffer_len(&self) -> usize {
        self.left.len()
    }

    /// Current write cursor
    pub fn write_position(&self) -> usize {
        self.write_pos
    }

    /// Current nominal read cursor
    pub fn read_position(&self) -> f64 {
        self.effective_read_pos
    }

    /// Store one input frame at `offset` samples past the write cursor
    #[inline]
    pub fn write_frame(&mut self, offset: usize, left: f32, right: f32) {
        let idx = (self.write_pos + offset) % self.left.len();
        self.left[idx] = left;
        self.right[idx] = right;
    }

    /// Commit the write cursor after a processed block
    pub fn advance_write(&mut self, frames: usize) {
        self.write_pos = (self.write_pos + frames) % self.left.len();
    }

    /// Read the interpolated frame at the delayed position
    #[inline]
    pub fn read_delayed(&self) -> (f32, f32) {
        let len = self.left.len() as f64;
        let index = wrap_position(self.effective_read_pos + self.delay_samples as f64, len);
        (
            Self::interpolated(&self.left, index),
            Self::interpolated(&self.right, index),
        )
    }

    /// Advance the read cursor by the signed playback rate
    #[inline]
    pub fn advance_read(&mut self, rate: f64) {
        self.effective_read_pos =
            wrap_position(self.effective_read_pos + rate, self.left.len() as f64);
    }

    /// Cubic read at a fractional ring index in `[0, len)`
    fn interpolated(buffer: &[f32], index: f64) -> f32 {
        let len = buffer.len();
        let i = index as usize;
        let frac = (index - i as f64) as f32;

        let prev2 = (i + len - 2) % len;
        let prev = (i + len - 1) % len;
        let next = (i + 1) % len;

        cubic_interpolate(buffer[prev2], buffer[prev], buffer[i], buffer[next], frac)
    }
}
