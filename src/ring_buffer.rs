//! Component A: RollingWindow.
//!
//! Assembles incoming chunks into an overlap-capable analysis window. The window advances
//! by exactly one chunk per frame (hop = chunk); it is mutated only by `push` and shared
//! read-only with the spectral core.

/// A fixed-length rolling window of mono samples, updated one chunk at a time.
///
/// Backed by a flat `Vec<f32>` that is shifted left by `chunk_size` samples on every push —
/// simple and allocation-free in steady state, which matters more here than shave-off-a-memmove
/// cleverness given the window is only `window_chunks * chunk_size` samples (a few thousand).
pub struct RollingWindow {
    buffer: Vec<f32>,
    chunk_size: usize,
}

impl RollingWindow {
    /// Create a window of `window_len` samples (must be a multiple of `chunk_size`),
    /// initialized to silence.
    #[must_use]
    pub fn new(window_len: usize, chunk_size: usize) -> Self {
        Self {
            buffer: vec![0.0; window_len],
            chunk_size,
        }
    }

    /// Push exactly one chunk of mono samples into the window, discarding the oldest chunk.
    ///
    /// If `chunk` is shorter than `chunk_size` it is zero-padded; this is the capture path's
    /// short-read recovery, signaled back to the caller so it can mark the frame
    /// `degraded` and bump the counter — the window itself never fails.
    pub fn push(&mut self, chunk: &[f32]) -> bool {
        let degraded = chunk.len() < self.chunk_size;
        let len = self.buffer.len();
        let n = self.chunk_size.min(len);

        self.buffer.copy_within(n.., 0);
        let tail = &mut self.buffer[len - n..];
        for (slot, &sample) in tail.iter_mut().zip(chunk.iter().chain(std::iter::repeat(&0.0))) {
            *slot = sample;
        }
        degraded
    }

    /// The most recent `window_len` samples, oldest first.
    #[must_use]
    pub fn view(&self) -> &[f32] {
        &self.buffer
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Downmix an interleaved multichannel buffer to mono by arithmetic mean.
#[must_use]
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
