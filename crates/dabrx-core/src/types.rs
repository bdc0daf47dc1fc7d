//! Common constants and sample-format helpers for the streaming core.
//!
//! The RF front end delivers interleaved I/Q `f32` pairs at 4096 kHz; the
//! half-band decimator halves that to the 2048 kHz rate the DAB demodulator
//! expects. Both ring buffers are byte-oriented, so the helpers here convert
//! between sample counts and byte counts.

/// Sample rate delivered by the RF front end (complex samples per second).
pub const RF_SAMPLE_RATE: u32 = 4_096_000;

/// Sample rate after 2:1 decimation (complex samples per second).
pub const DECIMATED_SAMPLE_RATE: u32 = RF_SAMPLE_RATE / 2;

/// Bytes per complex sample in the RF ring buffer: two `f32` (I and Q).
pub const IQ_SAMPLE_BYTES: usize = 2 * std::mem::size_of::<f32>();

/// Pre-allocated filter scratch size in floats (covers the largest transfer
/// the supported front ends deliver in one callback).
pub const FILTER_SCRATCH_FLOATS: usize = 65_536;

/// Byte size of `n` complex I/Q samples.
#[inline]
pub const fn iq_bytes(samples: usize) -> usize {
    samples * IQ_SAMPLE_BYTES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iq_byte_accounting() {
        assert_eq!(IQ_SAMPLE_BYTES, 8);
        assert_eq!(iq_bytes(2048), 16_384);
    }
}
