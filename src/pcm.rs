//! PCM interchange profile
//!
//! Everything between the transcoder and the sink travels as raw PCM in a
//! single fixed profile: 48 kHz, 2 channels, 16-bit little-endian,
//! interleaved. This module owns the byte/time arithmetic for that profile.

use std::time::Duration;

/// Description of the raw PCM stream exchanged between source and sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmProfile {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Bytes per sample per channel (2 for s16le)
    pub bytes_per_sample: u16,
}

impl PcmProfile {
    /// The fixed interchange profile: 48 kHz stereo s16le
    pub const S16LE_48K_STEREO: PcmProfile = PcmProfile {
        sample_rate: 48_000,
        channels: 2,
        bytes_per_sample: 2,
    };

    /// Bytes of PCM per second of audio
    pub fn byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.channels as u64 * self.bytes_per_sample as u64
    }

    /// Audio position corresponding to a byte count
    pub fn duration_for_bytes(&self, bytes: u64) -> Duration {
        Duration::from_millis(self.position_ms(bytes))
    }

    /// Audio position in milliseconds corresponding to a byte count
    pub fn position_ms(&self, bytes: u64) -> u64 {
        bytes * 1000 / self.byte_rate()
    }

    /// Byte count covering a span of audio
    pub fn bytes_for(&self, span: Duration) -> u64 {
        self.byte_rate() * span.as_millis() as u64 / 1000
    }
}

impl Default for PcmProfile {
    fn default() -> Self {
        Self::S16LE_48K_STEREO
    }
}

/// Format a duration as `mm:ss` for status lines
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!("{:02}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_rate_of_fixed_profile() {
        // 48000 Hz * 2 ch * 2 bytes
        assert_eq!(PcmProfile::S16LE_48K_STEREO.byte_rate(), 192_000);
    }

    #[test]
    fn position_round_trips() {
        let p = PcmProfile::default();
        assert_eq!(p.position_ms(192_000), 1000);
        assert_eq!(p.bytes_for(Duration::from_secs(5)), 960_000);
        assert_eq!(p.duration_for_bytes(96_000), Duration::from_millis(500));
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "00:00");
        assert_eq!(format_elapsed(Duration::from_secs(75)), "01:15");
        assert_eq!(format_elapsed(Duration::from_secs(600)), "10:00");
    }
}
