//! Volume handling. Volumes are cubic in nature; callers should convert to/from dB or linear
//! scale rather than doing arithmetic on the raw integer directly (except for simple
//! multiplication, which is provided).

use crate::sample;

/// Opaque software volume. Range from [`Volume::MUTED`] to [`Volume::NORMAL`]; values above
/// `NORMAL` are permitted and may clip.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Volume(pub u32);

impl Volume {
    /// Muted.
    pub const MUTED: Volume = Volume(0);
    /// Normal, unscaled, 100% volume.
    pub const NORMAL: Volume = Volume(65536);
    /// Wire sentinel meaning "invalid"/"unset".
    pub const INVALID: Volume = Volume(u32::MAX);
    /// Upper sanity bound (roughly +11 dB of headroom above `NORMAL`).
    pub const MAX: Volume = Volume(u32::MAX / 2);

    pub fn is_valid(self) -> bool {
        self != Volume::INVALID
    }

    pub fn is_muted(self) -> bool {
        self == Volume::MUTED
    }

    pub fn is_norm(self) -> bool {
        self == Volume::NORMAL
    }

    /// Cubic-domain multiplication of two volumes (`NORMAL * NORMAL == NORMAL`).
    pub fn multiply(self, other: Volume) -> Volume {
        let product = (self.0 as u64) * (other.0 as u64) / Volume::NORMAL.0 as u64;
        Volume(product.min(u32::MAX as u64) as u32)
    }
}

impl Default for Volume {
    fn default() -> Self {
        Volume::NORMAL
    }
}

/// Volume expressed in decibels.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Default)]
pub struct VolumeDB(pub f64);

/// Volume expressed as a linear factor (`0.0` muted, `1.0` normal).
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd)]
pub struct VolumeLinear(pub f64);

impl Default for VolumeLinear {
    fn default() -> Self {
        VolumeLinear(1.0)
    }
}

impl From<Volume> for VolumeDB {
    fn from(v: Volume) -> Self {
        if v.0 == 0 {
            return VolumeDB(f64::NEG_INFINITY);
        }
        let linear = v.0 as f64 / Volume::NORMAL.0 as f64;
        VolumeDB(20.0 * linear.log10())
    }
}

impl From<VolumeDB> for Volume {
    fn from(db: VolumeDB) -> Self {
        if db.0.is_infinite() && db.0.is_sign_negative() {
            return Volume::MUTED;
        }
        let linear = 10f64.powf(db.0 / 20.0);
        Volume(((linear * Volume::NORMAL.0 as f64).round() as i64).clamp(0, u32::MAX as i64) as u32)
    }
}

impl From<Volume> for VolumeLinear {
    fn from(v: Volume) -> Self {
        VolumeLinear(v.0 as f64 / Volume::NORMAL.0 as f64)
    }
}

impl From<VolumeLinear> for Volume {
    fn from(l: VolumeLinear) -> Self {
        Volume(((l.0 * Volume::NORMAL.0 as f64).round() as i64).clamp(0, u32::MAX as i64) as u32)
    }
}

/// Per-channel volumes, one value per channel of a stream or device.
#[derive(Debug, Copy, Clone)]
pub struct ChannelVolumes {
    channels: u8,
    values: [Volume; sample::CHANNELS_MAX as usize],
}

impl Default for ChannelVolumes {
    fn default() -> Self {
        ChannelVolumes { channels: 0, values: [Volume::NORMAL; sample::CHANNELS_MAX as usize] }
    }
}

impl ChannelVolumes {
    pub fn init() -> Self {
        Self::default()
    }

    /// Sets every channel (up to `channels`) to `volume`.
    pub fn set(&mut self, channels: u8, volume: Volume) -> &mut Self {
        self.channels = channels.min(sample::CHANNELS_MAX);
        for v in self.values[..self.channels as usize].iter_mut() {
            *v = volume;
        }
        self
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn get(&self) -> &[Volume] {
        &self.values[..self.channels as usize]
    }

    pub fn is_valid(&self) -> bool {
        self.channels > 0 && self.get().iter().all(|v| v.is_valid())
    }

    /// The volume of the loudest channel.
    pub fn max(&self) -> Volume {
        self.get().iter().copied().max().unwrap_or(Volume::MUTED)
    }

    /// The average volume across all channels.
    pub fn avg(&self) -> Volume {
        if self.channels == 0 {
            return Volume::MUTED;
        }
        let sum: u64 = self.get().iter().map(|v| v.0 as u64).sum();
        Volume((sum / self.channels as u64) as u32)
    }

    /// Scales every channel by `factor` (cubic-domain multiply).
    pub fn sw_multiply(&mut self, factor: Volume) -> &mut Self {
        for v in self.values[..self.channels as usize].iter_mut() {
            *v = v.multiply(factor);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_times_normal_is_normal() {
        assert_eq!(Volume::NORMAL.multiply(Volume::NORMAL), Volume::NORMAL);
    }

    #[test]
    fn muted_db_round_trips() {
        let db: VolumeDB = Volume::MUTED.into();
        assert!(db.0.is_infinite());
        let v: Volume = db.into();
        assert_eq!(v, Volume::MUTED);
    }

    #[test]
    fn channel_volumes_avg_and_max() {
        let mut cv = ChannelVolumes::init();
        cv.set(2, Volume::NORMAL);
        assert_eq!(cv.max(), Volume::NORMAL);
        assert_eq!(cv.avg(), Volume::NORMAL);
    }
}
