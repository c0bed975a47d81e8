//! Master bus: volume and mute with click-free smoothing.

/// Time constant for master level changes, in seconds.
pub const MASTER_TIME_CONSTANT: f64 = 0.08;

/// A value that approaches its target exponentially, one sample at a time.
#[derive(Debug, Clone)]
pub struct Smoothed {
    value: f64,
    target: f64,
    coeff: f64,
}

impl Smoothed {
    pub fn new(value: f64, time_constant: f64, sample_rate: f64) -> Self {
        Smoothed {
            value,
            target: value,
            coeff: (-1.0 / (time_constant * sample_rate)).exp(),
        }
    }

    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    #[inline]
    pub fn next(&mut self) -> f64 {
        self.value = self.target + (self.value - self.target) * self.coeff;
        self.value
    }
}

/// Final gain stage shared by every source in a session.
#[derive(Debug, Clone)]
pub struct MasterBus {
    volume: f64,
    muted: bool,
    gain: Smoothed,
}

impl MasterBus {
    pub fn new(volume: f64, muted: bool, sample_rate: f64) -> Self {
        let volume = volume.clamp(0.0, 1.0);
        let level = if muted { 0.0 } else { volume };
        MasterBus {
            volume,
            muted,
            gain: Smoothed::new(level, MASTER_TIME_CONSTANT, sample_rate),
        }
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.volume = volume.clamp(0.0, 1.0);
        self.retarget();
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.retarget();
    }

    fn retarget(&mut self) {
        let level = if self.muted { 0.0 } else { self.volume };
        self.gain.set_target(level);
    }

    /// Current smoothed gain without advancing.
    pub fn level(&self) -> f64 {
        self.gain.value()
    }

    /// Apply the gain to one summed sample.
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        input * self.gain.next()
    }
}
