use std::sync::Arc;
use std::sync::atomic::Ordering;

use biquad::{Biquad as _, Coefficients, DirectForm1, ToHertz, Type};

use crate::audio::config;
use crate::audio::errors::AudioEffectsError;
use crate::audio::playback::state::AtomicF32;
use crate::audio::types::{EqBand, EqParams};

/// Parameters shared between the control thread and the render path.
#[derive(Debug)]
pub(crate) struct ChainParams {
    bass_gain_db: AtomicF32,
    mid_gain_db: AtomicF32,
    treble_gain_db: AtomicF32,
    volume: AtomicF32,
    master_gain: AtomicF32,
}

impl ChainParams {
    fn band(&self, band: EqBand) -> &AtomicF32 {
        match band {
            EqBand::Bass => &self.bass_gain_db,
            EqBand::Mid => &self.mid_gain_db,
            EqBand::Treble => &self.treble_gain_db,
        }
    }

    fn eq_params(&self) -> EqParams {
        EqParams {
            bass_gain_db: self.bass_gain_db.load(Ordering::Relaxed),
            mid_gain_db: self.mid_gain_db.load(Ordering::Relaxed),
            treble_gain_db: self.treble_gain_db.load(Ordering::Relaxed),
        }
    }

    fn output_gain(&self) -> f32 {
        self.volume.load(Ordering::Relaxed) * self.master_gain.load(Ordering::Relaxed)
    }
}

impl Default for ChainParams {
    fn default() -> Self {
        ChainParams {
            bass_gain_db: AtomicF32::new(0.0),
            mid_gain_db: AtomicF32::new(0.0),
            treble_gain_db: AtomicF32::new(0.0),
            volume: AtomicF32::new(config::INITIAL_VOLUME),
            master_gain: AtomicF32::new(config::INITIAL_MASTER_GAIN),
        }
    }
}

/// Per-deck signal path: low shelf -> peaking -> high shelf -> gain.
///
/// This is the control side. Every setter takes effect on the next buffer
/// rendered by any [`ChainProcessor`] built from this chain, including
/// one that is mid-playback.
#[derive(Debug)]
pub struct EffectChain {
    params: Arc<ChainParams>,
    muted: bool,
    last_volume: f32,
}

impl Default for EffectChain {
    fn default() -> Self {
        EffectChain {
            params: Arc::new(ChainParams::default()),
            muted: false,
            last_volume: config::INITIAL_VOLUME,
        }
    }
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets one band's gain. Non-finite values are ignored.
    pub fn set_eq(&mut self, band: EqBand, gain_db: f32) {
        if !gain_db.is_finite() {
            log::warn!("EQ {} ignored, gain {} is not finite", band.as_str(), gain_db);
            return;
        }
        self.params.band(band).store(gain_db, Ordering::Relaxed);
    }

    pub fn eq_params(&self) -> EqParams {
        self.params.eq_params()
    }

    /// Sets the user volume. While muted only the restore value changes.
    pub fn set_volume(&mut self, volume: f32) {
        if !volume.is_finite() {
            log::warn!("Volume ignored, {} is not finite", volume);
            return;
        }
        self.last_volume = volume;
        if !self.muted {
            self.params.volume.store(volume, Ordering::Relaxed);
        }
    }

    /// Effective volume, 0 while muted.
    pub fn volume(&self) -> f32 {
        self.params.volume.load(Ordering::Relaxed)
    }

    pub fn last_volume(&self) -> f32 {
        self.last_volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn mute(&mut self) {
        if self.muted {
            return;
        }
        self.last_volume = self.volume();
        self.params.volume.store(0.0, Ordering::Relaxed);
        self.muted = true;
    }

    pub fn unmute(&mut self) {
        if !self.muted {
            return;
        }
        self.params.volume.store(self.last_volume, Ordering::Relaxed);
        self.muted = false;
    }

    /// Gain multiplier owned by the crossfader.
    pub fn set_master_gain(&mut self, gain: f32) {
        if !gain.is_finite() {
            return;
        }
        self.params.master_gain.store(gain, Ordering::Relaxed);
    }

    pub fn master_gain(&self) -> f32 {
        self.params.master_gain.load(Ordering::Relaxed)
    }

    /// `volume × masterGain`, the scalar applied after the EQ.
    pub fn output_gain(&self) -> f32 {
        self.params.output_gain()
    }

    /// Restores flat EQ, unity volume and unmutes. Master gain is left to the crossfader.
    pub fn reset(&mut self) {
        for band in EqBand::ALL {
            self.set_eq(band, 0.0);
        }
        self.muted = false;
        self.set_volume(config::INITIAL_VOLUME);
    }

    /// Builds the DSP half for one render run.
    pub fn processor(&self, sample_rate: u32, channels: u16) -> ChainProcessor {
        ChainProcessor::new(self.params.clone(), sample_rate as f32, channels as usize)
    }
}

/// Filter state for one contiguous render. Lives on the audio thread.
pub struct ChainProcessor {
    params: Arc<ChainParams>,
    sample_rate: f32,
    low_shelf: Vec<DirectForm1<f32>>,
    mid_peak: Vec<DirectForm1<f32>>,
    high_shelf: Vec<DirectForm1<f32>>,
    last_params: EqParams,
    gain: f32,
}

impl ChainProcessor {
    fn new(params: Arc<ChainParams>, sample_rate: f32, channels: usize) -> Self {
        let current = params.eq_params();
        let (low, mid, high) = band_coefficients(sample_rate, &current);
        let channels = channels.max(1);
        let gain = params.output_gain();
        ChainProcessor {
            params,
            sample_rate,
            low_shelf: vec![DirectForm1::<f32>::new(low); channels],
            mid_peak: vec![DirectForm1::<f32>::new(mid); channels],
            high_shelf: vec![DirectForm1::<f32>::new(high); channels],
            last_params: current,
            gain,
        }
    }

    /// Picks up parameter changes. Call once per output buffer.
    pub fn refresh(&mut self) {
        self.gain = self.params.output_gain();
        let current = self.params.eq_params();
        if current.approx_eq(&self.last_params, config::EQ_RECALC_THRESHOLD_DB) {
            return;
        }
        let (low, mid, high) = band_coefficients(self.sample_rate, &current);
        for filter in &mut self.low_shelf {
            filter.update_coefficients(low);
        }
        for filter in &mut self.mid_peak {
            filter.update_coefficients(mid);
        }
        for filter in &mut self.high_shelf {
            filter.update_coefficients(high);
        }
        self.last_params = current;
    }

    /// Runs one sample of `channel` through the chain.
    #[inline]
    pub fn process(&mut self, channel: usize, sample: f32) -> f32 {
        let channel = channel % self.low_shelf.len();
        let low_processed = self.low_shelf[channel].run(sample);
        let mid_processed = self.mid_peak[channel].run(low_processed);
        let high_processed = self.high_shelf[channel].run(mid_processed);
        let out = high_processed * self.gain;
        if out.is_finite() {
            return out;
        }
        // A NaN in the filter history would otherwise silence the channel for good.
        self.low_shelf[channel].reset_state();
        self.mid_peak[channel].reset_state();
        self.high_shelf[channel].reset_state();
        0.0
    }
}

const PASSTHROUGH: Coefficients<f32> = Coefficients {
    a1: 0.0,
    a2: 0.0,
    b0: 1.0,
    b1: 0.0,
    b2: 0.0,
};

fn band_coefficients(
    sample_rate: f32,
    params: &EqParams,
) -> (Coefficients<f32>, Coefficients<f32>, Coefficients<f32>) {
    // Runs inside the render callback, so only trace logging here.
    let or_passthrough = |result: Result<Coefficients<f32>, AudioEffectsError>| match result {
        Ok(coeffs) if coefficients_finite(&coeffs) => coeffs,
        Ok(_) => {
            log::trace!("Non-finite EQ coefficients. Falling back to a flat filter.");
            PASSTHROUGH
        }
        Err(e) => {
            log::trace!("{}. Falling back to a flat filter.", e);
            PASSTHROUGH
        }
    };
    (
        or_passthrough(calculate_low_shelf(sample_rate, params.bass_gain_db)),
        or_passthrough(calculate_mid_peak(sample_rate, params.mid_gain_db)),
        or_passthrough(calculate_high_shelf(sample_rate, params.treble_gain_db)),
    )
}

fn coefficients_finite(c: &Coefficients<f32>) -> bool {
    [c.a1, c.a2, c.b0, c.b1, c.b2].iter().all(|v| v.is_finite())
}

fn safe_corner(sample_rate: f32, corner_hz: f32) -> f32 {
    corner_hz.min(sample_rate * config::MAX_CORNER_FRACTION_OF_RATE)
}

// --- Filter Calculation Helpers ---

pub(crate) fn calculate_low_shelf(
    sample_rate: f32,
    gain_db: f32,
) -> Result<Coefficients<f32>, AudioEffectsError> {
    Coefficients::<f32>::from_params(
        Type::LowShelf(gain_db),
        sample_rate.hz(),
        safe_corner(sample_rate, config::BASS_SHELF_HZ).hz(),
        config::SHELF_Q_FACTOR,
    )
    .map_err(|e| AudioEffectsError::CoefficientCalculationError {
        filter_type: format!("LowShelf: {:?}", e),
    })
}

pub(crate) fn calculate_mid_peak(
    sample_rate: f32,
    gain_db: f32,
) -> Result<Coefficients<f32>, AudioEffectsError> {
    Coefficients::<f32>::from_params(
        Type::PeakingEQ(gain_db),
        sample_rate.hz(),
        safe_corner(sample_rate, config::MID_PEAK_HZ).hz(),
        config::MID_PEAK_Q_FACTOR,
    )
    .map_err(|e| AudioEffectsError::CoefficientCalculationError {
        filter_type: format!("MidPeak: {:?}", e),
    })
}

pub(crate) fn calculate_high_shelf(
    sample_rate: f32,
    gain_db: f32,
) -> Result<Coefficients<f32>, AudioEffectsError> {
    Coefficients::<f32>::from_params(
        Type::HighShelf(gain_db),
        sample_rate.hz(),
        safe_corner(sample_rate, config::TREBLE_SHELF_HZ).hz(),
        config::SHELF_Q_FACTOR,
    )
    .map_err(|e| AudioEffectsError::CoefficientCalculationError {
        filter_type: format!("HighShelf: {:?}", e),
    })
}
