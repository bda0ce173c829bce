//! Per-call sampling decision.

use std::sync::Arc;

use arc_swap::ArcSwap;
use rand::Rng;

use crate::config::InstrumentConfig;

/// Sampling settings in effect.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingSettings {
    pub frequency: f64,
    pub ignored_modules: Vec<String>,
}

impl From<&InstrumentConfig> for SamplingSettings {
    fn from(config: &InstrumentConfig) -> Self {
        Self {
            frequency: config.sample_frequency.clamp(0.0, 1.0),
            ignored_modules: config.ignored_modules.clone(),
        }
    }
}

/// Live-updatable sampling policy shared by the interceptors.
pub struct SamplingPolicy {
    settings: ArcSwap<SamplingSettings>,
}

impl SamplingPolicy {
    pub fn new(config: &InstrumentConfig) -> Self {
        Self {
            settings: ArcSwap::from_pointee(SamplingSettings::from(config)),
        }
    }

    pub fn settings(&self) -> Arc<SamplingSettings> {
        self.settings.load_full()
    }

    pub fn reconfigure(&self, config: &InstrumentConfig) {
        let next = SamplingSettings::from(config);
        if *self.settings.load_full() != next {
            tracing::debug!(frequency = next.frequency, "Sampling policy updated");
            self.settings.store(Arc::new(next));
        }
    }

    /// One independent uniform draw against the current frequency.
    pub fn should_sample(&self) -> bool {
        let frequency = self.settings.load().frequency;
        rand::thread_rng().gen::<f64>() < frequency
    }
}
