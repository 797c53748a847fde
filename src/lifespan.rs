use crate::config::Config;
use anyhow::{Context, Result};
use rand::Rng;
use rand_distr::{Distribution, Exp};

/// Source of remaining-lifetime draws for newborn hosts.
pub trait LifespanSampler {
    fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Result<Vec<f64>>;
}

/// Lifetimes under a piecewise-constant age-specific mortality hazard.
///
/// The hazard in `[breaks[i], breaks[i + 1])` is `rates[i]`; the last band
/// extends to `max_age`, where every host dies.
#[derive(Debug, Clone)]
pub struct PiecewiseHazard {
    breaks: Vec<f64>,
    rates: Vec<f64>,
    max_age: f64,
}

impl PiecewiseHazard {
    pub fn new(breaks: Vec<f64>, rates: Vec<f64>, max_age: f64) -> Self {
        Self {
            breaks,
            rates,
            max_age,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let pop = &cfg.population;
        Self::new(
            pop.host_age_breaks.clone(),
            pop.host_death_rates.clone(),
            pop.max_age,
        )
    }

    fn sample_one<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64> {
        for (band, &rate) in self.rates.iter().enumerate() {
            let start = self.breaks[band];
            let end = self
                .breaks
                .get(band + 1)
                .copied()
                .unwrap_or(self.max_age)
                .min(self.max_age);
            if start >= self.max_age {
                break;
            }
            if rate <= 0.0 {
                continue;
            }
            let wait = Exp::new(rate)
                .context("failed to build waiting time distribution")?
                .sample(rng);
            if start + wait < end {
                return Ok(start + wait);
            }
        }
        Ok(self.max_age)
    }
}

impl LifespanSampler for PiecewiseHazard {
    fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Result<Vec<f64>> {
        (0..n).map(|_| self.sample_one(rng)).collect()
    }
}
