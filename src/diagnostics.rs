//! Simulated Kato-Katz egg counts.

use crate::config::Config;
use crate::state::Worms;
use anyhow::{Context, Result};
use rand::Rng;
use rand_distr::{Distribution, Gamma, Poisson};

/// Source of one simulated diagnostic reading per host.
pub trait EggCountSampler {
    fn sample<R: Rng + ?Sized>(&self, worms: &Worms, rng: &mut R) -> Result<Vec<f64>>;
}

/// Negative binomial egg counts with density-dependent fecundity.
#[derive(Debug, Clone)]
pub struct KatoKatz {
    pub lambda: f64,
    pub z: f64,
    pub k_epg: f64,
    /// Count unfertilized females (no male required).
    pub unfertilized: bool,
}

impl KatoKatz {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            lambda: cfg.worms.lambda_egg,
            z: cfg.worms.z,
            k_epg: cfg.worms.k_epg,
            unfertilized: cfg.worms.unfertilized,
        }
    }

    fn mean_count(&self, total: u32, female: u32) -> f64 {
        let producers = if self.unfertilized || total != female {
            female
        } else {
            0
        };
        let producers = producers as f64;
        self.lambda * producers * self.z.powf(producers)
    }
}

impl EggCountSampler for KatoKatz {
    fn sample<R: Rng + ?Sized>(&self, worms: &Worms, rng: &mut R) -> Result<Vec<f64>> {
        let mut counts = Vec::with_capacity(worms.total.len());
        for (&total, &female) in worms.total.iter().zip(&worms.female) {
            let mean = self.mean_count(total, female);
            if mean <= 0.0 {
                counts.push(0.0);
                continue;
            }
            // Gamma-Poisson mixture with shape k_epg and mean `mean`.
            let intensity = Gamma::new(self.k_epg, mean / self.k_epg)
                .context("failed to build egg count intensity distribution")?
                .sample(rng);
            let count = if intensity > 0.0 {
                Poisson::new(intensity)
                    .context("failed to build egg count distribution")?
                    .sample(rng)
            } else {
                0.0
            };
            counts.push(count);
        }
        Ok(counts)
    }
}
