//! Prevalence surveys from simulated diagnostic readings.

use crate::config::Config;
use crate::diagnostics::EggCountSampler;
use crate::error::SimError;
use crate::state::PopulationState;
use anyhow::{Context, Result};
use rand::{Rng, seq::index};

/// Mean of `n_samples` independent readings per host.
fn mean_egg_counts<E, R>(
    state: &PopulationState,
    eggs: &E,
    n_samples: usize,
    rng: &mut R,
) -> Result<Vec<f64>>
where
    E: EggCountSampler,
    R: Rng + ?Sized,
{
    if n_samples < 1 {
        return Err(SimError::InvalidArgument("nSamples < 1".into()).into());
    }
    let mut sums = vec![0.0; state.n_hosts()];
    for _ in 0..n_samples {
        let counts = eggs
            .sample(&state.worms, rng)
            .context("failed to sample egg counts")?;
        for (sum, count) in sums.iter_mut().zip(counts) {
            *sum += count;
        }
    }
    Ok(sums.into_iter().map(|sum| sum / n_samples as f64).collect())
}

/// Fraction of a sample without replacement of `readings` above `threshold`.
///
/// The sample size is capped at the number of readings; an empty sample has
/// undefined prevalence and yields `NaN`.
fn sampled_prevalence<R: Rng + ?Sized>(
    readings: &[f64],
    sample_size: usize,
    threshold: f64,
    rng: &mut R,
) -> f64 {
    let size = sample_size.min(readings.len());
    if size == 0 {
        return f64::NAN;
    }
    let positives = index::sample(rng, readings.len(), size)
        .iter()
        .filter(|&idx| readings[idx] > threshold)
        .count();
    positives as f64 / size as f64
}

/// Survey of hosts aged within the configured survey age band.
///
/// # Errors
/// Returns [`SimError::InvalidArgument`] when `n_samples` is zero.
pub fn conduct_survey<E, R>(
    cfg: &Config,
    state: &mut PopulationState,
    t: f64,
    sample_size: usize,
    n_samples: usize,
    eggs: &E,
    rng: &mut R,
) -> Result<f64>
where
    E: EggCountSampler,
    R: Rng + ?Sized,
{
    let egg_counts = mean_egg_counts(state, eggs, n_samples, rng)?;

    let survey = &cfg.survey;
    let survey_eggs: Vec<f64> = egg_counts
        .into_iter()
        .enumerate()
        .filter(|&(host, _)| {
            let age = t - state.demography.birth_date[host];
            (survey.min_age..=survey.max_age).contains(&age)
        })
        .map(|(_, count)| count)
        .collect();

    let prevalence =
        sampled_prevalence(&survey_eggs, sample_size, survey.positivity_threshold, rng);
    state.counters.num_survey += 1;

    log::info!(
        "survey at t = {t}: prevalence {prevalence:.4} among {} eligible hosts",
        survey_eggs.len()
    );
    Ok(prevalence)
}

/// Survey of the whole population.
///
/// # Errors
/// Returns [`SimError::InvalidArgument`] when `n_samples` is zero.
pub fn conduct_survey_two<E, R>(
    cfg: &Config,
    state: &mut PopulationState,
    t: f64,
    sample_size: usize,
    n_samples: usize,
    eggs: &E,
    rng: &mut R,
) -> Result<f64>
where
    E: EggCountSampler,
    R: Rng + ?Sized,
{
    let egg_counts = mean_egg_counts(state, eggs, n_samples, rng)?;

    let prevalence = sampled_prevalence(
        &egg_counts,
        sample_size,
        cfg.survey.positivity_threshold,
        rng,
    );
    state.counters.num_survey_two += 1;

    log::info!("population survey at t = {t}: prevalence {prevalence:.4}");
    Ok(prevalence)
}
