use crate::config::{Config, ReproFunc};
use crate::state::PopulationState;
use anyhow::Result;

/// Reproductively active females of every host.
pub fn productive_females(cfg: &Config, state: &PopulationState) -> Result<Vec<u32>> {
    let repro = cfg.worms.reproduction()?;
    let worms = &state.worms;
    let producers = worms
        .total
        .iter()
        .zip(&worms.female)
        .map(|(&total, &female)| match repro {
            // Polygamous mating: females need at least one male when sex ratio is enforced.
            ReproFunc::EpgFertility if cfg.worms.sex_ratio && total == female => 0,
            ReproFunc::EpgFertility => female,
            // Monogamous mating: only pairs produce eggs.
            ReproFunc::EpgMonog => female.min(total - female),
        })
        .collect();
    Ok(producers)
}

/// Rate at which eggs enter the free-living reservoir.
pub fn egg_production_rate(cfg: &Config, state: &PopulationState) -> Result<f64> {
    let worms = &cfg.worms;
    let weighted_output: f64 = productive_females(cfg, state)?
        .into_iter()
        .enumerate()
        .map(|(host, producers)| {
            let egg_output = worms.lambda_egg
                * producers as f64
                * (-(state.worms.total[host] as f64) * worms.gamma).exp()
                * cfg.vaccine.v2[state.status(host)];
            egg_output * cfg.population.rho[state.contact_age_group[host]]
        })
        .sum();
    Ok(2.0 * worms.psi * weighted_output / cfg.n_hosts() as f64)
}

/// Advance the reservoir by `dt` with the exact solution of linear decay with
/// constant production. Returns the production rate used.
pub fn do_free_live(cfg: &Config, state: &mut PopulationState, dt: f64) -> Result<f64> {
    let production = egg_production_rate(cfg, state)?;
    let decay = cfg.worms.decay_rate;
    let exp_factor = (-decay * dt).exp();
    state.free_living = state.free_living * exp_factor + production * (1.0 - exp_factor) / decay;
    Ok(production)
}
