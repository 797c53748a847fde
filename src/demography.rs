use crate::config::Config;
use crate::lifespan::LifespanSampler;
use crate::state::PopulationState;
use crate::utils::age_group_index;
use anyhow::{Context, Result};
use rand::Rng;
use rand_distr::{Bernoulli, Distribution, Gamma, Uniform};

/// Age given to a host reborn at time `t`, so newborns never have age zero.
const NEWBORN_AGE: f64 = 0.001;

/// Replace every host whose death date has passed by a newborn, then
/// recompute the age groups of the whole population.
///
/// Returns the number of hosts that died.
pub fn do_death<L, R>(
    cfg: &Config,
    state: &mut PopulationState,
    t: f64,
    lifespans: &L,
    rng: &mut R,
) -> Result<usize>
where
    L: LifespanSampler,
    R: Rng + ?Sized,
{
    let the_dead: Vec<usize> = (0..state.n_hosts())
        .filter(|&host| state.demography.death_date[host] < t)
        .collect();

    if !the_dead.is_empty() {
        let k = cfg.population.k;
        let si_dist = Gamma::new(k, 1.0 / k).context("failed to build susceptibility distribution")?;
        let unit_dist = Uniform::new(0.0, 1.0)?;
        let complier_dist = Bernoulli::new(1.0 - cfg.population.prop_never_compliers)
            .context("failed to build complier distribution")?;
        let new_lifespans = lifespans
            .sample(the_dead.len(), rng)
            .context("failed to sample lifespans")?;

        for (&host, lifespan) in the_dead.iter().zip(new_lifespans) {
            state.susceptibility[host] = si_dist.sample(rng);
            state.vaccinated[host] = false;
            state.demography.birth_date[host] = t - NEWBORN_AGE;
            state.demography.death_date[host] = t + lifespan;
            state.worms.total[host] = 0;
            state.worms.female[host] = 0;
            state.adherence_factor[host] = unit_dist.sample(rng);
            state.complier[host] = complier_dist.sample(rng);
        }
        log::debug!("{} hosts died and were replaced at t = {t}", the_dead.len());
    }

    update_age_groups(cfg, state, t);

    Ok(the_dead.len())
}

/// Recompute contact, treatment and vaccination age groups at time `t`.
pub fn update_age_groups(cfg: &Config, state: &mut PopulationState, t: f64) {
    let pop = &cfg.population;
    for host in 0..state.n_hosts() {
        let age = t - state.demography.birth_date[host];
        state.contact_age_group[host] = age_group_index(age, &pop.contact_age_breaks);
        state.treatment_age_group[host] = age_group_index(age, &pop.treatment_age_breaks);
        state.vacc_age_group[host] = age_group_index(age, &pop.vacc_age_breaks);
    }
}
