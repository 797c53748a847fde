//! Stochastic worm-level events.
//!
//! Two samplers share one interface. [`EventSampler::Exact`] applies a single
//! event per draw against a freshly computed rate vector. [`EventSampler::Batched`]
//! resolves `multiplier` draws against the same cumulative rates, so rates are
//! held fixed for the whole batch. That is an approximation of the exact
//! process which is only accurate while rates change slowly over the batch.

use crate::config::Config;
use crate::error::SimError;
use crate::rates::RateProducer;
use crate::state::PopulationState;
use crate::utils::{cumsum, inverse_cdf};
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_distr::{Bernoulli, weighted::WeightedIndex};

/// Outcome of a single exact draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A worm established in `host`.
    Acquired { host: usize, female: bool },
    /// An acquisition draw for `host` failed the vaccine acquisition gate.
    Blocked { host: usize },
    /// `host` lost vaccine protection.
    Waned { host: usize },
    /// A worm of `host` died.
    Died { host: usize, female: bool },
}

/// Event counts of one batched draw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub acquired: usize,
    pub blocked: usize,
    pub waned: usize,
    pub died: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSampler {
    Exact,
    Batched { multiplier: usize },
}

impl EventSampler {
    pub fn from_config(cfg: &Config) -> Self {
        match cfg.run.batch_size {
            0 | 1 => Self::Exact,
            multiplier => Self::Batched { multiplier },
        }
    }

    /// Number of events resolved by one call to [`EventSampler::apply`].
    pub fn events_per_draw(&self) -> usize {
        match *self {
            Self::Exact => 1,
            Self::Batched { multiplier } => multiplier,
        }
    }

    /// Rate vector in the layout this sampler expects.
    pub fn rates<P: RateProducer>(
        &self,
        producer: &P,
        cfg: &Config,
        state: &PopulationState,
    ) -> Vec<f64> {
        match self {
            Self::Exact => producer.lumped_rates(cfg, state),
            Self::Batched { .. } => producer.per_host_rates(cfg, state),
        }
    }

    pub fn apply<R: Rng + ?Sized>(
        &self,
        rates: &[f64],
        cfg: &Config,
        state: &mut PopulationState,
        rng: &mut R,
    ) -> Result<()> {
        match *self {
            Self::Exact => {
                let event = do_event(rates, cfg, state, rng)?;
                log::trace!("{event:?}");
            }
            Self::Batched { multiplier } => {
                let cum_rates = cumsum(rates);
                let sum_rates = cum_rates.last().copied().unwrap_or(0.0);
                let outcome = do_event_batch(sum_rates, &cum_rates, cfg, state, rng, multiplier)?;
                log::trace!("{outcome:?}");
            }
        }
        Ok(())
    }
}

/// Apply exactly one event drawn from `rates`.
///
/// `rates` holds `N` acquisition rates, `N` waning rates and one lumped worm
/// death rate, in that order. A death event picks its host with weights
/// `total[i] * v1[status[i]]`, so worm-free hosts are never chosen.
pub fn do_event<R: Rng + ?Sized>(
    rates: &[f64],
    cfg: &Config,
    state: &mut PopulationState,
    rng: &mut R,
) -> Result<Event> {
    let n_hosts = state.n_hosts();
    if rates.len() != 2 * n_hosts + 1 {
        return Err(SimError::InvalidArgument(format!(
            "rate vector must have length {}, but has {}",
            2 * n_hosts + 1,
            rates.len()
        ))
        .into());
    }

    let cum_rates = cumsum(rates);
    let sum_rates = cum_rates.last().copied().unwrap_or(0.0);
    let event = inverse_cdf(&cum_rates, rng.random::<f64>() * sum_rates)
        .context("failed to select event")?;

    if event == rates.len() - 1 {
        let weights = (0..n_hosts)
            .map(|host| state.worms.total[host] as f64 * cfg.vaccine.v1[state.status(host)]);
        let host_dist = WeightedIndex::new(weights).map_err(|err| {
            SimError::ArithmeticDegenerate(format!("no host can lose a worm ({err})"))
        })?;
        let host = host_dist.sample(rng);

        let female_dist = Bernoulli::new(state.worms.female_fraction(host)?)?;
        let female = female_dist.sample(rng);
        state.worms.total[host] -= 1;
        if female {
            state.worms.female[host] -= 1;
        }
        Ok(Event::Died { host, female })
    } else if event < n_hosts {
        let host = event;
        let gate_dist = Bernoulli::new(cfg.vaccine.v3[state.status(host)])?;
        if gate_dist.sample(rng) {
            let female = Bernoulli::new(0.5)?.sample(rng);
            state.worms.total[host] += 1;
            if female {
                state.worms.female[host] += 1;
            }
            Ok(Event::Acquired { host, female })
        } else {
            Ok(Event::Blocked { host })
        }
    } else {
        let host = event - n_hosts;
        state.vaccinated[host] = false;
        Ok(Event::Waned { host })
    }
}

/// Apply `multiplier` events drawn from a fixed cumulative rate vector.
///
/// `cum_rates` has `3N` entries: acquisition, waning and per-host worm death.
/// Every draw is decided against the state at the start of the batch, then
/// the net changes are added to each host. A host whose worms would go
/// negative is clamped at zero, and female counts never exceed totals.
pub fn do_event_batch<R: Rng + ?Sized>(
    sum_rates: f64,
    cum_rates: &[f64],
    cfg: &Config,
    state: &mut PopulationState,
    rng: &mut R,
    multiplier: usize,
) -> Result<BatchOutcome> {
    let n_hosts = state.n_hosts();
    if cum_rates.len() != 3 * n_hosts {
        return Err(SimError::InvalidArgument(format!(
            "cumulative rate vector must have length {}, but has {}",
            3 * n_hosts,
            cum_rates.len()
        ))
        .into());
    }

    let mut gate_dist_vec = Vec::with_capacity(cfg.vaccine.v3.len());
    for &prob in &cfg.vaccine.v3 {
        gate_dist_vec.push(Bernoulli::new(prob)?);
    }
    let sex_dist = Bernoulli::new(0.5)?;

    let mut outcome = BatchOutcome::default();
    let mut worm_changes: Vec<(usize, i64, i64)> = Vec::with_capacity(multiplier);
    let mut waned = Vec::new();

    for _ in 0..multiplier {
        let event = inverse_cdf(cum_rates, rng.random::<f64>() * sum_rates)
            .context("failed to select event")?;
        let host = event % n_hosts;
        match event / n_hosts {
            0 => {
                if gate_dist_vec[state.status(host)].sample(rng) {
                    let female = sex_dist.sample(rng);
                    worm_changes.push((host, 1, i64::from(female)));
                    outcome.acquired += 1;
                } else {
                    outcome.blocked += 1;
                }
            }
            1 => {
                waned.push(host);
                outcome.waned += 1;
            }
            _ => {
                let female_dist = Bernoulli::new(state.worms.female_fraction(host)?)?;
                let female = female_dist.sample(rng);
                worm_changes.push((host, -1, -i64::from(female)));
                outcome.died += 1;
            }
        }
    }

    for host in waned {
        state.vaccinated[host] = false;
    }
    for (host, d_total, d_female) in worm_changes {
        let total = (i64::from(state.worms.total[host]) + d_total).max(0);
        let female = (i64::from(state.worms.female[host]) + d_female).clamp(0, total);
        state.worms.total[host] = total as u32;
        state.worms.female[host] = female as u32;
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::basic_config;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn small_config(n_hosts: usize) -> Config {
        let mut cfg = basic_config();
        cfg.population.n_hosts = n_hosts;
        cfg.vaccine.v3 = vec![1.0, 1.0];
        cfg
    }

    #[test]
    fn death_event_removes_one_worm() {
        let cfg = small_config(1);
        let mut rng = ChaCha12Rng::seed_from_u64(11);
        let trials = 20_000;
        let mut female_deaths = 0;
        for _ in 0..trials {
            let mut state = PopulationState::new(1, None);
            state.worms.total[0] = 10;
            state.worms.female[0] = 4;
            let event = do_event(&[0.0, 0.0, 1.0], &cfg, &mut state, &mut rng).unwrap();
            assert_eq!(state.worms.total[0], 9);
            if let Event::Died { host: 0, female } = event {
                if female {
                    female_deaths += 1;
                    assert_eq!(state.worms.female[0], 3);
                } else {
                    assert_eq!(state.worms.female[0], 4);
                }
            } else {
                panic!("expected a death event, got {event:?}");
            }
        }
        let freq = female_deaths as f64 / trials as f64;
        assert!((freq - 0.4).abs() < 0.02, "female death frequency {freq}");
    }

    #[test]
    fn death_target_is_never_worm_free() {
        let cfg = small_config(3);
        let mut rng = ChaCha12Rng::seed_from_u64(12);
        let mut state = PopulationState::new(3, None);
        state.worms.total[1] = 50;
        state.worms.female[1] = 20;
        let rates = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        for _ in 0..50 {
            let event = do_event(&rates, &cfg, &mut state, &mut rng).unwrap();
            assert!(matches!(event, Event::Died { host: 1, .. }));
        }
        assert_eq!(state.worms.total, vec![0, 0, 0]);
        assert_eq!(state.worms.female, vec![0, 0, 0]);
        state.check_invariants(&cfg).unwrap();

        let err = do_event(&rates, &cfg, &mut state, &mut rng).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SimError>(),
            Some(SimError::ArithmeticDegenerate(_))
        ));
    }

    #[test]
    fn selection_frequencies_follow_rates() {
        let cfg = small_config(3);
        let mut rng = ChaCha12Rng::seed_from_u64(13);
        let mut state = PopulationState::new(3, None);
        state.vaccinated = vec![true; 3];
        let rates = [1.0, 2.0, 0.0, 0.5, 0.0, 0.5, 0.0];
        let trials = 40_000;
        let mut counts = [0usize; 6];
        for _ in 0..trials {
            match do_event(&rates, &cfg, &mut state, &mut rng).unwrap() {
                Event::Acquired { host, .. } | Event::Blocked { host } => counts[host] += 1,
                Event::Waned { host } => counts[3 + host] += 1,
                Event::Died { .. } => panic!("death has zero rate"),
            }
        }
        let sum: f64 = rates.iter().sum();
        for (idx, &count) in counts.iter().enumerate() {
            let freq = count as f64 / trials as f64;
            assert!(
                (freq - rates[idx] / sum).abs() < 0.01,
                "index {idx}: frequency {freq}, expected {}",
                rates[idx] / sum
            );
        }
    }

    #[test]
    fn acquisition_respects_vaccine_gate() {
        let mut cfg = small_config(1);
        cfg.vaccine.v3 = vec![1.0, 0.0];
        let mut rng = ChaCha12Rng::seed_from_u64(14);
        let mut state = PopulationState::new(1, None);
        state.vaccinated[0] = true;
        for _ in 0..100 {
            let event = do_event(&[1.0, 0.0, 0.0], &cfg, &mut state, &mut rng).unwrap();
            assert_eq!(event, Event::Blocked { host: 0 });
        }
        assert_eq!(state.worms.total[0], 0);

        state.vaccinated[0] = false;
        let trials = 10_000;
        for _ in 0..trials {
            do_event(&[1.0, 0.0, 0.0], &cfg, &mut state, &mut rng).unwrap();
        }
        assert_eq!(state.worms.total[0], trials);
        let female_share = state.worms.female[0] as f64 / trials as f64;
        assert!((female_share - 0.5).abs() < 0.02);
    }

    #[test]
    fn waning_resets_vaccination() {
        let cfg = small_config(2);
        let mut rng = ChaCha12Rng::seed_from_u64(15);
        let mut state = PopulationState::new(2, None);
        state.vaccinated = vec![true, true];
        let event = do_event(&[0.0, 0.0, 0.0, 1.0, 0.0], &cfg, &mut state, &mut rng).unwrap();
        assert_eq!(event, Event::Waned { host: 1 });
        assert_eq!(state.vaccinated, vec![true, false]);
    }

    #[test]
    fn wrong_rate_length_is_rejected() {
        let cfg = small_config(2);
        let mut rng = ChaCha12Rng::seed_from_u64(16);
        let mut state = PopulationState::new(2, None);
        let err = do_event(&[1.0, 1.0], &cfg, &mut state, &mut rng).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SimError>(),
            Some(SimError::InvalidArgument(_))
        ));
    }

    #[test]
    fn batch_applies_every_draw() {
        let cfg = small_config(2);
        let mut rng = ChaCha12Rng::seed_from_u64(17);
        let mut state = PopulationState::new(2, None);
        let rates = [1.0, 3.0, 0.0, 0.0, 0.0, 0.0];
        let cum_rates = cumsum(&rates);
        let outcome =
            do_event_batch(4.0, &cum_rates, &cfg, &mut state, &mut rng, 1000).unwrap();
        assert_eq!(outcome.acquired, 1000);
        assert_eq!(state.worms.total[0] + state.worms.total[1], 1000);
        assert!(state.worms.total[1] > 2 * state.worms.total[0]);
        state.check_invariants(&cfg).unwrap();
    }

    #[test]
    fn batch_deaths_never_go_negative() {
        let cfg = small_config(2);
        let mut rng = ChaCha12Rng::seed_from_u64(18);
        let mut state = PopulationState::new(2, None);
        state.worms.total = vec![2, 0];
        state.worms.female = vec![1, 0];
        let rates = [0.0, 0.0, 0.0, 0.0, 2.0, 0.0];
        let cum_rates = cumsum(&rates);
        let outcome = do_event_batch(2.0, &cum_rates, &cfg, &mut state, &mut rng, 10).unwrap();
        assert_eq!(outcome.died, 10);
        assert_eq!(state.worms.total, vec![0, 0]);
        assert_eq!(state.worms.female, vec![0, 0]);
        state.check_invariants(&cfg).unwrap();
    }

    #[test]
    fn batch_waning_and_death_classes() {
        let cfg = small_config(2);
        let mut rng = ChaCha12Rng::seed_from_u64(19);
        let mut state = PopulationState::new(2, None);
        state.vaccinated = vec![true, true];
        state.worms.total = vec![0, 40];
        state.worms.female = vec![0, 40];
        let rates = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        let cum_rates = cumsum(&rates);
        let outcome = do_event_batch(2.0, &cum_rates, &cfg, &mut state, &mut rng, 20).unwrap();
        assert_eq!(outcome.waned + outcome.died, 20);
        assert!(state.vaccinated[1]);
        assert_eq!(state.vaccinated[0], outcome.waned == 0);
        assert_eq!(state.worms.total[1], 40 - outcome.died as u32);
        // All worms of host 1 are female, so every death removes a female.
        assert_eq!(state.worms.female[1], state.worms.total[1]);
    }

    #[test]
    fn batched_and_exact_agree_statistically() {
        let cfg = small_config(4);
        let rates_host = [0.5, 1.0, 1.5, 2.0];
        let mut lumped = rates_host.to_vec();
        lumped.extend([0.0; 5]);
        let mut per_host = rates_host.to_vec();
        per_host.extend([0.0; 8]);

        let draws = 20_000;
        let mut rng = ChaCha12Rng::seed_from_u64(20);
        let mut exact = PopulationState::new(4, None);
        for _ in 0..draws {
            EventSampler::Exact
                .apply(&lumped, &cfg, &mut exact, &mut rng)
                .unwrap();
        }
        let mut batched = PopulationState::new(4, None);
        let sampler = EventSampler::Batched { multiplier: 100 };
        for _ in 0..draws / sampler.events_per_draw() {
            sampler.apply(&per_host, &cfg, &mut batched, &mut rng).unwrap();
        }

        for host in 0..4 {
            let p_exact = exact.worms.total[host] as f64 / draws as f64;
            let p_batched = batched.worms.total[host] as f64 / draws as f64;
            assert!(
                (p_exact - p_batched).abs() < 0.02,
                "host {host}: exact {p_exact}, batched {p_batched}"
            );
        }
    }

    #[test]
    fn sampler_follows_batch_size() {
        let mut cfg = basic_config();
        assert_eq!(EventSampler::from_config(&cfg), EventSampler::Exact);
        cfg.run.batch_size = 8;
        let sampler = EventSampler::from_config(&cfg);
        assert_eq!(sampler, EventSampler::Batched { multiplier: 8 });
        assert_eq!(sampler.events_per_draw(), 8);
    }
}
