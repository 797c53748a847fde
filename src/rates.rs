use crate::config::Config;
use crate::state::PopulationState;

/// Event rates consumed by the event sampler.
pub trait RateProducer {
    /// Layout `[acquisition; N] ++ [waning; N] ++ [lumped death]`.
    fn lumped_rates(&self, cfg: &Config, state: &PopulationState) -> Vec<f64>;

    /// Layout `[acquisition; N] ++ [waning; N] ++ [death; N]`.
    fn per_host_rates(&self, cfg: &Config, state: &PopulationState) -> Vec<f64>;
}

/// Rates of the standard worm acquisition/death model.
///
/// Acquisition scales with the reservoir, host susceptibility and contact
/// weight; worm death with the host's burden and vaccine multiplier.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRates;

impl StandardRates {
    fn host_rates(cfg: &Config, state: &PopulationState) -> Vec<f64> {
        let n_hosts = state.n_hosts();
        let mut rates = Vec::with_capacity(3 * n_hosts + 1);
        rates.extend((0..n_hosts).map(|host| {
            state.free_living
                * state.susceptibility[host]
                * cfg.population.rho[state.contact_age_group[host]]
        }));
        rates.extend((0..n_hosts).map(|host| {
            if state.vaccinated[host] {
                cfg.vaccine.waning_rate
            } else {
                0.0
            }
        }));
        rates
    }

    fn host_death_rate(cfg: &Config, state: &PopulationState, host: usize) -> f64 {
        cfg.worms.sigma * state.worms.total[host] as f64 * cfg.vaccine.v1[state.status(host)]
    }
}

impl RateProducer for StandardRates {
    fn lumped_rates(&self, cfg: &Config, state: &PopulationState) -> Vec<f64> {
        let mut rates = Self::host_rates(cfg, state);
        let death_rate = (0..state.n_hosts())
            .map(|host| Self::host_death_rate(cfg, state, host))
            .sum();
        rates.push(death_rate);
        rates
    }

    fn per_host_rates(&self, cfg: &Config, state: &PopulationState) -> Vec<f64> {
        let mut rates = Self::host_rates(cfg, state);
        rates.extend((0..state.n_hosts()).map(|host| Self::host_death_rate(cfg, state, host)));
        rates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::basic_config;

    #[test]
    fn layouts_have_expected_lengths() {
        let cfg = basic_config();
        let state = PopulationState::new(cfg.n_hosts(), None);
        let n = cfg.n_hosts();
        assert_eq!(StandardRates.lumped_rates(&cfg, &state).len(), 2 * n + 1);
        assert_eq!(StandardRates.per_host_rates(&cfg, &state).len(), 3 * n);
    }

    #[test]
    fn worm_free_hosts_have_no_death_rate() {
        let cfg = basic_config();
        let mut state = PopulationState::new(cfg.n_hosts(), None);
        state.worms.total[4] = 3;
        state.worms.female[4] = 1;
        let n = cfg.n_hosts();

        let rates = StandardRates.per_host_rates(&cfg, &state);
        let deaths = &rates[2 * n..];
        assert!((deaths[4] - 3.0 * cfg.worms.sigma).abs() < 1e-12);
        assert!(deaths.iter().enumerate().all(|(i, &r)| i == 4 || r == 0.0));

        let lumped = StandardRates.lumped_rates(&cfg, &state);
        assert!((lumped[2 * n] - deaths[4]).abs() < 1e-12);
    }

    #[test]
    fn only_vaccinated_hosts_wane() {
        let cfg = basic_config();
        let mut state = PopulationState::new(cfg.n_hosts(), None);
        state.vaccinated[7] = true;
        let n = cfg.n_hosts();
        let rates = StandardRates.lumped_rates(&cfg, &state);
        assert_eq!(rates[n + 7], cfg.vaccine.waning_rate);
        assert_eq!(rates[n..2 * n].iter().filter(|&&r| r > 0.0).count(), 1);
    }
}
