use crate::config::{Config, Intervention};
use crate::demography::update_age_groups;
use crate::diagnostics::KatoKatz;
use crate::events::EventSampler;
use crate::interventions::{do_chemo, do_chemo_age_range, do_vaccine, do_vaccine_age_range};
use crate::lifespan::{LifespanSampler, PiecewiseHazard};
use crate::rates::StandardRates;
use crate::regular::do_regular;
use crate::state::{Counters, PopulationState};
use crate::survey::{conduct_survey, conduct_survey_two};
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::{Bernoulli, Exp, Gamma, Uniform};

/// Slack used when deciding whether a scheduled intervention is due.
const TIME_TOL: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurveyKind {
    AgeRestricted,
    WholePopulation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurveyRecord {
    pub time: f64,
    pub kind: SurveyKind,
    pub prevalence: f64,
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub seed: u64,
    pub surveys: Vec<SurveyRecord>,
    pub counters: Counters,
    pub free_living: f64,
    pub mean_worm_burden: f64,
}

/// Simulation driver.
///
/// Holds the configuration, current population, and random number generator.
/// Between regular steps it applies stochastic events in continuous time;
/// at each regular step it updates demography and the reservoir and then
/// applies every scheduled intervention that has come due.
pub struct Engine {
    cfg: Config,
    state: PopulationState,
    rng: ChaCha12Rng,
    seed: u64,
    time: f64,

    sampler: EventSampler,
    rates: StandardRates,
    lifespans: PiecewiseHazard,
    eggs: KatoKatz,

    schedule: Vec<Intervention>,
    next_intervention: usize,
}

impl Engine {
    /// Create a new `Engine` with the configured seed, or one drawn from the OS.
    pub fn generate_initial_condition(cfg: Config) -> Result<Self> {
        let seed = match cfg.run.seed {
            Some(seed) => seed,
            None => ChaCha12Rng::try_from_os_rng()?.next_u64(),
        };
        Self::with_seed(cfg, seed)
    }

    /// Create a new `Engine` whose random stream is fully determined by `seed`.
    pub fn with_seed(cfg: Config, seed: u64) -> Result<Self> {
        let mut rng = ChaCha12Rng::seed_from_u64(seed);
        let lifespans = PiecewiseHazard::from_config(&cfg);
        let state = initial_population(&cfg, &lifespans, &mut rng)
            .context("failed to generate initial population")?;

        let mut schedule = cfg.interventions.clone();
        schedule.sort_by(|a, b| a.time().total_cmp(&b.time()));

        Ok(Self {
            sampler: EventSampler::from_config(&cfg),
            rates: StandardRates,
            lifespans,
            eggs: KatoKatz::from_config(&cfg),
            cfg,
            state,
            rng,
            seed,
            time: 0.0,
            schedule,
            next_intervention: 0,
        })
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    pub fn state(&self) -> &PopulationState {
        &self.state
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Run the simulation up to the configured horizon.
    pub fn run(&mut self) -> Result<RunSummary> {
        let mut surveys = Vec::new();
        let max_time = self.cfg.run.max_time;
        let dt = self.cfg.run.dt;
        let n_steps = (max_time / dt).ceil() as usize;
        let log_every = (n_steps / 10).max(1);

        self.apply_due_interventions(&mut surveys)
            .context("failed to apply interventions")?;

        for i_step in 0..n_steps {
            let t_prev = self.time;
            let t_next = ((i_step + 1) as f64 * dt).min(max_time);

            self.perform_events(t_next)
                .context("failed to perform stochastic events")?;
            self.time = t_next;

            do_regular(
                &self.cfg,
                &mut self.state,
                t_next,
                t_next - t_prev,
                &self.lifespans,
                &mut self.rng,
            )
            .context("failed to perform regular step")?;

            self.apply_due_interventions(&mut surveys)
                .context("failed to apply interventions")?;

            if cfg!(debug_assertions) {
                self.state
                    .check_invariants(&self.cfg)
                    .with_context(|| format!("invalid state at t = {t_next}"))?;
            }

            if (i_step + 1) % log_every == 0 || i_step + 1 == n_steps {
                let progress = 100.0 * (i_step + 1) as f64 / n_steps as f64;
                log::info!("run {:016x} completed {progress:06.2}%", self.seed);
            }
        }

        let n_hosts = self.state.n_hosts() as f64;
        let mean_worm_burden =
            self.state.worms.total.iter().map(|&w| f64::from(w)).sum::<f64>() / n_hosts;

        Ok(RunSummary {
            seed: self.seed,
            surveys,
            counters: self.state.counters.clone(),
            free_living: self.state.free_living,
            mean_worm_burden,
        })
    }

    /// Apply stochastic events until the next one would happen after `t_end`.
    fn perform_events(&mut self, t_end: f64) -> Result<()> {
        let n_events = self.sampler.events_per_draw();
        loop {
            let rates = self.sampler.rates(&self.rates, &self.cfg, &self.state);
            let sum_rates: f64 = rates.iter().sum();
            if sum_rates <= 0.0 {
                return Ok(());
            }

            let wait = if n_events == 1 {
                Exp::new(sum_rates)
                    .context("failed to build waiting time distribution")?
                    .sample(&mut self.rng)
            } else {
                Gamma::new(n_events as f64, 1.0 / sum_rates)
                    .context("failed to build batch waiting time distribution")?
                    .sample(&mut self.rng)
            };
            if self.time + wait >= t_end {
                return Ok(());
            }
            self.time += wait;

            self.sampler
                .apply(&rates, &self.cfg, &mut self.state, &mut self.rng)?;
        }
    }

    fn apply_due_interventions(&mut self, surveys: &mut Vec<SurveyRecord>) -> Result<()> {
        while let Some(intervention) = self.schedule.get(self.next_intervention) {
            if intervention.time() > self.time + TIME_TOL {
                break;
            }
            let intervention = intervention.clone();
            self.next_intervention += 1;
            self.apply_intervention(&intervention, surveys)
                .with_context(|| format!("failed to apply {intervention:?}"))?;
        }
        Ok(())
    }

    /// Apply `intervention` at the current time.
    ///
    /// Interventions come due at the first regular step at or after their
    /// scheduled time, and every operator sees the population as of that
    /// step, with its ages and age groups.
    fn apply_intervention(
        &mut self,
        intervention: &Intervention,
        surveys: &mut Vec<SurveyRecord>,
    ) -> Result<()> {
        let t = self.time;
        if (intervention.time() - t).abs() > TIME_TOL {
            log::debug!(
                "intervention scheduled at t = {} applied at t = {t}",
                intervention.time()
            );
        }

        let cfg = &self.cfg;
        let state = &mut self.state;
        let rng = &mut self.rng;
        match *intervention {
            Intervention::Chemo { ref coverage, .. } => {
                do_chemo(cfg, state, t, coverage, rng)?;
            }
            Intervention::ChemoAgeRange {
                min_age,
                max_age,
                coverage,
                ..
            } => {
                do_chemo_age_range(cfg, state, t, min_age, max_age, coverage, rng)?;
            }
            Intervention::Vaccine { ref coverage, .. } => {
                do_vaccine(state, t, coverage, rng)?;
            }
            Intervention::VaccineAgeRange {
                min_age,
                max_age,
                coverage,
                ..
            } => {
                do_vaccine_age_range(state, t, min_age, max_age, coverage, rng)?;
            }
            Intervention::Survey {
                sample_size,
                n_samples,
                ..
            } => {
                let prevalence =
                    conduct_survey(cfg, state, t, sample_size, n_samples, &self.eggs, rng)?;
                surveys.push(SurveyRecord {
                    time: t,
                    kind: SurveyKind::AgeRestricted,
                    prevalence,
                });
            }
            Intervention::SurveyTwo {
                sample_size,
                n_samples,
                ..
            } => {
                let prevalence =
                    conduct_survey_two(cfg, state, t, sample_size, n_samples, &self.eggs, rng)?;
                surveys.push(SurveyRecord {
                    time: t,
                    kind: SurveyKind::WholePopulation,
                    prevalence,
                });
            }
        }
        Ok(())
    }
}

/// Population at time zero: hosts of random age within their sampled
/// lifetime, with `init_worms` worms each.
fn initial_population<L, R>(cfg: &Config, lifespans: &L, rng: &mut R) -> Result<PopulationState>
where
    L: LifespanSampler,
    R: Rng + ?Sized,
{
    let n_hosts = cfg.n_hosts();
    let mut state = PopulationState::new(n_hosts, cfg.run.audit_capacity);

    let k = cfg.population.k;
    let si_dist = Gamma::new(k, 1.0 / k).context("failed to build susceptibility distribution")?;
    let unit_dist = Uniform::new(0.0, 1.0)?;
    let complier_dist = Bernoulli::new(1.0 - cfg.population.prop_never_compliers)
        .context("failed to build complier distribution")?;
    let total_lifespans = lifespans
        .sample(n_hosts, rng)
        .context("failed to sample lifespans")?;

    for (host, lifespan) in total_lifespans.into_iter().enumerate() {
        let age = unit_dist.sample(rng) * lifespan;
        state.demography.birth_date[host] = -age;
        state.demography.death_date[host] = lifespan - age;
        state.susceptibility[host] = si_dist.sample(rng);
        state.adherence_factor[host] = unit_dist.sample(rng);
        state.complier[host] = complier_dist.sample(rng);
        state.worms.total[host] = cfg.run.init_worms;
        state.worms.female[host] = cfg.run.init_worms / 2;
    }
    state.free_living = cfg.run.init_free_living;
    update_age_groups(cfg, &mut state, 0.0);

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::basic_config;

    #[test]
    fn initial_population_is_valid() {
        let cfg = basic_config();
        let engine = Engine::with_seed(cfg.clone(), 1).unwrap();
        let state = engine.state();
        state.check_invariants(&cfg).unwrap();
        assert!(state.demography.birth_date.iter().all(|&b| b <= 0.0));
        assert!(state.demography.death_date.iter().all(|&d| d >= 0.0));
        assert!(state.worms.total.iter().all(|&w| w == 6));
        assert!(state.worms.female.iter().all(|&w| w == 3));
        assert_eq!(state.free_living, 1.0);
    }

    #[test]
    fn run_reaches_horizon_and_applies_schedule() {
        let cfg = basic_config();
        let mut engine = Engine::with_seed(cfg.clone(), 2).unwrap();
        let summary = engine.run().unwrap();

        assert_eq!(engine.time(), cfg.run.max_time);
        assert_eq!(summary.seed, 2);
        assert_eq!(summary.surveys.len(), 1);
        assert_eq!(summary.surveys[0].kind, SurveyKind::WholePopulation);
        assert!((0.0..=1.0).contains(&summary.surveys[0].prevalence));
        assert_eq!(summary.counters.num_survey_two, 1);
        assert_eq!(engine.state().audit.attendance_record.len(), 1);
        assert!(summary.free_living >= 0.0);
        engine.state().check_invariants(&cfg).unwrap();
    }

    #[test]
    fn same_seed_reproduces_run() {
        let cfg = basic_config();
        let first = Engine::with_seed(cfg.clone(), 3).unwrap().run().unwrap();
        let second = Engine::with_seed(cfg, 3).unwrap().run().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn batched_run_keeps_invariants() {
        let mut cfg = basic_config();
        cfg.run.batch_size = 16;
        cfg.interventions.push(Intervention::Vaccine {
            time: 2.0,
            coverage: vec![0.5, 0.5],
        });
        cfg.interventions.push(Intervention::ChemoAgeRange {
            time: 3.0,
            min_age: 2.0,
            max_age: 20.0,
            coverage: 0.8,
        });
        cfg.validate().unwrap();

        let mut engine = Engine::with_seed(cfg.clone(), 4).unwrap();
        let summary = engine.run().unwrap();
        engine.state().check_invariants(&cfg).unwrap();
        assert!(summary.counters.vacc_count > 0);
        assert!(summary.counters.n_chemo_drug1 + summary.counters.n_chemo_drug2 > 0);
    }

    #[test]
    fn off_grid_interventions_run_at_next_step() {
        let mut cfg = basic_config();
        let n_bands = cfg.population.host_age_breaks.len();
        cfg.population.host_death_rates = vec![0.5; n_bands];
        cfg.interventions = vec![
            Intervention::Chemo {
                time: 1.1,
                coverage: vec![1.0; 4],
            },
            Intervention::SurveyTwo {
                time: 1.1,
                sample_size: 50,
                n_samples: 1,
            },
        ];
        cfg.validate().unwrap();

        let mut engine = Engine::with_seed(cfg.clone(), 5).unwrap();
        let summary = engine.run().unwrap();
        assert_eq!(summary.surveys.len(), 1);
        assert_eq!(summary.surveys[0].time, 1.25);

        let audit = &engine.state().audit;
        assert_eq!(audit.age_at_chemo.len(), 1);
        let ages = audit.age_at_chemo.last().unwrap();
        assert!(ages.iter().all(|&age| age > 0.0));
    }
}
