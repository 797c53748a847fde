use crate::config::Config;
use crate::engine::{Engine, RunSummary};
use crate::stats::Accumulator;
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rayon::prelude::*;
use std::path::Path;

/// Runs independent replicates of one configuration.
///
/// Every replicate owns its population and random stream; replicate `i`
/// is seeded with `base_seed + i`.
pub struct Manager {
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(config_file: P) -> Result<Self> {
        let cfg = Config::from_file(config_file).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");
        Ok(Self { cfg })
    }

    pub fn from_config(cfg: Config) -> Self {
        Self { cfg }
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    pub fn run_replicates(&self, n_runs: usize, n_threads: Option<usize>) -> Result<Vec<RunSummary>> {
        let base_seed = match self.cfg.run.seed {
            Some(seed) => seed,
            None => ChaCha12Rng::try_from_os_rng()?.next_u64(),
        };

        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(n_threads) = n_threads {
            builder = builder.num_threads(n_threads);
        }
        let pool = builder.build().context("failed to create thread pool")?;

        let summaries = pool.install(|| {
            (0..n_runs)
                .into_par_iter()
                .map(|run_idx| {
                    let seed = base_seed.wrapping_add(run_idx as u64);
                    let mut engine = Engine::with_seed(self.cfg.clone(), seed)
                        .with_context(|| format!("failed to initialize run {run_idx}"))?;
                    engine
                        .run()
                        .with_context(|| format!("failed to perform run {run_idx}"))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        self.log_summary(&summaries);
        Ok(summaries)
    }

    fn log_summary(&self, summaries: &[RunSummary]) {
        let n_surveys = summaries.iter().map(|s| s.surveys.len()).max().unwrap_or(0);
        for i_survey in 0..n_surveys {
            let mut acc = Accumulator::new();
            let mut time = f64::NAN;
            for summary in summaries {
                if let Some(record) = summary.surveys.get(i_survey) {
                    time = record.time;
                    acc.add(record.prevalence);
                }
            }
            log::info!("survey {i_survey} at t = {time}: prevalence {:?}", acc.report());
        }

        let mut burden = Accumulator::new();
        for summary in summaries {
            burden.add(summary.mean_worm_burden);
        }
        log::info!("final mean worm burden {:?}", burden.report());
    }
}
