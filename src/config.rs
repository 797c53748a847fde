use crate::error::SimError;
use crate::utils::{check_breaks, check_num, check_vec};
use anyhow::{Context, Result, bail};
use rmp_serde::decode;
use serde::{Deserialize, Serialize};
use std::{fmt, fs, fs::File, io::BufReader, path::Path, str::FromStr};

/// Simulation configuration parameters.
///
/// Loaded from a TOML or MessagePack file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    pub population: PopulationConfig,
    pub worms: WormConfig,
    pub vaccine: VaccineConfig,
    pub drugs: DrugConfig,
    pub survey: SurveyConfig,
    pub run: RunConfig,

    /// Calendar of interventions and surveys applied by the driver.
    #[serde(default)]
    pub interventions: Vec<Intervention>,
}

/// Host population and demography.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Number of hosts.
    pub n_hosts: usize,
    /// Shape of the gamma-distributed susceptibility (mean one).
    pub k: f64,
    /// Contact weight per contact age group.
    pub rho: Vec<f64>,

    /// Breakpoints of the contact age groups.
    pub contact_age_breaks: Vec<f64>,
    /// Breakpoints of the treatment age groups.
    pub treatment_age_breaks: Vec<f64>,
    /// Breakpoints of the vaccination age groups (paired ineligible/eligible bands).
    pub vacc_age_breaks: Vec<f64>,

    /// Fraction of hosts born as permanent non-compliers.
    pub prop_never_compliers: f64,

    /// Breakpoints of the host mortality bands.
    pub host_age_breaks: Vec<f64>,
    /// Host death rate within each mortality band.
    pub host_death_rates: Vec<f64>,
    /// Age at which every host dies.
    pub max_age: f64,
}

/// Worm biology.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct WormConfig {
    /// Reproduction function selector, `epgFertility` or `epgMonog`.
    pub repro_func: String,
    /// Only count females in hosts that also carry a male (unisex mode only).
    #[serde(default)]
    pub sex_ratio: bool,
    /// Eggs per female worm.
    pub lambda_egg: f64,
    /// Density dependence of fecundity in the reservoir update.
    pub gamma: f64,
    /// Density dependence of fecundity in the diagnostic egg counts.
    pub z: f64,
    /// Aggregation of diagnostic egg counts.
    pub k_epg: f64,
    /// Count eggs of unfertilized females in diagnostic readings.
    #[serde(default)]
    pub unfertilized: bool,
    /// Worm death rate.
    pub sigma: f64,
    /// Transmission scale.
    pub psi: f64,
    /// Decay rate of the free-living reservoir.
    pub decay_rate: f64,
}

/// Vaccine effects, indexed by vaccination status (0 unvaccinated, 1 vaccinated).
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct VaccineConfig {
    /// Worm death rate multiplier.
    pub v1: Vec<f64>,
    /// Fecundity multiplier.
    pub v2: Vec<f64>,
    /// Acquisition probability.
    pub v3: Vec<f64>,
    /// Rate at which vaccinated hosts lose protection.
    pub waning_rate: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct DrugConfig {
    /// Efficacy used by age-group indexed chemotherapy.
    pub efficacy: f64,
    pub efficacy1: f64,
    pub efficacy2: f64,

    /// Years in which drug 1 is distributed and its treated-population share.
    #[serde(default)]
    pub drug1_years: Vec<f64>,
    #[serde(default)]
    pub drug1_split: Vec<f64>,
    #[serde(default)]
    pub drug2_years: Vec<f64>,
    #[serde(default)]
    pub drug2_split: Vec<f64>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SurveyConfig {
    pub min_age: f64,
    pub max_age: f64,
    /// Averaged egg counts strictly above this value count as positive.
    #[serde(default = "default_positivity_threshold")]
    pub positivity_threshold: f64,
}

fn default_positivity_threshold() -> f64 {
    0.9
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Seed of the run's random number generator (drawn from the OS if absent).
    #[serde(default)]
    pub seed: Option<u64>,
    /// Simulated time horizon.
    pub max_time: f64,
    /// Size of the regular step.
    pub dt: f64,
    /// Number of stochastic events applied per draw batch (1 is exact).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum number of retained chemotherapy audit entries.
    #[serde(default)]
    pub audit_capacity: Option<usize>,
    /// Worms given to each host at the start of the run.
    #[serde(default)]
    pub init_worms: u32,
    /// Initial level of the free-living reservoir.
    #[serde(default)]
    pub init_free_living: f64,
}

fn default_batch_size() -> usize {
    1
}

impl WormConfig {
    /// Parsed reproduction function selector.
    pub fn reproduction(&self) -> Result<ReproFunc> {
        Ok(self.repro_func.parse::<ReproFunc>()?)
    }
}

/// Reproduction function used to count reproductively active females.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ReproFunc {
    /// Every female produces eggs (polygamous mating).
    EpgFertility,
    /// Only male/female pairs produce eggs.
    EpgMonog,
}

impl FromStr for ReproFunc {
    type Err = SimError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "epgFertility" => Ok(Self::EpgFertility),
            "epgMonog" => Ok(Self::EpgMonog),
            _ => Err(SimError::Configuration(format!(
                "unsupported reproduction function {name:?}"
            ))),
        }
    }
}

impl fmt::Display for ReproFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EpgFertility => write!(f, "epgFertility"),
            Self::EpgMonog => write!(f, "epgMonog"),
        }
    }
}

/// Scheduled intervention or survey.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intervention {
    /// Chemotherapy with coverage per treatment age group.
    Chemo { time: f64, coverage: Vec<f64> },
    /// Dual-drug chemotherapy of an explicit age band.
    ChemoAgeRange {
        time: f64,
        min_age: f64,
        max_age: f64,
        coverage: f64,
    },
    /// Vaccination with coverage per paired vaccination age band.
    Vaccine { time: f64, coverage: Vec<f64> },
    /// Vaccination of an explicit age band.
    VaccineAgeRange {
        time: f64,
        min_age: f64,
        max_age: f64,
        coverage: f64,
    },
    /// Age-restricted prevalence survey.
    Survey {
        time: f64,
        sample_size: usize,
        n_samples: usize,
    },
    /// Whole-population prevalence survey.
    SurveyTwo {
        time: f64,
        sample_size: usize,
        n_samples: usize,
    },
}

impl Intervention {
    pub fn time(&self) -> f64 {
        match *self {
            Self::Chemo { time, .. }
            | Self::ChemoAgeRange { time, .. }
            | Self::Vaccine { time, .. }
            | Self::VaccineAgeRange { time, .. }
            | Self::Survey { time, .. }
            | Self::SurveyTwo { time, .. } => time,
        }
    }
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// Files ending in `.msgpack` are decoded as MessagePack, anything else as TOML.
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let config: Config = if file.extension().is_some_and(|ext| ext == "msgpack") {
            let handle = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
            decode::from_read(BufReader::new(handle)).context("failed to deserialize config")?
        } else {
            let contents =
                fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
            Self::from_toml(&contents)?
        };

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    /// Parse a TOML document without validating it.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("failed to deserialize config")
    }

    /// Number of hosts.
    pub fn n_hosts(&self) -> usize {
        self.population.n_hosts
    }

    pub fn validate(&self) -> Result<()> {
        let pop = &self.population;
        check_num(pop.n_hosts, 1..10_000_000).context("invalid number of hosts")?;
        check_positive(pop.k).context("invalid susceptibility aggregation")?;
        check_breaks(&pop.contact_age_breaks).context("invalid contact age breaks")?;
        check_breaks(&pop.treatment_age_breaks).context("invalid treatment age breaks")?;
        check_breaks(&pop.vacc_age_breaks).context("invalid vaccination age breaks")?;
        check_vec(&pop.rho, pop.contact_age_breaks.len(), false)
            .context("invalid contact weights")?;
        if pop.rho.iter().any(|&rho| rho < 0.0) {
            bail!("contact weights must be non-negative");
        }
        check_num(pop.prop_never_compliers, 0.0..=1.0)
            .context("invalid proportion of never compliers")?;
        check_breaks(&pop.host_age_breaks).context("invalid host age breaks")?;
        check_vec(&pop.host_death_rates, pop.host_age_breaks.len(), false)
            .context("invalid host death rates")?;
        if pop.host_death_rates.iter().any(|&rate| rate < 0.0) {
            bail!("host death rates must be non-negative");
        }
        check_positive(pop.max_age).context("invalid maximum age")?;

        let worms = &self.worms;
        check_num(worms.lambda_egg, 0.0..).context("invalid eggs per female")?;
        check_num(worms.gamma, 0.0..).context("invalid fecundity density dependence")?;
        check_num(worms.z, 0.0..=1.0).context("invalid egg count density dependence")?;
        check_positive(worms.k_epg).context("invalid egg count aggregation")?;
        check_num(worms.sigma, 0.0..).context("invalid worm death rate")?;
        check_num(worms.psi, 0.0..).context("invalid transmission scale")?;
        check_positive(worms.decay_rate).context("invalid reservoir decay rate")?;
        worms.reproduction().context("invalid reproduction function")?;

        let vacc = &self.vaccine;
        check_vec(&vacc.v1, 2, false).context("invalid death rate multipliers")?;
        check_vec(&vacc.v2, 2, false).context("invalid fecundity multipliers")?;
        check_vec(&vacc.v3, 2, true).context("invalid acquisition probabilities")?;
        check_num(vacc.waning_rate, 0.0..).context("invalid vaccine waning rate")?;

        let drugs = &self.drugs;
        check_num(drugs.efficacy, 0.0..=1.0).context("invalid drug efficacy")?;
        check_num(drugs.efficacy1, 0.0..=1.0).context("invalid drug 1 efficacy")?;
        check_num(drugs.efficacy2, 0.0..=1.0).context("invalid drug 2 efficacy")?;
        check_vec(&drugs.drug1_split, drugs.drug1_years.len(), true)
            .context("invalid drug 1 split")?;
        check_vec(&drugs.drug2_split, drugs.drug2_years.len(), true)
            .context("invalid drug 2 split")?;

        let survey = &self.survey;
        check_num(survey.min_age, 0.0..).context("invalid minimum survey age")?;
        check_num(survey.max_age, survey.min_age..).context("invalid maximum survey age")?;

        let run = &self.run;
        check_positive(run.max_time).context("invalid time horizon")?;
        check_positive(run.dt).context("invalid regular step")?;
        check_num(run.batch_size, 1..1_000_000).context("invalid batch size")?;
        if let Some(capacity) = run.audit_capacity {
            check_num(capacity, 1..).context("invalid audit capacity")?;
        }
        check_num(run.init_free_living, 0.0..).context("invalid initial reservoir")?;

        for (idx, intervention) in self.interventions.iter().enumerate() {
            self.check_intervention(intervention)
                .with_context(|| format!("invalid intervention {idx}"))?;
        }

        Ok(())
    }

    fn check_intervention(&self, intervention: &Intervention) -> Result<()> {
        check_num(intervention.time(), 0.0..).context("invalid time")?;
        match intervention {
            Intervention::Chemo { coverage, .. } => {
                check_vec(coverage, self.population.treatment_age_breaks.len(), true)
                    .context("invalid coverage")?;
            }
            Intervention::Vaccine { coverage, .. } => {
                let n_groups = self.population.vacc_age_breaks.len();
                check_vec(coverage, coverage.len(), true).context("invalid coverage")?;
                let min_len = (n_groups / 2).max(1);
                check_num(coverage.len(), min_len..).context("invalid coverage length")?;
            }
            Intervention::ChemoAgeRange {
                min_age,
                max_age,
                coverage,
                ..
            }
            | Intervention::VaccineAgeRange {
                min_age,
                max_age,
                coverage,
                ..
            } => {
                check_num(*coverage, 0.0..=1.0).context("invalid coverage")?;
                check_num(*max_age, *min_age..).context("invalid age band")?;
            }
            Intervention::Survey { n_samples, .. } | Intervention::SurveyTwo { n_samples, .. } => {
                if *n_samples < 1 {
                    return Err(SimError::InvalidArgument("nSamples < 1".into()).into());
                }
            }
        }
        Ok(())
    }
}

fn check_positive(num: f64) -> Result<()> {
    if !(num > 0.0 && num.is_finite()) {
        bail!("number must be positive and finite, but is {num:?}");
    }
    Ok(())
}
