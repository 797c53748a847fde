//! Chemotherapy and vaccination operators.

use crate::config::Config;
use crate::error::SimError;
use crate::state::{Attendance, PopulationState};
use anyhow::{Context, Result};
use rand::{Rng, seq::index};
use rand_distr::{Bernoulli, Binomial, Distribution};

/// Tolerance used to match the current time against drug schedule years.
const YEAR_TOL: f64 = 1e-9;

/// Hosts treated by each drug in one age-band round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChemoRound {
    pub drug1: Vec<usize>,
    pub drug2: Vec<usize>,
}

fn lookup<T>(coverage: &[T], idx: usize) -> Result<&T> {
    coverage.get(idx).ok_or_else(|| {
        SimError::InvariantViolation(format!(
            "age group {idx} has no coverage (only {} groups)",
            coverage.len()
        ))
        .into()
    })
}

/// One attendance coin per coverage entry.
fn coverage_dists(coverage: &[f64]) -> Result<Vec<Bernoulli>> {
    let mut dist_vec = Vec::with_capacity(coverage.len());
    for &prob in coverage {
        dist_vec.push(Bernoulli::new(prob).context("invalid coverage")?);
    }
    Ok(dist_vec)
}

/// Kill each worm of `hosts` independently with probability `efficacy`.
fn treat_hosts<R: Rng + ?Sized>(
    state: &mut PopulationState,
    hosts: &[usize],
    efficacy: f64,
    rng: &mut R,
) -> Result<()> {
    for &host in hosts {
        let female = state.worms.female[host];
        let male = state.worms.male(host);
        let female_to_die = Binomial::new(u64::from(female), efficacy)
            .context("failed to build female kill distribution")?
            .sample(rng) as u32;
        let male_to_die = Binomial::new(u64::from(male), efficacy)
            .context("failed to build male kill distribution")?
            .sample(rng) as u32;
        state.worms.female[host] -= female_to_die;
        state.worms.total[host] -= female_to_die + male_to_die;
    }
    Ok(())
}

fn record_round(state: &mut PopulationState, t: f64, attendance: Attendance) {
    let ages = state.ages(t);
    let adherence = state.adherence_factor.clone();
    let audit = &mut state.audit;
    audit.attendance_record.push(attendance);
    audit.age_at_chemo.push(ages);
    audit.adherence_factor_at_chemo.push(adherence);
}

/// Chemotherapy with coverage looked up by treatment age group.
///
/// Returns the number of treated hosts.
pub fn do_chemo<R: Rng + ?Sized>(
    cfg: &Config,
    state: &mut PopulationState,
    t: f64,
    coverage: &[f64],
    rng: &mut R,
) -> Result<usize> {
    let attend_dist_vec = coverage_dists(coverage)?;

    let n_hosts = state.n_hosts();
    let mut to_treat_now = vec![false; n_hosts];
    for (host, to_treat) in to_treat_now.iter_mut().enumerate() {
        let attends = lookup(&attend_dist_vec, state.treatment_age_group[host])?.sample(rng);
        *to_treat = attends && state.complier[host];
    }

    let hosts: Vec<usize> = (0..n_hosts).filter(|&host| to_treat_now[host]).collect();
    treat_hosts(state, &hosts, cfg.drugs.efficacy, rng).context("failed to treat hosts")?;
    record_round(state, t, Attendance::Mask(to_treat_now));

    log::debug!("chemotherapy at t = {t} treated {} hosts", hosts.len());
    Ok(hosts.len())
}

/// Share of the treated population scheduled for a drug at time `t`.
fn scheduled_share(years: &[f64], split: &[f64], t: f64) -> f64 {
    years
        .iter()
        .position(|&year| (year - t).abs() < YEAR_TOL)
        .map_or(0.0, |idx| split[idx])
}

/// Dual-drug chemotherapy of hosts aged `[min_age, max_age]`.
///
/// Compliant attendees in the band are split at random between the drugs:
/// a `drug2` share of them (rounded down) takes drug 2 and the rest take
/// drug 1. A drug with no scheduled share at `t` is not given.
pub fn do_chemo_age_range<R: Rng + ?Sized>(
    cfg: &Config,
    state: &mut PopulationState,
    t: f64,
    min_age: f64,
    max_age: f64,
    coverage: f64,
    rng: &mut R,
) -> Result<ChemoRound> {
    let attend_dist = Bernoulli::new(coverage).context("invalid coverage")?;

    let mut cohort = Vec::new();
    for host in 0..state.n_hosts() {
        let attends = attend_dist.sample(rng);
        let age = t - state.demography.birth_date[host];
        if attends && state.complier[host] && (min_age..=max_age).contains(&age) {
            cohort.push(host);
        }
    }

    let drugs = &cfg.drugs;
    let d1_share = scheduled_share(&drugs.drug1_years, &drugs.drug1_split, t);
    let d2_share = scheduled_share(&drugs.drug2_years, &drugs.drug2_split, t);

    let mut takes_drug2 = vec![false; cohort.len()];
    if d2_share > 0.0 {
        let n_drug2 = (cohort.len() as f64 * d2_share) as usize;
        for pos in index::sample(rng, cohort.len(), n_drug2).into_vec() {
            takes_drug2[pos] = true;
        }
    }

    let mut round = ChemoRound::default();
    for (&host, &drug2) in cohort.iter().zip(&takes_drug2) {
        if drug2 {
            round.drug2.push(host);
        } else {
            round.drug1.push(host);
        }
    }

    if d1_share > 0.0 {
        treat_hosts(state, &round.drug1, drugs.efficacy1, rng)
            .context("failed to treat hosts with drug 1")?;
        state.audit.attendance_record.push(Attendance::Hosts(round.drug1.clone()));
        state.counters.n_chemo_drug1 += round.drug1.len() as u64;
    } else {
        round.drug1.clear();
    }
    if d2_share > 0.0 {
        treat_hosts(state, &round.drug2, drugs.efficacy2, rng)
            .context("failed to treat hosts with drug 2")?;
        state.audit.attendance_record.push(Attendance::Hosts(round.drug2.clone()));
        state.counters.n_chemo_drug2 += round.drug2.len() as u64;
    }

    let ages = state.ages(t);
    let adherence = state.adherence_factor.clone();
    state.audit.age_at_chemo.push(ages);
    state.audit.adherence_factor_at_chemo.push(adherence);

    log::debug!(
        "age range chemotherapy at t = {t}: {} hosts on drug 1, {} on drug 2",
        round.drug1.len(),
        round.drug2.len()
    );
    Ok(round)
}

/// Vaccination over paired age bands.
///
/// Vaccination age groups alternate ineligible/eligible, so only odd groups
/// are vaccinated; group `g` reads coverage entry `(g + 1) / 2 - 1`, and
/// group 0 wraps around to the last entry. `vacc_count` grows by the number
/// of eligible hosts plus the number of coverage draws that succeeded.
///
/// Returns the number of hosts vaccinated.
pub fn do_vaccine<R: Rng + ?Sized>(
    state: &mut PopulationState,
    t: f64,
    coverage: &[f64],
    rng: &mut R,
) -> Result<usize> {
    if coverage.is_empty() {
        return Err(SimError::InvalidArgument("vaccine coverage is empty".into()).into());
    }

    let select_dist_vec = coverage_dists(coverage)?;

    let mut n_eligible = 0;
    let mut n_selected = 0;
    let mut n_vaccinated = 0;
    for host in 0..state.n_hosts() {
        let group = state.vacc_age_group[host];
        let cov_idx = match (group + 1) / 2 {
            0 => coverage.len() - 1,
            pair => pair - 1,
        };
        let selected = lookup(&select_dist_vec, cov_idx)?.sample(rng);
        let eligible = group % 2 == 1;

        n_eligible += usize::from(eligible);
        n_selected += usize::from(selected);
        if eligible && selected {
            state.vaccinated[host] = true;
            n_vaccinated += 1;
        }
    }
    state.counters.vacc_count += (n_eligible + n_selected) as u64;

    log::debug!("vaccination at t = {t} vaccinated {n_vaccinated} hosts");
    Ok(n_vaccinated)
}

/// Vaccination of compliant hosts aged `[min_age, max_age]`.
///
/// `vacc_count` grows by the number of hosts vaccinated, which is returned.
pub fn do_vaccine_age_range<R: Rng + ?Sized>(
    state: &mut PopulationState,
    t: f64,
    min_age: f64,
    max_age: f64,
    coverage: f64,
    rng: &mut R,
) -> Result<usize> {
    let select_dist = Bernoulli::new(coverage).context("invalid coverage")?;

    let mut n_vaccinated = 0;
    for host in 0..state.n_hosts() {
        let selected = select_dist.sample(rng);
        let age = t - state.demography.birth_date[host];
        if selected && state.complier[host] && (min_age..=max_age).contains(&age) {
            state.vaccinated[host] = true;
            n_vaccinated += 1;
        }
    }
    state.counters.vacc_count += n_vaccinated as u64;

    log::debug!("age range vaccination at t = {t} vaccinated {n_vaccinated} hosts");
    Ok(n_vaccinated)
}
