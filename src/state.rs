//! Population state shared by every simulation component.

use crate::config::Config;
use crate::error::SimError;
use anyhow::Result;
use std::collections::VecDeque;

/// Worm burden of every host.
///
/// Male worms are implicit: `total[i] - female[i]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Worms {
    pub total: Vec<u32>,
    pub female: Vec<u32>,
}

impl Worms {
    pub fn new(n_hosts: usize) -> Self {
        Self {
            total: vec![0; n_hosts],
            female: vec![0; n_hosts],
        }
    }

    pub fn male(&self, host: usize) -> u32 {
        self.total[host] - self.female[host]
    }

    /// Female share of a host's worms; the host must carry at least one worm.
    pub fn female_fraction(&self, host: usize) -> Result<f64> {
        let total = self.total[host];
        if total == 0 {
            return Err(SimError::ArithmeticDegenerate(format!(
                "host {host} has no worms to compute a female fraction"
            ))
            .into());
        }
        Ok(self.female[host] as f64 / total as f64)
    }
}

/// Scheduled demographic events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Demography {
    pub birth_date: Vec<f64>,
    pub death_date: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Counters {
    pub vacc_count: u64,
    pub num_survey: u64,
    pub num_survey_two: u64,
    pub n_chemo_drug1: u64,
    pub n_chemo_drug2: u64,
}

/// Hosts that received a treatment round.
#[derive(Debug, Clone, PartialEq)]
pub enum Attendance {
    /// One flag per host.
    Mask(Vec<bool>),
    /// Indices of the treated hosts.
    Hosts(Vec<usize>),
}

/// Append-only log that optionally keeps only the most recent entries.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditLog<T> {
    entries: VecDeque<T>,
    capacity: Option<usize>,
}

impl<T> AuditLog<T> {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    pub fn push(&mut self, entry: T) {
        if let Some(capacity) = self.capacity {
            while self.entries.len() >= capacity {
                self.entries.pop_front();
            }
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Remove and return every retained entry, oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        self.entries.drain(..).collect()
    }
}

/// Treatment audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct ChemoAudit {
    pub attendance_record: AuditLog<Attendance>,
    pub age_at_chemo: AuditLog<Vec<f64>>,
    pub adherence_factor_at_chemo: AuditLog<Vec<f64>>,
}

impl ChemoAudit {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            attendance_record: AuditLog::new(capacity),
            age_at_chemo: AuditLog::new(capacity),
            adherence_factor_at_chemo: AuditLog::new(capacity),
        }
    }
}

/// State of the host population.
///
/// Per-host quantities are parallel vectors of length `n_hosts`.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationState {
    pub worms: Worms,
    /// Vaccination status; indexes the `v1`/`v2`/`v3` multipliers as 0 or 1.
    pub vaccinated: Vec<bool>,
    pub susceptibility: Vec<f64>,
    pub demography: Demography,

    pub contact_age_group: Vec<usize>,
    pub treatment_age_group: Vec<usize>,
    pub vacc_age_group: Vec<usize>,

    pub complier: Vec<bool>,
    pub adherence_factor: Vec<f64>,

    /// Level of the free-living environmental reservoir.
    pub free_living: f64,

    pub counters: Counters,
    pub audit: ChemoAudit,
}

impl PopulationState {
    /// Population of `n_hosts` worm-free, unvaccinated, compliant newborns.
    pub fn new(n_hosts: usize, audit_capacity: Option<usize>) -> Self {
        Self {
            worms: Worms::new(n_hosts),
            vaccinated: vec![false; n_hosts],
            susceptibility: vec![1.0; n_hosts],
            demography: Demography {
                birth_date: vec![0.0; n_hosts],
                death_date: vec![f64::INFINITY; n_hosts],
            },
            contact_age_group: vec![0; n_hosts],
            treatment_age_group: vec![0; n_hosts],
            vacc_age_group: vec![0; n_hosts],
            complier: vec![true; n_hosts],
            adherence_factor: vec![0.0; n_hosts],
            free_living: 0.0,
            counters: Counters::default(),
            audit: ChemoAudit::new(audit_capacity),
        }
    }

    pub fn n_hosts(&self) -> usize {
        self.worms.total.len()
    }

    pub fn ages(&self, t: f64) -> Vec<f64> {
        self.demography
            .birth_date
            .iter()
            .map(|&birth| t - birth)
            .collect()
    }

    /// Vaccination status as a multiplier index.
    pub fn status(&self, host: usize) -> usize {
        usize::from(self.vaccinated[host])
    }

    /// Verify the structural invariants of the population.
    ///
    /// # Errors
    /// Returns [`SimError::InvariantViolation`] describing the first violation found.
    pub fn check_invariants(&self, cfg: &Config) -> Result<()> {
        let n_hosts = self.n_hosts();
        let lens = [
            ("female worms", self.worms.female.len()),
            ("vaccination status", self.vaccinated.len()),
            ("susceptibility", self.susceptibility.len()),
            ("birth dates", self.demography.birth_date.len()),
            ("death dates", self.demography.death_date.len()),
            ("contact age groups", self.contact_age_group.len()),
            ("treatment age groups", self.treatment_age_group.len()),
            ("vaccination age groups", self.vacc_age_group.len()),
            ("compliers", self.complier.len()),
            ("adherence factors", self.adherence_factor.len()),
        ];
        for (name, len) in lens {
            if len != n_hosts {
                return Err(violation(format!("{name} has length {len}, expected {n_hosts}")));
            }
        }

        if let Some(host) = (0..n_hosts).find(|&i| self.worms.female[i] > self.worms.total[i]) {
            return Err(violation(format!(
                "host {host} has {} female worms out of {}",
                self.worms.female[host], self.worms.total[host]
            )));
        }

        let groups = [
            ("contact", &self.contact_age_group, &cfg.population.contact_age_breaks),
            ("treatment", &self.treatment_age_group, &cfg.population.treatment_age_breaks),
            ("vaccination", &self.vacc_age_group, &cfg.population.vacc_age_breaks),
        ];
        for (name, idxs, breaks) in groups {
            if let Some(host) = idxs.iter().position(|&idx| idx >= breaks.len()) {
                return Err(violation(format!(
                    "host {host} has {name} age group {} out of {}",
                    idxs[host],
                    breaks.len()
                )));
            }
        }

        if !(self.free_living >= 0.0) {
            return Err(violation(format!(
                "free-living reservoir is {}",
                self.free_living
            )));
        }

        Ok(())
    }
}

fn violation(msg: String) -> anyhow::Error {
    SimError::InvariantViolation(msg).into()
}
