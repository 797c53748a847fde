//! Hybrid stochastic/deterministic simulation of parasitic worm transmission.
//!
//! A finite host population carries individual worm burdens, vaccination
//! status and demography, coupled through a free-living environmental
//! reservoir. Worm acquisition, worm death and vaccine waning are simulated
//! as a continuous-time jump process ([`events`]); demography and the
//! reservoir advance in fixed regular steps ([`regular`]). Chemotherapy and
//! vaccination ([`interventions`]) and prevalence surveys ([`survey`]) are
//! applied by the driver ([`engine`]) on a configured calendar.

pub mod config;
pub mod demography;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod events;
pub mod free_living;
pub mod interventions;
pub mod lifespan;
pub mod manager;
pub mod rates;
pub mod regular;
pub mod state;
pub mod stats;
pub mod survey;
pub mod utils;

pub use config::Config;
pub use engine::{Engine, RunSummary};
pub use error::SimError;
pub use state::PopulationState;
