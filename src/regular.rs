use crate::config::Config;
use crate::demography::do_death;
use crate::free_living::do_free_live;
use crate::lifespan::LifespanSampler;
use crate::state::PopulationState;
use anyhow::{Context, Result};
use rand::Rng;

/// Run the processes that happen every regular step at time `t`.
///
/// Deaths are processed first so the reservoir update sees the worm-free
/// newborns.
pub fn do_regular<L, R>(
    cfg: &Config,
    state: &mut PopulationState,
    t: f64,
    dt: f64,
    lifespans: &L,
    rng: &mut R,
) -> Result<()>
where
    L: LifespanSampler,
    R: Rng + ?Sized,
{
    do_death(cfg, state, t, lifespans, rng).context("failed to update demography")?;
    do_free_live(cfg, state, dt).context("failed to update free-living reservoir")?;
    Ok(())
}
