use crate::error::SimError;
use anyhow::{Context, Result, bail};
use std::{fmt::Debug, ops::RangeBounds};

pub fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

/// Check the length of `vec` and, when `prob_vec` is set, that every element
/// is a probability in `[0, 1]`.
pub fn check_vec(vec: &[f64], exp_len: usize, prob_vec: bool) -> Result<()> {
    let len = vec.len();
    if len != exp_len {
        bail!("vector length must be {exp_len}, but is {len}");
    }
    if !prob_vec {
        return Ok(());
    }
    for (idx, &ele) in vec.iter().enumerate() {
        check_num(ele, 0.0..=1.0).with_context(|| format!("invalid element {idx}"))?;
    }
    Ok(())
}

/// Age breakpoints must start at zero and be strictly increasing.
pub fn check_breaks(breaks: &[f64]) -> Result<()> {
    match breaks.first() {
        None => bail!("breakpoints must not be empty"),
        Some(&first) if first != 0.0 => bail!("first breakpoint must be 0.0, but is {first}"),
        Some(_) => {}
    }
    if breaks.windows(2).any(|pair| pair[0] >= pair[1]) {
        bail!("breakpoints must be strictly increasing");
    }
    Ok(())
}

pub fn cumsum(vals: &[f64]) -> Vec<f64> {
    vals.iter()
        .scan(0.0, |acc, &val| {
            *acc += val;
            Some(*acc)
        })
        .collect()
}

/// Index of the first cumulative weight strictly greater than `u`.
///
/// Clamps to the last non-empty class so that a `u` equal to the total
/// (possible after floating point rounding) still lands on a valid index.
pub fn inverse_cdf(cumsum: &[f64], u: f64) -> Result<usize> {
    let total = cumsum.last().copied().unwrap_or(0.0);
    if !(total > 0.0) {
        return Err(SimError::ArithmeticDegenerate(format!(
            "cannot draw from weights summing to {total}"
        ))
        .into());
    }
    let idx = cumsum.partition_point(|&cum| cum <= u);
    if idx < cumsum.len() {
        return Ok(idx);
    }
    // u >= total: take the last class with positive weight.
    let last = cumsum.partition_point(|&cum| cum < total);
    Ok(last)
}

/// Zero-based right-open bucket of `age` against `breaks`.
///
/// Ages beyond the last breakpoint fall in the final bucket.
pub fn age_group_index(age: f64, breaks: &[f64]) -> usize {
    breaks.partition_point(|&brk| brk <= age).saturating_sub(1)
}
