//! correction.rs - multiple-testing corrections turning raw p-values into
//! q-values.

use std::collections::HashMap;
use std::hash::Hash;

use log::debug;
use serde::{Deserialize, Serialize};

/// A correction policy. `q_values` returns one q-value per input p-value,
/// in input order.
pub trait Correction {
    fn name(&self) -> &'static str;
    fn q_values(&self, p_values: &[f64]) -> Vec<f64>;
}

/// Corrects `entries` and re-attaches every q-value to its caller key.
pub fn adjust_keyed<K: Clone + Eq + Hash>(
    correction: &dyn Correction,
    entries: &[(K, f64)],
) -> HashMap<K, f64> {
    let p_values: Vec<f64> = entries.iter().map(|(_, p)| *p).collect();
    let q_values = correction.q_values(&p_values);
    debug!("{} correction applied to {} p-values", correction.name(), p_values.len());
    entries
        .iter()
        .map(|(key, _)| key.clone())
        .zip(q_values)
        .collect()
}

// ─── Policies ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct BenjaminiHochberg;

impl Correction for BenjaminiHochberg {
    fn name(&self) -> &'static str {
        "Benjamini-Hochberg"
    }

    fn q_values(&self, p_values: &[f64]) -> Vec<f64> {
        let p = sanitized(p_values);
        let m = p.len();
        let mut q = vec![0.0; m];
        let mut running = 1.0f64;
        for (pos, &idx) in ascending_order(&p).iter().enumerate().rev() {
            let rank = pos + 1;
            let candidate = if rank == m { p[idx] } else { p[idx] * m as f64 / rank as f64 };
            running = running.min(candidate);
            q[idx] = running;
        }
        q
    }
}

/// `q = min(1, p * m)`, `m` defaulting to the number of tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bonferroni {
    pub multiplier: Option<usize>,
}

impl Correction for Bonferroni {
    fn name(&self) -> &'static str {
        "Bonferroni"
    }

    fn q_values(&self, p_values: &[f64]) -> Vec<f64> {
        let m = self.multiplier.unwrap_or(p_values.len()) as f64;
        sanitized(p_values).into_iter().map(|p| (p * m).min(1.0)).collect()
    }
}

/// Step-down Holm: sorted position `i` (0-based) is multiplied by `m - i`,
/// q-values never decrease along the sorted order.
#[derive(Debug, Clone, Copy, Default)]
pub struct BonferroniHolm {
    pub multiplier: Option<usize>,
}

impl Correction for BonferroniHolm {
    fn name(&self) -> &'static str {
        "Bonferroni-Holm"
    }

    fn q_values(&self, p_values: &[f64]) -> Vec<f64> {
        let p = sanitized(p_values);
        let m = self.multiplier.unwrap_or(p.len()).max(p.len());
        let mut q = vec![0.0; p.len()];
        let mut running = 0.0f64;
        for (pos, &idx) in ascending_order(&p).iter().enumerate() {
            let candidate = (p[idx] * (m - pos) as f64).min(1.0);
            running = running.max(candidate);
            q[idx] = running;
        }
        q
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoCorrection;

impl Correction for NoCorrection {
    fn name(&self) -> &'static str {
        "none"
    }

    fn q_values(&self, p_values: &[f64]) -> Vec<f64> {
        sanitized(p_values)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionMethod {
    #[default]
    BenjaminiHochberg,
    Bonferroni,
    BonferroniHolm,
    None,
}

impl CorrectionMethod {
    pub fn build(self) -> Box<dyn Correction> {
        match self {
            CorrectionMethod::BenjaminiHochberg => Box::new(BenjaminiHochberg),
            CorrectionMethod::Bonferroni => Box::new(Bonferroni::default()),
            CorrectionMethod::BonferroniHolm => Box::new(BonferroniHolm::default()),
            CorrectionMethod::None => Box::new(NoCorrection),
        }
    }
}

//───── helpers ─────//

/// NaN p-values count as 1.0.
fn sanitized(p_values: &[f64]) -> Vec<f64> {
    p_values
        .iter()
        .map(|p| if p.is_nan() { 1.0 } else { p.clamp(0.0, 1.0) })
        .collect()
}

/// Indices of `p` in stable ascending order.
fn ascending_order(p: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..p.len()).collect();
    order.sort_by(|&a, &b| p[a].total_cmp(&p[b]));
    order
}
