//! hypergeometric.rs - upper-tail hypergeometric test in log space.

use log::debug;
use statrs::function::factorial::ln_binomial;

use super::EnrichmentPvalue;

/// P(X >= k) for X ~ Hypergeometric(N, K, n) with N and n fixed per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HypergeometricTest {
    genome_size: usize,
    list_size: usize,
}

impl HypergeometricTest {
    /// A list larger than the genome is clamped to the genome size.
    pub fn new(genome_size: usize, list_size: usize) -> Self {
        if list_size > genome_size {
            debug!("List size {} exceeds genome size {}, clamping", list_size, genome_size);
        }
        Self { genome_size, list_size: list_size.min(genome_size) }
    }
}

impl EnrichmentPvalue for HypergeometricTest {
    fn genome_size(&self) -> usize {
        self.genome_size
    }

    fn list_size(&self) -> usize {
        self.list_size
    }

    fn p_value(&self, class_size: usize, observed: usize) -> f64 {
        let big_n = self.genome_size as u64;
        let n = self.list_size as u64;
        let big_k = (class_size as u64).min(big_n);
        if observed == 0 || n == 0 || big_k == 0 {
            return 1.0;
        }

        let upper = n.min(big_k);
        let k = (observed as u64).min(upper);
        // every draw below the support minimum is certain
        let lower = (n + big_k).saturating_sub(big_n);
        if k <= lower {
            return 1.0;
        }

        let ln_total = ln_binomial(big_n, n);
        let terms: Vec<f64> = (k..=upper)
            .map(|i| ln_binomial(big_k, i) + ln_binomial(big_n - big_k, n - i) - ln_total)
            .collect();
        let max = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return if max.is_sign_negative() { 0.0 } else { 1.0 };
        }
        let sum: f64 = terms.iter().map(|t| (t - max).exp()).sum();
        let p = (max + sum.ln()).exp();

        debug!(
            "Genome: {}, class size: {}, list size: {}, observed: {}, p: {}",
            big_n, big_k, n, k, p
        );
        if p.is_nan() {
            1.0
        } else {
            p.clamp(0.0, 1.0)
        }
    }
}
