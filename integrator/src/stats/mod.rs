pub mod correction;
pub mod hypergeometric;

pub use correction::{
    adjust_keyed, BenjaminiHochberg, Bonferroni, BonferroniHolm, Correction, CorrectionMethod,
    NoCorrection,
};
pub use hypergeometric::HypergeometricTest;

/// Scores one class given the genome and list size fixed for a run.
pub trait EnrichmentPvalue {
    fn genome_size(&self) -> usize;
    fn list_size(&self) -> usize;
    /// P-value of observing `observed` or more list members in a class of
    /// `class_size` genes.
    fn p_value(&self, class_size: usize, observed: usize) -> f64;
}
