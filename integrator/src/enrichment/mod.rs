pub mod engine;
pub mod kinds;
pub mod result;

pub use engine::{EnrichmentEngine, EnrichmentInput, EnrichmentOptions};
pub use kinds::EnrichmentKind;
pub use result::{ClassMember, EnrichmentResult, EnrichmentRow};
