pub mod pairing;
pub mod store;
pub mod target;
pub mod targets;

pub use pairing::{MirnaMrnaPairing, PairedRelation, PairedRow};
pub use target::{unique_targets, MirnaTarget};
pub use targets::{format_mirna, link_mirna_and_targets, MirnaTargets};
