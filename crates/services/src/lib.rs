//! Local services for the companion: crisis screening and on-device storage.

pub mod crisis;
pub mod store;

pub use crisis::{detect_crisis, normalize, scan, CrisisScan, CRISIS_KEYWORDS};
pub use store::CompanionStore;
