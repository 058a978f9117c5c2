//! Metric names emitted by the admission controller.

/// Admission decisions, one per consumed point.
///
/// Attributes: `tier`, `outcome` (`allowed`, `denied`, `failed_closed`) and `store`
/// (`primary`, `fallback`, `none`).
pub const ADMISSION_DECISIONS: &str = "turnstile.admission.decisions";

/// Infrastructure failures of a counter store. Attributes: `store`, `tier`.
pub const STORE_FAILURES: &str = "turnstile.store.failures";

/// Time to reach an admission decision in milliseconds. Attributes: `tier`, `outcome`.
pub const ADMISSION_DURATION: &str = "turnstile.admission.duration";
