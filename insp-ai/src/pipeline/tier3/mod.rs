// Tier 3: Validation, Verification & Repair
//
// The validator is pure and shared; the verifier may replace the assignment
// wholesale; the fallback repairer patches what is left so the final map
// always satisfies coverage.

pub mod assignment_validator; // Pure constraint checker
pub mod verifier;             // External re-match, accepted only if it improves
pub mod fallback_repairer;    // Deterministic local repair
