// Photo-to-Observation Assignment Pipeline
//
// 3-tier architecture:
// - Each tier consists of independent concepts with one well-defined purpose
// - Explicit data contracts between tiers (types.rs)
// - Run-scoped state travels in PipelineContext, never in globals

//! # Assignment Pipeline
//!
//! ## Tier 1: Extraction
//! - `photo_analyzer` - classifier metadata per photo (concurrent)
//! - `note_parser` - structured intent per note (local)
//! - `pattern_detector` - numbered vs unnumbered strategy (local)
//!
//! ## Tier 2: Matching
//! - `matcher` - direct or enhanced strategy with local fallbacks
//!
//! ## Tier 3: Validation & Repair
//! - `assignment_validator` - pure constraint checks
//! - `verifier` - independent external re-match, accepted only if it improves
//! - `fallback_repairer` - deterministic repair to a valid state
//!
//! ## Naming
//! - `photo_namer` - bounded-retry suggestion flow + unique slugs
//!
//! `orchestrator` sequences all of the above.

pub mod tier1;
pub mod tier2;
pub mod tier3;
pub mod context;
pub mod prompts;
pub mod slug;
pub mod photo_namer;
pub mod orchestrator;

// Shared types and data contracts between tiers
pub mod types;
