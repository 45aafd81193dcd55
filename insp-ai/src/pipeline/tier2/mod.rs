// Tier 2: Matching
//
// Combines Tier 1 outputs (photo metadata, structured notes, strategy) into a
// note -> photos assignment. The result may violate coverage constraints;
// Tier 3 checks and repairs it.

pub mod matcher;        // Direct + enhanced strategies, round-robin fallback
pub mod raw_assignment; // Lenient classifier assignment payloads
