// Tier 1: Independent Extractors
//
// Each module in this tier is an independent concept with one input and one
// output. The photo analyzer is the only one that calls out; note parsing and
// pattern detection are local and deterministic.

pub mod classifier;        // Classifier trait + deadline-enforcing call wrapper
pub mod http_classifier;   // Chat-completions client (rate limited)
pub mod response_decoder;  // Shared decode-and-repair routine for classifier output
pub mod photo_analyzer;    // Photo -> PhotoMetadata (concurrent fan-out)
pub mod note_parser;       // ObservationNote -> StructuredNote
pub mod pattern_detector;  // Numbered vs unnumbered strategy selection
