// Tier 3: Verifier
//
// Concept: Independent external re-check of a flawed assignment.
//
// Algorithm:
// 1. Skip unless the validator reported errors or warnings
// 2. Send full context + current assignment + findings (one call, 180s)
// 3. Validate the proposal
// 4. Accept iff it is valid or has strictly fewer errors; otherwise keep
//    the current assignment unchanged
//
// Transport, timeout and decode failures keep the current assignment.

use crate::pipeline::context::PipelineContext;
use crate::pipeline::prompts;
use crate::pipeline::tier1::classifier::call_with_timeout;
use crate::pipeline::tier1::response_decoder::decode;
use crate::pipeline::tier2::raw_assignment::{complete_map, parse_entries, RawAssignment};
use crate::pipeline::tier3::assignment_validator::AssignmentValidator;
use crate::pipeline::types::{
    AssignmentMap, CallPurpose, ClassifierRequest, StageError, ValidationReport, VerifierOutcome,
};
use serde::Deserialize;

/// Confidence assumed for corrected entries without one
const CORRECTION_DEFAULT_CONFIDENCE: f64 = 0.75;

/// Verifier response, wrapped or bare
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawVerification {
    Wrapped {
        #[serde(alias = "corrected_assignments", alias = "assignments", rename = "correctedAssignments")]
        corrected_assignments: Vec<RawAssignment>,
        #[serde(alias = "fixes_applied", alias = "fixes", rename = "fixesApplied", default)]
        fixes_applied: Vec<String>,
    },
    List(Vec<RawAssignment>),
}

/// Proposal decoded from the verifier call
struct Proposal {
    assignments: AssignmentMap,
    fixes_applied: Vec<String>,
}

/// Result of a verification pass
#[derive(Debug, Clone)]
pub struct Verification {
    /// Accepted correction, or the input unchanged
    pub assignments: AssignmentMap,
    /// Report for `assignments`
    pub report: ValidationReport,
    pub outcome: VerifierOutcome,
}

pub struct Verifier {
    validator: AssignmentValidator,
}

impl Verifier {
    pub fn new(validator: AssignmentValidator) -> Self {
        Self { validator }
    }

    pub async fn verify(
        &self,
        context: &PipelineContext,
        assignments: AssignmentMap,
        report: ValidationReport,
    ) -> Verification {
        if !report.needs_verification() {
            return Verification {
                assignments,
                report,
                outcome: VerifierOutcome::NotNeeded,
            };
        }

        let errors_before = report.error_count();
        tracing::info!(
            run_id = %context.run_id,
            errors = errors_before,
            warnings = report.warnings.len(),
            "Verifying assignments"
        );

        let proposal = match self.request(context, &assignments, &report).await {
            Ok(proposal) => proposal,
            Err(e) => {
                tracing::warn!(error = %e, "Verification call failed, keeping current assignments");
                return Verification {
                    assignments,
                    report,
                    outcome: VerifierOutcome::Failed {
                        error: e.to_string(),
                    },
                };
            }
        };

        let proposed_report =
            self.validator
                .validate(&proposal.assignments, context.photo_count(), context.note_count());
        let errors_after = proposed_report.error_count();

        if proposed_report.valid || errors_after < errors_before {
            tracing::info!(
                errors_before,
                errors_after,
                fixes = proposal.fixes_applied.len(),
                "Verifier correction accepted"
            );
            Verification {
                assignments: proposal.assignments,
                report: proposed_report,
                outcome: VerifierOutcome::Accepted {
                    errors_before,
                    errors_after,
                    fixes_applied: proposal.fixes_applied,
                },
            }
        } else {
            tracing::warn!(
                errors_before,
                errors_after,
                "Verifier correction did not improve constraints, rejected"
            );
            Verification {
                assignments,
                report,
                outcome: VerifierOutcome::Rejected {
                    errors_before,
                    errors_after,
                },
            }
        }
    }

    async fn request(
        &self,
        context: &PipelineContext,
        assignments: &AssignmentMap,
        report: &ValidationReport,
    ) -> Result<Proposal, StageError> {
        let request = ClassifierRequest::text(
            CallPurpose::VerifyAssignments,
            prompts::verify_assignments(context, assignments, report),
            context.timeouts.verify(),
        );
        let text = call_with_timeout(context.classifier.as_ref(), request).await?;

        let (raw, fixes_applied) = match decode::<RawVerification>(&text)? {
            RawVerification::Wrapped {
                corrected_assignments,
                fixes_applied,
            } => (corrected_assignments, fixes_applied),
            RawVerification::List(items) => (items, Vec::new()),
        };

        let entries = parse_entries(&raw, context, CORRECTION_DEFAULT_CONFIDENCE);
        Ok(Proposal {
            assignments: complete_map(entries, context),
            fixes_applied,
        })
    }
}
