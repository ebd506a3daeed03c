//! Prompt rendering for the LLM oracle.

use std::fmt::Write;

use triage_core::{AssessmentRequest, CategoryNode};

const CATEGORIZATION_SYSTEM: &str = "You categorize incident reports submitted by members \
of the public. Reports may be short, informal or badly structured. Judge only against the \
categories you are given and return ONLY one valid JSON object.";

const VALIDATION_SYSTEM: &str = "You assess whether incident reports submitted by members of \
the public are truthful. Make your own independent judgment from the evidence supplied and \
return ONLY one valid JSON object.";

/// System and user prompt for one level of tree descent.
pub(crate) fn categorization_prompt(
    title: &str,
    description: &str,
    candidates: &[&CategoryNode],
) -> (String, String) {
    let mut user = String::new();
    let _ = writeln!(user, "Report:");
    let _ = writeln!(user, "- title: {}", title.trim());
    let _ = writeln!(user, "- description: {}", description.trim());
    let _ = writeln!(user);

    let _ = writeln!(user, "Candidate categories (id | name | description):");
    for node in candidates {
        let description = if node.description.trim().is_empty() {
            "-"
        } else {
            node.description.trim()
        };
        let _ = writeln!(user, "- {} | {} | {}", node.id, node.name, description);
    }
    let _ = writeln!(user);

    user.push_str("Guidelines:\n");
    user.push_str("1) Consider what kind of incident this is, who or what is affected, and how urgent it is.\n");
    user.push_str("2) Match on the primary nature of the incident, reading each category's name and description.\n");
    user.push_str("3) Several categories may apply; only select genuinely relevant ones.\n");
    user.push_str("4) Threats to life or violence take priority over property or service issues.\n");
    user.push_str("5) When it is unclear, prefer the broader category over a specific one.\n");
    user.push_str("6) Use only ids from the candidate list.\n");
    user.push('\n');
    user.push_str("Return a JSON object with shape:\n");
    user.push_str(r#"{"category_ids":[1,2]}"#);
    user.push_str("\nReturn an empty list when nothing applies. Return JSON only.\n");

    (CATEGORIZATION_SYSTEM.to_string(), user)
}

/// System and user prompt for predictive validation.
///
/// The deterministic `is_valid` verdict is deliberately left out.
pub(crate) fn validation_prompt(request: &AssessmentRequest) -> (String, String) {
    let signals = &request.signals;
    let metadata = &signals.metadata;
    let categories = if request.categories.is_empty() {
        "none".to_string()
    } else {
        request.categories.join(", ")
    };

    let mut user = String::new();
    let _ = writeln!(user, "Report:");
    let _ = writeln!(user, "- title: {}", request.title.trim());
    let _ = writeln!(user, "- summary: {}", request.summary.trim());
    let _ = writeln!(user, "- categories: {}", categories);
    let _ = writeln!(user);

    let _ = writeln!(user, "Reporter history:");
    let _ = writeln!(user, "- previous reports: {}", metadata.reporter_history_count);
    let _ = writeln!(
        user,
        "- rejected reports: {} (rejection rate {:.1}%)",
        metadata.rejected_reports_count,
        metadata.rejection_rate()
    );
    let _ = writeln!(
        user,
        "- account created: {}",
        metadata.reporter_join_date.as_deref().unwrap_or("unknown")
    );
    if metadata.is_new_reporter() {
        let _ = writeln!(
            user,
            "- note: this is a new reporter; an empty history is not a negative signal"
        );
    }
    let _ = writeln!(user);

    let _ = writeln!(user, "Trust indicators:");
    let _ = writeln!(user, "- trust score: {}/100", signals.trust_score);
    let _ = writeln!(
        user,
        "- device fingerprint match: {}",
        metadata.device_fingerprint_match
    );
    let _ = writeln!(
        user,
        "- average evidence distance: {}",
        metadata.average_evidence_distance
    );
    let _ = writeln!(
        user,
        "- report frequency score: {}/100",
        metadata.report_frequency_score
    );
    let _ = writeln!(user);

    let _ = writeln!(user, "Detected issues ({}):", signals.issues_count);
    if signals.issues.is_empty() {
        let _ = writeln!(user, "- none");
    }
    for issue in &signals.issues {
        let _ = writeln!(
            user,
            "- [{}] {}: {}",
            issue.level, issue.field, issue.message
        );
    }
    let _ = writeln!(user);

    let _ = writeln!(user, "Behavioural inferences ({}):", signals.inferences_count);
    if signals.inferences.is_empty() {
        let _ = writeln!(user, "- none");
    }
    for inference in &signals.inferences {
        let _ = writeln!(
            user,
            "- [{}] {}: {}",
            inference.level, inference.category, inference.observation
        );
    }
    let _ = writeln!(user);

    user.push_str("Status options:\n");
    user.push_str("- valid: plausible content from a trustworthy reporter\n");
    user.push_str("- suspicious: concerning patterns, not clearly false\n");
    user.push_str("- invalid: fabrication indicators present\n");
    user.push_str("- requires_review: conflicting signals or too little data\n");
    user.push('\n');
    user.push_str("Give concrete reasons and cite the inferences that support your decision.\n");
    user.push_str("Return a JSON object with shape:\n");
    user.push_str(
        r#"{"summary":"...","requires_human_review":true,"confidence_score":0,"final_validity_status":"requires_review","reasons":["..."],"supporting_inferences":["..."]}"#,
    );
    user.push_str("\nconfidence_score is between 0 and 100. Return JSON only.\n");

    (VALIDATION_SYSTEM.to_string(), user)
}
