use crate::models::{Claim, Quantifier, QuantifierOp, QuantifierType};

/// Check every quantifier on the search claim against the matched claim's
/// quantifiers with the same `(qtype, noun)`. A missing counterpart is
/// skipped, not failed: the presence of a quantifier on the matched document
/// is the real signal. One failed predicate rejects the whole pair.
pub fn validate_quantifiers(search_claim: &Claim, matched_quantifiers: &[Quantifier]) -> bool {
    if search_claim.quantifiers.is_empty() || matched_quantifiers.is_empty() {
        return true;
    }

    for search_q in &search_claim.quantifiers {
        let matched = matched_quantifiers
            .iter()
            .find(|mq| mq.qtype == search_q.qtype && mq.noun == search_q.noun);
        let Some(matched_q) = matched else {
            continue;
        };

        let is_valid = match search_q.op {
            QuantifierOp::Gte => matched_q.vmin >= search_q.vmin,
            QuantifierOp::Gt => matched_q.vmin > search_q.vmin,
            QuantifierOp::Lte => matched_q.vmax <= search_q.vmax,
            QuantifierOp::Lt => matched_q.vmax < search_q.vmax,
            QuantifierOp::Equals | QuantifierOp::Approx => {
                matched_q.vmin <= search_q.vmin && search_q.vmin <= matched_q.vmax
            }
            QuantifierOp::Range => !(matched_q.vmax < search_q.vmin || matched_q.vmin > search_q.vmax),
        };

        if !is_valid {
            tracing::info!(
                target: "search.quantifiers",
                noun = %search_q.noun,
                op = ?search_q.op,
                search_range = format!("{}-{}", search_q.vmin, search_q.vmax),
                matched_range = format!("{}-{}", matched_q.vmin, matched_q.vmax),
                "quantifier mismatch"
            );
            return false;
        }
    }

    true
}

/// Count-only variant used where non-count quantifiers should not gate.
pub fn validate_count_quantifiers(search_claim: &Claim, matched_quantifiers: &[Quantifier]) -> bool {
    let has_count = search_claim.quantifiers.iter().any(|q| q.qtype == QuantifierType::Count);
    if !has_count {
        return true;
    }
    validate_quantifiers(search_claim, matched_quantifiers)
}
