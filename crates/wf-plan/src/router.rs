//! Profile routing — map each intent to one of the seven agent roles.
//!
//! Rule-based, evaluated in declared priority order, first match wins. Tag
//! matching is case-insensitive and hyphen-splitting: `"root-cause"`
//! matches both as a unit and as its parts.

use std::collections::HashSet;

use wf_core::types::{Complexity, Intent, Profile};

const REVIEW_KEYWORDS: &[&str] = &["verify", "review"];
const BUG_KEYWORDS: &[&str] = &["reproduce", "diagnose", "fix", "hotfix", "root-cause"];
const TEST_KEYWORDS: &[&str] = &["test", "testing", "unit", "integration", "regression"];
const HEAVY_TEST_KEYWORDS: &[&str] = &["test", "testing", "integration", "regression"];
const DOCS_KEYWORDS: &[&str] = &["docs", "document", "api-docs", "user-guide"];
const PLANNING_KEYWORDS: &[&str] = &["analysis", "analyze", "requirements", "research", "design"];

/// Route an intent to a profile from its tags and complexity.
///
/// Pure and side-effect-free: equal inputs always produce equal outputs.
pub fn route(intent: &Intent) -> Profile {
    let tokens = tag_tokens(intent);
    let matches = |keywords: &[&str]| keywords.iter().any(|k| tokens.contains(*k));

    if matches(REVIEW_KEYWORDS) {
        return Profile::Reviewer;
    }
    if matches(BUG_KEYWORDS) {
        return Profile::BugInvestigator;
    }
    if matches(TEST_KEYWORDS)
        && matches!(intent.complexity, Complexity::Trivial | Complexity::Simple)
    {
        return Profile::UnitTester;
    }
    if matches(HEAVY_TEST_KEYWORDS) {
        return Profile::TestEngineer;
    }
    if matches(DOCS_KEYWORDS) {
        return Profile::DocWriter;
    }
    if matches(PLANNING_KEYWORDS) || intent.complexity == Complexity::Epic {
        return Profile::Planner;
    }
    Profile::Implementer
}

/// Lowercased tag tokens: each tag whole, plus its hyphen-split parts. The
/// stage label participates like a tag.
fn tag_tokens(intent: &Intent) -> HashSet<String> {
    let mut tokens = HashSet::new();
    let tags = intent
        .tags
        .iter()
        .map(String::as_str)
        .chain(intent.stage.as_deref());
    for tag in tags {
        let lower = tag.to_ascii_lowercase();
        for part in lower.split('-') {
            if !part.is_empty() {
                tokens.insert(part.to_owned());
            }
        }
        tokens.insert(lower);
    }
    tokens
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(tags: &[&str], complexity: Complexity) -> Intent {
        Intent::new("t", complexity).with_tags(tags.iter().copied())
    }

    #[test]
    fn verify_and_review_route_to_reviewer() {
        assert_eq!(route(&tagged(&["verify"], Complexity::Simple)), Profile::Reviewer);
        assert_eq!(route(&tagged(&["review"], Complexity::Epic)), Profile::Reviewer);
    }

    #[test]
    fn bug_keywords_route_to_investigator() {
        for tag in ["reproduce", "diagnose", "fix", "hotfix", "root-cause"] {
            assert_eq!(
                route(&tagged(&[tag], Complexity::Moderate)),
                Profile::BugInvestigator,
                "tag {tag}"
            );
        }
    }

    #[test]
    fn hyphenated_tags_match_parts() {
        // "root-cause" inside a longer compound tag still matches via the
        // split tokens.
        assert_eq!(
            route(&tagged(&["fix-regression"], Complexity::Moderate)),
            Profile::BugInvestigator
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(
            route(&tagged(&["VERIFY"], Complexity::Simple)),
            Profile::Reviewer
        );
        assert_eq!(
            route(&tagged(&["Unit-Test"], Complexity::Trivial)),
            Profile::UnitTester
        );
    }

    #[test]
    fn test_tags_split_by_complexity() {
        assert_eq!(
            route(&tagged(&["unit"], Complexity::Trivial)),
            Profile::UnitTester
        );
        assert_eq!(
            route(&tagged(&["testing"], Complexity::Simple)),
            Profile::UnitTester
        );
        assert_eq!(
            route(&tagged(&["integration"], Complexity::Complex)),
            Profile::TestEngineer
        );
        // "unit" alone does not promote to test-engineer at high tiers.
        assert_eq!(
            route(&tagged(&["unit"], Complexity::Complex)),
            Profile::Implementer
        );
    }

    #[test]
    fn docs_keywords_route_to_doc_writer() {
        for tag in ["docs", "document", "api-docs", "user-guide"] {
            assert_eq!(
                route(&tagged(&[tag], Complexity::Simple)),
                Profile::DocWriter,
                "tag {tag}"
            );
        }
    }

    #[test]
    fn planning_keywords_and_epics_route_to_planner() {
        assert_eq!(
            route(&tagged(&["requirements"], Complexity::Moderate)),
            Profile::Planner
        );
        assert_eq!(route(&tagged(&[], Complexity::Epic)), Profile::Planner);
    }

    #[test]
    fn untagged_work_defaults_to_implementer() {
        assert_eq!(
            route(&tagged(&["backend", "session"], Complexity::Moderate)),
            Profile::Implementer
        );
        assert_eq!(route(&tagged(&[], Complexity::Trivial)), Profile::Implementer);
    }

    #[test]
    fn priority_order_first_match_wins() {
        // Review beats bug, bug beats test, test beats docs.
        assert_eq!(
            route(&tagged(&["fix", "verify"], Complexity::Moderate)),
            Profile::Reviewer
        );
        assert_eq!(
            route(&tagged(&["fix", "testing"], Complexity::Moderate)),
            Profile::BugInvestigator
        );
        assert_eq!(
            route(&tagged(&["testing", "docs"], Complexity::Complex)),
            Profile::TestEngineer
        );
    }

    #[test]
    fn stage_label_participates_in_matching() {
        let intent = Intent::new("t", Complexity::Moderate).with_stage("integration-testing");
        assert_eq!(route(&intent), Profile::TestEngineer);
    }

    #[test]
    fn router_is_pure() {
        let intent = tagged(&["design", "backend"], Complexity::Complex);
        assert_eq!(route(&intent), route(&intent));
    }
}
