//! Property-based tests for skill-set parsing and wire forms.
//!
//! Uses proptest to verify:
//! 1. Any skill set survives the text format → parse round-trip.
//! 2. Parsing arbitrary delimited text never panics and never produces
//!    empty or padded entries.
//! 3. JSON round-trips preserve set equality.
//! 4. `overlaps` is symmetric.

use proptest::prelude::*;
use taskhub_proto::skill::SkillSet;

/// Strategy for a skill set built from well-formed tags (no commas, no
/// outer spaces).
fn arb_skill_set() -> impl Strategy<Value = SkillSet> {
    prop::collection::vec("[a-z][a-z0-9_-]{0,15}", 0..8)
        .prop_map(|v| v.into_iter().collect::<SkillSet>())
}

proptest! {
    #[test]
    fn text_round_trip_preserves_set(set in arb_skill_set()) {
        let reparsed = SkillSet::parse_text(&set.to_text());
        prop_assert_eq!(reparsed, set);
    }

    #[test]
    fn parse_never_yields_empty_or_padded_entries(text in ".{0,128}") {
        let set = SkillSet::parse_text(&text);
        for skill in set.iter() {
            prop_assert!(!skill.is_empty());
            prop_assert_eq!(skill, skill.trim());
            prop_assert!(!skill.contains(','));
        }
    }

    #[test]
    fn json_round_trip_preserves_set(set in arb_skill_set()) {
        let json = serde_json::to_string(&set).map_err(|e| {
            TestCaseError::fail(format!("encode failed: {e}"))
        })?;
        let back: SkillSet = serde_json::from_str(&json).map_err(|e| {
            TestCaseError::fail(format!("decode failed: {e}"))
        })?;
        prop_assert_eq!(back, set);
    }

    #[test]
    fn overlaps_is_symmetric(a in arb_skill_set(), b in arb_skill_set()) {
        prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
    }
}
