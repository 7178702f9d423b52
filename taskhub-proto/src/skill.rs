//! Skill sets for entities and tasks.
//!
//! The legacy data format stored skills as comma-delimited text. That form
//! is still accepted at the boundary via [`SkillSet::parse_text`], but
//! internally a skill set is a true unordered set: no duplicates, no empty
//! entries, insertion-order-independent equality. On the JSON wire a skill
//! set is an array of strings.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// An unordered set of skill tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillSet(BTreeSet<String>);

impl SkillSet {
    /// Creates an empty skill set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Parses a skill set from comma-delimited text.
    ///
    /// Entries are trimmed; empty entries (from doubled or trailing commas)
    /// are dropped. `parse_text("")` yields the empty set.
    #[must_use]
    pub fn parse_text(text: &str) -> Self {
        Self(
            text.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    /// Formats the set back into comma-delimited text (sorted, no spaces).
    #[must_use]
    pub fn to_text(&self) -> String {
        self.0.iter().cloned().collect::<Vec<_>>().join(",")
    }

    /// Returns `true` if the set holds no skills.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct skills.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the given skill is present.
    #[must_use]
    pub fn contains(&self, skill: &str) -> bool {
        self.0.contains(skill)
    }

    /// Adds a skill, returning `true` if it was not already present.
    pub fn insert(&mut self, skill: impl Into<String>) -> bool {
        self.0.insert(skill.into())
    }

    /// Returns `true` if the two sets share at least one skill.
    ///
    /// This is the partial-match rule used for task eligibility: any
    /// overlap suffices, a subset relationship is not required.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.0.intersection(&other.0).next().is_some()
    }

    /// Iterates the skills in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl FromIterator<String> for SkillSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for SkillSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().map(String::from).collect())
    }
}

impl std::fmt::Display for SkillSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_text())
    }
}
