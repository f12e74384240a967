//! Static mapping from features to disjoint rule ID ranges.

use std::collections::BTreeMap;

use ruleward_rules::Rule;
use ruleward_rules::RuleId;
use serde::Deserialize;
use serde::Serialize;

use crate::error::RuleIdError;
use crate::feature::Feature;

/// Inclusive range of rule IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdRange {
    pub start: RuleId,
    pub end: RuleId,
}

impl IdRange {
    pub const fn new(start: RuleId, end: RuleId) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn contains(&self, id: RuleId) -> bool {
        self.start <= id && id <= self.end
    }

    /// Number of IDs in the range. Zero if `start > end`.
    pub fn len(&self) -> usize {
        if self.start > self.end {
            return 0;
        }
        (self.end - self.start) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &IdRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// One registry row, as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeEntry {
    pub feature: Feature,
    pub start: RuleId,
    pub end: RuleId,
}

impl RangeEntry {
    pub const fn new(feature: Feature, start: RuleId, end: RuleId) -> Self {
        Self { feature, start, end }
    }

    pub fn range(&self) -> IdRange {
        IdRange::new(self.start, self.end)
    }
}

/// Built-in ranges. Rules installed by earlier versions may sit below 10000.
pub const DEFAULT_RANGES: [RangeEntry; 3] = [
    RangeEntry::new(Feature::Lockout, 10_000, 19_999),
    RangeEntry::new(Feature::WordBlocker, 20_000, 29_999),
    RangeEntry::new(Feature::Debug, 30_000, 39_999),
];

/// Validated set of feature ranges.
///
/// Every range satisfies `1 <= start <= end` and no two ranges overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRegistry {
    entries: Vec<RangeEntry>,
}

impl Default for RangeRegistry {
    fn default() -> Self {
        Self {
            entries: DEFAULT_RANGES.to_vec(),
        }
    }
}

impl RangeRegistry {
    /// Validate and build a registry. Entries are kept sorted by start.
    pub fn new(mut entries: Vec<RangeEntry>) -> Result<Self, RuleIdError> {
        for entry in &entries {
            if entry.start == 0 || entry.start > entry.end {
                return Err(RuleIdError::InvalidRange {
                    feature: entry.feature,
                    start: entry.start,
                    end: entry.end,
                });
            }
        }

        for (i, a) in entries.iter().enumerate() {
            for b in &entries[i + 1..] {
                if a.feature == b.feature {
                    return Err(RuleIdError::DuplicateFeature { feature: a.feature });
                }
                if a.range().overlaps(&b.range()) {
                    return Err(RuleIdError::OverlappingRanges {
                        first: a.feature,
                        second: b.feature,
                    });
                }
            }
        }

        entries.sort_by_key(|entry| entry.start);
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[RangeEntry] {
        &self.entries
    }

    pub fn features(&self) -> impl Iterator<Item = Feature> + '_ {
        self.entries.iter().map(|entry| entry.feature)
    }

    /// The range reserved for `feature`.
    pub fn range_for(&self, feature: Feature) -> Result<IdRange, RuleIdError> {
        self.entries
            .iter()
            .find(|entry| entry.feature == feature)
            .map(RangeEntry::range)
            .ok_or_else(|| RuleIdError::UnknownFeature {
                name: feature.to_string(),
            })
    }

    /// The feature whose range contains `id`.
    pub fn feature_for(&self, id: RuleId) -> Option<Feature> {
        self.entries.iter().find(|entry| entry.range().contains(id)).map(|entry| entry.feature)
    }

    /// True when `feature` claims `rule`.
    ///
    /// A fingerprinted rule belongs to the feature its fingerprint names,
    /// wherever its ID sits. Any other rule belongs to the feature whose range
    /// holds its ID.
    pub fn owns(&self, feature: Feature, rule: &Rule) -> bool {
        match Feature::from_fingerprint(rule) {
            Some(owner) => owner == feature,
            None => self.range_for(feature).is_ok_and(|range| range.contains(rule.id)),
        }
    }

    /// Split `ids` by owning feature. IDs outside every range are returned separately.
    pub fn group_by_feature(&self, ids: &[RuleId]) -> (BTreeMap<Feature, Vec<RuleId>>, Vec<RuleId>) {
        let mut groups: BTreeMap<Feature, Vec<RuleId>> = BTreeMap::new();
        let mut unowned = Vec::new();
        for &id in ids {
            match self.feature_for(id) {
                Some(feature) => groups.entry(feature).or_default().push(id),
                None => unowned.push(id),
            }
        }
        (groups, unowned)
    }
}
