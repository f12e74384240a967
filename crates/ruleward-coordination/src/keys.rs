//! Storage key layout.

use crate::constants::ACTIVE_IDS_KEY_PREFIX;
use crate::constants::FREE_IDS_KEY_PREFIX;
use crate::constants::HOST_INDEX_KEY_SUFFIX;
use crate::feature::Feature;

pub fn active_ids_key(feature: Feature) -> String {
    format!("{ACTIVE_IDS_KEY_PREFIX}{feature}")
}

pub fn free_ids_key(feature: Feature) -> String {
    format!("{FREE_IDS_KEY_PREFIX}{feature}")
}

pub fn host_index_key(feature: Feature) -> String {
    format!("{feature}{HOST_INDEX_KEY_SUFFIX}")
}
