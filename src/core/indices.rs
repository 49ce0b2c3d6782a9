use hashbrown::HashMap;

use crate::types::CardId;

/// Insertion-ordered multi-map from an index key to card ids.
pub type VecIndex<K> = HashMap<K, Vec<CardId>>;
