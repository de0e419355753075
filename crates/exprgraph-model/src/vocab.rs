//! Vocabulary indices shared with the trained model.
//!
//! The model was trained against fixed vocabularies of name subtokens,
//! type subtokens, and grammar productions. The indices here map strings
//! to the integer ids those vocabularies assigned; a lookup miss on a
//! subtoken falls back to the unknown token, a miss on a production is
//! an error since it means the grammar and the trained model disagree.

use exprgraph_core::{INSTANCE_TAIL, RETURN_VALUE_TAIL};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::marker::{self, is_special_token};
use crate::tensor::ModelError;

/// Splits an identifier into lowercase subtokens on underscores and
/// camelCase boundaries. Never returns an empty list: a literal that
/// yields no pieces comes back whole.
pub fn split_name_literal(literal: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut cur = String::new();
    let mut prev_lower = false;
    for ch in literal.chars() {
        if !ch.is_alphanumeric() {
            if !cur.is_empty() {
                parts.push(std::mem::take(&mut cur));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !cur.is_empty() {
            parts.push(std::mem::take(&mut cur));
        }
        cur.extend(ch.to_lowercase());
        prev_lower = ch.is_lowercase() || ch.is_numeric();
    }
    if !cur.is_empty() {
        parts.push(cur);
    }
    if parts.is_empty() {
        parts.push(literal.to_owned());
    }
    parts
}

/// Converts a type label into the subtokens fed to the model.
///
/// Special markers pass through unsplit. Instance and return-value
/// labels keep their flavor by folding the tail into the last real path
/// component (`requests.get.ret` becomes the subtokens of `get_ret`);
/// plain labels split their last component.
pub fn type_to_subtokens(label: &str) -> Vec<String> {
    if is_special_token(label) {
        return vec![label.to_owned()];
    }
    let parts: Vec<&str> = label.split('.').collect();
    let name = match parts.as_slice() {
        [.., pred, tail] if *tail == RETURN_VALUE_TAIL || *tail == INSTANCE_TAIL => {
            format!("{pred}_{tail}")
        }
        [.., last] => (*last).to_owned(),
        [] => label.to_owned(),
    };
    split_name_literal(&name)
}

/// Subtoken vocabulary with an unknown-token fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtokenIndex {
    ids: IndexMap<String, i64>,
    unknown: i64,
}

impl SubtokenIndex {
    /// Builds an index assigning sequential ids in iteration order. The
    /// unknown token is appended if the vocabulary does not carry it.
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        let mut ids = IndexMap::new();
        for tok in tokens {
            let next = ids.len() as i64;
            ids.entry(tok).or_insert(next);
        }
        let next = ids.len() as i64;
        let unknown = *ids.entry(marker::UNKNOWN_TOKEN.to_owned()).or_insert(next);
        SubtokenIndex { ids, unknown }
    }

    /// Id for the token, or the unknown id when out of vocabulary.
    pub fn index(&self, token: &str) -> i64 {
        self.ids.get(token).copied().unwrap_or(self.unknown)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.ids.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Production vocabulary for decoder targets.
///
/// Unlike subtokens there is no fallback: a missing production means
/// the decoder grammar references a target the model was never trained
/// on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionIndex {
    ids: IndexMap<String, i64>,
}

impl ProductionIndex {
    pub fn new(labels: impl IntoIterator<Item = String>) -> Self {
        let mut ids = IndexMap::new();
        for label in labels {
            let next = ids.len() as i64;
            ids.entry(label).or_insert(next);
        }
        ProductionIndex { ids }
    }

    pub fn index(&self, label: &str) -> Result<i64, ModelError> {
        self.ids
            .get(label)
            .copied()
            .ok_or_else(|| ModelError::UnknownProduction {
                label: label.to_owned(),
            })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// The vocabulary bundle describing one trained model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub name_subtokens: SubtokenIndex,
    pub type_subtokens: SubtokenIndex,
    pub productions: ProductionIndex,
}
