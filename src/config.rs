//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::{
    commit::id::CommitIdScheme,
    diff::{DiffOptions, ListCompareAlgorithm},
};

/// Immutable engine settings, fixed when a [`crate::log::CdoLog`] is built.
///
/// Every field has a default, so partial JSON documents are accepted:
///
/// ```
/// use cdolog::{config::CoreConfig, diff::ListCompareAlgorithm};
///
/// let config = CoreConfig::from_json_str(r#"{"list_compare_algorithm":"levenshtein_distance"}"#)
///     .expect("valid config");
/// assert_eq!(config.list_compare_algorithm, ListCompareAlgorithm::LevenshteinDistance);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// List alignment strategy.
    pub list_compare_algorithm: ListCompareAlgorithm,
    /// Commit id allocation scheme.
    pub commit_id_generator: CommitIdScheme,
    /// Report every property of a new object as a change from null.
    pub initial_changes: bool,
    /// Report every property of a removed object as a change to null.
    pub terminal_changes: bool,
    /// Log persisted diffs in their multi-line form.
    pub pretty_print: bool,
}

impl CoreConfig {
    /// Parses a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Diff engine options derived from this configuration.
    pub fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            list_algorithm: self.list_compare_algorithm,
            initial_changes: self.initial_changes,
            terminal_changes: self.terminal_changes,
        }
    }
}
