use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::archive;
use crate::core::DedupRule;
use crate::store::DEFAULT_OWNER_NAME;

/// Filesystem layout used by the coordinator.
pub trait StoragePaths {
    /// Directory scanned by [`Importer::run_inbox`](super::Importer::run_inbox).
    fn inbox_path(&self) -> &Path;

    /// Root of the year-partitioned archive.
    fn archive_base_path(&self) -> &Path;

    /// `<archive_base>/<year>`.
    fn archive_path_for_year(&self, year: i32) -> PathBuf {
        self.archive_base_path().join(year.to_string())
    }

    /// `<storage_base>/<year>`, where uploads are copied; `None` disables
    /// the copy.
    fn storage_path_for_year(&self, year: i32) -> Option<PathBuf>;

    /// A name for `file_name` that does not exist yet in `dir`.
    fn unique_file_name(&self, dir: &Path, file_name: &str) -> String {
        archive::unique_file_name(dir, file_name)
    }
}

/// Import configuration.
///
/// Deserializable with every field optional:
///
/// ```
/// use fattura::import::ImportConfig;
///
/// let cfg: ImportConfig = serde_json::from_str(r#"{"source_label": "pec"}"#).unwrap();
/// assert_eq!(cfg.source_label, "pec");
/// assert_eq!(cfg.default_owner_name, "Azienda");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub inbox: PathBuf,
    pub archive_base: PathBuf,
    pub storage_base: Option<PathBuf>,
    /// Recorded on documents, attempts and the batch summary.
    pub source_label: String,
    pub dedup_order: Vec<DedupRule>,
    pub default_owner_name: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            inbox: PathBuf::from("inbox"),
            archive_base: PathBuf::from("archive"),
            storage_base: None,
            source_label: "inbox".into(),
            dedup_order: DedupRule::DEFAULT_ORDER.to_vec(),
            default_owner_name: DEFAULT_OWNER_NAME.into(),
        }
    }
}

impl ImportConfig {
    pub fn new(inbox: impl Into<PathBuf>, archive_base: impl Into<PathBuf>) -> Self {
        Self {
            inbox: inbox.into(),
            archive_base: archive_base.into(),
            ..Default::default()
        }
    }

    /// Defaults overridden by `FATTURA_INBOX`, `FATTURA_ARCHIVE`,
    /// `FATTURA_STORAGE` and `FATTURA_SOURCE`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();
        if let Some(v) = get("FATTURA_INBOX") {
            cfg.inbox = v.into();
        }
        if let Some(v) = get("FATTURA_ARCHIVE") {
            cfg.archive_base = v.into();
        }
        if let Some(v) = get("FATTURA_STORAGE") {
            cfg.storage_base = Some(v.into());
        }
        if let Some(v) = get("FATTURA_SOURCE") {
            cfg.source_label = v;
        }
        cfg
    }

    pub fn storage_base(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_base = Some(path.into());
        self
    }

    pub fn source_label(mut self, label: impl Into<String>) -> Self {
        self.source_label = label.into();
        self
    }

    pub fn dedup_order(mut self, order: impl Into<Vec<DedupRule>>) -> Self {
        self.dedup_order = order.into();
        self
    }

    pub fn default_owner_name(mut self, name: impl Into<String>) -> Self {
        self.default_owner_name = name.into();
        self
    }
}

impl StoragePaths for ImportConfig {
    fn inbox_path(&self) -> &Path {
        &self.inbox
    }

    fn archive_base_path(&self) -> &Path {
        &self.archive_base
    }

    fn storage_path_for_year(&self, year: i32) -> Option<PathBuf> {
        self.storage_base.as_ref().map(|b| b.join(year.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("FATTURA_INBOX", "/srv/in"),
            ("FATTURA_STORAGE", "/srv/docs"),
            ("FATTURA_SOURCE", "  "),
        ]
        .into_iter()
        .collect();
        let cfg = ImportConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.inbox, PathBuf::from("/srv/in"));
        assert_eq!(cfg.archive_base, PathBuf::from("archive"));
        assert_eq!(cfg.storage_path_for_year(2024), Some(PathBuf::from("/srv/docs/2024")));
        // blank values are ignored
        assert_eq!(cfg.source_label, "inbox");
    }

    #[test]
    fn archive_path_is_year_partitioned() {
        let cfg = ImportConfig::new("in", "/arch");
        assert_eq!(cfg.archive_path_for_year(2023), PathBuf::from("/arch/2023"));
        assert_eq!(cfg.storage_path_for_year(2023), None);
    }

    #[test]
    fn builder_setters() {
        let cfg = ImportConfig::new("in", "out")
            .source_label("pec")
            .dedup_order(vec![DedupRule::ContentHash])
            .default_owner_name("Acme SPA");
        assert_eq!(cfg.source_label, "pec");
        assert_eq!(cfg.dedup_order, vec![DedupRule::ContentHash]);
        assert_eq!(cfg.default_owner_name, "Acme SPA");
    }
}
