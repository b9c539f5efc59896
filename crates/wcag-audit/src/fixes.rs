//! Versioned remediation text keyed by issue title.
//!
//! A [`FixCatalog`] is a read-through cache over a [`FixSource`]. Each
//! `(version, level)` table is loaded at most once per process and is
//! read-only afterwards. Lookups are case-insensitive and total: unknown
//! titles resolve to an empty string.

use crate::level::ConformanceLevel;
use crate::result::{AuditError, AuditResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Remediation entry for one issue title
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FixEntry {
    /// Issue title
    pub title: String,
    /// Topic grouping
    pub topic: String,
    /// Success criterion the fix belongs to
    pub guideline: String,
    /// Remediation text
    pub fix: String,
}

/// Fix data for one `(version, level)` pair, as stored on disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixDocument {
    /// WCAG version, e.g. "2.0"
    pub wcag_version: String,
    /// Level label
    pub level: String,
    /// Entries keyed by issue title
    #[serde(default)]
    pub data: BTreeMap<String, FixEntry>,
}

impl FixDocument {
    /// Parse a fix document from JSON
    pub fn from_json(text: &str) -> AuditResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Backing store for the catalog
#[async_trait]
pub trait FixSource: Send + Sync {
    /// Load fixes for one pair; `None` when the store has no data for it
    async fn load_fixes(
        &self,
        version: &str,
        level: ConformanceLevel,
    ) -> AuditResult<Option<FixDocument>>;
}

/// Normalise an issue title into a lookup key.
///
/// Trims, drops a single trailing period and lowercases.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    let trimmed = title.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed).trim_end();
    trimmed.to_lowercase()
}

/// Immutable normalised-title lookup table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixTable {
    entries: HashMap<String, String>,
}

impl FixTable {
    /// Empty table; every title resolves to ""
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from a fix document
    #[must_use]
    pub fn from_document(document: &FixDocument) -> Self {
        let entries = document
            .data
            .iter()
            .map(|(key, entry)| (normalize_title(key), entry.fix.clone()))
            .collect();
        Self { entries }
    }

    /// Build from `(title, fix)` pairs
    #[must_use]
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let entries = pairs
            .into_iter()
            .map(|(title, fix)| (normalize_title(title), fix.to_string()))
            .collect();
        Self { entries }
    }

    /// Remediation text for `title`, or "" when unknown
    #[must_use]
    pub fn resolve(&self, title: &str) -> &str {
        self.entries
            .get(&normalize_title(title))
            .map_or("", String::as_str)
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Tables for every level composed into an audit level
#[derive(Debug, Clone, Default)]
pub struct FixLookup {
    tables: BTreeMap<ConformanceLevel, Arc<FixTable>>,
}

impl FixLookup {
    /// Lookup with explicit tables
    #[must_use]
    pub fn from_tables(tables: impl IntoIterator<Item = (ConformanceLevel, FixTable)>) -> Self {
        Self {
            tables: tables.into_iter().map(|(l, t)| (l, Arc::new(t))).collect(),
        }
    }

    /// Remediation for an issue raised by a rule of `level`
    #[must_use]
    pub fn resolve(&self, level: ConformanceLevel, title: &str) -> &str {
        self.tables.get(&level).map_or("", |table| table.resolve(title))
    }
}

type CacheKey = (String, ConformanceLevel);

/// Read-through cache of fix tables
pub struct FixCatalog {
    source: Arc<dyn FixSource>,
    tables: Mutex<HashMap<CacheKey, Arc<OnceCell<Arc<FixTable>>>>>,
}

impl fmt::Debug for FixCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixCatalog")
            .field("cached", &self.cached_len())
            .finish_non_exhaustive()
    }
}

impl FixCatalog {
    /// Catalog over any source
    #[must_use]
    pub fn new(source: Arc<dyn FixSource>) -> Self {
        Self {
            source,
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Catalog over the fix data compiled into this crate
    #[must_use]
    pub fn bundled() -> Self {
        Self::new(Arc::new(BundledFixSource))
    }

    /// Number of pairs loaded so far
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    /// Table for one pair, loading it on first use.
    ///
    /// A failed or empty load yields an empty table; failures are not
    /// cached, so a later call retries.
    pub async fn table(&self, version: &str, level: ConformanceLevel) -> Arc<FixTable> {
        let version = version.trim().to_string();
        let cell = {
            let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(tables.entry((version.clone(), level)).or_default())
        };

        let loaded = cell
            .get_or_try_init(|| async {
                let document = self.source.load_fixes(&version, level).await?;
                let table = document.map_or_else(FixTable::empty, |d| FixTable::from_document(&d));
                debug!(version = %version, level = %level, entries = table.len(), "fix table loaded");
                Ok::<_, AuditError>(Arc::new(table))
            })
            .await;

        match loaded {
            Ok(table) => Arc::clone(table),
            Err(err) => {
                warn!(version = %version, level = %level, error = %err, "fix data unavailable, remediation left empty");
                Arc::new(FixTable::empty())
            }
        }
    }

    /// Remediation for `title`; "" when unknown
    pub async fn resolve(&self, version: &str, level: ConformanceLevel, title: &str) -> String {
        self.table(version, level).await.resolve(title).to_string()
    }

    /// Tables for every level composed into `level`
    pub async fn lookup(&self, version: &str, level: ConformanceLevel) -> FixLookup {
        let mut tables = BTreeMap::new();
        for composed in level.composed() {
            tables.insert(composed, self.table(version, composed).await);
        }
        FixLookup { tables }
    }
}

/// In-memory fix source
#[derive(Debug, Clone, Default)]
pub struct StaticFixSource {
    documents: HashMap<CacheKey, FixDocument>,
}

impl StaticFixSource {
    /// Empty source
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document for a pair
    #[must_use]
    pub fn with_document(
        mut self,
        version: &str,
        level: ConformanceLevel,
        document: FixDocument,
    ) -> Self {
        self.documents.insert((version.to_string(), level), document);
        self
    }

    /// Add `(title, fix)` pairs for a pair
    #[must_use]
    pub fn with_fixes(self, version: &str, level: ConformanceLevel, fixes: &[(&str, &str)]) -> Self {
        let data = fixes
            .iter()
            .map(|(title, fix)| {
                (
                    (*title).to_string(),
                    FixEntry {
                        title: (*title).to_string(),
                        fix: (*fix).to_string(),
                        ..FixEntry::default()
                    },
                )
            })
            .collect();
        let document = FixDocument {
            wcag_version: version.to_string(),
            level: level.to_string(),
            data,
        };
        self.with_document(version, level, document)
    }
}

#[async_trait]
impl FixSource for StaticFixSource {
    async fn load_fixes(
        &self,
        version: &str,
        level: ConformanceLevel,
    ) -> AuditResult<Option<FixDocument>> {
        Ok(self.documents.get(&(version.to_string(), level)).cloned())
    }
}

/// File name of the fix document for a pair
#[must_use]
pub fn fix_file_name(version: &str, level: ConformanceLevel) -> String {
    format!("wcag-{version}-{}.json", level.as_str().to_ascii_lowercase())
}

/// Fix documents stored as JSON files in a directory
#[derive(Debug, Clone)]
pub struct JsonFixSource {
    dir: PathBuf,
}

impl JsonFixSource {
    /// Source reading `wcag-<version>-<level>.json` files from `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl FixSource for JsonFixSource {
    async fn load_fixes(
        &self,
        version: &str,
        level: ConformanceLevel,
    ) -> AuditResult<Option<FixDocument>> {
        let path = self.dir.join(fix_file_name(version, level));
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => FixDocument::from_json(&text).map(Some).map_err(|e| AuditError::FixSource {
                message: format!("{}: {e}", path.display()),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Fix data compiled into the crate
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledFixSource;

const BUNDLED: &[(&str, ConformanceLevel, &str)] = &[
    ("2.0", ConformanceLevel::A, include_str!("../fixes/wcag-2.0-a.json")),
    ("2.0", ConformanceLevel::AA, include_str!("../fixes/wcag-2.0-aa.json")),
    ("2.0", ConformanceLevel::AAA, include_str!("../fixes/wcag-2.0-aaa.json")),
];

#[async_trait]
impl FixSource for BundledFixSource {
    async fn load_fixes(
        &self,
        version: &str,
        level: ConformanceLevel,
    ) -> AuditResult<Option<FixDocument>> {
        BUNDLED
            .iter()
            .find(|(v, l, _)| *v == version && *l == level)
            .map(|(_, _, text)| FixDocument::from_json(text))
            .transpose()
    }
}
