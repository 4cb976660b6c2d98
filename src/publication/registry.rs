//! Publication definitions and registry
//!
//! A publication names the tables (and optionally rows and columns)
//! eligible for replication. Publications are created administratively,
//! persisted as one JSON document each under `<data_dir>/publications/`,
//! and immutable afterwards; slots reference them by name and never own
//! them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use super::errors::{PublicationError, PublicationResult};
use super::filter::RowFilter;

/// Which tables a publication selects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableSelector {
    /// Every table
    AllTables,
    /// An explicit table set
    Tables {
        /// Selected table names
        tables: BTreeSet<String>,
    },
}

impl TableSelector {
    /// True if `table` is selected.
    pub fn selects(&self, table: &str) -> bool {
        match self {
            TableSelector::AllTables => true,
            TableSelector::Tables { tables } => tables.contains(table),
        }
    }
}

/// A named selection of tables, rows, and columns eligible for replication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    /// Publication name
    pub name: String,
    /// Table selection
    pub selector: TableSelector,
    /// Per-table row filters; a change must satisfy every filter listed
    /// for its table
    #[serde(default)]
    pub row_filters: BTreeMap<String, Vec<RowFilter>>,
    /// Per-table column projections applied to row images
    #[serde(default)]
    pub column_projections: BTreeMap<String, BTreeSet<String>>,
    /// RFC3339 creation timestamp
    pub created_at: String,
}

impl Publication {
    /// Create a publication selecting every table, unfiltered.
    pub fn all_tables(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: TableSelector::AllTables,
            row_filters: BTreeMap::new(),
            column_projections: BTreeMap::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Create a publication for an explicit table set.
    pub fn for_tables(
        name: impl Into<String>,
        tables: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            name: name.into(),
            selector: TableSelector::Tables {
                tables: tables.into_iter().collect(),
            },
            row_filters: BTreeMap::new(),
            column_projections: BTreeMap::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Attach a row filter to a table.
    pub fn with_row_filter(mut self, table: impl Into<String>, filter: RowFilter) -> Self {
        self.row_filters.entry(table.into()).or_default().push(filter);
        self
    }

    /// Attach a column projection to a table.
    pub fn with_columns(
        mut self,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = String>,
    ) -> Self {
        self.column_projections
            .insert(table.into(), columns.into_iter().collect());
        self
    }

    /// Row filters for `table`, if any.
    pub fn filters_for(&self, table: &str) -> Option<&[RowFilter]> {
        self.row_filters.get(table).map(|f| f.as_slice())
    }

    /// Column projection for `table`, if any.
    pub fn columns_for(&self, table: &str) -> Option<&BTreeSet<String>> {
        self.column_projections.get(table)
    }
}

/// In-memory registry over the persisted publication directory.
pub struct PublicationRegistry {
    dir: PathBuf,
    publications: RwLock<HashMap<String, Arc<Publication>>>,
}

impl PublicationRegistry {
    /// Open the registry, loading every persisted publication.
    pub fn open(data_dir: &Path) -> PublicationResult<Self> {
        let dir = data_dir.join("publications");
        fs::create_dir_all(&dir)?;

        let mut publications = HashMap::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read_to_string(&path)?;
            let publication: Publication = serde_json::from_str(&raw)?;
            publications.insert(publication.name.clone(), Arc::new(publication));
        }

        Ok(Self {
            dir,
            publications: RwLock::new(publications),
        })
    }

    /// Create and persist a publication. Fails if the name exists.
    pub fn create(&self, publication: Publication) -> PublicationResult<Arc<Publication>> {
        if publication.name.is_empty() {
            return Err(PublicationError::InvalidDefinition(
                "publication name must be non-empty".to_string(),
            ));
        }
        if let TableSelector::Tables { tables } = &publication.selector {
            if tables.is_empty() {
                return Err(PublicationError::InvalidDefinition(
                    "publication table set must be non-empty".to_string(),
                ));
            }
        }

        let mut publications = self
            .publications
            .write()
            .expect("publication registry lock poisoned");
        if publications.contains_key(&publication.name) {
            return Err(PublicationError::DuplicatePublication(
                publication.name.clone(),
            ));
        }

        // Durable before visible: temp file, fsync, atomic rename
        let json = serde_json::to_string_pretty(&publication)?;
        let final_path = self.dir.join(format!("{}.json", publication.name));
        let tmp_path = self.dir.join(format!("{}.json.tmp", publication.name));
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &final_path)?;

        let publication = Arc::new(publication);
        publications.insert(publication.name.clone(), publication.clone());
        Ok(publication)
    }

    /// Look up a publication by name.
    pub fn get(&self, name: &str) -> PublicationResult<Arc<Publication>> {
        self.publications
            .read()
            .expect("publication registry lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| PublicationError::PublicationNotFound(name.to_string()))
    }

    /// Names of all publications, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .publications
            .read()
            .expect("publication registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
