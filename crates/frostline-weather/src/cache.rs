//! Local ZIP code cache, persisted as CSV with the columns
//! `zipcode,latitude,longitude,city`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::coords::LocationCoordinates;
use crate::types::{CacheError, PostalCode, ZipCacheEntry};

#[derive(Debug, Serialize, Deserialize)]
struct CacheRow {
    zipcode: String,
    latitude: String,
    longitude: String,
    city: String,
}

impl CacheRow {
    fn from_entry(entry: &ZipCacheEntry) -> Self {
        Self {
            zipcode: entry.postal_code.to_string(),
            latitude: entry.location.latitude().to_string(),
            longitude: entry.location.longitude().to_string(),
            city: entry.city_label.clone(),
        }
    }

    fn into_entry(self, line: u64) -> Result<ZipCacheEntry, CacheError> {
        let postal_code = PostalCode::parse(&self.zipcode)
            .map_err(|e| CacheError::Format(format!("line {}: {}", line, e)))?;
        let location = LocationCoordinates::parse(&self.latitude, &self.longitude)
            .map_err(|e| CacheError::Format(format!("line {}: {}", line, e)))?;
        Ok(ZipCacheEntry {
            postal_code,
            location,
            city_label: self.city,
        })
    }
}

#[derive(Debug)]
pub struct ZipCache {
    cache_path: PathBuf,
    entries: BTreeMap<PostalCode, ZipCacheEntry>,
}

impl ZipCache {
    /// An empty cache bound to `cache_path`; call [`load`](Self::load) to read it.
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: cache_path.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.cache_path
    }

    /// Replace the in-memory entries with the file contents.
    ///
    /// A missing file yields an empty cache. A row with a missing column or an
    /// invalid value is a [`CacheError::Format`].
    pub fn load(&mut self) -> Result<(), CacheError> {
        if !self.cache_path.exists() {
            tracing::debug!("No ZIP cache at {}", self.cache_path.display());
            self.entries.clear();
            return Ok(());
        }

        let mut reader = csv::Reader::from_path(&self.cache_path)?;
        let mut entries = BTreeMap::new();
        for (index, record) in reader.deserialize::<CacheRow>().enumerate() {
            let row = record?;
            // Header is line 1
            let line = index as u64 + 2;
            let entry = row.into_entry(line)?;
            entries.insert(entry.postal_code.clone(), entry);
        }

        tracing::info!(
            "Loaded {} cached ZIP codes from {}",
            entries.len(),
            self.cache_path.display()
        );
        self.entries = entries;
        Ok(())
    }

    /// Write all entries to disk. Saving an empty cache is a no-op.
    pub fn save(&self) -> Result<(), CacheError> {
        if self.entries.is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.cache_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut writer = csv::Writer::from_path(&self.cache_path)?;
        for entry in self.entries.values() {
            writer.serialize(CacheRow::from_entry(entry))?;
        }
        writer.flush()?;

        tracing::debug!(
            "Saved {} ZIP codes to {}",
            self.entries.len(),
            self.cache_path.display()
        );
        Ok(())
    }

    pub fn get(&self, postal_code: &PostalCode) -> Option<&ZipCacheEntry> {
        self.entries.get(postal_code)
    }

    pub fn contains(&self, postal_code: &PostalCode) -> bool {
        self.entries.contains_key(postal_code)
    }

    /// Add or replace the entry for its postal code.
    pub fn insert(&mut self, entry: ZipCacheEntry) -> Option<ZipCacheEntry> {
        self.entries.insert(entry.postal_code.clone(), entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
