//! County records and the read-only directory built from them.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ReferenceDataError;

/// A county with its ordered sub-county names.
///
/// The `sub_counties` field name is part of the on-disk format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct County {
    pub name: String,
    pub code: String,
    pub capital: String,
    pub sub_counties: Vec<String>,
}

impl County {
    /// Whether `name` is one of this county's sub-counties (exact match).
    pub fn has_sub_county(&self, name: &str) -> bool {
        self.sub_counties.iter().any(|s| s == name)
    }
}

/// Immutable, ordered set of counties keyed by unique name.
///
/// Built once at startup and shared behind an `Arc` by every conversation.
#[derive(Debug, Clone)]
pub struct CountyDirectory {
    counties: Vec<County>,
    by_name: HashMap<String, usize>,
}

impl CountyDirectory {
    /// Build a directory, rejecting empty sets, duplicate names and counties
    /// without sub-counties.
    pub fn new(counties: Vec<County>) -> Result<Self, ReferenceDataError> {
        if counties.is_empty() {
            return Err(ReferenceDataError::Empty);
        }

        let mut by_name = HashMap::with_capacity(counties.len());
        for (idx, county) in counties.iter().enumerate() {
            if county.sub_counties.is_empty() {
                return Err(ReferenceDataError::NoSubCounties {
                    name: county.name.clone(),
                });
            }
            if by_name.insert(county.name.clone(), idx).is_some() {
                return Err(ReferenceDataError::DuplicateCounty {
                    name: county.name.clone(),
                });
            }
        }

        Ok(Self { counties, by_name })
    }

    /// Parse a JSON array of county records.
    pub fn from_json(json: &str) -> Result<Self, ReferenceDataError> {
        let counties: Vec<County> = serde_json::from_str(json)?;
        Self::new(counties)
    }

    /// Load the directory from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ReferenceDataError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ReferenceDataError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let directory = Self::from_json(&raw)?;
        info!(
            path = %path.display(),
            counties = directory.len(),
            "Reference data loaded"
        );
        Ok(directory)
    }

    /// Case-sensitive lookup by county name.
    pub fn find_by_name(&self, name: &str) -> Option<&County> {
        self.by_name.get(name).map(|&idx| &self.counties[idx])
    }

    pub fn counties(&self) -> &[County] {
        &self.counties
    }

    pub fn len(&self) -> usize {
        self.counties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counties.is_empty()
    }
}
