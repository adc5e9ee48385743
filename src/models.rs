use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An image known to the index. Never mutated; re-indexing a file creates a new asset.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MediaAsset {
    pub id: Uuid,
    pub filename: String,
    pub path: String,
    pub category: Option<String>,
}

impl MediaAsset {
    pub fn from_path(path: &Path, category: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
            path: path.to_string_lossy().to_string(),
            category,
        }
    }

    pub fn payload(&self) -> AssetPayload {
        AssetPayload {
            filename: self.filename.clone(),
            path: self.path.clone(),
            category: self.category.clone(),
        }
    }
}

/// Payload persisted next to every indexed vector.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AssetPayload {
    pub filename: String,
    pub path: String,
    pub category: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    Cosine,
    Dot,
}

/// Shape of the single named vector slot a collection holds.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct VectorSpec {
    pub name: String,
    pub size: usize,
    pub distance: Distance,
}

/// A vector placed in a named slot.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedVector {
    pub name: String,
    pub values: Vec<f32>,
}

/// One point sent to the vector store.
#[derive(Debug, Clone)]
pub struct IndexedPoint {
    pub id: Uuid,
    pub vector: NamedVector,
    pub payload: AssetPayload,
}

impl IndexedPoint {
    pub fn new(asset: &MediaAsset, vector_name: &str, values: Vec<f32>) -> Self {
        Self {
            id: asset.id,
            vector: NamedVector {
                name: vector_name.to_string(),
                values,
            },
            payload: asset.payload(),
        }
    }
}

/// Payload fields a filter may match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadField {
    Filename,
    Path,
    Category,
}

impl PayloadField {
    pub fn column(self) -> &'static str {
        match self {
            Self::Filename => "filename",
            Self::Path => "path",
            Self::Category => "category",
        }
    }

    pub fn value_of(self, payload: &AssetPayload) -> Option<&str> {
        match self {
            Self::Filename => Some(payload.filename.as_str()),
            Self::Path => Some(payload.path.as_str()),
            Self::Category => payload.category.as_deref(),
        }
    }
}

/// Conjunction of payload equality conditions. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadFilter {
    pub must: Vec<(PayloadField, String)>,
}

impl PayloadFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn category(category: Option<&str>) -> Self {
        Self {
            must: category
                .map(|c| vec![(PayloadField::Category, c.to_string())])
                .unwrap_or_default(),
        }
    }

    pub fn matches(&self, payload: &AssetPayload) -> bool {
        self.must
            .iter()
            .all(|(field, value)| field.value_of(payload) == Some(value.as_str()))
    }
}

/// A stored point returned from a similarity query.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: Uuid,
    #[serde(flatten)]
    pub payload: AssetPayload,
    pub score: f32,
}

/// Hits ordered by descending score, never longer than the requested top-k.
#[derive(Debug, Serialize, Clone, Default)]
pub struct SearchResults {
    pub points: Vec<ScoredPoint>,
}

impl SearchResults {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Outcome of copying search hits to a local folder.
#[derive(Debug, Serialize, Clone)]
pub struct SavedResults {
    pub folder: PathBuf,
    pub copied: usize,
    pub failures: Vec<CopyFailure>,
}

#[derive(Debug, Serialize, Clone)]
pub struct CopyFailure {
    pub source: String,
    pub reason: String,
}

/// Summary of a folder ingestion run.
#[derive(Debug, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub directories: usize,
    pub indexed: usize,
}

/// A collection and the name of its single vector slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionTarget {
    pub collection: String,
    pub vector_name: String,
}

impl CollectionTarget {
    pub fn new(collection: impl Into<String>, vector_name: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            vector_name: vector_name.into(),
        }
    }

    pub fn spec(&self, size: usize) -> VectorSpec {
        VectorSpec {
            name: self.vector_name.clone(),
            size,
            distance: Distance::Cosine,
        }
    }
}
