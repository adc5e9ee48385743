use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use surrealdb::engine::local::{Db, RocksDb};
use surrealdb::Surreal;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{AssetPayload, Distance, IndexedPoint, NamedVector, PayloadFilter, ScoredPoint, VectorSpec};

/// Collection-oriented vector storage with payload filters.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Creates the collection, or checks that an existing one has the same spec.
    async fn ensure_collection(&self, collection: &str, spec: &VectorSpec)
        -> Result<(), StoreError>;

    /// Writes all points or none. Returns once the write is durable.
    async fn upsert(&self, collection: &str, points: Vec<IndexedPoint>) -> Result<(), StoreError>;

    /// Best `top_k` points for `query` among those matching `filter`, by descending score.
    async fn search(
        &self,
        collection: &str,
        query: &NamedVector,
        top_k: usize,
        filter: &PayloadFilter,
    ) -> Result<Vec<ScoredPoint>, StoreError>;

    async fn delete(&self, collection: &str, filter: &PayloadFilter) -> Result<(), StoreError>;

    async fn count(&self, collection: &str) -> Result<usize, StoreError>;
}

/// Table holding each collection's vector spec; not usable as a collection name.
pub const COLLECTIONS_TABLE: &str = "collections";

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product = dot(a, b);
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Row layout of a point inside a collection table.
#[derive(Debug, Serialize, Deserialize, Clone)]
struct StoredPoint {
    point_id: String,
    filename: String,
    path: String,
    category: Option<String>,
    vectors: BTreeMap<String, Vec<f32>>,
}

impl From<IndexedPoint> for StoredPoint {
    fn from(point: IndexedPoint) -> Self {
        let mut vectors = BTreeMap::new();
        vectors.insert(point.vector.name, point.vector.values);
        Self {
            point_id: point.id.to_string(),
            filename: point.payload.filename,
            path: point.payload.path,
            category: point.payload.category,
            vectors,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: usize,
}

/// Embedded SurrealDB on RocksDB. Each collection is a table; similarity is
/// computed in process over the filtered rows.
pub struct SurrealVectorStore {
    db: Surreal<Db>,
}

impl SurrealVectorStore {
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let path = db_path.to_string_lossy().to_string();
        let db = Surreal::new::<RocksDb>(path.as_str()).await?;
        db.use_ns("images").use_db("retrieval").await?;
        Ok(Self { db })
    }

    async fn spec(&self, collection: &str) -> Result<VectorSpec, StoreError> {
        let spec: Option<VectorSpec> = self.db.select((COLLECTIONS_TABLE, collection)).await?;
        spec.ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))
    }

    fn check_vector(collection: &str, spec: &VectorSpec, vector: &NamedVector) -> Result<(), StoreError> {
        if vector.name != spec.name {
            return Err(StoreError::UnknownVector {
                collection: collection.to_string(),
                name: vector.name.clone(),
            });
        }
        if vector.values.len() != spec.size {
            return Err(StoreError::DimensionMismatch {
                expected: spec.size,
                actual: vector.values.len(),
            });
        }
        Ok(())
    }
}

/// ` WHERE a = $p0 AND b = $p1`, or nothing for an empty filter.
fn where_clause(filter: &PayloadFilter) -> String {
    if filter.must.is_empty() {
        return String::new();
    }
    let conditions: Vec<String> = filter
        .must
        .iter()
        .enumerate()
        .map(|(i, (field, _))| format!("{} = $p{}", field.column(), i))
        .collect();
    format!(" WHERE {}", conditions.join(" AND "))
}

#[async_trait]
impl VectorStore for SurrealVectorStore {
    async fn ensure_collection(
        &self,
        collection: &str,
        spec: &VectorSpec,
    ) -> Result<(), StoreError> {
        if collection == COLLECTIONS_TABLE {
            return Err(StoreError::ReservedName(collection.to_string()));
        }
        let existing: Option<VectorSpec> = self.db.select((COLLECTIONS_TABLE, collection)).await?;
        match existing {
            Some(existing) if existing == *spec => Ok(()),
            Some(_) => Err(StoreError::SpecMismatch {
                collection: collection.to_string(),
            }),
            None => {
                debug!(collection, vector = %spec.name, size = spec.size, "Creating collection");
                let _: Option<VectorSpec> = self
                    .db
                    .create((COLLECTIONS_TABLE, collection))
                    .content(spec.clone())
                    .await?;
                Ok(())
            }
        }
    }

    async fn upsert(&self, collection: &str, points: Vec<IndexedPoint>) -> Result<(), StoreError> {
        if points.is_empty() {
            return Ok(());
        }
        let spec = self.spec(collection).await?;
        for point in &points {
            Self::check_vector(collection, &spec, &point.vector)?;
        }

        let rows: Vec<StoredPoint> = points.into_iter().map(StoredPoint::from).collect();
        self.db
            .query(
                "BEGIN TRANSACTION;
                 FOR $row IN $rows {
                     UPDATE type::thing($tb, $row.point_id) CONTENT $row;
                 };
                 COMMIT TRANSACTION;",
            )
            .bind(("tb", collection.to_string()))
            .bind(("rows", rows))
            .await?
            .check()?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &NamedVector,
        top_k: usize,
        filter: &PayloadFilter,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let spec = self.spec(collection).await?;
        Self::check_vector(collection, &spec, query)?;

        let sql = format!("SELECT * FROM type::table($tb){}", where_clause(filter));
        let mut request = self.db.query(sql).bind(("tb", collection.to_string()));
        for (i, (_, value)) in filter.must.iter().enumerate() {
            request = request.bind((format!("p{}", i), value.clone()));
        }
        let rows: Vec<StoredPoint> = request.await?.take(0)?;
        debug!(collection, candidates = rows.len(), "Scoring candidates");

        let mut results: Vec<ScoredPoint> = rows
            .into_iter()
            .filter_map(|row| {
                let Some(vector) = row.vectors.get(&query.name) else {
                    warn!(
                        collection,
                        point_id = %row.point_id,
                        vector = %query.name,
                        "Skipping row without vector slot"
                    );
                    return None;
                };
                let id = match Uuid::parse_str(&row.point_id) {
                    Ok(id) => id,
                    Err(e) => {
                        warn!(
                            collection,
                            point_id = %row.point_id,
                            error = %e,
                            "Skipping row with malformed id"
                        );
                        return None;
                    }
                };
                let score = match spec.distance {
                    Distance::Cosine => cosine_similarity(vector, &query.values),
                    Distance::Dot => dot(vector, &query.values),
                };
                Some(ScoredPoint {
                    id,
                    payload: AssetPayload {
                        filename: row.filename,
                        path: row.path,
                        category: row.category,
                    },
                    score,
                })
            })
            .filter(|point| filter.matches(&point.payload))
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        Ok(results)
    }

    async fn delete(&self, collection: &str, filter: &PayloadFilter) -> Result<(), StoreError> {
        let sql = format!("DELETE type::table($tb){}", where_clause(filter));
        let mut request = self.db.query(sql).bind(("tb", collection.to_string()));
        for (i, (_, value)) in filter.must.iter().enumerate() {
            request = request.bind((format!("p{}", i), value.clone()));
        }
        request.await?.check()?;
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let rows: Vec<CountRow> = self
            .db
            .query("SELECT count() AS count FROM type::table($tb) GROUP ALL")
            .bind(("tb", collection.to_string()))
            .await?
            .take(0)?;
        Ok(rows.first().map_or(0, |row| row.count))
    }
}
