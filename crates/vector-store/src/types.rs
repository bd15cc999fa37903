use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_DIMENSION: usize = 768;
pub const DEFAULT_NLIST: u32 = 768;
pub const DEFAULT_NPROBE: u32 = 16;
pub const ID_FIELD: &str = "id";
pub const VECTOR_FIELD: &str = "vector";

/// One row of a collection: caller-assigned primary key plus its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: i64,
    pub vector: Vec<f32>,
}

/// Fixed two-field schema: int64 primary key (no auto id) and a float vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub description: String,
    pub dimension: usize,
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            description: "Collection for questions and corpus".to_string(),
            dimension,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub const fn id_field(&self) -> &'static str {
        ID_FIELD
    }

    pub const fn vector_field(&self) -> &'static str {
        VECTOR_FIELD
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexType {
    Flat,
    IvfFlat,
    IvfSq8,
    IvfPq,
    Hnsw,
}

impl IndexType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "FLAT",
            Self::IvfFlat => "IVF_FLAT",
            Self::IvfSq8 => "IVF_SQ8",
            Self::IvfPq => "IVF_PQ",
            Self::Hnsw => "HNSW",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "FLAT" => Some(Self::Flat),
            "IVF_FLAT" => Some(Self::IvfFlat),
            "IVF_SQ8" => Some(Self::IvfSq8),
            "IVF_PQ" => Some(Self::IvfPq),
            "HNSW" => Some(Self::Hnsw),
            _ => None,
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricType {
    L2,
    Ip,
    Cosine,
}

impl MetricType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::L2 => "L2",
            Self::Ip => "IP",
            Self::Cosine => "COSINE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "L2" => Some(Self::L2),
            "IP" => Some(Self::Ip),
            "COSINE" => Some(Self::Cosine),
            _ => None,
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build-time tuning parameters. Only the ones the supported index types read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexParams {
    /// Number of IVF clusters.
    pub nlist: u32,
    /// HNSW graph degree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<u32>,
    /// HNSW build-time candidate list size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ef_construction: Option<u32>,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            nlist: DEFAULT_NLIST,
            m: None,
            ef_construction: None,
        }
    }
}

/// Description of the ANN index to build on the vector field.
///
/// The default is an IVF_FLAT index with cosine similarity and 768 clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub index_type: IndexType,
    pub metric: MetricType,
    pub params: IndexParams,
}

impl Default for IndexSpec {
    fn default() -> Self {
        Self {
            index_type: IndexType::IvfFlat,
            metric: MetricType::Cosine,
            params: IndexParams::default(),
        }
    }
}

impl fmt::Display for IndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, nlist={})",
            self.index_type, self.metric, self.params.nlist
        )
    }
}

/// Query-time parameters. `nprobe` is read by IVF indexes, `ef` by HNSW.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    pub metric: MetricType,
    pub nprobe: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ef: Option<u32>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            metric: MetricType::Cosine,
            nprobe: DEFAULT_NPROBE,
            ef: None,
        }
    }
}

/// Single nearest-neighbor hit as returned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: i64,
    pub score: f32,
}
