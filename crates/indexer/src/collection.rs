use crate::error::{Result, SchemaError};
use embedload_vector_store::{CollectionSchema, StoreSession};

/// What to do when the collection already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetupMode {
    /// Keep the existing collection and its rows; its dimension must match.
    Reuse,
    /// Drop the existing collection (and every row in it) and create it again.
    #[default]
    Recreate,
}

/// Make sure `name` exists with the fixed id + vector schema.
///
/// Must not run concurrently with ingestion into the same collection.
pub async fn ensure_collection(
    session: &dyn StoreSession,
    name: &str,
    dimension: usize,
    mode: SetupMode,
) -> Result<CollectionSchema> {
    let schema = CollectionSchema::new(name, dimension);

    if !session.has_collection(name).await? {
        log::info!("Creating new collection '{name}' (dim {dimension})...");
        session.create_collection(&schema).await?;
        return Ok(schema);
    }

    match mode {
        SetupMode::Recreate => {
            log::warn!("Collection '{name}' exists, recreating for fresh start...");
            session.drop_collection(name).await?;
            session.create_collection(&schema).await?;
            Ok(schema)
        }
        SetupMode::Reuse => {
            let existing = session.describe_collection(name).await?;
            if existing.dimension != dimension {
                return Err(SchemaError::DimensionMismatch {
                    collection: name.to_string(),
                    expected: dimension,
                    actual: existing.dimension,
                }
                .into());
            }
            log::info!("Reusing collection '{name}'");
            Ok(existing)
        }
    }
}

/// Fetch the schema of a collection that must already exist.
pub async fn require_collection(session: &dyn StoreSession, name: &str) -> Result<CollectionSchema> {
    if !session.has_collection(name).await? {
        return Err(SchemaError::MissingCollection(name.to_string()).into());
    }
    Ok(session.describe_collection(name).await?)
}
