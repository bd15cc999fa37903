use anyhow::{anyhow, bail, Context, Result};
use embedload_indexer::PreconditionError;
use embedload_search::ParentMapping;
use ndarray::Array2;
use ndarray_npy::{read_npy, ReadNpyError};
use std::path::Path;

pub const DEFAULT_ID_COLUMN: usize = 2;
pub const DEFAULT_CHUNK_COLUMN: &str = "chunk_id";
pub const DEFAULT_PARENT_COLUMN: &str = "cid";

fn require_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(PreconditionError::MissingInput(path.to_path_buf()).into());
    }
    Ok(())
}

/// Rows of an embedding matrix plus its column count, which survives zero rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Embeddings {
    pub rows: Vec<Vec<f32>>,
    pub dimension: usize,
}

/// Read an N×D embedding matrix from a `.npy` file, one `Vec` per row.
///
/// `float64` arrays are narrowed to `f32`.
pub fn load_embeddings(path: &Path) -> Result<Embeddings> {
    require_file(path)?;
    let matrix: Array2<f32> = match read_npy(path) {
        Ok(matrix) => matrix,
        Err(ReadNpyError::WrongDescriptor(_)) => {
            let wide: Array2<f64> = read_npy(path)
                .with_context(|| format!("Failed to read embeddings from {}", path.display()))?;
            wide.mapv(|x| x as f32)
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("Failed to read embeddings from {}", path.display()))
        }
    };
    log::info!(
        "Loaded {} embeddings of dimension {} from {}",
        matrix.nrows(),
        matrix.ncols(),
        path.display()
    );
    Ok(Embeddings {
        rows: matrix.outer_iter().map(|row| row.to_vec()).collect(),
        dimension: matrix.ncols(),
    })
}

/// Read row ids from a CSV table with a header row; row `i` labels embedding `i`.
pub fn load_ids(path: &Path, column: usize) -> Result<Vec<i64>> {
    require_file(path)?;
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open id table {}", path.display()))?;

    let mut ids = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Malformed row in {}", path.display()))?;
        let line = record.position().map_or(0, |p| p.line());
        let raw = record.get(column).ok_or_else(|| {
            anyhow!(
                "{}:{line}: row has no column {column} ({} fields)",
                path.display(),
                record.len()
            )
        })?;
        let id = raw
            .trim()
            .parse::<i64>()
            .with_context(|| format!("{}:{line}: invalid id {raw:?}", path.display()))?;
        ids.push(id);
    }
    Ok(ids)
}

/// Read a chunk → parent table, locating both columns by header name.
pub fn load_parent_mapping(path: &Path, chunk_column: &str, parent_column: &str) -> Result<ParentMapping> {
    require_file(path)?;
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open parent table {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .clone();
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| anyhow!("{} has no column named {name:?}", path.display()))
    };
    let chunk_idx = position(chunk_column)?;
    let parent_idx = position(parent_column)?;

    let mut mapping = ParentMapping::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Malformed row in {}", path.display()))?;
        let line = record.position().map_or(0, |p| p.line());
        let field = |idx: usize, name: &str| -> Result<i64> {
            let raw = record.get(idx).unwrap_or_default().trim();
            if raw.is_empty() {
                bail!("{}:{line}: empty {name}", path.display());
            }
            raw.parse::<i64>()
                .with_context(|| format!("{}:{line}: invalid {name} {raw:?}", path.display()))
        };
        mapping.insert(field(chunk_idx, chunk_column)?, field(parent_idx, parent_column)?);
    }
    log::info!(
        "Loaded parent mapping for {} chunks from {}",
        mapping.len(),
        path.display()
    );
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use ndarray_npy::write_npy;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn reads_f32_embeddings_row_by_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("emb.npy");
        write_npy(&path, &array![[1.0_f32, 2.0], [3.0, 4.0], [5.0, 6.0]]).unwrap();

        let embeddings = load_embeddings(&path).unwrap();
        assert_eq!(
            embeddings.rows,
            vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]
        );
        assert_eq!(embeddings.dimension, 2);
    }

    #[test]
    fn empty_matrix_keeps_its_dimension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("emb.npy");
        write_npy(&path, &Array2::<f32>::zeros((0, 3))).unwrap();

        let embeddings = load_embeddings(&path).unwrap();
        assert!(embeddings.rows.is_empty());
        assert_eq!(embeddings.dimension, 3);
    }

    #[test]
    fn narrows_f64_embeddings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("emb.npy");
        write_npy(&path, &array![[0.5_f64, -1.0]]).unwrap();

        assert_eq!(load_embeddings(&path).unwrap().rows, vec![vec![0.5_f32, -1.0]]);
    }

    #[test]
    fn missing_file_is_a_precondition_error() {
        let dir = tempdir().unwrap();
        let err = load_embeddings(&dir.path().join("nope.npy")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PreconditionError>(),
            Some(PreconditionError::MissingInput(_))
        ));
    }

    #[test]
    fn ids_come_from_third_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ids.csv");
        fs::write(&path, "idx,text,id\n0,foo,42\n1,bar,7\n").unwrap();

        assert_eq!(load_ids(&path, DEFAULT_ID_COLUMN).unwrap(), vec![42, 7]);
    }

    #[test]
    fn bad_id_names_file_and_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ids.csv");
        fs::write(&path, "idx,text,id\n0,foo,42\n1,bar,x\n").unwrap();

        let err = format!("{:#}", load_ids(&path, DEFAULT_ID_COLUMN).unwrap_err());
        assert!(err.contains("ids.csv:3"), "{err}");
    }

    #[test]
    fn parent_columns_are_found_by_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("parents.csv");
        fs::write(&path, "cid,text,chunk_id\n100,a,10\n100,b,11\n200,c,12\n300,d,10\n").unwrap();

        let mapping =
            load_parent_mapping(&path, DEFAULT_CHUNK_COLUMN, DEFAULT_PARENT_COLUMN).unwrap();
        assert_eq!(mapping.parents(10), &[100, 300]);
        assert_eq!(mapping.parents(12), &[200]);
    }

    #[test]
    fn unknown_parent_column_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("parents.csv");
        fs::write(&path, "chunk_id,parent\n1,2\n").unwrap();

        let err = load_parent_mapping(&path, DEFAULT_CHUNK_COLUMN, DEFAULT_PARENT_COLUMN)
            .unwrap_err()
            .to_string();
        assert!(err.contains("\"cid\""), "{err}");
    }
}
