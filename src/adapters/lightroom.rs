//! Read-only access to a Lightroom Classic catalog (`.lrcat`, SQLite).

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags};

use crate::adapters::local::item_for_path;
use crate::models::SourceTag;
use crate::pipeline::batch::SourceItem;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog not found: {0}")]
    NotFound(PathBuf),

    #[error("Catalog query failed: {0}")]
    Database(#[from] rusqlite::Error),
}

const ALL_PHOTOS_SQL: &str = "
    SELECT rtrim(af.absolutePath, '/') || '/' || rf.baseName || '.' || rf.extension
    FROM Adobe_images ai
    JOIN AgLibraryFile rf ON ai.rootFile = rf.id_local
    JOIN AgLibraryFolder af ON rf.folder = af.id_local
    ORDER BY 1";

const COLLECTION_SQL: &str = "
    SELECT rtrim(af.absolutePath, '/') || '/' || rf.baseName || '.' || rf.extension
    FROM Adobe_images ai
    JOIN AgLibraryFile rf ON ai.rootFile = rf.id_local
    JOIN AgLibraryFolder af ON rf.folder = af.id_local
    JOIN AgLibraryCollectionImage aci ON ai.id_local = aci.image
    JOIN AgLibraryCollection ac ON aci.collection = ac.id_local
    WHERE ac.name = ?1
    ORDER BY 1";

/// Absolute paths of the photos in the catalog, optionally limited to one
/// collection. The catalog is opened read-only.
pub fn catalog_photos(catalog: &Path, collection: Option<&str>) -> Result<Vec<PathBuf>, CatalogError> {
    if !catalog.exists() {
        return Err(CatalogError::NotFound(catalog.to_path_buf()));
    }
    let conn = Connection::open_with_flags(
        catalog,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let paths = query_photos(&conn, collection)?;
    tracing::info!(
        catalog = %catalog.display(),
        collection = collection.unwrap_or("<all>"),
        found = paths.len(),
        "Lightroom catalog read"
    );
    Ok(paths)
}

/// Same as `catalog_photos`, as batch items tagged with `source`.
pub fn catalog_items(
    catalog: &Path,
    collection: Option<&str>,
    source: SourceTag,
) -> Result<Vec<SourceItem>, CatalogError> {
    Ok(catalog_photos(catalog, collection)?
        .iter()
        .map(|p| item_for_path(p, source))
        .collect())
}

fn query_photos(conn: &Connection, collection: Option<&str>) -> Result<Vec<PathBuf>, CatalogError> {
    let rows: Vec<String> = match collection {
        Some(name) => {
            let mut stmt = conn.prepare(COLLECTION_SQL)?;
            let rows = stmt.query_map(params![name], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<_, _>>()?
        }
        None => {
            let mut stmt = conn.prepare(ALL_PHOTOS_SQL)?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<_, _>>()?
        }
    };
    Ok(rows.into_iter().map(PathBuf::from).collect())
}
