//! Row conversion for [`Resource`] entries.

use crate::models::{Resource, ResourceId};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

/// Decodes the JSON `data` column into a resource.
fn decode(data: &str) -> Result<Resource> {
    serde_json::from_str(data).map_err(|e| Error::operation("decode_resource", e))
}

/// Fetches a single entry by id.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the query or decoding fails.
pub fn fetch_resource(conn: &Connection, id: &ResourceId) -> Result<Option<Resource>> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM resources WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::operation("fetch_resource", e))?;

    data.as_deref().map(decode).transpose()
}

/// Fetches all entries matching a WHERE clause.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the query or decoding fails.
pub fn fetch_resources(conn: &Connection, clause: &str, params: &[String]) -> Result<Vec<Resource>> {
    let sql = format!("SELECT data FROM resources WHERE {clause}");
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::operation("prepare_select", e))?;

    let rows = stmt
        .query_map(params_from_iter(params.iter()), |row| row.get::<_, String>(0))
        .map_err(|e| Error::operation("select_resources", e))?;

    let mut resources = Vec::new();
    for row in rows {
        let data = row.map_err(|e| Error::operation("read_resource_row", e))?;
        resources.push(decode(&data)?);
    }
    Ok(resources)
}

/// Inserts or replaces an entry.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if encoding or the write fails.
pub fn write_resource(conn: &Connection, resource: &Resource) -> Result<()> {
    let data = serde_json::to_string(resource).map_err(|e| Error::operation("encode_resource", e))?;
    conn.execute(
        "INSERT OR REPLACE INTO resources (id, root_id, path, resource_type, deleted, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            resource.id.to_string(),
            resource.root_id.to_string(),
            resource.path,
            resource.resource_type.code(),
            resource.deleted,
            data
        ],
    )
    .map_err(|e| Error::operation("write_resource", e))?;
    Ok(())
}

/// Deletes an entry; returns whether a row was removed.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the delete fails.
pub fn remove_resource(conn: &Connection, id: &ResourceId) -> Result<bool> {
    let rows = conn
        .execute("DELETE FROM resources WHERE id = ?1", params![id.to_string()])
        .map_err(|e| Error::operation("remove_resource", e))?;
    Ok(rows > 0)
}

/// Counts all entries.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the count fails.
pub fn count_resources(conn: &Connection) -> Result<u64> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM resources", [], |row| row.get(0))
        .map_err(|e| Error::operation("count_resources", e))?;
    Ok(u64::try_from(count).unwrap_or(0))
}
