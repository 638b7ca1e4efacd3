//! Querying a docset's index database.
//!
//! Two layouts exist in the wild:
//!
//! - `searchIndex(name, type, path[, anchor])`, the flat table written by
//!   docset generators and older Dash versions;
//! - `ZTOKEN` + `ZTOKENTYPE`, the Core Data store used by newer Dash
//!   versions, where the type name lives in the lookup table.
//!
//! [`detect_layout`] picks one from the table list and [`LayoutKind::run`]
//! dispatches to its query routine.

use std::path::Path;

use rusqlite::{Connection, OpenFlags, params};

use crate::error::Result;

/// Type reported when the token type could not be resolved.
pub const UNKNOWN_TYPE: &str = "Unknown";

const SEARCH_INDEX_TABLE: &str = "searchIndex";
const TOKEN_TABLE: &str = "ZTOKEN";
const TOKEN_TYPE_TABLE: &str = "ZTOKENTYPE";

/// One matching row, before it is attributed to a docset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub name: String,
    pub kind: String,
    pub path: String,
    pub anchor: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    SearchIndex,
    TokenStore,
    Unknown,
}

/// Decide the layout from the names of the tables present.
pub fn detect_layout<S: AsRef<str>>(tables: &[S]) -> LayoutKind {
    let has = |name: &str| tables.iter().any(|t| t.as_ref() == name);

    if has(SEARCH_INDEX_TABLE) {
        LayoutKind::SearchIndex
    } else if has(TOKEN_TABLE) && has(TOKEN_TYPE_TABLE) {
        LayoutKind::TokenStore
    } else {
        LayoutKind::Unknown
    }
}

impl LayoutKind {
    /// Run the substring query for this layout, returning at most `limit`
    /// rows.
    pub fn run(
        self,
        conn: &Connection,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RawEntry>> {
        match self {
            Self::SearchIndex => query_search_index(conn, query, limit),
            Self::TokenStore => query_token_store(conn, query, limit),
            Self::Unknown => Ok(Vec::new()),
        }
    }
}

/// Open the index at `db_path` read-only and return rows whose name
/// contains `query`.
///
/// The connection lives only for this call and is closed on every exit
/// path.
pub fn query_docset(
    db_path: &Path,
    query: &str,
    limit: usize,
) -> Result<Vec<RawEntry>> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    query_connection(&conn, query, limit)
}

pub fn query_connection(
    conn: &Connection,
    query: &str,
    limit: usize,
) -> Result<Vec<RawEntry>> {
    let tables = list_tables(conn)?;
    let layout = detect_layout(&tables);
    if layout == LayoutKind::Unknown {
        tracing::warn!(?tables, "unknown docset database schema");
    }
    layout.run(conn, query, limit)
}

fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(tables)
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

fn like_pattern(query: &str) -> String {
    format!("%{query}%")
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn query_search_index(
    conn: &Connection,
    query: &str,
    limit: usize,
) -> Result<Vec<RawEntry>> {
    let has_anchor = table_columns(conn, SEARCH_INDEX_TABLE)?
        .iter()
        .any(|c| c == "anchor");

    let sql = if has_anchor {
        "SELECT name, type, path, anchor FROM searchIndex WHERE name LIKE ?1 LIMIT ?2"
    } else {
        "SELECT name, type, path, NULL FROM searchIndex WHERE name LIKE ?1 LIMIT ?2"
    };

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(
        params![like_pattern(query), sql_limit(limit)],
        |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        },
    )?;

    let mut entries = Vec::new();
    for row in rows {
        let (name, kind, path, anchor) = row?;
        let Some(name) = name else { continue };
        entries.push(RawEntry {
            name,
            kind: kind.unwrap_or_default(),
            path: path.unwrap_or_default(),
            anchor: anchor.filter(|a| !a.is_empty()),
        });
    }
    Ok(entries)
}

fn query_token_store(
    conn: &Connection,
    query: &str,
    limit: usize,
) -> Result<Vec<RawEntry>> {
    match query_tokens_with_types(conn, query, limit) {
        Ok(entries) => Ok(entries),
        Err(e) => {
            tracing::warn!(error = %e, "token type join failed, retrying without types");
            query_tokens_untyped(conn, query, limit)
        }
    }
}

fn query_tokens_with_types(
    conn: &Connection,
    query: &str,
    limit: usize,
) -> Result<Vec<RawEntry>> {
    let mut stmt = conn.prepare(
        "SELECT t.ZTOKENNAME, tt.ZTYPENAME, t.ZPATH
         FROM ZTOKEN t
         LEFT JOIN ZTOKENTYPE tt ON t.ZTOKENTYPE = tt.Z_PK
         WHERE t.ZTOKENNAME LIKE ?1
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(
        params![like_pattern(query), sql_limit(limit)],
        |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        },
    )?;

    let mut entries = Vec::new();
    for row in rows {
        let (name, kind, path) = row?;
        let Some(name) = name else { continue };
        entries.push(RawEntry {
            name,
            kind: kind.unwrap_or_else(|| UNKNOWN_TYPE.to_string()),
            path: path.unwrap_or_default(),
            anchor: None,
        });
    }
    Ok(entries)
}

fn query_tokens_untyped(
    conn: &Connection,
    query: &str,
    limit: usize,
) -> Result<Vec<RawEntry>> {
    let mut stmt = conn.prepare(
        "SELECT ZTOKENNAME, ZPATH FROM ZTOKEN WHERE ZTOKENNAME LIKE ?1 LIMIT ?2",
    )?;
    let rows = stmt.query_map(
        params![like_pattern(query), sql_limit(limit)],
        |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
            ))
        },
    )?;

    let mut entries = Vec::new();
    for row in rows {
        let (name, path) = row?;
        let Some(name) = name else { continue };
        entries.push(RawEntry {
            name,
            kind: UNKNOWN_TYPE.to_string(),
            path: path.unwrap_or_default(),
            anchor: None,
        });
    }
    Ok(entries)
}
