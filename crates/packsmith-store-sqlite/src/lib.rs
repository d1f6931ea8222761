use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use packsmith_core::{
    NewPackage, NewSticker, NoWhitelist, Package, PackageWithStickers, PacksmithError, Result,
    Sticker, WhitelistRegistry, CANVAS_SIZE,
};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const LATEST_SCHEMA_VERSION: i64 = 2;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS packages (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  identifier TEXT NOT NULL UNIQUE,
  name TEXT NOT NULL,
  author TEXT NOT NULL,
  tray_image_file TEXT NOT NULL DEFAULT '',
  image_data_version TEXT NOT NULL DEFAULT '1',
  publisher_email TEXT NOT NULL DEFAULT '',
  publisher_website TEXT NOT NULL DEFAULT '',
  privacy_policy_website TEXT NOT NULL DEFAULT '',
  license_agreement_website TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS stickers (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  package_id INTEGER NOT NULL,
  image_file TEXT NOT NULL,
  image_file_hash TEXT NOT NULL DEFAULT '',
  emojis_json TEXT NOT NULL,
  size_in_kb INTEGER NOT NULL DEFAULT 0,
  FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_stickers_package_id ON stickers(package_id);
";

const MIGRATION_002_SQL: &str = r"
ALTER TABLE packages ADD COLUMN animated INTEGER NOT NULL DEFAULT 0 CHECK (animated IN (0, 1));
ALTER TABLE stickers ADD COLUMN width INTEGER NOT NULL DEFAULT 512;
ALTER TABLE stickers ADD COLUMN height INTEGER NOT NULL DEFAULT 512;

CREATE INDEX IF NOT EXISTS idx_stickers_hash ON stickers(package_id, image_file_hash);
";

const PACKAGE_COLUMNS: &str = "id, identifier, name, author, tray_image_file, image_data_version,
    publisher_email, publisher_website, privacy_policy_website, license_agreement_website, animated";

const STICKER_COLUMNS: &str =
    "id, package_id, image_file, image_file_hash, emojis_json, width, height, size_in_kb";

/// Durable record storage for packages and their stickers.
pub struct SqliteStore {
    conn: Connection,
    whitelist: Arc<dyn WhitelistRegistry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForeignKeyViolation {
    pub table: String,
    pub rowid: i64,
    pub parent: String,
    pub fk_index: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub quick_check_ok: bool,
    pub quick_check_message: String,
    pub foreign_key_violations: Vec<ForeignKeyViolation>,
    pub schema_status: SchemaStatus,
}

/// Attach a message to a `rusqlite` failure while mapping it onto the error taxonomy.
pub trait SqliteResultExt<T> {
    /// # Errors
    /// Constraint failures become `ConstraintViolation`; everything else `Storage`.
    fn db_context(self, context: &str) -> Result<T>;
}

impl<T> SqliteResultExt<T> for rusqlite::Result<T> {
    fn db_context(self, context: &str) -> Result<T> {
        self.map_err(|err| map_sqlite_error(context, &err))
    }
}

fn map_sqlite_error(context: &str, err: &rusqlite::Error) -> PacksmithError {
    match err {
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            PacksmithError::ConstraintViolation(format!(
                "{context}: {}",
                message.as_deref().unwrap_or("constraint failed")
            ))
        }
        other => PacksmithError::Storage(format!("{context}: {other}")),
    }
}

impl SqliteStore {
    /// Open a SQLite-backed content store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .db_context(&format!("failed to open sqlite database at {}", path.display()))?;
        Self::configure(conn, true)
    }

    /// Open an existing database without write access, for query-only callers.
    ///
    /// # Errors
    /// Returns an error when the database does not exist or cannot be opened.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .db_context(&format!("failed to open sqlite database read-only at {}", path.display()))?;
        Self::configure(conn, false)
    }

    /// In-memory store, already migrated.
    ///
    /// # Errors
    /// Returns an error when the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().db_context("failed to open in-memory sqlite")?;
        let mut store = Self::configure(conn, false)?;
        store.migrate()?;
        Ok(store)
    }

    fn configure(conn: Connection, wal: bool) -> Result<Self> {
        if wal {
            conn.execute_batch("PRAGMA journal_mode = WAL;")
                .db_context("failed to enable WAL journal")?;
        }
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .db_context("failed to configure sqlite pragmas")?;

        Ok(Self { conn, whitelist: Arc::new(NoWhitelist) })
    }

    #[must_use]
    pub fn with_whitelist(mut self, whitelist: Arc<dyn WhitelistRegistry>) -> Self {
        self.whitelist = whitelist;
        self
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .db_context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus { current_version, target_version: LATEST_SCHEMA_VERSION, pending_versions })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when any migration step fails or the database is newer than supported.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .db_context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&self.conn)?;
        if version > LATEST_SCHEMA_VERSION {
            return Err(PacksmithError::Storage(format!(
                "database schema version {version} is newer than supported {LATEST_SCHEMA_VERSION}"
            )));
        }

        if version < 1 {
            self.apply_migration(1, MIGRATION_001_SQL)?;
            version = 1;
        }
        if version < 2 {
            self.apply_migration(2, MIGRATION_002_SQL)?;
        }

        Ok(())
    }

    fn apply_migration(&mut self, version: i64, sql: &str) -> Result<()> {
        let tx = self.conn.transaction().db_context("failed to start migration transaction")?;
        tx.execute_batch(sql).db_context(&format!("failed to apply migration v{version}"))?;
        tx.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
            params![version, now_rfc3339()?],
        )
        .db_context(&format!("failed to record migration version {version}"))?;
        tx.commit().db_context(&format!("failed to commit migration v{version}"))?;
        tracing::info!(version, "applied content store migration");
        Ok(())
    }

    /// Insert a new package and return its local id.
    ///
    /// # Errors
    /// Returns `ConstraintViolation` when the identifier is already taken.
    pub fn create_package(&mut self, package: &NewPackage) -> Result<i64> {
        package.validate()?;
        let tx = self.conn.transaction().db_context("failed to start transaction")?;
        let id = insert_package_row(&tx, package)?;
        tx.commit().db_context("failed to commit package insert")?;
        Ok(id)
    }

    /// Full-row replace keyed by `package.id`. The identifier is immutable.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown id and `ConstraintViolation` when the
    /// supplied identifier differs from the stored one.
    pub fn update_package(&mut self, package: &Package) -> Result<()> {
        let tx = self.conn.transaction().db_context("failed to start transaction")?;
        update_package_row(&tx, package)?;
        tx.commit().db_context("failed to commit package update")?;
        Ok(())
    }

    /// Insert a sticker into an existing package.
    ///
    /// # Errors
    /// Returns `ConstraintViolation` when the package does not exist.
    pub fn add_sticker(&mut self, sticker: &NewSticker) -> Result<i64> {
        sticker.validate()?;
        let tx = self.conn.transaction().db_context("failed to start transaction")?;
        let id = insert_sticker_row(&tx, sticker)?;
        tx.commit().db_context("failed to commit sticker insert")?;
        Ok(id)
    }

    /// Insert a sticker and replace its owning package row in one transaction.
    ///
    /// # Errors
    /// Returns `ConstraintViolation` when `sticker.package_id` and `package.id` disagree
    /// or the package is gone, and `NotFound` when the package row vanished.
    pub fn add_sticker_to_package(&mut self, sticker: &NewSticker, package: &Package) -> Result<i64> {
        sticker.validate()?;
        if sticker.package_id != package.id {
            return Err(PacksmithError::ConstraintViolation(format!(
                "sticker targets package {} but package {} was supplied",
                sticker.package_id, package.id
            )));
        }
        let tx = self.conn.transaction().db_context("failed to start transaction")?;
        let id = insert_sticker_row(&tx, sticker)?;
        update_package_row(&tx, package)?;
        tx.commit().db_context("failed to commit sticker insert")?;
        Ok(id)
    }

    /// Delete one sticker of `package` and replace the package row in one transaction.
    ///
    /// # Errors
    /// Returns an error when either write fails.
    pub fn remove_sticker_from_package(&mut self, sticker_id: i64, package: &Package) -> Result<bool> {
        let tx = self.conn.transaction().db_context("failed to start transaction")?;
        let deleted = tx
            .execute(
                "DELETE FROM stickers WHERE id = ?1 AND package_id = ?2",
                params![sticker_id, package.id],
            )
            .db_context("failed to delete sticker")?;
        if deleted == 0 {
            return Ok(false);
        }
        update_package_row(&tx, package)?;
        tx.commit().db_context("failed to commit sticker delete")?;
        Ok(true)
    }

    /// Insert a package together with its stickers, committing both or neither.
    /// Each sticker's `package_id` is replaced by the new local id.
    ///
    /// # Errors
    /// Returns `ConstraintViolation` when the identifier already exists.
    pub fn import_package(&mut self, package: &NewPackage, stickers: &[NewSticker]) -> Result<i64> {
        package.validate()?;
        let tx = self.conn.transaction().db_context("failed to start transaction")?;
        let package_id = insert_package_row(&tx, package)?;
        for sticker in stickers {
            let owned = NewSticker { package_id, ..sticker.clone() };
            owned.validate()?;
            insert_sticker_row(&tx, &owned)?;
        }
        tx.commit().db_context("failed to commit package import")?;
        Ok(package_id)
    }

    /// Delete a package and every sticker it owns atomically. Image files are untouched.
    ///
    /// # Errors
    /// Returns an error when the transaction fails; nothing is deleted then.
    pub fn delete_package(&mut self, id: i64) -> Result<bool> {
        let tx = self.conn.transaction().db_context("failed to start transaction")?;
        let stickers = tx
            .execute("DELETE FROM stickers WHERE package_id = ?1", params![id])
            .db_context("failed to delete package stickers")?;
        let packages = tx
            .execute("DELETE FROM packages WHERE id = ?1", params![id])
            .db_context("failed to delete package")?;
        tx.commit().db_context("failed to commit package delete")?;
        tracing::debug!(package_id = id, stickers, "deleted package");
        Ok(packages > 0)
    }

    /// Delete one sticker row. The image file stays on disk.
    ///
    /// # Errors
    /// Returns an error when the delete statement fails.
    pub fn delete_sticker(&mut self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM stickers WHERE id = ?1", params![id])
            .db_context("failed to delete sticker")?;
        Ok(deleted > 0)
    }

    /// # Errors
    /// Returns an error when the lookup fails.
    pub fn get_sticker(&self, id: i64) -> Result<Option<Sticker>> {
        let query = format!("SELECT {STICKER_COLUMNS} FROM stickers WHERE id = ?1");
        self.conn
            .query_row(&query, params![id], sticker_from_row)
            .optional()
            .db_context("failed to load sticker")
    }

    /// Package plus stickers, read inside one transaction.
    ///
    /// # Errors
    /// Returns an error when the read fails; absence is `Ok(None)`.
    pub fn get_package(&self, id: i64) -> Result<Option<PackageWithStickers>> {
        let query = format!("SELECT {PACKAGE_COLUMNS} FROM packages WHERE id = ?1");
        self.load_joined(&query, params![id])
    }

    /// # Errors
    /// Returns an error when the read fails; absence is `Ok(None)`.
    pub fn get_package_by_identifier(&self, identifier: &str) -> Result<Option<PackageWithStickers>> {
        let query = format!("SELECT {PACKAGE_COLUMNS} FROM packages WHERE identifier = ?1");
        self.load_joined(&query, params![identifier])
    }

    fn load_joined(
        &self,
        query: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Option<PackageWithStickers>> {
        let tx = self.conn.unchecked_transaction().db_context("failed to start read transaction")?;
        let package = tx.query_row(query, params, package_from_row).optional().db_context("failed to load package")?;
        let Some(package) = package else {
            return Ok(None);
        };
        let stickers = load_stickers(&tx, package.id)?;
        tx.commit().db_context("failed to finish read transaction")?;
        Ok(Some(PackageWithStickers { package, stickers }))
    }

    /// All packages in insertion order.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn list_packages(&self) -> Result<Vec<Package>> {
        let query = format!("SELECT {PACKAGE_COLUMNS} FROM packages ORDER BY id ASC");
        let mut stmt = self.conn.prepare(&query).db_context("failed to prepare package list")?;
        let rows = stmt.query_map([], package_from_row).db_context("failed to list packages")?;
        let mut packages = Vec::new();
        for row in rows {
            packages.push(row.db_context("failed to decode package row")?);
        }
        Ok(packages)
    }

    /// Every package joined with its stickers, from one consistent snapshot.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn list_packages_with_stickers(&self) -> Result<Vec<PackageWithStickers>> {
        let tx = self.conn.unchecked_transaction().db_context("failed to start read transaction")?;
        let mut joined: Vec<PackageWithStickers> = {
            let query = format!("SELECT {PACKAGE_COLUMNS} FROM packages ORDER BY id ASC");
            let mut stmt = tx.prepare(&query).db_context("failed to prepare package list")?;
            let rows = stmt.query_map([], package_from_row).db_context("failed to list packages")?;
            let mut joined = Vec::new();
            for row in rows {
                let package = row.db_context("failed to decode package row")?;
                joined.push(PackageWithStickers { package, stickers: Vec::new() });
            }
            joined
        };

        {
            let query =
                format!("SELECT {STICKER_COLUMNS} FROM stickers ORDER BY package_id ASC, id ASC");
            let mut stmt = tx.prepare(&query).db_context("failed to prepare sticker list")?;
            let rows = stmt.query_map([], sticker_from_row).db_context("failed to list stickers")?;
            for row in rows {
                let sticker = row.db_context("failed to decode sticker row")?;
                if let Some(owner) =
                    joined.iter_mut().find(|entry| entry.package.id == sticker.package_id)
                {
                    owner.stickers.push(sticker);
                }
            }
        }

        tx.commit().db_context("failed to finish read transaction")?;
        Ok(joined)
    }

    /// Identifiers of all local packages.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn package_identifiers(&self) -> Result<BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT identifier FROM packages")
            .db_context("failed to prepare identifier scan")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0)).db_context("failed to scan identifiers")?;
        let mut identifiers = BTreeSet::new();
        for row in rows {
            identifiers.insert(row.db_context("failed to decode identifier")?);
        }
        Ok(identifiers)
    }

    /// File names referenced by any tray icon or sticker.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn referenced_file_names(&self) -> Result<BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT tray_image_file FROM packages WHERE tray_image_file <> ''
                 UNION
                 SELECT image_file FROM stickers",
            )
            .db_context("failed to prepare referenced file scan")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0)).db_context("failed to scan referenced files")?;
        let mut names = BTreeSet::new();
        for row in rows {
            names.insert(row.db_context("failed to decode file name")?);
        }
        Ok(names)
    }

    /// Whether the consuming app already accepted this pack.
    #[must_use]
    pub fn is_whitelisted(&self, identifier: &str) -> bool {
        self.whitelist.is_whitelisted(identifier)
    }

    /// Run quick-check, foreign-key-check, and schema status health probes.
    ///
    /// # Errors
    /// Returns an error when any integrity probe query fails.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let quick_check_message: String = self
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0))
            .db_context("failed to run PRAGMA quick_check")?;

        let mut stmt = self
            .conn
            .prepare("PRAGMA foreign_key_check")
            .db_context("failed to prepare PRAGMA foreign_key_check")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ForeignKeyViolation {
                    table: row.get(0)?,
                    rowid: row.get::<_, Option<i64>>(1)?.unwrap_or_default(),
                    parent: row.get(2)?,
                    fk_index: row.get(3)?,
                })
            })
            .db_context("failed to run PRAGMA foreign_key_check")?;

        let mut foreign_key_violations = Vec::new();
        for row in rows {
            foreign_key_violations.push(row.db_context("failed to decode foreign key violation")?);
        }

        let schema_status = self.schema_status()?;
        Ok(IntegrityReport {
            quick_check_ok: quick_check_message == "ok",
            quick_check_message,
            foreign_key_violations,
            schema_status,
        })
    }
}

fn insert_package_row(conn: &Connection, package: &NewPackage) -> Result<i64> {
    let taken = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM packages WHERE identifier = ?1)",
            params![package.identifier],
            |row| row.get::<_, i64>(0),
        )
        .db_context("failed to check package identifier")?;
    if taken == 1 {
        return Err(PacksmithError::ConstraintViolation(format!(
            "package identifier already exists: {}",
            package.identifier
        )));
    }

    conn.execute(
        "INSERT INTO packages(
            identifier, name, author, tray_image_file, image_data_version,
            publisher_email, publisher_website, privacy_policy_website,
            license_agreement_website, animated
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            package.identifier,
            package.name,
            package.author,
            package.tray_image_file,
            package.image_data_version,
            package.publisher_email,
            package.publisher_website,
            package.privacy_policy_website,
            package.license_agreement_website,
            package.animated,
        ],
    )
    .db_context("failed to insert package")?;
    Ok(conn.last_insert_rowid())
}

fn update_package_row(conn: &Connection, package: &Package) -> Result<()> {
    let stored: Option<String> = conn
        .query_row("SELECT identifier FROM packages WHERE id = ?1", params![package.id], |row| {
            row.get(0)
        })
        .optional()
        .db_context("failed to load package identifier")?;
    let Some(stored) = stored else {
        return Err(PacksmithError::NotFound(format!("package {}", package.id)));
    };
    if stored != package.identifier {
        return Err(PacksmithError::ConstraintViolation(format!(
            "package identifier is immutable: {stored} cannot become {}",
            package.identifier
        )));
    }

    conn.execute(
        "UPDATE packages SET
            name = ?2, author = ?3, tray_image_file = ?4, image_data_version = ?5,
            publisher_email = ?6, publisher_website = ?7, privacy_policy_website = ?8,
            license_agreement_website = ?9, animated = ?10
         WHERE id = ?1",
        params![
            package.id,
            package.name,
            package.author,
            package.tray_image_file,
            package.image_data_version,
            package.publisher_email,
            package.publisher_website,
            package.privacy_policy_website,
            package.license_agreement_website,
            package.animated,
        ],
    )
    .db_context("failed to update package")?;
    Ok(())
}

fn insert_sticker_row(conn: &Connection, sticker: &NewSticker) -> Result<i64> {
    let owner_exists = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM packages WHERE id = ?1)",
            params![sticker.package_id],
            |row| row.get::<_, i64>(0),
        )
        .db_context("failed to check sticker owner")?;
    if owner_exists != 1 {
        return Err(PacksmithError::ConstraintViolation(format!(
            "sticker references missing package {}",
            sticker.package_id
        )));
    }

    let emojis_json = serde_json::to_string(&sticker.emojis)
        .map_err(|err| PacksmithError::Internal(format!("failed to serialize emojis: {err}")))?;
    conn.execute(
        "INSERT INTO stickers(
            package_id, image_file, image_file_hash, emojis_json, width, height, size_in_kb
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            sticker.package_id,
            sticker.image_file,
            sticker.image_file_hash,
            emojis_json,
            sticker.width,
            sticker.height,
            i64::try_from(sticker.size_in_kb).unwrap_or(i64::MAX),
        ],
    )
    .db_context("failed to insert sticker")?;
    Ok(conn.last_insert_rowid())
}

fn load_stickers(conn: &Connection, package_id: i64) -> Result<Vec<Sticker>> {
    let query = format!("SELECT {STICKER_COLUMNS} FROM stickers WHERE package_id = ?1 ORDER BY id ASC");
    let mut stmt = conn.prepare(&query).db_context("failed to prepare sticker query")?;
    let rows = stmt.query_map(params![package_id], sticker_from_row).db_context("failed to load stickers")?;
    let mut stickers = Vec::new();
    for row in rows {
        stickers.push(row.db_context("failed to decode sticker row")?);
    }
    Ok(stickers)
}

fn package_from_row(row: &Row<'_>) -> rusqlite::Result<Package> {
    Ok(Package {
        id: row.get(0)?,
        identifier: row.get(1)?,
        name: row.get(2)?,
        author: row.get(3)?,
        tray_image_file: row.get(4)?,
        image_data_version: row.get(5)?,
        publisher_email: row.get(6)?,
        publisher_website: row.get(7)?,
        privacy_policy_website: row.get(8)?,
        license_agreement_website: row.get(9)?,
        animated: row.get(10)?,
    })
}

fn sticker_from_row(row: &Row<'_>) -> rusqlite::Result<Sticker> {
    let emojis_json: String = row.get(4)?;
    let emojis = serde_json::from_str::<Vec<String>>(&emojis_json).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(err))
    })?;

    Ok(Sticker {
        id: row.get(0)?,
        package_id: row.get(1)?,
        image_file: row.get(2)?,
        image_file_hash: row.get(3)?,
        emojis,
        width: u32::try_from(row.get::<_, i64>(5)?).unwrap_or(CANVAS_SIZE),
        height: u32::try_from(row.get::<_, i64>(6)?).unwrap_or(CANVAS_SIZE),
        size_in_kb: u64::try_from(row.get::<_, i64>(7)?).unwrap_or(0),
    })
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
        row.get::<_, i64>(0)
    })
    .db_context("failed to read current schema version")
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| PacksmithError::Internal(format!("failed to format RFC3339 timestamp: {err}")))
}
