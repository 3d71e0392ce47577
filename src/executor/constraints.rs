use crate::driver::DriverConnection;
use crate::error::SqlSrvError;

fn nocheck_sql(table: &str) -> String {
    format!("ALTER TABLE {table} NOCHECK CONSTRAINT ALL;")
}

fn check_sql(table: &str) -> String {
    format!("ALTER TABLE {table} CHECK CONSTRAINT ALL;")
}

/// Constraints disabled on a set of tables, waiting to be re-enabled.
///
/// Always finish with [`restore`](Self::restore). Dropping an unrestored
/// bracket cannot run SQL, so it only logs.
#[must_use = "constraints stay disabled until the bracket is restored"]
#[derive(Debug)]
pub struct ConstraintBracket {
    tables: Vec<String>,
    restored: bool,
}

impl ConstraintBracket {
    /// Issue `NOCHECK CONSTRAINT ALL` for each table in order.
    ///
    /// # Errors
    ///
    /// Returns the driver's error; tables disabled before the failure are
    /// re-enabled first.
    pub async fn disable(
        conn: &mut dyn DriverConnection,
        tables: Vec<String>,
    ) -> Result<Self, SqlSrvError> {
        for (idx, table) in tables.iter().enumerate() {
            if let Err(e) = conn.execute_batch(&nocheck_sql(table)).await {
                let partial = ConstraintBracket {
                    tables: tables[..idx].to_vec(),
                    restored: false,
                };
                if let Err(restore_err) = partial.restore(conn).await {
                    tracing::warn!(error = %restore_err, "could not re-enable constraints");
                }
                return Err(e);
            }
        }
        Ok(ConstraintBracket {
            tables,
            restored: false,
        })
    }

    #[must_use]
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    /// Issue `CHECK CONSTRAINT ALL` for every table, continuing past
    /// failures.
    ///
    /// # Errors
    ///
    /// Returns the first failure after all tables were attempted.
    pub async fn restore(mut self, conn: &mut dyn DriverConnection) -> Result<(), SqlSrvError> {
        self.restored = true;
        let mut first_error = None;
        for table in &self.tables {
            if let Err(e) = conn.execute_batch(&check_sql(table)).await {
                tracing::warn!(table = %table, error = %e, "re-enabling constraints failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for ConstraintBracket {
    fn drop(&mut self) {
        if !self.restored && !self.tables.is_empty() {
            tracing::warn!(
                tables = ?self.tables,
                "constraint bracket dropped without restore; constraints remain disabled"
            );
        }
    }
}

/// Which tables a foreign-key toggle applies to.
pub(crate) enum ToggleTarget<'a> {
    Tables(&'a [String]),
    All,
}

/// Disable foreign keys (and other constraints) for the given tables, or for
/// every table when `tables` is empty.
///
/// The all-tables form runs through `sp_MSforeachtable`; when that procedure
/// is unavailable, each enabled foreign key listed in `sys.foreign_keys` is
/// disabled individually.
pub(crate) async fn set_foreign_keys(
    conn: &mut dyn DriverConnection,
    target: ToggleTarget<'_>,
    enable: bool,
) -> Result<(), SqlSrvError> {
    match target {
        ToggleTarget::Tables(tables) => {
            let batch: String = tables
                .iter()
                .map(|t| if enable { check_sql(t) } else { nocheck_sql(t) })
                .collect();
            conn.execute_batch(&batch).await
        }
        ToggleTarget::All => {
            let foreach = if enable {
                "EXEC sp_MSforeachtable 'ALTER TABLE ? WITH CHECK CHECK CONSTRAINT ALL';"
            } else {
                "EXEC sp_MSforeachtable 'ALTER TABLE ? NOCHECK CONSTRAINT ALL';"
            };
            match conn.execute_batch(foreach).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    tracing::debug!(error = %e, "sp_MSforeachtable failed, toggling keys one by one");
                    toggle_each_foreign_key(conn, enable).await
                }
            }
        }
    }
}

async fn toggle_each_foreign_key(
    conn: &mut dyn DriverConnection,
    enable: bool,
) -> Result<(), SqlSrvError> {
    let (action, disabled_flag) = if enable {
        ("WITH CHECK CHECK", 1)
    } else {
        ("NOCHECK", 0)
    };
    let listing = format!(
        "SELECT 'ALTER TABLE ' + QUOTENAME(OBJECT_SCHEMA_NAME(parent_object_id)) + '.' \
         + QUOTENAME(OBJECT_NAME(parent_object_id)) + ' {action} CONSTRAINT ' + QUOTENAME(name) \
         AS stmt FROM sys.foreign_keys WHERE type = 'F' AND is_disabled = {disabled_flag}"
    );
    let statements = conn.query(&listing, &[]).await?;
    for row in &statements {
        if let Some(stmt) = row.get_by_index(0).and_then(|v| v.as_text()) {
            conn.execute_batch(stmt).await?;
        }
    }
    Ok(())
}
