#![cfg(feature = "test-utils")]

use std::sync::Arc;
use std::time::Duration;

use sqlsrv_middleware::prelude::*;
use sqlsrv_middleware::test_utils::{DriverCall, MemoryDriver};

async fn session(driver: &MemoryDriver) -> Result<Session, SqlSrvError> {
    let registry = Arc::new(ConnectionRegistry::new(Arc::new(driver.clone())));
    let descriptor = ConnectionDescriptor::builder("db1", "Sales", "sa", "x").build()?;
    let session = Session::open(&registry, "sales", &descriptor).await?;
    driver.clear_calls();
    Ok(session)
}

#[tokio::test]
async fn wrong_verb_never_reaches_the_driver() -> Result<(), SqlSrvError> {
    let driver = MemoryDriver::new();
    let sales = session(&driver).await?;

    let err = sales.select("DROP TABLE Orders", ()).unwrap_err();
    assert!(matches!(err, SqlSrvError::InvalidStatement { expected: "SELECT", .. }));

    let err = sales.update("DELETE FROM Orders", ()).await.unwrap_err();
    assert!(matches!(err, SqlSrvError::InvalidStatement { .. }));

    let err = sales
        .delete("DELETE FROM Orders /* WHERE id = 1", ())
        .await
        .unwrap_err();
    assert!(matches!(err, SqlSrvError::InvalidStatement { .. }));

    assert!(driver.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn update_binds_named_placeholders() -> Result<(), SqlSrvError> {
    let driver = MemoryDriver::new();
    let sales = session(&driver).await?;

    let changed = sales
        .update(
            "UPDATE Orders SET status = :status WHERE id = :id",
            NamedParams::new().bind("status", "shipped").bind("id", 5),
        )
        .await?;

    assert!(changed);
    assert_eq!(
        driver.executes("Sales"),
        vec![(
            "UPDATE Orders SET status = @P1 WHERE id = @P2".to_string(),
            vec![RowValues::Text("shipped".into()), RowValues::Int(5)],
        )]
    );
    Ok(())
}

#[tokio::test]
async fn zero_rows_affected_is_false_not_an_error() -> Result<(), SqlSrvError> {
    let driver = MemoryDriver::new();
    driver.set_rows_affected("UPDATE Orders", 0);
    driver.set_rows_affected("DELETE FROM Orders", 0);
    let sales = session(&driver).await?;

    assert!(!sales.update("UPDATE Orders SET a = 1 WHERE 1 = 0", ()).await?);
    assert!(!sales.delete("DELETE FROM Orders WHERE 1 = 0", ()).await?);
    assert!(sales.delete("DELETE FROM Lines WHERE id = 3", ()).await?);
    Ok(())
}

#[tokio::test]
async fn batch_params_are_only_for_inserts() -> Result<(), SqlSrvError> {
    let driver = MemoryDriver::new();
    let sales = session(&driver).await?;
    let sets = vec![
        NamedParams::new().bind("id", 1),
        NamedParams::new().bind("id", 2),
    ];

    let err = sales
        .update("UPDATE Orders SET a = 1 WHERE id = :id", sets.clone())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SqlSrvError::InvalidParameterShape { method: "Session::update()" }
    ));
    assert!(sales.select("SELECT * FROM Orders WHERE id = :id", sets).is_err());
    assert!(driver.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn batch_insert_runs_once_per_set() -> Result<(), SqlSrvError> {
    let driver = MemoryDriver::new();
    let sales = session(&driver).await?;
    let sets: Vec<NamedParams> = ["a", "b", "c"]
        .iter()
        .map(|name| NamedParams::new().bind("name", *name))
        .collect();

    assert!(sales.insert("INSERT INTO Tags (name) VALUES (:name)", sets).await?);

    let executes = driver.executes("Sales");
    assert_eq!(executes.len(), 3);
    assert!(
        executes
            .iter()
            .all(|(sql, _)| sql == "INSERT INTO Tags (name) VALUES (@P1)")
    );
    assert_eq!(executes[2].1, vec![RowValues::Text("c".into())]);
    Ok(())
}

#[tokio::test]
async fn insert_get_id_returns_identity_per_set() -> Result<(), SqlSrvError> {
    let driver = MemoryDriver::new();
    let sales = session(&driver).await?;

    let single = sales
        .insert_get_id(
            "INSERT INTO Orders (total) VALUES (:total)",
            NamedParams::new().bind("total", 9.5),
        )
        .await?;
    assert_eq!(single, InsertedId::Single(Some(1)));

    let batch = sales
        .insert_get_id(
            "INSERT INTO Orders (total) VALUES (:total)",
            vec![
                NamedParams::new().bind("total", 1.0),
                NamedParams::new().bind("total", 2.0),
            ],
        )
        .await?;
    assert_eq!(batch, InsertedId::Batch(vec![Some(2), Some(3)]));
    assert_eq!(batch.last(), Some(3));
    Ok(())
}

#[tokio::test]
async fn insert_get_id_without_rows_has_no_id() -> Result<(), SqlSrvError> {
    let driver = MemoryDriver::new();
    driver.set_rows_affected("INSERT INTO Orders", 0);
    let sales = session(&driver).await?;

    let id = sales
        .insert_get_id("INSERT INTO Orders SELECT * FROM Staging WHERE 1 = 0", ())
        .await?;

    assert_eq!(id, InsertedId::Single(None));
    assert!(
        !driver
            .calls()
            .iter()
            .any(|c| matches!(c, DriverCall::LastInsertId { .. }))
    );
    Ok(())
}

#[tokio::test]
async fn unbound_placeholder_fails_before_execution() -> Result<(), SqlSrvError> {
    let driver = MemoryDriver::new();
    let sales = session(&driver).await?;

    let err = sales
        .update("UPDATE Orders SET a = :a WHERE id = :id", NamedParams::new().bind("a", 1))
        .await
        .unwrap_err();

    assert!(matches!(err, SqlSrvError::ExecutionError(msg) if msg.contains(":id")));
    assert!(driver.executes("Sales").is_empty());
    Ok(())
}

#[tokio::test]
async fn driver_failure_names_the_operation() -> Result<(), SqlSrvError> {
    let driver = MemoryDriver::new();
    driver.fail_execute_containing("DELETE FROM Orders");
    let sales = session(&driver).await?;

    let err = sales.delete("DELETE FROM Orders", ()).await.unwrap_err();
    assert!(
        matches!(err, SqlSrvError::ExecutionError(msg) if msg.starts_with("Session::delete()"))
    );
    Ok(())
}

#[tokio::test]
async fn procedures_run_through_exec() -> Result<(), SqlSrvError> {
    let driver = MemoryDriver::new();
    let sales = session(&driver).await?;

    let rows = sales
        .execute_procedure("EXEC dbo.NothingToReport @day = :day", NamedParams::new().bind("day", 3))?
        .get()
        .await?;
    assert!(rows.is_empty());

    assert!(
        sales
            .execute_transactional_procedure("EXEC dbo.CloseDay", ())
            .await?
    );
    assert_eq!(
        driver.executes("Sales"),
        vec![("EXEC dbo.CloseDay".to_string(), vec![])]
    );

    let err = sales
        .execute_transactional_procedure("SELECT 1", ())
        .await
        .unwrap_err();
    assert!(matches!(err, SqlSrvError::InvalidStatement { expected: "EXEC", .. }));
    Ok(())
}

#[tokio::test]
async fn connection_settings_reach_the_driver() -> Result<(), SqlSrvError> {
    let driver = MemoryDriver::new();
    let sales = session(&driver).await?;

    sales.set_option(SessionOption::AnsiNulls, false).await?;
    sales.set_option(SessionOption::NoCount, true).await?;
    sales.set_query_timeout(Some(Duration::from_secs(30))).await;
    sales.set_encoding(Encoding::Binary).await;

    assert_eq!(
        driver.calls_for("Sales"),
        vec![
            DriverCall::Batch {
                conn: "Sales".into(),
                sql: "SET ANSI_NULLS OFF".into(),
            },
            DriverCall::Batch {
                conn: "Sales".into(),
                sql: "SET NOCOUNT ON".into(),
            },
            DriverCall::SetQueryTimeout {
                conn: "Sales".into(),
                timeout: Some(Duration::from_secs(30)),
            },
            DriverCall::SetEncoding {
                conn: "Sales".into(),
                encoding: Encoding::Binary,
            },
        ]
    );
    Ok(())
}

#[tokio::test]
async fn sessions_with_one_name_share_a_connection() -> Result<(), SqlSrvError> {
    let driver = MemoryDriver::new();
    let registry = Arc::new(ConnectionRegistry::new(Arc::new(driver.clone())));
    let descriptor = ConnectionDescriptor::builder("db1", "Sales", "sa", "x").build()?;

    let first = Session::open(&registry, "sales", &descriptor).await?;
    let second = Session::open(&registry, "sales", &descriptor).await?;

    assert!(Arc::ptr_eq(first.handle(), second.handle()));
    assert_eq!(second.name(), "sales");
    Ok(())
}

#[tokio::test]
async fn status_reports_instead_of_failing() {
    let driver = MemoryDriver::new();
    driver.fail_connect("Down");
    let registry = Arc::new(ConnectionRegistry::new(Arc::new(driver.clone())));
    let source = |database: &str| {
        CredentialSource::Inline(
            [
                ("host", "db1"),
                ("database", database),
                ("user", "sa"),
                ("password", "x"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        )
    };

    let up = Session::status(&registry, source("Up")).await;
    assert!(up.connected);
    assert_eq!(up.message, "Connection Successful");
    let session = up.session.expect("session on success");
    assert_eq!(session.name(), "inline:sa@sqlsrv:Server=db1;Database=Up");

    let down = Session::status(&registry, source("Down")).await;
    assert!(!down.connected);
    assert!(down.message.contains("login failed"));
    assert!(down.session.is_none());
    assert_eq!(registry.len().await, 1);

    let missing = Session::status(&registry, CredentialSource::Inline(Default::default())).await;
    assert!(!missing.connected);
    assert!(missing.message.contains("[host]"));
}
