#![cfg(feature = "test-utils")]

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use sqlsrv_middleware::prelude::*;
use sqlsrv_middleware::test_utils::{DriverCall, MemoryDriver};

const CONNECTIONS: &str = r#"{
    "connections": {
        "sales": {
            "server": "db1.internal",
            "port": "1533",
            "database": "Sales",
            "user": "app",
            "password": "s3cret",
            "charset": "binary",
            "login_timeout": 3
        },
        "reporting": {
            "host": "db2.internal",
            "instance": "REPORTS",
            "database": "Reporting",
            "username": "reader",
            "password": "r"
        },
        "broken": {
            "host": "db3.internal",
            "database": "Broken",
            "username": "nobody"
        }
    }
}"#;

fn write_config() -> Result<tempfile::NamedTempFile, std::io::Error> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(CONNECTIONS.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[test]
fn named_entries_load_from_a_file() -> Result<(), Box<dyn std::error::Error>> {
    let file = write_config()?;
    let table = ConnectionTable::from_json_file(file.path())?;

    let mut names: Vec<&str> = table.names().collect();
    names.sort_unstable();
    assert_eq!(names, ["broken", "reporting", "sales"]);

    let sales = ConnectionDescriptor::from_named_config(&table, "sales")?;
    assert_eq!(sales.dsn(), "sqlsrv:Server=db1.internal,1533;Database=Sales");
    assert_eq!(sales.effective_port(), 1533);
    assert_eq!(sales.charset(), Encoding::Binary);
    assert_eq!(sales.login_timeout(), Duration::from_secs(3));
    assert_eq!(
        sales.connection_string(),
        "sqlsrv:Server=db1.internal,1533;Database=Sales;LoginTimeout=3"
    );

    let reporting = ConnectionDescriptor::from_named_config(&table, "reporting")?;
    assert_eq!(
        reporting.dsn(),
        "sqlsrv:Server=db2.internal\\REPORTS;Database=Reporting"
    );
    assert_eq!(reporting.effective_port(), 1433);
    assert_eq!(reporting.charset(), Encoding::Utf8);
    assert_eq!(reporting.login_timeout(), Duration::from_secs(10));
    Ok(())
}

#[test]
fn named_entry_errors() -> Result<(), Box<dyn std::error::Error>> {
    let file = write_config()?;
    let table = ConnectionTable::from_json_file(file.path())?;

    let err = ConnectionDescriptor::from_named_config(&table, "archive").unwrap_err();
    assert!(matches!(err, SqlSrvError::ConfigError(msg) if msg.contains("'archive'")));

    let err = ConnectionDescriptor::from_named_config(&table, "broken").unwrap_err();
    assert!(matches!(
        err,
        SqlSrvError::MissingCredential {
            field: "password",
            ..
        }
    ));

    let dir = tempfile::tempdir()?;
    let err = ConnectionTable::from_json_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, SqlSrvError::ConfigError(msg) if msg.starts_with("cannot read")));

    let err = ConnectionTable::from_json_str("{\"connections\": [").unwrap_err();
    assert!(matches!(err, SqlSrvError::ConfigError(_)));
    Ok(())
}

#[test]
fn environment_prefix_lookup() -> Result<(), SqlSrvError> {
    let vars: HashMap<&str, &str> = [
        ("HR_SQLSRV_NAME", "db9"),
        ("HR_SQLSRV_PORT", "1444"),
        ("HR_SQLSRV_DATABASE", "People"),
        ("HR_SQLSRV_USER", "hr_app"),
        ("HR_SQLSRV_PASS", "pw"),
        ("HR_SQLSRV_CHARSET", "UTF-8"),
    ]
    .into_iter()
    .collect();
    let lookup = |key: &str| vars.get(key).map(|v| (*v).to_string());

    let descriptor = ConnectionDescriptor::from_env_lookup("HR", lookup)?;
    assert_eq!(descriptor.dsn(), "sqlsrv:Server=db9,1444;Database=People");
    assert_eq!(descriptor.username(), "hr_app");
    assert_eq!(descriptor.charset(), Encoding::Utf8);

    let err = ConnectionDescriptor::from_env_lookup("PAYROLL", lookup).unwrap_err();
    assert!(matches!(err, SqlSrvError::MissingCredential { field: "host", .. }));
    Ok(())
}

#[tokio::test]
async fn named_source_registers_under_its_entry_name() -> Result<(), Box<dyn std::error::Error>> {
    let file = write_config()?;
    let table = ConnectionTable::from_json_file(file.path())?;
    let driver = MemoryDriver::new();
    let registry = Arc::new(ConnectionRegistry::new(Arc::new(driver.clone())));

    let sales = Session::connect(
        &registry,
        CredentialSource::Named {
            table: table.clone(),
            name: "sales".into(),
        },
    )
    .await?;
    let again = Session::connect(
        &registry,
        CredentialSource::Named {
            table,
            name: "sales".into(),
        },
    )
    .await?;

    assert_eq!(sales.name(), "sales");
    assert!(Arc::ptr_eq(sales.handle(), again.handle()));
    assert_eq!(
        driver.calls(),
        vec![
            DriverCall::Connect {
                conn: "Sales".into(),
                dsn: "sqlsrv:Server=db1.internal,1533;Database=Sales".into(),
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
async fn resolver_errors_surface_before_connecting() {
    let driver = MemoryDriver::new();
    let registry = Arc::new(ConnectionRegistry::new(Arc::new(driver.clone())));
    let mut inline = HashMap::new();
    inline.insert("host".to_string(), "db1".to_string());
    inline.insert("database".to_string(), "Sales".to_string());
    inline.insert("user".to_string(), "   ".to_string());

    let err = Session::connect(&registry, CredentialSource::Inline(inline))
        .await
        .unwrap_err();

    assert!(matches!(err, SqlSrvError::MissingCredential { field: "username", .. }));
    assert!(driver.calls().is_empty());
    assert!(registry.is_empty().await);
}
