use tiberius::{AuthMethod, Config as TiberiusConfig};
use tokio::net::TcpStream;
use tokio_util::compat::Compat;

use crate::credentials::ConnectionDescriptor;

/// Type alias for SQL Server client
pub type MssqlClient = tiberius::Client<Compat<TcpStream>>;

/// Translate a resolved descriptor into tiberius' configuration.
///
/// The port is always set; with an instance name the SQL Browser lookup
/// replaces it at connect time.
pub(crate) fn build_tiberius_config(descriptor: &ConnectionDescriptor) -> TiberiusConfig {
    let mut config = TiberiusConfig::new();
    config.host(descriptor.host());
    config.database(descriptor.database());
    config.port(descriptor.effective_port());
    config.authentication(AuthMethod::sql_server(
        descriptor.username(),
        descriptor.password(),
    ));
    if let Some(instance) = descriptor.instance() {
        config.instance_name(instance);
    }
    config.application_name(env!("CARGO_PKG_NAME"));
    config.trust_cert();
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_uses_default_port() {
        let descriptor = ConnectionDescriptor::builder("db1", "Sales", "sa", "x")
            .build()
            .unwrap();
        let config = build_tiberius_config(&descriptor);
        assert_eq!(config.get_addr(), "db1:1433");
    }

    #[test]
    fn address_uses_explicit_port() {
        let descriptor = ConnectionDescriptor::builder("db1", "Sales", "sa", "x")
            .port(Some(1500))
            .build()
            .unwrap();
        assert_eq!(build_tiberius_config(&descriptor).get_addr(), "db1:1500");
    }
}
