//! Client configuration assembly.
//!
//! Composes what the orchestrator knows (bootstrap address, security settings)
//! with caller-supplied credentials into the property map a Kafka client needs.

use std::collections::HashMap;

use crate::Error;
use crate::Result;
use crate::SecurityConfig;
use crate::StoreConfig;
use crate::UserCredentials;

pub const BOOTSTRAP_SERVERS_CONFIG: &str = "bootstrap.servers";
pub const SECURITY_PROTOCOL_CONFIG: &str = "security.protocol";
pub const SASL_MECHANISM_CONFIG: &str = "sasl.mechanism";
pub const SASL_JAAS_CONFIG: &str = "sasl.jaas.config";
pub const SSL_TRUSTSTORE_LOCATION_CONFIG: &str = "ssl.truststore.location";
pub const SSL_TRUSTSTORE_PASSWORD_CONFIG: &str = "ssl.truststore.password";
pub const SSL_TRUSTSTORE_TYPE_CONFIG: &str = "ssl.truststore.type";
pub const SSL_KEYSTORE_LOCATION_CONFIG: &str = "ssl.keystore.location";
pub const SSL_KEYSTORE_PASSWORD_CONFIG: &str = "ssl.keystore.password";
pub const SSL_KEYSTORE_TYPE_CONFIG: &str = "ssl.keystore.type";

/// Client configuration using the configured user, if any.
pub fn client_configuration(
    bootstrap_servers: &str,
    security: &SecurityConfig,
) -> Result<HashMap<String, String>> {
    assemble(bootstrap_servers, security, security.user.as_ref())
}

/// Client configuration authenticating as `credentials`.
///
/// # Errors
/// `Error::InvalidConfig` when the cluster has no SASL mechanism to use them with.
pub fn client_configuration_with_credentials(
    bootstrap_servers: &str,
    security: &SecurityConfig,
    credentials: &UserCredentials,
) -> Result<HashMap<String, String>> {
    if security.mechanism()?.is_none() {
        return Err(Error::InvalidConfig(
            "credentials supplied but no sasl_mechanism is configured".into(),
        ));
    }
    assemble(bootstrap_servers, security, Some(credentials))
}

fn assemble(
    bootstrap_servers: &str,
    security: &SecurityConfig,
    credentials: Option<&UserCredentials>,
) -> Result<HashMap<String, String>> {
    let protocol = security.effective_protocol();

    let mut config = HashMap::new();
    config.insert(BOOTSTRAP_SERVERS_CONFIG.to_string(), bootstrap_servers.to_string());
    config.insert(SECURITY_PROTOCOL_CONFIG.to_string(), protocol.as_str().to_string());

    if protocol.is_tls() {
        if let Some(truststore) = &security.client_truststore {
            insert_store(
                &mut config,
                truststore,
                [
                    SSL_TRUSTSTORE_LOCATION_CONFIG,
                    SSL_TRUSTSTORE_PASSWORD_CONFIG,
                    SSL_TRUSTSTORE_TYPE_CONFIG,
                ],
            );
        }
        if let Some(keystore) = &security.client_keystore {
            insert_store(
                &mut config,
                keystore,
                [
                    SSL_KEYSTORE_LOCATION_CONFIG,
                    SSL_KEYSTORE_PASSWORD_CONFIG,
                    SSL_KEYSTORE_TYPE_CONFIG,
                ],
            );
        }
    }

    if protocol.is_sasl() {
        let mechanism = security.mechanism()?.ok_or_else(|| {
            Error::InvalidConfig(format!("security_protocol {protocol} requires a sasl_mechanism"))
        })?;
        config.insert(SASL_MECHANISM_CONFIG.to_string(), mechanism.as_str().to_string());

        if let Some(user) = credentials {
            config.insert(
                SASL_JAAS_CONFIG.to_string(),
                format!(
                    "{} required username=\"{}\" password=\"{}\";",
                    mechanism.login_module(),
                    jaas_quote(&user.username),
                    jaas_quote(&user.password)
                ),
            );
        }
    }

    Ok(config)
}

fn insert_store(
    config: &mut HashMap<String, String>,
    store: &StoreConfig,
    [location, password, store_type]: [&str; 3],
) {
    config.insert(location.to_string(), store.location.display().to_string());
    config.insert(password.to_string(), store.password.clone());
    config.insert(store_type.to_string(), store.store_type.clone());
}

/// Escapes a value for use inside a double-quoted JAAS option.
fn jaas_quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
