use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Protocol clients use to talk to the `External` listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityProtocol {
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

impl SecurityProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityProtocol::Plaintext => "PLAINTEXT",
            SecurityProtocol::Ssl => "SSL",
            SecurityProtocol::SaslPlaintext => "SASL_PLAINTEXT",
            SecurityProtocol::SaslSsl => "SASL_SSL",
        }
    }

    pub fn is_sasl(&self) -> bool {
        matches!(self, SecurityProtocol::SaslPlaintext | SecurityProtocol::SaslSsl)
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, SecurityProtocol::Ssl | SecurityProtocol::SaslSsl)
    }
}

impl fmt::Display for SecurityProtocol {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SASL mechanisms the client configuration knows how to express.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslMechanism {
    Plain,
    ScramSha256,
    ScramSha512,
}

impl SaslMechanism {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::ScramSha256 => "SCRAM-SHA-256",
            SaslMechanism::ScramSha512 => "SCRAM-SHA-512",
        }
    }

    /// JAAS login module class for this mechanism.
    pub fn login_module(&self) -> &'static str {
        match self {
            SaslMechanism::Plain => "org.apache.kafka.common.security.plain.PlainLoginModule",
            SaslMechanism::ScramSha256 | SaslMechanism::ScramSha512 => {
                "org.apache.kafka.common.security.scram.ScramLoginModule"
            }
        }
    }
}

impl FromStr for SaslMechanism {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PLAIN" => Ok(SaslMechanism::Plain),
            "SCRAM-SHA-256" => Ok(SaslMechanism::ScramSha256),
            "SCRAM-SHA-512" => Ok(SaslMechanism::ScramSha512),
            _ => Err(Error::UnsupportedSaslMechanism(s.to_string())),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
}

impl UserCredentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for UserCredentials {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("UserCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Location of a key or trust store handed to clients.
#[derive(Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    pub location: PathBuf,
    pub password: String,
    #[serde(default = "default_store_type")]
    pub store_type: String,
}

impl fmt::Debug for StoreConfig {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("location", &self.location)
            .field("store_type", &self.store_type)
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SecurityConfig {
    /// Explicit protocol; inferred from `sasl_mechanism` when absent
    #[serde(default)]
    pub security_protocol: Option<SecurityProtocol>,

    #[serde(default)]
    pub sasl_mechanism: Option<String>,

    /// Credentials used by the no-argument client configuration
    #[serde(default)]
    pub user: Option<UserCredentials>,

    #[serde(default)]
    pub client_truststore: Option<StoreConfig>,

    /// Client certificate for TLS client authentication
    #[serde(default)]
    pub client_keystore: Option<StoreConfig>,
}

impl SecurityConfig {
    /// Configured protocol, or SASL_PLAINTEXT when only a mechanism is set.
    pub fn effective_protocol(&self) -> SecurityProtocol {
        match (self.security_protocol, &self.sasl_mechanism) {
            (Some(protocol), _) => protocol,
            (None, Some(_)) => SecurityProtocol::SaslPlaintext,
            (None, None) => SecurityProtocol::Plaintext,
        }
    }

    pub fn mechanism(&self) -> Result<Option<SaslMechanism>> {
        self.sasl_mechanism.as_deref().map(SaslMechanism::from_str).transpose()
    }

    pub fn validate(&self) -> Result<()> {
        let protocol = self.effective_protocol();
        let mechanism = self.mechanism()?;

        match (protocol.is_sasl(), mechanism) {
            (true, None) => {
                return Err(Error::InvalidConfig(format!(
                    "security_protocol {protocol} requires a sasl_mechanism"
                )));
            }
            (false, Some(mechanism)) => {
                return Err(Error::InvalidConfig(format!(
                    "sasl_mechanism {} requires a SASL security_protocol, got {protocol}",
                    mechanism.as_str()
                )));
            }
            _ => {}
        }

        if mechanism.is_some() && self.user.is_none() {
            return Err(Error::InvalidConfig("sasl_mechanism requires a user".into()));
        }

        if !protocol.is_tls() && (self.client_truststore.is_some() || self.client_keystore.is_some())
        {
            return Err(Error::InvalidConfig(format!(
                "client stores are only used with TLS protocols, got {protocol}"
            )));
        }

        Ok(())
    }
}

fn default_store_type() -> String {
    "PKCS12".to_string()
}
