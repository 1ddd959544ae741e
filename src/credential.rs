use std::env;

use crate::error::{PaapiError, Result};

/// Access key pair plus the partner (associate) tag requests are attributed to.
///
/// The `Debug` implementation redacts `secret_key` to prevent accidental
/// leakage in logs.
#[derive(Clone)]
pub struct Credential {
    pub access_key: String,
    pub secret_key: String,
    pub partner_tag: String,
}

impl Credential {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        partner_tag: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            partner_tag: partner_tag.into(),
        }
    }

    /// Fails with a configuration error if any field is empty.
    pub fn validate(&self) -> Result<()> {
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(PaapiError::Configuration(
                "access key and secret key must be provided".into(),
            ));
        }
        if self.partner_tag.is_empty() {
            return Err(PaapiError::Configuration(
                "partner tag must be provided".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_key", &self.access_key)
            .field("secret_key", &"****")
            .field("partner_tag", &self.partner_tag)
            .finish()
    }
}

/// Resolves a [`Credential`] from a specific source.
pub trait CredentialProvider {
    /// Attempt to resolve a credential from this provider.
    fn resolve(&self) -> Result<Credential>;
}

/// Provides a credential from explicitly specified values.
pub struct StaticProvider {
    credential: Credential,
}

impl StaticProvider {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        partner_tag: impl Into<String>,
    ) -> Self {
        Self {
            credential: Credential::new(access_key, secret_key, partner_tag),
        }
    }
}

impl CredentialProvider for StaticProvider {
    fn resolve(&self) -> Result<Credential> {
        self.credential.validate()?;
        Ok(self.credential.clone())
    }
}

/// Provides a credential from environment variables.
///
/// [`EnvProvider::new`] reads `PAAPI_ACCESS_KEY`, `PAAPI_SECRET_KEY` and
/// `PAAPI_PARTNER_TAG`; [`EnvProvider::legacy`] reads the unprefixed
/// `ACCESS_KEY`, `SECRET_KEY` and `ASSOCIATE_TAG` used by existing deployments.
pub struct EnvProvider {
    access_key_var: String,
    secret_key_var: String,
    partner_tag_var: String,
}

impl Default for EnvProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvProvider {
    pub fn new() -> Self {
        Self::with_names("PAAPI_ACCESS_KEY", "PAAPI_SECRET_KEY", "PAAPI_PARTNER_TAG")
    }

    pub fn legacy() -> Self {
        Self::with_names("ACCESS_KEY", "SECRET_KEY", "ASSOCIATE_TAG")
    }

    /// Reads the credential from custom variable names.
    pub fn with_names(
        access_key_var: impl Into<String>,
        secret_key_var: impl Into<String>,
        partner_tag_var: impl Into<String>,
    ) -> Self {
        Self {
            access_key_var: access_key_var.into(),
            secret_key_var: secret_key_var.into(),
            partner_tag_var: partner_tag_var.into(),
        }
    }

    fn read(name: &str) -> Result<String> {
        match env::var(name) {
            Ok(value) if !value.is_empty() => Ok(value),
            Ok(_) => Err(PaapiError::Configuration(format!("{name} is empty"))),
            Err(_) => Err(PaapiError::Configuration(format!("{name} not set"))),
        }
    }
}

impl CredentialProvider for EnvProvider {
    fn resolve(&self) -> Result<Credential> {
        Ok(Credential {
            access_key: Self::read(&self.access_key_var)?,
            secret_key: Self::read(&self.secret_key_var)?,
            partner_tag: Self::read(&self.partner_tag_var)?,
        })
    }
}

/// Tries multiple credential providers in order and returns the first success.
pub struct ChainProvider {
    providers: Vec<Box<dyn CredentialProvider>>,
}

impl ChainProvider {
    /// Creates a chain with the given providers.
    pub fn new(providers: Vec<Box<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }

    /// Creates the default credential chain: prefixed env vars → legacy env vars.
    pub fn default_chain() -> Self {
        Self {
            providers: vec![Box::new(EnvProvider::new()), Box::new(EnvProvider::legacy())],
        }
    }
}

impl CredentialProvider for ChainProvider {
    fn resolve(&self) -> Result<Credential> {
        let mut last_err = PaapiError::Configuration("no credential providers configured".into());
        for provider in &self.providers {
            match provider.resolve() {
                Ok(cred) => return Ok(cred),
                Err(e) => last_err = e,
            }
        }
        Err(PaapiError::Configuration(format!(
            "all credential providers failed, last error: {last_err}"
        )))
    }
}
