//! Tenant resolution
//!
//! Provides:
//! - The tenant registry mapping a credential to exactly one tenant
//! - Credential digests (keys are only held as SHA-256 digests)
//! - An axum extractor resolving the caller's tenant from the API key header
//!
//! The registry is populated once at startup and read concurrently
//! afterwards; nothing in the request path consults ambient tenant state.

use crate::config::TenantConfig;
use crate::errors::{AppError, Result};
use crate::models::TenantId;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

/// Longest credential accepted before hashing
pub const MAX_CREDENTIAL_LEN: usize = 256;

type Digest32 = [u8; 32];

/// Registry of tenants keyed by credential digest
#[derive(Debug)]
pub struct TenantRegistry {
    by_digest: HashMap<Digest32, TenantId>,
    tenants: Vec<TenantId>,
    header_name: String,
}

impl TenantRegistry {
    /// Build the registry from configuration.
    ///
    /// Duplicate tenant ids and duplicate credentials are rejected so that a
    /// credential can never resolve to more than one tenant.
    pub fn from_config(tenants: &[TenantConfig], header_name: impl Into<String>) -> Result<Self> {
        let mut by_digest = HashMap::with_capacity(tenants.len());
        let mut ids: Vec<TenantId> = Vec::with_capacity(tenants.len());

        for entry in tenants {
            let tenant_id = TenantId::parse(&entry.id)?;
            if ids.contains(&tenant_id) {
                return Err(AppError::Configuration {
                    message: format!("tenant {} registered twice", tenant_id),
                });
            }
            if !is_well_formed(&entry.api_key) {
                return Err(AppError::Configuration {
                    message: format!("tenant {} has a malformed api key", tenant_id),
                });
            }
            if by_digest
                .insert(digest(&entry.api_key), tenant_id.clone())
                .is_some()
            {
                return Err(AppError::Configuration {
                    message: format!("tenant {} reuses another tenant's api key", tenant_id),
                });
            }
            ids.push(tenant_id);
        }

        ids.sort();
        tracing::info!(tenants = ids.len(), "Tenant registry loaded");

        Ok(Self {
            by_digest,
            tenants: ids,
            header_name: header_name.into(),
        })
    }

    /// Resolve a credential to its tenant.
    ///
    /// Absent, malformed and unknown credentials all fail the same way.
    pub fn resolve(&self, credential: Option<&str>) -> Result<TenantId> {
        let credential = credential.ok_or_else(|| AppError::Unauthorized {
            message: format!("Missing {} header", self.header_name),
        })?;
        if !is_well_formed(credential) {
            return Err(AppError::InvalidApiKey);
        }
        self.by_digest
            .get(&digest(credential))
            .cloned()
            .ok_or(AppError::InvalidApiKey)
    }

    /// All registered tenants, sorted by id
    pub fn tenants(&self) -> &[TenantId] {
        &self.tenants
    }

    /// Name of the header carrying the credential
    pub fn header_name(&self) -> &str {
        &self.header_name
    }
}

fn digest(api_key: &str) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hasher.finalize().into()
}

fn is_well_formed(credential: &str) -> bool {
    !credential.trim().is_empty()
        && credential.len() <= MAX_CREDENTIAL_LEN
        && credential.bytes().all(|b| b.is_ascii_graphic())
}

/// The tenant resolved from the request's API key header
#[derive(Debug, Clone)]
pub struct AuthenticatedTenant {
    pub tenant_id: TenantId,
}

/// Axum extractor for AuthenticatedTenant
impl<S> FromRequestParts<S> for AuthenticatedTenant
where
    Arc<TenantRegistry>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let registry = Arc::<TenantRegistry>::from_ref(state);

        let header = parts.headers.get(registry.header_name());
        let credential = match header {
            Some(value) => Some(value.to_str().map_err(|_| AppError::InvalidApiKey)?),
            None => None,
        };

        let tenant_id = registry.resolve(credential)?;
        tracing::Span::current().record("tenant_id", tracing::field::display(&tenant_id));

        Ok(AuthenticatedTenant { tenant_id })
    }
}
