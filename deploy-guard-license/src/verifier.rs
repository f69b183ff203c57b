//! License verification: trusted cache first, authority second.

use std::sync::Arc;

use chrono::Utc;
use deploy_guard_api::{endpoints, AuthorityClient, VerifyRequest, VerifyResponse};
use deploy_guard_crypto::TrustVerifier;
use tracing::{debug, info, warn};

use crate::cache::{CachedLicense, LicenseCache};
use crate::device::{hostname, IdentityProvider};
use crate::error::{LicenseError, LicenseResult};

/// The license and scope being verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseSubject {
    pub license_key: String,
    pub project_slug: String,
    pub component_slug: String,
}

/// How a successful verification was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// A trusted cache entry was found; no request was made.
    Cached(CachedLicense),
    /// The authority accepted the license.
    Remote {
        /// The authority has frozen updates for this license.
        update_frozen: bool,
    },
}

/// Verifies a license against the local cache or the authority.
pub struct LicenseVerifier {
    client: AuthorityClient,
    trust: Arc<dyn TrustVerifier>,
    identity: Arc<dyn IdentityProvider>,
    subject: LicenseSubject,
    cache: LicenseCache,
}

impl LicenseVerifier {
    pub fn new(
        client: AuthorityClient,
        trust: Arc<dyn TrustVerifier>,
        identity: Arc<dyn IdentityProvider>,
        subject: LicenseSubject,
        cache: LicenseCache,
    ) -> Self {
        Self {
            client,
            trust,
            identity,
            subject,
            cache,
        }
    }

    /// Returns the cache this verifier reads and refreshes.
    pub fn cache(&self) -> &LicenseCache {
        &self.cache
    }

    /// Returns the subject being verified.
    pub fn subject(&self) -> &LicenseSubject {
        &self.subject
    }

    /// Verifies the license.
    ///
    /// A trusted cache entry short-circuits without touching the network.
    /// Otherwise one request is made; on success the returned assertion
    /// replaces the cache entry.
    ///
    /// # Errors
    ///
    /// Rejections map to their typed variants. Transport failures are
    /// [`LicenseError::Network`] and leave the cache untouched.
    pub async fn verify(&self) -> LicenseResult<Verification> {
        if let Some(cached) = self
            .cache
            .load_trusted(&self.subject.license_key, self.trust.as_ref())
        {
            debug!(verified_at = %cached.verified_at, "license verified from cache");
            return Ok(Verification::Cached(cached));
        }

        let request = self.build_request();
        let response: VerifyResponse = self.client.post_json(endpoints::VERIFY, &request).await?;

        if let Some(code) = response.error_code() {
            warn!(code, project = %self.subject.project_slug, "license rejected by authority");
            return Err(LicenseError::from_code(code));
        }

        let cached = CachedLicense {
            license_key: self.subject.license_key.clone(),
            public_data: response.public_data,
            signature: response.signature,
            verified_at: Utc::now(),
        };
        if !cached.is_trusted(self.trust.as_ref()) {
            warn!(
                "authority assertion does not verify against the configured key; \
                 it will not satisfy offline checks"
            );
        }
        if let Err(e) = self.cache.store(&cached) {
            warn!(error = %e, "failed to cache license assertion");
        }

        info!(
            project = %self.subject.project_slug,
            component = %self.subject.component_slug,
            "license verified by authority"
        );
        Ok(Verification::Remote {
            update_frozen: response.update_frozen,
        })
    }

    fn build_request(&self) -> VerifyRequest {
        let aux = self.identity.aux_signals();
        VerifyRequest {
            license_key: self.subject.license_key.clone(),
            machine_id: self.identity.machine_id().to_string(),
            aux_signals: aux.clone(),
            project_slug: self.subject.project_slug.clone(),
            hostname: hostname(),
            os: aux
                .get("os")
                .cloned()
                .unwrap_or_else(|| std::env::consts::OS.to_string()),
            arch: aux
                .get("arch")
                .cloned()
                .unwrap_or_else(|| std::env::consts::ARCH.to_string()),
            nonce: uuid::Uuid::new_v4().simple().to_string(),
            timestamp: Utc::now().timestamp(),
        }
    }
}
