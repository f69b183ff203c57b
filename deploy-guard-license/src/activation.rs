//! One-time activation codes (CDKs) exchanged for a license key.

use deploy_guard_api::{endpoints, ActivateRequest, ActivationResult, AuthorityClient};
use tracing::info;

use crate::error::{LicenseError, LicenseResult};

/// Redeems `code` for `organization` at `server_url`.
///
/// # Errors
///
/// Empty inputs are [`LicenseError::Config`]; the CDK codes map to
/// [`LicenseError::CdkNotFound`], [`LicenseError::CdkAlreadyUsed`] and
/// [`LicenseError::CdkRevoked`].
pub async fn activate(
    server_url: &str,
    code: &str,
    organization: &str,
    email: Option<&str>,
) -> LicenseResult<ActivationResult> {
    if server_url.is_empty() {
        return Err(LicenseError::Config("server_url is required".to_string()));
    }
    let client = AuthorityClient::new(server_url)?;
    activate_with(&client, code, organization, email).await
}

/// Same as [`activate`], reusing an existing client.
pub async fn activate_with(
    client: &AuthorityClient,
    code: &str,
    organization: &str,
    email: Option<&str>,
) -> LicenseResult<ActivationResult> {
    if code.is_empty() {
        return Err(LicenseError::Config("activation code is required".to_string()));
    }
    if organization.is_empty() {
        return Err(LicenseError::Config("organization is required".to_string()));
    }

    let request = ActivateRequest {
        code: code.to_string(),
        organization: organization.to_string(),
        email: email.filter(|e| !e.is_empty()).map(str::to_string),
    };
    let result: ActivationResult = client.post_json(endpoints::ACTIVATE, &request).await?;
    if result.license_key.is_empty() {
        return Err(LicenseError::InvalidServerResponse(
            "activation response carries no license key".to_string(),
        ));
    }

    info!(project = %result.project_slug, "activation code redeemed");
    Ok(result)
}
