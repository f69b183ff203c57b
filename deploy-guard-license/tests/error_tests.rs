use deploy_guard_api::ApiError;
use deploy_guard_license::LicenseError;
use pretty_assertions::assert_eq;

// ── Code mapping ─────────────────────────────────────────────────

#[test]
fn inactive_and_not_found_are_plain_invalid() {
    assert!(matches!(
        LicenseError::from_code("license_inactive"),
        LicenseError::Invalid { code: None }
    ));
    assert!(matches!(
        LicenseError::from_code("license_not_found"),
        LicenseError::Invalid { code: None }
    ));
}

#[test]
fn unknown_code_is_displayed() {
    let err = LicenseError::from_code("weird");
    assert_eq!(err.to_string(), "license invalid: weird");
}

// ── Transport mapping ────────────────────────────────────────────

#[test]
fn status_with_code_maps_through_from_code() {
    let err: LicenseError = ApiError::Status {
        status: 403,
        code: Some("license_suspended".to_string()),
    }
    .into();
    assert!(matches!(err, LicenseError::Suspended));
}

#[test]
fn status_without_code_is_transient() {
    let err: LicenseError = ApiError::Status {
        status: 502,
        code: None,
    }
    .into();
    assert!(matches!(err, LicenseError::Network(_)));
    assert!(err.is_transient());
}

#[test]
fn decode_failure_is_transient() {
    let err: LicenseError = ApiError::Decode("eof".to_string()).into();
    assert!(matches!(err, LicenseError::InvalidServerResponse(_)));
    assert!(err.is_transient());
}

#[test]
fn invalid_url_is_config() {
    let err: LicenseError = ApiError::InvalidUrl("ftp://x".to_string()).into();
    assert!(matches!(err, LicenseError::Config(_)));
    assert!(!err.is_transient());
}

#[test]
fn rejections_are_not_transient() {
    for err in [
        LicenseError::Expired,
        LicenseError::MachineBanned,
        LicenseError::Suspended,
        LicenseError::ProjectNotAuthorized,
        LicenseError::MaxMachinesExceeded,
    ] {
        assert!(!err.is_transient(), "{err}");
    }
}
