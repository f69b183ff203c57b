//! Download metadata exchange and size/time-limited artifact streaming.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use deploy_guard_api::{
    endpoints, ApiError, AuthorityClient, DownloadRequest, DownloadResponse,
};
use deploy_guard_crypto::StreamDigest;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{UpdateError, UpdateResult};

/// Who is asking for an artifact. Sent with every download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestScope {
    pub license_key: String,
    pub machine_id: String,
    pub project_slug: String,
}

/// Where to fetch an artifact and what it must hash to.
#[derive(Debug, Clone)]
pub(crate) struct ArtifactMeta {
    pub url: String,
    pub sha256: String,
    pub signature: Option<String>,
}

pub(crate) async fn request_meta(
    client: &AuthorityClient,
    scope: &RequestScope,
    component: &str,
    version: &str,
    os: &str,
    arch: &str,
    timeout: Duration,
) -> UpdateResult<ArtifactMeta> {
    let request = DownloadRequest {
        license_key: scope.license_key.clone(),
        machine_id: scope.machine_id.clone(),
        project_slug: scope.project_slug.clone(),
        component_slug: component.to_string(),
        version: version.to_string(),
        os: os.to_string(),
        arch: arch.to_string(),
    };
    let response: DownloadResponse =
        tokio::time::timeout(timeout, client.post_json(endpoints::UPDATE_DOWNLOAD, &request))
            .await
            .map_err(|_| timed_out(timeout))??;

    if let Some(code) = response.error_code() {
        return Err(UpdateError::Download(format!("server error: {code}")));
    }
    if response.download_url.is_empty() {
        return Err(UpdateError::Download(
            "server returned no download URL".to_string(),
        ));
    }

    let signature = response.signature().map(str::to_string);
    Ok(ArtifactMeta {
        url: response.download_url,
        sha256: response.sha256,
        signature,
    })
}

/// Streams the artifact into a temp file inside `dir` and returns it with
/// its SHA-256. The temp file is removed if anything fails.
pub(crate) async fn download_to_file(
    client: &AuthorityClient,
    url: &str,
    dir: &Path,
    max_bytes: u64,
    timeout: Duration,
) -> UpdateResult<(TempPath, String)> {
    let staged = tempfile::Builder::new()
        .prefix(".deploy-guard-")
        .tempfile_in(dir)
        .map_err(|e| UpdateError::Apply(format!("stage artifact in {}: {e}", dir.display())))?;
    let (file, path) = staged.into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let fetch = async {
        let mut response = client.download(url).await?;
        let mut digest = StreamDigest::with_limit(max_bytes);
        while let Some(chunk) = response.chunk().await.map_err(ApiError::from)? {
            digest.update(&chunk)?;
            file.write_all(&chunk)
                .await
                .map_err(|e| UpdateError::Download(format!("write artifact: {e}")))?;
        }
        file.flush()
            .await
            .and(file.sync_all().await)
            .map_err(|e| UpdateError::Download(format!("flush artifact: {e}")))?;
        debug!(bytes = digest.len(), "artifact downloaded");
        Ok::<_, UpdateError>(digest.finalize_hex())
    };

    let digest = tokio::time::timeout(timeout, fetch)
        .await
        .map_err(|_| timed_out(timeout))??;
    Ok((path, digest))
}

/// Streams the artifact into `sink` and returns its SHA-256.
///
/// If the receiving side goes away early the rest of the body is still
/// read, so the digest always covers the full download.
pub(crate) async fn download_to_channel(
    client: &AuthorityClient,
    url: &str,
    max_bytes: u64,
    timeout: Duration,
    sink: mpsc::Sender<Bytes>,
) -> UpdateResult<String> {
    let fetch = async move {
        let mut sink = Some(sink);
        let mut response = client.download(url).await?;
        let mut digest = StreamDigest::with_limit(max_bytes);
        while let Some(chunk) = response.chunk().await.map_err(ApiError::from)? {
            digest.update(&chunk)?;
            let closed = match &sink {
                Some(tx) => tx.send(chunk).await.is_err(),
                None => false,
            };
            if closed {
                debug!("bundle reader stopped early, hashing the remainder");
                sink = None;
            }
        }
        debug!(bytes = digest.len(), "bundle downloaded");
        Ok::<_, UpdateError>(digest.finalize_hex())
    };

    tokio::time::timeout(timeout, fetch)
        .await
        .map_err(|_| timed_out(timeout))?
}

fn timed_out(timeout: Duration) -> UpdateError {
    UpdateError::Download(format!("timed out after {}s", timeout.as_secs_f64()))
}
