//! # Fetch-If-Missing
//!
//! Each artifact (OVMF code image, OVMF variables template, qcow2 disk
//! image) is keyed by a (url, local path) pair. Presence of the local path
//! is the completion marker: a file that exists is never fetched again.
//!
//! To keep that marker trustworthy, transfers stream into a `.partial`
//! sibling and are renamed into place only after the body has been fully
//! read. An interrupted download therefore never leaves a truncated file at
//! the final path for a later run to mistake for a completed one.

use std::path::{Path, PathBuf};

use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("Source {0} is unreachable: {1}")]
    SourceUnreachable(Url, String),
    #[error("Transfer from {0} failed: {1}")]
    Transfer(Url, String),
    #[error("Could not write {0}, reason: {1}")]
    Io(PathBuf, String),
}

/// Whether the artifact was present already or had to be transferred
#[derive(Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    AlreadyPresent,
    Downloaded { bytes: u64 },
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Lightweight reachability probe, run before anything is written to the
/// destination.
async fn probe(client: &Client, url: &Url) -> Result<(), FetchError> {
    let response = client
        .head(url.clone())
        .send()
        .await
        .map_err(|e| FetchError::SourceUnreachable(url.clone(), e.to_string()))?;
    if !response.status().is_success() {
        return Err(FetchError::SourceUnreachable(
            url.clone(),
            format!("status {}", response.status()),
        ));
    }
    Ok(())
}

/// Make sure the artifact at `url` exists at `path`, downloading it if
/// absent. No integrity check is performed on a file that already exists;
/// idempotence is keyed on presence of the final path alone.
#[instrument(skip(client, url, path), fields(url = %url, path = %path.display()))]
pub async fn ensure_fetched(
    client: &Client,
    url: &Url,
    path: &Path,
) -> Result<FetchOutcome, FetchError> {
    if path.is_file() {
        info!("Artifact already present, skipping fetch");
        return Ok(FetchOutcome::AlreadyPresent);
    }

    probe(client, url).await?;

    info!("Downloading artifact");
    let mut response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| FetchError::Transfer(url.clone(), e.to_string()))?
        .error_for_status()
        .map_err(|e| FetchError::Transfer(url.clone(), e.to_string()))?;

    let partial = partial_path(path);
    let mut file = BufWriter::new(
        File::create(&partial)
            .await
            .map_err(|e| FetchError::Io(partial.clone(), e.to_string()))?,
    );

    let mut bytes: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| FetchError::Transfer(url.clone(), e.to_string()))?
    {
        bytes += chunk.len() as u64;
        file.write_all(&chunk)
            .await
            .map_err(|e| FetchError::Io(partial.clone(), e.to_string()))?;
    }

    file.flush()
        .await
        .map_err(|e| FetchError::Io(partial.clone(), e.to_string()))?;

    // The final path only ever appears once the body has been fully read
    tokio::fs::rename(&partial, path)
        .await
        .map_err(|e| FetchError::Io(path.to_path_buf(), e.to_string()))?;

    debug!("Fetched {} bytes", bytes);
    Ok(FetchOutcome::Downloaded { bytes })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use reqwest::Client;
    use tempfile::tempdir;
    use url::Url;

    use super::{ensure_fetched, partial_path, FetchError, FetchOutcome};

    fn artifact_url(server: &mockito::Server) -> Url {
        Url::parse(&format!("{}/artifact", server.url())).unwrap()
    }

    #[test]
    fn partial_sibling_name() {
        let path = std::path::Path::new("/images/guest.qcow2");
        assert_eq!(
            partial_path(path),
            std::path::PathBuf::from("/images/guest.qcow2.partial")
        );
    }

    #[tokio::test]
    async fn present_file_performs_no_request() {
        let mut server = mockito::Server::new_async().await;
        let head = server.mock("HEAD", "/artifact").expect(0).create_async().await;
        let get = server.mock("GET", "/artifact").expect(0).create_async().await;

        let dir = tempdir().expect("failed to create temporary directory");
        let path = dir.path().join("artifact");
        std::fs::write(&path, b"existing").unwrap();

        let outcome = ensure_fetched(&Client::new(), &artifact_url(&server), &path)
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::AlreadyPresent);
        assert_eq!(std::fs::read(&path).unwrap(), b"existing");
        head.assert_async().await;
        get.assert_async().await;
    }

    #[tokio::test]
    async fn downloads_and_renames_into_place() {
        let mut server = mockito::Server::new_async().await;
        let head = server.mock("HEAD", "/artifact").create_async().await;
        let get = server
            .mock("GET", "/artifact")
            .with_body("firmware-bytes")
            .create_async()
            .await;

        let dir = tempdir().expect("failed to create temporary directory");
        let path = dir.path().join("artifact");

        let outcome = ensure_fetched(&Client::new(), &artifact_url(&server), &path)
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Downloaded { bytes: 14 });
        assert_eq!(std::fs::read(&path).unwrap(), b"firmware-bytes");
        assert!(!partial_path(&path).exists());
        head.assert_async().await;
        get.assert_async().await;
    }

    #[tokio::test]
    async fn unreachable_source_writes_nothing() {
        let mut server = mockito::Server::new_async().await;
        let _head = server
            .mock("HEAD", "/artifact")
            .with_status(404)
            .create_async()
            .await;
        let get = server.mock("GET", "/artifact").expect(0).create_async().await;

        let dir = tempdir().expect("failed to create temporary directory");
        let path = dir.path().join("artifact");

        let result = ensure_fetched(&Client::new(), &artifact_url(&server), &path).await;
        assert!(matches!(result, Err(FetchError::SourceUnreachable(_, _))));
        assert!(!path.exists());
        assert!(!partial_path(&path).exists());
        get.assert_async().await;
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let dir = tempdir().expect("failed to create temporary directory");
        let path = dir.path().join("artifact");
        let url = Url::parse("http://127.0.0.1:1/artifact").unwrap();

        let result = ensure_fetched(&Client::new(), &url, &path).await;
        assert!(matches!(result, Err(FetchError::SourceUnreachable(_, _))));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn failed_transfer_leaves_no_final_file() {
        let mut server = mockito::Server::new_async().await;
        let _head = server.mock("HEAD", "/artifact").create_async().await;
        let _get = server
            .mock("GET", "/artifact")
            .with_status(500)
            .create_async()
            .await;

        let dir = tempdir().expect("failed to create temporary directory");
        let path = dir.path().join("artifact");

        let result = ensure_fetched(&Client::new(), &artifact_url(&server), &path).await;
        assert!(matches!(result, Err(FetchError::Transfer(_, _))));
        assert!(!path.exists());
    }
}
