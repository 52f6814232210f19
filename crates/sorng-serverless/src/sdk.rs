//! Generated client SDK download and install.
//!
//! API Gateway hands back a zip whose only top-level entry is the SDK
//! directory. The archive is staged in a private temporary directory and
//! checked before anything is written under the caller's output directory.

use crate::apigateway::GatewayApi;
use crate::client::ByteStream;
use crate::error::{ServerlessError, ServerlessResult};
use futures::StreamExt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub const DEFAULT_STAGE_NAME: &str = "api";
pub const DEFAULT_SDK_KIND: &str = "javascript";

/// Name the extracted SDK directory is installed under.
pub fn installed_dir_name(sdk_kind: &str) -> String {
    format!("chalice-{}-sdk", sdk_kind)
}

pub async fn get_sdk_download_stream(
    gateway: &dyn GatewayApi,
    rest_api_id: &str,
    stage_name: &str,
    sdk_kind: &str,
) -> ServerlessResult<ByteStream> {
    Ok(gateway.get_sdk(rest_api_id, stage_name, sdk_kind).await?)
}

/// Download the SDK for `rest_api_id`/`stage_name` and install it as
/// `output_dir/chalice-<kind>-sdk`. Returns the installed path.
///
/// `output_dir` is left untouched when the download fails or the archive
/// does not hold exactly one top-level directory.
pub async fn fetch_sdk(
    gateway: &dyn GatewayApi,
    rest_api_id: &str,
    stage_name: &str,
    sdk_kind: &str,
    output_dir: &Path,
) -> ServerlessResult<PathBuf> {
    let staging = tempfile::tempdir().map_err(|e| ServerlessError::io(std::env::temp_dir(), e))?;
    let zip_path = staging.path().join("sdk.zip");

    let mut stream = get_sdk_download_stream(gateway, rest_api_id, stage_name, sdk_kind).await?;
    let mut file = tokio::fs::File::create(&zip_path)
        .await
        .map_err(|e| ServerlessError::io(&zip_path, e))?;
    let mut written = 0usize;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        written += chunk.len();
        file.write_all(&chunk)
            .await
            .map_err(|e| ServerlessError::io(&zip_path, e))?;
    }
    file.flush().await.map_err(|e| ServerlessError::io(&zip_path, e))?;
    drop(file);
    log::debug!("Downloaded {} byte {} SDK for {}", written, sdk_kind, rest_api_id);

    let extract_dir = staging.path().join("extracted");
    let final_name = installed_dir_name(sdk_kind);
    let output_dir = output_dir.to_path_buf();
    let installed = tokio::task::spawn_blocking(move || {
        extract_archive(&zip_path, &extract_dir)?;
        install_single_dir(&extract_dir, &final_name, &output_dir)
    })
    .await
    .map_err(|e| ServerlessError::io(staging.path(), io::Error::new(io::ErrorKind::Other, e)))??;

    log::info!("Installed {} SDK at {}", sdk_kind, installed.display());
    Ok(installed)
}

fn extract_archive(zip_path: &Path, extract_dir: &Path) -> ServerlessResult<()> {
    let file = fs::File::open(zip_path).map_err(|e| ServerlessError::io(zip_path, e))?;
    let mut archive = zip::ZipArchive::new(file)?;
    archive.extract(extract_dir)?;
    Ok(())
}

/// Rename the single top-level directory of `extract_dir` to `final_name`
/// and move it into `output_dir`.
fn install_single_dir(extract_dir: &Path, final_name: &str, output_dir: &Path) -> ServerlessResult<PathBuf> {
    let mut entries = Vec::new();
    if extract_dir.exists() {
        for entry in fs::read_dir(extract_dir).map_err(|e| ServerlessError::io(extract_dir, e))? {
            let entry = entry.map_err(|e| ServerlessError::io(extract_dir, e))?;
            entries.push(entry.path());
        }
    }
    let sdk_dir = match entries.as_slice() {
        [only] if only.is_dir() => only.clone(),
        _ => {
            let mut names: Vec<String> = entries
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect();
            names.sort();
            return Err(ServerlessError::UnexpectedSdkLayout { entries: names });
        }
    };

    let renamed = extract_dir.join(final_name);
    if sdk_dir != renamed {
        fs::rename(&sdk_dir, &renamed).map_err(|e| ServerlessError::io(&sdk_dir, e))?;
    }

    fs::create_dir_all(output_dir).map_err(|e| ServerlessError::io(output_dir, e))?;
    let destination = output_dir.join(final_name);
    if destination.exists() {
        return Err(ServerlessError::io(
            &destination,
            io::Error::new(io::ErrorKind::AlreadyExists, "destination path already exists"),
        ));
    }
    if fs::rename(&renamed, &destination).is_err() {
        // Different filesystem: copy, then drop the staged copy.
        copy_dir(&renamed, &destination)?;
        fs::remove_dir_all(&renamed).map_err(|e| ServerlessError::io(&renamed, e))?;
    }
    Ok(destination)
}

fn copy_dir(from: &Path, to: &Path) -> ServerlessResult<()> {
    fs::create_dir_all(to).map_err(|e| ServerlessError::io(to, e))?;
    for entry in fs::read_dir(from).map_err(|e| ServerlessError::io(from, e))? {
        let entry = entry.map_err(|e| ServerlessError::io(from, e))?;
        let src = entry.path();
        let dst = to.join(entry.file_name());
        if src.is_dir() {
            copy_dir(&src, &dst)?;
        } else {
            fs::copy(&src, &dst).map_err(|e| ServerlessError::io(&src, e))?;
        }
    }
    Ok(())
}
