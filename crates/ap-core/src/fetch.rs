//! Dataset download, archive unpacking, and schema-file discovery.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ApError, Result};

/// Fetches a remote object into a local file.
pub trait DatasetSource: Send + Sync {
    fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

/// `http(s)://` via reqwest, `file://` via a local copy.
pub struct HttpSource {
    timeout: Duration,
}

impl HttpSource {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl DatasetSource for HttpSource {
    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            crate::io::ensure_dir(parent)?;
        }
        if let Some(local) = url.strip_prefix("file://") {
            std::fs::copy(local, dest)?;
            return Ok(());
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ApError::InvalidRequest(format!(
                "unsupported URL scheme in '{url}'"
            )));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ApError::Service(format!("cannot build HTTP client: {e}")))?;
        let mut resp = client
            .get(url)
            .send()
            .map_err(|e| ApError::Service(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ApError::Service(format!("server returned {}", resp.status())));
        }
        let mut out = File::create(dest)?;
        resp.copy_to(&mut out)
            .map_err(|e| ApError::Service(format!("download interrupted: {e}")))?;
        tracing::debug!(url, dest = %dest.display(), "download complete");
        Ok(())
    }
}

/// Last path segment of `url`, without query or fragment.
pub fn file_name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path.split_once("://").map_or(path, |(_, rest)| rest);
    // first segment is the host
    path.split('/')
        .skip(1)
        .filter(|s| !s.is_empty())
        .last()
        .unwrap_or("download")
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Tar,
    TarGzip,
    TarZstd,
    Zip,
}

fn kind_from_name(path: &Path) -> Option<ArchiveKind> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
        Some(ArchiveKind::TarZstd)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(ArchiveKind::TarGzip)
    } else if name.ends_with(".tar") {
        Some(ArchiveKind::Tar)
    } else if name.ends_with(".zip") {
        Some(ArchiveKind::Zip)
    } else {
        None
    }
}

/// Identify an archive by its leading bytes.
fn kind_from_magic(path: &Path) -> Result<Option<ArchiveKind>> {
    let mut head = Vec::with_capacity(512);
    File::open(path)?.take(512).read_to_end(&mut head)?;
    let kind = if head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") {
        Some(ArchiveKind::Zip)
    } else if head.starts_with(&[0x1f, 0x8b]) {
        Some(ArchiveKind::TarGzip)
    } else if head.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
        Some(ArchiveKind::TarZstd)
    } else if head.get(257..262) == Some(b"ustar".as_slice()) {
        Some(ArchiveKind::Tar)
    } else {
        None
    };
    Ok(kind)
}

fn archive_kind(path: &Path) -> Result<ArchiveKind> {
    if let Some(kind) = kind_from_name(path) {
        return Ok(kind);
    }
    kind_from_magic(path)?.ok_or_else(|| {
        ApError::InvalidRequest(format!("unsupported archive format: {}", path.display()))
    })
}

/// Unpack a zip, tar, gzip'd tar or zstd tar archive into `into`.
///
/// The format comes from the file extension, or from the content when the
/// name carries no known extension.
pub fn unpack(archive: &Path, into: &Path) -> Result<()> {
    let kind = archive_kind(archive)?;
    tracing::debug!(archive = %archive.display(), ?kind, "unpacking");
    crate::io::ensure_dir(into)?;
    let file = BufReader::new(File::open(archive)?);
    let reader: Box<dyn Read> = match kind {
        ArchiveKind::Zip => {
            let unreadable = |e: zip::result::ZipError| {
                ApError::InvalidRequest(format!(
                    "unreadable zip archive {}: {e}",
                    archive.display()
                ))
            };
            let mut zip = zip::ZipArchive::new(file).map_err(unreadable)?;
            zip.extract(into).map_err(unreadable)?;
            return Ok(());
        }
        ArchiveKind::Tar => Box::new(file),
        ArchiveKind::TarGzip => Box::new(flate2::read::GzDecoder::new(file)),
        ArchiveKind::TarZstd => Box::new(zstd::stream::read::Decoder::new(file)?),
    };
    tar::Archive::new(reader).unpack(into)?;
    Ok(())
}

/// Download `url` into `staging` and unpack it there. Returns the bag root:
/// the directory holding `data/`.
pub fn stage_dataset(source: &dyn DatasetSource, url: &str, staging: &Path) -> Result<PathBuf> {
    crate::io::ensure_dir(staging)?;
    let archive = staging.join(file_name_from_url(url));
    source.download(url, &archive)?;
    let unpacked = staging.join("unpacked");
    unpack(&archive, &unpacked)?;
    bag_root(&unpacked)
}

/// `dir` itself if it has a `data/` directory, else its single subdirectory
/// that does.
pub fn bag_root(dir: &Path) -> Result<PathBuf> {
    if dir.join("data").is_dir() {
        return Ok(dir.to_path_buf());
    }
    let candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.join("data").is_dir())
        .collect();
    match candidates.as_slice() {
        [one] => Ok(one.clone()),
        [] => Err(ApError::NotFound(format!(
            "no bag data directory found in {}",
            dir.display()
        ))),
        _ => Err(ApError::InvalidRequest(format!(
            "archive contains {} bags; expected one",
            candidates.len()
        ))),
    }
}

/// The one non-hidden `*.json` file directly inside `<bag>/data/`.
pub fn locate_schema_file(bag: &Path) -> Result<PathBuf> {
    let data = bag.join("data");
    let mut found: Vec<PathBuf> = std::fs::read_dir(&data)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".json") && !n.starts_with('.'))
        })
        .collect();
    found.sort();
    match found.len() {
        1 => Ok(found.remove(0)),
        0 => Err(ApError::NotFound(format!(
            "no schema file (*.json) in {}",
            data.display()
        ))),
        n => Err(ApError::InvalidRequest(format!(
            "found {n} candidate schema files in {}; expected exactly one",
            data.display()
        ))),
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::path::Path;

    /// Write a bag named `bag` whose `data/` holds `files`, as a tar archive
    /// at `dest`.
    pub fn write_bag_tar(dest: &Path, bag: &str, files: &[(&str, &[u8])]) {
        let file = std::fs::File::create(dest).unwrap();
        let mut builder = tar::Builder::new(file);
        for (name, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("{bag}/data/{name}"), *contents)
                .unwrap();
        }
        builder.finish().unwrap();
    }

    /// Same layout as [`write_bag_tar`], as a zip archive.
    pub fn write_bag_zip(dest: &Path, bag: &str, files: &[(&str, &[u8])]) {
        use std::io::Write;

        let file = std::fs::File::create(dest).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, contents) in files {
            writer
                .start_file(
                    format!("{bag}/data/{name}"),
                    zip::write::SimpleFileOptions::default(),
                )
                .unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
    }
}
