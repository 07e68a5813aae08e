// src/channel/artifact.rs

//! Recipe extraction from built artifacts
//!
//! conda-build stores the recipe a package was built from under
//! `info/recipe/` inside the artifact. Hashing those files the same way a
//! freshly generated recipe is hashed tells which build produced what.
//!
//! Two containers exist:
//! - `.tar.bz2`: one tarball holding everything
//! - `.conda`: a zip whose `info-*.tar.zst` member holds `info/`

use crate::compression::{self, CompressionFormat};
use crate::error::{Error, Result};
use crate::recipe::hasher::{RecipeDigest, RecipeHasher};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

/// Location of the embedded recipe inside an artifact
pub const RECIPE_PREFIX: &str = "info/recipe/";

/// Extension of the zip-based artifact format
const CONDA_EXTENSION: &str = ".conda";

const TAR_HEADER_LEN: usize = 512;
/// `ustar` marks POSIX and GNU tar headers
const TAR_MAGIC: &[u8] = b"ustar";
const TAR_MAGIC_OFFSET: usize = 257;

/// Hash the recipe embedded in the artifact at `path`
pub fn hash_artifact(path: &Path, hasher: &RecipeHasher) -> Result<RecipeDigest> {
    let entries = recipe_entries(path)?;
    debug!("{}: {} recipe files", path.display(), entries.len());
    Ok(hasher.hash_entries(entries))
}

/// Files below `info/recipe/`, as (path relative to it, contents)
pub fn recipe_entries(path: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    let name = path.to_string_lossy();
    if name.ends_with(CONDA_EXTENSION) {
        conda_recipe_entries(path)
    } else {
        tarball_recipe_entries(path)
    }
}

fn tarball_recipe_entries(path: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    let mut file = File::open(path)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {e}", path.display())))?;

    let mut head = [0u8; TAR_HEADER_LEN];
    let n = read_up_to(&mut file, &mut head)?;
    file.seek(SeekFrom::Start(0))?;
    let format = detect_format(path, &head[..n]);

    let decoder = compression::create_decoder(BufReader::new(file), format)?;
    read_recipe_tar(decoder)
        .map_err(|e| Error::ParseError(format!("{}: {e}", path.display())))
}

/// Content wins over the file name; the extension only decides when the
/// leading bytes are neither a known compression nor a tar header
fn detect_format(path: &Path, head: &[u8]) -> CompressionFormat {
    let format = CompressionFormat::from_magic_bytes(head);
    if format != CompressionFormat::None {
        return format;
    }
    if head.get(TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len()) == Some(TAR_MAGIC) {
        return CompressionFormat::None;
    }
    CompressionFormat::from_extension(&path.to_string_lossy())
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn conda_recipe_entries(path: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    let file = File::open(path)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {e}", path.display())))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| Error::ParseError(format!("{}: not a zip archive: {e}", path.display())))?;

    for i in 0..archive.len() {
        let mut member = archive
            .by_index(i)
            .map_err(|e| Error::ParseError(format!("{}: {e}", path.display())))?;
        let member_name = member.name().to_string();
        if !(member_name.starts_with("info-") && member_name.ends_with(".tar.zst")) {
            continue;
        }

        let mut compressed = Vec::new();
        member.read_to_end(&mut compressed)?;
        let tarball = compression::decompress(&compressed, CompressionFormat::Zstd)?;
        return read_recipe_tar(tarball.as_slice())
            .map_err(|e| Error::ParseError(format!("{}/{member_name}: {e}", path.display())));
    }

    Err(Error::ParseError(format!(
        "{}: no info-*.tar.zst member",
        path.display()
    )))
}

fn read_recipe_tar<R: Read>(reader: R) -> std::io::Result<Vec<(String, Vec<u8>)>> {
    let mut archive = tar::Archive::new(reader);
    let mut entries = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let full = entry.path()?.to_string_lossy().replace('\\', "/");
        let full = full.trim_start_matches("./");
        let Some(rel) = full.strip_prefix(RECIPE_PREFIX) else {
            continue;
        };
        if rel.is_empty() {
            continue;
        }
        let rel = rel.to_string();

        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        entries.push((rel, contents));
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    const FILES: &[(&str, &[u8])] = &[
        ("info/index.json", b"{}"),
        ("info/recipe/meta.yaml.template", b"package:\n  name: a\n"),
        ("info/recipe/build.sh", b"make\n"),
        ("lib/liba.so", b"\x7fELF"),
    ];

    #[test]
    fn test_tar_bz2_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a-1.0-0.tar.bz2");

        let mut encoder =
            bzip2::write::BzEncoder::new(File::create(&path).unwrap(), bzip2::Compression::fast());
        encoder.write_all(&tar_bytes(FILES)).unwrap();
        encoder.finish().unwrap();

        let mut entries = recipe_entries(&path).unwrap();
        entries.sort();
        let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["build.sh", "meta.yaml.template"]);
    }

    #[test]
    fn test_mislabelled_tarball_is_read_by_content() {
        let dir = TempDir::new().unwrap();

        // Uncompressed tar under a .tar.bz2 name
        let plain = dir.path().join("a-1.0-0.tar.bz2");
        std::fs::write(&plain, tar_bytes(FILES)).unwrap();
        assert_eq!(recipe_entries(&plain).unwrap().len(), 2);

        // gzip payload under a .tar.bz2 name
        let gzipped = dir.path().join("b-1.0-0.tar.bz2");
        let mut encoder = flate2::write::GzEncoder::new(
            File::create(&gzipped).unwrap(),
            flate2::Compression::fast(),
        );
        encoder.write_all(&tar_bytes(FILES)).unwrap();
        encoder.finish().unwrap();
        assert_eq!(recipe_entries(&gzipped).unwrap().len(), 2);
    }

    #[test]
    fn test_conda_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a-1.0-0.conda");

        let info = zstd::encode_all(tar_bytes(FILES).as_slice(), 3).unwrap();
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        zip.start_file("metadata.json", options).unwrap();
        zip.write_all(b"{\"conda_pkg_format_version\": 2}").unwrap();
        zip.start_file("info-a-1.0-0.tar.zst", options).unwrap();
        zip.write_all(&info).unwrap();
        zip.finish().unwrap();

        let entries = recipe_entries(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|(n, d)| n == "build.sh" && d == b"make\n"));
    }

    #[test]
    fn test_artifact_hash_matches_rendered_recipe() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.tar");
        std::fs::write(&path, tar_bytes(FILES)).unwrap();

        let hasher = RecipeHasher::new(vec![".sh".to_string(), ".yaml".to_string()]);
        let from_artifact = hash_artifact(&path, &hasher).unwrap();

        let rendered = vec![
            ("meta.yaml".to_string(), b"package:\n  name: a\n".to_vec()),
            ("build.sh".to_string(), b"make\n".to_vec()),
        ];
        assert_eq!(from_artifact.digest, hasher.hash_entries(rendered).digest);
    }

    #[test]
    fn test_garbage_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.conda");
        std::fs::write(&path, b"nope").unwrap();
        assert!(recipe_entries(&path).is_err());
    }
}
