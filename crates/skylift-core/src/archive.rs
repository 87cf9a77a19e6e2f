use std::io::Read;
use std::path::Path;

use log::{debug, warn};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
}

impl ArchiveError {
    fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::Io {
            context,
            source: std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        }
    }

    fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }
}

/// Expand a zip archive into `dest`, preserving unix permission bits.
/// Entries whose names escape the destination are skipped.
///
/// # Errors
/// Fails when the archive cannot be read or an entry cannot be written.
pub fn extract_zip(zip_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let file = std::fs::File::open(zip_path)
        .map_err(|error| ArchiveError::io_with_path("failed to open zip file", zip_path, &error))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| ArchiveError::zip("failed to read zip archive", error))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|error| ArchiveError::zip("failed to read zip entry", error))?;
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path");
            continue;
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                ArchiveError::io_with_path(
                    "failed to create extraction directory",
                    &out_path,
                    &error,
                )
            })?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|error| {
                    ArchiveError::io_with_path("failed to create parent directory", parent, &error)
                })?;
            }
            let mut outfile = std::fs::File::create(&out_path).map_err(|error| {
                ArchiveError::io_with_path("failed to create extracted file", &out_path, &error)
            })?;
            std::io::copy(&mut entry, &mut outfile).map_err(|error| {
                ArchiveError::io_with_path("failed to extract archive entry", &out_path, &error)
            })?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    let _ =
                        std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
                }
            }
        }
    }

    debug!("Extraction complete to {}", dest.display());
    Ok(())
}

/// Collapse the single wrapper directory many runtime archives carry at
/// their root, so `dir/jdk-21.0.2+13-jre/bin` becomes `dir/bin`. A `dir`
/// with anything other than exactly one subdirectory is left untouched.
///
/// # Errors
/// Fails when directory entries cannot be listed or moved.
pub fn flatten_single_dir(dir: &Path) -> Result<(), ArchiveError> {
    let mut entries = Vec::new();
    let listing = std::fs::read_dir(dir)
        .map_err(|error| ArchiveError::io_with_path("failed to list directory", dir, &error))?;
    for entry in listing {
        let entry = entry
            .map_err(|error| ArchiveError::io_with_path("failed to list directory", dir, &error))?;
        entries.push(entry.path());
    }

    let wrapper = match entries.as_slice() {
        [only] if only.is_dir() => only.clone(),
        _ => return Ok(()),
    };

    // Move the wrapper aside first so its children can take its name.
    let staging = dir.join(".flatten-tmp");
    std::fs::rename(&wrapper, &staging).map_err(|error| {
        ArchiveError::io_with_path("failed to stage wrapper directory", &wrapper, &error)
    })?;

    let children = std::fs::read_dir(&staging).map_err(|error| {
        ArchiveError::io_with_path("failed to list wrapper directory", &staging, &error)
    })?;
    for child in children {
        let child = child.map_err(|error| {
            ArchiveError::io_with_path("failed to list wrapper directory", &staging, &error)
        })?;
        let target = dir.join(child.file_name());
        std::fs::rename(child.path(), &target).map_err(|error| {
            ArchiveError::io_with_path("failed to move entry out of wrapper", &target, &error)
        })?;
    }

    std::fs::remove_dir(&staging).map_err(|error| {
        ArchiveError::io_with_path("failed to remove wrapper directory", &staging, &error)
    })?;
    Ok(())
}

/// Hex SHA-256 digest of a file, streamed in fixed-size chunks.
///
/// # Errors
/// Fails when the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> Result<String, ArchiveError> {
    let mut file = std::fs::File::open(path).map_err(|error| {
        ArchiveError::io_with_path("failed to open file for checksum", path, &error)
    })?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];

    loop {
        let read = file.read(&mut buffer).map_err(|error| {
            ArchiveError::io_with_path("failed to read file for checksum", path, &error)
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::{extract_zip, flatten_single_dir, sha256_file};

    #[test]
    fn extract_zip_expands_files_and_directories() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("tool.zip");
        let extract_dir = temp.path().join("extract");

        let zip_file = std::fs::File::create(&zip_path).expect("zip file should be created");
        let mut writer = zip::ZipWriter::new(zip_file);
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
        writer
            .add_directory("nested/", options)
            .expect("directory entry should be written");
        writer
            .start_file("nested/butler", options)
            .expect("file entry should be started");
        writer
            .write_all(b"binary-content")
            .expect("file entry should be written");
        writer.finish().expect("zip archive should be finalized");

        extract_zip(&zip_path, &extract_dir).expect("zip should extract");

        let extracted = std::fs::read(extract_dir.join("nested/butler"))
            .expect("extracted file should exist and be readable");
        assert_eq!(extracted, b"binary-content");
    }

    #[test]
    fn extract_zip_skips_unsafe_paths() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("unsafe.zip");
        let extract_dir = temp.path().join("extract");

        let zip_file = std::fs::File::create(&zip_path).expect("zip file should be created");
        let mut writer = zip::ZipWriter::new(zip_file);
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
        writer
            .start_file("../outside.txt", options)
            .expect("unsafe file entry should be started");
        writer
            .write_all(b"should not be extracted")
            .expect("unsafe file entry should be written");
        writer.finish().expect("zip archive should be finalized");

        extract_zip(&zip_path, &extract_dir).expect("zip extraction should not fail");

        assert!(
            !temp.path().join("outside.txt").exists(),
            "unsafe path should not be extracted outside destination"
        );
    }

    #[test]
    fn flatten_collapses_a_single_wrapper_directory() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let wrapper = temp.path().join("jdk-21.0.2+13-jre");
        std::fs::create_dir_all(wrapper.join("bin")).expect("wrapper tree should be created");
        std::fs::write(wrapper.join("bin/java"), b"#!jre").expect("file should be written");
        std::fs::write(wrapper.join("release"), b"JAVA_VERSION=21")
            .expect("file should be written");

        flatten_single_dir(temp.path()).expect("flatten should succeed");

        assert!(temp.path().join("bin/java").is_file());
        assert!(temp.path().join("release").is_file());
        assert!(!wrapper.exists(), "wrapper directory should be gone");
    }

    #[test]
    fn flatten_leaves_multi_entry_directories_alone() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        std::fs::create_dir(temp.path().join("bin")).expect("dir should be created");
        std::fs::write(temp.path().join("release"), b"JAVA_VERSION=21")
            .expect("file should be written");

        flatten_single_dir(temp.path()).expect("flatten should succeed");

        assert!(temp.path().join("bin").is_dir());
        assert!(temp.path().join("release").is_file());
    }

    #[test]
    fn sha256_of_empty_file_matches_known_digest() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let file_path = temp.path().join("empty.bin");
        std::fs::write(&file_path, b"").expect("payload file should be written");

        let digest = sha256_file(&file_path).expect("checksum should be computed");
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_is_stable_and_lowercase_hex() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let file_path = temp.path().join("payload.bin");
        std::fs::write(&file_path, b"skylift").expect("payload file should be written");

        let first = sha256_file(&file_path).expect("checksum should be computed");
        let second = sha256_file(&file_path).expect("checksum should be computed");

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(first, first.to_ascii_lowercase());
    }
}
