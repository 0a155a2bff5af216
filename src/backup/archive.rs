// workstream-backup/src/backup/archive.rs
use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use tracing::info;

/// Gzips `source` into `destination` on the blocking pool.
///
/// Returns the number of uncompressed bytes read.
pub async fn compress_dump(source: &Path, destination: &Path) -> Result<u64> {
    info!(
        "🗜 Compressing file: {} -> {}",
        source.display(),
        destination.display()
    );

    let (source, destination) = (source.to_path_buf(), destination.to_path_buf());
    let bytes = tokio::task::spawn_blocking(move || gzip_file(&source, &destination))
        .await
        .context("Compression task did not complete")??;

    info!("✓ File compressed successfully ({} bytes in)", bytes);
    Ok(bytes)
}

/// Streams a file through a gzip encoder.
pub fn gzip_file(source: &Path, destination: &Path) -> Result<u64> {
    let input = File::open(source)
        .with_context(|| format!("Failed to open dump file: {}", source.display()))?;
    let output = File::create(destination)
        .with_context(|| format!("Failed to create compressed file: {}", destination.display()))?;

    let mut encoder = GzEncoder::new(output, Compression::default());
    let bytes = io::copy(&mut BufReader::new(input), &mut encoder).with_context(|| {
        format!(
            "Failed to compress {} into {}",
            source.display(),
            destination.display()
        )
    })?;

    encoder.finish().with_context(|| {
        format!(
            "Failed to finish Gzip encoding for: {}",
            destination.display()
        )
    })?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[tokio::test]
    async fn compressed_file_decodes_to_the_dump() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("dump.sql");
        let destination = dir.path().join("dump.sql.gz");
        let dump = "-- PostgreSQL database dump\n".repeat(200);
        std::fs::write(&source, &dump)?;

        let bytes = compress_dump(&source, &destination).await?;
        assert_eq!(bytes, dump.len() as u64);

        let mut decoded = String::new();
        GzDecoder::new(File::open(&destination)?).read_to_string(&mut decoded)?;
        assert_eq!(decoded, dump);
        assert!(std::fs::metadata(&destination)?.len() < dump.len() as u64);
        Ok(())
    }

    #[tokio::test]
    async fn missing_source_fails_without_output() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let destination = dir.path().join("dump.sql.gz");

        let err = compress_dump(&dir.path().join("absent.sql"), &destination)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to open dump file"));
        assert!(!destination.exists());
        Ok(())
    }
}
