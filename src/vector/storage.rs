//! Binary file I/O for per-space vector data.
//!
//! File format (one file per space, e.g. vectors/content.bin):
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of the embedding model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated):
//! - post_id: u64 (little-endian)
//! - vector: [f32; dimensions] (little-endian)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file was produced by a different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),
}

struct Header {
    version: u8,
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

/// SHA256 hash of the model name, used to bind a vector file to the
/// model that produced it.
pub fn model_id(model_name: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(model_name.as_bytes());
    hasher.finalize().into()
}

/// Read a space file, validating version, model identity and checksum.
/// Returns (dimensions, entries).
pub fn read_space_file(
    path: &Path,
    expected_model_id: &[u8; 32],
) -> Result<(usize, Vec<(u64, Vec<f32>)>), VectorStoreError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let header = read_header(&mut reader)?;
    if header.model_id != *expected_model_id {
        return Err(VectorStoreError::ModelMismatch);
    }

    let dimensions = header.dimensions as usize;
    if dimensions == 0 {
        return Err(VectorStoreError::InvalidFormat(
            "zero dimensions in header".into(),
        ));
    }

    let mut entries = Vec::with_capacity(header.entry_count as usize);
    for _ in 0..header.entry_count {
        entries.push(read_entry(&mut reader, dimensions)?);
    }

    Ok((dimensions, entries))
}

/// Write a space file. Atomic: temp file -> fsync -> rename.
pub fn write_space_file(
    path: &Path,
    model_id: &[u8; 32],
    dimensions: usize,
    entries: &[(u64, Vec<f32>)],
) -> Result<(), VectorStoreError> {
    let temp_path = path.with_extension("tmp");

    let result = write_to_file(&temp_path, model_id, dimensions, entries);
    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
        return result;
    }

    std::fs::rename(&temp_path, path)?;
    Ok(())
}

fn write_to_file(
    path: &Path,
    model_id: &[u8; 32],
    dimensions: usize,
    entries: &[(u64, Vec<f32>)],
) -> Result<(), VectorStoreError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    write_header(
        &mut writer,
        &Header {
            version: FORMAT_VERSION,
            model_id: *model_id,
            dimensions: dimensions as u16,
            entry_count: entries.len() as u64,
        },
    )?;

    for (id, vector) in entries {
        if vector.len() != dimensions {
            return Err(VectorStoreError::InvalidFormat(format!(
                "entry {id} has {} dimensions, expected {dimensions}",
                vector.len()
            )));
        }
        writer.write_all(&id.to_le_bytes())?;
        for &value in vector {
            writer.write_all(&value.to_le_bytes())?;
        }
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    file.sync_all()?;

    Ok(())
}

fn read_header(reader: &mut BufReader<File>) -> Result<Header, VectorStoreError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes)?;

    let version = header_bytes[0];
    if version > FORMAT_VERSION {
        return Err(VectorStoreError::VersionMismatch(version, FORMAT_VERSION));
    }

    let mut model_id = [0u8; 32];
    model_id.copy_from_slice(&header_bytes[1..33]);

    let dimensions = u16::from_le_bytes([header_bytes[33], header_bytes[34]]);
    let entry_count = u64::from_le_bytes([
        header_bytes[35],
        header_bytes[36],
        header_bytes[37],
        header_bytes[38],
        header_bytes[39],
        header_bytes[40],
        header_bytes[41],
        header_bytes[42],
    ]);
    let stored_checksum = u32::from_le_bytes([
        header_bytes[43],
        header_bytes[44],
        header_bytes[45],
        header_bytes[46],
    ]);

    let computed_checksum = crc32fast::hash(&header_bytes[0..43]);
    if stored_checksum != computed_checksum {
        return Err(VectorStoreError::ChecksumMismatch);
    }

    Ok(Header {
        version,
        model_id,
        dimensions,
        entry_count,
    })
}

fn write_header(writer: &mut BufWriter<File>, header: &Header) -> Result<(), VectorStoreError> {
    let mut header_bytes = [0u8; HEADER_SIZE];

    header_bytes[0] = header.version;
    header_bytes[1..33].copy_from_slice(&header.model_id);
    header_bytes[33..35].copy_from_slice(&header.dimensions.to_le_bytes());
    header_bytes[35..43].copy_from_slice(&header.entry_count.to_le_bytes());

    let checksum = crc32fast::hash(&header_bytes[0..43]);
    header_bytes[43..47].copy_from_slice(&checksum.to_le_bytes());

    writer.write_all(&header_bytes)?;
    Ok(())
}

fn read_entry(
    reader: &mut BufReader<File>,
    dimensions: usize,
) -> Result<(u64, Vec<f32>), VectorStoreError> {
    let mut id_bytes = [0u8; 8];
    reader.read_exact(&mut id_bytes)?;
    let id = u64::from_le_bytes(id_bytes);

    let mut raw = vec![0u8; dimensions * 4];
    reader.read_exact(&mut raw)?;
    let vector = raw
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok((id, vector))
}
