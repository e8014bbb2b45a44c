//! Portable PDB extraction from symbol packages
//!
//! A `.snupkg` carries zero or more `*.pdb` entries. Each must be a portable
//! PDB: an ECMA-335 metadata root (`BSJB`) whose `#Pdb` stream starts with
//! the 16-byte PDB GUID. Symbol servers address a PDB by that GUID rendered
//! as `%08x%04x%04x` plus the remaining eight bytes in hex, followed by the
//! age marker `ffffffff` that portable PDBs always use.

use std::io::{self, Read, Seek, SeekFrom};

use tracing::debug;
use zip::ZipArchive;

use super::{ExtractError, ExtractResult};
use crate::buffer::{HashedBuffer, HashedBufferWriter};
use crate::config::LimitsConfig;
use crate::error::AppError;

const METADATA_MAGIC: u32 = 0x424A_5342;
const PDB_STREAM: &str = "#Pdb";
const PDB_ID_LEN: usize = 16;
const PORTABLE_AGE: &str = "ffffffff";
const COPY_CHUNK: usize = 64 * 1024;
/// The metadata root and its stream headers fit in this prefix.
const HEADER_PREFIX: u64 = 4096;

/// One debug blob extracted from a symbol package.
#[derive(Debug)]
pub struct PortablePdb {
    /// Lowercased symbol-server id
    pub id: String,
    /// Base file name inside the archive
    pub name: String,
    pub content: HashedBuffer,
}

/// Extract every `*.pdb` entry of a symbol package.
///
/// Each entry is decompressed into its own staging buffer, which spills to a
/// temporary file above `memory_threshold`. A single entry may not exceed
/// `max_symbol_size` and all entries together may not exceed
/// `max_symbols_total`, counted in decompressed bytes. Entries that are not
/// portable PDBs are rejected. An archive without PDBs yields an empty list.
pub fn extract_portable_pdbs<R: Read + Seek>(
    reader: R,
    limits: &LimitsConfig,
) -> ExtractResult<Vec<PortablePdb>> {
    let mut archive = ZipArchive::new(reader)?;
    let mut pdbs = Vec::new();
    let mut total = 0u64;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() || !entry.name().to_ascii_lowercase().ends_with(".pdb") {
            continue;
        }

        let name = entry
            .name()
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();

        if entry.size() > limits.max_symbol_size {
            return Err(ExtractError::SymbolTooLarge {
                name,
                size: entry.size(),
                max: limits.max_symbol_size,
            });
        }

        let mut content = stage_entry(&mut entry, &name, limits, &mut total)?;
        let id = read_debug_header_id(&mut content)
            .map_err(|reason| ExtractError::InvalidSymbolArchive {
                name: name.clone(),
                reason,
            })?
            .to_lowercase();
        content.rewind()?;

        debug!(
            name = %name,
            id = %id,
            size = content.size(),
            spilled = content.is_spilled(),
            "Extracted portable PDB"
        );
        pdbs.push(PortablePdb { id, name, content });
    }

    Ok(pdbs)
}

/// Decompress one entry into a staging buffer, adding its size to `total`.
///
/// Sizes are counted as bytes come out of the decompressor; the size declared
/// in the archive is not trusted.
fn stage_entry<R: Read>(
    entry: &mut R,
    name: &str,
    limits: &LimitsConfig,
    total: &mut u64,
) -> ExtractResult<HashedBuffer> {
    let mut writer = HashedBufferWriter::new(limits.max_symbol_size, limits.memory_threshold);
    let mut chunk = vec![0u8; COPY_CHUNK];

    loop {
        let n = entry.read(&mut chunk)?;
        if n == 0 {
            break;
        }

        let size = writer.size() + n as u64;
        if size > limits.max_symbol_size {
            return Err(ExtractError::SymbolTooLarge {
                name: name.to_string(),
                size,
                max: limits.max_symbol_size,
            });
        }
        *total += n as u64;
        if *total > limits.max_symbols_total {
            return Err(ExtractError::SymbolsTooLarge {
                total: *total,
                max: limits.max_symbols_total,
            });
        }

        writer.append(&chunk[..n]).map_err(staging_error)?;
    }

    writer.finish().map_err(staging_error)
}

fn staging_error(err: AppError) -> ExtractError {
    match err {
        AppError::Io(e) => ExtractError::Io(e),
        other => ExtractError::Io(io::Error::other(other.to_string())),
    }
}

/// Bounds-checked little-endian reader over a byte slice.
struct LeReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> LeReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        LeReader { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], String> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| format!("truncated metadata at offset {}", self.pos))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, String> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, String> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Null-terminated stream name, padded to a four-byte boundary.
    fn stream_name(&mut self) -> Result<&'a [u8], String> {
        let rest = &self.data[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| "unterminated stream name".to_string())?;
        let padded = (len + 1).div_ceil(4) * 4;
        let raw = self.take(padded)?;
        Ok(&raw[..len])
    }
}

/// Symbol-server id of a portable PDB (not yet lowercased).
///
/// Only the header prefix and the 16 id bytes are read; the reader is left at
/// an unspecified position.
pub fn read_debug_header_id<R: Read + Seek>(reader: &mut R) -> Result<String, String> {
    reader.seek(SeekFrom::Start(0)).map_err(|e| e.to_string())?;
    let mut header = Vec::new();
    reader
        .by_ref()
        .take(HEADER_PREFIX)
        .read_to_end(&mut header)
        .map_err(|e| e.to_string())?;

    let offset = pdb_stream_offset(&header)?;
    let mut id = [0u8; PDB_ID_LEN];
    reader
        .seek(SeekFrom::Start(offset))
        .and_then(|_| reader.read_exact(&mut id))
        .map_err(|_| format!("truncated metadata at offset {offset}"))?;
    Ok(format_pdb_id(&id))
}

/// Offset of the `#Pdb` stream named in the metadata root at `header`.
fn pdb_stream_offset(header: &[u8]) -> Result<u64, String> {
    let mut cursor = LeReader::new(header);

    if cursor.u32()? != METADATA_MAGIC {
        return Err("not a portable PDB (missing BSJB signature)".to_string());
    }
    // major, minor, reserved
    cursor.take(8)?;
    let version_len = cursor.u32()? as usize;
    cursor.take(version_len)?;
    // flags
    cursor.u16()?;
    let stream_count = cursor.u16()?;

    for _ in 0..stream_count {
        let offset = cursor.u32()?;
        let _size = cursor.u32()?;
        let name = cursor.stream_name()?;
        if name != PDB_STREAM.as_bytes() {
            continue;
        }

        return Ok(u64::from(offset));
    }

    Err(format!("no {PDB_STREAM} stream"))
}

fn format_pdb_id(id: &[u8; PDB_ID_LEN]) -> String {
    let data1 = u32::from_le_bytes([id[0], id[1], id[2], id[3]]);
    let data2 = u16::from_le_bytes([id[4], id[5]]);
    let data3 = u16::from_le_bytes([id[6], id[7]]);
    let tail: String = id[8..16].iter().map(|b| format!("{b:02x}")).collect();
    format!("{data1:08x}{data2:04x}{data3:04x}{tail}{PORTABLE_AGE}")
}
