//! Pure Rust reader for PAR2 set metadata
//!
//! Lists the files a parity set protects without running the external tool.
//! Only packet headers and a few packet bodies are decoded; checksums are not
//! validated, so a manifest describes what the set claims rather than
//! whether the set is intact.
//!
//! ## PAR2 Packet Structure
//!
//! Every PAR2 packet starts with:
//! - 8 bytes: magic "PAR2\0PKT"
//! - 8 bytes: packet length (little-endian u64, includes header)
//! - 16 bytes: packet hash (MD5 of body)
//! - 16 bytes: recovery set ID
//! - 16 bytes: packet type signature
//! - variable: packet body
//!
//! Packets decoded here:
//! - `PAR 2.0\0Main\0\0\0\0`: slice size (u64), recovery set file count (u32)
//! - `PAR 2.0\0FileDesc`: file ID, two MD5 hashes, file length (u64), name
//! - `PAR 2.0\0RecvSlic`: one recovery block each (only counted)
//! - `PAR 2.0\0Creator\0`: name of the program that built the set

use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

/// PAR2 packet header magic bytes
const PAR2_MAGIC: &[u8; 8] = b"PAR2\0PKT";

const MAIN_TYPE: &[u8; 16] = b"PAR 2.0\0Main\0\0\0\0";
const FILE_DESC_TYPE: &[u8; 16] = b"PAR 2.0\0FileDesc";
const RECOVERY_SLICE_TYPE: &[u8; 16] = b"PAR 2.0\0RecvSlic";
const CREATOR_TYPE: &[u8; 16] = b"PAR 2.0\0Creator\0";

/// Size of the fixed packet header (magic + length + hash + set_id + type)
const HEADER_SIZE: usize = 8 + 8 + 16 + 16 + 16; // 64 bytes

/// Offset of the packet type field within the header
const TYPE_OFFSET: usize = 8 + 8 + 16 + 16; // 48 bytes

/// File Description body before the name (file_id + md5_full + md5_16k + length)
const FILE_DESC_FIXED_BODY: usize = 16 + 16 + 16 + 8; // 56 bytes

/// Offset of the file length within the File Description body
const FILE_LENGTH_OFFSET: usize = 16 + 16 + 16;

/// Main packet body before the file ID lists (slice size + file count)
const MAIN_FIXED_BODY: usize = 8 + 4;

/// One protected file described by the set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    /// File name as stored in the set
    pub name: String,
    /// File length in bytes
    pub length: u64,
    #[serde(skip)]
    file_id: [u8; 16],
}

/// What a parity set says about itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Par2Manifest {
    /// Block (slice) size in bytes, if a Main packet was found
    pub block_size: Option<u64>,
    /// Number of files in the recovery set according to the Main packet
    pub recoverable_files: Option<u32>,
    /// Protected files, in the order their descriptions appear
    pub files: Vec<ManifestEntry>,
    /// Recovery blocks found in the files that were read
    pub recovery_blocks: usize,
    /// Program that created the set
    pub creator: Option<String>,
}

impl Par2Manifest {
    /// Total size of the protected data
    pub fn total_length(&self) -> u64 {
        self.files.iter().map(|f| f.length).sum()
    }

    /// Fold another file of the same set into this manifest
    ///
    /// File descriptions are repeated in every volume, so entries are
    /// de-duplicated by file ID; recovery blocks add up.
    pub fn merge(&mut self, other: Par2Manifest) {
        self.block_size = self.block_size.or(other.block_size);
        self.recoverable_files = self.recoverable_files.or(other.recoverable_files);
        self.creator = self.creator.take().or(other.creator);
        self.recovery_blocks += other.recovery_blocks;

        let mut seen: HashSet<[u8; 16]> = self.files.iter().map(|f| f.file_id).collect();
        for entry in other.files {
            if seen.insert(entry.file_id) {
                self.files.push(entry);
            }
        }
    }
}

/// Read the manifest of one `.par2` file
///
/// # Errors
///
/// Returns an error if the file cannot be read. Unparseable content yields an
/// empty manifest rather than an error.
pub fn read_manifest(par2_path: &Path) -> crate::Result<Par2Manifest> {
    let data = std::fs::read(par2_path)?;
    Ok(parse_manifest(&data))
}

/// Decode the packets in raw PAR2 bytes
pub(crate) fn parse_manifest(data: &[u8]) -> Par2Manifest {
    let mut manifest = Par2Manifest::default();
    let mut seen = HashSet::new();
    let mut pos = 0;

    while pos + HEADER_SIZE <= data.len() {
        match find_magic(data, pos) {
            Some(magic_pos) => pos = magic_pos,
            None => break,
        }
        if pos + HEADER_SIZE > data.len() {
            break;
        }

        let packet_len = read_u64(data, pos + 8).unwrap_or(0) as usize;
        // A length that is too short or runs past the data means this is not
        // a real packet; resynchronize on the next magic
        if packet_len < HEADER_SIZE || packet_len > data.len() - pos {
            pos += PAR2_MAGIC.len();
            continue;
        }

        let body = &data[pos + HEADER_SIZE..pos + packet_len];
        let type_sig = &data[pos + TYPE_OFFSET..pos + TYPE_OFFSET + 16];

        if type_sig == FILE_DESC_TYPE {
            if let Some(entry) = parse_file_desc(body)
                && seen.insert(entry.file_id)
            {
                manifest.files.push(entry);
            }
        } else if type_sig == MAIN_TYPE {
            if body.len() >= MAIN_FIXED_BODY {
                manifest.block_size = read_u64(body, 0);
                manifest.recoverable_files = read_u32(body, 8);
            }
        } else if type_sig == RECOVERY_SLICE_TYPE {
            manifest.recovery_blocks += 1;
        } else if type_sig == CREATOR_TYPE {
            let creator = null_terminated(body);
            if !creator.is_empty() {
                manifest.creator = Some(creator);
            }
        }

        pos += packet_len;
    }

    manifest
}

fn parse_file_desc(body: &[u8]) -> Option<ManifestEntry> {
    if body.len() < FILE_DESC_FIXED_BODY {
        return None;
    }
    let file_id: [u8; 16] = body[..16].try_into().ok()?;
    let length = read_u64(body, FILE_LENGTH_OFFSET)?;
    let name = null_terminated(&body[FILE_DESC_FIXED_BODY..]);
    if name.is_empty() {
        return None;
    }
    Some(ManifestEntry {
        name,
        length,
        file_id,
    })
}

/// Find the next occurrence of PAR2 magic bytes starting from `start`
fn find_magic(data: &[u8], start: usize) -> Option<usize> {
    if start + PAR2_MAGIC.len() > data.len() {
        return None;
    }
    data[start..]
        .windows(PAR2_MAGIC.len())
        .position(|w| w == PAR2_MAGIC)
        .map(|offset| start + offset)
}

fn read_u64(data: &[u8], at: usize) -> Option<u64> {
    let bytes = data.get(at..at.checked_add(8)?)?;
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

/// Decode null-padded text
fn null_terminated(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn packet(type_sig: &[u8; 16], body: &[u8]) -> Vec<u8> {
        let padded_len = (body.len() + 3) & !3;
        let packet_len = (HEADER_SIZE + padded_len) as u64;

        let mut packet = Vec::with_capacity(packet_len as usize);
        packet.extend_from_slice(PAR2_MAGIC);
        packet.extend_from_slice(&packet_len.to_le_bytes());
        packet.extend_from_slice(&[0u8; 16]); // packet hash
        packet.extend_from_slice(&[0u8; 16]); // recovery set ID
        packet.extend_from_slice(type_sig);
        packet.extend_from_slice(body);
        packet.resize(packet_len as usize, 0);
        packet
    }

    fn file_desc(id: u8, name: &str, length: u64) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&[id; 16]); // file ID
        body.extend_from_slice(&[0u8; 16]); // md5 of whole file
        body.extend_from_slice(&[0u8; 16]); // md5 of first 16k
        body.extend_from_slice(&length.to_le_bytes());
        body.extend_from_slice(name.as_bytes());
        packet(FILE_DESC_TYPE, &body)
    }

    fn main_packet(block_size: u64, files: u32) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&block_size.to_le_bytes());
        body.extend_from_slice(&files.to_le_bytes());
        packet(MAIN_TYPE, &body)
    }

    #[test]
    fn reads_main_and_file_descriptions() {
        let mut data = main_packet(4096, 2);
        data.extend(file_desc(1, "01 - Intro.flac", 1_000));
        data.extend(file_desc(2, "02 - Song.flac", 2_500));
        data.extend(packet(CREATOR_TYPE, b"par2cmdline version 0.8.1"));

        let manifest = parse_manifest(&data);
        assert_eq!(manifest.block_size, Some(4096));
        assert_eq!(manifest.recoverable_files, Some(2));
        assert_eq!(manifest.files.len(), 2);
        assert_eq!(manifest.files[0].name, "01 - Intro.flac");
        assert_eq!(manifest.files[1].length, 2_500);
        assert_eq!(manifest.total_length(), 3_500);
        assert_eq!(manifest.creator.as_deref(), Some("par2cmdline version 0.8.1"));
        assert_eq!(manifest.recovery_blocks, 0);
    }

    #[test]
    fn repeated_descriptions_are_listed_once() {
        let mut data = file_desc(7, "a.bin", 10);
        data.extend(file_desc(7, "a.bin", 10));
        assert_eq!(parse_manifest(&data).files.len(), 1);
    }

    #[test]
    fn volumes_contribute_recovery_blocks_when_merged() {
        let mut main = main_packet(1024, 1);
        main.extend(file_desc(1, "a.bin", 10));

        let mut volume = file_desc(1, "a.bin", 10);
        volume.extend(packet(RECOVERY_SLICE_TYPE, &[0u8; 8]));
        volume.extend(packet(RECOVERY_SLICE_TYPE, &[0u8; 8]));

        let mut manifest = parse_manifest(&main);
        manifest.merge(parse_manifest(&volume));

        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.recovery_blocks, 2);
        assert_eq!(manifest.block_size, Some(1024));
    }

    #[test]
    fn garbage_and_truncation_yield_empty_manifest() {
        assert_eq!(parse_manifest(&[]), Par2Manifest::default());
        assert_eq!(parse_manifest(&[0xFF; 1024]), Par2Manifest::default());

        let full = file_desc(1, "test.bin", 5);
        assert!(parse_manifest(&full[..HEADER_SIZE]).files.is_empty());
    }

    #[test]
    fn resynchronizes_after_bogus_length() {
        let mut data = PAR2_MAGIC.to_vec();
        data.extend_from_slice(&u64::MAX.to_le_bytes());
        data.extend_from_slice(&[0u8; 48]);
        data.extend(file_desc(3, "real.rar", 42));

        let manifest = parse_manifest(&data);
        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files[0].name, "real.rar");
    }

    #[test]
    fn null_padding_is_stripped() {
        assert_eq!(null_terminated(b"hello.txt\0\0\0"), "hello.txt");
        assert_eq!(null_terminated(b"hello.txt"), "hello.txt");
    }

    #[test]
    fn read_manifest_reports_missing_file() {
        assert!(read_manifest(Path::new("/nonexistent/set.par2")).is_err());
    }
}
