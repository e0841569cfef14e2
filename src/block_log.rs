//! Append-only block log + index (spec §6 block storage).
//!
//! Adapted from `wal_v2.rs`'s aligned header + CRC32 framing: every block
//! is written as a fixed header (block number, payload length, checksum)
//! followed by its bincode-serialized bytes, appended to one file that is
//! never rewritten. A parallel index file holds one little-endian `u64`
//! byte-offset per block number, so `BlockLogReader::read_at` can seek
//! straight to a block without scanning the log from the start.

use crate::tx::Block;
use crc32fast::Hasher;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;
use thiserror::Error;

/// Header size in bytes: block_num(8) + payload_len(4) + checksum(4).
pub const BLOCK_LOG_HEADER_SIZE: usize = 16;
/// Index entry size: one little-endian `u64` byte-offset per block.
pub const INDEX_ENTRY_SIZE: usize = 8;

#[derive(Debug, Error)]
pub enum BlockLogError {
    #[error("block log I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("block serialization error: {0}")]
    Codec(#[from] Box<bincode::ErrorKind>),
    #[error("checksum mismatch reading block {block_num}: expected {expected}, got {got}")]
    ChecksumMismatch {
        block_num: u64,
        expected: u32,
        got: u32,
    },
    #[error("block number {0} is not present in the index")]
    NotIndexed(u64),
}

pub type BlockLogResult<T> = Result<T, BlockLogError>;

fn crc32(payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockLogHeader {
    block_num: u64,
    payload_len: u32,
    checksum: u32,
}

impl BlockLogHeader {
    fn to_bytes(self) -> [u8; BLOCK_LOG_HEADER_SIZE] {
        let mut buf = [0u8; BLOCK_LOG_HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.block_num.to_le_bytes());
        buf[8..12].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[12..16].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    fn from_bytes(buf: &[u8; BLOCK_LOG_HEADER_SIZE]) -> Self {
        Self {
            block_num: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            payload_len: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            checksum: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
        }
    }
}

/// Appends blocks to the log file and records their offsets in the index
/// file. Both files are opened in append mode — nothing already written
/// is ever touched, which is what lets `ChainController::pop_block` trust
/// the log up to the durable boundary even if the process crashes mid-write.
pub struct BlockLogWriter {
    log: File,
    index: File,
    next_offset: u64,
}

impl BlockLogWriter {
    pub fn open(log_path: &Path, index_path: &Path) -> BlockLogResult<Self> {
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(log_path)?;
        let next_offset = log.metadata()?.len();
        let index = OpenOptions::new()
            .create(true)
            .append(true)
            .open(index_path)?;
        Ok(Self {
            log,
            index,
            next_offset,
        })
    }

    /// Appends `block` and returns the byte offset it was written at.
    pub fn append(&mut self, block_num: u64, block: &Block) -> BlockLogResult<u64> {
        let payload = bincode::serialize(block)?;
        let header = BlockLogHeader {
            block_num,
            payload_len: payload.len() as u32,
            checksum: crc32(&payload),
        };
        let offset = self.next_offset;
        self.log.write_all(&header.to_bytes())?;
        self.log.write_all(&payload)?;
        self.log.flush()?;
        self.index.write_all(&offset.to_le_bytes())?;
        self.index.flush()?;
        self.next_offset += (BLOCK_LOG_HEADER_SIZE + payload.len()) as u64;
        Ok(offset)
    }
}

/// Random-access reader over a block log, via its index file.
pub struct BlockLogReader {
    log: File,
    index: BufReader<File>,
}

impl BlockLogReader {
    pub fn open(log_path: &Path, index_path: &Path) -> BlockLogResult<Self> {
        let log = OpenOptions::new().read(true).open(log_path)?;
        let index = BufReader::new(OpenOptions::new().read(true).open(index_path)?);
        Ok(Self { log, index })
    }

    /// How many blocks the index currently knows about.
    pub fn len(&mut self) -> BlockLogResult<u64> {
        Ok(self.index.get_ref().metadata()?.len() / INDEX_ENTRY_SIZE as u64)
    }

    pub fn is_empty(&mut self) -> BlockLogResult<bool> {
        Ok(self.len()? == 0)
    }

    fn offset_of(&mut self, index_entry: u64) -> BlockLogResult<u64> {
        self.index
            .seek(SeekFrom::Start(index_entry * INDEX_ENTRY_SIZE as u64))?;
        let mut buf = [0u8; INDEX_ENTRY_SIZE];
        self.index
            .read_exact(&mut buf)
            .map_err(|_| BlockLogError::NotIndexed(index_entry))?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads the block at 0-based index `index_entry` in the log, i.e. the
    /// `index_entry`-th block ever appended (not the chain's block number,
    /// though the two coincide for a log with no gaps from genesis).
    pub fn read_at(&mut self, index_entry: u64) -> BlockLogResult<Block> {
        let offset = self.offset_of(index_entry)?;
        self.log.seek(SeekFrom::Start(offset))?;
        let mut header_buf = [0u8; BLOCK_LOG_HEADER_SIZE];
        self.log.read_exact(&mut header_buf)?;
        let header = BlockLogHeader::from_bytes(&header_buf);

        let mut payload = vec![0u8; header.payload_len as usize];
        self.log.read_exact(&mut payload)?;
        let got = crc32(&payload);
        if got != header.checksum {
            return Err(BlockLogError::ChecksumMismatch {
                block_num: header.block_num,
                expected: header.checksum,
                got,
            });
        }
        Ok(bincode::deserialize(&payload)?)
    }

    /// Iterate every block in the log from the start, in append order.
    pub fn iter_all(&mut self) -> BlockLogResult<Vec<Block>> {
        let count = self.len()?;
        (0..count).map(|i| self.read_at(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{protocol_types, ObjectId, Space};
    use crate::crypto::CompactSignature;
    use crate::tx::BlockHeader;
    use tempfile_like::TempPaths;

    mod tempfile_like {
        use std::path::PathBuf;

        /// Minimal scratch-dir helper so tests don't need a `tempfile` dev
        /// dependency: writes under `std::env::temp_dir()` with a name
        /// salted by the process id and an incrementing counter.
        pub struct TempPaths {
            pub log: PathBuf,
            pub index: PathBuf,
        }

        impl TempPaths {
            pub fn new(tag: &str) -> Self {
                static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
                let n = COUNTER.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                let base = std::env::temp_dir().join(format!(
                    "ledger-chain-core-test-{}-{}-{}",
                    std::process::id(),
                    tag,
                    n
                ));
                Self {
                    log: base.with_extension("log"),
                    index: base.with_extension("idx"),
                }
            }
        }

        impl Drop for TempPaths {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.log);
                let _ = std::fs::remove_file(&self.index);
            }
        }
    }

    fn sample_block(n: u8) -> Block {
        Block {
            header: BlockHeader {
                previous: [n; 20],
                timestamp: 1_600_000_000 + n as u32,
                witness: ObjectId::new(Space::Protocol, protocol_types::WITNESS, 0),
                transaction_merkle_root: [0u8; 20],
                previous_secret: [0u8; 20],
                next_secret_hash: [0u8; 20],
            },
            extensions: vec![],
            transactions: vec![],
            witness_signature: CompactSignature([0u8; 65]),
        }
    }

    #[test]
    fn append_then_read_back_round_trips() {
        let paths = TempPaths::new("roundtrip");
        let mut writer = BlockLogWriter::open(&paths.log, &paths.index).unwrap();
        writer.append(0, &sample_block(1)).unwrap();
        writer.append(1, &sample_block(2)).unwrap();
        drop(writer);

        let mut reader = BlockLogReader::open(&paths.log, &paths.index).unwrap();
        assert_eq!(reader.len().unwrap(), 2);
        let first = reader.read_at(0).unwrap();
        let second = reader.read_at(1).unwrap();
        assert_eq!(first.header.previous, [1u8; 20]);
        assert_eq!(second.header.previous, [2u8; 20]);
    }

    #[test]
    fn corrupted_payload_is_detected() {
        let paths = TempPaths::new("corrupt");
        let mut writer = BlockLogWriter::open(&paths.log, &paths.index).unwrap();
        writer.append(0, &sample_block(9)).unwrap();
        drop(writer);

        {
            let mut bytes = std::fs::read(&paths.log).unwrap();
            let last = bytes.len() - 1;
            bytes[last] ^= 0xFF;
            std::fs::write(&paths.log, bytes).unwrap();
        }

        let mut reader = BlockLogReader::open(&paths.log, &paths.index).unwrap();
        assert!(matches!(
            reader.read_at(0),
            Err(BlockLogError::ChecksumMismatch { .. })
        ));
    }
}
