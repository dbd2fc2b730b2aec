use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use bytes::Bytes;
use log::warn;
use parking_lot::{Mutex, RwLock};

use protocol::fixed_codec::FixedCodec;
use protocol::traits::{BlockPersistence, Context, ScanCursor};
use protocol::types::{BlockPair, Hash};
use protocol::ProtocolResult;

use crate::adapter::index::BlockHeightIndex;
use crate::StorageError;

const RECORD_LEN_BYTES: u64 = 4;

/// Append-only log of length-prefixed, codec-encoded block pairs.
///
/// The writing tip is guarded by a mutex so there is at most one appender;
/// readers open independent file handles and seek concurrently. Startup
/// performs a full scan rebuilding the height and timestamp-bucket indices,
/// truncating the log at the last valid record.
pub struct FileBlockPersistence {
    path:  PathBuf,
    index: RwLock<BlockHeightIndex>,
    tip:   Mutex<File>,
}

impl FileBlockPersistence {
    pub fn new<P: AsRef<Path>>(data_dir: P, blocks_filename: &str) -> ProtocolResult<Self> {
        fs::create_dir_all(&data_dir).map_err(StorageError::Io)?;
        let path = data_dir.as_ref().join(blocks_filename);

        let tip = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(StorageError::Io)?;

        let (index, valid_len) = rebuild_index(&path)?;

        let file_len = tip.metadata().map_err(StorageError::Io)?.len();
        if valid_len < file_len {
            warn!(
                "[storage]: blocks file {:?} truncated from {} to {} after trailing corrupt record",
                path, file_len, valid_len
            );
            tip.set_len(valid_len).map_err(StorageError::Io)?;
        }

        Ok(FileBlockPersistence {
            path,
            index: RwLock::new(index),
            tip: Mutex::new(tip),
        })
    }

    fn write_next_block_sync(&self, pair: &BlockPair) -> ProtocolResult<()> {
        // the tip mutex guarantees at most one appender
        let mut tip = self.tip.lock();

        let (top, start_offset) = {
            let index = self.index.read();
            (index.top_height(), index.writing_tip_offset()?)
        };

        if pair.height() != top + 1 {
            return Err(StorageError::OutOfOrder {
                height: pair.height(),
                top,
            }
            .into());
        }

        let physical = tip.seek(SeekFrom::End(0)).map_err(StorageError::Io)?;
        if physical != start_offset {
            return Err(StorageError::IndexMismatch {
                expected: start_offset,
                found:    physical,
            }
            .into());
        }

        let payload = pair.encode_fixed()?;
        tip.write_u32::<BigEndian>(payload.len() as u32)
            .map_err(StorageError::Io)?;
        tip.write_all(&payload).map_err(StorageError::Io)?;
        tip.flush().map_err(StorageError::Io)?;
        tip.sync_data().map_err(StorageError::Io)?;

        let new_offset = start_offset + RECORD_LEN_BYTES + payload.len() as u64;
        self.index
            .write()
            .append_block(start_offset, new_offset, pair)
    }

    fn scan_blocks_sync(
        &self,
        from: u64,
        page_size: usize,
        cursor: ScanCursor<'_>,
    ) -> ProtocolResult<()> {
        let offset = self.index.read().offset_for(from)?;

        let mut file = File::open(&self.path).map_err(StorageError::Io)?;
        file.seek(SeekFrom::Start(offset)).map_err(StorageError::Io)?;
        let mut reader = BufReader::new(file);

        let mut want_next = true;
        let mut last_height_read = from.saturating_sub(1);

        while want_next && self.index.read().top_height() > last_height_read {
            let mut page = Vec::with_capacity(page_size);
            while page.len() < page_size && self.index.read().top_height() > last_height_read {
                let pair = read_record(&mut reader)?.ok_or(StorageError::MissingBlock {
                    height: last_height_read + 1,
                })?;
                last_height_read = pair.height();
                page.push(pair);
            }
            if !page.is_empty() {
                want_next = cursor(page[0].height(), &page);
            }
        }

        Ok(())
    }

    fn get_block_at_sync(&self, height: u64) -> ProtocolResult<Option<BlockPair>> {
        if height == 0 || height > self.index.read().top_height() {
            return Ok(None);
        }

        let mut found = None;
        self.scan_blocks_sync(height, 1, &mut |_, page| {
            found = Some(page[0].clone());
            false
        })?;
        Ok(found)
    }
}

#[async_trait]
impl BlockPersistence for FileBlockPersistence {
    async fn write_next_block(&self, _ctx: Context, pair: BlockPair) -> ProtocolResult<()> {
        self.write_next_block_sync(&pair)
    }

    async fn get_last_block(&self, _ctx: Context) -> ProtocolResult<Option<BlockPair>> {
        Ok(self.index.read().top_block())
    }

    async fn get_last_block_height(&self, _ctx: Context) -> ProtocolResult<u64> {
        Ok(self.index.read().top_height())
    }

    async fn get_block_at(&self, _ctx: Context, height: u64) -> ProtocolResult<Option<BlockPair>> {
        self.get_block_at_sync(height)
    }

    async fn scan_blocks(
        &self,
        _ctx: Context,
        from: u64,
        page_size: usize,
        cursor: ScanCursor<'_>,
    ) -> ProtocolResult<()> {
        self.scan_blocks_sync(from, page_size, cursor)
    }

    async fn get_block_by_tx(
        &self,
        _ctx: Context,
        tx_hash: Hash,
        min_timestamp: u64,
        max_timestamp: u64,
    ) -> ProtocolResult<Option<(BlockPair, usize)>> {
        let scan_from = self
            .index
            .read()
            .earliest_tx_block_in_ts_range(min_timestamp, max_timestamp);
        let from = match scan_from {
            Some(height) => height,
            None => return Ok(None),
        };

        let mut found = None;
        self.scan_blocks_sync(from, 1, &mut |_, page| {
            let pair = &page[0];
            if pair.timestamp() > max_timestamp {
                return false;
            }
            if pair.timestamp() < min_timestamp {
                return true;
            }

            for (position, receipt) in pair.results.receipts.iter().enumerate() {
                if receipt.tx_hash == tx_hash {
                    found = Some((pair.clone(), position));
                    return false;
                }
            }
            true
        })?;

        Ok(found)
    }
}

/// `None` at a clean or mid-record end of file; decoding failures propagate.
fn read_record<R: Read>(reader: &mut R) -> ProtocolResult<Option<BlockPair>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(StorageError::Io(e).into()),
    }

    let len = BigEndian::read_u32(&len_buf) as usize;
    let mut payload = vec![0u8; len];
    match reader.read_exact(&mut payload) {
        Ok(()) => {}
        Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(StorageError::Io(e).into()),
    }

    Ok(Some(BlockPair::decode_fixed(Bytes::from(payload))?))
}

/// Full startup scan. Returns the rebuilt index and the byte length of the
/// valid prefix; anything past it is a truncated or corrupt trailing record.
fn rebuild_index(path: &Path) -> ProtocolResult<(BlockHeightIndex, u64)> {
    let file = File::open(path).map_err(StorageError::Io)?;
    let file_len = file.metadata().map_err(StorageError::Io)?.len();
    let mut reader = BufReader::new(file);

    let mut index = BlockHeightIndex::new(0);
    let mut offset = 0u64;

    loop {
        let mut len_buf = [0u8; 4];
        if reader.read_exact(&mut len_buf).is_err() {
            break;
        }
        let len = BigEndian::read_u32(&len_buf) as u64;

        if offset + RECORD_LEN_BYTES + len > file_len {
            warn!(
                "[storage]: record at offset {} declares {} bytes past end of file",
                offset, len
            );
            break;
        }

        let mut payload = vec![0u8; len as usize];
        if reader.read_exact(&mut payload).is_err() {
            break;
        }

        let pair = match BlockPair::decode_fixed(Bytes::from(payload)) {
            Ok(pair) => pair,
            Err(_) => {
                warn!("[storage]: undecodable record at offset {}", offset);
                break;
            }
        };

        if pair.height() != index.top_height() + 1 {
            warn!(
                "[storage]: record at offset {} has height {}, expected {}",
                offset,
                pair.height(),
                index.top_height() + 1
            );
            break;
        }

        let new_offset = offset + RECORD_LEN_BYTES + len;
        index.append_block(offset, new_offset, &pair)?;
        offset = new_offset;
    }

    Ok((index, offset))
}
