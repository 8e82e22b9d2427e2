use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FabricError, Result};

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: u64 = 8;

/// Largest payload a single frame may carry (64 MiB).
const MAX_ENTRY_SIZE: usize = 64 * 1024 * 1024;

/// Flush/sync strategy for the journal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every append.
    #[default]
    EveryWrite,
    /// Flush to the OS and let the page cache decide.
    OsDefault,
}

/// One framed payload read back from disk.
struct Frame {
    offset: u64,
    payload: Vec<u8>,
}

/// Result of scanning the journal from the start.
struct Scan {
    /// Intact frames, in file order.
    frames: Vec<Frame>,
    /// Offset just past the last intact frame.
    valid_end: u64,
    /// Offset of a complete frame whose CRC did not match, if the scan stopped on one.
    damaged_at: Option<u64>,
}

struct WalWriter {
    writer: BufWriter<File>,
    /// End of the last complete frame.
    offset: u64,
    entries: u64,
}

/// Append-only, crash-recoverable journal of bincode records.
///
/// On-disk format, repeated:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: bincode payload]
/// ```
///
/// Replay stops at the first frame that is torn or fails its CRC. Nothing
/// after that point is trusted: when the journal is opened the file is cut
/// back to the last intact frame so later appends start on a frame boundary.
/// A journal cut because of a CRC mismatch (not just a torn tail) is first
/// copied aside to `<name>.damaged` so the dropped bytes are not lost.
pub struct WriteAheadLog {
    path: PathBuf,
    writer: Mutex<WalWriter>,
    sync: SyncMode,
}

impl WriteAheadLog {
    /// Open (or create) the journal file at `path`.
    pub fn open(path: &Path, sync: SyncMode) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let file_len = file.metadata()?.len();
        let Scan { frames, valid_end, damaged_at } = read_frames(path)?;
        if let Some(offset) = damaged_at {
            let copy = damaged_copy_path(path);
            fs::copy(path, &copy)?;
            warn!(
                path = %path.display(),
                offset,
                dropped = file_len - valid_end,
                copy = %copy.display(),
                "journal CRC mismatch; truncating at the damaged frame"
            );
            file.set_len(valid_end)?;
        } else if valid_end < file_len {
            warn!(
                path = %path.display(),
                valid_end,
                file_len,
                "journal has a torn tail; truncating"
            );
            file.set_len(valid_end)?;
        }

        debug!(path = %path.display(), entries = frames.len(), "journal opened");
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(WalWriter {
                writer: BufWriter::new(file),
                offset: valid_end,
                entries: frames.len() as u64,
            }),
            sync,
        })
    }

    /// Append one record. Returns the byte offset of its frame.
    ///
    /// The record is on disk (or at least handed to the OS, under
    /// [`SyncMode::OsDefault`]) when this returns.
    pub fn append<T: Serialize + ?Sized>(&self, record: &T) -> Result<u64> {
        let payload =
            bincode::serialize(record).map_err(|e| FabricError::Serialization(e.to_string()))?;
        if payload.len() > MAX_ENTRY_SIZE {
            return Err(FabricError::EntryTooLarge {
                size: payload.len(),
                limit: MAX_ENTRY_SIZE,
            });
        }

        let length = payload.len() as u32;
        let crc = crc32fast::hash(&payload);

        let mut w = self.writer.lock().map_err(|_| FabricError::Poisoned)?;
        let entry_offset = w.offset;

        w.writer.write_all(&length.to_le_bytes())?;
        w.writer.write_all(&crc.to_le_bytes())?;
        w.writer.write_all(&payload)?;
        w.writer.flush()?;
        if self.sync == SyncMode::EveryWrite {
            w.writer.get_ref().sync_data()?;
        }

        w.offset += HEADER_SIZE + payload.len() as u64;
        w.entries += 1;

        debug!(offset = entry_offset, len = payload.len(), "journal append");
        Ok(entry_offset)
    }

    /// Read every record up to the first damaged frame, oldest first.
    ///
    /// A frame that passes its CRC but does not decode as `T` is an error:
    /// the journal was written in another format and replaying around it
    /// would silently drop history.
    pub fn recover<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        // Hold the writer lock so a concurrent append cannot be half-read.
        let _guard = self.writer.lock().map_err(|_| FabricError::Poisoned)?;
        let Scan { frames, damaged_at, .. } = read_frames(&self.path)?;
        if let Some(offset) = damaged_at {
            warn!(offset, "journal CRC mismatch; stopping replay");
        }

        let mut records = Vec::with_capacity(frames.len());
        for frame in frames {
            let record = bincode::deserialize::<T>(&frame.payload).map_err(|e| {
                FabricError::Serialization(format!(
                    "journal entry at offset {} does not decode: {e}",
                    frame.offset
                ))
            })?;
            records.push(record);
        }

        debug!(recovered = records.len(), "journal recovery complete");
        Ok(records)
    }

    /// Bytes of complete frames currently in the journal.
    pub fn size(&self) -> Result<u64> {
        Ok(self.writer.lock().map_err(|_| FabricError::Poisoned)?.offset)
    }

    /// Number of intact frames in the journal.
    pub fn entry_count(&self) -> Result<u64> {
        Ok(self.writer.lock().map_err(|_| FabricError::Poisoned)?.entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for WriteAheadLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteAheadLog")
            .field("path", &self.path)
            .field("sync", &self.sync)
            .finish()
    }
}

/// `journal.wal` -> `journal.wal.damaged`.
fn damaged_copy_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".damaged");
    path.with_file_name(name)
}

/// Scan frames from the start, stopping at the first torn or CRC-damaged one.
fn read_frames(path: &Path) -> Result<Scan> {
    let mut file = BufReader::new(File::open(path)?);
    let file_len = file.get_ref().metadata()?.len();
    let mut frames = Vec::new();
    let mut offset: u64 = 0;
    let mut damaged_at = None;

    while offset + HEADER_SIZE <= file_len {
        let mut header = [0u8; HEADER_SIZE as usize];
        match file.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        if length == 0
            || length as usize > MAX_ENTRY_SIZE
            || offset + HEADER_SIZE + length as u64 > file_len
        {
            warn!(offset, length, file_len, "invalid journal frame length; stopping scan");
            break;
        }

        let mut payload = vec![0u8; length as usize];
        match file.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                warn!(offset, "truncated journal frame; stopping scan");
                break;
            }
            Err(e) => return Err(e.into()),
        }

        if crc32fast::hash(&payload) != expected_crc {
            damaged_at = Some(offset);
            break;
        }

        frames.push(Frame { offset, payload });
        offset += HEADER_SIZE + length as u64;
    }

    Ok(Scan {
        frames,
        valid_end: offset,
        damaged_at,
    })
}
