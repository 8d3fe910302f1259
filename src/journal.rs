use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Larger length prefixes can only come from a corrupt tail.
const MAX_RECORD_LEN: usize = 1 << 20;

/// Frame one event as `[u32 len][bincode][u32 crc32]`, little-endian.
fn write_frame(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload = bincode::serialize(event).map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(ErrorKind::InvalidData, "journal record too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read exactly `buf.len()` bytes. `Ok(false)` on a clean or torn end of file.
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Append-only document journal.
///
/// Every document write is one framed [`Event`]. A torn or corrupt tail left
/// by a crash is cut off by [`Journal::recover`]; everything before it is kept.
pub struct Journal {
    file: File,
    path: PathBuf,
    /// Bytes covered by committed batches.
    committed_len: u64,
    appends_since_compact: u64,
}

impl Journal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let committed_len = file.metadata()?.len();
        Ok(Self {
            file,
            path: path.to_path_buf(),
            committed_len,
            appends_since_compact: 0,
        })
    }

    /// Replay the journal, truncate anything past the last intact record,
    /// and open it for appends.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let (events, intact_len) = Self::scan(path)?;
        if let Ok(meta) = fs::metadata(path)
            && meta.len() > intact_len
        {
            tracing::warn!(
                "journal {}: truncating {} trailing bytes after {} events",
                path.display(),
                meta.len() - intact_len,
                events.len()
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(intact_len)?;
            file.sync_all()?;
        }
        Ok((Self::open(path)?, events))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Frame and fsync a group of events as one commit.
    ///
    /// All-or-nothing: if the write or fsync fails, the file is cut back to
    /// the end of the previous batch before the error is returned.
    pub fn append_batch<'a>(&mut self, events: impl IntoIterator<Item = &'a Event>) -> io::Result<()> {
        let mut frames = Vec::new();
        let mut count = 0u64;
        for event in events {
            write_frame(&mut frames, event)?;
            count += 1;
        }

        if let Err(e) = self.write_and_sync(&frames) {
            if let Err(undo) = self.roll_back() {
                tracing::error!("journal {}: could not roll back failed batch: {undo}", self.path.display());
            }
            return Err(e);
        }
        self.committed_len += frames.len() as u64;
        self.appends_since_compact += count;
        Ok(())
    }

    fn write_and_sync(&mut self, frames: &[u8]) -> io::Result<()> {
        self.file.write_all(frames)?;
        self.file.sync_all()
    }

    /// Drop bytes past the last committed batch.
    fn roll_back(&mut self) -> io::Result<()> {
        self.file.set_len(self.committed_len)?;
        self.file.sync_all()
    }

    /// Rewrite the journal as `events` via temp file + rename, then reopen.
    pub fn rewrite(&mut self, events: &[Event]) -> io::Result<()> {
        let tmp_path = self.path.with_extension("journal.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            for event in events {
                write_frame(&mut writer, event)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        *self = Self::open(&self.path)?;
        Ok(())
    }

    /// Read every intact event. A missing file is an empty journal.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        Ok(Self::scan(path)?.0)
    }

    /// Intact events plus the byte offset where they end.
    fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut intact_len = 0u64;

        loop {
            let mut len_buf = [0u8; 4];
            if !read_or_eof(&mut reader, &mut len_buf)? {
                break;
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_RECORD_LEN {
                tracing::warn!("journal {}: implausible record length {len} after {} events", path.display(), events.len());
                break;
            }
            let mut payload = vec![0u8; len];
            let mut crc_buf = [0u8; 4];
            if !read_or_eof(&mut reader, &mut payload)? || !read_or_eof(&mut reader, &mut crc_buf)? {
                tracing::warn!("journal {}: dropping torn record after {} events", path.display(), events.len());
                break;
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                tracing::warn!("journal {}: checksum mismatch after {} events", path.display(), events.len());
                break;
            }
            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!("journal {}: undecodable record: {e}", path.display());
                    break;
                }
            }
            intact_len += 8 + len as u64;
        }

        Ok((events, intact_len))
    }
}
