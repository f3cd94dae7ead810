use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::observability;
use crate::store::StoreEvent;

/// Encode a single event to [len][bincode][crc32] format.
fn encode_event(writer: &mut impl Write, event: &StoreEvent) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Read frames until EOF or the first torn or corrupt one.
///
/// Returns the decoded events and the byte length of the valid prefix.
fn read_frames(reader: impl Read) -> io::Result<(Vec<StoreEvent>, u64)> {
    let mut reader = BufReader::new(reader);
    let mut events = Vec::new();
    let mut valid_len = 0u64;

    loop {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
        let len = u32::from_le_bytes(len_buf) as usize;

        let mut payload = vec![0u8; len];
        match reader.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
            Err(e) => return Err(e),
        }

        let mut crc_buf = [0u8; 4];
        match reader.read_exact(&mut crc_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
            Err(e) => return Err(e),
        }
        if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
            break;
        }

        match bincode::deserialize::<StoreEvent>(&payload) {
            Ok(event) => events.push(event),
            Err(_) => break,
        }
        valid_len += 8 + len as u64;
    }

    Ok((events, valid_len))
}

/// The file underneath a [`Wal`].
pub trait LogFile: Write {
    /// Make everything written so far durable.
    fn sync(&mut self) -> io::Result<()>;
    /// Cut the file back to `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Append-only write-ahead log of record store mutations.
///
/// Format per entry: `[u32: len][bincode: StoreEvent][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - A torn last entry (crash mid-write) is cut off when the log is opened.
///
/// An append either lands whole or leaves the file at its previous length.
/// If the file cannot be cut back after a failed write the log refuses
/// further appends.
pub struct Wal<F = File> {
    file: F,
    path: PathBuf,
    /// Bytes of fully written frames.
    len: u64,
    appends_since_compact: u64,
    poisoned: bool,
    /// Events appended while a compaction snapshot is being written.
    during_compaction: Option<Vec<StoreEvent>>,
}

impl Wal<File> {
    /// Open (or create) the WAL file at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        Self::open_and_replay(path).map(|(wal, _)| wal)
    }

    /// Open the WAL at `path` and return the events it holds.
    ///
    /// A torn or corrupt tail is truncated away so new frames follow the
    /// last good one.
    pub fn open_and_replay(path: &Path) -> io::Result<(Self, Vec<StoreEvent>)> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let (events, len) = read_frames(&mut file)?;
        if file.metadata()?.len() > len {
            tracing::warn!(
                "discarding torn tail of {} after {} events",
                path.display(),
                events.len()
            );
            file.set_len(len)?;
            file.sync_all()?;
        }
        Ok((Self::with_file(file, path.to_path_buf(), len), events))
    }

    /// Replay the WAL from disk, returning all valid events.
    /// Truncated/corrupt trailing entries are silently discarded.
    pub fn replay(path: &Path) -> io::Result<Vec<StoreEvent>> {
        match File::open(path) {
            Ok(file) => read_frames(file).map(|(events, _)| events),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn compact_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write a compacted log to a temp file next to `path` and fsync.
    /// This is the slow phase and runs without the store lock held.
    pub fn write_compact_file(path: &Path, events: &[StoreEvent]) -> io::Result<()> {
        let file = File::create(Self::compact_path(path))?;
        let mut writer = BufWriter::new(file);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Finish a compaction started with [`Wal::begin_compaction`].
    ///
    /// Events appended since then are copied onto the temp file, which is
    /// then renamed over the log and reopened.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        let tmp_path = Self::compact_path(&self.path);
        let late = self.during_compaction.take().unwrap_or_default();
        {
            let mut writer = BufWriter::new(OpenOptions::new().append(true).open(&tmp_path)?);
            for event in &late {
                encode_event(&mut writer, event)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.len = file.metadata()?.len();
        self.file = file;
        self.appends_since_compact = late.len() as u64;
        Ok(())
    }

    /// Replace the log with `events` in one step.
    #[cfg(test)]
    pub fn compact(&mut self, events: &[StoreEvent]) -> io::Result<()> {
        self.begin_compaction();
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }
}

impl<F: LogFile> Wal<F> {
    fn with_file(file: F, path: PathBuf, len: u64) -> Self {
        Self {
            file,
            path,
            len,
            appends_since_compact: 0,
            poisoned: false,
            during_compaction: None,
        }
    }

    /// Append one event and fsync before returning.
    ///
    /// On error the file is cut back to where it was, so a failed append
    /// never shows up on replay.
    pub fn append(&mut self, event: &StoreEvent) -> io::Result<()> {
        if self.poisoned {
            return Err(io::Error::other(format!(
                "{} has a partial entry that could not be removed",
                self.path.display()
            )));
        }
        let start = Instant::now();
        let mut frame = Vec::new();
        encode_event(&mut frame, event)?;

        let written = self
            .file
            .write_all(&frame)
            .and_then(|()| self.file.flush())
            .and_then(|()| self.file.sync());
        if let Err(e) = written {
            if let Err(cut) = self.file.truncate(self.len) {
                tracing::error!(
                    "cannot roll back failed append to {}: {cut}",
                    self.path.display()
                );
                self.poisoned = true;
            }
            return Err(e);
        }

        self.len += frame.len() as u64;
        self.appends_since_compact += 1;
        if let Some(late) = self.during_compaction.as_mut() {
            late.push(event.clone());
        }
        metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Start recording appends so a compaction written from an earlier
    /// snapshot can catch up. Returns false if one is already running.
    pub fn begin_compaction(&mut self) -> bool {
        if self.during_compaction.is_some() {
            return false;
        }
        self.during_compaction = Some(Vec::new());
        true
    }

    pub fn abort_compaction(&mut self) {
        self.during_compaction = None;
    }
}
