//! Sidecar stat-file persistence for a page map.
//!
//! When a dirty file closes, its [`PageList`] is written next to the cache
//! file so the state survives a remount. The format is `\n`-delimited
//! UTF-8 text:
//!
//! ```text
//! <inode>:<total_size>
//! <offset>:<bytes>:<loaded 0|1>:<modified 0|1>
//! ```
//!
//! Two legacy forms are still read: a header holding only the size (no
//! inode, so no inode check) and page lines without the modified field.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::page::{PageList, PageStatus};

#[derive(Debug, thiserror::Error)]
pub enum StatError {
    #[error("stat file io error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed stat file entry {0:?}")]
    Parse(String),
    #[error("stat file inode {found} does not match cache file inode {expected}")]
    InodeMismatch { expected: u64, found: u64 },
    #[error("stat file claims size {header} but its pages cover {actual}")]
    SizeMismatch { header: u64, actual: u64 },
}

/// An open sidecar stat file.
#[derive(Debug)]
pub struct CacheFileStat {
    file: File,
}

impl CacheFileStat {
    /// Opens the stat file at `path`, creating it when missing.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self { file })
    }

    pub fn from_file(file: File) -> Self {
        Self { file }
    }

    /// Writes `list` keyed by `inode`, truncating any previous contents.
    ///
    /// The data is not flushed to durable storage; syncing is the
    /// caller's decision.
    pub fn save(&self, list: &PageList, inode: u64) -> Result<(), StatError> {
        let mut out = format!("{}:{}", inode, list.size());
        for page in list.pages() {
            out.push_str(&format!(
                "\n{}:{}:{}:{}",
                page.offset,
                page.bytes,
                u8::from(page.loaded),
                u8::from(page.modified)
            ));
        }
        self.file.set_len(0)?;
        self.file.write_all_at(out.as_bytes(), 0)?;
        Ok(())
    }

    /// Rebuilds the page map recorded in the stat file.
    ///
    /// Fails when the recorded inode is present and differs from `inode`,
    /// when any line does not parse, or when the reconstructed size does
    /// not match the header. An empty stat file yields the empty map.
    pub fn load(&self, inode: u64) -> Result<PageList, StatError> {
        let len = self.file.metadata()?.len();
        if len == 0 {
            return Ok(PageList::with_flags(0, false, false));
        }
        let mut raw = vec![0u8; len as usize];
        self.file.read_exact_at(&mut raw, 0)?;
        let text =
            String::from_utf8(raw).map_err(|err| StatError::Parse(err.to_string()))?;
        parse_stat(&text, inode)
    }
}

fn parse_stat(text: &str, inode: u64) -> Result<PageList, StatError> {
    let mut lines = text.lines();
    let head = lines
        .next()
        .ok_or_else(|| StatError::Parse(text.to_string()))?;

    let (cache_inode, total) = match head.split_once(':') {
        // legacy header carries only the size
        None => (0, parse_field(head)?),
        Some((ino, size)) => {
            let ino = parse_field(ino)?;
            if ino == 0 {
                return Err(StatError::Parse(head.to_string()));
            }
            (ino, parse_field(size)?)
        }
    };
    if cache_inode != 0 && cache_inode != inode {
        return Err(StatError::InodeMismatch {
            expected: inode,
            found: cache_inode,
        });
    }

    let mut list = PageList::new();
    for line in lines {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 3 {
            return Err(StatError::Parse(line.to_string()));
        }
        let offset = parse_field(fields[0])?;
        let bytes = parse_field(fields[1])?;
        let loaded = parse_field(fields[2])? == 1;
        // legacy page lines have no modified field
        let modified = match fields.get(3) {
            Some(field) => parse_field(field)? == 1,
            None => false,
        };
        list.set_status(offset, bytes, PageStatus::from_flags(loaded, modified), true);
    }

    if total != list.size() {
        return Err(StatError::SizeMismatch {
            header: total,
            actual: list.size(),
        });
    }
    Ok(list)
}

fn parse_field(field: &str) -> Result<u64, StatError> {
    field
        .parse::<u64>()
        .map_err(|_| StatError::Parse(field.to_string()))
}
