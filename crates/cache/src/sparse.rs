//! Consistency checking between a page map and its cache file.
//!
//! The cache file is an ordinary sparse file: ranges that were never
//! downloaded stay holes. After crash recovery, or when a persisted stat
//! file is loaded, the map's claims are verified against the physical
//! HOLE/DATA layout discovered with sparse-seek. Bytes the map claims to
//! hold must live in DATA extents; declared holes may only overlap DATA
//! extents whose content is all zero.

use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileExt;

use tracing::warn;

use crate::page::{Page, PageList};

/// Read size for the zero scan over suspect hole bytes.
const ZERO_SCAN_CHUNK: u64 = 16 * 1024;

/// Outcome of [`PageList::compare_sparse_file`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SparseDiff {
    /// Ranges the map claims are present but the file stores as holes.
    /// Data was lost.
    pub errors: Vec<Page>,
    /// Declared holes holding nonzero data. Surplus bytes, harmless but
    /// unexpected.
    pub warnings: Vec<Page>,
}

impl SparseDiff {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

/// Maps the HOLE/DATA extents of an open cache file.
///
/// Returns pages covering `[0, size)` with `loaded == true` over DATA
/// extents and `false` over holes; `modified` is never set. The first
/// extent kind is discovered by seeking for both a hole and data from
/// position zero, then the file is walked transition by transition.
pub fn sparse_file_pages(file: &File, size: u64) -> io::Result<Vec<Page>> {
    if size == 0 {
        return Ok(Vec::new());
    }
    let fd = file.as_raw_fd();
    let hole = unsafe { libc::lseek(fd, 0, libc::SEEK_HOLE) };
    let data = unsafe { libc::lseek(fd, 0, libc::SEEK_DATA) };
    let mut in_hole = match (hole, data) {
        (-1, -1) => return Err(io::Error::last_os_error()),
        (-1, _) => false,
        (_, -1) => true,
        (hole, data) => hole < data,
    };

    let mut pages = Vec::new();
    let mut pos: u64 = 0;
    loop {
        let whence = if in_hole {
            libc::SEEK_DATA
        } else {
            libc::SEEK_HOLE
        };
        let next = unsafe { libc::lseek(fd, pos as libc::off_t, whence) };
        let end = if next < 0 { size } else { (next as u64).min(size) };
        if end > pos {
            pages.push(Page::new(pos, end - pos, !in_hole, false));
        }
        if next < 0 || next as u64 >= size {
            break;
        }
        pos = next as u64;
        in_hole = !in_hole;
    }
    Ok(pages)
}

/// True when `[start, start + bytes)` of the file reads as all NUL bytes.
///
/// A read failure counts as nonzero: the caller reports the area instead
/// of trusting it.
fn area_is_zero(file: &File, start: u64, bytes: u64) -> bool {
    let mut buf = [0u8; ZERO_SCAN_CHUNK as usize];
    let mut done: u64 = 0;
    while done < bytes {
        let want = (bytes - done).min(ZERO_SCAN_CHUNK) as usize;
        let got = match file.read_at(&mut buf[..want], start + done) {
            Ok(0) => return false,
            Ok(got) => got,
            Err(err) => {
                warn!(%err, start, bytes, "failed reading cache file during zero scan");
                return false;
            }
        };
        if buf[..got].iter().any(|b| *b != 0) {
            return false;
        }
        done += got as u64;
    }
    true
}

/// Checks one page of the map against the extent list, appending any
/// mismatching overlap to `diff`.
fn check_area(check: &Page, extents: &[Page], file: &File, diff: &mut SparseDiff) {
    for extent in extents {
        if extent.end() <= check.offset {
            continue;
        }
        if check.end() <= extent.offset {
            break;
        }
        let start = extent.offset.max(check.offset);
        let end = extent.end().min(check.end());
        if check.loaded || check.modified {
            // bytes the map claims to hold must not sit in a hole
            if !extent.loaded {
                warn!(start, bytes = end - start, "cache file lost data in a hole");
                diff.errors.push(Page::new(start, end - start, false, false));
            }
        } else if extent.loaded && !area_is_zero(file, start, end - start) {
            warn!(start, bytes = end - start, "declared hole contains data");
            diff.warnings.push(Page::new(start, end - start, true, false));
        }
    }
}

impl PageList {
    /// Verifies every page of the map against the physical hole/data
    /// layout of the cache file.
    ///
    /// Failing to map the extents at all yields a single error page over
    /// the whole file. The result is clean iff no error and no warning
    /// was accumulated.
    pub fn compare_sparse_file(&self, file: &File, size: u64) -> SparseDiff {
        let mut diff = SparseDiff::default();

        let extents = match sparse_file_pages(file, size) {
            Ok(extents) => extents,
            Err(err) => {
                warn!(%err, "failed to map hole/data extents of the cache file");
                diff.errors.push(Page::new(0, size, false, false));
                return diff;
            }
        };
        if extents.is_empty() && self.pages().is_empty() {
            // a zero-size cache file with no recorded pages
            return diff;
        }
        for page in self.pages() {
            check_area(page, &extents, file, &mut diff);
        }
        diff
    }
}
