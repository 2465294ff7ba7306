//! The per-file page-range map.
//!
//! A [`PageList`] covers `[0, size)` of one cached file with contiguous,
//! non-overlapping [`Page`]s. Each page carries two independent flags:
//! `loaded` (the bytes in the cache file mirror the remote object) and
//! `modified` (the bytes were written locally and differ from remote).
//! Reads mark ranges loaded, writes mark them modified, and the upload
//! planner consumes the map on flush.
//!
//! A `PageList` is owned by exactly one open file handle; concurrent
//! mutation of a single list is the caller's problem to serialize.

use tracing::debug;

/// One contiguous byte range `[offset, offset + bytes)` of a cached file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    /// Start of the range in bytes.
    pub offset: u64,
    /// Length of the range in bytes.
    pub bytes: u64,
    /// The bytes in the cache file are valid (mirror the remote object).
    pub loaded: bool,
    /// The bytes were written locally and are not yet uploaded.
    pub modified: bool,
}

impl Page {
    pub fn new(offset: u64, bytes: u64, loaded: bool, modified: bool) -> Self {
        Self {
            offset,
            bytes,
            loaded,
            modified,
        }
    }

    /// Exclusive end of the range.
    pub fn end(&self) -> u64 {
        self.offset + self.bytes
    }

    /// A page with neither flag set: not downloaded, not dirty.
    pub fn is_hole(&self) -> bool {
        !self.loaded && !self.modified
    }

    pub fn status(&self) -> PageStatus {
        PageStatus::from_flags(self.loaded, self.modified)
    }
}

/// The four meaningful `(loaded, modified)` combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    /// Neither downloaded nor dirty.
    NotLoadModified,
    /// Clean cached data.
    Loaded,
    /// Dirty data that was never downloaded (write before read).
    Modified,
    /// Dirty data over previously loaded bytes.
    LoadModified,
}

impl PageStatus {
    pub fn from_flags(loaded: bool, modified: bool) -> Self {
        match (loaded, modified) {
            (false, false) => PageStatus::NotLoadModified,
            (true, false) => PageStatus::Loaded,
            (false, true) => PageStatus::Modified,
            (true, true) => PageStatus::LoadModified,
        }
    }

    pub fn is_loaded(self) -> bool {
        matches!(self, PageStatus::Loaded | PageStatus::LoadModified)
    }

    pub fn is_modified(self) -> bool {
        matches!(self, PageStatus::Modified | PageStatus::LoadModified)
    }
}

/// Ordered page map covering `[0, size)` contiguously.
///
/// The `shrunk` flag records that a truncation removed dirty bytes, so the
/// file counts as modified even when no surviving page carries the
/// `modified` flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageList {
    pages: Vec<Page>,
    shrunk: bool,
}

impl PageList {
    /// An empty list (size 0, no pages).
    pub fn new() -> Self {
        Self::default()
    }

    /// A list holding a single page `[0, size)` with the given flags.
    ///
    /// `size == 0` yields the one zero-length page an empty file keeps.
    pub fn with_flags(size: u64, loaded: bool, modified: bool) -> Self {
        let mut list = Self::new();
        list.init(size, loaded, modified);
        list
    }

    /// Replaces the contents with a single page `[0, size)`.
    pub fn init(&mut self, size: u64, loaded: bool, modified: bool) {
        self.clear();
        self.pages.push(Page::new(0, size, loaded, modified));
    }

    pub fn clear(&mut self) {
        self.pages.clear();
        self.shrunk = false;
    }

    /// End offset of the last page, or 0 for an empty list.
    pub fn size(&self) -> u64 {
        self.pages.last().map_or(0, Page::end)
    }

    /// The pages in order. Contiguous and non-overlapping after any public
    /// operation.
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Coalesces adjacent pages with identical flags.
    ///
    /// A contiguity violation (a gap left by external corruption) is
    /// bridged: a hole page is inserted after flagged pages, otherwise the
    /// preceding page is extended over the gap.
    pub fn compress(&mut self) {
        let mut out: Vec<Page> = Vec::with_capacity(self.pages.len());
        for page in self.pages.iter().copied() {
            let Some(last) = out.last_mut() else {
                out.push(page);
                continue;
            };
            if last.end() != page.offset {
                debug_assert!(last.end() < page.offset, "page map out of order");
                if last.loaded || last.modified {
                    let filler = Page::new(last.end(), page.offset - last.end(), false, false);
                    out.push(filler);
                } else {
                    last.bytes = page.offset - last.offset;
                }
            }
            let last = out.last_mut().expect("just pushed");
            if last.loaded == page.loaded && last.modified == page.modified {
                last.bytes += page.bytes;
            } else {
                out.push(page);
            }
        }
        self.pages = out;
    }

    /// Splits the page containing `pos` at `pos`, preserving flags.
    ///
    /// Idempotent at page boundaries (including the very end). Returns
    /// false if `pos` lies beyond the covered range.
    pub fn split_at(&mut self, pos: u64) -> bool {
        for idx in 0..self.pages.len() {
            let page = self.pages[idx];
            if pos == page.offset {
                return true;
            }
            if page.offset < pos && pos < page.end() {
                let head = Page::new(page.offset, pos - page.offset, page.loaded, page.modified);
                let tail = &mut self.pages[idx];
                tail.bytes -= pos - tail.offset;
                tail.offset = pos;
                self.pages.insert(idx, head);
                return true;
            }
        }
        // boundary at the current end is a no-op
        pos == self.size()
    }

    /// Grows the list to `size` with a new page of the given flags, or
    /// truncates it, splitting the page straddling the new end.
    ///
    /// Shrinking with `modified == true` marks the list as shrunk: the
    /// truncation itself is a local modification even though it leaves no
    /// dirty page behind.
    pub fn resize(&mut self, size: u64, loaded: bool, modified: bool) {
        let total = self.size();
        if total == 0 {
            // the shrunk flag survives re-initialization here
            self.pages.clear();
            self.pages.push(Page::new(0, size, loaded, modified));
        } else if total < size {
            self.pages.push(Page::new(total, size - total, loaded, modified));
        } else if size < total {
            self.pages.retain_mut(|page| {
                if page.end() <= size {
                    true
                } else if size <= page.offset {
                    false
                } else {
                    page.bytes = size - page.offset;
                    true
                }
            });
            if modified {
                self.shrunk = true;
            }
        }
        self.compress();
    }

    /// Applies `status` to `[start, start + len)`, growing the list when
    /// the range reaches past the current end.
    ///
    /// The gap between the old end and `start` becomes an unloaded page
    /// whose `modified` flag follows the status: bytes inside a hole
    /// created by a write past EOF count as dirty zeros.
    pub fn set_status(&mut self, start: u64, len: u64, status: PageStatus, compress: bool) {
        let total = self.size();
        let loaded = status.is_loaded();
        let modified = status.is_modified();

        if total <= start {
            if total < start {
                self.resize(start, false, modified);
            }
            self.resize(start + len, loaded, modified);
        } else if total <= start + len {
            // cut back to start, keeping existing flags, then regrow
            self.resize(start, false, false);
            self.resize(start + len, loaded, modified);
        } else {
            // interior update: isolate the range and overwrite it
            self.split_at(start);
            self.split_at(start + len);
            for page in &mut self.pages {
                if page.end() <= start {
                    continue;
                }
                if start + len <= page.offset {
                    break;
                }
                page.loaded = loaded;
                page.modified = modified;
            }
        }
        if compress {
            self.compress();
        }
    }

    /// True iff every page intersecting `[start, start + len)` is loaded.
    ///
    /// `len == 0` probes from `start` to the end of the list.
    pub fn is_loaded_range(&self, start: u64, len: u64) -> bool {
        for page in &self.pages {
            if page.end() <= start {
                continue;
            }
            if !page.loaded {
                return false;
            }
            if len != 0 && start + len <= page.end() {
                break;
            }
        }
        true
    }

    /// First page at or after `start` that is neither loaded nor modified.
    ///
    /// Modified-but-unloaded pages are skipped: a download must never
    /// overwrite locally written bytes.
    pub fn find_unloaded_page(&self, start: u64) -> Option<Page> {
        self.pages
            .iter()
            .find(|page| start < page.end() && page.is_hole())
            .copied()
    }

    /// Every hole subrange intersecting `[start, start + len)`, adjacent
    /// results merged. `len == 0` means up to the end of the list.
    pub fn unloaded_pages(&self, start: u64, mut len: u64) -> Vec<Page> {
        if len == 0 {
            len = self.size().saturating_sub(start);
        }
        let stop = start + len;

        let mut out: Vec<Page> = Vec::new();
        for page in &self.pages {
            if page.end() <= start {
                continue;
            }
            if stop <= page.offset {
                break;
            }
            if !page.is_hole() {
                continue;
            }
            let sub_start = page.offset.max(start);
            let sub_end = page.end().min(stop);
            match out.last_mut() {
                Some(prev) if prev.end() == sub_start => prev.bytes += sub_end - sub_start,
                _ => out.push(Page::new(sub_start, sub_end - sub_start, false, false)),
            }
        }
        out
    }

    /// Total bytes of hole subranges intersecting `[start, start + len)`.
    ///
    /// With `limit > 0` only subranges strictly smaller than `limit`
    /// count, which is how callers decide whether small gaps are worth
    /// prefetching to coalesce I/O. `len == 0` means up to the end.
    pub fn total_unloaded_bytes(&self, start: u64, mut len: u64, limit: u64) -> u64 {
        if len == 0 {
            len = self.size().saturating_sub(start);
        }
        let stop = start + len;

        let mut total = 0;
        for page in &self.pages {
            if page.end() <= start {
                continue;
            }
            if stop <= page.offset {
                break;
            }
            if !page.is_hole() {
                continue;
            }
            let sub = page.end().min(stop) - page.offset.max(start);
            if limit == 0 || sub < limit {
                total += sub;
            }
        }
        total
    }

    /// Every non-modified subrange intersecting `[start, start + len)`,
    /// regardless of the loaded flag. Used when invalidating local state.
    /// `len == 0` means up to the end of the list.
    pub fn no_data_pages(&mut self, start: u64, len: u64) -> Vec<Page> {
        self.compress();

        let stop = if len == 0 { None } else { Some(start + len) };
        let mut collected: Vec<Page> = Vec::new();
        for page in &self.pages {
            if page.end() < start {
                continue;
            }
            if let Some(stop) = stop {
                if stop <= page.offset {
                    break;
                }
            }
            if page.modified {
                continue;
            }
            let sub_start = page.offset.max(start);
            let sub_end = match stop {
                Some(stop) => page.end().min(stop),
                None => page.end(),
            };
            if sub_end <= sub_start {
                continue;
            }
            collected.push(Page::new(
                sub_start,
                sub_end - sub_start,
                page.loaded,
                page.modified,
            ));
        }
        merge_runs(&collected, MergeFlags::default())
    }

    /// Sum of bytes over modified pages. The shrunk flag does not count.
    pub fn bytes_modified(&self) -> u64 {
        self.pages
            .iter()
            .filter(|page| page.modified)
            .map(|page| page.bytes)
            .sum()
    }

    /// True when any page is dirty or a truncation removed dirty bytes.
    pub fn is_modified(&self) -> bool {
        self.shrunk || self.pages.iter().any(|page| page.modified)
    }

    /// Clears the shrunk flag and every page's modified flag.
    pub fn clear_all_modified(&mut self) {
        self.shrunk = false;
        for page in &mut self.pages {
            page.modified = false;
        }
        self.compress();
    }

    /// Logs the page map at debug level.
    pub fn dump(&self) {
        debug!(shrunk = self.shrunk, pages = self.pages.len(), "page map");
        for (idx, page) in self.pages.iter().enumerate() {
            debug!(
                idx,
                offset = page.offset,
                bytes = page.bytes,
                loaded = page.loaded,
                modified = page.modified,
            );
        }
    }
}

/// Flag handling for [`merge_runs`]: either flag can be collapsed (ignored
/// during comparison and forced to a default in the output).
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct MergeFlags {
    pub ignore_loaded: bool,
    pub ignore_modified: bool,
    pub default_loaded: bool,
    pub default_modified: bool,
}

impl MergeFlags {
    /// Collapse the loaded flag, leaving runs keyed by `modified` only.
    pub(crate) fn ignore_loaded() -> Self {
        Self {
            ignore_loaded: true,
            ..Self::default()
        }
    }

    /// Collapse the modified flag, leaving runs keyed by `loaded` only.
    pub(crate) fn ignore_modified() -> Self {
        Self {
            ignore_modified: true,
            ..Self::default()
        }
    }
}

/// Merges a page sequence into maximal runs, dropping zero-length pages.
///
/// Only pages that are adjacent and agree on the compared flags merge; the
/// sequence is not required to be contiguous and gaps are left alone.
pub(crate) fn merge_runs(pages: &[Page], flags: MergeFlags) -> Vec<Page> {
    let mut out: Vec<Page> = Vec::new();
    for page in pages.iter().filter(|page| page.bytes > 0) {
        let mut page = *page;
        if flags.ignore_loaded {
            page.loaded = flags.default_loaded;
        }
        if flags.ignore_modified {
            page.modified = flags.default_modified;
        }
        match out.last_mut() {
            Some(last)
                if last.end() == page.offset
                    && last.loaded == page.loaded
                    && last.modified == page.modified =>
            {
                last.bytes += page.bytes;
            }
            _ => out.push(page),
        }
    }
    out
}
