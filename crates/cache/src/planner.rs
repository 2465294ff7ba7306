//! Multipart upload planning over a dirty page map.
//!
//! The object store requires every part of a multipart upload except the
//! last to be at least [`MIN_MULTIPART_SIZE`] bytes. Unmodified ranges can
//! be reused from the existing remote object by server-side copy; modified
//! ranges must be uploaded. Short runs of either kind cannot stand as a
//! part on their own, so the planner walks the modified/clean run sequence
//! left to right, downloading just enough clean bytes to pad short dirty
//! runs up to a valid part and folding undersized clean neighbors into the
//! upload stream. The result minimizes transferred bytes without a global
//! optimizer: decisions accumulate forward, one run boundary at a time.

use crate::page::{merge_runs, MergeFlags, Page, PageList};

/// Minimum size of every multipart part except the last, dictated by the
/// upstream store.
pub const MIN_MULTIPART_SIZE: u64 = 5 * 1024 * 1024;

/// Output of [`PageList::plan_multipart_upload`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadPlan {
    /// Ranges to fetch from the remote object before their part can be
    /// uploaded. Every byte here was clean before planning.
    pub download: Vec<Page>,
    /// Per-part decisions covering `[0, size)` in order. A part with
    /// `modified == true` is uploaded from local data; the rest are
    /// assembled server-side from the existing remote object.
    pub parts: Vec<Page>,
}

impl PageList {
    /// Plans a mixed copy/upload multipart upload for the current map.
    ///
    /// `max_part_size` is the target part size; modified runs longer than
    /// twice that are split into `max_part_size` chunks, keeping the
    /// terminal remainder whole so no split falls below the target. Copy
    /// runs are never split: the store range-copies them internally.
    pub fn plan_multipart_upload(&mut self, max_part_size: u64) -> UploadPlan {
        debug_assert!(max_part_size >= MIN_MULTIPART_SIZE);
        self.compress();

        // flatten to runs keyed by the modified flag only
        let runs = merge_runs(self.pages(), MergeFlags::ignore_loaded());

        let mut download: Vec<Page> = Vec::new();
        let mut parts: Vec<Page> = Vec::new();
        let mut prev = Page::default();

        for run in &runs {
            if run.modified {
                if prev.modified {
                    prev.bytes += run.bytes;
                } else if prev.bytes < MIN_MULTIPART_SIZE {
                    // clean run too small to stand as a copy part: download
                    // all of it and fold it into the upload stream
                    download.push(prev);
                    prev.modified = true;
                    parts.push(prev);
                    prev = *run;
                } else {
                    parts.push(prev);
                    prev = *run;
                }
            } else if !prev.modified {
                prev.bytes += run.bytes;
            } else if prev.bytes < MIN_MULTIPART_SIZE {
                // dirty run too small for a part: borrow the missing bytes
                // from the head of the clean run
                let missing = MIN_MULTIPART_SIZE - prev.bytes;
                if missing + MIN_MULTIPART_SIZE < run.bytes {
                    download.push(Page::new(run.offset, missing, false, false));
                    prev.bytes = MIN_MULTIPART_SIZE;
                    parts.push(prev);
                    prev = *run;
                    prev.offset += missing;
                    prev.bytes -= missing;
                } else {
                    // the clean run is too short to both pad the part and
                    // survive on its own; absorb it whole. The combined run
                    // may still fall short of the minimum, in which case the
                    // next boundary keeps accumulating.
                    download.push(*run);
                    prev.bytes += run.bytes;
                }
            } else {
                parts.push(prev);
                prev = *run;
            }
        }
        if prev.bytes > 0 {
            parts.push(prev);
        }

        let download = merge_runs(&download, MergeFlags::ignore_modified());
        let parts = merge_runs(&parts, MergeFlags::ignore_loaded());
        UploadPlan {
            download: split_oversized(&download, max_part_size),
            parts: split_oversized(&parts, max_part_size),
        }
    }
}

/// Splits modified runs longer than `2 * max_part_size` into consecutive
/// `max_part_size` chunks; a terminal remainder of up to twice the part
/// size stays whole, so no emitted split is undersized.
fn split_oversized(pages: &[Page], max_part_size: u64) -> Vec<Page> {
    let mut out: Vec<Page> = Vec::new();
    for page in pages {
        if !page.modified {
            out.push(*page);
            continue;
        }
        let mut start = page.offset;
        let mut rest = page.bytes;
        while rest > 0 {
            let chunk = if rest > max_part_size * 2 {
                max_part_size
            } else {
                rest
            };
            out.push(Page::new(start, chunk, page.loaded, page.modified));
            start += chunk;
            rest -= chunk;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageStatus;

    const MIB: u64 = 1024 * 1024;

    fn ranges(pages: &[Page]) -> Vec<(u64, u64)> {
        pages.iter().map(|p| (p.offset, p.bytes)).collect()
    }

    fn assert_parts_cover(plan: &UploadPlan, size: u64) {
        let mut pos = 0;
        for part in &plan.parts {
            assert_eq!(part.offset, pos, "parts must be contiguous");
            pos = part.end();
        }
        assert_eq!(pos, size, "parts must cover the whole file");
    }

    #[test]
    fn small_dirty_head_pads_to_minimum() {
        let mut list = PageList::with_flags(20 * MIB, true, false);
        list.set_status(0, MIB, PageStatus::LoadModified, true);

        let plan = list.plan_multipart_upload(10 * MIB);
        assert_eq!(ranges(&plan.download), vec![(MIB, 4 * MIB)]);
        assert_eq!(ranges(&plan.parts), vec![(0, 5 * MIB), (5 * MIB, 15 * MIB)]);
        assert!(plan.parts[0].modified, "padded head is uploaded");
        assert!(!plan.parts[1].modified, "clean tail is copied");
        assert_parts_cover(&plan, 20 * MIB);
    }

    #[test]
    fn fully_modified_file_splits_by_part_size() {
        let mut list = PageList::with_flags(25 * MIB, true, true);

        let plan = list.plan_multipart_upload(10 * MIB);
        assert!(plan.download.is_empty());
        // the 15 MiB remainder stays whole: splitting it would leave a
        // 5 MiB fragment below the 10 MiB target
        assert_eq!(
            ranges(&plan.parts),
            vec![(0, 10 * MIB), (10 * MIB, 15 * MIB)]
        );
        assert!(plan.parts.iter().all(|p| p.modified));
        assert_parts_cover(&plan, 25 * MIB);
    }

    #[test]
    fn long_modified_run_keeps_terminal_remainder() {
        let mut list = PageList::with_flags(45 * MIB, false, true);

        let plan = list.plan_multipart_upload(10 * MIB);
        assert_eq!(
            ranges(&plan.parts),
            vec![
                (0, 10 * MIB),
                (10 * MIB, 10 * MIB),
                (20 * MIB, 10 * MIB),
                (30 * MIB, 15 * MIB),
            ]
        );
        assert!(plan.parts.iter().all(|p| p.bytes >= 10 * MIB));
    }

    #[test]
    fn short_clean_tail_is_absorbed_into_upload() {
        // 1 MiB dirty head, 5 MiB clean tail: the tail cannot both pad the
        // head and stand alone, so everything is downloaded and uploaded
        let mut list = PageList::with_flags(6 * MIB, true, false);
        list.set_status(0, MIB, PageStatus::LoadModified, true);

        let plan = list.plan_multipart_upload(10 * MIB);
        assert_eq!(ranges(&plan.download), vec![(MIB, 5 * MIB)]);
        assert_eq!(ranges(&plan.parts), vec![(0, 6 * MIB)]);
        assert!(plan.parts[0].modified);
        assert_parts_cover(&plan, 6 * MIB);
    }

    #[test]
    fn short_clean_run_between_dirty_runs_is_uploaded() {
        // clean [0,2M) | dirty [2M,3M) | clean [3M,7M): both clean runs are
        // too small for copy parts and end up downloaded + uploaded
        let mut list = PageList::with_flags(7 * MIB, true, false);
        list.set_status(2 * MIB, MIB, PageStatus::LoadModified, true);

        let plan = list.plan_multipart_upload(10 * MIB);
        assert_eq!(
            ranges(&plan.download),
            vec![(0, 2 * MIB), (3 * MIB, 4 * MIB)]
        );
        assert_eq!(ranges(&plan.parts), vec![(0, 7 * MIB)]);
        assert!(plan.parts[0].modified);
    }

    #[test]
    fn downloads_never_cover_dirty_bytes() {
        let mut list = PageList::with_flags(64 * MIB, true, false);
        list.set_status(0, MIB, PageStatus::LoadModified, true);
        list.set_status(10 * MIB, MIB, PageStatus::LoadModified, true);
        list.set_status(40 * MIB, 7 * MIB, PageStatus::LoadModified, true);

        let before = list.clone();
        let plan = list.plan_multipart_upload(10 * MIB);
        for dl in &plan.download {
            for pos in [dl.offset, dl.offset + dl.bytes / 2, dl.end() - 1] {
                let page = before
                    .pages()
                    .iter()
                    .find(|p| p.offset <= pos && pos < p.end())
                    .expect("download inside the file");
                assert!(!page.modified, "planned download over dirty bytes");
            }
        }
        assert_parts_cover(&plan, 64 * MIB);
    }

    #[test]
    fn clean_file_yields_single_copy_part() {
        let mut list = PageList::with_flags(20 * MIB, true, false);
        let plan = list.plan_multipart_upload(10 * MIB);
        assert!(plan.download.is_empty());
        assert_eq!(ranges(&plan.parts), vec![(0, 20 * MIB)]);
        assert!(!plan.parts[0].modified);
    }
}
