//! Cache-side core of bucketfs.
//!
//! Every open file is backed by a local cache file plus a [`PageList`]
//! describing which byte ranges of that file are loaded from the remote
//! object and which carry local modifications. This crate holds the page
//! map itself and everything that reasons about it: the multipart upload
//! planner, the sparse-file verifier and the stat-file persistence.
//!
//! Remote I/O lives in `bucketfs-remote`; the kernel protocol adapter and
//! the HTTP transport are external to this workspace.

/**
 * The page-range map: `Page`, `PageStatus` and `PageList`
 *  with its range operations and invariants.
 */
pub mod page;
/**
 * Multipart upload planning over a dirty `PageList`:
 *  which ranges to download to complete parts, which
 *  parts to upload and which to server-side copy.
 */
pub mod planner;
/**
 * Consistency check between a `PageList` and the
 *  physical HOLE/DATA layout of its cache file.
 */
pub mod sparse;
/**
 * Sidecar stat-file persistence for a `PageList`,
 *  keyed by the cache file's inode.
 */
pub mod stat;

pub use page::{Page, PageList, PageStatus};
pub use planner::{UploadPlan, MIN_MULTIPART_SIZE};
pub use sparse::SparseDiff;
pub use stat::{CacheFileStat, StatError};
