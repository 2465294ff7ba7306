//! Remote-side core of bucketfs.
//!
//! Everything here faces the object store over HTTP: the worker pool that
//! executes remote-I/O instructions, the sorted header collection used to
//! build canonical request strings for signing, and small helpers for
//! endpoint URLs and entity tags. Request construction, signing and
//! credentials live outside this workspace; the cache-side page map lives
//! in `bucketfs-cache`.

/**
 * Sorted, case-insensitive header collection for
 *  canonical request strings.
 */
pub mod headers;
/**
 * Fixed-size worker pool executing queued remote-I/O
 *  instructions, one reusable HTTP client per worker.
 */
pub mod pool;
/**
 * Endpoint URL shaping (virtual-hosted vs path style),
 *  ETag comparison and Content-MD5 helpers.
 */
pub mod url;

pub use headers::HeaderList;
pub use pool::{InstructionFuture, PoolError, WorkerPool, DEFAULT_WORKER_COUNT};
