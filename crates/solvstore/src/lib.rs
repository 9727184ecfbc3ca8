//! Interned package-metadata pool and the paged `.solv` repository format.
//!
//! The crate keeps a universe of packages ("solvables") in a [`Pool`]: all
//! strings, dependency relations and directory paths are interned to dense
//! ids, solvables hold nothing but ids and offsets into their repo's
//! id-array arena, and per-repository attribute data lives in [`Repodata`]
//! areas with interned schemas. The whole universe serializes into the
//! compact `.solv` format — prefix-compressed strings, frequency-renumbered
//! ids, paged and compressed vertical data — and reads back with on-demand
//! paging. The data structures follow
//! [libsolv](https://github.com/openSUSE/libsolv); the `.solv` files this
//! crate writes and reads are interchangeable with it.
//!
//! ```
//! use solvstore::{Pool, id};
//!
//! let mut pool = Pool::new();
//! let repo = pool.add_repo("demo");
//! let solvid = pool.add_solvable(repo);
//! let name = pool.str2id("tool", true);
//! let evr = pool.str2id("1.0-1", true);
//! let s = pool.solvable_mut(solvid);
//! s.name = name;
//! s.evr = evr;
//! s.arch = id::ARCH_NOARCH;
//! pool.internalize_repo(repo);
//! assert_eq!(pool.whatprovides(name), &[solvstore::Id(solvid as u32)]);
//! ```

mod arch;
mod codec;
mod data;
mod dataiterator;
mod dirpool;
mod error;
mod evr;
pub mod id;
mod keys;
mod pagestore;
mod pool;
mod read;
mod relpool;
mod repo;
mod repodata;
mod solvable;
mod strpool;
mod write;

pub use dataiterator::{
    Dataiterator, Datamatcher, DI_SEEK_CHILD, DI_SEEK_PARENT, DI_SEEK_REWIND, DI_SEEK_STAY,
};
pub use dirpool::DirPool;
pub use error::{Result, SolvError};
pub use evr::{evrcmp_str, evrmatch, CompareMode, VersionKind};
pub use id::{DirId, Id, RepoId};
pub use keys::{KeyStorage, KeyType, Repokey};
pub use pagestore::{PageStore, PAGE_SIZE};
pub use pool::{Datapos, Pool};
pub use read::{add_solv, add_solv_file};
pub use relpool::{RelDep, RelPool};
pub use repo::{Marker, Repo};
pub use repodata::{
    KeyValue, Keyskip, Repodata, RepodataState, SearchCb, SEARCH_ARRAYSENTINEL, SEARCH_CHECKSUMS,
    SEARCH_FILES, SEARCH_GLOB, SEARCH_KEEP_TYPE_DELETED, SEARCH_NOCASE,
    SEARCH_NO_STORAGE_SOLVABLE, SEARCH_REGEX, SEARCH_STRING, SEARCH_STRINGEND, SEARCH_STRINGMASK,
    SEARCH_STRINGSTART, SEARCH_SUB, SEARCH_SUBSTRING, SOLVID_META, SOLVID_POS,
};
pub use solvable::{Offset, Solvable, DEP_KEYS};
pub use strpool::StringPool;
pub use write::{
    repo_write, std_keyfilter, Keyfilter, Repowriter, REPOWRITER_IDARRAYBLOCK,
    REPOWRITER_KEEP_TYPE_DELETED, REPOWRITER_NO_STORAGE_SOLVABLE, SOLV_VERSION_8, SOLV_VERSION_9,
};

/// The LZ77-style page codec, exposed for tooling and tests.
pub mod compress {
    pub use crate::codec::{compress, decompress};
}
