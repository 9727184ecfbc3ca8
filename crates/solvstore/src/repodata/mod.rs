//! Per-repository attribute storage.
//!
//! A repodata area goes through two phases. Freshly set attributes
//! accumulate in an uninternalized side table (`attrs` plus the byte/id
//! arenas). [`Repodata::internalize`] then sorts each entry's keys into a
//! schema, encodes all values into the compact incore form (or the vertical
//! buffer for offset-stored keys) and drops the staging state. Lookups and
//! search work against the compact form.

mod lookup;

pub(crate) use lookup::fetch_value;
pub use lookup::{
    KeyValue, Keyskip, SearchCb, SEARCH_ARRAYSENTINEL, SEARCH_CHECKSUMS, SEARCH_ERROR,
    SEARCH_FILES, SEARCH_GLOB, SEARCH_KEEP_TYPE_DELETED, SEARCH_NOCASE,
    SEARCH_NO_STORAGE_SOLVABLE, SEARCH_REGEX, SEARCH_STRING, SEARCH_STRINGEND,
    SEARCH_STRINGMASK, SEARCH_STRINGSTART, SEARCH_SUB, SEARCH_SUBSTRING, SEARCH_THISSOLVID,
};

use std::cell::{Cell, RefCell};

use smallvec::SmallVec;
use tracing::debug;

use crate::data;
use crate::dirpool::DirPool;
use crate::id::{DirId, Id, REPOSITORY_SOLVABLES};
use crate::keys::{KeyStorage, KeyType, Repokey};
use crate::pagestore::PageStore;
use crate::strpool::StringPool;

/// Pseudo-solvid addressing the per-repodata "meta" entry.
pub const SOLVID_META: i32 = -1;
/// Pseudo-solvid addressing a position remembered in the pool.
pub const SOLVID_POS: i32 = -2;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum RepodataState {
    Available,
    /// A failed load poisoned this area; lookups return nothing.
    Error,
}

const DIRCACHE_SIZE: usize = 41;

/// Cache of recently interned directory paths, keyed by prefix length.
struct DirCache {
    ids: [DirId; DIRCACHE_SIZE],
    strs: [u8; DIRCACHE_SIZE * (DIRCACHE_SIZE - 1) / 2],
}

impl Default for DirCache {
    fn default() -> Self {
        DirCache {
            ids: [DirId::NULL; DIRCACHE_SIZE],
            strs: [0; DIRCACHE_SIZE * (DIRCACHE_SIZE - 1) / 2],
        }
    }
}

pub struct Repodata {
    pub(crate) repodataid: usize,
    pub(crate) state: RepodataState,

    /// First solvable this area holds data for.
    pub(crate) start: i32,
    /// One past the last covered solvable.
    pub(crate) end: i32,

    pub(crate) localpool: bool,
    pub(crate) spool: StringPool,
    pub(crate) dirpool: DirPool,

    /// Keys of this area; index 0 is always the null key.
    pub(crate) keys: Vec<Repokey>,
    keybits: [u8; 32],

    /// Schema id -> offset into `schemadata`; schema 0 is empty.
    pub(crate) schemata: Vec<u32>,
    /// Zero-terminated key index sequences.
    pub(crate) schemadata: Vec<Id>,
    schematahash: Vec<u32>,

    pub(crate) incoredata: Vec<u8>,
    /// Per entry: offset of the schema-id varint in `incoredata`, 0 = none.
    pub(crate) incoreoffset: Vec<u32>,
    pub(crate) mainschema: u32,
    pub(crate) mainschemaoffsets: Vec<u32>,

    /// Vertical values kept in memory (not file-backed).
    pub(crate) vincore: Vec<u8>,
    /// Per key: start of this key's region in the paged vertical blob.
    pub(crate) verticaloffset: Vec<u32>,
    /// Total length of the file-backed vertical region.
    pub(crate) lastverticaloffset: u32,

    pub(crate) store: RefCell<PageStore>,
    /// Bumped whenever a page load may have invalidated prior regions.
    pub(crate) storestate: Cell<u32>,

    /// Uninternalized attributes: per entry a list of (keyid, value) pairs.
    attrs: Vec<Vec<(u32, u32)>>,
    /// Anonymous sub-structure handles; index 1 is the meta entry.
    xattrs: Vec<Vec<(u32, u32)>>,
    pub(crate) attrdata: Vec<u8>,
    pub(crate) attriddata: Vec<u32>,
    attrnum64data: Vec<u64>,

    /* append cache so repeated array adds extend in place */
    lasthandle: i32,
    lastkey: u32,
    lastdatalen: usize,

    dircache: Option<Box<DirCache>>,

    /// Opaque caller payload carried in the file header (format v9).
    pub userdata: Vec<u8>,
}

impl Repodata {
    pub(crate) fn new(repodataid: usize, localpool: bool) -> Self {
        Repodata {
            repodataid,
            state: RepodataState::Available,
            start: 0,
            end: 0,
            localpool,
            spool: if localpool { StringPool::new_empty() } else { StringPool::default() },
            dirpool: DirPool::new(),
            keys: vec![Repokey::null()],
            keybits: [0; 32],
            schemata: vec![0],
            schemadata: vec![Id::NULL],
            schematahash: Vec::new(),
            incoredata: Vec::new(),
            incoreoffset: Vec::new(),
            mainschema: 0,
            mainschemaoffsets: Vec::new(),
            vincore: Vec::new(),
            verticaloffset: Vec::new(),
            lastverticaloffset: 0,
            store: RefCell::new(PageStore::new()),
            storestate: Cell::new(0),
            attrs: Vec::new(),
            xattrs: Vec::new(),
            attrdata: Vec::new(),
            attriddata: Vec::new(),
            attrnum64data: Vec::new(),
            lasthandle: 0,
            lastkey: 0,
            lastdatalen: 0,
            dircache: None,
            userdata: Vec::new(),
        }
    }

    pub fn state(&self) -> RepodataState {
        self.state
    }

    pub(crate) fn set_error_state(&mut self) {
        self.state = RepodataState::Error;
    }

    pub fn start(&self) -> i32 {
        self.start
    }

    pub fn end(&self) -> i32 {
        self.end
    }

    pub fn is_localpool(&self) -> bool {
        self.localpool
    }

    pub fn nkeys(&self) -> usize {
        self.keys.len()
    }

    pub fn key(&self, keyid: usize) -> &Repokey {
        &self.keys[keyid]
    }

    pub fn nschemata(&self) -> usize {
        self.schemata.len()
    }

    pub fn dirpool(&self) -> &DirPool {
        &self.dirpool
    }

    /// True when this area has staged, not yet internalized attributes.
    pub fn has_uninternalized(&self) -> bool {
        self.attrs.iter().any(|a| !a.is_empty()) || self.xattrs.iter().any(|a| !a.is_empty())
    }

    /// Quick negative check whether `keyname` can occur in this area.
    pub fn precheck_keyname(&self, keyname: Id) -> bool {
        let x = self.keybits[(keyname.0 >> 3) as usize & 31];
        x & (1 << (keyname.0 & 7)) != 0
    }

    pub(crate) fn note_keyname(&mut self, keyname: Id) {
        self.keybits[(keyname.0 >> 3) as usize & 31] |= 1 << (keyname.0 & 7);
    }

    /// Cap the number of resident vertical pages; only effective before the
    /// first on-demand load.
    pub fn set_max_mapped_pages(&self, n: usize) {
        self.store.borrow_mut().set_max_mapped(n);
    }

    /// Number of pages in the file-backed vertical region.
    pub fn num_vertical_pages(&self) -> usize {
        self.store.borrow().num_pages()
    }

    /// Load every vertical page and release the backing file.
    pub fn disable_paging(&self) -> crate::error::Result<()> {
        let r = self.store.borrow_mut().disable_paging();
        self.storestate.set(self.storestate.get() + 1);
        r
    }

    /* ---------- key management ---------- */

    /// Intern a key descriptor; linear scan, key tables stay small.
    pub fn key2id(&mut self, key: &Repokey, create: bool) -> u32 {
        for (keyid, k) in self.keys.iter().enumerate().skip(1) {
            if k.name == key.name && k.typ == key.typ {
                if matches!(key.typ, KeyType::Constant | KeyType::ConstantId) && k.size != key.size
                {
                    continue;
                }
                return keyid as u32;
            }
        }
        if !create {
            return 0;
        }
        self.keys.push(*key);
        if !self.verticaloffset.is_empty() {
            self.verticaloffset.push(0);
        }
        self.keybits[(key.name.0 >> 3) as usize & 31] |= 1 << (key.name.0 & 7);
        (self.keys.len() - 1) as u32
    }

    /* ---------- schema management ---------- */

    /// Intern a key sequence (without terminator). The 256-bucket cache is
    /// verified by content; on a cache conflict a full linear scan decides,
    /// so hash identity is never assumed.
    pub fn schema2id(&mut self, schema: &[Id], create: bool) -> u32 {
        if schema.is_empty() {
            return 0;
        }
        if self.schematahash.is_empty() {
            self.schematahash = vec![0u32; 256];
            for cid in 1..self.schemata.len() as u32 {
                let h = self.schema_hash(cid);
                self.schematahash[h] = cid;
            }
        }
        let mut h = 0u32;
        for id in schema {
            h = h.wrapping_mul(7).wrapping_add(id.0);
        }
        let h = (h & 255) as usize;

        let cid = self.schematahash[h];
        if cid != 0 {
            if self.schema_keys(cid) == schema {
                return cid;
            }
            // cache conflict, do a slow search
            for cid in 1..self.schemata.len() as u32 {
                if self.schema_keys(cid) == schema {
                    return cid;
                }
            }
        }
        if !create {
            return 0;
        }
        let off = self.schemadata.len() as u32;
        self.schemadata.extend_from_slice(schema);
        self.schemadata.push(Id::NULL);
        self.schemata.push(off);
        let cid = (self.schemata.len() - 1) as u32;
        self.schematahash[h] = cid;
        cid
    }

    fn schema_hash(&self, schemaid: u32) -> usize {
        let mut h = 0u32;
        for id in self.schema_keys(schemaid) {
            h = h.wrapping_mul(7).wrapping_add(id.0);
        }
        (h & 255) as usize
    }

    /// Key indices of a schema, terminator excluded.
    pub fn schema_keys(&self, schemaid: u32) -> &[Id] {
        let start = self.schemata[schemaid as usize] as usize;
        let end = self.schemadata[start..]
            .iter()
            .position(|id| id.is_null())
            .map(|n| start + n)
            .unwrap_or(self.schemadata.len());
        &self.schemadata[start..end]
    }

    pub fn free_schemahash(&mut self) {
        self.schematahash = Vec::new();
    }

    /* ---------- extent management ---------- */

    /// Grow the covered solvable range to include `p`.
    pub fn extend(&mut self, p: i32) {
        if self.start == self.end {
            self.start = p;
            self.end = p;
        }
        if p >= self.end {
            let n = (self.end - self.start) as usize;
            let add = (p + 1 - self.end) as usize;
            self.attrs.resize(n + add, Vec::new());
            self.incoreoffset.resize(n + add, 0);
            self.end = p + 1;
        }
        if p < self.start {
            let add = (self.start - p) as usize;
            self.attrs.splice(0..0, std::iter::repeat_with(Vec::new).take(add));
            self.incoreoffset.splice(0..0, std::iter::repeat(0).take(add));
            self.start = p;
        }
    }

    /// Cover `start..start + num` without touching existing extents.
    pub fn extend_block(&mut self, start: i32, num: i32) {
        if num <= 0 {
            return;
        }
        self.extend(start);
        if num > 1 {
            self.extend(start + num - 1);
        }
    }

    /* ---------- uninternalized attribute staging ---------- */

    /// Fresh anonymous handle for a sub-structure (fixarray/flexarray
    /// element). Handles are negative and live until internalize.
    pub fn new_handle(&mut self) -> i32 {
        if self.xattrs.is_empty() {
            self.xattrs = vec![Vec::new(), Vec::new()];
        }
        self.xattrs.push(Vec::new());
        -((self.xattrs.len() - 1) as i32)
    }

    fn attr_list_mut(&mut self, handle: i32) -> &mut Vec<(u32, u32)> {
        if handle < 0 {
            let idx = (-handle) as usize;
            if self.xattrs.len() <= idx {
                self.xattrs.resize_with(idx + 1, Vec::new);
            }
            &mut self.xattrs[idx]
        } else {
            if handle < self.start || handle >= self.end {
                self.extend(handle);
            }
            let n = (self.end - self.start) as usize;
            if self.attrs.len() < n {
                // loaded areas carry no staging table until first use
                self.attrs.resize(n, Vec::new());
            }
            let idx = (handle - self.start) as usize;
            &mut self.attrs[idx]
        }
    }

    fn attr_list(&self, handle: i32) -> &[(u32, u32)] {
        if handle < 0 {
            self.xattrs
                .get((-handle) as usize)
                .map(|v| v.as_slice())
                .unwrap_or(&[])
        } else if handle >= self.start && handle < self.end {
            self.attrs
                .get((handle - self.start) as usize)
                .map(|v| v.as_slice())
                .unwrap_or(&[])
        } else {
            &[]
        }
    }

    /// Insert or replace an attribute; equality is decided by keyname only,
    /// so setting a key may change its type.
    fn insert_keyid(&mut self, handle: i32, keyid: u32, val: u32, overwrite: bool) {
        let keyname = self.keys[keyid as usize].name;
        let same_name: Vec<u32> = self
            .keys
            .iter()
            .enumerate()
            .filter(|(_, k)| k.name == keyname)
            .map(|(i, _)| i as u32)
            .collect();
        let deleted: Vec<u32> = same_name
            .iter()
            .copied()
            .filter(|&i| self.keys[i as usize].typ == KeyType::Deleted)
            .collect();
        let list = self.attr_list_mut(handle);
        for pair in list.iter_mut() {
            if same_name.contains(&pair.0) {
                if overwrite || deleted.contains(&pair.0) {
                    *pair = (keyid, val);
                }
                return;
            }
        }
        list.push((keyid, val));
    }

    fn set(&mut self, handle: i32, key: Repokey, val: u32) {
        let keyid = self.key2id(&key, true);
        self.insert_keyid(handle, keyid, val, true);
    }

    pub fn set_id(&mut self, handle: i32, keyname: Id, id: Id) {
        self.set(
            handle,
            Repokey::new(keyname, KeyType::Id, 0, KeyStorage::Incore),
            id.0,
        );
    }

    pub fn set_num(&mut self, handle: i32, keyname: Id, num: u64) {
        let val = if num >= 0x8000_0000 {
            self.attrnum64data.push(num);
            0x8000_0000 | (self.attrnum64data.len() - 1) as u32
        } else {
            num as u32
        };
        self.set(
            handle,
            Repokey::new(keyname, KeyType::Num, 0, KeyStorage::Incore),
            val,
        );
    }

    pub fn set_void(&mut self, handle: i32, keyname: Id) {
        self.set(
            handle,
            Repokey::new(keyname, KeyType::Void, 0, KeyStorage::Incore),
            0,
        );
    }

    pub fn set_constant(&mut self, handle: i32, keyname: Id, constant: u32) {
        self.set(
            handle,
            Repokey::new(keyname, KeyType::Constant, constant, KeyStorage::Incore),
            0,
        );
    }

    pub fn set_constantid(&mut self, handle: i32, keyname: Id, id: Id) {
        self.set(
            handle,
            Repokey::new(keyname, KeyType::ConstantId, id.0, KeyStorage::Incore),
            0,
        );
    }

    pub fn set_str(&mut self, handle: i32, keyname: Id, value: &str) {
        let off = self.attrdata.len() as u32;
        self.attrdata.extend_from_slice(value.as_bytes());
        self.attrdata.push(0);
        self.set(
            handle,
            Repokey::new(keyname, KeyType::Str, 0, KeyStorage::Incore),
            off,
        );
    }

    /// Intern the string (locally or globally) and store it as an ID value.
    pub fn set_poolstr(&mut self, ss: &mut StringPool, handle: i32, keyname: Id, value: &str) {
        let id = self.localize_str(ss, value);
        self.set_id(handle, keyname, id);
    }

    pub fn set_binary(&mut self, handle: i32, keyname: Id, buf: &[u8]) {
        let off = self.attrdata.len() as u32;
        data::push_id(&mut self.attrdata, buf.len() as u32);
        self.attrdata.extend_from_slice(buf);
        self.set(
            handle,
            Repokey::new(keyname, KeyType::Binary, 0, KeyStorage::Incore),
            off,
        );
    }

    /// Store a raw checksum; `typ` must be a checksum type and the buffer
    /// must have its exact width.
    pub fn set_bin_checksum(&mut self, handle: i32, keyname: Id, typ: KeyType, buf: &[u8]) {
        let Some(l) = typ.checksum_len() else { return };
        if buf.len() != l {
            return;
        }
        let off = self.attrdata.len() as u32;
        self.attrdata.extend_from_slice(buf);
        self.set(handle, Repokey::new(keyname, typ, 0, KeyStorage::Incore), off);
    }

    /// Hex-string convenience wrapper around [`Repodata::set_bin_checksum`].
    pub fn set_checksum(&mut self, handle: i32, keyname: Id, typ: KeyType, hexstr: &str) {
        let Ok(buf) = hex::decode(hexstr) else { return };
        self.set_bin_checksum(handle, keyname, typ, &buf);
    }

    /// Shared array-append machinery: find or create the array attribute for
    /// `keyname` and position `attriddata` so the caller can push one entry
    /// of `entrysize` ids plus the terminating zero.
    fn add_array(&mut self, handle: i32, keyname: Id, keytype: KeyType, entrysize: usize) {
        if handle == self.lasthandle
            && self.keys[self.lastkey as usize].name == keyname
            && self.keys[self.lastkey as usize].typ == keytype
            && self.attriddata.len() == self.lastdatalen
        {
            self.attriddata.pop(); // overwrite terminating 0
            self.lastdatalen += entrysize;
            return;
        }
        let existing = self
            .attr_list(handle)
            .iter()
            .find(|(kid, _)| self.keys[*kid as usize].name == keyname)
            .copied();
        match existing {
            Some((kid, off)) if self.keys[kid as usize].typ == keytype => {
                let mut oldsize = 0;
                while self.attriddata[off as usize + oldsize] != 0 {
                    oldsize += entrysize;
                }
                if off as usize + oldsize + 1 == self.attriddata.len() {
                    // last entry in the arena, extend in place
                    self.attriddata.pop();
                } else {
                    // relocate to the end, leaving a hole
                    let newoff = self.attriddata.len() as u32;
                    for i in 0..oldsize {
                        let v = self.attriddata[off as usize + i];
                        self.attriddata.push(v);
                    }
                    for pair in self.attr_list_mut(handle).iter_mut() {
                        if pair.0 == kid {
                            pair.1 = newoff;
                        }
                    }
                }
                self.lasthandle = handle;
                self.lastkey = kid;
                self.lastdatalen = self.attriddata.len() + entrysize + 1;
            }
            _ => {
                let off = self.attriddata.len() as u32;
                let key = Repokey::new(keyname, keytype, 0, KeyStorage::Incore);
                let keyid = self.key2id(&key, true);
                self.insert_keyid(handle, keyid, off, true);
                self.lasthandle = handle;
                self.lastkey = keyid;
                self.lastdatalen = self.attriddata.len() + entrysize + 1;
            }
        }
    }

    pub fn add_idarray(&mut self, handle: i32, keyname: Id, id: Id) {
        self.add_array(handle, keyname, KeyType::IdArray, 1);
        self.attriddata.push(id.0);
        self.attriddata.push(0);
    }

    pub fn add_poolstr_array(&mut self, ss: &mut StringPool, handle: i32, keyname: Id, value: &str) {
        let id = self.localize_str(ss, value);
        self.add_idarray(handle, keyname, id);
    }

    pub fn add_dirstr(&mut self, handle: i32, keyname: Id, dir: DirId, file: &str) {
        debug_assert!(!dir.is_null());
        let stroff = self.attrdata.len() as u32;
        self.attrdata.extend_from_slice(file.as_bytes());
        self.attrdata.push(0);
        self.add_array(handle, keyname, KeyType::DirStrArray, 2);
        self.attriddata.push(dir.0);
        self.attriddata.push(stroff);
        self.attriddata.push(0);
    }

    pub fn add_dirnumnum(&mut self, handle: i32, keyname: Id, dir: DirId, num: u32, num2: u32) {
        debug_assert!(!dir.is_null());
        self.add_array(handle, keyname, KeyType::DirNumNumArray, 3);
        self.attriddata.push(dir.0);
        self.attriddata.push(num);
        self.attriddata.push(num2);
        self.attriddata.push(0);
    }

    pub fn add_fixarray(&mut self, handle: i32, keyname: Id, ghandle: i32) {
        debug_assert!(ghandle < 0);
        self.add_array(handle, keyname, KeyType::FixArray, 1);
        self.attriddata.push((-ghandle) as u32);
        self.attriddata.push(0);
    }

    pub fn add_flexarray(&mut self, handle: i32, keyname: Id, ghandle: i32) {
        debug_assert!(ghandle < 0);
        self.add_array(handle, keyname, KeyType::FlexArray, 1);
        self.attriddata.push((-ghandle) as u32);
        self.attriddata.push(0);
    }

    /// Mark a key deleted; internalize writes a DELETED tombstone that hides
    /// values from earlier strata.
    pub fn unset(&mut self, handle: i32, keyname: Id) {
        self.set(
            handle,
            Repokey::new(keyname, KeyType::Deleted, 0, KeyStorage::Incore),
            0,
        );
    }

    /// Remove staged (not yet internalized) values. With a null `keyname`
    /// all staged attributes of the entry go away.
    pub fn unset_uninternalized(&mut self, handle: i32, keyname: Id) {
        if keyname.is_null() {
            self.attr_list_mut(handle).clear();
            return;
        }
        let matches: Vec<u32> = self
            .keys
            .iter()
            .enumerate()
            .filter(|(_, k)| k.name == keyname)
            .map(|(i, _)| i as u32)
            .collect();
        self.attr_list_mut(handle)
            .retain(|(kid, _)| !matches.contains(kid));
    }

    /// Copy all staged attributes from `src` to `dest` without overwriting.
    pub fn merge_attrs(&mut self, dest: i32, src: i32) {
        if dest == src {
            return;
        }
        let pairs: Vec<(u32, u32)> = self.attr_list(src).to_vec();
        for (kid, val) in pairs {
            self.insert_keyid(dest, kid, val, false);
        }
    }

    pub fn swap_attrs(&mut self, dest: i32, src: i32) {
        if dest == src {
            return;
        }
        if dest < self.start || dest >= self.end {
            self.extend(dest);
        }
        if src < self.start || src >= self.end {
            self.extend(src);
        }
        let d = (dest - self.start) as usize;
        let s = (src - self.start) as usize;
        self.attrs.swap(d, s);
        if self.lasthandle == src || self.lasthandle == dest {
            self.lasthandle = 0;
        }
    }

    /// Walk the staged (not yet internalized) attributes of an entry. Array
    /// values report one callback per element, like the internalized search.
    pub fn search_uninternalized(
        &self,
        handle: i32,
        keyname: Id,
        callback: &mut dyn FnMut(&Repodata, usize, &lookup::KeyValue<'_>) -> lookup::SearchCb,
    ) {
        let pairs: Vec<(u32, u32)> = self.attr_list(handle).to_vec();
        for (kid, val) in pairs {
            let key = self.keys[kid as usize];
            if !keyname.is_null() && key.name != keyname {
                continue;
            }
            let mut entry = 0i32;
            loop {
                let Some(kv) = self.fetch_uninternalized(&key, val, entry) else {
                    break;
                };
                let eof = kv.eof;
                match callback(self, kid as usize, &kv) {
                    lookup::SearchCb::Continue | lookup::SearchCb::EnterSub => {}
                    lookup::SearchCb::NextKey => break,
                    _ => return,
                }
                if eof != 0 {
                    break;
                }
                entry += 1;
            }
            if !keyname.is_null() {
                return;
            }
        }
    }

    /// The staged value of `(handle, keyname)`, if any.
    pub fn lookup_kv_uninternalized(&self, handle: i32, keyname: Id) -> Option<lookup::KeyValue<'_>> {
        let (kid, val) = self
            .attr_list(handle)
            .iter()
            .find(|(kid, _)| self.keys[*kid as usize].name == keyname)
            .copied()?;
        let key = self.keys[kid as usize];
        self.fetch_uninternalized(&key, val, 0)
    }

    fn fetch_uninternalized(&self, key: &Repokey, val: u32, entry: i32) -> Option<lookup::KeyValue<'_>> {
        let mut kv = lookup::KeyValue {
            entry,
            eof: 1,
            ..Default::default()
        };
        match key.typ {
            KeyType::Str => {
                kv.str_bytes = data::nul_str(&self.attrdata, val as usize).ok()?;
            }
            KeyType::Constant => kv.num = key.size as u64,
            KeyType::ConstantId => kv.id = Id(key.size),
            KeyType::Num => {
                kv.num = if val & 0x8000_0000 != 0 {
                    self.attrnum64data[(val ^ 0x8000_0000) as usize]
                } else {
                    val as u64
                };
            }
            KeyType::Binary => {
                let (len, pos) = data::read_id(&self.attrdata, val as usize).ok()?;
                kv.str_bytes = self.attrdata.get(pos..pos + len as usize)?;
                kv.num = len as u64;
            }
            KeyType::IdArray => {
                let i = val as usize + entry as usize;
                if self.attriddata.get(i).copied().unwrap_or(0) == 0 {
                    return None;
                }
                kv.id = Id(self.attriddata[i]);
                kv.eof = if self.attriddata.get(i + 1).copied().unwrap_or(0) == 0 { 1 } else { 0 };
            }
            KeyType::DirStrArray => {
                let i = val as usize + entry as usize * 2;
                if self.attriddata.get(i).copied().unwrap_or(0) == 0 {
                    return None;
                }
                kv.id = Id(self.attriddata[i]);
                kv.str_bytes =
                    data::nul_str(&self.attrdata, self.attriddata[i + 1] as usize).ok()?;
                kv.eof = if self.attriddata.get(i + 2).copied().unwrap_or(0) == 0 { 1 } else { 0 };
            }
            KeyType::DirNumNumArray => {
                let i = val as usize + entry as usize * 3;
                if self.attriddata.get(i).copied().unwrap_or(0) == 0 {
                    return None;
                }
                kv.id = Id(self.attriddata[i]);
                kv.num = self.attriddata[i + 1] as u64;
                kv.num2 = self.attriddata[i + 2];
                kv.eof = if self.attriddata.get(i + 3).copied().unwrap_or(0) == 0 { 1 } else { 0 };
            }
            KeyType::FixArray | KeyType::FlexArray => {
                let i = val as usize + entry as usize;
                if self.attriddata.get(i).copied().unwrap_or(0) == 0 {
                    return None;
                }
                kv.id = Id(self.attriddata[i]); // the sub-structure handle
                kv.eof = if self.attriddata.get(i + 1).copied().unwrap_or(0) == 0 { 1 } else { 0 };
            }
            t if t.is_checksum() => {
                let l = t.checksum_len().unwrap();
                kv.str_bytes = self.attrdata.get(val as usize..val as usize + l)?;
            }
            _ => kv.id = Id(val),
        }
        Some(kv)
    }

    pub(crate) fn localize_str(&mut self, ss: &mut StringPool, s: &str) -> Id {
        if self.localpool {
            self.spool.intern(s)
        } else {
            ss.intern(s)
        }
    }

    /// Map a local string id to the global pool (identity without localpool).
    pub fn globalize_id(&self, ss: &mut StringPool, id: Id) -> Id {
        if id.is_null() || !self.localpool {
            return id;
        }
        ss.intern(self.spool.id2str(id))
    }

    pub(crate) fn str_for_id<'a>(&'a self, ss: &'a StringPool, id: Id) -> &'a str {
        if self.localpool {
            self.spool.id2str(id)
        } else {
            ss.id2str(id)
        }
    }

    /* ---------- directory helpers ---------- */

    /// Intern a path into the dir pool, one component at a time. Doubled
    /// slashes collapse; the empty path is dir 0 and `/` is dir 1.
    pub fn str2dir(&mut self, ss: &mut StringPool, dir: &str, create: bool) -> DirId {
        let mut dir = dir;
        if dir.is_empty() {
            if !self.dirpool.is_empty() {
                return DirId::NULL;
            }
            return self
                .dirpool
                .add_dir(DirId::NULL, Id::NULL, create)
                .unwrap_or(DirId::NULL);
        }
        while dir.starts_with("//") {
            dir = &dir[1..];
        }
        if dir == "/" {
            if !self.dirpool.is_empty() {
                return DirId::ROOT;
            }
            return self
                .dirpool
                .add_dir(DirId::NULL, Id::EMPTY, create)
                .unwrap_or(DirId::NULL);
        }
        let full = dir;
        let mut parent = DirId::NULL;
        let mut consumed = 0usize;
        if let Some(cache) = &self.dircache {
            let mut l = full.len();
            while l > 0 {
                if l < DIRCACHE_SIZE
                    && !cache.ids[l].is_null()
                    && cache.strs[l * (l - 1) / 2..l * (l - 1) / 2 + l] == full.as_bytes()[..l]
                {
                    parent = cache.ids[l];
                    consumed = l;
                    break;
                }
                l = full.as_bytes()[..l]
                    .iter()
                    .rposition(|&c| c == b'/')
                    .unwrap_or(0);
            }
        }
        if consumed == full.len() {
            return parent;
        }
        let mut rest = &full[consumed..];
        while rest.starts_with('/') {
            rest = &rest[1..];
        }
        while !rest.is_empty() {
            let comp_end = rest.find('/').unwrap_or(rest.len());
            let comp = &rest[..comp_end];
            let id = if self.localpool {
                if create {
                    self.spool.intern(comp)
                } else {
                    self.spool.find(comp)
                }
            } else if create {
                ss.intern(comp)
            } else {
                ss.find(comp)
            };
            if id.is_null() {
                return DirId::NULL;
            }
            let Some(p) = self.dirpool.add_dir(parent, id, create) else {
                return DirId::NULL;
            };
            parent = p;
            let end_in_full = full.len() - rest.len() + comp_end;
            if end_in_full < DIRCACHE_SIZE {
                let cache = self.dircache.get_or_insert_with(Default::default);
                cache.ids[end_in_full] = parent;
                cache.strs[end_in_full * (end_in_full - 1) / 2
                    ..end_in_full * (end_in_full - 1) / 2 + end_in_full]
                    .copy_from_slice(&full.as_bytes()[..end_in_full]);
            }
            if comp_end == rest.len() {
                break;
            }
            rest = &rest[comp_end + 1..];
            while rest.starts_with('/') {
                rest = &rest[1..];
            }
        }
        parent
    }

    pub fn free_dircache(&mut self) {
        self.dircache = None;
    }

    /// Materialize a dir id (plus optional basename) as a path string.
    pub fn dir2str(&self, ss: &StringPool, did: DirId, suffix: Option<&str>) -> String {
        if did.is_null() {
            return suffix.unwrap_or("").to_string();
        }
        if did == DirId::ROOT && suffix.is_none() {
            return "/".to_string();
        }
        let mut comps = Vec::new();
        let mut parent = did;
        while !parent.is_null() {
            comps.push(self.str_for_id(ss, self.dirpool.compid(parent)));
            parent = self.dirpool.parent(parent);
        }
        let mut out = String::new();
        for (i, comp) in comps.iter().rev().enumerate() {
            if i > 0 {
                out.push('/');
            }
            out.push_str(comp);
        }
        if let Some(suf) = suffix {
            out.push('/');
            out.push_str(suf);
        }
        out
    }

    /* ---------- internalization ---------- */

    /// Fold the staged attributes into the compact incore form. Keys sharing
    /// a keyname override earlier values; vertical keys append their bytes
    /// to the in-memory vertical buffer. Afterwards the staging tables are
    /// empty and all lookups see the new data.
    pub fn internalize(&mut self) {
        if !self.has_uninternalized() {
            return;
        }
        let nentry = (self.end - self.start) as i64;
        debug!(
            repodataid = self.repodataid,
            nentry,
            attrdata = self.attrdata.len(),
            attriddata = self.attriddata.len(),
            "internalizing repodata"
        );

        let mut newincore: Vec<u8> = Vec::new();
        data::push_id(&mut newincore, 0); // entry data starts at offset 1
        let mut newvincore = std::mem::take(&mut self.vincore);

        // the meta entry carries the flexarray of all solvables
        let solvkey = Repokey::new(
            REPOSITORY_SOLVABLES,
            KeyType::FlexArray,
            0,
            KeyStorage::Incore,
        );
        let solvkeyid = self.key2id(&solvkey, self.end != self.start);

        let keylink = self.calculate_keylink();

        self.mainschema = 0;
        self.mainschemaoffsets.clear();

        let mut schema: Vec<Id> = Vec::with_capacity(self.keys.len() + 1);

        for entry in -1..nentry {
            // seen: -1 = keep old value, 0 = unused, >0 = staged value + 1
            let mut seen: Vec<i64> = vec![0; self.keys.len()];
            schema.clear();

            let mut oldschemaid = 0u32;
            let mut dp = 0usize;
            if !self.incoredata.is_empty() {
                let off = if entry >= 0 {
                    self.incoreoffset[entry as usize] as usize
                } else {
                    1
                };
                if off != 0 {
                    if let Ok((sid, next)) = data::read_id(&self.incoredata, off) {
                        oldschemaid = sid;
                        dp = next;
                    }
                }
            }

            let mut neednewschema = false;
            let mut haveoldkl = false;
            for &keyid in self.schema_keys(oldschemaid).to_vec().iter() {
                let ki = keyid.index();
                if seen[ki] != 0 {
                    neednewschema = true;
                    continue;
                }
                seen[ki] = -1;
                schema.push(keyid);
                if keylink[ki] != 0 {
                    haveoldkl = true;
                }
            }

            // strip the solvables key from the old meta schema; it is
            // re-added as the final key below
            if entry < 0 && solvkeyid != 0 && seen[solvkeyid as usize] == -1 {
                schema.retain(|k| k.index() != solvkeyid as usize);
                seen[solvkeyid as usize] = 0;
                neednewschema = true;
            }

            let staged: Vec<(u32, u32)> = if entry >= 0 {
                self.attrs.get(entry as usize).cloned().unwrap_or_default()
            } else {
                self.xattrs.get(1).cloned().unwrap_or_default()
            };
            for &(kid, val) in &staged {
                let ki = kid as usize;
                if seen[ki] == 0 {
                    neednewschema = true;
                    schema.push(Id(kid));
                    if haveoldkl && keylink[ki] != 0 {
                        // a staged key overrides old keys sharing its
                        // keyname: drop those from the schema
                        let mut kl = keylink[ki];
                        while kl != ki {
                            if seen[kl] == -1 {
                                schema.retain(|k| k.index() != kl);
                                seen[kl] = 0;
                                break;
                            }
                            kl = keylink[kl];
                        }
                    }
                }
                seen[ki] = val as i64 + 1;
            }

            if entry < 0 && self.end != self.start {
                schema.push(Id(solvkeyid)); // always last in the meta schema
                neednewschema = true;
            }

            let schemaid = if neednewschema {
                self.schema2id(&schema, true)
            } else {
                oldschemaid
            };

            if entry < 0 {
                self.mainschema = schemaid;
                self.mainschemaoffsets = vec![0; self.schema_keys(schemaid).len()];
            }

            // byte ranges of values to keep from the old incore data
            let mut oldincoreoffs: Vec<(usize, usize)> = Vec::new();
            if oldschemaid != 0 {
                oldincoreoffs = vec![(0, 0); self.keys.len()];
                let old_keys = self.schema_keys(oldschemaid).to_vec();
                let mut pos = dp;
                for keyid in old_keys {
                    let key = self.keys[keyid.index()];
                    let npos = match key.storage {
                        KeyStorage::VerticalOffset => data::skip_type(
                            &self.incoredata,
                            pos,
                            KeyType::Id,
                        )
                        .and_then(|p| data::skip_type(&self.incoredata, p, KeyType::Id))
                        .ok(),
                        KeyStorage::Incore => self.skip_key_data(&self.incoredata, pos, &key),
                        _ => Some(pos),
                    };
                    let Some(npos) = npos else { break };
                    oldincoreoffs[keyid.index()] = (pos, npos - pos);
                    pos = npos;
                }
            }

            if entry >= 0 {
                self.incoreoffset[entry as usize] = newincore.len() as u32;
            }
            data::push_id(&mut newincore, schemaid);

            let schema_now = self.schema_keys(schemaid).to_vec();
            for (i, keyid) in schema_now.iter().enumerate() {
                let ki = keyid.index();
                if entry < 0 {
                    self.mainschemaoffsets[i] = newincore.len() as u32;
                    if solvkeyid != 0 && ki == solvkeyid as usize {
                        // flexarray entry count; the elements are the
                        // solvables, whose data lives per entry
                        data::push_id(&mut newincore, (self.end - self.start) as u32);
                        break;
                    }
                }
                if seen[ki] == -1 {
                    let (off, len) = oldincoreoffs[ki];
                    if len != 0 {
                        newincore.extend_from_slice(&self.incoredata[off..off + len]);
                    }
                } else if seen[ki] > 0 {
                    let val = (seen[ki] - 1) as u32;
                    let key = self.keys[ki];
                    self.serialize_key(&mut newincore, &mut newvincore, &key, val);
                }
            }

            if entry >= 0 {
                self.attrs[entry as usize] = Vec::new();
            }
        }

        self.xattrs = Vec::new();
        self.lasthandle = 0;
        self.lastkey = 0;
        self.lastdatalen = 0;
        self.free_schemahash();

        self.incoredata = newincore;
        self.vincore = newvincore;

        self.attrdata = Vec::new();
        self.attriddata = Vec::new();
        self.attrnum64data = Vec::new();
        debug!(
            repodataid = self.repodataid,
            incore = self.incoredata.len(),
            vincore = self.vincore.len(),
            "internalize done"
        );
    }

    /// Circular linked list over key indices sharing the same keyname.
    fn calculate_keylink(&self) -> Vec<usize> {
        let mut link = vec![0usize; self.keys.len()];
        if self.keys.len() <= 2 {
            return link;
        }
        let mut keytable: Vec<usize> = Vec::new();
        for i in 1..self.keys.len() {
            let n = self.keys[i].name.index();
            if n >= keytable.len() {
                keytable.resize(n + 128, 0);
            }
            let j = keytable[n];
            if j != 0 {
                link[i] = link[j];
                link[j] = i;
            } else {
                link[i] = i;
            }
            keytable[n] = i;
        }
        // links that point to themselves mean "no other key shares the name"
        for i in 1..link.len() {
            if link[i] == i {
                link[i] = 0;
            }
        }
        link
    }

    /// Encode one staged value. Vertical keys write their bytes to the
    /// vertical buffer and an offset/length pair incore; sub-structures
    /// (fixarray/flexarray) recurse.
    fn serialize_key(
        &mut self,
        newincore: &mut Vec<u8>,
        newvincore: &mut Vec<u8>,
        key: &Repokey,
        val: u32,
    ) {
        let vertical = key.storage == KeyStorage::VerticalOffset;
        let oldvincorelen = newvincore.len();
        match key.typ {
            KeyType::FixArray => {
                debug_assert!(!vertical);
                let items = self.id_run(val);
                let mut num = 0;
                let mut schemaid = 0u32;
                let mut schema: SmallVec<[Id; 16]> = SmallVec::new();
                for &xi in &items {
                    let kp = self.xattrs.get(xi as usize).cloned().unwrap_or_default();
                    if kp.is_empty() {
                        continue; // ignore empty elements
                    }
                    num += 1;
                    schema.clear();
                    for (kid, _) in &kp {
                        schema.push(Id(*kid));
                    }
                    if schemaid == 0 {
                        schemaid = self.schema2id(&schema, true);
                    } else if schemaid != self.schema2id(&schema, false) {
                        tracing::error!("fixarray substructs with different schemas");
                        num = 0;
                        break;
                    }
                }
                data::push_id(newincore, num);
                if num == 0 {
                    return;
                }
                data::push_id(newincore, schemaid);
                for &xi in &items {
                    let kp = self.xattrs.get(xi as usize).cloned().unwrap_or_default();
                    for (kid, v) in kp {
                        let k = self.keys[kid as usize];
                        self.serialize_key(newincore, newvincore, &k, v);
                    }
                }
                return;
            }
            KeyType::FlexArray => {
                debug_assert!(!vertical);
                let items = self.id_run(val);
                data::push_id(newincore, items.len() as u32);
                let mut schema: SmallVec<[Id; 16]> = SmallVec::new();
                for &xi in &items {
                    let kp = self.xattrs.get(xi as usize).cloned().unwrap_or_default();
                    if kp.is_empty() {
                        data::push_id(newincore, 0);
                        continue;
                    }
                    schema.clear();
                    for (kid, _) in &kp {
                        schema.push(Id(*kid));
                    }
                    let schemaid = self.schema2id(&schema, true);
                    data::push_id(newincore, schemaid);
                    for (kid, v) in kp {
                        let k = self.keys[kid as usize];
                        self.serialize_key(newincore, newvincore, &k, v);
                    }
                }
                return;
            }
            _ => {}
        }
        {
            let xd: &mut Vec<u8> = if vertical { newvincore } else { newincore };
            match key.typ {
                KeyType::Void | KeyType::Constant | KeyType::ConstantId | KeyType::Deleted => {}
                KeyType::Str => {
                    let s = data::nul_str(&self.attrdata, val as usize).unwrap_or(b"");
                    xd.extend_from_slice(s);
                    xd.push(0);
                }
                KeyType::Num => {
                    if val & 0x8000_0000 != 0 {
                        let num = self.attrnum64data[(val ^ 0x8000_0000) as usize];
                        data::push_num64(xd, num);
                    } else {
                        data::push_id(xd, val);
                    }
                }
                KeyType::Id | KeyType::Dir => data::push_id(xd, val),
                KeyType::U32 => xd.extend_from_slice(&val.to_be_bytes()),
                KeyType::Binary => {
                    if let Ok((len, next)) = data::read_id(&self.attrdata, val as usize) {
                        let end = next + len as usize;
                        let start = val as usize;
                        for i in start..end {
                            xd.push(self.attrdata[i]);
                        }
                    }
                }
                KeyType::IdArray | KeyType::RelIdArray => {
                    // staged arrays keep plain ids; rel-delta coding is a
                    // writer concern
                    let mut i = val as usize;
                    while self.attriddata[i] != 0 {
                        let eof = self.attriddata[i + 1] == 0;
                        data::push_ideof(xd, self.attriddata[i], eof);
                        i += 1;
                    }
                }
                KeyType::DirNumNumArray => {
                    let mut i = val as usize;
                    while self.attriddata[i] != 0 {
                        data::push_id(xd, self.attriddata[i]);
                        data::push_id(xd, self.attriddata[i + 1]);
                        let eof = self.attriddata[i + 3] == 0;
                        data::push_ideof(xd, self.attriddata[i + 2], eof);
                        i += 3;
                    }
                }
                KeyType::DirStrArray => {
                    let mut i = val as usize;
                    while self.attriddata[i] != 0 {
                        let eof = self.attriddata[i + 2] == 0;
                        data::push_ideof(xd, self.attriddata[i], eof);
                        let soff = self.attriddata[i + 1] as usize;
                        let send = soff
                            + data::nul_str(&self.attrdata, soff).map(|s| s.len()).unwrap_or(0);
                        for k in soff..send {
                            xd.push(self.attrdata[k]);
                        }
                        xd.push(0);
                        i += 2;
                    }
                }
                t if t.is_checksum() => {
                    let l = t.checksum_len().unwrap();
                    let start = val as usize;
                    for i in start..start + l {
                        xd.push(self.attrdata[i]);
                    }
                }
                _ => {}
            }
        }
        if vertical {
            let len = newvincore.len() - oldvincorelen;
            data::push_id(newincore, self.lastverticaloffset + oldvincorelen as u32);
            data::push_id(newincore, len as u32);
        }
    }

    /// Zero-terminated run in `attriddata`.
    fn id_run(&self, off: u32) -> Vec<u32> {
        let mut v = Vec::new();
        let mut i = off as usize;
        while self.attriddata[i] != 0 {
            v.push(self.attriddata[i]);
            i += 1;
        }
        v
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::id::{INITPOOL_DATA, SOLVABLE_FILELIST};

    fn fixture() -> (Repodata, StringPool) {
        let ss = StringPool::with_strings(&INITPOOL_DATA);
        (Repodata::new(0, false), ss)
    }

    #[test]
    fn scalars_internalize_and_look_up() {
        let (mut data, mut ss) = fixture();
        let k_str = ss.intern("solvable:summary");
        let k_num = ss.intern("solvable:installsize");
        let k_id = ss.intern("solvable:group");
        let grp = ss.intern("system/base");
        data.set_str(2, k_str, "summary text");
        data.set_num(2, k_num, 12345);
        data.set_id(2, k_id, grp);
        assert!(data.has_uninternalized());
        data.internalize();
        assert!(!data.has_uninternalized());
        assert_eq!(data.lookup_str(&ss, 2, k_str).as_deref(), Some("summary text"));
        assert_eq!(data.lookup_num(2, k_num), Some(12345));
        assert_eq!(data.lookup_id(2, k_id), Some(grp));
        assert_eq!(data.lookup_type(2, k_num), Some(KeyType::Num));
        assert_eq!(data.lookup_str(&ss, 3, k_str), None);
    }

    #[test]
    fn entries_with_equal_keys_share_a_schema() {
        let (mut data, mut ss) = fixture();
        let k = ss.intern("solvable:summary");
        data.set_str(2, k, "one");
        data.set_str(3, k, "two");
        data.internalize();
        // schema 0, the meta schema, and one shared entry schema
        assert_eq!(data.nschemata(), 3);
        assert_eq!(data.lookup_str(&ss, 3, k).as_deref(), Some("two"));
    }

    #[test]
    fn later_set_overrides_after_reinternalize() {
        let (mut data, mut ss) = fixture();
        let k = ss.intern("solvable:summary");
        data.set_str(2, k, "old");
        data.internalize();
        data.set_str(2, k, "new");
        data.internalize();
        assert_eq!(data.lookup_str(&ss, 2, k).as_deref(), Some("new"));
    }

    #[test]
    fn unset_writes_a_tombstone() {
        let (mut data, mut ss) = fixture();
        let k = ss.intern("solvable:summary");
        data.set_str(2, k, "gone soon");
        data.internalize();
        data.unset(2, k);
        data.internalize();
        assert_eq!(data.lookup_str(&ss, 2, k), None);
        assert_eq!(data.lookup_type(2, k), Some(KeyType::Deleted));
    }

    #[test]
    fn idarrays_accumulate_in_order() {
        let (mut data, mut ss) = fixture();
        let k = ss.intern("solvable:keywords");
        let a = ss.intern("alpha");
        let b = ss.intern("beta");
        let c = ss.intern("gamma");
        data.add_idarray(2, k, a);
        data.add_idarray(2, k, b);
        data.add_idarray(2, k, c);
        data.internalize();
        assert_eq!(data.lookup_idarray(2, k), Some(vec![a, b, c]));
        assert_eq!(data.lookup_count(2, k), 3);
    }

    #[test]
    fn dirstr_values_stringify_to_full_paths() {
        let (mut data, mut ss) = fixture();
        let d_bin = data.str2dir(&mut ss, "/usr/bin", true);
        assert!(!d_bin.is_null());
        // interning again returns the same leaf, cached or not
        assert_eq!(data.str2dir(&mut ss, "/usr/bin", true), d_bin);
        assert_eq!(data.str2dir(&mut ss, "/usr//bin/", true), d_bin);
        data.add_dirstr(2, SOLVABLE_FILELIST, d_bin, "tool");
        data.internalize();
        assert_eq!(
            data.lookup_dirstrarray_strings(&ss, 2, SOLVABLE_FILELIST),
            ["/usr/bin/tool"]
        );
        assert_eq!(data.dir2str(&ss, d_bin, None), "/usr/bin");
        assert_eq!(data.dir2str(&ss, DirId::ROOT, None), "/");
    }

    #[test]
    fn meta_entry_holds_repository_attributes() {
        let (mut data, mut ss) = fixture();
        let k = ss.intern("repository:timestamp");
        data.set_num(SOLVID_META, k, 42);
        // some per-solvable data so the meta schema gets the solvables key
        let ks = ss.intern("solvable:summary");
        data.set_str(2, ks, "x");
        data.internalize();
        assert_eq!(data.lookup_num(SOLVID_META, k), Some(42));
        assert_eq!(data.lookup_str(&ss, 2, ks).as_deref(), Some("x"));
    }

    #[test]
    fn search_visits_all_keys_and_honors_nextkey() {
        let (mut data, mut ss) = fixture();
        let k1 = ss.intern("solvable:summary");
        let k2 = ss.intern("solvable:keywords");
        let a = ss.intern("alpha");
        let b = ss.intern("beta");
        data.set_str(2, k1, "s");
        data.add_idarray(2, k2, a);
        data.add_idarray(2, k2, b);
        data.internalize();

        let mut keys_seen = Vec::new();
        data.search(2, Id::NULL, 0, &mut |d: &Repodata, ki, kv: &KeyValue<'_>| {
            keys_seen.push((d.key(ki).name, kv.entry));
            SearchCb::Continue
        });
        assert_eq!(keys_seen, [(k1, 0), (k2, 0), (k2, 1)]);

        let mut first_only = Vec::new();
        data.search(2, Id::NULL, 0, &mut |d: &Repodata, ki, _kv: &KeyValue<'_>| {
            first_only.push(d.key(ki).name);
            SearchCb::NextKey
        });
        assert_eq!(first_only, [k1, k2]);

        // keyname restriction
        let mut vals = Vec::new();
        data.search(2, k2, 0, &mut |_d: &Repodata, _ki, kv: &KeyValue<'_>| {
            vals.push(kv.id);
            SearchCb::Continue
        });
        assert_eq!(vals, [a, b]);
    }

    #[test]
    fn merge_and_swap_staged_attrs() {
        let (mut data, mut ss) = fixture();
        let k = ss.intern("solvable:summary");
        data.set_str(2, k, "two");
        data.merge_attrs(3, 2);
        data.swap_attrs(4, 3);
        data.internalize();
        assert_eq!(data.lookup_str(&ss, 2, k).as_deref(), Some("two"));
        assert_eq!(data.lookup_str(&ss, 3, k), None);
        assert_eq!(data.lookup_str(&ss, 4, k).as_deref(), Some("two"));
    }

    #[test]
    fn staged_values_are_searchable_before_internalize() {
        let (mut data, mut ss) = fixture();
        let k = ss.intern("solvable:keywords");
        let a = ss.intern("alpha");
        let b = ss.intern("beta");
        data.add_idarray(2, k, a);
        data.add_idarray(2, k, b);
        let mut vals = Vec::new();
        data.search_uninternalized(2, k, &mut |_d: &Repodata, _ki, kv: &KeyValue<'_>| {
            vals.push(kv.id);
            SearchCb::Continue
        });
        assert_eq!(vals, [a, b]);
        assert_eq!(data.lookup_kv_uninternalized(2, k).unwrap().id, a);
        data.unset_uninternalized(2, k);
        assert!(data.lookup_kv_uninternalized(2, k).is_none());
    }

    #[test]
    fn schema_cache_collisions_fall_back_to_scan() {
        let (mut data, _ss) = fixture();
        // intern many schemas so some of them collide in the 256-slot cache
        let mut ids = Vec::new();
        for i in 0..600u32 {
            let key = Repokey::new(Id(i + 3), KeyType::Id, 0, KeyStorage::Incore);
            let kid = data.key2id(&key, true);
            ids.push(data.schema2id(&[Id(kid)], true));
        }
        for (i, &sid) in ids.iter().enumerate() {
            let key = Repokey::new(Id(i as u32 + 3), KeyType::Id, 0, KeyStorage::Incore);
            let kid = data.key2id(&key, false);
            assert_eq!(data.schema2id(&[Id(kid)], false), sid, "schema {i}");
        }
    }
}
