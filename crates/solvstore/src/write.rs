//! Two-pass `.solv` serialization.
//!
//! Pass 1 walks all requested repodata plus the built-in solvable columns,
//! collecting which string/rel/dir ids are needed and building one schema
//! per entry. Ids are then renumbered by descending use count (ties broken
//! by string order for determinism) so frequent ids get short varints.
//! Pass 2 encodes everything with the new numbering into an incore buffer
//! and per-key vertical buffers and streams the file out.

use std::io::Write;

use ahash::AHashMap;
use tracing::debug;

use crate::data;
use crate::dirpool::DirPool;
use crate::error::{Result, SolvError};
use crate::id::{
    DirId, Id, RepoId, ID_NUM_INTERNAL, REPOSITORY_SOLVABLES, RPM_RPMDBID, SOLVABLE_ARCH,
    SOLVABLE_CHECKSUM, SOLVABLE_DESCRIPTION, SOLVABLE_EVR, SOLVABLE_FILELIST, SOLVABLE_FILEMARKER,
    SOLVABLE_NAME, SOLVABLE_PREREQMARKER, SOLVABLE_PROVIDES, SOLVABLE_REQUIRES, SOLVABLE_VENDOR,
};
use crate::keys::{KeyStorage, KeyType, Repokey};
use crate::pagestore::{compress_page, PAGE_SIZE};
use crate::pool::Pool;
use crate::repo::Repo;
use crate::repodata::{
    KeyValue, Keyskip, Repodata, SearchCb, SEARCH_ARRAYSENTINEL, SEARCH_KEEP_TYPE_DELETED,
    SEARCH_SUB, SOLVID_META,
};
use crate::solvable::{Solvable, DEP_KEYS};
use crate::strpool::StringPool;

pub const SOLV_VERSION_8: u32 = 8;
pub const SOLV_VERSION_9: u32 = 9;

pub const SOLV_FLAG_PREFIX_POOL: u32 = 1;
pub const SOLV_FLAG_SIZE_BYTES: u32 = 2;
pub const SOLV_FLAG_USERDATA: u32 = 4;
pub const SOLV_FLAG_IDARRAYBLOCK: u32 = 8;

/// Keep DELETED keys instead of dropping them.
pub const REPOWRITER_KEEP_TYPE_DELETED: u32 = 1 << 0;
/// Do not write the built-in solvable columns.
pub const REPOWRITER_NO_STORAGE_SOLVABLE: u32 = 1 << 1;
/// Pack solvable dependency arrays into the shared compressed id-array
/// block (forces format version 9).
pub const REPOWRITER_IDARRAYBLOCK: u32 = 1 << 2;

/// Storage decision callback: may drop a key or demote it to vertical.
pub type Keyfilter<'a> = Box<dyn Fn(&Pool, &Repokey) -> KeyStorage + 'a>;

/// The standard filter: well-known bulky keys go vertical, everything else
/// stays incore.
pub fn std_keyfilter(pool: &Pool, key: &Repokey) -> KeyStorage {
    const VERTICALS: [Id; 3] = [SOLVABLE_DESCRIPTION, SOLVABLE_FILELIST, SOLVABLE_CHECKSUM];
    if VERTICALS.contains(&key.name) {
        return KeyStorage::VerticalOffset;
    }
    let name = pool.id2str(key.name);
    for tag in ["solvable:summary:", "solvable:description:", "solvable:eula:"] {
        if name.starts_with(tag) {
            return KeyStorage::VerticalOffset;
        }
    }
    KeyStorage::Incore
}

/// Writer configuration; create once per output file.
pub struct Repowriter<'a> {
    flags: u32,
    keyfilter: Option<Keyfilter<'a>>,
    keyqueue: Option<Vec<(Id, Id)>>,
    repodatastart: usize,
    repodataend: usize,
    solvablestart: usize,
    solvableend: usize,
    userdata: Vec<u8>,
}

impl<'a> Default for Repowriter<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Repowriter<'a> {
    pub fn new() -> Self {
        Repowriter {
            flags: 0,
            keyfilter: Some(Box::new(std_keyfilter)),
            keyqueue: None,
            repodatastart: 0,
            repodataend: usize::MAX,
            solvablestart: 0,
            solvableend: usize::MAX,
            userdata: Vec::new(),
        }
    }

    pub fn set_flags(&mut self, flags: u32) {
        self.flags = flags;
    }

    pub fn set_keyfilter(&mut self, keyfilter: Option<Keyfilter<'a>>) {
        self.keyfilter = keyfilter;
    }

    /// Request the final key list; available from [`Repowriter::keyqueue`]
    /// after a write.
    pub fn enable_keyqueue(&mut self) {
        self.keyqueue = Some(Vec::new());
    }

    /// `(keyname, keytype)` pairs of the keys written, in file order.
    pub fn keyqueue(&self) -> Option<&[(Id, Id)]> {
        self.keyqueue.as_deref()
    }

    pub fn set_repodatarange(&mut self, start: usize, end: usize) {
        self.repodatastart = start;
        self.repodataend = end;
    }

    pub fn set_solvablerange(&mut self, start: usize, end: usize) {
        self.solvablestart = start;
        self.solvableend = end;
    }

    /// Opaque payload stored in the header (format version 9).
    pub fn set_userdata(&mut self, data: &[u8]) -> Result<()> {
        if data.len() >= 65536 {
            return Err(SolvError::UserdataTooLarge(data.len()));
        }
        self.userdata = data.to_vec();
        Ok(())
    }

    /// Serialize `rid` to `out`.
    pub fn write<W: Write>(&mut self, pool: &Pool, rid: RepoId, out: &mut W) -> Result<()> {
        let r = write_repo(self, pool, rid, out);
        if let Err(e) = &r {
            pool.set_last_error(format!("repo write failed: {e}"));
        }
        r
    }
}

/// Serialize a repo with the default writer settings.
pub fn repo_write<W: Write>(pool: &Pool, rid: RepoId, out: &mut W) -> Result<()> {
    Repowriter::new().write(pool, rid, out)
}

/* ---------- id usage accounting ---------- */

#[derive(Copy, Clone, Default)]
struct NeedId {
    need: u32,
    map: u32,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum DirUsage {
    None,
    /// One repodata's dirpool is used directly.
    Single(usize),
    /// Multiple sources: collect into a private dirpool.
    Own,
}

struct WriteCtx<'p> {
    pool: &'p Pool,
    target: Repodata,

    /// size of the string-id space; rel slots follow at this offset
    reloff: usize,
    needid: Vec<NeedId>,

    /// private output string pool (ids differ from the global pool unless
    /// cloned from it)
    ownspool: Option<StringPool>,
    clonepool: bool,
    owndirpool: Option<DirPool>,
    /// per old dirid: 1 used, 2 used as parent; later rewritten to the new
    /// dirid numbering
    dirused: Vec<u32>,

    keymap: Vec<u32>,
    active_keymap: usize,
    active_dataid: usize,

    /// schema assembly stack; plain key ids, 0 terminators and sub-schema
    /// bookkeeping pairs share it during pass 1
    schema: Vec<i64>,
    subschemata: Vec<u32>,
    current_sub: usize,

    /// extdata[0] = incore, extdata[keyid] = vertical, last = idarray block
    extdata: Vec<Vec<u8>>,
    vstart: i64,
    maxdata: usize,
    lastlen: usize,
    doingsolvables: bool,
    /// key id of the single vertical DIRSTRARRAY in filelist mode, else 0
    filelistmode: usize,
    /// virtual length of the filelist vertical data during pass 2
    filelist_len: usize,

    diridcache: AHashMap<(usize, u32), DirId>,
}

impl<'p> WriteCtx<'p> {
    fn source_spool<'b>(&'b self, d: &'b Repodata) -> &'b StringPool {
        if d.is_localpool() {
            &d.spool
        } else {
            &self.pool.ss
        }
    }

    fn grow_needid(&mut self, id: usize) {
        let oldoff = self.reloff;
        let newoff = (id + 1 + 1023) & !1023;
        self.needid.splice(
            oldoff..oldoff,
            std::iter::repeat(NeedId::default()).take(newoff - oldoff),
        );
        self.reloff = newoff;
    }

    /// Intern a source-pool string into the private output pool.
    fn putinownpool(&mut self, d: &Repodata, id: Id) -> Id {
        let s = self.source_spool(d).id2str(id).to_string();
        let own = self.ownspool.as_mut().expect("no own pool");
        let nid = own.intern(&s);
        if nid.index() >= self.reloff {
            self.grow_needid(nid.index());
        }
        nid
    }

    fn putinowndirpool(&mut self, d: &Repodata, dataid: usize, dir: DirId) -> DirId {
        if dir.is_null() {
            if let Some(dp) = self.owndirpool.as_mut() {
                if dp.is_empty() {
                    dp.add_dir(DirId::NULL, Id::NULL, true);
                }
            }
            return DirId::NULL;
        }
        if let Some(&hit) = self.diridcache.get(&(dataid, dir.0)) {
            return hit;
        }
        let parent = d.dirpool().parent(dir);
        let nparent = if parent.is_null() {
            DirId::NULL
        } else {
            self.putinowndirpool(d, dataid, parent)
        };
        let mut comp = d.dirpool().compid(dir);
        if self.ownspool.is_some() && comp.0 > 1 {
            comp = self.putinownpool(d, comp);
        }
        let nid = self
            .owndirpool
            .as_mut()
            .expect("no own dirpool")
            .add_dir(nparent, comp, true)
            .unwrap();
        self.diridcache.insert((dataid, dir.0), nid);
        nid
    }

    fn needidoff(&self, id: Id) -> usize {
        if id.is_rel() {
            self.reloff + id.rel_index()
        } else {
            id.index()
        }
    }

    /// Map a source id into the needid index space, going through the own
    /// pool when one is active.
    fn strid_index(&self, id: Id) -> usize {
        if id.is_rel() {
            return self.reloff + id.rel_index();
        }
        match (&self.ownspool, self.clonepool) {
            (Some(own), false) => own.find(self.pool.ss.id2str(id)).index(),
            _ => id.index(),
        }
    }

    fn incneedid(&mut self, id: Id) {
        let off = self.needidoff(id);
        self.needid[off].need += 1;
    }

    /// Count a whole dependency run; returns the id count plus terminator.
    fn incneedidarray(&mut self, ids: &[Id]) -> u32 {
        for &id in ids {
            let off = self.needidoff(id);
            self.needid[off].need += 1;
        }
        ids.len() as u32 + 1
    }

    fn mapped(&self, id: Id) -> u32 {
        self.needid[self.needidoff(id)].need
    }

    /// Current length of a vertical buffer, filelist mode included.
    fn vertical_len(&self, rm: usize) -> usize {
        if rm == self.filelistmode && self.filelistmode != 0 {
            self.filelist_len
        } else {
            self.extdata[rm].len()
        }
    }

    /* ----- pass 1 callback ----- */

    fn collect_needed(&mut self, d: &Repodata, keyindex: usize, kv: &KeyValue<'_>) -> SearchCb {
        let key = *d.key(keyindex);
        if key.name == REPOSITORY_SOLVABLES {
            return SearchCb::NextKey;
        }
        let rm = self.keymap[self.active_keymap + keyindex];
        if rm == 0 {
            return SearchCb::NextKey;
        }
        // record the key in the schema, eliding duplicate consecutive keys
        if self.schema.last() != Some(&(rm as i64)) {
            self.schema.push(rm as i64);
        }
        match key.typ {
            KeyType::Id | KeyType::IdArray | KeyType::RelIdArray => {
                let mut id = kv.id;
                if !id.is_rel()
                    && self.ownspool.is_some()
                    && id.0 > 1
                    && (!self.clonepool || d.is_localpool())
                {
                    id = self.putinownpool(d, id);
                }
                self.incneedid(id);
            }
            KeyType::Dir | KeyType::DirNumNumArray | KeyType::DirStrArray => {
                let id = DirId(kv.id.0);
                if self.owndirpool.is_some() {
                    self.putinowndirpool(d, self.active_dataid, id);
                } else if (id.0 as usize) < self.dirused.len() {
                    self.dirused[id.0 as usize] = 1;
                }
            }
            KeyType::FixArray | KeyType::FlexArray => {
                if kv.entry > 0 {
                    // finish the previous element's schema and rewind
                    self.close_subschema();
                }
                if kv.eof != 2 {
                    // start a fresh element schema
                    if kv.entry == 0 || key.typ == KeyType::FlexArray {
                        self.subschemata.push(0);
                        self.schema.push((self.subschemata.len() - 1) as i64);
                    } else {
                        self.schema.push(-1);
                    }
                    self.schema.push(0);
                }
            }
            _ => {}
        }
        SearchCb::Continue
    }

    /// Terminate the element schema on top of the stack, intern it, and pop
    /// the bookkeeping pair. The array key re-pushed by the dedup logic
    /// doubles as the terminator slot.
    fn close_subschema(&mut self) {
        let top = self.schema.len() - 1;
        self.schema[top] = 0;
        let mut sp = top;
        while self.schema[sp - 1] != 0 {
            sp -= 1;
        }
        let elem: Vec<Id> = self.schema[sp..top].iter().map(|&k| Id(k as u32)).collect();
        let subidx = self.schema[sp - 2];
        if subidx >= 0 {
            let sid = self.target.schema2id(&elem, true);
            self.subschemata[subidx as usize] = sid;
        }
        self.schema.truncate(sp - 2);
    }

    /* ----- solvable columns, both passes ----- */

    fn collect_needed_solvable(&mut self, s: &Solvable, repo: &Repo) {
        if self.keymap[SOLVABLE_NAME.index()] != 0 {
            self.schema.push(self.keymap[SOLVABLE_NAME.index()] as i64);
            self.incneedid(s.name);
        }
        if self.keymap[SOLVABLE_ARCH.index()] != 0 {
            self.schema.push(self.keymap[SOLVABLE_ARCH.index()] as i64);
            self.incneedid(s.arch);
        }
        if self.keymap[SOLVABLE_EVR.index()] != 0 {
            self.schema.push(self.keymap[SOLVABLE_EVR.index()] as i64);
            self.incneedid(s.evr);
        }
        if !s.vendor.is_null() && self.keymap[SOLVABLE_VENDOR.index()] != 0 {
            self.schema.push(self.keymap[SOLVABLE_VENDOR.index()] as i64);
            self.incneedid(s.vendor);
        }
        for dep in DEP_KEYS {
            let rm = self.keymap[dep.index()];
            if rm == 0 || s.dep_offset(dep).unwrap_or(0) == 0 {
                continue;
            }
            self.schema.push(rm as i64);
            let ids: Vec<Id> = repo.deps(s.dep_offset(dep).unwrap()).to_vec();
            let added = self.incneedidarray(&ids);
            self.target.keys[rm as usize].size += added;
        }
        if repo.rpmdbid.is_some() && self.keymap[RPM_RPMDBID.index()] != 0 {
            let rm = self.keymap[RPM_RPMDBID.index()];
            self.schema.push(rm as i64);
            self.target.keys[rm as usize].size += 1;
        }
    }

    fn collect_data_solvable(
        &mut self,
        s: &Solvable,
        repo: &Repo,
        relidx: usize,
        use_block: bool,
        blockidx: usize,
    ) {
        if self.keymap[SOLVABLE_NAME.index()] != 0 {
            let v = self.mapped(s.name);
            data::push_id(&mut self.extdata[0], v);
        }
        if self.keymap[SOLVABLE_ARCH.index()] != 0 {
            let v = self.mapped(s.arch);
            data::push_id(&mut self.extdata[0], v);
        }
        if self.keymap[SOLVABLE_EVR.index()] != 0 {
            let v = self.mapped(s.evr);
            data::push_id(&mut self.extdata[0], v);
        }
        if !s.vendor.is_null() && self.keymap[SOLVABLE_VENDOR.index()] != 0 {
            let v = self.mapped(s.vendor);
            data::push_id(&mut self.extdata[0], v);
        }
        for dep in DEP_KEYS {
            let off = s.dep_offset(dep).unwrap_or(0);
            if off == 0 || self.keymap[dep.index()] == 0 {
                continue;
            }
            let marker = if dep == SOLVABLE_REQUIRES {
                SOLVABLE_PREREQMARKER
            } else if dep == SOLVABLE_PROVIDES {
                SOLVABLE_FILEMARKER
            } else {
                Id::NULL
            };
            let ids: Vec<Id> = repo.deps(off).to_vec();
            if use_block {
                self.add_depids_block(blockidx, &ids);
            } else {
                self.add_depids_rel(&ids, marker);
            }
        }
        if repo.rpmdbid.is_some() && self.keymap[RPM_RPMDBID.index()] != 0 {
            let dbid = repo.rpmdbid.as_ref().unwrap()[relidx];
            data::push_id(&mut self.extdata[0], dbid);
        }
    }

    /// REL_IDARRAY encoding: map ids, keep the marker pinned, sort each
    /// half, emit successive differences plus one; the marker itself is
    /// emitted as difference 0.
    fn add_depids_rel(&mut self, ids: &[Id], marker: Id) {
        if ids.is_empty() {
            data::push_ideof(&mut self.extdata[0], 0, true);
            return;
        }
        let marker_mapped = if marker.is_null() { 0 } else { self.mapped(marker) };
        let mut sids: Vec<u32> = ids.iter().map(|&id| self.mapped(id)).collect();
        let mpos = if marker_mapped != 0 {
            sids.iter().position(|&v| v == marker_mapped)
        } else {
            None
        };
        match mpos {
            Some(p) => {
                sids[..p].sort_unstable();
                sids[p + 1..].sort_unstable();
            }
            None => sids.sort_unstable(),
        }
        let mut old = 0u32;
        let len = sids.len();
        for (i, &v) in sids.iter().enumerate() {
            let eof = i + 1 == len;
            if marker_mapped != 0 && v == marker_mapped {
                old = 0;
                data::push_ideof(&mut self.extdata[0], 0, eof);
            } else {
                let diff = v - old + 1;
                old = v;
                data::push_ideof(&mut self.extdata[0], diff, eof);
            }
        }
    }

    /// Id-array-block encoding: deltas against the previous id, folded so
    /// nearby values stay small; distant values are emitted literally.
    fn add_depids_block(&mut self, blockidx: usize, ids: &[Id]) {
        if ids.is_empty() {
            data::push_ideof(&mut self.extdata[blockidx], 0, true);
            return;
        }
        let mut last = 0u32;
        let len = ids.len();
        for (i, &id) in ids.iter().enumerate() {
            let v = self.mapped(id);
            let enc = if v < last {
                (last - v) * 2 - 1
            } else if v < 2 * last {
                (v - last) * 2
            } else {
                v
            };
            last = v;
            data::push_ideof(&mut self.extdata[blockidx], enc, i + 1 == len);
        }
    }

    /* ----- pass 2 callback ----- */

    fn collect_data(&mut self, d: &Repodata, keyindex: usize, kv: &KeyValue<'_>) -> SearchCb {
        let key = *d.key(keyindex);
        if key.name == REPOSITORY_SOLVABLES {
            return SearchCb::NextKey;
        }
        let rm = self.keymap[self.active_keymap + keyindex];
        if rm == 0 {
            return SearchCb::NextKey;
        }
        let storage = self.target.keys[rm as usize].storage;
        let typ = self.target.keys[rm as usize].typ;
        let vertical = storage == KeyStorage::VerticalOffset;
        if vertical && self.vstart == -1 {
            self.vstart = self.vertical_len(rm as usize) as i64;
        }
        let xi = if vertical { rm as usize } else { 0 };
        match typ {
            KeyType::Deleted | KeyType::Void | KeyType::Constant | KeyType::ConstantId => {}
            KeyType::Id => {
                let mut id = kv.id;
                if !id.is_rel()
                    && self.ownspool.is_some()
                    && id.0 > 1
                    && (!self.clonepool || d.is_localpool())
                {
                    id = self.putinownpool(d, id);
                }
                let v = self.mapped(id);
                data::push_id(&mut self.extdata[xi], v);
            }
            KeyType::IdArray | KeyType::RelIdArray => {
                let mut id = kv.id;
                if !id.is_rel()
                    && self.ownspool.is_some()
                    && id.0 > 1
                    && (!self.clonepool || d.is_localpool())
                {
                    id = self.putinownpool(d, id);
                }
                let v = self.mapped(id);
                data::push_ideof(&mut self.extdata[xi], v, kv.eof != 0);
            }
            KeyType::Str => {
                self.extdata[xi].extend_from_slice(kv.str_bytes);
                self.extdata[xi].push(0);
            }
            KeyType::Num => {
                data::push_num64(&mut self.extdata[xi], kv.num);
            }
            KeyType::U32 => {
                let v = kv.num as u32;
                self.extdata[xi].extend_from_slice(&v.to_be_bytes());
            }
            KeyType::Dir => {
                let id = self.map_dir(d, DirId(kv.id.0));
                data::push_id(&mut self.extdata[xi], id);
            }
            KeyType::Binary => {
                data::push_id(&mut self.extdata[xi], kv.num as u32);
                self.extdata[xi].extend_from_slice(kv.str_bytes);
            }
            KeyType::DirNumNumArray => {
                let id = self.map_dir(d, DirId(kv.id.0));
                data::push_id(&mut self.extdata[xi], id);
                data::push_id(&mut self.extdata[xi], kv.num as u32);
                data::push_ideof(&mut self.extdata[xi], kv.num2, kv.eof != 0);
            }
            KeyType::DirStrArray => {
                let id = self.map_dir(d, DirId(kv.id.0));
                if rm as usize == self.filelistmode && self.filelistmode != 0 {
                    // the filelist pass writes the bytes later; only track
                    // the length so the incore offsets come out right
                    self.filelist_len += data::ideof_len(id) + kv.str_bytes.len() + 1;
                } else {
                    data::push_ideof(&mut self.extdata[xi], id, kv.eof != 0);
                    self.extdata[xi].extend_from_slice(kv.str_bytes);
                    self.extdata[xi].push(0);
                }
            }
            KeyType::FixArray | KeyType::FlexArray => {
                if kv.entry == 0 {
                    data::push_id(&mut self.extdata[xi], kv.num as u32);
                }
                if kv.eof != 2 && (kv.entry == 0 || typ == KeyType::FlexArray) {
                    let sid = self.subschemata[self.current_sub];
                    self.current_sub += 1;
                    data::push_id(&mut self.extdata[xi], sid);
                }
                if xi == 0 && kv.depth == 0 && !self.doingsolvables {
                    if self.extdata[0].len() - self.lastlen > self.maxdata {
                        self.maxdata = self.extdata[0].len() - self.lastlen;
                    }
                    self.lastlen = self.extdata[0].len();
                }
            }
            t if t.is_checksum() => {
                self.extdata[xi].extend_from_slice(kv.str_bytes);
            }
            _ => {}
        }
        if vertical && kv.eof != 0 {
            let vlen = self.vertical_len(rm as usize) as i64;
            data::push_id(&mut self.extdata[0], self.vstart as u32);
            data::push_id(&mut self.extdata[0], (vlen - self.vstart) as u32);
            self.vstart = -1;
        }
        SearchCb::Continue
    }

    /// Third-pass callback of the filelist mode: now actually write the
    /// postponed DIRSTRARRAY bytes.
    fn collect_filelist(&mut self, d: &Repodata, keyindex: usize, kv: &KeyValue<'_>) -> SearchCb {
        let rm = self.keymap[self.active_keymap + keyindex];
        if rm as usize != self.filelistmode {
            return SearchCb::NextKey;
        }
        let id = self.map_dir(d, DirId(kv.id.0));
        let xd = &mut self.extdata[rm as usize];
        data::push_ideof(xd, id, kv.eof != 0);
        xd.extend_from_slice(kv.str_bytes);
        xd.push(0);
        SearchCb::Continue
    }

    fn map_dir(&mut self, d: &Repodata, dir: DirId) -> u32 {
        if self.owndirpool.is_some() {
            let nd = self.putinowndirpool(d, self.active_dataid, dir);
            self.dirused.get(nd.0 as usize).copied().unwrap_or(0)
        } else {
            self.dirused.get(dir.0 as usize).copied().unwrap_or(0)
        }
    }
}

/* ---------- output helpers ---------- */

struct Out<'w> {
    w: &'w mut dyn Write,
}

impl<'w> Out<'w> {
    fn u32(&mut self, x: u32) -> Result<()> {
        self.w.write_all(&x.to_be_bytes())?;
        Ok(())
    }

    fn u8(&mut self, x: u8) -> Result<()> {
        self.w.write_all(&[x])?;
        Ok(())
    }

    fn id(&mut self, x: u32) -> Result<()> {
        let mut buf = Vec::with_capacity(5);
        data::push_id(&mut buf, x);
        self.w.write_all(&buf)?;
        Ok(())
    }

    fn blob(&mut self, b: &[u8]) -> Result<()> {
        self.w.write_all(b)?;
        Ok(())
    }

    fn str0(&mut self, s: &[u8]) -> Result<()> {
        self.w.write_all(s)?;
        self.w.write_all(&[0])?;
        Ok(())
    }

    /// Zero-terminated id sequence in the 6-bit continuation encoding.
    fn idarray(&mut self, ids: &[Id]) -> Result<()> {
        if ids.is_empty() {
            return self.u8(0);
        }
        let mut buf = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            data::push_ideof(&mut buf, id.0, i + 1 == ids.len());
        }
        self.blob(&buf)
    }

    fn compressed_page(&mut self, page: &[u8]) -> Result<()> {
        let mut cpage = vec![0u8; page.len().saturating_sub(1)];
        let clen = compress_page(page, &mut cpage);
        if clen == 0 {
            self.u32((page.len() as u32) << 1)?;
            self.blob(page)
        } else {
            self.u32(((clen as u32) << 1) | 1)?;
            self.blob(&cpage[..clen])
        }
    }

    /// Chunked compressed blob (id-array block): 3-byte chunk headers with
    /// a last-chunk flag and a compressed bit.
    fn compressed_blob(&mut self, blob: &[u8]) -> Result<()> {
        let mut rest = blob;
        loop {
            let chunk = rest.len().min(65535);
            let flag: u8 = if chunk == rest.len() { 0x80 } else { 0x00 };
            let mut cbuf = vec![0u8; chunk.saturating_sub(1)];
            let clen = compress_page(&rest[..chunk], &mut cbuf);
            if clen == 0 {
                self.u8(flag)?;
                self.u8((chunk >> 8) as u8)?;
                self.u8(chunk as u8)?;
                self.blob(&rest[..chunk])?;
            } else {
                self.u8(flag | 0x40)?;
                self.u8((clen >> 8) as u8)?;
                self.u8(clen as u8)?;
                self.blob(&cbuf[..clen])?;
            }
            rest = &rest[chunk..];
            if rest.is_empty() {
                return Ok(());
            }
        }
    }
}

/// Append extdata bytes to the page buffer, flushing full pages.
fn write_compressed_extdata(
    out: &mut Out<'_>,
    xd: &[u8],
    vpage: &mut [u8],
    mut lpage: usize,
) -> Result<usize> {
    let mut dp = xd;
    while !dp.is_empty() {
        let ll = (PAGE_SIZE - lpage).min(dp.len());
        vpage[lpage..lpage + ll].copy_from_slice(&dp[..ll]);
        dp = &dp[ll..];
        lpage += ll;
        if lpage == PAGE_SIZE {
            out.compressed_page(vpage)?;
            lpage = 0;
        }
    }
    Ok(lpage)
}

/// Depth-first dir traversal: emit all used siblings of one level, then
/// recurse below each entry that serves as a parent, prefixing each child
/// block with a back-link to its parent row. Row 1 is always `/`.
fn traverse_dirs(dp: &DirPool, dirmap: &mut Vec<i64>, dir: DirId, used: Option<&[u32]>) {
    let parent = dirmap.len();
    if parent == 1 {
        dirmap.push(1);
    }
    let mut sib = dir;
    while !sib.is_null() {
        let wanted = used.map_or(true, |u| u.get(sib.index()).copied().unwrap_or(0) != 0);
        if wanted && !(sib == DirId::ROOT && parent == 1) {
            dirmap.push(sib.0 as i64);
        }
        sib = dp.sibling(sib);
    }
    if parent == dirmap.len() {
        // empty block, drop the back-link row again
        dirmap.pop();
        return;
    }
    let lastn = dirmap.len();
    for row in parent..lastn {
        let sib = DirId(dirmap[row] as u32);
        if let Some(u) = used {
            if u.get(sib.index()).copied().unwrap_or(0) != 2 {
                continue;
            }
        }
        let child = dp.child(sib);
        if !child.is_null() {
            dirmap.push(-(row as i64));
            traverse_dirs(dp, dirmap, child, used);
        }
    }
}

fn keyskip_for_write(repo: &Repo, solvid: i32, used: &[bool]) -> Option<Keyskip> {
    let mut cnt = 0;
    let mut ks = Keyskip::new();
    for (j, d) in repo.repodata_iter().enumerate() {
        if !used[j] {
            continue;
        }
        if solvid != SOLVID_META && (solvid < d.start() || solvid >= d.end()) {
            continue;
        }
        ks.fill(d, solvid);
        cnt += 1;
    }
    (cnt > 1).then_some(ks)
}

/* ---------- the writer ---------- */

#[allow(clippy::too_many_lines)]
fn write_repo<W: Write>(
    writer: &mut Repowriter<'_>,
    pool: &Pool,
    rid: RepoId,
    outw: &mut W,
) -> Result<()> {
    let repo = pool.repo(rid);
    let nrepodata = repo.nrepodata();
    let use_block = writer.flags & REPOWRITER_IDARRAYBLOCK != 0;
    if repo.repodata_iter().any(|d| d.has_uninternalized()) {
        debug!("repo has uninternalized attributes, they will not be written");
    }

    let mut ctx = WriteCtx {
        pool,
        target: Repodata::new(usize::MAX, true),
        reloff: 0,
        needid: Vec::new(),
        ownspool: None,
        clonepool: false,
        owndirpool: None,
        dirused: Vec::new(),
        keymap: Vec::new(),
        active_keymap: 0,
        active_dataid: 0,
        schema: Vec::new(),
        subschemata: Vec::new(),
        current_sub: 0,
        extdata: Vec::new(),
        vstart: -1,
        maxdata: 0,
        lastlen: 0,
        doingsolvables: false,
        filelistmode: 0,
        filelist_len: 0,
        diridcache: AHashMap::new(),
    };

    /* find which keys we need, unify them into the target key table */
    let mut nkeymap = ID_NUM_INTERNAL as usize;
    for d in repo.repodata_iter() {
        nkeymap += d.nkeys() + 1;
    }
    ctx.keymap = vec![0u32; nkeymap];
    let mut keymapstart = vec![0usize; nrepodata];
    let mut repodataused = vec![false; nrepodata];

    let mut any_global_ids = false;
    let mut any_local_ids = false;
    let mut clonepool = false;
    let mut dirusage = DirUsage::None;

    if writer.flags & REPOWRITER_NO_STORAGE_SOLVABLE == 0 {
        let mut solvkeys: Vec<Repokey> = vec![
            Repokey::new(SOLVABLE_NAME, KeyType::Id, 0, KeyStorage::Solvable),
            Repokey::new(SOLVABLE_ARCH, KeyType::Id, 0, KeyStorage::Solvable),
            Repokey::new(SOLVABLE_EVR, KeyType::Id, 0, KeyStorage::Solvable),
            Repokey::new(SOLVABLE_VENDOR, KeyType::Id, 0, KeyStorage::Solvable),
        ];
        for dep in DEP_KEYS {
            if use_block {
                solvkeys.push(Repokey::new(dep, KeyType::IdArray, 0, KeyStorage::IdArrayBlock));
            } else {
                solvkeys.push(Repokey::new(dep, KeyType::RelIdArray, 0, KeyStorage::Solvable));
            }
        }
        solvkeys.push(Repokey::new(RPM_RPMDBID, KeyType::Num, 0, KeyStorage::Solvable));
        for keyd in solvkeys {
            if let Some(kf) = &writer.keyfilter {
                if kf(pool, &keyd) == KeyStorage::Dropped {
                    continue;
                }
            }
            any_global_ids = true;
            clonepool = true;
            ctx.keymap[keyd.name.index()] = ctx.target.key2id(&keyd, true);
        }
    }

    if repo.nsolvables > 0 {
        let keyd = Repokey::new(
            REPOSITORY_SOLVABLES,
            KeyType::FlexArray,
            0,
            KeyStorage::Incore,
        );
        ctx.keymap[REPOSITORY_SOLVABLES.index()] = ctx.target.key2id(&keyd, true);
    }

    let mut n = ID_NUM_INTERNAL as usize;
    for (j, d) in repo.repodata_iter().enumerate() {
        keymapstart[j] = n;
        n += 1; // key 0 of this stratum
        if j < writer.repodatastart || j >= writer.repodataend {
            n += d.nkeys() - 1;
            continue;
        }
        let mut idused = false;
        let mut dused = false;
        for k in 1..d.nkeys() {
            let key = *d.key(k);
            let slot = n;
            n += 1;
            if key.name == REPOSITORY_SOLVABLES && key.typ == KeyType::FlexArray {
                ctx.keymap[slot] = ctx.keymap[REPOSITORY_SOLVABLES.index()];
                continue;
            }
            if key.typ == KeyType::Deleted && writer.flags & REPOWRITER_KEEP_TYPE_DELETED == 0 {
                continue;
            }
            let mut keyd = key;
            if key.typ == KeyType::ConstantId && d.is_localpool() {
                // the constant's string must be globally known for key
                // unification; otherwise the key is dropped
                let gid = pool.ss.find(d.spool.id2str(Id(key.size)));
                if gid.is_null() {
                    debug!("dropping constantid key with local-only value");
                    continue;
                }
                keyd.size = gid.0;
            }
            let mut id = ctx.target.key2id(&keyd, false);
            if id == 0 {
                keyd.storage = KeyStorage::Incore;
                if !matches!(keyd.typ, KeyType::Constant | KeyType::ConstantId) {
                    keyd.size = 0;
                }
                if let Some(kf) = &writer.keyfilter {
                    match kf(pool, &keyd) {
                        KeyStorage::Dropped => continue,
                        KeyStorage::VerticalOffset => keyd.storage = KeyStorage::VerticalOffset,
                        _ => {}
                    }
                }
                id = ctx.target.key2id(&keyd, true);
            }
            ctx.keymap[slot] = id;
            repodataused[j] = true;
            match key.typ {
                KeyType::ConstantId | KeyType::Id | KeyType::IdArray | KeyType::RelIdArray => {
                    idused = true;
                }
                KeyType::Dir | KeyType::DirNumNumArray | KeyType::DirStrArray => {
                    idused = true; // dirs also use component ids
                    dused = true;
                }
                _ => {}
            }
        }
        if idused {
            if d.is_localpool() {
                any_local_ids = true;
            } else {
                any_global_ids = true;
            }
        }
        if dused {
            dirusage = match dirusage {
                DirUsage::None => DirUsage::Single(j),
                _ => DirUsage::Own,
            };
        }
    }

    /* decide the output string pool: global ids, a private pool, or a
     * private clone of the global pool to skip remapping */
    let own_pool = any_local_ids;
    if !own_pool {
        clonepool = false;
    }
    if own_pool {
        clonepool = clonepool || any_global_ids;
        let spool = if clonepool {
            pool.ss.clone()
        } else {
            StringPool::new_empty()
        };
        ctx.clonepool = clonepool;
        ctx.ownspool = Some(spool);
    }
    if dirusage == DirUsage::Own {
        ctx.owndirpool = Some(DirPool::new());
    }

    ctx.reloff = if own_pool {
        (ctx.ownspool.as_ref().unwrap().len().max(pool.ss.len()) + 1023) & !1023
    } else {
        pool.ss.len()
    };
    ctx.needid = vec![NeedId::default(); ctx.reloff + pool.nrels()];
    if let DirUsage::Single(j) = dirusage {
        ctx.dirused = vec![0u32; repo.data(j).dirpool().len()];
    }

    let searchflags = SEARCH_SUB
        | SEARCH_ARRAYSENTINEL
        | if writer.flags & REPOWRITER_KEEP_TYPE_DELETED != 0 {
            SEARCH_KEEP_TYPE_DELETED
        } else {
            0
        };

    /* pass 1: meta entry */
    let keyskip = keyskip_for_write(repo, SOLVID_META, &repodataused);
    for (j, d) in repo.repodata_iter().enumerate() {
        if !repodataused[j] {
            continue;
        }
        ctx.active_keymap = keymapstart[j];
        ctx.active_dataid = j;
        let cb = &mut |dd: &Repodata, ki: usize, kv: &KeyValue<'_>| ctx.collect_needed(dd, ki, kv);
        d.search_keyskip(SOLVID_META, Id::NULL, searchflags, keyskip.as_ref(), cb);
    }
    if repo.nsolvables > 0 {
        let rm = ctx.keymap[REPOSITORY_SOLVABLES.index()];
        ctx.schema.push(rm as i64);
        ctx.target.keys[rm as usize].size += 1;
    }
    let mut mainschemakeys: Vec<Id> = ctx.schema.iter().map(|&k| Id(k as u32)).collect();
    ctx.schema.clear();

    /* pass 1: solvables */
    let solvablestart = writer.solvablestart.max(repo.start);
    let solvableend = writer.solvableend.min(repo.end);
    let mut solvschemata: Vec<u32> = Vec::new();
    let mut solvids: Vec<i32> = Vec::new();
    let mut anysolvableused = false;
    for solvid in solvablestart..solvableend {
        if pool.solvables[solvid].repo != Some(rid) {
            continue;
        }
        let s = pool.solvables[solvid];
        ctx.collect_needed_solvable(&s, repo);
        let keyskip = keyskip_for_write(repo, solvid as i32, &repodataused);
        for (j, d) in repo.repodata_iter().enumerate() {
            if !repodataused[j] || (solvid as i32) < d.start() || solvid as i32 >= d.end() {
                continue;
            }
            ctx.active_keymap = keymapstart[j];
            ctx.active_dataid = j;
            let cb =
                &mut |dd: &Repodata, ki: usize, kv: &KeyValue<'_>| ctx.collect_needed(dd, ki, kv);
            d.search_keyskip(solvid as i32, Id::NULL, searchflags, keyskip.as_ref(), cb);
        }
        let keys: Vec<Id> = ctx.schema.iter().map(|&k| Id(k as u32)).collect();
        ctx.schema.clear();
        let sid = ctx.target.schema2id(&keys, true);
        if sid != 0 {
            anysolvableused = true;
        }
        solvschemata.push(sid);
        solvids.push(solvid as i32);
    }
    let nsolvables = solvids.len();

    if repo.nsolvables > 0 && !anysolvableused {
        mainschemakeys.pop(); // nothing per solvable, drop the array key
    }
    let mainschema = ctx.target.schema2id(&mainschemakeys, true);

    /* remove unused keys and renumber the key table */
    let mut keyused = vec![0u32; ctx.target.nkeys()];
    for i in 1..ctx.target.schemadata.len() {
        keyused[ctx.target.schemadata[i].index()] = 1;
    }
    keyused[0] = 0;
    let mut newn = 1u32;
    for i in 1..ctx.target.nkeys() {
        if keyused[i] == 0 {
            continue;
        }
        ctx.target.keys[newn as usize] = ctx.target.keys[i];
        keyused[i] = newn;
        newn += 1;
    }
    ctx.target.keys.truncate(newn as usize);
    for i in 1..ctx.target.schemadata.len() {
        ctx.target.schemadata[i] = Id(keyused[ctx.target.schemadata[i].index()]);
    }
    for km in ctx.keymap.iter_mut() {
        *km = keyused[*km as usize];
    }
    ctx.target.free_schemahash();

    if let Some(kq) = &mut writer.keyqueue {
        kq.clear();
        for i in 1..ctx.target.nkeys() {
            kq.push((ctx.target.keys[i].name, ctx.target.keys[i].typ.keyname()));
        }
    }

    /* filelist mode: exactly one vertical key, of type DIRSTRARRAY */
    if anysolvableused && repodataused.iter().any(|&u| u) {
        for i in 1..ctx.target.nkeys() {
            if ctx.target.keys[i].storage != KeyStorage::VerticalOffset {
                continue;
            }
            if ctx.target.keys[i].typ != KeyType::DirStrArray || ctx.filelistmode != 0 {
                ctx.filelistmode = 0;
                break;
            }
            ctx.filelistmode = i;
        }
    }

    /* map key names/types/constants into the output id space */
    let mut spool_keys: Vec<(Id, Id, u32)> = vec![(Id::NULL, Id::NULL, 0)];
    for i in 1..ctx.target.nkeys() {
        let key = ctx.target.keys[i];
        let entry = if own_pool {
            let namestr = pool.id2str(key.name).to_string();
            let typstr = pool.id2str(key.typ.keyname()).to_string();
            let sizestr = if key.typ == KeyType::ConstantId {
                Some(pool.id2str(Id(key.size)).to_string())
            } else {
                None
            };
            let own = ctx.ownspool.as_mut().expect("own pool required");
            let name = own.intern(&namestr);
            let typ = own.intern(&typstr);
            let size = match sizestr {
                Some(s) => own.intern(&s).0,
                None => key.size,
            };
            (name, typ, size)
        } else {
            (key.name, key.typ.keyname(), key.size)
        };
        spool_keys.push(entry);
    }
    if let Some(own) = &ctx.ownspool {
        if own.len() > ctx.reloff {
            let hi = own.len() - 1;
            ctx.grow_needid(hi);
        }
    }

    for i in 1..ctx.target.nkeys() {
        let (name, typ, size) = spool_keys[i];
        ctx.needid[name.index()].need += 1;
        ctx.needid[typ.index()].need += 1;
        if ctx.target.keys[i].typ == KeyType::ConstantId {
            ctx.needid[size as usize].need += 1;
        }
    }

    /* propagate rel needs so children renumber before their parents */
    {
        let reloff = ctx.reloff;
        for i in (1..pool.nrels()).rev() {
            let need = ctx.needid[reloff + i].need;
            if need == 0 {
                continue;
            }
            let rd = *pool.rels.get_index(i);
            for part in [rd.name, rd.evr] {
                if part.is_rel() {
                    let idx = reloff + part.rel_index();
                    if ctx.needid[idx].need < need + 1 {
                        ctx.needid[idx].need = need + 1;
                    }
                } else {
                    let mut idx = part.index();
                    if ctx.ownspool.is_some() && part.0 > 1 && !ctx.clonepool {
                        let s = pool.ss.id2str(part).to_string();
                        let own = ctx.ownspool.as_mut().unwrap();
                        let nid = own.intern(&s);
                        if nid.index() >= ctx.reloff {
                            ctx.grow_needid(nid.index());
                        }
                        idx = nid.index();
                    }
                    ctx.needid[idx].need += 1;
                }
            }
        }
    }

    /* count used dir components */
    let own_dirs = ctx.owndirpool.is_some();
    if own_dirs {
        let dp = ctx.owndirpool.take().unwrap();
        for i in 1..dp.len() {
            let id = dp.compid(DirId(i as u32));
            if id.0 > 0 {
                ctx.needid[id.index()].need += 1;
            }
        }
        ctx.owndirpool = Some(dp);
    } else if let DirUsage::Single(j) = dirusage {
        if !ctx.dirused.is_empty() {
            let d = repo.data(j);
            let dp = d.dirpool();
            for i in (1..dp.len()).rev() {
                if ctx.dirused[i] == 0 {
                    continue;
                }
                let parent = dp.parent(DirId(i as u32));
                ctx.dirused[parent.0 as usize] = 2;
                let id = dp.compid(DirId(i as u32));
                if id.0 == 0 {
                    continue;
                }
                let idx = if ctx.ownspool.is_some() && id.0 > 1 {
                    ctx.putinownpool(d, id).index()
                } else {
                    id.index()
                };
                ctx.needid[idx].need += 1;
            }
            if ctx.dirused[0] == 0 {
                ctx.dirused = Vec::new();
                dirusage = DirUsage::None;
            }
        }
    }

    /* renumber strings and rels by use count */
    let reloff = ctx.reloff;
    let mut needid = std::mem::take(&mut ctx.needid);
    let (nstrings, nrels, sizeid) = {
        let spool_out: &StringPool = ctx.ownspool.as_ref().unwrap_or(&pool.ss);
        needid[0] = NeedId { need: 0, map: 0 };
        needid[reloff] = NeedId { need: 0, map: 0 };
        for (i, ni) in needid.iter_mut().enumerate() {
            ni.map = i as u32;
        }
        needid[1].need = 1; // the empty string is pinned first
        let avail = spool_out.len().min(reloff);
        if avail > 2 {
            needid[2..avail].sort_by(|a, b| {
                b.need.cmp(&a.need).then_with(|| {
                    spool_out
                        .id2bytes(Id(a.map))
                        .cmp(spool_out.id2bytes(Id(b.map)))
                })
            });
        }
        needid[reloff..].sort_by(|a, b| b.need.cmp(&a.need).then_with(|| a.map.cmp(&b.map)));

        let mut sizeid: u64 = 0;
        let mut nstrings = 1usize;
        for i in 1..avail {
            if needid[i].need == 0 {
                break;
            }
            needid[i].need = 0;
            sizeid += spool_out.id2bytes(Id(needid[i].map)).len() as u64 + 1;
            nstrings = i + 1;
        }
        let remaps: Vec<(usize, u32)> = (1..nstrings).map(|i| (i, needid[i].map)).collect();
        for (newid, oldid) in remaps {
            needid[oldid as usize].need = newid as u32;
        }
        let mut nrels = 0usize;
        for i in 0..pool.nrels() {
            if needid[reloff + i].need == 0 {
                break;
            }
            needid[reloff + i].need = 0;
            nrels = i + 1;
        }
        let relmaps: Vec<(usize, u32)> =
            (0..nrels).map(|i| (i, needid[reloff + i].map)).collect();
        for (newrel, oldidx) in relmaps {
            needid[oldidx as usize].need = (nstrings + newrel) as u32;
        }
        (nstrings, nrels, sizeid)
    };
    ctx.needid = needid;

    /* build the dir map: parents before children, siblings contiguous */
    let mut dirmap: Vec<i64> = Vec::new();
    if own_dirs {
        let dp = ctx.owndirpool.take().unwrap();
        if !dp.is_empty() {
            dirmap.push(0);
            traverse_dirs(&dp, &mut dirmap, dp.child(DirId::NULL), None);
            ctx.dirused = vec![0u32; dp.len()];
            for i in 1..dirmap.len() {
                if dirmap[i] <= 0 {
                    continue;
                }
                let old = dirmap[i] as usize;
                ctx.dirused[old] = i as u32;
                let comp = dp.compid(DirId(old as u32));
                dirmap[i] = ctx.needid[comp.index()].need as i64;
            }
        }
        ctx.owndirpool = Some(dp);
    } else if let DirUsage::Single(j) = dirusage {
        let d = repo.data(j);
        let dp = d.dirpool();
        if !dp.is_empty() && !ctx.dirused.is_empty() {
            if ctx.dirused[1] == 0 {
                ctx.dirused[1] = 1; // always map the root entry
                ctx.dirused[0] = 2;
            } else {
                ctx.dirused[0] = 2;
            }
            dirmap.push(0);
            traverse_dirs(dp, &mut dirmap, dp.child(DirId::NULL), Some(&ctx.dirused[..]));
            ctx.dirused = vec![0u32; dp.len()];
            for i in 1..dirmap.len() {
                if dirmap[i] <= 0 {
                    continue;
                }
                let old = dirmap[i] as usize;
                ctx.dirused[old] = i as u32;
                let comp = dp.compid(DirId(old as u32));
                let idx = if ctx.ownspool.is_some() && comp.0 > 1 {
                    let s = if d.is_localpool() {
                        d.spool.id2str(comp)
                    } else {
                        pool.ss.id2str(comp)
                    };
                    ctx.ownspool.as_ref().unwrap().find(s).index()
                } else {
                    comp.index()
                };
                dirmap[i] = ctx.needid[idx].need as i64;
            }
        }
    }
    let ndirmap = dirmap.len();

    /* pass 2: encode everything with the new numbering */
    let nkeys = ctx.target.nkeys();
    ctx.extdata = vec![Vec::new(); nkeys + 1];
    ctx.current_sub = 0;
    ctx.lastlen = 0;
    data::push_id(&mut ctx.extdata[0], mainschema);

    let keyskip = keyskip_for_write(repo, SOLVID_META, &repodataused);
    for (j, d) in repo.repodata_iter().enumerate() {
        if !repodataused[j] {
            continue;
        }
        ctx.active_keymap = keymapstart[j];
        ctx.active_dataid = j;
        let cb = &mut |dd: &Repodata, ki: usize, kv: &KeyValue<'_>| ctx.collect_data(dd, ki, kv);
        d.search_keyskip(SOLVID_META, Id::NULL, searchflags, keyskip.as_ref(), cb);
    }
    if ctx.extdata[0].len() - ctx.lastlen > ctx.maxdata {
        ctx.maxdata = ctx.extdata[0].len() - ctx.lastlen;
    }
    ctx.lastlen = ctx.extdata[0].len();

    if anysolvableused {
        data::push_id(&mut ctx.extdata[0], nsolvables as u32);
        ctx.doingsolvables = true;
        for (i, &solvid) in solvids.iter().enumerate() {
            data::push_id(&mut ctx.extdata[0], solvschemata[i]);
            let s = pool.solvables[solvid as usize];
            ctx.collect_data_solvable(&s, repo, solvid as usize - repo.start, use_block, nkeys);
            let keyskip = keyskip_for_write(repo, solvid, &repodataused);
            ctx.vstart = -1;
            for (j, d) in repo.repodata_iter().enumerate() {
                if !repodataused[j] || solvid < d.start() || solvid >= d.end() {
                    continue;
                }
                ctx.active_keymap = keymapstart[j];
                ctx.active_dataid = j;
                let cb = &mut |dd: &Repodata, ki: usize, kv: &KeyValue<'_>| {
                    ctx.collect_data(dd, ki, kv)
                };
                d.search_keyskip(solvid, Id::NULL, searchflags, keyskip.as_ref(), cb);
            }
            if ctx.extdata[0].len() - ctx.lastlen > ctx.maxdata {
                ctx.maxdata = ctx.extdata[0].len() - ctx.lastlen;
            }
            ctx.lastlen = ctx.extdata[0].len();
        }
        ctx.doingsolvables = false;
    }
    debug_assert_eq!(ctx.current_sub, ctx.subschemata.len());

    /* emit */
    let empty_file = nkeys <= 1 && !anysolvableused;
    let mut out = Out { w: outw };
    let mut solv_flags = SOLV_FLAG_PREFIX_POOL | SOLV_FLAG_SIZE_BYTES;
    if !writer.userdata.is_empty() {
        solv_flags |= SOLV_FLAG_USERDATA;
    }
    if !ctx.extdata[nkeys].is_empty() {
        solv_flags |= SOLV_FLAG_IDARRAYBLOCK;
    }

    let out_nstrings = if empty_file { 0 } else { nstrings };
    let out_nkeys = if empty_file { 0 } else { nkeys };
    let out_nschemata = if empty_file { 0 } else { ctx.target.nschemata() };

    out.u32(u32::from_be_bytes(*b"SOLV"))?;
    if solv_flags & (SOLV_FLAG_USERDATA | SOLV_FLAG_IDARRAYBLOCK) != 0 {
        out.u32(SOLV_VERSION_9)?;
    } else {
        out.u32(SOLV_VERSION_8)?;
    }
    out.u32(out_nstrings as u32)?;
    out.u32(nrels as u32)?;
    out.u32(ndirmap as u32)?;
    out.u32(if anysolvableused { nsolvables as u32 } else { 0 })?;
    out.u32(out_nkeys as u32)?;
    out.u32(out_nschemata as u32)?;
    out.u32(solv_flags)?;

    if solv_flags & SOLV_FLAG_USERDATA != 0 {
        out.u32(writer.userdata.len() as u32)?;
        out.blob(&writer.userdata)?;
    }

    /* prefix-compressed strings */
    if out_nstrings > 0 {
        let spool_out: &StringPool = ctx.ownspool.as_ref().unwrap_or(&pool.ss);
        let mut compsum: u64 = 0;
        let mut prefixcomp = vec![0u8; nstrings];
        let mut old: &[u8] = b"";
        for i in 1..nstrings {
            let s = spool_out.id2bytes(Id(ctx.needid[i].map));
            let mut same = 0usize;
            while same < 255 && same < old.len() && same < s.len() && old[same] == s[same] {
                same += 1;
            }
            prefixcomp[i] = same.min(254) as u8;
            compsum += prefixcomp[i] as u64;
            old = s;
        }
        out.u32(sizeid as u32)?;
        out.u32((sizeid + nstrings as u64 - 1 - compsum) as u32)?;
        for i in 1..nstrings {
            let s = spool_out.id2bytes(Id(ctx.needid[i].map));
            out.u8(prefixcomp[i])?;
            out.str0(&s[prefixcomp[i] as usize..])?;
        }
    } else {
        out.u32(0)?;
        out.u32(0)?;
    }

    /* rels */
    for i in 0..nrels {
        let relidx = (ctx.needid[reloff + i].map as usize) - reloff;
        let rd = *pool.rels.get_index(relidx);
        out.id(ctx.needid[ctx.strid_index(rd.name)].need)?;
        out.id(ctx.needid[ctx.strid_index(rd.evr)].need)?;
        out.u8(rd.flags as u8)?;
    }

    /* dirs; rows 0 (sentinel) and 1 (root) are implied */
    for i in 2..ndirmap {
        if dirmap[i] > 0 {
            out.id(dirmap[i] as u32)?;
        } else {
            out.id((nstrings as i64 - dirmap[i]) as u32)?;
        }
    }

    /* keys */
    for i in 1..out_nkeys {
        let (name, typ, size) = spool_keys[i];
        out.id(ctx.needid[name.index()].need)?;
        out.id(ctx.needid[typ.index()].need)?;
        let key = ctx.target.keys[i];
        if key.storage == KeyStorage::VerticalOffset {
            out.id(ctx.vertical_len(i) as u32)?;
        } else if key.typ == KeyType::ConstantId {
            out.id(ctx.needid[size as usize].need)?;
        } else {
            out.id(size)?;
        }
        out.id(key.storage.to_wire())?;
    }

    /* schemata */
    if out_nschemata > 0 {
        out.id(ctx.target.schemadata.len() as u32)?;
        for i in 1..ctx.target.nschemata() {
            out.idarray(ctx.target.schema_keys(i as u32))?;
        }
    } else {
        out.id(0)?;
    }

    /* id-array block */
    if solv_flags & SOLV_FLAG_IDARRAYBLOCK != 0 {
        let blob = std::mem::take(&mut ctx.extdata[nkeys]);
        let mut cnt = 0u32;
        for &b in &blob {
            if b & 0x80 == 0 {
                cnt += if b & 0x40 != 0 { 1 } else { 2 };
            }
        }
        out.id(cnt)?;
        out.compressed_blob(&blob)?;
    }

    /* incore data */
    out.id(ctx.maxdata as u32)?;
    out.id(ctx.extdata[0].len() as u32)?;
    if !ctx.extdata[0].is_empty() {
        let blob = std::mem::take(&mut ctx.extdata[0]);
        out.blob(&blob)?;
    }

    /* vertical data, paged and compressed */
    let have_vertical = (1..nkeys).any(|i| ctx.vertical_len(i) != 0);
    if have_vertical {
        let mut vpage = vec![0u8; PAGE_SIZE];
        let mut lpage = 0usize;
        out.u32(PAGE_SIZE as u32)?;
        if ctx.filelistmode == 0 {
            for i in 1..nkeys {
                if !ctx.extdata[i].is_empty() {
                    let xd = std::mem::take(&mut ctx.extdata[i]);
                    lpage = write_compressed_extdata(&mut out, &xd, &mut vpage, lpage)?;
                }
            }
        } else {
            /* third pass: emit only the filelist bytes, flushing in chunks
             * so peak memory stays bounded by one filelist */
            let fl = ctx.filelistmode;
            ctx.extdata[fl].clear();
            let keyskip = keyskip_for_write(repo, SOLVID_META, &repodataused);
            for (j, d) in repo.repodata_iter().enumerate() {
                if !repodataused[j] {
                    continue;
                }
                ctx.active_keymap = keymapstart[j];
                ctx.active_dataid = j;
                let cb = &mut |dd: &Repodata, ki: usize, kv: &KeyValue<'_>| {
                    ctx.collect_filelist(dd, ki, kv)
                };
                d.search_keyskip(SOLVID_META, Id::NULL, searchflags, keyskip.as_ref(), cb);
            }
            for &solvid in &solvids {
                let keyskip = keyskip_for_write(repo, solvid, &repodataused);
                for (j, d) in repo.repodata_iter().enumerate() {
                    if !repodataused[j] || solvid < d.start() || solvid >= d.end() {
                        continue;
                    }
                    ctx.active_keymap = keymapstart[j];
                    ctx.active_dataid = j;
                    let cb = &mut |dd: &Repodata, ki: usize, kv: &KeyValue<'_>| {
                        ctx.collect_filelist(dd, ki, kv)
                    };
                    d.search_keyskip(solvid, Id::NULL, searchflags, keyskip.as_ref(), cb);
                }
                if ctx.extdata[fl].len() > 1024 * 1024 {
                    let xd = std::mem::take(&mut ctx.extdata[fl]);
                    lpage = write_compressed_extdata(&mut out, &xd, &mut vpage, lpage)?;
                }
            }
            if !ctx.extdata[fl].is_empty() {
                let xd = std::mem::take(&mut ctx.extdata[fl]);
                lpage = write_compressed_extdata(&mut out, &xd, &mut vpage, lpage)?;
            }
        }
        if lpage > 0 {
            out.compressed_page(&vpage[..lpage])?;
        }
    }

    debug!(
        nstrings = out_nstrings,
        nrels,
        ndirmap,
        nsolvables,
        nkeys = out_nkeys,
        maxdata = ctx.maxdata,
        "repo serialized"
    );
    Ok(())
}
