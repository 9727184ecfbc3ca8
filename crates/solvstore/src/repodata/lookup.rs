//! Lookup and search over internalized repodata.
//!
//! All cursors here are byte offsets into the incore blob; values of
//! vertical keys are copied out of the page store before decoding, so a
//! later page load cannot invalidate anything a caller still holds.

use std::borrow::Cow;

use crate::data;
use crate::id::{DirId, Id};
use crate::keys::{KeyStorage, KeyType, Repokey};
use crate::pagestore::PAGE_SIZE;
use crate::strpool::StringPool;

use super::{Repodata, RepodataState, SOLVID_META};

/* string match kinds, low nibble of the search flags */
pub const SEARCH_STRINGMASK: u32 = 15;
pub const SEARCH_STRING: u32 = 1;
pub const SEARCH_STRINGSTART: u32 = 2;
pub const SEARCH_STRINGEND: u32 = 3;
pub const SEARCH_SUBSTRING: u32 = 4;
pub const SEARCH_GLOB: u32 = 5;
pub const SEARCH_REGEX: u32 = 6;
pub const SEARCH_ERROR: u32 = 15;

pub const SEARCH_NOCASE: u32 = 1 << 7;
pub const SEARCH_NO_STORAGE_SOLVABLE: u32 = 1 << 8;
pub const SEARCH_SUB: u32 = 1 << 9;
pub const SEARCH_ARRAYSENTINEL: u32 = 1 << 10;
pub const SEARCH_KEEP_TYPE_DELETED: u32 = 1 << 12;
pub const SEARCH_FILES: u32 = 1 << 14;
pub const SEARCH_CHECKSUMS: u32 = 1 << 15;
pub const SEARCH_THISSOLVID: u32 = 1 << 31;

/// Callback verdict for [`Repodata::search`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SearchCb {
    Continue,
    NextKey,
    NextSolvable,
    Stop,
    /// Descend into the sub-structure the callback just saw.
    EnterSub,
}

/// One decoded value as handed to search callbacks. Array types yield one
/// `KeyValue` per element with `entry` counting up; `eof` is 1 on the last
/// element and 2 for the sentinel after it (when requested).
#[derive(Clone, Default)]
pub struct KeyValue<'a> {
    pub id: Id,
    pub num: u64,
    pub num2: u32,
    pub entry: i32,
    pub eof: u8,
    pub str_bytes: &'a [u8],
    /// Nesting depth; 0 for top-level values.
    pub depth: u32,
}

impl<'a> KeyValue<'a> {
    pub fn dirid(&self) -> DirId {
        DirId(self.id.0)
    }

    pub fn str_lossy(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.str_bytes)
    }
}

/// Which repodata stratum owns each keyname for one solvid; later strata
/// override earlier ones.
#[derive(Default)]
pub struct Keyskip {
    marks: Vec<u32>,
}

impl Keyskip {
    pub fn new() -> Self {
        Keyskip::default()
    }

    /// Record all keynames of `data`'s entry for `solvid` as owned by it.
    pub fn fill(&mut self, data: &Repodata, solvid: i32) {
        let Some((_, schemaid)) = data.solvid2data(solvid) else { return };
        for keyid in data.schema_keys(schemaid) {
            let keyname = data.keys[keyid.index()].name;
            if keyname.index() >= self.marks.len() {
                self.marks.resize(keyname.index() + 256, 0);
            }
            self.marks[keyname.index()] = data.repodataid as u32 + 1;
        }
    }

    /// True when `keyname` must be skipped in stratum `repodataid`.
    pub fn skip(&self, repodataid: usize, keyname: Id) -> bool {
        self.marks
            .get(keyname.index())
            .map_or(true, |&m| m != repodataid as u32 + 1)
    }
}

impl Repodata {
    /// Position of the entry data (after the schema varint) and the schema.
    pub(crate) fn solvid2data(&self, solvid: i32) -> Option<(usize, u32)> {
        if self.state == RepodataState::Error || self.incoredata.is_empty() {
            return None;
        }
        let off = if solvid == SOLVID_META {
            1
        } else {
            if solvid < self.start || solvid >= self.end {
                return None;
            }
            self.incoreoffset[(solvid - self.start) as usize] as usize
        };
        if off == 0 {
            return None;
        }
        let (schemaid, pos) = data::read_id(&self.incoredata, off).ok()?;
        if schemaid as usize >= self.schemata.len() {
            return None;
        }
        Some((pos, schemaid))
    }

    /// Skip the value of `key` at `pos`, following sub-schemas of array
    /// structures.
    pub(crate) fn skip_key_data(&self, buf: &[u8], pos: usize, key: &Repokey) -> Option<usize> {
        match key.typ {
            KeyType::FixArray => {
                let (nentries, mut pos) = data::read_id(buf, pos).ok()?;
                if nentries == 0 {
                    return Some(pos);
                }
                let (schema, npos) = data::read_id(buf, pos).ok()?;
                pos = npos;
                for _ in 0..nentries {
                    pos = self.skip_schema(buf, pos, schema)?;
                }
                Some(pos)
            }
            KeyType::FlexArray => {
                let (nentries, mut pos) = data::read_id(buf, pos).ok()?;
                for _ in 0..nentries {
                    let (schema, npos) = data::read_id(buf, pos).ok()?;
                    pos = self.skip_schema(buf, npos, schema)?;
                }
                Some(pos)
            }
            _ => match key.storage {
                KeyStorage::Incore => data::skip_type(buf, pos, key.typ).ok(),
                KeyStorage::VerticalOffset => {
                    let pos = data::skip_type(buf, pos, KeyType::Id).ok()?;
                    data::skip_type(buf, pos, KeyType::Id).ok()
                }
                _ => Some(pos),
            },
        }
    }

    fn skip_schema(&self, buf: &[u8], mut pos: usize, schemaid: u32) -> Option<usize> {
        if schemaid as usize >= self.schemata.len() {
            return None;
        }
        for keyid in self.schema_keys(schemaid).to_vec() {
            let key = self.keys[keyid.index()];
            pos = self.skip_key_data(buf, pos, &key)?;
        }
        Some(pos)
    }

    /// Advance from the start of an entry to the data of `target` (a key
    /// index within `schema_keys(schemaid)`).
    fn forward_to_key(
        &self,
        buf: &[u8],
        schemaid: u32,
        mut pos: usize,
        target: Id,
    ) -> Option<usize> {
        // the meta entry caches per-key offsets
        if schemaid == self.mainschema
            && !self.mainschemaoffsets.is_empty()
            && Some(&(pos as u32)) == self.mainschemaoffsets.first()
        {
            for (i, k) in self.schema_keys(schemaid).iter().enumerate() {
                if *k == target {
                    return Some(self.mainschemaoffsets[i] as usize);
                }
            }
            return None;
        }
        for keyid in self.schema_keys(schemaid).to_vec() {
            if keyid == target {
                return Some(pos);
            }
            let key = self.keys[keyid.index()];
            pos = self.skip_key_data(buf, pos, &key)?;
        }
        None
    }

    /// Bytes of a vertical value. In-memory values borrow `vincore`; paged
    /// values are copied out of the page store.
    pub(crate) fn vertical_bytes(&self, keyindex: usize, off: u32, len: u32) -> Option<Cow<'_, [u8]>> {
        if len == 0 {
            return None;
        }
        if off >= self.lastverticaloffset {
            let o = (off - self.lastverticaloffset) as usize;
            if o + len as usize > self.vincore.len() {
                return None;
            }
            return Some(Cow::Borrowed(&self.vincore[o..o + len as usize]));
        }
        let key = &self.keys[keyindex];
        if off + len > key.size {
            return None;
        }
        let goff = off as usize + self.verticaloffset.get(keyindex).copied().unwrap_or(0) as usize;
        let pstart = goff / PAGE_SIZE;
        let pend = (goff + len as usize - 1) / PAGE_SIZE;
        let mut store = self.store.borrow_mut();
        let region = store.load_page_range(pstart, pend).ok()?;
        self.storestate.set(self.storestate.get() + 1);
        let poff = goff % PAGE_SIZE;
        Some(Cow::Owned(region[poff..poff + len as usize].to_vec()))
    }

    /// The value bytes of the key at `pos` plus the position after it.
    /// Returns an empty region for VOID/CONSTANT-like keys.
    fn key_value_region<'a>(
        &'a self,
        buf: &'a [u8],
        keyindex: usize,
        pos: usize,
    ) -> Option<(Cow<'a, [u8]>, usize)> {
        let key = &self.keys[keyindex];
        match key.storage {
            KeyStorage::Incore => {
                let next = self.skip_key_data(buf, pos, key)?;
                Some((Cow::Borrowed(&buf[pos..next]), next))
            }
            KeyStorage::VerticalOffset => {
                let (off, p) = data::read_id(buf, pos).ok()?;
                let (len, next) = data::read_id(buf, p).ok()?;
                let region = self.vertical_bytes(keyindex, off, len)?;
                Some((region, next))
            }
            _ => None,
        }
    }

    fn find_keyid_in_schema(&self, schemaid: u32, keyname: Id) -> Option<Id> {
        self.schema_keys(schemaid)
            .iter()
            .find(|k| self.keys[k.index()].name == keyname)
            .copied()
    }

    /// Key index and value bytes for `(solvid, keyname)`.
    fn find_key_data(&self, solvid: i32, keyname: Id) -> Option<(usize, Cow<'_, [u8]>)> {
        if !self.precheck_keyname(keyname) {
            return None;
        }
        let (pos, schemaid) = self.solvid2data(solvid)?;
        let keyid = self.find_keyid_in_schema(schemaid, keyname)?;
        let key = &self.keys[keyid.index()];
        if key.typ == KeyType::Deleted {
            return None;
        }
        if matches!(
            key.typ,
            KeyType::Void | KeyType::Constant | KeyType::ConstantId
        ) {
            return Some((keyid.index(), Cow::Borrowed(&[][..])));
        }
        if !matches!(
            key.storage,
            KeyStorage::Incore | KeyStorage::VerticalOffset
        ) {
            return None;
        }
        let pos = self.forward_to_key(&self.incoredata, schemaid, pos, keyid)?;
        let (region, _) = self.key_value_region(&self.incoredata, keyid.index(), pos)?;
        Some((keyid.index(), region))
    }

    /* ---------- lookup family ---------- */

    pub fn lookup_type(&self, solvid: i32, keyname: Id) -> Option<KeyType> {
        let (_, schemaid) = self.solvid2data(solvid)?;
        let keyid = self.find_keyid_in_schema(schemaid, keyname)?;
        Some(self.keys[keyid.index()].typ)
    }

    pub fn lookup_id(&self, solvid: i32, keyname: Id) -> Option<Id> {
        let (ki, region) = self.find_key_data(solvid, keyname)?;
        match self.keys[ki].typ {
            KeyType::ConstantId => Some(Id(self.keys[ki].size)),
            KeyType::Id => data::read_id(&region, 0).ok().map(|(v, _)| Id(v)),
            _ => None,
        }
    }

    pub fn lookup_str<'a>(&'a self, ss: &'a StringPool, solvid: i32, keyname: Id) -> Option<Cow<'a, str>> {
        let (ki, region) = self.find_key_data(solvid, keyname)?;
        match self.keys[ki].typ {
            KeyType::Str => match region {
                Cow::Borrowed(b) => {
                    let bytes = data::nul_str(b, 0).ok()?;
                    Some(String::from_utf8_lossy(bytes))
                }
                Cow::Owned(v) => {
                    let bytes = data::nul_str(&v, 0).ok()?;
                    Some(Cow::Owned(String::from_utf8_lossy(bytes).into_owned()))
                }
            },
            KeyType::ConstantId => Some(Cow::Borrowed(self.str_for_id(ss, Id(self.keys[ki].size)))),
            KeyType::Id => {
                let (v, _) = data::read_id(&region, 0).ok()?;
                Some(Cow::Borrowed(self.str_for_id(ss, Id(v))))
            }
            _ => None,
        }
    }

    pub fn lookup_num(&self, solvid: i32, keyname: Id) -> Option<u64> {
        let (ki, region) = self.find_key_data(solvid, keyname)?;
        match self.keys[ki].typ {
            KeyType::Num => data::read_num64(&region, 0).ok().map(|(v, _)| v),
            KeyType::U32 => data::read_u32(&region, 0).ok().map(|(v, _)| v as u64),
            KeyType::Constant => Some(self.keys[ki].size as u64),
            _ => None,
        }
    }

    pub fn lookup_void(&self, solvid: i32, keyname: Id) -> bool {
        self.lookup_type(solvid, keyname) == Some(KeyType::Void)
    }

    pub fn lookup_bin_checksum(&self, solvid: i32, keyname: Id) -> Option<(KeyType, Cow<'_, [u8]>)> {
        let (ki, region) = self.find_key_data(solvid, keyname)?;
        let typ = self.keys[ki].typ;
        let l = typ.checksum_len()?;
        if region.len() < l {
            return None;
        }
        Some((
            typ,
            match region {
                Cow::Borrowed(b) => Cow::Borrowed(&b[..l]),
                Cow::Owned(mut v) => {
                    v.truncate(l);
                    Cow::Owned(v)
                }
            },
        ))
    }

    /// Checksum as a hex string.
    pub fn lookup_checksum(&self, solvid: i32, keyname: Id) -> Option<(KeyType, String)> {
        let (typ, bytes) = self.lookup_bin_checksum(solvid, keyname)?;
        Some((typ, hex::encode(bytes)))
    }

    pub fn lookup_idarray(&self, solvid: i32, keyname: Id) -> Option<Vec<Id>> {
        let (ki, region) = self.find_key_data(solvid, keyname)?;
        match self.keys[ki].typ {
            KeyType::ConstantId => Some(vec![Id(self.keys[ki].size)]),
            KeyType::Id => {
                let (v, _) = data::read_id(&region, 0).ok()?;
                Some(vec![Id(v)])
            }
            KeyType::IdArray | KeyType::RelIdArray => {
                let mut out = Vec::new();
                let mut pos = 0;
                loop {
                    let (v, eof, next) = data::read_ideof(&region, pos).ok()?;
                    out.push(Id(v));
                    if eof {
                        break;
                    }
                    pos = next;
                }
                Some(out)
            }
            _ => None,
        }
    }

    pub fn lookup_binary(&self, solvid: i32, keyname: Id) -> Option<Cow<'_, [u8]>> {
        let (ki, region) = self.find_key_data(solvid, keyname)?;
        if self.keys[ki].typ != KeyType::Binary {
            return None;
        }
        let (len, pos) = data::read_id(&region, 0).ok()?;
        let end = pos + len as usize;
        if end > region.len() {
            return None;
        }
        Some(match region {
            Cow::Borrowed(b) => Cow::Borrowed(&b[pos..end]),
            Cow::Owned(v) => Cow::Owned(v[pos..end].to_vec()),
        })
    }

    /// Number of elements in an array-valued key, 1 for scalars.
    pub fn lookup_count(&self, solvid: i32, keyname: Id) -> u32 {
        let Some((ki, region)) = self.find_key_data(solvid, keyname) else {
            return 0;
        };
        let buf: &[u8] = &region;
        match self.keys[ki].typ {
            KeyType::IdArray | KeyType::RelIdArray => {
                let mut cnt = 1;
                for &b in buf {
                    if b & 0xc0 == 0x40 {
                        cnt += 1;
                    }
                    if b & 0xc0 == 0 {
                        break;
                    }
                }
                cnt
            }
            KeyType::FixArray | KeyType::FlexArray => {
                data::read_id(buf, 0).map(|(v, _)| v).unwrap_or(0)
            }
            KeyType::DirStrArray => {
                let mut cnt = 0;
                let mut pos = 0;
                loop {
                    cnt += 1;
                    let Ok((_, eof, next)) = data::read_ideof(buf, pos) else {
                        return cnt;
                    };
                    let Ok(next) = data::skip_nul_str(buf, next) else {
                        return cnt;
                    };
                    if eof {
                        return cnt;
                    }
                    pos = next;
                }
            }
            KeyType::DirNumNumArray => {
                let mut cnt = 0;
                let mut pos = 0;
                loop {
                    cnt += 1;
                    let step = data::read_id(buf, pos)
                        .and_then(|(_, p)| data::read_id(buf, p))
                        .and_then(|(_, p)| data::read_ideof(buf, p));
                    match step {
                        Ok((_, eof, next)) => {
                            if eof {
                                return cnt;
                            }
                            pos = next;
                        }
                        Err(_) => return cnt,
                    }
                }
            }
            _ => 1,
        }
    }

    /// Raw packed bytes of a DIRSTRARRAY value, for bulk file-provides
    /// consumers. Wrong-typed keys yield the canonical empty entry.
    pub fn lookup_packed_dirstrarray(&self, solvid: i32, keyname: Id) -> Option<Cow<'_, [u8]>> {
        const WRONGTYPE: [u8; 2] = [0, 0];
        let (pos, schemaid) = self.solvid2data(solvid)?;
        let keyid = self.find_keyid_in_schema(schemaid, keyname)?;
        if self.keys[keyid.index()].typ != KeyType::DirStrArray {
            return Some(Cow::Borrowed(&WRONGTYPE[..]));
        }
        let pos = self.forward_to_key(&self.incoredata, schemaid, pos, keyid)?;
        let (region, _) = self.key_value_region(&self.incoredata, keyid.index(), pos)?;
        Some(region)
    }

    /// All elements of a DIRSTRARRAY stringified to full paths.
    pub fn lookup_dirstrarray_strings(
        &self,
        ss: &StringPool,
        solvid: i32,
        keyname: Id,
    ) -> Vec<String> {
        let mut out = Vec::new();
        let Some(packed) = self.lookup_packed_dirstrarray(solvid, keyname) else {
            return out;
        };
        let buf: &[u8] = &packed;
        let mut pos = 0;
        loop {
            let Ok((dir, eof, next)) = data::read_ideof(buf, pos) else { break };
            let Ok(name) = data::nul_str(buf, next) else { break };
            let base = String::from_utf8_lossy(name);
            out.push(self.dir2str(ss, DirId(dir), Some(&base)));
            let Ok(next) = data::skip_nul_str(buf, next) else { break };
            if eof {
                break;
            }
            pos = next;
        }
        out
    }

    /* ---------- search ---------- */

    /// Walk the entry's schema and report each `(key, value)` to the
    /// callback. `keyname` restricts to one key; SEARCH_SUB descends into
    /// array sub-structures, SEARCH_ARRAYSENTINEL reports an `eof == 2`
    /// value after the last array element.
    pub fn search(
        &self,
        solvid: i32,
        keyname: Id,
        flags: u32,
        callback: &mut dyn FnMut(&Repodata, usize, &KeyValue<'_>) -> SearchCb,
    ) {
        self.search_keyskip(solvid, keyname, flags, None, callback);
    }

    pub fn search_keyskip(
        &self,
        solvid: i32,
        keyname: Id,
        flags: u32,
        keyskip: Option<&Keyskip>,
        callback: &mut dyn FnMut(&Repodata, usize, &KeyValue<'_>) -> SearchCb,
    ) {
        if !keyname.is_null() && !self.precheck_keyname(keyname) {
            return;
        }
        let Some((pos, schemaid)) = self.solvid2data(solvid) else {
            return;
        };
        self.search_schema(pos, schemaid, keyname, flags, keyskip, 0, callback);
    }

    #[allow(clippy::too_many_arguments)]
    fn search_schema(
        &self,
        mut pos: usize,
        schemaid: u32,
        keyname: Id,
        flags: u32,
        keyskip: Option<&Keyskip>,
        depth: u32,
        callback: &mut dyn FnMut(&Repodata, usize, &KeyValue<'_>) -> SearchCb,
    ) -> SearchCb {
        let buf = &self.incoredata;
        let schema = self.schema_keys(schemaid).to_vec();
        let mut onekey = false;
        let mut start = 0usize;
        if !keyname.is_null() {
            let Some(idx) = schema
                .iter()
                .position(|k| self.keys[k.index()].name == keyname)
            else {
                return SearchCb::Continue;
            };
            let Some(p) = self.forward_to_key(buf, schemaid, pos, schema[idx]) else {
                return SearchCb::Continue;
            };
            pos = p;
            start = idx;
            onekey = true;
        }

        for keyid in &schema[start..] {
            let ki = keyid.index();
            let key = self.keys[ki];

            let skip_this = keyskip.is_some_and(|ks| ks.skip(self.repodataid, key.name))
                || (key.typ == KeyType::Deleted && flags & SEARCH_KEEP_TYPE_DELETED == 0);

            if matches!(key.typ, KeyType::FixArray | KeyType::FlexArray) {
                let arrpos = pos;
                let Some(next) = self.skip_key_data(buf, pos, &key) else {
                    return SearchCb::Stop;
                };
                pos = next;
                if !skip_this {
                    let stop =
                        self.search_array(arrpos, ki, keyname, flags, depth, callback);
                    match stop {
                        SearchCb::Continue | SearchCb::NextKey => {}
                        other => return other,
                    }
                }
                if onekey {
                    return SearchCb::Continue;
                }
                continue;
            }

            // constant-like keys have no bytes to fetch from
            if matches!(
                key.typ,
                KeyType::Void | KeyType::Constant | KeyType::ConstantId
            ) {
                if !skip_this {
                    let mut kv = KeyValue {
                        depth,
                        eof: 1,
                        ..Default::default()
                    };
                    match key.typ {
                        KeyType::Constant => kv.num = key.size as u64,
                        KeyType::ConstantId => kv.id = Id(key.size),
                        _ => {}
                    }
                    match callback(self, ki, &kv) {
                        SearchCb::Continue | SearchCb::NextKey | SearchCb::EnterSub => {}
                        other => return other,
                    }
                }
                if onekey {
                    return SearchCb::Continue;
                }
                continue;
            }

            let Some((region, next)) = self.key_value_region(buf, ki, pos) else {
                // vertical data missing or unreadable, skip the key
                let Some(next) = self.skip_key_data(buf, pos, &key) else {
                    return SearchCb::Stop;
                };
                pos = next;
                if onekey {
                    return SearchCb::Continue;
                }
                continue;
            };
            pos = next;
            if skip_this {
                if onekey {
                    return SearchCb::Continue;
                }
                continue;
            }

            let vbuf: &[u8] = &region;
            let mut vpos = 0usize;
            let mut entry = 0i32;
            loop {
                let mut kv = KeyValue {
                    entry,
                    depth,
                    ..Default::default()
                };
                let Some(np) = fetch_value(vbuf, vpos, &key, &mut kv) else {
                    break;
                };
                vpos = np;
                let stop = callback(self, ki, &kv);
                match stop {
                    SearchCb::Continue | SearchCb::EnterSub => {}
                    SearchCb::NextKey => break,
                    other => return other,
                }
                if kv.eof != 0 {
                    break;
                }
                entry += 1;
            }
            if onekey {
                return SearchCb::Continue;
            }
        }
        SearchCb::Continue
    }

    /// Iterate a fixarray/flexarray value at `pos`, reporting one KeyValue
    /// per element (id = sub-schema, str = element data) and recursing when
    /// SEARCH_SUB is set or the callback asks to enter.
    fn search_array(
        &self,
        pos: usize,
        keyindex: usize,
        keyname: Id,
        flags: u32,
        depth: u32,
        callback: &mut dyn FnMut(&Repodata, usize, &KeyValue<'_>) -> SearchCb,
    ) -> SearchCb {
        let buf = &self.incoredata;
        let key = self.keys[keyindex];
        let Ok((num, mut pos)) = data::read_id(buf, pos) else {
            return SearchCb::Stop;
        };
        let mut schema = 0u32;
        if num > 0 && key.typ == KeyType::FixArray {
            let Ok((s, np)) = data::read_id(buf, pos) else {
                return SearchCb::Stop;
            };
            schema = s;
            pos = np;
        }
        for entry in 0..num {
            if key.typ == KeyType::FlexArray {
                let Ok((s, np)) = data::read_id(buf, pos) else {
                    return SearchCb::Stop;
                };
                schema = s;
                pos = np;
            }
            let kv = KeyValue {
                id: Id(schema),
                num: num as u64,
                entry: entry as i32,
                eof: if entry + 1 == num { 1 } else { 0 },
                depth,
                ..Default::default()
            };
            let stop = callback(self, keyindex, &kv);
            match stop {
                SearchCb::Continue | SearchCb::NextKey | SearchCb::EnterSub => {}
                other => return other,
            }
            if flags & SEARCH_SUB != 0 || stop == SearchCb::EnterSub {
                let sub = self.search_schema(
                    pos,
                    schema,
                    keyname_for_sub(keyname),
                    flags,
                    None,
                    depth + 1,
                    callback,
                );
                match sub {
                    SearchCb::Continue | SearchCb::NextKey => {}
                    other => return other,
                }
            }
            let Some(np) = self.skip_schema(buf, pos, schema) else {
                return SearchCb::Stop;
            };
            pos = np;
        }
        if flags & SEARCH_ARRAYSENTINEL != 0 {
            let kv = KeyValue {
                num: num as u64,
                entry: num as i32,
                eof: 2,
                depth,
                ..Default::default()
            };
            return callback(self, keyindex, &kv);
        }
        SearchCb::Continue
    }
}

fn keyname_for_sub(_outer: Id) -> Id {
    // sub-structures are walked completely; keyname filtering applies to
    // the outer level only
    Id::NULL
}

/// Decode one value (or array element) of `key` at `pos` in `buf`.
/// Returns the next position; `kv.eof` is set on the last element.
pub(crate) fn fetch_value<'a>(
    buf: &'a [u8],
    pos: usize,
    key: &Repokey,
    kv: &mut KeyValue<'a>,
) -> Option<usize> {
    kv.eof = 1;
    match key.typ {
        KeyType::Void => Some(pos),
        KeyType::Constant => {
            kv.num = key.size as u64;
            Some(pos)
        }
        KeyType::ConstantId => {
            kv.id = Id(key.size);
            Some(pos)
        }
        KeyType::Str => {
            let s = data::nul_str(buf, pos).ok()?;
            kv.str_bytes = s;
            Some(pos + s.len() + 1)
        }
        KeyType::Id | KeyType::Dir => {
            let (v, np) = data::read_id(buf, pos).ok()?;
            kv.id = Id(v);
            Some(np)
        }
        KeyType::Num => {
            let (v, np) = data::read_num64(buf, pos).ok()?;
            kv.num = v;
            Some(np)
        }
        KeyType::U32 => {
            let (v, np) = data::read_u32(buf, pos).ok()?;
            kv.num = v as u64;
            Some(np)
        }
        KeyType::Binary => {
            let (len, np) = data::read_id(buf, pos).ok()?;
            let end = np + len as usize;
            if end > buf.len() {
                return None;
            }
            kv.str_bytes = &buf[np..end];
            kv.num = len as u64;
            Some(end)
        }
        KeyType::IdArray | KeyType::RelIdArray => {
            let (v, eof, np) = data::read_ideof(buf, pos).ok()?;
            kv.id = Id(v);
            kv.eof = if eof { 1 } else { 0 };
            Some(np)
        }
        KeyType::DirStrArray => {
            let (v, eof, np) = data::read_ideof(buf, pos).ok()?;
            kv.id = Id(v);
            kv.eof = if eof { 1 } else { 0 };
            let s = data::nul_str(buf, np).ok()?;
            kv.str_bytes = s;
            Some(np + s.len() + 1)
        }
        KeyType::DirNumNumArray => {
            let (d, np) = data::read_id(buf, pos).ok()?;
            let (n1, np) = data::read_id(buf, np).ok()?;
            let (n2, eof, np) = data::read_ideof(buf, np).ok()?;
            kv.id = Id(d);
            kv.num = n1 as u64;
            kv.num2 = n2;
            kv.eof = if eof { 1 } else { 0 };
            Some(np)
        }
        t if t.is_checksum() => {
            let l = t.checksum_len().unwrap();
            if pos + l > buf.len() {
                return None;
            }
            kv.str_bytes = &buf[pos..pos + l];
            Some(pos + l)
        }
        _ => None,
    }
}
