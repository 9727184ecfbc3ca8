//! `.solv` parsing, the inverse of the writer.
//!
//! The file is parsed into detached structures first and committed to the
//! pool only when everything checked out, so a malformed file never leaves
//! partial state behind. File-local ids are remapped to pool-global ids by
//! re-interning the string table; directory ids stay file-local because the
//! dir pool belongs to the created repodata.
//!
//! With a seekable file the vertical data section is not read at all;
//! its page table is handed to the page store for on-demand loading.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

use tracing::debug;

use crate::codec;
use crate::data;
use crate::dirpool::DirPool;
use crate::error::{Result, SolvError};
use crate::id::{
    DirId, Id, RepoId, REPOSITORY_SOLVABLES, RPM_RPMDBID, SOLVABLE_ARCH, SOLVABLE_EVR,
    SOLVABLE_FILEMARKER, SOLVABLE_NAME, SOLVABLE_PREREQMARKER, SOLVABLE_PROVIDES,
    SOLVABLE_REQUIRES, SOLVABLE_VENDOR,
};
use crate::keys::{KeyStorage, KeyType, Repokey};
use crate::pool::Pool;
use crate::repodata::Repodata;
use crate::solvable::DEP_KEYS;
use crate::write::{
    SOLV_FLAG_IDARRAYBLOCK, SOLV_FLAG_PREFIX_POOL, SOLV_FLAG_USERDATA, SOLV_VERSION_8,
    SOLV_VERSION_9,
};

/// Read a `.solv` file with on-demand paging of the vertical data. The
/// store keeps its own handle to the file.
pub fn add_solv_file(pool: &mut Pool, rid: RepoId, f: File) -> Result<usize> {
    let mut br = BufReader::new(f);
    let parsed = match parse(pool, &mut br) {
        Ok(p) => p,
        Err(e) => {
            pool.set_last_error(format!("solv read failed: {e}"));
            return Err(e);
        }
    };
    let dataid = commit(pool, rid, parsed);
    let vertical_total = {
        let data = pool.repo(rid).data(dataid);
        data.lastverticaloffset
    };
    if vertical_total > 0 {
        let r = (|| -> Result<()> {
            let pos = br.stream_position()?;
            let mut f = br.into_inner();
            f.seek(SeekFrom::Start(pos))?;
            let mut hdr = [0u8; 4];
            f.read_exact(&mut hdr)?;
            let pagesz = u32::from_be_bytes(hdr);
            let repo = pool.repo_mut(rid);
            let data = repo.data_mut(dataid);
            data.store.get_mut().setup_pages(&mut f, pagesz, vertical_total)?;
            Ok(())
        })();
        if let Err(e) = r {
            pool.set_last_error(format!("solv read failed: {e}"));
            pool.repo_mut(rid).data_mut(dataid).set_error_state();
            return Err(e);
        }
    }
    Ok(dataid)
}

/// Read a `.solv` stream without seeking; the vertical data is decompressed
/// eagerly and paging stays disabled.
pub fn add_solv<R: Read>(pool: &mut Pool, rid: RepoId, r: &mut R) -> Result<usize> {
    let parsed = match parse(pool, r) {
        Ok(p) => p,
        Err(e) => {
            pool.set_last_error(format!("solv read failed: {e}"));
            return Err(e);
        }
    };
    let dataid = commit(pool, rid, parsed);
    let vertical_total = pool.repo(rid).data(dataid).lastverticaloffset;
    if vertical_total > 0 {
        let rr = (|| -> Result<()> {
            let mut hdr = [0u8; 4];
            r.read_exact(&mut hdr)?;
            let pagesz = u32::from_be_bytes(hdr);
            let repo = pool.repo_mut(rid);
            let data = repo.data_mut(dataid);
            data.store.get_mut().slurp_pages(r, pagesz, vertical_total)?;
            Ok(())
        })();
        if let Err(e) = rr {
            pool.set_last_error(format!("solv read failed: {e}"));
            pool.repo_mut(rid).data_mut(dataid).set_error_state();
            return Err(e);
        }
    }
    Ok(dataid)
}

/* ---------- streamed input primitives ---------- */

struct In<'r> {
    r: &'r mut dyn Read,
}

impl<'r> In<'r> {
    fn u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.r.read_exact(&mut b)?;
        Ok(b[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.r.read_exact(&mut b)?;
        Ok(u32::from_be_bytes(b))
    }

    fn id(&mut self) -> Result<u32> {
        let mut x: u32 = 0;
        for n in 0.. {
            let c = self.u8()?;
            if c & 0x80 == 0 {
                return Ok(x.wrapping_shl(7) | c as u32);
            }
            if n >= 4 {
                return Err(SolvError::VarintOverflow);
            }
            x = x.wrapping_shl(7) | (c & 0x7f) as u32;
        }
        unreachable!()
    }

    /// One element of a zero-terminated id sequence.
    fn ideof(&mut self) -> Result<(u32, bool)> {
        let mut x: u32 = 0;
        for n in 0.. {
            let c = self.u8()?;
            if c & 0x80 == 0 {
                return Ok((x.wrapping_shl(6) | (c & 0x3f) as u32, c & 0x40 == 0));
            }
            if n >= 4 {
                return Err(SolvError::VarintOverflow);
            }
            x = x.wrapping_shl(7) | (c & 0x7f) as u32;
        }
        unreachable!()
    }

    fn exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut v = vec![0u8; n];
        self.r.read_exact(&mut v)?;
        Ok(v)
    }
}

/* ---------- parsed file, pre-commit ---------- */

#[derive(Default, Clone)]
struct SolvRec {
    name: Id,
    arch: Id,
    evr: Id,
    vendor: Id,
    rpmdbid: Option<u32>,
    deps: [Vec<Id>; 8],
    schemaid: u32,
}

struct Parsed {
    userdata: Vec<u8>,
    keys: Vec<Repokey>,
    verticaloffset: Vec<u32>,
    lastverticaloffset: u32,
    schemata: Vec<u32>,
    schemadata: Vec<Id>,
    incoredata: Vec<u8>,
    entry_offsets: Vec<u32>,
    mainschema: u32,
    mainschemaoffsets: Vec<u32>,
    dirpool: DirPool,
    solvables: Vec<SolvRec>,
}

/* ---------- the parser ---------- */

struct Translator<'a> {
    keys: &'a [Repokey],
    schemata: &'a [u32],
    schemadata: &'a [Id],
    idmap: &'a [Id],
    src: &'a [u8],
    block: &'a [u8],
    block_pos: usize,
    block_last: u32,
}

impl<'a> Translator<'a> {
    fn schema_keys(&self, schemaid: u32) -> Result<&'a [Id]> {
        let start = *self
            .schemata
            .get(schemaid as usize)
            .ok_or(SolvError::Corrupt("schema id out of range"))? as usize;
        let end = self.schemadata[start..]
            .iter()
            .position(|id| id.is_null())
            .map(|n| start + n)
            .ok_or(SolvError::Corrupt("unterminated schema"))?;
        Ok(&self.schemadata[start..end])
    }

    fn map_id(&self, v: u32) -> Result<Id> {
        self.idmap
            .get(v as usize)
            .copied()
            .ok_or(SolvError::IdOutOfRange("incore data"))
    }

    /// Translate one incore value of `key` from `pos`, appending the
    /// re-encoded bytes to `dst`. Returns the position after the value.
    fn translate_key(&mut self, pos: usize, key: &Repokey, dst: &mut Vec<u8>) -> Result<usize> {
        let src = self.src;
        match key.storage {
            KeyStorage::VerticalOffset => {
                let (off, p) = data::read_id(src, pos)?;
                let (len, p) = data::read_id(src, p)?;
                data::push_id(dst, off);
                data::push_id(dst, len);
                return Ok(p);
            }
            KeyStorage::Incore => {}
            _ => return Ok(pos),
        }
        match key.typ {
            KeyType::Void | KeyType::Constant | KeyType::ConstantId | KeyType::Deleted => Ok(pos),
            KeyType::Id => {
                let (v, p) = data::read_id(src, pos)?;
                data::push_id(dst, self.map_id(v)?.0);
                Ok(p)
            }
            KeyType::Dir => {
                // dir ids stay file-local, the dirpool is ours
                let (v, p) = data::read_id(src, pos)?;
                data::push_id(dst, v);
                Ok(p)
            }
            KeyType::Num => {
                let (v, p) = data::read_num64(src, pos)?;
                data::push_num64(dst, v);
                Ok(p)
            }
            KeyType::U32 => {
                let (v, p) = data::read_u32(src, pos)?;
                dst.extend_from_slice(&v.to_be_bytes());
                Ok(p)
            }
            KeyType::Str => {
                let s = data::nul_str(src, pos)?;
                data::push_blob(dst, s);
                dst.push(0);
                Ok(pos + s.len() + 1)
            }
            KeyType::Binary => {
                let (len, p) = data::read_id(src, pos)?;
                let end = p + len as usize;
                if end > src.len() {
                    return Err(SolvError::Truncated("binary value"));
                }
                data::push_id(dst, len);
                dst.extend_from_slice(&src[p..end]);
                Ok(end)
            }
            KeyType::IdArray | KeyType::RelIdArray => {
                let mut p = pos;
                loop {
                    let (v, eof, np) = data::read_ideof(src, p)?;
                    data::push_ideof(dst, self.map_id(v)?.0, eof);
                    p = np;
                    if eof {
                        return Ok(p);
                    }
                }
            }
            KeyType::DirStrArray => {
                let mut p = pos;
                loop {
                    let (v, eof, np) = data::read_ideof(src, p)?;
                    data::push_ideof(dst, v, eof);
                    let s = data::nul_str(src, np)?;
                    dst.extend_from_slice(s);
                    dst.push(0);
                    p = np + s.len() + 1;
                    if eof {
                        return Ok(p);
                    }
                }
            }
            KeyType::DirNumNumArray => {
                let mut p = pos;
                loop {
                    let (d, np) = data::read_id(src, p)?;
                    let (n1, np) = data::read_id(src, np)?;
                    let (n2, eof, np) = data::read_ideof(src, np)?;
                    data::push_id(dst, d);
                    data::push_id(dst, n1);
                    data::push_ideof(dst, n2, eof);
                    p = np;
                    if eof {
                        return Ok(p);
                    }
                }
            }
            KeyType::FixArray => {
                let (num, mut p) = data::read_id(src, pos)?;
                data::push_id(dst, num);
                if num == 0 {
                    return Ok(p);
                }
                let (schema, np) = data::read_id(src, p)?;
                data::push_id(dst, schema);
                p = np;
                for _ in 0..num {
                    p = self.translate_schema(p, schema, dst)?;
                }
                Ok(p)
            }
            KeyType::FlexArray => {
                let (num, mut p) = data::read_id(src, pos)?;
                data::push_id(dst, num);
                for _ in 0..num {
                    let (schema, np) = data::read_id(src, p)?;
                    data::push_id(dst, schema);
                    p = self.translate_schema(np, schema, dst)?;
                }
                Ok(p)
            }
            t if t.is_checksum() => {
                let l = t.checksum_len().unwrap();
                if pos + l > src.len() {
                    return Err(SolvError::Truncated("checksum value"));
                }
                dst.extend_from_slice(&src[pos..pos + l]);
                Ok(pos + l)
            }
            _ => Err(SolvError::Corrupt("unhandled key type")),
        }
    }

    fn translate_schema(&mut self, mut pos: usize, schemaid: u32, dst: &mut Vec<u8>) -> Result<usize> {
        for keyid in self.schema_keys(schemaid)?.to_vec() {
            let key = self.keys[keyid.index()];
            pos = self.translate_key(pos, &key, dst)?;
        }
        Ok(pos)
    }

    /// Decode one dependency run of a solvable column.
    fn read_deps(&mut self, mut pos: usize, key: &Repokey, marker: Id) -> Result<(Vec<Id>, usize)> {
        let mut out = Vec::new();
        match key.storage {
            KeyStorage::Solvable => {
                if key.typ == KeyType::RelIdArray {
                    // delta coded; a difference of 0 restores the marker
                    let mut old = 0u32;
                    let mut first = true;
                    loop {
                        let (v, eof, np) = data::read_ideof(self.src, pos)?;
                        pos = np;
                        if v == 0 {
                            if first && eof {
                                return Ok((out, pos)); // empty list
                            }
                            out.push(marker);
                            old = 0;
                        } else {
                            let cur = old + v - 1;
                            old = cur;
                            out.push(self.map_id(cur)?);
                        }
                        first = false;
                        if eof {
                            return Ok((out, pos));
                        }
                    }
                } else {
                    loop {
                        let (v, eof, np) = data::read_ideof(self.src, pos)?;
                        pos = np;
                        if v == 0 && eof && out.is_empty() {
                            return Ok((out, pos)); // empty list
                        }
                        out.push(self.map_id(v)?);
                        if eof {
                            return Ok((out, pos));
                        }
                    }
                }
            }
            KeyStorage::IdArrayBlock => {
                loop {
                    let (enc, eof, np) = data::read_ideof(self.block, self.block_pos)?;
                    self.block_pos = np;
                    if enc == 0 && eof && out.is_empty() {
                        self.block_last = 0;
                        return Ok((out, pos));
                    }
                    let last = self.block_last;
                    let v = if enc >= 2 * last {
                        enc
                    } else if enc & 1 != 0 {
                        last - (enc + 1) / 2
                    } else {
                        last + enc / 2
                    };
                    self.block_last = v;
                    out.push(self.map_id(v)?);
                    if eof {
                        self.block_last = 0;
                        return Ok((out, pos));
                    }
                }
            }
            _ => Err(SolvError::Corrupt("unexpected dep storage")),
        }
    }
}

#[allow(clippy::too_many_lines)]
fn parse<R: Read>(pool: &mut Pool, r: &mut R) -> Result<Parsed> {
    let mut inp = In { r };

    if inp.u32()? != u32::from_be_bytes(*b"SOLV") {
        return Err(SolvError::BadMagic);
    }
    let version = inp.u32()?;
    if version != SOLV_VERSION_8 && version != SOLV_VERSION_9 {
        return Err(SolvError::UnsupportedVersion(version));
    }
    let nstrings = inp.u32()? as usize;
    let nrels = inp.u32()? as usize;
    let ndirmap = inp.u32()? as usize;
    let nsolvables = inp.u32()? as usize;
    let nkeys = inp.u32()? as usize;
    let nschemata = inp.u32()? as usize;
    let flags = inp.u32()?;
    debug!(
        version,
        nstrings, nrels, ndirmap, nsolvables, nkeys, nschemata, flags, "reading solv file"
    );

    let mut userdata = Vec::new();
    if flags & SOLV_FLAG_USERDATA != 0 {
        let len = inp.u32()? as usize;
        if len >= 65536 {
            return Err(SolvError::UserdataTooLarge(len));
        }
        userdata = inp.exact(len)?;
    }

    /* strings; idmap covers strings and rels */
    let mut idmap: Vec<Id> = vec![Id::NULL; nstrings.max(1) + nrels];
    let _sizeid = inp.u32()? as usize;
    let packed = inp.u32()? as usize;
    if nstrings > 0 {
        if flags & SOLV_FLAG_PREFIX_POOL == 0 {
            return Err(SolvError::Corrupt("uncompressed string pool unsupported"));
        }
        let buf = inp.exact(packed)?;
        let mut pos = 0usize;
        let mut prev: Vec<u8> = Vec::new();
        idmap[0] = Id::NULL;
        for slot in idmap.iter_mut().take(nstrings).skip(1) {
            let pfx = *buf.get(pos).ok_or(SolvError::Truncated("string pool"))? as usize;
            pos += 1;
            if pfx > prev.len() {
                return Err(SolvError::Corrupt("bad string prefix length"));
            }
            let tail = data::nul_str(&buf, pos)?;
            pos += tail.len() + 1;
            let mut s = Vec::with_capacity(pfx + tail.len());
            s.extend_from_slice(&prev[..pfx]);
            s.extend_from_slice(tail);
            let text = std::str::from_utf8(&s)
                .map_err(|_| SolvError::Corrupt("string pool is not utf-8"))?;
            *slot = pool.str2id(text, true);
            prev = s;
        }
        if pos != buf.len() {
            return Err(SolvError::Corrupt("string pool size mismatch"));
        }
    }

    /* rels; names and evrs may reference earlier rels only */
    for i in 0..nrels {
        let name = inp.id()? as usize;
        let evr = inp.id()? as usize;
        let relflags = inp.u8()? as u32;
        let limit = nstrings + i;
        if name >= limit || evr >= limit {
            return Err(SolvError::IdOutOfRange("rel table"));
        }
        let nid = idmap[name];
        let eid = idmap[evr];
        idmap[nstrings + i] = pool.rel2id(nid, eid, relflags, true);
    }

    /* dirs; rows 0 and 1 are implied, back-links switch the parent */
    let mut dirpool = DirPool::new();
    if ndirmap > 0 {
        let mut rows: Vec<DirId> = Vec::with_capacity(ndirmap);
        dirpool.ensure_root();
        rows.push(DirId::NULL);
        rows.push(DirId::ROOT);
        let mut parent = DirId::NULL;
        for _ in 2..ndirmap {
            let v = inp.id()? as usize;
            if v >= nstrings {
                let row = v - nstrings;
                parent = *rows.get(row).ok_or(SolvError::Corrupt("dir back-link"))?;
                rows.push(dirpool.push_unlinked());
            } else {
                let comp = idmap
                    .get(v)
                    .copied()
                    .ok_or(SolvError::IdOutOfRange("dir table"))?;
                rows.push(dirpool.push_raw(parent, comp));
            }
        }
    }

    /* keys */
    let mut keys: Vec<Repokey> = vec![Repokey::null()];
    let mut verticaloffset = vec![0u32; nkeys.max(1)];
    let mut lastverticaloffset = 0u32;
    for i in 1..nkeys {
        let name = inp.id()? as usize;
        let typ = inp.id()? as usize;
        let size = inp.id()?;
        let storage = inp.id()?;
        let name = idmap
            .get(name)
            .copied()
            .ok_or(SolvError::IdOutOfRange("key name"))?;
        let typid = idmap
            .get(typ)
            .copied()
            .ok_or(SolvError::IdOutOfRange("key type"))?;
        let typ = KeyType::from_keyname(typid).ok_or(SolvError::Corrupt("unknown key type"))?;
        let storage =
            KeyStorage::from_wire(storage).ok_or(SolvError::Corrupt("unknown key storage"))?;
        let size = if typ == KeyType::ConstantId {
            idmap
                .get(size as usize)
                .copied()
                .ok_or(SolvError::IdOutOfRange("key constant"))?
                .0
        } else {
            size
        };
        if storage == KeyStorage::VerticalOffset {
            verticaloffset[i] = lastverticaloffset;
            lastverticaloffset = lastverticaloffset
                .checked_add(size)
                .ok_or(SolvError::Corrupt("vertical sizes overflow"))?;
        }
        keys.push(Repokey::new(name, typ, size, storage));
    }

    /* schemata */
    let _schemadatalen = inp.id()?;
    let mut schemata: Vec<u32> = vec![0];
    let mut schemadata: Vec<Id> = vec![Id::NULL];
    for _ in 1..nschemata {
        let off = schemadata.len() as u32;
        loop {
            let (v, eof) = inp.ideof()?;
            if v as usize >= keys.len() {
                return Err(SolvError::Corrupt("schema references unknown key"));
            }
            if v == 0 && eof {
                // empty schema encodes as a bare zero
                break;
            }
            schemadata.push(Id(v));
            if eof {
                break;
            }
        }
        schemadata.push(Id::NULL);
        schemata.push(off);
    }

    /* id-array block */
    let mut block: Vec<u8> = Vec::new();
    if flags & SOLV_FLAG_IDARRAYBLOCK != 0 {
        let _nentries = inp.id()?;
        loop {
            let flag = inp.u8()?;
            let len = ((inp.u8()? as usize) << 8) | inp.u8()? as usize;
            let payload = inp.exact(len)?;
            if flag & 0x40 != 0 {
                let mut dec = vec![0u8; 65536];
                let n = codec::decompress(&payload, &mut dec)
                    .ok_or(SolvError::Corrupt("idarray block decompression"))?;
                block.extend_from_slice(&dec[..n]);
            } else {
                block.extend_from_slice(&payload);
            }
            if flag & 0x80 != 0 {
                break;
            }
        }
    }

    /* incore blob */
    let _maxdata = inp.id()?;
    let incorelen = inp.id()? as usize;
    let src = inp.exact(incorelen)?;

    let mut tr = Translator {
        keys: &keys,
        schemata: &schemata,
        schemadata: &schemadata,
        idmap: &idmap,
        src: &src,
        block: &block,
        block_pos: 0,
        block_last: 0,
    };

    let mut incoredata: Vec<u8> = Vec::new();
    data::push_id(&mut incoredata, 0); // entry data starts at offset 1
    let mut entry_offsets = vec![0u32; nsolvables];
    let mut solvables: Vec<SolvRec> = Vec::new();
    let mut mainschema = 0u32;
    let mut mainschemaoffsets: Vec<u32> = Vec::new();

    if incorelen > 0 {
        let (ms, mut pos) = data::read_id(&src, 0)?;
        mainschema = ms;
        data::push_id(&mut incoredata, mainschema);
        let main_keys = tr.schema_keys(mainschema)?.to_vec();
        mainschemaoffsets = Vec::with_capacity(main_keys.len());
        for keyid in main_keys {
            mainschemaoffsets.push(incoredata.len() as u32);
            let key = keys[keyid.index()];
            if key.name == REPOSITORY_SOLVABLES && key.typ == KeyType::FlexArray {
                /* the per-solvable entries */
                let (cnt, np) = data::read_id(&src, pos)?;
                pos = np;
                if cnt as usize != nsolvables {
                    return Err(SolvError::Corrupt("solvable count mismatch"));
                }
                data::push_id(&mut incoredata, cnt);
                for i in 0..nsolvables {
                    let (schemaid, np) = data::read_id(&src, pos)?;
                    pos = np;
                    let mut rec = SolvRec {
                        schemaid,
                        ..Default::default()
                    };
                    entry_offsets[i] = incoredata.len() as u32;
                    data::push_id(&mut incoredata, schemaid);
                    for keyid in tr.schema_keys(schemaid)?.to_vec() {
                        let key = keys[keyid.index()];
                        pos = translate_solvable_key(&mut tr, pos, &key, &mut rec, &mut incoredata)?;
                    }
                    solvables.push(rec);
                }
            } else {
                pos = tr.translate_key(pos, &key, &mut incoredata)?;
            }
        }
        if pos != src.len() {
            return Err(SolvError::Corrupt("incore data size mismatch"));
        }
    }

    Ok(Parsed {
        userdata,
        keys,
        verticaloffset,
        lastverticaloffset,
        schemata,
        schemadata,
        incoredata,
        entry_offsets,
        mainschema,
        mainschemaoffsets,
        dirpool,
        solvables,
    })
}

fn translate_solvable_key(
    tr: &mut Translator<'_>,
    pos: usize,
    key: &Repokey,
    rec: &mut SolvRec,
    incoredata: &mut Vec<u8>,
) -> Result<usize> {
    match key.storage {
        KeyStorage::Solvable | KeyStorage::IdArrayBlock => {
            if key.typ == KeyType::Id {
                let (v, np) = data::read_id(tr.src, pos)?;
                let id = tr.map_id(v)?;
                match key.name {
                    SOLVABLE_NAME => rec.name = id,
                    SOLVABLE_ARCH => rec.arch = id,
                    SOLVABLE_EVR => rec.evr = id,
                    SOLVABLE_VENDOR => rec.vendor = id,
                    _ => return Err(SolvError::Corrupt("unexpected solvable id column")),
                }
                return Ok(np);
            }
            if key.typ == KeyType::Num && key.name == RPM_RPMDBID {
                let (v, np) = data::read_id(tr.src, pos)?;
                rec.rpmdbid = Some(v);
                return Ok(np);
            }
            let Some(depidx) = DEP_KEYS.iter().position(|k| *k == key.name) else {
                return Err(SolvError::Corrupt("unexpected solvable column"));
            };
            let marker = if key.name == SOLVABLE_REQUIRES {
                SOLVABLE_PREREQMARKER
            } else if key.name == SOLVABLE_PROVIDES {
                SOLVABLE_FILEMARKER
            } else {
                Id::NULL
            };
            let (ids, np) = tr.read_deps(pos, key, marker)?;
            rec.deps[depidx] = ids;
            Ok(np)
        }
        _ => tr.translate_key(pos, key, incoredata),
    }
}

/* ---------- committing to the pool ---------- */

fn commit(pool: &mut Pool, rid: RepoId, parsed: Parsed) -> usize {
    let nsolvables = parsed.solvables.len();
    let first = if nsolvables > 0 {
        pool.add_solvable_block(rid, nsolvables)
    } else {
        pool.nsolvables() as i32
    };
    for (i, rec) in parsed.solvables.iter().enumerate() {
        let solvid = first + i as i32;
        {
            let s = pool.solvable_mut(solvid);
            s.name = rec.name;
            s.arch = rec.arch;
            s.evr = rec.evr;
            s.vendor = rec.vendor;
        }
        for (di, deps) in rec.deps.iter().enumerate() {
            if deps.is_empty() {
                continue;
            }
            let repo = pool.repo_mut(rid);
            let off = repo.add_ids(deps);
            pool.solvable_mut(solvid).set_dep_offset(DEP_KEYS[di], off);
        }
        if let Some(dbid) = rec.rpmdbid {
            let repo = pool.repo_mut(rid);
            let start = repo.start;
            let dbids = repo.rpmdbid.get_or_insert_with(Vec::new);
            let idx = solvid as usize - start;
            if dbids.len() <= idx {
                dbids.resize(idx + 1, 0);
            }
            dbids[idx] = dbid;
        }
    }

    let repo = pool.repo_mut(rid);
    let dataid = repo.nrepodata();
    let mut data = Repodata::new(dataid, false);
    data.userdata = parsed.userdata;
    data.keys = parsed.keys;
    let keynames: Vec<_> = data.keys.iter().map(|k| k.name).collect();
    for name in keynames {
        if !name.is_null() {
            data.note_keyname(name);
        }
    }
    data.verticaloffset = parsed.verticaloffset;
    data.lastverticaloffset = parsed.lastverticaloffset;
    data.schemata = parsed.schemata;
    data.schemadata = parsed.schemadata;
    data.incoredata = parsed.incoredata;
    data.mainschema = parsed.mainschema;
    data.mainschemaoffsets = parsed.mainschemaoffsets;
    data.dirpool = parsed.dirpool;
    if nsolvables > 0 {
        data.start = first;
        data.end = first + nsolvables as i32;
        data.incoreoffset = parsed.entry_offsets;
    }
    repo.repodata.push(data);
    debug!(dataid, nsolvables, "solv file committed");
    dataid
}
