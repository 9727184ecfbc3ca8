//! Stateful cursor over `(repo, solvable, key, value)` quadruples.
//!
//! The iterator walks one repo at a time: built-in solvable columns first,
//! then each repodata stratum, following schemas and descending into
//! fixarray/flexarray sub-structures depth first. A compiled matcher can
//! filter values; nested keyname chains (via [`Dataiterator::prepend_keyname`])
//! select paths like `filelist.name` inside sub-structures.

use std::borrow::Cow;

use crate::data;
use crate::id::{
    DirId, Id, RepoId, RPM_RPMDBID, SOLVABLE_ARCH, SOLVABLE_CONFLICTS, SOLVABLE_ENHANCES,
    SOLVABLE_EVR, SOLVABLE_FILELIST, SOLVABLE_NAME, SOLVABLE_OBSOLETES, SOLVABLE_PROVIDES,
    SOLVABLE_RECOMMENDS, SOLVABLE_REQUIRES, SOLVABLE_SUGGESTS, SOLVABLE_SUPPLEMENTS,
    SOLVABLE_VENDOR,
};
use crate::keys::{KeyStorage, KeyType, Repokey};
use crate::pool::{Datapos, Pool};
use crate::repodata::{
    Keyskip, Repodata, SEARCH_ARRAYSENTINEL, SEARCH_CHECKSUMS, SEARCH_FILES,
    SEARCH_KEEP_TYPE_DELETED, SEARCH_NOCASE, SEARCH_NO_STORAGE_SOLVABLE, SEARCH_STRING,
    SEARCH_STRINGEND, SEARCH_STRINGMASK, SEARCH_STRINGSTART, SEARCH_SUB, SEARCH_SUBSTRING,
    SEARCH_THISSOLVID, SOLVID_POS,
};
use crate::solvable::DEP_KEYS;

pub use crate::repodata::{SEARCH_GLOB, SEARCH_REGEX};

/* seek targets for [`Dataiterator::seek`] */
pub const DI_SEEK_CHILD: u32 = 1;
pub const DI_SEEK_PARENT: u32 = 2;
pub const DI_SEEK_REWIND: u32 = 3;
pub const DI_SEEK_STAY: u32 = 1 << 8;

const MAX_PARENTS: usize = 3;
const MAX_KEYNAMES: usize = 3 + MAX_PARENTS;

/// Compiled string matcher, a sum over the supported match kinds.
pub struct Datamatcher {
    flags: u32,
    pattern: String,
    kind: MatchKind,
    /// basename tail used to pre-filter file list entries
    basename: Option<String>,
}

enum MatchKind {
    Substring,
    Exact,
    Prefix,
    Suffix,
    Glob(glob::Pattern),
    Regex(regex::Regex),
}

impl Datamatcher {
    pub fn new(pattern: &str, flags: u32) -> Result<Self, String> {
        let nocase = flags & SEARCH_NOCASE != 0;
        let kind = match flags & SEARCH_STRINGMASK {
            SEARCH_SUBSTRING => MatchKind::Substring,
            SEARCH_STRING => MatchKind::Exact,
            SEARCH_STRINGSTART => MatchKind::Prefix,
            SEARCH_STRINGEND => MatchKind::Suffix,
            SEARCH_GLOB => MatchKind::Glob(
                glob::Pattern::new(pattern).map_err(|e| e.to_string())?,
            ),
            SEARCH_REGEX => {
                let p = if nocase {
                    format!("(?i){pattern}")
                } else {
                    pattern.to_string()
                };
                MatchKind::Regex(regex::Regex::new(&p).map_err(|e| e.to_string())?)
            }
            _ => MatchKind::Exact,
        };
        let basename = if flags & SEARCH_FILES != 0 {
            match flags & SEARCH_STRINGMASK {
                SEARCH_STRING | SEARCH_STRINGEND => Some(
                    pattern
                        .rfind('/')
                        .map(|p| &pattern[p + 1..])
                        .unwrap_or(pattern)
                        .to_string(),
                ),
                SEARCH_GLOB => {
                    let tail = pattern
                        .rfind(['[', ']', '*', '?', '/'])
                        .map(|p| &pattern[p + 1..])
                        .unwrap_or(pattern);
                    Some(tail.to_string())
                }
                _ => None,
            }
        } else {
            None
        };
        Ok(Datamatcher {
            flags,
            pattern: pattern.to_string(),
            kind,
            basename,
        })
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn matches(&self, s: &str) -> bool {
        let nocase = self.flags & SEARCH_NOCASE != 0;
        match &self.kind {
            MatchKind::Substring => {
                if nocase {
                    s.to_ascii_lowercase()
                        .contains(&self.pattern.to_ascii_lowercase())
                } else {
                    s.contains(&self.pattern)
                }
            }
            MatchKind::Exact => {
                if nocase {
                    s.eq_ignore_ascii_case(&self.pattern)
                } else {
                    s == self.pattern
                }
            }
            MatchKind::Prefix => {
                if nocase {
                    s.len() >= self.pattern.len()
                        && s[..self.pattern.len()].eq_ignore_ascii_case(&self.pattern)
                } else {
                    s.starts_with(&self.pattern)
                }
            }
            MatchKind::Suffix => {
                if s.len() < self.pattern.len() {
                    return false;
                }
                let tail = &s[s.len() - self.pattern.len()..];
                if nocase {
                    tail.eq_ignore_ascii_case(&self.pattern)
                } else {
                    tail == self.pattern
                }
            }
            MatchKind::Glob(p) => p.matches_with(
                s,
                glob::MatchOptions {
                    case_sensitive: !nocase,
                    ..Default::default()
                },
            ),
            MatchKind::Regex(r) => r.is_match(s),
        }
    }

    /// Cheap pre-check against a file basename, used before stringifying
    /// the whole path.
    pub fn check_basename(&self, basename: &str) -> bool {
        let Some(m) = &self.basename else { return true };
        let tail = match self.flags & SEARCH_STRINGMASK {
            SEARCH_STRING => basename,
            SEARCH_STRINGEND | SEARCH_GLOB => {
                if basename.len() < m.len() {
                    return false;
                }
                &basename[basename.len() - m.len()..]
            }
            _ => return true,
        };
        if self.flags & SEARCH_NOCASE != 0 {
            tail.eq_ignore_ascii_case(m)
        } else {
            tail == m
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum State {
    EnterRepo,
    EnterSolvable,
    EnterRepodata,
    EnterSchema,
    EnterKey,
    NextAttr,
    NextKey,
    NextRepodata,
    NextSolvable,
    NextRepo,
    Bye,
    EnterArray,
    NextArrayElement,
    EnterSub,
    LeaveSub,
    NextSolvableKey,
    EnterSolvableKey,
    NextSolvableAttr,
}

/// What the current value is and where its bytes live.
#[derive(Clone, Default)]
struct Kv {
    id: Id,
    num: u64,
    num2: u32,
    entry: i32,
    eof: u8,
    /// byte range of the string payload within the active region
    str_range: Option<(usize, usize)>,
    /// position of the current array element's data (incore offset)
    elem_pos: usize,
    /// stringified form, when dir2str/hex was needed
    stringified: Option<String>,
}

#[derive(Clone)]
struct ParentFrame {
    kv: Kv,
    dp: usize,
    keyp: usize,
    key_index: usize,
}

/// Built-in solvable columns exposed by the iterator before any repodata.
fn solvable_keys() -> [Repokey; 14] {
    let idk = |name| Repokey::new(name, KeyType::Id, 0, KeyStorage::Solvable);
    let arrk = |name| Repokey::new(name, KeyType::IdArray, 0, KeyStorage::Solvable);
    [
        idk(SOLVABLE_NAME),
        idk(SOLVABLE_ARCH),
        idk(SOLVABLE_EVR),
        idk(SOLVABLE_VENDOR),
        arrk(SOLVABLE_PROVIDES),
        arrk(SOLVABLE_OBSOLETES),
        arrk(SOLVABLE_CONFLICTS),
        arrk(SOLVABLE_REQUIRES),
        arrk(SOLVABLE_RECOMMENDS),
        arrk(SOLVABLE_SUGGESTS),
        arrk(SOLVABLE_SUPPLEMENTS),
        arrk(SOLVABLE_ENHANCES),
        Repokey::new(RPM_RPMDBID, KeyType::Num, 0, KeyStorage::Solvable),
        Repokey::null(),
    ]
}

fn solvable_key_index(keyname: Id) -> Option<usize> {
    if keyname == SOLVABLE_NAME {
        return Some(0);
    }
    if keyname == SOLVABLE_ARCH {
        return Some(1);
    }
    if keyname == SOLVABLE_EVR {
        return Some(2);
    }
    if keyname == SOLVABLE_VENDOR {
        return Some(3);
    }
    if let Some(i) = DEP_KEYS.iter().position(|k| *k == keyname) {
        return Some(4 + i);
    }
    if keyname == RPM_RPMDBID {
        return Some(12);
    }
    None
}

pub struct Dataiterator<'p> {
    pool: &'p Pool,
    flags: u32,
    matcher: Option<Datamatcher>,

    state: State,
    repo: Option<RepoId>,
    /// >0 while iterating all repos; 0 pins the current repo.
    repoid: i32,
    solvid: i32,
    repodataid: i32, // -1: repodata fixed by a jumped-to position
    fixed_data: Option<(RepoId, usize)>,

    keyname: Id,
    keynames: Vec<Id>,
    nkeynames: usize,

    /* cursors into the current repodata */
    dp: usize,
    keyp: usize,
    key_index: usize,
    solv_keys: [Repokey; 14],
    solv_key_idx: Option<usize>,
    dep_slice: &'p [Id],
    dep_pos: usize,

    /* value region of the current key */
    region: Option<Cow<'p, [u8]>>,
    ddp: usize,

    kv: Kv,
    parents: Vec<ParentFrame>,
    rootlevel: usize,

    keyskip: Option<Keyskip>,
}

impl<'p> Dataiterator<'p> {
    /// Iterate `repo` (or all repos when `None`), optionally restricted to
    /// one solvable, one keyname and a match pattern.
    pub fn new(
        pool: &'p Pool,
        repo: Option<RepoId>,
        solvid: i32,
        keyname: Id,
        pattern: Option<&str>,
        flags: u32,
    ) -> Result<Self, String> {
        let matcher = match pattern {
            Some(p) => Some(Datamatcher::new(p, flags)?),
            None => None,
        };
        let mut di = Dataiterator {
            pool,
            flags: flags & !SEARCH_THISSOLVID,
            matcher,
            state: State::Bye,
            repo: None,
            repoid: 0,
            solvid: 0,
            repodataid: 0,
            fixed_data: None,
            keyname,
            keynames: vec![Id::NULL; MAX_KEYNAMES],
            nkeynames: 0,
            dp: 0,
            keyp: 0,
            key_index: 0,
            solv_keys: solvable_keys(),
            solv_key_idx: None,
            dep_slice: &[],
            dep_pos: 0,
            region: None,
            ddp: 0,
            kv: Kv::default(),
            parents: Vec::new(),
            rootlevel: 0,
            keyskip: None,
        };
        di.keynames[0] = keyname;
        di.set_search(repo, solvid);
        Ok(di)
    }

    /// Restart the iteration at `repo` / `solvid`.
    pub fn set_search(&mut self, repo: Option<RepoId>, solvid: i32) {
        self.repo = repo;
        self.repoid = 0;
        self.flags &= !SEARCH_THISSOLVID;
        self.parents.clear();
        self.rootlevel = 0;
        self.repodataid = 0;
        self.fixed_data = None;
        if repo.is_none() {
            let first = self.pool.repos().next().map(|r| r.id());
            match first {
                Some(rid) => {
                    self.repoid = rid.0 as i32 + 1;
                    self.repo = Some(rid);
                }
                None => {
                    self.state = State::Bye;
                    return;
                }
            }
        }
        self.state = State::EnterRepo;
        if solvid != 0 {
            self.jump_to_solvid(solvid);
        }
    }

    pub fn set_keyname(&mut self, keyname: Id) {
        self.nkeynames = 0;
        self.keyname = keyname;
        self.keynames[0] = keyname;
    }

    /// Nest an outer keyname: `prepend_keyname(FILELIST)` walks into the
    /// filelist sub-structure before matching the previously set keyname.
    pub fn prepend_keyname(&mut self, keyname: Id) {
        if self.nkeynames >= MAX_KEYNAMES - 2 {
            self.state = State::Bye;
            return;
        }
        for i in (0..=self.nkeynames).rev() {
            self.keynames[i + 1] = self.keynames[i];
        }
        self.keynames[0] = keyname;
        self.keyname = keyname;
        self.nkeynames += 1;
    }

    pub fn set_match(&mut self, pattern: Option<&str>, flags: u32) -> Result<(), String> {
        self.flags = (flags & !SEARCH_THISSOLVID) | (self.flags & SEARCH_THISSOLVID);
        self.matcher = match pattern {
            Some(p) => Some(Datamatcher::new(p, flags)?),
            None => None,
        };
        Ok(())
    }

    /* ---------- accessors ---------- */

    pub fn solvid(&self) -> i32 {
        self.solvid
    }

    pub fn repo_id(&self) -> Option<RepoId> {
        self.repo
    }

    pub fn key(&self) -> &Repokey {
        match self.solv_key_idx {
            Some(i) => &self.solv_keys[i],
            None => self.data().key(self.key_index),
        }
    }

    pub fn value_id(&self) -> Id {
        self.kv.id
    }

    pub fn value_num(&self) -> u64 {
        self.kv.num
    }

    pub fn value_num2(&self) -> u32 {
        self.kv.num2
    }

    pub fn value_entry(&self) -> i32 {
        self.kv.entry
    }

    pub fn value_eof(&self) -> u8 {
        self.kv.eof
    }

    fn data(&self) -> &'p Repodata {
        match self.fixed_data {
            Some((rid, did)) => self.pool.repo(rid).data(did),
            None => self
                .pool
                .repo(self.repo.expect("no repo"))
                .data(self.repodataid as usize),
        }
    }

    fn in_repodata(&self) -> bool {
        self.solv_key_idx.is_none()
    }

    fn region_bytes(&self) -> &[u8] {
        match &self.region {
            Some(c) => c,
            None => &[],
        }
    }

    /// Raw string bytes of the current value, if it has any.
    pub fn value_bytes(&self) -> Option<&[u8]> {
        let (s, e) = self.kv.str_range?;
        Some(&self.region_bytes()[s..e])
    }

    /// The current value as a string: interned ids resolve through the
    /// pool, dir+basename values stringify to full paths when SEARCH_FILES
    /// is set, checksums to hex when SEARCH_CHECKSUMS is set.
    pub fn value_str(&mut self) -> Option<String> {
        if let Some(s) = &self.kv.stringified {
            return Some(s.clone());
        }
        let key = *self.key();
        match key.typ {
            KeyType::Id | KeyType::ConstantId | KeyType::IdArray | KeyType::RelIdArray => {
                if self.in_repodata() {
                    Some(self.data().str_for_id(&self.pool.ss, self.kv.id).to_string())
                } else {
                    Some(self.pool.id2str(self.kv.id).to_string())
                }
            }
            KeyType::Str => self
                .value_bytes()
                .map(|b| String::from_utf8_lossy(b).into_owned()),
            KeyType::DirStrArray => {
                let base = self
                    .value_bytes()
                    .map(|b| String::from_utf8_lossy(b).into_owned())?;
                if self.flags & SEARCH_FILES == 0 {
                    return Some(base);
                }
                let full =
                    self.data()
                        .dir2str(&self.pool.ss, DirId(self.kv.id.0), Some(&base));
                self.kv.stringified = Some(full.clone());
                Some(full)
            }
            t if t.is_checksum() => {
                if self.flags & SEARCH_CHECKSUMS == 0 {
                    return None;
                }
                let hexed = hex::encode(self.value_bytes()?);
                self.kv.stringified = Some(hexed.clone());
                Some(hexed)
            }
            _ => None,
        }
    }

    /* ---------- position capture ---------- */

    /// Remember the current array element so a later lookup can restart
    /// from it via [`Pool::set_pos`].
    pub fn pos(&self) -> Datapos {
        if self.kv.eof == 2 {
            return Datapos::default();
        }
        let (rid, did) = match self.fixed_data {
            Some(p) => p,
            None => (self.repo.expect("no repo"), self.repodataid as usize),
        };
        Datapos {
            repo: Some(rid),
            repodataid: did,
            solvid: self.solvid,
            schema: self.kv.id.0,
            dp: self.kv.elem_pos as u32,
        }
    }

    /// Position of the enclosing sub-structure.
    pub fn parent_pos(&self) -> Option<Datapos> {
        let parent = self.parents.last()?;
        if parent.kv.eof == 2 {
            return None;
        }
        let (rid, did) = match self.fixed_data {
            Some(p) => p,
            None => (self.repo.expect("no repo"), self.repodataid as usize),
        };
        Some(Datapos {
            repo: Some(rid),
            repodataid: did,
            solvid: self.solvid,
            schema: parent.kv.id.0,
            dp: parent.kv.elem_pos as u32,
        })
    }

    /* ---------- seeking ---------- */

    pub fn entersub(&mut self) {
        if self.state == State::NextArrayElement {
            self.state = State::EnterSub;
        }
    }

    pub fn seek(&mut self, whence: u32) {
        if whence & DI_SEEK_STAY != 0 {
            self.rootlevel = self.parents.len();
        }
        match whence & !DI_SEEK_STAY {
            DI_SEEK_CHILD => {
                if self.state != State::NextArrayElement {
                    return;
                }
                if whence & DI_SEEK_STAY != 0 {
                    self.rootlevel = self.parents.len() + 1;
                }
                self.state = State::EnterSub;
            }
            DI_SEEK_PARENT => {
                if self.parents.is_empty() {
                    self.state = State::Bye;
                    return;
                }
                self.leave_sub_frame();
                if self.rootlevel > self.parents.len() {
                    self.rootlevel = self.parents.len();
                }
                self.state = State::NextArrayElement;
            }
            DI_SEEK_REWIND => {
                if self.parents.is_empty() {
                    self.state = State::Bye;
                    return;
                }
                // restart the current sub-schema
                let (elem_pos, schema) = {
                    let parent = self.parents.last().unwrap();
                    (parent.kv.elem_pos, parent.kv.id.0)
                };
                self.dp = elem_pos;
                self.keyp = self.data().schemata[schema as usize] as usize;
                self.state = State::EnterSchema;
            }
            _ => {}
        }
    }

    pub fn skip_attribute(&mut self) {
        if self.state == State::NextSolvableAttr {
            self.state = State::NextSolvableKey;
        } else {
            self.state = State::NextKey;
        }
    }

    pub fn skip_solvable(&mut self) {
        self.parents.clear();
        self.rootlevel = 0;
        self.keyname = self.keynames[0];
        self.state = State::NextSolvable;
    }

    pub fn skip_repo(&mut self) {
        self.parents.clear();
        self.rootlevel = 0;
        self.keyname = self.keynames[0];
        self.state = State::NextRepo;
    }

    /// Restrict the iteration to the current solvable.
    pub fn final_solvable(&mut self) {
        self.flags |= SEARCH_THISSOLVID;
        self.repoid = 0;
    }

    pub fn jump_to_solvid(&mut self, solvid: i32) {
        self.parents.clear();
        self.rootlevel = 0;
        self.keyname = self.keynames[0];
        if solvid == SOLVID_POS {
            let pos = self.pool.pos;
            let Some(rid) = pos.repo else {
                self.state = State::Bye;
                return;
            };
            self.repo = Some(rid);
            self.repoid = 0;
            self.fixed_data = Some((rid, pos.repodataid));
            self.repodataid = -1;
            self.solvid = pos.solvid;
            self.flags |= SEARCH_THISSOLVID;
            self.state = State::EnterRepo;
            return;
        }
        if solvid > 0 {
            let Some(rid) = self.pool.solvables[solvid as usize].repo else {
                self.state = State::Bye;
                return;
            };
            self.repo = Some(rid);
            self.repoid = 0;
        }
        self.repodataid = 0;
        self.solvid = solvid;
        if solvid != 0 {
            self.flags |= SEARCH_THISSOLVID;
        }
        self.state = State::EnterRepo;
    }

    pub fn jump_to_repo(&mut self, rid: RepoId) {
        self.parents.clear();
        self.rootlevel = 0;
        self.repo = Some(rid);
        self.repoid = 0;
        self.repodataid = 0;
        self.solvid = 0;
        self.flags &= !SEARCH_THISSOLVID;
        self.state = State::EnterRepo;
    }

    fn leave_sub_frame(&mut self) {
        let parent = self.parents.pop().expect("no parent to leave");
        self.dp = parent.dp;
        self.kv = parent.kv;
        self.keyp = parent.keyp;
        self.key_index = parent.key_index;
        self.region = None;
        self.keyname = self.keynames[self.parents.len().saturating_sub(self.rootlevel)];
    }

    /* ---------- the state machine ---------- */

    /// Advance to the next matching value. Returns false when exhausted.
    #[allow(clippy::too_many_lines)]
    pub fn step(&mut self) -> bool {
        loop {
            let found = match self.state {
                State::Bye => return false,

                State::EnterRepo => {
                    if self.repo.is_none() {
                        self.state = State::NextRepo;
                        continue;
                    }
                    if self.flags & SEARCH_THISSOLVID == 0 {
                        self.solvid = self.pool.repo(self.repo.unwrap()).start as i32 - 1;
                        self.state = State::NextSolvable;
                        continue;
                    }
                    self.state = State::EnterSolvable;
                    continue;
                }

                State::EnterSolvable => {
                    if self.repodataid < 0 {
                        // jumped-to position: repodata fixed
                        self.state = State::EnterRepodata;
                        continue;
                    }
                    if self.solvid > 0
                        && self.flags & SEARCH_NO_STORAGE_SOLVABLE == 0
                        && (self.keyname.is_null()
                            || solvable_key_index(self.keyname).is_some())
                        && self.parents.len().saturating_sub(self.rootlevel) == self.nkeynames
                    {
                        self.solv_key_idx = Some(match solvable_key_index(self.keyname) {
                            Some(i) => i,
                            None => 0,
                        });
                        self.state = State::EnterSolvableKey;
                        continue;
                    }
                    self.repodataid = 0;
                    self.solv_key_idx = None;
                    self.keyskip = self
                        .repo
                        .and_then(|rid| self.pool.keyskip_for(rid, self.solvid));
                    self.state = State::EnterRepodata;
                    continue;
                }

                State::EnterRepodata => {
                    if self.repodataid >= 0 {
                        let repo = self.pool.repo(self.repo.unwrap());
                        if self.repodataid as usize >= repo.nrepodata() {
                            self.state = State::NextSolvable;
                            continue;
                        }
                    }
                    self.solv_key_idx = None;
                    let data = self.data();
                    if !self.keyname.is_null() && !data.precheck_keyname(self.keyname) {
                        self.state = State::NextRepodata;
                        continue;
                    }
                    let from_pos = self.repodataid < 0 && self.pool.pos.dp > 1;
                    let start = if from_pos {
                        self.solvid = self.pool.pos.solvid;
                        Some((self.pool.pos.dp as usize, self.pool.pos.schema))
                    } else {
                        let lookup_solvid = if self.repodataid < 0 {
                            self.pool.pos.solvid
                        } else {
                            self.solvid
                        };
                        data.solvid2data(lookup_solvid)
                    };
                    let Some((dp, schema)) = start else {
                        self.state = State::NextRepodata;
                        continue;
                    };
                    self.dp = dp;
                    self.keyp = data.schemata[schema as usize] as usize;
                    self.state = State::EnterSchema;
                    continue;
                }

                State::EnterSchema => {
                    if !self.keyname.is_null() {
                        match self.find_keyname_forward() {
                            Some(dp) => self.dp = dp,
                            None => {
                                if !self.parents.is_empty() {
                                    self.state = State::LeaveSub;
                                } else {
                                    self.state = State::NextRepodata;
                                }
                                continue;
                            }
                        }
                    }
                    let data = self.data();
                    if data.schemadata[self.keyp].is_null() {
                        if !self.parents.is_empty() {
                            self.state = State::LeaveSub;
                        } else {
                            self.state = State::NextRepodata;
                        }
                        continue;
                    }
                    self.state = State::EnterKey;
                    continue;
                }

                State::EnterKey => {
                    let data = self.data();
                    self.kv = Kv {
                        entry: -1,
                        ..Kv::default()
                    };
                    self.key_index = data.schemadata[self.keyp].index();
                    let key = *data.key(self.key_index);

                    let skip = self
                        .keyskip
                        .as_ref()
                        .map(|ks| ks.skip(data.repodataid, key.name))
                        .unwrap_or(false)
                        || (key.typ == KeyType::Deleted
                            && self.flags & SEARCH_KEEP_TYPE_DELETED == 0);

                    if matches!(key.typ, KeyType::FixArray | KeyType::FlexArray) {
                        let arr_pos = self.dp;
                        let Some(next) =
                            data.skip_key_data(&data.incoredata, self.dp, &key)
                        else {
                            self.state = State::NextKey;
                            continue;
                        };
                        // remember where the array starts; dp advances past
                        self.kv.elem_pos = arr_pos;
                        self.dp = next;
                        if skip {
                            self.state = State::NextKey;
                            continue;
                        }
                        self.state = State::EnterArray;
                        continue;
                    }

                    if skip {
                        let Some(next) = data.skip_key_data(&data.incoredata, self.dp, &key)
                        else {
                            self.state = State::NextKey;
                            continue;
                        };
                        self.dp = next;
                        self.state = State::NextKey;
                        continue;
                    }

                    match self.load_key_region(&key) {
                        Some(()) => {
                            if self.nkeynames > 0
                                && self.parents.len().saturating_sub(self.rootlevel)
                                    < self.nkeynames
                            {
                                self.state = State::NextKey;
                                continue;
                            }
                            self.state = State::NextAttr;
                            continue;
                        }
                        None => {
                            self.state = State::NextKey;
                            continue;
                        }
                    }
                }

                State::NextAttr => {
                    self.kv.entry += 1;
                    let key = *self.key();
                    let fetched = self.fetch_current(&key);
                    if !fetched {
                        self.state = State::NextKey;
                        continue;
                    }
                    self.state = if self.kv.eof != 0 {
                        State::NextKey
                    } else {
                        State::NextAttr
                    };
                    true
                }

                State::NextKey => {
                    let data = self.data();
                    if self.keyname.is_null() {
                        self.keyp += 1;
                        if !data.schemadata[self.keyp].is_null() {
                            self.state = State::EnterKey;
                            continue;
                        }
                    }
                    if !self.parents.is_empty() {
                        self.state = State::LeaveSub;
                        continue;
                    }
                    self.state = State::NextRepodata;
                    continue;
                }

                State::NextRepodata => {
                    if self.repodataid >= 0 {
                        self.repodataid += 1;
                        let repo = self.pool.repo(self.repo.unwrap());
                        if (self.repodataid as usize) < repo.nrepodata() {
                            self.state = State::EnterRepodata;
                            continue;
                        }
                    }
                    self.state = State::NextSolvable;
                    continue;
                }

                State::NextSolvable => {
                    if self.flags & SEARCH_THISSOLVID == 0 {
                        let repo = self.pool.repo(self.repo.unwrap());
                        let mut next = if self.solvid < 0 {
                            repo.start as i32
                        } else {
                            self.solvid + 1
                        };
                        let mut advanced = false;
                        while (next as usize) < repo.end {
                            if self.pool.solvables[next as usize].repo == self.repo {
                                self.solvid = next;
                                self.state = State::EnterSolvable;
                                advanced = true;
                                break;
                            }
                            next += 1;
                        }
                        if advanced {
                            continue;
                        }
                    }
                    self.state = State::NextRepo;
                    continue;
                }

                State::NextRepo => {
                    if self.repoid > 0 {
                        self.repodataid = 0;
                        let next = self
                            .pool
                            .repos()
                            .map(|r| r.id())
                            .find(|r| r.0 as i32 + 1 > self.repoid);
                        match next {
                            Some(rid) => {
                                self.repoid = rid.0 as i32 + 1;
                                self.repo = Some(rid);
                                self.state = State::EnterRepo;
                                continue;
                            }
                            None => {}
                        }
                    }
                    self.state = State::Bye;
                    continue;
                }

                State::EnterArray => {
                    let data = self.data();
                    let key = *data.key(self.key_index);
                    if key.name == crate::id::REPOSITORY_SOLVABLES {
                        self.state = State::NextKey;
                        continue;
                    }
                    let arr_pos = self.kv.elem_pos;
                    let Ok((num, pos)) = data::read_id(&data.incoredata, arr_pos) else {
                        self.state = State::NextKey;
                        continue;
                    };
                    self.kv.num = num as u64;
                    self.kv.eof = 0;
                    self.kv.entry = -1;
                    self.ddp = pos;
                    // fixarray has one shared schema up front
                    if key.typ == KeyType::FixArray && num > 0 {
                        let Ok((schema, pos)) = data::read_id(&data.incoredata, pos) else {
                            self.state = State::NextKey;
                            continue;
                        };
                        self.kv.id = Id(schema);
                        self.ddp = pos;
                    }
                    self.state = State::NextArrayElement;
                    continue;
                }

                State::NextArrayElement => {
                    let data = self.data();
                    let key = *data.key(self.key_index);
                    self.kv.entry += 1;
                    if self.kv.entry != 0 {
                        // skip the previous element's data
                        let Some(next) =
                            data_skip_schema_at(data, self.kv.elem_pos, self.kv.id.0)
                        else {
                            self.state = State::NextKey;
                            continue;
                        };
                        self.ddp = next;
                    }
                    if self.kv.entry as u64 == self.kv.num {
                        if self.nkeynames > 0
                            && self.parents.len().saturating_sub(self.rootlevel)
                                < self.nkeynames
                        {
                            self.state = State::NextKey;
                            continue;
                        }
                        if self.flags & SEARCH_ARRAYSENTINEL == 0 {
                            self.state = State::NextKey;
                            continue;
                        }
                        self.kv.elem_pos = self.ddp;
                        self.kv.eof = 2;
                        self.state = State::NextKey;
                        true
                    } else {
                        if self.kv.entry as u64 == self.kv.num - 1 {
                            self.kv.eof = 1;
                        }
                        if key.typ == KeyType::FlexArray {
                            let Ok((schema, pos)) = data::read_id(&data.incoredata, self.ddp)
                            else {
                                self.state = State::NextKey;
                                continue;
                            };
                            self.kv.id = Id(schema);
                            self.ddp = pos;
                        }
                        self.kv.elem_pos = self.ddp;
                        if self.nkeynames > 0
                            && self.parents.len().saturating_sub(self.rootlevel)
                                < self.nkeynames
                        {
                            self.state = State::EnterSub;
                            continue;
                        }
                        self.state = if self.flags & SEARCH_SUB != 0 {
                            State::EnterSub
                        } else {
                            State::NextArrayElement
                        };
                        true
                    }
                }

                State::EnterSub => {
                    if self.parents.len() >= MAX_PARENTS {
                        self.state = State::NextArrayElement;
                        continue;
                    }
                    self.parents.push(ParentFrame {
                        kv: self.kv.clone(),
                        dp: self.dp,
                        keyp: self.keyp,
                        key_index: self.key_index,
                    });
                    let data = self.data();
                    self.dp = self.kv.elem_pos;
                    self.keyp = data.schemata[self.kv.id.0 as usize] as usize;
                    self.kv = Kv::default();
                    self.keyname =
                        self.keynames[self.parents.len().saturating_sub(self.rootlevel)];
                    self.state = State::EnterSchema;
                    continue;
                }

                State::LeaveSub => {
                    if self.parents.len() <= self.rootlevel {
                        self.state = State::Bye;
                        continue;
                    }
                    self.leave_sub_frame();
                    self.state = State::NextArrayElement;
                    continue;
                }

                State::EnterSolvableKey => {
                    let idx = self.solv_key_idx.unwrap_or(0);
                    if !self.load_solvable_key(idx) {
                        self.state = State::NextSolvableKey;
                        continue;
                    }
                    if self.kv.eof == 1 && self.dep_slice.is_empty() {
                        // scalar column
                        self.state = State::NextSolvableKey;
                        true
                    } else {
                        self.kv.entry = -1;
                        self.state = State::NextSolvableAttr;
                        continue;
                    }
                }

                State::NextSolvableKey => {
                    if !self.keyname.is_null() {
                        self.state = State::NextSolvable;
                        continue;
                    }
                    let idx = self.solv_key_idx.unwrap_or(0);
                    if self.solv_keys[idx].name == RPM_RPMDBID
                        || self.solv_keys[idx + 1].name.is_null()
                    {
                        // end of the built-in columns: continue with the
                        // repodata strata
                        self.repodataid = 0;
                        self.solv_key_idx = None;
                        self.keyskip = self
                            .repo
                            .and_then(|rid| self.pool.keyskip_for(rid, self.solvid));
                        self.state = State::EnterRepodata;
                        continue;
                    }
                    self.solv_key_idx = Some(idx + 1);
                    self.state = State::EnterSolvableKey;
                    continue;
                }

                State::NextSolvableAttr => {
                    self.kv.entry += 1;
                    if self.dep_pos >= self.dep_slice.len() {
                        self.state = State::NextSolvableKey;
                        continue;
                    }
                    self.kv.id = self.dep_slice[self.dep_pos];
                    self.dep_pos += 1;
                    if self.dep_pos >= self.dep_slice.len() {
                        self.kv.eof = 1;
                        self.state = State::NextSolvableKey;
                    } else {
                        self.kv.eof = 0;
                        self.state = State::NextSolvableAttr;
                    }
                    true
                }
            };

            if !found {
                continue;
            }

            /* we have a potential match */
            if self.matcher.is_some() {
                // cheap basename precheck for file lists
                if self.keyname == SOLVABLE_FILELIST
                    && self.key().typ == KeyType::DirStrArray
                    && self
                        .matcher
                        .as_ref()
                        .map(|m| m.flags() & SEARCH_FILES != 0)
                        .unwrap_or(false)
                {
                    let base = self
                        .value_bytes()
                        .map(|b| String::from_utf8_lossy(b).into_owned())
                        .unwrap_or_default();
                    if !self.matcher.as_ref().unwrap().check_basename(&base) {
                        continue;
                    }
                }
                let Some(s) = self.value_str() else {
                    if !self.keyname.is_null()
                        && matches!(self.key().typ, KeyType::FixArray | KeyType::FlexArray)
                    {
                        return true;
                    }
                    continue;
                };
                if !self.matcher.as_ref().unwrap().matches(&s) {
                    continue;
                }
            } else if self.keyname == SOLVABLE_FILELIST
                && self.key().typ == KeyType::DirStrArray
                && self.flags & SEARCH_FILES != 0
            {
                self.value_str(); // stringify for the caller
            }
            return true;
        }
    }

    /// Forward `dp` to the first key in the current schema matching the
    /// active keyname. Advances `keyp` to that key.
    fn find_keyname_forward(&mut self) -> Option<usize> {
        let data = self.data();
        let mut keyp = self.keyp;
        let mut dp = self.dp;
        loop {
            let keyid = data.schemadata[keyp];
            if keyid.is_null() {
                return None;
            }
            let key = data.key(keyid.index());
            if key.name == self.keyname {
                if key.typ == KeyType::Deleted && self.flags & SEARCH_KEEP_TYPE_DELETED == 0 {
                    return None;
                }
                if !matches!(
                    key.storage,
                    KeyStorage::Incore | KeyStorage::VerticalOffset
                ) {
                    return None;
                }
                self.keyp = keyp;
                return Some(dp);
            }
            dp = data.skip_key_data(&data.incoredata, dp, key)?;
            keyp += 1;
        }
    }

    /// Load the byte region of the current (non-array) key and reset the
    /// value cursor.
    fn load_key_region(&mut self, key: &Repokey) -> Option<()> {
        let data = self.data();
        match key.storage {
            KeyStorage::Incore => {
                let next = data.skip_key_data(&data.incoredata, self.dp, key)?;
                self.region = Some(Cow::Borrowed(&data.incoredata[self.dp..next]));
                self.ddp = 0;
                self.dp = next;
                Some(())
            }
            KeyStorage::VerticalOffset => {
                let (off, p) = data::read_id(&data.incoredata, self.dp).ok()?;
                let (len, next) = data::read_id(&data.incoredata, p).ok()?;
                self.dp = next;
                let region = data.vertical_bytes(self.key_index, off, len)?;
                self.region = Some(region);
                self.ddp = 0;
                Some(())
            }
            _ => {
                if matches!(
                    key.typ,
                    KeyType::Void | KeyType::Constant | KeyType::ConstantId
                ) {
                    self.region = Some(Cow::Borrowed(&[][..]));
                    self.ddp = 0;
                    Some(())
                } else {
                    None
                }
            }
        }
    }

    /// Decode the next value from the current region into `kv`.
    fn fetch_current(&mut self, key: &Repokey) -> bool {
        let fetched = {
            let region: &[u8] = match &self.region {
                Some(c) => c,
                None => return false,
            };
            let mut kv = crate::repodata::KeyValue::default();
            let Some(next) = crate::repodata::fetch_value(region, self.ddp, key, &mut kv) else {
                return false;
            };
            let sets_str = matches!(
                key.typ,
                KeyType::Str | KeyType::DirStrArray | KeyType::Binary
            ) || key.typ.is_checksum();
            let range = if sets_str {
                // translate the borrowed slice back into region offsets
                let base = region.as_ptr() as usize;
                let s = kv.str_bytes.as_ptr() as usize - base;
                Some((s, s + kv.str_bytes.len()))
            } else {
                None
            };
            (kv.id, kv.num, kv.num2, kv.eof, range, next)
        };
        let (id, num, num2, eof, range, next) = fetched;
        self.kv.id = id;
        self.kv.num = num;
        self.kv.num2 = num2;
        self.kv.eof = eof;
        self.kv.stringified = None;
        self.kv.str_range = range;
        self.ddp = next;
        true
    }

    /// Prepare iteration over one built-in solvable column.
    fn load_solvable_key(&mut self, idx: usize) -> bool {
        let key = self.solv_keys[idx];
        if key.name.is_null() {
            return false;
        }
        let s = &self.pool.solvables[self.solvid as usize];
        self.region = None;
        self.kv = Kv::default();
        self.dep_slice = &[];
        self.dep_pos = 0;
        match key.typ {
            KeyType::Id => {
                let v = match idx {
                    0 => s.name,
                    1 => s.arch,
                    2 => s.evr,
                    3 => s.vendor,
                    _ => Id::NULL,
                };
                if v.is_null() {
                    return false;
                }
                self.kv.id = v;
                self.kv.eof = 1;
                self.kv.entry = 0;
                true
            }
            KeyType::IdArray => {
                let deps = self.pool.solvable_deps(self.solvid, key.name);
                if deps.is_empty() {
                    return false;
                }
                self.dep_slice = deps;
                self.dep_pos = 0;
                self.kv.eof = 0;
                true
            }
            KeyType::Num => {
                let repo = self.pool.repo(s.repo.expect("solvable without repo"));
                let Some(dbids) = &repo.rpmdbid else {
                    return false;
                };
                let i = self.solvid as usize - repo.start;
                let Some(&v) = dbids.get(i) else { return false };
                self.kv.num = v as u64;
                self.kv.eof = 1;
                true
            }
            _ => false,
        }
    }
}

/// Skip a whole sub-schema starting at `pos`.
fn data_skip_schema_at(data: &Repodata, pos: usize, schemaid: u32) -> Option<usize> {
    let mut pos = pos;
    for keyid in data.schema_keys(schemaid).to_vec() {
        let key = *data.key(keyid.index());
        pos = data.skip_key_data(&data.incoredata, pos, &key)?;
    }
    Some(pos)
}

impl Pool {
    /// Remember a position so `SOLVID_POS` lookups and jumps can return to
    /// it.
    pub fn set_pos(&mut self, pos: Datapos) {
        self.pos = pos;
    }

    pub fn get_pos(&self) -> Datapos {
        self.pos
    }
}
