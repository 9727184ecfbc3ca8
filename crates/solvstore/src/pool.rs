//! The pool owns every shared id space: the global string pool, the rel
//! pool, the flat solvables array and the repos. All APIs go through an
//! explicit `&Pool`/`&mut Pool`; there is no global registry.

use std::cell::RefCell;

use itertools::Itertools;
use tracing::debug;

use crate::evr::{evrcmp_str, CompareMode, VersionKind};
use crate::id::{
    self, DirId, Id, RepoId, INITPOOL_DATA, REL_AND, REL_ARCH, REL_COMPAT, REL_COND, REL_CONDA,
    REL_ELSE, REL_EQ, REL_ERROR, REL_FILECONFLICT, REL_GT, REL_KIND, REL_LT, REL_MULTIARCH,
    REL_NAMESPACE, REL_OR, REL_UNLESS, REL_WITH, REL_WITHOUT, SOLVABLE_MEDIADIR,
    SOLVABLE_MEDIAFILE, SOLVABLE_MEDIANR, SOLVABLE_SOURCEARCH, SOLVABLE_SOURCEEVR,
    SOLVABLE_SOURCENAME,
};
use crate::relpool::{RelDep, RelPool};
use crate::repo::{Marker, Repo};
use crate::repodata::Keyskip;
use crate::solvable::Solvable;
use crate::strpool::StringPool;

/// A remembered data position, captured by a dataiterator and usable as a
/// lookup root later.
#[derive(Clone, Copy, Default)]
pub struct Datapos {
    pub repo: Option<RepoId>,
    pub repodataid: usize,
    pub solvid: i32,
    pub schema: u32,
    pub dp: u32,
}

pub struct Pool {
    pub(crate) ss: StringPool,
    pub(crate) rels: RelPool,
    pub(crate) solvables: Vec<Solvable>,
    pub(crate) repos: Vec<Option<Repo>>,

    /// EVR dialect used by comparisons on this pool.
    pub kind: VersionKind,
    /// Treat a missing epoch as matching any epoch.
    pub promoteepoch: bool,

    pub(crate) id2arch: Vec<u32>,
    #[allow(dead_code)]
    pub(crate) lastarch: usize,

    /// name id -> offset into `whatprovidesdata`; empty until built.
    whatprovides: Vec<u32>,
    whatprovides_rel: Vec<u32>,
    whatprovidesdata: Vec<Id>,

    /// Position captured via a dataiterator.
    pub(crate) pos: Datapos,

    last_error: RefCell<Option<String>>,
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Pool {
    /// A pool with the well-known id prelude interned and the two reserved
    /// solvable slots in place.
    pub fn new() -> Self {
        Pool {
            ss: StringPool::with_strings(&INITPOOL_DATA),
            rels: RelPool::new(),
            solvables: vec![Solvable::default(); 2],
            repos: Vec::new(),
            kind: VersionKind::Rpm,
            promoteepoch: false,
            id2arch: Vec::new(),
            lastarch: 0,
            whatprovides: Vec::new(),
            whatprovides_rel: Vec::new(),
            whatprovidesdata: Vec::new(),
            pos: Datapos::default(),
            last_error: RefCell::new(None),
        }
    }

    /* ---------- error channel ---------- */

    /// Record an error message; the most recent one is kept.
    pub fn set_last_error(&self, msg: impl Into<String>) {
        *self.last_error.borrow_mut() = Some(msg.into());
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    pub fn take_last_error(&self) -> Option<String> {
        self.last_error.borrow_mut().take()
    }

    /* ---------- ids and strings ---------- */

    pub fn str2id(&mut self, s: &str, create: bool) -> Id {
        if create {
            self.ss.intern(s)
        } else {
            self.ss.find(s)
        }
    }

    pub fn strn2id(&mut self, s: &str, n: usize, create: bool) -> Id {
        if create {
            self.ss.internn(s, n)
        } else {
            self.ss.find_bytes(&s.as_bytes()[..n.min(s.len())])
        }
    }

    /// The string behind an id; rel ids resolve to their name.
    pub fn id2str(&self, id: Id) -> &str {
        let mut id = id;
        while id.is_rel() {
            id = self.rels.get(id).name;
        }
        self.ss.id2str(id)
    }

    pub fn rel2id(&mut self, name: Id, evr: Id, flags: u32, create: bool) -> Id {
        self.rels.rel2id(name, evr, flags, create)
    }

    pub fn rel(&self, id: Id) -> &RelDep {
        self.rels.get(id)
    }

    pub fn strings(&self) -> &StringPool {
        &self.ss
    }

    pub fn strings_mut(&mut self) -> &mut StringPool {
        &mut self.ss
    }

    pub fn nrels(&self) -> usize {
        self.rels.len()
    }

    /// The operator string of a rel id, with the pool dialect's spelling.
    pub fn id2rel(&self, id: Id) -> &'static str {
        if !id.is_rel() {
            return "";
        }
        let rd = self.rels.get(id);
        const RELS: [&str; 8] = [" ! ", " > ", " = ", " >= ", " < ", " <> ", " <= ", " <=> "];
        const RELS_NOSPACE: [&str; 8] = ["!", ">", "=", ">=", "<", "<>", "<=", "<=>"];
        if self.kind == VersionKind::Apk && (1..=7).contains(&rd.flags) {
            return RELS_NOSPACE[rd.flags as usize];
        }
        let rpm = self.kind == VersionKind::Rpm;
        match rd.flags {
            0..=7 => match rd.flags {
                REL_GT if self.kind == VersionKind::Deb => " >> ",
                REL_LT if self.kind == VersionKind::Deb => " << ",
                f => RELS[f as usize],
            },
            REL_AND => {
                if rpm {
                    " and "
                } else {
                    " & "
                }
            }
            REL_OR => {
                if rpm {
                    " or "
                } else {
                    " | "
                }
            }
            REL_WITH => {
                if rpm {
                    " with "
                } else {
                    " + "
                }
            }
            REL_WITHOUT => {
                if rpm {
                    " without "
                } else {
                    " - "
                }
            }
            REL_NAMESPACE => " NAMESPACE ",
            REL_ARCH => ".",
            REL_MULTIARCH => ":",
            REL_FILECONFLICT => " FILECONFLICT ",
            REL_COND => {
                if rpm {
                    " if "
                } else {
                    " IF "
                }
            }
            REL_UNLESS => {
                if rpm {
                    " unless "
                } else {
                    " UNLESS "
                }
            }
            REL_COMPAT => " compat >= ",
            REL_KIND => " KIND ",
            REL_ELSE => {
                if rpm {
                    " else "
                } else {
                    " ELSE "
                }
            }
            REL_ERROR => " ERROR ",
            REL_CONDA => " ",
            _ => " ??? ",
        }
    }

    /// The evr string of a rel id; `(REL)` for nested rel evrs.
    pub fn id2evr(&self, id: Id) -> &str {
        if !id.is_rel() {
            return "";
        }
        let rd = self.rels.get(id);
        if rd.evr.is_rel() {
            return "(REL)";
        }
        self.ss.id2str(rd.evr)
    }

    /// Render a dependency id, following nested rels with the parenthesis
    /// rules of the pool dialect.
    pub fn dep2str(&self, id: Id) -> String {
        if !id.is_rel() {
            return self.ss.id2str(id).to_string();
        }
        let mut out = String::new();
        let initial = if self.kind == VersionKind::Rpm { -1 } else { 0 };
        self.dep2str_rec(&mut out, id, initial);
        out
    }

    fn dep2str_rec(&self, out: &mut String, mut id: Id, mut oldrel: i64) {
        const BOOLOPS: [u32; 7] = [
            REL_AND, REL_OR, REL_WITH, REL_WITHOUT, REL_COND, REL_UNLESS, REL_ELSE,
        ];
        while id.is_rel() {
            let rd = *self.rels.get(id);
            let rel = rd.flags as i64;
            let old_is_bool = oldrel == -1 || BOOLOPS.contains(&(oldrel as u32));
            let new_is_bool = BOOLOPS.contains(&(rel as u32));
            let needs_paren = old_is_bool
                && new_is_bool
                && (oldrel != rel
                    || matches!(rel as u32, REL_COND | REL_UNLESS | REL_ELSE))
                && !(matches!(oldrel as u32, REL_COND | REL_UNLESS) && rel as u32 == REL_ELSE);
            if needs_paren {
                out.push('(');
                self.dep2str_rec(out, rd.name, rel);
                out.push_str(self.id2rel(id));
                self.dep2str_rec(out, rd.evr, rel);
                out.push(')');
                return;
            }
            if rd.flags == REL_KIND {
                self.dep2str_rec(out, rd.evr, rel);
                out.push(':');
                id = rd.name;
                oldrel = rel;
                continue;
            }
            self.dep2str_rec(out, rd.name, rel);
            if rd.flags == REL_NAMESPACE {
                out.push('(');
                self.dep2str_rec(out, rd.evr, rel);
                out.push(')');
                return;
            }
            if rd.flags == REL_FILECONFLICT {
                return;
            }
            out.push_str(self.id2rel(id));
            if self.kind == VersionKind::Apk
                && matches!(rd.flags, 2 | 3 | 6)
                && !rd.evr.is_rel()
                && self.ss.id2str(rd.evr).starts_with('~')
            {
                out.pop(); // fuzzy version carries its own leading ~
            }
            id = rd.evr;
            oldrel = rel;
        }
        out.push_str(self.ss.id2str(id));
    }

    /* ---------- version comparison ---------- */

    pub fn evrcmp(&self, evr1: Id, evr2: Id, mode: CompareMode) -> i32 {
        if evr1 == evr2 {
            return 0;
        }
        evrcmp_str(
            self.kind,
            self.promoteepoch,
            self.id2str(evr1),
            self.id2str(evr2),
            mode,
        )
    }

    pub fn evrcmp_strs(&self, evr1: &str, evr2: &str, mode: CompareMode) -> i32 {
        evrcmp_str(self.kind, self.promoteepoch, evr1, evr2, mode)
    }

    /// Do `provider pflags pevr` and `request flags evr` overlap?
    pub fn intersect_evrs(&self, pflags: u32, pevr: Id, flags: u32, evr: Id) -> bool {
        if pflags == 0 || flags == 0 || pflags >= 8 || flags >= 8 {
            return false;
        }
        if flags == 7 || pflags == 7 {
            return true;
        }
        if pflags & flags & (REL_LT | REL_GT) != 0 {
            return true;
        }
        let r = self.evrcmp(pevr, evr, CompareMode::Match);
        if r == 0 {
            return flags & pflags & REL_EQ != 0;
        }
        if r > 0 {
            return pflags & REL_LT != 0 || flags & REL_GT != 0;
        }
        pflags & REL_GT != 0 || flags & REL_LT != 0
    }

    /* ---------- solvables and repos ---------- */

    pub fn add_repo(&mut self, name: &str) -> RepoId {
        self.free_whatprovides();
        let rid = RepoId(self.repos.len() as u32);
        self.repos
            .push(Some(Repo::new(rid, name, self.solvables.len())));
        rid
    }

    pub fn repo(&self, rid: RepoId) -> &Repo {
        self.repos[rid.index()].as_ref().expect("repo was freed")
    }

    pub fn repo_mut(&mut self, rid: RepoId) -> &mut Repo {
        self.repos[rid.index()].as_mut().expect("repo was freed")
    }

    pub fn repos(&self) -> impl Iterator<Item = &Repo> {
        self.repos.iter().filter_map(|r| r.as_ref())
    }

    pub fn nsolvables(&self) -> usize {
        self.solvables.len()
    }

    pub fn solvable(&self, solvid: i32) -> &Solvable {
        &self.solvables[solvid as usize]
    }

    pub fn solvable_mut(&mut self, solvid: i32) -> &mut Solvable {
        &mut self.solvables[solvid as usize]
    }

    /// Append a fresh solvable to `rid`, returning its solvid.
    pub fn add_solvable(&mut self, rid: RepoId) -> i32 {
        self.free_whatprovides();
        let solvid = self.solvables.len() as i32;
        self.solvables.push(Solvable {
            repo: Some(rid),
            ..Default::default()
        });
        let repo = self.repo_mut(rid);
        if repo.nsolvables == 0 {
            repo.start = solvid as usize;
        }
        if (solvid as usize) < repo.start {
            repo.start = solvid as usize;
        }
        repo.end = solvid as usize + 1;
        repo.nsolvables += 1;
        solvid
    }

    pub fn add_solvable_block(&mut self, rid: RepoId, count: usize) -> i32 {
        let first = self.solvables.len() as i32;
        for _ in 0..count {
            self.add_solvable(rid);
        }
        first
    }

    /// Detach a repo, zeroing out its solvables. With `reuseids` and the
    /// repo being the last one, the solvable ids are given back.
    pub fn free_repo(&mut self, rid: RepoId, reuseids: bool) {
        self.free_whatprovides();
        let Some(repo) = self.repos[rid.index()].take() else {
            return;
        };
        if reuseids && repo.end == self.solvables.len() {
            let mut end = repo.end;
            while end > repo.start && self.solvables[end - 1].repo == Some(rid) {
                end -= 1;
            }
            self.solvables.truncate(end.max(2));
        }
        let start = repo.start.min(self.solvables.len());
        for s in &mut self.solvables[start..] {
            if s.repo == Some(rid) {
                *s = Solvable::default();
            }
        }
        debug!(repo = repo.name, "repo freed");
    }

    /// Add a dependency to one of a solvable's dep lists, with optional
    /// marker partitioning. Invalidates the provider index.
    pub fn solvable_add_deparray(&mut self, solvid: i32, keyname: Id, dep: Id, marker: Marker) {
        let s = self.solvables[solvid as usize];
        let Some(rid) = s.repo else { return };
        let Some(old) = s.dep_offset(keyname) else { return };
        let repo = self.repos[rid.index()].as_mut().expect("repo was freed");
        let new = repo.addid_dep(old, dep, marker);
        self.solvables[solvid as usize].set_dep_offset(keyname, new);
        self.free_whatprovides();
    }

    /// The dependency list of a solvable, marker ids included.
    pub fn solvable_deps(&self, solvid: i32, keyname: Id) -> &[Id] {
        let s = &self.solvables[solvid as usize];
        let Some(rid) = s.repo else { return &[] };
        let Some(off) = s.dep_offset(keyname) else {
            return &[];
        };
        self.repo(rid).deps(off)
    }

    /// True when the solvable can be installed under the active arch policy.
    pub fn installable(&self, s: &Solvable) -> bool {
        if s.is_source() {
            return false;
        }
        self.arch_score(s.arch) != 0
    }

    /// Make sure every non-source solvable of the repo provides its own
    /// `name = evr`.
    pub fn ensure_self_provides(&mut self, rid: RepoId) {
        let (start, end) = {
            let repo = self.repo(rid);
            (repo.start, repo.end)
        };
        for solvid in start..end {
            let s = self.solvables[solvid];
            if s.repo != Some(rid) || s.name.is_null() || s.is_source() {
                continue;
            }
            let rel = self.rels.rel2id(s.name, s.evr, REL_EQ, true);
            if self
                .repo(rid)
                .deps(s.provides)
                .contains(&rel)
            {
                continue;
            }
            let repo = self.repos[rid.index()].as_mut().expect("repo was freed");
            let off = repo.addid_dep(s.provides, rel, Marker::None);
            self.solvables[solvid].provides = off;
        }
        self.free_whatprovides();
    }

    /// Self-provides plus internalization of every repodata stratum.
    pub fn internalize_repo(&mut self, rid: RepoId) {
        self.ensure_self_provides(rid);
        let repo = self.repos[rid.index()].as_mut().expect("repo was freed");
        for data in &mut repo.repodata {
            data.internalize();
        }
    }

    /// Keyname override map across a repo's strata for one solvid; `None`
    /// when a single stratum makes overriding moot.
    pub(crate) fn keyskip_for(&self, rid: RepoId, solvid: i32) -> Option<Keyskip> {
        let repo = self.repo(rid);
        if repo.repodata.len() <= 1 {
            return None;
        }
        let mut ks = Keyskip::new();
        let mut cnt = 0;
        for data in &repo.repodata {
            if solvid == crate::repodata::SOLVID_META
                || (solvid >= data.start() && solvid < data.end())
            {
                ks.fill(data, solvid);
                cnt += 1;
            }
        }
        (cnt > 1).then_some(ks)
    }

    /* ---------- whatprovides index ---------- */

    /// Drop the provider index; it is rebuilt on the next query.
    pub fn free_whatprovides(&mut self) {
        self.whatprovides = Vec::new();
        self.whatprovides_rel = Vec::new();
        self.whatprovidesdata = Vec::new();
    }

    pub fn has_whatprovides(&self) -> bool {
        !self.whatprovides.is_empty()
    }

    /// Build the name -> providers index over all current solvables.
    pub fn create_whatprovides(&mut self) {
        let nstrings = self.ss.len();
        let mut counts = vec![0u32; nstrings];
        for solvid in 2..self.solvables.len() {
            let s = &self.solvables[solvid];
            let Some(rid) = s.repo else { continue };
            if s.provides == 0 {
                continue;
            }
            for &dep in self.repo(rid).deps(s.provides) {
                let mut nid = dep;
                while nid.is_rel() {
                    nid = self.rels.get(nid).name;
                }
                counts[nid.index()] += 1;
            }
        }
        let mut whatprovides = vec![0u32; nstrings];
        // slots 0 and 1 stay reserved so offset 0 means "no providers"
        let mut off = 2u32;
        for (i, &c) in counts.iter().enumerate() {
            if c > 0 {
                whatprovides[i] = off;
                off += c + 1;
            }
        }
        let mut data = vec![Id::NULL; off as usize];
        let mut cursor: Vec<u32> = whatprovides.clone();
        for solvid in 2..self.solvables.len() {
            let s = &self.solvables[solvid];
            let Some(rid) = s.repo else { continue };
            if s.provides == 0 {
                continue;
            }
            let deps: Vec<Id> = self.repo(rid).deps(s.provides).to_vec();
            for dep in deps {
                let mut nid = dep;
                while nid.is_rel() {
                    nid = self.rels.get(nid).name;
                }
                let cur = &mut cursor[nid.index()];
                let start = whatprovides[nid.index()];
                // a solvable providing a name twice registers once
                if *cur > start && data[*cur as usize - 1] == Id(solvid as u32) {
                    continue;
                }
                data[*cur as usize] = Id(solvid as u32);
                *cur += 1;
            }
        }
        self.whatprovides = whatprovides;
        self.whatprovides_rel = vec![0u32; self.rels.len()];
        self.whatprovidesdata = data;
        debug!(
            names = nstrings,
            data = self.whatprovidesdata.len(),
            "whatprovides index built"
        );
    }

    fn wp_run(&self, off: usize) -> &[Id] {
        if off == 0 {
            return &[];
        }
        let end = self.whatprovidesdata[off..]
            .iter()
            .position(|id| id.is_null())
            .map(|n| off + n)
            .unwrap_or(self.whatprovidesdata.len());
        &self.whatprovidesdata[off..end]
    }

    /// Solvids providing `dep`. Builds the index on first use; rel deps are
    /// resolved lazily and cached.
    pub fn whatprovides(&mut self, dep: Id) -> &[Id] {
        if self.whatprovides.is_empty() {
            self.create_whatprovides();
        }
        if dep.is_rel() {
            let idx = dep.rel_index();
            if self.whatprovides_rel.len() <= idx {
                self.whatprovides_rel.resize(self.rels.len(), 0);
            }
            if self.whatprovides_rel[idx] == 0 {
                let off = self.addrelproviders(dep);
                self.whatprovides_rel[idx] = off;
            }
            let off = self.whatprovides_rel[idx] as usize;
            self.wp_run(off)
        } else {
            let off = self.whatprovides.get(dep.index()).copied().unwrap_or(0) as usize;
            self.wp_run(off)
        }
    }

    fn push_providers(&mut self, providers: &[Id]) -> u32 {
        if providers.is_empty() {
            // canonical empty list lives at slot 1
            return 1;
        }
        let off = self.whatprovidesdata.len() as u32;
        self.whatprovidesdata.extend_from_slice(providers);
        self.whatprovidesdata.push(Id::NULL);
        off
    }

    /// Compute providers of a rel dep; the result offset is cached by the
    /// caller.
    fn addrelproviders(&mut self, dep: Id) -> u32 {
        let rd = *self.rels.get(dep);
        let providers: Vec<Id> = match rd.flags {
            REL_AND | REL_WITH => {
                let a = self.whatprovides(rd.name).to_vec();
                let b = self.whatprovides(rd.evr).to_vec();
                a.into_iter().filter(|p| b.contains(p)).collect()
            }
            REL_OR => {
                let a = self.whatprovides(rd.name).to_vec();
                let b = self.whatprovides(rd.evr).to_vec();
                a.into_iter().chain(b).unique().collect()
            }
            REL_ARCH => {
                let cands = self.whatprovides(rd.name).to_vec();
                cands
                    .into_iter()
                    .filter(|&p| self.solvables[p.0 as usize].arch == rd.evr)
                    .collect()
            }
            f @ 1..=7 => {
                let cands = self.whatprovides(rd.name).to_vec();
                let mut out = Vec::new();
                for p in cands {
                    let s = self.solvables[p.0 as usize];
                    let Some(rid) = s.repo else { continue };
                    let provs: Vec<Id> = self.repo(rid).deps(s.provides).to_vec();
                    let mut matched = false;
                    for pid in provs {
                        if pid == rd.name {
                            // unversioned provide matches any range
                            matched = true;
                            break;
                        }
                        if !pid.is_rel() {
                            continue;
                        }
                        let prd = *self.rels.get(pid);
                        if prd.name != rd.name {
                            continue;
                        }
                        if prd.evr.is_rel() || rd.evr.is_rel() {
                            continue;
                        }
                        if self.intersect_evrs(prd.flags, prd.evr, f, rd.evr) {
                            matched = true;
                            break;
                        }
                    }
                    if matched {
                        out.push(p);
                    }
                }
                out
            }
            _ => Vec::new(), // namespaces and conditions have no providers here
        };
        self.push_providers(&providers)
    }

    /* ---------- repodata conveniences ---------- */

    /// Attach (or reuse) the repo's last repodata stratum.
    pub fn repo_last_repodata(&mut self, rid: RepoId) -> usize {
        self.repo_mut(rid).first_repodata()
    }

    pub fn repodata_set_poolstr(
        &mut self,
        rid: RepoId,
        dataid: usize,
        handle: i32,
        keyname: Id,
        value: &str,
    ) {
        let repo = self.repos[rid.index()].as_mut().expect("repo was freed");
        repo.repodata[dataid].set_poolstr(&mut self.ss, handle, keyname, value);
    }

    pub fn repodata_add_poolstr_array(
        &mut self,
        rid: RepoId,
        dataid: usize,
        handle: i32,
        keyname: Id,
        value: &str,
    ) {
        let repo = self.repos[rid.index()].as_mut().expect("repo was freed");
        repo.repodata[dataid].add_poolstr_array(&mut self.ss, handle, keyname, value);
    }

    pub fn repodata_str2dir(&mut self, rid: RepoId, dataid: usize, dir: &str, create: bool) -> DirId {
        let repo = self.repos[rid.index()].as_mut().expect("repo was freed");
        repo.repodata[dataid].str2dir(&mut self.ss, dir, create)
    }

    /// Split a path and record it as a DIRSTRARRAY element.
    pub fn repodata_add_fileprovides(
        &mut self,
        rid: RepoId,
        dataid: usize,
        handle: i32,
        keyname: Id,
        path: &str,
    ) {
        let (dir, base) = match path.rfind('/') {
            Some(0) => ("/", &path[1..]),
            Some(p) => (&path[..p], &path[p + 1..]),
            None => ("", path),
        };
        let repo = self.repos[rid.index()].as_mut().expect("repo was freed");
        let data = &mut repo.repodata[dataid];
        let mut did = data.str2dir(&mut self.ss, dir, true);
        if did.is_null() {
            did = data.str2dir(&mut self.ss, "/", true);
        }
        data.add_dirstr(handle, keyname, did, base);
    }

    /// Record where the package file lives, eliding values derivable from
    /// name/evr/arch as VOID.
    pub fn repodata_set_location(
        &mut self,
        rid: RepoId,
        dataid: usize,
        solvid: i32,
        medianr: u32,
        dir: Option<&str>,
        file: &str,
    ) {
        let s = self.solvables[solvid as usize];
        let arch = self.ss.id2str(s.arch).to_string();
        let name = self.ss.id2str(s.name).to_string();
        let vr = evr_without_epoch(self.ss.id2str(s.evr)).to_string();
        let repo = self.repos[rid.index()].as_mut().expect("repo was freed");
        let data = &mut repo.repodata[dataid];

        if medianr != 0 {
            data.set_constant(solvid, SOLVABLE_MEDIANR, medianr);
        }
        let (mut dir, file) = match dir {
            Some(d) => (d, file),
            None => match file.rfind('/') {
                Some(p) => (&file[..p.max(1)], &file[p + 1..]),
                None => ("", file),
            },
        };
        if let Some(stripped) = dir.strip_prefix("./") {
            if !stripped.starts_with('/') {
                dir = stripped;
            }
        }
        if dir == "." {
            dir = "";
        }
        if !dir.is_empty() {
            if dir == arch {
                data.set_void(solvid, SOLVABLE_MEDIADIR);
            } else {
                data.set_str(solvid, SOLVABLE_MEDIADIR, dir);
            }
        }
        // the common `name-vr.arch.rpm` spelling stores as VOID
        let mut canonical = false;
        if let Some(rest) = file.strip_prefix(name.as_str()) {
            if let Some(rest) = rest.strip_prefix('-') {
                if let Some(rest) = rest.strip_prefix(vr.as_str()) {
                    if let Some(rest) = rest.strip_prefix('.') {
                        if let Some(rest) = rest.strip_prefix(arch.as_str()) {
                            canonical = rest == ".rpm";
                        }
                    }
                }
            }
        }
        if canonical {
            data.set_void(solvid, SOLVABLE_MEDIAFILE);
        } else {
            data.set_str(solvid, SOLVABLE_MEDIAFILE, file);
        }
    }

    /// Record the source package, storing name/evr/arch fragments equal to
    /// the binary package's as VOID.
    pub fn repodata_set_sourcepkg(
        &mut self,
        rid: RepoId,
        dataid: usize,
        solvid: i32,
        sourcepkg: &str,
    ) {
        let s = self.solvables[solvid as usize];
        let Some(base) = sourcepkg.strip_suffix(".rpm") else {
            if !sourcepkg.is_empty() {
                let repo = self.repos[rid.index()].as_mut().expect("repo was freed");
                repo.repodata[dataid].set_str(solvid, SOLVABLE_SOURCENAME, sourcepkg);
            }
            return;
        };
        // name-evr-rel.arch
        let Some(archdot) = base.rfind('.') else { return };
        let sarch = &base[archdot + 1..];
        let rest = &base[..archdot];
        let Some(relpos) = rest.rfind('-') else { return };
        let Some(verpos) = rest[..relpos].rfind('-') else {
            return;
        };
        let sname = &rest[..verpos];
        let sevr = &rest[verpos + 1..];

        let name = self.ss.id2str(s.name).to_string();
        let vr = evr_without_epoch(self.ss.id2str(s.evr)).to_string();
        let sname_id = if sname == name { None } else { Some(self.ss.intern(sname)) };
        let sevr_id = if sevr == vr { None } else { Some(self.ss.intern(sevr)) };
        let sarch_id = match sarch {
            "src" => id::ARCH_SRC,
            "nosrc" => id::ARCH_NOSRC,
            other => self.ss.intern(other),
        };
        let repo = self.repos[rid.index()].as_mut().expect("repo was freed");
        let data = &mut repo.repodata[dataid];
        match sname_id {
            None => data.set_void(solvid, SOLVABLE_SOURCENAME),
            Some(idv) => data.set_id(solvid, SOLVABLE_SOURCENAME, idv),
        }
        match sevr_id {
            None => data.set_void(solvid, SOLVABLE_SOURCEEVR),
            Some(idv) => data.set_id(solvid, SOLVABLE_SOURCEEVR, idv),
        }
        data.set_constantid(solvid, SOLVABLE_SOURCEARCH, sarch_id);
    }

    pub(crate) fn clear_pos(&mut self) {
        self.pos = Datapos::default();
    }

    /* ---------- legacy metadata fixup ---------- */

    /// Rewrite old-style `locale(...)` provides into language-namespace
    /// supplements and `modalias(...)` / `packageand(...)` supplements into
    /// NAMESPACE/AND compounds. Compatibility scaffolding for converted
    /// metadata; callers opt in explicitly. Returns the (possibly new)
    /// supplements offset.
    pub fn fix_legacy_provides(
        &mut self,
        rid: RepoId,
        provides: crate::solvable::Offset,
        mut supplements: crate::solvable::Offset,
    ) -> crate::solvable::Offset {
        if provides != 0 {
            let deps: Vec<Id> = self.repo(rid).deps(provides).to_vec();
            for dep in deps {
                if dep.is_rel() {
                    continue;
                }
                let depstr = self.ss.id2str(dep).to_string();
                if let Some(inner) = depstr
                    .strip_prefix("locale(")
                    .and_then(|r| r.strip_suffix(')'))
                {
                    let (pkg, langs) = match inner.split_once(':') {
                        Some((p, l)) if !p.is_empty() => (Some(p.to_string()), l.to_string()),
                        _ => (None, inner.to_string()),
                    };
                    let mut idv = Id::NULL;
                    for lang in langs.split(';').filter(|l| !l.is_empty()) {
                        let idl = self.ss.intern(&format!("language:{lang}"));
                        idv = if idv.is_null() {
                            idl
                        } else {
                            self.rels.rel2id(idv, idl, REL_OR, true)
                        };
                    }
                    if let Some(p) = pkg {
                        let idp = self.ss.intern(&p);
                        idv = self.rels.rel2id(idp, idv, REL_AND, true);
                    }
                    if !idv.is_null() {
                        let repo = self.repos[rid.index()].as_mut().expect("repo was freed");
                        supplements = repo.addid_dep(supplements, idv, Marker::None);
                    }
                } else if let Some((pkg, path)) = depstr.split_once(':') {
                    if !pkg.is_empty() && path.starts_with('/') {
                        let idp = self.ss.intern(pkg);
                        let idns = self.ss.intern("namespace:installed");
                        let idpath = self.ss.intern(path);
                        let idv = self.rels.rel2id(idns, idpath, REL_NAMESPACE, true);
                        let idv = self.rels.rel2id(idp, idv, REL_AND, true);
                        let repo = self.repos[rid.index()].as_mut().expect("repo was freed");
                        supplements = repo.addid_dep(supplements, idv, Marker::None);
                    }
                }
            }
        }
        if supplements == 0 {
            return 0;
        }
        let deps: Vec<Id> = self.repo(rid).deps(supplements).to_vec();
        for (i, dep) in deps.iter().enumerate() {
            if dep.is_rel() {
                continue;
            }
            let mut depstr = self.ss.id2str(*dep);
            if let Some(rest) = depstr.strip_prefix("system:") {
                if rest.starts_with("modalias(") {
                    depstr = rest;
                }
            }
            let depstr = depstr.to_string();
            let newid = if let Some(inner) = depstr
                .strip_prefix("modalias(")
                .and_then(|r| r.strip_suffix(')'))
                .filter(|r| r.len() >= 2)
            {
                let idns = self.ss.intern("namespace:modalias");
                match inner.split_once(':') {
                    Some((pkg, alias)) if !pkg.is_empty() && alias.contains(':') => {
                        let idp = self.ss.intern(pkg);
                        let ida = self.ss.intern(alias);
                        let idv = self.rels.rel2id(idns, ida, REL_NAMESPACE, true);
                        self.rels.rel2id(idp, idv, REL_AND, true)
                    }
                    _ => {
                        let ida = self.ss.intern(inner);
                        self.rels.rel2id(idns, ida, REL_NAMESPACE, true)
                    }
                }
            } else if let Some(inner) = depstr
                .strip_prefix("packageand(")
                .and_then(|r| r.strip_suffix(')'))
            {
                let mut idv = Id::NULL;
                for pkg in inner.split(':').filter(|p| !p.is_empty()) {
                    let idp = self.ss.intern(pkg);
                    idv = if idv.is_null() {
                        idp
                    } else {
                        self.rels.rel2id(idv, idp, REL_AND, true)
                    };
                }
                idv
            } else {
                continue;
            };
            if !newid.is_null() {
                let repo = self.repos[rid.index()].as_mut().expect("repo was freed");
                repo.idarraydata[supplements as usize + i] = newid;
            }
        }
        supplements
    }
}

/// rpm filenames do not contain the epoch, so strip it.
pub(crate) fn evr_without_epoch(evr: &str) -> &str {
    let b = evr.as_bytes();
    let d = b.iter().position(|c| !c.is_ascii_digit()).unwrap_or(b.len());
    if d > 0 && b.get(d) == Some(&b':') && d + 1 < b.len() {
        &evr[d + 1..]
    } else {
        evr
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::id::{
        ARCH_NOARCH, REL_EQ, REL_GT, SOLVABLE_PROVIDES, SOLVABLE_REQUIRES,
    };

    fn named_solvable(pool: &mut Pool, rid: RepoId, name: &str, evr: &str) -> i32 {
        let sid = pool.add_solvable(rid);
        let n = pool.str2id(name, true);
        let e = pool.str2id(evr, true);
        let s = pool.solvable_mut(sid);
        s.name = n;
        s.evr = e;
        s.arch = ARCH_NOARCH;
        sid
    }

    #[test]
    fn prelude_is_interned() {
        let pool = Pool::new();
        assert_eq!(pool.id2str(crate::id::SOLVABLE_NAME), "solvable:name");
        assert_eq!(pool.ss.find("noarch"), crate::id::ARCH_NOARCH);
    }

    #[test]
    fn id2str_follows_rel_names() {
        let mut pool = Pool::new();
        let n = pool.str2id("pkg", true);
        let e = pool.str2id("1.0", true);
        let rel = pool.rel2id(n, e, REL_EQ, true);
        assert_eq!(pool.id2str(rel), "pkg");
        assert_eq!(pool.id2evr(rel), "1.0");
    }

    #[test]
    fn dep2str_renders_ops() {
        let mut pool = Pool::new();
        let n = pool.str2id("pkg", true);
        let e = pool.str2id("1.0", true);
        let ge = pool.rel2id(n, e, REL_GT | REL_EQ, true);
        assert_eq!(pool.dep2str(ge), "pkg >= 1.0");
        let m = pool.str2id("other", true);
        let and = pool.rel2id(ge, m, REL_AND, true);
        assert_eq!(pool.dep2str(and), "pkg >= 1.0 and other");
        let or_inner = pool.rel2id(n, m, REL_OR, true);
        let and2 = pool.rel2id(or_inner, e, REL_AND, true);
        assert_eq!(pool.dep2str(and2), "(pkg | other) and 1.0");
    }

    #[test]
    fn whatprovides_finds_self_provides() {
        let mut pool = Pool::new();
        let rid = pool.add_repo("test");
        let a = named_solvable(&mut pool, rid, "alpha", "1.0");
        let b = named_solvable(&mut pool, rid, "beta", "2.0");
        pool.ensure_self_provides(rid);
        let alpha = pool.str2id("alpha", true);
        assert_eq!(pool.whatprovides(alpha), &[Id(a as u32)]);
        let beta = pool.str2id("beta", true);
        assert_eq!(pool.whatprovides(beta), &[Id(b as u32)]);
        let nope = pool.str2id("gamma", true);
        assert!(pool.whatprovides(nope).is_empty());
    }

    #[test]
    fn whatprovides_versioned_request() {
        let mut pool = Pool::new();
        let rid = pool.add_repo("test");
        let a1 = named_solvable(&mut pool, rid, "alpha", "1.0-1");
        let a2 = named_solvable(&mut pool, rid, "alpha", "2.0-1");
        pool.ensure_self_provides(rid);
        let alpha = pool.str2id("alpha", true);
        let v2 = pool.str2id("2.0", true);
        let ge2 = pool.rel2id(alpha, v2, REL_GT | REL_EQ, true);
        assert_eq!(pool.whatprovides(ge2), &[Id(a2 as u32)]);
        let gt0 = {
            let v0 = pool.str2id("0.5", true);
            pool.rel2id(alpha, v0, REL_GT, true)
        };
        assert_eq!(pool.whatprovides(gt0), &[Id(a1 as u32), Id(a2 as u32)]);
    }

    #[test]
    fn whatprovides_rel_and_or() {
        let mut pool = Pool::new();
        let rid = pool.add_repo("test");
        let a = named_solvable(&mut pool, rid, "alpha", "1.0");
        let b = named_solvable(&mut pool, rid, "beta", "1.0");
        pool.ensure_self_provides(rid);
        let alpha = pool.str2id("alpha", true);
        let beta = pool.str2id("beta", true);
        let both = pool.rel2id(alpha, beta, REL_AND, true);
        assert!(pool.whatprovides(both).is_empty());
        let either = pool.rel2id(alpha, beta, REL_OR, true);
        assert_eq!(pool.whatprovides(either), &[Id(a as u32), Id(b as u32)]);
    }

    #[test]
    fn deparray_roundtrip() {
        let mut pool = Pool::new();
        let rid = pool.add_repo("test");
        let sid = named_solvable(&mut pool, rid, "alpha", "1.0");
        let dep1 = pool.str2id("libfoo", true);
        let dep2 = pool.str2id("libbar", true);
        pool.solvable_add_deparray(sid, SOLVABLE_REQUIRES, dep1, Marker::None);
        pool.solvable_add_deparray(sid, SOLVABLE_REQUIRES, dep2, Marker::None);
        assert_eq!(pool.solvable_deps(sid, SOLVABLE_REQUIRES), &[dep1, dep2]);
        assert!(pool.solvable_deps(sid, SOLVABLE_PROVIDES).is_empty());
    }

    #[test]
    fn evr_without_epoch_strips() {
        assert_eq!(evr_without_epoch("1:2.0-3"), "2.0-3");
        assert_eq!(evr_without_epoch("2.0-3"), "2.0-3");
        assert_eq!(evr_without_epoch(":2.0"), ":2.0");
    }
}
