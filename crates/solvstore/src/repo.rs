//! A repo groups solvables that share one id-array arena and carries the
//! attribute strata (repodata) loaded for them.

use crate::id::{Id, RepoId};
use crate::repodata::Repodata;
use crate::solvable::Offset;

/// Marker policy for [`Repo::addid_dep`].
///
/// A dependency list may be partitioned by a marker id (the prereq marker in
/// requires, the file marker in provides): entries after the marker form the
/// second half.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Marker {
    /// Plain set-union append, no partition.
    None,
    /// Add into the half after `marker`, inserting the marker if missing.
    After(Id),
    /// Add into the half before `marker`.
    Before(Id),
}

pub struct Repo {
    pub name: String,
    pub(crate) id: RepoId,
    /// First solvable id belonging to this repo.
    pub start: usize,
    /// One past the last solvable id.
    pub end: usize,
    pub nsolvables: usize,
    /// Id-array arena: zero-terminated runs, slot 0 reserved.
    pub(crate) idarraydata: Vec<Id>,
    /// Offset of the most recently appended run, for in-place extension.
    pub(crate) lastoff: Offset,
    /// Per-solvable rpm database ids, indexed by `solvid - start`.
    pub rpmdbid: Option<Vec<u32>>,
    pub(crate) repodata: Vec<Repodata>,
}

impl Repo {
    pub(crate) fn new(id: RepoId, name: &str, start: usize) -> Self {
        Repo {
            name: name.to_string(),
            id,
            start,
            end: start,
            nsolvables: 0,
            idarraydata: Vec::new(),
            lastoff: 0,
            rpmdbid: None,
            repodata: Vec::new(),
        }
    }

    pub fn id(&self) -> RepoId {
        self.id
    }

    /// The zero-terminated id run at `off` (terminator excluded). Offset 0
    /// is the canonical empty list.
    pub fn deps(&self, off: Offset) -> &[Id] {
        if off == 0 {
            return &[];
        }
        let start = off as usize;
        let end = self.idarraydata[start..]
            .iter()
            .position(|id| id.is_null())
            .map(|n| start + n)
            .unwrap_or(self.idarraydata.len());
        &self.idarraydata[start..end]
    }

    fn ensure_idarray(&mut self) {
        if self.idarraydata.is_empty() {
            self.idarraydata.push(Id::NULL);
            self.lastoff = 0;
        }
    }

    /// Append `id` to the run at `olddeps` (0 allocates a fresh run),
    /// returning the new offset. Appending to the most recent run extends it
    /// in place; older runs are copied to the end, leaving a hole.
    pub fn addid(&mut self, olddeps: Offset, id: Id) -> Offset {
        self.ensure_idarray();
        let olddeps = if olddeps == 0 {
            self.idarraydata.len() as Offset
        } else if olddeps == self.lastoff {
            self.idarraydata.pop(); // drop terminator, re-add below
            olddeps
        } else {
            let newoff = self.idarraydata.len() as Offset;
            let mut i = olddeps as usize;
            while !self.idarraydata[i].is_null() {
                let v = self.idarraydata[i];
                self.idarraydata.push(v);
                i += 1;
            }
            newoff
        };
        self.idarraydata.push(id);
        self.idarraydata.push(Id::NULL);
        self.lastoff = olddeps;
        olddeps
    }

    /// Add a dependency id, unifying duplicates and honoring the marker
    /// partition. An id found in the wrong half is relocated across the
    /// marker.
    pub fn addid_dep(&mut self, olddeps: Offset, id: Id, marker: Marker) -> Offset {
        if olddeps == 0 {
            return match marker {
                Marker::After(m) => {
                    let off = self.addid(0, m);
                    self.addid(off, id)
                }
                _ => self.addid(0, id),
            };
        }
        let (marker_id, before) = match marker {
            Marker::None => {
                let mut i = olddeps as usize;
                while !self.idarraydata[i].is_null() {
                    if self.idarraydata[i] == id {
                        return olddeps;
                    }
                    i += 1;
                }
                return self.addid(olddeps, id);
            }
            Marker::After(m) => (m, false),
            Marker::Before(m) => (m, true),
        };

        let mut markerp = None;
        let mut i = olddeps as usize;
        let mut found = false;
        while !self.idarraydata[i].is_null() {
            if self.idarraydata[i] == marker_id {
                markerp = Some(i);
            } else if self.idarraydata[i] == id {
                found = true;
                break;
            }
            i += 1;
        }

        if found {
            if markerp.is_some() || before {
                return olddeps;
            }
            // found before the marker but we want it after: relocate
            let idpos = i;
            let mut j = idpos + 1;
            while !self.idarraydata[j].is_null() {
                if self.idarraydata[j] == marker_id {
                    break;
                }
                j += 1;
            }
            if self.idarraydata[j].is_null() {
                // no marker in the array yet
                let last = j - 1;
                self.idarraydata.copy_within(idpos + 1..last + 1, idpos);
                self.idarraydata[last] = marker_id;
                return self.addid(olddeps, id);
            }
            let mut end = j;
            while !self.idarraydata[end + 1].is_null() {
                end += 1;
            }
            self.idarraydata.copy_within(idpos + 1..end + 1, idpos);
            self.idarraydata[end] = id;
            return olddeps;
        }

        // id not yet in the array
        if !before && markerp.is_none() {
            let olddeps = self.addid(olddeps, marker_id);
            return self.addid(olddeps, id);
        }
        if before {
            if let Some(mp) = markerp {
                // shift the prereq half right by one, insert before marker
                let end = i; // terminator position
                self.idarraydata[mp] = id;
                let tail = self.idarraydata[end - 1];
                self.idarraydata.copy_within(mp + 1..end - 1, mp + 2);
                self.idarraydata[mp + 1] = marker_id;
                return self.addid(olddeps, tail);
            }
        }
        self.addid(olddeps, id)
    }

    /// Append a complete run in one go (used by the reader).
    pub(crate) fn add_ids(&mut self, ids: &[Id]) -> Offset {
        self.ensure_idarray();
        let off = self.idarraydata.len() as Offset;
        self.idarraydata.extend_from_slice(ids);
        self.idarraydata.push(Id::NULL);
        self.lastoff = off;
        off
    }

    /// Pre-size a run for `num` upcoming ids, returning its offset. If the
    /// run at `olddeps` cannot grow in place it is moved to the end,
    /// leaving a hole at the old position.
    pub fn reserve_ids(&mut self, olddeps: Offset, num: usize) -> Offset {
        self.ensure_idarray();
        self.idarraydata.reserve(num + 1);
        if olddeps == 0 {
            self.lastoff = self.idarraydata.len() as Offset;
            self.idarraydata.push(Id::NULL);
            return self.lastoff;
        }
        if olddeps == self.lastoff {
            return olddeps;
        }
        let newoff = self.idarraydata.len() as Offset;
        let mut i = olddeps as usize;
        while !self.idarraydata[i].is_null() {
            let v = self.idarraydata[i];
            self.idarraydata.push(v);
            i += 1;
        }
        self.idarraydata.push(Id::NULL);
        self.lastoff = newoff;
        newoff
    }

    /// Number of attribute strata (a repo may stack several repodata areas).
    pub fn nrepodata(&self) -> usize {
        self.repodata.len()
    }

    pub fn repodata_iter(&self) -> impl Iterator<Item = &Repodata> {
        self.repodata.iter()
    }

    pub fn data(&self, dataid: usize) -> &Repodata {
        &self.repodata[dataid]
    }

    pub fn data_mut(&mut self, dataid: usize) -> &mut Repodata {
        &mut self.repodata[dataid]
    }

    /// Attach a fresh repodata area. With `localpool` set the area interns
    /// its strings into a private pool instead of the global one.
    pub fn add_repodata(&mut self, localpool: bool) -> usize {
        let dataid = self.repodata.len();
        self.repodata.push(Repodata::new(dataid, localpool));
        dataid
    }

    /// First repodata, created on demand; the common single-stratum case.
    pub fn first_repodata(&mut self) -> usize {
        if self.repodata.is_empty() {
            self.add_repodata(false)
        } else {
            self.repodata.len() - 1
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::id::SOLVABLE_PREREQMARKER;

    fn repo() -> Repo {
        Repo::new(RepoId(0), "test", 2)
    }

    fn ids(repo: &Repo, off: Offset) -> Vec<u32> {
        repo.deps(off).iter().map(|id| id.0).collect()
    }

    #[test]
    fn addid_appends_in_place_at_end() {
        let mut r = repo();
        let off = r.addid(0, Id(10));
        let off = r.addid(off, Id(11));
        let off = r.addid(off, Id(12));
        assert_eq!(ids(&r, off), [10, 11, 12]);
        assert_eq!(r.idarraydata[0], Id::NULL);
    }

    #[test]
    fn addid_copies_old_run_when_not_last() {
        let mut r = repo();
        let a = r.addid(0, Id(10));
        let b = r.addid(0, Id(20));
        let a2 = r.addid(a, Id(11));
        assert_ne!(a, a2);
        assert_eq!(ids(&r, a2), [10, 11]);
        assert_eq!(ids(&r, b), [20]);
    }

    #[test]
    fn addid_dep_unifies() {
        let mut r = repo();
        let off = r.addid_dep(0, Id(10), Marker::None);
        let off = r.addid_dep(off, Id(11), Marker::None);
        let off2 = r.addid_dep(off, Id(10), Marker::None);
        assert_eq!(off, off2);
        assert_eq!(ids(&r, off2), [10, 11]);
    }

    #[test]
    fn marker_partitions_requires() {
        let m = SOLVABLE_PREREQMARKER;
        let mut r = repo();
        let off = r.addid_dep(0, Id(10), Marker::Before(m));
        let off = r.addid_dep(off, Id(11), Marker::After(m));
        let off = r.addid_dep(off, Id(12), Marker::Before(m));
        assert_eq!(ids(&r, off), [10, 12, m.0, 11]);
    }

    #[test]
    fn found_in_wrong_half_is_relocated() {
        let m = SOLVABLE_PREREQMARKER;
        let mut r = repo();
        let off = r.addid_dep(0, Id(10), Marker::Before(m));
        let off = r.addid_dep(off, Id(11), Marker::Before(m));
        // now ask for 10 as a prereq: it must move after the marker
        let off = r.addid_dep(off, Id(10), Marker::After(m));
        assert_eq!(ids(&r, off), [11, m.0, 10]);
    }

    #[test]
    fn after_marker_dedups_in_prereq_half() {
        let m = SOLVABLE_PREREQMARKER;
        let mut r = repo();
        let off = r.addid_dep(0, Id(10), Marker::After(m));
        let off2 = r.addid_dep(off, Id(10), Marker::After(m));
        assert_eq!(off, off2);
        assert_eq!(ids(&r, off), [m.0, 10]);
    }

    #[test]
    fn reserve_then_fill() {
        let mut r = repo();
        let off = r.reserve_ids(0, 3);
        let off2 = r.addid(off, Id(7));
        assert_eq!(off, off2);
        let off3 = r.addid(off2, Id(8));
        assert_eq!(ids(&r, off3), [7, 8]);
    }
}
