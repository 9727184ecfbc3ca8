//! The fixed per-package record. Dependency lists live in the owning repo's
//! id-array arena; a solvable only stores offsets into it.

use crate::id::{
    ARCH_NOSRC, ARCH_SRC, Id, RepoId, SOLVABLE_CONFLICTS, SOLVABLE_ENHANCES, SOLVABLE_OBSOLETES,
    SOLVABLE_PROVIDES, SOLVABLE_RECOMMENDS, SOLVABLE_REQUIRES, SOLVABLE_SUGGESTS,
    SOLVABLE_SUPPLEMENTS,
};

/// Offset into a repo's `idarraydata`; 0 means "no list".
pub type Offset = u32;

#[derive(Copy, Clone, Default, Debug)]
pub struct Solvable {
    /// Owning repo, `None` for freed or reserved slots.
    pub repo: Option<RepoId>,
    pub name: Id,
    pub arch: Id,
    /// `epoch:version-release`.
    pub evr: Id,
    pub vendor: Id,

    pub provides: Offset,
    pub obsoletes: Offset,
    pub conflicts: Offset,
    pub requires: Offset,
    pub recommends: Offset,
    pub suggests: Offset,
    pub supplements: Offset,
    pub enhances: Offset,
}

/// The eight dependency-list keynames in solvable column order.
pub const DEP_KEYS: [Id; 8] = [
    SOLVABLE_PROVIDES,
    SOLVABLE_OBSOLETES,
    SOLVABLE_CONFLICTS,
    SOLVABLE_REQUIRES,
    SOLVABLE_RECOMMENDS,
    SOLVABLE_SUGGESTS,
    SOLVABLE_SUPPLEMENTS,
    SOLVABLE_ENHANCES,
];

impl Solvable {
    pub fn dep_offset(&self, keyname: Id) -> Option<Offset> {
        Some(match keyname {
            SOLVABLE_PROVIDES => self.provides,
            SOLVABLE_OBSOLETES => self.obsoletes,
            SOLVABLE_CONFLICTS => self.conflicts,
            SOLVABLE_REQUIRES => self.requires,
            SOLVABLE_RECOMMENDS => self.recommends,
            SOLVABLE_SUGGESTS => self.suggests,
            SOLVABLE_SUPPLEMENTS => self.supplements,
            SOLVABLE_ENHANCES => self.enhances,
            _ => return None,
        })
    }

    pub fn set_dep_offset(&mut self, keyname: Id, off: Offset) -> bool {
        match keyname {
            SOLVABLE_PROVIDES => self.provides = off,
            SOLVABLE_OBSOLETES => self.obsoletes = off,
            SOLVABLE_CONFLICTS => self.conflicts = off,
            SOLVABLE_REQUIRES => self.requires = off,
            SOLVABLE_RECOMMENDS => self.recommends = off,
            SOLVABLE_SUGGESTS => self.suggests = off,
            SOLVABLE_SUPPLEMENTS => self.supplements = off,
            SOLVABLE_ENHANCES => self.enhances = off,
            _ => return false,
        }
        true
    }

    /// Source packages never install.
    pub fn is_source(&self) -> bool {
        self.arch == ARCH_SRC || self.arch == ARCH_NOSRC
    }
}
