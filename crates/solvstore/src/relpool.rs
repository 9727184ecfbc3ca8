//! Interned dependency relations.
//!
//! A rel is a `(name, evr, flags)` triple expressing `name op evr` or a
//! logical combinator of two deps; `name` and `evr` may themselves be rel
//! ids, so arbitrary dependency trees intern to a single id.

use crate::id::Id;

#[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
pub struct RelDep {
    pub name: Id,
    pub evr: Id,
    pub flags: u32,
}

fn relhash(name: Id, evr: Id, flags: u32) -> u32 {
    name.0
        .wrapping_mul(7)
        ^ evr.0.wrapping_mul(13)
        ^ flags.wrapping_mul(23)
}

fn mkmask(num: usize) -> u32 {
    let mut n = (num.max(8) * 2) as u32;
    while n & (n - 1) != 0 {
        n &= n - 1;
    }
    n * 2 - 1
}

const HASHCHAIN_START: u32 = 7;

#[derive(Clone)]
pub struct RelPool {
    rels: Vec<RelDep>,
    hashtbl: Vec<u32>,
    hashmask: u32,
}

impl Default for RelPool {
    fn default() -> Self {
        Self::new()
    }
}

impl RelPool {
    pub fn new() -> Self {
        RelPool {
            rels: vec![RelDep::default()],
            hashtbl: Vec::new(),
            hashmask: 0,
        }
    }

    /// Number of rel slots including the reserved zero entry.
    pub fn len(&self) -> usize {
        self.rels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rels.len() <= 1
    }

    /// The triple behind a rel id.
    pub fn get(&self, id: Id) -> &RelDep {
        debug_assert!(id.is_rel());
        &self.rels[id.rel_index()]
    }

    pub fn get_index(&self, index: usize) -> &RelDep {
        &self.rels[index]
    }

    /// Intern a rel, creating it when `create` is set. Returns `Id::NULL`
    /// when the triple is unknown and `create` is false. Repeated creates of
    /// the same triple return the same id.
    pub fn rel2id(&mut self, name: Id, evr: Id, flags: u32, create: bool) -> Id {
        if self.rels.len() as u32 * 2 >= self.hashmask || self.hashtbl.is_empty() {
            self.rebuild_hash();
        }
        let mask = self.hashmask;
        let mut h = relhash(name, evr, flags) & mask;
        let mut hh = HASHCHAIN_START;
        loop {
            let id = self.hashtbl[h as usize];
            if id == 0 {
                break;
            }
            let rd = &self.rels[id as usize];
            if rd.name == name && rd.evr == evr && rd.flags == flags {
                return Id::new_rel(id as usize);
            }
            h = (h + hh) & mask;
            hh += 1;
        }
        if !create {
            return Id::NULL;
        }
        let index = self.rels.len() as u32;
        self.hashtbl[h as usize] = index;
        self.rels.push(RelDep { name, evr, flags });
        Id::new_rel(index as usize)
    }

    pub fn free_hash(&mut self) {
        self.hashtbl = Vec::new();
        self.hashmask = 0;
    }

    fn rebuild_hash(&mut self) {
        let mask = mkmask(self.rels.len() + 1);
        self.hashmask = mask;
        self.hashtbl = vec![0u32; mask as usize + 1];
        for i in 1..self.rels.len() {
            let rd = self.rels[i];
            let mut h = relhash(rd.name, rd.evr, rd.flags) & mask;
            let mut hh = HASHCHAIN_START;
            while self.hashtbl[h as usize] != 0 {
                h = (h + hh) & mask;
                hh += 1;
            }
            self.hashtbl[h as usize] = i as u32;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::id::{REL_EQ, REL_OR};

    #[test]
    fn rel2id_is_idempotent() {
        let mut rp = RelPool::new();
        let a = rp.rel2id(Id(5), Id(9), REL_EQ, true);
        let b = rp.rel2id(Id(5), Id(9), REL_EQ, true);
        assert_eq!(a, b);
        assert!(a.is_rel());
        assert_eq!(rp.get(a), &RelDep { name: Id(5), evr: Id(9), flags: REL_EQ });
    }

    #[test]
    fn lookup_without_create_misses() {
        let mut rp = RelPool::new();
        assert!(rp.rel2id(Id(5), Id(9), REL_EQ, false).is_null());
    }

    #[test]
    fn rels_nest() {
        let mut rp = RelPool::new();
        let inner = rp.rel2id(Id(5), Id(9), REL_EQ, true);
        let outer = rp.rel2id(inner, Id(7), REL_OR, true);
        assert_eq!(rp.get(outer).name, inner);
        assert!(rp.get(outer).name.is_rel());
    }

    #[test]
    fn survives_growth() {
        let mut rp = RelPool::new();
        let ids: Vec<_> = (0..3000u32)
            .map(|i| rp.rel2id(Id(i + 2), Id(1), REL_EQ, true))
            .collect();
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(rp.rel2id(Id(i as u32 + 2), Id(1), REL_EQ, false), *id);
        }
    }
}
