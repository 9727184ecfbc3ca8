use std::fmt;

/// An interned identifier.
///
/// Bit 31 distinguishes the two id spaces: clear means an index into the
/// string pool, set means an index into the rel pool. This tag is preserved
/// on the wire for `.solv` interchange; use [`Id::is_rel`] and
/// [`Id::rel_index`] to take it apart.
#[repr(transparent)]
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(pub u32);

const REL_BIT: u32 = 0x8000_0000;

impl Id {
    pub const NULL: Id = Id(0);
    pub const EMPTY: Id = Id(1);

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn is_rel(self) -> bool {
        self.0 & REL_BIT != 0
    }

    /// Index into the rel pool. Only meaningful when [`Id::is_rel`] is true.
    #[inline]
    pub fn rel_index(self) -> usize {
        (self.0 ^ REL_BIT) as usize
    }

    #[inline]
    pub fn new_rel(index: usize) -> Id {
        Id(index as u32 | REL_BIT)
    }

    /// Index into the string pool. Only meaningful for non-rel ids.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_rel() {
            write!(f, "Id(rel {})", self.rel_index())
        } else {
            write!(f, "Id({})", self.0)
        }
    }
}

/// An entry in a [`crate::dirpool::DirPool`]. Dir 0 is the sentinel parent,
/// dir 1 is the root directory `/`.
#[repr(transparent)]
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct DirId(pub u32);

impl DirId {
    pub const NULL: DirId = DirId(0);
    pub const ROOT: DirId = DirId(1);

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a repo inside its pool.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct RepoId(pub u32);

impl RepoId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/* comparison flags of a rel; unions of GT/EQ/LT express >=, <=, != */
pub const REL_GT: u32 = 1;
pub const REL_EQ: u32 = 2;
pub const REL_LT: u32 = 4;

/* logical connectives and special relations */
pub const REL_AND: u32 = 16;
pub const REL_OR: u32 = 17;
pub const REL_WITH: u32 = 18;
pub const REL_NAMESPACE: u32 = 19;
pub const REL_ARCH: u32 = 20;
pub const REL_FILECONFLICT: u32 = 21;
pub const REL_COND: u32 = 22;
pub const REL_COMPAT: u32 = 23;
pub const REL_KIND: u32 = 24;
pub const REL_MULTIARCH: u32 = 25;
pub const REL_ELSE: u32 = 26;
pub const REL_ERROR: u32 = 27;
pub const REL_WITHOUT: u32 = 28;
pub const REL_UNLESS: u32 = 29;
pub const REL_CONDA: u32 = 30;

/* Well-known ids. The prelude below is interned into every pool at creation
 * in exactly this order; .solv files depend on these numbers. */
pub const ID_NULL: Id = Id(0);
pub const ID_EMPTY: Id = Id(1);
pub const REPOSITORY_SOLVABLES: Id = Id(2);
pub const SOLVABLE_NAME: Id = Id(3);
pub const SOLVABLE_ARCH: Id = Id(4);
pub const SOLVABLE_EVR: Id = Id(5);
pub const SOLVABLE_VENDOR: Id = Id(6);
pub const SOLVABLE_PROVIDES: Id = Id(7);
pub const SOLVABLE_OBSOLETES: Id = Id(8);
pub const SOLVABLE_CONFLICTS: Id = Id(9);
pub const SOLVABLE_REQUIRES: Id = Id(10);
pub const SOLVABLE_RECOMMENDS: Id = Id(11);
pub const SOLVABLE_SUGGESTS: Id = Id(12);
pub const SOLVABLE_SUPPLEMENTS: Id = Id(13);
pub const SOLVABLE_ENHANCES: Id = Id(14);
/* regular requires before this marker, prereqs after it */
pub const SOLVABLE_PREREQMARKER: Id = Id(15);
/* plain provides before this marker, generated file provides after it */
pub const SOLVABLE_FILEMARKER: Id = Id(16);
pub const RPM_RPMDBID: Id = Id(17);
pub const ARCH_SRC: Id = Id(18);
pub const ARCH_NOSRC: Id = Id(19);
pub const ARCH_NOARCH: Id = Id(20);
pub const REPOKEY_TYPE_VOID: Id = Id(21);
pub const REPOKEY_TYPE_CONSTANT: Id = Id(22);
pub const REPOKEY_TYPE_CONSTANTID: Id = Id(23);
pub const REPOKEY_TYPE_ID: Id = Id(24);
pub const REPOKEY_TYPE_NUM: Id = Id(25);
pub const REPOKEY_TYPE_U32: Id = Id(26);
pub const REPOKEY_TYPE_DIR: Id = Id(27);
pub const REPOKEY_TYPE_STR: Id = Id(28);
pub const REPOKEY_TYPE_BINARY: Id = Id(29);
pub const REPOKEY_TYPE_IDARRAY: Id = Id(30);
pub const REPOKEY_TYPE_REL_IDARRAY: Id = Id(31);
pub const REPOKEY_TYPE_DIRSTRARRAY: Id = Id(32);
pub const REPOKEY_TYPE_DIRNUMNUMARRAY: Id = Id(33);
pub const REPOKEY_TYPE_MD5: Id = Id(34);
pub const REPOKEY_TYPE_SHA1: Id = Id(35);
pub const REPOKEY_TYPE_SHA224: Id = Id(36);
pub const REPOKEY_TYPE_SHA256: Id = Id(37);
pub const REPOKEY_TYPE_SHA384: Id = Id(38);
pub const REPOKEY_TYPE_SHA512: Id = Id(39);
pub const REPOKEY_TYPE_FIXARRAY: Id = Id(40);
pub const REPOKEY_TYPE_FLEXARRAY: Id = Id(41);
pub const REPOKEY_TYPE_DELETED: Id = Id(42);
pub const SOLVABLE_FILELIST: Id = Id(43);
pub const SOLVABLE_SUMMARY: Id = Id(44);
pub const SOLVABLE_DESCRIPTION: Id = Id(45);
pub const SOLVABLE_CHECKSUM: Id = Id(46);
pub const SOLVABLE_MEDIADIR: Id = Id(47);
pub const SOLVABLE_MEDIAFILE: Id = Id(48);
pub const SOLVABLE_MEDIANR: Id = Id(49);
pub const SOLVABLE_SOURCENAME: Id = Id(50);
pub const SOLVABLE_SOURCEEVR: Id = Id(51);
pub const SOLVABLE_SOURCEARCH: Id = Id(52);
pub const SOLVABLE_BUILDTIME: Id = Id(53);
pub const SOLVABLE_INSTALLSIZE: Id = Id(54);
pub const NAMESPACE_INSTALLED: Id = Id(55);
pub const NAMESPACE_MODALIAS: Id = Id(56);

/// First id that is not part of the built-in prelude.
pub const ID_NUM_INTERNAL: u32 = 57;

/// The prelude strings, in id order.
pub(crate) const INITPOOL_DATA: [&str; ID_NUM_INTERNAL as usize] = [
    "<NULL>",
    "",
    "repository:solvables",
    "solvable:name",
    "solvable:arch",
    "solvable:evr",
    "solvable:vendor",
    "solvable:provides",
    "solvable:obsoletes",
    "solvable:conflicts",
    "solvable:requires",
    "solvable:recommends",
    "solvable:suggests",
    "solvable:supplements",
    "solvable:enhances",
    "solvable:prereqmarker",
    "solvable:filemarker",
    "rpm:dbid",
    "src",
    "nosrc",
    "noarch",
    "repokey:type:void",
    "repokey:type:constant",
    "repokey:type:constantid",
    "repokey:type:id",
    "repokey:type:num",
    "repokey:type:u32",
    "repokey:type:dir",
    "repokey:type:str",
    "repokey:type:binary",
    "repokey:type:idarray",
    "repokey:type:rel_idarray",
    "repokey:type:dirstrarray",
    "repokey:type:dirnumnumarray",
    "repokey:type:md5",
    "repokey:type:sha1",
    "repokey:type:sha224",
    "repokey:type:sha256",
    "repokey:type:sha384",
    "repokey:type:sha512",
    "repokey:type:fixarray",
    "repokey:type:flexarray",
    "repokey:type:deleted",
    "solvable:filelist",
    "solvable:summary",
    "solvable:description",
    "solvable:checksum",
    "solvable:mediadir",
    "solvable:mediafile",
    "solvable:medianr",
    "solvable:sourcename",
    "solvable:sourceevr",
    "solvable:sourcearch",
    "solvable:buildtime",
    "solvable:installsize",
    "namespace:installed",
    "namespace:modalias",
];

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rel_tagging_roundtrips() {
        let id = Id::new_rel(17);
        assert!(id.is_rel());
        assert_eq!(id.rel_index(), 17);
        assert!(!SOLVABLE_NAME.is_rel());
    }

    #[test]
    fn wellknown_ids_match_prelude() {
        assert_eq!(INITPOOL_DATA[SOLVABLE_NAME.index()], "solvable:name");
        assert_eq!(INITPOOL_DATA[SOLVABLE_PREREQMARKER.index()], "solvable:prereqmarker");
        assert_eq!(INITPOOL_DATA[SOLVABLE_FILEMARKER.index()], "solvable:filemarker");
        assert_eq!(SOLVABLE_NAME, Id(3));
        assert_eq!(SOLVABLE_ENHANCES, Id(14));
        assert_eq!(SOLVABLE_PREREQMARKER, Id(15));
        assert_eq!(SOLVABLE_FILEMARKER, Id(16));
    }
}
