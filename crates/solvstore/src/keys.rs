use crate::id::{self, Id};

/// Value type of a repodata key. Each variant has a well-known keyname id so
/// that key tables serialize as plain needed-id references.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum KeyType {
    Void,
    Constant,
    ConstantId,
    Id,
    Num,
    U32,
    Dir,
    Str,
    Binary,
    IdArray,
    RelIdArray,
    DirStrArray,
    DirNumNumArray,
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    FixArray,
    FlexArray,
    Deleted,
}

impl KeyType {
    pub fn keyname(self) -> Id {
        match self {
            KeyType::Void => id::REPOKEY_TYPE_VOID,
            KeyType::Constant => id::REPOKEY_TYPE_CONSTANT,
            KeyType::ConstantId => id::REPOKEY_TYPE_CONSTANTID,
            KeyType::Id => id::REPOKEY_TYPE_ID,
            KeyType::Num => id::REPOKEY_TYPE_NUM,
            KeyType::U32 => id::REPOKEY_TYPE_U32,
            KeyType::Dir => id::REPOKEY_TYPE_DIR,
            KeyType::Str => id::REPOKEY_TYPE_STR,
            KeyType::Binary => id::REPOKEY_TYPE_BINARY,
            KeyType::IdArray => id::REPOKEY_TYPE_IDARRAY,
            KeyType::RelIdArray => id::REPOKEY_TYPE_REL_IDARRAY,
            KeyType::DirStrArray => id::REPOKEY_TYPE_DIRSTRARRAY,
            KeyType::DirNumNumArray => id::REPOKEY_TYPE_DIRNUMNUMARRAY,
            KeyType::Md5 => id::REPOKEY_TYPE_MD5,
            KeyType::Sha1 => id::REPOKEY_TYPE_SHA1,
            KeyType::Sha224 => id::REPOKEY_TYPE_SHA224,
            KeyType::Sha256 => id::REPOKEY_TYPE_SHA256,
            KeyType::Sha384 => id::REPOKEY_TYPE_SHA384,
            KeyType::Sha512 => id::REPOKEY_TYPE_SHA512,
            KeyType::FixArray => id::REPOKEY_TYPE_FIXARRAY,
            KeyType::FlexArray => id::REPOKEY_TYPE_FLEXARRAY,
            KeyType::Deleted => id::REPOKEY_TYPE_DELETED,
        }
    }

    pub fn from_keyname(name: Id) -> Option<KeyType> {
        Some(match name {
            id::REPOKEY_TYPE_VOID => KeyType::Void,
            id::REPOKEY_TYPE_CONSTANT => KeyType::Constant,
            id::REPOKEY_TYPE_CONSTANTID => KeyType::ConstantId,
            id::REPOKEY_TYPE_ID => KeyType::Id,
            id::REPOKEY_TYPE_NUM => KeyType::Num,
            id::REPOKEY_TYPE_U32 => KeyType::U32,
            id::REPOKEY_TYPE_DIR => KeyType::Dir,
            id::REPOKEY_TYPE_STR => KeyType::Str,
            id::REPOKEY_TYPE_BINARY => KeyType::Binary,
            id::REPOKEY_TYPE_IDARRAY => KeyType::IdArray,
            id::REPOKEY_TYPE_REL_IDARRAY => KeyType::RelIdArray,
            id::REPOKEY_TYPE_DIRSTRARRAY => KeyType::DirStrArray,
            id::REPOKEY_TYPE_DIRNUMNUMARRAY => KeyType::DirNumNumArray,
            id::REPOKEY_TYPE_MD5 => KeyType::Md5,
            id::REPOKEY_TYPE_SHA1 => KeyType::Sha1,
            id::REPOKEY_TYPE_SHA224 => KeyType::Sha224,
            id::REPOKEY_TYPE_SHA256 => KeyType::Sha256,
            id::REPOKEY_TYPE_SHA384 => KeyType::Sha384,
            id::REPOKEY_TYPE_SHA512 => KeyType::Sha512,
            id::REPOKEY_TYPE_FIXARRAY => KeyType::FixArray,
            id::REPOKEY_TYPE_FLEXARRAY => KeyType::FlexArray,
            id::REPOKEY_TYPE_DELETED => KeyType::Deleted,
            _ => return None,
        })
    }

    /// Byte length of the checksum variants, `None` for everything else.
    pub fn checksum_len(self) -> Option<usize> {
        Some(match self {
            KeyType::Md5 => 16,
            KeyType::Sha1 => 20,
            KeyType::Sha224 => 28,
            KeyType::Sha256 => 32,
            KeyType::Sha384 => 48,
            KeyType::Sha512 => 64,
            _ => return None,
        })
    }

    pub fn is_checksum(self) -> bool {
        self.checksum_len().is_some()
    }

    pub fn is_array(self) -> bool {
        matches!(
            self,
            KeyType::IdArray
                | KeyType::RelIdArray
                | KeyType::DirStrArray
                | KeyType::DirNumNumArray
                | KeyType::FixArray
                | KeyType::FlexArray
        )
    }
}

/// Where a key's values live in the serialized form.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum KeyStorage {
    /// Key was filtered out; not written at all.
    Dropped,
    /// Fixed column of the solvable record.
    Solvable,
    /// Interleaved with the other keys of the entry.
    Incore,
    /// Offset/length pair incore, value bytes in the paged vertical blob.
    VerticalOffset,
    /// Packed into the shared id-array block (format v9).
    IdArrayBlock,
}

impl KeyStorage {
    pub fn to_wire(self) -> u32 {
        match self {
            KeyStorage::Dropped => 0,
            KeyStorage::Solvable => 1,
            KeyStorage::Incore => 2,
            KeyStorage::VerticalOffset => 3,
            KeyStorage::IdArrayBlock => 4,
        }
    }

    pub fn from_wire(v: u32) -> Option<KeyStorage> {
        Some(match v {
            0 => KeyStorage::Dropped,
            1 => KeyStorage::Solvable,
            2 => KeyStorage::Incore,
            3 => KeyStorage::VerticalOffset,
            4 => KeyStorage::IdArrayBlock,
            _ => return None,
        })
    }
}

/// A key of a repodata area: keyname, value type, size hint and storage.
///
/// `size` counts ids for id-typed keys and bytes for vertical keys; for
/// CONSTANT/CONSTANTID it holds the constant itself.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Repokey {
    pub name: Id,
    pub typ: KeyType,
    pub size: u32,
    pub storage: KeyStorage,
}

impl Repokey {
    pub fn new(name: Id, typ: KeyType, size: u32, storage: KeyStorage) -> Self {
        Repokey { name, typ, size, storage }
    }

    /// The all-zero key occupying index 0 of every key table.
    pub fn null() -> Self {
        Repokey {
            name: Id::NULL,
            typ: KeyType::Void,
            size: 0,
            storage: KeyStorage::Dropped,
        }
    }
}
