//! Architecture compatibility scoring.
//!
//! Every known arch id gets a score; higher bits separate incompatible
//! families, the low bits rank preference within a family. Score 0 means
//! "not installable on this pool".

use crate::id::{ARCH_NOARCH, Id};
use crate::pool::Pool;

const ARCHPOLICIES: [(&str, &str); 20] = [
    ("x86_64", "x86_64:i686:i586:i486:i386"),
    ("i686", "i686:i586:i486:i386"),
    ("i586", "i586:i486:i386"),
    ("i486", "i486:i386"),
    ("i386", "i386"),
    ("s390x", "s390x:s390"),
    ("s390", "s390"),
    ("ia64", "ia64:i686:i586:i486:i386"),
    ("ppc64", "ppc64:ppc"),
    ("ppc", "ppc"),
    ("armv6l", "armv6l:armv5tejl:armv5tel:armv5l:armv4tl:armv4l:armv3l"),
    ("armv5tejl", "armv5tejl:armv5tel:armv5l:armv4tl:armv4l:armv3l"),
    ("armv5tel", "armv5tel:armv5l:armv4tl:armv4l:armv3l"),
    ("armv5l", "armv5l:armv4tl:armv4l:armv3l"),
    ("armv4tl", "armv4tl:armv4l:armv3l"),
    ("armv4l", "armv4l:armv3l"),
    ("armv3l", "armv3l"),
    ("sh3", "sh3"),
    ("sh4", "sh4"),
    ("sh4a", "sh4a:sh4"),
];

impl Pool {
    /// Install the arch policy for `arch`. `None` clears the policy so every
    /// arch is acceptable.
    pub fn set_arch_policy(&mut self, arch: Option<&str>) {
        self.id2arch.clear();
        self.lastarch = 0;
        let Some(arch) = arch else { return };

        let mut id2arch = vec![0u32; ARCH_NOARCH.index() + 256];
        id2arch[ARCH_NOARCH.index()] = 1;

        let policy = ARCHPOLICIES
            .iter()
            .find(|(a, _)| *a == arch)
            .map(|(_, p)| *p)
            .unwrap_or("");
        let mut score: u32 = 0x10001;
        let mut delim = 0u8;
        let mut rest = policy;
        loop {
            let l = rest.find([':', '=', '>']).unwrap_or(rest.len());
            if l > 0 {
                let id = self.ss.intern(&rest[..l]);
                if id.index() >= id2arch.len() {
                    id2arch.resize(id.index() + 256, 0);
                }
                if id2arch[id.index()] == 0 {
                    if delim == b':' {
                        score += 0x10000;
                    } else if delim == b'>' {
                        score += 1;
                    }
                    id2arch[id.index()] = score;
                }
            }
            if l == rest.len() {
                break;
            }
            delim = rest.as_bytes()[l];
            rest = &rest[l + 1..];
        }
        self.lastarch = id2arch.len() - 1;
        self.id2arch = id2arch;
    }

    /// Compatibility score of an arch id; 0 when outside the policy.
    pub fn arch_score(&self, arch: Id) -> u32 {
        if self.id2arch.is_empty() {
            return 1;
        }
        self.id2arch.get(arch.index()).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod test {
    use crate::id::{ARCH_NOARCH, ARCH_SRC};
    use crate::pool::Pool;

    #[test]
    fn policy_scores_rank_compat_archs() {
        let mut pool = Pool::new();
        pool.set_arch_policy(Some("x86_64"));
        let x86_64 = pool.str2id("x86_64", true);
        let i686 = pool.str2id("i686", true);
        let i386 = pool.str2id("i386", true);
        let ppc = pool.str2id("ppc", true);
        assert!(pool.arch_score(x86_64) > 0);
        assert!(pool.arch_score(x86_64) < pool.arch_score(i686));
        assert!(pool.arch_score(i686) < pool.arch_score(i386));
        assert_eq!(pool.arch_score(ppc), 0);
        assert_eq!(pool.arch_score(ARCH_NOARCH), 1);
        assert_eq!(pool.arch_score(ARCH_SRC), 0);
    }

    #[test]
    fn no_policy_accepts_everything() {
        let mut pool = Pool::new();
        let ppc = pool.str2id("ppc", true);
        assert_eq!(pool.arch_score(ppc), 1);
    }
}
