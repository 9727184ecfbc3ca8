//! Dialect-aware `epoch:version-release` ordering.
//!
//! Three dialects are supported, selected per pool: RPM, Debian and
//! Alpine/APK. All comparators return -1, 0 or 1 and form a strict weak
//! order over version strings.

/// Which distribution's comparison rules apply.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum VersionKind {
    #[default]
    Rpm,
    Deb,
    Apk,
}

/// How much of the EVR takes part in the comparison.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum CompareMode {
    /// Full compare; presence of a release is a tie-breaker.
    #[default]
    Compare,
    /// Compare epoch and version only.
    CompareEvOnly,
    /// Matching mode: empty fields on either side match anything, an empty
    /// epoch (leading `:`) skips the epoch check.
    Match,
}

fn is_digit(c: u8) -> bool {
    c.is_ascii_digit()
}

fn is_alpha(c: u8) -> bool {
    c.is_ascii_alphabetic()
}

fn cmp_bytes(a: &[u8], b: &[u8]) -> i32 {
    match a.cmp(b) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }
}

/// RPM segment compare: alnum runs, numeric runs win over alpha runs,
/// numbers compare by length after zero-stripping.
fn vercmp_rpm(mut s1: &[u8], mut s2: &[u8]) -> i32 {
    loop {
        while let Some(&c) = s1.first() {
            if is_digit(c) || is_alpha(c) {
                break;
            }
            s1 = &s1[1..];
        }
        while let Some(&c) = s2.first() {
            if is_digit(c) || is_alpha(c) {
                break;
            }
            s2 = &s2[1..];
        }
        if s1.is_empty() && s2.is_empty() {
            return 0;
        }
        let d1 = s1.first().is_some_and(|&c| is_digit(c));
        let d2 = s2.first().is_some_and(|&c| is_digit(c));
        if d1 || d2 {
            while s1.len() >= 2 && s1[0] == b'0' && is_digit(s1[1]) {
                s1 = &s1[1..];
            }
            while s2.len() >= 2 && s2[0] == b'0' && is_digit(s2[1]) {
                s2 = &s2[1..];
            }
            let e1 = s1.iter().position(|&c| !is_digit(c)).unwrap_or(s1.len());
            let e2 = s2.iter().position(|&c| !is_digit(c)).unwrap_or(s2.len());
            if e1 != e2 {
                return if e1 > e2 { 1 } else { -1 };
            }
            let r = cmp_bytes(&s1[..e1], &s2[..e2]);
            if r != 0 {
                return r;
            }
            s1 = &s1[e1..];
            s2 = &s2[e2..];
        } else {
            let e1 = s1.iter().position(|&c| !is_alpha(c)).unwrap_or(s1.len());
            let e2 = s2.iter().position(|&c| !is_alpha(c)).unwrap_or(s2.len());
            if e1 > e2 {
                let r = cmp_bytes(&s1[..e2], &s2[..e2]);
                return if r >= 0 { 1 } else { -1 };
            }
            if e1 < e2 {
                let r = cmp_bytes(&s1[..e1], &s2[..e1]);
                return if r <= 0 { -1 } else { 1 };
            }
            let r = cmp_bytes(&s1[..e1], &s2[..e2]);
            if r != 0 {
                return r;
            }
            s1 = &s1[e1..];
            s2 = &s2[e2..];
        }
    }
}

/// Debian compare: digit runs numeric, `~` sorts before anything including
/// end-of-string, letters before other characters.
fn vercmp_deb(s1: &[u8], s2: &[u8]) -> i32 {
    let mut i1 = 0;
    let mut i2 = 0;
    loop {
        let mut c1 = s1.get(i1).copied().unwrap_or(0) as i32;
        let mut c2 = s2.get(i2).copied().unwrap_or(0) as i32;
        if i1 < s1.len() {
            i1 += 1;
        }
        if i2 < s2.len() {
            i2 += 1;
        }
        if (48..=57).contains(&c1) && (48..=57).contains(&c2) {
            while c1 == 48 {
                c1 = s1.get(i1).copied().unwrap_or(0) as i32;
                if i1 < s1.len() {
                    i1 += 1;
                }
            }
            while c2 == 48 {
                c2 = s2.get(i2).copied().unwrap_or(0) as i32;
                if i2 < s2.len() {
                    i2 += 1;
                }
            }
            let mut r = 0;
            while (48..=57).contains(&c1) && (48..=57).contains(&c2) {
                if r == 0 {
                    r = c1 - c2;
                }
                c1 = s1.get(i1).copied().unwrap_or(0) as i32;
                if i1 < s1.len() {
                    i1 += 1;
                }
                c2 = s2.get(i2).copied().unwrap_or(0) as i32;
                if i2 < s2.len() {
                    i2 += 1;
                }
            }
            if (48..=57).contains(&c1) {
                return 1;
            }
            if (48..=57).contains(&c2) {
                return -1;
            }
            if r != 0 {
                return if r < 0 { -1 } else { 1 };
            }
        }
        let weigh = |c: i32| {
            if c == b'~' as i32 {
                -1
            } else if c == 0 || (48..=57).contains(&c) || is_alpha(c as u8) {
                c
            } else {
                c + 256
            }
        };
        let c1 = weigh(c1);
        let c2 = weigh(c2);
        if c1 != c2 {
            return if c1 < c2 { -1 } else { 1 };
        }
        if c1 == 0 {
            return 0;
        }
    }
}

/* known lowercase suffixes; the first four rank as pre-release */
const SUFFIXES: [&[u8]; 9] = [
    b"alpha", b"beta", b"pre", b"rc", b"cvs", b"svn", b"git", b"hg", b"p",
];
const CLASSORDER: &[u8] = b".X_~-$!";

fn suffixclass(s: &[u8]) -> i32 {
    for (i, suf) in SUFFIXES.iter().enumerate() {
        if s == *suf {
            return i as i32 + 1;
        }
    }
    0
}

fn is_release_suffix(p: &[u8]) -> bool {
    let letters = p.iter().position(|&c| !c.is_ascii_lowercase()).unwrap_or(p.len());
    let cl = suffixclass(&p[..letters]);
    cl > 0 && cl < 5
}

/// Classify the next fragment of an APK version. Returns the class byte and
/// the fragment range (relative to `s`); the caller resumes at the range end.
fn classify_part(initial: bool, s: &[u8]) -> (u8, usize, usize) {
    if s.is_empty() {
        return (b'$', 0, 0);
    }
    let mut i = 0;
    let mut c = s[i];
    i += 1;
    if c.is_ascii_lowercase() {
        return (b'X', 0, 1);
    }
    if initial && is_digit(c) {
        c = b'.';
        i -= 1;
    }
    if i >= s.len() {
        return (b'!', i, i);
    }
    let start = i;
    if c == b'.' && is_digit(s[i]) {
        // numeric part, consumed by the digit scan below
    } else if c == b'_' && s[i].is_ascii_lowercase() {
        while i < s.len() && s[i].is_ascii_lowercase() {
            i += 1;
        }
    } else if c == b'-' && s[i] == b'r' && i + 1 < s.len() && is_digit(s[i + 1]) {
        i += 1;
    } else if c == b'~' && (is_digit(s[i]) || (b'a'..=b'f').contains(&s[i])) {
        while i < s.len() && (is_digit(s[i]) || (b'a'..=b'f').contains(&s[i])) {
            i += 1;
        }
        return (b'~', start, i);
    } else {
        return (b'!', start, start);
    }
    while i < s.len() && is_digit(s[i]) {
        i += 1;
    }
    (c, start, i)
}

/// APK version compare over the whole strings (no epoch/release split).
fn vercmp_apk(mut a: &[u8], mut b: &[u8]) -> i32 {
    let mut fuzzy1 = false;
    let mut fuzzy2 = false;
    if a.first() == Some(&b'~') {
        fuzzy1 = true;
        a = &a[1..];
    }
    if b.first() == Some(&b'~') {
        fuzzy2 = true;
        b = &b[1..];
    }
    let mut initial = true;
    let (c1, c2, p1, p2) = loop {
        let (c1, s1, e1) = classify_part(initial, a);
        let (c2, s2, e2) = classify_part(initial, b);
        let was_initial = initial;
        initial = false;
        let mut p1 = &a[s1..e1];
        let mut p2 = &b[s2..e2];
        if c1 != c2 || c1 == b'!' || c1 == b'$' {
            break (c1, c2, p1, p2);
        }
        a = &a[e1..];
        b = &b[e2..];
        if p1 == p2 {
            continue;
        }
        let mut cls = c1;
        if cls == b'-' {
            if p1.first() == Some(&b'r') {
                p1 = &p1[1..];
            }
            if p2.first() == Some(&b'r') {
                p2 = &p2[1..];
            }
        } else if cls == b'_' {
            let l1 = p1.iter().position(|&c| !c.is_ascii_lowercase()).unwrap_or(p1.len());
            let l2 = p2.iter().position(|&c| !c.is_ascii_lowercase()).unwrap_or(p2.len());
            let sc1 = suffixclass(&p1[..l1]);
            let sc2 = suffixclass(&p2[..l2]);
            if sc1 != sc2 {
                return if sc1 < sc2 { -1 } else { 1 };
            }
            p1 = &p1[l1..];
            p2 = &p2[l2..];
            cls = b'_';
        }
        if (cls == b'.' && (was_initial || (p1.first() != Some(&b'0') && p2.first() != Some(&b'0'))))
            || cls == b'_'
            || cls == b'-'
        {
            while p1.first() == Some(&b'0') {
                p1 = &p1[1..];
            }
            while p2.first() == Some(&b'0') {
                p2 = &p2[1..];
            }
            if p1.len() != p2.len() {
                return if p1.len() < p2.len() { -1 } else { 1 };
            }
        }
        let n = p1.len().min(p2.len());
        let r = cmp_bytes(&p1[..n], &p2[..n]);
        if r != 0 {
            return r;
        }
        if p1.len() != p2.len() {
            return if p1.len() < p2.len() { -1 } else { 1 };
        }
    };
    if c1 == c2 {
        return 0;
    }
    if (fuzzy1 && c1 == b'$') || (fuzzy2 && c2 == b'$') {
        return 0;
    }
    if c1 == b'_' && is_release_suffix(p1) {
        return -1;
    }
    if c2 == b'_' && is_release_suffix(p2) {
        return 1;
    }
    if c1 == b'.' || c2 == b'!' {
        return 1;
    }
    if c2 == b'.' || c1 == b'!' || c1 == b'$' {
        return -1;
    }
    if c2 == b'$' {
        return 1;
    }
    let o1 = CLASSORDER.iter().position(|&c| c == c1);
    let o2 = CLASSORDER.iter().position(|&c| c == c2);
    match (o1, o2) {
        (Some(a), Some(b)) if a != b => {
            if a > b {
                -1
            } else {
                1
            }
        }
        _ => 0,
    }
}

fn vercmp(kind: VersionKind, a: &[u8], b: &[u8]) -> i32 {
    match kind {
        VersionKind::Rpm => vercmp_rpm(a, b),
        VersionKind::Deb => vercmp_deb(a, b),
        VersionKind::Apk => vercmp_apk(a, b),
    }
}

/// Compare two `[epoch:]version[-release]` strings.
pub fn evrcmp_str(
    kind: VersionKind,
    promoteepoch: bool,
    evr1: &str,
    evr2: &str,
    mode: CompareMode,
) -> i32 {
    if evr1 == evr2 {
        return 0;
    }
    if kind == VersionKind::Apk {
        return vercmp_apk(evr1.as_bytes(), evr2.as_bytes());
    }
    let b1 = evr1.as_bytes();
    let b2 = evr2.as_bytes();
    let mut v1 = 0usize;
    let mut v2 = 0usize;
    let mut d1 = b1.iter().position(|&c| !is_digit(c)).unwrap_or(b1.len());
    let mut d2 = b2.iter().position(|&c| !is_digit(c)).unwrap_or(b2.len());
    if mode == CompareMode::Match && (b1.first() == Some(&b':') || b2.first() == Some(&b':')) {
        // empty epoch on either side skips the epoch check entirely
        if b1.get(d1) == Some(&b':') {
            v1 = d1 + 1;
        }
        if b2.get(d2) == Some(&b':') {
            v2 = d2 + 1;
        }
        d1 = v1;
        d2 = v2;
    }
    let e1 = if d1 == v1 || b1.get(d1) != Some(&b':') { None } else { Some(d1) };
    let e2 = if d2 == v2 || b2.get(d2) != Some(&b':') { None } else { Some(d2) };
    match (e1, e2) {
        (Some(q1), Some(q2)) => {
            let r = vercmp(kind, &b1[v1..q1], &b2[v2..q2]);
            if r != 0 {
                return r;
            }
            v1 = q1 + 1;
            v2 = q2 + 1;
        }
        (Some(q1), None) => {
            if !promoteepoch {
                let mut p = v1;
                while b1.get(p) == Some(&b'0') {
                    p += 1;
                }
                if b1.get(p) != Some(&b':') {
                    return 1;
                }
            }
            v1 = q1 + 1;
        }
        (None, Some(q2)) => {
            let mut p = v2;
            while b2.get(p) == Some(&b'0') {
                p += 1;
            }
            if b2.get(p) != Some(&b':') {
                return -1;
            }
            v2 = q2 + 1;
        }
        (None, None) => {}
    }
    let r1 = b1[v1..].iter().rposition(|&c| c == b'-').map(|p| v1 + p);
    let r2 = b2[v2..].iter().rposition(|&c| c == b'-').map(|p| v2 + p);
    let ve1 = r1.unwrap_or(b1.len());
    let ve2 = r2.unwrap_or(b2.len());
    let mut r = 0;
    if mode != CompareMode::Match || (v1 != ve1 && v2 != ve2) {
        r = vercmp(kind, &b1[v1..ve1], &b2[v2..ve2]);
    }
    if r != 0 {
        return r;
    }
    if mode == CompareMode::Compare {
        if r1.is_none() && r2.is_some() {
            return -1;
        }
        if r1.is_some() && r2.is_none() {
            return 1;
        }
    }
    if mode == CompareMode::CompareEvOnly {
        return 0;
    }
    if let (Some(q1), Some(q2)) = (r1, r2) {
        if q1 + 1 != b1.len() && q2 + 1 != b2.len() {
            r = vercmp(kind, &b1[q1 + 1..], &b2[q2 + 1..]);
        }
    }
    r
}

/// Match an EVR string against separately given epoch, version and release
/// fragments; `None` fragments match anything. An absent epoch matches `"0"`.
pub fn evrmatch(
    kind: VersionKind,
    evr: &str,
    epoch: Option<&str>,
    version: Option<&str>,
    release: Option<&str>,
) -> i32 {
    let b = evr.as_bytes();
    let mut v = 0usize;
    let d = b.iter().position(|&c| !is_digit(c)).unwrap_or(b.len());
    if d != 0 && b.get(d) == Some(&b':') {
        if let Some(e) = epoch {
            let r = vercmp(kind, &b[..d], e.as_bytes());
            if r != 0 {
                return r;
            }
        }
        v = d + 1;
    } else if let Some(e) = epoch {
        let stripped = e.trim_start_matches('0');
        if !stripped.is_empty() {
            return -1;
        }
    }
    let rpos = b[v..].iter().rposition(|&c| c == b'-').map(|p| v + p);
    let ve = rpos.unwrap_or(b.len());
    if let Some(ver) = version {
        let r = vercmp(kind, &b[v..ve], ver.as_bytes());
        if r != 0 {
            return r;
        }
    }
    if let Some(rel) = release {
        let Some(q) = rpos else { return -1 };
        let r = vercmp(kind, &b[q + 1..], rel.as_bytes());
        if r != 0 {
            return r;
        }
    }
    0
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    fn rpm(a: &str, b: &str) -> i32 {
        evrcmp_str(VersionKind::Rpm, false, a, b, CompareMode::Compare)
    }

    fn deb(a: &str, b: &str) -> i32 {
        evrcmp_str(VersionKind::Deb, false, a, b, CompareMode::Compare)
    }

    fn apk(a: &str, b: &str) -> i32 {
        evrcmp_str(VersionKind::Apk, false, a, b, CompareMode::Compare)
    }

    #[rstest]
    #[case("1.0", "1.0", 0)]
    #[case("1.0", "2.0", -1)]
    #[case("2.0.1", "2.0", 1)]
    #[case("1.10", "1.9", 1)]
    #[case("1.010", "1.10", 0)]
    #[case("1.0a", "1.0", 1)]
    #[case("1.0", "1.0.z", -1)]
    #[case("a", "1", -1)]
    #[case("1.0-2", "1.0-10", -1)]
    #[case("1.0", "1.0-1", -1)]
    fn rpm_ordering(#[case] a: &str, #[case] b: &str, #[case] want: i32) {
        assert_eq!(rpm(a, b), want);
        assert_eq!(rpm(b, a), -want);
    }

    #[test]
    fn rpm_epoch_dominates() {
        assert!(rpm("1:0-0", "0:9-9") > 0);
        assert!(rpm("1:1.0", "2.0") > 0);
    }

    #[test]
    fn rpm_promoteepoch() {
        assert!(rpm("1:1.0", "1.0") > 0);
        assert_eq!(
            evrcmp_str(VersionKind::Rpm, true, "0:1.0", "1.0", CompareMode::Compare),
            0
        );
    }

    #[rstest]
    #[case("1.0~rc1", "1.0", -1)]
    #[case("1.0~~", "1.0~", -1)]
    #[case("1.0", "1.0+b1", -1)]
    #[case("2:1.0", "1:2.0", 1)]
    #[case("1.2~rc1", "1.2~rc1", 0)]
    fn deb_ordering(#[case] a: &str, #[case] b: &str, #[case] want: i32) {
        assert_eq!(deb(a, b), want);
        assert_eq!(deb(b, a), -want);
    }

    #[rstest]
    #[case("1.0", "1.0", 0)]
    #[case("1.0", "1.1", -1)]
    #[case("1.0_alpha1", "1.0", -1)]
    #[case("1.0_p1", "1.0", 1)]
    #[case("1.0_alpha1", "1.0_beta1", -1)]
    #[case("1.0-r1", "1.0", 1)]
    #[case("1.0-r1", "1.0-r2", -1)]
    #[case("1.0.1", "1.0a", 1)]
    fn apk_ordering(#[case] a: &str, #[case] b: &str, #[case] want: i32) {
        assert_eq!(apk(a, b), want);
        assert_eq!(apk(b, a), -want);
    }

    #[test]
    fn apk_fuzzy_prefix_matches_any_tail() {
        assert_eq!(apk("~1.2", "1.2.3"), 0);
        assert_eq!(apk("1.2.3", "~1.2"), 0);
    }

    #[test]
    fn transitivity_sample() {
        let vs = ["0.9", "1.0~rc1", "1.0", "1.0.1", "1.1", "2:0.1"];
        for i in 0..vs.len() {
            for j in 0..vs.len() {
                for k in 0..vs.len() {
                    let ab = deb(vs[i], vs[j]);
                    let bc = deb(vs[j], vs[k]);
                    if ab <= 0 && bc <= 0 {
                        assert!(deb(vs[i], vs[k]) <= 0, "{} {} {}", vs[i], vs[j], vs[k]);
                    }
                }
            }
        }
    }

    #[test]
    fn match_mode_skips_missing_parts() {
        assert_eq!(
            evrcmp_str(VersionKind::Rpm, false, "1.0-5", "1.0", CompareMode::Match),
            0
        );
        assert_eq!(
            evrcmp_str(VersionKind::Rpm, false, ":1.0", "2:1.0", CompareMode::Match),
            0
        );
    }

    #[test]
    fn evonly_ignores_release() {
        assert_eq!(
            evrcmp_str(VersionKind::Rpm, false, "1.0-1", "1.0-7", CompareMode::CompareEvOnly),
            0
        );
    }

    #[test]
    fn evrmatch_fragments() {
        let k = VersionKind::Rpm;
        assert_eq!(evrmatch(k, "1:2.0-3", Some("1"), Some("2.0"), Some("3")), 0);
        assert_eq!(evrmatch(k, "2.0-3", Some("0"), Some("2.0"), None), 0);
        assert_eq!(evrmatch(k, "2.0-3", Some("1"), None, None), -1);
        assert_ne!(evrmatch(k, "2.0", None, Some("2.0"), Some("1")), 0);
    }
}
