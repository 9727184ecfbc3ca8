//! Write/read round-trips of the `.solv` format, from the empty pool up to
//! paged vertical file lists.

use std::io::{Seek, SeekFrom, Write};

use solvstore::{
    add_solv, add_solv_file, id, repo_write, CompareMode, Dataiterator, Id, KeyType, Marker, Pool,
    RepoId, Repowriter, SolvError, SEARCH_FILES, SEARCH_GLOB, SEARCH_SUB, SEARCH_SUBSTRING,
    SOLVID_META,
};

fn new_solvable(pool: &mut Pool, rid: RepoId, name: &str, evr: &str, arch: &str) -> i32 {
    let sid = pool.add_solvable(rid);
    let n = pool.str2id(name, true);
    let e = pool.str2id(evr, true);
    let a = pool.str2id(arch, true);
    let s = pool.solvable_mut(sid);
    s.name = n;
    s.evr = e;
    s.arch = a;
    sid
}

fn write_to_vec(pool: &Pool, rid: RepoId) -> Vec<u8> {
    let mut out = Vec::new();
    repo_write(pool, rid, &mut out).expect("write");
    out
}

fn read_back(bytes: &[u8]) -> (Pool, RepoId, usize) {
    let mut pool = Pool::new();
    let rid = pool.add_repo("readback");
    let mut cursor = std::io::Cursor::new(bytes);
    let dataid = add_solv(&mut pool, rid, &mut cursor).expect("read");
    (pool, rid, dataid)
}

#[test]
fn empty_repo_roundtrips_with_zero_counts() {
    let mut pool = Pool::new();
    let rid = pool.add_repo("empty");
    let bytes = write_to_vec(&pool, rid);

    assert_eq!(&bytes[0..4], b"SOLV");
    assert_eq!(u32::from_be_bytes(bytes[4..8].try_into().unwrap()), 8);
    for field in 0..7 {
        let off = 8 + field * 4;
        let v = u32::from_be_bytes(bytes[off..off + 4].try_into().unwrap());
        if field == 6 {
            continue; // flags
        }
        assert_eq!(v, 0, "count field {field}");
    }

    let (pool2, rid2, _) = read_back(&bytes);
    assert_eq!(pool2.repo(rid2).nsolvables, 0);
}

#[test]
fn single_self_provide_roundtrips() {
    let mut pool = Pool::new();
    let rid = pool.add_repo("one");
    let sid = new_solvable(&mut pool, rid, "foo", "1.0-0", "noarch");
    let _ = sid;
    pool.internalize_repo(rid);
    let bytes = write_to_vec(&pool, rid);

    let (mut pool2, rid2, _) = read_back(&bytes);
    assert_eq!(pool2.repo(rid2).nsolvables, 1);
    let repo2 = pool2.repo(rid2);
    let sid2 = (repo2.start..repo2.end)
        .find(|&i| pool2.solvable(i as i32).repo == Some(rid2))
        .unwrap() as i32;
    let s = *pool2.solvable(sid2);
    assert_eq!(pool2.id2str(s.name), "foo");
    assert_eq!(pool2.id2str(s.evr), "1.0-0");
    assert_eq!(pool2.id2str(s.arch), "noarch");

    let provides = pool2.solvable_deps(sid2, id::SOLVABLE_PROVIDES).to_vec();
    assert_eq!(provides.len(), 1);
    let rel = provides[0];
    assert!(rel.is_rel());
    assert_eq!(pool2.dep2str(rel), "foo = 1.0-0");

    // the readback provides the package under its own name
    let foo = pool2.str2id("foo", true);
    assert_eq!(pool2.whatprovides(foo), &[Id(sid2 as u32)]);
    let v1 = pool2.str2id("1.0", true);
    let ge = pool2.rel2id(foo, v1, id::REL_GT | id::REL_EQ, true);
    assert_eq!(pool2.whatprovides(ge), &[Id(sid2 as u32)]);
}

#[test]
fn prereq_marker_partition_roundtrips() {
    let mut pool = Pool::new();
    let rid = pool.add_repo("pre");
    let sid = new_solvable(&mut pool, rid, "pkg", "2.0-1", "noarch");
    let a = pool.str2id("liba", true);
    let b = pool.str2id("libb", true);
    pool.solvable_add_deparray(sid, id::SOLVABLE_REQUIRES, a, Marker::None);
    pool.solvable_add_deparray(
        sid,
        id::SOLVABLE_REQUIRES,
        b,
        Marker::After(id::SOLVABLE_PREREQMARKER),
    );
    assert_eq!(
        pool.solvable_deps(sid, id::SOLVABLE_REQUIRES),
        &[a, id::SOLVABLE_PREREQMARKER, b]
    );
    pool.internalize_repo(rid);
    let bytes = write_to_vec(&pool, rid);

    let (pool2, rid2, _) = read_back(&bytes);
    let repo2 = pool2.repo(rid2);
    let sid2 = repo2.start as i32;
    let reqs = pool2.solvable_deps(sid2, id::SOLVABLE_REQUIRES);
    let names: Vec<&str> = reqs.iter().map(|&d| pool2.id2str(d)).collect();
    assert_eq!(names, ["liba", "solvable:prereqmarker", "libb"]);
    assert_eq!(reqs[1], id::SOLVABLE_PREREQMARKER);
}

#[test]
fn directory_components_dedup_and_roundtrip() {
    let mut pool = Pool::new();
    let rid = pool.add_repo("dirs");
    let s1 = new_solvable(&mut pool, rid, "x", "1-1", "noarch");
    let s2 = new_solvable(&mut pool, rid, "y", "1-1", "noarch");
    let dataid = pool.repo_mut(rid).add_repodata(false);
    pool.repodata_add_fileprovides(rid, dataid, s1, id::SOLVABLE_FILELIST, "/usr/bin/x");
    pool.repodata_add_fileprovides(rid, dataid, s2, id::SOLVABLE_FILELIST, "/usr/bin/y");
    {
        // one dirid for /usr/bin, shared between both solvables
        let d1 = pool.repodata_str2dir(rid, dataid, "/usr/bin", false);
        assert!(!d1.is_null());
        let d2 = pool.repodata_str2dir(rid, dataid, "/usr/bin/", false);
        assert_eq!(d1, d2);
    }
    pool.internalize_repo(rid);
    {
        let data = pool.repo(rid).data(dataid);
        let files = data.lookup_dirstrarray_strings(pool.strings(), s1, id::SOLVABLE_FILELIST);
        assert_eq!(files, ["/usr/bin/x"]);
    }
    let bytes = write_to_vec(&pool, rid);

    let (pool2, rid2, dataid2) = read_back(&bytes);
    let repo2 = pool2.repo(rid2);
    let (t1, t2) = (repo2.start as i32, repo2.start as i32 + 1);
    let data2 = repo2.data(dataid2);
    assert_eq!(
        data2.lookup_dirstrarray_strings(pool2.strings(), t1, id::SOLVABLE_FILELIST),
        ["/usr/bin/x"]
    );
    assert_eq!(
        data2.lookup_dirstrarray_strings(pool2.strings(), t2, id::SOLVABLE_FILELIST),
        ["/usr/bin/y"]
    );
    // both entries reference the same dir row
    let p1 = data2
        .lookup_packed_dirstrarray(t1, id::SOLVABLE_FILELIST)
        .unwrap()
        .into_owned();
    let p2 = data2
        .lookup_packed_dirstrarray(t2, id::SOLVABLE_FILELIST)
        .unwrap()
        .into_owned();
    assert_eq!(p1[0], p2[0], "shared dirid for /usr/bin");
}

#[test]
fn vertical_filelist_pages_on_demand() {
    let mut pool = Pool::new();
    let rid = pool.add_repo("big");
    let dataid = pool.repo_mut(rid).add_repodata(false);
    let mut expect: Vec<Vec<String>> = Vec::new();
    for pkg in 0..10 {
        let sid = new_solvable(&mut pool, rid, &format!("pkg{pkg}"), "1-1", "noarch");
        let mut files = Vec::new();
        for i in 0..2500 {
            let path = format!("/usr/share/pkg{pkg}/dir{}/file-{i:05}", i % 37);
            pool.repodata_add_fileprovides(rid, dataid, sid, id::SOLVABLE_FILELIST, &path);
            files.push(path);
        }
        expect.push(files);
    }
    pool.internalize_repo(rid);

    let mut tf = tempfile::tempfile().expect("tempfile");
    repo_write(&pool, rid, &mut tf).expect("write");
    tf.seek(SeekFrom::Start(0)).unwrap();

    let mut pool2 = Pool::new();
    let rid2 = pool2.add_repo("big2");
    let dataid2 = add_solv_file(&mut pool2, rid2, tf).expect("paged read");
    let repo2 = pool2.repo(rid2);
    let data2 = repo2.data(dataid2);
    data2.set_max_mapped_pages(4);
    assert!(
        data2.num_vertical_pages() >= 4,
        "expected at least 4 pages, got {}",
        data2.num_vertical_pages()
    );

    // touch the filelists in a shuffled order, twice, so pages are evicted
    // and reloaded under the 4 slot cap
    let order = [7usize, 0, 9, 3, 7, 5, 1, 8, 2, 6, 4, 0, 9, 7];
    for &pkg in &order {
        let sid = repo2.start as i32 + pkg as i32;
        let files =
            data2.lookup_dirstrarray_strings(pool2.strings(), sid, id::SOLVABLE_FILELIST);
        assert_eq!(files, expect[pkg], "filelist of pkg{pkg}");
    }
}

#[test]
fn prefix_compression_shares_string_heads() {
    let mut pool = Pool::new();
    let rid = pool.add_repo("prefixes");
    for name in ["abc", "abcd", "abce", "abcdef"] {
        new_solvable(&mut pool, rid, name, "1-1", "noarch");
    }
    pool.internalize_repo(rid);
    let bytes = write_to_vec(&pool, rid);

    // the four names are lexicographic neighbors in the string table and
    // must encode with shared prefix lengths 0, 3, 4, 3
    let expected = b"abc\0\x03d\0\x04ef\0\x03e\0";
    assert!(
        bytes.windows(expected.len()).any(|w| w == expected),
        "prefix-compressed string run not found"
    );

    let (pool2, rid2, _) = read_back(&bytes);
    let repo2 = pool2.repo(rid2);
    let mut names: Vec<String> = (repo2.start..repo2.end)
        .map(|i| pool2.id2str(pool2.solvable(i as i32).name).to_string())
        .collect();
    names.sort();
    assert_eq!(names, ["abc", "abcd", "abcdef", "abce"]);
}

#[test]
fn attribute_kinds_roundtrip() {
    let mut pool = Pool::new();
    let rid = pool.add_repo("attrs");
    let sid = new_solvable(&mut pool, rid, "rich", "3.2-1", "x86_64");
    let dataid = pool.repo_mut(rid).add_repodata(false);

    let k_sum = pool.str2id("solvable:summary", true);
    let k_num = pool.str2id("solvable:installsize", true);
    let k_time = pool.str2id("solvable:buildtime", true);
    let k_group = pool.str2id("solvable:group", true);
    let k_sig = pool.str2id("solvable:sigdata", true);
    let k_kw = pool.str2id("solvable:keywords", true);
    let k_chk = id::SOLVABLE_CHECKSUM;

    {
        let data = pool.repo_mut(rid).data_mut(dataid);
        data.set_str(sid, k_sum, "a rich package");
        data.set_num(sid, k_num, 0x1_2345_6789); // past 32 bits
        data.set_num(sid, k_time, 1234567);
        data.set_void(sid, id::SOLVABLE_MEDIAFILE);
        data.set_checksum(
            sid,
            k_chk,
            KeyType::Sha256,
            "7d865e959b2466918c9863afca942d0fb89d7c9ac0c99bafc3749504ded97730",
        );
        data.set_binary(sid, k_sig, b"\x01\x02\x00\xff");
    }
    pool.repodata_set_poolstr(rid, dataid, sid, k_group, "system/base");
    pool.repodata_add_poolstr_array(rid, dataid, sid, k_kw, "fast");
    pool.repodata_add_poolstr_array(rid, dataid, sid, k_kw, "small");
    // a meta attribute on the repodata itself
    {
        let ts = pool.str2id("repository:timestamp", true);
        let data = pool.repo_mut(rid).data_mut(dataid);
        data.set_num(SOLVID_META, ts, 1700000000);
    }
    pool.internalize_repo(rid);
    let bytes = write_to_vec(&pool, rid);

    let (pool2, rid2, dataid2) = read_back(&bytes);
    let repo2 = pool2.repo(rid2);
    let sid2 = repo2.start as i32;
    let data2 = repo2.data(dataid2);
    let k_sum2 = pool2.strings().find("solvable:summary");
    let k_num2 = pool2.strings().find("solvable:installsize");
    let k_group2 = pool2.strings().find("solvable:group");
    let k_kw2 = pool2.strings().find("solvable:keywords");
    let k_sig2 = pool2.strings().find("solvable:sigdata");
    let k_ts2 = pool2.strings().find("repository:timestamp");

    assert_eq!(
        data2.lookup_str(pool2.strings(), sid2, k_sum2).as_deref(),
        Some("a rich package")
    );
    assert_eq!(data2.lookup_num(sid2, k_num2), Some(0x1_2345_6789));
    assert!(data2.lookup_void(sid2, id::SOLVABLE_MEDIAFILE));
    let (typ, hexed) = data2.lookup_checksum(sid2, id::SOLVABLE_CHECKSUM).unwrap();
    assert_eq!(typ, KeyType::Sha256);
    assert_eq!(
        hexed,
        "7d865e959b2466918c9863afca942d0fb89d7c9ac0c99bafc3749504ded97730"
    );
    assert_eq!(
        data2.lookup_binary(sid2, k_sig2).as_deref(),
        Some(&b"\x01\x02\x00\xff"[..])
    );
    assert_eq!(
        data2.lookup_str(pool2.strings(), sid2, k_group2).as_deref(),
        Some("system/base")
    );
    let kws = data2.lookup_idarray(sid2, k_kw2).unwrap();
    let kws: Vec<&str> = kws.iter().map(|&i| pool2.id2str(i)).collect();
    assert_eq!(kws, ["fast", "small"]);
    assert_eq!(data2.lookup_count(sid2, k_kw2), 2);
    assert_eq!(data2.lookup_num(SOLVID_META, k_ts2), Some(1700000000));

    // and the whole thing can be written again
    let again = write_to_vec(&pool2, rid2);
    let (pool3, rid3, dataid3) = read_back(&again);
    let repo3 = pool3.repo(rid3);
    let data3 = repo3.data(dataid3);
    let k_sum3 = pool3.strings().find("solvable:summary");
    assert_eq!(
        data3
            .lookup_str(pool3.strings(), repo3.start as i32, k_sum3)
            .as_deref(),
        Some("a rich package")
    );
}

#[test]
fn flexarray_substructures_roundtrip() {
    let mut pool = Pool::new();
    let rid = pool.add_repo("flex");
    let sid = new_solvable(&mut pool, rid, "updated", "1-1", "noarch");
    let k_issues = pool.str2id("update:reference", true);
    let k_id = pool.str2id("update:reference:id", true);
    let k_title = pool.str2id("update:reference:title", true);
    let dataid = pool.repo_mut(rid).add_repodata(false);
    {
        let data = pool.repo_mut(rid).data_mut(dataid);
        for (refid, title) in [("CVE-1", "first issue"), ("CVE-2", "second issue")] {
            let h = data.new_handle();
            data.set_str(h, k_id, refid);
            data.set_str(h, k_title, title);
            data.add_flexarray(sid, k_issues, h);
        }
    }
    pool.internalize_repo(rid);
    let bytes = write_to_vec(&pool, rid);

    let (pool2, rid2, _) = read_back(&bytes);
    let k_id2 = pool2.strings().find("update:reference:id");
    let k_issues2 = pool2.strings().find("update:reference");
    let mut seen = Vec::new();
    let mut di = Dataiterator::new(&pool2, Some(rid2), 0, k_id2, None, SEARCH_SUB).unwrap();
    di.prepend_keyname(k_issues2);
    while di.step() {
        seen.push(di.value_str().unwrap_or_default());
    }
    seen.sort();
    assert_eq!(seen, ["CVE-1", "CVE-2"]);
}

#[test]
fn userdata_and_version9() {
    let mut pool = Pool::new();
    let rid = pool.add_repo("v9");
    new_solvable(&mut pool, rid, "p", "1-1", "noarch");
    pool.internalize_repo(rid);
    let mut w = Repowriter::new();
    w.set_userdata(b"hello userdata").unwrap();
    let mut bytes = Vec::new();
    w.write(&pool, rid, &mut bytes).unwrap();
    assert_eq!(u32::from_be_bytes(bytes[4..8].try_into().unwrap()), 9);

    let (pool2, rid2, dataid2) = read_back(&bytes);
    assert_eq!(pool2.repo(rid2).data(dataid2).userdata, b"hello userdata");
}

#[test]
fn oversized_userdata_is_rejected() {
    let mut w = Repowriter::new();
    let big = vec![0u8; 70000];
    assert!(matches!(
        w.set_userdata(&big),
        Err(SolvError::UserdataTooLarge(_))
    ));
}

#[test]
fn idarrayblock_mode_roundtrips() {
    let mut pool = Pool::new();
    let rid = pool.add_repo("blocky");
    let sid = new_solvable(&mut pool, rid, "pkg", "1-1", "noarch");
    for dep in ["liba", "libb", "libc"] {
        let d = pool.str2id(dep, true);
        pool.solvable_add_deparray(sid, id::SOLVABLE_REQUIRES, d, Marker::None);
    }
    pool.internalize_repo(rid);
    let mut w = Repowriter::new();
    w.set_flags(solvstore::REPOWRITER_IDARRAYBLOCK);
    let mut bytes = Vec::new();
    w.write(&pool, rid, &mut bytes).unwrap();
    assert_eq!(u32::from_be_bytes(bytes[4..8].try_into().unwrap()), 9);

    let (pool2, rid2, _) = read_back(&bytes);
    let sid2 = pool2.repo(rid2).start as i32;
    let mut reqs: Vec<&str> = pool2
        .solvable_deps(sid2, id::SOLVABLE_REQUIRES)
        .iter()
        .map(|&d| pool2.id2str(d))
        .collect();
    reqs.sort();
    assert_eq!(reqs, ["liba", "libb", "libc"]);
    // provides keep the self-provide
    assert_eq!(
        pool2
            .solvable_deps(sid2, id::SOLVABLE_PROVIDES)
            .iter()
            .map(|&d| pool2.dep2str(d))
            .collect::<Vec<_>>(),
        ["pkg = 1-1"]
    );
}

#[test]
fn dataiterator_matches_values() {
    let mut pool = Pool::new();
    let rid = pool.add_repo("iter");
    let s1 = new_solvable(&mut pool, rid, "editor", "1-1", "noarch");
    let _s2 = new_solvable(&mut pool, rid, "compiler", "2-1", "noarch");
    let dataid = pool.repo_mut(rid).add_repodata(false);
    pool.repodata_add_fileprovides(rid, dataid, s1, id::SOLVABLE_FILELIST, "/usr/bin/edit");
    pool.internalize_repo(rid);

    // substring match over names
    let mut di = Dataiterator::new(
        &pool,
        Some(rid),
        0,
        id::SOLVABLE_NAME,
        Some("edit"),
        SEARCH_SUBSTRING,
    )
    .unwrap();
    let mut hits = Vec::new();
    while di.step() {
        hits.push(di.solvid());
    }
    assert_eq!(hits, [s1]);

    // glob match over stringified file paths
    let mut di = Dataiterator::new(
        &pool,
        Some(rid),
        0,
        id::SOLVABLE_FILELIST,
        Some("/usr/bin/*"),
        SEARCH_GLOB | SEARCH_FILES,
    )
    .unwrap();
    let mut files = Vec::new();
    while di.step() {
        files.push(di.value_str().unwrap());
    }
    assert_eq!(files, ["/usr/bin/edit"]);
}

#[test]
fn bad_magic_is_rejected_and_pool_unchanged() {
    let mut pool = Pool::new();
    let rid = pool.add_repo("bad");
    let mut cursor = std::io::Cursor::new(b"JUNKJUNKJUNK".to_vec());
    let err = add_solv(&mut pool, rid, &mut cursor).unwrap_err();
    assert!(matches!(err, SolvError::BadMagic));
    assert_eq!(pool.repo(rid).nsolvables, 0);
    assert_eq!(pool.repo(rid).nrepodata(), 0);
    assert!(pool.last_error().is_some());
}

#[test]
fn truncated_file_is_rejected() {
    let mut pool = Pool::new();
    let rid = pool.add_repo("t");
    new_solvable(&mut pool, rid, "x", "1-1", "noarch");
    pool.internalize_repo(rid);
    let bytes = write_to_vec(&pool, rid);

    let mut pool2 = Pool::new();
    let rid2 = pool2.add_repo("t2");
    let mut cursor = std::io::Cursor::new(bytes[..bytes.len() / 2].to_vec());
    assert!(add_solv(&mut pool2, rid2, &mut cursor).is_err());
    assert_eq!(pool2.repo(rid2).nrepodata(), 0);
}

#[test]
fn evr_ordering_applies_to_pool_comparisons() {
    let mut pool = Pool::new();
    let a = pool.str2id("1:0-0", true);
    let b = pool.str2id("0:9-9", true);
    assert!(pool.evrcmp(a, b, CompareMode::Compare) > 0);

    pool.kind = solvstore::VersionKind::Deb;
    let c = pool.str2id("1.0~rc1", true);
    let d = pool.str2id("1.0", true);
    assert!(pool.evrcmp(c, d, CompareMode::Compare) < 0);
}

#[test]
fn write_failure_reports_io_error() {
    struct Failing;
    impl Write for Failing {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
    let mut pool = Pool::new();
    let rid = pool.add_repo("boom");
    new_solvable(&mut pool, rid, "x", "1-1", "noarch");
    pool.internalize_repo(rid);
    let err = repo_write(&pool, rid, &mut Failing).unwrap_err();
    assert!(matches!(err, SolvError::Io(_)));
    assert!(pool.last_error().unwrap().contains("write failed"));
}
