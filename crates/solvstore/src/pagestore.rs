//! Fixed-size page cache for the compressed vertical data blob.
//!
//! Pages are decompressed on demand into a bounded ring of slots backed by a
//! seekable file. Loading a range evicts the cheapest window of slots: free
//! slots cost nothing, slots already holding a wanted page cost 1, foreign
//! pages cost 3; complete ties fall back to round-robin so repeated loads do
//! not thrash slot 0.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use tracing::{debug, trace};

use crate::codec;
use crate::error::{Result, SolvError};

pub const PAGE_BITS: u32 = 15;
/// 32 KiB, fixed by the on-disk format.
pub const PAGE_SIZE: usize = 1 << PAGE_BITS;

#[derive(Copy, Clone)]
struct Page {
    /// Offset into the blob store, or `NOT_MAPPED`.
    mapped_at: u32,
    file_offset: u64,
    /// `len * 2 + compressed_flag`; 0 when not file-backed.
    file_size: u32,
}

const NOT_MAPPED: u32 = u32::MAX;

#[derive(Default)]
pub struct PageStore {
    backing: Option<File>,
    blob: Vec<u8>,
    pages: Vec<Page>,
    /// Per slot: page number + 1, or 0 if the slot is free.
    mapped: Vec<u32>,
    ncanmap: usize,
    rr_counter: usize,
}

impl PageStore {
    pub fn new() -> Self {
        PageStore::default()
    }

    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn is_paging(&self) -> bool {
        self.backing.is_some()
    }

    /// Cap the number of resident slots. Only effective before the first
    /// load grows the ring on its own.
    pub fn set_max_mapped(&mut self, n: usize) {
        if self.mapped.is_empty() && n >= 1 {
            self.ncanmap = n;
            self.mapped = vec![0; n];
            self.blob = vec![0; n * PAGE_SIZE];
        }
    }

    /// Record page table entries from a seekable file positioned at the
    /// first page header. The store keeps its own handle for later reads.
    pub fn setup_pages(&mut self, f: &mut File, pagesz: u32, blobsz: u32) -> Result<()> {
        if pagesz as usize != PAGE_SIZE {
            return Err(SolvError::UnsupportedPageSize(pagesz));
        }
        let npages = (blobsz as usize + PAGE_SIZE - 1) / PAGE_SIZE;
        self.pages = Vec::with_capacity(npages);
        let mut ofs = f.stream_position()?;
        for _ in 0..npages {
            let mut hdr = [0u8; 4];
            f.read_exact(&mut hdr)?;
            let file_size = u32::from_be_bytes(hdr);
            let in_len = (file_size >> 1) as u64;
            ofs += 4;
            self.pages.push(Page {
                mapped_at: NOT_MAPPED,
                file_offset: ofs,
                file_size,
            });
            f.seek(SeekFrom::Current(in_len as i64))?;
            ofs += in_len;
        }
        self.backing = Some(f.try_clone()?);
        debug!(npages, blobsz, "vertical data set up for on-demand paging");
        Ok(())
    }

    /// Non-seekable input: read and decompress every page now, paging stays
    /// disabled.
    pub fn slurp_pages<R: Read>(&mut self, r: &mut R, pagesz: u32, blobsz: u32) -> Result<()> {
        if pagesz as usize != PAGE_SIZE {
            return Err(SolvError::UnsupportedPageSize(pagesz));
        }
        let npages = (blobsz as usize + PAGE_SIZE - 1) / PAGE_SIZE;
        self.blob = vec![0u8; npages * PAGE_SIZE];
        self.pages = Vec::with_capacity(npages);
        self.mapped = (1..=npages as u32).collect();
        self.ncanmap = npages;
        let mut cbuf = vec![0u8; PAGE_SIZE + 4];
        for i in 0..npages {
            let mut hdr = [0u8; 4];
            r.read_exact(&mut hdr)?;
            let file_size = u32::from_be_bytes(hdr);
            let in_len = (file_size >> 1) as usize;
            let compressed = file_size & 1 != 0;
            let dst = &mut self.blob[i * PAGE_SIZE..(i + 1) * PAGE_SIZE];
            if compressed {
                if in_len > cbuf.len() {
                    return Err(SolvError::Corrupt("oversized compressed page"));
                }
                r.read_exact(&mut cbuf[..in_len])?;
                let out_len = codec::decompress(&cbuf[..in_len], dst)
                    .ok_or(SolvError::ShortPage(i))?;
                if out_len != PAGE_SIZE && i < npages - 1 {
                    return Err(SolvError::ShortPage(i));
                }
            } else {
                if in_len > PAGE_SIZE {
                    return Err(SolvError::Corrupt("oversized raw page"));
                }
                r.read_exact(&mut dst[..in_len])?;
            }
            self.pages.push(Page {
                mapped_at: (i * PAGE_SIZE) as u32,
                file_offset: 0,
                file_size: 0,
            });
        }
        Ok(())
    }

    /// Make pages `pstart..=pend` resident and consecutive, returning the
    /// mapped bytes of the whole range. The returned region is valid until
    /// the next call that may evict.
    pub fn load_page_range(&mut self, pstart: usize, pend: usize) -> Result<&[u8]> {
        let nneed = pend - pstart + 1;

        // quick check: all pages resident and consecutive already
        let mut ok = true;
        for i in pstart..=pend {
            if self.pages[i].mapped_at == NOT_MAPPED
                || (i > pstart
                    && self.pages[i].mapped_at
                        != self.pages[i - 1].mapped_at + PAGE_SIZE as u32)
            {
                ok = false;
                break;
            }
        }
        if ok {
            let at = self.pages[pstart].mapped_at as usize;
            return Ok(&self.blob[at..at + nneed * PAGE_SIZE]);
        }

        if self.backing.is_none() {
            return Err(SolvError::Corrupt("page not resident and no backing file"));
        }

        if nneed > self.ncanmap {
            let newcan = nneed.max(4);
            self.mapped.resize(newcan, 0);
            self.blob.resize(newcan * PAGE_SIZE, 0);
            trace!(newcan, "page ring grown");
            self.ncanmap = newcan;
        }

        // cost of every slot: free 0, holds a wanted page 1, foreign page 3
        let mut cost = vec![0u32; self.ncanmap];
        for (i, c) in cost.iter_mut().enumerate() {
            let pnum = self.mapped[i];
            if pnum != 0 {
                let pnum = pnum as usize - 1;
                *c = if pnum >= pstart && pnum <= pend { 1 } else { 3 };
            }
        }

        // cheapest consecutive window of nneed slots
        let mut best_cost = u32::MAX;
        let mut best = 0usize;
        let mut same_cost = 0usize;
        let mut i = 0;
        while i + nneed <= self.ncanmap {
            let c: u32 = cost[i..i + nneed].iter().sum();
            if c < best_cost {
                best_cost = c;
                best = i;
            } else if c == best_cost {
                same_cost += 1;
            }
            if c == 0 {
                break;
            }
            i += 1;
        }
        // all windows equally expensive: round-robin to avoid thrashing
        if same_cost == self.ncanmap - nneed {
            best = self.rr_counter % (self.ncanmap - nneed + 1);
            self.rr_counter += 1;
        }

        // evict everything in the target window that is not already in its
        // final place
        for slot in best..best + nneed {
            let pnum = self.mapped[slot];
            if pnum != 0 {
                let pnum = pnum as usize - 1;
                if pnum != pstart + slot - best {
                    trace!(page = pnum, slot, "evicting page");
                    self.mapped[slot] = 0;
                    self.pages[pnum].mapped_at = NOT_MAPPED;
                }
            }
        }

        for i in pstart..=pend {
            let slot = i - pstart + best;
            let dest = slot * PAGE_SIZE;
            if self.pages[i].mapped_at != NOT_MAPPED {
                let at = self.pages[i].mapped_at as usize;
                if at != dest {
                    // still resident elsewhere, move instead of re-reading
                    trace!(page = i, slot, "copying resident page");
                    self.blob.copy_within(at..at + PAGE_SIZE, dest);
                    self.mapped[at / PAGE_SIZE] = 0;
                }
            } else {
                self.page_in(i, dest)?;
            }
            self.pages[i].mapped_at = dest as u32;
            self.mapped[slot] = i as u32 + 1;
        }
        let at = best * PAGE_SIZE;
        Ok(&self.blob[at..at + nneed * PAGE_SIZE])
    }

    fn page_in(&mut self, pnum: usize, dest: usize) -> Result<()> {
        let page = self.pages[pnum];
        let in_len = (page.file_size >> 1) as usize;
        let compressed = page.file_size & 1 != 0;
        let f = self.backing.as_mut().expect("paging without backing file");
        f.seek(SeekFrom::Start(page.file_offset))?;
        trace!(page = pnum, in_len, compressed, "paging in");
        if compressed {
            let mut cbuf = vec![0u8; in_len];
            f.read_exact(&mut cbuf)?;
            let dst = &mut self.blob[dest..dest + PAGE_SIZE];
            let out_len = codec::decompress(&cbuf, dst).ok_or(SolvError::ShortPage(pnum))?;
            if out_len != PAGE_SIZE && pnum < self.pages.len() - 1 {
                return Err(SolvError::ShortPage(pnum));
            }
        } else {
            if in_len > PAGE_SIZE {
                return Err(SolvError::Corrupt("oversized raw page"));
            }
            f.read_exact(&mut self.blob[dest..dest + in_len])?;
        }
        Ok(())
    }

    /// Load every page and drop the backing file descriptor.
    pub fn disable_paging(&mut self) -> Result<()> {
        if !self.pages.is_empty() && self.backing.is_some() {
            self.load_page_range(0, self.pages.len() - 1)?;
        }
        self.backing = None;
        Ok(())
    }
}

/// Best-effort page compression; 0 means the page did not shrink.
pub fn compress_page(page: &[u8], out: &mut [u8]) -> usize {
    codec::compress(page, out)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn page_bytes(seed: u8) -> Vec<u8> {
        (0..PAGE_SIZE)
            .map(|i| ((i / 13) as u8).wrapping_mul(seed).wrapping_add((i % 7) as u8) % 96 + 32)
            .collect()
    }

    /// Write npages of synthetic vertical data the way the writer does:
    /// u32 header (len * 2 | compressed) then the page bytes.
    fn build_file(npages: usize) -> (tempfile::NamedTempFile, Vec<Vec<u8>>) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        let mut raw = Vec::new();
        for p in 0..npages {
            let data = page_bytes(p as u8 + 1);
            let mut comp = vec![0u8; PAGE_SIZE - 1];
            let clen = compress_page(&data, &mut comp);
            if clen != 0 {
                f.write_all(&(((clen as u32) << 1) | 1).to_be_bytes()).unwrap();
                f.write_all(&comp[..clen]).unwrap();
            } else {
                f.write_all(&((PAGE_SIZE as u32) << 1).to_be_bytes()).unwrap();
                f.write_all(&data).unwrap();
            }
            raw.push(data);
        }
        f.flush().unwrap();
        (f, raw)
    }

    fn setup(npages: usize, cap: usize) -> (PageStore, Vec<Vec<u8>>, tempfile::NamedTempFile) {
        let (tf, raw) = build_file(npages);
        let mut store = PageStore::new();
        store.set_max_mapped(cap);
        let mut f = tf.reopen().unwrap();
        store
            .setup_pages(&mut f, PAGE_SIZE as u32, (npages * PAGE_SIZE) as u32)
            .unwrap();
        (store, raw, tf)
    }

    #[test]
    fn single_pages_load_correctly() {
        let (mut store, raw, _tf) = setup(6, 4);
        for p in [0usize, 3, 5, 1] {
            let got = store.load_page_range(p, p).unwrap();
            assert_eq!(got, &raw[p][..], "page {p}");
        }
    }

    #[test]
    fn ranges_are_consecutive() {
        let (mut store, raw, _tf) = setup(6, 4);
        let got = store.load_page_range(2, 4).unwrap();
        assert_eq!(&got[..PAGE_SIZE], &raw[2][..]);
        assert_eq!(&got[PAGE_SIZE..2 * PAGE_SIZE], &raw[3][..]);
        assert_eq!(&got[2 * PAGE_SIZE..], &raw[4][..]);
    }

    #[test]
    fn eviction_under_small_cap() {
        let (mut store, raw, _tf) = setup(8, 4);
        for round in 0..3 {
            for p in 0..8usize {
                let got = store.load_page_range(p, p).unwrap();
                assert_eq!(got, &raw[p][..], "round {round} page {p}");
            }
        }
        // ring never grew past the cap
        assert_eq!(store.ncanmap, 4);
    }

    #[test]
    fn resident_pages_are_copied_not_reread() {
        let (mut store, raw, tf) = setup(6, 4);
        // land page 1 in slot 0 and page 0 in slot 1, so the range load
        // below must relocate both into a consecutive window
        store.load_page_range(1, 1).unwrap();
        store.load_page_range(0, 0).unwrap();
        // truncate the backing file: any re-read would now fail, moving the
        // already resident pages must still succeed
        tf.as_file().set_len(0).unwrap();
        let got = store.load_page_range(0, 1).unwrap();
        assert_eq!(&got[..PAGE_SIZE], &raw[0][..]);
        assert_eq!(&got[PAGE_SIZE..], &raw[1][..]);
    }

    #[test]
    fn slurp_matches_paged_content() {
        let (tf, raw) = build_file(5);
        let mut store = PageStore::new();
        let mut f = tf.reopen().unwrap();
        store
            .slurp_pages(&mut f, PAGE_SIZE as u32, (5 * PAGE_SIZE) as u32)
            .unwrap();
        assert!(!store.is_paging());
        for p in 0..5 {
            let got = store.load_page_range(p, p).unwrap();
            assert_eq!(got, &raw[p][..]);
        }
    }

    #[test]
    fn disable_paging_keeps_data() {
        let (mut store, raw, tf) = setup(3, 4);
        store.disable_paging().unwrap();
        drop(tf);
        for p in 0..3 {
            let got = store.load_page_range(p, p).unwrap();
            assert_eq!(got, &raw[p][..]);
        }
    }
}
