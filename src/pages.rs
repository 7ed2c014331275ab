/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Byte pages and the bump allocator that fills them.
//!
//! Encoded lists are packed into standard pages of `1 << page_shift` bytes
//! and are addressed by a single `u64` containing the page index in the
//! upper bits and the offset inside the page in the lower `page_shift` bits.
//! A list that would not fit in a standard page gets an *oversized* page of
//! exactly its size, always at offset zero, so addresses work the same way
//! for both kinds of pages.

use std::fmt::{Display, Formatter};

/// The default logarithm of the size of a standard page (256 KiB).
pub const PAGE_SHIFT: u32 = 18;
/// The smallest supported page shift.
pub const MIN_PAGE_SHIFT: u32 = 4;
/// The largest supported page shift.
pub const MAX_PAGE_SHIFT: u32 = 30;

/// Packs a page index and an in-page offset into an address.
#[inline(always)]
pub fn address(page: usize, offset: usize, page_shift: u32) -> u64 {
    debug_assert!(offset < 1 << page_shift);
    ((page as u64) << page_shift) | offset as u64
}

/// Returns the page index of an address.
#[inline(always)]
pub fn page_index(address: u64, page_shift: u32) -> usize {
    (address >> page_shift) as usize
}

/// Returns the in-page offset of an address.
#[inline(always)]
pub fn page_offset(address: u64, page_shift: u32) -> usize {
    (address & ((1 << page_shift) - 1)) as usize
}

/// Statistics about the pages filled by one or more allocators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocStats {
    /// The number of standard pages.
    pub standard_pages: usize,
    /// The number of oversized pages.
    pub oversized_pages: usize,
    /// The number of bytes handed out.
    pub used_bytes: u64,
    /// Bytes left unused at the end of standard pages.
    pub wasted_bytes: u64,
}

impl core::ops::AddAssign for AllocStats {
    fn add_assign(&mut self, rhs: Self) {
        self.standard_pages += rhs.standard_pages;
        self.oversized_pages += rhs.oversized_pages;
        self.used_bytes += rhs.used_bytes;
        self.wasted_bytes += rhs.wasted_bytes;
    }
}

impl Display for AllocStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} standard pages, {} oversized pages, {} bytes used, {} bytes wasted",
            self.standard_pages, self.oversized_pages, self.used_bytes, self.wasted_bytes
        )
    }
}

/// A bump allocator over byte pages.
///
/// Space is never reclaimed. When a request does not fit in what is left of
/// the current page, a new standard page is started and the tail of the old
/// one is wasted. Requests larger than a standard page get their own
/// oversized page, which never becomes the current page.
///
/// Each construction worker owns its own allocator: the page lists are then
/// concatenated with [`PageTable::concat`].
#[derive(Debug)]
pub struct PageAllocator {
    page_shift: u32,
    pages: Vec<Box<[u8]>>,
    /// Index in `pages` of the standard page being filled, if any.
    current: Option<usize>,
    /// First free byte of the current page.
    top: usize,
    stats: AllocStats,
}

impl PageAllocator {
    pub fn new(page_shift: u32) -> Self {
        assert!(
            (MIN_PAGE_SHIFT..=MAX_PAGE_SHIFT).contains(&page_shift),
            "page shift {page_shift} not in [{MIN_PAGE_SHIFT}..{MAX_PAGE_SHIFT}]"
        );
        Self {
            page_shift,
            pages: Vec::new(),
            current: None,
            top: 0,
            stats: AllocStats::default(),
        }
    }

    #[inline(always)]
    pub fn page_size(&self) -> usize {
        1 << self.page_shift
    }

    /// Reserves `len` bytes, returning their address (relative to the pages
    /// of this allocator) and the zeroed memory to fill.
    pub fn allocate(&mut self, len: usize) -> (u64, &mut [u8]) {
        debug_assert!(len > 0, "empty allocations must not take space");
        let page_size = self.page_size();
        self.stats.used_bytes += len as u64;

        if len > page_size {
            let page = self.pages.len();
            self.pages.push(vec![0; len].into_boxed_slice());
            self.stats.oversized_pages += 1;
            return (address(page, 0, self.page_shift), &mut self.pages[page][..]);
        }

        let page = match self.current {
            Some(page) if self.top + len <= page_size => page,
            current => {
                if current.is_some() {
                    self.stats.wasted_bytes += (page_size - self.top) as u64;
                }
                let page = self.pages.len();
                self.pages.push(vec![0; page_size].into_boxed_slice());
                self.stats.standard_pages += 1;
                self.current = Some(page);
                self.top = 0;
                page
            }
        };

        let offset = self.top;
        self.top += len;
        (
            address(page, offset, self.page_shift),
            &mut self.pages[page][offset..offset + len],
        )
    }

    /// Copies `bytes` into freshly allocated space and returns its address.
    pub fn insert(&mut self, bytes: &[u8]) -> u64 {
        let (address, dst) = self.allocate(bytes.len());
        dst.copy_from_slice(bytes);
        address
    }

    /// Returns statistics about the pages filled so far.
    ///
    /// The unused tail of the current page is accounted as wasted.
    pub fn stats(&self) -> AllocStats {
        let mut stats = self.stats;
        if self.current.is_some() {
            stats.wasted_bytes += (self.page_size() - self.top) as u64;
        }
        stats
    }

    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn into_pages(self) -> Vec<Box<[u8]>> {
        self.pages
    }
}

/// An immutable sequence of pages addressed by page index.
#[derive(Debug, Clone, Default)]
pub struct PageTable {
    pages: Box<[Box<[u8]>]>,
}

impl PageTable {
    /// Concatenates the page lists of several allocators.
    ///
    /// Returns the table and, for each list, the index of its first page in
    /// the table, which must be added to the page index of the addresses
    /// handed out by the corresponding allocator.
    pub fn concat(lists: Vec<Vec<Box<[u8]>>>) -> (Self, Vec<usize>) {
        let mut bases = Vec::with_capacity(lists.len());
        let mut pages = Vec::with_capacity(lists.iter().map(Vec::len).sum());
        for list in lists {
            bases.push(pages.len());
            pages.extend(list);
        }
        (
            Self {
                pages: pages.into_boxed_slice(),
            },
            bases,
        )
    }

    #[inline(always)]
    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    #[inline(always)]
    pub fn page(&self, page: usize) -> &[u8] {
        &self.pages[page]
    }

    /// Returns the bytes of the page containing `address`, starting at the
    /// addressed byte.
    #[inline(always)]
    pub fn bytes_at(&self, address: u64, page_shift: u32) -> &[u8] {
        &self.pages[page_index(address, page_shift)][page_offset(address, page_shift)..]
    }

    /// Returns the number of pages larger than a standard page.
    pub fn num_oversized(&self, page_shift: u32) -> usize {
        self.pages
            .iter()
            .filter(|page| page.len() > 1 << page_shift)
            .count()
    }

    /// Returns the overall size of the pages in bytes.
    pub fn size_in_bytes(&self) -> u64 {
        self.pages.iter().map(|page| page.len() as u64).sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_address_packing() {
        let a = address(5, 77, 10);
        assert_eq!(a, 5 * 1024 + 77);
        assert_eq!(page_index(a, 10), 5);
        assert_eq!(page_offset(a, 10), 77);
    }

    #[test]
    fn test_bump_and_waste() {
        let mut alloc = PageAllocator::new(4); // 16 bytes
        let a = alloc.insert(&[1; 10]);
        let b = alloc.insert(&[2; 6]);
        // does not fit in the 0 bytes left
        let c = alloc.insert(&[3; 3]);
        assert_eq!(a, address(0, 0, 4));
        assert_eq!(b, address(0, 10, 4));
        assert_eq!(c, address(1, 0, 4));

        let d = alloc.insert(&[4; 14]);
        assert_eq!(d, address(2, 0, 4));
        let stats = alloc.stats();
        assert_eq!(stats.standard_pages, 3);
        assert_eq!(stats.oversized_pages, 0);
        assert_eq!(stats.used_bytes, 33);
        // 13 bytes at the end of page 1, 2 bytes at the end of page 2
        assert_eq!(stats.wasted_bytes, 15);

        let (table, bases) = PageTable::concat(vec![alloc.into_pages()]);
        assert_eq!(bases, [0]);
        assert_eq!(&table.bytes_at(b, 4)[..6], &[2; 6]);
        assert_eq!(&table.bytes_at(c, 4)[..3], &[3; 3]);
    }

    #[test]
    fn test_oversized_keeps_current_page() {
        let mut alloc = PageAllocator::new(4);
        let a = alloc.insert(&[1; 4]);
        let big = alloc.insert(&[9; 100]);
        let b = alloc.insert(&[2; 4]);
        assert_eq!(a, address(0, 0, 4));
        assert_eq!(big, address(1, 0, 4));
        // the small allocation continues on the standard page
        assert_eq!(b, address(0, 4, 4));
        assert_eq!(alloc.stats().oversized_pages, 1);
        assert_eq!(alloc.stats().standard_pages, 1);

        let (table, _) = PageTable::concat(vec![alloc.into_pages()]);
        assert_eq!(table.page(1).len(), 100);
        assert_eq!(table.num_oversized(4), 1);
        assert_eq!(table.size_in_bytes(), 116);
    }

    #[test]
    fn test_concat_bases() {
        let mut first = PageAllocator::new(4);
        first.insert(&[1; 16]);
        first.insert(&[1; 16]);
        let mut second = PageAllocator::new(4);
        let addr = second.insert(&[7; 3]);
        let (table, bases) = PageTable::concat(vec![first.into_pages(), vec![], second.into_pages()]);
        assert_eq!(bases, [0, 2, 2]);
        let relocated = addr + ((bases[2] as u64) << 4);
        assert_eq!(&table.bytes_at(relocated, 4)[..3], &[7; 3]);
        assert_eq!(table.num_pages(), 3);
    }
}
