/// Granularity of code allocations.
pub const CODE_ALIGN: usize = 16;

/// First-fit allocator over a range of code buffer offsets.
///
/// Free extents are kept sorted by offset and coalesced on release.
#[derive(Debug, Clone)]
pub struct CodeHeap {
    start: usize,
    end: usize,
    free: Vec<(usize, usize)>,
}

impl CodeHeap {
    pub fn new(start: usize, end: usize) -> Self {
        let start = align_up(start);
        let end = end.max(start);
        Self {
            start,
            end,
            free: vec![(start, end - start)],
        }
    }

    /// Reserve `len` bytes. Returns the offset of the region.
    pub fn alloc(&mut self, len: usize) -> Option<usize> {
        let len = align_up(len.max(1));
        let idx = self.free.iter().position(|&(_, size)| size >= len)?;
        let (offset, size) = self.free[idx];
        if size == len {
            self.free.remove(idx);
        } else {
            self.free[idx] = (offset + len, size - len);
        }
        Some(offset)
    }

    /// Return a region obtained from [`CodeHeap::alloc`].
    pub fn release(&mut self, offset: usize, len: usize) {
        let len = align_up(len.max(1));
        let idx = self.free.partition_point(|&(o, _)| o < offset);
        self.free.insert(idx, (offset, len));

        // Merge with the following extent, then with the preceding one.
        if idx + 1 < self.free.len() {
            let (next_off, next_len) = self.free[idx + 1];
            if offset + len == next_off {
                self.free[idx].1 += next_len;
                self.free.remove(idx + 1);
            }
        }
        if idx > 0 {
            let (prev_off, prev_len) = self.free[idx - 1];
            if prev_off + prev_len == offset {
                self.free[idx - 1].1 += self.free[idx].1;
                self.free.remove(idx);
            }
        }
    }

    /// Drop every allocation.
    pub fn reset(&mut self) {
        self.free.clear();
        self.free.push((self.start, self.end - self.start));
    }

    pub fn free_bytes(&self) -> usize {
        self.free.iter().map(|&(_, len)| len).sum()
    }

    pub fn capacity(&self) -> usize {
        self.end - self.start
    }

    /// Size a request of `len` bytes actually occupies.
    pub fn footprint(len: usize) -> usize {
        align_up(len.max(1))
    }
}

#[inline]
fn align_up(n: usize) -> usize {
    (n + CODE_ALIGN - 1) & !(CODE_ALIGN - 1)
}
