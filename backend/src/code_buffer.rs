use std::io;
use std::ptr;

/// Default code cache size: 16 MiB.
pub const DEFAULT_CODE_BUF_SIZE: usize = 16 * 1024 * 1024;

/// Executable region holding generated host code.
///
/// The mapping is readable, writable and executable at once. Link
/// patches land between runs of generated code and never while it is
/// executing.
pub struct CodeBuffer {
    ptr: *mut u8,
    size: usize,
    offset: usize,
}

// SAFETY: CodeBuffer owns its mapping exclusively.
unsafe impl Send for CodeBuffer {}

impl CodeBuffer {
    /// Map a new buffer of at least `size` bytes, rounded up to whole
    /// host pages.
    pub fn new(size: usize) -> io::Result<Self> {
        let page = page_size();
        let size = size.max(1).div_ceil(page) * page;

        // SAFETY: anonymous private mapping, no file backing.
        let map = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if map == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            ptr: map.cast(),
            size,
            offset: 0,
        })
    }

    /// Current write offset.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn set_offset(&mut self, offset: usize) {
        assert!(offset <= self.size, "offset {offset:#x} outside code buffer");
        self.offset = offset;
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.size - self.offset
    }

    #[inline]
    pub fn base_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Host address of `offset`. One past the end is allowed.
    #[inline]
    pub fn ptr_at(&self, offset: usize) -> *const u8 {
        assert!(offset <= self.size, "offset {offset:#x} outside code buffer");
        // SAFETY: in bounds of the mapping, checked above.
        unsafe { self.ptr.add(offset) }
    }

    /// Offset of host address `addr`, if it points into the buffer.
    #[inline]
    pub fn offset_of(&self, addr: u64) -> Option<usize> {
        let rel = addr.checked_sub(self.ptr as u64)?;
        (rel <= self.size as u64).then_some(rel as usize)
    }

    /// Pointer to `len` bytes at `offset`, bounds-checked.
    #[inline]
    fn span(&self, offset: usize, len: usize) -> *mut u8 {
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.size),
            "code buffer access {offset:#x}+{len} out of bounds"
        );
        // SAFETY: the span lies inside the mapping.
        unsafe { self.ptr.add(offset) }
    }

    // -- Emit at the write offset --

    #[inline]
    pub fn emit_u8(&mut self, val: u8) {
        self.emit_bytes(&[val]);
    }

    #[inline]
    pub fn emit_u32(&mut self, val: u32) {
        self.emit_bytes(&val.to_le_bytes());
    }

    #[inline]
    pub fn emit_u64(&mut self, val: u64) {
        self.emit_bytes(&val.to_le_bytes());
    }

    pub fn emit_bytes(&mut self, data: &[u8]) {
        self.patch_bytes(self.offset, data);
        self.offset += data.len();
    }

    // -- Patch in place --

    #[inline]
    pub fn patch_u32(&mut self, offset: usize, val: u32) {
        self.patch_bytes(offset, &val.to_le_bytes());
    }

    #[inline]
    pub fn patch_u64(&mut self, offset: usize, val: u64) {
        self.patch_bytes(offset, &val.to_le_bytes());
    }

    /// Copy `data` to `offset` without moving the write position.
    pub fn patch_bytes(&mut self, offset: usize, data: &[u8]) {
        let dst = self.span(offset, data.len());
        // SAFETY: `span` checked the destination, and `data` cannot
        // alias the mapping through a shared borrow of `self`.
        unsafe { ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len()) };
    }

    // -- Read back --

    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.bytes(offset, 4));
        u32::from_le_bytes(b)
    }

    #[inline]
    pub fn read_u64(&self, offset: usize) -> u64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.bytes(offset, 8));
        u64::from_le_bytes(b)
    }

    /// Bytes `offset..offset + len`.
    pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        let src = self.span(offset, len);
        // SAFETY: the range lies inside the mapping.
        unsafe { std::slice::from_raw_parts(src, len) }
    }

    /// Code emitted so far.
    pub fn as_slice(&self) -> &[u8] {
        self.bytes(0, self.offset)
    }
}

impl Drop for CodeBuffer {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`size` describe the mapping created in `new`.
        unsafe {
            libc::munmap(self.ptr.cast(), self.size);
        }
    }
}

fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}
