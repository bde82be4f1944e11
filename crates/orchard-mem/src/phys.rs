use std::cell::RefCell;
use std::rc::Rc;

use orchard_types::PAGE_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SliceError {
    #[error("range {offset:#X}+{len:#X} out of bounds for {name:?} ({size:#X} bytes)")]
    OutOfRange {
        name: String,
        offset: usize,
        len: usize,
        size: usize,
    },
}

struct PhysInner {
    name: String,
    bytes: RefCell<Box<[u8]>>,
}

/// A named, contiguous, zero-initialised byte buffer. Cheap to clone; all
/// clones and all slices vended from them alias the same storage.
#[derive(Clone)]
pub struct PhysicalMemory {
    inner: Rc<PhysInner>,
}

/// Capability token for the privileged whole-memory writers. Constructed
/// only by the loader/debugger side of the machine; devices and CPU traffic
/// go through the bus instead.
pub struct PhysAccessToken {
    _priv: (),
}

impl PhysAccessToken {
    pub fn for_loader() -> Self {
        PhysAccessToken { _priv: () }
    }

    pub fn for_debugger() -> Self {
        PhysAccessToken { _priv: () }
    }
}

impl PhysicalMemory {
    pub fn new(size: usize, name: impl Into<String>) -> Self {
        PhysicalMemory {
            inner: Rc::new(PhysInner {
                name: name.into(),
                bytes: RefCell::new(vec![0u8; size].into_boxed_slice()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn size(&self) -> usize {
        self.inner.bytes.borrow().len()
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<(), SliceError> {
        let size = self.size();
        if offset.checked_add(len).map_or(true, |end| end > size) {
            return Err(SliceError::OutOfRange {
                name: self.inner.name.clone(),
                offset,
                len,
                size,
            });
        }
        Ok(())
    }

    /// A writable view of `len` bytes starting at `offset`. The view aliases
    /// this memory; writes through it are visible through every other slice
    /// over the same range.
    pub fn slice(&self, offset: usize, len: usize) -> Result<MemSlice, SliceError> {
        self.check_range(offset, len)?;
        Ok(MemSlice {
            inner: self.inner.clone(),
            base: offset,
            len,
        })
    }

    /// A read-only view over the same storage.
    pub fn read_only_slice(&self, offset: usize, len: usize) -> Result<RoMemSlice, SliceError> {
        Ok(RoMemSlice(self.slice(offset, len)?))
    }

    /// Page-aligned convenience slice of [`PAGE_SIZE`] bytes.
    pub fn slice_page(&self, index: usize) -> Result<MemSlice, SliceError> {
        self.slice_page_sized(index, PAGE_SIZE)
    }

    pub fn slice_page_sized(&self, index: usize, page_size: usize) -> Result<MemSlice, SliceError> {
        self.slice(index * page_size, page_size)
    }

    pub fn fill(&self, byte: u8) {
        self.inner.bytes.borrow_mut().fill(byte);
    }

    pub fn clear(&self) {
        self.fill(0);
    }

    /// Privileged write bypassing the bus entirely. Loader/debugger only.
    pub fn write_byte_physical(
        &self,
        _token: &PhysAccessToken,
        offset: usize,
        value: u8,
    ) -> Result<(), SliceError> {
        self.check_range(offset, 1)?;
        self.inner.bytes.borrow_mut()[offset] = value;
        Ok(())
    }

    /// Privileged bulk write bypassing the bus entirely. Loader/debugger
    /// only.
    pub fn write_physical(
        &self,
        _token: &PhysAccessToken,
        offset: usize,
        bytes: &[u8],
    ) -> Result<(), SliceError> {
        self.check_range(offset, bytes.len())?;
        self.inner.bytes.borrow_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl core::fmt::Debug for PhysicalMemory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PhysicalMemory")
            .field("name", &self.inner.name)
            .field("size", &self.size())
            .finish()
    }
}

/// Writable aliasing view into a [`PhysicalMemory`]. Offsets are relative to
/// the view; indexing past `len` panics, like a slice.
#[derive(Clone)]
pub struct MemSlice {
    inner: Rc<PhysInner>,
    base: usize,
    len: usize,
}

impl MemSlice {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn read(&self, offset: usize) -> u8 {
        assert!(offset < self.len, "slice read at {offset:#X} past {:#X}", self.len);
        self.inner.bytes.borrow()[self.base + offset]
    }

    #[inline]
    pub fn write(&self, offset: usize, value: u8) {
        assert!(offset < self.len, "slice write at {offset:#X} past {:#X}", self.len);
        self.inner.bytes.borrow_mut()[self.base + offset] = value;
    }

    pub fn read_bytes(&self, offset: usize, len: usize) -> Vec<u8> {
        assert!(offset + len <= self.len);
        self.inner.bytes.borrow()[self.base + offset..self.base + offset + len].to_vec()
    }

    pub fn copy_from(&self, offset: usize, bytes: &[u8]) {
        assert!(offset + bytes.len() <= self.len);
        self.inner.bytes.borrow_mut()[self.base + offset..self.base + offset + bytes.len()]
            .copy_from_slice(bytes);
    }

    pub fn fill(&self, byte: u8) {
        self.inner.bytes.borrow_mut()[self.base..self.base + self.len].fill(byte);
    }

    pub fn read_only(&self) -> RoMemSlice {
        RoMemSlice(self.clone())
    }
}

impl core::fmt::Debug for MemSlice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "MemSlice({:?}[{:#X}..{:#X}])",
            self.inner.name,
            self.base,
            self.base + self.len
        )
    }
}

/// Read-only aliasing view into a [`PhysicalMemory`].
#[derive(Clone)]
pub struct RoMemSlice(MemSlice);

impl RoMemSlice {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn read(&self, offset: usize) -> u8 {
        self.0.read(offset)
    }

    pub fn read_bytes(&self, offset: usize, len: usize) -> Vec<u8> {
        self.0.read_bytes(offset, len)
    }
}

impl core::fmt::Debug for RoMemSlice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Ro{:?}", self.0)
    }
}
