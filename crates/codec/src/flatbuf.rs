//! Zero-copy flat buffer encoding.
//!
//! Composite structs embed their fixed-size fields in place. A variable
//! length tail (string, vector, optional) is written after the struct and
//! referenced from its slot by a `(rel_offset: u32, count: u32)` pair, where
//! `rel_offset` is measured from the start of the slot itself — never from
//! the start of the buffer. This is the same convention described in
//! §4.1 of the spec: readers add `rel_offset` to the slot's own address to
//! find the tail.

use crate::Error;

use bytes::{Buf, BufMut, BytesMut};

/// Size in bytes of an encoded `(rel_offset, count)` tail reference.
pub const TAIL_REF_SIZE: usize = 8;

/// A growing byte buffer used while marshalling a call or answer.
///
/// Mirrors the asio-style streambuf surface named in the spec:
/// `prepare`/`commit` reserve and publish write space, `consume` drops
/// already-processed bytes from the front, `data`/`size` expose the
/// readable region.
#[derive(Default)]
pub struct FlatBuffer {
    bytes: BytesMut,
}

impl FlatBuffer {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: BytesMut::with_capacity(capacity),
        }
    }

    /// Reserve at least `n` writable bytes and return a mutable view of
    /// them. The caller writes into the returned slice and then calls
    /// [`Self::commit`] with however many bytes it actually used.
    pub fn prepare(&mut self, n: usize) -> &mut [u8] {
        self.bytes.reserve(n);
        let spare = self.bytes.spare_capacity_mut();
        // SAFETY: spare_capacity_mut() returns uninitialized memory; callers
        // only read back the prefix they wrote via commit().
        unsafe { std::slice::from_raw_parts_mut(spare.as_mut_ptr().cast(), spare.len()) }
    }

    /// Publish `n` bytes previously written via [`Self::prepare`].
    pub fn commit(&mut self, n: usize) {
        assert!(n <= self.bytes.capacity() - self.bytes.len());
        unsafe { self.bytes.advance_mut(n) };
    }

    /// Drop `n` already-processed bytes from the front of the buffer.
    pub fn consume(&mut self, n: usize) {
        self.bytes.advance(n.min(self.bytes.len()));
    }

    pub fn data(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn put_slice(&mut self, data: &[u8]) {
        self.bytes.put_slice(data);
    }

    pub fn into_inner(self) -> BytesMut {
        self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut BytesMut {
        &mut self.bytes
    }
}

/// A primitive type that has a fixed little-endian wire width.
///
/// Implemented for the integer and floating point primitives. Composite
/// struct fields of these types are read directly out of the buffer with no
/// intermediate allocation.
pub trait FlatPrimitive: Copy + Sized {
    const SIZE: usize;

    fn read_le(bytes: &[u8]) -> Self;
    fn write_le(self, buf: &mut BytesMut);
}

macro_rules! impl_flat_primitive {
    ($ty:ty) => {
        impl FlatPrimitive for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                <$ty>::from_le_bytes(raw)
            }

            fn write_le(self, buf: &mut BytesMut) {
                buf.put_slice(&self.to_le_bytes());
            }
        }
    };
}

impl_flat_primitive!(u8);
impl_flat_primitive!(u16);
impl_flat_primitive!(u32);
impl_flat_primitive!(u64);
impl_flat_primitive!(i8);
impl_flat_primitive!(i16);
impl_flat_primitive!(i32);
impl_flat_primitive!(i64);
impl_flat_primitive!(f32);
impl_flat_primitive!(f64);

impl FlatPrimitive for bool {
    const SIZE: usize = 1;

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    fn write_le(self, buf: &mut BytesMut) {
        buf.put_u8(self as u8);
    }
}

fn align_up(value: usize, align: usize) -> usize {
    if align == 0 {
        return value;
    }
    (value + align - 1) / align * align
}

/// Pad `buf` so its current length is aligned to `align` bytes, returning
/// the (post-padding) tail start offset.
fn align_tail(buf: &mut BytesMut, align: usize) -> usize {
    let target = align_up(buf.len(), align.max(1));
    if target > buf.len() {
        buf.put_bytes(0, target - buf.len());
    }
    buf.len()
}

/// Write a `(rel_offset, count)` tail reference at `slot`, pointing at the
/// current (about to be written) end of `buf`.
fn write_tail_ref(buf: &mut BytesMut, slot: usize, tail_start: usize, count: u32) {
    let rel_offset = (tail_start - slot) as u32;
    buf[slot..slot + 4].copy_from_slice(&rel_offset.to_le_bytes());
    buf[slot + 4..slot + 8].copy_from_slice(&count.to_le_bytes());
}

fn read_tail_ref(buf: &[u8], slot: usize) -> Result<(usize, usize), Error> {
    if slot + TAIL_REF_SIZE > buf.len() {
        return Err(Error::OutOfBounds);
    }

    let rel_offset = u32::from_le_bytes(buf[slot..slot + 4].try_into()?) as usize;
    let count = u32::from_le_bytes(buf[slot + 4..slot + 8].try_into()?) as usize;
    let abs = slot + rel_offset;

    if abs < slot + TAIL_REF_SIZE || abs > buf.len() {
        return Err(Error::OutOfBounds);
    }

    Ok((abs, count))
}

/// Reserve a `(rel_offset, count)` slot in `buf`, to be patched later by
/// [`write_str`]/[`write_vector`]/[`write_optional`]. Returns the slot's
/// offset.
pub fn reserve_tail_slot(buf: &mut BytesMut) -> usize {
    let slot = buf.len();
    buf.put_u32_le(0);
    buf.put_u32_le(0);
    slot
}

/// Write a UTF-8 string's bytes into the tail and patch the slot reserved
/// by [`reserve_tail_slot`].
pub fn write_str(buf: &mut BytesMut, slot: usize, value: &str) {
    let tail_start = buf.len();
    buf.put_slice(value.as_bytes());
    write_tail_ref(buf, slot, tail_start, value.len() as u32);
}

/// Borrow the string referenced by `slot`. Zero-copy: no bytes are
/// allocated, the returned `&str` aliases `buf`.
pub fn read_str<'a>(buf: &'a [u8], slot: usize) -> Result<&'a str, Error> {
    let (abs, count) = read_tail_ref(buf, slot)?;
    if abs + count > buf.len() {
        return Err(Error::OutOfBounds);
    }

    Ok(std::str::from_utf8(&buf[abs..abs + count])?)
}

/// Write a vector of fixed-width primitives into the tail, aligned to
/// `T::SIZE`, and patch the slot.
pub fn write_vector<T: FlatPrimitive>(buf: &mut BytesMut, slot: usize, items: &[T]) {
    let tail_start = align_tail(buf, T::SIZE);
    for item in items {
        item.write_le(buf);
    }
    write_tail_ref(buf, slot, tail_start, items.len() as u32);
}

/// A lazily-decoded, zero-copy view of a primitive vector written by
/// [`write_vector`]. Individual elements are decoded on access.
pub struct FlatSlice<'a, T> {
    bytes: &'a [u8],
    count: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<'a, T: FlatPrimitive> FlatSlice<'a, T> {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, index: usize) -> Option<T> {
        if index >= self.count {
            return None;
        }

        let offset = index * T::SIZE;
        Some(T::read_le(&self.bytes[offset..offset + T::SIZE]))
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.count).map(move |i| self.get(i).expect("index within bounds"))
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }
}

pub fn read_vector<'a, T: FlatPrimitive>(
    buf: &'a [u8],
    slot: usize,
) -> Result<FlatSlice<'a, T>, Error> {
    let (abs, count) = read_tail_ref(buf, slot)?;
    let byte_len = count
        .checked_mul(T::SIZE)
        .ok_or(Error::OutOfBounds)?;

    if abs + byte_len > buf.len() {
        return Err(Error::OutOfBounds);
    }

    Ok(FlatSlice {
        bytes: &buf[abs..abs + byte_len],
        count,
        _marker: std::marker::PhantomData,
    })
}

/// Optionals are encoded identically to a single-element vector: `count`
/// is 0 or 1.
pub fn write_optional<T: FlatPrimitive>(buf: &mut BytesMut, slot: usize, value: Option<T>) {
    match value {
        Some(v) => write_vector(buf, slot, std::slice::from_ref(&v)),
        None => write_vector::<T>(buf, slot, &[]),
    }
}

pub fn read_optional<T: FlatPrimitive>(buf: &[u8], slot: usize) -> Result<Option<T>, Error> {
    let slice = read_vector::<T>(buf, slot)?;
    Ok(slice.get(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trip() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(0xdead_beef);
        let slot = reserve_tail_slot(&mut buf);
        write_str(&mut buf, slot, "hello, nprpc");

        assert_eq!(read_str(&buf, slot).unwrap(), "hello, nprpc");
    }

    #[test]
    fn vector_round_trip() {
        let mut buf = BytesMut::new();
        let slot = reserve_tail_slot(&mut buf);
        write_vector(&mut buf, slot, &[1u32, 2, 3, 4]);

        let read: FlatSlice<u32> = read_vector(&buf, slot).unwrap();
        assert_eq!(read.to_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn optional_round_trip() {
        let mut buf = BytesMut::new();
        let slot_some = reserve_tail_slot(&mut buf);
        write_optional(&mut buf, slot_some, Some(42u64));
        assert_eq!(read_optional::<u64>(&buf, slot_some).unwrap(), Some(42));

        let mut buf2 = BytesMut::new();
        let slot_none = reserve_tail_slot(&mut buf2);
        write_optional::<u64>(&mut buf2, slot_none, None);
        assert_eq!(read_optional::<u64>(&buf2, slot_none).unwrap(), None);
    }

    #[test]
    fn offset_out_of_bounds_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(0xffff_ffff);
        buf.put_u32_le(1);

        assert!(matches!(
            read_vector::<u8>(&buf, 0),
            Err(Error::OutOfBounds)
        ));
    }
}
