//! Little-endian fixed-layout packing for the on-wire records. Every record
//! writes its fields at explicit offsets into a buffer whose size is a
//! compile-time constant; there is no implicit padding between fields.

/// Writes the fields of a record in declaration order. The caller's buffer
/// starts zeroed, so padding is just a skip. Dropping the writer without
/// covering the whole buffer is a layout bug, caught by [`finish`].
///
/// [`finish`]: FieldWriter::finish
pub struct FieldWriter<'a> {
    buf: &'a mut [u8],
    at: usize,
}

impl<'a> FieldWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> FieldWriter<'a> {
        FieldWriter { buf, at: 0 }
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf[self.at..self.at + bytes.len()].copy_from_slice(bytes);
        self.at += bytes.len();
    }

    pub fn put_u32(&mut self, value: u32) {
        self.put_bytes(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.put_bytes(&value.to_le_bytes());
    }

    /// Skip `n` bytes of zero padding.
    pub fn pad(&mut self, n: usize) {
        self.at += n;
    }

    pub fn finish(self) {
        assert_eq!(self.at, self.buf.len());
    }
}

/// Reads the fields of a record in declaration order.
pub struct FieldReader<'a> {
    buf: &'a [u8],
    at: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> FieldReader<'a> {
        FieldReader { buf, at: 0 }
    }

    pub fn take_bytes<const N: usize>(&mut self) -> [u8; N] {
        let out = self.buf[self.at..self.at + N].try_into().unwrap();
        self.at += N;
        out
    }

    pub fn take_u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take_bytes())
    }

    pub fn take_u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take_bytes())
    }

    pub fn skip(&mut self, n: usize) {
        self.at += n;
    }

    pub fn finish(self) {
        assert_eq!(self.at, self.buf.len());
    }
}
