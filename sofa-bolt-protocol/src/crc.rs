//! Frame checksum, bit-compatible with `java.util.zip.CRC32`.
//!
//! Bolt servers verify the trailer with the JDK CRC32 (reflected IEEE
//! polynomial 0xEDB88320, initial register 0xFFFFFFFF, final XOR
//! 0xFFFFFFFF). `crc32fast` implements exactly that variant; this type
//! only adds the segmented-buffer entry point the codec needs.

use bytes::Buf;

#[derive(Debug, Clone, Default)]
pub struct JavaCrc32 {
    hasher: crc32fast::Hasher,
}

impl JavaCrc32 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Digests a contiguous byte range.
    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Digests a possibly segmented buffer block-by-block, without
    /// copying.
    pub fn update_buf(&mut self, mut buf: impl Buf) {
        while buf.has_remaining() {
            let chunk = buf.chunk();
            self.hasher.update(chunk);
            let len = chunk.len();
            buf.advance(len);
        }
    }

    /// The checksum after the final XOR.
    pub fn finish(self) -> u32 {
        self.hasher.finalize()
    }
}
