//! Binary packing for the ledger wire format (little-endian, length-prefixed)

pub trait Pack {
    fn pack(&self, buf: &mut Vec<u8>);

    fn packed_len(&self) -> usize {
        let mut buf = Vec::new();
        self.pack(&mut buf);
        buf.len()
    }

    fn to_packed_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.pack(&mut buf);
        buf
    }
}

pub(crate) fn pack_u8(buf: &mut Vec<u8>, value: u8) {
    buf.push(value);
}

pub(crate) fn pack_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn pack_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn pack_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Bytes prefixed with a little-endian u16 length
pub(crate) fn pack_bytes_u16(buf: &mut Vec<u8>, bytes: &[u8]) {
    pack_u16(buf, bytes.len() as u16);
    buf.extend_from_slice(bytes);
}

/// Bytes prefixed with a little-endian u32 length
pub(crate) fn pack_bytes_u32(buf: &mut Vec<u8>, bytes: &[u8]) {
    pack_u32(buf, bytes.len() as u32);
    buf.extend_from_slice(bytes);
}
