/// Byte written into every guard byte at allocation.
pub const CANARY: u8 = 0xA5;

/// A byte buffer followed by a canary-filled guard zone.
///
/// Kernels see the full allocation, so an out-of-range tail write lands in the
/// guard instead of panicking and shows up in [`GuardedBuffer::guard_damage`].
#[derive(Debug, Clone)]
pub struct GuardedBuffer {
    bytes: Vec<u8>,
    len: usize,
}

impl GuardedBuffer {
    /// Allocate `len` bytes plus `guard` canary bytes. The body is copied from
    /// `contents` when given, zeroed otherwise.
    pub fn new(len: usize, guard: usize, contents: Option<&[u8]>) -> Self {
        let mut bytes = vec![CANARY; len + guard];
        match contents {
            Some(src) => {
                let n = src.len().min(len);
                bytes[..n].copy_from_slice(&src[..n]);
                bytes[n..len].fill(0);
            }
            None => bytes[..len].fill(0),
        }
        Self { bytes, len }
    }

    /// Usable length, excluding the guard.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn guard_len(&self) -> usize {
        self.bytes.len() - self.len
    }

    /// The usable bytes.
    pub fn contents(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Body and guard together.
    pub fn raw(&self) -> &[u8] {
        &self.bytes
    }

    pub fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Number of guard bytes no longer holding the canary.
    pub fn guard_damage(&self) -> usize {
        self.bytes[self.len..].iter().filter(|&&b| b != CANARY).count()
    }

    pub fn guard_intact(&self) -> bool {
        self.guard_damage() == 0
    }
}
