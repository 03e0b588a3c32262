/// A transferable memory allocation used to carry decrypted or decoded
/// payloads out of the engine.
///
/// Buffers are allocated by the client on the host's request, handed to the
/// engine for writing and returned to the client attached to a result. The
/// host only relays the transfer; it never frees a buffer itself.
pub trait Buffer: Send {
    fn capacity(&self) -> usize;

    /// Number of bytes the engine has written.
    fn size(&self) -> usize;

    /// Clamped to `capacity`.
    fn set_size(&mut self, size: usize);

    /// The written portion, `size` bytes long.
    fn data(&self) -> &[u8];

    /// The full allocation, `capacity` bytes long.
    fn data_mut(&mut self) -> &mut [u8];
}

/// Plain heap-backed [`Buffer`], suitable for clients without special
/// allocation requirements.
pub struct HeapBuffer {
    data: Vec<u8>,
    size: usize,
}

impl HeapBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            size: 0,
        }
    }
}

impl Buffer for HeapBuffer {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn set_size(&mut self, size: usize) {
        self.size = size.min(self.data.len());
    }

    fn data(&self) -> &[u8] {
        &self.data[..self.size]
    }

    fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}
