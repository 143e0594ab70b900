//! Fixed-capacity request and reply buffers.

use bytes::BytesMut;

/// Capacity of each message buffer in bytes
pub const MAX_LENGTH: usize = 1024;

/// Request and reply storage for one exchange
///
/// Both buffers are allocated once at `capacity` and never grow. Oversized
/// input is truncated when it is copied in.
#[derive(Debug)]
pub struct MessageBuffer {
    capacity: usize,
    request: BytesMut,
    reply: BytesMut,
}

impl MessageBuffer {
    /// Allocate both buffers with `capacity` bytes each
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            request: BytesMut::with_capacity(capacity),
            reply: BytesMut::with_capacity(capacity),
        }
    }

    /// Capacity of each buffer
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Replace the request with `input`, truncated to capacity
    ///
    /// Returns true if `input` did not fit and was cut.
    pub fn fill_request(&mut self, input: &[u8]) -> bool {
        let len = input.len().min(self.capacity);
        self.request.clear();
        self.request.extend_from_slice(&input[..len]);
        len < input.len()
    }

    /// Current request payload
    pub fn request(&self) -> &[u8] {
        &self.request
    }

    /// Zeroed reply region of exactly `len` bytes, clamped to capacity
    pub fn reply_slot(&mut self, len: usize) -> &mut [u8] {
        let len = len.min(self.capacity);
        self.reply.clear();
        self.reply.resize(len, 0);
        &mut self.reply[..]
    }

    /// Current reply contents
    pub fn reply(&self) -> &[u8] {
        &self.reply
    }

    /// Move the reply out, leaving the buffer empty
    pub fn take_reply(&mut self) -> Vec<u8> {
        self.reply.split().to_vec()
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new(MAX_LENGTH)
    }
}
