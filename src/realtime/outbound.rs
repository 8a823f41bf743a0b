// FIFO buffer for frames produced while the socket is down. Flushed in
// enqueue order ahead of any new traffic when the connection comes back.

use std::collections::VecDeque;

use super::protocol::ClientFrame;

#[derive(Debug, Default)]
pub struct OutboundQueue {
    pending: VecDeque<ClientFrame>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, frame: ClientFrame) {
        self.pending.push_back(frame);
    }

    /// Put frames back at the head of the queue, preserving their order.
    /// Used when a flush dies partway through.
    pub fn requeue_front(&mut self, frames: Vec<ClientFrame>) {
        for frame in frames.into_iter().rev() {
            self.pending.push_front(frame);
        }
    }

    pub fn drain(&mut self) -> Vec<ClientFrame> {
        self.pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
