// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! FIFO queues of engine-owned buffers, one per port.

use std::collections::VecDeque;

use remain::sorted;
use thiserror::Error as ThisError;

use crate::buffer::BufferHeader;
use crate::buffer::BufferId;
use crate::buffer::BufferPool;
use crate::buffer::Owner;
use crate::buffer::PortIndex;

/// Errors raised by buffer pool and queue operations.
#[sorted]
#[derive(Debug, ThisError)]
pub enum PortError {
    #[error("no buffer queued on the {0}")]
    Empty(PortIndex),
    #[error("buffer {id} is owned by the {actual}, expected the {expected}")]
    InvalidOwnership {
        id: BufferId,
        expected: Owner,
        actual: Owner,
    },
    #[error("all {limit} buffers of the {port} are in use")]
    PoolExhausted { port: PortIndex, limit: usize },
    #[error("buffer {0} is still queued on its port")]
    StillQueued(BufferId),
    #[error("unknown buffer {0}")]
    UnknownBuffer(BufferId),
    #[error("buffer {id} belongs to the {actual}, not the {expected}")]
    WrongPort {
        id: BufferId,
        expected: PortIndex,
        actual: PortIndex,
    },
}

/// Ordered buffers the framework has handed to the engine on one port.
#[derive(Debug)]
pub struct PortQueue {
    port: PortIndex,
    queue: VecDeque<BufferId>,
}

impl PortQueue {
    pub fn new(port: PortIndex) -> Self {
        Self {
            port,
            queue: VecDeque::new(),
        }
    }

    pub fn port(&self) -> PortIndex {
        self.port
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn front(&self) -> Option<BufferId> {
        self.queue.front().copied()
    }

    fn contains(&self, id: BufferId) -> bool {
        self.queue.contains(&id)
    }
}

/// Both port queues together with the pool their buffers live in.
///
/// Raw-mode input buffers that were consumed but may still be read by the backend are parked in
/// `held_inputs` until the backend reports them released.
#[derive(Debug)]
pub struct Ports {
    pool: BufferPool,
    input: PortQueue,
    output: PortQueue,
    // Consumed raw inputs, oldest first. The flag records whether the backend saw the buffer.
    held_inputs: VecDeque<(BufferId, bool)>,
}

impl Ports {
    pub fn new(pool: BufferPool) -> Self {
        Self {
            pool,
            input: PortQueue::new(PortIndex::Input),
            output: PortQueue::new(PortIndex::Output),
            held_inputs: VecDeque::new(),
        }
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut BufferPool {
        &mut self.pool
    }

    pub fn queue(&self, port: PortIndex) -> &PortQueue {
        match port {
            PortIndex::Input => &self.input,
            PortIndex::Output => &self.output,
        }
    }

    fn queue_mut(&mut self, port: PortIndex) -> &mut PortQueue {
        match port {
            PortIndex::Input => &mut self.input,
            PortIndex::Output => &mut self.output,
        }
    }

    /// Hands a framework-owned buffer to the engine and appends it to its port's queue.
    pub fn push(&mut self, port: PortIndex, id: BufferId) -> Result<(), PortError> {
        let actual = self.pool.get(id)?.port();
        if actual != port {
            return Err(PortError::WrongPort {
                id,
                expected: port,
                actual,
            });
        }
        self.pool.transfer(id, Owner::Framework, Owner::Engine)?;
        self.queue_mut(port).queue.push_back(id);
        Ok(())
    }

    pub fn push_input(&mut self, id: BufferId) -> Result<(), PortError> {
        self.push(PortIndex::Input, id)
    }

    pub fn push_output(&mut self, id: BufferId) -> Result<(), PortError> {
        self.push(PortIndex::Output, id)
    }

    pub fn front(&self, port: PortIndex) -> Result<BufferId, PortError> {
        self.queue(port).front().ok_or(PortError::Empty(port))
    }

    pub fn front_input(&self) -> Result<BufferId, PortError> {
        self.front(PortIndex::Input)
    }

    pub fn front_output(&self) -> Result<BufferId, PortError> {
        self.front(PortIndex::Output)
    }

    /// Removes the head of `port`'s queue. The buffer stays engine-owned.
    pub fn pop_front(&mut self, port: PortIndex) -> Result<BufferId, PortError> {
        self.queue_mut(port)
            .queue
            .pop_front()
            .ok_or(PortError::Empty(port))
    }

    /// Returns an engine-owned buffer that is no longer queued to the framework.
    pub fn give_back(&mut self, id: BufferId) -> Result<&BufferHeader, PortError> {
        let port = self.pool.get(id)?.port();
        if self.queue(port).contains(id) {
            return Err(PortError::StillQueued(id));
        }
        self.held_inputs.retain(|&(held, _)| held != id);
        self.pool.transfer(id, Owner::Engine, Owner::Framework)?;
        self.pool.get(id)
    }

    /// Parks a consumed raw input until the backend releases it.
    pub fn hold_input(&mut self, id: BufferId, submitted: bool) {
        self.held_inputs.push_back((id, submitted));
    }

    pub fn held_inputs(&self) -> usize {
        self.held_inputs.len()
    }

    /// Pops held inputs in FIFO order until `released` submitted ones have been accounted for.
    ///
    /// Inputs the backend never saw are released for free as they reach the head. The returned
    /// buffers are still engine-owned; callers hand them back with [`Ports::give_back`].
    pub fn release_held_inputs(&mut self, mut released: usize) -> Vec<BufferId> {
        let mut ids = Vec::new();
        while let Some(&(id, submitted)) = self.held_inputs.front() {
            if submitted {
                if released == 0 {
                    break;
                }
                released -= 1;
            }
            self.held_inputs.pop_front();
            ids.push(id);
        }
        ids
    }

    /// Empties `port`'s queue and returns every buffer it held, oldest first.
    ///
    /// Flushing the input port also drops held raw inputs, which come first since they were
    /// queued earlier. Output buffers have their transient fields cleared.
    pub fn flush(&mut self, port: PortIndex) -> Vec<BufferId> {
        let mut ids: Vec<BufferId> = Vec::new();
        if port == PortIndex::Input {
            ids.extend(self.held_inputs.drain(..).map(|(id, _)| id));
        }
        ids.extend(self.queue_mut(port).queue.drain(..));
        for &id in &ids {
            let header = match self.pool.get_owned_mut(id, Owner::Engine) {
                Ok(header) => header,
                Err(e) => panic!("queued buffer is not engine-owned: {}", e),
            };
            if port == PortIndex::Output {
                header.reset_transient();
            }
            header.set_owner(Owner::Framework);
        }
        ids
    }

    /// Whether every registered buffer is back with the framework.
    pub fn is_drained(&self) -> bool {
        self.input.is_empty()
            && self.output.is_empty()
            && self.held_inputs.is_empty()
            && self
                .pool
                .headers()
                .all(|header| header.owner() == Owner::Framework)
    }

    /// Panics if any buffer is still queued or held by the engine.
    pub fn assert_drained(&self) {
        assert!(
            self.is_drained(),
            "buffers still held by the engine: {} input, {} output, {} held",
            self.input.len(),
            self.output.len(),
            self.held_inputs.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports() -> (Ports, Vec<BufferId>, Vec<BufferId>) {
        let mut pool = BufferPool::new(4, 4);
        let inputs = (0..3)
            .map(|_| pool.allocate(PortIndex::Input, 64).unwrap())
            .collect();
        let outputs = (0..2)
            .map(|_| pool.allocate(PortIndex::Output, 64).unwrap())
            .collect();
        (Ports::new(pool), inputs, outputs)
    }

    #[test]
    fn queues_are_fifo() {
        let (mut ports, inputs, _) = ports();
        for &id in &inputs {
            ports.push_input(id).unwrap();
        }
        assert_eq!(ports.front_input().unwrap(), inputs[0]);
        assert_eq!(ports.pop_front(PortIndex::Input).unwrap(), inputs[0]);
        assert_eq!(ports.pop_front(PortIndex::Input).unwrap(), inputs[1]);
        assert_eq!(ports.front_input().unwrap(), inputs[2]);
        assert!(matches!(
            ports.front_output(),
            Err(PortError::Empty(PortIndex::Output))
        ));
    }

    #[test]
    fn push_checks_port_and_ownership() {
        let (mut ports, inputs, outputs) = ports();
        assert!(matches!(
            ports.push_output(inputs[0]),
            Err(PortError::WrongPort { .. })
        ));
        ports.push_output(outputs[0]).unwrap();
        assert!(matches!(
            ports.push_output(outputs[0]),
            Err(PortError::InvalidOwnership { .. })
        ));
        assert!(matches!(
            ports.push_input(99),
            Err(PortError::UnknownBuffer(99))
        ));
    }

    #[test]
    fn give_back_refuses_queued_buffers() {
        let (mut ports, inputs, _) = ports();
        ports.push_input(inputs[0]).unwrap();
        assert!(ports.give_back(inputs[0]).is_err());
        let id = ports.pop_front(PortIndex::Input).unwrap();
        assert_eq!(ports.give_back(id).unwrap().owner(), Owner::Framework);
        assert!(ports.is_drained());
    }

    #[test]
    fn held_inputs_release_in_order() {
        let (mut ports, inputs, _) = ports();
        for &id in &inputs {
            ports.push_input(id).unwrap();
            ports.pop_front(PortIndex::Input).unwrap();
        }
        ports.hold_input(inputs[0], true);
        ports.hold_input(inputs[1], false);
        ports.hold_input(inputs[2], true);

        assert!(ports.release_held_inputs(0).is_empty());
        assert_eq!(ports.release_held_inputs(1), vec![inputs[0], inputs[1]]);
        assert_eq!(ports.held_inputs(), 1);
        assert_eq!(ports.release_held_inputs(5), vec![inputs[2]]);
    }

    #[test]
    fn flush_returns_everything_and_clears_outputs() {
        let (mut ports, inputs, outputs) = ports();
        ports.push_input(inputs[0]).unwrap();
        ports.pop_front(PortIndex::Input).unwrap();
        ports.hold_input(inputs[0], true);
        ports.push_input(inputs[1]).unwrap();
        ports.push_output(outputs[0]).unwrap();
        ports.pool_mut().get_mut(outputs[0]).unwrap().filled_len = 12;

        assert_eq!(ports.flush(PortIndex::Input), vec![inputs[0], inputs[1]]);
        assert!(!ports.is_drained());
        assert_eq!(ports.flush(PortIndex::Output), vec![outputs[0]]);
        assert_eq!(ports.pool().get(outputs[0]).unwrap().filled_len, 0);
        ports.assert_drained();
    }

    #[test]
    #[should_panic(expected = "buffers still held by the engine")]
    fn assert_drained_panics_with_queued_buffers() {
        let (mut ports, inputs, _) = ports();
        ports.push_input(inputs[0]).unwrap();
        ports.assert_drained();
    }
}
