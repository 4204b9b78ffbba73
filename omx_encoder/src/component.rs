// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Thread-safe component facade used by the framework.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::thread;

use log::debug;
use log::error;
use log::info;

use crate::backend::Encoder;
use crate::buffer::BufferHeader;
use crate::buffer::BufferId;
use crate::buffer::BufferPool;
use crate::buffer::Owner;
use crate::buffer::PortIndex;
use crate::engine::Engine;
use crate::engine::EngineState;
use crate::event::ComponentEvent;
use crate::event::EventSink;
use crate::lock;
use crate::params::AvcParams;
use crate::params::BitrateParams;
use crate::params::ComponentOptions;
use crate::params::ConfigRequest;
use crate::params::ControlRate;
use crate::params::EncoderParams;
use crate::params::IntraRefresh;
use crate::params::ParamError;
use crate::params::ParamResult;
use crate::params::PortDefinition;
use crate::params::ProfileLevel;
use crate::port::PortError;
use crate::port::Ports;
use crate::update::UpdateQueue;

struct Inner<E: Encoder> {
    ports: Ports,
    engine: Engine<E>,
    // Events waiting to be handed to the sink, in emission order.
    outbox: VecDeque<ComponentEvent>,
    // Set while some thread is delivering the outbox.
    dispatching: bool,
}

/// An H.264 encoder component.
///
/// Every call that hands buffers or configuration to the component runs drain cycles until no
/// more progress can be made. Notifications are delivered to the [`EventSink`] with no lock
/// held; a sink calling back into the component has its own events delivered after the current
/// one, so the sink always sees events in emission order.
///
/// Locks are always taken in the order `inner` then `params`.
pub struct AvcEncoder<E: Encoder> {
    name: String,
    inner: Mutex<Inner<E>>,
    params: Mutex<EncoderParams>,
    updates: UpdateQueue,
    sink: Box<dyn EventSink>,
}

impl<E: Encoder> AvcEncoder<E> {
    pub fn new<S: EventSink + 'static>(
        name: &str,
        encoder: E,
        options: &ComponentOptions,
        sink: S,
    ) -> Self {
        info!(
            "{}: created for {}x{} @ {} fps, {} bps",
            name, options.width, options.height, options.frame_rate, options.bitrate
        );
        let pool = BufferPool::new(options.buffer_count, options.buffer_count);
        Self {
            name: name.to_owned(),
            inner: Mutex::new(Inner {
                ports: Ports::new(pool),
                engine: Engine::new(encoder),
                outbox: VecDeque::new(),
                dispatching: false,
            }),
            params: Mutex::new(EncoderParams::new(options)),
            updates: UpdateQueue::new(),
            sink: Box::new(sink),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> EngineState {
        lock(&self.inner).engine.state()
    }

    /// Creates a zero-filled buffer of `size` bytes on `port`.
    pub fn allocate_buffer(&self, port: PortIndex, size: usize) -> Result<BufferId, PortError> {
        let id = lock(&self.inner).ports.pool_mut().allocate(port, size)?;
        debug!("{}: allocated buffer {} on the {}", self.name, id, port);
        Ok(id)
    }

    /// Registers caller-provided `memory` as a buffer on `port`.
    pub fn use_buffer(&self, port: PortIndex, memory: Vec<u8>) -> Result<BufferId, PortError> {
        let id = lock(&self.inner).ports.pool_mut().register(port, memory)?;
        debug!("{}: registered buffer {} on the {}", self.name, id, port);
        Ok(id)
    }

    /// Unregisters a buffer and returns its memory.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is currently owned by the component.
    pub fn free_buffer(&self, id: BufferId) -> Result<Vec<u8>, PortError> {
        match lock(&self.inner).ports.pool_mut().release(id) {
            Err(e @ PortError::InvalidOwnership { .. }) => {
                panic!("protocol violation: freeing buffer {}: {}", id, e)
            }
            result => result,
        }
    }

    /// Gives `f` access to a framework-owned buffer.
    ///
    /// Fails with `PortError::InvalidOwnership` while the component owns the buffer. `f` must not
    /// call back into the component.
    pub fn with_buffer<F, R>(&self, id: BufferId, f: F) -> Result<R, PortError>
    where
        F: FnOnce(&mut BufferHeader) -> R,
    {
        let mut inner = lock(&self.inner);
        let header = inner.ports.pool_mut().get_owned_mut(id, Owner::Framework)?;
        Ok(f(header))
    }

    /// Hands a filled input buffer to the component.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is unknown, belongs to the output port or is already owned by the
    /// component.
    pub fn push_input_buffer(&self, id: BufferId) {
        self.push(PortIndex::Input, id);
    }

    /// Hands an empty output buffer to the component.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is unknown, belongs to the input port or is already owned by the
    /// component.
    pub fn push_output_buffer(&self, id: BufferId) {
        self.push(PortIndex::Output, id);
    }

    fn push(&self, port: PortIndex, id: BufferId) {
        if let Err(e) = lock(&self.inner).ports.push(port, id) {
            panic!("protocol violation: pushing buffer {} to the {}: {}", id, port, e);
        }
        self.process();
    }

    /// Changes the target bitrate. The last value set before the next frame wins.
    pub fn set_bitrate(&self, bitrate: u32) {
        let params = BitrateParams {
            port: PortIndex::Output,
            control_rate: ControlRate::Variable,
            target_bitrate: bitrate,
        };
        // The output port is always accepted.
        if let Err(e) = lock(&self.params).set_bitrate_params(&params, &self.updates) {
            error!("{}: cannot set bitrate: {}", self.name, e);
        }
        self.process();
    }

    /// Makes the next encoded frame a key frame.
    pub fn request_key_frame(&self) {
        self.updates.request_key_frame();
        self.process();
    }

    pub fn port_definition(&self, port: PortIndex) -> PortDefinition {
        lock(&self.params).port_definition(port)
    }

    pub fn bitrate_params(&self, port: PortIndex) -> ParamResult<BitrateParams> {
        lock(&self.params).bitrate_params(port)
    }

    pub fn set_bitrate_params(&self, params: &BitrateParams) -> ParamResult<()> {
        lock(&self.params).set_bitrate_params(params, &self.updates)?;
        self.process();
        Ok(())
    }

    pub fn avc_params(&self, port: PortIndex) -> ParamResult<AvcParams> {
        lock(&self.params).avc_params(port)
    }

    pub fn set_avc_params(&self, params: &AvcParams) -> ParamResult<()> {
        lock(&self.params).set_avc_params(params)
    }

    pub fn profile_level(&self, index: usize) -> ParamResult<ProfileLevel> {
        lock(&self.params).profile_level(index)
    }

    pub fn intra_refresh(&self, port: PortIndex) -> ParamResult<IntraRefresh> {
        lock(&self.params).intra_refresh(port)
    }

    /// Applies a runtime config and runs the drain cycles it may unblock.
    pub fn set_config(&self, request: &ConfigRequest) -> ParamResult<()> {
        lock(&self.params).set_config(request, &self.updates)?;
        self.process();
        Ok(())
    }

    /// Changes the frame geometry. Only allowed while no buffer is registered.
    pub fn set_video_format(&self, width: u32, height: u32, frame_rate: u32) -> ParamResult<()> {
        let inner = lock(&self.inner);
        let pool = inner.ports.pool();
        if pool.count(PortIndex::Input) > 0 || pool.count(PortIndex::Output) > 0 {
            return Err(ParamError::IncorrectState);
        }
        lock(&self.params).set_video_format(width, height, frame_rate)
    }

    /// Switches input buffers between raw frames and metadata descriptors.
    ///
    /// Only allowed on the input port while no input buffer is registered.
    ///
    /// # Safety
    ///
    /// With `enable` set, every input buffer queued afterwards must carry a descriptor whose
    /// graphics buffer stays alive until the input buffer is returned.
    pub unsafe fn store_metadata_in_buffers(&self, port: PortIndex, enable: bool) -> ParamResult<()> {
        let inner = lock(&self.inner);
        if port == PortIndex::Input && inner.ports.pool().count(PortIndex::Input) > 0 {
            return Err(ParamError::IncorrectState);
        }
        lock(&self.params).set_metadata_mode(port, enable)?;
        info!("{}: metadata mode {}", self.name, enable);
        Ok(())
    }

    /// Returns every buffer queued on `port` to the framework.
    ///
    /// Flushed output buffers are reported as filled with zero bytes.
    pub fn flush(&self, port: PortIndex) {
        {
            let mut inner = lock(&self.inner);
            Self::flush_port(&mut inner, port);
        }
        self.dispatch_events();
    }

    /// Returns all buffers, closes the backend session and goes back to `EngineState::Idle`.
    pub fn reset(&self) {
        {
            let mut inner = lock(&self.inner);
            Self::flush_port(&mut inner, PortIndex::Input);
            Self::flush_port(&mut inner, PortIndex::Output);
            inner.engine.reset();
            self.updates.clear();
        }
        info!("{}: reset", self.name);
        self.dispatch_events();
    }

    /// Tears the component down.
    ///
    /// # Panics
    ///
    /// Panics if any buffer is still owned by the component.
    pub fn shutdown(mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        inner.engine.close_session();
        inner.ports.assert_drained();
        info!("{}: shut down", self.name);
    }

    fn flush_port(inner: &mut Inner<E>, port: PortIndex) {
        let ids = inner.ports.flush(port);
        if port == PortIndex::Input {
            inner.engine.input_flushed();
        }
        debug!("flushed {} buffers from the {}", ids.len(), port);
        inner.outbox.extend(ids.into_iter().map(|id| match port {
            PortIndex::Input => ComponentEvent::InputBufferReturned { id },
            PortIndex::Output => ComponentEvent::OutputBufferFilled {
                id,
                filled_len: 0,
                flags: Default::default(),
                timestamp: 0,
            },
        }));
    }

    /// Runs drain cycles until one makes no progress, then delivers the resulting events.
    fn process(&self) {
        {
            let mut inner = lock(&self.inner);
            let config = lock(&self.params).session_config();
            let Inner {
                ports,
                engine,
                outbox,
                ..
            } = &mut *inner;
            loop {
                match engine.drain_cycle(ports, &self.updates, &config, outbox) {
                    Ok(outcome) => {
                        if !outcome.made_progress() {
                            debug!("{}: drain stopped: {:?}", self.name, outcome);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("{}: {}", self.name, e);
                        outbox.push_back(ComponentEvent::FatalError {
                            reason: e.to_string(),
                        });
                        break;
                    }
                }
            }
        }
        self.dispatch_events();
    }

    fn dispatch_events(&self) {
        {
            let mut inner = lock(&self.inner);
            if inner.dispatching {
                // The thread already dispatching will pick our events up.
                return;
            }
            inner.dispatching = true;
        }
        let _guard = DispatchGuard(&self.inner);
        loop {
            let event = {
                let mut inner = lock(&self.inner);
                match inner.outbox.pop_front() {
                    Some(event) => event,
                    None => {
                        inner.dispatching = false;
                        return;
                    }
                }
            };
            self.sink.notify(event);
        }
    }
}

/// Hands dispatching over to the next caller if the sink panics mid-delivery.
struct DispatchGuard<'a, E: Encoder>(&'a Mutex<Inner<E>>);

impl<E: Encoder> Drop for DispatchGuard<'_, E> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .dispatching = false;
        }
    }
}

impl<E: Encoder> Drop for AvcEncoder<E> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        inner.engine.close_session();
        if !thread::panicking() {
            inner.ports.assert_drained();
        }
    }
}
