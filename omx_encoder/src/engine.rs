// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The drain cycle pairing queued input and output buffers through an encoder session.

use std::collections::VecDeque;

use log::debug;
use log::error;
use log::info;
use log::warn;
use remain::sorted;
use thiserror::Error as ThisError;

use crate::backend::Encoder;
use crate::backend::EncoderSession;
use crate::backend::FrameSource;
use crate::backend::SessionConfig;
use crate::buffer::BufferFlags;
use crate::buffer::BufferHeader;
use crate::buffer::BufferId;
use crate::buffer::BufferPool;
use crate::buffer::PortIndex;
use crate::error::VideoResult;
use crate::event::ComponentEvent;
use crate::metadata;
use crate::metadata::MetadataError;
use crate::port::Ports;
use crate::update::UpdateQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No session is open.
    Idle,
    /// A session is open and buffers are being drained.
    Draining,
    /// End of stream has been stamped on an output buffer.
    EosOutput,
    /// The backend could not be opened. Only a reset leaves this state.
    Error,
}

/// Reasons an input buffer cannot be encoded. The buffer stays queued.
#[sorted]
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum InputError {
    #[error("invalid metadata: {0}")]
    Metadata(#[from] MetadataError),
    #[error("payload at offset {offset} of length {len} overflows the {capacity}-byte buffer")]
    OutOfBounds {
        offset: u32,
        len: u32,
        capacity: usize,
    },
}

/// Result of one drain cycle.
#[derive(Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The engine is in `Error` or `EosOutput` and does not drain.
    Halted,
    /// No output buffer is queued.
    NoOutputBuffer,
    /// No input buffer is queued and end of stream has not been seen.
    NoInputBuffer,
    /// The head input buffer was rejected and left in place.
    Skipped(InputError),
    Progress {
        input_consumed: bool,
        output_returned: bool,
    },
}

impl CycleOutcome {
    /// Whether running another cycle right away may achieve more.
    pub fn made_progress(&self) -> bool {
        matches!(
            self,
            CycleOutcome::Progress {
                input_consumed: true,
                ..
            } | CycleOutcome::Progress {
                output_returned: true,
                ..
            }
        )
    }
}

// Buffers referenced by a port queue always exist in the pool.
fn queued(pool: &BufferPool, id: BufferId) -> &BufferHeader {
    match pool.get(id) {
        Ok(header) => header,
        Err(e) => panic!("queued buffer missing from the pool: {}", e),
    }
}

fn queued_mut(pool: &mut BufferPool, id: BufferId) -> &mut BufferHeader {
    match pool.get_mut(id) {
        Ok(header) => header,
        Err(e) => panic!("queued buffer missing from the pool: {}", e),
    }
}

/// Hands `id` back to the framework and queues the matching notification.
fn return_buffer(ports: &mut Ports, id: BufferId, events: &mut VecDeque<ComponentEvent>) {
    let header = match ports.give_back(id) {
        Ok(header) => header,
        Err(e) => panic!("cannot return buffer {} to the framework: {}", id, e),
    };
    let event = match header.port() {
        PortIndex::Input => ComponentEvent::InputBufferReturned { id },
        PortIndex::Output => ComponentEvent::OutputBufferFilled {
            id,
            filled_len: header.filled_len,
            flags: header.flags,
            timestamp: header.timestamp,
        },
    };
    events.push_back(event);
}

/// Picks the frame to hand to the backend out of an input payload.
fn frame_source(payload: &[u8], metadata_mode: bool) -> Result<FrameSource<'_>, InputError> {
    if !metadata_mode {
        return Ok(FrameSource::Raw(payload));
    }
    // SAFETY: in metadata mode the framework guarantees that descriptors of queued input buffers
    // point to graphics buffers that stay alive until the input buffer is returned.
    let handle = unsafe { metadata::resolve(payload) }?;
    Ok(FrameSource::Graphic(handle))
}

pub struct Engine<E: Encoder> {
    encoder: E,
    session: Option<E::Session>,
    state: EngineState,
    saw_input_eos: bool,
}

impl<E: Encoder> Engine<E> {
    pub fn new(encoder: E) -> Self {
        Self {
            encoder,
            session: None,
            state: EngineState::Idle,
            saw_input_eos: false,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn saw_input_eos(&self) -> bool {
        self.saw_input_eos
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Runs one drain cycle, appending notifications to `events`.
    ///
    /// Returns an error only when the backend cannot be opened, in which case the engine has
    /// moved to `EngineState::Error`.
    pub fn drain_cycle(
        &mut self,
        ports: &mut Ports,
        updates: &UpdateQueue,
        config: &SessionConfig,
        events: &mut VecDeque<ComponentEvent>,
    ) -> VideoResult<CycleOutcome> {
        if matches!(self.state, EngineState::Error | EngineState::EosOutput) {
            return Ok(CycleOutcome::Halted);
        }

        let output_id = match ports.front_output() {
            Ok(id) => id,
            Err(_) => return Ok(CycleOutcome::NoOutputBuffer),
        };
        let input_id = if self.saw_input_eos {
            None
        } else {
            match ports.front_input() {
                Ok(id) => Some(id),
                Err(_) => return Ok(CycleOutcome::NoInputBuffer),
            }
        };

        let Self {
            encoder,
            session,
            state,
            saw_input_eos,
        } = self;
        let session = match session {
            Some(session) => session,
            None => match encoder.start_session(config) {
                Ok(opened) => {
                    info!(
                        "encoder session opened ({}x{}, metadata mode {})",
                        config.width, config.height, config.metadata_mode
                    );
                    *state = EngineState::Draining;
                    session.insert(opened)
                }
                Err(e) => {
                    *state = EngineState::Error;
                    return Err(e);
                }
            },
        };

        let (input_flags, input_timestamp, input_len) = match input_id {
            Some(id) => {
                let input = queued(ports.pool(), id);
                (input.flags, Some(input.timestamp), input.filled_len)
            }
            None => (BufferFlags::empty(), None, 0),
        };
        {
            let output = queued_mut(ports.pool_mut(), output_id);
            output.reset_transient();
            output.flags = input_flags;
        }

        let pending = updates.drain_pending();
        if let Some(bitrate) = pending.bitrate_change() {
            if let Err(e) = session.set_bitrate(bitrate) {
                warn!("cannot change bitrate to {}: {}", bitrate, e);
            }
        }
        if pending.key_frame_requested() {
            if let Err(e) = session.request_key_frame() {
                error!("key frame request failed: {}", e);
            }
        }

        let mut submitted = false;
        if let Some(input_id) = input_id.filter(|_| input_len > 0) {
            let (output, input) = match ports.pool_mut().pair_mut(output_id, input_id) {
                Ok(pair) => pair,
                Err(e) => panic!("queued buffers missing from the pool: {}", e),
            };
            let payload = match input.payload() {
                Some(payload) => payload,
                None => {
                    let e = InputError::OutOfBounds {
                        offset: input.offset,
                        len: input.filled_len,
                        capacity: input.capacity(),
                    };
                    error!("skipping input buffer {}: {}", input_id, e);
                    return Ok(CycleOutcome::Skipped(e));
                }
            };
            let source = match frame_source(payload, config.metadata_mode) {
                Ok(source) => source,
                Err(e) => {
                    error!("skipping input buffer {}: {}", input_id, e);
                    return Ok(CycleOutcome::Skipped(e));
                }
            };

            let start = output.filled_len as usize;
            match session.encode_frame(source, &mut output.data_mut()[start..]) {
                Ok(written) => {
                    // `written` never exceeds the slice handed to the backend.
                    output.filled_len += written as u32;
                    submitted = true;
                    debug!("encoded input {} into {} bytes", input_id, written);
                }
                Err(e) => error!("dropping input buffer {}: {}", input_id, e),
            }
        }

        if let Some(input_id) = input_id {
            if let Err(e) = ports.pop_front(PortIndex::Input) {
                panic!("input queue lost its head buffer: {}", e);
            }
            if input_flags.contains(BufferFlags::EOS) {
                debug!("end of stream seen on input buffer {}", input_id);
                *saw_input_eos = true;
            }
            if config.metadata_mode {
                return_buffer(ports, input_id, events);
            } else {
                ports.hold_input(input_id, submitted);
            }
        }
        let drained = *saw_input_eos && session.output_drained();
        if !config.metadata_mode {
            let mut released = session.take_released_inputs();
            if drained {
                // A drained session no longer references any frame.
                released = ports.held_inputs();
            }
            for id in ports.release_held_inputs(released) {
                return_buffer(ports, id, events);
            }
        }

        let output = queued_mut(ports.pool_mut(), output_id);
        output.flags.set(BufferFlags::EOS, drained);
        let output_returned = output.filled_len > 0 || drained;
        if output_returned {
            if let Some(timestamp) = input_timestamp {
                output.timestamp = timestamp;
            }
            if let Err(e) = ports.pop_front(PortIndex::Output) {
                panic!("output queue lost its head buffer: {}", e);
            }
            return_buffer(ports, output_id, events);
        }
        if drained {
            info!("end of stream reached on output");
            *state = EngineState::EosOutput;
        }

        Ok(CycleOutcome::Progress {
            input_consumed: input_id.is_some(),
            output_returned,
        })
    }

    /// Forgets the end of stream seen on input after the input port was flushed.
    pub fn input_flushed(&mut self) {
        self.saw_input_eos = false;
        if self.state == EngineState::EosOutput {
            self.state = if self.session.is_some() {
                EngineState::Draining
            } else {
                EngineState::Idle
            };
        }
    }

    /// Closes the session if one is open. Safe to call repeatedly.
    pub fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            match self.encoder.stop_session(session) {
                Ok(()) => info!("encoder session closed"),
                Err(e) => error!("failed to close encoder session: {}", e),
            }
        }
    }

    /// Closes the session and returns to `EngineState::Idle`.
    pub fn reset(&mut self) {
        self.close_session();
        self.saw_input_eos = false;
        self.state = EngineState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::c_int;
    use std::ffi::c_void;
    use std::mem::size_of;
    use std::ptr;

    use super::*;
    use crate::backend::fake::FakeCall;
    use crate::backend::fake::FakeControl;
    use crate::backend::fake::FakeEncoder;
    use crate::backend::fake::FakeSettings;
    use crate::backend::fake::RecordedSource;
    use crate::metadata::ANativeWindowBuffer;
    use crate::metadata::AndroidNativeBase;
    use crate::metadata::MetadataBufferType;
    use crate::metadata::VideoNativeMetadata;

    struct Harness {
        engine: Engine<FakeEncoder>,
        control: FakeControl,
        ports: Ports,
        updates: UpdateQueue,
        config: SessionConfig,
        events: VecDeque<ComponentEvent>,
    }

    impl Harness {
        fn new(settings: FakeSettings, metadata_mode: bool) -> Self {
            let encoder = FakeEncoder::new(settings);
            let control = encoder.control();
            Self {
                engine: Engine::new(encoder),
                control,
                ports: Ports::new(BufferPool::new(4, 4)),
                updates: UpdateQueue::new(),
                config: SessionConfig {
                    width: 176,
                    height: 144,
                    bitrate: 192_000,
                    frame_rate: 30,
                    metadata_mode,
                },
                events: VecDeque::new(),
            }
        }

        fn queue_input(&mut self, payload: &[u8], flags: BufferFlags) -> BufferId {
            let id = self
                .ports
                .pool_mut()
                .allocate(PortIndex::Input, payload.len().max(1))
                .unwrap();
            let header = self.ports.pool_mut().get_mut(id).unwrap();
            assert!(header.set_payload(payload));
            header.flags = flags;
            header.timestamp = 1000 + id as i64;
            self.ports.push_input(id).unwrap();
            id
        }

        fn queue_output(&mut self, size: usize) -> BufferId {
            let id = self
                .ports
                .pool_mut()
                .allocate(PortIndex::Output, size)
                .unwrap();
            self.ports.push_output(id).unwrap();
            id
        }

        fn cycle(&mut self) -> VideoResult<CycleOutcome> {
            self.engine.drain_cycle(
                &mut self.ports,
                &self.updates,
                &self.config,
                &mut self.events,
            )
        }
    }

    fn window_buffer(handle: *const c_void) -> Box<ANativeWindowBuffer> {
        Box::new(ANativeWindowBuffer {
            common: AndroidNativeBase {
                magic: 0,
                version: 0,
                reserved: [ptr::null_mut(); 4],
                inc_ref: None,
                dec_ref: None,
            },
            width: 176,
            height: 144,
            stride: 176,
            format: 0,
            usage_deprecated: 0,
            layer_count: 1,
            reserved: [ptr::null_mut(); 1],
            handle,
            usage: 0,
            reserved_proc: [ptr::null_mut(); 8 - size_of::<u64>() / size_of::<*mut c_void>()],
        })
    }

    fn native_descriptor(buffer: &ANativeWindowBuffer) -> Vec<u8> {
        let mut bytes = vec![0u8; size_of::<VideoNativeMetadata>()];
        bytes[..4].copy_from_slice(&(MetadataBufferType::AnwBuffer as u32).to_ne_bytes());
        let offset = std::mem::offset_of!(VideoNativeMetadata, native_buffer);
        let address = buffer as *const ANativeWindowBuffer as usize;
        bytes[offset..offset + size_of::<usize>()].copy_from_slice(&address.to_ne_bytes());
        bytes
    }

    #[test]
    fn empty_output_queue_is_back_pressure() {
        let mut h = Harness::new(FakeSettings::default(), false);
        h.queue_input(&[1; 10], BufferFlags::empty());
        h.updates.request_key_frame();
        assert_eq!(h.cycle().unwrap(), CycleOutcome::NoOutputBuffer);
        assert!(h.control.calls().is_empty());
        assert!(h.events.is_empty());
        assert_eq!(h.engine.state(), EngineState::Idle);
        // The pending request survives for the next cycle.
        assert!(h.updates.drain_pending().key_frame_requested());
    }

    #[test]
    fn empty_input_queue_is_back_pressure() {
        let mut h = Harness::new(FakeSettings::default(), false);
        h.queue_output(128);
        assert_eq!(h.cycle().unwrap(), CycleOutcome::NoInputBuffer);
        assert!(h.control.calls().is_empty());
    }

    #[test]
    fn raw_frame_is_encoded_and_returned() {
        let mut h = Harness::new(
            FakeSettings {
                output_bytes: 20,
                ..Default::default()
            },
            false,
        );
        let input = h.queue_input(&[7; 100], BufferFlags::empty());
        let output = h.queue_output(4096);
        assert_eq!(
            h.cycle().unwrap(),
            CycleOutcome::Progress {
                input_consumed: true,
                output_returned: true
            }
        );
        assert_eq!(h.engine.state(), EngineState::Draining);
        assert_eq!(
            h.events.drain(..).collect::<Vec<_>>(),
            vec![
                ComponentEvent::InputBufferReturned { id: input },
                ComponentEvent::OutputBufferFilled {
                    id: output,
                    filled_len: 20,
                    flags: BufferFlags::empty(),
                    timestamp: 1000 + input as i64,
                },
            ]
        );
        assert!(h.control.calls().contains(&FakeCall::Encode {
            source: RecordedSource::Raw(100),
            capacity: 4096
        }));
        h.ports.assert_drained();
    }

    #[test]
    fn short_metadata_stays_queued() {
        let mut h = Harness::new(FakeSettings::default(), true);
        let input = h.queue_input(&[2, 0, 0, 0, 0, 0], BufferFlags::empty());
        h.queue_output(128);
        assert!(matches!(
            h.cycle().unwrap(),
            CycleOutcome::Skipped(InputError::Metadata(MetadataError::TooSmall { len: 6, .. }))
        ));
        assert_eq!(h.control.encode_count(), 0);
        assert_eq!(h.ports.front_input().unwrap(), input);
        assert!(h.events.is_empty());
    }

    #[test]
    fn out_of_bounds_payload_is_skipped() {
        let mut h = Harness::new(FakeSettings::default(), false);
        let input = h.queue_input(&[0; 8], BufferFlags::empty());
        h.ports.pool_mut().get_mut(input).unwrap().offset = 4;
        h.queue_output(128);
        assert!(matches!(
            h.cycle().unwrap(),
            CycleOutcome::Skipped(InputError::OutOfBounds { offset: 4, .. })
        ));
        assert_eq!(h.ports.front_input().unwrap(), input);
    }

    #[test]
    fn metadata_handle_reaches_backend() {
        let mut h = Harness::new(FakeSettings::default(), true);
        let mut native_handle: c_int = 0;
        let handle = &mut native_handle as *mut c_int as *const c_void;
        let buffer = window_buffer(handle);
        let input = h.queue_input(&native_descriptor(&buffer), BufferFlags::empty());
        h.queue_output(128);

        assert!(h.cycle().unwrap().made_progress());
        assert!(h.control.calls().contains(&FakeCall::Encode {
            source: RecordedSource::Graphic(handle as usize),
            capacity: 128
        }));
        assert_eq!(
            h.events.front(),
            Some(&ComponentEvent::InputBufferReturned { id: input })
        );
    }

    #[test]
    fn null_window_buffer_handle_is_skipped() {
        let mut h = Harness::new(FakeSettings::default(), true);
        let buffer = window_buffer(ptr::null());
        h.queue_input(&native_descriptor(&buffer), BufferFlags::empty());
        h.queue_output(128);
        assert!(matches!(
            h.cycle().unwrap(),
            CycleOutcome::Skipped(InputError::Metadata(MetadataError::ResolutionFailed(_)))
        ));
        assert_eq!(h.control.encode_count(), 0);
    }

    #[test]
    fn encode_failure_drops_frame() {
        let mut h = Harness::new(FakeSettings::default(), false);
        let input = h.queue_input(&[1; 10], BufferFlags::empty());
        let output = h.queue_output(128);
        h.control.set_fail_encode(true);
        assert_eq!(
            h.cycle().unwrap(),
            CycleOutcome::Progress {
                input_consumed: true,
                output_returned: false
            }
        );
        assert_eq!(
            h.events.drain(..).collect::<Vec<_>>(),
            vec![ComponentEvent::InputBufferReturned { id: input }]
        );
        assert_eq!(h.ports.front_output().unwrap(), output);
    }

    #[test]
    fn zero_byte_output_stays_queued() {
        let mut h = Harness::new(
            FakeSettings {
                silent_frames: 1,
                ..Default::default()
            },
            false,
        );
        h.queue_input(&[1; 10], BufferFlags::empty());
        h.queue_input(&[1; 10], BufferFlags::empty());
        let output = h.queue_output(128);
        h.cycle().unwrap();
        assert_eq!(h.ports.front_output().unwrap(), output);
        h.cycle().unwrap();
        assert!(h.ports.queue(PortIndex::Output).is_empty());
        assert!(matches!(
            h.events.back(),
            Some(ComponentEvent::OutputBufferFilled { id, .. }) if *id == output
        ));
    }

    #[test]
    fn unavailable_backend_halts_engine() {
        let mut h = Harness::new(FakeSettings::default(), false);
        h.control.set_unavailable(true);
        h.queue_input(&[1; 10], BufferFlags::empty());
        h.queue_output(128);
        assert!(h.cycle().is_err());
        assert_eq!(h.engine.state(), EngineState::Error);
        assert_eq!(h.cycle().unwrap(), CycleOutcome::Halted);

        h.control.set_unavailable(false);
        h.engine.reset();
        assert_eq!(h.engine.state(), EngineState::Idle);
        assert!(h.cycle().unwrap().made_progress());
        assert!(h.engine.has_session());
        h.engine.reset();
        assert_eq!(h.control.open_sessions(), 0);
    }

    #[test]
    fn eos_is_cleared_unless_backend_drained() {
        let mut h = Harness::new(FakeSettings::default(), false);
        h.queue_input(&[1; 10], BufferFlags::EOS);
        let output = h.queue_output(128);
        h.cycle().unwrap();
        assert!(h.engine.saw_input_eos());
        assert_eq!(
            h.events.back(),
            Some(&ComponentEvent::OutputBufferFilled {
                id: output,
                filled_len: 64,
                flags: BufferFlags::empty(),
                timestamp: 1000,
            })
        );
        assert_eq!(h.engine.state(), EngineState::Draining);

        // Later cycles run without input and do not touch the input queue.
        let next = h.queue_input(&[1; 10], BufferFlags::empty());
        h.queue_output(128);
        assert_eq!(
            h.cycle().unwrap(),
            CycleOutcome::Progress {
                input_consumed: false,
                output_returned: false
            }
        );
        assert_eq!(h.ports.front_input().unwrap(), next);
    }

    #[test]
    fn drained_backend_stamps_eos() {
        let mut h = Harness::new(
            FakeSettings {
                drain_on_eos: true,
                ..Default::default()
            },
            false,
        );
        let input = h.queue_input(&[], BufferFlags::EOS);
        let output = h.queue_output(128);
        h.cycle().unwrap();
        assert_eq!(h.control.encode_count(), 0);
        assert_eq!(
            h.events.drain(..).collect::<Vec<_>>(),
            vec![
                ComponentEvent::InputBufferReturned { id: input },
                ComponentEvent::OutputBufferFilled {
                    id: output,
                    filled_len: 0,
                    flags: BufferFlags::EOS,
                    timestamp: 1000 + input as i64,
                },
            ]
        );
        assert_eq!(h.engine.state(), EngineState::EosOutput);
        h.queue_output(128);
        assert_eq!(h.cycle().unwrap(), CycleOutcome::Halted);

        h.engine.input_flushed();
        assert_eq!(h.engine.state(), EngineState::Draining);
        assert!(!h.engine.saw_input_eos());
    }

    #[test]
    fn raw_inputs_wait_for_backend_release() {
        let mut h = Harness::new(
            FakeSettings {
                release_delay: 1,
                ..Default::default()
            },
            false,
        );
        let first = h.queue_input(&[1; 10], BufferFlags::empty());
        let second = h.queue_input(&[1; 10], BufferFlags::empty());
        h.queue_output(128);
        h.queue_output(128);
        h.cycle().unwrap();
        assert!(!h
            .events
            .contains(&ComponentEvent::InputBufferReturned { id: first }));
        assert_eq!(h.ports.held_inputs(), 1);
        h.cycle().unwrap();
        assert!(h
            .events
            .contains(&ComponentEvent::InputBufferReturned { id: first }));
        assert!(!h
            .events
            .contains(&ComponentEvent::InputBufferReturned { id: second }));
        assert_eq!(h.ports.flush(PortIndex::Input), vec![second]);
    }

    #[test]
    fn drained_backend_returns_held_inputs_before_eos() {
        let mut h = Harness::new(
            FakeSettings {
                release_delay: 1,
                drain_on_eos: true,
                ..Default::default()
            },
            false,
        );
        let frame = h.queue_input(&[1; 10], BufferFlags::empty());
        let eos = h.queue_input(&[], BufferFlags::EOS);
        let first_output = h.queue_output(128);
        let last_output = h.queue_output(128);

        h.cycle().unwrap();
        assert_eq!(h.ports.held_inputs(), 1);
        h.cycle().unwrap();

        assert_eq!(h.engine.state(), EngineState::EosOutput);
        assert_eq!(h.ports.held_inputs(), 0);
        assert_eq!(
            h.events.drain(..).collect::<Vec<_>>(),
            vec![
                ComponentEvent::OutputBufferFilled {
                    id: first_output,
                    filled_len: 64,
                    flags: BufferFlags::empty(),
                    timestamp: 1000 + frame as i64,
                },
                ComponentEvent::InputBufferReturned { id: frame },
                ComponentEvent::InputBufferReturned { id: eos },
                ComponentEvent::OutputBufferFilled {
                    id: last_output,
                    filled_len: 0,
                    flags: BufferFlags::EOS,
                    timestamp: 1000 + eos as i64,
                },
            ]
        );
        assert!(h.ports.is_drained());
    }

    #[test]
    fn unsupported_bitrate_change_is_not_fatal() {
        let mut h = Harness::new(
            FakeSettings {
                supports_bitrate: false,
                ..Default::default()
            },
            false,
        );
        h.updates.set_bitrate(5);
        let input = h.queue_input(&[1; 10], BufferFlags::empty());
        let output = h.queue_output(256);
        assert!(h.cycle().unwrap().made_progress());

        assert_eq!(h.engine.state(), EngineState::Draining);
        let calls = h.control.calls();
        assert_eq!(calls[1], FakeCall::SetBitrate(5));
        assert_eq!(
            calls[2],
            FakeCall::Encode {
                source: RecordedSource::Raw(10),
                capacity: 256,
            }
        );
        assert!(h
            .events
            .contains(&ComponentEvent::InputBufferReturned { id: input }));
        assert!(h.events.iter().any(|event| matches!(
            event,
            ComponentEvent::OutputBufferFilled { id, filled_len: 64, .. } if *id == output
        )));
        assert!(h.updates.drain_pending().is_empty());
    }

    #[test]
    fn updates_apply_before_encode() {
        let mut h = Harness::new(FakeSettings::default(), false);
        h.updates.set_bitrate(1000);
        h.updates.set_bitrate(2000);
        h.updates.request_key_frame();
        h.queue_input(&[1; 10], BufferFlags::empty());
        h.queue_output(128);
        h.cycle().unwrap();
        let calls = h.control.calls();
        assert_eq!(
            calls[1..3],
            [FakeCall::SetBitrate(2000), FakeCall::RequestKeyFrame]
        );
        assert!(matches!(calls[3], FakeCall::Encode { .. }));
    }
}
