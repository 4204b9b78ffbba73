// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Drives the H.264 encoder component from the command line.

mod config;

use std::collections::VecDeque;
use std::ffi::CString;
use std::fs::File;
use std::io;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Read;
use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Context;
use argh::FromArgs;
use log::debug;
use log::info;
use log::warn;
use omx_encoder::backend::fake::FakeEncoder;
use omx_encoder::backend::fake::FakeSettings;
use omx_encoder::backend::media_codec::MediaCodecEncoder;
use omx_encoder::backend::Encoder;
use omx_encoder::backend::SessionConfig;
use omx_encoder::AvcEncoder;
use omx_encoder::BufferFlags;
use omx_encoder::BufferId;
use omx_encoder::ComponentEvent;
use omx_encoder::PortIndex;

use crate::config::EncoderConfig;

// Events are delivered synchronously from the calls that produce them, so a quiet channel means
// the component has nothing left to hand back.
const EVENT_TIMEOUT: Duration = Duration::from_millis(500);

/// Hardware H.264 encoder front-end.
#[derive(FromArgs)]
struct Args {
    /// configuration file in JSON, individual options override its values
    #[argh(option, arg_name = "PATH")]
    cfg: Option<PathBuf>,

    /// log level filter, overridden by RUST_LOG (default: info)
    #[argh(option, arg_name = "LEVEL", default = "String::from(\"info\")")]
    log_level: String,

    /// codec library to load
    #[argh(option, arg_name = "PATH")]
    library: Option<PathBuf>,

    /// device node codec contexts are bound to
    #[argh(option, arg_name = "PATH")]
    node: Option<String>,

    /// use the built-in fake encoder instead of the codec library
    #[argh(switch)]
    fake_backend: bool,

    /// frame width in pixels
    #[argh(option, arg_name = "PIXELS")]
    width: Option<u32>,

    /// frame height in pixels
    #[argh(option, arg_name = "PIXELS")]
    height: Option<u32>,

    /// target bitrate in bits per second
    #[argh(option, arg_name = "BPS")]
    bitrate: Option<u32>,

    /// frames per second
    #[argh(option, arg_name = "FPS")]
    frame_rate: Option<u32>,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Probe(ProbeArgs),
    Encode(EncodeArgs),
}

/// Opens and closes an encoder session to check the backend is usable.
#[derive(FromArgs)]
#[argh(subcommand, name = "probe")]
struct ProbeArgs {}

/// Encodes a raw I420 file into an H.264 elementary stream.
#[derive(FromArgs)]
#[argh(subcommand, name = "encode")]
struct EncodeArgs {
    /// raw I420 frames, back to back
    #[argh(option, arg_name = "FILENAME")]
    input: PathBuf,

    /// output file for the Annex B stream
    #[argh(option, arg_name = "FILENAME")]
    output: PathBuf,

    /// stop after this many frames
    #[argh(option, arg_name = "COUNT")]
    frames: Option<u64>,

    /// request a key frame every COUNT frames
    #[argh(option, arg_name = "COUNT")]
    keyframe_interval: Option<u64>,
}

impl Args {
    fn encoder_config(&self) -> anyhow::Result<EncoderConfig> {
        let mut config = match &self.cfg {
            Some(path) => EncoderConfig::load(path)?,
            None => EncoderConfig::default(),
        };
        if let Some(library) = &self.library {
            config.library = library.clone();
        }
        if let Some(node) = &self.node {
            config.node = Some(node.clone());
        }
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(bitrate) = self.bitrate {
            config.bitrate = bitrate;
        }
        if let Some(frame_rate) = self.frame_rate {
            config.frame_rate = frame_rate;
        }
        config.validate().context("invalid encoder configuration")?;
        Ok(config)
    }
}

fn media_codec_encoder(config: &EncoderConfig) -> anyhow::Result<MediaCodecEncoder> {
    let encoder = MediaCodecEncoder::new(&config.library);
    Ok(match &config.node {
        Some(node) => encoder.with_node(
            CString::new(node.as_str()).context("device node contains a NUL byte")?,
        ),
        None => encoder,
    })
}

fn fake_encoder() -> FakeEncoder {
    FakeEncoder::new(FakeSettings {
        drain_on_eos: true,
        ..Default::default()
    })
}

fn probe<E: Encoder>(mut encoder: E, config: &EncoderConfig) -> anyhow::Result<()> {
    let session_config = SessionConfig {
        width: config.width,
        height: config.height,
        bitrate: config.bitrate,
        frame_rate: config.frame_rate,
        metadata_mode: false,
    };
    let session = encoder
        .start_session(&session_config)
        .context("failed to open an encoder session")?;
    encoder
        .stop_session(session)
        .context("failed to close the encoder session")?;
    println!("encoder backend is available");
    Ok(())
}

/// Fills `frame` from `reader`. Returns `false` once no complete frame is left.
fn read_frame<R: Read>(reader: &mut R, frame: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < frame.len() {
        match reader.read(&mut frame[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    if filled > 0 && filled < frame.len() {
        warn!("ignoring trailing partial frame of {} bytes", filled);
    }
    Ok(filled == frame.len())
}

fn encode<E: Encoder>(
    encoder: E,
    config: &EncoderConfig,
    args: &EncodeArgs,
) -> anyhow::Result<()> {
    let mut input = BufReader::new(
        File::open(&args.input)
            .with_context(|| format!("failed to open {}", args.input.display()))?,
    );
    let mut output = BufWriter::new(
        File::create(&args.output)
            .with_context(|| format!("failed to create {}", args.output.display()))?,
    );

    let (sender, receiver) = mpsc::channel();
    let component = AvcEncoder::new(
        "avcenc",
        encoder,
        &config.to_options(),
        move |event: ComponentEvent| {
            // The receiver only goes away once the component is shut down.
            let _ = sender.send(event);
        },
    );

    let input_port = component.port_definition(PortIndex::Input);
    let output_port = component.port_definition(PortIndex::Output);
    let frame_size = config.frame_size();
    if input_port.buffer_size < frame_size {
        bail!(
            "input buffers of {} bytes cannot hold {} byte frames",
            input_port.buffer_size,
            frame_size
        );
    }

    let input_ids = (0..input_port.buffer_count)
        .map(|_| component.allocate_buffer(PortIndex::Input, input_port.buffer_size))
        .collect::<Result<Vec<BufferId>, _>>()
        .context("failed to allocate input buffers")?;
    let output_ids = (0..output_port.buffer_count)
        .map(|_| component.allocate_buffer(PortIndex::Output, output_port.buffer_size))
        .collect::<Result<Vec<BufferId>, _>>()
        .context("failed to allocate output buffers")?;
    info!(
        "{} input buffers of {} bytes, {} output buffers of {} bytes",
        input_ids.len(),
        input_port.buffer_size,
        output_ids.len(),
        output_port.buffer_size
    );

    for &id in &output_ids {
        component.push_output_buffer(id);
    }
    let result = pump(
        &component,
        config,
        args,
        &receiver,
        input_ids.iter().copied().collect(),
        &mut input,
        &mut output,
    );

    component.reset();
    for id in input_ids.into_iter().chain(output_ids) {
        component.free_buffer(id)?;
    }
    component.shutdown();
    result
}

/// Feeds frames and collects encoded output until the component signals end of stream.
fn pump<E: Encoder, R: Read, W: Write>(
    component: &AvcEncoder<E>,
    config: &EncoderConfig,
    args: &EncodeArgs,
    receiver: &mpsc::Receiver<ComponentEvent>,
    mut free_inputs: VecDeque<BufferId>,
    input: &mut R,
    output: &mut W,
) -> anyhow::Result<()> {
    let mut frame = vec![0u8; config.frame_size()];
    let mut frames_read: u64 = 0;
    let mut bytes_written: u64 = 0;
    let mut eos_sent = false;
    let mut eos_received = false;

    while !eos_received {
        while !eos_sent {
            let Some(id) = free_inputs.pop_front() else {
                break;
            };
            let more = match args.frames {
                Some(limit) if frames_read >= limit => false,
                _ => read_frame(input, &mut frame).context("failed to read input")?,
            };
            if more {
                if let Some(interval) = args.keyframe_interval {
                    if interval > 0 && frames_read > 0 && frames_read % interval == 0 {
                        component.request_key_frame();
                    }
                }
                let timestamp = i64::try_from(frames_read * 1_000_000 / config.frame_rate as u64)
                    .context("timestamp overflow")?;
                let fitted = component.with_buffer(id, |header| {
                    header.timestamp = timestamp;
                    header.flags = BufferFlags::empty();
                    header.set_payload(&frame)
                })?;
                if !fitted {
                    bail!("frame does not fit input buffer {}", id);
                }
                frames_read += 1;
            } else {
                component.with_buffer(id, |header| {
                    header.set_payload(&[]);
                    header.timestamp = 0;
                    header.flags = BufferFlags::EOS;
                })?;
                info!("end of input after {} frames", frames_read);
                eos_sent = true;
            }
            component.push_input_buffer(id);
        }

        let event = match receiver.recv_timeout(EVENT_TIMEOUT) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) if eos_sent => {
                warn!("encoder did not signal end of stream");
                break;
            }
            Err(RecvTimeoutError::Timeout) => bail!("encoder stopped returning buffers"),
            Err(RecvTimeoutError::Disconnected) => bail!("encoder event channel closed"),
        };
        match event {
            ComponentEvent::InputBufferReturned { id } => free_inputs.push_back(id),
            ComponentEvent::OutputBufferFilled {
                id,
                filled_len,
                flags,
                timestamp,
            } => {
                debug!("output {}: {} bytes at {}", id, filled_len, timestamp);
                component
                    .with_buffer(id, |header| match header.payload() {
                        Some(payload) => output.write_all(payload),
                        None => Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "payload out of buffer bounds",
                        )),
                    })?
                    .context("failed to write output")?;
                bytes_written += u64::from(filled_len);
                if flags.contains(BufferFlags::EOS) {
                    eos_received = true;
                } else {
                    component.push_output_buffer(id);
                }
            }
            ComponentEvent::FatalError { reason } => {
                return Err(anyhow!(reason)).context("encoder failed");
            }
        }
    }

    output.flush().context("failed to flush output")?;
    info!(
        "encoded {} frames into {} bytes at {}",
        frames_read,
        bytes_written,
        args.output.display()
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();

    env_logger::Builder::new()
        .parse_filters(&args.log_level)
        .parse_default_env()
        .init();

    let config = args.encoder_config()?;
    debug!("configuration: {:?}", config);

    match &args.command {
        Command::Probe(_) if args.fake_backend => probe(fake_encoder(), &config),
        Command::Probe(_) => probe(media_codec_encoder(&config)?, &config),
        Command::Encode(encode_args) if args.fake_backend => {
            encode(fake_encoder(), &config, encode_args)
        }
        Command::Encode(encode_args) => {
            encode(media_codec_encoder(&config)?, &config, encode_args)
        }
    }
}
