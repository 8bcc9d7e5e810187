//! IPC protocol between host and helper processes
//!
//! Every message is a TLV packet: `[u16 opcode][u32 length][payload]`, native
//! endian. The stream is process-local and never crosses machines.

use crate::args::{self, Argument, ArgumentList};
use crate::error::{BridgeError, DecodeStage, Result};
use std::io::{ErrorKind, Read};

/// Opcode (2 bytes) + payload length (4 bytes).
pub const HEADER_SIZE: usize = 6;

/// Reserved script message channel carrying `console.*` output.
pub const CONSOLE_CHANNEL: &str = "console_log";

/// Script message channel behind `window.webviewHost.postMessage`.
pub const HOST_CHANNEL: &str = "host";

// =============================================================================
// Opcodes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HostToHelper,
    HelperToHost,
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // host -> helper
    Navigate = 0,
    Reparent = 1,
    Resize = 2,
    RunScript = 3,
    InjectScript = 4,
    AddScriptMessageHandler = 5,
    SetBackgroundColor = 6,
    SetPosition = 7,
    KeyEvent = 8,
    // helper -> host
    ScriptMessageReceived = 9,
    LoadFinished = 10,
}

impl Opcode {
    pub fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            0 => Opcode::Navigate,
            1 => Opcode::Reparent,
            2 => Opcode::Resize,
            3 => Opcode::RunScript,
            4 => Opcode::InjectScript,
            5 => Opcode::AddScriptMessageHandler,
            6 => Opcode::SetBackgroundColor,
            7 => Opcode::SetPosition,
            8 => Opcode::KeyEvent,
            9 => Opcode::ScriptMessageReceived,
            10 => Opcode::LoadFinished,
            _ => return None,
        })
    }

    pub fn direction(self) -> Direction {
        match self {
            Opcode::ScriptMessageReceived | Opcode::LoadFinished => Direction::HelperToHost,
            _ => Direction::HostToHelper,
        }
    }
}

// =============================================================================
// Packet framing
// =============================================================================

/// One framed message. The opcode stays raw so that values from a newer
/// peer can be carried and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub opcode: u16,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self {
            opcode: opcode as u16,
            payload,
        }
    }

    pub fn empty(opcode: Opcode) -> Self {
        Self::new(opcode, Vec::new())
    }

    /// `None` for opcodes this build does not know.
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_u16(self.opcode)
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Header plus payload in a single buffer.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_frame(self.opcode, &self.payload)
    }

    /// Read exactly one packet.
    ///
    /// Returns `Ok(None)` on a clean end of stream at a packet boundary.
    /// End of stream inside a header or payload is `TruncatedStream`. Never
    /// consumes bytes beyond the declared payload length.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Option<Self>> {
        let mut header = [0u8; HEADER_SIZE];
        let got = read_full(reader, &mut header)?;
        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_SIZE {
            return Err(BridgeError::TruncatedStream {
                stage: DecodeStage::Header,
                expected: HEADER_SIZE,
                got,
            });
        }

        let opcode = u16::from_ne_bytes([header[0], header[1]]);
        let length = u32::from_ne_bytes([header[2], header[3], header[4], header[5]]) as usize;

        // Grow with the data instead of trusting the length field for the allocation.
        let mut payload = Vec::with_capacity(length.min(64 * 1024));
        reader.take(length as u64).read_to_end(&mut payload)?;
        if payload.len() < length {
            return Err(BridgeError::TruncatedStream {
                stage: DecodeStage::Payload,
                expected: length,
                got: payload.len(),
            });
        }

        Ok(Some(Self { opcode, payload }))
    }
}

/// `[u16 opcode][u32 length][payload]` in native byte order.
pub fn encode_frame(opcode: u16, payload: &[u8]) -> Result<Vec<u8>> {
    let length = u32::try_from(payload.len()).map_err(|_| {
        BridgeError::ProtocolError(format!(
            "payload of {} bytes exceeds the u32 length field",
            payload.len()
        ))
    })?;
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&opcode.to_ne_bytes());
    frame.extend_from_slice(&length.to_ne_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Fill `buf` as far as the stream allows; returns bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

// =============================================================================
// Typed messages
// =============================================================================

/// Key press or release forwarded from the host window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyEvent {
    pub pressed: bool,
    pub code: u32,
    pub hw_code: u32,
    pub modifiers: u32,
}

/// Messages from host to helper
#[derive(Debug, Clone, PartialEq)]
pub enum HostMessage {
    Navigate { url: String },
    Reparent { window: u64 },
    Resize { width: u32, height: u32 },
    RunScript { source: String },
    InjectScript { source: String },
    AddScriptMessageHandler { name: String },
    SetBackgroundColor { rgba: u32 },
    SetPosition { x: i32, y: i32 },
    KeyEvent(KeyEvent),
}

/// Messages from helper to host
#[derive(Debug, Clone, PartialEq)]
pub enum HelperMessage {
    ScriptMessageReceived(ScriptMessage),
    LoadFinished,
}

/// A page script posted `args` to the channel `name`.
///
/// Wire form: `name NUL Argument*`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptMessage {
    pub name: String,
    pub args: ArgumentList,
}

impl ScriptMessage {
    pub fn new(name: impl Into<String>, args: impl IntoIterator<Item = Argument>) -> Self {
        Self {
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.name.len() + 1 + self.args.len() * 9);
        args::put_cstr(&self.name, &mut out)?;
        for arg in &self.args {
            arg.encode(&mut out)?;
        }
        Ok(out)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut cursor = 0;
        let name = args::take_cstr(payload, &mut cursor)?.to_owned();
        let mut args = ArgumentList::new();
        while cursor < payload.len() {
            args.push(Argument::decode(payload, &mut cursor)?);
        }
        Ok(Self { name, args })
    }
}

impl HostMessage {
    pub fn opcode(&self) -> Opcode {
        match self {
            HostMessage::Navigate { .. } => Opcode::Navigate,
            HostMessage::Reparent { .. } => Opcode::Reparent,
            HostMessage::Resize { .. } => Opcode::Resize,
            HostMessage::RunScript { .. } => Opcode::RunScript,
            HostMessage::InjectScript { .. } => Opcode::InjectScript,
            HostMessage::AddScriptMessageHandler { .. } => Opcode::AddScriptMessageHandler,
            HostMessage::SetBackgroundColor { .. } => Opcode::SetBackgroundColor,
            HostMessage::SetPosition { .. } => Opcode::SetPosition,
            HostMessage::KeyEvent(_) => Opcode::KeyEvent,
        }
    }

    pub fn to_packet(&self) -> Result<Packet> {
        let mut payload = Vec::new();
        match self {
            HostMessage::Navigate { url } => args::put_cstr(url, &mut payload)?,
            HostMessage::RunScript { source } | HostMessage::InjectScript { source } => {
                args::put_cstr(source, &mut payload)?
            }
            HostMessage::AddScriptMessageHandler { name } => args::put_cstr(name, &mut payload)?,
            HostMessage::Reparent { window } => payload.extend_from_slice(&window.to_ne_bytes()),
            HostMessage::Resize { width, height } => {
                payload.extend_from_slice(&width.to_ne_bytes());
                payload.extend_from_slice(&height.to_ne_bytes());
            }
            HostMessage::SetBackgroundColor { rgba } => {
                payload.extend_from_slice(&rgba.to_ne_bytes())
            }
            HostMessage::SetPosition { x, y } => {
                payload.extend_from_slice(&x.to_ne_bytes());
                payload.extend_from_slice(&y.to_ne_bytes());
            }
            HostMessage::KeyEvent(key) => {
                payload.push(key.pressed as u8);
                payload.extend_from_slice(&key.code.to_ne_bytes());
                payload.extend_from_slice(&key.hw_code.to_ne_bytes());
                payload.extend_from_slice(&key.modifiers.to_ne_bytes());
            }
        }
        Ok(Packet::new(self.opcode(), payload))
    }

    pub fn from_packet(packet: &Packet) -> Result<Self> {
        let opcode = packet
            .opcode()
            .ok_or(BridgeError::UnknownOpcode(packet.opcode))?;
        let p = &packet.payload;

        Ok(match opcode {
            Opcode::Navigate => HostMessage::Navigate {
                url: single_cstr(opcode, p)?,
            },
            Opcode::RunScript => HostMessage::RunScript {
                source: single_cstr(opcode, p)?,
            },
            Opcode::InjectScript => HostMessage::InjectScript {
                source: single_cstr(opcode, p)?,
            },
            Opcode::AddScriptMessageHandler => HostMessage::AddScriptMessageHandler {
                name: single_cstr(opcode, p)?,
            },
            Opcode::Reparent => HostMessage::Reparent {
                window: u64::from_ne_bytes(fixed(opcode, p)?),
            },
            Opcode::Resize => {
                let b: [u8; 8] = fixed(opcode, p)?;
                HostMessage::Resize {
                    width: u32::from_ne_bytes([b[0], b[1], b[2], b[3]]),
                    height: u32::from_ne_bytes([b[4], b[5], b[6], b[7]]),
                }
            }
            Opcode::SetBackgroundColor => HostMessage::SetBackgroundColor {
                rgba: u32::from_ne_bytes(fixed(opcode, p)?),
            },
            Opcode::SetPosition => {
                let b: [u8; 8] = fixed(opcode, p)?;
                HostMessage::SetPosition {
                    x: i32::from_ne_bytes([b[0], b[1], b[2], b[3]]),
                    y: i32::from_ne_bytes([b[4], b[5], b[6], b[7]]),
                }
            }
            Opcode::KeyEvent => {
                let b: [u8; 13] = fixed(opcode, p)?;
                HostMessage::KeyEvent(KeyEvent {
                    pressed: b[0] != 0,
                    code: u32::from_ne_bytes([b[1], b[2], b[3], b[4]]),
                    hw_code: u32::from_ne_bytes([b[5], b[6], b[7], b[8]]),
                    modifiers: u32::from_ne_bytes([b[9], b[10], b[11], b[12]]),
                })
            }
            Opcode::ScriptMessageReceived | Opcode::LoadFinished => {
                return Err(wrong_direction(opcode))
            }
        })
    }
}

impl HelperMessage {
    pub fn opcode(&self) -> Opcode {
        match self {
            HelperMessage::ScriptMessageReceived(_) => Opcode::ScriptMessageReceived,
            HelperMessage::LoadFinished => Opcode::LoadFinished,
        }
    }

    pub fn to_packet(&self) -> Result<Packet> {
        match self {
            HelperMessage::ScriptMessageReceived(msg) => {
                Ok(Packet::new(Opcode::ScriptMessageReceived, msg.encode()?))
            }
            HelperMessage::LoadFinished => Ok(Packet::empty(Opcode::LoadFinished)),
        }
    }

    pub fn from_packet(packet: &Packet) -> Result<Self> {
        let opcode = packet
            .opcode()
            .ok_or(BridgeError::UnknownOpcode(packet.opcode))?;
        match opcode {
            Opcode::ScriptMessageReceived => Ok(HelperMessage::ScriptMessageReceived(
                ScriptMessage::decode(&packet.payload)?,
            )),
            Opcode::LoadFinished => Ok(HelperMessage::LoadFinished),
            other => Err(wrong_direction(other)),
        }
    }
}

fn wrong_direction(opcode: Opcode) -> BridgeError {
    BridgeError::ProtocolError(format!(
        "{:?} is not valid in this direction ({:?})",
        opcode,
        opcode.direction()
    ))
}

fn fixed<const N: usize>(opcode: Opcode, payload: &[u8]) -> Result<[u8; N]> {
    payload.try_into().map_err(|_| {
        BridgeError::ProtocolError(format!(
            "{:?} payload must be {} bytes, got {}",
            opcode,
            N,
            payload.len()
        ))
    })
}

fn single_cstr(opcode: Opcode, payload: &[u8]) -> Result<String> {
    let mut cursor = 0;
    let s = args::take_cstr(payload, &mut cursor)?.to_owned();
    if cursor != payload.len() {
        return Err(BridgeError::ProtocolError(format!(
            "{:?} payload has {} trailing bytes",
            opcode,
            payload.len() - cursor
        )));
    }
    Ok(s)
}
