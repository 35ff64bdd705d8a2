use crate::{Error, Result};

pub mod frame;
pub mod ie;
pub use frame::Frame;
pub use ie::InformationElement;
pub use ie::IE_MAX_DATALEN;

#[cfg(test)]
mod tests;

/// The default IAX2 port
pub const DEFAULT_IAX2_PORT: u16 = 4569;

/// The ways of sending an IAX2 frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameShell {
    /// Full frame
    Full,
    /// Mini frame
    Mini,
    /// Meta frame
    Meta,
}

/// Direction of a frame. Frames are only encodable when outbound; parsing
/// always produces an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Types of meta frames. Only video is defined by the protocol today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaType {
    Video,
}

/// Types for IAX2 full frames
///
/// These values are defined by the IAX2 specification and MUST not be
/// changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Undefined or unknown
    Undefined = 0x00,
    /// Mark the end of a DTMF digit. Subclass value: the digit, in ASCII
    DtmfEnd = 0x01,
    /// A voice frame. Normally, voice is sent in mini frames
    Voice = 0x02,
    /// A video frame. Normally, video is sent in meta frames
    Video = 0x03,
    /// A control frame
    Control = 0x04,
    /// A null frame
    Null = 0x05,
    /// An IAX2 signalling frame. Subclass value: [`Iax2Subclass`]
    Iax2 = 0x06,
    /// A text frame
    Text = 0x07,
    /// An image frame
    Image = 0x08,
    /// An HTML frame
    Html = 0x09,
    /// A CNG frame (Comfort Noise Generation)
    Cng = 0x0A,
    /// A modem over IP data frame
    Modem = 0x0B,
    /// Mark the beginning of a DTMF digit. Subclass value: the digit, in ASCII
    DtmfBegin = 0x0C,
}

impl TryFrom<u8> for FrameType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0x00 => FrameType::Undefined,
            0x01 => FrameType::DtmfEnd,
            0x02 => FrameType::Voice,
            0x03 => FrameType::Video,
            0x04 => FrameType::Control,
            0x05 => FrameType::Null,
            0x06 => FrameType::Iax2,
            0x07 => FrameType::Text,
            0x08 => FrameType::Image,
            0x09 => FrameType::Html,
            0x0A => FrameType::Cng,
            0x0B => FrameType::Modem,
            0x0C => FrameType::DtmfBegin,
            _ => return Err(Error::FrameError(format!("unknown frame type {:#04x}", value))),
        })
    }
}

/// Subclass for frames of type IAX2
///
/// These values are defined by the IAX2 specification and MUST not be
/// changed. The transfer, provisioning and firmware values are enumerated
/// for wire fidelity but no dialog is implemented for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Iax2Subclass {
    /// Initiate a new call
    New = 0x01,
    /// Ping request
    Ping = 0x02,
    /// Ping or poke reply
    Pong = 0x03,
    /// Explicit acknowledgment
    Ack = 0x04,
    /// Initiate call teardown
    Hangup = 0x05,
    /// Reject a call
    Reject = 0x06,
    /// Accept a call
    Accept = 0x07,
    /// Authentication request
    AuthReq = 0x08,
    /// Authentication reply
    AuthRep = 0x09,
    /// Invalid message response
    Inval = 0x0A,
    /// Lag request
    LagRq = 0x0B,
    /// Lag reply
    LagRp = 0x0C,
    /// Registration request
    RegReq = 0x0D,
    /// Registration authentication request
    RegAuth = 0x0E,
    /// Registration acknowledgment
    RegAck = 0x0F,
    /// Registration reject
    RegRej = 0x10,
    /// Registration release
    RegRel = 0x11,
    /// Voice/Video retransmit request
    Vnak = 0x12,
    /// Dialplan request
    DpReq = 0x13,
    /// Dialplan reply
    DpRep = 0x14,
    /// Dial
    Dial = 0x15,
    /// Transfer request
    TxReq = 0x16,
    /// Transfer connect
    TxCnt = 0x17,
    /// Transfer accept
    TxAcc = 0x18,
    /// Transfer ready
    TxReady = 0x19,
    /// Transfer release
    TxRel = 0x1A,
    /// Transfer reject
    TxRej = 0x1B,
    /// Halt audio/video media transmission
    Quelch = 0x1C,
    /// Resume audio/video media transmission
    Unquelch = 0x1D,
    /// Poke request
    Poke = 0x1E,
    // 0x1F is noted as reserved in the RFC draft
    /// Message waiting indication
    Mwi = 0x20,
    /// Unsupported message
    Unsupport = 0x21,
    /// Remote transfer request
    Transfer = 0x22,
    /// Provision an IAX2 device
    Provision = 0x23,
    /// Download firmware request
    FwDownl = 0x24,
    /// Transmit firmware data
    FwData = 0x25,
}

impl TryFrom<u8> for Iax2Subclass {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0x01 => Iax2Subclass::New,
            0x02 => Iax2Subclass::Ping,
            0x03 => Iax2Subclass::Pong,
            0x04 => Iax2Subclass::Ack,
            0x05 => Iax2Subclass::Hangup,
            0x06 => Iax2Subclass::Reject,
            0x07 => Iax2Subclass::Accept,
            0x08 => Iax2Subclass::AuthReq,
            0x09 => Iax2Subclass::AuthRep,
            0x0A => Iax2Subclass::Inval,
            0x0B => Iax2Subclass::LagRq,
            0x0C => Iax2Subclass::LagRp,
            0x0D => Iax2Subclass::RegReq,
            0x0E => Iax2Subclass::RegAuth,
            0x0F => Iax2Subclass::RegAck,
            0x10 => Iax2Subclass::RegRej,
            0x11 => Iax2Subclass::RegRel,
            0x12 => Iax2Subclass::Vnak,
            0x13 => Iax2Subclass::DpReq,
            0x14 => Iax2Subclass::DpRep,
            0x15 => Iax2Subclass::Dial,
            0x16 => Iax2Subclass::TxReq,
            0x17 => Iax2Subclass::TxCnt,
            0x18 => Iax2Subclass::TxAcc,
            0x19 => Iax2Subclass::TxReady,
            0x1A => Iax2Subclass::TxRel,
            0x1B => Iax2Subclass::TxRej,
            0x1C => Iax2Subclass::Quelch,
            0x1D => Iax2Subclass::Unquelch,
            0x1E => Iax2Subclass::Poke,
            0x20 => Iax2Subclass::Mwi,
            0x21 => Iax2Subclass::Unsupport,
            0x22 => Iax2Subclass::Transfer,
            0x23 => Iax2Subclass::Provision,
            0x24 => Iax2Subclass::FwDownl,
            0x25 => Iax2Subclass::FwData,
            _ => {
                return Err(Error::FrameError(format!(
                    "unknown IAX2 subclass {:#04x}",
                    value
                )))
            }
        })
    }
}

/// Types of IAX2 Information Elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IeType {
    /// Number/extension being called
    CalledNumber = 0x01,
    /// Calling number
    CallingNumber = 0x02,
    /// Calling number ANI for billing
    CallingAni = 0x03,
    /// Name of caller
    CallingName = 0x04,
    /// Context for called number
    CalledContext = 0x05,
    /// Username (peer or user) for authentication
    Username = 0x06,
    /// Password for authentication
    Password = 0x07,
    /// Actual CODEC capability
    Capability = 0x08,
    /// Desired CODEC format
    Format = 0x09,
    /// Desired language
    Language = 0x0A,
    /// Protocol version
    Version = 0x0B,
    /// CPE ADSI capability
    AdsiCpe = 0x0C,
    /// Originally dialed DNID
    Dnid = 0x0D,
    /// Authentication method(s)
    AuthMethods = 0x0E,
    /// Challenge data for MD5/RSA
    Challenge = 0x0F,
    /// MD5 challenge result
    Md5Result = 0x10,
    /// RSA challenge result
    RsaResult = 0x11,
    /// Apparent address of peer
    ApparentAddr = 0x12,
    /// When to refresh registration
    Refresh = 0x13,
    /// Dialplan status
    DpStatus = 0x14,
    /// Call number of peer
    CallNo = 0x15,
    /// Cause
    Cause = 0x16,
    /// Unknown IAX command
    Iax2Unknown = 0x17,
    /// How many messages waiting
    MsgCount = 0x18,
    /// Request auto-answer
    AutoAnswer = 0x19,
    /// Request music on hold with QUELCH
    MusicOnHold = 0x1A,
    /// Transfer Request Identifier
    TransferId = 0x1B,
    /// Referring DNIS
    Rdnis = 0x1C,
    /// Provisioning information
    Provisioning = 0x1D,
    /// AES Provisioning information
    AesProvisioning = 0x1E,
    /// The current date and time
    DateTime = 0x1F,
    /// Device type
    DeviceType = 0x20,
    /// Service Identifier
    ServiceIdent = 0x21,
    /// Firmware revision
    FirmwareVer = 0x22,
    /// Firmware block description
    FwBlockDesc = 0x23,
    /// Firmware block of data
    FwBlockData = 0x24,
    /// Provisioning version
    ProvVer = 0x25,
    /// Calling presentation
    CallingPres = 0x26,
    /// Calling type of number
    CallingTon = 0x27,
    /// Calling transit network select
    CallingTns = 0x28,
    /// Supported sampling rates
    SamplingRate = 0x29,
    /// Hangup cause
    CauseCode = 0x2A,
    /// Encryption format
    Encryption = 0x2B,
    /// 128-bit AES encryption key
    EncKey = 0x2C,
    /// CODEC negotiation
    CodecPrefs = 0x2D,
    /// Received jitter, as in RFC1889
    RrJitter = 0x2E,
    /// Received loss, as in RFC1889
    RrLoss = 0x2F,
    /// Received frames
    RrPkts = 0x30,
    /// Max playout delay for received frames in ms
    RrDelay = 0x31,
    /// Dropped frames (presumably by jitterbuffer)
    RrDropped = 0x32,
    /// Frames received out of order
    RrOoo = 0x33,
    /// Variable
    Variable = 0x34,
    /// OSP token
    OspToken = 0x35,
}

impl TryFrom<u8> for IeType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0x01 => IeType::CalledNumber,
            0x02 => IeType::CallingNumber,
            0x03 => IeType::CallingAni,
            0x04 => IeType::CallingName,
            0x05 => IeType::CalledContext,
            0x06 => IeType::Username,
            0x07 => IeType::Password,
            0x08 => IeType::Capability,
            0x09 => IeType::Format,
            0x0A => IeType::Language,
            0x0B => IeType::Version,
            0x0C => IeType::AdsiCpe,
            0x0D => IeType::Dnid,
            0x0E => IeType::AuthMethods,
            0x0F => IeType::Challenge,
            0x10 => IeType::Md5Result,
            0x11 => IeType::RsaResult,
            0x12 => IeType::ApparentAddr,
            0x13 => IeType::Refresh,
            0x14 => IeType::DpStatus,
            0x15 => IeType::CallNo,
            0x16 => IeType::Cause,
            0x17 => IeType::Iax2Unknown,
            0x18 => IeType::MsgCount,
            0x19 => IeType::AutoAnswer,
            0x1A => IeType::MusicOnHold,
            0x1B => IeType::TransferId,
            0x1C => IeType::Rdnis,
            0x1D => IeType::Provisioning,
            0x1E => IeType::AesProvisioning,
            0x1F => IeType::DateTime,
            0x20 => IeType::DeviceType,
            0x21 => IeType::ServiceIdent,
            0x22 => IeType::FirmwareVer,
            0x23 => IeType::FwBlockDesc,
            0x24 => IeType::FwBlockData,
            0x25 => IeType::ProvVer,
            0x26 => IeType::CallingPres,
            0x27 => IeType::CallingTon,
            0x28 => IeType::CallingTns,
            0x29 => IeType::SamplingRate,
            0x2A => IeType::CauseCode,
            0x2B => IeType::Encryption,
            0x2C => IeType::EncKey,
            0x2D => IeType::CodecPrefs,
            0x2E => IeType::RrJitter,
            0x2F => IeType::RrLoss,
            0x30 => IeType::RrPkts,
            0x31 => IeType::RrDelay,
            0x32 => IeType::RrDropped,
            0x33 => IeType::RrOoo,
            0x34 => IeType::Variable,
            0x35 => IeType::OspToken,
            _ => return Err(Error::FrameError(format!("unknown IE type {:#04x}", value))),
        })
    }
}

/// Media frame format bitmasks
pub mod format {
    /// G.723.1 compression
    pub const G723_1: u32 = 1 << 0;
    /// GSM compression
    pub const GSM: u32 = 1 << 1;
    /// Raw mu-law data (G.711)
    pub const ULAW: u32 = 1 << 2;
    /// Raw A-law data (G.711)
    pub const ALAW: u32 = 1 << 3;
    /// ADPCM (G.726, 32kbps, AAL2 codeword packing)
    pub const G726_AAL2: u32 = 1 << 4;
    /// ADPCM (IMA)
    pub const ADPCM: u32 = 1 << 5;
    /// Raw 16-bit signed linear (8000 Hz) PCM
    pub const SLINEAR: u32 = 1 << 6;
    /// LPC10, 180 samples/frame
    pub const LPC10: u32 = 1 << 7;
    /// G.729A audio
    pub const G729A: u32 = 1 << 8;
    /// Speex free compression
    pub const SPEEX: u32 = 1 << 9;
    /// iLBC free compression
    pub const ILBC: u32 = 1 << 10;
    /// ADPCM (G.726, 32kbps, RFC3551 codeword packing)
    pub const G726: u32 = 1 << 11;
    /// G.722
    pub const G722: u32 = 1 << 12;
    /// Maximum audio format
    pub const MAX_AUDIO: u32 = 1 << 15;
    /// Maximum audio mask
    pub const AUDIO_MASK: u32 = (1 << 16) - 1;
    /// JPEG images
    pub const JPEG: u32 = 1 << 16;
    /// PNG images
    pub const PNG: u32 = 1 << 17;
    /// H.261 video
    pub const H261: u32 = 1 << 18;
    /// H.263 video
    pub const H263: u32 = 1 << 19;
    /// H.263+ video
    pub const H263_PLUS: u32 = 1 << 20;
    /// H.264 video
    pub const H264: u32 = 1 << 21;
    /// Maximum video format
    pub const MAX_VIDEO: u32 = 1 << 24;
    /// Maximum video mask
    pub const VIDEO_MASK: u32 = ((1u32 << 25) - 1) & !AUDIO_MASK;
}

/// Authentication method bitmasks. Only the framing is modeled; the
/// challenge computation itself lives outside this crate.
pub mod auth {
    /// Plaintext authentication
    pub const PLAINTEXT: u32 = 1 << 0;
    /// MD5 challenge/response authentication
    pub const MD5: u32 = 1 << 1;
    /// RSA authentication
    pub const RSA: u32 = 1 << 2;
}
