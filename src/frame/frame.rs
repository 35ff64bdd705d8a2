use super::{Direction, FrameShell, FrameType, Iax2Subclass, IeType, InformationElement, MetaType};
use crate::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::warn;

/// Size of the FULL frame header on the wire
pub const FULL_HEADER_LEN: usize = 12;
/// Size of the MINI frame header on the wire
pub const MINI_HEADER_LEN: usize = 4;
/// Size of the META video frame header on the wire
pub const META_VIDEO_HEADER_LEN: usize = 6;

/// The meta command value that marks a META video frame
const META_CMD_VIDEO: u8 = 0x80;

/// An IAX2 network frame
///
/// A frame can be built up field by field and then encoded to datagram
/// bytes with [`Frame::encode`], or parsed from a received datagram with
/// [`Frame::parse`]. Parsed frames are marked [`Direction::Inbound`];
/// only [`Direction::Outbound`] frames may be encoded.
///
/// The source and destination call numbers are the 14-bit effective
/// values; the shared high bits (source marker, retransmission flag) are
/// split out on parse and folded back in on encode. MINI and META video
/// frames carry the sender's call number, which is kept in
/// `source_call_num` for both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub direction: Direction,
    pub shell: FrameShell,
    pub frame_type: FrameType,
    pub source_call_num: u16,
    pub dest_call_num: u16,
    /// 32-bit milliseconds for FULL frames; only the low 16 bits travel
    /// for MINI and META frames.
    pub timestamp: u32,
    pub out_seq_num: u8,
    pub in_seq_num: u8,
    pub retransmission: bool,
    /// Set when the subclass byte is a power-of-two index (csub high bit)
    pub subclass_coded: bool,
    /// Frame type subclass, 7 bits
    pub subclass: u8,
    pub meta_type: Option<MetaType>,
    /// Information elements, in wire order. Only meaningful for FULL
    /// frames of type IAX2.
    pub ies: Vec<InformationElement>,
    /// Media payload for MINI/META frames, or trailing bytes of a
    /// non-IAX2 FULL frame.
    pub raw_data: Vec<u8>,
}

impl Frame {
    /// A new outbound FULL frame of the given type and raw subclass.
    pub fn full(frame_type: FrameType, subclass: u8) -> Self {
        Frame {
            direction: Direction::Outbound,
            shell: FrameShell::Full,
            frame_type,
            source_call_num: 0,
            dest_call_num: 0,
            timestamp: 0,
            out_seq_num: 0,
            in_seq_num: 0,
            retransmission: false,
            subclass_coded: false,
            subclass,
            meta_type: None,
            ies: Vec::new(),
            raw_data: Vec::new(),
        }
    }

    /// A new outbound FULL signalling frame with the given IAX2 subclass.
    pub fn iax2(subclass: Iax2Subclass) -> Self {
        Frame::full(FrameType::Iax2, subclass as u8)
    }

    /// A new outbound MINI media frame. The timestamp is the low 16 bits
    /// of the sender's full timestamp.
    pub fn mini(source_call_num: u16, timestamp: u16, payload: Vec<u8>) -> Self {
        let mut frame = Frame::full(FrameType::Undefined, 0);
        frame.shell = FrameShell::Mini;
        frame.source_call_num = source_call_num;
        frame.timestamp = timestamp as u32;
        frame.raw_data = payload;
        frame
    }

    /// A new outbound META video frame.
    pub fn meta_video(source_call_num: u16, timestamp: u16, payload: Vec<u8>) -> Self {
        let mut frame = Frame::full(FrameType::Undefined, 0);
        frame.shell = FrameShell::Meta;
        frame.meta_type = Some(MetaType::Video);
        frame.source_call_num = source_call_num;
        frame.timestamp = timestamp as u32;
        frame.raw_data = payload;
        frame
    }

    pub fn with_call_nums(mut self, source: u16, dest: u16) -> Self {
        self.source_call_num = source;
        self.dest_call_num = dest;
        self
    }

    pub fn with_seq_nums(mut self, out_seq_num: u8, in_seq_num: u8) -> Self {
        self.out_seq_num = out_seq_num;
        self.in_seq_num = in_seq_num;
        self
    }

    pub fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_retransmission(mut self, retransmission: bool) -> Self {
        self.retransmission = retransmission;
        self
    }

    pub fn with_ie(mut self, ie: InformationElement) -> Self {
        self.ies.push(ie);
        self
    }

    pub fn with_raw_data(mut self, data: Vec<u8>) -> Self {
        self.raw_data = data;
        self
    }

    /// The subclass decoded as an IAX2 signalling subclass, when this is
    /// a FULL frame of type IAX2 with a known subclass value.
    pub fn iax2_subclass(&self) -> Option<Iax2Subclass> {
        if self.shell != FrameShell::Full || self.frame_type != FrameType::Iax2 {
            return None;
        }
        Iax2Subclass::try_from(self.subclass).ok()
    }

    /// First IE of the given type, in wire order.
    pub fn ie(&self, ie_type: IeType) -> Option<&InformationElement> {
        self.ies.iter().find(|ie| ie.ie_type() == ie_type)
    }

    pub fn ie_str(&self, ie_type: IeType) -> Option<&str> {
        self.ie(ie_type)?.as_str()
    }

    pub fn ie_u16(&self, ie_type: IeType) -> Option<u16> {
        self.ie(ie_type)?.as_u16()
    }

    pub fn ie_u32(&self, ie_type: IeType) -> Option<u32> {
        self.ie(ie_type)?.as_u32()
    }

    /// Parse a received datagram into a frame.
    ///
    /// The first 16 bits decide the shell: high bit set is a FULL frame,
    /// any other non-zero value is a MINI frame, and a zero word opens a
    /// META frame.
    pub fn parse(buf: &[u8]) -> Result<Frame> {
        if buf.len() < 2 {
            return Err(Error::FrameError(format!(
                "datagram of {} bytes is too short for any frame",
                buf.len()
            )));
        }

        let begin = u16::from_be_bytes([buf[0], buf[1]]);
        if begin & 0x8000 != 0 {
            Frame::parse_full(buf)
        } else if begin != 0 {
            Frame::parse_mini(buf)
        } else {
            Frame::parse_meta(buf)
        }
    }

    fn parse_full(mut buf: &[u8]) -> Result<Frame> {
        if buf.len() < FULL_HEADER_LEN {
            return Err(Error::FrameError(format!(
                "full frame of {} bytes is shorter than its header",
                buf.len()
            )));
        }

        let scallno = buf.get_u16();
        let dcallno = buf.get_u16();
        let ts = buf.get_u32();
        let oseqno = buf.get_u8();
        let iseqno = buf.get_u8();
        let frame_type = FrameType::try_from(buf.get_u8())?;
        let csub = buf.get_u8();

        let mut frame = Frame::full(frame_type, csub & 0x7F);
        frame.direction = Direction::Inbound;
        frame.source_call_num = scallno & 0x7FFF;
        frame.dest_call_num = dcallno & 0x7FFF;
        frame.retransmission = dcallno & 0x8000 != 0;
        frame.timestamp = ts;
        frame.out_seq_num = oseqno;
        frame.in_seq_num = iseqno;
        frame.subclass_coded = csub & 0x80 != 0;

        if frame_type != FrameType::Iax2 {
            frame.raw_data = buf.to_vec();
            return Ok(frame);
        }

        // IE triplets until the datagram is consumed. A malformed length
        // or unknown type stops parsing with the partial set retained.
        while buf.remaining() >= 2 {
            let tag = buf.get_u8();
            let datalen = buf.get_u8() as usize;
            if datalen > buf.remaining() {
                warn!(
                    "IE datalen {} greater than {} bytes left in packet",
                    datalen,
                    buf.remaining()
                );
                break;
            }
            let ie_type = match IeType::try_from(tag) {
                Ok(t) => t,
                Err(e) => {
                    warn!("stopping IE parse: {}", e);
                    break;
                }
            };
            let data = buf[..datalen].to_vec();
            buf.advance(datalen);
            frame.ies.push(InformationElement::new(ie_type, data)?);
        }
        if buf.remaining() == 1 {
            warn!("1 trailing byte in packet is not big enough for an IE");
        }

        Ok(frame)
    }

    fn parse_mini(mut buf: &[u8]) -> Result<Frame> {
        if buf.len() < MINI_HEADER_LEN {
            return Err(Error::FrameError(format!(
                "mini frame of {} bytes is shorter than its header",
                buf.len()
            )));
        }

        let callno = buf.get_u16();
        let ts = buf.get_u16();
        let mut frame = Frame::mini(callno, ts, buf.to_vec());
        frame.direction = Direction::Inbound;
        Ok(frame)
    }

    fn parse_meta(buf: &[u8]) -> Result<Frame> {
        if buf.len() < 3 {
            return Err(Error::FrameError(format!(
                "meta frame of {} bytes is shorter than its header",
                buf.len()
            )));
        }
        if buf[2] != META_CMD_VIDEO {
            return Err(Error::FrameError(format!(
                "unknown meta command {:#04x}",
                buf[2]
            )));
        }
        Frame::parse_meta_video(buf)
    }

    fn parse_meta_video(mut buf: &[u8]) -> Result<Frame> {
        if buf.len() <= META_VIDEO_HEADER_LEN {
            return Err(Error::FrameError(format!(
                "meta video frame of {} bytes carries no payload",
                buf.len()
            )));
        }

        buf.advance(2); // zeros
        let callno = buf.get_u16();
        let ts = buf.get_u16();
        let mut frame = Frame::meta_video(callno & 0x7FFF, ts, buf.to_vec());
        frame.direction = Direction::Inbound;
        Ok(frame)
    }

    /// Encode this frame to datagram bytes. Only outbound frames encode;
    /// the caller marks the frame as a retransmission once the bytes have
    /// actually been handed to the socket.
    pub fn encode(&self) -> Result<Bytes> {
        if self.direction != Direction::Outbound {
            return Err(Error::FrameError(
                "frames must be outbound to be encoded".to_string(),
            ));
        }

        match self.shell {
            FrameShell::Full => self.encode_full(),
            FrameShell::Mini => self.encode_mini(),
            FrameShell::Meta => self.encode_meta(),
        }
    }

    fn encode_full(&self) -> Result<Bytes> {
        let ie_len: usize = self.ies.iter().map(|ie| ie.wire_len()).sum();
        let mut buf = BytesMut::with_capacity(FULL_HEADER_LEN + ie_len + self.raw_data.len());

        buf.put_u16(self.source_call_num | 0x8000);
        buf.put_u16(self.dest_call_num | if self.retransmission { 0x8000 } else { 0 });
        buf.put_u32(self.timestamp);
        buf.put_u8(self.out_seq_num);
        buf.put_u8(self.in_seq_num);
        buf.put_u8(self.frame_type as u8);
        buf.put_u8(self.subclass | if self.subclass_coded { 0x80 } else { 0 });

        for ie in &self.ies {
            buf.put_u8(ie.ie_type() as u8);
            buf.put_u8(ie.data().len() as u8);
            buf.put_slice(ie.data());
        }
        buf.put_slice(&self.raw_data);

        Ok(buf.freeze())
    }

    fn encode_mini(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(MINI_HEADER_LEN + self.raw_data.len());
        buf.put_u16(self.source_call_num & !0x8000);
        buf.put_u16(self.timestamp as u16);
        buf.put_slice(&self.raw_data);
        Ok(buf.freeze())
    }

    fn encode_meta(&self) -> Result<Bytes> {
        match self.meta_type {
            Some(MetaType::Video) => {}
            None => {
                return Err(Error::FrameError(
                    "meta frame has no meta type to encode".to_string(),
                ))
            }
        }

        let mut buf = BytesMut::with_capacity(META_VIDEO_HEADER_LEN + self.raw_data.len());
        buf.put_u16(0); // zeros
        buf.put_u16(self.source_call_num | 0x8000);
        buf.put_u16(self.timestamp as u16);
        buf.put_slice(&self.raw_data);
        Ok(buf.freeze())
    }
}

impl TryFrom<&[u8]> for Frame {
    type Error = Error;

    fn try_from(buf: &[u8]) -> Result<Frame> {
        Frame::parse(buf)
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dir = match self.direction {
            Direction::Inbound => "Rx",
            Direction::Outbound => "Tx",
        };
        match self.shell {
            FrameShell::Full => {
                write!(
                    f,
                    "{}-[FULL{}] type {:?} subclass {} src {} dst {} oseq {} iseq {} ts {}",
                    dir,
                    if self.retransmission {
                        "-retransmission"
                    } else {
                        ""
                    },
                    self.frame_type,
                    match self.iax2_subclass() {
                        Some(sc) => format!("{:?}", sc),
                        None => self.subclass.to_string(),
                    },
                    self.source_call_num,
                    self.dest_call_num,
                    self.out_seq_num,
                    self.in_seq_num,
                    self.timestamp
                )?;
                for ie in &self.ies {
                    write!(f, "\n      IE: {}", ie)?;
                }
                Ok(())
            }
            FrameShell::Mini => write!(
                f,
                "{}-[MINI] callno {} ts {} datalen {}",
                dir,
                self.source_call_num,
                self.timestamp,
                self.raw_data.len()
            ),
            FrameShell::Meta => write!(
                f,
                "{}-[META] type {:?} callno {} ts {} datalen {}",
                dir,
                self.meta_type,
                self.source_call_num,
                self.timestamp,
                self.raw_data.len()
            ),
        }
    }
}
