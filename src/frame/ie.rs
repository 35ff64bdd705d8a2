use super::IeType;
use crate::{Error, Result};

/// The maximum data length for an IAX2 IE, fixed by the one-byte length
/// field on the wire.
pub const IE_MAX_DATALEN: usize = 255;

/// An IAX2 information element
///
/// IEs are the TLV payload of FULL frames of type IAX2. The data is held
/// exactly as it appears on the wire; the typed accessors decode the three
/// canonical encodings (UTF-8 string, big-endian u16, big-endian u32).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InformationElement {
    ie_type: IeType,
    data: Vec<u8>,
}

impl InformationElement {
    pub fn new(ie_type: IeType, data: Vec<u8>) -> Result<Self> {
        if data.len() > IE_MAX_DATALEN {
            return Err(Error::FrameError(format!(
                "IE {:?} data length {} exceeds {}",
                ie_type,
                data.len(),
                IE_MAX_DATALEN
            )));
        }
        Ok(InformationElement { ie_type, data })
    }

    pub fn from_str(ie_type: IeType, value: &str) -> Result<Self> {
        Self::new(ie_type, value.as_bytes().to_vec())
    }

    pub fn from_u16(ie_type: IeType, value: u16) -> Self {
        InformationElement {
            ie_type,
            data: value.to_be_bytes().to_vec(),
        }
    }

    pub fn from_u32(ie_type: IeType, value: u32) -> Self {
        InformationElement {
            ie_type,
            data: value.to_be_bytes().to_vec(),
        }
    }

    pub fn empty(ie_type: IeType) -> Self {
        InformationElement {
            ie_type,
            data: Vec::new(),
        }
    }

    pub fn ie_type(&self) -> IeType {
        self.ie_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Wire size of this IE: type, length, and data bytes.
    pub fn wire_len(&self) -> usize {
        2 + self.data.len()
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    pub fn as_u16(&self) -> Option<u16> {
        let bytes: [u8; 2] = self.data.get(..2)?.try_into().ok()?;
        Some(u16::from_be_bytes(bytes))
    }

    pub fn as_u32(&self) -> Option<u32> {
        let bytes: [u8; 4] = self.data.get(..4)?.try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }
}

impl std::fmt::Display for InformationElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.ie_type {
            IeType::Username
            | IeType::CalledNumber
            | IeType::CallingNumber
            | IeType::CallingName
            | IeType::CalledContext
            | IeType::Language => match self.as_str() {
                Some(s) => write!(f, "{:?} len {} value {}", self.ie_type, self.data.len(), s),
                None => write!(f, "{:?} len {} (non-utf8)", self.ie_type, self.data.len()),
            },
            IeType::Version | IeType::Refresh => match self.as_u16() {
                Some(n) => write!(f, "{:?} len {} value {}", self.ie_type, self.data.len(), n),
                None => write!(f, "{:?} len {} (truncated)", self.ie_type, self.data.len()),
            },
            IeType::Capability | IeType::Format => match self.as_u32() {
                Some(n) => write!(f, "{:?} len {} value {}", self.ie_type, self.data.len(), n),
                None => write!(f, "{:?} len {} (truncated)", self.ie_type, self.data.len()),
            },
            _ => write!(f, "{:?} len {}", self.ie_type, self.data.len()),
        }
    }
}
