/// Events are the library's channel back to the application. Every event
/// carries the call number of the dialog that produced it and is
/// delivered to the registered handlers in emission order on the peer's
/// event dispatch worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A peer has registered with this registrar
    RegistrationNew { call_num: u16, username: String },
    /// A peer's registration has expired
    RegistrationExpired { call_num: u16, username: String },
    /// An outbound registration request had to be retransmitted
    RegistrationRetransmitted { call_num: u16 },
    /// A call has been established; the payload is the remote IP address
    CallEstablished { call_num: u16, remote: String },
    /// A call has been hung up; the payload is the remote IP address
    CallHangup { call_num: u16, remote: String },
    /// An audio frame has been received
    Audio { call_num: u16, data: Vec<u8> },
    /// A video frame has been received, with its 16-bit media timestamp
    Video {
        call_num: u16,
        data: Vec<u8>,
        timestamp: u16,
    },
    /// A text frame has been received on an active call
    Text { call_num: u16, text: String },
    /// A lag measurement has completed; the payload is the round trip
    /// time in milliseconds
    Lag { call_num: u16, lag_ms: u32 },
}

impl Event {
    pub fn call_num(&self) -> u16 {
        match self {
            Event::RegistrationNew { call_num, .. }
            | Event::RegistrationExpired { call_num, .. }
            | Event::RegistrationRetransmitted { call_num }
            | Event::CallEstablished { call_num, .. }
            | Event::CallHangup { call_num, .. }
            | Event::Audio { call_num, .. }
            | Event::Video { call_num, .. }
            | Event::Text { call_num, .. }
            | Event::Lag { call_num, .. } => *call_num,
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::RegistrationNew { call_num, username } => {
                write!(f, "RegistrationNew call {} username {}", call_num, username)
            }
            Event::RegistrationExpired { call_num, username } => {
                write!(
                    f,
                    "RegistrationExpired call {} username {}",
                    call_num, username
                )
            }
            Event::RegistrationRetransmitted { call_num } => {
                write!(f, "RegistrationRetransmitted call {}", call_num)
            }
            Event::CallEstablished { call_num, remote } => {
                write!(f, "CallEstablished call {} remote {}", call_num, remote)
            }
            Event::CallHangup { call_num, remote } => {
                write!(f, "CallHangup call {} remote {}", call_num, remote)
            }
            Event::Audio { call_num, data } => {
                write!(f, "Audio call {} len {}", call_num, data.len())
            }
            Event::Video {
                call_num,
                data,
                timestamp,
            } => write!(
                f,
                "Video call {} len {} ts {}",
                call_num,
                data.len(),
                timestamp
            ),
            Event::Text { call_num, text } => write!(f, "Text call {} text {}", call_num, text),
            Event::Lag { call_num, lag_ms } => write!(f, "Lag call {} ms {}", call_num, lag_ms),
        }
    }
}
