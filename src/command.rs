/// Commands are what the application uses to communicate back to the
/// library. They are submitted through a peer handle and processed on the
/// peer's protocol task in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start a new call. Submitted on the application's behalf by
    /// `PeerHandle::new_call`, which allocates the call number.
    NewCall { call_num: u16, uri: String },
    /// Hang up a call
    Hangup { call_num: u16 },
    /// Send an audio frame on an established call
    Audio { call_num: u16, data: Vec<u8> },
    /// Send a video frame on an established call
    Video { call_num: u16, data: Vec<u8> },
    /// Send text on an established call
    Text { call_num: u16, text: String },
    /// Initiate a lag measurement. Submitted on the application's behalf
    /// by `PeerHandle::new_lag`; the round trip time comes back as a
    /// `Event::Lag`.
    LagRequest { call_num: u16, uri: String },
    /// Shut down the peer, causing `Peer::run` to return
    Shutdown,
}

impl Command {
    /// The call number this command addresses, if it addresses one.
    pub fn call_num(&self) -> Option<u16> {
        match self {
            Command::NewCall { call_num, .. }
            | Command::Hangup { call_num }
            | Command::Audio { call_num, .. }
            | Command::Video { call_num, .. }
            | Command::Text { call_num, .. }
            | Command::LagRequest { call_num, .. } => Some(*call_num),
            Command::Shutdown => None,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::NewCall { call_num, uri } => write!(f, "NewCall call {} uri {}", call_num, uri),
            Command::Hangup { call_num } => write!(f, "Hangup call {}", call_num),
            Command::Audio { call_num, data } => {
                write!(f, "Audio call {} len {}", call_num, data.len())
            }
            Command::Video { call_num, data } => {
                write!(f, "Video call {} len {}", call_num, data.len())
            }
            Command::Text { call_num, text } => write!(f, "Text call {} text {}", call_num, text),
            Command::LagRequest { call_num, uri } => {
                write!(f, "LagRequest call {} uri {}", call_num, uri)
            }
            Command::Shutdown => write!(f, "Shutdown"),
        }
    }
}
