use super::{CommandResult, DialogCore, DialogResult};
use crate::command::Command;
use crate::frame::{Frame, Iax2Subclass, IeType, InformationElement};
use crate::peer::PeerCore;
use crate::Result;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::warn;

/// Possible states for a [`RegistrarDialog`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrarState {
    /// Base state
    None,
    /// REGREQ received, REGACK sent. Once the ACK is received the dialog
    /// is over.
    RegreqRcvd,
}

/// Registrar dialog
///
/// This is the dialog when another peer is registering to this peer. The
/// dialog for sending a registration is [`super::RegisterDialog`].
#[derive(Debug)]
pub struct RegistrarDialog {
    pub(crate) core: DialogCore,
    state: RegistrarState,
    /// The username of the peer that is requesting registration
    username: String,
}

impl RegistrarDialog {
    pub(crate) fn new(call_num: u16, remote_addr: SocketAddr) -> Self {
        RegistrarDialog {
            core: DialogCore::new(call_num, remote_addr),
            state: RegistrarState::None,
            username: String::new(),
        }
    }

    pub(crate) async fn process_frame(
        &mut self,
        peer: &mut PeerCore,
        frame_in: &Frame,
        src: SocketAddr,
    ) -> Result<DialogResult> {
        match self.state {
            RegistrarState::None => {
                if frame_in.iax2_subclass() != Some(Iax2Subclass::RegReq) {
                    return Ok(DialogResult::Inval);
                }

                let Some(username) = frame_in.ie_str(IeType::Username) else {
                    return Ok(DialogResult::Inval);
                };
                self.username = username.to_string();
                self.core.remote_call_num = frame_in.source_call_num;
                self.core.remote_addr = src;

                let mut frame = Frame::iax2(Iax2Subclass::RegAck)
                    .with_call_nums(self.core.call_num, self.core.remote_call_num)
                    .with_timestamp(frame_in.timestamp)
                    .with_seq_nums(self.core.next_out_seq(), self.core.in_seq_num)
                    .with_ie(InformationElement::from_u16(
                        IeType::Refresh,
                        PeerCore::DEFAULT_REFRESH.as_secs() as u16,
                    ));
                peer.send_frame(&mut frame, src).await?;

                self.state = RegistrarState::RegreqRcvd;
                // in case the REGACK is lost
                self.core.arm_timer(peer, Duration::from_secs(1));
                Ok(DialogResult::Success)
            }
            RegistrarState::RegreqRcvd => {
                if frame_in.iax2_subclass() != Some(Iax2Subclass::Ack) {
                    return Ok(DialogResult::Inval);
                }

                peer.register_peer(&self.username, src);

                Ok(DialogResult::Destroy)
            }
        }
    }

    pub(crate) async fn process_command(
        &mut self,
        _peer: &mut PeerCore,
        _command: &Command,
    ) -> Result<CommandResult> {
        Ok(CommandResult::Unsupported)
    }

    pub(crate) async fn timer_callback(&mut self, peer: &mut PeerCore) -> Result<DialogResult> {
        if self.state != RegistrarState::RegreqRcvd {
            warn!(
                "registrar timer fired in unexpected state {:?} for call_num {}",
                self.state, self.core.call_num
            );
            return Ok(DialogResult::Success);
        }

        // Retransmit the registration acknowledgment
        let mut frame = Frame::iax2(Iax2Subclass::RegAck)
            .with_call_nums(self.core.call_num, self.core.remote_call_num)
            .with_seq_nums(self.core.last_out_seq(), self.core.in_seq_num)
            .with_retransmission(true)
            .with_ie(InformationElement::from_u16(
                IeType::Refresh,
                PeerCore::DEFAULT_REFRESH.as_secs() as u16,
            ));
        if let Err(e) = peer.send_frame(&mut frame, self.core.remote_addr).await {
            warn!("failed to retransmit REGACK: {}", e);
        }

        self.core.arm_timer(peer, Duration::from_secs(1));

        Ok(DialogResult::Success)
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> RegistrarState {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn username(&self) -> &str {
        &self.username
    }
}
