use super::{CommandResult, DialogCore, DialogResult};
use crate::command::Command;
use crate::event::Event;
use crate::frame::{Frame, Iax2Subclass, IeType, InformationElement};
use crate::peer::PeerCore;
use crate::Result;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::warn;

/// Possible states for a [`RegisterDialog`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterState {
    /// Base state
    None,
    /// REGREQ sent, waiting for REGACK. Once the REGACK is received an
    /// ACK is sent and the dialog loops back to refresh.
    RegreqSent,
}

/// Registration dialog
///
/// This is the dialog when this peer is registering to another peer. The
/// dialog for processing an incoming registration is
/// [`super::RegistrarDialog`]. A single instance persists to refresh the
/// registration for the lifetime of the peer.
#[derive(Debug)]
pub struct RegisterDialog {
    pub(crate) core: DialogCore,
    state: RegisterState,
    username: String,
    /// Refresh interval granted by the registrar; the refresh cycle runs
    /// at half of it so retransmissions fit before expiry.
    refresh: Duration,
}

impl RegisterDialog {
    pub(crate) fn new(call_num: u16, remote_addr: SocketAddr, username: String) -> Self {
        RegisterDialog {
            core: DialogCore::new(call_num, remote_addr),
            state: RegisterState::None,
            username,
            refresh: PeerCore::DEFAULT_REFRESH,
        }
    }

    /// Send the initial registration request and arm the retransmission
    /// timer. Also re-entered by the timer for every refresh cycle; the
    /// sequence counters restart from zero each time because the remote
    /// registrar sees every refresh as a fresh exchange.
    pub(crate) async fn start(&mut self, peer: &mut PeerCore) -> Result<()> {
        self.state = RegisterState::RegreqSent;
        self.core.in_seq_num = 0;
        self.core.out_seq_num = 0;

        let mut frame = Frame::iax2(Iax2Subclass::RegReq)
            .with_call_nums(self.core.call_num, 0)
            .with_seq_nums(self.core.next_out_seq(), self.core.in_seq_num)
            .with_ie(InformationElement::from_str(
                IeType::Username,
                &self.username,
            )?);

        // just in case the packet must be retransmitted
        self.core.arm_timer(peer, Duration::from_secs(1));

        peer.send_frame(&mut frame, self.core.remote_addr).await
    }

    pub(crate) async fn process_frame(
        &mut self,
        peer: &mut PeerCore,
        frame_in: &Frame,
        _src: SocketAddr,
    ) -> Result<DialogResult> {
        if self.state != RegisterState::RegreqSent
            || frame_in.iax2_subclass() != Some(Iax2Subclass::RegAck)
        {
            return Ok(DialogResult::Inval);
        }

        // Remove the timer for retransmission of the REGREQ
        self.core.clear_timer(peer);

        if let Some(refresh) = frame_in.ie_u16(IeType::Refresh) {
            self.refresh = Duration::from_secs(refresh as u64);
        }

        // An ACK completes this exchange
        let mut frame = Frame::iax2(Iax2Subclass::Ack)
            .with_call_nums(self.core.call_num, frame_in.source_call_num)
            .with_timestamp(frame_in.timestamp)
            .with_seq_nums(self.core.next_out_seq(), self.core.in_seq_num);
        peer.send_frame(&mut frame, self.core.remote_addr).await?;

        self.state = RegisterState::None;

        // Refresh at half the granted time so the registration is renewed
        // before it expires even if there have to be retransmissions
        self.core.arm_timer(peer, self.refresh / 2);

        Ok(DialogResult::Success)
    }

    pub(crate) async fn process_command(
        &mut self,
        _peer: &mut PeerCore,
        _command: &Command,
    ) -> Result<CommandResult> {
        Ok(CommandResult::Unsupported)
    }

    pub(crate) async fn timer_callback(&mut self, peer: &mut PeerCore) -> Result<DialogResult> {
        match self.state {
            RegisterState::None => {
                // refresh cycle
                self.start(peer).await?;
                return Ok(DialogResult::Success);
            }
            RegisterState::RegreqSent => {}
        }

        // Retransmit the registration request
        let mut frame = Frame::iax2(Iax2Subclass::RegReq)
            .with_call_nums(self.core.call_num, 0)
            .with_seq_nums(self.core.last_out_seq(), self.core.in_seq_num)
            .with_retransmission(true)
            .with_ie(InformationElement::from_str(
                IeType::Username,
                &self.username,
            )?);
        if let Err(e) = peer.send_frame(&mut frame, self.core.remote_addr).await {
            warn!("failed to retransmit REGREQ: {}", e);
        }

        peer.queue_event(Event::RegistrationRetransmitted {
            call_num: self.core.call_num,
        });

        self.core.arm_timer(peer, Duration::from_secs(1));

        Ok(DialogResult::Success)
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> RegisterState {
        self.state
    }
}
