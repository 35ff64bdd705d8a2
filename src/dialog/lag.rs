use super::{CommandResult, DialogCore, DialogResult};
use crate::command::Command;
use crate::event::Event;
use crate::frame::{Frame, Iax2Subclass};
use crate::peer::PeerCore;
use crate::Result;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::warn;

/// Possible states for a [`LagDialog`]
///
/// Only the requester path (`None` → `LagrqSent` → destroyed) and the
/// responder path (`None` → `LagrpSent` → destroyed) are reachable; the
/// received markers exist for wire completeness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LagState {
    /// Base state
    None,
    /// LAGRQ sent, waiting for LAGRP
    LagrqSent,
    /// LAGRP sent, waiting for ACK
    LagrpSent,
    /// LAGRQ received
    LagrqRcvd,
    /// LAGRP received
    LagrpRcvd,
}

/// Lag dialog
///
/// Measures the round trip to a remote peer. The requester stamps the
/// LAGRQ with milliseconds since its own reference time; the responder
/// echoes that stamp in the LAGRP, and the difference from the
/// requester's clock on return is the lag.
#[derive(Debug)]
pub struct LagDialog {
    pub(crate) core: DialogCore,
    state: LagState,
    /// Timestamp carried by our outstanding LAGRQ or LAGRP, for
    /// retransmissions.
    sent_timestamp: u32,
}

impl LagDialog {
    pub(crate) fn new(call_num: u16, remote_addr: SocketAddr) -> Self {
        LagDialog {
            core: DialogCore::new(call_num, remote_addr),
            state: LagState::None,
            sent_timestamp: 0,
        }
    }

    /// Send the initial lag request.
    pub(crate) async fn start(&mut self, peer: &mut PeerCore) -> Result<()> {
        self.state = LagState::LagrqSent;
        self.sent_timestamp = peer.reference_elapsed_ms();

        let mut frame = Frame::iax2(Iax2Subclass::LagRq)
            .with_call_nums(self.core.call_num, 0)
            .with_seq_nums(self.core.next_out_seq(), self.core.in_seq_num)
            .with_timestamp(self.sent_timestamp);

        // the packet may need to be retransmitted
        self.core.arm_timer(peer, Duration::from_secs(5));

        peer.send_frame(&mut frame, self.core.remote_addr).await
    }

    pub(crate) async fn process_frame(
        &mut self,
        peer: &mut PeerCore,
        frame_in: &Frame,
        src: SocketAddr,
    ) -> Result<DialogResult> {
        match self.state {
            LagState::None => {
                if frame_in.iax2_subclass() != Some(Iax2Subclass::LagRq) {
                    return Ok(DialogResult::Inval);
                }

                // Reply echoing the request timestamp
                self.core.remote_call_num = frame_in.source_call_num;
                self.sent_timestamp = frame_in.timestamp;
                let mut frame = Frame::iax2(Iax2Subclass::LagRp)
                    .with_call_nums(self.core.call_num, frame_in.source_call_num)
                    .with_seq_nums(self.core.next_out_seq(), self.core.in_seq_num)
                    .with_timestamp(frame_in.timestamp);
                peer.send_frame(&mut frame, self.core.remote_addr).await?;

                self.state = LagState::LagrpSent;

                // Keep retransmitting until the requester acknowledges
                self.core.arm_timer(peer, PeerCore::DEFAULT_REFRESH);

                Ok(DialogResult::Success)
            }
            LagState::LagrpSent => {
                if frame_in.iax2_subclass() != Some(Iax2Subclass::Ack) {
                    self.state = LagState::None;
                    return Ok(DialogResult::Inval);
                }
                self.state = LagState::None;
                Ok(DialogResult::Destroy)
            }
            LagState::LagrqSent => {
                if frame_in.iax2_subclass() != Some(Iax2Subclass::LagRp) {
                    return Ok(DialogResult::Inval);
                }

                let mut frame = Frame::iax2(Iax2Subclass::Ack)
                    .with_call_nums(self.core.call_num, frame_in.source_call_num)
                    .with_seq_nums(self.core.next_out_seq(), self.core.in_seq_num)
                    .with_timestamp(frame_in.timestamp);
                peer.send_frame(&mut frame, src).await?;

                self.state = LagState::None;
                self.core.clear_timer(peer);

                peer.queue_event(Event::Lag {
                    call_num: self.core.call_num,
                    lag_ms: peer
                        .reference_elapsed_ms()
                        .saturating_sub(frame_in.timestamp),
                });
                Ok(DialogResult::Destroy)
            }
            _ => Ok(DialogResult::Inval),
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
        match self.state {
            LagState::LagrpSent => {
                let mut frame = Frame::iax2(Iax2Subclass::LagRp)
                    .with_call_nums(self.core.call_num, self.core.remote_call_num)
                    .with_seq_nums(self.core.last_out_seq(), self.core.in_seq_num)
                    .with_retransmission(true)
                    .with_timestamp(self.sent_timestamp);
                if let Err(e) = peer.send_frame(&mut frame, self.core.remote_addr).await {
                    warn!("failed to retransmit LAGRP: {}", e);
                }

                self.core.arm_timer(peer, PeerCore::DEFAULT_REFRESH);
                Ok(DialogResult::Success)
            }
            LagState::LagrqSent => {
                let mut frame = Frame::iax2(Iax2Subclass::LagRq)
                    .with_call_nums(self.core.call_num, 0)
                    .with_seq_nums(self.core.last_out_seq(), self.core.in_seq_num)
                    .with_retransmission(true)
                    .with_timestamp(self.sent_timestamp);
                if let Err(e) = peer.send_frame(&mut frame, self.core.remote_addr).await {
                    warn!("failed to retransmit LAGRQ: {}", e);
                }

                self.core.arm_timer(peer, Duration::from_secs(5));
                Ok(DialogResult::Success)
            }
            _ => {
                warn!(
                    "lag timer fired in unexpected state {:?} for call_num {}",
                    self.state, self.core.call_num
                );
                Ok(DialogResult::Inval)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> LagState {
        self.state
    }
}
