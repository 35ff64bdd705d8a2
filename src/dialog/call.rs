use super::{CommandResult, DialogCore, DialogResult};
use crate::command::Command;
use crate::event::Event;
use crate::frame::{Frame, FrameShell, FrameType, Iax2Subclass, IeType, InformationElement, MetaType};
use crate::peer::formats::choose_formats;
use crate::peer::PeerCore;
use crate::time::elapsed_ms;
use crate::Result;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Possible states for a [`CallDialog`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Base state
    Down,
    /// NEW sent
    NewSent,
    /// ACCEPT sent
    AcceptSent,
    /// REJECT sent
    RejectSent,
    /// Call is up
    Up,
    /// Hangup has been sent
    HangupSent,
}

/// Call dialog
///
/// Carries one call from setup, through the established phase where text
/// and media are exchanged, to teardown. Outbound full frames that need
/// acknowledgment (currently text) are queued until an ACK whose inbound
/// sequence number passes them sweeps them out.
#[derive(Debug)]
pub struct CallDialog {
    pub(crate) core: DialogCore,
    state: CallState,
    start_time: Instant,
    peer_capabilities: u32,
    actual_formats: u32,
    frame_queue: VecDeque<Frame>,
}

impl CallDialog {
    pub(crate) fn new(call_num: u16, remote_addr: SocketAddr) -> Self {
        CallDialog {
            core: DialogCore::new(call_num, remote_addr),
            state: CallState::Down,
            start_time: Instant::now(),
            peer_capabilities: 0,
            actual_formats: 0,
            frame_queue: VecDeque::new(),
        }
    }

    /// Send the initial NEW request, offering our capabilities and
    /// preferred format.
    pub(crate) async fn start(&mut self, peer: &mut PeerCore) -> Result<()> {
        self.state = CallState::NewSent;
        self.start_time = Instant::now();

        // just in case the packet must be retransmitted
        self.core.arm_timer(peer, Duration::from_secs(1));

        let mut frame = Frame::iax2(Iax2Subclass::New)
            .with_call_nums(self.core.call_num, 0)
            .with_seq_nums(self.core.next_out_seq(), self.core.in_seq_num)
            .with_ie(InformationElement::from_u16(IeType::Version, 2))
            .with_ie(InformationElement::from_u32(
                IeType::Capability,
                peer.capabilities,
            ))
            .with_ie(InformationElement::from_u32(
                IeType::Format,
                peer.preferred_format,
            ));
        peer.send_frame(&mut frame, self.core.remote_addr).await
    }

    pub(crate) async fn process_frame(
        &mut self,
        peer: &mut PeerCore,
        frame_in: &Frame,
        src: SocketAddr,
    ) -> Result<DialogResult> {
        match self.state {
            CallState::Down => self.on_down(peer, frame_in, src).await,
            CallState::NewSent => self.on_new_sent(peer, frame_in).await,
            CallState::AcceptSent => self.on_accept_sent(peer, frame_in).await,
            CallState::RejectSent => self.on_reject_sent(peer, frame_in).await,
            CallState::HangupSent => self.on_hangup_sent(frame_in).await,
            CallState::Up => self.on_up(peer, frame_in).await,
        }
    }

    async fn on_down(
        &mut self,
        peer: &mut PeerCore,
        frame_in: &Frame,
        src: SocketAddr,
    ) -> Result<DialogResult> {
        if frame_in.iax2_subclass() != Some(Iax2Subclass::New) {
            return Ok(DialogResult::Inval);
        }

        self.start_time = Instant::now();
        self.core.remote_call_num = frame_in.source_call_num;
        self.core.remote_addr = src;
        self.peer_capabilities = frame_in.ie_u32(IeType::Capability).unwrap_or(0);
        self.actual_formats = choose_formats(peer.capabilities, self.peer_capabilities);
        debug!(
            "our capabilities: {} peer capabilities: {} actual formats: {}",
            peer.capabilities, self.peer_capabilities, self.actual_formats
        );

        let subclass = if self.actual_formats != 0 {
            self.state = CallState::AcceptSent;
            Iax2Subclass::Accept
        } else {
            self.state = CallState::RejectSent;
            Iax2Subclass::Reject
        };
        let mut frame = Frame::iax2(subclass)
            .with_call_nums(self.core.call_num, self.core.remote_call_num)
            .with_timestamp(0)
            .with_seq_nums(self.core.next_out_seq(), self.core.in_seq_num)
            .with_ie(InformationElement::from_u32(
                IeType::Format,
                self.actual_formats,
            ));
        peer.send_frame(&mut frame, self.core.remote_addr).await?;

        self.core.clear_timer(peer);

        Ok(DialogResult::Success)
    }

    async fn on_new_sent(&mut self, peer: &mut PeerCore, frame_in: &Frame) -> Result<DialogResult> {
        let subclass = frame_in.iax2_subclass();
        if subclass != Some(Iax2Subclass::Accept) && subclass != Some(Iax2Subclass::Reject) {
            return Ok(DialogResult::Inval);
        }

        self.core.remote_call_num = frame_in.source_call_num;

        self.send_ack(peer).await?;
        self.core.clear_timer(peer);

        if subclass == Some(Iax2Subclass::Accept) {
            self.state = CallState::Up;
            Ok(DialogResult::Success)
        } else {
            self.state = CallState::Down;
            Ok(DialogResult::Destroy)
        }
    }

    async fn on_accept_sent(
        &mut self,
        peer: &mut PeerCore,
        frame_in: &Frame,
    ) -> Result<DialogResult> {
        if frame_in.iax2_subclass() != Some(Iax2Subclass::Ack) {
            return Ok(DialogResult::Inval);
        }

        self.core.clear_timer(peer);

        peer.queue_event(Event::CallEstablished {
            call_num: self.core.call_num,
            remote: self.core.remote_addr.ip().to_string(),
        });

        self.state = CallState::Up;
        Ok(DialogResult::Success)
    }

    async fn on_reject_sent(
        &mut self,
        peer: &mut PeerCore,
        frame_in: &Frame,
    ) -> Result<DialogResult> {
        if frame_in.iax2_subclass() != Some(Iax2Subclass::Ack) {
            return Ok(DialogResult::Inval);
        }

        self.core.clear_timer(peer);

        self.state = CallState::Down;
        Ok(DialogResult::Destroy)
    }

    async fn on_hangup_sent(&mut self, frame_in: &Frame) -> Result<DialogResult> {
        if frame_in.iax2_subclass() != Some(Iax2Subclass::Ack) {
            return Ok(DialogResult::Inval);
        }
        Ok(DialogResult::Destroy)
    }

    async fn on_up(&mut self, peer: &mut PeerCore, frame_in: &Frame) -> Result<DialogResult> {
        if frame_in.shell == FrameShell::Full && frame_in.frame_type == FrameType::Text {
            peer.queue_event(Event::Text {
                call_num: self.core.call_num,
                text: String::from_utf8_lossy(&frame_in.raw_data).into_owned(),
            });

            self.retransmit_frame_queue(peer).await;
            self.send_ack(peer).await?;

            Ok(DialogResult::Success)
        } else if frame_in.iax2_subclass() == Some(Iax2Subclass::Hangup) {
            self.send_ack(peer).await?;

            peer.queue_event(Event::CallHangup {
                call_num: self.core.call_num,
                remote: self.core.remote_addr.ip().to_string(),
            });

            Ok(DialogResult::Destroy)
        } else if frame_in.iax2_subclass() == Some(Iax2Subclass::Ack) {
            // Drop all queued full frames the ACK covers, then push the
            // survivors out again
            while let Some(frame) = self.frame_queue.front() {
                if frame.out_seq_num >= frame_in.in_seq_num {
                    break;
                }
                self.frame_queue.pop_front();
            }
            self.retransmit_frame_queue(peer).await;
            if self.frame_queue.is_empty() {
                self.core.clear_timer(peer);
            }
            Ok(DialogResult::Success)
        } else if frame_in.shell == FrameShell::Meta
            && frame_in.meta_type == Some(MetaType::Video)
        {
            peer.queue_event(Event::Video {
                call_num: self.core.call_num,
                data: frame_in.raw_data.clone(),
                timestamp: frame_in.timestamp as u16,
            });
            Ok(DialogResult::Success)
        } else {
            Ok(DialogResult::Inval)
        }
    }

    pub(crate) async fn process_command(
        &mut self,
        peer: &mut PeerCore,
        command: &Command,
    ) -> Result<CommandResult> {
        match command {
            Command::Hangup { .. } => {
                self.retransmit_frame_queue(peer).await;

                let mut frame = Frame::iax2(Iax2Subclass::Hangup)
                    .with_call_nums(self.core.call_num, self.core.remote_call_num)
                    .with_seq_nums(self.core.next_out_seq(), self.core.in_seq_num)
                    .with_timestamp(elapsed_ms(self.start_time));
                peer.send_frame(&mut frame, self.core.remote_addr).await?;

                self.state = CallState::HangupSent;
                if self.core.timer_id == 0 {
                    self.core.arm_timer(peer, Duration::from_secs(1));
                }
                Ok(CommandResult::Success)
            }
            Command::Text { text, .. } if self.state == CallState::Up => {
                self.retransmit_frame_queue(peer).await;

                let mut frame = Frame::full(FrameType::Text, 0)
                    .with_call_nums(self.core.call_num, self.core.remote_call_num)
                    .with_seq_nums(self.core.next_out_seq(), self.core.in_seq_num)
                    .with_timestamp(elapsed_ms(self.start_time))
                    .with_raw_data(text.as_bytes().to_vec());
                peer.send_frame(&mut frame, self.core.remote_addr).await?;

                // hold on to the frame until the remote side acknowledges it
                self.frame_queue.push_back(frame);
                if self.core.timer_id == 0 {
                    self.core.arm_timer(peer, Duration::from_secs(1));
                }
                Ok(CommandResult::Success)
            }
            Command::Video { data, .. } if self.state == CallState::Up => {
                // TODO: check for timestamp wraparound and send a FULL
                // frame to resync
                let mut frame = Frame::meta_video(
                    self.core.call_num,
                    elapsed_ms(self.start_time) as u16,
                    data.clone(),
                );
                peer.send_frame(&mut frame, self.core.remote_addr).await?;
                Ok(CommandResult::Success)
            }
            _ => Ok(CommandResult::Unsupported),
        }
    }

    pub(crate) async fn timer_callback(&mut self, peer: &mut PeerCore) -> Result<DialogResult> {
        match self.state {
            CallState::NewSent => {
                let mut frame = Frame::iax2(Iax2Subclass::New)
                    .with_call_nums(self.core.call_num, 0)
                    .with_seq_nums(self.core.last_out_seq(), self.core.in_seq_num)
                    .with_retransmission(true)
                    .with_ie(InformationElement::from_u16(IeType::Version, 2))
                    .with_ie(InformationElement::from_u32(
                        IeType::Capability,
                        peer.capabilities,
                    ))
                    .with_ie(InformationElement::from_u32(
                        IeType::Format,
                        peer.preferred_format,
                    ));
                if let Err(e) = peer.send_frame(&mut frame, self.core.remote_addr).await {
                    warn!("failed to retransmit NEW: {}", e);
                }
            }
            CallState::HangupSent => {
                let mut frame = Frame::iax2(Iax2Subclass::Hangup)
                    .with_call_nums(self.core.call_num, self.core.remote_call_num)
                    .with_seq_nums(self.core.last_out_seq(), self.core.in_seq_num)
                    .with_retransmission(true);
                if let Err(e) = peer.send_frame(&mut frame, self.core.remote_addr).await {
                    warn!("failed to retransmit HANGUP: {}", e);
                }
            }
            CallState::Up => {
                self.retransmit_frame_queue(peer).await;
                if self.frame_queue.is_empty() {
                    // nothing left awaiting acknowledgment
                    return Ok(DialogResult::Success);
                }
            }
            _ => {
                warn!(
                    "call timer fired in unexpected state {:?} for call_num {}",
                    self.state, self.core.call_num
                );
                // return early so that the timer is not restarted
                return Ok(DialogResult::Success);
            }
        }

        self.core.arm_timer(peer, Duration::from_secs(1));

        Ok(DialogResult::Success)
    }

    /// Push every queued-but-unacknowledged full frame out again, flagged
    /// as a retransmission.
    async fn retransmit_frame_queue(&mut self, peer: &mut PeerCore) {
        for frame in self.frame_queue.iter_mut() {
            frame.retransmission = true;
            if let Err(e) = peer.send_frame(frame, self.core.remote_addr).await {
                warn!("failed to retransmit queued frame: {}", e);
            }
        }
    }

    async fn send_ack(&mut self, peer: &mut PeerCore) -> Result<()> {
        let mut frame = Frame::iax2(Iax2Subclass::Ack)
            .with_call_nums(self.core.call_num, self.core.remote_call_num)
            .with_seq_nums(self.core.next_out_seq(), self.core.in_seq_num)
            .with_timestamp(elapsed_ms(self.start_time));
        peer.send_frame(&mut frame, self.core.remote_addr).await
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> CallState {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn queued_frames(&self) -> usize {
        self.frame_queue.len()
    }

    #[cfg(test)]
    pub(crate) fn negotiated_formats(&self) -> u32 {
        self.actual_formats
    }
}
