use crate::command::Command;
use crate::frame::{Frame, FrameShell};
use crate::peer::timer::TimerTarget;
use crate::peer::PeerCore;
use crate::Result;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::debug;

pub mod call;
pub mod lag;
pub mod register;
pub mod registrar;
pub use call::CallDialog;
pub use lag::LagDialog;
pub use register::RegisterDialog;
pub use registrar::RegistrarDialog;

#[cfg(test)]
mod tests;

/// Result of feeding a frame or timer tick to a dialog, instructing the
/// peer how to manage the dialog's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogResult {
    /// The frame was successfully processed
    Success,
    /// The frame was invalid for this dialog; the peer replies INVAL
    Inval,
    /// The dialog is over; remove it from the dialog table and drop it
    Destroy,
    /// Drop the dialog; it is not in the dialog table
    Delete,
}

/// Result of submitting an application command to a dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    Success,
    /// The call for this command was not found
    NoCall,
    /// The command is not supported by this dialog type, or not in the
    /// dialog's current state
    Unsupported,
}

/// State shared by every dialog variant: addressing, sequence counters
/// and the pending retransmission timer.
#[derive(Debug)]
pub struct DialogCore {
    /// Uniquely identifies the session locally
    pub(crate) call_num: u16,
    /// Uniquely identifies the session on the remote side; learned from
    /// the peer
    pub(crate) remote_call_num: u16,
    pub(crate) remote_addr: SocketAddr,
    pub(crate) out_seq_num: u8,
    pub(crate) in_seq_num: u8,
    /// Id of the pending timer queue entry, 0 when none
    pub(crate) timer_id: u64,
}

impl DialogCore {
    pub(crate) fn new(call_num: u16, remote_addr: SocketAddr) -> Self {
        DialogCore {
            call_num,
            remote_call_num: 0,
            remote_addr,
            out_seq_num: 0,
            in_seq_num: 0,
            timer_id: 0,
        }
    }

    /// Take the next outbound sequence number, advancing the counter.
    pub(crate) fn next_out_seq(&mut self) -> u8 {
        let seq = self.out_seq_num;
        self.out_seq_num = seq.wrapping_add(1);
        seq
    }

    /// The sequence number of the most recently sent frame, for
    /// retransmissions that must not advance the counter.
    pub(crate) fn last_out_seq(&self) -> u8 {
        self.out_seq_num.wrapping_sub(1)
    }

    pub(crate) fn arm_timer(&mut self, peer: &mut PeerCore, after: Duration) {
        self.timer_id = peer
            .timers
            .schedule(after, TimerTarget::Dialog(self.call_num));
    }

    pub(crate) fn clear_timer(&mut self, peer: &mut PeerCore) {
        if self.timer_id != 0 {
            peer.timers.cancel(self.timer_id);
            self.timer_id = 0;
        }
    }
}

/// One protocol exchange and its state machine. The peer owns the
/// storage; the local call number is the handle.
#[derive(Debug)]
pub enum Dialog {
    Register(RegisterDialog),
    Registrar(RegistrarDialog),
    Call(CallDialog),
    Lag(LagDialog),
}

impl Dialog {
    pub(crate) fn core(&self) -> &DialogCore {
        match self {
            Dialog::Register(d) => &d.core,
            Dialog::Registrar(d) => &d.core,
            Dialog::Call(d) => &d.core,
            Dialog::Lag(d) => &d.core,
        }
    }

    pub(crate) fn core_mut(&mut self) -> &mut DialogCore {
        match self {
            Dialog::Register(d) => &mut d.core,
            Dialog::Registrar(d) => &mut d.core,
            Dialog::Call(d) => &mut d.core,
            Dialog::Lag(d) => &mut d.core,
        }
    }

    /// Feed one incoming frame to this dialog.
    ///
    /// FULL frames first pass the shared sequence discipline: a frame
    /// below the expected inbound sequence number is a duplicate and a
    /// frame above it arrived out of order; both are dropped without
    /// touching the variant state machine, so each full frame reaches the
    /// variant logic at most once. MINI and META frames bypass
    /// sequencing.
    pub(crate) async fn process_incoming_frame(
        &mut self,
        peer: &mut PeerCore,
        frame: &Frame,
        src: SocketAddr,
    ) -> Result<DialogResult> {
        if frame.shell == FrameShell::Full {
            let core = self.core_mut();
            if frame.out_seq_num < core.in_seq_num {
                debug!(
                    "duplicate frame received for call_num {}",
                    core.call_num
                );
                return Ok(DialogResult::Success);
            } else if frame.out_seq_num > core.in_seq_num {
                debug!(
                    "frame received out of order for call_num {}: got {}, expecting {}",
                    core.call_num, frame.out_seq_num, core.in_seq_num
                );
                return Ok(DialogResult::Success);
            }
            core.in_seq_num = core.in_seq_num.wrapping_add(1);
        }

        match self {
            Dialog::Register(d) => d.process_frame(peer, frame, src).await,
            Dialog::Registrar(d) => d.process_frame(peer, frame, src).await,
            Dialog::Call(d) => d.process_frame(peer, frame, src).await,
            Dialog::Lag(d) => d.process_frame(peer, frame, src).await,
        }
    }

    pub(crate) async fn process_command(
        &mut self,
        peer: &mut PeerCore,
        command: &Command,
    ) -> Result<CommandResult> {
        match self {
            Dialog::Register(d) => d.process_command(peer, command).await,
            Dialog::Registrar(d) => d.process_command(peer, command).await,
            Dialog::Call(d) => d.process_command(peer, command).await,
            Dialog::Lag(d) => d.process_command(peer, command).await,
        }
    }

    /// Called when this dialog's scheduled timer fires. The peer clears
    /// the dialog's timer id before invoking this.
    pub(crate) async fn timer_callback(&mut self, peer: &mut PeerCore) -> Result<DialogResult> {
        match self {
            Dialog::Register(d) => d.timer_callback(peer).await,
            Dialog::Registrar(d) => d.timer_callback(peer).await,
            Dialog::Call(d) => d.timer_callback(peer).await,
            Dialog::Lag(d) => d.timer_callback(peer).await,
        }
    }
}
