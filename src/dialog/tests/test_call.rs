use super::{inbound, rig_with_caps};
use crate::command::Command;
use crate::dialog::call::{CallDialog, CallState};
use crate::dialog::{CommandResult, Dialog, DialogResult};
use crate::event::Event;
use crate::frame::{format, Frame, FrameType, Iax2Subclass, IeType, InformationElement};

fn new_frame(caps: u32) -> Frame {
    inbound(
        Frame::iax2(Iax2Subclass::New)
            .with_call_nums(6, 0)
            .with_seq_nums(0, 0)
            .with_ie(InformationElement::from_u16(IeType::Version, 2))
            .with_ie(InformationElement::from_u32(IeType::Capability, caps))
            .with_ie(InformationElement::from_u32(IeType::Format, caps)),
    )
}

fn ack_frame(oseq: u8, iseq: u8) -> Frame {
    inbound(
        Frame::iax2(Iax2Subclass::Ack)
            .with_call_nums(6, 3)
            .with_seq_nums(oseq, iseq),
    )
}

/// Drive a receiving-side dialog into the Up state: NEW in, ACCEPT out,
/// ACK in.
async fn up_dialog(rig: &mut super::TestRig, caps: u32) -> Dialog {
    let mut dialog = Dialog::Call(CallDialog::new(3, rig.remote_addr));
    dialog
        .process_incoming_frame(&mut rig.core, &new_frame(caps), rig.remote_addr)
        .await
        .expect("process NEW");
    rig.recv_frame().await; // the ACCEPT
    dialog
        .process_incoming_frame(&mut rig.core, &ack_frame(1, 1), rig.remote_addr)
        .await
        .expect("process ACK");
    rig.events.try_recv().expect("established event");
    dialog
}

#[tokio::test]
async fn test_incoming_new_accepts_common_codec() {
    let mut rig = rig_with_caps(format::SLINEAR).await;
    let mut dialog = CallDialog::new(3, rig.remote_addr);

    let result = dialog
        .process_frame(
            &mut rig.core,
            &new_frame(format::SLINEAR | format::ULAW | format::ALAW),
            rig.remote_addr,
        )
        .await
        .expect("process");
    assert_eq!(result, DialogResult::Success);
    assert_eq!(dialog.state(), CallState::AcceptSent);
    assert_eq!(dialog.negotiated_formats(), format::SLINEAR);
    assert_eq!(dialog.core.remote_call_num, 6);

    let accept = rig.recv_frame().await;
    assert_eq!(accept.iax2_subclass(), Some(Iax2Subclass::Accept));
    assert_eq!(accept.ie_u32(IeType::Format), Some(format::SLINEAR));
    assert_eq!(accept.dest_call_num, 6);
}

#[tokio::test]
async fn test_incoming_new_rejects_without_common_codec() {
    let mut rig = rig_with_caps(format::SLINEAR).await;
    let mut dialog = CallDialog::new(3, rig.remote_addr);

    let result = dialog
        .process_frame(&mut rig.core, &new_frame(format::G729A), rig.remote_addr)
        .await
        .expect("process");
    assert_eq!(result, DialogResult::Success);
    assert_eq!(dialog.state(), CallState::RejectSent);

    let reject = rig.recv_frame().await;
    assert_eq!(reject.iax2_subclass(), Some(Iax2Subclass::Reject));
    assert_eq!(reject.ie_u32(IeType::Format), Some(0));

    // the caller's ACK tears the dialog down
    let result = dialog
        .process_frame(&mut rig.core, &ack_frame(1, 1), rig.remote_addr)
        .await
        .expect("process");
    assert_eq!(result, DialogResult::Destroy);
    assert!(rig.events.try_recv().is_err());
}

#[tokio::test]
async fn test_ack_establishes_accepted_call() {
    let mut rig = rig_with_caps(format::SLINEAR).await;
    let mut dialog = Dialog::Call(CallDialog::new(3, rig.remote_addr));
    dialog
        .process_incoming_frame(&mut rig.core, &new_frame(format::SLINEAR), rig.remote_addr)
        .await
        .expect("process");
    rig.recv_frame().await;

    let result = dialog
        .process_incoming_frame(&mut rig.core, &ack_frame(1, 1), rig.remote_addr)
        .await
        .expect("process");
    assert_eq!(result, DialogResult::Success);
    assert_eq!(
        rig.events.try_recv(),
        Ok(Event::CallEstablished {
            call_num: 3,
            remote: "127.0.0.1".to_string()
        })
    );
    let Dialog::Call(dialog) = dialog else {
        unreachable!()
    };
    assert_eq!(dialog.state(), CallState::Up);
    assert_eq!(dialog.core.timer_id, 0);
}

#[tokio::test]
async fn test_outbound_call_setup() {
    let mut rig = rig_with_caps(format::SLINEAR | format::ULAW).await;
    let mut dialog = CallDialog::new(3, rig.remote_addr);
    dialog.start(&mut rig.core).await.expect("start");
    assert_eq!(dialog.state(), CallState::NewSent);

    let new = rig.recv_frame().await;
    assert_eq!(new.iax2_subclass(), Some(Iax2Subclass::New));
    assert_eq!(new.ie_u16(IeType::Version), Some(2));
    assert_eq!(
        new.ie_u32(IeType::Capability),
        Some(format::SLINEAR | format::ULAW)
    );
    assert_eq!(new.ie_u32(IeType::Format), Some(format::ULAW));

    let accept = inbound(
        Frame::iax2(Iax2Subclass::Accept)
            .with_call_nums(6, 3)
            .with_seq_nums(0, 1)
            .with_ie(InformationElement::from_u32(IeType::Format, format::ULAW)),
    );
    let result = dialog
        .process_frame(&mut rig.core, &accept, rig.remote_addr)
        .await
        .expect("process");
    assert_eq!(result, DialogResult::Success);
    assert_eq!(dialog.state(), CallState::Up);
    assert_eq!(dialog.core.remote_call_num, 6);

    let ack = rig.recv_frame().await;
    assert_eq!(ack.iax2_subclass(), Some(Iax2Subclass::Ack));
    assert_eq!(ack.dest_call_num, 6);
}

#[tokio::test]
async fn test_outbound_call_rejected() {
    let mut rig = rig_with_caps(format::SLINEAR).await;
    let mut dialog = CallDialog::new(3, rig.remote_addr);
    dialog.start(&mut rig.core).await.expect("start");
    rig.recv_frame().await;

    let reject = inbound(
        Frame::iax2(Iax2Subclass::Reject)
            .with_call_nums(6, 3)
            .with_seq_nums(0, 1)
            .with_ie(InformationElement::from_u32(IeType::Format, 0)),
    );
    let result = dialog
        .process_frame(&mut rig.core, &reject, rig.remote_addr)
        .await
        .expect("process");
    assert_eq!(result, DialogResult::Destroy);
    rig.recv_frame().await; // the ACK still goes out
    assert_eq!(dialog.state(), CallState::Down);
}

#[tokio::test]
async fn test_text_command_queues_until_acked() {
    let mut rig = rig_with_caps(format::SLINEAR).await;
    let mut dialog = up_dialog(&mut rig, format::SLINEAR).await;

    let result = dialog
        .process_command(
            &mut rig.core,
            &Command::Text {
                call_num: 3,
                text: "hello".to_string(),
            },
        )
        .await
        .expect("command");
    assert_eq!(result, CommandResult::Success);

    let text = rig.recv_frame().await;
    assert_eq!(text.frame_type, FrameType::Text);
    assert_eq!(text.raw_data, b"hello");
    assert!(!text.retransmission);
    let text_oseq = text.out_seq_num;

    {
        let Dialog::Call(call) = &dialog else {
            unreachable!()
        };
        assert_eq!(call.queued_frames(), 1);
        assert_ne!(call.core.timer_id, 0);
    }

    // an ACK covering the text frame sweeps the queue
    let ack = inbound(
        Frame::iax2(Iax2Subclass::Ack)
            .with_call_nums(6, 3)
            .with_seq_nums(2, text_oseq.wrapping_add(1)),
    );
    let result = dialog
        .process_incoming_frame(&mut rig.core, &ack, rig.remote_addr)
        .await
        .expect("process");
    assert_eq!(result, DialogResult::Success);
    let Dialog::Call(call) = &dialog else {
        unreachable!()
    };
    assert_eq!(call.queued_frames(), 0);
    assert_eq!(call.core.timer_id, 0);
}

#[tokio::test]
async fn test_ack_sweeps_only_covered_frames() {
    let mut rig = rig_with_caps(format::SLINEAR).await;
    let mut dialog = up_dialog(&mut rig, format::SLINEAR).await;

    for text in ["one", "two"] {
        dialog
            .process_command(
                &mut rig.core,
                &Command::Text {
                    call_num: 3,
                    text: text.to_string(),
                },
            )
            .await
            .expect("command");
    }
    let first = rig.recv_frame().await;
    // sending "two" re-sends "one" first, flagged as a retransmission
    let resent = rig.recv_frame().await;
    assert!(resent.retransmission);
    assert_eq!(resent.raw_data, first.raw_data);
    let second = rig.recv_frame().await;
    assert_eq!(second.raw_data, b"two");

    // acknowledge only the first text frame
    let ack = inbound(
        Frame::iax2(Iax2Subclass::Ack)
            .with_call_nums(6, 3)
            .with_seq_nums(2, second.out_seq_num),
    );
    dialog
        .process_incoming_frame(&mut rig.core, &ack, rig.remote_addr)
        .await
        .expect("process");

    let Dialog::Call(call) = &dialog else {
        unreachable!()
    };
    assert_eq!(call.queued_frames(), 1);
    // the survivor goes out again
    let survivor = rig.recv_frame().await;
    assert!(survivor.retransmission);
    assert_eq!(survivor.raw_data, b"two");
}

#[tokio::test]
async fn test_incoming_text_is_acked_and_reported() {
    let mut rig = rig_with_caps(format::SLINEAR).await;
    let mut dialog = up_dialog(&mut rig, format::SLINEAR).await;

    let text = inbound(
        Frame::full(FrameType::Text, 0)
            .with_call_nums(6, 3)
            .with_seq_nums(2, 2)
            .with_raw_data(b"hi there".to_vec()),
    );
    let result = dialog
        .process_incoming_frame(&mut rig.core, &text, rig.remote_addr)
        .await
        .expect("process");
    assert_eq!(result, DialogResult::Success);
    assert_eq!(
        rig.events.try_recv(),
        Ok(Event::Text {
            call_num: 3,
            text: "hi there".to_string()
        })
    );
    let ack = rig.recv_frame().await;
    assert_eq!(ack.iax2_subclass(), Some(Iax2Subclass::Ack));
}

#[tokio::test]
async fn test_incoming_hangup_tears_down() {
    let mut rig = rig_with_caps(format::SLINEAR).await;
    let mut dialog = up_dialog(&mut rig, format::SLINEAR).await;

    let hangup = inbound(
        Frame::iax2(Iax2Subclass::Hangup)
            .with_call_nums(6, 3)
            .with_seq_nums(2, 2),
    );
    let result = dialog
        .process_incoming_frame(&mut rig.core, &hangup, rig.remote_addr)
        .await
        .expect("process");
    assert_eq!(result, DialogResult::Destroy);
    let ack = rig.recv_frame().await;
    assert_eq!(ack.iax2_subclass(), Some(Iax2Subclass::Ack));
    assert_eq!(
        rig.events.try_recv(),
        Ok(Event::CallHangup {
            call_num: 3,
            remote: "127.0.0.1".to_string()
        })
    );
}

#[tokio::test]
async fn test_hangup_command_and_ack() {
    let mut rig = rig_with_caps(format::SLINEAR).await;
    let mut dialog = up_dialog(&mut rig, format::SLINEAR).await;

    let result = dialog
        .process_command(&mut rig.core, &Command::Hangup { call_num: 3 })
        .await
        .expect("command");
    assert_eq!(result, CommandResult::Success);
    let hangup = rig.recv_frame().await;
    assert_eq!(hangup.iax2_subclass(), Some(Iax2Subclass::Hangup));
    {
        let Dialog::Call(call) = &dialog else {
            unreachable!()
        };
        assert_eq!(call.state(), CallState::HangupSent);
    }

    let result = dialog
        .process_incoming_frame(&mut rig.core, &ack_frame(2, 3), rig.remote_addr)
        .await
        .expect("process");
    assert_eq!(result, DialogResult::Destroy);
}

#[tokio::test]
async fn test_video_command_sends_meta_frame() {
    let mut rig = rig_with_caps(format::SLINEAR | format::JPEG).await;
    let mut dialog = up_dialog(&mut rig, format::SLINEAR | format::JPEG).await;

    let result = dialog
        .process_command(
            &mut rig.core,
            &Command::Video {
                call_num: 3,
                data: vec![1, 2, 3],
            },
        )
        .await
        .expect("command");
    assert_eq!(result, CommandResult::Success);

    let video = rig.recv_frame().await;
    // media frames identify by the sender's call number
    assert_eq!(video.source_call_num, 3);
    assert_eq!(video.raw_data, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_incoming_meta_video_emits_event() {
    let mut rig = rig_with_caps(format::SLINEAR).await;
    let mut dialog = up_dialog(&mut rig, format::SLINEAR).await;

    let video = inbound(Frame::meta_video(6, 42, vec![7, 8]));
    let result = dialog
        .process_incoming_frame(&mut rig.core, &video, rig.remote_addr)
        .await
        .expect("process");
    assert_eq!(result, DialogResult::Success);
    assert_eq!(
        rig.events.try_recv(),
        Ok(Event::Video {
            call_num: 3,
            data: vec![7, 8],
            timestamp: 42
        })
    );
}

#[tokio::test]
async fn test_text_command_outside_up_is_unsupported() {
    let mut rig = rig_with_caps(format::SLINEAR).await;
    let mut dialog = CallDialog::new(3, rig.remote_addr);

    let result = dialog
        .process_command(
            &mut rig.core,
            &Command::Text {
                call_num: 3,
                text: "too early".to_string(),
            },
        )
        .await
        .expect("command");
    assert_eq!(result, CommandResult::Unsupported);
}

#[tokio::test]
async fn test_timer_retransmits_new() {
    let mut rig = rig_with_caps(format::SLINEAR).await;
    let mut dialog = CallDialog::new(3, rig.remote_addr);
    dialog.start(&mut rig.core).await.expect("start");
    let first = rig.recv_frame().await;

    rig.core.timers.cancel(dialog.core.timer_id);
    dialog.core.timer_id = 0;
    dialog.timer_callback(&mut rig.core).await.expect("timer");

    let resent = rig.recv_frame().await;
    assert_eq!(resent.iax2_subclass(), Some(Iax2Subclass::New));
    assert!(resent.retransmission);
    assert_eq!(resent.out_seq_num, first.out_seq_num);
    assert!(rig.core.timers.contains(dialog.core.timer_id));
}
