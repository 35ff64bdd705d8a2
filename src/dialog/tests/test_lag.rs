use super::{inbound, rig};
use crate::dialog::lag::{LagDialog, LagState};
use crate::dialog::{Dialog, DialogResult};
use crate::event::Event;
use crate::frame::{Frame, Iax2Subclass};

#[tokio::test]
async fn test_requester_round_trip() {
    let mut rig = rig().await;
    let mut dialog = LagDialog::new(5, rig.remote_addr);
    dialog.start(&mut rig.core).await.expect("start");
    assert_eq!(dialog.state(), LagState::LagrqSent);

    let lagrq = rig.recv_frame().await;
    assert_eq!(lagrq.iax2_subclass(), Some(Iax2Subclass::LagRq));
    // stamped with milliseconds since the peer's reference time
    assert!(lagrq.timestamp < 1000);

    let mut dialog = Dialog::Lag(dialog);
    let lagrp = inbound(
        Frame::iax2(Iax2Subclass::LagRp)
            .with_call_nums(8, 5)
            .with_seq_nums(0, 1)
            .with_timestamp(lagrq.timestamp),
    );
    let result = dialog
        .process_incoming_frame(&mut rig.core, &lagrp, rig.remote_addr)
        .await
        .expect("process");
    assert_eq!(result, DialogResult::Destroy);

    let ack = rig.recv_frame().await;
    assert_eq!(ack.iax2_subclass(), Some(Iax2Subclass::Ack));
    assert_eq!(ack.timestamp, lagrq.timestamp);
    assert_eq!(ack.dest_call_num, 8);

    match rig.events.try_recv() {
        Ok(Event::Lag { call_num, lag_ms }) => {
            assert_eq!(call_num, 5);
            assert!(lag_ms < 1000);
        }
        other => panic!("expected a lag event, got {:?}", other),
    }

    // the retransmit timer is gone with the dialog
    assert_eq!(dialog.core().timer_id, 0);
}

#[tokio::test]
async fn test_responder_round_trip() {
    let mut rig = rig().await;
    let mut dialog = Dialog::Lag(LagDialog::new(5, rig.remote_addr));

    let lagrq = inbound(
        Frame::iax2(Iax2Subclass::LagRq)
            .with_call_nums(8, 0)
            .with_seq_nums(0, 0)
            .with_timestamp(4242),
    );
    let result = dialog
        .process_incoming_frame(&mut rig.core, &lagrq, rig.remote_addr)
        .await
        .expect("process");
    assert_eq!(result, DialogResult::Success);

    // the reply echoes the request's timestamp
    let lagrp = rig.recv_frame().await;
    assert_eq!(lagrp.iax2_subclass(), Some(Iax2Subclass::LagRp));
    assert_eq!(lagrp.timestamp, 4242);
    assert_eq!(lagrp.dest_call_num, 8);
    {
        let Dialog::Lag(lag) = &dialog else {
            unreachable!()
        };
        assert_eq!(lag.state(), LagState::LagrpSent);
        assert!(rig.core.timers.contains(lag.core.timer_id));
    }

    let ack = inbound(
        Frame::iax2(Iax2Subclass::Ack)
            .with_call_nums(8, 5)
            .with_seq_nums(1, 1),
    );
    let result = dialog
        .process_incoming_frame(&mut rig.core, &ack, rig.remote_addr)
        .await
        .expect("process");
    assert_eq!(result, DialogResult::Destroy);
}

#[tokio::test]
async fn test_responder_retransmits_lagrp() {
    let mut rig = rig().await;
    let mut dialog = LagDialog::new(5, rig.remote_addr);
    let lagrq = inbound(
        Frame::iax2(Iax2Subclass::LagRq)
            .with_call_nums(8, 0)
            .with_seq_nums(0, 0)
            .with_timestamp(4242),
    );
    dialog
        .process_frame(&mut rig.core, &lagrq, rig.remote_addr)
        .await
        .expect("process");
    rig.recv_frame().await;

    rig.core.timers.cancel(dialog.core.timer_id);
    dialog.core.timer_id = 0;
    dialog.timer_callback(&mut rig.core).await.expect("timer");

    let resent = rig.recv_frame().await;
    assert_eq!(resent.iax2_subclass(), Some(Iax2Subclass::LagRp));
    assert!(resent.retransmission);
    assert_eq!(resent.timestamp, 4242);
    assert!(rig.core.timers.contains(dialog.core.timer_id));
}

#[tokio::test]
async fn test_requester_retransmits_lagrq() {
    let mut rig = rig().await;
    let mut dialog = LagDialog::new(5, rig.remote_addr);
    dialog.start(&mut rig.core).await.expect("start");
    let first = rig.recv_frame().await;

    rig.core.timers.cancel(dialog.core.timer_id);
    dialog.core.timer_id = 0;
    dialog.timer_callback(&mut rig.core).await.expect("timer");

    let resent = rig.recv_frame().await;
    assert_eq!(resent.iax2_subclass(), Some(Iax2Subclass::LagRq));
    assert!(resent.retransmission);
    // the retransmission carries the original timestamp
    assert_eq!(resent.timestamp, first.timestamp);
}

#[tokio::test]
async fn test_unexpected_frame_is_invalid() {
    let mut rig = rig().await;
    let mut dialog = LagDialog::new(5, rig.remote_addr);

    let frame = inbound(
        Frame::iax2(Iax2Subclass::LagRp)
            .with_call_nums(8, 0)
            .with_seq_nums(0, 0),
    );
    let result = dialog
        .process_frame(&mut rig.core, &frame, rig.remote_addr)
        .await
        .expect("process");
    assert_eq!(result, DialogResult::Inval);
}
