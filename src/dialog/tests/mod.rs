use crate::event::Event;
use crate::frame::{Direction, Frame};
use crate::peer::formats::preferred_format;
use crate::peer::timer::TimerQueue;
use crate::peer::PeerCore;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

mod test_call;
mod test_lag;

/// Dialog test rig: a real peer core bound on loopback plus a remote
/// socket standing in for the far end, so tests can drive a dialog and
/// inspect exactly what hits the wire.
pub(crate) struct TestRig {
    pub core: PeerCore,
    pub remote: UdpSocket,
    pub remote_addr: SocketAddr,
    pub events: UnboundedReceiver<Event>,
}

pub(crate) async fn rig_with_caps(capabilities: u32) -> TestRig {
    let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.expect("bind"));
    let remote = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
    let remote_addr = remote.local_addr().expect("local_addr");
    let (event_tx, events) = unbounded_channel();

    let core = PeerCore {
        socket,
        timers: TimerQueue::new(),
        event_tx,
        capabilities,
        preferred_format: preferred_format(capabilities),
        reference_time: Instant::now(),
        registrations: HashMap::new(),
    };

    TestRig {
        core,
        remote,
        remote_addr,
        events,
    }
}

pub(crate) async fn rig() -> TestRig {
    rig_with_caps(crate::frame::format::SLINEAR).await
}

impl TestRig {
    /// Receive and parse the next frame the dialog under test sent.
    pub async fn recv_frame(&self) -> Frame {
        let mut buf = [0u8; 4096];
        let (len, _) = tokio::time::timeout(
            Duration::from_secs(1),
            self.remote.recv_from(&mut buf),
        )
        .await
        .expect("timed out waiting for a frame")
        .expect("recv_from");
        Frame::parse(&buf[..len]).expect("sent frame should parse")
    }
}

/// Flip a locally built frame into what the dialog would see off the
/// wire.
pub(crate) fn inbound(mut frame: Frame) -> Frame {
    frame.direction = Direction::Inbound;
    frame
}
