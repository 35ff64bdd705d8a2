use crate::frame::{
    Direction, Frame, FrameType, Iax2Subclass, IeType, InformationElement, IE_MAX_DATALEN,
};

#[test]
fn test_encode_full_frame_wire_layout() {
    let frame = Frame::iax2(Iax2Subclass::RegAck)
        .with_call_nums(3, 5)
        .with_timestamp(1000)
        .with_seq_nums(1, 1)
        .with_ie(InformationElement::from_u16(IeType::Refresh, 10));
    let bytes = frame.encode().expect("encode");

    assert_eq!(
        &bytes[..],
        &[
            0x80, 0x03, // scallno with high bit
            0x00, 0x05, // dcallno, no retransmission
            0x00, 0x00, 0x03, 0xE8, // timestamp
            0x01, 0x01, // oseqno, iseqno
            0x06, 0x0F, // IAX2, REGACK
            0x13, 0x02, 0x00, 0x0A, // REFRESH IE = 10
        ]
    );
}

#[test]
fn test_encode_sets_retransmission_bit() {
    let frame = Frame::iax2(Iax2Subclass::Ack)
        .with_call_nums(1, 2)
        .with_retransmission(true);
    let bytes = frame.encode().expect("encode");
    assert_eq!(bytes[2], 0x80);
    assert_eq!(bytes[3], 0x02);
}

#[test]
fn test_encode_rejects_inbound_frames() {
    let mut frame = Frame::iax2(Iax2Subclass::Ack);
    frame.direction = Direction::Inbound;
    assert!(frame.encode().is_err());
}

#[test]
fn test_full_frame_round_trip() {
    let frame = Frame::iax2(Iax2Subclass::New)
        .with_call_nums(0x1234, 0x0042)
        .with_timestamp(0xDEADBEEF)
        .with_seq_nums(7, 9)
        .with_ie(InformationElement::from_u16(IeType::Version, 2))
        .with_ie(InformationElement::from_u32(IeType::Capability, 0x44))
        .with_ie(InformationElement::from_str(IeType::Username, "bob").unwrap());
    let bytes = frame.encode().expect("encode");
    let mut parsed = Frame::parse(&bytes).expect("parse");

    assert_eq!(parsed.direction, Direction::Inbound);
    parsed.direction = Direction::Outbound;
    assert_eq!(parsed, frame);
    // IE order survives the trip
    assert_eq!(
        parsed.ies.iter().map(|ie| ie.ie_type()).collect::<Vec<_>>(),
        vec![IeType::Version, IeType::Capability, IeType::Username]
    );
}

#[test]
fn test_coded_subclass_round_trip() {
    let mut frame = Frame::full(FrameType::Control, 0x05);
    frame.subclass_coded = true;
    frame.source_call_num = 1;
    let bytes = frame.encode().expect("encode");
    assert_eq!(bytes[11], 0x85);

    let parsed = Frame::parse(&bytes).expect("parse");
    assert!(parsed.subclass_coded);
    assert_eq!(parsed.subclass, 0x05);
}

#[test]
fn test_text_frame_round_trip() {
    let frame = Frame::full(FrameType::Text, 0)
        .with_call_nums(10, 20)
        .with_timestamp(1234)
        .with_seq_nums(2, 3)
        .with_raw_data(b"hello".to_vec());
    let bytes = frame.encode().expect("encode");
    let mut parsed = Frame::parse(&bytes).expect("parse");
    parsed.direction = Direction::Outbound;
    assert_eq!(parsed, frame);
}

#[test]
fn test_mini_frame_round_trip() {
    let frame = Frame::mini(99, 0xBEEF, vec![1, 2, 3, 4]);
    let bytes = frame.encode().expect("encode");
    // high bit of the call number stays clear
    assert_eq!(bytes[0] & 0x80, 0);

    let mut parsed = Frame::parse(&bytes).expect("parse");
    parsed.direction = Direction::Outbound;
    assert_eq!(parsed, frame);
}

#[test]
fn test_meta_video_round_trip() {
    let frame = Frame::meta_video(17, 0x0102, vec![9, 8, 7]);
    let bytes = frame.encode().expect("encode");
    assert_eq!(&bytes[..2], &[0, 0]);
    // media frames carry the sender's call number, high bit set
    assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 17 | 0x8000);

    let mut parsed = Frame::parse(&bytes).expect("parse");
    parsed.direction = Direction::Outbound;
    assert_eq!(parsed, frame);
}

#[test]
fn test_ie_accessors() {
    let frame = Frame::iax2(Iax2Subclass::RegAck)
        .with_ie(InformationElement::from_u16(IeType::Refresh, 60))
        .with_ie(InformationElement::from_u16(IeType::Refresh, 90))
        .with_ie(InformationElement::from_u32(IeType::Format, 0x40));

    // first match wins
    assert_eq!(frame.ie_u16(IeType::Refresh), Some(60));
    assert_eq!(frame.ie_u32(IeType::Format), Some(0x40));
    assert_eq!(frame.ie_str(IeType::Username), None);
}

#[test]
fn test_ie_length_cap() {
    assert!(InformationElement::new(IeType::Username, vec![0; IE_MAX_DATALEN]).is_ok());
    assert!(InformationElement::new(IeType::Username, vec![0; IE_MAX_DATALEN + 1]).is_err());
}
