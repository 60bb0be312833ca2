//! Round-trip properties of the header and frame codecs

use bytes::Bytes;
use codec::{decode_frame, encode_frame, Encoding, HeaderCodec, FIXED_HEADER_SIZE};
use proptest::prelude::*;
use types::{Message, MessageHeader, QosLevel, SduType, SessionType, Uri};

fn uri() -> impl Strategy<Value = Uri> {
    (
        "[a-z]{2,6}",
        "[a-z0-9.]{1,12}",
        prop_oneof!["[0-9]{1,5}", "[a-f0-9]{8}"],
        "[a-z]{0,10}(@[a-z]{1,4})?",
    )
        .prop_map(|(scheme, host, port, service)| {
            Uri::from(format!("{scheme}://{host}:{port}/{service}"))
        })
}

fn qos() -> impl Strategy<Value = QosLevel> {
    prop_oneof![
        Just(QosLevel::BestEffort),
        Just(QosLevel::Assured),
        Just(QosLevel::Queued),
        Just(QosLevel::Timely),
    ]
}

fn session() -> impl Strategy<Value = SessionType> {
    prop_oneof![
        Just(SessionType::Live),
        Just(SessionType::Simulation),
        Just(SessionType::Replay),
    ]
}

prop_compose! {
    fn header()(
        fixed in (
            0u8..=SduType::MAX_CODE,
            any::<(u16, u16, u16, u8)>(),
            any::<bool>(),
            qos(),
            session(),
            any::<u64>(),
            any::<u8>(),
        ),
        optional in (
            proptest::option::of(uri()),
            proptest::option::of(uri()),
            proptest::option::of(any::<u32>()),
            proptest::option::of(any::<u64>()),
            proptest::option::of("[A-Za-z ]{0,16}"),
            proptest::option::of("\\PC{0,12}"),
            proptest::option::of(proptest::collection::vec("[a-z]{1,8}", 0..5)),
            proptest::option::of(proptest::collection::vec(any::<u8>(), 0..32)),
        ),
    ) -> MessageHeader {
        let (sdu, (area, svc, op, version), is_error, qos, session, transaction_id, encoding_id) =
            fixed;
        let (from, to, priority, timestamp, network_zone, session_name, domain, auth) = optional;

        let mut header = MessageHeader::new(SduType::from_code(sdu).unwrap())
            .with_service(area, svc, op, version)
            .with_transaction_id(transaction_id)
            .with_encoding(encoding_id)
            .with_qos(qos);
        header.is_error = is_error;
        header.session = session;
        header.from = from;
        header.to = to;
        header.priority = priority;
        header.timestamp = timestamp;
        header.network_zone = network_zone;
        header.session_name = session_name;
        header.domain = domain;
        header.authentication_id = auth.map(Bytes::from);
        header
    }
}

proptest! {
    #[test]
    fn header_roundtrip(header in header()) {
        let bytes = HeaderCodec::encode(&header).unwrap();
        let (decoded, consumed) = HeaderCodec::decode(&bytes).unwrap();
        prop_assert_eq!(decoded, header);
        prop_assert_eq!(consumed, bytes.len());
        prop_assert!(consumed >= FIXED_HEADER_SIZE);
    }

    #[test]
    fn frame_roundtrip(
        mut header in header(),
        body in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 0..6),
    ) {
        header.encoding_id = Encoding::Elements.id();
        let message = Message::new(header, body.into_iter().map(Bytes::from).collect());

        let frame = encode_frame(&message).unwrap();
        prop_assert_eq!(
            HeaderCodec::variable_length(&frame).unwrap(),
            frame.len() - FIXED_HEADER_SIZE
        );
        prop_assert_eq!(decode_frame(frame).unwrap(), message);
    }

    #[test]
    fn truncated_frames_never_decode(header in header(), cut in 1usize..64) {
        let mut header = header;
        header.encoding_id = Encoding::Elements.id();
        let message = Message::new(header, vec![Bytes::from_static(b"payload")]);
        let frame = encode_frame(&message).unwrap();
        let keep = frame.len().saturating_sub(cut);
        prop_assert!(decode_frame(frame.slice(..keep)).is_err());
    }
}
