use biu_sdlc::protocol::{
    from_hex, to_hex, CodecError, FrameAssembler, FrameCodec, Identifier, ProtocolError,
    RequestEncoder, ResponseDecoder,
};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;

/// Frames captured from a field device
const CAPTURED: [&str; 6] = [
    "024218091a0c393add7d2203",
    "0213004B2F03",
    "024300000000000000000022EC03",
    "02117D230000000000000068DA03",
    "024100000000220109CA8303",
    "02110000000000000000A0AF03",
];

#[test]
fn test_captured_frames_reencode_to_themselves() {
    for hex in CAPTURED {
        let wire = from_hex(hex).unwrap();
        let mut buf = wire.clone();
        let decoded = FrameCodec::decode(&mut buf).unwrap().to_vec();

        let mut out = [0u8; 64];
        out[..decoded.len()].copy_from_slice(&decoded);
        let encoded = FrameCodec::encode(&mut out, decoded.len() - 3).unwrap();
        assert_eq!(to_hex(encoded), hex.to_lowercase(), "{hex}");
    }
}

#[test]
fn test_date_time_stream() {
    let mut decoder = ResponseDecoder::new();
    decoder.init_from_hex("024218091a0c393add7d2203").unwrap();

    assert_eq!(decoder.identifier(), Identifier::DateTimeStream);
    let expected = NaiveDate::from_ymd_opt(2024, 9, 26)
        .unwrap()
        .and_hms_opt(12, 57, 58)
        .unwrap();
    assert_eq!(decoder.date_time().unwrap(), expected);
}

#[test]
fn test_invalid_calendar_date_rejected() {
    // Month 13, built through the codec so the CRC is valid
    let mut buf = [0u8; 32];
    let frame = [0x02, 0x42, 0x18, 0x0D, 0x01, 0x00, 0x00, 0x00];
    buf[..frame.len()].copy_from_slice(&frame);
    let wire = FrameCodec::encode(&mut buf, frame.len()).unwrap().to_vec();

    let mut decoder = ResponseDecoder::new();
    decoder.init(&wire).unwrap();
    assert!(matches!(
        decoder.date_time(),
        Err(ProtocolError::InvalidDateTime { month: 13, .. })
    ));
}

#[test]
fn test_stream_of_frames_through_assembler_and_decoder() {
    let mut wire = vec![0x00, 0xFF];
    for hex in CAPTURED {
        wire.extend(from_hex(hex).unwrap());
    }

    let mut assembler = FrameAssembler::new();
    let mut decoder = ResponseDecoder::new();
    let mut identifiers = Vec::new();

    // Feed in awkward 5-byte chunks
    for chunk in wire.chunks(5) {
        assembler.push(chunk).unwrap();
        while let Some(frame) = assembler.pop() {
            decoder.init(frame).unwrap();
            identifiers.push(decoder.identifier());
        }
    }

    assert_eq!(
        identifiers,
        vec![
            Identifier::DateTimeStream,
            Identifier::BiuDiagnosticRequest,
            Identifier::BiuDiagnosticResponse,
            Identifier::SendDetectData,
            Identifier::CmuFrameStream,
            Identifier::SendDetectData,
        ]
    );
}

#[test]
fn test_request_encoder_frames_decode() {
    let mut encoder = RequestEncoder::new();
    let mut decoder = ResponseDecoder::new();

    decoder.init(encoder.ts2_detect(3).unwrap()).unwrap();
    assert_eq!(decoder.identifier(), Identifier::SendDetectData);
    assert_eq!(decoder.data_len(), 8);
    assert_eq!(decoder.frame()[2], 0x03);

    decoder.init(encoder.sdlc_diagnostics(1).unwrap()).unwrap();
    assert_eq!(decoder.identifier(), Identifier::SdlcDiagnosticRequest);
    assert_eq!(decoder.acknowledge().unwrap(), 1);
}

#[test]
fn test_corrupted_frame_rejected() {
    let mut decoder = ResponseDecoder::new();
    let err = decoder.init_from_hex("0213014B2F03").unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::Codec(CodecError::CrcCheck { .. })
    ));
}

#[test]
fn test_protocol_error_display() {
    let err = ProtocolError::from(CodecError::InvalidStartMarker);
    assert_eq!(err.to_string(), "Codec error: SDLC invalid start marker");
    assert_eq!(ProtocolError::NotConnected.to_string(), "Not connected to device");
}
