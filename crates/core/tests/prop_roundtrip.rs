use framelink_core::{
    frame::{Frame, END_FLAG, MAX_PAYLOAD, START_FLAG},
    hamming::{self, Correction},
    reassembly::StreamReassembler,
    segment::{segment, MessageAssembler},
    stuffing::{self, is_reserved, ESCAPE},
};
use proptest::prelude::*;

fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD)
}

proptest! {
    #[test]
    fn prop_frame_roundtrip(payload in payload_strategy(), total in 1u8..=255, seq in 1u8..=255) {
        let frame = Frame::new(total, seq, payload).unwrap();
        let parsed = Frame::deserialize(&frame.serialize()).unwrap();

        prop_assert!(parsed.is_valid());
        prop_assert_eq!(parsed, frame);
    }

    #[test]
    fn prop_stuffing_invertible(body in prop::collection::vec(any::<u8>(), 0..256)) {
        let mut bytes = vec![START_FLAG];
        bytes.extend_from_slice(&body);
        bytes.push(END_FLAG);

        let stuffed = stuffing::stuff(&bytes);
        prop_assert_eq!(stuffing::unstuff(&stuffed).unwrap(), bytes);

        // Only escape sequences may carry a reserved byte inside the frame.
        let interior = &stuffed[1..stuffed.len() - 1];
        let mut i = 0;
        while i < interior.len() {
            if interior[i] == ESCAPE {
                prop_assert!(i + 1 < interior.len());
                prop_assert!(!is_reserved(interior[i + 1]));
                i += 2;
            } else {
                prop_assert!(!is_reserved(interior[i]));
                i += 1;
            }
        }
    }

    #[test]
    fn prop_segment_reassemble(
        message in prop::collection::vec(any::<u8>(), 0..600),
        split in 1usize..40,
    ) {
        let stream: Vec<u8> = segment(&message)
            .unwrap()
            .iter()
            .flat_map(|f| stuffing::stuff(&f.serialize()))
            .collect();

        let mut reassembler = StreamReassembler::new();
        let mut assembler = MessageAssembler::new();
        let mut result = None;

        for chunk in stream.chunks(split) {
            // A chunk only starts with a start flag at a frame boundary, where the buffer is empty.
            for stuffed in reassembler.push(chunk).frames {
                let frame = Frame::deserialize(&stuffing::unstuff(&stuffed).unwrap()).unwrap();
                if let Some(m) = assembler.push(&frame).message {
                    result = Some(m);
                }
            }
        }

        prop_assert_eq!(result, Some(message));
    }

    #[test]
    fn prop_fec_verifies(payload in payload_strategy()) {
        let fcs = hamming::calculate_control_bits(&payload);
        prop_assert_eq!(fcs.len(), hamming::fcs_len(payload.len()));
        prop_assert!(hamming::verify(&payload, &fcs));
    }

    #[test]
    fn prop_fec_single_flip_corrected(
        payload in prop::collection::vec(any::<u8>(), 1..=MAX_PAYLOAD),
        bit in any::<prop::sample::Index>(),
    ) {
        let fcs = hamming::calculate_control_bits(&payload);
        let bit = bit.index(payload.len() * 8);

        let mut received = payload.clone();
        received[bit / 8] ^= 0x80 >> (bit % 8);

        let outcome = hamming::correct(&mut received, &fcs).unwrap();
        prop_assert_eq!(outcome, Correction::Corrected { position: bit + 1 });
        prop_assert_eq!(received, payload);
    }

    #[test]
    fn prop_fec_double_flip_detected(
        payload in prop::collection::vec(any::<u8>(), 1..=MAX_PAYLOAD),
        a in any::<prop::sample::Index>(),
        b in any::<prop::sample::Index>(),
    ) {
        let bits = payload.len() * 8;
        let (a, b) = (a.index(bits), b.index(bits));
        prop_assume!(a != b);

        let fcs = hamming::calculate_control_bits(&payload);
        let mut received = payload.clone();
        received[a / 8] ^= 0x80 >> (a % 8);
        received[b / 8] ^= 0x80 >> (b % 8);
        let corrupted = received.clone();

        let outcome = hamming::correct(&mut received, &fcs).unwrap();
        prop_assert_eq!(outcome.code(), 2);
        prop_assert_eq!(received, corrupted);
    }
}
