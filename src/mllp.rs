/*
 * rumtk attempts to implement HL7 and medical protocols for interoperability in medicine.
 * This toolkit aims to be reliable, simple, performant, and standards compliant.
 * Copyright (C) 2025  Luis M. Santos, M.D.
 *
 * This library is free software; you can redistribute it and/or
 * modify it under the terms of the GNU Lesser General Public
 * License as published by the Free Software Foundation; either
 * version 2.1 of the License, or (at your option) any later version.
 *
 * This library is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
 * Lesser General Public License for more details.
 *
 * You should have received a copy of the GNU Lesser General Public
 * License along with this library; if not, write to the Free Software
 * Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA  02110-1301  USA
 */

///
/// Minimal Lower Layer Protocol (MLLP) framing.
///
/// A frame is `<VT> payload <FS><CR>` where the payload is one or more HL7 segments
/// joined by a bare `<CR>`, with a trailing `<CR>` after the final segment. MLLP carries
/// no length prefix; a receiver must scan byte-by-byte for the block delimiters.
///
pub mod mllp_codec {
    use crate::error::error::{AppError, AppResult};
    use compact_str::format_compact;

    pub const VT: u8 = 0x0b;
    pub const FS: u8 = 0x1c;
    pub const CR: u8 = 0x0d;

    ///
    /// Encodes a list of HL7 segments into one MLLP frame:
    /// `VT segment_1 CR segment_2 CR ... segment_N CR FS CR`.
    ///
    pub fn to_mllp(segments: &[impl AsRef<str>]) -> Vec<u8> {
        let mut out = Vec::with_capacity(segments.iter().map(|s| s.as_ref().len() + 1).sum::<usize>() + 3);
        out.push(VT);
        for segment in segments {
            out.extend_from_slice(segment.as_ref().as_bytes());
            out.push(CR);
        }
        out.push(FS);
        out.push(CR);
        out
    }

    /// One fully-framed message: its segments, already split on the interior `CR`s.
    pub type DecodedMessage = Vec<String>;

    ///
    /// Scans `buffer` for complete MLLP frames starting at its front. Returns every
    /// complete message found plus the unconsumed tail (a partial frame, or empty if the
    /// buffer ended exactly on a frame boundary).
    ///
    /// A buffer that does not begin with `VT` at the scan cursor is a framing error: the
    /// only recoverable state from there is "await next VT", so the scanner drops bytes up
    /// to (but not including) the next `VT` and keeps going, matching the decoder contract
    /// in the protocol description above.
    ///
    pub fn from_mllp(buffer: &[u8]) -> AppResult<(Vec<DecodedMessage>, Vec<u8>)> {
        let mut messages = Vec::new();
        let mut cursor = 0usize;
        let len = buffer.len();

        loop {
            while cursor < len && buffer[cursor] != VT {
                cursor += 1;
            }
            if cursor >= len {
                return Ok((messages, Vec::new()));
            }

            let body_start = cursor + 1;
            let fs_pos = match buffer[body_start..].iter().position(|&b| b == FS) {
                Some(p) => body_start + p,
                None => return Ok((messages, buffer[cursor..].to_vec())),
            };

            if fs_pos + 1 >= len {
                // Saw FS but the trailing CR has not arrived yet.
                return Ok((messages, buffer[cursor..].to_vec()));
            }
            if buffer[fs_pos + 1] != CR {
                return Err(AppError::Framing(format_compact!(
                    "expected CR immediately after FS at offset {}",
                    fs_pos + 1
                )));
            }

            let payload = &buffer[body_start..fs_pos];
            let text = String::from_utf8_lossy(payload);
            let segments: Vec<String> = text
                .split(CR as char)
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect();
            messages.push(segments);
            cursor = fs_pos + 2;
        }
    }

    ///
    /// Builds the two-segment ACK sent after every processed inbound message, regardless
    /// of whether handling succeeded.
    ///
    pub fn build_ack(now_hl7_timestamp: &str) -> Vec<String> {
        vec![
            format_compact!("MSH|^~\\&|||||{now_hl7_timestamp}||ACK|||2.5").to_string(),
            "MSA|AA".to_string(),
        ]
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_round_trip_single_message() {
            let segments = vec![
                "MSH|^~\\&|SIMULATION|SOUTH RIVERSIDE|||20240102135300||ADT^A01|||2.5".to_string(),
                "PID|1||497030||ROSCOE DOHERTY||19870515|M".to_string(),
            ];
            let framed = to_mllp(&segments);
            let (decoded, tail) = from_mllp(&framed).expect("decode should succeed");
            assert_eq!(decoded.len(), 1, "Expected exactly one decoded message");
            assert_eq!(decoded[0], segments, "Round trip changed the segment list");
            assert!(tail.is_empty(), "Expected no unconsumed tail on a clean frame");
        }

        #[test]
        fn test_byte_by_byte_split_yields_one_message_at_the_end() {
            let segments = vec!["MSH|a".to_string()];
            let framed = to_mllp(&segments);
            let mut acc: Vec<u8> = Vec::new();
            for (i, byte) in framed.iter().enumerate() {
                acc.push(*byte);
                let (decoded, _tail) = from_mllp(&acc).expect("partial decode should not error");
                if i + 1 < framed.len() {
                    assert!(decoded.is_empty(), "Decoded a message before the frame was complete");
                } else {
                    assert_eq!(decoded.len(), 1, "Expected exactly one message after the final byte");
                }
            }
        }

        #[test]
        fn test_split_across_two_buffers() {
            let segments = vec!["MSH|a".to_string(), "PID|1".to_string()];
            let framed = to_mllp(&segments);
            let midpoint = framed.len() / 2;
            let (first_batch, first_tail) = from_mllp(&framed[..midpoint]).unwrap();
            assert!(first_batch.is_empty(), "Should not decode a message from a partial buffer");

            let mut rest = first_tail;
            rest.extend_from_slice(&framed[midpoint..]);
            let (second_batch, tail) = from_mllp(&rest).unwrap();
            assert_eq!(second_batch.len(), 1, "Expected the message once the tail arrives");
            assert_eq!(second_batch[0], segments);
            assert!(tail.is_empty());
        }

        #[test]
        fn test_missing_cr_after_fs_is_a_framing_error() {
            let mut bad = vec![VT];
            bad.extend_from_slice(b"MSH|a");
            bad.push(FS);
            bad.push(b'X');
            let result = from_mllp(&bad);
            assert!(result.is_err(), "Expected a framing error when CR does not follow FS");
        }

        #[test]
        fn test_build_ack_has_two_segments() {
            let ack = build_ack("20240804082600");
            assert_eq!(ack.len(), 2);
            assert!(ack[0].contains("ACK"));
            assert_eq!(ack[1], "MSA|AA");
        }
    }
}
