//! mDNS responder packet handling
//!
//! Answers IPv4 address queries for `<hostname>.local` so browsers on the
//! local network can reach the device by name. Only the pieces needed for
//! that are implemented: question parsing (with name compression) and a
//! single A record answer. Service discovery, probing and IPv6 records are
//! not.

use log::debug;

/// UDP port mDNS traffic uses
pub const MDNS_PORT: u16 = 5353;

/// IPv4 multicast group of mDNS
pub const MDNS_GROUP: [u8; 4] = [224, 0, 0, 251];

/// TTL of the A record we hand out, in seconds
pub const RECORD_TTL_SECS: u32 = 120;

const HEADER_LEN: usize = 12;
const TYPE_A: u16 = 1;
const TYPE_ANY: u16 = 255;
const CLASS_IN: u16 = 1;
/// Top bit of the class: unicast-response in questions, cache-flush in answers
const CLASS_FLAG: u16 = 0x8000;
const FLAGS_QR: u16 = 0x8000;
const FLAGS_OPCODE: u16 = 0x7800;
const RESPONSE_FLAGS: u16 = 0x8400;
const MAX_POINTER_JUMPS: usize = 8;
const MAX_LABEL_LEN: usize = 63;

fn read_u16(packet: &[u8], pos: usize) -> Option<u16> {
    let bytes = packet.get(pos..pos + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Walk the name at `start`, comparing it label by label against `expected`.
///
/// Returns whether it matched (ASCII case-insensitively) and the offset just
/// past the name in the packet. `None` if the name is malformed.
fn match_name(packet: &[u8], start: usize, expected: &[&str]) -> Option<(bool, usize)> {
    let mut pos = start;
    let mut end = None;
    let mut jumps = 0;
    let mut label_index = 0;
    let mut matched = true;

    loop {
        let len = *packet.get(pos)?;
        match len & 0xC0 {
            0x00 if len == 0 => {
                let end = end.unwrap_or(pos + 1);
                return Some((matched && label_index == expected.len(), end));
            }
            0x00 => {
                let len = usize::from(len);
                let label = packet.get(pos + 1..pos + 1 + len)?;
                matched &= expected
                    .get(label_index)
                    .is_some_and(|e| e.as_bytes().eq_ignore_ascii_case(label));
                label_index += 1;
                pos += 1 + len;
            }
            0xC0 => {
                let low = *packet.get(pos + 1)?;
                if end.is_none() {
                    end = Some(pos + 2);
                }
                jumps += 1;
                if jumps > MAX_POINTER_JUMPS {
                    return None;
                }
                pos = (usize::from(len & 0x3F) << 8) | usize::from(low);
            }
            _ => return None,
        }
    }
}

/// Whether any question in `query` asks for the A record of `hostname.local`.
fn asks_for(query: &[u8], hostname: &str) -> Option<bool> {
    let flags = read_u16(query, 2)?;
    if flags & (FLAGS_QR | FLAGS_OPCODE) != 0 {
        // Responses from other hosts, or not a standard query.
        return Some(false);
    }

    let questions = read_u16(query, 4)?;
    let expected = [hostname, "local"];
    let mut pos = HEADER_LEN;
    let mut found = false;
    for _ in 0..questions {
        let (name_matches, after) = match_name(query, pos, &expected)?;
        let qtype = read_u16(query, after)?;
        let qclass = read_u16(query, after + 2)? & !CLASS_FLAG;
        pos = after + 4;

        found |= name_matches && (qtype == TYPE_A || qtype == TYPE_ANY) && qclass == CLASS_IN;
    }
    Some(found)
}

/// Build the answer to `query` into `out`.
///
/// Returns the length of the response if `query` asks for `hostname.local`,
/// `None` if it is not for us, is malformed or `out` is too small.
pub fn answer(query: &[u8], hostname: &str, address: [u8; 4], out: &mut [u8]) -> Option<usize> {
    match asks_for(query, hostname) {
        Some(true) => {}
        Some(false) => return None,
        None => {
            debug!("Ignoring malformed mDNS packet ({} bytes)", query.len());
            return None;
        }
    }
    if hostname.is_empty() || hostname.len() > MAX_LABEL_LEN {
        return None;
    }

    let name_len = 1 + hostname.len() + 1 + "local".len() + 1;
    let total = HEADER_LEN + name_len + 10 + address.len();
    let out = out.get_mut(..total)?;

    // Header: echo the id, one answer, nothing else.
    out[..2].copy_from_slice(&query[..2]);
    out[2..4].copy_from_slice(&RESPONSE_FLAGS.to_be_bytes());
    out[4..6].copy_from_slice(&0u16.to_be_bytes());
    out[6..8].copy_from_slice(&1u16.to_be_bytes());
    out[8..12].fill(0);

    let mut pos = HEADER_LEN;
    for label in [hostname, "local"] {
        out[pos] = label.len() as u8;
        out[pos + 1..pos + 1 + label.len()].copy_from_slice(label.as_bytes());
        pos += 1 + label.len();
    }
    out[pos] = 0;
    pos += 1;

    out[pos..pos + 2].copy_from_slice(&TYPE_A.to_be_bytes());
    out[pos + 2..pos + 4].copy_from_slice(&(CLASS_IN | CLASS_FLAG).to_be_bytes());
    out[pos + 4..pos + 8].copy_from_slice(&RECORD_TTL_SECS.to_be_bytes());
    out[pos + 8..pos + 10].copy_from_slice(&(address.len() as u16).to_be_bytes());
    out[pos + 10..pos + 14].copy_from_slice(&address);

    Some(total)
}
