//! TCG event-log filter: parses a raw UEFI/IMA event log (1.2
//! "SHA-1-only" or 2.0 "crypto-agile") and re-emits a byte-identical subset
//! containing only the PCR indices and hash algorithms a caller selected.

use crate::error::{Result, TpmError};
use byteorder_shim::{read_u32_le, write_u32_le};
use ta_core::{HashAlg, PcrSelection};

const HEADER_PCR: u32 = 0;
const HEADER_TYPE: u32 = 3; // NO_ACTION
const SHA1_DIGEST_SIZE: usize = 20;
const MAX_EVENT_SIZE: usize = 32 * 1024;
const MAX_PCR_INDEX: u32 = 23;
const MAX_DIGEST_COUNT: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Crypto2_0,
    Sha1Only1_2,
}

/// Filter `log` down to events matching `selection`, preserving the header
/// event verbatim. Returns a byte-identical subset of the original events.
pub fn filter_event_log(log: &[u8], selection: &PcrSelection) -> Result<Vec<u8>> {
    let (format, header_len) = detect_header(log)?;
    let mut out = log[..header_len].to_vec();

    let mut cursor = header_len;
    while cursor < log.len() {
        let (event_bytes, consumed) = match format {
            LogFormat::Crypto2_0 => parse_and_filter_2_0(&log[cursor..], selection)?,
            LogFormat::Sha1Only1_2 => parse_and_filter_1_2(&log[cursor..], selection)?,
        };
        if let Some(bytes) = event_bytes {
            out.extend_from_slice(&bytes);
        }
        cursor += consumed;
    }

    Ok(out)
}

fn detect_header(log: &[u8]) -> Result<(LogFormat, usize)> {
    if log.len() < 12 {
        return Err(TpmError::EventLog("log shorter than a header prefix".into()));
    }
    let pcr = read_u32_le(&log[0..4]);
    let event_type = read_u32_le(&log[4..8]);
    if pcr != HEADER_PCR || event_type != HEADER_TYPE {
        return Err(TpmError::EventLog(format!(
            "header event must be pcr=0 type=3 (NO_ACTION), got pcr={pcr} type={event_type}"
        )));
    }
    if log.len() < 12 + SHA1_DIGEST_SIZE + 4 {
        return Err(TpmError::EventLog("log truncated before header event size".into()));
    }
    let digest_end = 8 + SHA1_DIGEST_SIZE;
    let event_size = read_u32_le(&log[digest_end..digest_end + 4]) as usize;
    let event_start = digest_end + 4;
    let min_len = "Spec ID Event03".len().min("StartupLocality".len());
    let max_len = 4 + 2 * 4 + 4 * (2 + 64) + 1 + 255; // generous TCG_EfiSpecIDEvent bound
    if event_size < min_len || event_size > max_len {
        return Err(TpmError::EventLog(format!(
            "header event size {event_size} outside expected bounds"
        )));
    }
    let event_end = event_start
        .checked_add(event_size)
        .filter(|&end| end <= log.len())
        .ok_or_else(|| TpmError::EventLog("header event_size overruns log buffer".to_string()))?;
    let event_str = &log[event_start..event_end];

    if event_str.starts_with(b"Spec ID Event03") {
        Ok((LogFormat::Crypto2_0, event_end))
    } else if event_str.starts_with(b"StartupLocality") {
        Ok((LogFormat::Sha1Only1_2, event_end))
    } else {
        Err(TpmError::EventLog(
            "unrecognized header event string (expected TCG 1.2 or 2.0 spec marker)".to_string(),
        ))
    }
}

fn parse_and_filter_2_0(buf: &[u8], selection: &PcrSelection) -> Result<(Option<Vec<u8>>, usize)> {
    if buf.len() < 12 {
        return Err(TpmError::EventLog("truncated 2.0 event record header".into()));
    }
    let pcr = read_u32_le(&buf[0..4]);
    let event_type = read_u32_le(&buf[4..8]);
    let digest_count = read_u32_le(&buf[8..12]);
    if pcr > MAX_PCR_INDEX {
        return Err(TpmError::EventLog(format!("PCR index {pcr} out of range")));
    }
    if digest_count > MAX_DIGEST_COUNT {
        return Err(TpmError::EventLog(format!(
            "digest_count {digest_count} exceeds maximum of {MAX_DIGEST_COUNT}"
        )));
    }

    let mut cursor = 12;
    let mut digests = Vec::with_capacity(digest_count as usize);
    for _ in 0..digest_count {
        if buf.len() < cursor + 2 {
            return Err(TpmError::EventLog("truncated digest algId".into()));
        }
        let alg_id = u16::from_le_bytes([buf[cursor], buf[cursor + 1]]);
        cursor += 2;
        let alg = HashAlg::from_tcg_alg_id(alg_id)
            .ok_or_else(|| TpmError::EventLog(format!("unknown algId {alg_id:#x}")))?;
        let size = alg.digest_size();
        if buf.len() < cursor + size {
            return Err(TpmError::EventLog("truncated digest value".into()));
        }
        digests.push((alg_id, alg, buf[cursor..cursor + size].to_vec()));
        cursor += size;
    }

    if buf.len() < cursor + 4 {
        return Err(TpmError::EventLog("truncated event_size".into()));
    }
    let event_size = read_u32_le(&buf[cursor..cursor + 4]) as usize;
    cursor += 4;
    if event_size > MAX_EVENT_SIZE || buf.len() < cursor + event_size {
        return Err(TpmError::EventLog(format!(
            "event_size {event_size} out of bounds"
        )));
    }
    let event_bytes = &buf[cursor..cursor + event_size];
    let total_consumed = cursor + event_size;

    let pcr_u8 = pcr as u8;
    let kept_digests: Vec<&(u16, HashAlg, Vec<u8>)> = digests
        .iter()
        .filter(|(_, alg, _)| selection.contains(*alg, pcr_u8))
        .collect();

    if kept_digests.is_empty() {
        return Ok((None, total_consumed));
    }

    let mut record = Vec::new();
    write_u32_le(&mut record, pcr);
    write_u32_le(&mut record, event_type);
    write_u32_le(&mut record, kept_digests.len() as u32);
    for (alg_id, _, digest) in &kept_digests {
        record.extend_from_slice(&alg_id.to_le_bytes());
        record.extend_from_slice(digest);
    }
    write_u32_le(&mut record, event_size as u32);
    record.extend_from_slice(event_bytes);

    Ok((Some(record), total_consumed))
}

fn parse_and_filter_1_2(buf: &[u8], selection: &PcrSelection) -> Result<(Option<Vec<u8>>, usize)> {
    if buf.len() < 8 + SHA1_DIGEST_SIZE + 4 {
        return Err(TpmError::EventLog("truncated 1.2 event record".into()));
    }
    let pcr = read_u32_le(&buf[0..4]);
    let event_type = read_u32_le(&buf[4..8]);
    if pcr > MAX_PCR_INDEX {
        return Err(TpmError::EventLog(format!("PCR index {pcr} out of range")));
    }
    let digest_start = 8;
    let digest_end = digest_start + SHA1_DIGEST_SIZE;
    let digest = &buf[digest_start..digest_end];
    let event_size = read_u32_le(&buf[digest_end..digest_end + 4]) as usize;
    let event_start = digest_end + 4;
    if event_size > MAX_EVENT_SIZE || buf.len() < event_start + event_size {
        return Err(TpmError::EventLog(format!(
            "event_size {event_size} out of bounds"
        )));
    }
    let total_consumed = event_start + event_size;

    if !selection.contains(HashAlg::Sha1, pcr as u8) {
        return Ok((None, total_consumed));
    }

    let mut record = Vec::with_capacity(total_consumed);
    record.extend_from_slice(&buf[0..event_start]);
    let _ = digest; // already included verbatim via the slice copy above
    record.extend_from_slice(&buf[event_start..total_consumed]);
    Ok((Some(record), total_consumed))
}

/// Tiny local stand-in for a `byteorder` dependency: the only two
/// operations this module needs are fixed-width little-endian u32
/// read/write, which don't justify pulling in the crate.
mod byteorder_shim {
    pub fn read_u32_le(bytes: &[u8]) -> u32 {
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn write_u32_le(out: &mut Vec<u8>, value: u32) {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn header_2_0() -> Vec<u8> {
        let mut h = Vec::new();
        write_u32_le(&mut h, 0); // pcr
        write_u32_le(&mut h, 3); // NO_ACTION
        h.extend_from_slice(&[0u8; SHA1_DIGEST_SIZE]);
        let spec_str = b"Spec ID Event03";
        write_u32_le(&mut h, spec_str.len() as u32);
        h.extend_from_slice(spec_str);
        h
    }

    fn event_2_0(pcr: u32, digests: &[(u16, Vec<u8>)], event: &[u8]) -> Vec<u8> {
        let mut e = Vec::new();
        write_u32_le(&mut e, pcr);
        write_u32_le(&mut e, 1); // arbitrary event type
        write_u32_le(&mut e, digests.len() as u32);
        for (alg_id, digest) in digests {
            e.extend_from_slice(&alg_id.to_le_bytes());
            e.extend_from_slice(digest);
        }
        write_u32_le(&mut e, event.len() as u32);
        e.extend_from_slice(event);
        e
    }

    fn selection(alg: HashAlg, pcrs: &[u8]) -> PcrSelection {
        let set: BTreeSet<u8> = pcrs.iter().copied().collect();
        PcrSelection::from_banks(vec![(alg, set)])
    }

    #[test]
    fn filters_by_pcr_and_algorithm() {
        let mut log = header_2_0();
        log.extend(event_2_0(
            1,
            &[(0xB, vec![1u8; 32]), (0xC, vec![2u8; 48])],
            b"event-1",
        ));
        log.extend(event_2_0(2, &[(0xB, vec![3u8; 32])], b"event-2"));

        let sel = selection(HashAlg::Sha256, &[1]);
        let out = filter_event_log(&log, &sel).unwrap();

        // header preserved verbatim
        assert_eq!(&out[..header_2_0().len()], &header_2_0()[..]);
        // only event-1's SHA-256 digest survives; event-2 (PCR 2) dropped
        let needle = b"event-1";
        assert!(out.windows(needle.len()).any(|w| w == needle));
        let absent = b"event-2";
        assert!(!out.windows(absent.len()).any(|w| w == absent));
    }

    #[test]
    fn idempotent_under_repeated_filtering() {
        let mut log = header_2_0();
        log.extend(event_2_0(1, &[(0xB, vec![1u8; 32])], b"event-1"));
        log.extend(event_2_0(7, &[(0x4, vec![9u8; 20])], b"event-2"));

        let sel = selection(HashAlg::Sha256, &[1, 3, 7]);
        let once = filter_event_log(&log, &sel).unwrap();
        let twice = filter_event_log(&once, &sel).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn rejects_unrecognized_header() {
        let mut bad = Vec::new();
        write_u32_le(&mut bad, 0);
        write_u32_le(&mut bad, 3);
        bad.extend_from_slice(&[0u8; SHA1_DIGEST_SIZE]);
        let marker = b"NotAKnownMarker!";
        write_u32_le(&mut bad, marker.len() as u32);
        bad.extend_from_slice(marker);

        assert!(filter_event_log(&bad, &selection(HashAlg::Sha256, &[0])).is_err());
    }

    #[test]
    fn sha1_only_1_2_format_keeps_only_sha1_selected_pcrs() {
        let mut log = Vec::new();
        write_u32_le(&mut log, 0);
        write_u32_le(&mut log, 3);
        log.extend_from_slice(&[0u8; SHA1_DIGEST_SIZE]);
        let spec_str = b"StartupLocality";
        write_u32_le(&mut log, spec_str.len() as u32);
        log.extend_from_slice(spec_str);

        // one event at PCR 4
        write_u32_le(&mut log, 4);
        write_u32_le(&mut log, 1);
        log.extend_from_slice(&[7u8; SHA1_DIGEST_SIZE]);
        write_u32_le(&mut log, 5);
        log.extend_from_slice(b"hello");

        let sel = selection(HashAlg::Sha1, &[4]);
        let out = filter_event_log(&log, &sel).unwrap();
        assert!(out.len() > spec_str.len());

        let sel_miss = selection(HashAlg::Sha1, &[5]);
        let out_miss = filter_event_log(&log, &sel_miss).unwrap();
        // header only, event dropped
        assert_eq!(out_miss.len(), log.len() - (8 + SHA1_DIGEST_SIZE + 4 + 5));
    }
}
