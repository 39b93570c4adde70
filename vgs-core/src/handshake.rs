//! Startup handshake: fixed-width ASCII control fields followed by the
//! variable-length names.
//!
//! ```text
//! offset width field
//!  0      1    want-file      '0' / '1'
//!  1      1    want-peer      '0' / '1'
//!  2      4    sender-count   decimal
//!  6      4    display-len    decimal
//! 10      4    file-len       decimal
//! 14      4    title-len      decimal
//! 18      4    icon-len       decimal
//! 22      8    buffer-len     decimal, bytes including the CountWord
//! 30      4    mode           decimal
//! 34      2    lci            decimal
//! 36      2    lcf            decimal
//! 38      8    version        ASCII tag
//! 46      8    debug-mask     hexadecimal
//! 54      ..   display | file | title | icon
//! ```
//!
//! A body equal to [`ABORT_MARKER`] means the session ends before any
//! output is produced.

use bytes::Bytes;

use crate::encoding::coord::Precision;
use crate::error::VgsError;
use crate::flags::DebugFlags;

/// Size of the fixed ASCII block.
pub const FIXED_LEN: usize = 54;

/// Version tag this build speaks.
pub const PROTOCOL_VERSION: &str = "VGS00001";

/// Startup body that cancels the session before it begins.
pub const ABORT_MARKER: &[u8] = b"~ABORT~";

const VERSION_WIDTH: usize = 8;

// ── Field helpers ────────────────────────────────────────────────

fn put_flag(out: &mut Vec<u8>, value: bool) {
    out.push(if value { b'1' } else { b'0' });
}

fn put_decimal(
    out: &mut Vec<u8>,
    field: &'static str,
    value: u64,
    width: usize,
) -> Result<(), VgsError> {
    let text = format!("{value:0width$}");
    if text.len() != width {
        return Err(VgsError::field(
            field,
            format!("{value} does not fit {width} digits"),
        ));
    }
    out.extend_from_slice(text.as_bytes());
    Ok(())
}

fn put_hex(out: &mut Vec<u8>, value: u32, width: usize) {
    out.extend_from_slice(format!("{value:0width$X}").as_bytes());
}

fn field_text<'a>(
    data: &'a [u8],
    field: &'static str,
    offset: usize,
    width: usize,
) -> Result<&'a str, VgsError> {
    let raw = data
        .get(offset..offset + width)
        .ok_or_else(|| VgsError::field(field, "message truncated"))?;
    std::str::from_utf8(raw).map_err(|_| VgsError::field(field, "not ASCII"))
}

fn get_flag(data: &[u8], field: &'static str, offset: usize) -> Result<bool, VgsError> {
    match field_text(data, field, offset, 1)? {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(VgsError::field(field, format!("expected 0 or 1, got {other:?}"))),
    }
}

fn get_decimal(
    data: &[u8],
    field: &'static str,
    offset: usize,
    width: usize,
) -> Result<u64, VgsError> {
    let text = field_text(data, field, offset, width)?;
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VgsError::field(field, format!("not decimal: {text:?}")));
    }
    text.parse()
        .map_err(|_| VgsError::field(field, format!("not decimal: {text:?}")))
}

fn get_hex(data: &[u8], field: &'static str, offset: usize, width: usize) -> Result<u32, VgsError> {
    let text = field_text(data, field, offset, width)?;
    u32::from_str_radix(text, 16)
        .map_err(|_| VgsError::field(field, format!("not hexadecimal: {text:?}")))
}

// ── StartupMessage ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupMessage {
    pub want_file: bool,
    pub want_peer: bool,
    pub senders: u32,
    pub display: String,
    pub file: String,
    pub title: String,
    pub icon: String,
    /// Buffer capacity in bytes, CountWord included.
    pub buffer_len: usize,
    pub mode: u32,
    pub precision: Precision,
    pub version: String,
    pub debug: DebugFlags,
}

/// What the relay found in the first message of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Startup {
    Abort,
    Begin(StartupMessage),
}

impl StartupMessage {
    pub fn encode(&self) -> Result<Bytes, VgsError> {
        if self.version.len() != VERSION_WIDTH || !self.version.is_ascii() {
            return Err(VgsError::field("version", "must be 8 ASCII characters"));
        }
        let names = [&self.display, &self.file, &self.title, &self.icon];
        let mut out = Vec::with_capacity(FIXED_LEN + names.iter().map(|n| n.len()).sum::<usize>());

        put_flag(&mut out, self.want_file);
        put_flag(&mut out, self.want_peer);
        put_decimal(&mut out, "sender-count", u64::from(self.senders), 4)?;
        put_decimal(&mut out, "display-len", self.display.len() as u64, 4)?;
        put_decimal(&mut out, "file-len", self.file.len() as u64, 4)?;
        put_decimal(&mut out, "title-len", self.title.len() as u64, 4)?;
        put_decimal(&mut out, "icon-len", self.icon.len() as u64, 4)?;
        put_decimal(&mut out, "buffer-len", self.buffer_len as u64, 8)?;
        put_decimal(&mut out, "mode", u64::from(self.mode), 4)?;
        put_decimal(&mut out, "lci", u64::from(self.precision.lci), 2)?;
        put_decimal(&mut out, "lcf", u64::from(self.precision.lcf), 2)?;
        out.extend_from_slice(self.version.as_bytes());
        put_hex(&mut out, self.debug.bits(), 8);
        debug_assert_eq!(out.len(), FIXED_LEN);

        for name in names {
            out.extend_from_slice(name.as_bytes());
        }
        Ok(Bytes::from(out))
    }
}

impl Startup {
    pub fn decode(data: &[u8]) -> Result<Self, VgsError> {
        if data == ABORT_MARKER {
            return Ok(Startup::Abort);
        }
        if data.len() < FIXED_LEN {
            return Err(VgsError::InvalidLength {
                expected: FIXED_LEN,
                actual: data.len(),
            });
        }

        let want_file = get_flag(data, "want-file", 0)?;
        let want_peer = get_flag(data, "want-peer", 1)?;
        let senders = get_decimal(data, "sender-count", 2, 4)? as u32;
        let lens = [
            get_decimal(data, "display-len", 6, 4)? as usize,
            get_decimal(data, "file-len", 10, 4)? as usize,
            get_decimal(data, "title-len", 14, 4)? as usize,
            get_decimal(data, "icon-len", 18, 4)? as usize,
        ];
        let buffer_len = get_decimal(data, "buffer-len", 22, 8)? as usize;
        let mode = get_decimal(data, "mode", 30, 4)? as u32;
        let precision = Precision::new(
            get_decimal(data, "lci", 34, 2)? as u32,
            get_decimal(data, "lcf", 36, 2)? as u32,
        )?;
        let version = field_text(data, "version", 38, VERSION_WIDTH)?.to_string();
        let debug = DebugFlags::from_bits_truncate(get_hex(data, "debug-mask", 46, 8)?);

        let declared = FIXED_LEN + lens.iter().sum::<usize>();
        if data.len() != declared {
            return Err(VgsError::InvalidLength {
                expected: declared,
                actual: data.len(),
            });
        }

        let mut offset = FIXED_LEN;
        let mut names = Vec::with_capacity(4);
        for (len, field) in lens.into_iter().zip(["display", "file", "title", "icon"]) {
            let name = field_text(data, field, offset, len)?.to_string();
            names.push(name);
            offset += len;
        }
        let [display, file, title, icon]: [String; 4] = names
            .try_into()
            .map_err(|_| VgsError::ProtocolViolation("startup names"))?;

        Ok(Startup::Begin(StartupMessage {
            want_file,
            want_peer,
            senders,
            display,
            file,
            title,
            icon,
            buffer_len,
            mode,
            precision,
            version,
            debug,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StartupMessage {
        StartupMessage {
            want_file: true,
            want_peer: false,
            senders: 3,
            display: "localhost:7400".into(),
            file: "run.meta".into(),
            title: "Shock tube".into(),
            icon: "".into(),
            buffer_len: 4092,
            mode: 2,
            precision: Precision { lci: 6, lcf: 10 },
            version: PROTOCOL_VERSION.into(),
            debug: DebugFlags::TRACE_ACKS | DebugFlags::TRACE_FRAMES,
        }
    }

    #[test]
    fn fixed_fields_sit_at_documented_offsets() {
        let bytes = sample().encode().unwrap();
        assert_eq!(&bytes[0..2], b"10");
        assert_eq!(&bytes[2..6], b"0003");
        assert_eq!(&bytes[6..10], b"0014");
        assert_eq!(&bytes[18..22], b"0000");
        assert_eq!(&bytes[22..30], b"00004092");
        assert_eq!(&bytes[34..38], b"0610");
        assert_eq!(&bytes[38..46], PROTOCOL_VERSION.as_bytes());
        assert_eq!(&bytes[46..54], b"0000000A");
        assert_eq!(&bytes[54..], b"localhost:7400run.metaShock tube");
    }

    #[test]
    fn decode_recovers_every_field() {
        let msg = sample();
        let bytes = msg.encode().unwrap();
        assert_eq!(Startup::decode(&bytes).unwrap(), Startup::Begin(msg));
    }

    #[test]
    fn abort_marker_is_recognised() {
        assert_eq!(Startup::decode(ABORT_MARKER).unwrap(), Startup::Abort);
    }

    #[test]
    fn truncated_names_are_rejected() {
        let bytes = sample().encode().unwrap();
        let err = Startup::decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, VgsError::InvalidLength { .. }));
    }

    #[test]
    fn non_decimal_field_is_rejected() {
        let mut bytes = sample().encode().unwrap().to_vec();
        bytes[24] = b'x';
        let err = Startup::decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("buffer-len"));
    }

    #[test]
    fn overflowing_field_fails_to_encode() {
        let mut msg = sample();
        msg.senders = 10_000;
        assert!(msg.encode().is_err());
    }
}
