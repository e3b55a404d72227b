use std::char::decode_utf16;
use std::io::{self, Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use encoding::{decode, DecoderTrap, EncodingRef};

use crate::err::{DeserializationError, DeserializationResult};

/// Reads UTF-16LE code units from the cursor until a NUL (0x0000) unit is
/// encountered, and decodes them into an owned `String`.
pub fn read_null_terminated_utf16_string(
    cursor: &mut Cursor<&[u8]>,
) -> DeserializationResult<String> {
    let start = cursor.position();
    let mut buffer = Vec::new();

    loop {
        let next_char =
            cursor
                .read_u16::<LittleEndian>()
                .map_err(|source| DeserializationError::FailedToRead {
                    t: "utf-16 string",
                    offset: cursor.position(),
                    source,
                })?;

        if next_char == 0 {
            break;
        }

        buffer.push(next_char);
    }

    decode_utf16(buffer.into_iter())
        .map(|r| r.map_err(|_| io::Error::from(io::ErrorKind::InvalidData)))
        .collect::<io::Result<String>>()
        .map_err(|source| DeserializationError::FailedToDecodeUTF16String {
            source,
            offset: start,
        })
}

/// Reads bytes from the cursor until a NUL byte is encountered, and decodes
/// them using `ansi_codec`.
pub fn read_null_terminated_ansi_string(
    cursor: &mut Cursor<&[u8]>,
    ansi_codec: EncodingRef,
) -> DeserializationResult<String> {
    let start = cursor.position();
    let mut bytes = Vec::new();

    loop {
        let mut byte = [0_u8; 1];
        cursor
            .read_exact(&mut byte)
            .map_err(|source| DeserializationError::FailedToRead {
                t: "ansi string",
                offset: cursor.position(),
                source,
            })?;

        if byte[0] == 0 {
            break;
        }

        bytes.push(byte[0]);
    }

    match decode(&bytes, DecoderTrap::Strict, ansi_codec).0 {
        Ok(s) => Ok(s),
        Err(message) => Err(DeserializationError::FailedToDecodeANSIString {
            encoding: ansi_codec.name(),
            message: message.to_string(),
            offset: start,
        }),
    }
}

/// Expands `%NAME%` environment-variable tokens using the process
/// environment. Unmatched tokens are left verbatim.
pub fn expand_env(s: &str) -> String {
    expand_env_with(s, |name| std::env::var(name).ok())
}

/// Expands `%NAME%` tokens using the supplied lookup. A `%` with no closing
/// `%`, or a name the lookup does not know, passes through unchanged.
pub fn expand_env_with(s: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(open) = rest.find('%') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        match after.find('%') {
            Some(close) if close > 0 => {
                let name = &after[..close];
                match lookup(name) {
                    Some(value) => {
                        out.push_str(&value);
                        rest = &after[close + 1..];
                    }
                    None => {
                        // Leave the opening `%` and re-scan from the closer,
                        // so `%not_a_var%TEMP%` can still match `%TEMP%`.
                        out.push('%');
                        out.push_str(name);
                        rest = &after[close..];
                    }
                }
            }
            _ => {
                out.push('%');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding::all::WINDOWS_1252;
    use pretty_assertions::assert_eq;

    fn utf16_bytes(s: &str) -> Vec<u8> {
        s.encode_utf16()
            .chain(std::iter::once(0))
            .flat_map(u16::to_le_bytes)
            .collect()
    }

    #[test]
    fn reads_null_terminated_utf16() {
        let bytes = utf16_bytes("Service Control Manager");
        let mut cursor = Cursor::new(bytes.as_slice());

        assert_eq!(
            read_null_terminated_utf16_string(&mut cursor).unwrap(),
            "Service Control Manager"
        );
        assert_eq!(cursor.position() as usize, bytes.len());
    }

    #[test]
    fn unterminated_utf16_is_an_error() {
        let bytes = utf16_bytes("abc");
        let mut cursor = Cursor::new(&bytes[..bytes.len() - 2]);

        assert!(read_null_terminated_utf16_string(&mut cursor).is_err());
    }

    #[test]
    fn reads_null_terminated_ansi() {
        let mut bytes = b"MYCOMPUTER".to_vec();
        bytes.push(0);
        let mut cursor = Cursor::new(bytes.as_slice());

        assert_eq!(
            read_null_terminated_ansi_string(&mut cursor, WINDOWS_1252).unwrap(),
            "MYCOMPUTER"
        );
    }

    #[test]
    fn expands_known_tokens_and_keeps_unknown_ones() {
        let lookup = |name: &str| match name {
            "SystemRoot" => Some(r"C:\Windows".to_string()),
            _ => None,
        };

        assert_eq!(
            expand_env_with(r"%SystemRoot%\system32\netmsg.dll", lookup),
            r"C:\Windows\system32\netmsg.dll"
        );
        assert_eq!(
            expand_env_with(r"%NoSuchVar%\file.dll", lookup),
            r"%NoSuchVar%\file.dll"
        );
        assert_eq!(expand_env_with("50%", lookup), "50%");
    }
}
