//! The connection preface: a fixed 24-octet string every client must send
//! before anything else, verbatim, so a server speaking HTTP/1.1 on the
//! same port fails fast instead of misinterpreting the bytes as a request.

/// `PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n`, as defined by section 3.5.
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Byte-exact comparison against [`CONNECTION_PREFACE`]. Deliberately not
/// case-insensitive: a peer that mangles the case of its own preface is
/// not speaking this protocol.
pub fn is_valid_preface(bytes: &[u8]) -> bool {
    bytes == CONNECTION_PREFACE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_preface_is_valid() {
        assert!(is_valid_preface(CONNECTION_PREFACE));
    }

    #[test]
    fn lowercased_preface_is_rejected() {
        let mangled = CONNECTION_PREFACE.to_ascii_lowercase();
        assert!(!is_valid_preface(&mangled));
    }

    #[test]
    fn truncated_preface_is_rejected() {
        assert!(!is_valid_preface(&CONNECTION_PREFACE[..10]));
    }
}
