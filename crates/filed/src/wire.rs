//! Delimiter-joined frame codec.
//!
//! Requests are `command<DELIM>param1<DELIM>param2...`; replies are
//! `true<DELIM>chunk...` on success or `false<DELIM>message` on failure.
//! Fields are joined with the configured delimiter and nothing is escaped,
//! so a delimiter character inside a field corrupts the frame (known
//! limitation). There is no length prefix: frame boundaries belong to the
//! transport layer (`LinesCodec` over the Unix socket), not to this module.

/// Decoded reply: the success flag plus the newline-joined payload or
/// error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub success: bool,
    pub message: String,
}

pub fn encode_request(command: &str, params: &[String], delimiter: &str) -> String {
    let mut frame = String::from(command);
    for param in params {
        frame.push_str(delimiter);
        frame.push_str(param);
    }
    frame
}

pub fn decode_request(frame: &str, delimiter: &str) -> (String, Vec<String>) {
    let mut fields = frame.split(delimiter).map(str::to_string);
    let command = fields.next().unwrap_or_default();
    (command, fields.collect())
}

pub fn encode_reply(success: bool, chunks: &[String], delimiter: &str) -> String {
    let mut frame = String::from(if success { "true" } else { "false" });
    for chunk in chunks {
        frame.push_str(delimiter);
        frame.push_str(chunk);
    }
    frame
}

pub fn decode_reply(frame: &str, delimiter: &str) -> Reply {
    let mut fields = frame.split(delimiter);
    let success = fields.next() == Some("true");
    Reply {
        success,
        message: fields.collect::<Vec<_>>().join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn request_roundtrip() {
        let frame = encode_request("chmod", &params(&["write", "false", "/srv/data"]), "|");
        assert_eq!(frame, "chmod|write|false|/srv/data");

        let (command, decoded) = decode_request(&frame, "|");
        assert_eq!(command, "chmod");
        assert_eq!(decoded, params(&["write", "false", "/srv/data"]));
    }

    #[test]
    fn request_without_params() {
        let (command, decoded) = decode_request("status", "|");
        assert_eq!(command, "status");
        assert!(decoded.is_empty());
    }

    #[test]
    fn successful_reply_joins_chunks_with_newlines() {
        let frame = encode_reply(true, &params(&["one", "two"]), "|");
        assert_eq!(frame, "true|one|two");

        let reply = decode_reply(&frame, "|");
        assert!(reply.success);
        assert_eq!(reply.message, "one\ntwo");
    }

    #[test]
    fn bare_success_reply() {
        let reply = decode_reply(&encode_reply(true, &[], "|"), "|");
        assert!(reply.success);
        assert_eq!(reply.message, "");
    }

    #[test]
    fn failed_reply_carries_error_text() {
        let frame = encode_reply(false, &params(&["no such file"]), "|");
        assert_eq!(frame, "false|no such file");

        let reply = decode_reply(&frame, "|");
        assert!(!reply.success);
        assert_eq!(reply.message, "no such file");
    }

    #[test]
    fn anything_but_true_is_failure() {
        assert!(!decode_reply("", "|").success);
        assert!(!decode_reply("TRUE|x", "|").success);
    }

    // A delimiter inside a field corrupts the frame. This is the documented
    // limitation, not behavior callers may rely on.
    #[test]
    fn delimiter_inside_field_corrupts_the_frame() {
        let original = params(&["a|b", "/dst"]);
        let frame = encode_request("cp", &original, "|");
        let (_, decoded) = decode_request(&frame, "|");
        assert_ne!(decoded, original);
        assert_eq!(decoded, params(&["a", "b", "/dst"]));
    }

    #[test]
    fn alternate_delimiter() {
        let frame = encode_request("rm", &params(&["true", "true", "/tmp/x"]), ";");
        let (command, decoded) = decode_request(&frame, ";");
        assert_eq!(command, "rm");
        assert_eq!(decoded, params(&["true", "true", "/tmp/x"]));
    }
}
