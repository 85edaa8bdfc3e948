//! ## Configuration file codec
//!
//! The device's `config.txt` is a flat `KEY=VALUE` text file, one entry
//! per line, CR/LF-tolerant. Used to recover a device's serial number
//! during enumeration (see [`crate::supervisor`]).
//!

use std::collections::HashMap;

/// Parse a `config.txt` body into a key/value map. Lines with no `=`,
/// or an empty value, are dropped rather than inserted as empty
/// strings.
pub fn parse_config(text: &str) -> HashMap<String, String> {
    text.split(['\r', '\n'])
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            if value.is_empty() {
                None
            } else {
                Some((key.to_string(), value.to_string()))
            }
        })
        .collect()
}

/// Render a key/value map back to `config.txt` form, `KEY=VALUE\r\n` per
/// entry. `HashMap` iteration order isn't stable across calls, so the
/// emitted byte sequence isn't either. The round-trip law this codec
/// honors is `parse_config(render_config(m)) == m` as maps, not as
/// byte-identical text. Callers that need stable output should sort the
/// entries themselves before rendering.
pub fn render_config(map: &HashMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in map {
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push_str("\r\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_crlf_separated_entries() {
        let text = "SerialNumber=ABC123\r\nFirmwareVersion=1.4.0\r\n";
        let map = parse_config(text);
        assert_eq!(map.get("SerialNumber"), Some(&"ABC123".to_string()));
        assert_eq!(map.get("FirmwareVersion"), Some(&"1.4.0".to_string()));
    }

    #[test]
    fn tolerates_bare_lf_and_bare_cr() {
        let lf = parse_config("A=1\nB=2\n");
        assert_eq!(lf.len(), 2);
        let cr = parse_config("A=1\rB=2\r");
        assert_eq!(cr.len(), 2);
    }

    #[test]
    fn drops_lines_with_no_equals_or_empty_value() {
        let map = parse_config("JustAKey\r\nEmpty=\r\nReal=value\r\n");
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("Real"), Some(&"value".to_string()));
    }

    #[test]
    fn round_trips_as_a_map() {
        let mut original = HashMap::new();
        original.insert("SerialNumber".to_string(), "XYZ789".to_string());
        original.insert("Model".to_string(), "Recorder-9".to_string());

        let rendered = render_config(&original);
        let parsed = parse_config(&rendered);
        assert_eq!(parsed, original);
    }
}
