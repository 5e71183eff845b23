//! Minimal LDIF writer and reader for the OpenLDAP client tools

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use hostadmin_config::Attributes;

/// An `add` record for `dn`
pub fn add_record(dn: &str, attributes: &Attributes) -> String {
    let mut out = attr_line("dn", dn);
    for (name, values) in attributes {
        for value in values {
            out.push_str(&attr_line(name, value));
        }
    }
    out
}

/// A `modify` record replacing every listed attribute of `dn`
pub fn replace_record(dn: &str, attributes: &Attributes) -> String {
    let mut out = attr_line("dn", dn);
    out.push_str("changetype: modify\n");
    for (index, (name, values)) in attributes.iter().enumerate() {
        if index > 0 {
            out.push_str("-\n");
        }
        out.push_str(&format!("replace: {}\n", name));
        for value in values {
            out.push_str(&attr_line(name, value));
        }
    }
    if !attributes.is_empty() {
        out.push_str("-\n");
    }
    out
}

fn attr_line(name: &str, value: &str) -> String {
    if is_safe(value) {
        format!("{}: {}\n", name, value)
    } else {
        format!("{}:: {}\n", name, STANDARD.encode(value))
    }
}

/// RFC 2849 SAFE-STRING: printable ASCII, no leading space, colon or `<`,
/// no trailing space
fn is_safe(value: &str) -> bool {
    if value.ends_with(' ') {
        return false;
    }
    let mut chars = value.chars();
    match chars.next() {
        None => true,
        Some(' ' | ':' | '<') => false,
        Some(first) => [first]
            .into_iter()
            .chain(chars)
            .all(|c| c.is_ascii() && !matches!(c, '\0' | '\n' | '\r')),
    }
}

/// Values of `attribute` across all records of an LDIF document
///
/// Folded lines are joined and base64 values (`attr:: …`) decoded. Attribute
/// names compare case-insensitively.
pub fn attribute_values(ldif: &str, attribute: &str) -> Vec<String> {
    let mut logical: Vec<String> = Vec::new();
    for line in ldif.lines() {
        if let Some(continuation) = line.strip_prefix(' ') {
            if let Some(last) = logical.last_mut() {
                last.push_str(continuation);
            }
        } else if !line.starts_with('#') {
            logical.push(line.to_string());
        }
    }

    logical
        .iter()
        .filter_map(|line| {
            let (name, rest) = line.split_once(':')?;
            if !name.eq_ignore_ascii_case(attribute) {
                return None;
            }
            match rest.strip_prefix(':') {
                Some(encoded) => STANDARD
                    .decode(encoded.trim())
                    .ok()
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
                None => Some(rest.trim_start().to_string()),
            }
        })
        .collect()
}
