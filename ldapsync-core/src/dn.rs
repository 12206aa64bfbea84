//! Minimal distinguished-name handling.
//!
//! Only what the adapter needs: splitting into RDNs, comparing DNs
//! case-insensitively, and pulling the identifying value out of a reference.

/// One relative distinguished name, e.g. `ou=units`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rdn {
    pub attribute: String,
    pub value: String,
}

/// Splits a DN into RDNs, leftmost first. Escaped commas (`\,`) stay inside values.
///
/// Components without `=` are dropped. Multi-valued RDNs (`a=1+b=2`) are kept as one value.
pub fn rdns(dn: &str) -> Vec<Rdn> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for ch in dn.chars() {
        match ch {
            _ if escaped => {
                current.push(ch);
                escaped = false;
            }
            '\\' => escaped = true,
            ',' => parts.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    parts.push(current);

    parts
        .into_iter()
        .filter_map(|part| {
            let (attribute, value) = part.split_once('=')?;
            Some(Rdn {
                attribute: attribute.trim().to_ascii_lowercase(),
                value: value.trim().to_string(),
            })
        })
        .collect()
}

/// Canonical form used as a key: lowercased, no whitespace around separators.
pub fn normalize(dn: &str) -> String {
    rdns(dn)
        .into_iter()
        .map(|r| format!("{}={}", r.attribute, r.value.to_lowercase()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Value of the leftmost RDN, which is how directory references name their target.
pub fn leaf_value(dn: &str) -> Option<String> {
    rdns(dn)
        .into_iter()
        .next()
        .map(|r| r.value)
        .filter(|v| !v.is_empty())
}

/// The RDN directly above the leaf, e.g. `ou=CS-DEPT` for `cn=head,ou=CS-DEPT,ou=units`.
pub fn parent_rdn(dn: &str) -> Option<Rdn> {
    rdns(dn).into_iter().nth(1)
}

/// True when `dn` lies strictly below `base`. The base entry itself does not count.
pub fn is_strictly_under(dn: &str, base: &str) -> bool {
    let dn = normalize(dn);
    let base = normalize(base);
    if base.is_empty() {
        return !dn.is_empty();
    }
    dn.len() > base.len() && dn.ends_with(&format!(",{base}"))
}

/// Joins a relative DN onto a base, tolerating either side being empty.
pub fn join(relative: &str, base: &str) -> String {
    match (relative.trim(), base.trim()) {
        ("", b) => b.to_string(),
        (r, "") => r.to_string(),
        (r, b) => format!("{r},{b}"),
    }
}
