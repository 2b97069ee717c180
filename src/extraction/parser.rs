//! Parser for extraction tool output

use crate::types::ProductId;
use regex::Regex;
use std::sync::OnceLock;

/// Phrase preceding the identifier in introspection output
pub const ID_MARKER: &str = "ID is ";

/// Find the product identifier in introspection output
///
/// Looks for the first line containing [`ID_MARKER`] and takes the token that
/// follows it, e.g. `GOG.com game ID is 1207658924`. Quotes around the token
/// are dropped. Returns `None` when no such line exists or the token is empty.
pub fn parse_product_id(stdout: &[u8]) -> Option<ProductId> {
    let output = String::from_utf8_lossy(stdout);
    output
        .lines()
        .filter(|line| line.contains(ID_MARKER))
        .find_map(|line| {
            id_line()
                .captures(line)
                .and_then(|caps| caps.get(1))
                .and_then(|m| ProductId::new(m.as_str()))
        })
}

#[allow(clippy::expect_used)]
fn id_line() -> &'static Regex {
    static ID_LINE: OnceLock<Regex> = OnceLock::new();
    ID_LINE.get_or_init(|| Regex::new(r#"ID is\s+"?([^\s"]+)"#).expect("literal pattern is valid"))
}
