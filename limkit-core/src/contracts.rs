//! Contract listing from the schema relations endpoint.
//!
//! The relations document nests the requested symbol under the root and its
//! contracts under the symbol's first child; each contract carries a `name`
//! attribute such as `FB_2024Z`.

use crate::error::{LimError, Result};
use crate::xml::parse_document;

/// Contract names listed in a relations response, in document order.
pub fn parse_contract_list(body: &str) -> Result<Vec<String>> {
    let root = parse_document(body)?;
    let relation = root
        .children
        .first()
        .ok_or_else(|| LimError::Parse(format!("<{}> lists no relation", root.name)))?;
    let Some(children) = relation.children.first() else {
        return Ok(Vec::new());
    };

    children
        .children
        .iter()
        .map(|c| {
            c.attr("name")
                .map(String::from)
                .ok_or_else(|| LimError::Parse(format!("<{}> has no name attribute", c.name)))
        })
        .collect()
}

/// Monthly contracts carry four digits followed by a word character (`2024Z`).
pub fn is_monthly_contract(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.windows(5).any(|w| {
        w[..4].iter().all(u8::is_ascii_digit) && (w[4].is_ascii_alphanumeric() || w[4] == b'_')
    })
}

/// Year encoded in the last `_` segment, e.g. `FB_2024Z` → 2024.
pub fn contract_year(name: &str) -> Option<i32> {
    let tail = name.rsplit('_').next()?;
    tail.get(..4)?.parse().ok()
}

/// Contracts whose year lies within `[start_year, end_year]`.
pub fn filter_by_year(contracts: &[String], start_year: i32, end_year: i32) -> Vec<String> {
    contracts
        .iter()
        .filter(|c| contract_year(c).is_some_and(|y| (start_year..=end_year).contains(&y)))
        .cloned()
        .collect()
}
