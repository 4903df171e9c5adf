//! Place-name normalization and shared-URL parsing helpers.

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use url::Url;

/// Place-name suffixes dropped during normalization, longest first so
/// "city and borough" wins over "borough". Only the first match is
/// stripped.
const PLACE_SUFFIXES: &[&str] = &[
    " city and borough",
    " city and county",
    " consolidated city",
    " consolidated government",
    " metropolitan government",
    " census designated place",
    " cdp",
    " municipality",
    " charter township",
    " township",
    " plantation",
    " village",
    " borough",
    " town",
    " city",
];

/// Normalize place names so they align across datasets (drop suffixes
/// like "city", collapse whitespace).
pub fn normalize_place_name(name: &str) -> String {
    let mut n = name.trim().to_lowercase();
    for suffix in PLACE_SUFFIXES {
        if let Some(stripped) = n.strip_suffix(suffix) {
            n = stripped.trim().to_string();
            break;
        }
    }
    n.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract and decode the `searchState` param from a shared URL.
///
/// Works for URLs like `https://hiring.cafe/?searchState=<urlencoded json>`.
/// Returns the raw JSON object so callers can merge it over a base state.
pub fn parse_search_state_from_url(url: &str) -> Result<Value> {
    let parsed = Url::parse(url).context("invalid URL")?;
    let raw = parsed
        .query_pairs()
        .find(|(key, _)| key == "searchState")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| anyhow!("URL does not contain a searchState query param"))?;

    let value: Value =
        serde_json::from_str(&raw).context("searchState param is not valid JSON")?;
    if !value.is_object() {
        return Err(anyhow!("searchState JSON was not an object"));
    }
    Ok(value)
}
