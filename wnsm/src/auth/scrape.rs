//! Tolerant extraction from the portal's HTML pages and JavaScript bundle.

use scraper::{Html, Selector};

/// Action URL of the first form on the page.
pub fn find_form_action(html: &str) -> Option<String> {
    let selector = Selector::parse("form[action]").ok()?;
    Html::parse_document(html)
        .select(&selector)
        .filter_map(|form| form.value().attr("action"))
        .map(str::trim)
        .find(|action| !action.is_empty())
        .map(str::to_owned)
}

/// `src` attributes of all the scripts on the page, in document order.
pub fn script_sources(html: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse("script[src]") else {
        return Vec::new();
    };
    Html::parse_document(html)
        .select(&selector)
        .filter_map(|script| script.value().attr("src"))
        .map(str::to_owned)
        .collect()
}

/// Check whether the script is the application's main bundle: `main.<hash>.js` and alike.
pub fn is_main_bundle(src: &str) -> bool {
    let path = src.split(['?', '#']).next().unwrap_or_default();
    let file_name = path.rsplit('/').next().unwrap_or_default();
    file_name.starts_with("main") && file_name.ends_with(".js")
}

/// Find a string literal assigned to the key in minified JavaScript or JSON.
///
/// Matches `key:"value"`, `"key": "value"`, `key='value'` and so on.
/// The first occurrence with a non-empty value wins.
pub fn find_key<'a>(source: &'a str, key: &str) -> Option<&'a str> {
    source.match_indices(key).find_map(|(index, _)| {
        let rest = source[index + key.len()..].trim_start_matches(['"', '\'']).trim_start();
        let rest = rest.strip_prefix([':', '='])?.trim_start();
        let quote = rest.chars().next().filter(|char| matches!(char, '"' | '\'' | '`'))?;
        let rest = &rest[quote.len_utf8()..];
        let value = &rest[..rest.find(quote)?];
        (!value.is_empty()).then_some(value)
    })
}
