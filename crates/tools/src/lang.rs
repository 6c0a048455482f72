//! Language helpers shared by the search and translation tools.
//!
//! The normalization rules follow what the translation backend actually
//! accepts: `EN-US`/`EN-GB` for English targets, two-letter codes for
//! sources, auto-detect when in doubt.

/// Spellings of "English" the query-biasing logic treats as English.
const ENGLISH_NAMES: &[&str] = &[
    "english",
    "en",
    "en-us",
    "en-gb",
    "eng",
    "us english",
    "american english",
    "british english",
];

/// Whether a language name or code refers to English.
pub fn is_english(lang: &str) -> bool {
    ENGLISH_NAMES.contains(&lang.trim().to_lowercase().as_str())
}

/// Normalize a target language for the translation backend.
///
/// Bare "EN" targets are deprecated there, so English maps to a regional
/// variant.
pub fn normalize_target_lang(lang: &str) -> String {
    let key = lang.trim().to_lowercase();
    if matches!(
        key.as_str(),
        "en" | "english" | "en-us" | "american english" | "us english"
    ) {
        return "EN-US".into();
    }
    if matches!(key.as_str(), "en-gb" | "british english") {
        return "EN-GB".into();
    }
    if key.is_empty() {
        return "EN-US".into();
    }
    lang.trim().to_uppercase()
}

/// Normalize a source language, or `None` for auto-detect.
pub fn normalize_source_lang(lang: Option<&str>) -> Option<String> {
    let lang = lang?.trim();
    if lang.is_empty() {
        return None;
    }
    let key = lang.to_lowercase();
    if matches!(
        key.as_str(),
        "en" | "en-us" | "en-gb" | "english" | "us english" | "british english"
    ) {
        return Some("EN".into());
    }
    if matches!(key.as_str(), "pt" | "pt-pt" | "pt-br" | "portuguese") {
        return Some("PT".into());
    }
    // Long names like "spanish" fall back to auto-detect to avoid backend
    // errors on unrecognized codes
    if key.len() > 3 {
        return None;
    }
    Some(key.to_uppercase())
}

/// Country-code TLDs where sources in the given language are expected.
///
/// Used by the domain policy to judge whether a host looks local. Unknown
/// languages return an empty list, which disables the ccTLD check and
/// leaves only the blocked-host check active.
pub fn cctlds_for(language: &str) -> Vec<&'static str> {
    match language.trim().to_lowercase().as_str() {
        "tamil" | "hindi" | "marathi" | "bengali" | "kannada" | "telugu" | "malayalam"
        | "gujarati" | "punjabi" => vec!["in"],
        "german" => vec!["de", "at", "ch"],
        "french" => vec!["fr", "be", "ch", "ca"],
        "spanish" => vec!["es", "mx", "ar", "co", "cl", "pe"],
        "portuguese" => vec!["pt", "br"],
        "italian" => vec!["it"],
        "dutch" => vec!["nl", "be"],
        "japanese" => vec!["jp"],
        "korean" => vec!["kr"],
        "chinese" | "mandarin" => vec!["cn", "tw", "hk"],
        "russian" => vec!["ru"],
        "polish" => vec!["pl"],
        "turkish" => vec!["tr"],
        "arabic" => vec!["ae", "sa", "eg", "ma"],
        "swedish" => vec!["se"],
        "norwegian" => vec!["no"],
        "danish" => vec!["dk"],
        "finnish" => vec!["fi"],
        "greek" => vec!["gr"],
        "czech" => vec!["cz"],
        "thai" => vec!["th"],
        "vietnamese" => vec!["vn"],
        "indonesian" => vec!["id"],
        _ => vec![],
    }
}
