use std::collections::HashSet;

use once_cell::sync::Lazy;

/// Brands attackers most commonly impersonate, keyed by token with the
/// official registrable domain. The official domain is exempt from
/// impersonation flags; everything else containing the token is not.
pub const BRAND_DOMAINS: &[(&str, &str)] = &[
    ("paypal", "paypal.com"),
    ("apple", "apple.com"),
    ("google", "google.com"),
    ("microsoft", "microsoft.com"),
    ("amazon", "amazon.com"),
    ("facebook", "facebook.com"),
    ("netflix", "netflix.com"),
    ("instagram", "instagram.com"),
    ("whatsapp", "whatsapp.com"),
    ("twitter", "twitter.com"),
    ("linkedin", "linkedin.com"),
    ("ebay", "ebay.com"),
    ("dropbox", "dropbox.com"),
    ("icloud", "icloud.com"),
    ("outlook", "outlook.com"),
    ("yahoo", "yahoo.com"),
    ("chase", "chase.com"),
    ("wellsfargo", "wellsfargo.com"),
    ("bankofamerica", "bankofamerica.com"),
    ("citibank", "citibank.com"),
    ("capitalone", "capitalone.com"),
    ("steam", "steampowered.com"),
    ("spotify", "spotify.com"),
    ("adobe", "adobe.com"),
    ("coinbase", "coinbase.com"),
    ("binance", "binance.com"),
    ("metamask", "metamask.io"),
    ("github", "github.com"),
    ("zoom", "zoom.us"),
    ("slack", "slack.com"),
];

static OFFICIAL_DOMAINS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| BRAND_DOMAINS.iter().map(|(_, d)| *d).collect());

/// Map a visually confusable character to its ASCII stand-in. Covers the
/// Cyrillic and Greek letters seen in real homograph campaigns plus the
/// digit/symbol substitutions of leet-speak lures (g00gle, paypa1).
fn confusable_to_ascii(ch: char) -> Option<char> {
    let mapped = match ch {
        // Cyrillic
        '\u{0430}' => 'a',
        '\u{0435}' => 'e',
        '\u{043e}' => 'o',
        '\u{0440}' => 'p',
        '\u{0441}' => 'c',
        '\u{0443}' => 'y',
        '\u{0445}' => 'x',
        '\u{0456}' => 'i',
        '\u{0458}' => 'j',
        '\u{04bb}' => 'h',
        '\u{0501}' => 'd',
        // Greek
        '\u{03b1}' => 'a',
        '\u{03b5}' => 'e',
        '\u{03bf}' => 'o',
        '\u{03c1}' => 'p',
        '\u{03ba}' => 'k',
        '\u{03bd}' => 'v',
        '\u{03c4}' => 't',
        '\u{03b9}' => 'i',
        // Leet substitutions
        '0' => 'o',
        '1' => 'l',
        '3' => 'e',
        '5' => 's',
        '7' => 't',
        '8' => 'b',
        '!' => 'i',
        '$' => 's',
        _ => return None,
    };
    Some(mapped)
}

/// Replace confusable characters with their ASCII equivalents:
/// "pаypal" (Cyrillic а) -> "paypal", "g00gle" -> "google".
pub fn normalize_confusables(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|ch| confusable_to_ascii(ch).unwrap_or(ch))
        .collect()
}

/// Count non-ASCII characters that are visually confusable with ASCII.
pub fn confusable_char_count(text: &str) -> usize {
    text.to_lowercase()
        .chars()
        .filter(|ch| !ch.is_ascii() && confusable_to_ascii(*ch).is_some())
        .count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Script {
    Latin,
    Cyrillic,
    Greek,
    Other,
}

fn script_of(ch: char) -> Option<Script> {
    if ch.is_ascii() || ('\u{00c0}'..='\u{024f}').contains(&ch) {
        ch.is_alphabetic().then_some(Script::Latin)
    } else if ('\u{0400}'..='\u{04ff}').contains(&ch) || ('\u{0500}'..='\u{052f}').contains(&ch) {
        Some(Script::Cyrillic)
    } else if ('\u{0370}'..='\u{03ff}').contains(&ch) {
        Some(Script::Greek)
    } else if ch.is_alphabetic() {
        Some(Script::Other)
    } else {
        None
    }
}

/// A label mixing Latin with Cyrillic/Greek is the classic IDN homograph
/// shape. Pure single-script labels (including fully Cyrillic ones) pass.
pub fn label_has_mixed_scripts(label: &str) -> bool {
    let mut scripts = HashSet::new();
    for ch in label.chars() {
        if matches!(ch, '.' | '-' | '_') || ch.is_ascii_digit() {
            continue;
        }
        if let Some(script) = script_of(ch) {
            scripts.insert(script);
        }
    }
    scripts.len() > 1
}

/// True when any dot-separated label of the host mixes scripts.
pub fn host_has_mixed_scripts(host: &str) -> bool {
    host.split('.').any(label_has_mixed_scripts)
}

/// Minimum edit distance from the host's main label to any known brand,
/// compared both raw and after confusable normalization.
pub fn min_brand_distance(main_label: &str) -> (usize, &'static str) {
    let raw = main_label.to_lowercase();
    let skeleton = normalize_confusables(&raw);

    let mut best = usize::MAX;
    let mut best_brand = "";
    for (token, _) in BRAND_DOMAINS {
        let d = strsim::levenshtein(&raw, token).min(strsim::levenshtein(&skeleton, token));
        if d < best {
            best = d;
            best_brand = token;
        }
    }
    (best, best_brand)
}

/// Token-boundary brand match inside one label: "secure-apple" and
/// "apple2" count, "pineapple" does not.
fn brand_in_label(label: &str, brand: &str) -> bool {
    if label == brand {
        return true;
    }
    label.split(['-', '_']).any(|token| {
        token == brand
            || (token.len() > brand.len()
                && (token
                    .strip_prefix(brand)
                    .map(|rest| rest.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
                    || token
                        .strip_suffix(brand)
                        .map(|rest| rest.chars().all(|c| c.is_ascii_digit()))
                        .unwrap_or(false)))
    })
}

fn hostname_has_brand(host: &str, brand: &str) -> bool {
    host.split('.').any(|label| brand_in_label(label, brand))
}

/// A brand token appears somewhere in the host and the registered domain
/// is not the brand's official one.
pub fn brand_token_in_host(host: &str, registered_domain: &str) -> Option<&'static str> {
    if OFFICIAL_DOMAINS.contains(registered_domain) {
        return None;
    }
    let normalized = normalize_confusables(host);
    BRAND_DOMAINS
        .iter()
        .find(|(token, _)| hostname_has_brand(&normalized, token))
        .map(|(token, _)| *token)
}

/// A brand token appears in the subdomain labels specifically
/// ("paypal.evil.com").
pub fn brand_in_subdomain(host: &str, registered_domain: &str) -> bool {
    if OFFICIAL_DOMAINS.contains(registered_domain) || host.len() <= registered_domain.len() {
        return false;
    }
    let prefix = &host[..host.len() - registered_domain.len()];
    let normalized = normalize_confusables(prefix.trim_end_matches('.'));
    BRAND_DOMAINS
        .iter()
        .any(|(token, _)| hostname_has_brand(&normalized, token))
}

/// Leet-speak substitution that reveals a brand once normalized:
/// "g00gle" -> "google". The raw form must NOT already contain the brand.
pub fn has_char_substitution(main_label: &str) -> bool {
    let raw = main_label.to_lowercase();
    let skeleton = normalize_confusables(&raw);
    if skeleton == raw {
        return false;
    }
    BRAND_DOMAINS
        .iter()
        .any(|(token, _)| brand_in_label(&skeleton, token) && !brand_in_label(&raw, token))
}
