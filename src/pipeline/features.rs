use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::types::NormalizedUrl;
use crate::pipeline::homograph;

/// Version of the feature computation. Bump whenever a slot's semantics
/// change; model artifacts record the version they were trained against.
pub const FEATURE_SCHEMA_VERSION: &str = "2.0.0";

/// Frozen, ordered feature schema. The length, order and semantics of
/// these slots must match the training-time schema exactly; the model
/// loader rejects artifacts whose name list disagrees.
#[rustfmt::skip]
pub const FEATURE_NAMES: [&str; 95] = [
    // lexical
    "url_length", "host_length", "path_length", "query_length", "fragment_length",
    "digit_ratio", "letter_ratio", "special_char_count", "longest_digit_run",
    "host_entropy", "path_entropy", "url_entropy", "longest_label_length",
    "mean_label_length", "label_count", "vowel_ratio",
    // structural
    "dot_count", "slash_count", "hyphen_count", "underscore_count", "at_count",
    "ampersand_count", "equals_count", "question_count", "semicolon_count",
    "plus_count", "tilde_count", "subdomain_count", "path_depth",
    "query_param_count", "double_slash_in_path", "has_fragment",
    // keyword presence per location
    "host_kw_login", "path_kw_login", "query_kw_login",
    "host_kw_secure", "path_kw_secure", "query_kw_secure",
    "host_kw_verify", "path_kw_verify", "query_kw_verify",
    "host_kw_update", "path_kw_update", "query_kw_update",
    "host_kw_account", "path_kw_account", "query_kw_account",
    "host_kw_bank", "path_kw_bank", "query_kw_bank",
    "host_kw_paypal", "path_kw_paypal", "query_kw_paypal",
    "host_kw_wallet", "path_kw_wallet", "query_kw_wallet",
    "host_kw_confirm", "path_kw_confirm", "query_kw_confirm",
    // TLD
    "tld_length", "tld_is_high_abuse", "tld_is_country_code", "tld_is_generic",
    "tld_is_trusted",
    // host class
    "is_ip_literal", "is_punycode", "mixed_script_label", "has_port",
    "nonstandard_port", "port_number", "has_www_prefix",
    // encoding
    "percent_encoded_count", "longest_hex_run", "base64_segment", "encoded_ratio",
    "null_byte_encoded", "host_digit_count", "hex_label",
    // homograph
    "confusable_char_count", "brand_distance_min", "char_substitution",
    "brand_token_in_host", "brand_in_subdomain",
    // misc
    "scheme_https", "shortener_host", "executable_extension", "double_extension",
    "redirect_param", "credential_in_url", "query_ratio", "path_ratio",
    "host_ratio", "max_consonant_run", "path_digit_count", "suspicious_path_pattern",
];

const SUSPICIOUS_TOKENS: [&str; 9] = [
    "login", "secure", "verify", "update", "account", "bank", "paypal", "wallet", "confirm",
];

pub(crate) const HIGH_ABUSE_TLDS: [&str; 38] = [
    "tk", "ml", "ga", "cf", "gq", "xyz", "top", "work", "click", "loan", "date", "racing",
    "win", "review", "stream", "download", "science", "party", "faith", "cricket", "bid",
    "trade", "webcam", "kim", "men", "icu", "buzz", "monster", "rest", "quest", "sbs", "zip",
    "mov", "link", "surf", "cam", "pw", "su",
];

const TRUSTED_TLDS: [&str; 8] = [
    "edu", "gov", "mil", "int", "ac.uk", "gov.uk", "edu.au", "gov.au",
];

pub const SHORTENER_DOMAINS: [&str; 18] = [
    "bit.ly", "tinyurl.com", "t.co", "goo.gl", "ow.ly", "buff.ly", "is.gd", "v.gd", "rb.gy",
    "cutt.ly", "shorturl.at", "tiny.cc", "lnkd.in", "amzn.to", "rebrand.ly", "short.io",
    "clck.ru", "t.ly",
];

const EXECUTABLE_EXTS: [&str; 11] = [
    ".exe", ".scr", ".msi", ".apk", ".bat", ".cmd", ".ps1", ".jar", ".dmg", ".zip", ".rar",
];

const SUSPICIOUS_PATH_PATTERNS: [&str; 10] = [
    "download-free", "free-download", "prize-winner", "you-won", "verify-account",
    "suspended-account", "confirm-identity", "update-billing", "urgent-action",
    "account-locked",
];

static REDIRECT_PARAM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:redirect|url|next|return|goto|dest|target|rurl|link)=https?")
        .expect("redirect param regex")
});

/// Fixed-width numeric feature vector; slot i corresponds to
/// `FEATURE_NAMES[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values[i])
    }
}

fn shannon_entropy(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }
    let mut freq = [0u32; 256];
    let mut len = 0u32;
    for b in text.to_lowercase().bytes() {
        freq[b as usize] += 1;
        len += 1;
    }
    let len = f64::from(len);
    freq.iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = f64::from(c) / len;
            -p * p.log2()
        })
        .sum()
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

fn count_char(text: &str, target: char) -> f64 {
    text.chars().filter(|c| *c == target).count() as f64
}

fn longest_run<F: Fn(char) -> bool>(text: &str, pred: F) -> usize {
    let mut best = 0usize;
    let mut current = 0usize;
    for ch in text.chars() {
        if pred(ch) {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}

fn percent_encoded_count(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut count = 0;
    let mut i = 0;
    while i + 2 < bytes.len() {
        if bytes[i] == b'%'
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            count += 1;
            i += 3;
        } else {
            i += 1;
        }
    }
    count
}

fn has_base64_segment(path: &str, query: &str) -> bool {
    let mut segments = path
        .split(['/', '.'])
        .chain(query.split(['&', '='].as_ref()));
    segments.any(|seg| {
        seg.len() >= 20
            && seg
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
            && seg.chars().any(|c| c.is_ascii_digit())
            && seg.chars().any(|c| c.is_ascii_uppercase())
            && seg.chars().any(|c| c.is_ascii_lowercase())
    })
}

fn double_extension(path: &str) -> bool {
    let file = path.rsplit('/').next().unwrap_or("");
    let mut parts = file.rsplit('.');
    let last = parts.next().unwrap_or("");
    let second = parts.next();
    match second {
        Some(second) if !second.is_empty() && parts.next().is_some() => {
            let exec = |ext: &str| EXECUTABLE_EXTS.contains(&format!(".{}", ext).as_str());
            exec(last) || exec(second)
        }
        _ => false,
    }
}

fn effective_tld(registered_domain: &str) -> &str {
    registered_domain
        .split_once('.')
        .map(|(_, rest)| rest)
        .unwrap_or("")
}

/// Extract the 95-slot feature vector from a normalized URL alone.
/// Deterministic, allocation-light, and every output is finite.
pub fn extract(url: &NormalizedUrl) -> FeatureVector {
    let full = url.request_target();
    let host = url.host.as_str();
    let uhost = url.unicode_host.as_str();
    let path = url.path.as_str();
    let query = url.query.as_deref().unwrap_or("");
    let fragment = url.fragment.as_deref().unwrap_or("");

    let host_len = host.len().max(1) as f64;
    let full_len = full.len().max(1) as f64;

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    let digit_count_host = host.chars().filter(|c| c.is_ascii_digit()).count() as f64;
    let letter_count_host = host.chars().filter(|c| c.is_ascii_alphabetic()).count() as f64;
    let vowel_count = host
        .chars()
        .filter(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'))
        .count() as f64;

    let tld = effective_tld(&url.registered_domain);
    let tld_last = tld.rsplit('.').next().unwrap_or("");
    // Homograph analysis wants the display form of the main label, not
    // its xn-- encoding.
    let unicode_registered = if url.is_punycode {
        idna::domain_to_unicode(&url.registered_domain).0
    } else {
        url.registered_domain.clone()
    };
    let main_label = unicode_registered
        .split('.')
        .next()
        .unwrap_or(&unicode_registered);

    let subdomain_count = if url.is_ip_literal || host.len() <= url.registered_domain.len() {
        0.0
    } else {
        host[..host.len() - url.registered_domain.len()]
            .split('.')
            .filter(|l| !l.is_empty())
            .count() as f64
    };

    let (brand_distance, _closest) = homograph::min_brand_distance(main_label);

    let mut values = Vec::with_capacity(FEATURE_NAMES.len());

    // lexical
    values.push(full.len() as f64);
    values.push(host.len() as f64);
    values.push(path.len() as f64);
    values.push(query.len() as f64);
    values.push(fragment.len() as f64);
    values.push(digit_count_host / host_len);
    values.push(letter_count_host / host_len);
    values.push(
        full.chars()
            .filter(|c| matches!(c, '-' | '_' | '~' | '@' | '%' | '&' | '=' | '+'))
            .count() as f64,
    );
    values.push(longest_run(&full, |c| c.is_ascii_digit()) as f64);
    values.push(shannon_entropy(&host.replace('.', "")));
    values.push(shannon_entropy(path));
    values.push(shannon_entropy(&full));
    values.push(labels.iter().map(|l| l.len()).max().unwrap_or(0) as f64);
    values.push(if labels.is_empty() {
        0.0
    } else {
        labels.iter().map(|l| l.len()).sum::<usize>() as f64 / labels.len() as f64
    });
    values.push(labels.len() as f64);
    values.push(if letter_count_host > 0.0 {
        vowel_count / letter_count_host
    } else {
        0.0
    });

    // structural
    values.push(count_char(&full, '.'));
    values.push(count_char(&full, '/'));
    values.push(count_char(&full, '-'));
    values.push(count_char(&full, '_'));
    values.push(count_char(&full, '@'));
    values.push(count_char(&full, '&'));
    values.push(count_char(&full, '='));
    values.push(count_char(&full, '?'));
    values.push(count_char(&full, ';'));
    values.push(count_char(&full, '+'));
    values.push(count_char(&full, '~'));
    values.push(subdomain_count);
    values.push(path.split('/').filter(|s| !s.is_empty()).count() as f64);
    values.push(query.split('&').filter(|s| !s.is_empty()).count() as f64);
    values.push(flag(path.len() > 1 && path[1..].contains("//")));
    values.push(flag(url.fragment.is_some()));

    // keyword presence
    let path_lower = path.to_lowercase();
    let query_lower = query.to_lowercase();
    for token in SUSPICIOUS_TOKENS {
        values.push(flag(host.contains(token)));
        values.push(flag(path_lower.contains(token)));
        values.push(flag(query_lower.contains(token)));
    }

    // TLD
    values.push(tld.len() as f64);
    values.push(flag(HIGH_ABUSE_TLDS.contains(&tld_last)));
    values.push(flag(tld_last.len() == 2 && !url.is_ip_literal));
    values.push(flag(matches!(
        tld_last,
        "com" | "net" | "org" | "info" | "biz" | "name" | "pro"
    )));
    values.push(flag(
        TRUSTED_TLDS.contains(&tld) || TRUSTED_TLDS.contains(&tld_last),
    ));

    // host class
    values.push(flag(url.is_ip_literal));
    values.push(flag(url.is_punycode));
    values.push(flag(homograph::host_has_mixed_scripts(uhost)));
    values.push(flag(url.port.is_some()));
    values.push(flag(
        url.port.map(|p| p != 80 && p != 443).unwrap_or(false),
    ));
    values.push(url.port.map(f64::from).unwrap_or(-1.0));
    values.push(flag(host.starts_with("www.")));

    // encoding
    let encoded = percent_encoded_count(&full);
    values.push(encoded as f64);
    values.push(longest_run(&full, |c| c.is_ascii_hexdigit()) as f64);
    values.push(flag(has_base64_segment(path, query)));
    values.push((encoded * 3) as f64 / full_len);
    values.push(flag(full.to_lowercase().contains("%00")));
    values.push(digit_count_host);
    values.push(flag(labels.iter().any(|l| {
        l.len() >= 8 && l.chars().all(|c| c.is_ascii_hexdigit())
    })));

    // homograph
    values.push(homograph::confusable_char_count(uhost) as f64);
    values.push(brand_distance.min(24) as f64);
    values.push(flag(homograph::has_char_substitution(main_label)));
    values.push(flag(
        homograph::brand_token_in_host(uhost, &url.registered_domain).is_some(),
    ));
    values.push(flag(homograph::brand_in_subdomain(
        uhost,
        &url.registered_domain,
    )));

    // misc
    values.push(flag(url.scheme == crate::core::types::Scheme::Https));
    values.push(flag(
        SHORTENER_DOMAINS.contains(&url.registered_domain.as_str()),
    ));
    values.push(flag(
        EXECUTABLE_EXTS.iter().any(|ext| path_lower.ends_with(ext)),
    ));
    values.push(flag(double_extension(&path_lower)));
    values.push(flag(REDIRECT_PARAM_RE.is_match(&full)));
    values.push(flag(url.has_credentials));
    values.push(query.len() as f64 / full_len);
    values.push(path.len() as f64 / full_len);
    values.push(host.len() as f64 / full_len);
    values.push(longest_run(host, |c| {
        c.is_ascii_alphabetic() && !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
    }) as f64);
    values.push(path.chars().filter(|c| c.is_ascii_digit()).count() as f64);
    values.push(flag(
        SUSPICIOUS_PATH_PATTERNS.iter().any(|p| path_lower.contains(p)),
    ));

    debug_assert_eq!(values.len(), FEATURE_NAMES.len());
    FeatureVector { values }
}
