use std::{
    collections::{HashMap, HashSet},
    net::IpAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::redirect::Policy;
use scraper::{Html, Selector};
use url::Url;

use crate::core::psl::SuffixList;
use crate::core::types::NormalizedUrl;
use crate::net::dns::is_private_or_reserved;

static JS_REDIRECT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:window\.|document\.)?location(?:\.href)?\s*=|location\.replace\s*\("#)
        .expect("js redirect regex")
});

#[derive(Debug, Default, Clone)]
pub struct HttpReport {
    pub status: Option<u16>,
    pub final_url: Option<String>,
    pub redirect_count: u32,
    pub content_flags: Vec<String>,
}

/// HTTP step of the network probe.
///
/// Redirects are followed manually so every hop can be checked: the
/// visited set breaks loops, non-web Location targets abort the chain and
/// private-range IP hops are refused outright. Concurrency is bounded
/// globally and per host; a probe that cannot get a slot inside its
/// budget is skipped rather than queued forever.
pub struct HttpProbe {
    client: reqwest::Client,
    psl: Arc<SuffixList>,
    global_slots: Arc<tokio::sync::Semaphore>,
    host_slots: Mutex<HashMap<String, Arc<tokio::sync::Semaphore>>>,
    per_host_limit: usize,
    max_redirects: u32,
    max_body_bytes: usize,
    slot_wait: Duration,
    block_private: bool,
}

impl HttpProbe {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        psl: Arc<SuffixList>,
        user_agent: &str,
        timeout: Duration,
        max_redirects: u32,
        max_body_bytes: usize,
        global_concurrency: usize,
        per_host_concurrency: usize,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(Policy::none())
            .build()?;
        Ok(Self {
            client,
            psl,
            global_slots: Arc::new(tokio::sync::Semaphore::new(global_concurrency.max(1))),
            host_slots: Mutex::new(HashMap::new()),
            per_host_limit: per_host_concurrency.max(1),
            max_redirects,
            max_body_bytes,
            slot_wait: timeout,
            block_private: true,
        })
    }

    /// Disable the private-range guard. Only probe fixtures served from
    /// loopback need this.
    #[doc(hidden)]
    pub fn allow_private_targets(mut self) -> Self {
        self.block_private = false;
        self
    }

    fn host_slot(&self, host: &str) -> Arc<tokio::sync::Semaphore> {
        let mut slots = self.host_slots.lock().expect("host slots poisoned");
        slots
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Semaphore::new(self.per_host_limit)))
            .clone()
    }

    pub async fn check(&self, url: &NormalizedUrl) -> HttpReport {
        let mut report = HttpReport::default();

        let global = match tokio::time::timeout(
            self.slot_wait,
            self.global_slots.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            _ => {
                tracing::warn!(host = %url.host, "HTTP pool saturated, probe skipped");
                return report;
            }
        };
        let host_slot = self.host_slot(&url.host);
        let _host = match tokio::time::timeout(self.slot_wait, host_slot.acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            _ => {
                tracing::warn!(host = %url.host, "per-host pool saturated, probe skipped");
                return report;
            }
        };
        let _global = global;

        let mut current = url.request_target();
        let mut visited: HashSet<String> = HashSet::new();

        loop {
            if self.block_private {
                if let Some(flag) = ssrf_flag(&current) {
                    report.content_flags.push(flag);
                    break;
                }
            }
            if !visited.insert(current.clone()) {
                report.content_flags.push("redirect_loop".to_string());
                break;
            }

            let response = match self.client.get(&current).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!(url = %current, error = %e, "HTTP request failed");
                    break;
                }
            };

            let status = response.status();
            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::trim)
                    .unwrap_or_default()
                    .to_string();
                if location.is_empty() {
                    report.status = Some(status.as_u16());
                    report.final_url = Some(current);
                    break;
                }

                let next = match Url::parse(&current).ok().and_then(|base| base.join(&location).ok())
                {
                    Some(next) => next,
                    None => {
                        report.status = Some(status.as_u16());
                        report.final_url = Some(current);
                        break;
                    }
                };
                if !matches!(next.scheme(), "http" | "https") {
                    // Chain tries to leave the web; stop here.
                    report.content_flags.push("non_web_redirect".to_string());
                    report.status = Some(status.as_u16());
                    report.final_url = Some(current);
                    break;
                }

                if report.redirect_count >= self.max_redirects {
                    report.redirect_count += 1;
                    report.final_url = Some(next.to_string());
                    break;
                }
                report.redirect_count += 1;
                current = next.to_string();
                continue;
            }

            report.status = Some(status.as_u16());
            report.final_url = Some(response.url().to_string());

            let is_html = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_lowercase().contains("text/html"))
                .unwrap_or(false);
            if status.as_u16() == 200 && is_html {
                let page_url = response.url().clone();
                if let Some(body) = self.read_capped(response).await {
                    let flags = inspect_content(&body, &page_url, &self.psl);
                    report.content_flags.extend(flags);
                }
            }
            break;
        }

        report
    }

    async fn read_capped(&self, mut response: reqwest::Response) -> Option<String> {
        if let Some(len) = response.content_length() {
            if len as usize > self.max_body_bytes {
                return None;
            }
        }
        let mut buf: Vec<u8> = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    buf.extend_from_slice(&chunk);
                    if buf.len() > self.max_body_bytes {
                        buf.truncate(self.max_body_bytes);
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "body read failed mid-stream");
                    break;
                }
            }
        }
        Some(String::from_utf8_lossy(&buf).to_string())
    }
}

fn ssrf_flag(target: &str) -> Option<String> {
    let host = Url::parse(target).ok()?.host_str()?.to_string();
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    match bare.parse::<IpAddr>() {
        Ok(addr) if is_private_or_reserved(addr) => Some("ssrf_blocked".to_string()),
        _ => None,
    }
}

/// Scan the first chunk of an HTML body for behavioral red flags.
pub fn inspect_content(body: &str, page_url: &Url, psl: &SuffixList) -> Vec<String> {
    let mut flags = Vec::new();
    let lower = body.to_lowercase();
    let document = Html::parse_document(body);

    let meta_refresh = Selector::parse(r#"meta[http-equiv]"#).expect("meta selector");
    if document.select(&meta_refresh).any(|el| {
        el.value()
            .attr("http-equiv")
            .map(|v| v.eq_ignore_ascii_case("refresh"))
            .unwrap_or(false)
    }) {
        flags.push("meta_refresh".to_string());
    }

    if JS_REDIRECT_RE.is_match(&lower) {
        flags.push("js_redirect".to_string());
    }

    let password_input = Selector::parse(r#"input[type="password"]"#).expect("password selector");
    let has_password_field = document.select(&password_input).next().is_some();
    if has_password_field {
        flags.push("password_field".to_string());
    }

    // A form with a password field posting to a different registered
    // domain than the page itself.
    if has_password_field {
        let forms = Selector::parse("form").expect("form selector");
        let page_host = page_url.host_str().unwrap_or_default().to_lowercase();
        let page_domain = psl.registered_domain(&page_host);
        for form in document.select(&forms) {
            let has_password = form.select(&password_input).next().is_some();
            if !has_password {
                continue;
            }
            let Some(action) = form.value().attr("action") else {
                continue;
            };
            let Some(action_url) = page_url.join(action.trim()).ok() else {
                continue;
            };
            let Some(action_host) = action_url.host_str() else {
                continue;
            };
            if psl.registered_domain(&action_host.to_lowercase()) != page_domain {
                flags.push("login_on_nondomain".to_string());
                break;
            }
        }
    }

    if lower.contains("credit card") || lower.contains("billing address") || lower.contains("cvv")
    {
        flags.push("billing_info_request".to_string());
    }
    if lower.contains("eval(atob(") || lower.contains("eval(unescape(") {
        flags.push("obfuscated_javascript".to_string());
    }
    if lower.matches("<iframe").count() > 3 {
        flags.push("excessive_iframes".to_string());
    }

    flags
}
