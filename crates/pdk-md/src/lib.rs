//! pdk-md
//!
//! Price oracle abstraction (pluggable quote providers).
//!
//! The ledger engine's read side (valuation) needs a current mark per
//! held symbol; this crate owns that abstraction and the concrete
//! TwelveData-backed provider. It does **not** participate in trade
//! execution — fill prices are caller-supplied at trade time.
//!
//! "No quote available" is a normal answer (`Ok(None)`), distinct from
//! both "priced at zero" and an infrastructure failure (`Err`).

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Deserialize;

use pdk_ledger::{price_to_micros, MarkMap};

/// Pluggable quote source interface.
#[async_trait::async_trait]
pub trait QuoteProvider: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// Current price for `symbol` in micros; `Ok(None)` if the provider
    /// has no quote for it.
    async fn quote(&self, symbol: &str) -> Result<Option<i64>>;
}

/// Fetch marks for a set of symbols, tolerating per-symbol gaps.
///
/// A symbol the provider errors on is treated the same as one it has no
/// quote for — the valuation must not abort because one symbol is stale.
pub async fn collect_marks(provider: &dyn QuoteProvider, symbols: &[String]) -> MarkMap {
    let mut marks = MarkMap::new();
    for sym in symbols {
        match provider.quote(sym).await {
            Ok(Some(px)) => {
                marks.insert(sym.clone(), px);
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(symbol = %sym, source = provider.source_name(), error = %err, "quote fetch failed; valuing as unpriced");
            }
        }
    }
    marks
}

// ---------------------------------------------------------------------------
// Static provider (tests / offline)
// ---------------------------------------------------------------------------

/// Fixed in-memory quote table. Deterministic; no network.
#[derive(Debug, Clone, Default)]
pub struct StaticQuoteProvider {
    marks: BTreeMap<String, i64>,
}

impl StaticQuoteProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_marks<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut marks = BTreeMap::new();
        for (sym, px) in items {
            marks.insert(sym.into(), px);
        }
        Self { marks }
    }

    pub fn set(&mut self, symbol: impl Into<String>, price_micros: i64) {
        self.marks.insert(symbol.into(), price_micros);
    }
}

#[async_trait::async_trait]
impl QuoteProvider for StaticQuoteProvider {
    fn source_name(&self) -> &'static str {
        "static"
    }

    async fn quote(&self, symbol: &str) -> Result<Option<i64>> {
        Ok(self.marks.get(symbol).copied())
    }
}

// ---------------------------------------------------------------------------
// TwelveData provider
// ---------------------------------------------------------------------------

/// TwelveData-backed quote provider (`GET /quote`).
///
/// API key is read by the caller and passed in; do not log it.
#[derive(Debug, Clone)]
pub struct TwelveDataQuoteProvider {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl TwelveDataQuoteProvider {
    pub fn new(api_key: String) -> Self {
        Self::new_with_base_url(api_key, "https://api.twelvedata.com".to_string())
    }

    pub fn new_with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn quote_url(&self) -> String {
        format!("{}/quote", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl QuoteProvider for TwelveDataQuoteProvider {
    fn source_name(&self) -> &'static str {
        "twelvedata"
    }

    async fn quote(&self, symbol: &str) -> Result<Option<i64>> {
        let resp = self
            .http
            .get(self.quote_url())
            .query(&[("symbol", symbol), ("apikey", self.api_key.as_str())])
            .send()
            .await
            .context("twelvedata request failed")?;

        let status = resp.status();
        let body: TwelveDataQuoteResponse = resp
            .json()
            .await
            .context("twelvedata response json decode failed")?;

        if !status.is_success() {
            anyhow::bail!(
                "twelvedata http error status={} message={}",
                status.as_u16(),
                body.status_message()
            );
        }

        // Vendor-level "unknown symbol" style errors come back as 200 with
        // a status:"error" body; that is an unavailable quote, not a fault.
        if body.status.as_deref() == Some("error") {
            return Ok(None);
        }

        let close = match body.close {
            Some(c) => c,
            None => return Ok(None),
        };

        match close.parse::<f64>() {
            Ok(px) if px > 0.0 => Ok(Some(
                price_to_micros(px).context("twelvedata close not representable")?,
            )),
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TwelveDataQuoteResponse {
    status: Option<String>,
    message: Option<String>,
    code: Option<i64>,
    close: Option<String>,
}

impl TwelveDataQuoteResponse {
    fn status_message(&self) -> String {
        match (&self.code, &self.message) {
            (Some(c), Some(m)) => format!("code={} {}", c, m),
            (_, Some(m)) => m.clone(),
            _ => "unknown".to_string(),
        }
    }
}

// -----------------
// Tests
// -----------------
