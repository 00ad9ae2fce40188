//! Counterparty balance lookup for protocol-bearing coins
//!
//! Assets attached to a UTXO travel with it, so spending such a coin as plain
//! funding would move the asset. The engine asks a Counterparty API v2 node for
//! every balance held by the funding address and excludes the outpoints that
//! carry one.

use crate::config::CounterpartyConfig;
use crate::errors::{AppError, AppResult, ProviderError, ProviderResult};
use crate::resolver::retry::execute_with_timeout;
use crate::resolver::transport::HttpTransport;
use bitcoin::{Address, OutPoint};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    #[serde(default)]
    quantity: Value,
    #[serde(default)]
    utxo: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BalancesPage {
    #[serde(default)]
    result: Vec<BalanceEntry>,
    #[serde(default)]
    next_cursor: Value,
}

impl BalanceEntry {
    fn has_quantity(&self) -> bool {
        match &self.quantity {
            Value::Number(n) => n.as_f64().map(|q| q > 0.0).unwrap_or(false),
            Value::String(s) => s.parse::<f64>().map(|q| q > 0.0).unwrap_or(false),
            _ => false,
        }
    }
}

/// Cursor as a query value; Counterparty returns numbers or strings
fn cursor_value(cursor: &Value) -> Option<String> {
    match cursor {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Parse a `txid:vout` reference
pub fn parse_utxo_ref(utxo: &str) -> Option<OutPoint> {
    OutPoint::from_str(utxo.trim()).ok()
}

pub struct CounterpartyClient {
    transport: Arc<dyn HttpTransport>,
    nodes: Vec<String>,
    page_limit: usize,
    max_pages: usize,
    timeout_seconds: u64,
    error_count: AtomicU64,
}

impl CounterpartyClient {
    pub fn new(
        config: &CounterpartyConfig,
        timeout_seconds: u64,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            transport,
            nodes: config.nodes.clone(),
            page_limit: config.page_limit,
            max_pages: config.max_pages,
            timeout_seconds,
            error_count: AtomicU64::new(0),
        }
    }

    /// Outpoints of `address` that carry a Counterparty balance
    ///
    /// Nodes are tried in order; if none answers completely the lookup fails so
    /// the build never proceeds without knowing which coins to avoid.
    pub async fn protocol_outpoints(&self, address: &Address) -> AppResult<HashSet<OutPoint>> {
        for node in &self.nodes {
            match self.fetch_from_node(node, address).await {
                Ok(outpoints) => {
                    info!(
                        "{} reports {} protocol-bearing coins for {}",
                        node,
                        outpoints.len(),
                        address
                    );
                    return Ok(outpoints);
                }
                Err(e) => {
                    self.error_count.fetch_add(1, Ordering::Relaxed);
                    warn!("Counterparty node {} failed for {}: {}", node, address, e);
                }
            }
        }

        Err(AppError::ResolutionFailure {
            operation: format!("protocol balance lookup for {}", address),
        })
    }

    async fn fetch_from_node(&self, node: &str, address: &Address) -> ProviderResult<HashSet<OutPoint>> {
        let mut outpoints = HashSet::new();
        let mut cursor: Option<String> = None;

        for page in 0..self.max_pages {
            let mut url = format!(
                "{}/addresses/{}/balances?limit={}",
                node.trim_end_matches('/'),
                address,
                self.page_limit
            );
            if let Some(cursor) = &cursor {
                url.push_str(&format!("&cursor={}", cursor));
            }

            let response =
                execute_with_timeout(self.timeout_seconds, &url, self.transport.get(&url)).await?;
            if !(200..300).contains(&response.status) {
                return Err(ProviderError::Status {
                    status: response.status,
                    url,
                });
            }

            let parsed: BalancesPage = serde_json::from_str(&response.body)?;
            for entry in parsed.result.iter().filter(|e| e.has_quantity()) {
                let Some(utxo) = entry.utxo.as_deref().filter(|u| !u.is_empty()) else {
                    continue;
                };
                match parse_utxo_ref(utxo) {
                    Some(outpoint) => {
                        outpoints.insert(outpoint);
                    }
                    None => debug!("Ignoring unparseable utxo reference {}", utxo),
                }
            }

            let next = cursor_value(&parsed.next_cursor);
            if next.is_none() || next == cursor {
                debug!("Balance paging for {} finished after {} pages", address, page + 1);
                return Ok(outpoints);
            }
            cursor = next;
        }

        warn!(
            "Stopped paging balances for {} after {} pages",
            address, self.max_pages
        );
        Ok(outpoints)
    }

    /// Failed node requests so far
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }
}
