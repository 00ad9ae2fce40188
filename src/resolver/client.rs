use crate::config::{ProviderEndpoint, ResolverConfig};
use crate::errors::{AppError, AppResult, ProviderError, ProviderResult};
use crate::resolver::cache::{CacheStats, TransactionCache};
use crate::resolver::normalise::{normalise_record, normalise_records};
use crate::resolver::providers::{
    is_empty_answer, parse_raw_transaction, parse_transaction_output, parse_utxos,
    raw_transaction_url, transaction_url, utxos_url,
};
use crate::resolver::retry::{execute_with_timeout, pass_delay};
use crate::resolver::transport::HttpTransport;
use crate::types::{Coin, SingleCoinInfo};
use bitcoin::{Address, Network, OutPoint, Transaction, Txid};
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// What one provider said in answer to a query
enum Answer<T> {
    Found(T),
    /// Provider answered successfully but had nothing
    Empty,
}

/// Query issued to every provider in turn
#[derive(Clone, Copy)]
enum Query<'a> {
    Coins(&'a Address),
    Coin {
        address: &'a Address,
        outpoint: OutPoint,
        include_ancestors: bool,
    },
    RawTransaction(&'a Txid),
}

enum Reply {
    Coins(Vec<Coin>),
    Coin(SingleCoinInfo),
    RawTransaction(Transaction),
}

impl Query<'_> {
    fn describe(&self) -> String {
        match self {
            Query::Coins(address) => format!("unspent outputs of {}", address),
            Query::Coin { outpoint, .. } => format!("coin {}", outpoint),
            Query::RawTransaction(txid) => format!("transaction {}", txid),
        }
    }
}

/// Resolves spendable coins and previous transactions across chain-data providers
///
/// Every query walks the provider list in order and returns the first usable
/// answer. A failed provider is logged and counted, never raised; only when
/// every provider fails on every pass does the caller see
/// [`AppError::ResolutionFailure`].
pub struct CoinResolver {
    transport: Arc<dyn HttpTransport>,
    providers: Vec<ProviderEndpoint>,
    network: Network,
    max_attempts: usize,
    backoff_step_ms: u64,
    timeout_seconds: u64,
    error_count: Arc<AtomicU64>,
    cache: TransactionCache,
}

impl CoinResolver {
    pub fn new(config: &ResolverConfig, network: Network, transport: Arc<dyn HttpTransport>) -> Self {
        let providers: Vec<ProviderEndpoint> = config
            .providers
            .iter()
            .filter(|p| {
                let supported = p.kind.supports(network);
                if !supported {
                    debug!("Provider {} does not serve {}, skipping", p.name, network);
                }
                supported
            })
            .cloned()
            .collect();

        Self {
            transport,
            providers,
            network,
            max_attempts: config.max_attempts.max(1),
            backoff_step_ms: config.backoff_step_ms,
            timeout_seconds: config.request_timeout_seconds,
            error_count: Arc::new(AtomicU64::new(0)),
            cache: TransactionCache::new(),
        }
    }

    /// All spendable coins of `address`, in provider order
    ///
    /// An empty list means a provider positively reported no coins.
    pub async fn get_spendable_coins(&self, address: &Address) -> AppResult<Vec<Coin>> {
        match self.resolve(Query::Coins(address)).await? {
            Some(Reply::Coins(coins)) => Ok(coins),
            None => Ok(Vec::new()),
            Some(_) => Err(unexpected_reply("coins")),
        }
    }

    /// A single coin of `address`, optionally with its ancestor package
    pub async fn get_coin(
        &self,
        address: &Address,
        outpoint: OutPoint,
        include_ancestors: bool,
    ) -> AppResult<SingleCoinInfo> {
        let query = Query::Coin {
            address,
            outpoint,
            include_ancestors,
        };
        match self.resolve(query).await? {
            Some(Reply::Coin(info)) => Ok(info),
            _ => Err(AppError::ResolutionFailure {
                operation: query.describe(),
            }),
        }
    }

    /// Attach the ancestor package of every unconfirmed coin in `coins`
    ///
    /// Confirmed coins are left untouched. Lookups run `concurrency` at a
    /// time and any failure aborts, so an unconfirmed coin is never selected
    /// without its package known.
    pub async fn attach_ancestors(
        &self,
        address: &Address,
        coins: Vec<Coin>,
        concurrency: usize,
    ) -> AppResult<Vec<Coin>> {
        let pending = coins.iter().filter(|c| !c.confirmed).count();
        if pending == 0 {
            return Ok(coins);
        }
        debug!("Fetching ancestor packages for {} unconfirmed coins", pending);

        let results: Vec<AppResult<Coin>> = stream::iter(coins)
            .map(|coin| async move {
                if coin.confirmed {
                    return Ok::<Coin, AppError>(coin);
                }
                let info = self.get_coin(address, coin.outpoint(), true).await?;
                Ok(coin.with_ancestor(info.ancestor))
            })
            .buffered(concurrency.max(1))
            .collect()
            .await;
        results.into_iter().collect()
    }

    /// The full transaction `txid`, served from cache when already fetched
    pub async fn get_raw_transaction(&self, txid: &Txid) -> AppResult<Transaction> {
        if let Some(cached) = self.cache.get(txid) {
            return Ok(cached);
        }

        let query = Query::RawTransaction(txid);
        match self.resolve(query).await? {
            Some(Reply::RawTransaction(tx)) => {
                self.cache.put(tx.clone());
                Ok(tx)
            }
            _ => Err(AppError::ResolutionFailure {
                operation: query.describe(),
            }),
        }
    }

    /// Failed provider requests so far
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.get_stats()
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Walk `(pass, provider)` pairs until one provider answers
    ///
    /// `Ok(None)` means at least one provider answered empty during a pass in
    /// which none had data.
    async fn resolve(&self, query: Query<'_>) -> AppResult<Option<Reply>> {
        let operation = query.describe();

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let delay = pass_delay(attempt, self.backoff_step_ms);
                if !delay.is_zero() {
                    info!(
                        "All providers failed for {}, retrying in {:?} (attempt {}/{})",
                        operation,
                        delay,
                        attempt + 1,
                        self.max_attempts
                    );
                    sleep(delay).await;
                }
            }

            let mut answered_empty = false;
            for endpoint in &self.providers {
                match self.query_provider(endpoint, query).await {
                    Ok(Answer::Found(reply)) => {
                        if attempt > 0 {
                            debug!(
                                "Resolved {} via {} after {} passes",
                                operation,
                                endpoint.name,
                                attempt + 1
                            );
                        }
                        return Ok(Some(reply));
                    }
                    Ok(Answer::Empty) => {
                        debug!("{} returned nothing for {}, trying next provider", endpoint.name, operation);
                        answered_empty = true;
                    }
                    Err(e) => {
                        self.error_count.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            "Provider {} failed for {} on attempt {}/{}: {}",
                            endpoint.name,
                            operation,
                            attempt + 1,
                            self.max_attempts,
                            e
                        );
                    }
                }
            }

            if answered_empty {
                return Ok(None);
            }
        }

        error!(
            "All {} providers failed for {} after {} attempts",
            self.providers.len(),
            operation,
            self.max_attempts
        );
        Err(AppError::ResolutionFailure { operation })
    }

    async fn fetch(&self, endpoint: &ProviderEndpoint, url: String) -> ProviderResult<Option<String>> {
        debug!("GET {} ({})", url, endpoint.name);
        let response =
            execute_with_timeout(self.timeout_seconds, &url, self.transport.get(&url)).await?;

        if response.is_success() {
            Ok(Some(response.body))
        } else if is_empty_answer(endpoint.kind, response.status, &response.body) {
            Ok(None)
        } else {
            Err(ProviderError::Status {
                status: response.status,
                url,
            })
        }
    }

    async fn query_provider(
        &self,
        endpoint: &ProviderEndpoint,
        query: Query<'_>,
    ) -> ProviderResult<Answer<Reply>> {
        match query {
            Query::Coins(address) => {
                let url = utxos_url(endpoint, address, self.network);
                let Some(body) = self.fetch(endpoint, url).await? else {
                    return Ok(Answer::Empty);
                };
                let records = parse_utxos(endpoint.kind, &body)?;
                let coins = normalise_records(&records, endpoint.kind, address);
                if records.len() != coins.len() {
                    debug!(
                        "{} returned {} records, {} usable",
                        endpoint.name,
                        records.len(),
                        coins.len()
                    );
                }
                if coins.is_empty() {
                    Ok(Answer::Empty)
                } else {
                    Ok(Answer::Found(Reply::Coins(coins)))
                }
            }
            Query::Coin {
                address,
                outpoint,
                include_ancestors,
            } => {
                let url = transaction_url(endpoint, &outpoint.txid, self.network);
                let body = self
                    .fetch(endpoint, url)
                    .await?
                    .ok_or_else(|| ProviderError::NotFound(outpoint.to_string()))?;
                let output =
                    parse_transaction_output(endpoint.kind, &body, &outpoint.txid, outpoint.vout)?;
                let coin = normalise_record(&output.record, endpoint.kind, address)
                    .ok_or_else(|| {
                        ProviderError::Malformed(format!("Unusable output {}", outpoint))
                    })?
                    .with_coinbase(output.is_coinbase);
                let ancestor = if include_ancestors { output.ancestor } else { None };
                Ok(Answer::Found(Reply::Coin(SingleCoinInfo {
                    coin: coin.with_ancestor(ancestor),
                    ancestor,
                })))
            }
            Query::RawTransaction(txid) => {
                let url = raw_transaction_url(endpoint, txid, self.network);
                let body = self
                    .fetch(endpoint, url)
                    .await?
                    .ok_or_else(|| ProviderError::NotFound(txid.to_string()))?;
                let tx = parse_raw_transaction(endpoint.kind, &body, txid)?;
                Ok(Answer::Found(Reply::RawTransaction(tx)))
            }
        }
    }
}

fn unexpected_reply(expected: &str) -> AppError {
    AppError::InvalidData(format!("Resolver produced a reply other than {}", expected))
}
