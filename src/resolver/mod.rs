//! Coin Resolver
//!
//! - **Client** - [`CoinResolver`], failover across providers with linear back-off
//! - **Providers** - URL shapes and response parsing per provider
//! - **Normalise** - lowering heterogeneous UTXO records into [`crate::types::Coin`]
//! - **Counterparty** - protocol-bearing coin lookup used for exclusion
//! - **Cache** - previous transactions already fetched during a build
//! - **Transport** - the HTTP seam, `reqwest` in production
//! - **Retry** - pass delays and request timeouts

pub mod cache;
pub mod client;
pub mod counterparty;
pub mod normalise;
pub mod providers;
pub mod retry;
pub mod transport;

pub use cache::{CacheStats, TransactionCache};
pub use client::CoinResolver;
pub use counterparty::CounterpartyClient;
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};
