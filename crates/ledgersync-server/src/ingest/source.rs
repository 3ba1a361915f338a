//! Source system access for the full sync
//!
//! The ERP exposes its data as XML collection exports over HTTP. Each
//! syncable table maps to one collection; the three voucher tables share
//! the `Voucher` collection.

use async_trait::async_trait;
use ledgersync_common::{Table, TenantScope};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Source returned HTTP {status} for collection {collection}")]
    Status { status: u16, collection: String },

    #[error("Source request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Table {0} is not exported by the source")]
    Unsupported(Table),

    #[error("No payload for collection {0}")]
    Missing(String),

    #[error("Source is unreachable: {0}")]
    Unreachable(String),
}

/// Export collection holding the rows of `table`.
pub fn collection_for(table: Table) -> Option<&'static str> {
    match table {
        Table::Companies | Table::Divisions => None,
        Table::Groups => Some("Group"),
        Table::Ledgers => Some("Ledger"),
        Table::Units => Some("Unit"),
        Table::StockGroups => Some("StockGroup"),
        Table::StockItems => Some("StockItem"),
        Table::Godowns => Some("Godown"),
        Table::CostCentres => Some("CostCentre"),
        Table::VoucherTypes => Some("VoucherType"),
        Table::Vouchers | Table::LedgerEntries | Table::InventoryEntries => Some("Voucher"),
    }
}

/// Read access to the source system.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Raw XML export of the collection behind `table`.
    async fn fetch_collection(&self, scope: &TenantScope, collection: &str) -> Result<String, SourceError>;

    async fn ping(&self) -> Result<(), SourceError>;

    async fn fetch_table(&self, scope: &TenantScope, table: Table) -> Result<String, SourceError> {
        let collection = collection_for(table).ok_or(SourceError::Unsupported(table))?;
        self.fetch_collection(scope, collection).await
    }
}

/// Export request envelope for one collection.
fn export_request(collection: &str, company: Option<&str>) -> String {
    let company = company
        .map(|c| format!("<SVCURRENTCOMPANY>{}</SVCURRENTCOMPANY>", quick_xml::escape::escape(c)))
        .unwrap_or_default();
    format!(
        "<ENVELOPE>\
<HEADER><VERSION>1</VERSION><TALLYREQUEST>Export</TALLYREQUEST><TYPE>Collection</TYPE><ID>LedgerSync{collection}</ID></HEADER>\
<BODY><DESC><STATICVARIABLES><SVEXPORTFORMAT>$$SysName:XML</SVEXPORTFORMAT>{company}</STATICVARIABLES>\
<TDL><TDLMESSAGE><COLLECTION NAME=\"LedgerSync{collection}\"><TYPE>{collection}</TYPE><FETCH>*</FETCH></COLLECTION></TDLMESSAGE></TDL>\
</DESC></BODY></ENVELOPE>"
    )
}

/// HTTP client for the source's XML export endpoint.
pub struct HttpSourceClient {
    client: Client,
    base_url: String,
    company: Option<String>,
    timeout: Duration,
}

impl HttpSourceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(concat!("ledgersync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            company: None,
            timeout,
        })
    }

    /// Company name selected in export requests.
    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    async fn post(&self, body: String) -> Result<reqwest::Response, SourceError> {
        let request = self
            .client
            .post(&self.base_url)
            .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=utf-8")
            .body(body)
            .send();
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| SourceError::Timeout(self.timeout))?
            .map_err(SourceError::from)
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    #[tracing::instrument(skip(self, scope), fields(scope = %scope))]
    async fn fetch_collection(&self, scope: &TenantScope, collection: &str) -> Result<String, SourceError> {
        let started = std::time::Instant::now();
        let response = self
            .post(export_request(collection, self.company.as_deref()))
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                collection: collection.to_string(),
            });
        }

        let body = tokio::time::timeout(self.timeout, response.text())
            .await
            .map_err(|_| SourceError::Timeout(self.timeout))??;

        tracing::info!(
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetched collection"
        );
        Ok(body)
    }

    async fn ping(&self) -> Result<(), SourceError> {
        let response = tokio::time::timeout(self.timeout, self.client.get(&self.base_url).send())
            .await
            .map_err(|_| SourceError::Timeout(self.timeout))?
            .map_err(|e| SourceError::Unreachable(e.to_string()))?;
        if response.status().is_server_error() {
            return Err(SourceError::Unreachable(format!("HTTP {}", response.status())));
        }
        Ok(())
    }
}

/// Fixed payloads keyed by collection, for tests and offline replay.
#[derive(Default)]
pub struct StaticSource {
    payloads: HashMap<String, String>,
    offline: bool,
    fetches: AtomicUsize,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, collection: impl Into<String>, payload: impl Into<String>) -> Self {
        self.payloads.insert(collection.into(), payload.into());
        self
    }

    /// Serve `payload` as the collection behind `table`.
    pub fn with_table(self, table: Table, payload: impl Into<String>) -> Self {
        match collection_for(table) {
            Some(collection) => self.with_collection(collection, payload),
            None => self,
        }
    }

    /// Make `ping` fail.
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// Number of collection fetches served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SourceClient for StaticSource {
    async fn fetch_collection(&self, _scope: &TenantScope, collection: &str) -> Result<String, SourceError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.payloads
            .get(collection)
            .cloned()
            .ok_or_else(|| SourceError::Missing(collection.to_string()))
    }

    async fn ping(&self) -> Result<(), SourceError> {
        if self.offline {
            return Err(SourceError::Unreachable("static source is offline".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scope() -> TenantScope {
        TenantScope::new(Uuid::from_u128(1), Uuid::from_u128(2))
    }

    #[test]
    fn test_voucher_tables_share_collection() {
        assert_eq!(collection_for(Table::Vouchers), Some("Voucher"));
        assert_eq!(collection_for(Table::LedgerEntries), Some("Voucher"));
        assert_eq!(collection_for(Table::InventoryEntries), Some("Voucher"));
        assert!(collection_for(Table::Companies).is_none());
        assert!(Table::syncable().all(|t| collection_for(t).is_some()));
    }

    #[test]
    fn test_export_request_escapes_company() {
        let request = export_request("Ledger", Some("R & D Ltd"));
        assert!(request.contains("<TYPE>Ledger</TYPE>"));
        assert!(request.contains("<SVCURRENTCOMPANY>R &amp; D Ltd</SVCURRENTCOMPANY>"));
        assert!(!export_request("Unit", None).contains("SVCURRENTCOMPANY"));
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticSource::new().with_table(Table::Ledgers, "<LEDGER NAME=\"Cash\"></LEDGER>");

        let body = source.fetch_table(&scope(), Table::Ledgers).await.unwrap();
        assert!(body.contains("Cash"));
        assert!(matches!(
            source.fetch_table(&scope(), Table::Units).await,
            Err(SourceError::Missing(c)) if c == "Unit"
        ));
        assert!(matches!(
            source.fetch_table(&scope(), Table::Divisions).await,
            Err(SourceError::Unsupported(Table::Divisions))
        ));
        assert_eq!(source.fetch_count(), 2);
        assert!(source.ping().await.is_ok());
        assert!(StaticSource::new().offline().ping().await.is_err());
    }

    #[tokio::test]
    async fn test_http_client_unreachable() {
        let client = HttpSourceClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        assert!(client.ping().await.is_err());
    }
}
