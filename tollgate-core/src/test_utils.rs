//! In-memory stores, stub sources and a tiny HTTP fixture server for tests.

use crate::config::{AssetConfig, ChainConfig, DEFAULT_PAGE_SIZE, DEFAULT_SCAN_INTERVAL, HttpConfig};
use crate::entities::dispatch_jobs::{DispatchJobRecord, NewDispatchJob};
use crate::entities::order_records::OrderRecord;
use crate::entities::{ChainName, DispatchStatus, OrderStatus};
use crate::notifier::Notifier;
use crate::sources::{DepositEvent, DepositSource, SourceError};
use crate::stores::{DispatchQueue, OrderStore, StoreError, Transition, WalletPool};
use crate::utils::http_client::HttpClient;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::types::Json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tollgate_sdk::objects::Chain;
use url::Url;
use uuid::Uuid;

pub const TEST_ASSET: &str = "0x357b0b74bc833e95a115ad22604854d6b0fca151cecd94111770e5d6ffc9dc2b";
pub const APTOS_DEPOSIT: &str = "0x1::fungible_asset::Deposit";

pub fn datetime_from_millis(ms: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).unwrap()
}

/// A pending Aptos order created at `created_at_ms`.
pub fn pending_order(
    trade_id: &str,
    wallet: &str,
    actual_amount: Decimal,
    created_at_ms: i64,
) -> OrderRecord {
    OrderRecord {
        trade_id: trade_id.to_string(),
        order_id: format!("merchant-{trade_id}"),
        chain: ChainName::Aptos,
        wallet_address: wallet.to_string(),
        amount: Decimal::new(75, 0),
        actual_amount,
        notify_url: "http://merchant.invalid/notify".to_string(),
        status: OrderStatus::Pending,
        block_transaction_id: None,
        created_at: datetime_from_millis(created_at_ms),
        paid_at: None,
    }
}

/// A successful incoming Aptos deposit of the test asset.
pub fn deposit_event(wallet: &str, amount: Decimal, observed_at_ms: i64) -> DepositEvent {
    DepositEvent {
        chain: ChainName::Aptos,
        external_tx_id: format!("{observed_at_ms}"),
        recipient_address: wallet.to_string(),
        asset_type: TEST_ASSET.to_string(),
        success: true,
        transfer_type: APTOS_DEPOSIT.to_string(),
        amount,
        observed_at_ms,
    }
}

pub fn chain_config(chain: Chain, asset_type: &str) -> ChainConfig {
    ChainConfig {
        chain,
        interval: DEFAULT_SCAN_INTERVAL,
        endpoint: Url::parse("http://127.0.0.1:9/").unwrap(),
        api_key: None,
        asset: AssetConfig {
            asset_type: asset_type.to_string(),
            decimals: 6,
        },
        deposit_marker: "::deposit".to_string(),
        page_size: DEFAULT_PAGE_SIZE,
        evm_chain_id: (chain == Chain::Polygon).then_some(137),
    }
}

pub fn test_http_client() -> HttpClient {
    HttpClient::new(HttpConfig {
        timeout: Duration::from_secs(5),
        retries: 1,
    })
    .unwrap()
}

/// Orders plus the dispatch queue their settlements write to.
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: Mutex<HashMap<String, OrderRecord>>,
    queue: Arc<MemoryDispatchQueue>,
    pub fail_lookups: AtomicBool,
    pub mark_paid_calls: AtomicUsize,
}

impl MemoryOrderStore {
    pub fn with_orders(orders: impl IntoIterator<Item = OrderRecord>) -> Self {
        let store = Self::default();
        for order in orders {
            store.insert(order);
        }
        store
    }

    pub fn insert(&self, order: OrderRecord) {
        self.orders
            .lock()
            .unwrap()
            .insert(order.trade_id.clone(), order);
    }

    pub fn get(&self, trade_id: &str) -> Option<OrderRecord> {
        self.orders.lock().unwrap().get(trade_id).cloned()
    }

    /// The queue that settlements enqueue into.
    pub fn queue(&self) -> Arc<MemoryDispatchQueue> {
        self.queue.clone()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn order_by_trade_id(&self, trade_id: &str) -> Result<Option<OrderRecord>, StoreError> {
        self.check_available()?;
        Ok(self.get(trade_id))
    }

    async fn pending_trade_ids(
        &self,
        chain: ChainName,
        wallet: &str,
        amount: Decimal,
    ) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        Ok(self
            .orders
            .lock()
            .unwrap()
            .values()
            .filter(|o| {
                o.chain == chain
                    && o.status == OrderStatus::Pending
                    && o.wallet_address.eq_ignore_ascii_case(wallet)
                    && o.actual_amount == amount
            })
            .map(|o| o.trade_id.clone())
            .collect())
    }

    async fn mark_paid(
        &self,
        trade_id: &str,
        block_transaction_id: &str,
        paid_at: OffsetDateTime,
        webhook: NewDispatchJob,
    ) -> Result<Transition, StoreError> {
        self.mark_paid_calls.fetch_add(1, Ordering::SeqCst);
        let mut orders = self.orders.lock().unwrap();
        let Some(order) = orders.get_mut(trade_id) else {
            return Ok(Transition::NotFound);
        };
        match order.status {
            OrderStatus::Pending => {
                // Queue first so a failed insert leaves the order untouched.
                self.queue.push(webhook)?;
                order.status = OrderStatus::Paid;
                order.block_transaction_id = Some(block_transaction_id.to_string());
                order.paid_at = Some(paid_at);
                Ok(Transition::Applied(order.clone()))
            }
            OrderStatus::Paid => Ok(Transition::AlreadySettled),
            other => Ok(Transition::NotPending(other)),
        }
    }
}

#[derive(Default)]
pub struct MemoryWalletPool {
    wallets: Mutex<HashMap<ChainName, Vec<String>>>,
    pub calls: AtomicUsize,
}

impl MemoryWalletPool {
    pub fn with_wallets(chain: ChainName, wallets: &[&str]) -> Self {
        let pool = Self::default();
        pool.wallets
            .lock()
            .unwrap()
            .insert(chain, wallets.iter().map(|w| w.to_string()).collect());
        pool
    }
}

#[async_trait]
impl WalletPool for MemoryWalletPool {
    async fn locked_wallets(&self, chain: ChainName) -> Result<Vec<String>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .wallets
            .lock()
            .unwrap()
            .get(&chain)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MemoryDispatchQueue {
    jobs: Mutex<Vec<DispatchJobRecord>>,
    pub fail_enqueue: AtomicBool,
}

impl MemoryDispatchQueue {
    pub fn jobs(&self) -> Vec<DispatchJobRecord> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn job(&self, id: Uuid) -> DispatchJobRecord {
        self.jobs()
            .into_iter()
            .find(|j| j.id == id)
            .unwrap()
    }

    /// Make every queued job due now.
    pub fn make_all_due(&self) {
        let now = OffsetDateTime::now_utc();
        for job in self.jobs.lock().unwrap().iter_mut() {
            job.next_attempt_at = now;
        }
    }

    fn push(&self, job: NewDispatchJob) -> Result<(), StoreError> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("queue offline".to_string()));
        }
        let now = OffsetDateTime::now_utc();
        self.jobs.lock().unwrap().push(DispatchJobRecord {
            id: job.id,
            payload: Json(job.payload),
            notify_url: job.notify_url,
            status: DispatchStatus::Queued,
            attempts: 0,
            max_retry: job.max_retry as i32,
            next_attempt_at: now,
            last_error: None,
            created_at: now,
        });
        Ok(())
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut DispatchJobRecord)) {
        if let Some(job) = self.jobs.lock().unwrap().iter_mut().find(|j| j.id == id) {
            f(job);
        }
    }
}

#[async_trait]
impl DispatchQueue for MemoryDispatchQueue {
    async fn enqueue(&self, job: NewDispatchJob) -> Result<(), StoreError> {
        self.push(job)
    }

    async fn claim_due(&self, limit: u32) -> Result<Vec<DispatchJobRecord>, StoreError> {
        let now = OffsetDateTime::now_utc();
        let mut jobs = self.jobs.lock().unwrap();
        let mut claimed = Vec::new();
        for job in jobs.iter_mut() {
            if claimed.len() as u32 >= limit {
                break;
            }
            if job.status == DispatchStatus::Queued && job.next_attempt_at <= now {
                job.next_attempt_at = now + Duration::from_secs(300);
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_delivered(&self, id: Uuid) -> Result<(), StoreError> {
        self.update(id, |job| {
            job.status = DispatchStatus::Delivered;
            job.attempts += 1;
            job.last_error = None;
        });
        Ok(())
    }

    async fn reschedule(
        &self,
        id: Uuid,
        attempts: u32,
        next_attempt_at: OffsetDateTime,
        error: String,
    ) -> Result<(), StoreError> {
        self.update(id, |job| {
            job.attempts = attempts as i32;
            job.next_attempt_at = next_attempt_at;
            job.last_error = Some(error);
        });
        Ok(())
    }

    async fn bury(&self, id: Uuid, attempts: u32, error: String) -> Result<(), StoreError> {
        self.update(id, |job| {
            job.status = DispatchStatus::Dead;
            job.attempts = attempts as i32;
            job.last_error = Some(error);
        });
        Ok(())
    }
}

/// What a [`StubSource`] does for one address.
#[derive(Debug, Clone)]
pub enum StubPage {
    Events(Vec<DepositEvent>),
    Fail,
    Panic,
    /// Sleep before answering with the events.
    Slow(Duration, Vec<DepositEvent>),
}

pub struct StubSource {
    chain: ChainName,
    pages: Mutex<HashMap<String, StubPage>>,
    pub calls: AtomicUsize,
}

impl StubSource {
    pub fn new(chain: ChainName) -> Self {
        Self {
            chain,
            pages: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_page(self, address: &str, page: StubPage) -> Self {
        self.pages.lock().unwrap().insert(address.to_string(), page);
        self
    }
}

#[async_trait]
impl DepositSource for StubSource {
    fn chain(&self) -> ChainName {
        self.chain
    }

    async fn fetch(&self, address: &str) -> Result<Vec<DepositEvent>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let page = self.pages.lock().unwrap().get(address).cloned();
        match page {
            None => Ok(Vec::new()),
            Some(StubPage::Events(events)) => Ok(events),
            Some(StubPage::Fail) => Err(SourceError::UpstreamStatus { status: 503 }),
            Some(StubPage::Panic) => panic!("stub source panicked for {address}"),
            Some(StubPage::Slow(delay, events)) => {
                tokio::time::sleep(delay).await;
                Ok(events)
            }
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: String) {
        self.messages.lock().unwrap().push(message);
    }
}

#[derive(Debug, Clone)]
struct RecordedRequest {
    target: String,
    headers: Vec<(String, String)>,
    body: String,
}

/// A local HTTP server answering with canned responses.
pub struct Fixture {
    pub url: Url,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl Fixture {
    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Request targets (path and query) in arrival order.
    pub fn targets(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.target.clone())
            .collect()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.body.clone())
            .collect()
    }

    /// Value of `name` (case-insensitive) on the `index`-th request.
    pub fn header(&self, index: usize, name: &str) -> Option<String> {
        self.requests.lock().unwrap().get(index).and_then(|r| {
            r.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        })
    }
}

/// Serve `responses` in order; once they run out the last one repeats.
pub async fn serve_fixture(responses: Vec<(u16, String)>) -> Fixture {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let index = recorded.lock().unwrap().len();
            let (status, body) = responses
                .get(index)
                .or_else(|| responses.last())
                .cloned()
                .unwrap_or((200, String::new()));
            handle_connection(stream, status, body, recorded.clone()).await;
        }
    });

    Fixture {
        url: Url::parse(&format!("http://{addr}/")).unwrap(),
        requests,
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    status: u16,
    body: String,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let Ok(n) = stream.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let target = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let Ok(n) = stream.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let request_body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    recorded.lock().unwrap().push(RecordedRequest {
        target,
        headers,
        body: request_body,
    });

    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}
