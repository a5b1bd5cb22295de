//! Fiat exchange rates of the two supported assets.

use async_trait::async_trait;
use rampay_common::{Asset, Fiat, PaymentError};
use rampay_config::Config;
use serde::Serialize;
use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use url::Url;

/// Price of one unit of an asset in every supported fiat currency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct FiatRates {
    pub inr: f64,
    pub usd: f64,
}

impl FiatRates {
    pub const fn get(&self, fiat: Fiat) -> f64 {
        match fiat {
            Fiat::Inr => self.inr,
            Fiat::Usd => self.usd,
        }
    }
}

/// A snapshot of exchange rates, replaced wholesale on every refresh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Quote {
    pub native: FiatRates,
    pub token: FiatRates,
}

impl Quote {
    /// Fiat price of one unit of `asset`.
    pub const fn rate(&self, asset: Asset, fiat: Fiat) -> f64 {
        match asset {
            Asset::Native => self.native.get(fiat),
            Asset::Token => self.token.get(fiat),
        }
    }
}

/// A source of [`Quote`]s.
#[async_trait]
pub trait PriceFeed: Send + Sync + fmt::Debug {
    async fn fetch(&self) -> Result<Quote, PaymentError>;
}

/// The CoinGecko `simple/price` endpoint.
#[derive(Clone, Debug)]
pub struct CoinGecko {
    client: reqwest::Client,
    url: Url,
    native_id: String,
    token_id: String,
}

impl CoinGecko {
    /// Queries `endpoint` for the `native_id` and `token_id` prices in every [`Fiat`].
    pub fn new(endpoint: &str, native_id: &str, token_id: &str) -> Result<Self, PaymentError> {
        let vs_currencies = Fiat::ALL.map(|fiat| fiat.code()).join(",");
        let url = Url::parse_with_params(
            endpoint,
            [("ids", format!("{native_id},{token_id}")), ("vs_currencies", vs_currencies)],
        )
        .map_err(|err| PaymentError::invalid_input(format!("invalid price feed url: {err}")))?;
        Ok(Self {
            client: reqwest::Client::new(),
            url,
            native_id: native_id.to_string(),
            token_id: token_id.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, PaymentError> {
        Self::new(&config.price_feed_url, &config.native.price_id, &config.token.price_id)
    }

    /// The full request url.
    pub fn url(&self) -> &Url {
        &self.url
    }

    fn rates(
        body: &HashMap<String, HashMap<String, f64>>,
        id: &str,
    ) -> Result<FiatRates, PaymentError> {
        let prices = body
            .get(id)
            .ok_or_else(|| PaymentError::FetchFailed(format!("missing prices for `{id}`")))?;
        let price = |fiat: Fiat| {
            prices.get(fiat.code()).copied().ok_or_else(|| {
                PaymentError::FetchFailed(format!("missing {fiat} price for `{id}`"))
            })
        };
        Ok(FiatRates { inr: price(Fiat::Inr)?, usd: price(Fiat::Usd)? })
    }
}

#[async_trait]
impl PriceFeed for CoinGecko {
    async fn fetch(&self) -> Result<Quote, PaymentError> {
        let res = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|err| PaymentError::FetchFailed(err.to_string()))?;

        let status = res.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(PaymentError::RateLimited);
        }
        if !status.is_success() {
            return Err(PaymentError::FetchFailed(format!("price feed returned {status}")));
        }

        let bytes = res.bytes().await.map_err(|err| PaymentError::FetchFailed(err.to_string()))?;
        let body: HashMap<String, HashMap<String, f64>> = serde_json::from_slice(&bytes)
            .map_err(|err| PaymentError::FetchFailed(format!("invalid price payload: {err}")))?;

        Ok(Quote {
            native: Self::rates(&body, &self.native_id)?,
            token: Self::rates(&body, &self.token_id)?,
        })
    }
}

/// Observable state of the [`QuoteService`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuoteState {
    /// The last good quote. Kept when a later fetch fails.
    pub quote: Option<Quote>,
    pub error: Option<PaymentError>,
    /// Fetches that have started and not yet settled.
    pub in_flight: usize,
    /// Sequence number of the fetch whose outcome is shown.
    pub applied_seq: u64,
    /// Sequence number of the fetch that produced `quote`. Unchanged by failed fetches.
    pub quote_seq: u64,
}

impl QuoteState {
    pub const fn loading(&self) -> bool {
        self.in_flight > 0
    }
}

#[derive(Debug)]
struct Shared {
    state: watch::Sender<QuoteState>,
    next_seq: AtomicU64,
}

impl Shared {
    async fn fetch(&self, feed: &dyn PriceFeed) -> Result<Quote, PaymentError> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let result = {
            let _in_flight = InFlight::new(&self.state);
            feed.fetch().await
        };

        self.state.send_modify(|state| {
            if seq < state.applied_seq {
                trace!(seq, applied = state.applied_seq, "dropping stale quote");
                return;
            }
            state.applied_seq = seq;
            match &result {
                Ok(quote) => {
                    state.quote = Some(*quote);
                    state.quote_seq = seq;
                    state.error = None;
                }
                Err(err) => state.error = Some(err.clone()),
            }
        });
        result
    }
}

/// Counts a fetch as in flight until dropped, whether it settles or is cancelled.
struct InFlight<'a>(&'a watch::Sender<QuoteState>);

impl<'a> InFlight<'a> {
    fn new(state: &'a watch::Sender<QuoteState>) -> Self {
        state.send_modify(|state| state.in_flight += 1);
        Self(state)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|state| state.in_flight = state.in_flight.saturating_sub(1));
    }
}

/// Polls a [`PriceFeed`] on a fixed period.
#[derive(Debug)]
pub struct QuoteService {
    feed: Arc<dyn PriceFeed>,
    period: Duration,
    shared: Arc<Shared>,
    timer: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
}

impl QuoteService {
    pub fn new(feed: Arc<dyn PriceFeed>, period: Duration) -> Self {
        Self {
            feed,
            period,
            shared: Arc::new(Shared {
                state: watch::Sender::new(QuoteState::default()),
                next_seq: AtomicU64::new(0),
            }),
            timer: None,
        }
    }

    /// Fetches immediately, then once per period until [`QuoteService::stop`] is called.
    ///
    /// Does nothing if already started.
    pub fn start(&mut self) {
        if self.timer.is_some() {
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let feed = self.feed.clone();
        let shared = self.shared.clone();
        let period = self.period;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = interval.tick() => {}
                }
                // Not raced against the shutdown signal: a fetch that started still applies.
                if let Err(err) = shared.fetch(feed.as_ref()).await {
                    warn!(%err, "failed to refresh quote");
                }
            }
            trace!("quote timer stopped");
        });
        self.timer = Some((shutdown_tx, handle));
    }

    /// Cancels the periodic refresh. A fetch already in flight still settles.
    pub fn stop(&mut self) {
        if let Some((shutdown, _handle)) = self.timer.take() {
            let _ = shutdown.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Fetches once, outside the timer.
    pub async fn refresh(&self) -> Result<Quote, PaymentError> {
        self.shared.fetch(self.feed.as_ref()).await
    }

    pub fn state(&self) -> QuoteState {
        self.shared.state.borrow().clone()
    }

    /// The last good quote.
    pub fn quote(&self) -> Option<Quote> {
        self.shared.state.borrow().quote
    }

    pub fn subscribe(&self) -> watch::Receiver<QuoteState> {
        self.shared.state.subscribe()
    }
}

impl Drop for QuoteService {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, extract::Query, http::StatusCode, routing::get};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    const QUOTE: Quote = Quote {
        native: FiatRates { inr: 200_000.0, usd: 2_400.0 },
        token: FiatRates { inr: 83.2, usd: 1.0 },
    };

    /// Serves `status` and `body` on `/simple/price` and returns the endpoint url.
    async fn serve(status: StatusCode, body: &'static str) -> String {
        let app = Router::new().route(
            "/simple/price",
            get(move |Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params["ids"], "ethereum,usd-coin");
                assert_eq!(params["vs_currencies"], "inr,usd");
                (status, body)
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}/simple/price")
    }

    async fn fetch(status: StatusCode, body: &'static str) -> Result<Quote, PaymentError> {
        let url = serve(status, body).await;
        CoinGecko::new(&url, "ethereum", "usd-coin").unwrap().fetch().await
    }

    #[tokio::test]
    async fn coingecko_quote() {
        let quote = fetch(
            StatusCode::OK,
            r#"{"ethereum":{"inr":200000,"usd":2400},"usd-coin":{"inr":83.2,"usd":1.0}}"#,
        )
        .await
        .unwrap();
        similar_asserts::assert_eq!(quote, QUOTE);
        assert_eq!(quote.rate(Asset::Native, Fiat::Inr), 200_000.0);
        assert_eq!(quote.rate(Asset::Token, Fiat::Usd), 1.0);
    }

    #[tokio::test]
    async fn coingecko_rate_limited() {
        let err = fetch(StatusCode::TOO_MANY_REQUESTS, "").await.unwrap_err();
        assert_eq!(err, PaymentError::RateLimited);
    }

    #[tokio::test]
    async fn coingecko_http_error() {
        let err = fetch(StatusCode::INTERNAL_SERVER_ERROR, "oops").await.unwrap_err();
        assert!(matches!(err, PaymentError::FetchFailed(msg) if msg.contains("500")));
    }

    #[tokio::test]
    async fn coingecko_malformed_payload() {
        let missing_asset = fetch(StatusCode::OK, r#"{"ethereum":{"inr":1,"usd":1}}"#).await;
        assert!(
            matches!(missing_asset, Err(PaymentError::FetchFailed(msg)) if msg.contains("usd-coin"))
        );

        let missing_fiat =
            fetch(StatusCode::OK, r#"{"ethereum":{"inr":1,"usd":1},"usd-coin":{"inr":1}}"#).await;
        assert!(matches!(missing_fiat, Err(PaymentError::FetchFailed(msg)) if msg.contains("USD")));

        let not_json = fetch(StatusCode::OK, "<html></html>").await;
        assert!(matches!(not_json, Err(PaymentError::FetchFailed(_))));
    }

    #[test]
    fn coingecko_url() {
        let feed = CoinGecko::from_config(&Config::default()).unwrap();
        assert_eq!(
            feed.url().as_str(),
            "https://api.coingecko.com/api/v3/simple/price?ids=ethereum%2Cusd-coin&vs_currencies=inr%2Cusd"
        );
        assert!(CoinGecko::new("not a url", "a", "b").is_err());
    }

    /// Replays scripted results; settles each fetch when its sender fires.
    #[derive(Debug, Default)]
    struct ScriptedFeed {
        results: Mutex<VecDeque<oneshot::Receiver<Result<Quote, PaymentError>>>>,
        calls: AtomicU64,
    }

    impl ScriptedFeed {
        fn push(&self) -> oneshot::Sender<Result<Quote, PaymentError>> {
            let (tx, rx) = oneshot::channel();
            self.results.lock().push_back(rx);
            tx
        }

        fn ready(&self, result: Result<Quote, PaymentError>) {
            let _ = self.push().send(result);
        }
    }

    #[async_trait]
    impl PriceFeed for ScriptedFeed {
        async fn fetch(&self) -> Result<Quote, PaymentError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let next = self.results.lock().pop_front();
            match next {
                Some(rx) => rx.await.unwrap_or_else(|_| Err(PaymentError::unknown("dropped"))),
                None => Ok(QUOTE),
            }
        }
    }

    #[tokio::test]
    async fn rate_limit_keeps_previous_quote() {
        let feed = Arc::new(ScriptedFeed::default());
        let service = QuoteService::new(feed.clone(), Duration::from_secs(60));

        feed.ready(Ok(QUOTE));
        feed.ready(Err(PaymentError::RateLimited));
        service.refresh().await.unwrap();
        assert_eq!(service.refresh().await, Err(PaymentError::RateLimited));

        let state = service.state();
        assert_eq!(state.quote, Some(QUOTE));
        assert_eq!(state.error, Some(PaymentError::RateLimited));
        assert!(!state.loading());

        service.refresh().await.unwrap();
        assert_eq!(service.state().error, None);
    }

    #[tokio::test]
    async fn loading_clears_after_failure() {
        let feed = Arc::new(ScriptedFeed::default());
        let service = QuoteService::new(feed.clone(), Duration::from_secs(60));
        let mut rx = service.subscribe();

        let settle = feed.push();
        let check = async {
            rx.wait_for(QuoteState::loading).await.unwrap();
            settle.send(Err(PaymentError::FetchFailed("boom".to_string()))).unwrap();
        };
        let (result, ()) = tokio::join!(service.refresh(), check);

        assert!(result.is_err());
        let state = service.state();
        assert!(!state.loading());
        assert_eq!(state.quote, None);
        assert_eq!(state.error, Some(PaymentError::FetchFailed("boom".to_string())));
    }

    #[tokio::test]
    async fn cancelled_fetch_is_not_left_loading() {
        let feed = Arc::new(ScriptedFeed::default());
        let service = QuoteService::new(feed.clone(), Duration::from_secs(60));
        let _pending = feed.push();

        let timed_out = tokio::time::timeout(Duration::from_millis(10), service.refresh()).await;
        assert!(timed_out.is_err());
        assert!(!service.state().loading());
    }

    #[tokio::test]
    async fn stale_result_does_not_overwrite_newer() {
        let feed = Arc::new(ScriptedFeed::default());
        let service = QuoteService::new(feed.clone(), Duration::from_secs(60));
        let first = feed.push();
        let second = feed.push();

        let newer = Quote { native: FiatRates { inr: 210_000.0, usd: 2_500.0 }, ..QUOTE };
        let settle = async {
            second.send(Ok(newer)).unwrap();
            tokio::task::yield_now().await;
            first.send(Ok(QUOTE)).unwrap();
        };
        let (a, b, ()) = tokio::join!(service.refresh(), service.refresh(), settle);

        assert_eq!(a, Ok(QUOTE));
        assert_eq!(b, Ok(newer));
        let state = service.state();
        assert_eq!(state.quote, Some(newer));
        assert_eq!(state.applied_seq, 2);
        assert_eq!(state.quote_seq, 2);
        assert!(!state.loading());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_refreshes_until_stopped() {
        let feed = Arc::new(ScriptedFeed::default());
        let mut service = QuoteService::new(feed.clone(), Duration::from_secs(60));

        service.start();
        service.start();
        assert!(service.is_running());
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(feed.calls.load(Ordering::Relaxed), 1);
        assert_eq!(service.quote(), Some(QUOTE));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(feed.calls.load(Ordering::Relaxed), 2);

        service.stop();
        assert!(!service.is_running());
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(feed.calls.load(Ordering::Relaxed), 2);
    }
}
