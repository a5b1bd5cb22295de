use rampay::{Balances, FeeEstimate, Quote};
use rampay_common::{Asset, Fiat};
use rampay_config::Config;
use rampay_wallets::{Session, SessionState};
use serde_json::json;

/// Initializes a tracing Subscriber for logging
pub fn subscriber() {
    tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

/// Prints `value` as pretty JSON, or `text` otherwise.
pub fn print(json: bool, value: serde_json::Value, text: impl FnOnce() -> String) {
    if json {
        println!("{value:#}");
    } else {
        println!("{}", text());
    }
}

pub fn session_json(session: &Session, state: SessionState) -> serde_json::Value {
    json!({
        "address": session.address,
        "chainId": session.chain_id,
        "state": format!("{state:?}"),
        "error": session.last_error.as_ref().map(ToString::to_string),
    })
}

/// Human-readable session summary.
pub fn session_text(config: &Config, session: &Session, state: SessionState) -> String {
    let mut out = match (state, session.address) {
        (SessionState::Connecting, _) => "Connecting...".to_string(),
        (_, None) => "Not connected".to_string(),
        (SessionState::ConnectedCorrectNetwork, Some(address)) => {
            format!("Connected as {address} on {}", config.chain_name)
        }
        (_, Some(address)) => format!(
            "Connected as {address} on chain {}, switch to {} ({})",
            session.chain_id.unwrap_or_default(),
            config.chain_name,
            config.chain_id
        ),
    };
    if let Some(err) = &session.last_error
        && !err.is_wrong_network()
    {
        out.push_str(&format!("\nerror: {err}"));
    }
    out
}

pub fn balances_text(config: &Config, balances: &Balances) -> String {
    format!(
        "{} {}\n{} {}",
        balances.native_display(),
        config.native.symbol,
        balances.token_display(),
        config.token.symbol
    )
}

pub fn quote_text(config: &Config, quote: &Quote) -> String {
    let mut lines = Vec::new();
    for asset in [Asset::Native, Asset::Token] {
        let prices = Fiat::ALL
            .iter()
            .map(|&fiat| format!("{:.2} {fiat}", quote.rate(asset, fiat)))
            .collect::<Vec<_>>();
        lines.push(format!("1 {} = {}", config.asset(asset).symbol, prices.join(" / ")));
    }
    lines.join("\n")
}

pub fn fee_json(estimate: &FeeEstimate) -> serde_json::Value {
    json!({
        "gasUnits": estimate.gas_units,
        "gasPriceGwei": estimate.gas_price_gwei(),
        "costWei": estimate.cost_wei,
        "costNative": estimate.cost_native_display(),
        "costFiat": estimate.cost_fiat_display(),
        "costAlternate": estimate.cost_alternate_display(),
    })
}

pub fn fee_text(config: &Config, fiat: Fiat, asset: Asset, estimate: &FeeEstimate) -> String {
    let mut out = format!(
        "Gas: {} units at {} gwei\nCost: {} {}",
        estimate.gas_units,
        estimate.gas_price_gwei(),
        estimate.cost_native_display(),
        config.native.symbol
    );
    match estimate.cost_fiat_display() {
        Some(cost) => out.push_str(&format!(" ({cost} {fiat})")),
        None => out.push_str(&format!(" ({fiat} price unavailable)")),
    }
    if let Some(cost) = estimate.cost_alternate_display() {
        out.push_str(&format!("\n      ~{cost} {}", config.asset(asset).symbol));
    }
    out
}
