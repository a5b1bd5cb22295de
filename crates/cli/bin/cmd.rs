use crate::args::RampaySubcommand;
use eyre::{Result, eyre};
use rampay::PaymentApp;
use rampay_cli::utils::{self, print};
use rampay_common::PaymentError;
use rampay_wallets::WalletEvent;
use serde_json::json;

pub async fn run(app: &mut PaymentApp, cmd: RampaySubcommand, json: bool) -> Result<()> {
    match cmd {
        RampaySubcommand::Status => status(app, json),
        RampaySubcommand::Connect => {
            app.session_mut().connect().await?;
            status(app, json);
        }
        RampaySubcommand::SwitchNetwork => {
            app.session_mut().switch_network().await?;
            status(app, json);
        }
        RampaySubcommand::Disconnect => {
            app.session_mut().disconnect().await;
            status(app, json);
        }
        RampaySubcommand::Balance => {
            let Some(balances) = app.balances().await? else {
                return Err(not_ready(app));
            };
            let config = app.config();
            print(
                json,
                json!({
                    config.native.symbol.clone(): balances.native_display(),
                    config.token.symbol.clone(): balances.token_display(),
                }),
                || utils::balances_text(config, &balances),
            );
        }
        RampaySubcommand::Quote => {
            let quote = app.quotes().refresh().await?;
            print(json, json!(quote), || utils::quote_text(app.config(), &quote));
        }
        RampaySubcommand::Convert { amount, asset } => {
            app.select_asset(asset);
            app.quotes().refresh().await?;
            let crypto = app
                .estimate_crypto(&amount)
                .ok_or_else(|| eyre!("`{amount}` is not a positive fiat amount"))?;
            let symbol = &app.config().asset(asset).symbol;
            print(json, json!({ "amount": crypto, "asset": symbol }), || {
                format!("{amount} {} = {crypto} {symbol}", app.fiat())
            });
        }
        RampaySubcommand::Estimate { asset } => {
            app.select_asset(asset);
            if let Err(err) = app.quotes().refresh().await {
                warn!(%err, "estimating without fiat prices");
            }
            let estimate = app.estimate_fee().await?;
            print(json, utils::fee_json(&estimate), || {
                utils::fee_text(app.config(), app.fiat(), asset, &estimate)
            });
        }
        RampaySubcommand::Send { to, amount, asset, fiat_amount } => {
            app.select_asset(asset);
            if !app.is_ready() {
                return Err(not_ready(app));
            }
            let hash = if fiat_amount {
                app.quotes().refresh().await?;
                app.send_fiat(&to, &amount).await?
            } else {
                app.send(&to, &amount).await?
            };
            print(json, json!({ "hash": hash, "status": "success" }), || {
                format!("Transaction {hash} confirmed")
            });
        }
        RampaySubcommand::Watch => watch(app, json).await?,
    }
    Ok(())
}

fn status(app: &PaymentApp, json: bool) {
    let session = app.session().session();
    let state = app.session().state();
    print(json, utils::session_json(&session, state), || {
        utils::session_text(app.config(), &session, state)
    });
}

fn not_ready(app: &PaymentApp) -> eyre::Report {
    let session = app.session().session();
    match session.last_error {
        Some(err) if err.is_wrong_network() => err.into(),
        _ if session.address.is_none() => PaymentError::NotConnected.into(),
        _ => eyre!("not on {}", app.config().chain_name),
    }
}

async fn watch(app: &mut PaymentApp, json: bool) -> Result<()> {
    app.start().await;
    let mut quotes = app.quotes().subscribe();
    let mut fees = app.fees().map(|fees| fees.subscribe());
    app.update_fee().await;
    status(app, json);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut shown_seq = 0;
    loop {
        let update = tokio::select! {
            _ = &mut ctrl_c => break,
            event = app.session_mut().recv_event() => match event {
                Some(event) => Update::Wallet(event),
                None => break,
            },
            Ok(()) = quotes.changed() => Update::Quote,
            Some(Ok(())) = async {
                match &mut fees {
                    Some(fees) => Some(fees.changed().await),
                    None => None,
                }
            } => Update::Fee,
        };

        match update {
            Update::Wallet(event) => {
                debug!(?event, "wallet event");
                app.session_mut().handle_event(event).await;
                app.update_fee().await;
                status(app, json);
            }
            Update::Quote => {
                let state = quotes.borrow_and_update().clone();
                if state.applied_seq == shown_seq {
                    continue;
                }
                shown_seq = state.applied_seq;
                match (state.error, state.quote) {
                    (Some(err), _) => warn!(%err, "price feed"),
                    (None, Some(quote)) => {
                        print(json, json!(quote), || utils::quote_text(app.config(), &quote));
                    }
                    (None, None) => {}
                }
                app.update_fee().await;
            }
            Update::Fee => {
                let Some(fees) = &mut fees else { continue };
                let state = fees.borrow_and_update().clone();
                if state.loading {
                    continue;
                }
                if let Some(estimate) = state.estimate {
                    print(json, utils::fee_json(&estimate), || {
                        utils::fee_text(app.config(), app.fiat(), app.asset(), &estimate)
                    });
                }
            }
        }
    }
    Ok(())
}

enum Update {
    Wallet(WalletEvent),
    Quote,
    Fee,
}
