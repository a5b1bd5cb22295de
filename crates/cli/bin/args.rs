use clap::{Parser, Subcommand};
use rampay_cli::opts::GlobalOpts;
use rampay_common::Asset;

/// Pay in crypto from a fiat amount, using a wallet exposed over JSON-RPC.
#[derive(Parser)]
#[command(name = "rampay", version, next_display_order = None)]
pub struct Rampay {
    #[command(flatten)]
    pub opts: GlobalOpts,

    #[command(subcommand)]
    pub cmd: RampaySubcommand,
}

#[derive(Subcommand)]
pub enum RampaySubcommand {
    /// Shows the wallet session restored from the already-authorized accounts.
    Status,

    /// Requests account access from the wallet.
    Connect,

    /// Asks the wallet to switch to the supported network.
    #[command(visible_alias = "switch")]
    SwitchNetwork,

    /// Revokes the wallet permissions and forgets the session.
    Disconnect,

    /// Prints the native and token balances of the connected account.
    #[command(visible_alias = "b")]
    Balance,

    /// Prints the fiat price of both assets.
    #[command(visible_alias = "q")]
    Quote,

    /// Converts a fiat amount into the chosen asset at the live rate.
    Convert {
        /// The fiat amount.
        amount: String,

        /// The asset to convert into: `native` or `token`.
        #[arg(long, short, default_value = "native")]
        asset: Asset,
    },

    /// Estimates the network fee of a transfer.
    #[command(visible_alias = "e")]
    Estimate {
        /// The asset to transfer: `native` or `token`.
        #[arg(long, short, default_value = "native")]
        asset: Asset,
    },

    /// Sends a transfer and waits for it to be confirmed.
    Send {
        /// The recipient address.
        to: String,

        /// The amount, in the asset's units unless `--fiat-amount` is set.
        amount: String,

        /// The asset to transfer: `native` or `token`.
        #[arg(long, short, default_value = "native")]
        asset: Asset,

        /// Treat the amount as fiat and convert it at the live rate.
        #[arg(long)]
        fiat_amount: bool,
    },

    /// Follows wallet events and price updates until interrupted.
    Watch,
}
