#[macro_use]
extern crate tracing;

use clap::Parser;
use eyre::Result;
use rampay::PaymentApp;
use rampay_cli::{handler, utils};

mod args;
mod cmd;

use args::Rampay;

fn main() -> Result<()> {
    handler::install();
    utils::subscriber();
    let args = Rampay::parse();
    run(args)
}

#[tokio::main]
async fn run(args: Rampay) -> Result<()> {
    let config = args.opts.load_config()?;
    let mut app = PaymentApp::from_config(config)?;
    app.session_mut().start().await;
    let result = cmd::run(&mut app, args.cmd, args.opts.json).await;
    app.stop();
    debug!("done");
    result
}
