use eyre::EyreHandler;
use itertools::Itertools;
use rampay_common::{PaymentError, errors::dedup_chain};
use std::{error::Error, fmt, iter};

/// Error report handler for the `rampay` binary.
///
/// Prints the deduplicated error chain followed by a recovery hint when a [`PaymentError`] in
/// the chain has one.
#[derive(Default)]
pub struct Handler {
    debug_handler: Option<Box<dyn EyreHandler>>,
}

impl Handler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the debug handler with a custom one.
    pub fn debug_handler(mut self, debug_handler: Option<Box<dyn EyreHandler>>) -> Self {
        self.debug_handler = debug_handler;
        self
    }
}

/// What the user can do about `err`, if anything.
pub fn recovery_hint(err: &PaymentError) -> Option<&'static str> {
    Some(match err {
        PaymentError::ProviderUnavailable => "check `rpc_url` in rampay.toml or pass `--rpc-url`",
        PaymentError::NotConnected => "run `rampay connect` first",
        PaymentError::WrongNetwork { .. } => "run `rampay switch-network`",
        PaymentError::NetworkNotRegistered { .. } => {
            "add the network to your wallet manually, then run `rampay switch-network` again"
        }
        PaymentError::RateLimited => "wait a minute before requesting prices again",
        PaymentError::InsufficientFunds => "top up the account or send a smaller amount",
        PaymentError::TransferPending => "wait for the pending transfer to settle",
        _ => return None,
    })
}

fn payment_error<'a>(error: &'a (dyn Error + 'static)) -> Option<&'a PaymentError> {
    iter::successors(Some(error), |&err| err.source()).find_map(|err| err.downcast_ref())
}

impl EyreHandler for Handler {
    fn display(&self, error: &(dyn Error + 'static), f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", dedup_chain(error).into_iter().format("; "))?;
        if let Some(hint) = payment_error(error).and_then(recovery_hint) {
            write!(f, " ({hint})")?;
        }
        Ok(())
    }

    fn debug(&self, error: &(dyn Error + 'static), f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(debug_handler) = &self.debug_handler {
            return debug_handler.debug(error, f);
        }
        if f.alternate() {
            return fmt::Debug::fmt(error, f);
        }

        let errors = dedup_chain(error);
        let Some((error_msg, sources)) = errors.split_first() else { return Ok(()) };
        write!(f, "{error_msg}")?;
        if !sources.is_empty() {
            write!(f, "\n\nCaused by:")?;
            for source in sources {
                write!(f, "\n- {source}")?;
            }
        }
        if let Some(hint) = payment_error(error).and_then(recovery_hint) {
            write!(f, "\n\nHint: {hint}")?;
        }
        Ok(())
    }

    fn track_caller(&mut self, location: &'static std::panic::Location<'static>) {
        if let Some(debug_handler) = &mut self.debug_handler {
            debug_handler.track_caller(location);
        }
    }
}

/// Installs the [`eyre`] and [`panic`](mod@std::panic) hooks as the global ones.
///
/// The one-line [`Handler`] is used unless `RAMPAY_DEBUG` is set, in which case `color-eyre`'s
/// report with span traces is printed. Panics always go through `color-eyre`.
pub fn install() {
    let panic_section = "This is a bug. Consider reporting it to the rampay maintainers.";
    let (panic_hook, debug_hook) =
        color_eyre::config::HookBuilder::default().panic_section(panic_section).into_hooks();
    panic_hook.install();
    let debug_hook = debug_hook.into_eyre_hook();
    let debug = std::env::var_os("RAMPAY_DEBUG").is_some();
    if let Err(err) = eyre::set_hook(Box::new(move |e| {
        Box::new(Handler::new().debug_handler(debug.then(|| debug_hook(e))))
    })) {
        debug!(%err, "failed to install eyre error hook");
    }
}
