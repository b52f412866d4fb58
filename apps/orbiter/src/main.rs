mod config;
mod terminal;

use config::Config;
use ob_browser::Navigator;
use ob_browser::OpenOptions;
use ob_browser::SchemeRegistry;
use ob_core::CancelToken;
use ob_core::OrbiterResult;
use ob_net::ClientOptions;
use ob_net::GeminiClient;
use ob_net::TlsPolicy;
use ob_security::TrustStore;
use ob_storage::StorageConfig;
use ob_storage::StorageManager;
use ob_storage::default_data_root;
use ob_storage::default_download_root;
use std::io;
use std::process::ExitCode;
use std::thread;
use terminal::TerminalFrontend;
use tracing::debug;
use tracing::info;
use tracing::warn;

const USAGE: &str = "usage: orbiter [--ephemeral] [URL]";

/// Command line: an optional start URL and flags.
#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    url: Option<String>,
    ephemeral: bool,
    help: bool,
}

fn main() -> ExitCode {
    init_logging();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(error) => {
            eprintln!("orbiter: {error}\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };
    if args.help {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    match run(args, config::load_config()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("orbiter: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: CliArgs, config: Config) -> OrbiterResult<()> {
    let ephemeral = args.ephemeral || config.ephemeral;
    let storage = StorageManager::new(StorageConfig {
        ephemeral_mode: ephemeral,
    })
    .with_persistent_root(default_data_root())
    .with_download_root(
        config
            .download_dir
            .clone()
            .unwrap_or_else(default_download_root),
    );

    let trust = match storage.load_trust_store() {
        Ok(store) => store,
        Err(error) => {
            warn!(%error, "known hosts unreadable, starting with no pins");
            TrustStore::new()
        }
    };
    info!(hosts = trust.len(), ephemeral, "trust store ready");

    let options: ClientOptions = config.client_options();
    let client = GeminiClient::new(TlsPolicy::default(), options)?;
    let registry = SchemeRegistry::with_defaults(client, config.trust_policy(ephemeral));

    let stdin = io::stdin();
    let frontend = TerminalFrontend::new(stdin.lock(), io::stdout());
    let mut navigator = Navigator::new(
        frontend,
        registry,
        storage,
        trust,
        &config.browser_options(),
    );
    install_interrupt_handler(navigator.cancel_token());

    if let Some(url) = args.url.or(config.home) {
        navigator.open(&url, OpenOptions::absolute());
    }
    terminal::run(&mut navigator);

    navigator.shutdown()
}

fn parse_args<I>(args: I) -> Result<CliArgs, String>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs::default();
    for arg in args {
        match arg.as_str() {
            "--ephemeral" => parsed.ephemeral = true,
            "-h" | "--help" => parsed.help = true,
            flag if flag.starts_with("--") => return Err(format!("unknown option `{flag}`")),
            _ if parsed.url.is_none() => parsed.url = Some(arg),
            _ => return Err(format!("unexpected argument `{arg}`")),
        }
    }
    Ok(parsed)
}

/// Ctrl-C cancels the request in flight instead of killing the process.
fn install_interrupt_handler(cancel: CancelToken) {
    let spawned = thread::Builder::new()
        .name("orbiter-interrupt".to_owned())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(error) => {
                    warn!(%error, "interrupt handler unavailable");
                    return;
                }
            };

            runtime.block_on(async move {
                loop {
                    if let Err(error) = tokio::signal::ctrl_c().await {
                        warn!(%error, "stopped listening for interrupts");
                        break;
                    }
                    debug!("interrupt received, cancelling request");
                    cancel.cancel();
                }
            });
        });

    if let Err(error) = spawned {
        warn!(%error, "failed to spawn interrupt thread");
    }
}

fn is_debug_mode() -> bool {
    std::env::var("ORBITER_DEBUG").is_ok()
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let default_filter = if is_debug_mode() {
        "orbiter=trace,ob_browser=trace,ob_net=trace,ob_security=trace,ob_storage=trace,info"
    } else {
        "warn"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_line_number(true),
        )
        .with(filter)
        .init();

    debug!("Orbiter v{} starting up", env!("CARGO_PKG_VERSION"));
}
