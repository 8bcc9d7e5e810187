//! Web view helper binary. Spawned by the host with `<read_fd> <write_fd>`.

use std::env;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use webui_helper::HelperConfig;

fn main() -> ExitCode {
    // stdout belongs to the web engine; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match HelperConfig::from_args(env::args().skip(1)).and_then(webui_helper::run) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
