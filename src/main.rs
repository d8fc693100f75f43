//! shellmux - stdio JSON-RPC front end for the session core

// Use mimalloc as the global allocator for better performance
// with high-frequency small allocations (output chunks, notifications)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use shellmux::config::{ConfigStorage, CoreConfig};
use shellmux::session::SessionManager;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 && (args[1] == "--version" || args[1] == "-V") {
        println!("shellmux {}", VERSION);
        return;
    }

    let (config, load_error) = match ConfigStorage::new() {
        Ok(storage) => match storage.load().await {
            Ok(config) => (config, None),
            Err(e) => (CoreConfig::default(), Some(e.to_string())),
        },
        Err(e) => (CoreConfig::default(), Some(e.to_string())),
    };

    shellmux::init_logging(&config.log_level);
    tracing::info!("shellmux v{} starting (pid: {})", VERSION, std::process::id());
    if let Some(e) = load_error {
        tracing::warn!("Failed to load config, using defaults: {}", e);
    }

    let manager = SessionManager::new(config);
    if let Err(e) = shellmux::ipc::serve_stdio(manager).await {
        tracing::error!("Command loop failed: {}", e);
        std::process::exit(1);
    }
    tracing::info!("shutdown complete");
}
