//! MSAK throughput client - command-line entry point

use clap::Parser;
use msak_client::{
    app::App,
    cli::Cli,
    config::EnvManager,
    error::{AppError, ErrorReporter, Result},
    PKG_NAME, VERSION,
};
use std::process;

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        process::exit(99);
    }));

    let cli = Cli::parse();
    let use_color = cli.use_colors();
    let verbose = cli.verbose;

    if let Err(e) = run_application(cli).await {
        ErrorReporter::new(use_color, verbose).report_error(&e);
        print_error_suggestions(&e);
        process::exit(e.exit_code());
    }
}

async fn run_application(cli: Cli) -> Result<()> {
    if cli.debug {
        eprintln!("{} v{}", PKG_NAME, VERSION);
        eprintln!("Debug mode enabled\n");
    }

    if cli.env_help {
        println!("{}", EnvManager::display_env_help());
        return Ok(());
    }

    if let Some(path) = &cli.init_env {
        EnvManager::save_example_env_file(path)?;
        println!("Example configuration written to {}", path.display());
        return Ok(());
    }

    let app = App::from_cli(cli)?;
    if !app.config().enable_color {
        colored::control::set_override(false);
    }

    app.run().await.map(|_| ())
}

/// Print helpful suggestions for common errors
fn print_error_suggestions(error: &AppError) {
    match error {
        AppError::Config(_) | AppError::Validation(_) => {
            eprintln!();
            eprintln!("Configuration help:");
            eprintln!("  - Streams must be between 1 and 4, duration at most 20000 ms");
            eprintln!("  - --server takes host[:port], use --scheme to pick ws or wss");
            eprintln!("  - Metadata is given as --metadata KEY=VALUE");
            eprintln!("  - Check your .env file for malformed MSAK_* values");
        }
        AppError::Discovery(_) | AppError::Http(_) => {
            eprintln!();
            eprintln!("Server discovery help:");
            eprintln!("  - Check your internet connection");
            eprintln!("  - Pass a server explicitly with --server host[:port]");
        }
        AppError::Transport(_) | AppError::Timeout(_) => {
            eprintln!();
            eprintln!("Connection troubleshooting:");
            eprintln!("  - Verify the server is reachable and speaks the throughput1 protocol");
            eprintln!("  - Try --scheme ws for servers without TLS");
            eprintln!("  - Verify firewall settings");
        }
        _ => {}
    }
}
