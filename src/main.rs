//! EduReg CLI - resilient companion for the education registry platform

use clap::Parser;

mod cache;
mod cli;
mod client;
mod config;
mod error;
mod models;
mod network;
mod orchestrator;
mod output;
mod queue;
mod retry;
mod session;
mod storage;

use cli::args::GlobalOptions;
use cli::{CacheCommands, Cli, Commands, QueueCommands};
use error::Result;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let mut builder = if debug {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(log::LevelFilter::Debug);
        builder
    } else {
        // RUST_LOG still wins when set
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
    };
    builder.format_timestamp(None).init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let opts = GlobalOptions::from_cli(&cli);

    match cli.command {
        Commands::Init => cli::init::run(&opts).await,
        Commands::Login { email } => cli::auth::login(&opts, email).await,
        Commands::Logout => cli::auth::logout(&opts).await,
        Commands::Status => cli::status::run(&opts).await,
        Commands::Version => {
            println!("edureg version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::List(ref args) => cli::data::list(&opts, args).await,
        Commands::Get { resource, ref id } => cli::data::get(&opts, resource, id).await,
        Commands::Create {
            resource,
            ref write,
        } => cli::data::create(&opts, resource, write).await,
        Commands::Update {
            resource,
            ref id,
            ref write,
        } => cli::data::update(&opts, resource, id, write).await,
        Commands::Delete {
            resource,
            ref id,
            no_queue,
            yes,
        } => cli::data::delete(&opts, resource, id, no_queue, yes).await,
        Commands::Queue(ref queue_cmd) => match queue_cmd {
            QueueCommands::List => cli::queue::list(&opts),
            QueueCommands::Drain => cli::queue::drain(&opts).await,
            QueueCommands::Watch { interval } => cli::queue::watch(&opts, *interval).await,
            QueueCommands::Clear { yes } => cli::queue::clear(&opts, *yes),
        },
        Commands::Cache(ref cache_cmd) => match cache_cmd {
            CacheCommands::Status => cli::cache::status(&opts),
            CacheCommands::Clear => cli::cache::clear(&opts),
            CacheCommands::Path => cli::cache::path(&opts),
        },
        Commands::Access { ref view } => cli::access::run(&opts, view.as_deref()).await,
        Commands::Completion { shell } => {
            cli::completions::run(shell);
            Ok(())
        }
    }
}
