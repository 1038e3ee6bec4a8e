use clap::{Parser, Subcommand};
use server::config::try_load;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Defaults to $REDIS_URL, then redis://127.0.0.1:6379
    #[arg(long)]
    redis_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a category and print its id
    AddCategory { name: String },

    /// Remove a category, APKs pointing at it become uncategorized
    RemoveCategory { id: u64 },

    ListCategories,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let redis_url = match args.redis_url {
        Some(url) => url,
        None => try_load("REDIS_URL", "redis://127.0.0.1:6379")?,
    };

    let command = match args.command {
        Command::AddCategory { name } => seed::Command::Add(name),
        Command::RemoveCategory { id } => seed::Command::Remove(id),
        Command::ListCategories => seed::Command::List,
    };

    seed::run(&redis_url, command).await
}
