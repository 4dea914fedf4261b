use clap::Parser;
use commit_collector::Error;
use commit_collector_app::Args;

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let summary = commit_collector_app::collect_commits(args).await?;

    println!("{}", summary);

    Ok(())
}
