use chrono::NaiveDate;
use clap::Parser;
use secrecy::SecretString;
use std::{
    fmt::{Debug, Display},
    path::PathBuf,
    str::FromStr,
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Repository API URL
    #[clap(long, env, default_value = "https://api.github.com")]
    pub api_url: String,

    /// API access token
    #[clap(short = 't', long, env = "GITHUB_TOKEN")]
    pub api_token: Option<SecretString>,

    /// Organization to collect commits from
    #[clap(short, long, env)]
    pub org: String,

    /// First day of the window (YYYY-MM-DD, UTC)
    #[clap(long, env, parse(try_from_str=day))]
    pub since: NaiveDate,

    /// Last day of the window, inclusive (YYYY-MM-DD, UTC)
    #[clap(long, env, parse(try_from_str=day))]
    pub until: NaiveDate,

    /// Comma separated repository names; all active repositories when empty
    #[clap(long, env)]
    pub repos: Option<String>,

    /// Keep only repositories whose name contains this text
    #[clap(long, env)]
    pub repo_filter: Option<String>,

    /// Maximal parallel repository collections
    #[clap(short, long, env, default_value_t = 4, parse(try_from_str=workers_in_range))]
    pub workers: usize,

    /// Directory holding the bucket
    #[clap(long, env, default_value = ".")]
    pub store_root: PathBuf,

    /// Bucket to write into
    #[clap(short, long, env)]
    pub bucket: String,

    /// Key prefix of commit buckets and completion markers
    #[clap(long, env, default_value = "github/commits")]
    pub prefix: String,

    /// Reprocess repositories already marked as done
    #[clap(long)]
    pub force: bool,

    /// Process at most this many repositories, 0 for no cap
    #[clap(long, env, default_value_t = 0)]
    pub max_repos: usize,

    /// Completed repositories between two bucket flushes
    #[clap(long, env, default_value_t = 10, parse(try_from_str=batch_size_in_range))]
    pub batch_size: usize,

    /// Skip TLS certificate verification
    #[clap(long)]
    pub insecure: bool,
}

fn day(value: &str) -> clap::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|err| format!("{} is not a YYYY-MM-DD date: {}", value, err))
}

fn workers_in_range(value: &str) -> clap::Result<usize, String> {
    number_in_range(value, 1, usize::MAX, "workers".to_string())
}

fn batch_size_in_range(value: &str) -> clap::Result<usize, String> {
    number_in_range(value, 1, usize::MAX, "batch_size".to_string())
}

fn number_in_range<T>(value: &str, min: T, max: T, name: String) -> clap::Result<T, String>
where
    T: FromStr + PartialOrd + Display,
    <T as FromStr>::Err: Display,
{
    value.parse::<T>().map_err(|err| format!("{}", err)).and_then(|value| {
        if value < min || value > max {
            return Err(format!("{} is not in range {} .. {}.", name, min, max));
        }
        Ok(value)
    })
}
