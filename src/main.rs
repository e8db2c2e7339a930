use std::path::PathBuf;

use clap::Parser;
use muxfys::config::{Config, Target};

/// Mount one or more S3-compatible buckets as a local FUSE filesystem.
#[derive(Parser, Debug)]
#[command(name = "muxfys", about = "Mount S3-compatible buckets as a FUSE filesystem")]
struct Args {
    /// Path to mount at.
    #[arg(long)]
    mount: Option<PathBuf>,

    /// TOML config file; CLI flags override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target URL, `scheme://host/bucket[/path]`; may be repeated.
    #[arg(long = "target")]
    targets: Vec<String>,

    /// Number of attempts per remote call before giving up.
    #[arg(long)]
    retries: Option<u32>,

    /// Base directory for auto-created ephemeral caches.
    #[arg(long)]
    cache_base: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

fn build_config(args: Args) -> Config {
    let mut config = args
        .config
        .as_ref()
        .and_then(|path| std::fs::read_to_string(path).ok())
        .and_then(|contents| toml::from_str::<Config>(&contents).ok())
        .unwrap_or_else(|| Config {
            mount: PathBuf::new(),
            retries: 3,
            cache_base: std::env::temp_dir().join("muxfys"),
            verbose: false,
            targets: Vec::new(),
        });

    if let Some(mount) = args.mount {
        config.mount = mount;
    }
    if let Some(retries) = args.retries {
        config.retries = retries;
    }
    if let Some(cache_base) = args.cache_base {
        config.cache_base = cache_base;
    }
    if args.verbose {
        config.verbose = true;
    }
    for url in args.targets {
        config.targets.push(Target {
            target: url,
            region: None,
            access_key: None,
            secret_key: None,
            cache_data: None,
            cache_dir: None,
            write: None,
        });
    }
    config
}

fn main() {
    let args = Args::parse();
    let config = build_config(args);

    let handle = match muxfys::new(config) {
        Ok(h) => h,
        Err(err) => {
            eprintln!("muxfys: {err}");
            std::process::exit(2);
        }
    };

    if let Err(err) = handle.mount() {
        eprintln!("muxfys: {err}");
        std::process::exit(2);
    }
    if let Err(err) = handle.unmount_on_death() {
        eprintln!("muxfys: {err}");
        std::process::exit(2);
    }

    loop {
        std::thread::park();
    }
}
