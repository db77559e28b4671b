//! Void Asset Tool
//!
//! Headless host for the asset database. Indexes the asset root, imports
//! everything in per-frame batches, then keeps watching for changes until
//! Ctrl+C.
//!
//! Run with: cargo run -p void_asset_tool -- --root path/to/Assets

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use void_asset_db::{AssetPipeline, ImportState, PipelineConfig};

const USAGE: &str = "\
Usage: void_asset_tool [OPTIONS]

Options:
  --root <DIR>        Asset root to index (env: VOID_ASSET_ROOT)
  --config <FILE>     Pipeline config file (default: <config_dir>/void_asset_db/pipeline.toml)
  --no-watch          Do not watch the asset root for changes
  --once              Import once and exit
  --search <PATTERN>  Import, print matching assets and exit (? and * wildcards)
  -h, --help          Print this help";

/// Command line options
#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    root: Option<PathBuf>,
    config: Option<PathBuf>,
    no_watch: bool,
    once: bool,
    search: Option<String>,
    help: bool,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, String> {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let mut value = |name: &str| {
                args.next()
                    .ok_or_else(|| format!("Missing value for {}", name))
            };
            match arg.as_str() {
                "--root" => parsed.root = Some(PathBuf::from(value("--root")?)),
                "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
                "--search" => parsed.search = Some(value("--search")?),
                "--no-watch" => parsed.no_watch = true,
                "--once" => parsed.once = true,
                "-h" | "--help" => parsed.help = true,
                other => return Err(format!("Unknown argument: {}", other)),
            }
        }
        Ok(parsed)
    }

    /// Apply on top of file and environment settings
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(root) = &self.root {
            config.asset_root = root.clone();
        }
        if self.no_watch || self.once || self.search.is_some() {
            config.watch = false;
        }
    }
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).init();

    let args = match Args::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };
    if args.help {
        println!("{}", USAGE);
        return;
    }

    let mut config = match PipelineConfig::load_or_default(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };
    config.apply_env();
    args.apply(&mut config);

    log::info!("Asset root: {:?}", config.asset_root);
    log::info!("Thumbnails: {:?}", config.effective_thumbnail_dir());

    let mut pipeline = AssetPipeline::open(config);

    if let Some(pattern) = &args.search {
        pipeline.flush();
        let mut hits = pipeline.search(pattern);
        pipeline.sort(&mut hits);
        for id in hits {
            if let Some(node) = pipeline.index().get(id) {
                let guid = node.guid.as_deref().unwrap_or("-");
                println!("{}  {}", guid, node.path);
            }
        }
        pipeline.shutdown();
        return;
    }

    if args.once {
        let progress = pipeline.flush();
        log::info!(
            "Indexed {} assets, imported {}",
            pipeline.index().len(),
            progress.imported
        );
        pipeline.shutdown();
        return;
    }

    run_loop(&mut pipeline);
    pipeline.shutdown();
}

/// Tick the pipeline at a fixed rate until Ctrl+C
fn run_loop(pipeline: &mut AssetPipeline) {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C, shutting down...");
        r.store(false, Ordering::SeqCst);
    }) {
        log::warn!("Failed to set Ctrl+C handler: {}", e);
    }

    let frame_time = Duration::from_millis(16);
    let mut last_report = Instant::now();

    while running.load(Ordering::SeqCst) {
        let start = Instant::now();
        let progress = pipeline.update();

        match progress.state {
            ImportState::Importing | ImportState::Deleting
                if last_report.elapsed() >= Duration::from_secs(1) =>
            {
                log::info!("{:?} {:.0}% {}", progress.state, progress.percent * 100.0, progress.last);
                last_report = Instant::now();
            }
            _ => {}
        }

        if !pipeline.is_busy() {
            pipeline.clear_textures();
        }

        if let Some(rest) = frame_time.checked_sub(start.elapsed()) {
            std::thread::sleep(rest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, String> {
        Args::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        let args = parse(&["--root", "Assets", "--no-watch", "--search", "rock*"]).unwrap();
        assert_eq!(args.root, Some(PathBuf::from("Assets")));
        assert!(args.no_watch);
        assert_eq!(args.search.as_deref(), Some("rock*"));
        assert!(!args.once);

        assert_eq!(parse(&[]).unwrap(), Args::default());
        assert!(parse(&["-h"]).unwrap().help);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&["--root"]).is_err());
        assert!(parse(&["--bogus"]).is_err());
    }

    #[test]
    fn test_args_override_config() {
        let mut config = PipelineConfig::default();
        parse(&["--root", "/elsewhere", "--once"]).unwrap().apply(&mut config);
        assert_eq!(config.asset_root, PathBuf::from("/elsewhere"));
        assert!(!config.watch);

        let mut config = PipelineConfig::default();
        parse(&[]).unwrap().apply(&mut config);
        assert!(config.watch);
    }
}
