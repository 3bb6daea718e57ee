mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::{fmt, EnvFilter};

use harvest_core::{
    refresh_channels, refresh_matches, ApiCatalog, ChannelsPlan, ChromiumRenderer, HttpProber,
    ListingCatalog, ListingSection, LogicalItem, MatchesPlan, Renderer, ResolvedStream,
    ResolverConfig, RunError, RunProgress, RunReport, SniffRule, StreamResolver,
};

use config::AppConfig;

fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");

    if GIT_HASH.is_empty() {
        VERSION
    } else {
        Box::leak(format!("{VERSION} ({GIT_HASH})").into_boxed_str())
    }
}

/// Resolve live stream manifests from web catalogs into M3U playlists.
#[derive(Parser)]
#[command(name = "m3u-harvest", version = version_string(), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Common {
    /// Path to TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the run report as JSON on stdout.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the matches playlist from the JSON sports catalog.
    Matches {
        #[command(flatten)]
        common: Common,

        /// Output playlist path. Overrides config file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Refresh channel URLs and section groups of an existing playlist.
    Channels {
        #[command(flatten)]
        common: Common,

        /// Playlist to refresh in place. Overrides config file.
        #[arg(short, long)]
        playlist: Option<PathBuf>,
    },
    /// Run the matches rebuild, then the channel refresh.
    All {
        #[command(flatten)]
        common: Common,

        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long)]
        playlist: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Job {
    Matches,
    Channels,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (common, jobs, output, playlist) = match cli.command {
        Commands::Matches { common, output } => (common, vec![Job::Matches], output, None),
        Commands::Channels { common, playlist } => (common, vec![Job::Channels], None, playlist),
        Commands::All {
            common,
            output,
            playlist,
        } => (common, vec![Job::Matches, Job::Channels], output, playlist),
    };

    let mut app_config = load_config(common.config.as_ref());
    if let Some(path) = output {
        app_config.matches.output = path;
    }
    if let Some(path) = playlist {
        app_config.channels.playlist = path;
    }

    let reports = run_jobs(&app_config, &jobs).await;

    let mut failed = false;
    let mut done = Vec::new();
    for (job, result) in reports {
        match result {
            Ok(report) => done.push(report),
            Err(e) => {
                failed = true;
                tracing::error!(job = job_name(job), error = %e, "Run failed");
            }
        }
    }

    if common.json {
        match serde_json::to_string_pretty(&done) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::error!(error = %e, "Could not serialize run report"),
        }
    } else {
        for report in &done {
            print_summary(report);
        }
    }

    if failed {
        std::process::exit(1);
    }
}

fn load_config(path: Option<&PathBuf>) -> AppConfig {
    match path {
        Some(path) => match AppConfig::load(path) {
            Ok(c) => {
                init_tracing(&c.run.log_format);
                tracing::info!(path = %path.display(), "Loaded config file");
                c
            }
            Err(e) => {
                init_tracing("pretty");
                tracing::error!("{}", e);
                std::process::exit(1);
            }
        },
        None => {
            init_tracing("pretty");
            AppConfig::default()
        }
    }
}

async fn run_jobs(
    app_config: &AppConfig,
    jobs: &[Job],
) -> Vec<(Job, Result<RunReport, RunError>)> {
    let resolver_config = app_config.to_resolver_config();

    let prober = match HttpProber::from_config(&resolver_config) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            tracing::error!(error = %e, "Failed to build HTTP client");
            std::process::exit(1);
        }
    };
    let catalog_client =
        match HttpProber::build_client(Duration::from_millis(app_config.run.catalog_timeout_ms)) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build HTTP client");
                std::process::exit(1);
            }
        };

    let renderer =
        match ChromiumRenderer::launch(&app_config.browser.to_browser_options()).await {
            Ok(r) => Arc::new(r),
            Err(e) => {
                tracing::error!(error = %e, "Browser unavailable");
                std::process::exit(1);
            }
        };

    let mut progress = BarProgress::new();
    let mut results = Vec::new();

    for &job in jobs {
        let result = match job {
            Job::Matches => {
                let catalog = ApiCatalog::new(
                    catalog_client.clone(),
                    &app_config.matches.base_url,
                    &app_config.matches.group_prefix,
                    app_config.matches.categories.clone(),
                );
                let resolver = StreamResolver::from_config(
                    Arc::new(catalog),
                    renderer.clone(),
                    SniffRule::direct_rules(),
                    prober.clone(),
                    &resolver_config,
                );
                let plan = MatchesPlan {
                    output: app_config.matches.output.clone(),
                    epg_url: app_config.matches.epg_url.clone(),
                };
                refresh_matches(&resolver, &plan, &mut progress).await
            }
            Job::Channels => {
                let channels_cfg = &app_config.channels;
                let listing = |sections: Vec<ListingSection>| {
                    ListingCatalog::new(catalog_client.clone(), &channels_cfg.base_url, sections)
                        .with_anchor_selector(&channels_cfg.anchor_selector)
                };
                let renderer: Arc<dyn Renderer> = renderer.clone();

                let channels = channel_resolver(
                    listing(vec![ListingSection::new(
                        &channels_cfg.list_path,
                        &channels_cfg.list_group,
                    )]),
                    renderer.clone(),
                    prober.clone(),
                    &resolver_config,
                );
                let sections = channel_resolver(
                    listing(channels_cfg.sections.clone()),
                    renderer,
                    prober.clone(),
                    &resolver_config,
                );
                let plan = ChannelsPlan {
                    playlist: channels_cfg.playlist.clone(),
                    epg_url: channels_cfg.epg_url.clone(),
                    channel_groups: channels_cfg.channel_groups.clone(),
                    slots: channels_cfg.slots,
                    section_groups: channels_cfg.section_groups(),
                };
                refresh_channels(&channels, &sections, &plan, &mut progress).await
            }
        };
        results.push((job, result));
    }

    progress.finish();
    renderer.shutdown().await;
    results
}

fn channel_resolver(
    catalog: ListingCatalog,
    renderer: Arc<dyn Renderer>,
    prober: Arc<HttpProber>,
    config: &ResolverConfig,
) -> StreamResolver {
    StreamResolver::from_config(
        Arc::new(catalog),
        renderer,
        SniffRule::ping_rules(),
        prober,
        config,
    )
}

fn job_name(job: Job) -> &'static str {
    match job {
        Job::Matches => "matches",
        Job::Channels => "channels",
    }
}

/// One progress bar per resolution phase.
struct BarProgress {
    multi: MultiProgress,
    bar: Option<ProgressBar>,
}

impl BarProgress {
    fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bar: None,
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }
}

impl RunProgress for BarProgress {
    fn phase_started(&mut self, phase: &str, items: usize) {
        self.finish();
        let bar = self.multi.add(ProgressBar::new(items as u64));
        if let Ok(s) = ProgressStyle::with_template(
            "{prefix:>10.bold} [{bar:32.cyan/blue}] {pos}/{len} {wide_msg}",
        ) {
            bar.set_style(s.progress_chars("=> "));
        }
        bar.set_prefix(phase.to_string());
        self.bar = Some(bar);
    }

    fn item_finished(&mut self, item: &LogicalItem, stream: Option<&ResolvedStream>) {
        let Some(ref bar) = self.bar else { return };
        let mark = match stream {
            Some(s) => style(format!("ok {}", s.quality)).green().to_string(),
            None => style("unavailable").yellow().to_string(),
        };
        bar.set_message(format!("{} {}", mark, style(item.display_label()).dim()));
        bar.inc(1);
    }
}

fn print_summary(report: &RunReport) {
    println!(
        "{} {}",
        style("m3u-harvest").bold(),
        style(report.output.display()).dim()
    );
    for phase in &report.phases {
        println!(
            "  {:<10} {} resolved  {} unavailable  {} seen",
            style(&phase.phase).bold(),
            style(phase.resolved).green(),
            style(phase.unavailable).yellow(),
            phase.items_seen,
        );
    }
    if report.entries_replaced > 0 || report.entries_pruned > 0 {
        println!(
            "  {} replaced in place, {} pruned",
            report.entries_replaced, report.entries_pruned
        );
    }
    println!(
        "  {} entries written in {:.1}s",
        style(report.entries_written).bold(),
        (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0
    );
}

fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format {
        "json" => {
            fmt().with_env_filter(filter).with_writer(std::io::stderr).json().init();
        }
        _ => {
            fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
    }
}
