//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use sitepdf_core::{BuildConfig, BuildReport, ProgressReporter};
use sitepdf_discovery::{ExtractOptions, page_list_from_file};
use sitepdf_shared::{AppConfig, PageList, SitePdfError, init_config, load_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// sitepdf: turn a documentation site into one PDF.
#[derive(Parser)]
#[command(
    name = "sitepdf",
    version,
    about = "Render documentation pages with headless Chrome and merge them into a single PDF.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Extract the page list from a saved navigation menu.
    Extract {
        /// Saved navigation markup.
        #[arg(short, long, default_value = "menu.html")]
        input: PathBuf,

        /// Page list file to write.
        #[arg(short, long, default_value = "pages.toml")]
        output: PathBuf,

        /// Base URL written into the page list (defaults to config).
        #[arg(long)]
        base_url: Option<String>,

        /// Mount prefix stripped from links (defaults to config).
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Render every page in a page list and merge the results.
    Build {
        /// Page list file.
        #[arg(short, long, default_value = "pages.toml")]
        config: PathBuf,

        /// Output directory (defaults to config).
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Merged PDF file name (defaults to config).
        #[arg(long)]
        merged_filename: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "sitepdf=info",
        1 => "sitepdf=debug",
        _ => "sitepdf=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Extract {
            input,
            output,
            base_url,
            prefix,
        } => cmd_extract(&input, &output, base_url, prefix),
        Command::Build {
            config,
            output_dir,
            merged_filename,
        } => cmd_build(&config, output_dir, merged_filename).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Extract
// ---------------------------------------------------------------------------

fn cmd_extract(
    input: &Path,
    output: &Path,
    base_url: Option<String>,
    prefix: Option<String>,
) -> Result<()> {
    let config = load_config()?;
    let list = extract_page_list(input, &config, base_url, prefix)?;

    list.save(output)?;

    info!(pages = list.len(), output = %output.display(), "page list written");
    println!(
        "Extracted {} pages to {}",
        list.len(),
        output.display()
    );
    Ok(())
}

/// Resolve CLI overrides against config and extract the page list.
fn extract_page_list(
    input: &Path,
    config: &AppConfig,
    base_url: Option<String>,
    prefix: Option<String>,
) -> std::result::Result<PageList, SitePdfError> {
    let mut opts = ExtractOptions::from(&config.extract);
    if let Some(prefix) = prefix {
        opts.mount_prefix = prefix;
    }
    let base_url = base_url.unwrap_or_else(|| config.extract.base_url.clone());

    page_list_from_file(input, &base_url, &opts)
}

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

async fn cmd_build(
    page_list: &Path,
    output_dir: Option<PathBuf>,
    merged_filename: Option<String>,
) -> Result<()> {
    let config = load_config()?;

    if !page_list.is_file() {
        return Err(eyre!(
            "page list '{}' not found; run `sitepdf extract` first",
            page_list.display()
        ));
    }
    let list = PageList::load(page_list)?;
    if list.is_empty() {
        warn!(path = %page_list.display(), "page list is empty, nothing to build");
        println!("No pages listed in {}, nothing to build.", page_list.display());
        return Ok(());
    }

    let build = build_config(&config, output_dir, merged_filename);

    info!(
        pages = list.len(),
        base_url = %list.base_url,
        output_dir = %build.output_dir.display(),
        "starting build"
    );

    let reporter = CliProgress::new();
    let report = sitepdf_core::build_site(&list, &config, &build, &reporter).await?;

    print_summary(&report);
    Ok(())
}

fn build_config(
    config: &AppConfig,
    output_dir: Option<PathBuf>,
    merged_filename: Option<String>,
) -> BuildConfig {
    let mut build = BuildConfig::from_config(config);
    if let Some(dir) = output_dir {
        build.output_dir = dir;
    }
    if let Some(name) = merged_filename {
        build.merged_filename = name;
    }
    build
}

fn print_summary(report: &BuildReport) {
    println!();
    println!("  Rendered: {}", report.artifacts.len());
    println!("  Skipped:  {}", report.failures.len());
    for (url, error) in &report.failures {
        let first_line = error.lines().next().unwrap_or_default();
        println!("    - {url}: {first_line}");
    }
    match &report.merged {
        Some(path) => {
            let pages = report.merge.as_ref().map_or(0, |m| m.page_count);
            println!("  Merged:   {} ({pages} pages)", path.display());
        }
        None => println!("  Merged:   none (no page rendered)"),
    }
    println!("  Time:     {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn page_started(&self, url: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Rendering [{current}/{total}] {url}"));
    }

    fn page_rendered(&self, path: &Path, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Rendered [{current}/{total}] {}", path.display()));
    }

    fn page_failed(&self, url: &str, _error: &SitePdfError) {
        self.spinner.println(format!("  skipped {url}"));
    }

    fn done(&self, _report: &BuildReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
