use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context};
use apiscope_core::{
    read_targets, scan_with_sink, ConsoleSink, ResultAggregator, ScanConfig, ScanEventSink, ScanPhase,
    ScanResult, SecurityIssue, Severity, SinkRef, UrlValidator,
};
use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Parser, Debug)]
#[command(
    name = "apiscope",
    version,
    about = "Discover the backend API surface of a web app from its client-side JavaScript",
    override_usage = "apiscope <target>  <options>",
    after_help = "\x1b[1;36mEXAMPLES:\x1b[0m
  Quick scan:                     apiscope https://target.com
  Verbose mode:                   apiscope https://target.com -v
  Heuristic enrichment:           apiscope https://target.com --use-ai
  Passive only (no probing):      apiscope https://target.com --no-unauthorized-check
  With proxy (Burp):              apiscope https://target.com --proxy http://127.0.0.1:8080
  Custom headers:                 apiscope https://target.com -H \"Cookie: sess=abc\"
  Config file + output:           apiscope https://target.com -c scan.json -o result.json
  Scan from file:                 apiscope -l targets.txt
  Dry-run test:                   apiscope https://target.com --dry-run"
)]
pub struct Args {
    #[arg(required_unless_present = "list")]
    pub target: Option<String>,

    #[arg(short = 'l', long = "list", help = "File containing target URLs (one per line)")]
    pub list: Option<PathBuf>,

    #[arg(short = 'c', long = "config", help = "JSON config file; flags below override it")]
    pub config: Option<PathBuf>,

    #[arg(short = 'o', long, default_value = "apiscope_results.json", help = "Output file path for results")]
    pub output: PathBuf,

    #[arg(short = 't', long, help = "Concurrent requests [default: 10]")]
    pub concurrency: Option<usize>,

    #[arg(long, help = "Overall scan timeout in seconds, 0 for none [default: 300]")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Per-request timeout in seconds [default: 10]")]
    pub request_timeout: Option<u64>,

    #[arg(long, help = "Maximum JavaScript files to fetch [default: 100]")]
    pub max_js_files: Option<usize>,

    #[arg(long, help = "Maximum candidate APIs to keep [default: 1000]")]
    pub max_apis: Option<usize>,

    #[arg(long, help = "Maximum anonymous API probes [default: 100]")]
    pub max_probes: Option<usize>,

    #[arg(long, help = "Mine string concatenation and template literals too")]
    pub use_ai: bool,

    #[arg(long, help = "Skip JavaScript discovery")]
    pub no_js_extraction: bool,

    #[arg(long, help = "Skip API discovery")]
    pub no_api_discovery: bool,

    #[arg(long, help = "Skip microservice grouping")]
    pub no_microservices: bool,

    #[arg(long, help = "Do not probe discovered APIs")]
    pub no_unauthorized_check: bool,

    #[arg(long, help = "Do not look for credential keywords in JavaScript")]
    pub no_sensitive_check: bool,

    #[arg(long, help = "Do not fingerprint vulnerable libraries")]
    pub no_component_check: bool,

    #[arg(long, help = "Proxy URL (e.g. http://127.0.0.1:8080)")]
    pub proxy: Option<String>,

    #[arg(short = 'H', long = "header", help = "Custom header (e.g. \"Authorization: Bearer TOKEN\")")]
    pub headers: Vec<String>,

    #[arg(long, help = "Override the rotating browser User-Agent")]
    pub user_agent: Option<String>,

    #[arg(short = 'k', long, help = "Accept invalid TLS certificates")]
    pub insecure: bool,

    #[arg(long, help = "Allow private, loopback and internal-service targets")]
    pub allow_internal: bool,

    #[arg(short = 'v', long, default_value_t = false, help = "Show the whole process (Verbose Mode)")]
    pub verbose: bool,

    #[arg(long, help = "Validate targets and configuration without sending requests")]
    pub dry_run: bool,
}

impl Args {
    /// Defaults, then the config file, then explicit flags.
    fn build_config(&self) -> anyhow::Result<ScanConfig> {
        let mut config = match self.config {
            Some(ref path) => ScanConfig::load(path)?,
            None => ScanConfig::default(),
        };

        if let Some(v) = self.concurrency { config.concurrency = v; }
        if let Some(v) = self.timeout { config.timeout = v; }
        if let Some(v) = self.request_timeout { config.request_timeout = v; }
        if let Some(v) = self.max_js_files { config.max_js_files = v; }
        if let Some(v) = self.max_apis { config.max_apis = v; }
        if let Some(v) = self.max_probes { config.max_probes = v; }
        if let Some(ref v) = self.proxy { config.proxy = v.clone(); }
        if let Some(ref v) = self.user_agent { config.user_agent = Some(v.clone()); }

        config.use_ai |= self.use_ai;
        config.allow_internal |= self.allow_internal;
        if self.insecure { config.verify_tls = false; }
        if self.no_js_extraction { config.enable_js_extraction = false; }
        if self.no_api_discovery { config.enable_api_discovery = false; }
        if self.no_microservices { config.enable_microservice_detection = false; }
        if self.no_unauthorized_check { config.enable_unauthorized_check = false; }
        if self.no_sensitive_check { config.enable_sensitive_info_check = false; }
        if self.no_component_check { config.enable_component_check = false; }

        if !self.headers.is_empty() {
            let mut all = config.header_list();
            all.extend(self.headers.iter().cloned());
            config.headers = all.join("; ");
        }

        if config.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        Ok(config)
    }

    fn targets(&self) -> anyhow::Result<Vec<String>> {
        let mut targets = Vec::new();
        if let Some(ref list_path) = self.list {
            let lines = read_targets(list_path)
                .with_context(|| format!("failed to read '{}'", list_path.display()))?;
            println!(
                "{}",
                format!("[+] Loaded {} target(s) from {}", lines.len(), list_path.display())
                    .green()
                    .bold()
            );
            targets.extend(lines);
        }
        if let Some(ref t) = self.target {
            targets.push(t.clone());
        }
        if targets.is_empty() {
            bail!("no targets specified. Provide a URL or use -l <file>.");
        }
        Ok(targets)
    }
}

/// Progress bar sink. Log lines and findings are printed above the bar.
struct ProgressSink {
    bar: ProgressBar,
}

impl ProgressSink {
    fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ScanEventSink for ProgressSink {
    fn on_log(&self, level: &str, message: &str) {
        let line = match level {
            "success" => message.green().to_string(),
            "error" => message.red().to_string(),
            "warn" => message.yellow().to_string(),
            _ => message.to_string(),
        };
        self.bar.println(line);
    }

    fn on_progress(&self, phase: ScanPhase, percent: u8) {
        self.bar.set_position(u64::from(percent));
        self.bar.set_message(phase.to_string());
    }

    fn on_issue(&self, issue: &SecurityIssue) {
        let severity = match issue.severity {
            Severity::Critical | Severity::High => issue.severity.as_str().red().bold(),
            Severity::Medium => issue.severity.as_str().yellow().bold(),
            _ => issue.severity.as_str().blue(),
        };
        self.bar.println(format!(
            "{} [{}] {}  {}",
            "[+]".green().bold(),
            severity,
            issue.title,
            issue.target_url.dimmed()
        ));
    }
}

#[tokio::main]
async fn main() {
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args).await {
        Ok(true) => {}
        Ok(false) => process::exit(2),
        Err(e) => {
            eprintln!("{}", format!("[!] {:#}", e).red());
            process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        "warn,apiscope=debug,apiscope_core=debug"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp(None)
        .init();
}

/// Returns whether every scan completed.
async fn run(args: &Args) -> anyhow::Result<bool> {
    let config = args.build_config()?;
    let targets = args.targets()?;

    if args.dry_run {
        return Ok(dry_run(&targets, &config));
    }

    print_banner();
    print_scan_config(&config, args);

    let console: SinkRef = ConsoleSink::new_ref();
    let total = targets.len();
    let mut results: Vec<ScanResult> = Vec::with_capacity(total);

    for (i, target) in targets.iter().enumerate() {
        if total > 1 {
            println!(
                "\n{}",
                format!("━━━ Target {}/{}: {} ━━━", i + 1, total, target).bright_white().bold()
            );
        }

        let progress = Arc::new(ProgressSink::new());
        let result = scan_with_sink(target, &config, progress.clone()).await;
        progress.finish();

        ResultAggregator::report_summary(&result, &console);
        results.push(result);
    }

    if results.len() == 1 {
        ResultAggregator::write_json(&results[0], &args.output)?;
    } else {
        ResultAggregator::write_json(&results, &args.output)?;
    }
    println!("{}", format!("[+] Results written to {}", args.output.display()).green());

    Ok(results.iter().all(|r| r.is_completed()))
}

/// Checks every target statically and prints the effective configuration.
fn dry_run(targets: &[String], config: &ScanConfig) -> bool {
    let validator = UrlValidator::new(config.allow_internal);
    let mut ok = true;
    for target in targets {
        match validator.parse(target) {
            Ok(_) => println!("[DRY RUN] Would scan target: {}", target),
            Err(e) => {
                ok = false;
                println!("{}", format!("[DRY RUN] Invalid target {}: {}", target, e).red());
            }
        }
    }
    if let Ok(json) = serde_json::to_string_pretty(config) {
        println!("[DRY RUN] Effective configuration:\n{}", json);
    }
    ok
}

fn print_banner() {
    let banner = r#"
     _    ____ ___
    / \  |  _ \_ _|___  ___ ___  _ __   ___
   / _ \ | |_) | |/ __|/ __/ _ \| '_ \ / _ \
  / ___ \|  __/| |\__ \ (_| (_) | |_) |  __/
 /_/   \_\_|  |___|___/\___\___/| .__/ \___|
                                |_|
    "#;
    println!("{}", banner.bright_cyan().bold());
    println!("{}", "──────────────────────────────────────────────────".dimmed());
}

fn print_scan_config(config: &ScanConfig, args: &Args) {
    let on_off = |b: bool| if b { "ON" } else { "OFF" };

    println!("{}", format!("[+] Concurrency:  {}", config.concurrency).blue());
    println!(
        "{}",
        format!("[+] Timeouts:     {}s scan / {}s request", config.timeout, config.request_timeout).blue()
    );
    println!(
        "{}",
        format!("[+] Caps:         {} JS files / {} APIs", config.max_js_files, config.max_apis).blue()
    );
    println!("{}", format!("[+] Enrichment:   {}", on_off(config.use_ai)).magenta());
    println!("{}", format!("[+] API probing:  {}", on_off(config.enable_unauthorized_check)).magenta());
    println!("{}", format!("[+] Output:       {}", args.output.display()).blue());
    if let Some(proxy) = config.proxy_ref() {
        println!("{}", format!("[+] Proxy:        {}", proxy).yellow());
    }
    if !config.headers.is_empty() {
        println!("{}", format!("[+] Headers:      {} custom", config.header_list().len()).yellow());
    }
    if config.allow_internal {
        println!("{}", "[+] Internal:     targets on private networks allowed".yellow());
    }
    println!("{}", "──────────────────────────────────────────────────".dimmed());
}
