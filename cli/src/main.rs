use anyhow::Context;
use clap::{ArgAction, Parser};
use colored::*;
use log::debug;
use std::process;

use xssmap_core::{
    default_output_filename, is_config_path, parse_key_values, AssessmentConfig,
    AssessmentEventSink, ConsoleSink, RequestType, XssMap,
};

#[derive(Parser, Debug)]
#[command(
    name = "XssMap",
    version,
    about = "Reflection context mapper and XSS verification scanner",
    disable_help_flag = true,
    override_usage = "xssmap <url> [options]\n       xssmap <config.json> [output.json]",
    after_help = "\x1b[1;36mEXAMPLES:\x1b[0m
  Reflection + XSS:               xssmap \"http://target.com/search?q=1\"
  Reflection check only:          xssmap \"http://target.com/search?q=1\" -r
  XSS only, every payload:        xssmap \"http://target.com/search?q=1\" -x
  POST form:                      xssmap http://target.com/login -t POST -b \"user=a&pass=b\"
  Headers and cookies:            xssmap \"http://target.com/?q=1\" -h X-Api=k -c session=abc
  From a config file:             xssmap scan.json results.json"
)]
pub struct Args {
    #[arg(help = "Target URL, or a .json/.conf config file")]
    pub target: String,

    #[arg(help = "Output file for the JSON report (default XssMap_Results_<timestamp>.json)")]
    pub output: Option<String>,

    #[arg(short = 't', long = "type", default_value = "GET", help = "Request type: GET or POST")]
    pub request_type: String,

    #[arg(short = 'b', long = "body", help = "Form-url-encoded POST body")]
    pub body: Option<String>,

    #[arg(short = 'x', long = "no-reflect", help = "Skip the reflection check")]
    pub no_reflect: bool,

    #[arg(short = 'r', long = "no-xss", help = "Skip XSS verification")]
    pub no_xss: bool,

    #[arg(short = 'h', long = "header", num_args = 1.., help = "Headers as name=value")]
    pub headers: Vec<String>,

    #[arg(short = 'c', long = "cookie", num_args = 1.., help = "Cookies as name=value")]
    pub cookies: Vec<String>,

    #[arg(long = "render", help = "Render service address (default http://127.0.0.1:8888)")]
    pub render: Option<String>,

    #[arg(long, help = "Render call timeout in seconds (default 30)")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Attacks in flight at once (default 4)")]
    pub concurrency: Option<usize>,

    #[arg(short = 'v', long, default_value_t = false, help = "Show the whole process (Verbose Mode)")]
    pub verbose: bool,

    #[arg(long, action = ArgAction::Help, help = "Print help")]
    pub help: Option<bool>,
}

impl Args {
    /// Merges the command line into an assessment config, reading the
    /// config file first when the target names one.
    fn to_config(&self) -> anyhow::Result<AssessmentConfig> {
        let mut config = if is_config_path(&self.target) {
            AssessmentConfig::from_file(&self.target)?
        } else {
            let mut config = AssessmentConfig::new(&self.target);
            config.request_type = self.request_type.parse::<RequestType>()?;
            config.request_body = self.body.clone();
            config.do_reflect = !self.no_reflect;
            config.do_xss = !self.no_xss;
            config.headers = parse_key_values(&self.headers)?;
            config.cookies = parse_key_values(&self.cookies)?;
            config
        };

        if let Some(ref render) = self.render {
            config.render_address = render.clone();
        }
        if let Some(timeout) = self.timeout {
            config.render_timeout = timeout;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    print_banner();

    if let Err(e) = run(args).await {
        eprintln!("{}", format!("[!] {:#}", e).red());
        process::exit(1);
    }
}

fn print_banner() {
    let banner = r#"
 __  __          __  __
 \ \/ /___ ___  |  \/  | __ _ _ __
  \  // __/ __| | |\/| |/ _` | '_ \
  /  \\__ \__ \ | |  | | (_| | |_) |
 /_/\_\___/___/ |_|  |_|\__,_| .__/
                             |_|
"#;
    println!("{}", banner.bright_red().bold());
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = args.to_config()?;
    let output = args.output.clone().unwrap_or_else(default_output_filename);

    debug!("Assessment config: {:?}", config);

    let sink = ConsoleSink::new_ref();
    sink.on_log(
        "phase",
        &format!("[*] {} {}", config.request_type, config.request_url),
    );

    let assessment = XssMap::from_config(config, sink.clone())?;
    let report = assessment.run().await?;

    report
        .write_to(&output)
        .with_context(|| format!("failed to write results to '{}'", output))?;

    sink.on_log("success", &format!("[+] Results written to {}", output));
    Ok(())
}
