//! Dispatch phones read from standard input to a bulk messaging gateway.

use bulk_dispatcher::{
    config::{Config, Mode},
    dispatcher::Summary,
    gateway::Http,
    metrics::{self, Metrics},
    outcome::Stdout,
    pipeline, segments, upload, Error,
};
use clap::{Arg, ArgAction, ArgMatches, Command};
use prometheus_client::registry::Registry;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
};
use tokio::io::BufReader;
use tracing::{error, info, Level};

/// Returns the version of the crate.
pub const fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

const VERBOSE_FLAG: &str = "verbose";
const JSON_FLAG: &str = "json";
const CONFIG_ARG: &str = "config";
const DLR_FLAG: &str = "dlr";
const TEXT_ARG: &str = "text";

/// String arguments copied verbatim into the configuration.
const STRING_ARGS: &[(&str, &str)] = &[
    ("user", "Gateway account"),
    ("pass", "Gateway secret used to sign requests"),
    ("from", "Sender id"),
    ("buttontext", "Text on button"),
    ("buttonlink", "Link opened on button click"),
    ("expirytxt", "Text shown once the message expires"),
    ("label", "Message label (e.g. promotion or transaction)"),
    ("imageid", "Id of an image already uploaded to the media endpoint"),
    ("sendingmethod", "Sending method"),
    ("groupid", "Id grouping the messages of this dispatch"),
    ("bulkurl", "Bulk messaging endpoint"),
    ("phiurl", "Phone lookup endpoint"),
    ("mediaurl", "Media upload endpoint"),
];

fn command() -> Command {
    let mut command = Command::new("dispatcher")
        .version(crate_version())
        .about("Dispatch phones read from standard input to a bulk messaging gateway.")
        .arg(
            Arg::new(VERBOSE_FLAG)
                .short('v')
                .long(VERBOSE_FLAG)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(JSON_FLAG)
                .long(JSON_FLAG)
                .help("Log in JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(CONFIG_ARG)
                .long(CONFIG_ARG)
                .help("Path to YAML config file (flags override its values)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("mode")
                .long("mode")
                .help("msg to send messages, phi to look up phones")
                .value_parser(["msg", "phi"]),
        )
        .arg(
            Arg::new(TEXT_ARG)
                .long(TEXT_ARG)
                .help("Message template (repeat to pick one at random per batch)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("imagefile")
                .long("imagefile")
                .help("Image to upload before dispatch")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("dlrtimeout")
                .long("dlrtimeout")
                .help("Delivery report timeout")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(DLR_FLAG)
                .long(DLR_FLAG)
                .help("Request delivery reports")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("segments")
                .long("segments")
                .help("Number of SMS segments every text must occupy")
                .value_parser(clap::builder::RangedU64ValueParser::<usize>::new().range(1..)),
        )
        .arg(
            Arg::new("batchsize")
                .long("batchsize")
                .help("Number of phones in one request (must be >= 1)")
                .value_parser(clap::builder::RangedU64ValueParser::<usize>::new().range(1..)),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .help("Number of concurrent requests (must be >= 1)")
                .value_parser(clap::builder::RangedU64ValueParser::<usize>::new().range(1..)),
        )
        .arg(
            Arg::new("rate")
                .long("rate")
                .help("Maximum requests per second across all threads (0 disables pacing)")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("metrics-port")
                .long("metrics-port")
                .help("Serve metrics on this port")
                .value_parser(clap::value_parser!(u16)),
        );
    for (name, help) in STRING_ARGS {
        command = command.arg(Arg::new(*name).long(*name).help(*help));
    }
    command
}

/// Build the configuration from the optional config file and flags.
fn configure(matches: &ArgMatches) -> Result<Config, Error> {
    let mut config = match matches.get_one::<PathBuf>(CONFIG_ARG) {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(mode) = matches.get_one::<String>("mode") {
        config.mode = mode.parse::<Mode>()?;
    }
    if let Some(texts) = matches.get_many::<String>(TEXT_ARG) {
        config.texts = texts.cloned().collect();
    }
    for (name, _) in STRING_ARGS {
        let Some(value) = matches.get_one::<String>(name) else {
            continue;
        };
        let field = match *name {
            "user" => &mut config.user,
            "pass" => &mut config.pass,
            "from" => &mut config.from,
            "buttontext" => &mut config.button_text,
            "buttonlink" => &mut config.button_link,
            "expirytxt" => &mut config.expiry_txt,
            "label" => &mut config.label,
            "imageid" => &mut config.image_id,
            "sendingmethod" => &mut config.sending_method,
            "groupid" => &mut config.group_id,
            "bulkurl" => &mut config.bulk_url,
            "phiurl" => &mut config.lookup_url,
            "mediaurl" => &mut config.media_url,
            _ => continue,
        };
        *field = value.clone();
    }
    if let Some(path) = matches.get_one::<PathBuf>("imagefile") {
        config.image_file = Some(path.clone());
    }
    if let Some(timeout) = matches.get_one::<u32>("dlrtimeout") {
        config.dlr_timeout = *timeout;
    }
    if matches.get_flag(DLR_FLAG) {
        config.dlr = true;
    }
    if let Some(segments) = matches.get_one::<usize>("segments") {
        config.expected_segments = Some(*segments);
    }
    if let Some(batch_size) = matches.get_one::<usize>("batchsize") {
        config.batch_size = *batch_size;
    }
    if let Some(workers) = matches.get_one::<usize>("threads") {
        config.workers = *workers;
    }
    if let Some(rate) = matches.get_one::<f64>("rate") {
        config.rate = *rate;
    }
    if let Some(port) = matches.get_one::<u16>("metrics-port") {
        config.metrics_port = Some(*port);
    }
    config.validate()?;
    Ok(config)
}

/// Prepare the campaign and dispatch standard input.
async fn dispatch(mut config: Config) -> Result<Summary, Error> {
    // Check texts before anything is sent
    if config.mode == Mode::Message {
        for text in &config.texts {
            let count = segments::count(text);
            info!(segments = count, chars = text.chars().count(), "message size");
            if let Some(expected) = config.expected_segments {
                segments::check(text, expected)?;
            }
        }
    }

    // Upload image
    let client = reqwest::Client::new();
    if config.needs_upload() {
        if let Some(path) = &config.image_file {
            config.image_id =
                upload::upload(&client, &config.media_url, &config.user, &config.pass, path)
                    .await?;
        }
    }
    let config = Arc::new(config);

    // Serve metrics
    let mut registry = Registry::default();
    let metrics = Metrics::new(&mut registry);
    let server = config.metrics_port.map(|port| {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        let registry = Arc::new(registry);
        info!(?addr, "serving metrics");
        tokio::spawn(async move {
            if let Err(err) = metrics::listen(addr, registry).await {
                error!(?err, "could not serve metrics");
            }
        })
    });

    // Dispatch
    let input = BufReader::new(tokio::io::stdin());
    let result = pipeline::run(config, input, Http::new(client), Stdout, metrics).await;
    if let Some(server) = server {
        server.abort();
    }
    result
}

/// Entrypoint for the dispatcher CLI
#[tokio::main]
async fn main() -> ExitCode {
    let matches = command().get_matches();

    // Create logger (standard output is reserved for outcomes)
    let level = if matches.get_flag(VERBOSE_FLAG) {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let logger = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr);
    if matches.get_flag(JSON_FLAG) {
        logger.json().init();
    } else {
        logger.init();
    }

    let config = match configure(&matches) {
        Ok(config) => config,
        Err(e) => {
            error!(error=?e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    match dispatch(config).await {
        Ok(summary) => {
            info!(
                submitted = summary.submitted,
                completed = summary.completed,
                "done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error=?e, "dispatch failed");
            ExitCode::FAILURE
        }
    }
}
