use anyhow::Context;
use clap::{App, Arg};
use flock_node::NodeConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = App::new("flock")
        .version("0.1.0")
        .about("A leader-election cluster membership daemon.")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("PATH")
                .help("Config file path"),
        )
        .arg(
            Arg::with_name("name")
                .short("n")
                .long("name")
                .value_name("NAME")
                .help("Node identifier"),
        )
        .arg(
            Arg::with_name("addr")
                .short("a")
                .long("addr")
                .value_name("ADDR")
                .help("Listen address"),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Listen port"),
        )
        .arg(
            Arg::with_name("members")
                .short("m")
                .long("members")
                .value_name("MEMBERS")
                .help("Cluster roster, comma separated name:host:port triples"),
        )
        .arg(
            Arg::with_name("log-level")
                .short("l")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level"),
        )
        .arg(
            Arg::with_name("no-color")
                .long("no-color")
                .help("Disable colored log output"),
        )
        .get_matches();

    let mut overrides: Vec<(&str, String)> = Vec::new();
    for &key in &["name", "addr", "port", "members"] {
        if let Some(value) = matches.value_of(key) {
            overrides.push((key, value.to_string()));
        }
    }
    if let Some(level) = matches.value_of("log-level") {
        overrides.push(("log_level", level.to_string()));
    }
    if matches.is_present("no-color") {
        overrides.push(("log_color", "false".to_string()));
    }

    let config = NodeConfig::load(matches.value_of("config"), &overrides)
        .context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_level))
        .with_ansi(config.log_color)
        .init();

    flock::flock(config).await
}
