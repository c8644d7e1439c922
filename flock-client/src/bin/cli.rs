use anyhow::{anyhow, Context};
use clap::{App, Arg};
use flock_codec::Request;

#[tokio::main(basic_scheduler)]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::try_init().map_err(|err| anyhow!("{}", err))?;

    let matches = App::new("flock-cli")
        .about("Sends a single command to a flock node and prints the reply.")
        .arg(
            Arg::with_name("addr")
                .required(true)
                .help("Target node address, host:port"),
        )
        .arg(
            Arg::with_name("command")
                .required(true)
                .possible_values(&["heartbeat", "vote"])
                .help("Command to send"),
        )
        .arg(Arg::with_name("term").required(true).help("Sender term"))
        .arg(Arg::with_name("name").required(true).help("Sender name"))
        .get_matches();

    let addr = matches.value_of("addr").unwrap();
    let term: u64 = matches
        .value_of("term")
        .unwrap()
        .parse()
        .context("term must be a non-negative integer")?;
    let name = matches.value_of("name").unwrap().to_string();

    let request = match matches.value_of("command").unwrap() {
        "heartbeat" => Request::Heartbeat { term, leader: name },
        _ => Request::Vote {
            term,
            candidate: name,
        },
    };

    let response = flock_client::call(addr, &request)
        .await
        .with_context(|| format!("call to {} failed", addr))?;
    println!("{:?}", response);

    Ok(())
}
