use std::process;
use std::time::Duration;

use anyhow::{Context, bail};
use cns_e2e::{E2eConfig, EntityRef, EntityType, PollSpec, VSphere, init_tracing};

#[derive(Debug, Clone, PartialEq)]
enum Command {
    WaitCreated {
        volume: String,
    },
    WaitDeleted {
        volume: String,
    },
    Labels {
        volume: String,
        entity_type: EntityType,
        name: String,
        namespace: String,
    },
    Policy {
        volume: String,
        policy: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct Args {
    command: Command,
    interval: Option<Duration>,
    timeout: Option<Duration>,
}

#[tokio::main]
async fn main() {
    let argv: Vec<String> = std::env::args().collect();

    let args = match parse_args(&argv) {
        Ok(v) => v,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("Usage: cns-probe <command> [options]");
            eprintln!();
            eprintln!("Commands:");
            eprintln!("  wait-created <volume>     Wait until CNS reports the volume");
            eprintln!("  wait-deleted <volume>     Wait until CNS no longer reports the volume");
            eprintln!("  labels <volume> --entity-type <type> --name <name> [--namespace <ns>]");
            eprintln!("                            Print the labels CNS holds for an entity");
            eprintln!("  policy <volume> <policy>  Check the volume is associated with a storage policy");
            eprintln!();
            eprintln!("Options:");
            eprintln!("  --interval <secs>  Poll interval [default: CNS_E2E_POLL_INTERVAL or 2]");
            eprintln!("  --timeout <secs>   Poll timeout [default: CNS_E2E_POLL_TIMEOUT or 300]");
            eprintln!();
            eprintln!("Connection settings come from VSPHERE_URL, VSPHERE_USER and VSPHERE_PASSWORD.");
            process::exit(2);
        }
    };

    init_tracing();

    if let Err(e) = run(args).await {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn parse_seconds(flag: &str, value: Option<&String>) -> Result<Duration, String> {
    let raw = value.ok_or_else(|| format!("{flag} requires a value"))?;
    raw.parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| format!("invalid value for {flag}: '{raw}'"))
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut positional: Vec<String> = Vec::new();
    let mut interval = None;
    let mut timeout = None;
    let mut entity_type: Option<EntityType> = None;
    let mut name: Option<String> = None;
    let mut namespace: Option<String> = None;

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--interval" => {
                i += 1;
                interval = Some(parse_seconds("--interval", args.get(i))?);
            }
            "--timeout" => {
                i += 1;
                timeout = Some(parse_seconds("--timeout", args.get(i))?);
            }
            "--entity-type" => {
                i += 1;
                let raw = args.get(i).ok_or("--entity-type requires a value")?;
                entity_type = Some(raw.parse()?);
            }
            "--name" => {
                i += 1;
                name = Some(args.get(i).ok_or("--name requires a value")?.clone());
            }
            "--namespace" => {
                i += 1;
                namespace = Some(args.get(i).ok_or("--namespace requires a value")?.clone());
            }
            "--help" | "-h" => return Err(String::new()),
            arg if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let command = positional.next().ok_or("missing required argument: <command>")?;
    let volume = positional.next().ok_or("missing required argument: <volume>")?;

    let command = match command.as_str() {
        "wait-created" => Command::WaitCreated { volume },
        "wait-deleted" => Command::WaitDeleted { volume },
        "labels" => Command::Labels {
            volume,
            entity_type: entity_type.ok_or("labels requires --entity-type")?,
            name: name.ok_or("labels requires --name")?,
            namespace: namespace.unwrap_or_else(|| "default".to_string()),
        },
        "policy" => Command::Policy {
            volume,
            policy: positional.next().ok_or("missing required argument: <policy>")?,
        },
        other => return Err(format!("unknown command: {other}")),
    };

    if let Some(extra) = positional.next() {
        return Err(format!("unexpected argument: {extra}"));
    }

    Ok(Args {
        command,
        interval,
        timeout,
    })
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = E2eConfig::from_env().context("failed to load configuration")?;
    config.poll = PollSpec::new(
        args.interval.unwrap_or(config.poll.interval()),
        args.timeout.unwrap_or(config.poll.timeout()),
    )?;

    let vsphere = VSphere::connect(&config)
        .await
        .with_context(|| format!("failed to connect to {}", config.vsphere.url))?;

    let cancel = vsphere.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            cancel.cancel();
        }
    });

    let result = execute(&vsphere, args.command).await;

    if let Err(e) = vsphere.close().await {
        tracing::warn!(error = %e, "Failed to end session");
    }
    result
}

async fn execute<A: cns_e2e::ManagementApi>(
    vsphere: &VSphere<A>,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::WaitCreated { volume } => {
            vsphere.wait_for_volume_to_be_created(&volume).await?;
            println!("volume {volume} created");
        }
        Command::WaitDeleted { volume } => {
            vsphere.wait_for_volume_to_be_deleted(&volume).await?;
            println!("volume {volume} deleted");
        }
        Command::Labels {
            volume,
            entity_type,
            name,
            namespace,
        } => {
            let entity = EntityRef::new(entity_type, name, namespace);
            let labels = vsphere.labels_for_volume(&volume, &entity).await?;
            println!("{}", serde_json::to_string_pretty(&labels)?);
        }
        Command::Policy { volume, policy } => {
            if !vsphere.verify_spbm_policy_of_volume(&volume, &policy).await? {
                bail!("volume {volume} is not associated with storage policy {policy}");
            }
            println!("volume {volume} is associated with storage policy {policy}");
        }
    }
    Ok(())
}
