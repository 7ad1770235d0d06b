//! NetGuard Core Engine — Network Security CLI
//!
//! Home network monitoring from the command line:
//! - ICMP ping, traceroute, DNS lookups, TCP port scans
//! - Router device discovery (Huawei / Rain 101)
//! - Device registry with alerts and manual block/unblock
//! - Background watch mode with risk assessment

use anyhow::{Context, Result};
use std::sync::Arc;

use netguard_core::{
    blocking, dns_lookup, full_scan, ping, quick_scan, registry::queries, reconcile, traceroute,
    Database, DnsRecordType, LogNotifier, RouterConfig, RouterManager, RouterType, ScanScheduler,
    DEFAULT_PING_COUNT, DEFAULT_SCAN_INTERVAL,
};

const DEFAULT_ACCOUNT: &str = "default";

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    Ping {
        host: String,
        count: Option<usize>,
    },
    Traceroute {
        host: String,
        max_hops: Option<u8>,
    },
    Dns {
        domain: String,
        record_type: DnsRecordType,
    },
    ScanPorts {
        host: String,
        full: bool,
        range: Option<(u16, u16)>,
    },
    RouterScan,
    RouterAdd {
        router_type: RouterType,
        ip: String,
        username: String,
        password: String,
    },
    RouterRemove {
        ip: String,
    },
    RouterStats,
    Devices,
    Alerts {
        include_resolved: bool,
    },
    Block {
        mac: String,
    },
    Unblock {
        mac: String,
    },
    Rename {
        mac: String,
        name: Option<String>,
    },
    ResolveAlert {
        id: i64,
    },
    Watch {
        interval: Option<u64>,
    },
    Help,
    Version,
}

fn version_text() -> String {
    format!("netguard-core {}", env!("CARGO_PKG_VERSION"))
}

fn usage_text() -> String {
    format!(
        "{version}
NetGuard Core Engine — Network Security CLI

Usage:
  netguard-core ping <HOST> [--count <N>]
  netguard-core traceroute <HOST> [--max-hops <N>]
  netguard-core dns <DOMAIN> [--record-type <TYPE>]
  netguard-core scan-ports <HOST> [--full] [--range <START-END>]
  netguard-core router-scan
  netguard-core router-add --type <huawei|rain101> --ip <IP> --username <U> --password <P>
  netguard-core router-remove --ip <IP>
  netguard-core router-stats
  netguard-core devices
  netguard-core alerts [--all]
  netguard-core block --mac <MAC>
  netguard-core unblock --mac <MAC>
  netguard-core rename --mac <MAC> [--name <NAME>]
  netguard-core resolve-alert --id <ID>
  netguard-core watch [--interval <SECONDS>]
  netguard-core --help
  netguard-core --version

Options:
      --count <N>         Ping probes to send (default: {default_count})
      --max-hops <N>      Traceroute hop limit (default: 30)
      --record-type <T>   DNS record type: A, AAAA, MX, TXT, NS, CNAME (default: A)
      --full              Scan ports 1-1024 instead of the common-port list
      --range <S-E>       Scan an explicit port range, e.g. 1-4096
      --name <NAME>       Custom device name; omit to clear the stored name
      --id <ID>           Alert identifier from the alerts listing
      --account <ID>      Account namespace in the registry (default: {default_account})
      --interval <N>      Watch-mode scan interval in seconds (default: {default_interval})
      --all               Include resolved alerts
  -h, --help              Show this help text
  -V, --version           Show version",
        version = version_text(),
        default_count = DEFAULT_PING_COUNT,
        default_account = DEFAULT_ACCOUNT,
        default_interval = DEFAULT_SCAN_INTERVAL
    )
}

fn invalid_value(flag: &str, raw: &str, expected: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "Invalid value for {}: '{}'. Expected {}.\n\n{}",
        flag,
        raw,
        expected,
        usage_text()
    )
}

fn parse_count(raw: &str) -> Result<usize> {
    raw.parse::<usize>()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| invalid_value("--count", raw, "a positive integer"))
}

fn parse_max_hops(raw: &str) -> Result<u8> {
    raw.parse::<u8>()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| invalid_value("--max-hops", raw, "a positive integer"))
}

fn parse_alert_id(raw: &str) -> Result<i64> {
    raw.parse::<i64>()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| invalid_value("--id", raw, "a positive integer"))
}

fn parse_interval(raw: &str) -> Result<u64> {
    raw.parse::<u64>()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| invalid_value("--interval", raw, "a positive integer"))
}

fn parse_port_range(raw: &str) -> Result<(u16, u16)> {
    let parsed = raw.split_once('-').and_then(|(start, end)| {
        let start = start.trim().parse::<u16>().ok()?;
        let end = end.trim().parse::<u16>().ok()?;
        (start > 0 && start <= end).then_some((start, end))
    });
    parsed.ok_or_else(|| invalid_value("--range", raw, "a port range like 1-1024"))
}

fn parse_record_type(raw: &str) -> Result<DnsRecordType> {
    raw.parse::<DnsRecordType>()
        .map_err(|_| invalid_value("--record-type", raw, "one of A, AAAA, MX, TXT, NS, CNAME"))
}

fn parse_router_type(raw: &str) -> Result<RouterType> {
    raw.parse::<RouterType>()
        .map_err(|_| invalid_value("--type", raw, "huawei or rain101"))
}

struct ParsedArgs {
    command: Option<String>,
    positional: Option<String>,
    account: String,
    count: Option<usize>,
    max_hops: Option<u8>,
    record_type: Option<DnsRecordType>,
    full: bool,
    range: Option<(u16, u16)>,
    router_type: Option<RouterType>,
    ip: Option<String>,
    username: Option<String>,
    password: Option<String>,
    mac: Option<String>,
    name: Option<String>,
    id: Option<i64>,
    interval: Option<u64>,
    include_resolved: bool,
}

fn parse_cli_args<I, S>(args: I) -> Result<(CliCommand, String)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut iter = args.into_iter();
    let _program_name = iter.next();

    let mut parsed = ParsedArgs {
        command: None,
        positional: None,
        account: DEFAULT_ACCOUNT.to_string(),
        count: None,
        max_hops: None,
        record_type: None,
        full: false,
        range: None,
        router_type: None,
        ip: None,
        username: None,
        password: None,
        mac: None,
        name: None,
        id: None,
        interval: None,
        include_resolved: false,
    };

    while let Some(arg) = iter.next() {
        let arg = arg.as_ref();
        let mut flag_value = |flag: &str| -> Result<String> {
            iter.next()
                .map(|v| v.as_ref().to_string())
                .ok_or_else(|| anyhow::anyhow!("Missing value for {}.\n\n{}", flag, usage_text()))
        };

        match arg {
            "-h" | "--help" => return Ok((CliCommand::Help, parsed.account)),
            "-V" | "--version" => return Ok((CliCommand::Version, parsed.account)),
            "ping" | "traceroute" | "dns" | "scan-ports" | "router-scan" | "router-add"
            | "router-remove" | "router-stats" | "devices" | "alerts" | "block" | "unblock" | "rename"
            | "resolve-alert" | "watch"
                if parsed.command.is_none() =>
            {
                parsed.command = Some(arg.to_string());
            }
            "--count" => parsed.count = Some(parse_count(&flag_value("--count")?)?),
            "--max-hops" => parsed.max_hops = Some(parse_max_hops(&flag_value("--max-hops")?)?),
            "--record-type" => {
                parsed.record_type = Some(parse_record_type(&flag_value("--record-type")?)?)
            }
            "--full" => parsed.full = true,
            "--all" => parsed.include_resolved = true,
            "--range" => parsed.range = Some(parse_port_range(&flag_value("--range")?)?),
            "--type" => parsed.router_type = Some(parse_router_type(&flag_value("--type")?)?),
            "--ip" => parsed.ip = Some(flag_value("--ip")?),
            "--username" => parsed.username = Some(flag_value("--username")?),
            "--password" => parsed.password = Some(flag_value("--password")?),
            "--mac" => parsed.mac = Some(flag_value("--mac")?),
            "--name" => parsed.name = Some(flag_value("--name")?),
            "--id" => parsed.id = Some(parse_alert_id(&flag_value("--id")?)?),
            "--account" => parsed.account = flag_value("--account")?,
            "--interval" => parsed.interval = Some(parse_interval(&flag_value("--interval")?)?),
            _ if arg.starts_with("--") => {
                let (flag, value) = arg
                    .split_once('=')
                    .ok_or_else(|| anyhow::anyhow!("Unknown argument: {arg}\n\n{}", usage_text()))?;
                if value.is_empty() {
                    return Err(anyhow::anyhow!(
                        "Missing value for {}.\n\n{}",
                        flag,
                        usage_text()
                    ));
                }
                match flag {
                    "--count" => parsed.count = Some(parse_count(value)?),
                    "--max-hops" => parsed.max_hops = Some(parse_max_hops(value)?),
                    "--record-type" => parsed.record_type = Some(parse_record_type(value)?),
                    "--range" => parsed.range = Some(parse_port_range(value)?),
                    "--type" => parsed.router_type = Some(parse_router_type(value)?),
                    "--ip" => parsed.ip = Some(value.to_string()),
                    "--username" => parsed.username = Some(value.to_string()),
                    "--password" => parsed.password = Some(value.to_string()),
                    "--mac" => parsed.mac = Some(value.to_string()),
                    "--name" => parsed.name = Some(value.to_string()),
                    "--id" => parsed.id = Some(parse_alert_id(value)?),
                    "--account" => parsed.account = value.to_string(),
                    "--interval" => parsed.interval = Some(parse_interval(value)?),
                    _ => {
                        return Err(anyhow::anyhow!(
                            "Unknown argument: {arg}\n\n{}",
                            usage_text()
                        ))
                    }
                }
            }
            _ if parsed.command.is_some() && parsed.positional.is_none() => {
                parsed.positional = Some(arg.to_string());
            }
            _ => {
                return Err(anyhow::anyhow!(
                    "Unknown argument: {arg}\n\n{}",
                    usage_text()
                ));
            }
        }
    }

    let account = parsed.account.clone();
    let command = build_command(parsed)?;
    Ok((command, account))
}

fn build_command(parsed: ParsedArgs) -> Result<CliCommand> {
    let require_positional = |name: &str| -> Result<String> {
        parsed
            .positional
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Missing <{}> argument.\n\n{}", name, usage_text()))
    };
    let require_mac = || -> Result<String> {
        parsed
            .mac
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Missing --mac <MAC>.\n\n{}", usage_text()))
    };

    match parsed.command.as_deref() {
        Some("ping") => Ok(CliCommand::Ping {
            host: require_positional("HOST")?,
            count: parsed.count,
        }),
        Some("traceroute") => Ok(CliCommand::Traceroute {
            host: require_positional("HOST")?,
            max_hops: parsed.max_hops,
        }),
        Some("dns") => Ok(CliCommand::Dns {
            domain: require_positional("DOMAIN")?,
            record_type: parsed.record_type.unwrap_or(DnsRecordType::A),
        }),
        Some("scan-ports") => Ok(CliCommand::ScanPorts {
            host: require_positional("HOST")?,
            full: parsed.full,
            range: parsed.range,
        }),
        Some("router-scan") => Ok(CliCommand::RouterScan),
        Some("router-add") => {
            let missing = |flag: &str| {
                anyhow::anyhow!("router-add requires {}.\n\n{}", flag, usage_text())
            };
            Ok(CliCommand::RouterAdd {
                router_type: parsed.router_type.ok_or_else(|| missing("--type"))?,
                ip: parsed.ip.ok_or_else(|| missing("--ip"))?,
                username: parsed.username.ok_or_else(|| missing("--username"))?,
                password: parsed.password.ok_or_else(|| missing("--password"))?,
            })
        }
        Some("router-remove") => Ok(CliCommand::RouterRemove {
            ip: parsed
                .ip
                .ok_or_else(|| anyhow::anyhow!("Missing --ip <IP>.\n\n{}", usage_text()))?,
        }),
        Some("router-stats") => Ok(CliCommand::RouterStats),
        Some("devices") => Ok(CliCommand::Devices),
        Some("alerts") => Ok(CliCommand::Alerts {
            include_resolved: parsed.include_resolved,
        }),
        Some("block") => Ok(CliCommand::Block { mac: require_mac()? }),
        Some("unblock") => Ok(CliCommand::Unblock { mac: require_mac()? }),
        Some("rename") => Ok(CliCommand::Rename {
            mac: require_mac()?,
            name: parsed.name.clone(),
        }),
        Some("resolve-alert") => Ok(CliCommand::ResolveAlert {
            id: parsed
                .id
                .ok_or_else(|| anyhow::anyhow!("Missing --id <ID>.\n\n{}", usage_text()))?,
        }),
        Some("watch") => Ok(CliCommand::Watch {
            interval: parsed.interval,
        }),
        Some(_) | None => Err(anyhow::anyhow!(
            "No command provided.\n\n{}",
            usage_text()
        )),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize result")?
    );
    Ok(())
}

fn open_registry() -> Result<Database> {
    Database::new(Database::default_path())
}

fn load_router_manager(db: &Database, account_id: &str) -> Result<RouterManager> {
    let conn = db.connection();
    let conn = conn
        .lock()
        .map_err(|_| anyhow::anyhow!("Database connection lock poisoned"))?;
    let configs = queries::list_routers(&conn, account_id)?;
    Ok(RouterManager::new(configs))
}

#[tokio::main]
async fn main() {
    if let Err(e) = netguard_core::logging::init_logging() {
        eprintln!("[WARN] Failed to initialize structured logging: {}", e);
    }

    match run(std::env::args()).await {
        Ok(()) => {}
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run<I, S>(args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let (command, account) = parse_cli_args(args)?;
    match command {
        CliCommand::Help => {
            println!("{}", usage_text());
            Ok(())
        }
        CliCommand::Version => {
            println!("{}", version_text());
            Ok(())
        }
        CliCommand::Ping { host, count } => {
            let report = ping(&host, count).await?;
            print_json(&report)
        }
        CliCommand::Traceroute { host, max_hops } => {
            let report = traceroute(&host, max_hops).await?;
            print_json(&report)
        }
        CliCommand::Dns {
            domain,
            record_type,
        } => {
            let report = dns_lookup(&domain, record_type).await?;
            print_json(&report)
        }
        CliCommand::ScanPorts { host, full, range } => {
            let report = if full || range.is_some() {
                full_scan(&host, range).await?
            } else {
                quick_scan(&host).await?
            };
            print_json(&report)
        }
        CliCommand::RouterScan => {
            let db = open_registry()?;
            let manager = load_router_manager(&db, &account)?;
            if !manager.has_routers() {
                anyhow::bail!(
                    "No routers configured for account '{}'. Add one with router-add.",
                    account
                );
            }
            let results = manager.scan_all().await;
            let mut observed = Vec::new();
            for result in &results {
                observed.extend(result.devices.iter().cloned());
            }
            let summary = reconcile(&db, &account, &observed)?;
            tracing::info!(
                "Reconciled {} devices ({} new, {} went offline)",
                observed.len(),
                summary.new_count,
                summary.went_offline_count
            );
            print_json(&results)
        }
        CliCommand::RouterAdd {
            router_type,
            ip,
            username,
            password,
        } => {
            let db = open_registry()?;
            let config = RouterConfig {
                router_type,
                ip,
                username,
                password,
            };
            {
                let conn = db.connection();
                let conn = conn
                    .lock()
                    .map_err(|_| anyhow::anyhow!("Database connection lock poisoned"))?;
                queries::save_router(&conn, &account, &config)?;
            }
            println!(
                "Saved {} router at {} for account '{}'",
                config.router_type, config.ip, account
            );
            Ok(())
        }
        CliCommand::RouterRemove { ip } => {
            let db = open_registry()?;
            let removed = {
                let conn = db.connection();
                let conn = conn
                    .lock()
                    .map_err(|_| anyhow::anyhow!("Database connection lock poisoned"))?;
                queries::delete_router(&conn, &account, &ip)?
            };
            if removed {
                println!("Removed router at {} for account '{}'", ip, account);
                Ok(())
            } else {
                anyhow::bail!("No router configured at {} for account '{}'", ip, account)
            }
        }
        CliCommand::RouterStats => {
            let db = open_registry()?;
            let manager = load_router_manager(&db, &account)?;
            match manager.stats().await {
                Some(stats) => print_json(&stats),
                None => anyhow::bail!(
                    "No router returned status information for account '{}'",
                    account
                ),
            }
        }
        CliCommand::Devices => {
            let db = open_registry()?;
            let devices = {
                let conn = db.connection();
                let conn = conn
                    .lock()
                    .map_err(|_| anyhow::anyhow!("Database connection lock poisoned"))?;
                queries::list_devices(&conn, &account)?
            };
            print_json(&devices)
        }
        CliCommand::Alerts { include_resolved } => {
            let db = open_registry()?;
            let alerts = {
                let conn = db.connection();
                let conn = conn
                    .lock()
                    .map_err(|_| anyhow::anyhow!("Database connection lock poisoned"))?;
                queries::list_alerts(&conn, &account, include_resolved)?
            };
            print_json(&alerts)
        }
        CliCommand::Block { mac } => {
            let db = open_registry()?;
            let manager = load_router_manager(&db, &account)?;
            let device =
                blocking::block_device(&db, &manager, &LogNotifier, &account, &mac).await?;
            print_json(&device)
        }
        CliCommand::Unblock { mac } => {
            let db = open_registry()?;
            let manager = load_router_manager(&db, &account)?;
            let device =
                blocking::unblock_device(&db, &manager, &LogNotifier, &account, &mac).await?;
            print_json(&device)
        }
        CliCommand::Rename { mac, name } => {
            let db = open_registry()?;
            let device = {
                let conn = db.connection();
                let conn = conn
                    .lock()
                    .map_err(|_| anyhow::anyhow!("Database connection lock poisoned"))?;
                let mac = mac.to_uppercase();
                let device = queries::get_device_by_mac(&conn, &account, &mac)?
                    .ok_or_else(|| anyhow::anyhow!("No known device with MAC {}", mac))?;
                queries::set_custom_name(&conn, device.id, name.as_deref())?;
                queries::get_device_by_id(&conn, device.id)?
                    .context("Device disappeared while renaming")?
            };
            print_json(&device)
        }
        CliCommand::ResolveAlert { id } => {
            let db = open_registry()?;
            let resolved = {
                let conn = db.connection();
                let conn = conn
                    .lock()
                    .map_err(|_| anyhow::anyhow!("Database connection lock poisoned"))?;
                queries::resolve_alert(&conn, &account, id)?
            };
            if resolved {
                println!("Alert {} resolved", id);
                Ok(())
            } else {
                anyhow::bail!("No open alert {} for account '{}'", id, account)
            }
        }
        CliCommand::Watch { interval } => {
            let db = open_registry()?;
            let manager = Arc::new(load_router_manager(&db, &account)?);
            if !manager.has_routers() {
                anyhow::bail!(
                    "No routers configured for account '{}'. Add one with router-add.",
                    account
                );
            }
            let scheduler = Arc::new(ScanScheduler::new(
                &account,
                db,
                manager,
                Arc::new(LogNotifier),
                interval.unwrap_or(DEFAULT_SCAN_INTERVAL),
            ));
            scheduler.start();
            tracing::info!("Watching network, press Ctrl+C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;
            scheduler.stop();
            print_json(&scheduler.state())
        }
    }
}
