use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{sleep, Duration};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "5055";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("lvbus")
        .version("0.1.0")
        .about("🚀 Launch Vehicle Bus - ground admin client")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("host")
                .short("H")
                .long("host")
                .value_name("HOST")
                .help("Simulator host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Admin server port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("status")
                .about("📊 Query mission go state and throttle setting"),
        )
        .subcommand(SubCommand::with_name("go").about("🟢 Set mission GO"))
        .subcommand(SubCommand::with_name("nogo").about("🔴 Clear mission GO"))
        .subcommand(
            SubCommand::with_name("abort")
                .about("🚨 Abort: clear GO and zero the throttle"),
        )
        .subcommand(
            SubCommand::with_name("set-throttle")
                .about("🎚️  Set the commanded throttle percentage")
                .arg(
                    Arg::with_name("percent")
                        .help("Throttle percentage (clamped to 0-100)")
                        .required(true)
                        .validator(|v| {
                            v.parse::<i32>()
                                .map(|_| ())
                                .map_err(|_| "percent must be an integer".to_string())
                        }),
                ),
        )
        .subcommand(
            SubCommand::with_name("monitor")
                .about("📡 Poll status once per second until interrupted")
                .arg(
                    Arg::with_name("interval")
                        .long("interval")
                        .value_name("MS")
                        .help("Poll interval in milliseconds")
                        .takes_value(true)
                        .default_value("1000"),
                ),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT);
    let format = matches.value_of("format").unwrap_or("table");
    let addr = format!("{host}:{port}");

    match matches.subcommand() {
        ("status", _) => {
            let response = send_request(&addr, "{\"cmd\":\"status\"}").await?;
            print_response(&response, format);
        }
        ("go", _) => {
            let response = send_request(&addr, "{\"cmd\":\"go\"}").await?;
            print_response(&response, format);
        }
        ("nogo", _) => {
            let response = send_request(&addr, "{\"cmd\":\"nogo\"}").await?;
            print_response(&response, format);
        }
        ("abort", _) => {
            let response = send_request(&addr, "{\"cmd\":\"abort\"}").await?;
            print_response(&response, format);
        }
        ("set-throttle", Some(sub)) => {
            let percent = sub.value_of("percent").unwrap_or("0");
            let request = format!("{{\"cmd\":\"set_throttle\",\"value\":{percent}}}");
            let response = send_request(&addr, &request).await?;
            print_response(&response, format);
        }
        ("monitor", sub) => {
            monitor(&addr, format, sub).await?;
        }
        _ => unreachable!("subcommand required"),
    }

    Ok(())
}

async fn send_request(addr: &str, request: &str) -> Result<String, Box<dyn std::error::Error>> {
    let stream = TcpStream::connect(addr).await.map_err(|e| {
        eprintln!("{} cannot reach simulator at {}", "error:".red().bold(), addr);
        e
    })?;
    let (read_half, mut write_half) = stream.into_split();
    write_half.write_all(request.as_bytes()).await?;
    write_half.write_all(b"\n").await?;

    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    Ok(line.trim_end().to_string())
}

async fn monitor(
    addr: &str,
    format: &str,
    sub: Option<&ArgMatches<'_>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let interval_ms: u64 = sub
        .and_then(|m| m.value_of("interval"))
        .unwrap_or("1000")
        .parse()?;

    println!("{}", "📡 Monitoring (Ctrl+C to stop)".bold());
    loop {
        let response = send_request(addr, "{\"cmd\":\"status\"}").await?;
        print_response(&response, format);
        sleep(Duration::from_millis(interval_ms)).await;
    }
}

fn print_response(response: &str, format: &str) {
    match format {
        "json" => match serde_json::from_str::<serde_json::Value>(response) {
            Ok(value) => println!(
                "{}",
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| response.to_string())
            ),
            Err(_) => println!("{response}"),
        },
        "compact" => {
            if response.contains("\"type\":\"error\"") {
                println!("{} {}", "✗".red(), response);
            } else {
                println!("{} {}", "✓".green(), response);
            }
        }
        _ => print_table(response),
    }
}

/// Render the fixed response shapes without a full JSON parse.
fn print_table(response: &str) {
    if response.contains("\"type\":\"status\"") {
        let go = response.contains("\"go\":true");
        let throttle = field_after(response, "\"throttle\":").unwrap_or("?");
        println!("{}", "┌─ Mission Status ──────────┐".bold());
        let go_text = if go { "GO".green().bold() } else { "NO-GO".red().bold() };
        println!("│ Mission:  {go_text:<16} │");
        println!("│ Throttle: {:<15} │", format!("{throttle}%"));
        println!("{}", "└───────────────────────────┘".bold());
    } else if response.contains("\"type\":\"ack\"") {
        let cmd = field_after(response, "\"cmd\":\"")
            .map(|c| c.trim_end_matches('"'))
            .unwrap_or("?");
        match field_after(response, "\"value\":") {
            Some(value) => println!("{} {} (value {})", "✓".green().bold(), cmd, value),
            None => println!("{} {}", "✓".green().bold(), cmd),
        }
    } else if response.contains("\"type\":\"error\"") {
        let msg = field_after(response, "\"msg\":\"")
            .map(|m| m.trim_end_matches(|c| c == '"' || c == '}'))
            .unwrap_or("unknown error");
        println!("{} {}", "✗".red().bold(), msg);
    } else {
        println!("{response}");
    }
}

/// Raw field text between `key` and the next delimiter.
fn field_after<'a>(response: &'a str, key: &str) -> Option<&'a str> {
    let start = response.find(key)? + key.len();
    let rest = &response[start..];
    let end = rest
        .find(|c| c == ',' || c == '}')
        .unwrap_or(rest.len());
    Some(&rest[..end])
}
