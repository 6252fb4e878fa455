use clap::{App, Arg};
use lvbus::admin;
use lvbus::command::{spawn_wake_timer, CommandService};
use lvbus::config::WAKE_PULSE_PERIOD_MS;
use lvbus::phase::MISSION_START_TIME_S;
use lvbus::runtime::{spawn_all, RuntimeContext};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("lvbus-simulator")
        .version("0.1.0")
        .about("🚀 Launch Vehicle Bus Simulator - real-time vehicle systems simulation")
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Admin server port")
                .takes_value(true)
                .default_value("5055"),
        )
        .arg(
            Arg::with_name("start-time")
                .short("t")
                .long("start-time")
                .value_name("SECONDS")
                .help("Mission clock start, seconds relative to liftoff (negative = countdown)")
                .takes_value(true)
                .allow_hyphen_values(true)
                .validator(|v| {
                    v.parse::<f64>()
                        .map(|_| ())
                        .map_err(|_| "start time must be a number".to_string())
                }),
        )
        .get_matches();

    let port: u16 = matches.value_of("port").unwrap_or("5055").parse()?;
    let start_time: f64 = matches
        .value_of("start-time")
        .map(str::parse)
        .transpose()?
        .unwrap_or(MISSION_START_TIME_S);

    println!("🚀 Launch Vehicle Bus Simulator");
    println!("===============================");
    info!(start_time, "mission clock initialized");

    let ctx = RuntimeContext::new(start_time);
    let shutdown = Arc::new(AtomicBool::new(false));

    // Command channel: one service loop owns state mutation, the wake timer
    // marks periods on the same channel.
    let (service, client) = CommandService::new(Arc::clone(&ctx.command));
    let service_handle = service.spawn()?;
    let _wake_handle = spawn_wake_timer(
        client.clone(),
        Duration::from_millis(WAKE_PULSE_PERIOD_MS),
    )?;

    let subsystem_handles = spawn_all(&ctx, Arc::clone(&shutdown))?;
    info!(subsystems = subsystem_handles.len(), "simulation running");

    // Admin server has its own go/throttle state, decoupled from the
    // command channel.
    let admin_state = admin::shared_state();
    let addr = format!("127.0.0.1:{port}");
    let admin_task = tokio::spawn(async move {
        if let Err(e) = admin::serve(&addr, admin_state).await {
            error!(error = %e, "admin server exited");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    shutdown.store(true, Ordering::Relaxed);
    client.shutdown();
    admin_task.abort();

    let joins = tokio::task::spawn_blocking(move || {
        for handle in subsystem_handles {
            let _ = handle.join();
        }
        let _ = service_handle.join();
    });
    joins.await?;

    println!("🛬 Launch Vehicle Bus Simulator stopped");
    Ok(())
}
