use std::env;

use homevolt_local::sensors::{build_entities, SensorValue};
use homevolt_local::{Config, Coordinator};

#[tokio::main]
async fn main() -> homevolt_local::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("usage: monitor <config.toml | host...>");
        std::process::exit(2);
    }

    let builder = if args[0].ends_with(".toml") {
        Config::load(&args[0])?.coordinator_builder()
    } else {
        args.iter()
            .fold(Coordinator::builder("monitor"), |b, host| b.host(host.clone()))
    };

    let mut coordinator = builder
        .on_update(|data| {
            for entity in build_entities(data) {
                let value = match entity.value(data) {
                    Some(SensorValue::Number(n)) => format!("{n:.2}"),
                    Some(SensorValue::Text(t)) => t,
                    None => "-".to_string(),
                };
                println!(
                    "{:<28} {:<12} {:>14} {}",
                    entity.description.key,
                    format!("{:?}", entity.target),
                    value,
                    entity.description.unit.unwrap_or("")
                );
            }
            println!();
        })
        .on_error(|e| eprintln!("update error: {e}"))
        .build()?;

    println!(
        "Polling {} host(s) every {}s, main host {}",
        coordinator.resources().len(),
        coordinator.scan_interval().as_secs(),
        coordinator.main_host()
    );

    coordinator
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    Ok(())
}
