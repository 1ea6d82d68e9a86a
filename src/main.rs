use std::process::exit;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cube_rs::logging::init_rust_logging;
use cube_rs::{Cube, CubeConfig, CubeConnector, LightOperation, MoveToOptions, MoveToTarget, Note, SoundOperation};

#[derive(Parser, Debug)]
#[command(name = "cube-demo", about = "Connect to a toio cube and run a short routine")]
struct Args {
    /// Bluetooth MAC address (e.g., E0:12:34:56:78:9A)
    mac: String,
    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
    /// Seconds to keep printing events at the end
    #[arg(long, default_value_t = 5)]
    listen: u64,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    init_rust_logging();

    println!("--- Looking for cube {} ---", args.mac);
    let peripheral = CubeConnector::default()
        .find(&args.mac)
        .await
        .context("cube not found")?;
    let cube = Cube::connect(peripheral, CubeConfig::default())
        .await
        .context("connection failed")?;

    println!(
        "Connected! BLE protocol {}",
        cube.ble_protocol_version().unwrap_or("unknown")
    );
    match cube.battery_status().await {
        Ok(battery) => println!("Battery: {}%", battery.level),
        Err(e) => println!("Battery: unknown ({e})"),
    }

    let mut events = cube.events();

    // 1. Light and sound
    let _light = cube.turn_on_light(&LightOperation::new(500, 0, 0, 255)).await?;
    let melody = [Note::C5, Note::E5, Note::G5]
        .into_iter()
        .map(|note| SoundOperation::new(200, note))
        .collect::<Vec<_>>();
    cube.play_sound(&melody, 1).await?.await;

    // 2. Timed move
    println!("Spinning for one second...");
    cube.move_motors(30, -30, 1000).await?.await;

    // 3. Mat navigation, skipped on cubes without move-to
    if cube.capabilities().move_to {
        println!("Driving a square...");
        let square = [(150, 150), (350, 150), (350, 350), (150, 350)]
            .into_iter()
            .map(|(x, y)| MoveToTarget::new(x, y))
            .collect::<Vec<_>>();
        if let Err(e) = cube.move_to(&square, &MoveToOptions::default()).await {
            println!("move_to failed: {e}");
        }
    }

    // 4. Events
    println!("Listening for {}s...", args.listen);
    let deadline = tokio::time::sleep(Duration::from_secs(args.listen));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => match event {
                Some(event) if args.json => println!("{}", serde_json::to_string(&event)?),
                Some(event) => println!("{}: {:?}", event.name(), event),
                None => break,
            },
        }
    }

    println!("Stopping...");
    cube.stop().await?;
    cube.disconnect().await?;
    println!("Done.");
    Ok(())
}
