use anyhow::{Context, Result};
use intersection_sim::{Simulation, SimulationConfig};
use log::info;
use std::time::Instant;

/// The frame step at 60 fps, in ms.
const FRAME: f64 = 1000.0 / 60.0;

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(file) => {
            let json = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file))?;
            SimulationConfig::from_json(&json).with_context(|| format!("loading scenario {}", file))?
        }
        None => SimulationConfig::default(),
    };
    let seconds = match args.next() {
        Some(arg) => arg.parse::<f64>().with_context(|| format!("invalid duration {:?}", arg))?,
        None => 600.0,
    };

    let mut sim = Simulation::new(config)?;
    info!("Simulating {} s...", seconds);
    let start = Instant::now();
    let frames = (seconds * 1000.0 / FRAME).ceil() as usize;
    for _ in 0..frames {
        sim.step(FRAME);
    }
    let elapsed = start.elapsed();
    info!(
        "{} frames in {:?} ({:.0}x real time), {} vehicles still on the road",
        sim.frame(),
        elapsed,
        sim.time() / 1000.0 / elapsed.as_secs_f64(),
        sim.iter_vehicles().count(),
    );

    for movement in sim.trips().summary() {
        info!(
            "{} -> {}: {} trips, {:.1} km/h, {:.1} s delay",
            movement.origin, movement.destination, movement.count, movement.mean_speed_kmh, movement.mean_delay_s,
        );
    }
    for (arm, queue) in sim.queue_lengths().iter() {
        info!("{} queue: {}", arm, queue);
    }
    Ok(())
}
