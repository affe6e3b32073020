//! loothound CLI - testing and development entry point
//!
//! Wires a dry-run session so the detection and controller stack can
//! be exercised without a real capture backend or input driver. Real
//! deployments embed [`loothound::BotSession`] with their own
//! `FrameSource` and `ActionDriver` implementations.

use std::path::Path;
use std::sync::Arc;

use image::RgbImage;

use loothound::config::Settings;
use loothound::driver::NullDriver;
use loothound::vision::{StaticFrameSource, TemplateLibrary};
use loothound::BotSession;

fn main() {
    env_logger::init();

    println!("loothound - template detection & pickup automation");
    println!("===================================================");
    println!();

    let settings = Settings::default();

    let mut library = TemplateLibrary::new();
    let template_dir = Path::new("templates");
    if template_dir.is_dir() {
        match library.load_dir(template_dir) {
            Ok(count) => println!("Loaded {count} templates from ./templates"),
            Err(e) => eprintln!("Template load failed: {e}"),
        }
    } else {
        println!("No ./templates directory; starting with an empty library.");
    }
    println!();

    println!("Current Configuration:");
    println!("  - Scan rate: {:.0} fps", settings.detection.fps);
    println!(
        "  - Match threshold: {:.2}",
        settings.detection.match_threshold
    );
    println!("  - Scale ladder: {:?}", settings.detection.scale_ladder);
    println!("  - Anchor: {:?}", settings.combat.anchor_point());
    println!(
        "  - Move/attack intervals: {}ms / {}ms",
        settings.combat.move_interval_ms, settings.combat.attack_interval_ms
    );
    println!(
        "  - Pickup policy: {:?}, dedup radius {:.0}px",
        settings.pickup.policy, settings.pickup.dedup_radius
    );
    println!();

    if library.is_empty() {
        println!("Place target images under ./templates to give the session");
        println!("something to hunt for, then run again.");
        return;
    }

    // Dry run against a blank synthetic frame: nothing will match, but
    // the full producer/consumer stack spins up and can be observed
    // with RUST_LOG=debug.
    let (width, height) = (settings.combat.screen_width, settings.combat.screen_height);
    let blank = RgbImage::new(width, height);
    let session = BotSession::new(
        Box::new(StaticFrameSource::new(blank)),
        Arc::new(NullDriver),
        library,
        settings,
    );

    match session.start() {
        Ok(()) => println!("Dry-run session started (blank frames, logged actions)."),
        Err(e) => {
            eprintln!("Session failed to start: {e}");
            return;
        }
    }

    std::thread::sleep(std::time::Duration::from_secs(5));

    let status = session.status();
    println!(
        "Status after 5s: state = {:?}, queue depth = {}, detection running = {}",
        status.state, status.queue_depth, status.detection_running
    );

    session.stop();
    println!("Session stopped.");
}
