//! Minimal speechd_client example: speak a sentence and wait for it.
//!
//! Needs a running speech-dispatcher (it is autospawned if the binary is
//! installed):
//! ```bash
//! cd speechd_client && cargo run --example speak_demo
//! ```

use log::info;
use speechd_client::SpeechdSession;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let session = SpeechdSession::open()?;
    session.set_client_name("demo", "speak_demo", "main")?;

    // Required for wait() below.
    session.set_event_notifications(true)?;

    info!("🔊 Available modules: {:?}", session.list_output_modules()?);

    session.set_rate(10)?;
    let pending = session.speak("Hello from the speechd client crate.")?;
    info!("🗣️ Speaking message {}", pending.id());

    let spoken = pending.wait()?;
    info!("✅ Message finished (spoken to completion: {})", spoken);

    session.close();
    Ok(())
}
