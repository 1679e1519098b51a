mod camera;
mod drone;
mod input;
mod recording;

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use camera::CameraViewer;
use drone::video::VideoStream;
use drone::DroneController;
use input::KeyboardHandler;
use recording::session::RecordingSession;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Tellocam starting");

    let runtime = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    if let Err(e) = runtime.block_on(run()) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let drone = Arc::new(DroneController::connect().await?);

    let video = VideoStream::bind().await?;
    let frames = video.spawn_recv_loop();

    let session = Arc::new(RecordingSession::new("."));
    let viewer = Arc::new(CameraViewer::new(session));
    viewer.start();

    drone.start_video().await?;
    let frame_stop = camera::spawn_frame_task(viewer.clone(), frames);

    let (quit_tx, mut quit_rx) = mpsc::unbounded_channel();
    let keyboard =
        KeyboardHandler::start(drone.clone(), viewer.clone(), Handle::current(), quit_tx)?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => log::info!("Signal received, shutting down..."),
        _ = quit_rx.recv() => log::info!("Quit requested, shutting down..."),
    }

    // Land first, then close any open recording, then quiet the stream.
    keyboard.stop();
    if drone.is_flying() {
        if let Err(e) = drone.land().await {
            log::warn!("Failed to land: {e}");
        }
    }
    viewer.stop();
    let _ = frame_stop.send(true);
    if let Err(e) = drone.stop_video().await {
        log::warn!("Failed to stop video stream: {e}");
    }

    log::info!("Shutdown complete");
    Ok(())
}
