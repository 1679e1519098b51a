//! Command link to the drone.
//!
//! The drone joins as a Wi-Fi access point and takes short text commands
//! over UDP. This module exposes only the narrow surface the rest of the
//! program needs: enter command mode, take off / land, nudge movement, and
//! switch the video stream on and off. Nothing here touches frame data.

pub mod video;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Drone command endpoint on its own access-point network.
const COMMAND_ADDR: &str = "192.168.10.1:8889";

/// How long to wait for the drone to acknowledge command mode.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Distance of one movement nudge, in centimeters.
const MOVE_DISTANCE_CM: u32 = 20;

pub struct DroneController {
    socket: Arc<UdpSocket>,
    flying: AtomicBool,
}

impl DroneController {
    /// Bind the command socket, enter command mode, and wait for the
    /// drone's acknowledgement.
    pub async fn connect() -> Result<Self, String> {
        Self::connect_to(COMMAND_ADDR).await
    }

    async fn connect_to(addr: &str) -> Result<Self, String> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| format!("Failed to bind command socket: {e}"))?;
        socket
            .connect(addr)
            .await
            .map_err(|e| format!("Failed to set drone address {addr}: {e}"))?;

        let controller = Self {
            socket: Arc::new(socket),
            flying: AtomicBool::new(false),
        };

        log::info!("Connecting to drone at {addr}...");
        controller.send_command("command").await?;
        controller.await_ack().await?;
        log::info!("Drone ready");

        controller.spawn_reply_loop();
        Ok(controller)
    }

    /// Wait for one reply on the command socket, bounded by the connect
    /// timeout.
    async fn await_ack(&self) -> Result<(), String> {
        let mut buf = [0u8; 256];
        let len = timeout(CONNECT_TIMEOUT, self.socket.recv(&mut buf))
            .await
            .map_err(|_| format!("Drone connection timeout after {CONNECT_TIMEOUT:?}"))?
            .map_err(|e| format!("Command socket recv error: {e}"))?;
        log::debug!("Drone replied: {}", String::from_utf8_lossy(&buf[..len]).trim());
        Ok(())
    }

    /// Drain and log subsequent command replies so the socket buffer never
    /// fills. The drone answers every command with `ok` or an error string.
    fn spawn_reply_loop(&self) {
        let socket = self.socket.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            loop {
                match socket.recv(&mut buf).await {
                    Ok(len) => {
                        let reply = String::from_utf8_lossy(&buf[..len]);
                        log::debug!("Drone reply: {}", reply.trim());
                    }
                    Err(e) => {
                        log::warn!("Command socket recv error: {e}");
                        break;
                    }
                }
            }
        });
    }

    async fn send_command(&self, cmd: &str) -> Result<(), String> {
        self.socket
            .send(cmd.as_bytes())
            .await
            .map_err(|e| format!("Failed to send '{cmd}': {e}"))?;
        log::debug!("Sent command: {cmd}");
        Ok(())
    }

    /// Take off or land depending on the current flying state.
    pub async fn take_off_or_land(&self) -> Result<(), String> {
        if self.is_flying() {
            self.land().await
        } else {
            self.take_off().await
        }
    }

    pub async fn take_off(&self) -> Result<(), String> {
        log::info!("Taking off...");
        self.send_command("takeoff").await?;
        self.flying.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub async fn land(&self) -> Result<(), String> {
        log::info!("Landing...");
        self.send_command("land").await?;
        self.flying.store(false, Ordering::Relaxed);
        Ok(())
    }

    pub fn is_flying(&self) -> bool {
        self.flying.load(Ordering::Relaxed)
    }

    pub async fn move_forward(&self) -> Result<(), String> {
        self.movement("forward").await
    }

    pub async fn move_backward(&self) -> Result<(), String> {
        self.movement("back").await
    }

    pub async fn move_left(&self) -> Result<(), String> {
        self.movement("left").await
    }

    pub async fn move_right(&self) -> Result<(), String> {
        self.movement("right").await
    }

    pub async fn move_up(&self) -> Result<(), String> {
        self.movement("up").await
    }

    pub async fn move_down(&self) -> Result<(), String> {
        self.movement("down").await
    }

    /// Movement is ignored on the ground.
    async fn movement(&self, direction: &str) -> Result<(), String> {
        if !self.is_flying() {
            return Ok(());
        }
        log::info!("Moving {direction}");
        self.send_command(&format!("{direction} {MOVE_DISTANCE_CM}")).await
    }

    /// Ask the drone to start sending video to the stream port.
    pub async fn start_video(&self) -> Result<(), String> {
        self.send_command("streamon").await
    }

    pub async fn stop_video(&self) -> Result<(), String> {
        self.send_command("streamoff").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    /// Loopback stand-in for the drone: acks every command and forwards a
    /// copy of it for assertions.
    async fn fake_drone() -> (String, mpsc::UnboundedReceiver<String>) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap().to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            loop {
                let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                    break;
                };
                let cmd = String::from_utf8_lossy(&buf[..len]).into_owned();
                let _ = socket.send_to(b"ok", from).await;
                if tx.send(cmd).is_err() {
                    break;
                }
            }
        });

        (addr, rx)
    }

    async fn next_command(rx: &mut mpsc::UnboundedReceiver<String>) -> Option<String> {
        timeout(Duration::from_millis(500), rx.recv()).await.ok().flatten()
    }

    #[tokio::test]
    async fn test_connect_enters_command_mode() {
        let (addr, mut commands) = fake_drone().await;
        let drone = DroneController::connect_to(&addr).await.unwrap();
        assert_eq!(next_command(&mut commands).await.as_deref(), Some("command"));
        assert!(!drone.is_flying());
    }

    #[tokio::test]
    async fn test_takeoff_land_toggle() {
        let (addr, mut commands) = fake_drone().await;
        let drone = DroneController::connect_to(&addr).await.unwrap();
        next_command(&mut commands).await; // "command"

        drone.take_off_or_land().await.unwrap();
        assert!(drone.is_flying());
        assert_eq!(next_command(&mut commands).await.as_deref(), Some("takeoff"));

        drone.take_off_or_land().await.unwrap();
        assert!(!drone.is_flying());
        assert_eq!(next_command(&mut commands).await.as_deref(), Some("land"));
    }

    #[tokio::test]
    async fn test_movement_gated_on_flying() {
        let (addr, mut commands) = fake_drone().await;
        let drone = DroneController::connect_to(&addr).await.unwrap();
        next_command(&mut commands).await; // "command"

        // Grounded: the nudge is swallowed, nothing hits the wire.
        drone.move_forward().await.unwrap();
        assert_eq!(next_command(&mut commands).await, None);

        drone.take_off().await.unwrap();
        next_command(&mut commands).await; // "takeoff"
        drone.move_forward().await.unwrap();
        assert_eq!(
            next_command(&mut commands).await.as_deref(),
            Some("forward 20")
        );
        drone.move_up().await.unwrap();
        assert_eq!(next_command(&mut commands).await.as_deref(), Some("up 20"));
    }

    #[tokio::test]
    async fn test_stream_commands() {
        let (addr, mut commands) = fake_drone().await;
        let drone = DroneController::connect_to(&addr).await.unwrap();
        next_command(&mut commands).await; // "command"

        drone.start_video().await.unwrap();
        assert_eq!(next_command(&mut commands).await.as_deref(), Some("streamon"));
        drone.stop_video().await.unwrap();
        assert_eq!(next_command(&mut commands).await.as_deref(), Some("streamoff"));
    }
}
